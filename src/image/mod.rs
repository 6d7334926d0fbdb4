//! Build & Publish Driver - container image build and registry push
//!
//! Stages the rendered Dockerfile and service source into a build directory,
//! builds the image under its full registry coordinates, and pushes it. The
//! two steps fail differently: a build failure points at the build context,
//! a push failure at registry access, so they map to separate error
//! variants.
//!
//! Registry authentication is assumed to be in place already (`docker login`
//! or a credential helper); this driver never handles credentials.

use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use crate::runner::{ensure_tool, CommandRunner, CommandSpec};
use crate::{Error, Result};

/// Driver that builds and publishes the workload image
pub struct ImageDriver<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    build_dir: PathBuf,
    timeout: Duration,
}

impl<'a, R: CommandRunner + ?Sized> ImageDriver<'a, R> {
    /// Create a driver that stages its build context in the given directory
    pub fn new(runner: &'a R, build_dir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            runner,
            build_dir: build_dir.into(),
            timeout,
        }
    }

    /// Check that Docker is installed
    pub async fn ensure_tool(&self) -> Result<()> {
        ensure_tool(
            self.runner,
            "docker",
            "Install Docker: https://docs.docker.com/engine/install/",
        )
        .await
    }

    /// Write the build context files into the build directory
    pub async fn stage(&self, dockerfile: &str, app_source: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.build_dir).await?;
        tokio::fs::write(self.build_dir.join("Dockerfile"), dockerfile).await?;
        tokio::fs::write(self.build_dir.join("app.py"), app_source).await?;
        Ok(())
    }

    /// Build the image from the staged context, tagged with its full
    /// registry coordinates.
    pub async fn build(&self, image: &str) -> Result<()> {
        info!(image, "Building container image");
        let spec = CommandSpec::new("docker")
            .args(["build", "-t", image, "."])
            .current_dir(&self.build_dir)
            .timeout(self.timeout);
        let output = self.runner.run(&spec).await?;
        if !output.success {
            return Err(Error::Build(output.error_output()));
        }
        Ok(())
    }

    /// Push the built image to its registry
    pub async fn publish(&self, image: &str) -> Result<()> {
        info!(image, "Pushing container image");
        let spec = CommandSpec::new("docker")
            .args(["push", image])
            .timeout(self.timeout);
        let output = self.runner.run(&spec).await?;
        if !output.success {
            return Err(Error::Publish(output.error_output()));
        }
        Ok(())
    }
}
