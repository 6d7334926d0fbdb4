//! Provisioning Driver - Terraform apply and output extraction
//!
//! Submits the rendered infrastructure definition to Terraform, converges
//! the declared resources, and reads the named outputs back as immutable
//! [`ProvisionedNode`] records. Idempotence is inherited from Terraform's
//! reconciliation model: re-running against converged state changes nothing.
//!
//! Provisioning errors (quota, auth, conflicting resources) are fatal and
//! surfaced verbatim.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::info;

use crate::runner::{ensure_tool, CommandRunner, CommandSpec};
use crate::{Error, Result};

/// Terraform output names declared in the infrastructure definition
const CONTROL_PLANE_OUTPUT: &str = "control_plane_public_ip";
const WORKER_OUTPUT: &str = "worker_public_ip";

/// Role of a provisioned node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// Runs `kubeadm init` and publishes the join command
    ControlPlane,
    /// Joins the cluster after the control plane is initialized
    Worker,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ControlPlane => write!(f, "control-plane"),
            Self::Worker => write!(f, "worker"),
        }
    }
}

/// An immutable record of one provisioned compute instance.
///
/// Created here, consumed by the bootstrap and deploy drivers. There is no
/// lifecycle beyond the run; destruction is not handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionedNode {
    /// The node's role in the cluster
    pub role: NodeRole,
    /// Public address reachable for SSH
    pub public_ip: String,
}

/// One entry of `terraform output -json`
#[derive(Debug, Deserialize)]
struct OutputValue {
    value: String,
}

/// Driver that converges declared cloud resources via Terraform
pub struct ProvisioningDriver<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    workdir: PathBuf,
    timeout: Duration,
}

impl<'a, R: CommandRunner + ?Sized> ProvisioningDriver<'a, R> {
    /// Create a driver rooted at the given working directory
    pub fn new(runner: &'a R, workdir: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            runner,
            workdir: workdir.into(),
            timeout,
        }
    }

    /// Check that Terraform is installed
    pub async fn ensure_tool(&self) -> Result<()> {
        ensure_tool(
            self.runner,
            "terraform",
            "Install Terraform: https://developer.hashicorp.com/terraform/install",
        )
        .await
    }

    /// Write the rendered definition, converge the declared resources, and
    /// return the provisioned nodes.
    pub async fn apply(&self, infra_definition: &str) -> Result<Vec<ProvisionedNode>> {
        tokio::fs::create_dir_all(&self.workdir).await?;
        tokio::fs::write(self.workdir.join("main.tf"), infra_definition).await?;

        self.terraform(&["init", "-input=false", "-no-color"]).await?;

        info!(workdir = %self.workdir.display(), "Applying infrastructure definition");
        self.terraform(&["apply", "-auto-approve", "-input=false", "-no-color"])
            .await?;

        let nodes = self.read_outputs().await?;
        for node in &nodes {
            info!(role = %node.role, address = %node.public_ip, "Provisioned node");
        }
        Ok(nodes)
    }

    /// Read the named outputs back as provisioned node records
    async fn read_outputs(&self) -> Result<Vec<ProvisionedNode>> {
        let stdout = self.terraform(&["output", "-json"]).await?;
        parse_outputs(&stdout)
    }

    async fn terraform(&self, args: &[&str]) -> Result<String> {
        let spec = CommandSpec::new("terraform")
            .args(args.iter().copied())
            .current_dir(&self.workdir)
            .timeout(self.timeout);
        let output = self.runner.run(&spec).await?;

        if !output.success {
            return Err(Error::provisioning(format!(
                "terraform {} failed: {}",
                args[0],
                output.error_output()
            )));
        }
        Ok(output.stdout)
    }
}

/// Parse `terraform output -json` into the two expected node records
fn parse_outputs(json: &str) -> Result<Vec<ProvisionedNode>> {
    let outputs: HashMap<String, OutputValue> = serde_json::from_str(json)
        .map_err(|e| Error::provisioning(format!("failed to parse terraform outputs: {}", e)))?;

    let get = |name: &str| -> Result<String> {
        outputs
            .get(name)
            .map(|o| o.value.clone())
            .ok_or_else(|| Error::provisioning(format!("terraform output {:?} is missing", name)))
    };

    Ok(vec![
        ProvisionedNode {
            role: NodeRole::ControlPlane,
            public_ip: get(CONTROL_PLANE_OUTPUT)?,
        },
        ProvisionedNode {
            role: NodeRole::Worker,
            public_ip: get(WORKER_OUTPUT)?,
        },
    ])
}
