//! Deploy Driver - ordered manifest application with readiness gates
//!
//! Applies the rendered manifests to the freshly bootstrapped cluster in
//! dependency order. Two add-ons are installed from their pinned upstream
//! release manifests, and each one is waited on before anything that needs
//! it is applied: the ACME issuer and certificate only go in once
//! cert-manager's webhooks answer, and the ingress only once the
//! ingress-nginx controller is available.
//!
//! A rejected apply and an expired readiness wait are different failures
//! and classify into different error variants.

use std::path::PathBuf;
use std::time::Duration;

use tracing::info;

use crate::render::Manifests;
use crate::runner::{ensure_tool, CommandRunner, CommandSpec};
use crate::{Error, Result};

/// Pinned cert-manager release
pub(crate) const CERT_MANAGER_VERSION: &str = "v1.14.4";

/// Pinned ingress-nginx controller release
pub(crate) const INGRESS_NGINX_VERSION: &str = "v1.10.1";

/// Slack added on top of the readiness deadline so the wait command itself
/// is the thing that times out, not our process supervisor.
const WAIT_COMMAND_SLACK: Duration = Duration::from_secs(30);

fn cert_manager_manifest_url() -> String {
    format!(
        "https://github.com/cert-manager/cert-manager/releases/download/{}/cert-manager.yaml",
        CERT_MANAGER_VERSION
    )
}

fn ingress_nginx_manifest_url() -> String {
    format!(
        "https://raw.githubusercontent.com/kubernetes/ingress-nginx/controller-{}/deploy/static/provider/cloud/deploy.yaml",
        INGRESS_NGINX_VERSION
    )
}

/// Driver that applies manifests and gates on controller readiness
pub struct DeployDriver<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    kubeconfig: PathBuf,
    namespace: String,
    apply_timeout: Duration,
    readiness_timeout: Duration,
}

impl<'a, R: CommandRunner + ?Sized> DeployDriver<'a, R> {
    /// Create a driver talking to the cluster behind the given kubeconfig
    pub fn new(
        runner: &'a R,
        kubeconfig: impl Into<PathBuf>,
        namespace: impl Into<String>,
        apply_timeout: Duration,
        readiness_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            kubeconfig: kubeconfig.into(),
            namespace: namespace.into(),
            apply_timeout,
            readiness_timeout,
        }
    }

    /// Check that kubectl is installed
    pub async fn ensure_tool(&self) -> Result<()> {
        ensure_tool(
            self.runner,
            "kubectl",
            "Install kubectl: https://kubernetes.io/docs/tasks/tools/",
        )
        .await
    }

    /// Apply everything in dependency order, waiting on each add-on before
    /// applying the resources that need it.
    pub async fn deploy(&self, manifests: &Manifests) -> Result<()> {
        self.ensure_namespace().await?;

        self.apply_manifest("deployment", &manifests.deployment)
            .await?;
        self.apply_manifest("service", &manifests.service).await?;

        self.apply_url("cert-manager", &cert_manager_manifest_url())
            .await?;
        for deployment in ["cert-manager", "cert-manager-webhook", "cert-manager-cainjector"] {
            self.wait_available("cert-manager", deployment).await?;
        }

        self.apply_manifest("issuer", &manifests.issuer).await?;
        self.apply_manifest("certificate", &manifests.certificate)
            .await?;

        self.apply_url("ingress-nginx", &ingress_nginx_manifest_url())
            .await?;
        self.wait_available("ingress-nginx", "ingress-nginx-controller")
            .await?;

        self.apply_manifest("ingress", &manifests.ingress).await?;
        Ok(())
    }

    /// Create the target namespace if the run doesn't use the default one.
    ///
    /// Applied as a manifest so re-runs converge instead of failing on
    /// AlreadyExists.
    async fn ensure_namespace(&self) -> Result<()> {
        if self.namespace == "default" {
            return Ok(());
        }
        let manifest = format!(
            "apiVersion: v1\nkind: Namespace\nmetadata:\n  name: {}\n",
            self.namespace
        );
        self.apply_manifest("namespace", &manifest).await
    }

    /// Apply one manifest document over stdin
    async fn apply_manifest(&self, name: &str, content: &str) -> Result<()> {
        info!(manifest = name, "Applying manifest");
        let spec = self
            .kubectl(["apply", "-f", "-"])
            .stdin(content)
            .timeout(self.apply_timeout);
        let output = self.runner.run(&spec).await?;
        if !output.success {
            return Err(Error::apply_rejected(name, output.error_output()));
        }
        Ok(())
    }

    /// Apply a pinned upstream release manifest by URL
    async fn apply_url(&self, name: &str, url: &str) -> Result<()> {
        info!(manifest = name, url, "Applying upstream release manifest");
        let spec = self
            .kubectl(["apply", "-f", url])
            .timeout(self.apply_timeout);
        let output = self.runner.run(&spec).await?;
        if !output.success {
            return Err(Error::apply_rejected(name, output.error_output()));
        }
        Ok(())
    }

    /// Block until the named deployment reports Available, up to the
    /// readiness deadline.
    ///
    /// Only an expired wait classifies as a readiness timeout. Any other
    /// failure (target missing, unreachable API server) is the cluster
    /// refusing the operation, not a slow controller.
    async fn wait_available(&self, namespace: &str, deployment: &str) -> Result<()> {
        info!(namespace, deployment, "Waiting for deployment availability");
        let timeout_arg = format!("--timeout={}s", self.readiness_timeout.as_secs());
        let target = format!("deployment/{}", deployment);
        let spec = self
            .kubectl([
                "wait",
                "--for=condition=Available",
                target.as_str(),
                "-n",
                namespace,
                timeout_arg.as_str(),
            ])
            .timeout(self.readiness_timeout + WAIT_COMMAND_SLACK);
        let output = self.runner.run(&spec).await?;
        if !output.success {
            let message = output.error_output();
            if message.contains("timed out") {
                return Err(Error::readiness_timeout(
                    deployment,
                    self.readiness_timeout,
                    message,
                ));
            }
            return Err(Error::apply_rejected(target, message));
        }
        Ok(())
    }

    fn kubectl<I, S>(&self, args: I) -> CommandSpec
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CommandSpec::new("kubectl")
            .arg("--kubeconfig")
            .arg(self.kubeconfig.display().to_string())
            .args(args)
    }
}
