//! The sequential pipeline run
//!
//! One [`Pipeline::run`] walks the fixed step sequence: validate, tool
//! check, render, provision, bootstrap (control plane gated before worker),
//! build, publish, deploy. The first error halts the run; nothing after a
//! failed step executes, and nothing already provisioned is rolled back.
//!
//! Every completed step is accumulated into a [`RunReport`] so a failed run
//! can still say exactly how far it got and which nodes exist.

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{error, info};

use crate::bootstrap::BootstrapDriver;
use crate::config::RunConfig;
use crate::deploy::DeployDriver;
use crate::image::ImageDriver;
use crate::provision::{NodeRole, ProvisionedNode, ProvisioningDriver};
use crate::render::Renderer;
use crate::runner::{ensure_tool, CommandRunner};
use crate::{Error, DEFAULT_POD_NETWORK_CIDR};

/// One step of the fixed pipeline sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Configuration validation, before any tool runs
    Validate,
    /// Probe for every required external tool
    ToolCheck,
    /// Render all generated artifacts
    Render,
    /// Terraform apply and node address extraction
    Provision,
    /// Control plane bootstrap and join-command publication
    BootstrapControlPlane,
    /// Worker join, gated on the published join command
    BootstrapWorker,
    /// Container image build
    BuildImage,
    /// Container image push
    PublishImage,
    /// Ordered manifest application with readiness gates
    Deploy,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validate => "validate",
            Self::ToolCheck => "tool-check",
            Self::Render => "render",
            Self::Provision => "provision",
            Self::BootstrapControlPlane => "bootstrap-control-plane",
            Self::BootstrapWorker => "bootstrap-worker",
            Self::BuildImage => "build-image",
            Self::PublishImage => "publish-image",
            Self::Deploy => "deploy",
        };
        write!(f, "{}", name)
    }
}

/// One completed step, with what it accomplished and how long it took
#[derive(Debug, Clone)]
pub struct StepRecord {
    /// The completed step
    pub step: Step,
    /// Short human-readable outcome
    pub detail: String,
    /// Wall-clock duration of the step
    pub duration: Duration,
}

/// Accumulated state of a run, complete or halted
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Steps completed so far, in order
    pub steps: Vec<StepRecord>,
    /// Nodes provisioned by the run, if it got that far
    pub nodes: Vec<ProvisionedNode>,
}

impl RunReport {
    fn record(&mut self, step: Step, detail: impl Into<String>, duration: Duration) {
        self.steps.push(StepRecord {
            step,
            detail: detail.into(),
            duration,
        });
    }

    /// Render the report as one line per completed step, plus the nodes
    pub fn summary(&self) -> String {
        let mut lines: Vec<String> = self
            .steps
            .iter()
            .map(|r| format!("{} ({:.1?}): {}", r.step, r.duration, r.detail))
            .collect();
        for node in &self.nodes {
            lines.push(format!("node {}: {}", node.role, node.public_ip));
        }
        lines.join("\n")
    }
}

/// A halted run: the step that failed, why, and everything completed before
/// it. The report matters because provisioned infrastructure is not rolled
/// back.
#[derive(Debug)]
pub struct PipelineFailure {
    /// The step that halted the run
    pub step: Step,
    /// The failure itself
    pub error: Error,
    /// Everything that completed before the halt
    pub report: RunReport,
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pipeline halted at {}: {}", self.step, self.error)
    }
}

impl std::error::Error for PipelineFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

fn fail(step: Step) -> impl FnOnce(Error) -> (Step, Error) {
    move |error| (step, error)
}

/// The pipeline itself: configuration plus a working directory for
/// generated state (terraform dir, build context, kubeconfig).
pub struct Pipeline<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    config: RunConfig,
    run_dir: PathBuf,
}

impl<'a, R: CommandRunner + ?Sized> Pipeline<'a, R> {
    /// Create a pipeline rooted at the given run directory
    pub fn new(runner: &'a R, config: RunConfig, run_dir: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            config,
            run_dir: run_dir.into(),
        }
    }

    /// Run every step in order, halting on the first failure.
    ///
    /// On failure the report inside the [`PipelineFailure`] carries every
    /// step that did complete.
    pub async fn run(&self) -> std::result::Result<RunReport, Box<PipelineFailure>> {
        let mut report = RunReport::default();
        match self.run_inner(&mut report).await {
            Ok(()) => {
                info!(steps = report.steps.len(), "Pipeline complete");
                Ok(report)
            }
            Err((step, err)) => {
                error!(step = %step, error = %err, "Pipeline halted");
                Err(Box::new(PipelineFailure {
                    step,
                    error: err,
                    report,
                }))
            }
        }
    }

    async fn run_inner(&self, report: &mut RunReport) -> std::result::Result<(), (Step, Error)> {
        let config = &self.config;

        let started = Instant::now();
        config.validate().map_err(fail(Step::Validate))?;
        report.record(Step::Validate, "configuration valid", started.elapsed());

        let provisioner = ProvisioningDriver::new(
            self.runner,
            self.run_dir.join("terraform"),
            config.timeouts.provision(),
        );
        let image = ImageDriver::new(
            self.runner,
            self.run_dir.join("build"),
            config.timeouts.build(),
        );
        let kubeconfig = self.run_dir.join("kubeconfig");
        let deployer = DeployDriver::new(
            self.runner,
            &kubeconfig,
            &config.namespace,
            config.timeouts.apply(),
            config.timeouts.readiness(),
        );

        let started = Instant::now();
        provisioner.ensure_tool().await.map_err(fail(Step::ToolCheck))?;
        ensure_tool(self.runner, "ssh", "Install an OpenSSH client")
            .await
            .map_err(fail(Step::ToolCheck))?;
        image.ensure_tool().await.map_err(fail(Step::ToolCheck))?;
        deployer.ensure_tool().await.map_err(fail(Step::ToolCheck))?;
        report.record(
            Step::ToolCheck,
            "terraform, ssh, docker, kubectl present",
            started.elapsed(),
        );

        let started = Instant::now();
        let renderer = Renderer::new()
            .map_err(Error::from)
            .map_err(fail(Step::Render))?;
        let public_key = tokio::fs::read_to_string(&config.ssh_public_key_path)
            .await
            .map_err(Error::from)
            .map_err(fail(Step::Render))?;
        let infra = renderer
            .infra_definition(config, public_key.trim())
            .map_err(Error::from)
            .map_err(fail(Step::Render))?;
        let dockerfile = renderer
            .dockerfile(config)
            .map_err(Error::from)
            .map_err(fail(Step::Render))?;
        let app_source = renderer
            .app_source(config)
            .map_err(Error::from)
            .map_err(fail(Step::Render))?;
        let manifests = renderer
            .manifests(config)
            .map_err(Error::from)
            .map_err(fail(Step::Render))?;
        report.record(Step::Render, "all artifacts rendered", started.elapsed());

        let started = Instant::now();
        let nodes = provisioner
            .apply(&infra)
            .await
            .map_err(fail(Step::Provision))?;
        report.nodes = nodes.clone();
        report.record(
            Step::Provision,
            format!("{} instances up", nodes.len()),
            started.elapsed(),
        );
        let control_plane = node_with_role(&nodes, NodeRole::ControlPlane)
            .map_err(fail(Step::Provision))?;
        let worker = node_with_role(&nodes, NodeRole::Worker).map_err(fail(Step::Provision))?;

        let bootstrap = BootstrapDriver::new(self.runner, config);

        let started = Instant::now();
        let join = bootstrap
            .bootstrap_control_plane(control_plane, DEFAULT_POD_NETWORK_CIDR)
            .await
            .map_err(fail(Step::BootstrapControlPlane))?;
        bootstrap
            .fetch_kubeconfig(control_plane, &kubeconfig)
            .await
            .map_err(fail(Step::BootstrapControlPlane))?;
        report.record(
            Step::BootstrapControlPlane,
            format!("control plane at {}", control_plane.public_ip),
            started.elapsed(),
        );

        let started = Instant::now();
        bootstrap
            .bootstrap_worker(worker, &join)
            .await
            .map_err(fail(Step::BootstrapWorker))?;
        report.record(
            Step::BootstrapWorker,
            format!("worker at {} joined", worker.public_ip),
            started.elapsed(),
        );

        let started = Instant::now();
        image
            .stage(&dockerfile, &app_source)
            .await
            .map_err(fail(Step::BuildImage))?;
        image
            .build(&config.image)
            .await
            .map_err(fail(Step::BuildImage))?;
        report.record(Step::BuildImage, &config.image, started.elapsed());

        let started = Instant::now();
        image
            .publish(&config.image)
            .await
            .map_err(fail(Step::PublishImage))?;
        report.record(Step::PublishImage, &config.image, started.elapsed());

        let started = Instant::now();
        deployer
            .deploy(&manifests)
            .await
            .map_err(fail(Step::Deploy))?;
        report.record(
            Step::Deploy,
            format!("workload live behind https://{}", config.domain),
            started.elapsed(),
        );
        Ok(())
    }
}

/// Find the provisioned node with the given role
fn node_with_role(nodes: &[ProvisionedNode], role: NodeRole) -> crate::Result<&ProvisionedNode> {
    nodes
        .iter()
        .find(|n| n.role == role)
        .ok_or_else(|| Error::provisioning(format!("no {} node in the provisioned set", role)))
}
