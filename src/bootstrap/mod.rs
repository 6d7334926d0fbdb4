//! Remote Bootstrap Driver
//!
//! Walks each provisioned node through a fixed sequence over SSH: container
//! runtime install, cluster tooling install, then the role-specific step.
//! Progress is modeled as an explicit per-node state machine, terminal on
//! first failure:
//!
//! ```text
//! pending -> runtime-installed -> tools-installed
//!         -> cluster-initialized | cluster-joined -> done
//! ```
//!
//! The ordering contract: the control plane must reach `cluster-initialized`
//! and publish its join command before any worker is asked to join. That
//! dependency is expressed in the types - [`bootstrap_worker`] requires a
//! [`JoinCommand`], which only [`bootstrap_control_plane`] produces.
//!
//! [`bootstrap_worker`]: BootstrapDriver::bootstrap_worker
//! [`bootstrap_control_plane`]: BootstrapDriver::bootstrap_control_plane

mod scripts;

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::config::RunConfig;
use crate::provision::{NodeRole, ProvisionedNode};
use crate::runner::{CommandRunner, CommandSpec};
use crate::{Error, Result};

/// Per-node bootstrap progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodePhase {
    /// Nothing has run on the node yet
    Pending,
    /// Container runtime is installed and configured
    RuntimeInstalled,
    /// kubeadm, kubelet, and kubectl are installed
    ToolsInstalled,
    /// Control plane only: `kubeadm init` completed
    ClusterInitialized,
    /// Worker only: `kubeadm join` completed
    ClusterJoined,
    /// All phases for this node finished
    Done,
}

impl fmt::Display for NodePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::RuntimeInstalled => "runtime-installed",
            Self::ToolsInstalled => "tools-installed",
            Self::ClusterInitialized => "cluster-initialized",
            Self::ClusterJoined => "cluster-joined",
            Self::Done => "done",
        };
        write!(f, "{}", name)
    }
}

/// Tracks one node through the fixed bootstrap sequence
#[derive(Debug, Clone)]
pub struct NodeState {
    /// The node being bootstrapped
    pub node: ProvisionedNode,
    /// Last phase the node completed
    pub phase: NodePhase,
}

impl NodeState {
    /// Start tracking a node at `pending`
    pub fn new(node: ProvisionedNode) -> Self {
        Self {
            node,
            phase: NodePhase::Pending,
        }
    }

    fn advance(&mut self, to: NodePhase) {
        debug!(node = %self.node.public_ip, from = %self.phase, to = %to, "Bootstrap phase complete");
        self.phase = to;
    }
}

/// The join credential published by an initialized control plane.
///
/// Workers can only be bootstrapped with one of these in hand, which makes
/// the init-before-join ordering a type-level precondition instead of a
/// race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinCommand(String);

impl JoinCommand {
    /// Wrap an already-validated join command
    pub fn new(command: impl Into<String>) -> Self {
        Self(command.into())
    }

    /// The full `kubeadm join ...` command line
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Driver that bootstraps provisioned nodes over SSH
pub struct BootstrapDriver<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
    ssh_user: String,
    ssh_key: PathBuf,
    step_timeout: Duration,
}

impl<'a, R: CommandRunner + ?Sized> BootstrapDriver<'a, R> {
    /// Create a driver from the run configuration
    pub fn new(runner: &'a R, config: &RunConfig) -> Self {
        Self {
            runner,
            ssh_user: config.ssh_user.clone(),
            ssh_key: config.ssh_private_key_path.clone(),
            step_timeout: config.timeouts.bootstrap_step(),
        }
    }

    /// Bootstrap the control plane node and return the worker join command.
    ///
    /// Phases: runtime install, tools install, `kubeadm init` with the pod
    /// network range, pod network add-on, then join-command extraction.
    pub async fn bootstrap_control_plane(
        &self,
        node: &ProvisionedNode,
        pod_network_cidr: &str,
    ) -> Result<JoinCommand> {
        if node.role != NodeRole::ControlPlane {
            return Err(Error::remote_bootstrap(
                &node.public_ip,
                "cluster-init",
                format!("expected a control-plane node, got role {}", node.role),
            ));
        }

        info!(node = %node.public_ip, "Bootstrapping control plane");
        let mut state = NodeState::new(node.clone());

        self.run_phase(&state, "runtime-install", scripts::RUNTIME_INSTALL)
            .await?;
        state.advance(NodePhase::RuntimeInstalled);

        self.run_phase(&state, "tools-install", &scripts::tools_install())
            .await?;
        state.advance(NodePhase::ToolsInstalled);

        self.run_phase(
            &state,
            "cluster-init",
            &scripts::control_plane_init(pod_network_cidr),
        )
        .await?;
        state.advance(NodePhase::ClusterInitialized);

        // The cluster is not schedulable until a pod network exists
        self.run_phase(&state, "pod-network", &scripts::pod_network_install())
            .await?;

        let output = self
            .capture_phase(&state, "join-token", scripts::PRINT_JOIN_COMMAND)
            .await?;
        let join = output.trim();
        if !join.contains("kubeadm join") {
            return Err(Error::remote_bootstrap(
                &node.public_ip,
                "join-token",
                format!("unexpected join command output: {:?}", join),
            ));
        }
        state.advance(NodePhase::Done);

        info!(node = %node.public_ip, "Control plane initialized, join command published");
        Ok(JoinCommand::new(join))
    }

    /// Bootstrap a worker node using the published join command.
    ///
    /// Phases: runtime install, tools install, `kubeadm join`.
    pub async fn bootstrap_worker(
        &self,
        node: &ProvisionedNode,
        join: &JoinCommand,
    ) -> Result<()> {
        if node.role != NodeRole::Worker {
            return Err(Error::remote_bootstrap(
                &node.public_ip,
                "cluster-join",
                format!("expected a worker node, got role {}", node.role),
            ));
        }

        info!(node = %node.public_ip, "Bootstrapping worker");
        let mut state = NodeState::new(node.clone());

        self.run_phase(&state, "runtime-install", scripts::RUNTIME_INSTALL)
            .await?;
        state.advance(NodePhase::RuntimeInstalled);

        self.run_phase(&state, "tools-install", &scripts::tools_install())
            .await?;
        state.advance(NodePhase::ToolsInstalled);

        self.run_phase(&state, "cluster-join", &scripts::worker_join(join.as_str()))
            .await?;
        state.advance(NodePhase::ClusterJoined);
        state.advance(NodePhase::Done);

        info!(node = %node.public_ip, "Worker joined the cluster");
        Ok(())
    }

    /// Copy the cluster admin kubeconfig locally so the deploy driver can
    /// reach the cluster, rewriting the server address to the control
    /// plane's public IP.
    pub async fn fetch_kubeconfig(
        &self,
        node: &ProvisionedNode,
        dest: &Path,
    ) -> Result<PathBuf> {
        let state = NodeState::new(node.clone());
        let raw = self
            .capture_phase(&state, "fetch-kubeconfig", scripts::READ_ADMIN_KUBECONFIG)
            .await?;
        let rewritten = rewrite_server_address(&raw, &node.public_ip);

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, rewritten).await?;
        info!(path = %dest.display(), "Cluster kubeconfig saved");
        Ok(dest.to_path_buf())
    }

    fn ssh_spec(&self, node: &ProvisionedNode, script: &str) -> CommandSpec {
        CommandSpec::new("ssh")
            .arg("-i")
            .arg(self.ssh_key.display().to_string())
            .arg("-o")
            .arg("StrictHostKeyChecking=no")
            .arg("-o")
            .arg("UserKnownHostsFile=/dev/null")
            .arg("-o")
            .arg("BatchMode=yes")
            .arg(format!("{}@{}", self.ssh_user, node.public_ip))
            .arg("bash -s")
            .stdin(script)
            .timeout(self.step_timeout)
    }

    async fn run_phase(&self, state: &NodeState, phase: &str, script: &str) -> Result<()> {
        self.capture_phase(state, phase, script).await.map(|_| ())
    }

    async fn capture_phase(&self, state: &NodeState, phase: &str, script: &str) -> Result<String> {
        info!(node = %state.node.public_ip, phase, "Running bootstrap phase");
        let output = self
            .runner
            .run(&self.ssh_spec(&state.node, script))
            .await?;

        if !output.success {
            return Err(Error::RemoteBootstrap {
                node: state.node.public_ip.clone(),
                phase: phase.to_string(),
                message: output.error_output(),
            });
        }
        Ok(output.stdout)
    }
}

/// Rewrite the kubeconfig server line to point at the given public address.
///
/// kubeadm writes the node's private address into admin.conf; that address
/// is not reachable from where this tool runs.
fn rewrite_server_address(kubeconfig: &str, public_ip: &str) -> String {
    kubeconfig
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if trimmed.starts_with("server: https://") {
                let indent = &line[..line.len() - trimmed.len()];
                format!("{}server: https://{}:6443", indent, public_ip)
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::{CommandOutput, MockCommandRunner};
    use mockall::Sequence;

    fn sample_config() -> RunConfig {
        RunConfig::from_yaml(
            r#"region: us-phoenix-1
compartmentOcid: ocid1.compartment.oc1..aaaa
availabilityDomain: "Uocm:PHX-AD-1"
nodeImageOcid: ocid1.image.oc1..bbbb
subnetOcid: ocid1.subnet.oc1..cccc
sshPublicKeyPath: /home/op/.ssh/id_ed25519.pub
sshPrivateKeyPath: /home/op/.ssh/id_ed25519
image: phx.ocir.io/tenancy/web-service:latest
domain: example.org
acmeEmail: ops@example.org
"#,
        )
        .unwrap()
    }

    fn control_plane() -> ProvisionedNode {
        ProvisionedNode {
            role: NodeRole::ControlPlane,
            public_ip: "203.0.113.10".to_string(),
        }
    }

    fn worker() -> ProvisionedNode {
        ProvisionedNode {
            role: NodeRole::Worker,
            public_ip: "203.0.113.11".to_string(),
        }
    }

    const JOIN_OUTPUT: &str =
        "kubeadm join 203.0.113.10:6443 --token abc.def --discovery-token-ca-cert-hash sha256:123\n";

    fn stdin_contains(spec: &crate::runner::CommandSpec, needle: &str) -> bool {
        spec.stdin.as_deref().is_some_and(|s| s.contains(needle))
    }

    // ==========================================================================
    // Story: Control Plane Phase Ordering
    //
    // runtime -> tools -> init -> pod network -> join token, all over SSH
    // to the control plane address.
    // ==========================================================================

    #[tokio::test]
    async fn control_plane_runs_phases_in_order_and_publishes_join() {
        let mut runner = MockCommandRunner::new();
        let mut seq = Sequence::new();

        for needle in ["containerd", "kubeadm kubectl", "kubeadm init", "flannel"] {
            runner
                .expect_run()
                .withf(move |spec| {
                    spec.program == "ssh"
                        && spec.args.iter().any(|a| a.contains("203.0.113.10"))
                        && stdin_contains(spec, needle)
                })
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(CommandOutput::ok("")));
        }
        runner
            .expect_run()
            .withf(|spec| stdin_contains(spec, "token create"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(CommandOutput::ok(JOIN_OUTPUT)));

        let config = sample_config();
        let driver = BootstrapDriver::new(&runner, &config);
        let join = driver
            .bootstrap_control_plane(&control_plane(), "10.244.0.0/16")
            .await
            .unwrap();

        assert!(join.as_str().starts_with("kubeadm join 203.0.113.10:6443"));
    }

    #[tokio::test]
    async fn garbage_join_output_is_rejected() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|spec| stdin_contains(spec, "token create"))
            .returning(|_| Ok(CommandOutput::ok("permission denied")));
        runner
            .expect_run()
            .withf(|spec| !stdin_contains(spec, "token create"))
            .returning(|_| Ok(CommandOutput::ok("")));

        let config = sample_config();
        let driver = BootstrapDriver::new(&runner, &config);
        let err = driver
            .bootstrap_control_plane(&control_plane(), "10.244.0.0/16")
            .await
            .unwrap_err();

        match err {
            Error::RemoteBootstrap { phase, .. } => assert_eq!(phase, "join-token"),
            other => panic!("Expected RemoteBootstrap, got: {}", other),
        }
    }

    // ==========================================================================
    // Story: Worker Join Is Gated
    // ==========================================================================

    #[tokio::test]
    async fn worker_join_uses_the_published_command() {
        let mut runner = MockCommandRunner::new();
        let mut seq = Sequence::new();

        for needle in ["containerd", "kubeadm kubectl"] {
            runner
                .expect_run()
                .withf(move |spec| stdin_contains(spec, needle))
                .times(1)
                .in_sequence(&mut seq)
                .returning(|_| Ok(CommandOutput::ok("")));
        }
        runner
            .expect_run()
            .withf(|spec| {
                spec.args.iter().any(|a| a.contains("203.0.113.11"))
                    && stdin_contains(spec, "sudo kubeadm join 203.0.113.10:6443")
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(CommandOutput::ok("")));

        let config = sample_config();
        let driver = BootstrapDriver::new(&runner, &config);
        let join = JoinCommand::new("kubeadm join 203.0.113.10:6443 --token abc.def");
        driver.bootstrap_worker(&worker(), &join).await.unwrap();
    }

    #[tokio::test]
    async fn role_mismatch_is_rejected_before_any_session() {
        let runner = MockCommandRunner::new(); // no expectations: no calls allowed
        let config = sample_config();
        let driver = BootstrapDriver::new(&runner, &config);

        let join = JoinCommand::new("kubeadm join 203.0.113.10:6443");
        let err = driver
            .bootstrap_worker(&control_plane(), &join)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RemoteBootstrap { .. }));
    }

    // ==========================================================================
    // Story: Failure Is Terminal and Locates the Phase
    // ==========================================================================

    #[tokio::test]
    async fn phase_failure_stops_the_sequence() {
        let mut runner = MockCommandRunner::new();
        // Only the first phase runs; its failure must prevent the rest.
        runner
            .expect_run()
            .times(1)
            .returning(|_| Ok(CommandOutput::failed("apt-get: could not resolve archive host")));

        let config = sample_config();
        let driver = BootstrapDriver::new(&runner, &config);
        let err = driver
            .bootstrap_control_plane(&control_plane(), "10.244.0.0/16")
            .await
            .unwrap_err();

        match err {
            Error::RemoteBootstrap { node, phase, message } => {
                assert_eq!(node, "203.0.113.10");
                assert_eq!(phase, "runtime-install");
                assert!(message.contains("could not resolve"));
            }
            other => panic!("Expected RemoteBootstrap, got: {}", other),
        }
    }

    // ==========================================================================
    // Story: Kubeconfig Rewrite
    // ==========================================================================

    #[test]
    fn server_address_is_rewritten_to_public_ip() {
        let kubeconfig = "apiVersion: v1\nclusters:\n- cluster:\n    server: https://10.0.0.5:6443\n    name: kubernetes\n";
        let rewritten = rewrite_server_address(kubeconfig, "203.0.113.10");

        assert!(rewritten.contains("    server: https://203.0.113.10:6443"));
        assert!(!rewritten.contains("10.0.0.5"));
        // Everything else untouched
        assert!(rewritten.contains("name: kubernetes"));
    }

    #[tokio::test]
    async fn fetch_kubeconfig_writes_the_rewritten_file() {
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|spec| stdin_contains(spec, "admin.conf"))
            .returning(|_| {
                Ok(CommandOutput::ok(
                    "clusters:\n- cluster:\n    server: https://10.0.0.5:6443\n",
                ))
            });

        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("kubeconfig");
        let config = sample_config();
        let driver = BootstrapDriver::new(&runner, &config);
        driver
            .fetch_kubeconfig(&control_plane(), &dest)
            .await
            .unwrap();

        let written = std::fs::read_to_string(&dest).unwrap();
        assert!(written.contains("server: https://203.0.113.10:6443"));
    }

    // ==========================================================================
    // Story: State Machine Shape
    // ==========================================================================

    #[test]
    fn node_state_starts_pending() {
        let state = NodeState::new(worker());
        assert_eq!(state.phase, NodePhase::Pending);
    }

    #[test]
    fn phase_names_match_the_documented_machine() {
        assert_eq!(NodePhase::Pending.to_string(), "pending");
        assert_eq!(NodePhase::RuntimeInstalled.to_string(), "runtime-installed");
        assert_eq!(NodePhase::ToolsInstalled.to_string(), "tools-installed");
        assert_eq!(NodePhase::ClusterInitialized.to_string(), "cluster-initialized");
        assert_eq!(NodePhase::ClusterJoined.to_string(), "cluster-joined");
        assert_eq!(NodePhase::Done.to_string(), "done");
    }
}
