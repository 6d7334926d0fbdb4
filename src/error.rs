//! Error types for the kubeseed pipeline
//!
//! Every fatal condition a run can hit maps to exactly one variant, so a
//! failure report can say which kind of thing went wrong without parsing
//! tool output. The pipeline never continues past any of these.

use std::time::Duration;

use thiserror::Error;

use crate::render::RenderError;

/// Main error type for kubeseed operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A required external tool is not installed
    #[error("required tool not found: {tool} - {hint}")]
    ToolMissing {
        /// The tool that was not found
        tool: String,
        /// Hint for how to install it
        hint: String,
    },

    /// A configuration field is absent, empty, or still a placeholder
    #[error("missing configuration: {field} - {reason}")]
    MissingConfiguration {
        /// The offending field
        field: String,
        /// Why the value was rejected
        reason: String,
    },

    /// Infrastructure provisioning failed; carries the tool output verbatim
    #[error("provisioning failed: {0}")]
    Provisioning(String),

    /// A bootstrap phase failed on one node; terminal for the run
    #[error("remote bootstrap failed on {node} during {phase}: {message}")]
    RemoteBootstrap {
        /// Public address of the node
        node: String,
        /// The bootstrap phase that was being attempted
        phase: String,
        /// The remote error output
        message: String,
    },

    /// Container image build failed
    #[error("image build failed: {0}")]
    Build(String),

    /// Container image push failed
    #[error("image push failed: {0}")]
    Publish(String),

    /// The cluster API rejected a manifest
    #[error("cluster API rejected {manifest}: {message}")]
    ApplyRejected {
        /// Which manifest was being applied
        manifest: String,
        /// The rejection message from the cluster API
        message: String,
    },

    /// A readiness wait expired; distinct from a rejected apply
    #[error("readiness wait for {what} timed out after {timeout:?}: {message}")]
    ReadinessTimeout {
        /// The component that never became ready
        what: String,
        /// The wait deadline
        timeout: Duration,
        /// The wait tool's output
        message: String,
    },

    /// An external command ran past its deadline
    #[error("command timed out after {timeout:?}: {command}")]
    CommandTimeout {
        /// The command line that was running
        command: String,
        /// The deadline it exceeded
        timeout: Duration,
    },

    /// Template rendering error
    #[error("template rendering failed: {0}")]
    Render(#[from] RenderError),

    /// I/O error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create a ToolMissing error
    pub fn tool_missing(tool: impl Into<String>, hint: impl Into<String>) -> Self {
        Self::ToolMissing {
            tool: tool.into(),
            hint: hint.into(),
        }
    }

    /// Create a MissingConfiguration error
    pub fn missing_configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MissingConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a Provisioning error
    pub fn provisioning(msg: impl Into<String>) -> Self {
        Self::Provisioning(msg.into())
    }

    /// Create a RemoteBootstrap error
    pub fn remote_bootstrap(
        node: impl Into<String>,
        phase: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::RemoteBootstrap {
            node: node.into(),
            phase: phase.into(),
            message: message.into(),
        }
    }

    /// Create an ApplyRejected error
    pub fn apply_rejected(manifest: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ApplyRejected {
            manifest: manifest.into(),
            message: message.into(),
        }
    }

    /// Create a ReadinessTimeout error
    pub fn readiness_timeout(
        what: impl Into<String>,
        timeout: Duration,
        message: impl Into<String>,
    ) -> Self {
        Self::ReadinessTimeout {
            what: what.into(),
            timeout,
            message: message.into(),
        }
    }

    /// Create a Serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // Story Tests: Error Propagation Through the Pipeline
    // ==========================================================================
    //
    // Each variant represents a different failure category with its own
    // diagnosis path. These tests pin down the user-visible messages and the
    // distinctions the pipeline relies on.

    /// Story: validation blocks a run before any tool is invoked
    ///
    /// A placeholder domain must be caught up front with a message that names
    /// the field, not discovered later inside a generated artifact.
    #[test]
    fn story_missing_configuration_names_the_field() {
        let err = Error::missing_configuration("domain", "placeholder value \"your-domain.com\"");
        assert!(err.to_string().contains("missing configuration"));
        assert!(err.to_string().contains("domain"));
        assert!(err.to_string().contains("your-domain.com"));

        match Error::missing_configuration("acme_email", "value is empty") {
            Error::MissingConfiguration { field, .. } => assert_eq!(field, "acme_email"),
            _ => panic!("Expected MissingConfiguration variant"),
        }
    }

    /// Story: provisioning failures surface the provisioner's own words
    ///
    /// Quota and auth errors come from Terraform; the run must pass them
    /// through verbatim so the operator can act on them.
    #[test]
    fn story_provisioning_errors_are_verbatim() {
        let err = Error::provisioning(
            "terraform apply failed: Error: 429-TooManyRequests, shape limit exceeded",
        );
        assert!(err.to_string().contains("provisioning failed"));
        assert!(err.to_string().contains("429-TooManyRequests"));
    }

    /// Story: bootstrap failures say which node and which phase
    #[test]
    fn story_remote_bootstrap_failures_locate_the_node_and_phase() {
        let err = Error::remote_bootstrap(
            "203.0.113.10",
            "cluster-init",
            "kubeadm init exited with status 1",
        );
        assert!(err.to_string().contains("203.0.113.10"));
        assert!(err.to_string().contains("cluster-init"));

        match err {
            Error::RemoteBootstrap { node, phase, .. } => {
                assert_eq!(node, "203.0.113.10");
                assert_eq!(phase, "cluster-init");
            }
            _ => panic!("Expected RemoteBootstrap variant"),
        }
    }

    /// Story: a readiness timeout is not an apply rejection
    ///
    /// A malformed manifest and a controller that never comes up need
    /// different fixes; the two conditions must stay distinguishable.
    #[test]
    fn story_readiness_timeout_distinct_from_apply_rejected() {
        let timeout = Error::readiness_timeout(
            "cert-manager",
            Duration::from_secs(300),
            "timed out waiting for the condition",
        );
        let rejected = Error::apply_rejected("ingress", "spec.rules[0].host: Invalid value");

        assert!(timeout.to_string().contains("readiness wait"));
        assert!(rejected.to_string().contains("rejected"));
        assert!(matches!(timeout, Error::ReadinessTimeout { .. }));
        assert!(matches!(rejected, Error::ApplyRejected { .. }));
    }

    /// Story: a missing tool comes with an install hint
    #[test]
    fn story_tool_missing_carries_install_hint() {
        let err = Error::tool_missing(
            "terraform",
            "Install Terraform: https://developer.hashicorp.com/terraform/install",
        );
        assert!(err.to_string().contains("terraform"));
        assert!(err.to_string().contains("Install Terraform"));
    }

    /// Story: build and push failures are separate conditions
    #[test]
    fn story_build_and_publish_are_distinct() {
        let build = Error::Build("COPY failed: no source files".to_string());
        let publish = Error::Publish("denied: requested access to the resource is denied".into());

        assert!(build.to_string().contains("build failed"));
        assert!(publish.to_string().contains("push failed"));
    }

    /// Story: error constructors accept both String and &str
    #[test]
    fn story_error_construction_ergonomics() {
        let node = "10.0.0.7";
        let err = Error::remote_bootstrap(node, "cluster-join", format!("join on {} failed", node));
        assert!(err.to_string().contains("10.0.0.7"));

        let err = Error::provisioning("static message");
        assert!(err.to_string().contains("static message"));
    }
}
