//! Run configuration parsing and validation
//!
//! The entire run is driven by one immutable [`RunConfig`] read from a YAML
//! file. Validation happens before any external tool is invoked: an absent,
//! empty, or still-placeholder value fails the run with a
//! [`Error::MissingConfiguration`] naming the field, instead of silently
//! embedding junk into generated artifacts.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::{Error, Result};

/// Placeholder values shipped in example configurations. A run with any of
/// these still in place is meaningless and must be rejected up front.
const PLACEHOLDER_VALUES: &[&str] = &[
    "your-domain.com",
    "you@example.com",
    "your-email@example.com",
    "ocid1.compartment.oc1..example",
    "ocid1.image.oc1..example",
    "ocid1.subnet.oc1..example",
    "your-tenancy",
    "changeme",
];

/// The immutable configuration for one pipeline run
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RunConfig {
    /// Cloud region, e.g. "us-phoenix-1"
    pub region: String,
    /// Compartment OCID the instances are created in
    pub compartment_ocid: String,
    /// Availability domain for both instances
    pub availability_domain: String,
    /// OS image OCID for the instances
    pub node_image_ocid: String,
    /// Subnet OCID the instance VNICs attach to
    pub subnet_ocid: String,
    /// Compute shape for both instances
    #[serde(default = "default_shape")]
    pub shape: String,
    /// Path to the SSH public key authorized on the instances
    pub ssh_public_key_path: PathBuf,
    /// Path to the matching private key used for bootstrap sessions
    pub ssh_private_key_path: PathBuf,
    /// Remote user for bootstrap sessions
    #[serde(default = "default_ssh_user")]
    pub ssh_user: String,
    /// Full registry coordinates of the image to build and deploy,
    /// e.g. "phx.ocir.io/tenancy/app:latest"
    pub image: String,
    /// Name used for the workload resources and generated service
    #[serde(default = "default_app_name")]
    pub app_name: String,
    /// DNS domain the ingress serves, with a TLS certificate for it
    pub domain: String,
    /// Contact email for the ACME account
    pub acme_email: String,
    /// Target cluster namespace for the workload
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Deadlines for every suspension point in the run
    #[serde(default)]
    pub timeouts: Timeouts,
}

fn default_shape() -> String {
    "VM.Standard.E4.Flex".to_string()
}

fn default_ssh_user() -> String {
    "ubuntu".to_string()
}

fn default_app_name() -> String {
    "web-service".to_string()
}

fn default_namespace() -> String {
    "default".to_string()
}

/// Explicit deadlines for every wait in the pipeline, in seconds.
///
/// The original flow blocked forever on each external tool; every suspension
/// point here carries a bound instead.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct Timeouts {
    /// Terraform init/apply deadline
    pub provision_secs: u64,
    /// Deadline per remote bootstrap phase
    pub bootstrap_step_secs: u64,
    /// Image build and push deadline
    pub build_secs: u64,
    /// Deadline for each controller readiness wait
    pub readiness_secs: u64,
    /// Deadline for each manifest apply
    pub apply_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            provision_secs: 900,
            bootstrap_step_secs: 600,
            build_secs: 900,
            readiness_secs: 300,
            apply_secs: 120,
        }
    }
}

impl Timeouts {
    /// Terraform init/apply deadline
    pub fn provision(&self) -> Duration {
        Duration::from_secs(self.provision_secs)
    }

    /// Deadline per remote bootstrap phase
    pub fn bootstrap_step(&self) -> Duration {
        Duration::from_secs(self.bootstrap_step_secs)
    }

    /// Image build and push deadline
    pub fn build(&self) -> Duration {
        Duration::from_secs(self.build_secs)
    }

    /// Deadline for each controller readiness wait
    pub fn readiness(&self) -> Duration {
        Duration::from_secs(self.readiness_secs)
    }

    /// Deadline for each manifest apply
    pub fn apply(&self) -> Duration {
        Duration::from_secs(self.apply_secs)
    }
}

impl RunConfig {
    /// Parse a configuration from YAML content
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::serialization(format!("failed to parse run configuration: {}", e)))
    }

    /// Validate that every required field carries a real value.
    ///
    /// Must be called before any external tool runs.
    pub fn validate(&self) -> Result<()> {
        require("region", &self.region)?;
        require("compartmentOcid", &self.compartment_ocid)?;
        require("availabilityDomain", &self.availability_domain)?;
        require("nodeImageOcid", &self.node_image_ocid)?;
        require("subnetOcid", &self.subnet_ocid)?;
        require("shape", &self.shape)?;
        require("sshUser", &self.ssh_user)?;
        require("image", &self.image)?;
        require("appName", &self.app_name)?;
        require("domain", &self.domain)?;
        require("acmeEmail", &self.acme_email)?;
        require("namespace", &self.namespace)?;

        if !self.acme_email.contains('@') {
            return Err(Error::missing_configuration(
                "acmeEmail",
                format!("{:?} is not an email address", self.acme_email),
            ));
        }
        if !self.domain.contains('.') || self.domain.contains(' ') {
            return Err(Error::missing_configuration(
                "domain",
                format!("{:?} is not a DNS name", self.domain),
            ));
        }
        if self.ssh_public_key_path.as_os_str().is_empty() {
            return Err(Error::missing_configuration(
                "sshPublicKeyPath",
                "value is empty",
            ));
        }
        if self.ssh_private_key_path.as_os_str().is_empty() {
            return Err(Error::missing_configuration(
                "sshPrivateKeyPath",
                "value is empty",
            ));
        }

        Ok(())
    }
}

/// Reject empty and placeholder values for one field
fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::missing_configuration(field, "value is empty"));
    }
    let lowered = value.trim().to_ascii_lowercase();
    if PLACEHOLDER_VALUES.iter().any(|p| lowered == *p) {
        return Err(Error::missing_configuration(
            field,
            format!("placeholder value {:?} must be replaced", value),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_yaml() -> String {
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
"#
        .to_string()
    }

    // ==========================================================================
    // Story: Parsing and Defaults
    // ==========================================================================

    #[test]
    fn parses_minimal_config_with_defaults() {
        let cfg = RunConfig::from_yaml(&sample_yaml()).unwrap();

        assert_eq!(cfg.region, "us-phoenix-1");
        assert_eq!(cfg.shape, "VM.Standard.E4.Flex");
        assert_eq!(cfg.ssh_user, "ubuntu");
        assert_eq!(cfg.app_name, "web-service");
        assert_eq!(cfg.namespace, "default");
        assert_eq!(cfg.timeouts.readiness(), Duration::from_secs(300));
    }

    #[test]
    fn rejects_unknown_fields() {
        let yaml = format!("{}\nunknownKnob: true\n", sample_yaml());
        assert!(RunConfig::from_yaml(&yaml).is_err());
    }

    #[test]
    fn timeouts_can_be_overridden() {
        let yaml = format!("{}timeouts:\n  readinessSecs: 30\n", sample_yaml());
        let cfg = RunConfig::from_yaml(&yaml).unwrap();

        assert_eq!(cfg.timeouts.readiness(), Duration::from_secs(30));
        // The rest keep their defaults
        assert_eq!(cfg.timeouts.provision(), Duration::from_secs(900));
    }

    // ==========================================================================
    // Story: Placeholder Validation
    //
    // A run against placeholder values is meaningless. Validation has to
    // fire before any external tool is touched, naming the field.
    // ==========================================================================

    #[test]
    fn valid_config_passes_validation() {
        let cfg = RunConfig::from_yaml(&sample_yaml()).unwrap();
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn placeholder_domain_is_rejected() {
        let mut cfg = RunConfig::from_yaml(&sample_yaml()).unwrap();
        cfg.domain = "your-domain.com".to_string();

        let err = cfg.validate().unwrap_err();
        match err {
            Error::MissingConfiguration { field, reason } => {
                assert_eq!(field, "domain");
                assert!(reason.contains("your-domain.com"));
            }
            other => panic!("Expected MissingConfiguration, got: {}", other),
        }
    }

    #[test]
    fn placeholder_detection_is_case_insensitive() {
        let mut cfg = RunConfig::from_yaml(&sample_yaml()).unwrap();
        cfg.acme_email = "You@Example.Com".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn empty_required_value_is_rejected() {
        let mut cfg = RunConfig::from_yaml(&sample_yaml()).unwrap();
        cfg.compartment_ocid = "  ".to_string();

        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("compartmentOcid"));
    }

    #[test]
    fn email_without_at_sign_is_rejected() {
        let mut cfg = RunConfig::from_yaml(&sample_yaml()).unwrap();
        cfg.acme_email = "not-an-email".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn bare_hostname_is_not_a_domain() {
        let mut cfg = RunConfig::from_yaml(&sample_yaml()).unwrap();
        cfg.domain = "localhost".to_string();
        assert!(cfg.validate().is_err());
    }
}
