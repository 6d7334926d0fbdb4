//! kubeseed - sequential provisioning pipeline for a two-node Kubernetes cluster
//!
//! kubeseed drives external tools through a fixed pipeline: it provisions two
//! cloud compute instances with Terraform, bootstraps a kubeadm cluster on
//! them over SSH, builds and pushes a container image with Docker, and
//! deploys the workload behind a TLS-terminating ingress with kubectl.
//!
//! The tool owns ordering, validation, timeouts, and error propagation.
//! Everything else is delegated: Terraform owns resource reconciliation,
//! kubeadm owns the bootstrap protocol, Docker owns the image build,
//! cert-manager owns ACME issuance, and ingress-nginx owns routing.
//!
//! # Modules
//!
//! - [`config`] - Run configuration parsing and placeholder validation
//! - [`render`] - Deterministic template rendering for all generated artifacts
//! - [`runner`] - External tool execution boundary
//! - [`provision`] - Terraform apply and node address extraction
//! - [`bootstrap`] - Per-node SSH bootstrap with an explicit init/join gate
//! - [`image`] - Container image build and push
//! - [`deploy`] - Ordered manifest application with readiness waits
//! - [`pipeline`] - The sequential run itself
//! - [`error`] - Error taxonomy for every fatal condition

#![deny(missing_docs)]

pub mod bootstrap;
pub mod config;
pub mod deploy;
pub mod error;
pub mod image;
pub mod pipeline;
pub mod provision;
pub mod render;
pub mod runner;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Pod network range handed to `kubeadm init` and expected by the CNI add-on
pub const DEFAULT_POD_NETWORK_CIDR: &str = "10.244.0.0/16";

/// Port the generated service listens on inside its container
pub const DEFAULT_SERVICE_PORT: u16 = 8080;
