//! Template Renderer
//!
//! Renders every generated artifact - the Terraform definition, the
//! Dockerfile, the service source stub, and the cluster manifests - as a
//! deterministic pure function of the run configuration. The same
//! configuration always yields byte-identical artifacts.
//!
//! Templates live as external data files under `templates/`, embedded at
//! compile time, with named `${...}` placeholders. Substitution is strict:
//! a missing value fails the render instead of leaving a hole.

mod engine;

pub use engine::{RenderError, TemplateEngine};

use crate::config::RunConfig;
use crate::DEFAULT_SERVICE_PORT;

const INFRA_TEMPLATE: &str = include_str!("../../templates/infra.tf.tmpl");
const DOCKERFILE_TEMPLATE: &str = include_str!("../../templates/Dockerfile.tmpl");
const APP_SOURCE_TEMPLATE: &str = include_str!("../../templates/app.py.tmpl");
const DEPLOYMENT_TEMPLATE: &str = include_str!("../../templates/deployment.yaml.tmpl");
const SERVICE_TEMPLATE: &str = include_str!("../../templates/service.yaml.tmpl");
const ISSUER_TEMPLATE: &str = include_str!("../../templates/issuer.yaml.tmpl");
const CERTIFICATE_TEMPLATE: &str = include_str!("../../templates/certificate.yaml.tmpl");
const INGRESS_TEMPLATE: &str = include_str!("../../templates/ingress.yaml.tmpl");

/// The rendered cluster manifests, one document per resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Manifests {
    /// Workload Deployment (2 replicas, one container, one port)
    pub deployment: String,
    /// ClusterIP Service in front of the workload
    pub service: String,
    /// ACME Issuer using the HTTP-01 solver via the nginx ingress class
    pub issuer: String,
    /// Certificate for the configured domain, stored in `tls-secret`
    pub certificate: String,
    /// Ingress with the TLS host rule and path-prefix route
    pub ingress: String,
}

/// Renderer for all generated artifacts
pub struct Renderer {
    engine: TemplateEngine,
}

impl Renderer {
    /// Create a new renderer
    pub fn new() -> Result<Self, RenderError> {
        Ok(Self {
            engine: TemplateEngine::new()?,
        })
    }

    /// Shared render context derived from the configuration
    fn context(config: &RunConfig) -> minijinja::Value {
        minijinja::context! {
            region => config.region,
            compartment_ocid => config.compartment_ocid,
            availability_domain => config.availability_domain,
            node_image_ocid => config.node_image_ocid,
            subnet_ocid => config.subnet_ocid,
            shape => config.shape,
            image => config.image,
            app_name => config.app_name,
            domain => config.domain,
            acme_email => config.acme_email,
            namespace => config.namespace,
            service_port => DEFAULT_SERVICE_PORT,
        }
    }

    /// Render the Terraform definition declaring both compute instances and
    /// their public-address outputs.
    ///
    /// The authorized key content is passed in separately so rendering stays
    /// a pure function of its inputs.
    pub fn infra_definition(
        &self,
        config: &RunConfig,
        ssh_authorized_key: &str,
    ) -> Result<String, RenderError> {
        let ctx = minijinja::context! {
            ssh_authorized_key => ssh_authorized_key,
            ..Self::context(config)
        };
        self.engine.render("infra.tf", INFRA_TEMPLATE, &ctx)
    }

    /// Render the single-stage container build file
    pub fn dockerfile(&self, config: &RunConfig) -> Result<String, RenderError> {
        self.engine
            .render("Dockerfile", DOCKERFILE_TEMPLATE, &Self::context(config))
    }

    /// Render the minimal network service source stub
    pub fn app_source(&self, config: &RunConfig) -> Result<String, RenderError> {
        self.engine
            .render("app.py", APP_SOURCE_TEMPLATE, &Self::context(config))
    }

    /// Render all cluster manifests
    pub fn manifests(&self, config: &RunConfig) -> Result<Manifests, RenderError> {
        let ctx = Self::context(config);
        Ok(Manifests {
            deployment: self.engine.render("deployment.yaml", DEPLOYMENT_TEMPLATE, &ctx)?,
            service: self.engine.render("service.yaml", SERVICE_TEMPLATE, &ctx)?,
            issuer: self.engine.render("issuer.yaml", ISSUER_TEMPLATE, &ctx)?,
            certificate: self
                .engine
                .render("certificate.yaml", CERTIFICATE_TEMPLATE, &ctx)?,
            ingress: self.engine.render("ingress.yaml", INGRESS_TEMPLATE, &ctx)?,
        })
    }
}
