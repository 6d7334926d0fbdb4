//! Placeholder substitution engine
//!
//! Wraps minijinja with `${...}` placeholder syntax and strict undefined
//! behavior: a placeholder with no value is an error, never an empty string
//! propagated into a generated document.

use minijinja::syntax::SyntaxConfig;
use minijinja::{Environment, ErrorKind, UndefinedBehavior};
use thiserror::Error;

/// Errors raised while rendering an artifact
#[derive(Debug, Error)]
pub enum RenderError {
    /// A placeholder had no value in the render context
    #[error("undefined placeholder in {artifact}: {detail}")]
    Undefined {
        /// The artifact being rendered
        artifact: String,
        /// The engine's description of the missing value
        detail: String,
    },

    /// The template itself is malformed
    #[error("invalid template {artifact}: {detail}")]
    Template {
        /// The artifact being rendered
        artifact: String,
        /// The engine's description of the problem
        detail: String,
    },
}

/// Template engine with `${...}` placeholder syntax
pub struct TemplateEngine {
    env: Environment<'static>,
}

impl TemplateEngine {
    /// Create a new engine
    pub fn new() -> Result<Self, RenderError> {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);

        let syntax = SyntaxConfig::builder()
            .block_delimiters("{%", "%}")
            .variable_delimiters("${", "}")
            .comment_delimiters("{#", "#}")
            .build()
            .map_err(|e| RenderError::Template {
                artifact: "engine".to_string(),
                detail: e.to_string(),
            })?;
        env.set_syntax(syntax);

        Ok(Self { env })
    }

    /// Render one named template against a context
    pub fn render(
        &self,
        artifact: &str,
        template: &str,
        ctx: &minijinja::Value,
    ) -> Result<String, RenderError> {
        self.env.render_str(template, ctx).map_err(|e| {
            if e.kind() == ErrorKind::UndefinedError {
                RenderError::Undefined {
                    artifact: artifact.to_string(),
                    detail: e.to_string(),
                }
            } else {
                RenderError::Template {
                    artifact: artifact.to_string(),
                    detail: e.to_string(),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> TemplateEngine {
        TemplateEngine::new().unwrap()
    }

    #[test]
    fn substitutes_dollar_brace_placeholders() {
        let ctx = minijinja::context! { region => "us-phoenix-1" };
        let out = engine().render("test", "region = \"${region}\"", &ctx).unwrap();
        assert_eq!(out, "region = \"us-phoenix-1\"");
    }

    #[test]
    fn undefined_placeholder_is_an_error_not_empty_string() {
        let ctx = minijinja::context! {};
        let err = engine().render("infra", "${missing}", &ctx).unwrap_err();
        match err {
            RenderError::Undefined { artifact, .. } => assert_eq!(artifact, "infra"),
            other => panic!("Expected Undefined, got: {}", other),
        }
    }

    #[test]
    fn integers_render_without_decoration() {
        let ctx = minijinja::context! { port => 8080 };
        let out = engine().render("test", "port: ${port}", &ctx).unwrap();
        assert_eq!(out, "port: 8080");
    }

    #[test]
    fn text_without_placeholders_passes_through() {
        let ctx = minijinja::context! {};
        let raw = "plain text, no substitution";
        assert_eq!(engine().render("test", raw, &ctx).unwrap(), raw);
    }
}
