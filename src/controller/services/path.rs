use super::template::{self, TemplateError};
use super::validation::{check_request_path, RequestPathProblem};
use crate::config::IngressConfig;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("error rendering the path template: {0}")]
    Template(#[from] TemplateError),

    #[error("invalid path template {path:?}: {reason}")]
    InvalidPathTemplate { path: String, reason: String },
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct PathTemplateValues<'a> {
    name: &'a str,
    namespace: &'a str,
}

/// Renders the URL path used for path-based routing
pub trait PathService: Send + Sync {
    /// Rendered path for the service, or an empty string when no path
    /// template is configured
    fn generate_url_path(
        &self,
        name: &str,
        namespace: &str,
        config: &IngressConfig,
    ) -> Result<String, PathError>;
}

#[derive(Debug, Default, Clone)]
pub struct DefaultPathService;

impl PathService for DefaultPathService {
    fn generate_url_path(
        &self,
        name: &str,
        namespace: &str,
        config: &IngressConfig,
    ) -> Result<String, PathError> {
        if config.path_template.is_empty() {
            return Ok(String::new());
        }

        let path = template::render(&config.path_template, &PathTemplateValues { name, namespace })?;

        match check_request_path(&path) {
            Ok(()) => Ok(path),
            Err(RequestPathProblem::SchemeOrHost) => Err(PathError::InvalidPathTemplate {
                path,
                reason: "contains either a scheme or a host".to_string(),
            }),
            Err(RequestPathProblem::Invalid) => Err(PathError::InvalidPathTemplate {
                path,
                reason: "invalid request URI".to_string(),
            }),
        }
    }
}
