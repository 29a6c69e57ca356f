use std::path::PathBuf;

use super::issues::Issue;

#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("input failed validation with {} blocking issue(s)", .0.iter().filter(|i| i.is_error()).count())]
    Validation(Vec<Issue>),

    #[error("could not read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON input: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid Monte Carlo settings: {0}")]
    MonteCarlo(String),

    #[error("server error: {0}")]
    Server(std::io::Error),
}

impl ProjectionError {
    /// Issues carried by a validation failure; empty for every other variant.
    pub fn issues(&self) -> &[Issue] {
        match self {
            ProjectionError::Validation(issues) => issues,
            _ => &[],
        }
    }
}
