//! Error types for the dashboard client

use thiserror::Error;

/// Result type alias for dashboard client operations
pub type Result<T> = std::result::Result<T, DashboardError>;

#[derive(Error, Debug)]
pub enum DashboardError {

    // =============================
    // Remote Data Source
    // =============================

    #[error("Network error: {0}")]
    Network(String),

    #[error("Backend returned {status}: {detail}")]
    Api { status: u16, detail: String },

    // =============================
    // Conversational Session
    // =============================

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("A question is already awaiting an answer")]
    SubmissionPending,

    // =============================
    // Setup
    // =============================

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl DashboardError {
    /// True for failures that originate in the transport or the backend
    /// rather than in local validation.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            DashboardError::Network(_) | DashboardError::Api { .. } | DashboardError::HttpError(_)
        )
    }

    /// Message shown inline next to a retry action.
    ///
    /// For backend rejections this is the `detail` string alone, which is what
    /// the backend intends the user to read.
    pub fn user_message(&self) -> String {
        match self {
            DashboardError::Api { detail, .. } => detail.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_surfaces_detail() {
        let err = DashboardError::Api {
            status: 503,
            detail: "Ollama no disponible".to_string(),
        };
        assert!(err.is_network());
        assert_eq!(err.user_message(), "Ollama no disponible");
        assert!(err.to_string().contains("503"));
    }

    #[test]
    fn validation_is_not_network() {
        let err = DashboardError::Validation("empty question".to_string());
        assert!(!err.is_network());
        assert!(!DashboardError::SubmissionPending.is_network());
    }
}
