//! Request-level errors
//!
//! Cache failures never reach this type: the facade absorbs them. What remains is
//! a bad request, a domain nobody registered, or an upstream source failing on a
//! cache miss.

use thiserror::Error;

/// Error returned to dashboard requesters
#[derive(Debug, Error)]
pub enum DashboardError {
    /// Malformed query (bad date, empty pattern...)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// No aggregation source is registered for the domain
    #[error("Unknown dashboard domain '{0}'")]
    UnknownDomain(String),

    /// The domain's source failed while computing a missing entry
    #[error("Failed to fetch {domain} data: {message}")]
    Upstream { domain: String, message: String },
}

impl DashboardError {
    /// Upstream failure for `domain`
    ///
    /// Only the outermost error message is kept; inner causes may carry
    /// connection details.
    pub fn upstream(domain: impl Into<String>, err: &anyhow::Error) -> Self {
        Self::Upstream {
            domain: domain.into(),
            message: err.to_string(),
        }
    }
}

#[cfg(feature = "http")]
mod response {
    use super::DashboardError;
    use axum::Json;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use serde_json::json;

    impl DashboardError {
        /// HTTP status for this error
        pub fn status_code(&self) -> StatusCode {
            match self {
                Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
                Self::UnknownDomain(_) => StatusCode::NOT_FOUND,
                Self::Upstream { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            }
        }
    }

    impl IntoResponse for DashboardError {
        fn into_response(self) -> Response {
            let status = self.status_code();
            let body = Json(json!({
                "success": false,
                "error": self.to_string(),
            }));
            (status, body).into_response()
        }
    }
}
