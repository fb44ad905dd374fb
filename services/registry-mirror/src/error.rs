//! Error types for the mirror

use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};

use crate::access::DenyReason;

/// Result type for mirror operations
pub type MirrorResult<T> = Result<T, MirrorError>;

/// Error types for mirror operations
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// Blob not found
    #[error("blob not found: {0}")]
    BlobNotFound(String),

    /// Manifest not found in any namespace root
    #[error("manifest not found: {0}")]
    ManifestNotFound(String),

    /// The request path does not name a blob or manifest we can serve
    #[error("no such route: {0}")]
    UnknownRoute(String),

    /// Range not satisfiable for a blob of the given size
    #[error("range not satisfiable (blob size {size})")]
    RangeNotSatisfiable {
        /// Total size of the blob
        size: u64,
    },

    /// Rejected by the access filter chain
    #[error("access denied: {0}")]
    AccessDenied(DenyReason),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MirrorError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            MirrorError::BlobNotFound(_)
            | MirrorError::ManifestNotFound(_)
            | MirrorError::UnknownRoute(_) => StatusCode::NOT_FOUND,
            MirrorError::RangeNotSatisfiable { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            MirrorError::AccessDenied(_) => StatusCode::FORBIDDEN,
            MirrorError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for MirrorError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match self {
            MirrorError::BlobNotFound(_)
            | MirrorError::ManifestNotFound(_)
            | MirrorError::UnknownRoute(_) => {
                tracing::debug!("{self}");
                status.into_response()
            }
            MirrorError::RangeNotSatisfiable { size } => {
                tracing::debug!("{self}");
                let mut response = status.into_response();
                if let Ok(value) = HeaderValue::from_str(&format!("bytes */{size}")) {
                    response.headers_mut().insert(header::CONTENT_RANGE, value);
                }
                response
            }
            // The failing predicate stays in the logs, not on the wire.
            MirrorError::AccessDenied(reason) => {
                tracing::info!(%reason, "request rejected by access filter");
                (
                    status,
                    [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                    "forbidden",
                )
                    .into_response()
            }
            MirrorError::Io(ref error) => {
                tracing::error!(%error, "storage I/O failure");
                status.into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(
            MirrorError::BlobNotFound("sha256:00".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            MirrorError::ManifestNotFound("library/x:latest".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            MirrorError::RangeNotSatisfiable { size: 10 }.status_code(),
            StatusCode::RANGE_NOT_SATISFIABLE
        );
        assert_eq!(
            MirrorError::AccessDenied(DenyReason::HostMismatch).status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn range_error_reports_size() {
        let response = MirrorError::RangeNotSatisfiable { size: 1000 }.into_response();
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(
            response.headers().get(header::CONTENT_RANGE).unwrap(),
            "bytes */1000"
        );
    }
}
