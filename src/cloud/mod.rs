//! Google Cloud implementations of the crate's external seams.

use crate::error::MappingError;
use reqwest::StatusCode;

pub mod document_ai;
pub mod gemini;
pub mod storage;
pub mod types;

pub use document_ai::DocumentAiBackend;
pub use gemini::GeminiOracle;
pub use storage::GcsObjectStore;

/// Map a failed HTTP status to an error. Throttling and server errors go
/// through `transient` (retryable); anything else is a rejected request.
pub(crate) fn status_error(
    service: &str,
    status: StatusCode,
    body: String,
    transient: fn(String) -> MappingError,
) -> MappingError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        transient(format!("{} error (status {}): {}", service, status, body))
    } else {
        MappingError::RequestRejected {
            service: service.to_string(),
            status: status.as_u16(),
            message: body,
        }
    }
}
