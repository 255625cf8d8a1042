use thiserror::Error;

/// Errors from a model endpoint call.
///
/// Each one fails the whole query; nothing is retried.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// The request never produced an HTTP response.
    #[error("network: {0}")]
    Network(String),

    /// The endpoint answered with a non-success status.
    #[error("endpoint returned {status}: {body}")]
    Api { status: u16, body: String },

    /// The endpoint refused to answer (safety filter, recitation, ...).
    #[error("response blocked: {0}")]
    Blocked(String),

    /// The response body could not be understood.
    #[error("invalid endpoint response: {0}")]
    InvalidResponse(String),
}
