use std::path::PathBuf;

/// Failure taxonomy for one capture run. Every variant is terminal: nothing
/// is retried and no partial record is written.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("cannot read input image {path}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{provider} request failed: {message}")]
    Provider {
        provider: &'static str,
        message: String,
    },

    /// The image provider answered 2xx but none of the known payload shapes
    /// was present. The full body is kept verbatim for schema-drift triage.
    #[error("no image key found in provider response; body was: {body}")]
    ResponseShape { body: String },

    #[error("image key `{key}` was present but held no data; body was: {body}")]
    EmptyPayload { key: &'static str, body: String },

    #[error("image payload under `{key}` is not valid base64: {source}")]
    Decode {
        key: &'static str,
        #[source]
        source: base64::DecodeError,
    },

    #[error("capture store failure: {0}")]
    Store(#[from] sqlx::Error),
}

impl CaptureError {
    pub fn provider(provider: &'static str, message: impl Into<String>) -> Self {
        CaptureError::Provider {
            provider,
            message: message.into(),
        }
    }
}
