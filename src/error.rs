use thiserror::Error;

/// Failures talking to the record store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Query failed; the run treats this as an empty batch.
    #[error("record store unreachable: {0}")]
    TransientFetch(String),

    #[error("record {0} has no photo attached")]
    AttachmentUnavailable(String),

    #[error("photo download failed: {0}")]
    Download(String),

    /// The record may be picked up again on the next run.
    #[error("write-back to record {record_id} failed: {reason}")]
    WriteBack { record_id: String, reason: String },
}

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("model request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("model endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("model returned no content")]
    EmptyResponse,

    #[error("malformed model response: {0}")]
    MalformedResponse(String),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("font loading failed: {0}")]
    Font(String),

    #[error("document layout failed: {0}")]
    Layout(#[from] genpdf::error::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("setting {0} still holds a template placeholder")]
    Placeholder(&'static str),

    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}
