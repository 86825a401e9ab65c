use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Unsupported distance strategy: {0}")]
    UnsupportedStrategy(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Provider error (status {status}): {message}")]
    Provider {
        status: u16,
        request_id: Option<String>,
        message: String,
    },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Transcription job {job_id} did not finish within {limit_secs}s")]
    Timeout { job_id: String, limit_secs: u64 },

    #[error("Transcription job {job_id} ended in state {state}: {message}")]
    JobFailed {
        job_id: String,
        state: String,
        message: String,
    },

    #[error("Option mismatch for {field}: requested '{requested}', provider reported '{reported}'")]
    OptionMismatch {
        field: String,
        requested: String,
        reported: String,
    },

    #[error("No transcription result object found under prefixes {0:?}")]
    MissingArtifact(Vec<String>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub mod auth;
pub mod commands;
pub mod config;
pub mod genai;
pub mod speech;
pub mod vector;
