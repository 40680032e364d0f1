use codescript_core::DecodeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("failed to start {provider} CLI: {source}")]
    Spawn {
        provider: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{provider} CLI error: {stderr}")]
    Provider { provider: String, stderr: String },

    #[error("model returned no output")]
    EmptyOutput,

    #[error("model output contains no JSON document")]
    NoJson,

    #[error("model output is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("scripted model has no reply queued")]
    Exhausted,
}

/// Why an instruction produced no batch at all.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error(transparent)]
    Transport(#[from] ExecError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}
