use std::process::ExitStatus;
use thiserror::Error;

/// Failures talking to the planner backend.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{endpoint} returned status {status}")]
    Status {
        endpoint: &'static str,
        status: reqwest::StatusCode,
    },

    #[error("could not decode {endpoint} response: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl ClientError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::Status { status, .. } if *status == reqwest::StatusCode::NOT_FOUND)
    }
}

#[derive(Debug, Error)]
pub enum VoiceError {
    #[error("speech-to-text is not available")]
    Unsupported,

    #[error("could not start speech-to-text command: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("speech-to-text command exited with {status}")]
    Failed { status: ExitStatus },

    #[error("no speech was recognised")]
    NoTranscript,
}
