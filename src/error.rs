use std::time::Duration;

use thiserror::Error;

use crate::kie::KieError;

/// Placeholder used when the service gives no human-readable reason.
pub const UNKNOWN_ERROR: &str = "unknown error";

#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration, reported before any network call.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("submission rejected: {0}")]
    SubmissionRejected(String),

    #[error("job failed: {0}")]
    JobFailed(String),

    #[error("job {task_id} still pending after {}s", waited.as_secs())]
    PollTimeout { task_id: String, waited: Duration },

    #[error("download of {url} failed: {reason}")]
    FetchFailed { url: String, reason: String },

    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("job {0} finished without a result URL")]
    NoResult(String),

    #[error("cancelled")]
    Cancelled,

    #[error("API error: {0}")]
    Api(#[from] KieError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Errors that should stop the whole run rather than only the current unit.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Configuration(_) | Error::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_timeout_display() {
        let err = Error::PollTimeout {
            task_id: "task_1".into(),
            waited: Duration::from_secs(120),
        };
        assert_eq!(err.to_string(), "job task_1 still pending after 120s");
    }

    #[test]
    fn job_failed_display_keeps_message() {
        let err = Error::JobFailed("content policy violation".into());
        assert_eq!(err.to_string(), "job failed: content policy violation");
    }

    #[test]
    fn only_configuration_and_cancel_are_fatal() {
        assert!(Error::Configuration("KIE_API_KEY is not set".into()).is_fatal());
        assert!(Error::Cancelled.is_fatal());
        assert!(!Error::UploadFailed("timeout".into()).is_fatal());
        assert!(!Error::SubmissionRejected(UNKNOWN_ERROR.into()).is_fatal());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
