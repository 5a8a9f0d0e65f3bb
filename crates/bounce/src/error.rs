//! Render failure taxonomy.

use std::path::PathBuf;
use thiserror::Error;

/// Failures the worker pool classifies for retry decisions.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The transcoder binary could not be spawned at all.
    #[error("transcoder unavailable: {0}")]
    TranscoderUnavailable(String),

    /// Child exited non-zero. Carries the tail of stderr for the logs;
    /// the tail never reaches API responses.
    #[error("transcoder exited with status {exit_code}")]
    TranscoderFailed { exit_code: i32, stderr_tail: String },

    /// Wall-clock budget exceeded; the child was interrupted and killed.
    #[error("transcoder run timed out")]
    TimedOut,

    /// A stage finished without producing a usable file.
    #[error("stage output missing or empty: {path}")]
    AssetNotProduced { path: PathBuf },

    /// Shutdown or cancellation interrupted the stage.
    #[error("render cancelled")]
    Cancelled,

    #[error(transparent)]
    Storage(#[from] stash::StorageError),

    #[error("render i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

impl RenderError {
    /// Whether another attempt could plausibly succeed.
    ///
    /// Known-fatal transcoder exits (bad arguments, missing codec) and
    /// unavailability are not retryable; transient exits and timeouts are.
    pub fn is_retryable(&self) -> bool {
        match self {
            RenderError::TranscoderUnavailable(_) => false,
            RenderError::TranscoderFailed { stderr_tail, .. } => {
                let tail = stderr_tail.to_ascii_lowercase();
                !(tail.contains("unknown encoder")
                    || tail.contains("unrecognized option")
                    || tail.contains("invalid argument")
                    || tail.contains("no such filter"))
            }
            RenderError::TimedOut => true,
            RenderError::AssetNotProduced { .. } => true,
            RenderError::Cancelled => true,
            RenderError::Storage(stash::StorageError::InvalidKey { .. }) => false,
            RenderError::Storage(_) => true,
            RenderError::Io(_) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_fatal_exits_are_not_retryable() {
        let fatal = RenderError::TranscoderFailed {
            exit_code: 1,
            stderr_tail: "Unknown encoder 'libx264'".to_string(),
        };
        assert!(!fatal.is_retryable());

        let transient = RenderError::TranscoderFailed {
            exit_code: 137,
            stderr_tail: "killed".to_string(),
        };
        assert!(transient.is_retryable());
    }

    #[test]
    fn timeouts_retry_and_unavailability_does_not() {
        assert!(RenderError::TimedOut.is_retryable());
        assert!(!RenderError::TranscoderUnavailable("enoent".into()).is_retryable());
    }
}
