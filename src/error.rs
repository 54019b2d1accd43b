use thiserror::Error;

/// Why a watcher run ended abnormally.
///
/// Each variant wraps the underlying `anyhow` chain. Source and encoding errors
/// stop the run (after cleanup); notification errors never do.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("invalid configuration: {0:#}")]
    Config(anyhow::Error),
    #[error("frame source failed: {0:#}")]
    Source(anyhow::Error),
    #[error("segment encoding failed: {0:#}")]
    Encoding(anyhow::Error),
    #[error("notification dispatch failed: {0:#}")]
    Notification(anyhow::Error),
}

impl WatchError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            WatchError::Source(_) => 2,
            WatchError::Encoding(_) => 3,
            WatchError::Config(_) => 4,
            WatchError::Notification(_) => 5,
        }
    }

    pub fn is_fatal(&self) -> bool {
        !matches!(self, WatchError::Notification(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn display_keeps_context_chain() {
        let err = WatchError::Source(anyhow!("connection refused").context("connect camera"));
        assert_eq!(
            err.to_string(),
            "frame source failed: connect camera: connection refused"
        );
    }

    #[test]
    fn exit_codes_are_distinct() {
        let codes = [
            WatchError::Source(anyhow!("x")).exit_code(),
            WatchError::Encoding(anyhow!("x")).exit_code(),
            WatchError::Config(anyhow!("x")).exit_code(),
        ];
        assert!(codes.iter().all(|&c| c != 0));
        assert_ne!(codes[0], codes[1]);
        assert_ne!(codes[1], codes[2]);
        assert!(!WatchError::Notification(anyhow!("x")).is_fatal());
    }
}
