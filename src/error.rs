use std::io;
use std::path::PathBuf;

/// Failures that end a scan as a whole.
///
/// Per-directory listing failures never show up here; they are absorbed by the
/// crawler and counted in `ScanStats::errors`.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Path not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Cannot read {}: {source}", .path.display())]
    RootUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Scan cancelled")]
    Cancelled,
}

impl ScanError {
    /// Cancellation is a normal way for a scan to end, not a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ScanError::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NavigationError {
    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Directory has no children: {}", .0.display())]
    EmptyDirectory(PathBuf),

    #[error("Already at the top of the scanned tree")]
    AtTop,

    #[error("Node does not belong to the current tree")]
    UnknownNode,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancelled_is_distinguished() {
        assert!(ScanError::Cancelled.is_cancelled());
        assert!(!ScanError::NotFound(PathBuf::from("/nope")).is_cancelled());
    }

    #[test]
    fn test_not_found_message_names_path() {
        let err = ScanError::NotFound(PathBuf::from("/missing/dir"));
        assert_eq!(err.to_string(), "Path not found: /missing/dir");
    }
}
