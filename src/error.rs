//! Error type shared by the retrieval engine.
//!
//! Every library operation returns [`Result<T>`], whose error side is a
//! [`RagError`]. The variants map one-to-one onto the failure classes the
//! engine distinguishes:
//!
//! | Variant | Meaning | Typical caller reaction |
//! |---------|---------|-------------------------|
//! | [`RagError::Validation`] | count/dimension/provider mismatch, bad input | fix input or rebuild |
//! | [`RagError::RetrievalUnavailable`] | no index has been built yet | build, or answer with empty context |
//! | [`RagError::Provider`] | remote embedding call failed or timed out | retry later |
//! | [`RagError::Io`] | filesystem failure, with the path involved | surface to operator |
//! | [`RagError::Serialization`] | malformed persisted record | rebuild |
//! | [`RagError::Corrupt`] | persisted binary file fails its own checks | rebuild |
//! | [`RagError::Task`] | a background task panicked or was cancelled | surface to operator |

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("retrieval unavailable: no index at {}; build the index first", .0.display())]
    RetrievalUnavailable(PathBuf),

    #[error("embedding provider error: {0}")]
    Provider(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed record in {} line {line}: {source}", .path.display())]
    Serialization {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("corrupt file {}: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("background task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, RagError>;

impl RagError {
    pub fn validation(msg: impl Into<String>) -> Self {
        RagError::Validation(msg.into())
    }

    pub fn provider(msg: impl Into<String>) -> Self {
        RagError::Provider(msg.into())
    }

    pub fn corrupt(path: &Path, reason: impl Into<String>) -> Self {
        RagError::Corrupt {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Short machine-readable code used in HTTP error bodies and logs.
    pub fn code(&self) -> &'static str {
        match self {
            RagError::Validation(_) => "bad_request",
            RagError::RetrievalUnavailable(_) => "index_unavailable",
            RagError::Provider(_) => "provider_error",
            RagError::Io { .. }
            | RagError::Serialization { .. }
            | RagError::Corrupt { .. }
            | RagError::Task(_) => "internal",
        }
    }
}

/// Attach a path to an `io::Error`.
pub(crate) trait IoContext<T> {
    fn at(self, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for std::result::Result<T, std::io::Error> {
    fn at(self, path: &Path) -> Result<T> {
        self.map_err(|source| RagError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(RagError::validation("x").code(), "bad_request");
        assert_eq!(
            RagError::RetrievalUnavailable(PathBuf::from("/tmp/index.flat")).code(),
            "index_unavailable"
        );
        assert_eq!(RagError::provider("boom").code(), "provider_error");
    }

    #[test]
    fn test_io_context_keeps_path() {
        let err = std::fs::read("/definitely/not/here.bin")
            .at(Path::new("/definitely/not/here.bin"))
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("/definitely/not/here.bin"), "{}", msg);
    }
}
