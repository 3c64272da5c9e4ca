//! Error types shared by every part of the library.
//!
//! Library functions return [`Result`], whose error is the typed [`Error`]
//! enum below. The `layman` binary converts these into [`anyhow::Error`] at
//! the command boundary through the `?` operator.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading catalogs, syncing overlays or editing the
/// package manager configuration.
#[derive(Error, Debug)]
pub enum Error {
    /// A single overlay record could not be understood. Loaders skip the
    /// record and keep going.
    #[error("Malformed overlay record{}: {message}", name.as_ref().map(|n| format!(" '{n}'")).unwrap_or_default())]
    MalformedRecord {
        name: Option<String>,
        message: String,
    },

    /// A whole catalog document could not be parsed.
    #[error("Invalid overlay database {}: {message}", path.display())]
    InvalidDatabase { path: PathBuf, message: String },

    /// No sync strategy is registered for the source type.
    #[error("Overlay '{overlay}' has unsupported source type '{kind}'")]
    UnknownOverlayType { overlay: String, kind: String },

    /// The overlay directory or database entry already exists.
    #[error("Overlay '{name}' is already installed at {}", path.display())]
    AlreadyInstalled { name: String, path: PathBuf },

    /// No overlay with the given name is known.
    #[error("Overlay '{0}' not found")]
    NotFound(String),

    /// A strategy failed to materialise or update an overlay. Content that
    /// was already on disk is left untouched.
    #[error("Sync of overlay '{overlay}' failed: {message}")]
    SyncFailed { overlay: String, message: String },

    /// A package manager config file could not be locked or rewritten.
    #[error("Could not write {}: {message}", path.display())]
    ConfigWrite { path: PathBuf, message: String },

    /// Fetching a remote resource failed.
    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    /// The settings file could not be read or is invalid.
    #[error("Settings error: {0}")]
    Settings(String),

    /// An overlay collection could not be serialized.
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn sync_failed(overlay: &str, message: impl Into<String>) -> Self {
        Error::SyncFailed {
            overlay: overlay.to_string(),
            message: message.into(),
        }
    }

    pub fn malformed(name: Option<&str>, message: impl Into<String>) -> Self {
        Error::MalformedRecord {
            name: name.map(str::to_string),
            message: message.into(),
        }
    }

    /// Whether a batch operation may continue with its next item after this
    /// error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::Settings(_) | Error::Serialization(_))
    }
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_record_message_names_overlay() {
        let err = Error::malformed(Some("wrobel"), "no sources");
        assert_eq!(err.to_string(), "Malformed overlay record 'wrobel': no sources");
        let err = Error::malformed(None, "missing name");
        assert_eq!(err.to_string(), "Malformed overlay record: missing name");
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(Error::sync_failed("x", "boom").is_recoverable());
        assert!(Error::NotFound("x".into()).is_recoverable());
        assert!(!Error::Settings("bad".into()).is_recoverable());
    }
}
