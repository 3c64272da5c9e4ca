//! Catalog document codecs.
//!
//! Both formats decode into and encode from the same [`Overlay`] values; the
//! model carries no format specific fields. A record that cannot be turned
//! into a valid overlay is skipped and reported in [`Decoded::skipped`], while
//! a document that cannot be read at all fails with
//! [`Error::InvalidDatabase`].

pub mod json;
pub mod xml;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use crate::overlay::Overlay;

/// Serialization format of a catalog or database document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbFormat {
    #[default]
    Xml,
    Json,
}

impl DbFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            DbFormat::Xml => "xml",
            DbFormat::Json => "json",
        }
    }

    /// Picks the format of a document: by file extension first, then by the
    /// first significant character, then `fallback`.
    pub fn for_document(path: &Path, text: &str, fallback: DbFormat) -> DbFormat {
        match path.extension().and_then(|e| e.to_str()) {
            Some("xml") => return DbFormat::Xml,
            Some("json") => return DbFormat::Json,
            _ => {}
        }
        match text.trim_start().chars().next() {
            Some('<') => DbFormat::Xml,
            Some('{') => DbFormat::Json,
            _ => fallback,
        }
    }
}

impl FromStr for DbFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "xml" => Ok(DbFormat::Xml),
            "json" => Ok(DbFormat::Json),
            other => Err(Error::Settings(format!("unknown database format '{other}'"))),
        }
    }
}

impl fmt::Display for DbFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// The overlays found in one document plus the records that had to be
/// skipped.
#[derive(Debug, Default)]
pub struct Decoded {
    pub overlays: Vec<Overlay>,
    pub skipped: Vec<Error>,
}

impl Decoded {
    fn accept(&mut self, record: Result<Overlay>) {
        match record.and_then(|overlay| overlay.validate().map(|_| overlay)) {
            Ok(overlay) => self.overlays.push(overlay),
            Err(err) => {
                log::warn!("Skipping overlay record: {err}");
                self.skipped.push(err);
            }
        }
    }
}

/// Decodes a document. `origin` only names the document in errors.
pub fn decode(format: DbFormat, text: &str, origin: &Path) -> Result<Decoded> {
    match format {
        DbFormat::Xml => xml::decode(text, origin),
        DbFormat::Json => json::decode(text, origin),
    }
}

/// Encodes overlays into a complete document.
pub fn encode<'a, I>(format: DbFormat, overlays: I) -> Result<String>
where
    I: IntoIterator<Item = &'a Overlay>,
{
    match format {
        DbFormat::Xml => xml::encode(overlays),
        DbFormat::Json => json::encode(overlays),
    }
}

fn invalid(origin: &Path, message: impl Into<String>) -> Error {
    Error::InvalidDatabase {
        path: origin.to_path_buf(),
        message: message.into(),
    }
}
