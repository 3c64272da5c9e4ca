//! On-disk cache of fetched catalog documents.
//!
//! Each remote URI owns one entry named after the URI's fingerprint. The
//! entry is a plain catalog document (`<fingerprint>.xml` or `.json`) that the
//! database loader reads directly, plus a `<fingerprint>.timestamp` file with
//! the time of the last successful fetch.

use std::path::{Path, PathBuf};
use chrono::{DateTime, Utc};
use walkdir::WalkDir;
use crate::codec::DbFormat;
use crate::error::Result;
use crate::util::{fingerprint, write_atomic};

const TIMESTAMP_EXT: &str = "timestamp";

#[derive(Debug, Clone)]
pub struct CatalogCache {
    dir: PathBuf,
}

impl CatalogCache {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn document_path(&self, uri: &str, format: DbFormat) -> PathBuf {
        self.dir
            .join(format!("{}.{}", fingerprint(uri), format.extension()))
    }

    fn timestamp_path(&self, uri: &str) -> PathBuf {
        self.dir.join(format!("{}.{TIMESTAMP_EXT}", fingerprint(uri)))
    }

    /// The cached document for `uri`, if one was ever stored.
    pub fn cached_document(&self, uri: &str) -> Option<PathBuf> {
        [DbFormat::Xml, DbFormat::Json]
            .into_iter()
            .map(|format| self.document_path(uri, format))
            .find(|path| path.exists())
    }

    /// Replaces the entry for `uri` with `bytes`. The previous document stays
    /// in place until the new one is completely written.
    pub fn store(&self, uri: &str, format: DbFormat, bytes: &[u8]) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.document_path(uri, format);
        write_atomic(&path, bytes)?;
        for other in [DbFormat::Xml, DbFormat::Json] {
            let stale = self.document_path(uri, other);
            if other != format && stale.exists() {
                std::fs::remove_file(stale)?;
            }
        }
        write_atomic(self.timestamp_path(uri), Utc::now().to_rfc3339().as_bytes())?;
        log::debug!("Cached {} at {}", uri, path.display());
        Ok(path)
    }

    /// When `uri` was last fetched successfully.
    pub fn fetched_at(&self, uri: &str) -> Option<DateTime<Utc>> {
        let text = std::fs::read_to_string(self.timestamp_path(uri)).ok()?;
        DateTime::parse_from_rfc3339(text.trim())
            .ok()
            .map(|time| time.with_timezone(&Utc))
    }

    /// Removes every entry whose fingerprint belongs to none of `keep`.
    /// Returns the number of files removed.
    pub fn remove_stale(&self, keep: &[String]) -> Result<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }
        let keep: Vec<String> = keep.iter().map(|uri| fingerprint(uri)).collect();
        let mut removed = 0;
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            let is_entry = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("xml" | "json" | TIMESTAMP_EXT)
            );
            let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
            if is_entry && !keep.iter().any(|fp| fp == stem) {
                std::fs::remove_file(path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
