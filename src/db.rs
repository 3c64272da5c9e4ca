//! In-memory overlay database backed by catalog documents.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::codec::{self, DbFormat};
use crate::error::{Error, Result};
use crate::overlay::Overlay;
use crate::util::write_atomic;

/// What [`Database::load`] does with a document that cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LoadMode {
    /// Stop at the first unreadable document.
    Strict,
    /// Skip unreadable documents and report them.
    #[default]
    Lenient,
}

/// Outcome of loading one or more documents.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Documents that were read (missing ones are not listed).
    pub loaded: Vec<PathBuf>,
    /// Records skipped because they were malformed.
    pub skipped_records: Vec<Error>,
    /// Documents skipped in lenient mode.
    pub invalid_documents: Vec<Error>,
}

impl LoadReport {
    pub fn merge(&mut self, other: LoadReport) {
        self.loaded.extend(other.loaded);
        self.skipped_records.extend(other.skipped_records);
        self.invalid_documents.extend(other.invalid_documents);
    }
}

/// Mapping of overlay name to overlay.
///
/// Two databases are equal when they hold the same overlays, whatever format
/// they were read from or will be written as.
#[derive(Debug, Clone, Default)]
pub struct Database {
    overlays: BTreeMap<String, Overlay>,
    format: DbFormat,
}

impl PartialEq for Database {
    fn eq(&self, other: &Self) -> bool {
        self.overlays == other.overlays
    }
}

impl Eq for Database {}

impl Database {
    pub fn new(format: DbFormat) -> Self {
        Self {
            overlays: BTreeMap::new(),
            format,
        }
    }

    /// Creates a database and loads `paths` into it.
    pub fn open<P: AsRef<Path>>(paths: &[P], format: DbFormat, mode: LoadMode) -> Result<(Self, LoadReport)> {
        let mut db = Database::new(format);
        let report = db.load(paths, mode)?;
        Ok((db, report))
    }

    pub fn format(&self) -> DbFormat {
        self.format
    }

    /// Parses each document and merges its overlays into the mapping. A name
    /// defined by several documents ends up with the definition from the last
    /// one. Paths that do not exist are ignored.
    pub fn load<P: AsRef<Path>>(&mut self, paths: &[P], mode: LoadMode) -> Result<LoadReport> {
        let mut report = LoadReport::default();
        for path in paths {
            let path = path.as_ref();
            if !path.exists() {
                log::debug!("Skipping missing database {}", path.display());
                continue;
            }
            match self.load_document(path) {
                Ok(skipped) => {
                    report.loaded.push(path.to_path_buf());
                    report.skipped_records.extend(skipped);
                }
                Err(err) => match mode {
                    LoadMode::Strict => return Err(err),
                    LoadMode::Lenient => {
                        log::warn!("{err}");
                        report.invalid_documents.push(err);
                    }
                },
            }
        }
        Ok(report)
    }

    fn load_document(&mut self, path: &Path) -> Result<Vec<Error>> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::InvalidDatabase {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        // Empty files are valid, empty databases.
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let format = DbFormat::for_document(path, &text, self.format);
        let decoded = codec::decode(format, &text, path)?;
        for overlay in decoded.overlays {
            self.overlays.insert(overlay.name.clone(), overlay);
        }
        Ok(decoded.skipped)
    }

    pub fn select(&self, name: &str) -> Result<&Overlay> {
        self.overlays
            .get(name)
            .ok_or_else(|| Error::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.overlays.contains_key(name)
    }

    /// Inserts or replaces an overlay after checking its invariants.
    pub fn insert(&mut self, overlay: Overlay) -> Result<Option<Overlay>> {
        overlay.validate()?;
        Ok(self.overlays.insert(overlay.name.clone(), overlay))
    }

    pub fn remove(&mut self, name: &str) -> Option<Overlay> {
        self.overlays.remove(name)
    }

    pub fn len(&self) -> usize {
        self.overlays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.overlays.is_empty()
    }

    /// Overlay names in alphabetical order.
    pub fn names(&self) -> Vec<String> {
        self.overlays.keys().cloned().collect()
    }

    pub fn overlays(&self) -> impl Iterator<Item = &Overlay> {
        self.overlays.values()
    }

    /// Overlays sorted by priority, then by name.
    pub fn by_priority(&self) -> Vec<&Overlay> {
        let mut overlays: Vec<&Overlay> = self.overlays.values().collect();
        overlays.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        overlays
    }

    /// One entry per overlay in name order: the full info text when
    /// `verbose`, the one-line summary otherwise.
    pub fn list(&self, verbose: bool, width: usize) -> Vec<String> {
        self.overlays
            .values()
            .map(|overlay| {
                if verbose {
                    overlay.info_text(true)
                } else {
                    overlay.short_line(width)
                }
            })
            .collect()
    }

    /// Serializes the whole mapping to `path` in the database's format. The
    /// document is fully rendered before anything is written, and the file is
    /// replaced in one rename.
    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let text = codec::encode(self.format, self.overlays.values())?;
        write_atomic(path.as_ref(), text.as_bytes())?;
        log::debug!("Wrote {} overlays to {}", self.overlays.len(), path.as_ref().display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use crate::overlay::Source;

    fn doc(overlays: &[Overlay], format: DbFormat) -> String {
        codec::encode(format, overlays).unwrap()
    }

    #[test]
    fn test_last_document_wins() {
        let dir = tempdir().unwrap();
        let mut first = Overlay::new("x", vec![Source::new("git://one/x.git", "git")]);
        first.priority = 1;
        let mut second = Overlay::new("x", vec![Source::new("rsync://two/x", "rsync")]);
        second.priority = 2;
        let a = dir.path().join("a.xml");
        let b = dir.path().join("b.json");
        std::fs::write(&a, doc(&[first], DbFormat::Xml)).unwrap();
        std::fs::write(&b, doc(&[second.clone()], DbFormat::Json)).unwrap();

        let (db, report) = Database::open(&[&a, &b], DbFormat::Xml, LoadMode::Strict).unwrap();
        assert_eq!(report.loaded.len(), 2);
        assert_eq!(db.select("x").unwrap(), &second);
    }

    #[test]
    fn test_load_modes() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("good.xml");
        let bad = dir.path().join("bad.xml");
        std::fs::write(
            &good,
            doc(&[Overlay::new("g", vec![Source::new("git://g", "git")])], DbFormat::Xml),
        )
        .unwrap();
        std::fs::write(&bad, "<repositories><repo>").unwrap();

        let err = Database::open(&[&bad, &good], DbFormat::Xml, LoadMode::Strict).unwrap_err();
        match err {
            Error::InvalidDatabase { path, .. } => assert_eq!(path, bad),
            other => panic!("unexpected error {other}"),
        }

        let (db, report) = Database::open(&[&bad, &good], DbFormat::Xml, LoadMode::Lenient).unwrap();
        assert_eq!(db.names(), vec!["g"]);
        assert_eq!(report.invalid_documents.len(), 1);
    }

    #[test]
    fn test_missing_and_empty_documents_are_empty() {
        let dir = tempdir().unwrap();
        let empty = dir.path().join("empty.xml");
        std::fs::write(&empty, "").unwrap();
        let (db, report) = Database::open(
            &[empty.clone(), dir.path().join("missing.xml")],
            DbFormat::Xml,
            LoadMode::Strict,
        )
        .unwrap();
        assert!(db.is_empty());
        assert_eq!(report.loaded, vec![empty]);
    }

    #[test]
    fn test_write_round_trip_and_equality_across_formats() {
        let dir = tempdir().unwrap();
        let mut db = Database::new(DbFormat::Xml);
        db.insert(Overlay::new("b", vec![Source::new("git://b", "git")])).unwrap();
        db.insert(Overlay::new("a", vec![Source::new("svn://a", "svn")])).unwrap();

        let xml = dir.path().join("db.xml");
        db.write(&xml).unwrap();
        let (from_xml, _) = Database::open(&[&xml], DbFormat::Xml, LoadMode::Strict).unwrap();
        assert_eq!(from_xml, db);

        let mut as_json = Database::new(DbFormat::Json);
        for overlay in db.overlays() {
            as_json.insert(overlay.clone()).unwrap();
        }
        let json = dir.path().join("db.json");
        as_json.write(&json).unwrap();
        let (from_json, _) = Database::open(&[&json], DbFormat::Json, LoadMode::Strict).unwrap();
        assert_eq!(from_json, from_xml);
    }

    #[test]
    fn test_select_and_ordering() {
        let mut db = Database::new(DbFormat::Xml);
        let mut low = Overlay::new("zeta", vec![Source::new("git://z", "git")]);
        low.priority = 1;
        db.insert(low).unwrap();
        db.insert(Overlay::new("alpha", vec![Source::new("git://a", "git")])).unwrap();
        assert!(matches!(db.select("nope"), Err(Error::NotFound(_))));
        assert_eq!(db.names(), vec!["alpha", "zeta"]);
        let order: Vec<_> = db.by_priority().iter().map(|o| o.name.as_str()).collect();
        assert_eq!(order, vec!["zeta", "alpha"]);
        assert!(db.insert(Overlay::new("", vec![])).is_err());
        assert_eq!(db.list(false, 80).len(), 2);
    }
}
