//! Remote catalog fetching and the "available overlays" view.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;
use crate::codec::{self, DbFormat};
use crate::db::{Database, LoadMode};
use crate::error::{Error, Result};
use crate::global::cache::CatalogCache;
use crate::settings::Settings;
use crate::util::{fetch_bytes, http_client};

/// When [`RemoteDb::fetch_remote_list`] counts as successful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchPolicy {
    /// Every configured URI must fetch.
    #[default]
    RequireAll,
    /// At least one URI must fetch.
    BestEffort,
}

/// Per URI outcome of a fetch run.
#[derive(Debug)]
pub struct FetchReport {
    pub policy: FetchPolicy,
    pub fetched: Vec<String>,
    pub failed: Vec<(String, Error)>,
}

impl FetchReport {
    pub fn succeeded(&self) -> bool {
        match self.policy {
            FetchPolicy::RequireAll => self.failed.is_empty(),
            FetchPolicy::BestEffort => !self.fetched.is_empty() || self.failed.is_empty(),
        }
    }
}

pub struct RemoteDb {
    uris: Vec<String>,
    overlay_defs: Option<PathBuf>,
    format: DbFormat,
    load_mode: LoadMode,
    policy: FetchPolicy,
    cache: CatalogCache,
    client: Client,
}

impl RemoteDb {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            uris: settings.overlays.clone(),
            overlay_defs: settings.overlay_defs.clone(),
            format: settings.db_format,
            load_mode: settings.load_mode,
            policy: settings.fetch_policy,
            cache: CatalogCache::new(&settings.cache_dir),
            client: http_client(settings)?,
        })
    }

    pub fn uris(&self) -> &[String] {
        &self.uris
    }

    pub fn cache(&self) -> &CatalogCache {
        &self.cache
    }

    /// Fetches every configured catalog and caches the ones that parse. A
    /// failing URI keeps its previous cache entry and does not stop the
    /// others.
    pub fn fetch_remote_list(&self) -> FetchReport {
        let mut report = FetchReport {
            policy: self.policy,
            fetched: Vec::new(),
            failed: Vec::new(),
        };
        for uri in &self.uris {
            match self.fetch_one(uri) {
                Ok(path) => {
                    log::info!("Fetched {uri}");
                    log::debug!("Cached {uri} as {}", path.display());
                    report.fetched.push(uri.clone());
                }
                Err(err) => {
                    log::warn!("Failed to fetch {uri}: {err}");
                    report.failed.push((uri.clone(), err));
                }
            }
        }
        report
    }

    fn fetch_one(&self, uri: &str) -> Result<PathBuf> {
        let bytes = fetch_bytes(&self.client, uri)?;
        let origin = Path::new(uri);
        let text = std::str::from_utf8(&bytes).map_err(|e| Error::InvalidDatabase {
            path: origin.to_path_buf(),
            message: e.to_string(),
        })?;
        let format = DbFormat::for_document(origin, text, self.format);
        if !text.trim().is_empty() {
            let decoded = codec::decode(format, text, origin)?;
            if !decoded.skipped.is_empty() {
                log::warn!("{uri}: skipped {} malformed records", decoded.skipped.len());
            }
        }
        self.cache.store(uri, format, &bytes)
    }

    /// Documents that make up the available view, in merge order: cached
    /// catalogs in configured order, then local definition files by name.
    pub fn document_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .uris
            .iter()
            .filter_map(|uri| self.cache.cached_document(uri))
            .collect();
        if let Some(defs) = &self.overlay_defs {
            paths.extend(
                WalkDir::new(defs)
                    .min_depth(1)
                    .max_depth(1)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| entry.file_type().is_file())
                    .map(|entry| entry.into_path())
                    .filter(|path| {
                        matches!(path.extension().and_then(|e| e.to_str()), Some("xml" | "json"))
                    }),
            );
        }
        paths
    }

    /// Every overlay known from the cached catalogs and local definitions.
    pub fn available(&self) -> Result<Database> {
        let (db, report) = Database::open(&self.document_paths(), self.format, self.load_mode)?;
        if !report.skipped_records.is_empty() {
            log::warn!("Skipped {} malformed overlay records", report.skipped_records.len());
        }
        Ok(db)
    }

    /// Names of the available overlays in alphabetical order.
    pub fn get_available(&self) -> Result<Vec<String>> {
        Ok(self.available()?.names())
    }

    /// Info text for each requested overlay.
    pub fn get_info(&self, names: &[&str], verbose: bool) -> Result<BTreeMap<String, String>> {
        info_map(&self.available()?, names, verbose)
    }
}

pub(crate) fn info_map(db: &Database, names: &[&str], verbose: bool) -> Result<BTreeMap<String, String>> {
    names
        .iter()
        .map(|name| Ok((name.to_string(), db.select(name)?.info_text(verbose))))
        .collect()
}
