//! Registers installed overlays with the package manager.
//!
//! Each managed file has a [`RepoConfAdapter`] that knows its syntax and
//! rewrites only the part that belongs to an overlay. The
//! [`RepoConfManager`] runs the read-modify-write cycle for every configured
//! adapter under an exclusive file lock and replaces files atomically.

pub mod make_conf;
pub mod repos_conf;

use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::error::{Error, Result};
use crate::overlay::Overlay;
use crate::settings::Settings;
use crate::util::{lock_exclusive, write_atomic};

pub use make_conf::MakeConf;
pub use repos_conf::ReposConf;

/// Kinds of package manager config files that can be kept in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConfType {
    /// A path list assignment in `make.conf`.
    #[serde(rename = "make.conf")]
    MakeConf,
    /// One section per overlay in `repos.conf`.
    #[serde(rename = "repos.conf")]
    ReposConf,
}

impl fmt::Display for ConfType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfType::MakeConf => write!(f, "make.conf"),
            ConfType::ReposConf => write!(f, "repos.conf"),
        }
    }
}

/// What a config file needs to know about one overlay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoEntry {
    pub name: String,
    pub location: PathBuf,
    pub priority: i32,
    pub kind: String,
    pub sync_uri: String,
}

impl RepoEntry {
    pub fn new(overlay: &Overlay, storage: &Path) -> Self {
        let primary = overlay.sources.first();
        RepoEntry {
            name: overlay.name.clone(),
            location: overlay.target_dir(storage),
            priority: overlay.priority,
            kind: primary.map(|s| s.kind.clone()).unwrap_or_default(),
            sync_uri: primary.map(|s| s.uri.clone()).unwrap_or_default(),
        }
    }
}

/// Syntax of one managed file. Every method maps the current file content to
/// the new content and must leave everything outside the overlay's own
/// entry byte for byte as it was.
pub trait RepoConfAdapter: Send + Sync {
    fn conf_type(&self) -> ConfType;

    fn path(&self) -> &Path;

    /// Adds the entry in its enabled state, replacing an existing one.
    fn add_entry(&self, content: &str, entry: &RepoEntry) -> String;

    fn enable(&self, content: &str, entry: &RepoEntry) -> String;

    /// Makes the package manager ignore the overlay while keeping enough
    /// behind for [`enable`](Self::enable) to restore it.
    fn disable(&self, content: &str, entry: &RepoEntry) -> String;

    /// Removes every trace of the overlay.
    fn delete_entry(&self, content: &str, entry: &RepoEntry) -> String;

    fn enabled_names(&self, content: &str) -> Vec<String>;
}

pub struct RepoConfManager {
    adapters: Vec<Box<dyn RepoConfAdapter>>,
    storage: PathBuf,
    lock_dir: PathBuf,
}

impl RepoConfManager {
    /// Manager for the config files selected in the settings.
    pub fn new(settings: &Settings) -> Self {
        let mut types = settings.conf_types.clone();
        types.dedup();
        let adapters = types
            .into_iter()
            .map(|conf_type| -> Box<dyn RepoConfAdapter> {
                match conf_type {
                    ConfType::MakeConf => Box::new(MakeConf::new(&settings.make_conf)),
                    ConfType::ReposConf => Box::new(ReposConf::new(&settings.repos_conf, settings.auto_sync)),
                }
            })
            .collect();
        Self::with_adapters(adapters, &settings.storage, settings.lock_dir())
    }

    pub fn with_adapters<P: AsRef<Path>>(
        adapters: Vec<Box<dyn RepoConfAdapter>>,
        storage: P,
        lock_dir: PathBuf,
    ) -> Self {
        Self {
            adapters,
            storage: storage.as_ref().to_path_buf(),
            lock_dir,
        }
    }

    pub fn add_entry(&self, overlay: &Overlay) -> Result<()> {
        let entry = RepoEntry::new(overlay, &self.storage);
        self.update_all(|adapter, content| adapter.add_entry(content, &entry))
    }

    pub fn enable(&self, overlay: &Overlay) -> Result<()> {
        let entry = RepoEntry::new(overlay, &self.storage);
        self.update_all(|adapter, content| adapter.enable(content, &entry))
    }

    pub fn disable(&self, overlay: &Overlay) -> Result<()> {
        let entry = RepoEntry::new(overlay, &self.storage);
        self.update_all(|adapter, content| adapter.disable(content, &entry))
    }

    pub fn delete_entry(&self, overlay: &Overlay) -> Result<()> {
        let entry = RepoEntry::new(overlay, &self.storage);
        self.update_all(|adapter, content| adapter.delete_entry(content, &entry))
    }

    /// Names enabled in any of the managed files, as found on disk.
    pub fn enabled_names(&self) -> Result<BTreeSet<String>> {
        let mut names = BTreeSet::new();
        for adapter in &self.adapters {
            let content = read_conf(adapter.path())?;
            names.extend(adapter.enabled_names(&content));
        }
        Ok(names)
    }

    fn update_all<F>(&self, change: F) -> Result<()>
    where
        F: Fn(&dyn RepoConfAdapter, &str) -> String,
    {
        for adapter in &self.adapters {
            self.update(adapter.as_ref(), &change)?;
        }
        Ok(())
    }

    fn update<F>(&self, adapter: &dyn RepoConfAdapter, change: &F) -> Result<()>
    where
        F: Fn(&dyn RepoConfAdapter, &str) -> String,
    {
        let path = adapter.path();
        let config_error = |e: std::io::Error| Error::ConfigWrite {
            path: path.to_path_buf(),
            message: e.to_string(),
        };
        let _lock = lock_exclusive(&self.lock_dir, &format!("conf:{}", path.display()))
            .map_err(config_error)?;
        let content = read_conf(path)?;
        let updated = change(adapter, &content);
        if updated != content {
            write_atomic(path, updated.as_bytes()).map_err(config_error)?;
            log::debug!("Updated {} ({})", path.display(), adapter.conf_type());
        }
        Ok(())
    }
}

fn read_conf(path: &Path) -> Result<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
        Err(e) => Err(Error::ConfigWrite {
            path: path.to_path_buf(),
            message: e.to_string(),
        }),
    }
}
