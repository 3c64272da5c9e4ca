//! The [`Layman`] facade ties catalogs, the installed database, the sync
//! strategies and the package manager config together.
//!
//! Batch operations treat every overlay independently: a recoverable error
//! for one name is recorded in the [`BatchReport`] and the next name is
//! processed. Errors that affect the whole run (unreadable settings, a
//! database that cannot be written) abort the batch.

use std::collections::BTreeMap;
use std::sync::Arc;
use crate::driver::{ProcessDriver, SyncDriver};
use crate::error::{Error, Result};
use crate::installed::InstalledDb;
use crate::remote::{FetchReport, RemoteDb, info_map};
use crate::repoconf::RepoConfManager;
use crate::settings::Settings;
use crate::strategy::StrategyRegistry;
use crate::util::ensure_layman_dirs;

/// Per overlay outcome of a batch operation.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, Error)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, name: &str, outcome: Result<()>) -> Result<()> {
        match outcome {
            Ok(()) => self.succeeded.push(name.to_string()),
            Err(err) if err.is_recoverable() => {
                log::warn!("{err}");
                self.failed.push((name.to_string(), err));
            }
            Err(err) => return Err(err),
        }
        Ok(())
    }
}

pub struct Layman {
    settings: Settings,
    driver: Arc<dyn SyncDriver>,
}

impl Layman {
    /// Runs the real external tools.
    pub fn new(settings: Settings) -> Self {
        Self::with_driver(settings, Arc::new(ProcessDriver))
    }

    pub fn with_driver(settings: Settings, driver: Arc<dyn SyncDriver>) -> Self {
        Self { settings, driver }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn remote(&self) -> Result<RemoteDb> {
        RemoteDb::new(&self.settings)
    }

    pub fn installed(&self) -> Result<InstalledDb> {
        let registry = StrategyRegistry::with_defaults(&self.settings, self.driver.clone())?;
        let (installed, report) = InstalledDb::open(&self.settings, registry)?;
        for err in &report.invalid_documents {
            log::warn!("{err}");
        }
        Ok(installed)
    }

    pub fn repo_conf(&self) -> RepoConfManager {
        RepoConfManager::new(&self.settings)
    }

    pub fn fetch_remote_list(&self) -> Result<FetchReport> {
        ensure_layman_dirs(&self.settings)?;
        Ok(self.remote()?.fetch_remote_list())
    }

    pub fn get_available(&self) -> Result<Vec<String>> {
        self.remote()?.get_available()
    }

    pub fn get_installed(&self) -> Result<Vec<String>> {
        Ok(self.installed()?.db().names())
    }

    /// Info text per name, from the installed database when `local` is set
    /// and from the available catalogs otherwise.
    pub fn get_info(&self, names: &[&str], verbose: bool, local: bool) -> Result<BTreeMap<String, String>> {
        if local {
            info_map(self.installed()?.db(), names, verbose)
        } else {
            self.remote()?.get_info(names, verbose)
        }
    }

    /// One line per overlay, available or installed.
    pub fn list(&self, local: bool, verbose: bool, width: usize) -> Result<Vec<String>> {
        if local {
            Ok(self.installed()?.db().list(verbose, width))
        } else {
            Ok(self.remote()?.available()?.list(verbose, width))
        }
    }

    /// Installs the named overlays from the available catalogs and registers
    /// them with the package manager.
    pub fn add_repos(&self, names: &[&str]) -> Result<BatchReport> {
        ensure_layman_dirs(&self.settings)?;
        let available = self.remote()?.available()?;
        let mut installed = self.installed()?;
        let conf = self.repo_conf();
        let mut report = BatchReport::default();
        for name in names {
            let outcome = available.select(name).and_then(|overlay| {
                if installed.add(overlay)? {
                    conf.add_entry(overlay)
                } else {
                    Err(Error::sync_failed(name, "could not be added"))
                }
            });
            report.record(name, outcome)?;
        }
        Ok(report)
    }

    /// Removes the named overlays from disk, the installed database and the
    /// package manager config.
    pub fn delete_repos(&self, names: &[&str]) -> Result<BatchReport> {
        let mut installed = self.installed()?;
        let conf = self.repo_conf();
        let mut report = BatchReport::default();
        for name in names {
            let outcome = installed.db().select(name).cloned().and_then(|overlay| {
                installed.delete(name)?;
                conf.delete_entry(&overlay)
            });
            report.record(name, outcome)?;
        }
        Ok(report)
    }

    pub fn sync(&self, names: &[&str]) -> Result<BatchReport> {
        let installed = self.installed()?;
        let mut report = BatchReport::default();
        for name in names {
            report.record(name, installed.sync(name))?;
        }
        Ok(report)
    }

    pub fn sync_all(&self) -> Result<BatchReport> {
        let installed = self.installed()?;
        let mut report = BatchReport::default();
        for (name, outcome) in installed.sync_all() {
            report.record(&name, outcome)?;
        }
        Ok(report)
    }

    pub fn enable(&self, names: &[&str]) -> Result<BatchReport> {
        let installed = self.installed()?;
        let conf = self.repo_conf();
        let mut report = BatchReport::default();
        for name in names {
            let outcome = installed.db().select(name).and_then(|overlay| conf.enable(overlay));
            report.record(name, outcome)?;
        }
        Ok(report)
    }

    pub fn disable(&self, names: &[&str]) -> Result<BatchReport> {
        let installed = self.installed()?;
        let conf = self.repo_conf();
        let mut report = BatchReport::default();
        for name in names {
            let outcome = installed.db().select(name).and_then(|overlay| conf.disable(overlay));
            report.record(name, outcome)?;
        }
        Ok(report)
    }

    /// Drops cache entries of catalogs that are no longer configured.
    /// Returns the number of files removed.
    pub fn clean_cache(&self) -> Result<usize> {
        let removed = self.remote()?.cache().remove_stale(&self.settings.overlays)?;
        log::info!("Removed {removed} stale cache files");
        Ok(removed)
    }
}
