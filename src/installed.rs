//! The database of installed overlays.
//!
//! Wraps a [`Database`] backed by the `installed` file from the settings and
//! keeps it consistent with the storage directory: an overlay is only
//! recorded once its strategy materialised it, and only forgotten after its
//! directory was removed.
//!
//! Every change re-reads the file under an exclusive lock before writing it
//! back, so concurrent invocations working on different overlays do not drop
//! each other's records.

use std::path::PathBuf;
use crate::db::{Database, LoadMode, LoadReport};
use crate::error::{Error, Result};
use crate::overlay::Overlay;
use crate::settings::Settings;
use crate::strategy::StrategyRegistry;
use crate::util::lock_exclusive;

pub struct InstalledDb {
    db: Database,
    path: PathBuf,
    storage: PathBuf,
    lock_dir: PathBuf,
    load_mode: LoadMode,
    registry: StrategyRegistry,
}

impl InstalledDb {
    /// Loads the installed database. A missing file is an empty database.
    pub fn open(settings: &Settings, registry: StrategyRegistry) -> Result<(Self, LoadReport)> {
        let (db, report) = Database::open(&[&settings.installed], settings.db_format, settings.load_mode)?;
        let installed = InstalledDb {
            db,
            path: settings.installed.clone(),
            storage: settings.storage.clone(),
            lock_dir: settings.lock_dir(),
            load_mode: settings.load_mode,
            registry,
        };
        Ok((installed, report))
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Where the overlay is, or would be, materialised.
    pub fn target_dir(&self, overlay: &Overlay) -> PathBuf {
        overlay.target_dir(&self.storage)
    }

    /// Materialises `overlay` and records it.
    ///
    /// Returns `Ok(false)` when the strategy could not fetch the overlay; the
    /// database and the storage directory are then unchanged. Preconditions
    /// (already installed, unsupported source types) and persistence failures
    /// are errors.
    pub fn add(&mut self, overlay: &Overlay) -> Result<bool> {
        overlay.validate()?;
        if self.db.contains(&overlay.name) {
            return Err(Error::AlreadyInstalled {
                name: overlay.name.clone(),
                path: self.target_dir(overlay),
            });
        }
        match self.registry.add(overlay, &self.storage) {
            Ok(_) => {}
            Err(err @ (Error::SyncFailed { .. } | Error::Network { .. })) => {
                log::error!("{err}");
                return Ok(false);
            }
            Err(err) => return Err(err),
        }
        self.commit(|db| db.insert(overlay.clone()).map(|_| ()))?;
        Ok(true)
    }

    /// Updates one installed overlay in place.
    pub fn sync(&self, name: &str) -> Result<()> {
        let overlay = self.db.select(name)?;
        self.registry.sync(overlay, &self.storage)
    }

    /// Syncs every installed overlay independently, in priority order.
    pub fn sync_all(&self) -> Vec<(String, Result<()>)> {
        self.db
            .by_priority()
            .into_iter()
            .map(|overlay| (overlay.name.clone(), self.registry.sync(overlay, &self.storage)))
            .collect()
    }

    /// Removes the overlay's directory and forgets it. Succeeds when the
    /// directory is already gone.
    pub fn delete(&mut self, name: &str) -> Result<bool> {
        let overlay = self.db.select(name)?.clone();
        self.registry.delete(&overlay, &self.storage)?;
        self.commit(|db| {
            db.remove(name);
            Ok(())
        })?;
        Ok(true)
    }

    /// Applies `change` to the current file content and writes it back while
    /// holding the database lock. The in-memory view is only replaced once
    /// the write succeeded.
    fn commit<F>(&mut self, change: F) -> Result<()>
    where
        F: FnOnce(&mut Database) -> Result<()>,
    {
        let _lock = lock_exclusive(&self.lock_dir, &format!("installed:{}", self.path.display()))?;
        let (mut current, _) = Database::open(&[&self.path], self.db.format(), self.load_mode)?;
        change(&mut current)?;
        current.write(&self.path)?;
        self.db = current;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::driver::fake::RecordingDriver;
    use crate::overlay::Source;
    use crate::strategy::{Vcs, VcsStrategy};
    use crate::settings::CommandTemplate;
    use tempfile::tempdir;

    fn registry(driver: Arc<RecordingDriver>) -> StrategyRegistry {
        let mut registry = StrategyRegistry::new();
        registry.register(Arc::new(VcsStrategy::new(Vcs::Git, CommandTemplate::new("git"), driver)));
        registry
    }

    fn overlay(name: &str) -> Overlay {
        Overlay::new(name, vec![Source::new(&format!("https://example.org/{name}.git"), "git")])
    }

    #[test]
    fn test_add_persists_and_delete_forgets() {
        let dir = tempdir().unwrap();
        let settings = Settings::with_storage(dir.path());
        let driver = Arc::new(RecordingDriver::default());
        let (mut installed, _) = InstalledDb::open(&settings, registry(driver.clone())).unwrap();

        assert!(installed.add(&overlay("wrobel")).unwrap());
        assert!(dir.path().join("wrobel").is_dir());
        let (reopened, _) = InstalledDb::open(&settings, registry(driver.clone())).unwrap();
        assert_eq!(reopened.db().names(), vec!["wrobel"]);

        assert!(matches!(
            installed.add(&overlay("wrobel")),
            Err(Error::AlreadyInstalled { .. })
        ));

        std::fs::remove_dir_all(dir.path().join("wrobel")).unwrap();
        assert!(installed.delete("wrobel").unwrap());
        let (reopened, _) = InstalledDb::open(&settings, registry(driver)).unwrap();
        assert!(reopened.db().is_empty());
        assert!(matches!(installed.delete("wrobel"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_failed_add_changes_nothing() {
        let dir = tempdir().unwrap();
        let settings = Settings::with_storage(dir.path());
        let driver = Arc::new(RecordingDriver::failing(&["clone"]));
        let (mut installed, _) = InstalledDb::open(&settings, registry(driver)).unwrap();

        assert!(!installed.add(&overlay("wrobel")).unwrap());
        assert!(installed.db().is_empty());
        assert!(!dir.path().join("wrobel").exists());
        assert!(!settings.installed.exists());
    }

    #[test]
    fn test_unsupported_type_is_an_error() {
        let dir = tempdir().unwrap();
        let settings = Settings::with_storage(dir.path());
        let (mut installed, _) =
            InstalledDb::open(&settings, registry(Arc::new(RecordingDriver::default()))).unwrap();
        let odd = Overlay::new("odd", vec![Source::new("foo://odd", "foo")]);
        assert!(matches!(installed.add(&odd), Err(Error::UnknownOverlayType { .. })));
    }

    #[test]
    fn test_sync_all_reports_each_overlay() {
        let dir = tempdir().unwrap();
        let settings = Settings::with_storage(dir.path());
        let driver = Arc::new(RecordingDriver::default());
        let (mut installed, _) = InstalledDb::open(&settings, registry(driver.clone())).unwrap();
        installed.add(&overlay("a")).unwrap();
        installed.add(&overlay("b")).unwrap();
        std::fs::remove_dir_all(dir.path().join("b")).unwrap();

        let results = installed.sync_all();
        assert_eq!(results.len(), 2);
        assert!(results[0].1.is_ok());
        assert!(matches!(results[1].1, Err(Error::SyncFailed { .. })));
        assert!(driver.commands().contains(&"git pull".to_string()));
    }

    #[test]
    fn test_two_instances_keep_each_others_records() {
        let dir = tempdir().unwrap();
        let settings = Settings::with_storage(dir.path());
        let driver = Arc::new(RecordingDriver::default());
        let (mut first, _) = InstalledDb::open(&settings, registry(driver.clone())).unwrap();
        let (mut second, _) = InstalledDb::open(&settings, registry(driver.clone())).unwrap();

        assert!(first.add(&overlay("a")).unwrap());
        assert!(second.add(&overlay("b")).unwrap());
        assert_eq!(second.db().names(), vec!["a", "b"]);

        let (reopened, _) = InstalledDb::open(&settings, registry(driver.clone())).unwrap();
        assert_eq!(reopened.db().names(), vec!["a", "b"]);

        assert!(first.delete("a").unwrap());
        let (reopened, _) = InstalledDb::open(&settings, registry(driver)).unwrap();
        assert_eq!(reopened.db().names(), vec!["b"]);
    }
}
