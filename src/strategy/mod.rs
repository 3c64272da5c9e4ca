//! Source-type specific ways of materialising an overlay on disk.
//!
//! Every source type (`git`, `tar`, `squashfs`, ...) has a [`SyncStrategy`].
//! The [`StrategyRegistry`] maps type tags to strategies and drives an
//! overlay's sources in order, so the database and the overlay model never
//! need to know which types exist.

pub mod archive;
pub mod mount;
pub mod vcs;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use crate::driver::{Invocation, SyncDriver};
use crate::error::{Error, Result};
use crate::overlay::{Overlay, Source};
use crate::settings::{CommandTemplate, Settings};
use crate::util::{http_client, lock_exclusive};

pub use archive::ArchiveStrategy;
pub use mount::MountStrategy;
pub use vcs::{Vcs, VcsStrategy};

/// add/sync/delete for one source type.
///
/// `target` is the overlay's own directory below the storage root.
pub trait SyncStrategy: Send + Sync {
    /// Type tag this strategy handles.
    fn kind(&self) -> &str;

    /// Materialises the overlay into `target`, which does not exist yet.
    fn add(&self, overlay: &Overlay, source: &Source, target: &Path) -> Result<()>;

    /// Brings an existing `target` up to date. On failure the content already
    /// in `target` must be left as it was.
    fn sync(&self, overlay: &Overlay, source: &Source, target: &Path) -> Result<()>;

    /// Removes `target` and anything else the strategy created for it.
    fn delete(&self, overlay: &Overlay, target: &Path) -> Result<()>;
}

#[derive(Default, Clone)]
pub struct StrategyRegistry {
    strategies: BTreeMap<String, Arc<dyn SyncStrategy>>,
    lock_dir: Option<PathBuf>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built in strategies, configured from `settings`.
    pub fn with_defaults(settings: &Settings, driver: Arc<dyn SyncDriver>) -> Result<Self> {
        let mut registry = StrategyRegistry::new();
        for vcs in Vcs::ALL {
            let kind = vcs.kind();
            registry.register(Arc::new(VcsStrategy::new(
                vcs,
                settings.command(kind),
                driver.clone(),
            )));
        }
        let client = http_client(settings)?;
        registry.register(Arc::new(ArchiveStrategy::new(
            client.clone(),
            settings.command("tar"),
            driver.clone(),
        )));
        registry.register(Arc::new(MountStrategy::new(
            client,
            settings.command("squashfs"),
            driver,
        )));
        registry.lock_dir = Some(settings.lock_dir());
        Ok(registry)
    }

    /// Registers `strategy` under its type tag, replacing any previous one.
    pub fn register(&mut self, strategy: Arc<dyn SyncStrategy>) {
        self.strategies.insert(strategy.kind().to_string(), strategy);
    }

    /// Serialises mutations of the same overlay across processes using lock
    /// files in `dir`.
    pub fn with_lock_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        self.lock_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn resolve(&self, overlay: &Overlay, kind: &str) -> Result<&dyn SyncStrategy> {
        self.strategies
            .get(kind)
            .map(|s| s.as_ref())
            .ok_or_else(|| Error::UnknownOverlayType {
                overlay: overlay.name.clone(),
                kind: kind.to_string(),
            })
    }

    /// Whether at least one of the overlay's sources can be synced.
    pub fn supports(&self, overlay: &Overlay) -> bool {
        overlay.sources.iter().any(|s| self.strategies.contains_key(&s.kind))
    }

    fn supported_sources<'a>(&'a self, overlay: &'a Overlay) -> Result<Vec<(&'a Source, &'a dyn SyncStrategy)>> {
        let mut supported = Vec::new();
        let mut unknown = None;
        for source in &overlay.sources {
            match self.resolve(overlay, &source.kind) {
                Ok(strategy) => supported.push((source, strategy)),
                Err(err) => {
                    log::warn!("{err}; trying next source");
                    unknown.get_or_insert(err);
                }
            }
        }
        match (supported.is_empty(), unknown) {
            (true, Some(err)) => Err(err),
            _ => Ok(supported),
        }
    }

    fn lock(&self, overlay: &Overlay) -> Result<Option<std::fs::File>> {
        match &self.lock_dir {
            Some(dir) => Ok(Some(lock_exclusive(dir, &format!("overlay:{}", overlay.name))?)),
            None => Ok(None),
        }
    }

    /// Materialises the overlay below `storage`, trying its sources in order.
    ///
    /// Either the overlay directory exists afterwards and holds the content of
    /// one source, or nothing was left behind.
    pub fn add(&self, overlay: &Overlay, storage: &Path) -> Result<PathBuf> {
        let target = overlay.target_dir(storage);
        let _guard = self.lock(overlay)?;
        if target.exists() {
            return Err(Error::AlreadyInstalled {
                name: overlay.name.clone(),
                path: target,
            });
        }
        std::fs::create_dir_all(storage)?;

        let mut last_error = None;
        for (source, strategy) in self.supported_sources(overlay)? {
            match strategy.add(overlay, source, &target) {
                Ok(()) => {
                    log::info!("Added overlay {} from {}", overlay.name, source.uri);
                    return Ok(target);
                }
                Err(err) => {
                    log::warn!("Adding {} from {} failed: {err}", overlay.name, source.uri);
                    if target.exists() {
                        strategy.delete(overlay, &target)?;
                    }
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| Error::sync_failed(&overlay.name, "no usable source")))
    }

    /// Updates an installed overlay. Sources of the same type as the first
    /// usable one are tried in order; the existing content is kept whatever
    /// happens.
    pub fn sync(&self, overlay: &Overlay, storage: &Path) -> Result<()> {
        let target = overlay.target_dir(storage);
        let _guard = self.lock(overlay)?;
        if !target.exists() {
            return Err(Error::sync_failed(
                &overlay.name,
                format!("{} does not exist; add the overlay first", target.display()),
            ));
        }

        let candidates = self.supported_sources(overlay)?;
        let Some(kind) = candidates.first().map(|(source, _)| source.kind.clone()) else {
            return Err(Error::sync_failed(&overlay.name, "no usable source"));
        };
        let mut last_error = None;
        for (source, strategy) in candidates.into_iter().filter(|(s, _)| s.kind == kind) {
            match strategy.sync(overlay, source, &target) {
                Ok(()) => {
                    log::info!("Synced overlay {} from {}", overlay.name, source.uri);
                    return Ok(());
                }
                Err(err) => {
                    log::warn!("Syncing {} from {} failed: {err}", overlay.name, source.uri);
                    last_error = Some(err);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| Error::sync_failed(&overlay.name, "no usable source")))
    }

    /// Removes the overlay directory. Succeeds when it is already gone.
    pub fn delete(&self, overlay: &Overlay, storage: &Path) -> Result<()> {
        let target = overlay.target_dir(storage);
        let _guard = self.lock(overlay)?;
        match self.supported_sources(overlay).ok().and_then(|s| s.first().map(|(_, st)| *st)) {
            Some(strategy) => strategy.delete(overlay, &target)?,
            None => remove_dir_if_exists(&target)?,
        }
        log::info!("Deleted overlay {}", overlay.name);
        Ok(())
    }
}

pub(crate) fn remove_dir_if_exists(path: &Path) -> Result<()> {
    if path.exists() {
        std::fs::remove_dir_all(path)?;
    }
    Ok(())
}

/// Runs the configured post-sync command inside `target`, if there is one.
pub(crate) fn run_post_sync(
    driver: &dyn SyncDriver,
    template: &CommandTemplate,
    overlay: &Overlay,
    target: &Path,
) -> Result<()> {
    let args = template.post_sync_args()?;
    let Some((program, rest)) = args.split_first() else {
        return Ok(());
    };
    let invocation = Invocation::new(program).args(rest).current_dir(target);
    driver
        .run(&invocation)
        .map_err(|e| Error::sync_failed(&overlay.name, format!("post-sync hook: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Creates the target on add unless the URI contains "broken".
    #[derive(Default)]
    struct DirStrategy {
        tag: String,
        synced: Mutex<Vec<String>>,
    }

    impl DirStrategy {
        fn new(tag: &str) -> Self {
            Self {
                tag: tag.to_string(),
                synced: Mutex::new(Vec::new()),
            }
        }
    }

    impl SyncStrategy for DirStrategy {
        fn kind(&self) -> &str {
            &self.tag
        }

        fn add(&self, overlay: &Overlay, source: &Source, target: &Path) -> Result<()> {
            std::fs::create_dir_all(target)?;
            if source.uri.contains("broken") {
                return Err(Error::sync_failed(&overlay.name, "broken source"));
            }
            std::fs::write(target.join("uri"), &source.uri)?;
            Ok(())
        }

        fn sync(&self, overlay: &Overlay, source: &Source, _target: &Path) -> Result<()> {
            self.synced.lock().unwrap().push(source.uri.clone());
            if source.uri.contains("broken") {
                return Err(Error::sync_failed(&overlay.name, "broken source"));
            }
            Ok(())
        }

        fn delete(&self, _overlay: &Overlay, target: &Path) -> Result<()> {
            remove_dir_if_exists(target)
        }
    }

    fn registry() -> (StrategyRegistry, Arc<DirStrategy>) {
        let strategy = Arc::new(DirStrategy::new("dir"));
        let mut registry = StrategyRegistry::new();
        registry.register(strategy.clone());
        (registry, strategy)
    }

    #[test]
    fn test_add_falls_back_to_next_source() {
        let dir = tempdir().unwrap();
        let (registry, _) = registry();
        let overlay = Overlay::new(
            "o",
            vec![
                Source::new("nowhere://x", "unknown"),
                Source::new("broken://primary", "dir"),
                Source::new("ok://mirror", "dir"),
            ],
        );
        let target = registry.add(&overlay, dir.path()).unwrap();
        assert_eq!(std::fs::read_to_string(target.join("uri")).unwrap(), "ok://mirror");
    }

    #[test]
    fn test_failed_add_leaves_nothing_behind() {
        let dir = tempdir().unwrap();
        let (registry, _) = registry();
        let overlay = Overlay::new("o", vec![Source::new("broken://x", "dir")]);
        assert!(matches!(registry.add(&overlay, dir.path()), Err(Error::SyncFailed { .. })));
        assert!(!dir.path().join("o").exists());
    }

    #[test]
    fn test_add_refuses_existing_directory() {
        let dir = tempdir().unwrap();
        let (registry, _) = registry();
        std::fs::create_dir_all(dir.path().join("o")).unwrap();
        let overlay = Overlay::new("o", vec![Source::new("ok://x", "dir")]);
        assert!(matches!(
            registry.add(&overlay, dir.path()),
            Err(Error::AlreadyInstalled { .. })
        ));
    }

    #[test]
    fn test_unknown_type_only_fails_when_used() {
        let dir = tempdir().unwrap();
        let (registry, _) = registry();
        let overlay = Overlay::new("o", vec![Source::new("x://y", "darcs2")]);
        assert!(!registry.supports(&overlay));
        assert!(matches!(
            registry.add(&overlay, dir.path()),
            Err(Error::UnknownOverlayType { .. })
        ));
        assert!(registry.delete(&overlay, dir.path()).is_ok());
    }

    #[test]
    fn test_sync_tries_mirrors_of_same_type() {
        let dir = tempdir().unwrap();
        let (registry, strategy) = registry();
        let overlay = Overlay::new(
            "o",
            vec![Source::new("broken://a", "dir"), Source::new("ok://b", "dir")],
        );
        std::fs::create_dir_all(dir.path().join("o")).unwrap();
        registry.sync(&overlay, dir.path()).unwrap();
        assert_eq!(*strategy.synced.lock().unwrap(), vec!["broken://a", "ok://b"]);
    }

    #[test]
    fn test_sync_requires_installed_directory_and_delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let (registry, _) = registry();
        let registry = registry.with_lock_dir(dir.path().join("locks"));
        let overlay = Overlay::new("o", vec![Source::new("ok://b", "dir")]);
        assert!(matches!(registry.sync(&overlay, dir.path()), Err(Error::SyncFailed { .. })));
        registry.add(&overlay, dir.path()).unwrap();
        registry.delete(&overlay, dir.path()).unwrap();
        registry.delete(&overlay, dir.path()).unwrap();
        assert!(!dir.path().join("o").exists());
    }
}
