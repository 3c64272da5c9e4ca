//! Overlays shipped as a filesystem image that is loop-mounted read-only on
//! the overlay directory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use reqwest::blocking::Client;
use crate::driver::{Invocation, SyncDriver};
use crate::error::{Error, Result};
use crate::overlay::{Overlay, Source};
use crate::settings::CommandTemplate;
use crate::util::{fetch_bytes, write_atomic};
use super::{SyncStrategy, remove_dir_if_exists, run_post_sync};

const UNMOUNT: &str = "umount";

pub struct MountStrategy {
    client: Client,
    template: CommandTemplate,
    driver: Arc<dyn SyncDriver>,
}

impl MountStrategy {
    pub fn new(client: Client, template: CommandTemplate, driver: Arc<dyn SyncDriver>) -> Self {
        Self {
            client,
            template,
            driver,
        }
    }

    /// Where the image for the overlay mounted at `target` is kept.
    pub fn image_path(target: &Path) -> PathBuf {
        let mut name = target.file_name().unwrap_or_default().to_os_string();
        name.push(".squashfs");
        target.with_file_name(name)
    }

    fn download(&self, overlay: &Overlay, source: &Source, dest: &Path) -> Result<()> {
        let bytes = fetch_bytes(&self.client, &source.uri)
            .map_err(|e| Error::sync_failed(&overlay.name, e.to_string()))?;
        write_atomic(dest, &bytes)?;
        Ok(())
    }

    fn mount(&self, overlay: &Overlay, image: &Path, target: &Path) -> Result<()> {
        let invocation = Invocation::new(&self.template.command)
            .args(["-o", "loop,ro"])
            .args(self.template.add_args()?)
            .path_arg(image)
            .path_arg(target);
        self.driver
            .run(&invocation)
            .map_err(|e| Error::sync_failed(&overlay.name, e.to_string()))
    }

    fn unmount(&self, overlay: &Overlay, target: &Path) -> Result<()> {
        self.driver
            .run(&Invocation::new(UNMOUNT).path_arg(target))
            .map_err(|e| Error::sync_failed(&overlay.name, e.to_string()))
    }
}

impl SyncStrategy for MountStrategy {
    fn kind(&self) -> &str {
        "squashfs"
    }

    fn add(&self, overlay: &Overlay, source: &Source, target: &Path) -> Result<()> {
        let image = Self::image_path(target);
        self.download(overlay, source, &image)?;
        std::fs::create_dir_all(target)?;
        self.mount(overlay, &image, target)?;
        run_post_sync(self.driver.as_ref(), &self.template, overlay, target)
    }

    /// Downloads the new image next to the mounted one and mounts it before
    /// replacing the old image. When the new image cannot be mounted the old
    /// one is mounted again, so a broken artifact never leaves the overlay
    /// directory empty.
    fn sync(&self, overlay: &Overlay, source: &Source, target: &Path) -> Result<()> {
        let image = Self::image_path(target);
        let mut fresh = image.clone().into_os_string();
        fresh.push(".new");
        let fresh = PathBuf::from(fresh);
        self.download(overlay, source, &fresh)?;

        if let Err(err) = self.unmount(overlay, target) {
            std::fs::remove_file(&fresh)?;
            return Err(err);
        }
        if let Err(err) = self.mount(overlay, &fresh, target) {
            std::fs::remove_file(&fresh)?;
            if let Err(restore) = self.mount(overlay, &image, target) {
                return Err(Error::sync_failed(
                    &overlay.name,
                    format!("{err}; remounting the previous image failed too: {restore}"),
                ));
            }
            return Err(err);
        }
        // The loop device keeps the mounted inode, so the rename is safe.
        std::fs::rename(&fresh, &image)?;
        run_post_sync(self.driver.as_ref(), &self.template, overlay, target)
    }

    fn delete(&self, overlay: &Overlay, target: &Path) -> Result<()> {
        if target.exists() {
            if let Err(err) = self.unmount(overlay, target) {
                log::debug!("{err}; assuming {} is not mounted", target.display());
            }
        }
        remove_dir_if_exists(target)?;
        let image = Self::image_path(target);
        if image.exists() {
            std::fs::remove_file(image)?;
        }
        Ok(())
    }
}
