//! Overlays distributed as a single archive: a plain, gzip, bzip2 or xz
//! compressed tarball, or a zip file.
//!
//! The archive is downloaded and unpacked into a staging directory next to
//! the overlay directory, then renamed into place. A sync unpacks the fresh
//! archive the same way and only swaps directories once that succeeded, so a
//! missing or broken archive never touches the installed copy.

use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use xz2::read::XzDecoder;
use reqwest::blocking::Client;
use tempfile::TempDir;
use crate::driver::SyncDriver;
use crate::error::{Error, Result};
use crate::overlay::{Overlay, Source};
use crate::settings::CommandTemplate;
use crate::util::fetch_bytes;
use super::{SyncStrategy, remove_dir_if_exists, run_post_sync};

const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const BZIP2_MAGIC: &[u8] = b"BZh";
const XZ_MAGIC: &[u8] = b"\xFD7zXZ\x00";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Packing {
    Tar,
    TarGz,
    TarBz2,
    TarXz,
    Zip,
}

impl Packing {
    fn detect(bytes: &[u8]) -> Packing {
        if bytes.starts_with(GZIP_MAGIC) {
            Packing::TarGz
        } else if bytes.starts_with(BZIP2_MAGIC) {
            Packing::TarBz2
        } else if bytes.starts_with(XZ_MAGIC) {
            Packing::TarXz
        } else if bytes.starts_with(ZIP_MAGIC) {
            Packing::Zip
        } else {
            Packing::Tar
        }
    }
}

pub struct ArchiveStrategy {
    client: Client,
    template: CommandTemplate,
    driver: Arc<dyn SyncDriver>,
}

impl ArchiveStrategy {
    pub fn new(client: Client, template: CommandTemplate, driver: Arc<dyn SyncDriver>) -> Self {
        Self {
            client,
            template,
            driver,
        }
    }

    /// Downloads and unpacks the archive into a fresh staging directory next
    /// to `target`. Returns the staging directory and the path of the overlay
    /// root inside it.
    fn stage(&self, overlay: &Overlay, source: &Source, target: &Path) -> Result<(TempDir, PathBuf)> {
        let bytes = fetch_bytes(&self.client, &source.uri)
            .map_err(|e| Error::sync_failed(&overlay.name, e.to_string()))?;
        let parent = target.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(parent)?;
        let staging = tempfile::Builder::new()
            .prefix(".layman-")
            .tempdir_in(parent)?;
        let content = staging.path().join("content");
        std::fs::create_dir_all(&content)?;
        unpack(&bytes, &content).map_err(|message| {
            Error::sync_failed(&overlay.name, format!("cannot unpack {}: {message}", source.uri))
        })?;

        let root = match source.branch.as_str() {
            "" => content,
            subdir => content.join(subdir),
        };
        if !root.is_dir() {
            return Err(Error::sync_failed(
                &overlay.name,
                format!("{} does not contain {}", source.uri, source.branch),
            ));
        }
        Ok((staging, root))
    }
}

fn unpack(bytes: &[u8], dest: &Path) -> std::result::Result<(), String> {
    match Packing::detect(bytes) {
        Packing::TarGz => tar::Archive::new(GzDecoder::new(Cursor::new(bytes)))
            .unpack(dest)
            .map_err(|e| e.to_string()),
        Packing::TarBz2 => tar::Archive::new(BzDecoder::new(Cursor::new(bytes)))
            .unpack(dest)
            .map_err(|e| e.to_string()),
        Packing::TarXz => tar::Archive::new(XzDecoder::new(Cursor::new(bytes)))
            .unpack(dest)
            .map_err(|e| e.to_string()),
        Packing::Tar => tar::Archive::new(Cursor::new(bytes))
            .unpack(dest)
            .map_err(|e| e.to_string()),
        Packing::Zip => zip::ZipArchive::new(Cursor::new(bytes))
            .and_then(|mut archive| archive.extract(dest))
            .map_err(|e| e.to_string()),
    }
}

impl SyncStrategy for ArchiveStrategy {
    fn kind(&self) -> &str {
        "tar"
    }

    fn add(&self, overlay: &Overlay, source: &Source, target: &Path) -> Result<()> {
        let (_staging, root) = self.stage(overlay, source, target)?;
        std::fs::rename(&root, target)?;
        run_post_sync(self.driver.as_ref(), &self.template, overlay, target)
    }

    fn sync(&self, overlay: &Overlay, source: &Source, target: &Path) -> Result<()> {
        let (staging, root) = self.stage(overlay, source, target)?;
        let backup = staging.path().join("previous");
        std::fs::rename(target, &backup)?;
        if let Err(err) = std::fs::rename(&root, target) {
            std::fs::rename(&backup, target)?;
            return Err(Error::sync_failed(&overlay.name, err.to_string()));
        }
        run_post_sync(self.driver.as_ref(), &self.template, overlay, target)
    }

    fn delete(&self, _overlay: &Overlay, target: &Path) -> Result<()> {
        remove_dir_if_exists(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use crate::driver::fake::RecordingDriver;
    use tempfile::tempdir;

    #[derive(Clone, Copy)]
    enum Compress {
        None,
        Gzip,
        Bzip2,
        Xz,
    }

    fn tarball(files: &[(&str, &str)], compress: Compress) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, path, content.as_bytes()).unwrap();
        }
        let bytes = builder.into_inner().unwrap();
        match compress {
            Compress::None => bytes,
            Compress::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(&bytes).unwrap();
                encoder.finish().unwrap()
            }
            Compress::Bzip2 => {
                let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
                encoder.write_all(&bytes).unwrap();
                encoder.finish().unwrap()
            }
            Compress::Xz => {
                let mut encoder = xz2::write::XzEncoder::new(Vec::new(), 6);
                encoder.write_all(&bytes).unwrap();
                encoder.finish().unwrap()
            }
        }
    }

    fn zipball(files: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (path, content) in files {
            writer
                .start_file(*path, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn strategy(driver: Arc<RecordingDriver>) -> ArchiveStrategy {
        ArchiveStrategy::new(Client::new(), CommandTemplate::new("tar"), driver)
    }

    #[test]
    fn test_detect_packing() {
        assert_eq!(Packing::detect(&tarball(&[("a", "b")], Compress::Gzip)), Packing::TarGz);
        assert_eq!(Packing::detect(&tarball(&[("a", "b")], Compress::Bzip2)), Packing::TarBz2);
        assert_eq!(Packing::detect(&tarball(&[("a", "b")], Compress::Xz)), Packing::TarXz);
        assert_eq!(Packing::detect(&tarball(&[("a", "b")], Compress::None)), Packing::Tar);
        assert_eq!(Packing::detect(&zipball(&[("a", "b")])), Packing::Zip);
    }

    #[test]
    fn test_add_with_subdir_then_sync_after_archive_vanished() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("layman-test.tar.bz2");
        std::fs::write(
            &archive,
            tarball(&[("layman-test/dev-util/test/test-1.ebuild", "EAPI=8\n")], Compress::Bzip2),
        )
        .unwrap();
        let storage = dir.path().join("storage");
        let target = storage.join("layman-test");
        let source = Source::new(archive.to_str().unwrap(), "tar").with_branch("layman-test");
        let overlay = Overlay::new("layman-test", vec![source.clone()]);
        let tar = strategy(Arc::new(RecordingDriver::default()));

        tar.add(&overlay, &source, &target).unwrap();
        assert!(target.join("dev-util/test/test-1.ebuild").exists());

        std::fs::remove_file(&archive).unwrap();
        let err = tar.sync(&overlay, &source, &target).unwrap_err();
        assert!(matches!(err, Error::SyncFailed { .. }));
        assert!(target.join("dev-util/test/test-1.ebuild").exists());

        tar.delete(&overlay, &target).unwrap();
        assert!(!target.exists());
        assert_eq!(std::fs::read_dir(&storage).unwrap().count(), 0);
    }

    #[test]
    fn test_sync_replaces_content() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("o.zip");
        std::fs::write(&archive, zipball(&[("profiles/repo_name", "o\n")])).unwrap();
        let target = dir.path().join("storage").join("o");
        let source = Source::new(archive.to_str().unwrap(), "tar");
        let overlay = Overlay::new("o", vec![source.clone()]);
        let tar = strategy(Arc::new(RecordingDriver::default()));
        tar.add(&overlay, &source, &target).unwrap();

        std::fs::write(&archive, tarball(&[("metadata/layout.conf", "masters = gentoo\n")], Compress::Xz)).unwrap();
        tar.sync(&overlay, &source, &target).unwrap();
        assert!(target.join("metadata/layout.conf").exists());
        assert!(!target.join("profiles/repo_name").exists());
    }

    #[test]
    fn test_missing_subdir_is_sync_failed() {
        let dir = tempdir().unwrap();
        let archive = dir.path().join("o.tar");
        std::fs::write(&archive, tarball(&[("other/file", "x")], Compress::None)).unwrap();
        let target = dir.path().join("o");
        let source = Source::new(archive.to_str().unwrap(), "tar").with_branch("o");
        let overlay = Overlay::new("o", vec![source.clone()]);
        let err = strategy(Arc::new(RecordingDriver::default()))
            .add(&overlay, &source, &target)
            .unwrap_err();
        assert!(matches!(err, Error::SyncFailed { .. }));
        assert!(!target.exists());
    }
}
