use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use fs4::FileExt;
use reqwest::blocking::Client;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use url::Url;
use crate::error::{Error, Result};
use crate::settings::Settings;

/// Ensures the storage root and the cache directory from the settings exist.
///
/// Returns the storage root.
pub fn ensure_layman_dirs(settings: &Settings) -> Result<PathBuf> {
    std::fs::create_dir_all(&settings.storage)?;
    std::fs::create_dir_all(&settings.cache_dir)?;
    Ok(settings.storage.clone())
}

/// Joins path fragments with single slashes, keeping a leading slash of the
/// first fragment and dropping trailing ones.
///
/// `join_path(&["/a/", "/b", "c/"])` is `"/a/b/c"`.
pub fn join_path(parts: &[&str]) -> String {
    let Some(first) = parts.first() else {
        return String::new();
    };
    let absolute = first.starts_with('/');
    let joined = parts
        .iter()
        .map(|part| part.trim_matches('/'))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("/");
    if absolute {
        format!("/{joined}")
    } else {
        joined
    }
}

/// Hex encoded SHA-256 of `text`; used to key cache entries by URI.
pub fn fingerprint(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Local file behind a `file://` URI or a plain path. `None` for anything
/// that needs the network.
pub fn local_path(uri: &str) -> Option<PathBuf> {
    if uri.starts_with("file:") {
        return Url::parse(uri).ok()?.to_file_path().ok();
    }
    if uri.contains("://") {
        return None;
    }
    Some(PathBuf::from(uri))
}

/// Builds the HTTP client used for catalog and archive downloads, honouring
/// the proxies from the settings.
pub fn http_client(settings: &Settings) -> Result<Client> {
    let network = |url: &str, e: reqwest::Error| Error::Network {
        url: url.to_string(),
        message: e.to_string(),
    };
    let mut builder = Client::builder().user_agent(concat!("layman/", env!("CARGO_PKG_VERSION")));
    if let Some(proxy) = &settings.http_proxy {
        builder = builder.proxy(reqwest::Proxy::http(proxy).map_err(|e| network(proxy, e))?);
    }
    if let Some(proxy) = &settings.https_proxy {
        builder = builder.proxy(reqwest::Proxy::https(proxy).map_err(|e| network(proxy, e))?);
    }
    builder.build().map_err(|e| network("client", e))
}

/// Reads the resource behind `uri`, from disk for local URIs and through
/// `client` otherwise.
pub fn fetch_bytes(client: &Client, uri: &str) -> Result<Vec<u8>> {
    if let Some(path) = local_path(uri) {
        return std::fs::read(&path).map_err(|e| Error::Network {
            url: uri.to_string(),
            message: e.to_string(),
        });
    }
    let fail = |message: String| Error::Network {
        url: uri.to_string(),
        message,
    };
    let response = client.get(uri).send().map_err(|e| fail(e.to_string()))?;
    if !response.status().is_success() {
        return Err(fail(format!("server answered {}", response.status())));
    }
    let bytes = response.bytes().map_err(|e| fail(e.to_string()))?;
    Ok(bytes.to_vec())
}

/// Writes `bytes` to `path` through a temporary file in the same directory,
/// so readers see either the old or the new content, never a mix.
pub fn write_atomic<P: AsRef<Path>>(path: P, bytes: &[u8]) -> std::io::Result<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;
    let mut temp = NamedTempFile::new_in(&dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path)?;
    Ok(())
}

/// Takes an exclusive lock named `key` below `lock_dir`. The lock is held
/// until the returned file is dropped.
pub fn lock_exclusive(lock_dir: &Path, key: &str) -> std::io::Result<File> {
    std::fs::create_dir_all(lock_dir)?;
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(lock_dir.join(format!("{}.lock", fingerprint(key))))?;
    file.lock_exclusive()?;
    Ok(file)
}
