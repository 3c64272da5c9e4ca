use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::codec::DbFormat;
use crate::db::LoadMode;
use crate::error::{Error, Result};
use crate::global::utils::{get_global_cache_dir, get_global_data_dir};
use crate::remote::FetchPolicy;
use crate::repoconf::ConfType;

/// The catalog every installation starts with.
pub const DEFAULT_OVERLAYS_URL: &str = "https://api.gentoo.org/overlays/repositories.xml";

/// Resolved settings for one invocation.
///
/// Every field has a default, so a settings file only needs to name what it
/// changes. The value is built once and passed by reference; nothing in the
/// library reads the environment on its own.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Remote catalog URIs, fetched in order.
    pub overlays: Vec<String>,
    /// Directory of additional local catalog files merged after the cache.
    pub overlay_defs: Option<PathBuf>,
    pub cache_dir: PathBuf,
    /// Database of installed overlays.
    pub installed: PathBuf,
    /// Root directory overlays are materialised under.
    pub storage: PathBuf,
    pub db_format: DbFormat,
    pub load_mode: LoadMode,
    pub fetch_policy: FetchPolicy,
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub make_conf: PathBuf,
    pub repos_conf: PathBuf,
    /// Which package manager config files are kept in sync.
    pub conf_types: Vec<ConfType>,
    /// Emit `sync-type`/`sync-uri` so the package manager can sync by itself.
    pub auto_sync: bool,
    /// Per source type command overrides, keyed by type tag.
    pub commands: BTreeMap<String, CommandTemplate>,
}

/// External command and option strings used for one source type.
///
/// Option strings are split like a shell would split them.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(default)]
pub struct CommandTemplate {
    pub command: String,
    pub add_opts: String,
    pub sync_opts: String,
    /// Command run inside the overlay directory after a successful add or sync.
    pub post_sync: String,
}

impl CommandTemplate {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            ..Self::default()
        }
    }

    pub fn add_args(&self) -> Result<Vec<String>> {
        split_opts(&self.add_opts)
    }

    pub fn sync_args(&self) -> Result<Vec<String>> {
        split_opts(&self.sync_opts)
    }

    pub fn post_sync_args(&self) -> Result<Vec<String>> {
        split_opts(&self.post_sync)
    }
}

fn split_opts(opts: &str) -> Result<Vec<String>> {
    shell_words::split(opts)
        .map_err(|e| Error::Settings(format!("cannot split options '{opts}': {e}")))
}

impl Default for Settings {
    fn default() -> Self {
        let storage = get_global_data_dir().unwrap_or_else(|_| PathBuf::from("/var/lib/layman"));
        let mut settings = Settings::with_storage(&storage);
        if let Ok(cache_dir) = get_global_cache_dir() {
            settings.cache_dir = cache_dir;
        }
        settings.repos_conf = PathBuf::from("/etc/portage/repos.conf/layman.conf");
        settings
    }
}

impl Settings {
    /// Settings whose cache, installed database and `make.conf` all live
    /// below `storage`.
    pub fn with_storage<P: AsRef<Path>>(storage: P) -> Settings {
        let storage = storage.as_ref().to_path_buf();
        Settings {
            overlays: vec![DEFAULT_OVERLAYS_URL.to_string()],
            overlay_defs: None,
            cache_dir: storage.join("cache"),
            installed: storage.join("installed.xml"),
            make_conf: storage.join("make.conf"),
            repos_conf: storage.join("repos.conf"),
            storage,
            db_format: DbFormat::default(),
            load_mode: LoadMode::default(),
            fetch_policy: FetchPolicy::default(),
            http_proxy: None,
            https_proxy: None,
            conf_types: vec![ConfType::ReposConf],
            auto_sync: false,
            commands: BTreeMap::new(),
        }
    }

    /// Loads settings from a TOML file. Missing fields keep their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Settings> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Settings(format!("cannot read {}: {e}", path.display())))?;
        toml::from_str(&text)
            .map_err(|e| Error::Settings(format!("invalid {}: {e}", path.display())))
    }

    /// Saves the settings as pretty TOML.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let text = toml::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// The command template for a source type: the configured override, or
    /// the built in default when there is none.
    pub fn command(&self, kind: &str) -> CommandTemplate {
        if let Some(template) = self.commands.get(kind) {
            let mut template = template.clone();
            if template.command.is_empty() {
                template.command = default_command(kind).to_string();
            }
            return template;
        }
        CommandTemplate::new(default_command(kind))
    }

    /// Directory holding the lock files that serialise concurrent invocations.
    pub fn lock_dir(&self) -> PathBuf {
        self.cache_dir.join("locks")
    }
}

fn default_command(kind: &str) -> &str {
    match kind {
        "git" => "git",
        "mercurial" => "hg",
        "bzr" => "bzr",
        "svn" => "svn",
        "cvs" => "cvs",
        "darcs" => "darcs",
        "rsync" => "rsync",
        "squashfs" => "mount",
        other => other,
    }
}
