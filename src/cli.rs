use std::path::PathBuf;
use clap::{Parser, Subcommand};

#[derive(Debug, Parser, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct CLI {
    #[command(subcommand)]
    pub(crate) command: LaymanCommand,
    /// Settings file. Defaults to `layman.toml` in the user config directory
    #[clap(short, long, global = true)]
    pub(crate) config: Option<PathBuf>,
    /// Log every external command
    #[clap(short, long, global = true, conflicts_with = "quiet")]
    pub(crate) verbose: bool,
    /// Only log errors
    #[clap(short, long, global = true)]
    pub(crate) quiet: bool,
}

#[derive(Debug, Subcommand, Clone, PartialEq)]
pub enum LaymanCommand {
    /// Fetches the remote overlay catalogs into the cache
    Fetch,
    /// Lists the available overlays
    List {
        /// Show the full info block for every overlay
        #[clap(long)]
        full: bool,
        /// Line width of the summary lines
        #[clap(short, long, default_value_t = layman::overlay::DEFAULT_WIDTH)]
        width: usize,
    },
    /// Lists the installed overlays
    ListLocal {
        #[clap(long)]
        full: bool,
        #[clap(short, long, default_value_t = layman::overlay::DEFAULT_WIDTH)]
        width: usize,
    },
    /// Shows details of overlays
    Info {
        names: Vec<String>,
        /// Read from the installed overlays instead of the catalogs
        #[clap(long)]
        local: bool,
        /// Stop after the type and quality lines
        #[clap(long)]
        brief: bool,
    },
    /// Installs overlays and registers them with the package manager
    Add {
        #[clap(required = true)]
        names: Vec<String>,
    },
    /// Removes installed overlays
    Delete {
        #[clap(required = true)]
        names: Vec<String>,
    },
    /// Updates installed overlays. Defaults to all
    Sync {
        names: Vec<String>,
    },
    /// Registers installed overlays with the package manager again
    Enable {
        #[clap(required = true)]
        names: Vec<String>,
    },
    /// Hides installed overlays from the package manager without removing them
    Disable {
        #[clap(required = true)]
        names: Vec<String>,
    },
    /// Removes cached catalogs that are no longer configured
    Clean,
}
