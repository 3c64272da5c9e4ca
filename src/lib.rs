//! # Layman Core Library
//!
//! This crate contains the core logic of the `layman` tool – a manager for third-party overlay
//! repositories. Catalogs of overlays are fetched from remote sources and cached, overlays are
//! materialised on disk through a source-type specific sync strategy (VCS checkout, archive,
//! loop-mounted image), and installed overlays are registered with the package manager.
//!
//! This library is built for the `layman` CLI, but the [`Layman`] facade can be reused as a backend
//! in other tools.
//!
//! ## Modules Overview
//! - [`overlay`] – The overlay value and its text renderings
//! - [`codec`] – XML and JSON catalog documents
//! - [`db`] – In-memory overlay database with merge, select and atomic write
//! - [`installed`] – The installed overlays, kept consistent with the storage directory
//! - [`remote`] – Remote catalog fetching and the available overlays view
//! - [`strategy`] – Sync strategies and the registry that dispatches to them
//! - [`driver`] – The boundary to external sync tools
//! - [`repoconf`] – Package manager configuration (`make.conf`, `repos.conf`)
//! - [`settings`] – Resolved settings for one invocation
//! - [`util`] – Shared utilities (paths, hashing, downloads, atomic writes, locks)
//! - [`global`] – Per-user directories and the catalog cache


pub mod error;
pub mod overlay;
pub mod codec;
pub mod db;
pub mod driver;
pub mod strategy;
pub mod installed;
pub mod remote;
pub mod repoconf;
pub mod settings;
pub mod util;
pub mod api;
pub mod global;

pub use error::*;
pub use overlay::*;
pub use codec::DbFormat;
pub use db::*;
pub use driver::*;
pub use strategy::*;
pub use installed::*;
pub use remote::*;
pub use repoconf::*;
pub use settings::*;
pub use api::*;
pub use global::cache::*;
