use anyhow::{bail, Result};
use colored::Colorize;
use layman::api::{BatchReport, Layman};
use layman::global::utils::get_global_settings_file;
use layman::settings::Settings;
use crate::cli::{LaymanCommand, CLI};

pub fn execute(cli: CLI) -> Result<()> {
    let layman = Layman::new(load_settings(&cli)?);
    match cli.command {
        LaymanCommand::Fetch => {
            execute_fetch(&layman)
        }
        LaymanCommand::List { full, width } => {
            execute_list(&layman, false, full, width)
        }
        LaymanCommand::ListLocal { full, width } => {
            execute_list(&layman, true, full, width)
        }
        LaymanCommand::Info { names, local, brief } => {
            execute_info(&layman, &names, local, !brief)
        }
        LaymanCommand::Add { names } => {
            finish("Added", layman.add_repos(&as_strs(&names))?)
        }
        LaymanCommand::Delete { names } => {
            finish("Deleted", layman.delete_repos(&as_strs(&names))?)
        }
        LaymanCommand::Sync { names } => {
            let report = if names.is_empty() {
                layman.sync_all()?
            } else {
                layman.sync(&as_strs(&names))?
            };
            finish("Synced", report)
        }
        LaymanCommand::Enable { names } => {
            finish("Enabled", layman.enable(&as_strs(&names))?)
        }
        LaymanCommand::Disable { names } => {
            finish("Disabled", layman.disable(&as_strs(&names))?)
        }
        LaymanCommand::Clean => {
            let removed = layman.clean_cache()?;
            println!("Removed {removed} stale cache files");
            Ok(())
        }
    }
}

/// Settings from `--config`, else from the per-user settings file when it
/// exists, else the defaults.
fn load_settings(cli: &CLI) -> Result<Settings> {
    if let Some(path) = &cli.config {
        return Ok(Settings::load(path)?);
    }
    let path = get_global_settings_file()?;
    if path.exists() {
        Ok(Settings::load(path)?)
    } else {
        Ok(Settings::default())
    }
}

fn as_strs(names: &[String]) -> Vec<&str> {
    names.iter().map(String::as_str).collect()
}

pub fn execute_fetch(layman: &Layman) -> Result<()> {
    let report = layman.fetch_remote_list()?;
    for uri in &report.fetched {
        println!("{} {}", "*".green(), uri);
    }
    for (uri, err) in &report.failed {
        println!("{} {}: {}", "*".red(), uri, err);
    }
    if !report.succeeded() {
        bail!("Fetching the overlay catalogs failed");
    }
    Ok(())
}

pub fn execute_list(layman: &Layman, local: bool, full: bool, width: usize) -> Result<()> {
    let lines = layman.list(local, full, width)?;
    if lines.is_empty() {
        match local {
            true => println!("No overlays installed"),
            false => println!("No overlays available. Run `layman fetch` first."),
        }
        return Ok(());
    }
    for line in lines {
        match full {
            true => println!("{line}"),
            false => println!("{} {}", "*".green(), line),
        }
    }
    Ok(())
}

pub fn execute_info(layman: &Layman, names: &[String], local: bool, verbose: bool) -> Result<()> {
    let info = layman.get_info(&as_strs(names), verbose, local)?;
    for name in names {
        if let Some(text) = info.get(name) {
            let (title, rest) = text.split_once('\n').unwrap_or((text.as_str(), ""));
            println!("{}", title.bold());
            println!("{rest}");
        }
    }
    Ok(())
}

fn finish(action: &str, report: BatchReport) -> Result<()> {
    for name in &report.succeeded {
        println!("{} {action} {name}", "*".green());
    }
    for (name, err) in &report.failed {
        eprintln!("{} {name}: {err}", "*".red());
    }
    if !report.is_success() {
        bail!("{} of {} overlays failed", report.failed.len(), report.failed.len() + report.succeeded.len());
    }
    Ok(())
}
