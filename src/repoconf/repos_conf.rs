//! `repos.conf` style registration: one INI section per overlay.
//!
//! A disabled overlay keeps its section with every line commented out by a
//! single `#`, so enabling it again restores the exact previous text.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use regex::Regex;
use super::{ConfType, RepoConfAdapter, RepoEntry};

static HEADER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(#?)\[([^\]]+)\]\s*$").expect("valid regex"));
static KEY_LINE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#*\s*[A-Za-z0-9_-]+\s*=").expect("valid regex"));
static LAYMAN_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^#*\s*layman-type\s*=").expect("valid regex"));

pub struct ReposConf {
    path: PathBuf,
    auto_sync: bool,
}

/// Line range of one section, header included.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Section {
    start: usize,
    end: usize,
    disabled: bool,
}

impl ReposConf {
    pub fn new<P: AsRef<Path>>(path: P, auto_sync: bool) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            auto_sync,
        }
    }

    fn render(&self, entry: &RepoEntry) -> Vec<String> {
        let mut lines = vec![
            format!("[{}]", entry.name),
            format!("priority = {}", entry.priority),
            format!("location = {}", entry.location.display()),
            format!("layman-type = {}", entry.kind),
        ];
        if self.auto_sync {
            lines.push(format!("sync-type = {}", portage_sync_type(&entry.kind)));
            lines.push(format!("sync-uri = {}", entry.sync_uri));
            lines.push("auto-sync = Yes".to_string());
        } else {
            lines.push("auto-sync = No".to_string());
        }
        lines
    }
}

fn portage_sync_type(kind: &str) -> &str {
    match kind {
        "bzr" => "bzr",
        "mercurial" => "hg",
        "tar" => "webrsync",
        other => other,
    }
}

/// Lines with their own terminators, so joining them gives back the input.
fn lines(content: &str) -> Vec<&str> {
    content.split_inclusive('\n').collect()
}

fn body(line: &str) -> &str {
    line.trim_end_matches(['\r', '\n'])
}

/// The line terminator the file already uses.
fn eol(content: &str) -> &'static str {
    if content.contains("\r\n") { "\r\n" } else { "\n" }
}

fn find_section(lines: &[&str], name: &str) -> Option<Section> {
    let start = lines.iter().position(|line| {
        HEADER
            .captures(body(line))
            .is_some_and(|caps| &caps[2] == name)
    })?;
    Some(section_at(lines, start))
}

fn section_at(lines: &[&str], start: usize) -> Section {
    let disabled = lines[start].starts_with('#');
    let mut end = start + 1;
    while end < lines.len() && !HEADER.is_match(body(lines[end])) && KEY_LINE.is_match(body(lines[end])) {
        end += 1;
    }
    Section { start, end, disabled }
}

/// Renders `rendered` as lines ending in `eol`, leaving the last one open
/// when `open_end` is set.
fn render_lines(rendered: &[String], eol: &str, open_end: bool) -> String {
    let mut out = rendered.join(eol);
    if !open_end {
        out.push_str(eol);
    }
    out
}

fn set_commented(content: &str, name: &str, commented: bool) -> String {
    let all = lines(content);
    let Some(section) = find_section(&all, name) else {
        return content.to_string();
    };
    if section.disabled == commented {
        return content.to_string();
    }
    let mut out = String::with_capacity(content.len() + section.end - section.start);
    for (index, line) in all.iter().enumerate() {
        if !(section.start..section.end).contains(&index) {
            out.push_str(line);
        } else if commented {
            out.push('#');
            out.push_str(line);
        } else {
            out.push_str(line.strip_prefix('#').unwrap_or(line));
        }
    }
    out
}

fn remove_section(content: &str, name: &str) -> String {
    let all = lines(content);
    let Some(section) = find_section(&all, name) else {
        return content.to_string();
    };
    let mut start = section.start;
    // Drop the blank separator that was added together with the section.
    let at_end = section.end == all.len() || body(all[section.end]).trim().is_empty();
    if at_end && start > 0 && body(all[start - 1]).trim().is_empty() {
        start -= 1;
    }
    let mut out: String = all[..start].concat();
    // A section appended to a file without a final newline was written
    // without one too; give the file back its open last line.
    let open_end = section.end == all.len() && !all[section.end - 1].ends_with('\n');
    if open_end && start < section.start {
        let kept = out.strip_suffix('\n').unwrap_or(&out);
        let kept = kept.strip_suffix('\r').unwrap_or(kept).len();
        out.truncate(kept);
    }
    out.push_str(&all[section.end..].concat());
    out
}

impl RepoConfAdapter for ReposConf {
    fn conf_type(&self) -> ConfType {
        ConfType::ReposConf
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn add_entry(&self, content: &str, entry: &RepoEntry) -> String {
        let rendered = self.render(entry);
        let eol = eol(content);
        let all = lines(content);
        if let Some(section) = find_section(&all, &entry.name) {
            let open_end = !all[section.end - 1].ends_with('\n');
            let mut out: String = all[..section.start].concat();
            out.push_str(&render_lines(&rendered, eol, open_end));
            out.push_str(&all[section.end..].concat());
            return out;
        }
        let mut out = content.to_string();
        let open_end = !content.is_empty() && !content.ends_with('\n');
        if !content.is_empty() {
            if open_end {
                out.push_str(eol);
            }
            out.push_str(eol);
        }
        out.push_str(&render_lines(&rendered, eol, open_end));
        out
    }

    fn enable(&self, content: &str, entry: &RepoEntry) -> String {
        let all = lines(content);
        match find_section(&all, &entry.name) {
            Some(_) => set_commented(content, &entry.name, false),
            None => self.add_entry(content, entry),
        }
    }

    fn disable(&self, content: &str, entry: &RepoEntry) -> String {
        set_commented(content, &entry.name, true)
    }

    fn delete_entry(&self, content: &str, entry: &RepoEntry) -> String {
        remove_section(content, &entry.name)
    }

    /// Enabled sections written by layman, recognised by their
    /// `layman-type` key. Sections owned by the package manager or the user
    /// are not reported.
    fn enabled_names(&self, content: &str) -> Vec<String> {
        let all = lines(content);
        let mut names = Vec::new();
        for (index, line) in all.iter().enumerate() {
            let Some(caps) = HEADER.captures(body(line)) else {
                continue;
            };
            let section = section_at(&all, index);
            let managed = all[section.start + 1..section.end]
                .iter()
                .any(|line| LAYMAN_KEY.is_match(body(line)));
            if !section.disabled && managed {
                names.push(caps[2].to_string());
            }
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const GENTOO: &str = "[DEFAULT]\nmain-repo = gentoo\n\n[gentoo]\nlocation = /var/db/repos/gentoo\nsync-type = rsync\n";

    fn wrobel() -> RepoEntry {
        RepoEntry {
            name: "wrobel".into(),
            location: PathBuf::from("/var/lib/layman/wrobel"),
            priority: 10,
            kind: "svn".into(),
            sync_uri: "https://overlays.gentoo.org/svn/dev/wrobel".into(),
        }
    }

    #[test]
    fn test_add_appends_section() {
        let conf = ReposConf::new("/tmp/layman.conf", false);
        let content = conf.add_entry(GENTOO, &wrobel());
        assert_eq!(
            content,
            format!(
                "{GENTOO}\n[wrobel]\npriority = 10\nlocation = /var/lib/layman/wrobel\nlayman-type = svn\nauto-sync = No\n"
            )
        );
        assert_eq!(conf.enabled_names(&content), vec!["wrobel"]);
    }

    #[test]
    fn test_auto_sync_emits_sync_keys() {
        let conf = ReposConf::new("/tmp/layman.conf", true);
        let content = conf.add_entry("", &wrobel());
        assert!(content.contains("sync-type = svn\nsync-uri = https://overlays.gentoo.org/svn/dev/wrobel\nauto-sync = Yes\n"));
    }

    #[test]
    fn test_disable_enable_round_trip_and_delete() {
        let conf = ReposConf::new("/tmp/layman.conf", false);
        let added = conf.add_entry(GENTOO, &wrobel());

        let disabled = conf.disable(&added, &wrobel());
        assert!(disabled.contains("#[wrobel]\n#priority = 10\n"));
        assert!(!conf.enabled_names(&disabled).contains(&"wrobel".to_string()));
        assert_eq!(conf.disable(&disabled, &wrobel()), disabled);

        let enabled = conf.enable(&disabled, &wrobel());
        assert_eq!(enabled, added);

        assert_eq!(conf.delete_entry(&disabled, &wrobel()), GENTOO);
        assert_eq!(conf.delete_entry(&added, &wrobel()), GENTOO);
        assert_eq!(conf.delete_entry(GENTOO, &wrobel()), GENTOO);
    }

    #[test]
    fn test_readd_replaces_section_in_place() {
        let conf = ReposConf::new("/tmp/layman.conf", false);
        let added = conf.add_entry("", &wrobel());
        let tail = format!("{added}\n[zzz]\nlocation = /z\n");
        let mut moved = wrobel();
        moved.priority = 20;
        let updated = conf.add_entry(&tail, &moved);
        assert!(updated.starts_with("[wrobel]\npriority = 20\n"));
        assert!(updated.ends_with("\n[zzz]\nlocation = /z\n"));
    }

    #[test]
    fn test_keeps_crlf_line_endings() {
        let conf = ReposConf::new("/tmp/layman.conf", false);
        let original = "[gentoo]\r\nlocation = /var/db/repos/gentoo\r\n";
        let added = conf.add_entry(original, &wrobel());
        assert!(added.ends_with("\r\n\r\n[wrobel]\r\npriority = 10\r\nlocation = /var/lib/layman/wrobel\r\nlayman-type = svn\r\nauto-sync = No\r\n"));

        let disabled = conf.disable(&added, &wrobel());
        assert!(disabled.contains("#[wrobel]\r\n#priority = 10\r\n"));
        assert_eq!(conf.enable(&disabled, &wrobel()), added);
        assert_eq!(conf.delete_entry(&disabled, &wrobel()), original);
        assert_eq!(conf.delete_entry(&added, &wrobel()), original);
    }

    #[test]
    fn test_keeps_missing_final_newline() {
        let conf = ReposConf::new("/tmp/layman.conf", false);
        let original = "[gentoo]\nlocation = /g";
        let added = conf.add_entry(original, &wrobel());
        assert!(added.starts_with("[gentoo]\nlocation = /g\n\n[wrobel]\n"));
        assert!(added.ends_with("auto-sync = No"));

        let disabled = conf.disable(&added, &wrobel());
        assert!(disabled.ends_with("#auto-sync = No"));
        assert_eq!(conf.delete_entry(&disabled, &wrobel()), original);
        assert_eq!(conf.delete_entry(&added, &wrobel()), original);
    }

    #[test]
    fn test_enabled_names_skips_foreign_sections() {
        let conf = ReposConf::new("/tmp/layman.conf", false);
        let content = format!("{GENTOO}\n[local]\nlocation = /usr/local/portage\n");
        assert!(conf.enabled_names(&content).is_empty());
        let added = conf.add_entry(&content, &wrobel());
        assert_eq!(conf.enabled_names(&added), vec!["wrobel"]);
    }
}
