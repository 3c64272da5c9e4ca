//! `make.conf` style registration: one `PORTDIR_OVERLAY` assignment listing
//! the location of every enabled overlay, one per line.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use regex::Regex;
use super::{ConfType, RepoConfAdapter, RepoEntry};

const VARIABLE: &str = "PORTDIR_OVERLAY";

static ASSIGNMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?ms)^PORTDIR_OVERLAY="([^"]*)"[ \t]*\n?"#).expect("valid regex"));

pub struct MakeConf {
    path: PathBuf,
}

impl MakeConf {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// The paths currently listed, without the inherited `$PORTDIR_OVERLAY`.
    fn paths(content: &str) -> Vec<String> {
        ASSIGNMENT
            .captures(content)
            .map(|caps| {
                caps[1]
                    .split_whitespace()
                    .filter(|word| !is_inherited(word))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Rewrites the assignment with `paths`, appending one when the file has
    /// none yet.
    fn with_paths(content: &str, paths: &[String]) -> String {
        let mut assignment = format!("{VARIABLE}=\"\n");
        for path in paths {
            assignment.push_str(path);
            assignment.push('\n');
        }
        assignment.push_str(&format!("${VARIABLE}\n\"\n"));

        match ASSIGNMENT.find(content) {
            Some(found) => format!("{}{}{}", &content[..found.start()], assignment, &content[found.end()..]),
            None => {
                let mut out = content.to_string();
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str(&assignment);
                out
            }
        }
    }

    fn insert(content: &str, entry: &RepoEntry) -> String {
        let location = entry.location.to_string_lossy().to_string();
        let mut paths = Self::paths(content);
        if paths.contains(&location) {
            return content.to_string();
        }
        paths.push(location);
        Self::with_paths(content, &paths)
    }

    fn remove(content: &str, entry: &RepoEntry) -> String {
        let location = entry.location.to_string_lossy().to_string();
        let paths = Self::paths(content);
        if !paths.contains(&location) {
            return content.to_string();
        }
        let kept: Vec<String> = paths.into_iter().filter(|p| *p != location).collect();
        Self::with_paths(content, &kept)
    }
}

fn is_inherited(word: &str) -> bool {
    word == "$PORTDIR_OVERLAY" || word == "${PORTDIR_OVERLAY}"
}

impl RepoConfAdapter for MakeConf {
    fn conf_type(&self) -> ConfType {
        ConfType::MakeConf
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn add_entry(&self, content: &str, entry: &RepoEntry) -> String {
        Self::insert(content, entry)
    }

    fn enable(&self, content: &str, entry: &RepoEntry) -> String {
        Self::insert(content, entry)
    }

    // A path list has no disabled state; the entry is rebuilt from the
    // installed overlay on enable.
    fn disable(&self, content: &str, entry: &RepoEntry) -> String {
        Self::remove(content, entry)
    }

    fn delete_entry(&self, content: &str, entry: &RepoEntry) -> String {
        Self::remove(content, entry)
    }

    fn enabled_names(&self, content: &str) -> Vec<String> {
        Self::paths(content)
            .iter()
            .filter_map(|path| Path::new(path).file_name())
            .map(|name| name.to_string_lossy().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(name: &str) -> RepoEntry {
        RepoEntry {
            name: name.to_string(),
            location: PathBuf::from("/var/lib/layman").join(name),
            priority: 50,
            kind: "git".into(),
            sync_uri: format!("https://example.org/{name}.git"),
        }
    }

    #[test]
    fn test_add_to_empty_file() {
        let conf = MakeConf::new("/tmp/make.conf");
        let content = conf.add_entry("", &entry("wrobel"));
        assert_eq!(content, "PORTDIR_OVERLAY=\"\n/var/lib/layman/wrobel\n$PORTDIR_OVERLAY\n\"\n");
        assert_eq!(conf.enabled_names(&content), vec!["wrobel"]);
    }

    #[test]
    fn test_keeps_surrounding_lines_and_order() {
        let conf = MakeConf::new("/tmp/make.conf");
        let original = "# managed by layman\nPORTDIR_OVERLAY=\"\n/usr/local/portage\n$PORTDIR_OVERLAY\n\"\nFEATURES=\"x\"\n";
        let content = conf.add_entry(original, &entry("a"));
        let content = conf.add_entry(&content, &entry("b"));
        assert_eq!(
            content,
            "# managed by layman\nPORTDIR_OVERLAY=\"\n/usr/local/portage\n/var/lib/layman/a\n/var/lib/layman/b\n$PORTDIR_OVERLAY\n\"\nFEATURES=\"x\"\n"
        );

        let disabled = conf.disable(&content, &entry("a"));
        assert_eq!(conf.enabled_names(&disabled), vec!["portage", "b"]);
        let removed = conf.delete_entry(&conf.delete_entry(&disabled, &entry("b")), &entry("b"));
        assert_eq!(removed, original);
    }

    #[test]
    fn test_enable_is_idempotent() {
        let conf = MakeConf::new("/tmp/make.conf");
        let once = conf.enable("", &entry("a"));
        assert_eq!(conf.enable(&once, &entry("a")), once);
    }
}
