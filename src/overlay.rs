use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use regex::Regex;
use crate::error::{Error, Result};

/// Priority given to overlays whose catalog record does not name one.
pub const DEFAULT_PRIORITY: i32 = 50;

/// Width used by [`Overlay::short_line`] when the caller passes `0`.
pub const DEFAULT_WIDTH: usize = 80;

const NAME_COLUMN: usize = 25;
const TYPE_COLUMN: usize = 10;

static SPACE_RUNS: LazyLock<Regex> = LazyLock::new(|| Regex::new(" +").expect("valid regex"));
static INDENTED_LINES: LazyLock<Regex> = LazyLock::new(|| Regex::new("\n ").expect("valid regex"));

/// Whether an overlay is maintained by the distribution or by a third party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Status {
    Official,
    #[default]
    Unofficial,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Official => "official",
            Status::Unofficial => "unofficial",
        }
    }
}

impl FromStr for Status {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "official" => Ok(Status::Official),
            "unofficial" => Ok(Status::Unofficial),
            other => Err(Error::malformed(None, format!("unknown status '{other}'"))),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maturity of an overlay's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Quality {
    Core,
    Stable,
    Testing,
    #[default]
    Experimental,
    Graveyard,
}

impl Quality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Core => "core",
            Quality::Stable => "stable",
            Quality::Testing => "testing",
            Quality::Experimental => "experimental",
            Quality::Graveyard => "graveyard",
        }
    }
}

impl FromStr for Quality {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "core" => Ok(Quality::Core),
            "stable" => Ok(Quality::Stable),
            "testing" => Ok(Quality::Testing),
            "experimental" => Ok(Quality::Experimental),
            "graveyard" => Ok(Quality::Graveyard),
            other => Err(Error::malformed(None, format!("unknown quality '{other}'"))),
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One place an overlay can be obtained from.
///
/// `kind` is the source type tag (`git`, `svn`, `tar`, ...). It is kept as a
/// plain string so overlays with types this build does not support still load
/// and list; they only fail once somebody tries to sync them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Source {
    pub uri: String,
    pub kind: String,
    /// Named branch for version control sources, sub directory for archives.
    pub branch: String,
}

impl Source {
    pub fn new(uri: &str, kind: &str) -> Self {
        Self {
            uri: uri.to_string(),
            kind: kind.to_string(),
            branch: String::new(),
        }
    }

    pub fn with_branch(mut self, branch: &str) -> Self {
        self.branch = branch.to_string();
        self
    }

    pub fn label(&self) -> &str {
        type_label(&self.kind)
    }
}

/// Contact information for an overlay maintainer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Owner {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl Owner {
    pub fn email(email: &str) -> Self {
        Self {
            name: None,
            email: Some(email.to_string()),
        }
    }

    /// `name <email>`, or whichever of the two is present and not blank.
    pub fn contact(&self) -> String {
        fn present(value: &Option<String>) -> Option<&str> {
            value.as_deref().map(str::trim).filter(|v| !v.is_empty())
        }
        match (present(&self.name), present(&self.email)) {
            (Some(name), Some(email)) => format!("{name} <{email}>"),
            (None, Some(email)) => email.to_string(),
            (Some(name), None) => name.to_string(),
            (None, None) => String::new(),
        }
    }
}

/// A block of descriptive text, optionally tagged with a language.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Description {
    pub text: String,
    pub lang: Option<String>,
}

impl Description {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            lang: None,
        }
    }
}

/// A named third-party repository and everything known about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlay {
    pub name: String,
    /// The first source is the primary one; the rest are mirrors tried in order.
    pub sources: Vec<Source>,
    pub owners: Vec<Owner>,
    pub descriptions: Vec<Description>,
    pub status: Status,
    pub quality: Quality,
    /// Lower values sort first.
    pub priority: i32,
    pub homepage: Option<String>,
    pub irc: Option<String>,
    pub feeds: Vec<String>,
}

impl Overlay {
    /// Creates an unofficial, experimental overlay with the default priority.
    pub fn new(name: &str, sources: Vec<Source>) -> Self {
        Self {
            name: name.to_string(),
            sources,
            owners: Vec::new(),
            descriptions: Vec::new(),
            status: Status::default(),
            quality: Quality::default(),
            priority: DEFAULT_PRIORITY,
            homepage: None,
            irc: None,
            feeds: Vec::new(),
        }
    }

    /// Checks the invariants every stored overlay has to satisfy: a non-empty,
    /// path-safe name and at least one source.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::malformed(None, "missing overlay name"));
        }
        if !is_path_safe(&self.name) {
            return Err(Error::malformed(
                Some(&self.name),
                "name is not usable as a directory name",
            ));
        }
        if self.sources.is_empty() || self.sources.iter().all(|s| s.uri.trim().is_empty()) {
            return Err(Error::malformed(Some(&self.name), "no sources"));
        }
        Ok(())
    }

    pub fn is_official(&self) -> bool {
        self.status == Status::Official
    }

    pub fn source_uris(&self) -> impl Iterator<Item = &str> {
        self.sources.iter().map(|s| s.uri.as_str())
    }

    /// The directory this overlay occupies below a storage root.
    pub fn target_dir(&self, storage: &Path) -> PathBuf {
        storage.join(&self.name)
    }

    /// Display label of the source types, e.g. `Subversion` or `Git/..` when
    /// mirrors use different types.
    pub fn type_label(&self) -> String {
        let Some(first) = self.sources.first() else {
            return String::new();
        };
        if self.sources.iter().all(|s| s.kind == first.kind) {
            first.label().to_string()
        } else {
            format!("{}/..", first.label())
        }
    }

    /// Multi-line description of the overlay.
    ///
    /// The non-verbose form stops after the quality line; the verbose form adds
    /// the description, homepage, feeds and IRC channel.
    pub fn info_text(&self, verbose: bool) -> String {
        let mut result = String::new();
        result.push_str(&self.name);
        result.push('\n');
        result.push_str(&"~".repeat(self.name.chars().count()));

        match self.sources.split_first() {
            Some((only, [])) => {
                result.push_str(&format!("\nSource  : {}", only.uri));
            }
            Some((first, rest)) => {
                result.push_str(&format!("\nSources : {}", first.uri));
                for source in rest {
                    result.push_str(&format!("\n          {}", source.uri));
                }
            }
            None => {}
        }

        for owner in &self.owners {
            result.push_str(&format!("\nContact : {}", owner.contact()));
        }

        let mut labels: Vec<&str> = Vec::new();
        for source in &self.sources {
            if !labels.contains(&source.label()) {
                labels.push(source.label());
            }
        }
        result.push_str(&format!(
            "\nType    : {}; Priority: {}",
            labels.join("/"),
            self.priority
        ));
        result.push_str(&format!("\nQuality : {}\n", self.quality));

        if !verbose {
            return result;
        }

        if let Some(description) = self.descriptions.first() {
            let text = SPACE_RUNS.replace_all(description.text.trim(), " ");
            let text = INDENTED_LINES.replace_all(&text, "\n");
            result.push_str("\nDescription:");
            result.push_str(&format!("\n{text}").split('\n').collect::<Vec<_>>().join("\n  "));
            result.push('\n');
        }

        if let Some(homepage) = &self.homepage {
            result.push_str(&format!("\nLink:\n  {homepage}\n"));
        }

        if !self.feeds.is_empty() {
            result.push_str(if self.feeds.len() == 1 { "\nFeed:" } else { "\nFeeds:" });
            for feed in &self.feeds {
                result.push_str(&format!("\n  {feed}"));
            }
            result.push('\n');
        }

        if let Some(irc) = &self.irc {
            result.push_str(&format!("\nIRC : {irc}\n"));
        }

        result
    }

    /// Fixed-width, single line summary: name, bracketed type label and the
    /// source URIs, padded or truncated so the line fits into `width`.
    pub fn short_line(&self, width: usize) -> String {
        let width = if width == 0 { DEFAULT_WIDTH } else { width };
        let name = pad(&self.name, NAME_COLUMN);
        let mtype = format!(" [{}]", pad(&self.type_label(), TYPE_COLUMN));
        let srclen = width.saturating_sub(name.chars().count() + mtype.chars().count() + 5);

        let mut source = self.source_uris().collect::<Vec<_>>().join(", ");
        if source.chars().count() > srclen {
            source = source.replace("overlays.gentoo.org", "o.g.o");
        }
        format!("{name}{mtype} ({})", pad(&source, srclen))
    }
}

/// Human readable name of a source type tag. Unknown tags are shown as-is.
pub fn type_label(kind: &str) -> &str {
    match kind {
        "git" => "Git",
        "mercurial" => "Mercurial",
        "bzr" => "Bzr",
        "svn" => "Subversion",
        "cvs" => "cvs",
        "darcs" => "Darcs",
        "rsync" => "Rsync",
        "tar" => "Tar",
        "squashfs" => "Squashfs",
        other => other,
    }
}

fn is_path_safe(name: &str) -> bool {
    name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}

/// Pads `text` with spaces to `length` characters, or cuts it down and marks
/// the cut with `...`.
fn pad(text: &str, length: usize) -> String {
    let count = text.chars().count();
    if count <= length {
        format!("{text}{}", " ".repeat(length - count))
    } else {
        let kept: String = text.chars().take(length.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
