//! Tree-structured catalog format.
//!
//! Reads the `<repositories><repo>` layout as well as the older
//! `<layman><overlay name=".." src=".." type="..">` attribute layout. Writing
//! always produces the `<repositories>` layout.

use std::path::Path;
use std::sync::LazyLock;
use regex::Regex;
use xot::{NameId, Node, Xot};
use crate::codec::{invalid, Decoded};
use crate::error::{Error, Result};
use crate::overlay::{Description, Overlay, Owner, Source, DEFAULT_PRIORITY};

const DECLARATION: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";
const INDENT: &str = "  ";

/// A document type declaration without an internal subset, such as
/// `<!DOCTYPE repositories SYSTEM "https://www.gentoo.org/dtd/repositories.dtd">`.
static EXTERNAL_DOCTYPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!DOCTYPE\s[^\[>]*>").expect("valid regex"));

struct Names {
    repositories: NameId,
    layman: NameId,
    repo: NameId,
    overlay: NameId,
    name: NameId,
    description: NameId,
    homepage: NameId,
    link: NameId,
    owner: NameId,
    email: NameId,
    source: NameId,
    feed: NameId,
    irc: NameId,
    lang: NameId,
    kind: NameId,
    branch: NameId,
    status: NameId,
    quality: NameId,
    priority: NameId,
    version: NameId,
    src: NameId,
    contact: NameId,
}

impl Names {
    fn new(xot: &mut Xot) -> Self {
        Self {
            repositories: xot.add_name("repositories"),
            layman: xot.add_name("layman"),
            repo: xot.add_name("repo"),
            overlay: xot.add_name("overlay"),
            name: xot.add_name("name"),
            description: xot.add_name("description"),
            homepage: xot.add_name("homepage"),
            link: xot.add_name("link"),
            owner: xot.add_name("owner"),
            email: xot.add_name("email"),
            source: xot.add_name("source"),
            feed: xot.add_name("feed"),
            irc: xot.add_name("irc"),
            lang: xot.add_name("lang"),
            kind: xot.add_name("type"),
            branch: xot.add_name("branch"),
            status: xot.add_name("status"),
            quality: xot.add_name("quality"),
            priority: xot.add_name("priority"),
            version: xot.add_name("version"),
            src: xot.add_name("src"),
            contact: xot.add_name("contact"),
        }
    }
}

pub fn decode(text: &str, origin: &Path) -> Result<Decoded> {
    let mut xot = Xot::new();
    let names = Names::new(&mut xot);
    // The DTD is only referenced, never needed to read the catalog.
    let text = EXTERNAL_DOCTYPE.replace(text, "");
    let root = xot.parse(&text).map_err(|e| invalid(origin, e.to_string()))?;
    let document = xot
        .document_element(root)
        .map_err(|e| invalid(origin, e.to_string()))?;
    let root_name = element_name(&xot, document);
    if root_name != Some(names.repositories) && root_name != Some(names.layman) {
        return Err(invalid(origin, "root element must be <repositories> or <layman>"));
    }

    let mut decoded = Decoded::default();
    for child in xot.children(document) {
        match element_name(&xot, child) {
            Some(name) if name == names.repo => decoded.accept(parse_repo(&xot, &names, child)),
            Some(name) if name == names.overlay => {
                decoded.accept(parse_legacy(&xot, &names, child))
            }
            _ => {}
        }
    }
    Ok(decoded)
}

fn parse_repo(xot: &Xot, names: &Names, node: Node) -> Result<Overlay> {
    let name = child_elements(xot, node, names.name)
        .next()
        .map(|n| text_of(xot, n))
        .unwrap_or_default();
    let label = (!name.is_empty()).then_some(name.as_str());

    let sources = child_elements(xot, node, names.source)
        .map(|n| Source {
            uri: text_of(xot, n),
            kind: xot.get_attribute(n, names.kind).unwrap_or_default().to_string(),
            branch: xot.get_attribute(n, names.branch).unwrap_or_default().to_string(),
        })
        .collect();

    let mut overlay = Overlay::new(&name, sources);
    apply_common_attributes(xot, names, node, &mut overlay, label)?;

    overlay.owners = child_elements(xot, node, names.owner)
        .map(|owner| Owner {
            name: optional_child_text(xot, owner, names.name),
            email: optional_child_text(xot, owner, names.email),
        })
        .collect();
    overlay.descriptions = child_elements(xot, node, names.description)
        .map(|n| Description {
            text: text_of(xot, n),
            lang: xot.get_attribute(n, names.lang).map(str::to_string),
        })
        .collect();
    overlay.homepage = optional_child_text(xot, node, names.homepage);
    overlay.irc = optional_child_text(xot, node, names.irc);
    overlay.feeds = child_elements(xot, node, names.feed)
        .map(|n| text_of(xot, n))
        .collect();
    Ok(overlay)
}

fn parse_legacy(xot: &Xot, names: &Names, node: Node) -> Result<Overlay> {
    let attribute = |name: NameId| xot.get_attribute(node, name).map(|v| v.trim().to_string());
    let name = attribute(names.name).unwrap_or_default();
    let label = (!name.is_empty()).then_some(name.as_str());

    let mut sources = Vec::new();
    if let Some(src) = attribute(names.src) {
        let kind = attribute(names.kind).unwrap_or_default();
        let branch = attribute(names.branch).unwrap_or_default();
        sources.push(Source::new(&src, &kind).with_branch(&branch));
    }

    let mut overlay = Overlay::new(&name, sources);
    apply_common_attributes(xot, names, node, &mut overlay, label)?;
    overlay.owners = attribute(names.contact)
        .map(|email| vec![Owner::email(&email)])
        .unwrap_or_default();
    overlay.descriptions = child_elements(xot, node, names.description)
        .map(|n| Description {
            text: text_of(xot, n),
            lang: xot.get_attribute(n, names.lang).map(str::to_string),
        })
        .collect();
    overlay.homepage = optional_child_text(xot, node, names.link)
        .or_else(|| optional_child_text(xot, node, names.homepage));
    overlay.feeds = child_elements(xot, node, names.feed)
        .map(|n| text_of(xot, n))
        .collect();
    Ok(overlay)
}

fn apply_common_attributes(
    xot: &Xot,
    names: &Names,
    node: Node,
    overlay: &mut Overlay,
    label: Option<&str>,
) -> Result<()> {
    let with_name = |err: Error| match err {
        Error::MalformedRecord { message, .. } => Error::malformed(label, message),
        other => other,
    };
    if let Some(status) = xot.get_attribute(node, names.status) {
        overlay.status = status.parse().map_err(with_name)?;
    }
    if let Some(quality) = xot.get_attribute(node, names.quality) {
        overlay.quality = quality.parse().map_err(with_name)?;
    }
    overlay.priority = match xot.get_attribute(node, names.priority) {
        Some(priority) => priority
            .trim()
            .parse()
            .map_err(|_| Error::malformed(label, format!("invalid priority '{priority}'")))?,
        None => DEFAULT_PRIORITY,
    };
    Ok(())
}

fn element_name(xot: &Xot, node: Node) -> Option<NameId> {
    xot.element(node).map(|element| element.name())
}

fn child_elements<'a>(xot: &'a Xot, node: Node, name: NameId) -> impl Iterator<Item = Node> + 'a {
    xot.children(node)
        .filter(move |child| element_name(xot, *child) == Some(name))
}

fn text_of(xot: &Xot, node: Node) -> String {
    let mut text = String::new();
    for child in xot.children(node) {
        if let Some(value) = xot.text_str(child) {
            text.push_str(value);
        }
    }
    text
}

/// Text of the first `name` child. A present but empty element is
/// `Some("")`, so an empty value survives a write and reload.
fn optional_child_text(xot: &Xot, node: Node, name: NameId) -> Option<String> {
    child_elements(xot, node, name).next().map(|n| text_of(xot, n))
}

pub fn encode<'a, I>(overlays: I) -> Result<String>
where
    I: IntoIterator<Item = &'a Overlay>,
{
    build(overlays).map_err(|e| Error::Serialization(e.to_string()))
}

fn build<'a, I>(overlays: I) -> std::result::Result<String, xot::Error>
where
    I: IntoIterator<Item = &'a Overlay>,
{
    let mut xot = Xot::new();
    let names = Names::new(&mut xot);
    let root = xot.new_element(names.repositories);
    xot.attributes_mut(root).insert(names.version, "1.0".to_string());
    let document = xot.new_document_with_element(root)?;

    for overlay in overlays {
        xot.append_text(root, &format!("\n{INDENT}"))?;
        let repo = xot.new_element(names.repo);
        {
            let mut attributes = xot.attributes_mut(repo);
            attributes.insert(names.priority, overlay.priority.to_string());
            attributes.insert(names.quality, overlay.quality.to_string());
            attributes.insert(names.status, overlay.status.to_string());
        }
        xot.append(root, repo)?;

        text_element(&mut xot, repo, names.name, &overlay.name, 2)?;
        for description in &overlay.descriptions {
            let node = text_element(&mut xot, repo, names.description, &description.text, 2)?;
            if let Some(lang) = &description.lang {
                xot.attributes_mut(node).insert(names.lang, lang.clone());
            }
        }
        if let Some(homepage) = &overlay.homepage {
            text_element(&mut xot, repo, names.homepage, homepage, 2)?;
        }
        for owner in &overlay.owners {
            xot.append_text(repo, &format!("\n{}", INDENT.repeat(2)))?;
            let node = xot.new_element(names.owner);
            xot.append(repo, node)?;
            if let Some(email) = &owner.email {
                text_element(&mut xot, node, names.email, email, 3)?;
            }
            if let Some(name) = &owner.name {
                text_element(&mut xot, node, names.name, name, 3)?;
            }
            xot.append_text(node, &format!("\n{}", INDENT.repeat(2)))?;
        }
        for source in &overlay.sources {
            let node = text_element(&mut xot, repo, names.source, &source.uri, 2)?;
            let mut attributes = xot.attributes_mut(node);
            attributes.insert(names.kind, source.kind.clone());
            if !source.branch.is_empty() {
                attributes.insert(names.branch, source.branch.clone());
            }
        }
        for feed in &overlay.feeds {
            text_element(&mut xot, repo, names.feed, feed, 2)?;
        }
        if let Some(irc) = &overlay.irc {
            text_element(&mut xot, repo, names.irc, irc, 2)?;
        }
        xot.append_text(repo, &format!("\n{INDENT}"))?;
    }
    xot.append_text(root, "\n")?;

    Ok(format!("{DECLARATION}{}\n", xot.to_string(document)?))
}

/// Appends `<name>text</name>` to `parent`, preceded by a newline and
/// `depth` levels of indentation.
fn text_element(
    xot: &mut Xot,
    parent: Node,
    name: NameId,
    text: &str,
    depth: usize,
) -> std::result::Result<Node, xot::Error> {
    xot.append_text(parent, &format!("\n{}", INDENT.repeat(depth)))?;
    let node = xot.new_element(name);
    xot.append(parent, node)?;
    if !text.is_empty() {
        xot.append_text(node, text)?;
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use crate::overlay::{Quality, Status};

    const GLOBAL: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<repositories xmlns="" version="1.0">
  <repo quality="experimental" status="official" priority="10">
    <name>wrobel</name>
    <description>Test</description>
    <owner>
      <email>nobody@gentoo.org</email>
    </owner>
    <source type="svn">https://overlays.gentoo.org/svn/dev/wrobel</source>
  </repo>
  <repo quality="experimental" status="unofficial">
    <name>wrobel-stable</name>
    <description>
      A collection of ebuilds from Gunnar Wrobel [wrobel@gentoo.org].
    </description>
    <owner>
      <email>nobody@gentoo.org</email>
    </owner>
    <source type="rsync">rsync://gunnarwrobel.de/wrobel-stable</source>
  </repo>
</repositories>
"#;

    fn origin() -> PathBuf {
        PathBuf::from("global-overlays.xml")
    }

    #[test]
    fn test_decode_repositories_layout() {
        let decoded = decode(GLOBAL, &origin()).unwrap();
        assert_eq!(decoded.overlays.len(), 2);
        let wrobel = &decoded.overlays[0];
        assert_eq!(wrobel.name, "wrobel");
        assert_eq!(wrobel.status, Status::Official);
        assert_eq!(wrobel.quality, Quality::Experimental);
        assert_eq!(wrobel.priority, 10);
        assert_eq!(wrobel.owners[0].email.as_deref(), Some("nobody@gentoo.org"));
        assert_eq!(wrobel.descriptions[0].text, "Test");
        let stable = &decoded.overlays[1];
        assert_eq!(stable.priority, DEFAULT_PRIORITY);
        assert_eq!(
            stable.descriptions[0].text,
            "\n      A collection of ebuilds from Gunnar Wrobel [wrobel@gentoo.org].\n    "
        );
    }

    #[test]
    fn test_decode_skips_external_doctype() {
        let with_doctype = GLOBAL.replacen(
            "?>\n",
            "?>\n<!DOCTYPE repositories SYSTEM \"https://www.gentoo.org/dtd/repositories.dtd\">\n",
            1,
        );
        assert!(with_doctype.contains("<!DOCTYPE"));
        let decoded = decode(&with_doctype, &origin()).unwrap();
        assert_eq!(decoded.overlays, decode(GLOBAL, &origin()).unwrap().overlays);
    }

    #[test]
    fn test_legacy_layout_matches_repositories_layout() {
        let legacy = r#"<?xml version="1.0" encoding="UTF-8"?>
<layman>
  <overlay name="wrobel" type="svn" src="https://overlays.gentoo.org/svn/dev/wrobel"
           contact="nobody@gentoo.org" status="official" priority="10">
    <description>Test</description>
  </overlay>
</layman>
"#;
        let old = decode(legacy, &origin()).unwrap();
        let new = decode(GLOBAL, &origin()).unwrap();
        assert_eq!(old.overlays[0], new.overlays[0]);
    }

    #[test]
    fn test_malformed_records_are_skipped() {
        let text = r#"<repositories>
  <repo><name>no-source</name></repo>
  <repo><source type="git">git://example.org/x.git</source></repo>
  <repo priority="high"><name>bad-priority</name><source type="git">g</source></repo>
  <repo><name>good</name><source type="git">git://example.org/good.git</source></repo>
</repositories>"#;
        let decoded = decode(text, &origin()).unwrap();
        assert_eq!(decoded.overlays.len(), 1);
        assert_eq!(decoded.overlays[0].name, "good");
        assert_eq!(decoded.skipped.len(), 3);
    }

    #[test]
    fn test_invalid_documents() {
        assert!(matches!(
            decode("<repositories><repo>", &origin()),
            Err(Error::InvalidDatabase { .. })
        ));
        assert!(matches!(
            decode("<html/>", &origin()),
            Err(Error::InvalidDatabase { .. })
        ));
    }

    #[test]
    fn test_encode_writes_source_line() {
        let decoded = decode(GLOBAL, &origin()).unwrap();
        let text = encode(&decoded.overlays).unwrap();
        assert!(text.starts_with(DECLARATION));
        assert!(text.contains("\n    <source type=\"svn\">https://overlays.gentoo.org/svn/dev/wrobel</source>\n"));
    }
}
