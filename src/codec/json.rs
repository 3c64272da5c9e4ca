//! Structured-object catalog format: `{"repo": [ {...}, ... ]}`.

use std::path::Path;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::codec::{invalid, Decoded};
use crate::error::{Error, Result};
use crate::overlay::{Description, Overlay, Owner, Source, DEFAULT_PRIORITY};

#[derive(Deserialize)]
struct JsonDocument {
    #[serde(default)]
    repo: Vec<Value>,
}

#[derive(Serialize)]
struct JsonDocumentOut {
    repo: Vec<JsonRepo>,
}

#[derive(Serialize, Deserialize)]
struct JsonRepo {
    #[serde(default)]
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    quality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    description: Vec<JsonDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    homepage: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    owner: Vec<JsonOwner>,
    #[serde(default)]
    source: Vec<JsonSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    feed: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    irc: Option<String>,
}

/// Catalogs in the wild carry the priority either as a number or a string.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Priority {
    Number(i32),
    Text(String),
}

/// A description is either a bare string or `{"text": .., "lang": ..}`.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum JsonDescription {
    Plain(String),
    Tagged {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lang: Option<String>,
    },
}

#[derive(Serialize, Deserialize)]
struct JsonOwner {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    email: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct JsonSource {
    #[serde(rename = "type", default)]
    kind: String,
    uri: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    branch: String,
}

pub fn decode(text: &str, origin: &Path) -> Result<Decoded> {
    let document: JsonDocument =
        serde_json::from_str(text).map_err(|e| invalid(origin, e.to_string()))?;
    let mut decoded = Decoded::default();
    for record in document.repo {
        decoded.accept(parse_record(record));
    }
    Ok(decoded)
}

fn parse_record(record: Value) -> Result<Overlay> {
    let label = record
        .get("name")
        .and_then(Value::as_str)
        .map(str::to_string);
    let repo: JsonRepo = serde_json::from_value(record)
        .map_err(|e| Error::malformed(label.as_deref(), e.to_string()))?;
    let with_name = |err: Error| match err {
        Error::MalformedRecord { message, .. } => Error::malformed(label.as_deref(), message),
        other => other,
    };

    let sources = repo
        .source
        .into_iter()
        .map(|s| Source {
            uri: s.uri,
            kind: s.kind,
            branch: s.branch,
        })
        .collect();
    let mut overlay = Overlay::new(&repo.name, sources);
    if let Some(status) = repo.status {
        overlay.status = status.parse().map_err(with_name)?;
    }
    if let Some(quality) = repo.quality {
        overlay.quality = quality.parse().map_err(with_name)?;
    }
    overlay.priority = match repo.priority {
        Some(Priority::Number(priority)) => priority,
        Some(Priority::Text(text)) => text
            .trim()
            .parse()
            .map_err(|_| Error::malformed(label.as_deref(), format!("invalid priority '{text}'")))?,
        None => DEFAULT_PRIORITY,
    };
    overlay.descriptions = repo
        .description
        .into_iter()
        .map(|d| match d {
            JsonDescription::Plain(text) => Description { text, lang: None },
            JsonDescription::Tagged { text, lang } => Description { text, lang },
        })
        .collect();
    overlay.owners = repo
        .owner
        .into_iter()
        .map(|o| Owner {
            name: o.name,
            email: o.email,
        })
        .collect();
    overlay.homepage = repo.homepage;
    overlay.irc = repo.irc;
    overlay.feeds = repo.feed;
    Ok(overlay)
}

pub fn encode<'a, I>(overlays: I) -> Result<String>
where
    I: IntoIterator<Item = &'a Overlay>,
{
    let repo = overlays
        .into_iter()
        .map(|overlay| JsonRepo {
            name: overlay.name.clone(),
            status: Some(overlay.status.to_string()),
            quality: Some(overlay.quality.to_string()),
            priority: Some(Priority::Number(overlay.priority)),
            description: overlay
                .descriptions
                .iter()
                .map(|d| JsonDescription::Tagged {
                    text: d.text.clone(),
                    lang: d.lang.clone(),
                })
                .collect(),
            homepage: overlay.homepage.clone(),
            owner: overlay
                .owners
                .iter()
                .map(|o| JsonOwner {
                    name: o.name.clone(),
                    email: o.email.clone(),
                })
                .collect(),
            source: overlay
                .sources
                .iter()
                .map(|s| JsonSource {
                    kind: s.kind.clone(),
                    uri: s.uri.clone(),
                    branch: s.branch.clone(),
                })
                .collect(),
            feed: overlay.feeds.clone(),
            irc: overlay.irc.clone(),
        })
        .collect();
    let mut text = serde_json::to_string_pretty(&JsonDocumentOut { repo })
        .map_err(|e| Error::Serialization(e.to_string()))?;
    text.push('\n');
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use crate::overlay::Quality;

    #[test]
    fn test_decode_accepts_loose_shapes() {
        let text = r#"{
  "repo": [
    {
      "name": "twitch153",
      "description": ["Personal ebuilds"],
      "owner": [{"email": "twitch153@example.org", "name": "Devan"}],
      "source": [{"type": "git", "uri": "git://github.com/twitch153/ebuilds.git"}],
      "quality": "testing",
      "priority": "20"
    },
    {"name": "broken", "source": "not-a-list"},
    {"name": "no-sources"}
  ]
}"#;
        let decoded = decode(text, &PathBuf::from("global-overlays.json")).unwrap();
        assert_eq!(decoded.overlays.len(), 1);
        assert_eq!(decoded.skipped.len(), 2);
        let overlay = &decoded.overlays[0];
        assert_eq!(overlay.priority, 20);
        assert_eq!(overlay.quality, Quality::Testing);
        assert_eq!(overlay.descriptions[0].text, "Personal ebuilds");
        assert_eq!(
            overlay.source_uris().collect::<Vec<_>>(),
            vec!["git://github.com/twitch153/ebuilds.git"]
        );
    }

    #[test]
    fn test_decode_rejects_non_json() {
        assert!(matches!(
            decode("<repositories/>", &PathBuf::from("x")),
            Err(Error::InvalidDatabase { .. })
        ));
    }
}
