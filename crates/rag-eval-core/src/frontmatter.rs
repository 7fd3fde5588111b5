//! Front-matter parsing for source documents.
//!
//! Two header styles are accepted at the very top of a file:
//!
//! ```text
//! ---                         +++
//! title: Why Rust             title = "Why Rust"
//! date: 2021-04               date = "2021-04"
//! url: https://example.com    url = "https://example.com"
//! ---                         +++
//! body...                     body...
//! ```
//!
//! The `---` form is the flat `key: value` subset of YAML that blog exports
//! use; nested structures are not supported. The `+++` form is parsed as
//! TOML. Keys `title`, `date` (`YYYY-MM`) and `url` are required.

use std::collections::HashMap;

use anyhow::{bail, Context, Result};

use crate::models::{Document, DocumentMetadata};

/// Raw front-matter key/value pairs plus the remaining body.
#[derive(Debug, Clone, Default)]
pub struct FrontMatter {
    pub fields: HashMap<String, String>,
    pub body: String,
}

impl FrontMatter {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(|s| s.as_str())
    }
}

/// Split a raw file into front matter and body.
///
/// Files without a header yield an empty field map and the whole text as body.
pub fn split_front_matter(raw: &str) -> Result<FrontMatter> {
    let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);

    for delim in ["---", "+++"] {
        let Some(rest) = raw
            .strip_prefix(delim)
            .and_then(|r| r.strip_prefix("\r\n").or_else(|| r.strip_prefix('\n')))
        else {
            continue;
        };

        let (header, body) = find_closing(rest, delim)
            .ok_or_else(|| anyhow::anyhow!("unterminated front matter (missing closing '{}')", delim))?;

        let fields = if delim == "---" {
            parse_yaml_flat(header)?
        } else {
            parse_toml(header)?
        };

        return Ok(FrontMatter {
            fields,
            body: body.trim().to_string(),
        });
    }

    Ok(FrontMatter {
        fields: HashMap::new(),
        body: raw.trim().to_string(),
    })
}

/// Parse a raw file into a validated [`Document`].
pub fn parse_document(raw: &str, filename: &str) -> Result<Document> {
    let fm = split_front_matter(raw).with_context(|| format!("{}: invalid front matter", filename))?;
    let metadata = DocumentMetadata::from_fields(fm.get("title"), fm.get("date"), fm.get("url"))
        .with_context(|| format!("{}: invalid document metadata", filename))?;
    Ok(Document::new(fm.body, filename.to_string(), metadata))
}

fn find_closing<'a>(rest: &'a str, delim: &str) -> Option<(&'a str, &'a str)> {
    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == delim {
            return Some((&rest[..offset], &rest[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

fn parse_yaml_flat(header: &str) -> Result<HashMap<String, String>> {
    let mut fields: HashMap<String, String> = HashMap::new();
    let mut last_key: Option<String> = None;

    for (lineno, line) in header.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        // List items continue the previous key: `tags:\n  - a\n  - b`
        if let Some(item) = trimmed.strip_prefix("- ") {
            let Some(key) = &last_key else {
                bail!("line {}: list item without a key", lineno + 1);
            };
            let entry = fields.entry(key.clone()).or_default();
            if !entry.is_empty() {
                entry.push_str(", ");
            }
            entry.push_str(unquote(item.trim()));
            continue;
        }

        let Some((key, value)) = trimmed.split_once(':') else {
            bail!("line {}: expected 'key: value'", lineno + 1);
        };
        let key = key.trim().to_string();
        fields.insert(key.clone(), unquote(value.trim()).to_string());
        last_key = Some(key);
    }

    Ok(fields)
}

fn parse_toml(header: &str) -> Result<HashMap<String, String>> {
    let table: toml::Table = toml::from_str(header)?;
    Ok(table
        .into_iter()
        .map(|(k, v)| {
            let value = match v {
                toml::Value::String(s) => s,
                other => other.to_string(),
            };
            (k, value)
        })
        .collect())
}

fn unquote(value: &str) -> &str {
    for q in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(q) && value.ends_with(q) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yaml_front_matter() {
        let raw = "---\ntitle: \"How to Start\"\ndate: 2005-03\nurl: https://example.com/start\n---\n\nBody text.\n";
        let doc = parse_document(raw, "start.md").unwrap();
        assert_eq!(doc.metadata.title, "How to Start");
        assert_eq!(doc.metadata.source_url, "https://example.com/start");
        assert_eq!(doc.content, "Body text.");
        assert_eq!(doc.filename, "start.md");
    }

    #[test]
    fn test_toml_front_matter() {
        let raw = "+++\ntitle = \"Essay\"\ndate = \"2019-11\"\nurl = \"https://example.com/e\"\n+++\nHello";
        let doc = parse_document(raw, "e.md").unwrap();
        assert_eq!(doc.metadata.title, "Essay");
        assert_eq!(doc.content, "Hello");
    }

    #[test]
    fn test_url_with_colon_kept_whole() {
        let fm = split_front_matter("---\nurl: https://a.b/c\n---\n").unwrap();
        assert_eq!(fm.get("url"), Some("https://a.b/c"));
    }

    #[test]
    fn test_list_values_joined() {
        let fm = split_front_matter("---\ntags:\n  - a\n  - b\n---\nx").unwrap();
        assert_eq!(fm.get("tags"), Some("a, b"));
    }

    #[test]
    fn test_missing_front_matter_rejected() {
        let err = parse_document("just a body", "plain.md").unwrap_err();
        assert!(format!("{:#}", err).contains("missing required metadata key 'title'"));
    }

    #[test]
    fn test_bad_date_rejected() {
        let raw = "---\ntitle: T\ndate: 2024-13\nurl: u\n---\nbody";
        let err = parse_document(raw, "bad.md").unwrap_err();
        assert!(format!("{:#}", err).contains("Date format must be YYYY-MM"));
    }

    #[test]
    fn test_unterminated_header() {
        assert!(split_front_matter("---\ntitle: T\nbody").is_err());
    }
}
