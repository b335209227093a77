//! Output filename templates (`assets/[name].[chunkhash:8].js`).
//!
//! Templates are rendered when naming emitted files and reverse-matched when
//! recovering the chunk an emitted file belongs to.

use crate::error::ConfigError;
use regex_lite::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A placeholder inside a template.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Name,
    Id,
    Ext,
    Hash(Option<usize>),
}

/// A parsed filename template.
#[derive(Clone)]
pub struct FilenameTemplate {
    source: String,
    segments: Vec<Segment>,
    matcher: Regex,
}

/// Values substituted when rendering a template.
#[derive(Debug, Clone, Default)]
pub struct TemplateValues<'a> {
    pub name: &'a str,
    pub id: &'a str,
    pub ext: &'a str,
    pub hash: &'a str,
}

impl FilenameTemplate {
    /// Parse a template string.
    ///
    /// # Errors
    /// Returns an error for an unknown or unterminated placeholder.
    pub fn parse(source: &str) -> Result<Self, ConfigError> {
        let segments = parse_segments(source)?;
        let matcher = build_matcher(&segments).map_err(|message| ConfigError::Pattern {
            pattern: source.to_string(),
            message,
        })?;
        Ok(Self {
            source: source.to_string(),
            segments,
            matcher,
        })
    }

    /// The template as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the template contains a `[name]` placeholder.
    #[must_use]
    pub fn has_name(&self) -> bool {
        self.segments.contains(&Segment::Name)
    }

    /// Substitute placeholders.
    #[must_use]
    pub fn render(&self, values: &TemplateValues<'_>) -> String {
        let mut out = String::with_capacity(self.source.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Name => out.push_str(values.name),
                Segment::Id => out.push_str(values.id),
                Segment::Ext => out.push_str(values.ext),
                Segment::Hash(len) => {
                    let hash = values.hash;
                    out.push_str(&hash[..len.unwrap_or(hash.len()).min(hash.len())]);
                }
            }
        }
        out
    }

    /// Whether a file could have been produced by this template.
    #[must_use]
    pub fn matches(&self, file: &str) -> bool {
        self.matcher.is_match(file)
    }

    /// Recover the `[name]` value of a file produced by this template.
    ///
    /// Returns `None` when the file does not fit the template or the
    /// template has no `[name]` placeholder.
    #[must_use]
    pub fn match_name(&self, file: &str) -> Option<String> {
        let caps = self.matcher.captures(file)?;
        caps.name("name").map(|m| m.as_str().to_string())
    }
}

fn parse_segments(source: &str) -> Result<Vec<Segment>, ConfigError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut rest = source;

    while let Some(open) = rest.find('[') {
        literal.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find(']').ok_or_else(|| ConfigError::Pattern {
            pattern: source.to_string(),
            message: "unterminated placeholder".to_string(),
        })?;
        let placeholder = &after[..close];
        let (key, len) = match placeholder.split_once(':') {
            Some((key, len)) => {
                let len = len.parse::<usize>().map_err(|_| ConfigError::Pattern {
                    pattern: source.to_string(),
                    message: format!("invalid length in [{placeholder}]"),
                })?;
                (key, Some(len))
            }
            None => (placeholder, None),
        };
        let segment = match key {
            "name" => Segment::Name,
            "id" => Segment::Id,
            "ext" => Segment::Ext,
            "hash" | "chunkhash" | "contenthash" | "fullhash" => Segment::Hash(len),
            other => {
                return Err(ConfigError::Pattern {
                    pattern: source.to_string(),
                    message: format!("unknown placeholder [{other}]"),
                })
            }
        };
        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        segments.push(segment);
        rest = &after[close + 1..];
    }
    literal.push_str(rest);
    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

fn build_matcher(segments: &[Segment]) -> Result<Regex, String> {
    let mut pattern = String::from("^");
    let mut named = false;
    for segment in segments {
        match segment {
            Segment::Literal(s) => pattern.push_str(&regex_lite::escape(s)),
            Segment::Name if !named => {
                pattern.push_str("(?P<name>[^/]+?)");
                named = true;
            }
            Segment::Name => pattern.push_str("[^/]+?"),
            Segment::Id => pattern.push_str("[^/]+?"),
            Segment::Ext => pattern.push_str("[^./]+"),
            Segment::Hash(Some(len)) => pattern.push_str(&format!("[0-9A-Za-z]{{{len}}}")),
            Segment::Hash(None) => pattern.push_str("[0-9A-Za-z]+"),
        }
    }
    pattern.push('$');
    Regex::new(&pattern).map_err(|e| e.to_string())
}

impl fmt::Debug for FilenameTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FilenameTemplate").field(&self.source).finish()
    }
}

impl PartialEq for FilenameTemplate {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Serialize for FilenameTemplate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for FilenameTemplate {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Self::parse(&source).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_with_hash_length() {
        let t = FilenameTemplate::parse("assets/[name].[chunkhash:4].js").unwrap();
        let out = t.render(&TemplateValues {
            name: "main",
            hash: "a1b2c3d4",
            ..Default::default()
        });
        assert_eq!(out, "assets/main.a1b2.js");
    }

    #[test]
    fn test_match_name_plain() {
        let t = FilenameTemplate::parse("assets/[name].js").unwrap();
        assert_eq!(t.match_name("assets/client.js").as_deref(), Some("client"));
        assert_eq!(t.match_name("assets/client.css"), None);
        assert_eq!(t.match_name("client.js"), None);
    }

    #[test]
    fn test_match_name_is_lazy_before_suffix() {
        let chunk = FilenameTemplate::parse("assets/[name].chunk.js").unwrap();
        assert_eq!(
            chunk.match_name("assets/home.chunk.js").as_deref(),
            Some("home")
        );

        // The entry template would also accept this file; callers try the
        // more specific template first.
        let entry = FilenameTemplate::parse("assets/[name].js").unwrap();
        assert_eq!(
            entry.match_name("assets/home.chunk.js").as_deref(),
            Some("home.chunk")
        );
    }

    #[test]
    fn test_match_name_with_hash() {
        let t = FilenameTemplate::parse("[name].[hash:4].js").unwrap();
        assert_eq!(t.match_name("main.a1b2.js").as_deref(), Some("main"));
        assert_eq!(t.match_name("main.a1b2c.js"), None);
        assert_eq!(t.match_name("main.a1b2.js.map"), None);
    }

    #[test]
    fn test_literal_regex_characters_are_escaped() {
        let t = FilenameTemplate::parse("a+b/[name].js").unwrap();
        assert_eq!(t.match_name("a+b/x.js").as_deref(), Some("x"));
        assert_eq!(t.match_name("aab/x.js"), None);
    }

    #[test]
    fn test_unknown_placeholder_is_rejected() {
        let err = FilenameTemplate::parse("[nmae].js").unwrap_err();
        assert!(err.to_string().contains("unknown placeholder"));
        assert!(FilenameTemplate::parse("[name.js").is_err());
        assert!(FilenameTemplate::parse("[hash:x].js").is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let t: FilenameTemplate = serde_json::from_str("\"assets/[name].css\"").unwrap();
        assert_eq!(t.as_str(), "assets/[name].css");
        assert!(t.has_name());
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"assets/[name].css\"");
    }
}
