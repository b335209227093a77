//! Module rules: which loader chain handles a resource.
//!
//! Every matching top-level rule contributes its loaders, in rule order.
//! Inside `one_of`, only the first matching branch applies.

use crate::error::ConfigError;
use regex_lite::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use std::path::{Path, PathBuf};

/// Default inline threshold of the data-URL loaders (4 KiB).
pub const INLINE_LIMIT: u64 = 4096;

/// Loader that inlines any file as a base64 data URL below its limit.
pub const URL_LOADER: &str = "url-loader";
/// Loader that inlines SVG as a UTF-8 data URL below its limit.
pub const SVG_URL_LOADER: &str = "svg-url-loader";
/// Loader that always emits a separate file.
pub const FILE_LOADER: &str = "file-loader";

/// A regular expression that (de)serializes as its source string.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    /// Compile a pattern.
    ///
    /// # Errors
    /// Returns an error if the expression is invalid.
    pub fn new(source: &str) -> Result<Self, ConfigError> {
        let regex = Regex::new(source).map_err(|e| ConfigError::Pattern {
            pattern: source.to_string(),
            message: e.to_string(),
        })?;
        Ok(Self {
            source: source.to_string(),
            regex,
        })
    }

    /// Test a path, using `/` separators regardless of platform.
    #[must_use]
    pub fn is_match(&self, path: &Path) -> bool {
        self.regex.is_match(&path.to_string_lossy().replace('\\', "/"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/", self.source)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for Pattern {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Self::new(&source).map_err(serde::de::Error::custom)
    }
}

/// One loader in a chain, with its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoaderUse {
    pub loader: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub options: Value,
}

impl LoaderUse {
    #[must_use]
    pub fn new(loader: &str) -> Self {
        Self {
            loader: loader.to_string(),
            options: Value::Null,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: Value) -> Self {
        self.options = options;
        self
    }

    /// The numeric `limit` option, if set.
    #[must_use]
    pub fn limit(&self) -> Option<u64> {
        self.options.get("limit").and_then(Value::as_u64)
    }

    /// The `name` option, if set.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.options.get("name").and_then(Value::as_str)
    }
}

/// A rule mapping resources to loaders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<Pattern>,
    /// Path prefixes the resource must live under (any of).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include: Vec<PathBuf>,
    /// Pattern the importing module must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<Pattern>,
    #[serde(default, rename = "use", skip_serializing_if = "Vec::is_empty")]
    pub uses: Vec<LoaderUse>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub one_of: Vec<Rule>,
}

impl Rule {
    /// Whether the rule's own conditions accept the resource.
    #[must_use]
    pub fn matches(&self, resource: &Path, issuer: Option<&Path>) -> bool {
        if let Some(test) = &self.test {
            if !test.is_match(resource) {
                return false;
            }
        }
        if !self.include.is_empty() && !self.include.iter().any(|p| resource.starts_with(p)) {
            return false;
        }
        if let Some(pattern) = &self.issuer {
            match issuer {
                Some(issuer) if pattern.is_match(issuer) => {}
                _ => return false,
            }
        }
        true
    }

    /// Loaders this rule contributes, or `None` if it does not apply.
    fn resolve(&self, resource: &Path, issuer: Option<&Path>) -> Option<Vec<LoaderUse>> {
        if !self.matches(resource, issuer) {
            return None;
        }
        let mut chain = Vec::new();
        if !self.one_of.is_empty() {
            let branch = self
                .one_of
                .iter()
                .find_map(|rule| rule.resolve(resource, issuer))?;
            chain.extend(branch);
        }
        chain.extend(self.uses.iter().cloned());
        Some(chain)
    }
}

/// Ordered list of top-level rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet(pub Vec<Rule>);

impl RuleSet {
    /// Loader chain for a resource requested by `issuer`.
    #[must_use]
    pub fn loaders_for(&self, resource: &Path, issuer: Option<&Path>) -> Vec<LoaderUse> {
        self.0
            .iter()
            .filter_map(|rule| rule.resolve(resource, issuer))
            .flatten()
            .collect()
    }
}

/// How an asset ends up in the output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetDisposition {
    /// Embedded as a data URL.
    Inline { encoding: InlineEncoding },
    /// Emitted as a separate file.
    Emit { filename: String },
    /// Handled by a loader without an asset policy (scripts, styles).
    Transform,
}

/// Data URL encoding of an inlined asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineEncoding {
    Base64,
    Utf8,
}

impl AssetDisposition {
    /// Decide the inline-vs-file policy for a resource of `size` bytes.
    ///
    /// The first loader of the chain decides. Data-URL loaders inline when
    /// `size <= limit` and otherwise fall back to emitting a file named by
    /// their `name` option.
    #[must_use]
    pub fn decide(chain: &[LoaderUse], resource: &Path, size: u64) -> Self {
        let Some(head) = chain.first() else {
            return Self::Transform;
        };
        let encoding = match head.loader.as_str() {
            URL_LOADER => Some(InlineEncoding::Base64),
            SVG_URL_LOADER => Some(InlineEncoding::Utf8),
            FILE_LOADER => None,
            _ => return Self::Transform,
        };
        if let Some(encoding) = encoding {
            if head.limit().is_some_and(|limit| size <= limit) {
                return Self::Inline { encoding };
            }
        }
        Self::Emit {
            filename: asset_filename(head.name().unwrap_or("[name].[ext]"), resource),
        }
    }
}

/// Render an asset `name` option for a resource.
fn asset_filename(template: &str, resource: &Path) -> String {
    let stem = resource
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("asset");
    let ext = resource
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("bin");
    template.replace("[name]", stem).replace("[ext]", ext)
}
