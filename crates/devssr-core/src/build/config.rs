//! Build configuration: targets, output layout, rules and plugins.
//!
//! Loaded from `devssr.config.json` in the project root, or built from
//! [`BuildConfig::standard`] when no file exists.
//!
//! ```json
//! {
//!   "server": { "port": 3000, "render_entry": "./dist/server" },
//!   "targets": [
//!     {
//!       "name": "client",
//!       "kind": "web",
//!       "entry": { "client": ["./src/client.js"] },
//!       "output": { "path": "dist", "filename": "assets/[name].js", "public_path": "/" },
//!       "command": "npx webpack --config webpack.{target}.config.js --output-path {outdir}"
//!     }
//!   ]
//! }
//! ```

use super::rules::{LoaderUse, Pattern, Rule, RuleSet, FILE_LOADER, SVG_URL_LOADER, URL_LOADER};
use super::template::FilenameTemplate;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Config file names in priority order.
pub const CONFIG_FILES: &[&str] = &["devssr.config.json", ".devssr.json"];

/// Directory (below the root) where engines write before collection.
pub const STAGING_DIR: &str = ".devssr";

/// Name of the browser target.
pub const CLIENT_TARGET: &str = "client";
/// Name of the server-render target.
pub const SERVER_TARGET: &str = "server";

/// Engine command of the standard targets.
pub const STANDARD_COMMAND: &str =
    "npx webpack --config webpack.{target}.config.js --output-path {outdir}";

/// Client entry request of the change-notification runtime, relative to the root.
pub const HMR_CLIENT_ENTRY: &str = "./.devssr/hmr-client.js";

/// Top-level build configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    /// Project root every relative path is resolved against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<PathBuf>,
    #[serde(default)]
    pub server: ServerOptions,
    pub targets: Vec<TargetConfig>,
}

/// Dev server options.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Module request of the server bundle, relative to the root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_entry: Option<String>,
    /// Program used to evaluate the server bundle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,
}

impl ServerOptions {
    pub const DEFAULT_PORT: u16 = 3000;
    pub const DEFAULT_HOST: &'static str = "localhost";
    pub const DEFAULT_RENDER_ENTRY: &'static str = "./dist/server";
    pub const DEFAULT_RUNTIME: &'static str = "node";

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port.unwrap_or(Self::DEFAULT_PORT)
    }

    #[must_use]
    pub fn host(&self) -> &str {
        self.host.as_deref().unwrap_or(Self::DEFAULT_HOST)
    }

    #[must_use]
    pub fn render_entry(&self) -> &str {
        self.render_entry
            .as_deref()
            .unwrap_or(Self::DEFAULT_RENDER_ENTRY)
    }

    #[must_use]
    pub fn runtime(&self) -> &str {
        self.runtime.as_deref().unwrap_or(Self::DEFAULT_RUNTIME)
    }
}

/// Platform a target compiles for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    #[default]
    Web,
    Node,
}

/// One compilation target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetConfig {
    pub name: String,
    #[serde(default)]
    pub kind: TargetKind,
    /// Entry name to the requests bundled into it.
    pub entry: BTreeMap<String, Vec<String>>,
    pub output: OutputConfig,
    #[serde(default)]
    pub resolve: ResolveConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub split_chunks: Vec<CacheGroup>,
    #[serde(default)]
    pub rules: RuleSet,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<Plugin>,
    /// Leave `node_modules` requests as runtime `require`s.
    #[serde(default)]
    pub node_externals: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub devtool: Option<String>,
    /// Shell command invoking the bundling engine for this target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

/// Output layout of a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputConfig {
    pub path: PathBuf,
    pub filename: FilenameTemplate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_filename: Option<FilenameTemplate>,
    #[serde(default = "default_public_path")]
    pub public_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub library_target: Option<String>,
}

fn default_public_path() -> String {
    "/".to_string()
}

/// Module resolution settings handed to the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResolveConfig {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modules: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub alias: BTreeMap<String, PathBuf>,
}

impl ResolveConfig {
    /// Rewrite a request whose first segment is an alias key.
    ///
    /// `~` with alias `~ -> /p/src` maps `~/a/b.js` to `/p/src/a/b.js`;
    /// `~foo` is left alone.
    #[must_use]
    pub fn apply_alias(&self, request: &str) -> Option<PathBuf> {
        self.alias.iter().find_map(|(key, target)| {
            if request == key {
                Some(target.clone())
            } else {
                request
                    .strip_prefix(key.as_str())
                    .and_then(|rest| rest.strip_prefix('/'))
                    .map(|rest| target.join(rest))
            }
        })
    }
}

/// Which chunks a split-chunk cache group draws modules from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkSelection {
    #[default]
    Initial,
    Async,
    All,
}

/// A split-chunk cache group producing a shared chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheGroup {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<Pattern>,
    #[serde(default)]
    pub chunks: ChunkSelection,
}

/// Build plugins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", deny_unknown_fields)]
pub enum Plugin {
    /// Compile-time constant replacements.
    Define { values: BTreeMap<String, Value> },
    /// Emit hot-update payloads.
    HotModuleReplacement,
    /// Extract stylesheets into one file per chunk.
    ExtractCss { filename: FilenameTemplate },
    /// Write the asset manifest and the chunk manifest after each build.
    AssetsManifest {
        /// Relative to the target's output path.
        output: PathBuf,
        /// Prefix files with the output public path.
        #[serde(default = "default_true")]
        public_path: bool,
        /// Relative to the target's output path.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chunk_manifest: Option<PathBuf>,
    },
}

fn default_true() -> bool {
    true
}

impl TargetConfig {
    /// The extract-css filename template, if the plugin is configured.
    #[must_use]
    pub fn css_filename(&self) -> Option<&FilenameTemplate> {
        self.plugins.iter().find_map(|p| match p {
            Plugin::ExtractCss { filename } => Some(filename),
            _ => None,
        })
    }

    /// Whether hot-update payloads are emitted for this target.
    #[must_use]
    pub fn is_hot(&self) -> bool {
        self.plugins
            .iter()
            .any(|p| matches!(p, Plugin::HotModuleReplacement))
    }

    /// Public URL of an output file.
    #[must_use]
    pub fn public_url(&self, file: &str) -> String {
        join_public_path(&self.output.public_path, file)
    }
}

/// Join a public path and a relative file with exactly one `/` between them.
#[must_use]
pub fn join_public_path(public_path: &str, file: &str) -> String {
    if public_path.is_empty() {
        return file.to_string();
    }
    format!(
        "{}/{}",
        public_path.trim_end_matches('/'),
        file.trim_start_matches('/')
    )
}

impl BuildConfig {
    /// The two-target layout used when no config file is present.
    #[must_use]
    pub fn standard(root: &Path) -> Self {
        let src = root.join("src");
        let build_dir = root.join("dist");
        let asset_name = "assets/[name].[ext]";

        let resolve = ResolveConfig {
            modules: vec!["node_modules".to_string()],
            alias: BTreeMap::from([("~".to_string(), src.clone())]),
        };

        let image_rule = Rule {
            test: Some(pattern(r"\.(bpm|gif|jpg|jpeg|png|svg)$")),
            one_of: vec![
                // Inline lightweight images into CSS
                Rule {
                    issuer: Some(pattern(r"\.(css|less|styl|scss|sass)$")),
                    one_of: vec![
                        Rule {
                            test: Some(pattern(r"\.svg$")),
                            uses: vec![LoaderUse::new(SVG_URL_LOADER)
                                .with_options(json!({"name": asset_name, "limit": 4096}))],
                            ..Default::default()
                        },
                        Rule {
                            uses: vec![LoaderUse::new(URL_LOADER)
                                .with_options(json!({"name": asset_name, "limit": 4096}))],
                            ..Default::default()
                        },
                    ],
                    ..Default::default()
                },
                // Or return public URL to image resource
                Rule {
                    uses: vec![LoaderUse::new(FILE_LOADER).with_options(json!({"name": asset_name}))],
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let script_rule = |env_targets: Value| Rule {
            test: Some(pattern(r"\.js$")),
            include: vec![src.clone()],
            uses: vec![LoaderUse::new("babel-loader").with_options(json!({
                "babelrc": false,
                "cacheDirectory": false,
                "presets": [
                    ["@babel/env", {"targets": env_targets, "modules": false, "useBuiltIns": false}],
                    ["@babel/preset-react", {"development": true}],
                ],
                "plugins": [
                    ["@babel/plugin-proposal-decorators", {"legacy": true}],
                    ["@babel/plugin-proposal-class-properties", {"loose": true}],
                    ["@babel/plugin-transform-runtime"],
                    ["react-hot-loader/babel"],
                    "@babel/plugin-syntax-dynamic-import",
                    "@babel/plugin-syntax-import-meta",
                ],
            }))],
            ..Default::default()
        };

        let css_loader = LoaderUse::new("css-loader").with_options(json!({
            "sourceMap": false,
            "modules": true,
            "localIdentName": "[path]_[local]",
            "exportOnlyLocals": true,
        }));

        let client = TargetConfig {
            name: CLIENT_TARGET.to_string(),
            kind: TargetKind::Web,
            entry: BTreeMap::from([(
                "client".to_string(),
                vec![HMR_CLIENT_ENTRY.to_string(), "./src/client.js".to_string()],
            )]),
            output: OutputConfig {
                path: build_dir.clone(),
                filename: template("assets/[name].js"),
                chunk_filename: Some(template("assets/[name].chunk.js")),
                public_path: "http://cdn.cn/".to_string(),
                library_target: None,
            },
            resolve: resolve.clone(),
            split_chunks: vec![CacheGroup {
                name: "vendors".to_string(),
                test: Some(pattern(r"[\\/]node_modules[\\/]")),
                chunks: ChunkSelection::Initial,
            }],
            rules: RuleSet(vec![
                Rule {
                    test: Some(pattern(r"\.css$")),
                    uses: vec![LoaderUse::new("extract-css-loader"), css_loader.clone()],
                    ..Default::default()
                },
                script_rule(json!("> 0.25%, not dead")),
                image_rule.clone(),
            ]),
            plugins: vec![
                Plugin::Define {
                    values: BTreeMap::from([("__isClient__".to_string(), json!(true))]),
                },
                Plugin::HotModuleReplacement,
                Plugin::ExtractCss {
                    filename: template("assets/[name].css"),
                },
                Plugin::AssetsManifest {
                    output: PathBuf::from("manifest.json"),
                    public_path: true,
                    chunk_manifest: Some(PathBuf::from("chunk-manifest.json")),
                },
            ],
            node_externals: false,
            devtool: Some("cheap-module-inline-source-map".to_string()),
            command: Some(STANDARD_COMMAND.to_string()),
        };

        let server = TargetConfig {
            name: SERVER_TARGET.to_string(),
            kind: TargetKind::Node,
            entry: BTreeMap::from([(
                "server".to_string(),
                vec!["./src/server.js".to_string()],
            )]),
            output: OutputConfig {
                path: build_dir.join("server"),
                filename: template("index.js"),
                chunk_filename: Some(template("chunks/[name].js")),
                public_path: "/".to_string(),
                library_target: Some("commonjs2".to_string()),
            },
            resolve,
            split_chunks: Vec::new(),
            rules: RuleSet(vec![
                Rule {
                    test: Some(pattern(r"\.css$")),
                    uses: vec![css_loader],
                    ..Default::default()
                },
                script_rule(json!({"node": "current"})),
                image_rule,
            ]),
            plugins: vec![Plugin::Define {
                values: BTreeMap::from([("__isClient__".to_string(), json!(false))]),
            }],
            node_externals: true,
            devtool: Some("cheap-module-source-map".to_string()),
            command: Some(STANDARD_COMMAND.to_string()),
        };

        Self {
            context: Some(root.to_path_buf()),
            server: ServerOptions::default(),
            targets: vec![client, server],
        }
    }

    /// Look up a target by name.
    #[must_use]
    pub fn target(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| t.name == name)
    }

    /// Project root.
    #[must_use]
    pub fn root(&self) -> PathBuf {
        self.context.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    /// Make every relative path absolute against `root` and check invariants.
    ///
    /// # Errors
    /// Returns an error for duplicate or empty target names, or targets
    /// without entries.
    pub fn finalize(mut self, root: &Path) -> Result<Self, ConfigError> {
        let root = match &self.context {
            Some(ctx) if ctx.is_absolute() => ctx.clone(),
            Some(ctx) => root.join(ctx),
            None => root.to_path_buf(),
        };

        let mut seen = std::collections::HashSet::new();
        for target in &mut self.targets {
            if target.name.is_empty() {
                return Err(ConfigError::Invalid("target name must not be empty".into()));
            }
            if !seen.insert(target.name.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate target `{}`",
                    target.name
                )));
            }
            if target.entry.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "target `{}` has no entry",
                    target.name
                )));
            }
            target.output.path = absolutize(&root, &target.output.path);
            for alias in target.resolve.alias.values_mut() {
                *alias = absolutize(&root, alias);
            }
            for rule in &mut target.rules.0 {
                absolutize_rule(&root, rule);
            }
        }

        self.context = Some(root);
        Ok(self)
    }

    /// Staging directory for a target.
    #[must_use]
    pub fn staging_dir(&self, target: &str) -> PathBuf {
        self.root().join(STAGING_DIR).join(target)
    }
}

fn absolutize(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn absolutize_rule(root: &Path, rule: &mut Rule) {
    for include in &mut rule.include {
        *include = absolutize(root, include);
    }
    for nested in &mut rule.one_of {
        absolutize_rule(root, nested);
    }
}

// Built-in patterns and templates are literals checked by tests.
fn pattern(source: &str) -> Pattern {
    Pattern::new(source).unwrap_or_else(|e| panic!("built-in pattern: {e}"))
}

fn template(source: &str) -> FilenameTemplate {
    FilenameTemplate::parse(source).unwrap_or_else(|e| panic!("built-in template: {e}"))
}

/// Find a config file in the given root directory.
#[must_use]
pub fn find_config_file(root: &Path) -> Option<PathBuf> {
    CONFIG_FILES
        .iter()
        .map(|name| root.join(name))
        .find(|path| path.exists())
}

/// Load the build configuration for `root`.
///
/// If `config_path` is `Some`, that file must exist. Otherwise the root is
/// searched for [`CONFIG_FILES`], falling back to [`BuildConfig::standard`].
/// Returns the file the config came from, if any.
///
/// # Errors
/// Returns an error if the file cannot be read, parsed or validated.
pub fn load_config(
    root: &Path,
    config_path: Option<&Path>,
) -> Result<(Option<PathBuf>, BuildConfig), ConfigError> {
    let path = match config_path {
        Some(p) => {
            let abs = absolutize(root, p);
            if !abs.exists() {
                return Err(ConfigError::NotFound { path: abs });
            }
            abs
        }
        None => match find_config_file(root) {
            Some(p) => p,
            None => return Ok((None, BuildConfig::standard(root).finalize(root)?)),
        },
    };

    let source = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    let config: BuildConfig =
        serde_json::from_str(&source).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;
    let base = path.parent().unwrap_or(root);
    Ok((Some(path.clone()), config.finalize(base)?))
}
