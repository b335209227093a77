//! `devssr inspect` command implementation.
//!
//! Shows how a target's rules treat one request, without compiling.

use devssr_core::build::{AssetDisposition, InlineEncoding, LoaderUse, CLIENT_TARGET};
use devssr_core::load_config;
use miette::{miette, IntoDiagnostic, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Inspect action.
#[derive(Debug, Clone)]
pub struct InspectAction {
    pub cwd: PathBuf,
    /// Module request, e.g. `~/images/logo.png`.
    pub request: String,
    /// Importing module, for rules with an `issuer` condition.
    pub issuer: Option<PathBuf>,
    /// Target whose rules apply; defaults to the client.
    pub target: Option<String>,
    pub config: Option<PathBuf>,
}

#[derive(Serialize)]
struct InspectJson {
    target: String,
    request: String,
    resource: String,
    loaders: Vec<LoaderUse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    disposition: Option<DispositionJson>,
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum DispositionJson {
    Inline { encoding: &'static str },
    Emit { filename: String },
    Transform,
}

impl From<AssetDisposition> for DispositionJson {
    fn from(disposition: AssetDisposition) -> Self {
        match disposition {
            AssetDisposition::Inline { encoding } => Self::Inline {
                encoding: match encoding {
                    InlineEncoding::Base64 => "base64",
                    InlineEncoding::Utf8 => "utf8",
                },
            },
            AssetDisposition::Emit { filename } => Self::Emit { filename },
            AssetDisposition::Transform => Self::Transform,
        }
    }
}

fn absolutize(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

/// Run the inspect command.
pub fn run(action: InspectAction, json: bool) -> Result<()> {
    let (_, build) = load_config(&action.cwd, action.config.as_deref()).into_diagnostic()?;
    let root = build.root();
    let name = action.target.as_deref().unwrap_or(CLIENT_TARGET);
    let target = build
        .target(name)
        .ok_or_else(|| miette!("no target named `{name}`"))?;

    let resource = target
        .resolve
        .apply_alias(&action.request)
        .unwrap_or_else(|| absolutize(&root, Path::new(&action.request)));
    let issuer = action.issuer.as_deref().map(|p| absolutize(&root, p));

    let loaders = target.rules.loaders_for(&resource, issuer.as_deref());
    let size = std::fs::metadata(&resource)
        .ok()
        .filter(std::fs::Metadata::is_file)
        .map(|m| m.len());
    let disposition = size.map(|size| AssetDisposition::decide(&loaders, &resource, size));

    if json {
        let out = InspectJson {
            target: target.name.clone(),
            request: action.request,
            resource: resource.display().to_string(),
            loaders,
            size,
            disposition: disposition.map(DispositionJson::from),
        };
        println!("{}", serde_json::to_string_pretty(&out).into_diagnostic()?);
        return Ok(());
    }

    println!("target:   {}", target.name);
    println!("resource: {}", resource.display());
    if loaders.is_empty() {
        println!("loaders:  (none)");
    } else {
        println!("loaders:");
        for (i, loader) in loaders.iter().enumerate() {
            if loader.options.is_null() {
                println!("  {}. {}", i + 1, loader.loader);
            } else {
                println!("  {}. {} {}", i + 1, loader.loader, loader.options);
            }
        }
    }
    match (size, disposition) {
        (Some(size), Some(AssetDisposition::Inline { encoding })) => {
            println!("size:     {size} bytes");
            println!("result:   inlined as data URL ({encoding:?})");
        }
        (Some(size), Some(AssetDisposition::Emit { filename })) => {
            println!("size:     {size} bytes");
            println!("result:   emitted as {filename}");
        }
        (Some(size), _) => {
            println!("size:     {size} bytes");
            println!("result:   transformed in place");
        }
        (None, _) => println!("result:   file not found, disposition unknown"),
    }
    Ok(())
}
