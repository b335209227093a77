//! `devssr build` command implementation.
//!
//! One-shot compilation of every target. Unlike `dev`, outputs are always
//! written to disk and a manifest write failure fails the command.

use devssr_core::hmr::install_client_runtime;
use devssr_core::{load_config, CommandEngine, Config, ManifestWriter, MultiCompiler};
use miette::{miette, IntoDiagnostic, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Build action.
#[derive(Debug, Clone)]
pub struct BuildAction {
    pub cwd: PathBuf,
    /// Explicit config file path (overrides auto-discovery).
    pub config: Option<PathBuf>,
}

#[derive(Serialize)]
struct BuildSummaryJson {
    ok: bool,
    targets: Vec<TargetSummaryJson>,
}

#[derive(Serialize)]
struct TargetSummaryJson {
    name: String,
    hash: String,
    time_ms: u64,
    output_path: String,
    files: Vec<String>,
    warnings: Vec<String>,
}

/// Run the build command.
pub fn run(action: BuildAction, config: &Config) -> Result<()> {
    let (_, build) = load_config(&action.cwd, action.config.as_deref()).into_diagnostic()?;
    if build.targets.iter().any(|t| t.is_hot()) {
        let runtime = install_client_runtime(&build.root()).into_diagnostic()?;
        debug!(path = %runtime.display(), "hot client runtime installed");
    }
    let multi = MultiCompiler::new(&build, Arc::new(CommandEngine::new()));

    let writers: Vec<Arc<ManifestWriter>> = multi
        .compilers()
        .iter()
        .filter_map(|compiler| {
            let writer = Arc::new(ManifestWriter::from_target(
                compiler.target(),
                config.interactive,
            )?);
            writer.attach(compiler);
            Some(writer)
        })
        .collect();

    multi.run().into_diagnostic()?;

    let mut targets = Vec::with_capacity(multi.compilers().len());
    for compiler in multi.compilers() {
        let assets = compiler.assets();
        let written = assets.write_to_disk().into_diagnostic()?;
        info!(
            target = compiler.name(),
            files = written,
            dir = %assets.output_path().display(),
            "outputs written"
        );
        let stats = assets.stats();
        targets.push(TargetSummaryJson {
            name: stats.name.clone(),
            hash: stats.hash.clone(),
            time_ms: stats.time_ms,
            output_path: assets.output_path().display().to_string(),
            files: assets.files().map(|(name, _)| name.to_string()).collect(),
            warnings: stats.warnings.clone(),
        });
    }

    for writer in &writers {
        if let Some(e) = writer.take_error() {
            return Err(miette!("{e}"));
        }
    }

    if config.json_logs {
        let summary = BuildSummaryJson { ok: true, targets };
        println!("{}", serde_json::to_string(&summary).into_diagnostic()?);
    } else {
        for target in &targets {
            println!(
                "{} {} ({} files, {}ms)",
                target.name,
                target.hash,
                target.files.len(),
                target.time_ms
            );
            for warning in &target.warnings {
                println!("  warning: {warning}");
            }
        }
    }
    Ok(())
}
