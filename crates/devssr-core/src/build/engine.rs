//! Bundling engines.
//!
//! An engine turns a target configuration into a tree of output files. The
//! shipped [`CommandEngine`] delegates to an external tool through the
//! platform shell and collects what it wrote into a staging directory.

use super::config::TargetConfig;
use crate::error::BuildError;
use devssr_util::fs;
use std::collections::BTreeMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

/// Files produced by one engine run.
#[derive(Debug, Clone, Default)]
pub struct EngineOutput {
    /// Output path relative to the output directory, `/`-separated.
    pub files: BTreeMap<String, Vec<u8>>,
    pub warnings: Vec<String>,
}

/// Where an engine run happens.
#[derive(Debug, Clone)]
pub struct EngineContext<'a> {
    pub root: &'a Path,
    pub target: &'a TargetConfig,
    /// Directory the engine writes into; emptied before each run.
    pub staging_dir: &'a Path,
}

/// Something that can compile a target.
pub trait BundleEngine: Send + Sync {
    /// Run one compilation.
    ///
    /// # Errors
    /// Returns a [`BuildError`] if the compilation fails.
    fn compile(&self, cx: &EngineContext<'_>) -> Result<EngineOutput, BuildError>;
}

/// Runs the target's `command` through `sh -c` (`cmd.exe /C` on Windows).
///
/// Placeholders in the command: `{target}`, `{outdir}` (staging
/// directory), `{root}`, `{config}` (serialized target configuration).
/// The same values are exported as `DEVSSR_TARGET`, `DEVSSR_OUTDIR`,
/// `DEVSSR_ROOT` and `DEVSSR_CONFIG`.
#[derive(Debug, Clone, Default)]
pub struct CommandEngine;

impl CommandEngine {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Path of the serialized configuration written next to a staging dir.
#[must_use]
pub fn config_file_for(staging_dir: &Path) -> PathBuf {
    let mut name = staging_dir
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".config.json");
    staging_dir.with_file_name(name)
}

fn substitute(command: &str, vars: &[(&str, String)]) -> String {
    vars.iter().fold(command.to_string(), |acc, (key, value)| {
        acc.replace(&format!("{{{key}}}"), value)
    })
}

fn reset_dir(dir: &Path) -> io::Result<()> {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    std::fs::create_dir_all(dir)
}

impl BundleEngine for CommandEngine {
    fn compile(&self, cx: &EngineContext<'_>) -> Result<EngineOutput, BuildError> {
        let target = &cx.target.name;
        let command = cx
            .target
            .command
            .as_deref()
            .ok_or_else(|| BuildError::NoCommand {
                target: target.clone(),
            })?;

        let emit_err = |source| BuildError::Emit {
            target: target.clone(),
            dir: cx.staging_dir.to_path_buf(),
            source,
        };
        reset_dir(cx.staging_dir).map_err(emit_err)?;

        let config_path = config_file_for(cx.staging_dir);
        let serialized = serde_json::to_vec_pretty(cx.target)
            .map_err(|e| emit_err(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        fs::atomic_write(&config_path, &serialized).map_err(emit_err)?;

        let vars = [
            ("target", target.clone()),
            ("outdir", cx.staging_dir.display().to_string()),
            ("root", cx.root.display().to_string()),
            ("config", config_path.display().to_string()),
        ];
        let command = substitute(command, &vars);
        debug!(target = %target, command = %command, "running bundling engine");

        let (shell, shell_arg) = if cfg!(windows) {
            ("cmd.exe", "/C")
        } else {
            ("sh", "-c")
        };
        let mut cmd = Command::new(shell);
        cmd.arg(shell_arg)
            .arg(&command)
            .current_dir(cx.root)
            .stdin(Stdio::null());
        for (key, value) in &vars {
            cmd.env(format!("DEVSSR_{}", key.to_uppercase()), value);
        }

        let output = cmd.output().map_err(|source| BuildError::Spawn {
            target: target.clone(),
            source,
        })?;
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if !output.status.success() {
            return Err(BuildError::CommandFailed {
                target: target.clone(),
                code: output.status.code().unwrap_or(-1),
                stderr,
            });
        }

        let files = fs::collect_tree(cx.staging_dir).map_err(|source| BuildError::Collect {
            target: target.clone(),
            dir: cx.staging_dir.to_path_buf(),
            source,
        })?;
        let warnings = stderr
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();

        Ok(EngineOutput { files, warnings })
    }
}
