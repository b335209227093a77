//! Asset and chunk manifests.
//!
//! * `manifest.json`: chunk name to the public URLs of its files.
//! * `chunk-manifest.json`: chunk group name to the public URLs of every
//!   file of every chunk in the group, in load order.
//!
//! Source maps never appear in either manifest.

use crate::build::config::{join_public_path, Plugin, TargetConfig};
use crate::build::{Compiler, Stats};
use crate::error::ManifestError;
use devssr_util::fs::atomic_write;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error};

/// Logical name to public URLs.
pub type Manifest = BTreeMap<String, Vec<String>>;

fn is_source_map(file: &str) -> bool {
    file.ends_with(".map")
}

fn url(public_path: Option<&str>, file: &str) -> String {
    match public_path {
        Some(prefix) => join_public_path(prefix, file),
        None => file.to_string(),
    }
}

/// Build the asset manifest from stats.
#[must_use]
pub fn assets_manifest(stats: &Stats, public_path: Option<&str>) -> Manifest {
    stats
        .chunks
        .iter()
        .map(|chunk| {
            let files = chunk
                .files
                .iter()
                .filter(|f| !is_source_map(f))
                .map(|f| url(public_path, f))
                .collect();
            (chunk.name.clone(), files)
        })
        .collect()
}

/// Build the chunk manifest from stats.
#[must_use]
pub fn chunk_manifest(stats: &Stats, public_path: Option<&str>) -> Manifest {
    stats
        .chunk_groups
        .iter()
        .map(|group| {
            let files = group
                .chunks
                .iter()
                .filter_map(|name| stats.chunk(name))
                .flat_map(|chunk| chunk.files.iter())
                .filter(|f| !is_source_map(f))
                .map(|f| url(public_path, f))
                .collect();
            (group.name.clone(), files)
        })
        .collect()
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ManifestError> {
    let bytes = serde_json::to_vec_pretty(value).map_err(|source| ManifestError::Serialize {
        path: path.to_path_buf(),
        source,
    })?;
    atomic_write(path, &bytes).map_err(|source| ManifestError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes both manifests of a target after every successful build.
#[derive(Debug)]
pub struct ManifestWriter {
    manifest_path: PathBuf,
    chunk_manifest_path: Option<PathBuf>,
    public_path: Option<String>,
    interactive: bool,
    last_error: Mutex<Option<ManifestError>>,
}

impl ManifestWriter {
    /// Create a writer from the target's `assets-manifest` plugin, if any.
    #[must_use]
    pub fn from_target(target: &TargetConfig, interactive: bool) -> Option<Self> {
        target.plugins.iter().find_map(|plugin| match plugin {
            Plugin::AssetsManifest {
                output,
                public_path,
                chunk_manifest,
            } => Some(Self {
                manifest_path: target.output.path.join(output),
                chunk_manifest_path: chunk_manifest.as_ref().map(|p| target.output.path.join(p)),
                public_path: public_path.then(|| target.output.public_path.clone()),
                interactive,
                last_error: Mutex::new(None),
            }),
            _ => None,
        })
    }

    #[must_use]
    pub fn manifest_path(&self) -> &Path {
        &self.manifest_path
    }

    #[must_use]
    pub fn chunk_manifest_path(&self) -> Option<&Path> {
        self.chunk_manifest_path.as_deref()
    }

    /// Write the manifests for a finished build.
    ///
    /// # Errors
    /// Returns the first serialization or write failure.
    pub fn write(&self, stats: &Stats) -> Result<(), ManifestError> {
        let public_path = self.public_path.as_deref();
        write_json(&self.manifest_path, &assets_manifest(stats, public_path))?;
        if let Some(path) = &self.chunk_manifest_path {
            write_json(path, &chunk_manifest(stats, public_path))?;
        }
        debug!(path = %self.manifest_path.display(), "manifests written");
        Ok(())
    }

    /// Tap the compiler's `done` hook.
    ///
    /// Failures are logged. Interactive sessions carry on; otherwise the
    /// error is kept for [`ManifestWriter::take_error`].
    pub fn attach(self: &Arc<Self>, compiler: &Compiler) {
        let writer = Arc::clone(self);
        compiler.hooks().done.tap("manifest", move |stats| {
            if let Err(e) = writer.write(stats) {
                error!(error = %e, "failed to write manifest");
                if !writer.interactive {
                    *writer
                        .last_error
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner) = Some(e);
                }
            }
        });
    }

    /// The failure recorded by a non-interactive writer, if any.
    pub fn take_error(&self) -> Option<ManifestError> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::engine::{BundleEngine, EngineContext, EngineOutput};
    use crate::build::{BuildConfig, MultiCompiler, CLIENT_TARGET};
    use crate::build::stats::{Chunk, ChunkGroup};
    use crate::error::BuildError;
    use tempfile::tempdir;

    fn chunk(name: &str, files: &[&str], initial: bool) -> Chunk {
        Chunk {
            name: name.to_string(),
            initial,
            entry: initial,
            files: files.iter().map(|f| (*f).to_string()).collect(),
        }
    }

    #[test]
    fn test_source_maps_are_excluded() {
        let stats = Stats {
            chunks: vec![chunk("main", &["main.a1b2.js", "main.a1b2.js.map"], true)],
            ..Default::default()
        };
        let manifest = assets_manifest(&stats, None);
        assert_eq!(manifest["main"], vec!["main.a1b2.js"]);
    }

    #[test]
    fn test_chunk_manifest_concatenates_group_files() {
        let stats = Stats {
            chunks: vec![
                chunk("vendors", &["assets/vendors.js"], true),
                chunk("client", &["assets/client.css", "assets/client.js", "assets/client.js.map"], true),
            ],
            chunk_groups: vec![ChunkGroup {
                name: "client".into(),
                chunks: vec!["vendors".into(), "client".into()],
            }],
            ..Default::default()
        };
        let manifest = chunk_manifest(&stats, Some("http://cdn.cn/"));
        assert_eq!(
            manifest["client"],
            vec![
                "http://cdn.cn/assets/vendors.js",
                "http://cdn.cn/assets/client.css",
                "http://cdn.cn/assets/client.js",
            ]
        );
    }

    struct StaticEngine;

    impl BundleEngine for StaticEngine {
        fn compile(&self, _cx: &EngineContext<'_>) -> Result<EngineOutput, BuildError> {
            Ok(EngineOutput {
                files: [
                    ("assets/client.js", "c"),
                    ("assets/client.js.map", "{}"),
                    ("assets/vendors.js", "v"),
                ]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.as_bytes().to_vec()))
                .collect(),
                warnings: Vec::new(),
            })
        }
    }

    #[test]
    fn test_writer_runs_on_done() {
        let dir = tempdir().unwrap();
        let config = BuildConfig::standard(dir.path());
        let multi = MultiCompiler::new(&config, Arc::new(StaticEngine));
        let client = multi.find(CLIENT_TARGET).unwrap();

        let writer = Arc::new(ManifestWriter::from_target(client.target(), true).unwrap());
        writer.attach(&client);
        client.run().unwrap();

        let manifest: Manifest =
            serde_json::from_slice(&std::fs::read(dir.path().join("dist/manifest.json")).unwrap())
                .unwrap();
        assert_eq!(manifest["client"], vec!["http://cdn.cn/assets/client.js"]);
        assert_eq!(manifest["vendors"], vec!["http://cdn.cn/assets/vendors.js"]);

        let chunks: Manifest = serde_json::from_slice(
            &std::fs::read(dir.path().join("dist/chunk-manifest.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(
            chunks["client"],
            vec!["http://cdn.cn/assets/vendors.js", "http://cdn.cn/assets/client.js"]
        );
    }

    #[test]
    fn test_failure_is_kept_only_when_not_interactive() {
        let dir = tempdir().unwrap();
        // A file where the output directory should be makes every write fail.
        std::fs::write(dir.path().join("dist"), "not a dir").unwrap();
        let config = BuildConfig::standard(dir.path());

        for interactive in [true, false] {
            let multi = MultiCompiler::new(&config, Arc::new(StaticEngine));
            let client = multi.find(CLIENT_TARGET).unwrap();
            let writer = Arc::new(ManifestWriter::from_target(client.target(), interactive).unwrap());
            writer.attach(&client);

            assert!(client.run().is_ok());
            let err = writer.take_error();
            assert_eq!(err.is_some(), !interactive);
            if let Some(err) = err {
                assert!(matches!(err, ManifestError::Write { .. }));
            }
        }
    }

    #[test]
    fn test_no_plugin_no_writer() {
        let config = BuildConfig::standard(Path::new("/p"));
        let server = config.target(crate::build::SERVER_TARGET).unwrap();
        assert!(ManifestWriter::from_target(server, false).is_none());
    }
}
