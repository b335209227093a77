//! Build statistics and the in-memory asset set of one compilation.
//!
//! The engine only hands back a file tree. Chunks are recovered by reverse
//! matching each file against the target's filename templates.

use super::config::{ChunkSelection, TargetConfig};
use super::template::FilenameTemplate;
use crate::error::BuildError;
use devssr_util::fs::write_tree;
use devssr_util::hash;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Length of the build hash reported in stats.
pub const HASH_LEN: usize = 20;

/// A chunk and the files emitted for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub name: String,
    /// Loaded on page load (entry or split chunk), as opposed to on demand.
    pub initial: bool,
    pub entry: bool,
    pub files: Vec<String>,
}

/// An ordered set of chunks loaded together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkGroup {
    pub name: String,
    pub chunks: Vec<String>,
}

/// Summary of a finished compilation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    /// Compiler name.
    pub name: String,
    pub hash: String,
    pub time_ms: u64,
    pub chunks: Vec<Chunk>,
    pub chunk_groups: Vec<ChunkGroup>,
    /// Files that belong to no chunk.
    pub auxiliary: Vec<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl Stats {
    /// Derive stats from the files a target produced.
    #[must_use]
    pub fn derive(
        target: &TargetConfig,
        files: &BTreeMap<String, Vec<u8>>,
        time_ms: u64,
        warnings: Vec<String>,
    ) -> Self {
        let matchers = Matchers::new(target);
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut owner: BTreeMap<&str, usize> = BTreeMap::new();
        let mut auxiliary = Vec::new();

        let (maps, plain): (Vec<&String>, Vec<&String>) =
            files.keys().partition(|f| f.ends_with(".map"));

        for file in plain {
            let Some((name, on_demand)) = matchers.chunk_of(file) else {
                auxiliary.push(file.clone());
                continue;
            };
            let idx = match chunks.iter().position(|c| c.name == name) {
                Some(idx) => idx,
                None => {
                    let entry = target.entry.contains_key(&name);
                    let split = target
                        .split_chunks
                        .iter()
                        .any(|g| g.name == name && g.chunks != ChunkSelection::Async);
                    chunks.push(Chunk {
                        initial: entry || split || !on_demand,
                        entry,
                        name,
                        files: Vec::new(),
                    });
                    chunks.len() - 1
                }
            };
            chunks[idx].files.push(file.clone());
            owner.insert(file.as_str(), idx);
        }

        for map in maps {
            let source = &map[..map.len() - ".map".len()];
            match owner.get(source) {
                Some(&idx) => chunks[idx].files.push(map.clone()),
                None => auxiliary.push(map.clone()),
            }
        }
        for chunk in &mut chunks {
            chunk.files.sort();
        }

        let chunk_groups = chunk_groups(target, &chunks);
        let digest = hash::blake3_entries(
            files
                .iter()
                .map(|(name, bytes)| (name.as_str(), bytes.as_slice())),
        );

        Self {
            name: target.name.clone(),
            hash: hash::short(&digest, HASH_LEN).to_string(),
            time_ms,
            chunks,
            chunk_groups,
            auxiliary,
            errors: Vec::new(),
            warnings,
        }
    }

    /// Look up a chunk by name.
    #[must_use]
    pub fn chunk(&self, name: &str) -> Option<&Chunk> {
        self.chunks.iter().find(|c| c.name == name)
    }

    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

fn chunk_groups(target: &TargetConfig, chunks: &[Chunk]) -> Vec<ChunkGroup> {
    let present = |name: &str| chunks.iter().any(|c| c.name == name);
    let mut groups = Vec::new();

    for entry in target.entry.keys() {
        let mut members: Vec<String> = target
            .split_chunks
            .iter()
            .filter(|g| g.chunks != ChunkSelection::Async && present(&g.name))
            .map(|g| g.name.clone())
            .collect();
        if present(entry) {
            members.push(entry.clone());
        }
        groups.push(ChunkGroup {
            name: entry.clone(),
            chunks: members,
        });
    }

    for chunk in chunks.iter().filter(|c| !c.initial) {
        groups.push(ChunkGroup {
            name: chunk.name.clone(),
            chunks: vec![chunk.name.clone()],
        });
    }
    groups
}

/// Templates a target may have produced files with.
struct Matchers<'a> {
    target: &'a TargetConfig,
}

impl<'a> Matchers<'a> {
    fn new(target: &'a TargetConfig) -> Self {
        Self { target }
    }

    /// Chunk name of a file, and whether it came from the on-demand template.
    ///
    /// The chunk template is tried first since the entry template usually
    /// accepts its files too (`[name].js` matches `home.chunk.js`).
    fn chunk_of(&self, file: &str) -> Option<(String, bool)> {
        let output = &self.target.output;
        if let Some(name) = output
            .chunk_filename
            .as_ref()
            .and_then(|t| self.name_from(t, file))
        {
            return Some((name, true));
        }
        if let Some(name) = self.name_from(&output.filename, file) {
            return Some((name, false));
        }
        self.target
            .css_filename()
            .and_then(|t| self.name_from(t, file))
            .map(|name| (name, false))
    }

    fn name_from(&self, template: &FilenameTemplate, file: &str) -> Option<String> {
        if template.has_name() {
            return template.match_name(file);
        }
        // A name-less template only fits a single-entry target.
        if template.matches(file) && self.target.entry.len() == 1 {
            return self.target.entry.keys().next().cloned();
        }
        None
    }
}

/// In-memory output of one compiler: relative path to bytes, plus stats.
#[derive(Debug, Clone, Default)]
pub struct CompiledAssetSet {
    output_path: PathBuf,
    files: BTreeMap<String, Vec<u8>>,
    stats: Stats,
}

impl CompiledAssetSet {
    #[must_use]
    pub fn new(output_path: PathBuf, files: BTreeMap<String, Vec<u8>>, stats: Stats) -> Self {
        Self {
            output_path,
            files,
            stats,
        }
    }

    /// Empty set for a compiler that has not built yet.
    #[must_use]
    pub fn empty(output_path: PathBuf) -> Self {
        Self {
            output_path,
            ..Default::default()
        }
    }

    /// Directory the files belong in on disk.
    #[must_use]
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    #[must_use]
    pub fn get(&self, file: &str) -> Option<&[u8]> {
        self.files.get(file).map(Vec::as_slice)
    }

    pub fn files(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    #[must_use]
    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Write every file below the output path; returns the file count.
    ///
    /// # Errors
    /// Returns the first write failure.
    pub fn write_to_disk(&self) -> Result<usize, BuildError> {
        write_tree(&self.output_path, self.files()).map_err(|source| BuildError::Emit {
            target: self.stats.name.clone(),
            dir: self.output_path.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::config::{BuildConfig, OutputConfig, CLIENT_TARGET, SERVER_TARGET};

    fn tree(files: &[&str]) -> BTreeMap<String, Vec<u8>> {
        files
            .iter()
            .map(|f| ((*f).to_string(), f.as_bytes().to_vec()))
            .collect()
    }

    fn hashed_target() -> TargetConfig {
        let mut target = BuildConfig::standard(Path::new("/p"))
            .target(CLIENT_TARGET)
            .cloned()
            .unwrap();
        target.entry = BTreeMap::from([("main".to_string(), vec!["./main.js".to_string()])]);
        target.output = OutputConfig {
            path: PathBuf::from("/p/dist"),
            filename: FilenameTemplate::parse("[name].[chunkhash:4].js").unwrap(),
            chunk_filename: None,
            public_path: "/".to_string(),
            library_target: None,
        };
        target.split_chunks.clear();
        target.plugins.clear();
        target
    }

    #[test]
    fn test_map_joins_chunk_of_its_source() {
        let stats = Stats::derive(
            &hashed_target(),
            &tree(&["main.a1b2.js", "main.a1b2.js.map"]),
            0,
            Vec::new(),
        );
        let main = stats.chunk("main").unwrap();
        assert_eq!(main.files, vec!["main.a1b2.js", "main.a1b2.js.map"]);
        assert!(main.initial && main.entry);
        assert!(stats.auxiliary.is_empty());
    }

    #[test]
    fn test_standard_client_layout() {
        let config = BuildConfig::standard(Path::new("/p"));
        let target = config.target(CLIENT_TARGET).unwrap();
        let stats = Stats::derive(
            target,
            &tree(&[
                "assets/client.js",
                "assets/client.css",
                "assets/vendors.js",
                "assets/home.chunk.js",
                "assets/logo.png",
                "client.3f2a.hot-update.json",
            ]),
            12,
            Vec::new(),
        );

        let client = stats.chunk("client").unwrap();
        assert_eq!(client.files, vec!["assets/client.css", "assets/client.js"]);
        assert!(client.entry);

        let vendors = stats.chunk("vendors").unwrap();
        assert!(vendors.initial && !vendors.entry);

        let home = stats.chunk("home").unwrap();
        assert!(!home.initial);

        assert_eq!(
            stats.chunk_groups,
            vec![
                ChunkGroup {
                    name: "client".into(),
                    chunks: vec!["vendors".into(), "client".into()],
                },
                ChunkGroup {
                    name: "home".into(),
                    chunks: vec!["home".into()],
                },
            ]
        );
        assert_eq!(
            stats.auxiliary,
            vec!["assets/logo.png", "client.3f2a.hot-update.json"]
        );
        assert_eq!(stats.name, "client");
        assert_eq!(stats.hash.len(), HASH_LEN);
        assert_eq!(stats.time_ms, 12);
    }

    #[test]
    fn test_nameless_template_maps_to_single_entry() {
        let config = BuildConfig::standard(Path::new("/p"));
        let target = config.target(SERVER_TARGET).unwrap();
        let stats = Stats::derive(
            target,
            &tree(&["index.js", "index.js.map", "chunks/page.js"]),
            0,
            Vec::new(),
        );
        assert_eq!(
            stats.chunk("server").unwrap().files,
            vec!["index.js", "index.js.map"]
        );
        assert!(!stats.chunk("page").unwrap().initial);
    }

    #[test]
    fn test_hash_changes_with_content() {
        let target = hashed_target();
        let a = Stats::derive(&target, &tree(&["main.a1b2.js"]), 0, Vec::new());
        let mut files = tree(&["main.a1b2.js"]);
        files.insert("main.a1b2.js".into(), b"changed".to_vec());
        let b = Stats::derive(&target, &files, 0, Vec::new());
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn test_asset_set_accessors() {
        let set = CompiledAssetSet::new(
            PathBuf::from("/p/dist"),
            tree(&["a.js"]),
            Stats::default(),
        );
        assert_eq!(set.get("a.js"), Some(&b"a.js"[..]));
        assert_eq!(set.get("b.js"), None);
        assert_eq!(set.len(), 1);
        assert!(CompiledAssetSet::empty(PathBuf::from("/x")).is_empty());
    }

    #[test]
    fn test_write_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let set = CompiledAssetSet::new(
            dir.path().join("out"),
            tree(&["a.js", "nested/b.css"]),
            Stats::default(),
        );
        assert_eq!(set.write_to_disk().unwrap(), 2);
        assert_eq!(std::fs::read(dir.path().join("out/nested/b.css")).unwrap(), b"nested/b.css");
    }
}
