//! Module cache invalidation after a server rebuild.

use super::registry::ModuleRegistry;
use crate::build::Compiler;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// What a purge removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvalidationReport {
    /// Evicted module identifiers, in visit order.
    pub modules: Vec<PathBuf>,
    /// Removed path cache keys, sorted.
    pub path_keys: Vec<String>,
}

impl InvalidationReport {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty() && self.path_keys.is_empty()
    }
}

/// Evicts a module, everything it loaded, and matching path cache entries.
#[derive(Debug, Clone)]
pub struct Invalidator {
    registry: Arc<ModuleRegistry>,
}

impl Invalidator {
    #[must_use]
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self { registry }
    }

    /// Purge `name` (resolved from the registry root).
    ///
    /// Does nothing if `name` does not resolve. Otherwise evicts every
    /// module reachable from the resolved module and removes every path
    /// cache key containing `name`.
    pub fn purge(&self, name: &str) -> InvalidationReport {
        let _gate = self.registry.exclusive();

        let Some(id) = self.registry.resolve(name, self.registry.root()) else {
            debug!(name, "nothing to purge, module does not resolve");
            return InvalidationReport::default();
        };

        let mut report = InvalidationReport::default();
        let modules = self.registry.modules();
        if modules.contains(&id) {
            let mut visited = HashSet::new();
            let mut stack = vec![id];
            while let Some(id) = stack.pop() {
                if !visited.insert(id.clone()) {
                    continue;
                }
                let Some(module) = modules.remove(&id) else {
                    continue;
                };
                stack.extend(module.children.iter().rev().cloned());
                report.modules.push(id);
            }
        }

        report.path_keys = self.registry.paths().remove_containing(name);
        debug!(
            name,
            modules = report.modules.len(),
            path_keys = report.path_keys.len(),
            "purged"
        );
        report
    }

    /// Purge `name` every time `compiler` finishes a build.
    pub fn attach(&self, compiler: &Compiler, name: impl Into<String>) {
        let invalidator = self.clone();
        let name = name.into();
        compiler.hooks().done.tap("invalidate", move |_stats| {
            info!("purge cache");
            invalidator.purge(&name);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::registry::{CachedModule, PathCache};
    use std::collections::BTreeMap;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    /// A root with one file per module and a cache entry linking them.
    fn fixture(edges: &[(&str, &[&str])]) -> (TempDir, Arc<ModuleRegistry>) {
        let dir = tempdir().unwrap();
        let registry = Arc::new(ModuleRegistry::new(dir.path()));
        for (name, children) in edges {
            let id = dir.path().join(format!("{name}.js"));
            std::fs::write(&id, "").unwrap();
            registry.modules().insert(CachedModule {
                id,
                code: String::new(),
                children: children
                    .iter()
                    .map(|c| dir.path().join(format!("{c}.js")))
                    .collect(),
                requires: BTreeMap::new(),
            });
        }
        (dir, registry)
    }

    fn names(dir: &Path, ids: &[PathBuf]) -> Vec<String> {
        let mut out: Vec<String> = ids
            .iter()
            .map(|id| {
                id.strip_prefix(dir)
                    .unwrap()
                    .to_string_lossy()
                    .trim_end_matches(".js")
                    .to_string()
            })
            .collect();
        out.sort();
        out
    }

    #[test]
    fn test_chain_evicts_every_descendant() {
        let (dir, registry) = fixture(&[("A", &["B"]), ("B", &["C"]), ("C", &[]), ("X", &[])]);
        let report = Invalidator::new(Arc::clone(&registry)).purge("./A");

        assert_eq!(names(dir.path(), &report.modules), vec!["A", "B", "C"]);
        assert_eq!(registry.modules().ids(), vec![dir.path().join("X.js")]);
    }

    #[test]
    fn test_diamond_visits_each_module_once() {
        let (dir, registry) = fixture(&[
            ("A", &["B", "C"]),
            ("B", &["D"]),
            ("C", &["D"]),
            ("D", &[]),
        ]);
        let report = Invalidator::new(Arc::clone(&registry)).purge("./A");

        assert_eq!(report.modules.len(), 4);
        assert_eq!(names(dir.path(), &report.modules), vec!["A", "B", "C", "D"]);
        assert!(registry.modules().is_empty());
    }

    #[test]
    fn test_cycle_terminates() {
        let (_dir, registry) = fixture(&[("A", &["B"]), ("B", &["A"])]);
        let report = Invalidator::new(Arc::clone(&registry)).purge("./A");
        assert_eq!(report.modules.len(), 2);
        assert!(registry.modules().is_empty());
    }

    #[test]
    fn test_unresolvable_name_is_a_noop() {
        let (dir, registry) = fixture(&[("A", &[])]);
        registry.paths().insert(
            PathCache::key("./missing/thing.js", dir.path()),
            dir.path().join("x"),
        );

        let report = Invalidator::new(Arc::clone(&registry)).purge("./missing");

        assert!(report.is_empty());
        assert_eq!(registry.modules().len(), 1);
        assert_eq!(registry.paths().len(), 1);
    }

    #[test]
    fn test_path_keys_removed_by_substring() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("server")).unwrap();
        std::fs::write(dir.path().join("server/index.js"), "").unwrap();
        let registry = Arc::new(ModuleRegistry::new(dir.path()));
        let from = Path::new("/app");
        registry
            .paths()
            .insert(PathCache::key("./dist/server/index.js", from), "/a".into());
        registry
            .paths()
            .insert(PathCache::key("./dist/client/index.js", from), "/b".into());

        let report = Invalidator::new(Arc::clone(&registry)).purge("server");

        assert!(report.modules.is_empty());
        assert!(report
            .path_keys
            .contains(&PathCache::key("./dist/server/index.js", from)));
        assert_eq!(
            registry.paths().keys(),
            vec![PathCache::key("./dist/client/index.js", from)]
        );
    }

    #[test]
    fn test_uncached_module_only_clears_path_keys() {
        let (dir, registry) = fixture(&[("A", &[])]);
        std::fs::write(dir.path().join("B.js"), "").unwrap();
        let report = Invalidator::new(Arc::clone(&registry)).purge("./B");
        assert!(report.modules.is_empty());
        assert_eq!(registry.modules().len(), 1);
    }

    #[test]
    fn test_purge_waits_for_shared_holders() {
        let (_dir, registry) = fixture(&[("A", &[])]);
        let guard = registry.shared();

        let (tx, rx) = std::sync::mpsc::channel();
        let worker = {
            let registry = Arc::clone(&registry);
            std::thread::spawn(move || {
                let report = Invalidator::new(registry).purge("./A");
                tx.send(report.modules.len()).unwrap();
            })
        };

        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert_eq!(registry.modules().len(), 1);

        drop(guard);
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 1);
        worker.join().unwrap();
        assert!(registry.modules().is_empty());
    }
}
