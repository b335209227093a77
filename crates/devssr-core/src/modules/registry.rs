//! Module cache and path resolution cache.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A loaded module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedModule {
    /// Absolute path; the module identifier.
    pub id: PathBuf,
    pub code: String,
    /// Identifiers of the modules this one loaded, in source order.
    pub children: Vec<PathBuf>,
    /// `require` specifier to child identifier.
    pub requires: BTreeMap<String, PathBuf>,
}

/// Module identifier to loaded module.
#[derive(Debug, Default)]
pub struct ModuleCache {
    entries: RwLock<HashMap<PathBuf, Arc<CachedModule>>>,
}

impl ModuleCache {
    #[must_use]
    pub fn get(&self, id: &Path) -> Option<Arc<CachedModule>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    #[must_use]
    pub fn contains(&self, id: &Path) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }

    pub fn insert(&self, module: CachedModule) -> Arc<CachedModule> {
        let module = Arc::new(module);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(module.id.clone(), Arc::clone(&module));
        module
    }

    pub fn remove(&self, id: &Path) -> Option<Arc<CachedModule>> {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every cached identifier, sorted.
    #[must_use]
    pub fn ids(&self) -> Vec<PathBuf> {
        let mut ids: Vec<_> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }
}

/// `(request, from_dir)` to resolved path.
#[derive(Debug, Default)]
pub struct PathCache {
    entries: RwLock<HashMap<String, PathBuf>>,
}

impl PathCache {
    /// Cache key of a request made from `from_dir`.
    #[must_use]
    pub fn key(request: &str, from_dir: &Path) -> String {
        format!("{request}\0{}", from_dir.display())
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<PathBuf> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn insert(&self, key: String, path: PathBuf) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, path);
    }

    /// Remove every key containing `needle`; returns the removed keys, sorted.
    pub fn remove_containing(&self, needle: &str) -> Vec<String> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut removed: Vec<String> = entries
            .keys()
            .filter(|key| key.contains(needle))
            .cloned()
            .collect();
        for key in &removed {
            entries.remove(key);
        }
        removed.sort();
        removed
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every key, sorted.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self
            .entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

/// Both caches plus the gate serializing invalidation against loads.
///
/// Loads hold the gate shared; invalidation holds it exclusively.
#[derive(Debug)]
pub struct ModuleRegistry {
    root: PathBuf,
    modules: ModuleCache,
    paths: PathCache,
    gate: RwLock<()>,
}

impl ModuleRegistry {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            modules: ModuleCache::default(),
            paths: PathCache::default(),
            gate: RwLock::new(()),
        }
    }

    /// Directory bare invalidation names and the render entry resolve from.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn modules(&self) -> &ModuleCache {
        &self.modules
    }

    #[must_use]
    pub fn paths(&self) -> &PathCache {
        &self.paths
    }

    pub(crate) fn shared(&self) -> RwLockReadGuard<'_, ()> {
        self.gate.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        self.gate.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve through the path cache, filling it on a miss.
    #[must_use]
    pub fn resolve(&self, request: &str, from_dir: &Path) -> Option<PathBuf> {
        let key = PathCache::key(request, from_dir);
        if let Some(path) = self.paths.get(&key) {
            return Some(path);
        }
        let path = super::resolve::resolve_file(request, from_dir)?;
        self.paths.insert(key, path.clone());
        Some(path)
    }
}
