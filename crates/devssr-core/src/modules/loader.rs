//! Loads module trees into the registry.

use super::registry::{CachedModule, ModuleRegistry};
use super::resolve::is_path_request;
use crate::error::LoadError;
use devssr_util::fs::read_to_string_lossy;
use regex_lite::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

fn require_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"\brequire\s*\(\s*(?:"([^"\n]+)"|'([^'\n]+)')\s*\)"#)
            .unwrap_or_else(|e| panic!("require pattern: {e}"))
    })
}

/// Literal `require("...")` specifiers in source order, deduplicated.
#[must_use]
pub fn scan_requires(code: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    require_pattern()
        .captures_iter(code)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().to_string())
        .filter(|spec| seen.insert(spec.clone()))
        .collect()
}

/// A loaded module tree, detached from the registry.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleBundle {
    pub entry: PathBuf,
    /// Every module reachable from the entry, entry first.
    pub modules: Vec<Arc<CachedModule>>,
}

impl ModuleBundle {
    #[must_use]
    pub fn entry_module(&self) -> Option<&CachedModule> {
        self.modules.first().map(AsRef::as_ref)
    }

    #[must_use]
    pub fn get(&self, id: &Path) -> Option<&CachedModule> {
        self.modules.iter().find(|m| m.id == id).map(AsRef::as_ref)
    }
}

/// Loads modules through the registry's caches.
#[derive(Debug, Clone)]
pub struct ModuleLoader {
    registry: Arc<ModuleRegistry>,
}

impl ModuleLoader {
    #[must_use]
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// Load `request` (and everything it requires) from `from_dir`.
    ///
    /// Cached modules are returned as-is. Bare specifiers inside loaded
    /// modules are left for the render engine to satisfy.
    ///
    /// # Errors
    /// Returns [`LoadError::NotFound`] if a file request does not resolve,
    /// or [`LoadError::Read`] if a file cannot be read.
    pub fn require(&self, request: &str, from_dir: &Path) -> Result<Arc<CachedModule>, LoadError> {
        let id = self
            .registry
            .resolve(request, from_dir)
            .ok_or_else(|| LoadError::NotFound {
                request: request.to_string(),
                from: from_dir.to_path_buf(),
            })?;
        self.load(&id)
    }

    fn load(&self, id: &Path) -> Result<Arc<CachedModule>, LoadError> {
        if let Some(module) = self.registry.modules().get(id) {
            return Ok(module);
        }

        let code = read_to_string_lossy(id).map_err(|source| LoadError::Read {
            path: id.to_path_buf(),
            source,
        })?;
        let dir = id.parent().unwrap_or_else(|| Path::new("/"));

        let mut requires = BTreeMap::new();
        let mut children = Vec::new();
        if !is_json(id) {
            for spec in scan_requires(&code) {
                if !is_path_request(&spec) {
                    continue;
                }
                let child = self
                    .registry
                    .resolve(&spec, dir)
                    .ok_or_else(|| LoadError::NotFound {
                        request: spec.clone(),
                        from: dir.to_path_buf(),
                    })?;
                if !children.contains(&child) {
                    children.push(child.clone());
                }
                requires.insert(spec, child);
            }
        }

        // Registered before the children load so cycles terminate here.
        let module = self.registry.modules().insert(CachedModule {
            id: id.to_path_buf(),
            code,
            children: children.clone(),
            requires,
        });

        for child in &children {
            if let Err(e) = self.load(child) {
                self.registry.modules().remove(id);
                return Err(e);
            }
        }
        Ok(module)
    }

    /// Load `request` and snapshot its module tree.
    ///
    /// Holds the registry's shared gate throughout, so an invalidation
    /// either completes before the load or waits for the snapshot.
    ///
    /// # Errors
    /// Returns the first [`LoadError`].
    pub fn bundle(&self, request: &str, from_dir: &Path) -> Result<ModuleBundle, LoadError> {
        let _gate = self.registry.shared();
        let entry = self.require(request, from_dir)?;

        let mut seen = HashSet::new();
        let mut modules = Vec::new();
        let mut stack = vec![entry.id.clone()];
        while let Some(id) = stack.pop() {
            if !seen.insert(id.clone()) {
                continue;
            }
            let module = self.load(&id)?;
            stack.extend(module.children.iter().rev().cloned());
            modules.push(module);
        }

        Ok(ModuleBundle {
            entry: entry.id.clone(),
            modules,
        })
    }
}

fn is_json(id: &Path) -> bool {
    id.extension().is_some_and(|ext| ext == "json")
}
