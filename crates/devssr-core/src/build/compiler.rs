//! Compiler instances and their lifecycle hooks.

use super::config::{BuildConfig, TargetConfig};
use super::engine::{BundleEngine, EngineContext};
use super::stats::{CompiledAssetSet, Stats};
use crate::error::BuildError;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info};

type Tap<T> = Box<dyn Fn(&T) + Send + Sync>;

/// A list of callbacks run synchronously, in tap order.
pub struct Hook<T: ?Sized> {
    taps: RwLock<Vec<(String, Tap<T>)>>,
}

impl<T: ?Sized> Default for Hook<T> {
    fn default() -> Self {
        Self {
            taps: RwLock::new(Vec::new()),
        }
    }
}

impl<T: ?Sized> Hook<T> {
    /// Register a callback under a descriptive name.
    pub fn tap<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.taps
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((name.into(), Box::new(f)));
    }

    /// Run every callback with `arg`.
    pub fn call(&self, arg: &T) {
        let taps = self.taps.read().unwrap_or_else(PoisonError::into_inner);
        for (name, tap) in taps.iter() {
            debug!(tap = %name, "calling hook");
            tap(arg);
        }
    }

    /// Names of the registered callbacks.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.taps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl<T: ?Sized> std::fmt::Debug for Hook<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

/// Lifecycle hooks of a compiler.
#[derive(Debug, Default)]
pub struct Hooks {
    /// A rebuild was triggered by these changed paths.
    pub invalid: Hook<[PathBuf]>,
    /// New assets are available, before `done`.
    pub emit: Hook<CompiledAssetSet>,
    /// A compilation finished successfully.
    pub done: Hook<Stats>,
    /// A compilation failed; the previous assets stay current.
    pub failed: Hook<BuildError>,
}

/// One named compilation target bound to an engine.
pub struct Compiler {
    target: TargetConfig,
    root: PathBuf,
    staging_dir: PathBuf,
    engine: Arc<dyn BundleEngine>,
    hooks: Hooks,
    assets: RwLock<Arc<CompiledAssetSet>>,
    running: Mutex<()>,
    /// False from `invalid` until `done` or `failed` has run.
    valid: watch::Sender<bool>,
}

impl std::fmt::Debug for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiler")
            .field("name", &self.target.name)
            .field("root", &self.root)
            .field("hooks", &self.hooks)
            .field("valid", &self.is_valid())
            .finish_non_exhaustive()
    }
}

impl Compiler {
    #[must_use]
    pub fn new(
        target: TargetConfig,
        root: PathBuf,
        staging_dir: PathBuf,
        engine: Arc<dyn BundleEngine>,
    ) -> Self {
        let assets = CompiledAssetSet::empty(target.output.path.clone());
        Self {
            target,
            root,
            staging_dir,
            engine,
            hooks: Hooks::default(),
            assets: RwLock::new(Arc::new(assets)),
            running: Mutex::new(()),
            valid: watch::Sender::new(false),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.target.name
    }

    #[must_use]
    pub fn target(&self) -> &TargetConfig {
        &self.target
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn hooks(&self) -> &Hooks {
        &self.hooks
    }

    /// The current asset set (empty until the first successful build).
    #[must_use]
    pub fn assets(&self) -> Arc<CompiledAssetSet> {
        self.assets
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Whether the last compilation has finished and no rebuild is pending.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        *self.valid.borrow()
    }

    /// Wait until the current or pending compilation has finished.
    ///
    /// Resolves immediately when the compiler is valid. A failed
    /// compilation also counts as finished.
    pub async fn wait_valid(&self) {
        let mut rx = self.valid.subscribe();
        if !*rx.borrow() {
            debug!(compiler = %self.name(), "waiting for compilation");
        }
        // the sender lives in `self`, so the channel cannot close
        let _ = rx.wait_for(|valid| *valid).await;
    }

    /// Signal that a rebuild is about to happen.
    pub fn invalidate(&self, changed: &[PathBuf]) {
        self.valid.send_replace(false);
        self.hooks.invalid.call(changed);
    }

    /// Run one compilation.
    ///
    /// On success the asset set is replaced, then `emit` and `done` run.
    /// On failure `failed` runs and the previous assets stay current.
    ///
    /// # Errors
    /// Returns the engine's [`BuildError`].
    pub fn run(&self) -> Result<Arc<CompiledAssetSet>, BuildError> {
        let _running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        self.valid.send_replace(false);
        let start = Instant::now();

        let output = self.engine.compile(&EngineContext {
            root: &self.root,
            target: &self.target,
            staging_dir: &self.staging_dir,
        });
        let output = match output {
            Ok(output) => output,
            Err(err) => {
                error!(compiler = %self.name(), error = %err, "compilation failed");
                self.hooks.failed.call(&err);
                self.valid.send_replace(true);
                return Err(err);
            }
        };

        let time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let stats = Stats::derive(&self.target, &output.files, time_ms, output.warnings);
        let set = Arc::new(CompiledAssetSet::new(
            self.target.output.path.clone(),
            output.files,
            stats,
        ));
        *self.assets.write().unwrap_or_else(PoisonError::into_inner) = Arc::clone(&set);

        info!(
            compiler = %self.name(),
            hash = %set.stats().hash,
            files = set.len(),
            time_ms,
            "compiled"
        );
        self.hooks.emit.call(&set);
        self.hooks.done.call(set.stats());
        self.valid.send_replace(true);
        Ok(set)
    }
}

/// All compilers of a build configuration.
#[derive(Debug)]
pub struct MultiCompiler {
    compilers: Vec<Arc<Compiler>>,
}

impl MultiCompiler {
    #[must_use]
    pub fn new(config: &BuildConfig, engine: Arc<dyn BundleEngine>) -> Self {
        let root = config.root();
        let compilers = config
            .targets
            .iter()
            .map(|target| {
                Arc::new(Compiler::new(
                    target.clone(),
                    root.clone(),
                    config.staging_dir(&target.name),
                    Arc::clone(&engine),
                ))
            })
            .collect();
        Self { compilers }
    }

    #[must_use]
    pub fn compilers(&self) -> &[Arc<Compiler>] {
        &self.compilers
    }

    /// Look up a compiler by name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<Arc<Compiler>> {
        self.compilers.iter().find(|c| c.name() == name).cloned()
    }

    /// Signal every compiler that a rebuild is about to happen.
    pub fn invalidate(&self, changed: &[PathBuf]) {
        for compiler in &self.compilers {
            compiler.invalidate(changed);
        }
    }

    /// Compile every target in configuration order.
    ///
    /// Every target is attempted even if an earlier one fails.
    ///
    /// # Errors
    /// Returns the first failure.
    pub fn run(&self) -> Result<(), BuildError> {
        let mut first_err = None;
        for compiler in &self.compilers {
            if let Err(err) = compiler.run() {
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}
