//! Watch mode: recompile every target when project files change.

use super::compiler::MultiCompiler;
use super::config::{BuildConfig, STAGING_DIR};
use crate::error::BuildError;
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default quiet period before a rebuild starts.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(50);

/// Directory names never worth a rebuild.
const IGNORED_DIRS: &[&str] = &["node_modules", ".git", "target", STAGING_DIR];

/// What to watch.
#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub roots: Vec<PathBuf>,
    /// Paths whose changes are ignored (build output).
    pub ignored: Vec<PathBuf>,
    pub debounce: Duration,
}

impl WatchOptions {
    /// Watch the project root, ignoring every target's output directory.
    #[must_use]
    pub fn for_config(config: &BuildConfig) -> Self {
        let mut ignored: Vec<PathBuf> = config
            .targets
            .iter()
            .map(|t| t.output.path.clone())
            .collect();
        ignored.push(config.root().join(STAGING_DIR));
        Self {
            roots: vec![config.root()],
            ignored,
            debounce: DEFAULT_DEBOUNCE,
        }
    }

    /// Whether a change to `path` should be ignored.
    #[must_use]
    pub fn should_ignore(&self, path: &Path) -> bool {
        if self.ignored.iter().any(|dir| path.starts_with(dir)) {
            return true;
        }
        if path.components().any(|c| {
            IGNORED_DIRS
                .iter()
                .any(|dir| c.as_os_str() == std::ffi::OsStr::new(dir))
        }) {
            return true;
        }
        path.file_name()
            .is_some_and(|name| name.to_string_lossy().starts_with('.'))
    }
}

/// A running watcher. Dropping it (or calling [`Watching::close`]) stops it.
pub struct Watching {
    watcher: Option<RecommendedWatcher>,
    thread: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Watching {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Watching")
            .field("running", &self.thread.is_some())
            .finish()
    }
}

impl Watching {
    /// Compile once immediately, then on every relevant change.
    ///
    /// # Errors
    /// Returns an error if the file watcher cannot be set up.
    pub fn start(multi: Arc<MultiCompiler>, options: WatchOptions) -> Result<Self, BuildError> {
        let (tx, rx) = mpsc::channel::<notify::Result<Event>>();
        let mut watcher = RecommendedWatcher::new(tx, Config::default())
            .map_err(|e| BuildError::Watch(e.to_string()))?;
        for root in &options.roots {
            watcher
                .watch(root, RecursiveMode::Recursive)
                .map_err(|e| BuildError::Watch(format!("{}: {e}", root.display())))?;
        }

        let thread = std::thread::Builder::new()
            .name("devssr-watch".into())
            .spawn(move || watch_loop(&multi, &options, &rx))
            .map_err(|e| BuildError::Watch(e.to_string()))?;

        Ok(Self {
            watcher: Some(watcher),
            thread: Some(thread),
        })
    }

    /// Stop watching and wait for an in-flight compilation to finish.
    pub fn close(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        // Dropping the watcher disconnects the channel, ending the loop.
        self.watcher.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("watch thread panicked");
            }
        }
    }
}

impl Drop for Watching {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn watch_loop(
    multi: &MultiCompiler,
    options: &WatchOptions,
    rx: &mpsc::Receiver<notify::Result<Event>>,
) {
    if let Err(e) = multi.run() {
        debug!(error = %e, "initial compilation failed");
    }

    loop {
        let mut changed = BTreeSet::new();
        match rx.recv() {
            Ok(event) => collect(options, event, &mut changed),
            Err(_) => break,
        }

        // Keep absorbing events until the debounce window is quiet.
        loop {
            match rx.recv_timeout(options.debounce) {
                Ok(event) => collect(options, event, &mut changed),
                Err(RecvTimeoutError::Timeout) => break,
                Err(RecvTimeoutError::Disconnected) => return,
            }
        }

        if changed.is_empty() {
            continue;
        }
        let changed: Vec<PathBuf> = changed.into_iter().collect();
        info!(files = changed.len(), "change detected, rebuilding");
        multi.invalidate(&changed);
        if let Err(e) = multi.run() {
            debug!(error = %e, "rebuild failed");
        }
    }
}

fn collect(options: &WatchOptions, event: notify::Result<Event>, out: &mut BTreeSet<PathBuf>) {
    match event {
        Ok(event) => out.extend(
            event
                .paths
                .into_iter()
                .filter(|p| !options.should_ignore(p)),
        ),
        Err(e) => warn!(error = %e, "watch error"),
    }
}
