use std::path::PathBuf;
use thiserror::Error;

/// Core error type for devssr operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Errors loading or validating a build configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {}", path.display())]
    NotFound { path: PathBuf },

    #[error("Failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid pattern `{pattern}`: {message}")]
    Pattern { pattern: String, message: String },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Errors produced while running a compilation.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("No build command configured for target `{target}`")]
    NoCommand { target: String },

    #[error("Failed to spawn build command for `{target}`: {source}")]
    Spawn {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Build command for `{target}` exited with code {code}: {stderr}")]
    CommandFailed {
        target: String,
        code: i32,
        stderr: String,
    },

    #[error("Failed to collect output of `{target}` from {}: {source}", dir.display())]
    Collect {
        target: String,
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write output of `{target}` to {}: {source}", dir.display())]
    Emit {
        target: String,
        dir: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Watch error: {0}")]
    Watch(String),
}

/// Errors writing an asset or chunk manifest.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("Cannot serialize manifest {}: {source}", path.display())]
    Serialize {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors loading a module into the module cache.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Cannot find module '{request}' from {}", from.display())]
    NotFound { request: String, from: PathBuf },

    #[error("Failed to read module {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors producing server-rendered markup.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Failed to load server bundle: {0}")]
    Load(#[from] LoadError),

    #[error("Failed to start render process `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Render process I/O failed: {0}")]
    Io(#[source] std::io::Error),

    #[error("Render function failed: {0}")]
    Failed(String),

    #[error("Malformed render reply: {0}")]
    Protocol(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
