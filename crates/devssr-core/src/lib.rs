#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::return_self_not_must_use)]

//! Core of the devssr development server.

pub mod build;
pub mod config;
pub mod error;
pub mod hmr;
pub mod manifest;
pub mod modules;
pub mod render;
pub mod version;

pub use build::{
    load_config, BuildConfig, BundleEngine, CommandEngine, Compiler, MultiCompiler, Stats,
    WatchOptions, Watching,
};
pub use config::Config;
pub use error::Error;
pub use hmr::HotMessage;
pub use manifest::ManifestWriter;
pub use modules::{Invalidator, ModuleLoader, ModuleRegistry};
pub use render::{NodeRenderEngine, RenderContext, RenderDispatcher, RenderEngine};
pub use version::VERSION;
