//! Build configuration and compilation.
//!
//! Compilation itself is delegated to a [`BundleEngine`]; this module owns
//! the targets, the compiler lifecycle and the stats recovered from output.

pub mod compiler;
pub mod config;
pub mod engine;
pub mod rules;
pub mod stats;
pub mod template;
pub mod watch;

pub use compiler::{Compiler, Hook, Hooks, MultiCompiler};
pub use config::{
    load_config, BuildConfig, Plugin, ResolveConfig, ServerOptions, TargetConfig, TargetKind,
    CLIENT_TARGET, SERVER_TARGET,
};
pub use engine::{BundleEngine, CommandEngine, EngineContext, EngineOutput};
pub use rules::{AssetDisposition, InlineEncoding, LoaderUse, Pattern, Rule, RuleSet};
pub use stats::{Chunk, ChunkGroup, CompiledAssetSet, Stats};
pub use template::FilenameTemplate;
pub use watch::{WatchOptions, Watching};
