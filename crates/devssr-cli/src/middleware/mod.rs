//! Development middleware: in-memory asset serving and change notification.

pub mod assets;
pub mod hot;

pub use assets::{AssetMiddleware, AssetOptions};
pub use hot::HotMiddleware;
