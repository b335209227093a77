pub mod build;
pub mod dev;
pub mod inspect;
pub mod version;
