//! Version information for reloader.

/// Reloader version from Cargo.toml
pub const RELOADER_VERSION: &str = env!("CARGO_PKG_VERSION");
