//! reloader: double-buffered data loader with lock-free readers.
//!
//! A [`DataLoader`] keeps two slots for a [`Reload`] type. Readers pin the
//! active slot with [`DataLoader::acquire`] and release it when the
//! [`ReadGuard`] drops. A background publisher thread rebuilds the inactive
//! slot on a timer, flips the active index on success, and reclaims the old
//! slot only after its last reader has left.

mod config;
mod error;
mod guard;
mod loader;
mod reload;
mod slot;
mod status;
mod version;

pub use config::LoaderConfig;
pub use error::LoaderError;
pub use guard::ReadGuard;
pub use loader::DataLoader;
pub use reload::{Reload, ReloadError, ReloadOutcome};
pub use status::{LoaderState, LoaderStatus};
pub use version::RELOADER_VERSION;
