/// Errors returned from [`DataLoader::start`](crate::DataLoader::start).
///
/// `Clone` because the outcome of the one-time initialization is stored and
/// handed to every caller of `start`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoaderError {
    /// The publisher thread could not be spawned. The initial data is still
    /// served, but it will never be refreshed.
    #[error("failed to spawn publisher thread: {0}")]
    Spawn(String),

    /// Building the first instance panicked, so there is nothing to serve.
    /// The publisher is not started and `acquire` stays unavailable.
    #[error("initial load produced no instance: {0}")]
    InitialLoad(String),
}
