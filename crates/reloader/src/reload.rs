//! The contract a type must meet to be managed by a [`DataLoader`](crate::DataLoader).

use std::time::Duration;

/// Errors a reload attempt can report.
///
/// These never reach readers. They are passed to [`Reload::report`] and kept
/// as the last error in [`LoaderStatus`](crate::LoaderStatus).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReloadError {
    /// The external source could not be reached or read.
    #[error("source unavailable: {message}")]
    Unavailable { message: String },

    /// The source was read but its contents were rejected.
    #[error("invalid data: {message}")]
    Invalid { message: String },

    /// Internal error (e.g., the reload panicked).
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl ReloadError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Result of a single reload attempt, handed to [`Reload::report`].
///
/// An attempt succeeded exactly when it carries no error.
#[derive(Debug, Clone, PartialEq)]
pub struct ReloadOutcome {
    /// Generation the candidate was built for. On failure this generation is
    /// never published and will be retried by the next attempt.
    pub generation: u64,
    pub error: Option<ReloadError>,
    /// Wall time spent in `Default::default` plus `reload`.
    pub load_time: Duration,
}

impl ReloadOutcome {
    pub fn succeeded(generation: u64, load_time: Duration) -> Self {
        Self {
            generation,
            error: None,
            load_time,
        }
    }

    pub fn failed(generation: u64, error: ReloadError, load_time: Duration) -> Self {
        Self {
            generation,
            error: Some(error),
            load_time,
        }
    }

    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    pub(crate) fn from_result(
        generation: u64,
        result: Result<(), ReloadError>,
        load_time: Duration,
    ) -> Self {
        match result {
            Ok(()) => Self::succeeded(generation, load_time),
            Err(e) => Self::failed(generation, e, load_time),
        }
    }
}

/// A cheaply default-constructible value that populates itself from an
/// external source.
///
/// The loader builds a fresh `Default` instance for every attempt, calls
/// [`reload`](Reload::reload) on it, and then always calls
/// [`report`](Reload::report). Readers share `&Self` across threads, hence
/// the `Sync` bound; instances are built and dropped on the publisher thread,
/// hence `Send`.
pub trait Reload: Default + Send + Sync + 'static {
    /// Populate `self` from the source. A failed instance is discarded.
    fn reload(&mut self) -> Result<(), ReloadError>;

    /// Observe the outcome of the attempt that just finished.
    ///
    /// Called exactly once per attempt, success or failure, before the
    /// candidate is published or discarded.
    fn report(&self, outcome: &ReloadOutcome) {
        match &outcome.error {
            None => tracing::info!(
                generation = outcome.generation,
                load_time = ?outcome.load_time,
                "Reload succeeded"
            ),
            Some(error) => tracing::warn!(
                generation = outcome.generation,
                load_time = ?outcome.load_time,
                error = %error,
                "Reload failed"
            ),
        }
    }
}
