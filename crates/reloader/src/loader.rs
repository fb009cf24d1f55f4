//! DataLoader - two slots, one active index, and a publisher thread.
//!
//! Refresh cycle (publisher thread only):
//! 1. Build a fresh instance into the inactive slot and reload it
//! 2. Report the outcome
//! 3. On failure: drop the candidate, readers are unaffected
//! 4. On success: open the candidate, flip the active index, wait for the
//!    old slot to drain to zero readers, close it, drop its payload
//!
//! Readers never lock: `acquire` loads the active index and bumps the slot's
//! reader count with a compare-and-swap, retrying if the slot is closing.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_utils::Backoff;
use tracing::{debug, error, info, warn};

use crate::config::LoaderConfig;
use crate::error::LoaderError;
use crate::guard::ReadGuard;
use crate::reload::{Reload, ReloadError, ReloadOutcome};
use crate::slot::{PinAttempt, Slot};
use crate::status::{LoaderState, LoaderStatus};
use crate::version::RELOADER_VERSION;

/// State shared between the loader handle and its publisher thread.
struct Shared<T> {
    slots: [Slot<T>; 2],
    active: AtomicUsize,
    running: AtomicBool,
    /// Generation of the payload in the active slot.
    generation: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl<T: Reload> Shared<T> {
    fn new() -> Self {
        Self {
            slots: [Slot::new(), Slot::new()],
            active: AtomicUsize::new(0),
            running: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            succeeded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            last_error: Mutex::new(None),
        }
    }

    fn pin(&self) -> ReadGuard<'_, T> {
        let backoff = Backoff::new();
        loop {
            let index = self.active.load(Ordering::Acquire);
            let slot = &self.slots[index];
            match slot.try_pin() {
                PinAttempt::Pinned => {
                    if let Some(guard) = ReadGuard::from_pinned(slot, index) {
                        return guard;
                    }
                    backoff.snooze();
                }
                // The index has moved past this slot, or is about to.
                PinAttempt::Closed => backoff.snooze(),
                PinAttempt::Contended => backoff.spin(),
            }
        }
    }

    /// Build a fresh instance into `slot`, reload it, and report the outcome.
    ///
    /// A panic in `Default::default`, `reload` or `report` turns the attempt
    /// into a failure. If construction panicked the slot is left empty.
    ///
    /// # Safety
    /// Publisher only. `slot` must be closed, drained, and not active.
    unsafe fn load_into(&self, slot: &Slot<T>, generation: u64) -> ReloadOutcome {
        let started = Instant::now();

        let outcome = match panic::catch_unwind(T::default) {
            Err(payload) => ReloadOutcome::failed(
                generation,
                contained_panic("construction", &*payload, generation),
                started.elapsed(),
            ),
            Ok(value) => {
                let candidate = unsafe { slot.install(value, generation) };

                let result = panic::catch_unwind(AssertUnwindSafe(|| candidate.reload()))
                    .unwrap_or_else(|payload| {
                        Err(contained_panic("reload", &*payload, generation))
                    });
                let outcome = ReloadOutcome::from_result(generation, result, started.elapsed());

                match panic::catch_unwind(AssertUnwindSafe(|| candidate.report(&outcome))) {
                    Ok(()) => outcome,
                    Err(payload) => ReloadOutcome::failed(
                        generation,
                        contained_panic("report", &*payload, generation),
                        outcome.load_time,
                    ),
                }
            }
        };

        self.record(&outcome);
        outcome
    }

    fn record(&self, outcome: &ReloadOutcome) {
        match &outcome.error {
            None => {
                self.succeeded.fetch_add(1, Ordering::Relaxed);
            }
            Some(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) =
                    Some(e.to_string());
            }
        }
    }

    /// First load into slot 0. Published even if the reload failed: there is
    /// no "no data" state. Only a panicking `Default::default` leaves nothing
    /// to publish.
    fn load_initial(&self) -> Result<(), LoaderError> {
        let slot = &self.slots[0];
        // SAFETY: nothing is published yet, so no reader can reach either slot.
        let outcome = unsafe { self.load_into(slot, 1) };

        // SAFETY: still unpublished.
        if unsafe { slot.payload() }.is_none() {
            let reason = outcome.error.map(|e| e.to_string()).unwrap_or_default();
            error!(error = %reason, "Initial load produced no instance - nothing to serve");
            return Err(LoaderError::InitialLoad(reason));
        }
        if !outcome.success() {
            warn!("Initial load failed - serving it anyway until a reload succeeds");
        }

        slot.open();
        self.active.store(0, Ordering::SeqCst);
        self.generation.store(1, Ordering::Release);
        Ok(())
    }

    fn refresh(&self) {
        // Only this thread writes the index.
        let index = self.active.load(Ordering::Relaxed);
        let other = 1 - index;
        let generation = self.generation.load(Ordering::Relaxed) + 1;
        let candidate = &self.slots[other];

        // SAFETY: `other` is not active, and was closed and drained when it
        // last retired (or has never been opened).
        let outcome = unsafe { self.load_into(candidate, generation) };

        if !outcome.success() {
            // SAFETY: the candidate was never opened.
            drop(unsafe { candidate.take() });
            debug!(generation, slot = other, "Discarded failed candidate");
            return;
        }

        candidate.open();
        self.active.store(other, Ordering::SeqCst);
        self.generation.store(generation, Ordering::Release);

        let retiring = &self.slots[index];
        let attempts = retiring.drain();
        // SAFETY: drained and closed, no reader holds or can take a pin.
        drop(unsafe { retiring.take() });

        info!(
            generation,
            slot = other,
            load_time = ?outcome.load_time,
            drain_attempts = attempts,
            "Published new version"
        );
    }

    /// Publisher loop: refresh every `interval`, re-checking the stop flag
    /// every `tick`.
    fn run(&self, interval: Duration, tick: Duration) {
        let _running = RunningFlag(&self.running);

        // `None` when the deadline is beyond what `Instant` can represent.
        let mut deadline = Instant::now().checked_add(interval);
        while self.running.load(Ordering::Acquire) {
            let now = Instant::now();
            match deadline {
                Some(at) if now >= at => {
                    self.refresh();
                    deadline = Instant::now().checked_add(interval);
                }
                Some(at) => thread::park_timeout(tick.min(at - now)),
                None => thread::park_timeout(tick),
            }
        }
        debug!("Publisher thread exiting");
    }
}

/// Clears the running flag when the publisher exits, including by unwinding.
struct RunningFlag<'a>(&'a AtomicBool);

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            error!("Publisher thread panicked - data will no longer be refreshed");
        }
        self.0.store(false, Ordering::Release);
    }
}

/// Double-buffered holder for a periodically reloaded `T`.
///
/// ```no_run
/// use reloader::{DataLoader, Reload, ReloadError};
///
/// #[derive(Default)]
/// struct Blocklist {
///     hosts: Vec<String>,
/// }
///
/// impl Reload for Blocklist {
///     fn reload(&mut self) -> Result<(), ReloadError> {
///         let raw = std::fs::read_to_string("/etc/blocklist")
///             .map_err(|e| ReloadError::unavailable(e.to_string()))?;
///         self.hosts = raw.lines().map(str::to_owned).collect();
///         Ok(())
///     }
/// }
///
/// let loader = DataLoader::<Blocklist>::new();
/// loader.start(300).expect("publisher thread");
///
/// let blocked = loader.acquire().hosts.iter().any(|h| h == "example.com");
/// ```
pub struct DataLoader<T: Reload> {
    shared: Arc<Shared<T>>,
    config: LoaderConfig,
    /// One-time initialization state, owned per instance.
    init: OnceLock<Result<(), LoaderError>>,
    publisher: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Reload> DataLoader<T> {
    pub fn new() -> Self {
        Self::with_config(LoaderConfig::default())
    }

    pub fn with_config(config: LoaderConfig) -> Self {
        Self {
            shared: Arc::new(Shared::new()),
            config,
            init: OnceLock::new(),
            publisher: Mutex::new(None),
        }
    }

    /// Load the first version and start refreshing every `interval_secs`.
    ///
    /// Only the first call does anything; concurrent callers wait for it and
    /// get its result. The first load happens synchronously on the calling
    /// thread.
    pub fn start(&self, interval_secs: u64) -> Result<(), LoaderError> {
        self.start_with_interval(Duration::from_secs(interval_secs))
    }

    /// Like [`start`](Self::start) with a sub-second interval. Intervals
    /// shorter than the configured tick are rounded up to one tick.
    pub fn start_with_interval(&self, interval: Duration) -> Result<(), LoaderError> {
        self.init.get_or_init(|| self.initialize(interval)).clone()
    }

    /// Like [`start`](Self::start) using [`LoaderConfig::interval`].
    pub fn start_from_config(&self) -> Result<(), LoaderError> {
        self.start_with_interval(self.config.interval)
    }

    fn initialize(&self, interval: Duration) -> Result<(), LoaderError> {
        let interval = interval.max(self.config.tick);
        let tick = self.config.tick;

        self.shared.load_initial()?;
        self.shared.running.store(true, Ordering::Release);

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || shared.run(interval, tick));

        match spawned {
            Ok(handle) => {
                *self.publisher.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
                info!(
                    version = RELOADER_VERSION,
                    interval = ?interval,
                    tick = ?tick,
                    thread = %self.config.thread_name,
                    "Loader started"
                );
                Ok(())
            }
            Err(e) => {
                self.shared.running.store(false, Ordering::Release);
                error!(error = %e, "Failed to spawn publisher thread - data will not be refreshed");
                Err(LoaderError::Spawn(e.to_string()))
            }
        }
    }

    /// Pin the current version for reading.
    ///
    /// Never blocks on a lock or I/O; retries briefly if it races with a
    /// publish.
    ///
    /// # Panics
    /// If [`start`](Self::start) has not completed, or returned
    /// [`LoaderError::InitialLoad`].
    pub fn acquire(&self) -> ReadGuard<'_, T> {
        match self.try_acquire() {
            Some(guard) => guard,
            None => {
                panic!("DataLoader::acquire called before start or after a failed initial load")
            }
        }
    }

    /// Like [`acquire`](Self::acquire), but `None` when nothing is published.
    pub fn try_acquire(&self) -> Option<ReadGuard<'_, T>> {
        self.init.get()?;
        if self.generation() == 0 {
            return None;
        }
        Some(self.shared.pin())
    }

    /// Ask the publisher to exit at its next tick. Outstanding guards stay
    /// valid and the last published version keeps being served.
    pub fn stop(&self) {
        if self.shared.running.swap(false, Ordering::AcqRel) {
            debug!("Stop requested");
        }
        let publisher = self.publisher.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = publisher.as_ref() {
            handle.thread().unpark();
        }
    }

    /// Stop and wait for the publisher thread to exit.
    ///
    /// Waits for an in-progress reload to finish; reloads are never cancelled.
    /// A publish in progress also waits for the retiring slot to drain, so
    /// drop all of this thread's guards first: a guard held across
    /// `shutdown` can deadlock it.
    pub fn shutdown(&self) {
        self.stop();

        let handle = self
            .publisher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                warn!("shutdown called from the publisher thread - not joining");
                return;
            }
            if handle.join().is_err() {
                error!("Publisher thread panicked");
            }
        }
    }

    pub fn is_started(&self) -> bool {
        self.init.get().is_some()
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Generation readers currently resolve to (0 before start).
    pub fn generation(&self) -> u64 {
        self.shared.generation.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn status(&self) -> LoaderStatus {
        let state = if !self.is_started() {
            LoaderState::NotStarted
        } else if self.is_running() {
            LoaderState::Running
        } else {
            LoaderState::Stopped
        };

        let active_slot = self.shared.active.load(Ordering::Acquire);
        LoaderStatus {
            state,
            generation: self.generation(),
            active_slot,
            active_readers: self.shared.slots[active_slot].readers().unwrap_or(0),
            reloads_succeeded: self.shared.succeeded.load(Ordering::Relaxed),
            reloads_failed: self.shared.failed.load(Ordering::Relaxed),
            last_error: self
                .shared
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}

impl<T: Reload> Default for DataLoader<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Dropping a loader calls [`shutdown`](DataLoader::shutdown). Guards borrow
/// the loader, so none can be alive at this point.
impl<T: Reload> Drop for DataLoader<T> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn contained_panic(stage: &str, payload: &(dyn Any + Send), generation: u64) -> ReloadError {
    let message = panic_message(payload);
    error!(generation, stage, panic = %message, "Panic during reload attempt");
    ReloadError::internal(format!("{stage} panicked: {message}"))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
