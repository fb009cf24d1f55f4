//! Instrumented reload types shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use reloader::{Reload, ReloadError, ReloadOutcome};

pub const ROWS: usize = 64;

/// Counters and a reload script for one stamped type.
pub struct Counters {
    pub constructed: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub reload_calls: AtomicUsize,
    /// Drops of an instance that still had readers inside it.
    pub violations: AtomicUsize,
    /// Success flag of every reported outcome, in order.
    pub reports: Mutex<Vec<bool>>,
    script: Mutex<VecDeque<bool>>,
    /// Result used once the script is exhausted.
    fallback: AtomicBool,
}

impl Counters {
    pub const fn new() -> Self {
        Self {
            constructed: AtomicUsize::new(0),
            destroyed: AtomicUsize::new(0),
            reload_calls: AtomicUsize::new(0),
            violations: AtomicUsize::new(0),
            reports: Mutex::new(Vec::new()),
            script: Mutex::new(VecDeque::new()),
            fallback: AtomicBool::new(true),
        }
    }

    /// Script the next reload results; afterwards every reload returns `fallback`.
    pub fn script(&self, results: &[bool], fallback: bool) {
        let mut script = self.script.lock().unwrap();
        script.clear();
        script.extend(results.iter().copied());
        self.fallback.store(fallback, Ordering::SeqCst);
    }

    fn next_result(&self) -> bool {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.load(Ordering::SeqCst))
    }

    pub fn live(&self) -> usize {
        self.constructed.load(Ordering::SeqCst) - self.destroyed.load(Ordering::SeqCst)
    }

    pub fn reports(&self) -> Vec<bool> {
        self.reports.lock().unwrap().clone()
    }
}

/// Ties a stamped type to its own static counters so tests can run in parallel.
pub trait Key: Send + Sync + 'static {
    fn counters() -> &'static Counters;
}

macro_rules! stamped_key {
    ($name:ident) => {
        struct $name;

        impl crate::common::Key for $name {
            fn counters() -> &'static crate::common::Counters {
                static COUNTERS: crate::common::Counters = crate::common::Counters::new();
                &COUNTERS
            }
        }
    };
}

/// A table that is only valid once fully loaded: every row equals `stamp`.
///
/// A failed reload leaves the table half-written.
pub struct Stamped<K: Key> {
    pub stamp: usize,
    pub rows: Vec<usize>,
    /// Readers currently inside this instance.
    pub readers: AtomicUsize,
    _key: PhantomData<K>,
}

impl<K: Key> Default for Stamped<K> {
    fn default() -> Self {
        let stamp = K::counters().constructed.fetch_add(1, Ordering::SeqCst);
        Self {
            stamp,
            rows: Vec::new(),
            readers: AtomicUsize::new(0),
            _key: PhantomData,
        }
    }
}

impl<K: Key> Stamped<K> {
    /// True if this instance is a complete load.
    pub fn is_complete(&self) -> bool {
        self.rows.len() == ROWS && self.rows.iter().all(|&r| r == self.stamp)
    }

    /// Mark a reader as inside this instance for the duration of `f`.
    pub fn visit<R>(&self, f: impl FnOnce(&Self) -> R) -> R {
        self.readers.fetch_add(1, Ordering::SeqCst);
        let result = f(self);
        self.readers.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl<K: Key> Reload for Stamped<K> {
    fn reload(&mut self) -> Result<(), ReloadError> {
        let counters = K::counters();
        counters.reload_calls.fetch_add(1, Ordering::SeqCst);

        if !counters.next_result() {
            self.rows = vec![self.stamp; ROWS / 2];
            return Err(ReloadError::unavailable(format!("scripted failure {}", self.stamp)));
        }

        self.rows = vec![self.stamp; ROWS];
        Ok(())
    }

    fn report(&self, outcome: &ReloadOutcome) {
        K::counters().reports.lock().unwrap().push(outcome.success());
    }
}

impl<K: Key> Drop for Stamped<K> {
    fn drop(&mut self) {
        let counters = K::counters();
        if self.readers.load(Ordering::SeqCst) != 0 {
            counters.violations.fetch_add(1, Ordering::SeqCst);
        }
        counters.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(1));
    }
}
