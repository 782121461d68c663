//! Idle-triggered debouncing for field validation.

use std::{
    future::Future,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::{task::JoinHandle, time::sleep};

/// State names at least this long are complete; suggestions no longer help.
pub const STATE_LOOKUP_MAX_LEN: usize = 20;
pub const US_ZIPCODE_LEN: usize = 5;

/// Runs only the most recently scheduled work, once its field has been idle for `delay`.
///
/// Scheduling again before the timer fires replaces the pending work and restarts
/// the timer. Work that has already fired is detached and always runs to completion.
/// Dropping the debouncer cancels whatever is still waiting.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    pub fn schedule<F>(&self, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let delay = self.delay;
        let timer = tokio::spawn(async move {
            sleep(delay).await;
            tokio::spawn(work);
        });

        if let Some(previous) = self.lock().replace(timer) {
            previous.abort();
        }
    }

    /// Clears a pending timer. Returns whether one was still waiting.
    pub fn cancel(&self) -> bool {
        match self.lock().take() {
            Some(timer) => {
                let waiting = !timer.is_finished();
                timer.abort();
                waiting
            }
            None => false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.lock().as_ref().is_some_and(|timer| !timer.is_finished())
    }

    fn lock(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Which lookup a field value feeds, and whether the value is worth a network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPolicy {
    StateLookup,
    ZipcodeLookup,
}

impl FieldPolicy {
    pub fn should_validate(self, value: &str) -> bool {
        let value = value.trim();
        match self {
            FieldPolicy::StateLookup => {
                !value.is_empty() && value.chars().count() < STATE_LOOKUP_MAX_LEN
            }
            FieldPolicy::ZipcodeLookup => is_complete_us_zipcode(value),
        }
    }
}

pub fn is_complete_us_zipcode(value: &str) -> bool {
    value.len() == US_ZIPCODE_LEN && value.bytes().all(|b| b.is_ascii_digit())
}
