//! Clocks and retry backoff
//!
//! The poll loop never reads wall-clock time directly; it asks a [`Clock`],
//! so tests can run multi-cycle scenarios instantly.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Upper limit for a single retry wait
pub const MAX_BACKOFF: Duration = Duration::minutes(5);

/// Source of time and the ability to wait for it
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;

    /// Block until `at`. Returns immediately if `at` has passed.
    fn sleep_until(&self, at: DateTime<Utc>);
}

/// Wall-clock time, waiting with `std::thread::sleep`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep_until(&self, at: DateTime<Utc>) {
        if let Ok(wait) = (at - Utc::now()).to_std() {
            std::thread::sleep(wait);
        }
    }
}

type AdvanceHook = Box<dyn FnMut(DateTime<Utc>) + Send>;

/// Clock that jumps forward instantly when asked to sleep
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
    sleeps: Mutex<Vec<DateTime<Utc>>>,
    on_advance: Mutex<Option<AdvanceHook>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            sleeps: Mutex::new(Vec::new()),
            on_advance: Mutex::new(None),
        }
    }

    /// Run `hook` with the new time after every advance
    pub fn on_advance(self, hook: impl FnMut(DateTime<Utc>) + Send + 'static) -> Self {
        if let Ok(mut guard) = self.on_advance.lock() {
            *guard = Some(Box::new(hook));
        }
        self
    }

    /// Move the clock forward by `by`
    pub fn advance(&self, by: Duration) {
        let target = self.now() + by;
        self.sleep_until(target);
    }

    /// Every instant passed to `sleep_until`, in order
    pub fn sleeps(&self) -> Vec<DateTime<Utc>> {
        self.sleeps.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|t| *t).unwrap_or_else(|e| *e.into_inner())
    }

    fn sleep_until(&self, at: DateTime<Utc>) {
        if let Ok(mut sleeps) = self.sleeps.lock() {
            sleeps.push(at);
        }
        let current = match self.now.lock() {
            Ok(mut now) => {
                if at > *now {
                    *now = at;
                }
                *now
            }
            Err(_) => return,
        };
        if let Ok(mut hook) = self.on_advance.lock()
            && let Some(hook) = hook.as_mut()
        {
            hook(current);
        }
    }
}

/// Exponential backoff: `base`, `2*base`, `4*base`, ... capped at [`MAX_BACKOFF`].
/// `attempt` counts from 1.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let delay = base
        .checked_mul(1i32 << exponent)
        .unwrap_or(MAX_BACKOFF);
    delay.min(MAX_BACKOFF)
}

/// Generate a random jitter value (0-100ms)
pub fn rand_jitter() -> Duration {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let hasher = RandomState::new().build_hasher();
    Duration::milliseconds((hasher.finish() % 100) as i64)
}
