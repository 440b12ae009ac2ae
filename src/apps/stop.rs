//! # Cooperative stop signal.
//!
//! [`StopSignal`] is handed to every mini-app. Once set it never resets. Worker
//! threads block on it with [`StopSignal::wait`] (a timed wait, never a busy loop);
//! async supervisors await [`StopSignal::cancelled`].
//!
//! ```text
//! runner / launcher ──set()──► flag = true ─┬─► Condvar::notify_all  (app thread wakes)
//!                                           └─► CancellationToken    (supervise task wakes)
//! ```

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

struct Inner {
    flag: Mutex<bool>,
    cv: Condvar,
    token: CancellationToken,
}

/// One-shot, cloneable stop flag shared between the runner and an app worker.
#[derive(Clone)]
pub struct StopSignal {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for StopSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopSignal")
            .field("set", &self.is_set())
            .finish()
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl StopSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                flag: Mutex::new(false),
                cv: Condvar::new(),
                token: CancellationToken::new(),
            }),
        }
    }

    /// Sets the signal. Idempotent.
    pub fn set(&self) {
        let mut flag = self
            .inner
            .flag
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if !*flag {
            *flag = true;
            self.inner.cv.notify_all();
            self.inner.token.cancel();
        }
    }

    pub fn is_set(&self) -> bool {
        *self
            .inner
            .flag
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks the calling thread until the signal is set or `timeout` elapses.
    ///
    /// Returns `true` if the signal is set.
    pub fn wait(&self, timeout: Duration) -> bool {
        let guard = self
            .inner
            .flag
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = self
            .inner
            .cv
            .wait_timeout_while(guard, timeout, |set| !*set)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }

    /// Completes once the signal is set.
    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await;
    }
}
