//! Background driver thread.
//!
//! Grounded on `strata-engine`'s condvar-driven worker (`background.rs`),
//! scaled down from a general priority task queue to the one thing this
//! engine needs: a single loop that wakes at a fixed cadence (or early, on
//! `notify`), runs one tick of deferred work, and sleeps again. This stands
//! in for "single-threaded cooperative, defer to the next tick" scheduling
//! (§5) — the mutex the tick closure locks internally is what actually
//! serializes it against foreground calls.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::error;

/// A background thread that periodically invokes a tick closure.
pub struct Driver {
    stop: Arc<AtomicBool>,
    wake: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl Driver {
    /// Spawn the driver thread. `tick` is invoked once per wake, either on
    /// the `interval` timeout or an explicit `notify()`.
    pub fn spawn<F>(interval: Duration, mut tick: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let wake = Arc::new((Mutex::new(false), Condvar::new()));
        let stop_thread = Arc::clone(&stop);
        let wake_thread = Arc::clone(&wake);

        let handle = std::thread::Builder::new()
            .name("havenkv-driver".to_string())
            .spawn(move || loop {
                if stop_thread.load(Ordering::Acquire) {
                    return;
                }

                if let Err(payload) =
                    std::panic::catch_unwind(std::panic::AssertUnwindSafe(&mut tick))
                {
                    error!(
                        "havenkv background driver tick panicked: {:?}",
                        payload
                            .downcast_ref::<&str>()
                            .copied()
                            .unwrap_or("(non-string panic)")
                    );
                }

                let (lock, cvar) = &*wake_thread;
                let mut pending = lock.lock();
                if !*pending {
                    cvar.wait_for(&mut pending, interval);
                }
                *pending = false;

                if stop_thread.load(Ordering::Acquire) {
                    return;
                }
            })
            .expect("failed to spawn havenkv background driver thread");

        Driver {
            stop,
            wake,
            handle: Some(handle),
        }
    }

    /// Wake the driver immediately instead of waiting for the next interval.
    pub fn notify(&self) {
        let (lock, cvar) = &*self.wake;
        let mut pending = lock.lock();
        *pending = true;
        cvar.notify_one();
    }

    /// Signal the driver to stop and block until its thread exits.
    pub fn stop(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.notify();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}
