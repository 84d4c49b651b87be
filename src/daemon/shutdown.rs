use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Cooperative cancellation token shared between the run loop and signal
/// handlers. The loop polls it between short sleeps; nothing is ever
/// interrupted mid-cycle.
#[derive(Clone, Debug)]
pub struct ShutdownToken {
    flag: Arc<AtomicBool>,
    poll_interval: Duration,
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::with_poll_interval(DEFAULT_POLL_INTERVAL)
    }

    /// Tests inject a near-zero interval here to avoid real one-second waits.
    pub fn with_poll_interval(poll_interval: Duration) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            poll_interval,
        }
    }

    /// Shared flag for `signal_hook::flag::register`.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Idempotent; later calls are no-ops.
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn should_stop(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Sleeps for up to `duration`, waking every poll interval to check the
    /// flag. Returns true as soon as shutdown has been requested.
    pub fn wait(&self, duration: Duration) -> bool {
        // A duration too large for the clock means there is no deadline
        let deadline = Instant::now().checked_add(duration);

        loop {
            if self.should_stop() {
                return true;
            }

            let sleep_for = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.poll_interval.min(deadline - now)
                },
                None => self.poll_interval,
            };

            thread::sleep(sleep_for);
        }
    }
}
