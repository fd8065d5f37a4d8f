//! Background cleaner scheduler
//!
//! A cleaner is either idle or cleaning. `clean` resets the throttling counters and,
//! when idle, hands a request to a single lazily spawned worker thread that runs the
//! pass and flips the cleaner back to idle. Callers never wait on the worker.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use super::types::{CleanRequest, CleaningTask};

/// Throttling counters and the worker handle, guarded together
struct Control {
    last_clean: Option<Instant>,
    modification_count: i64,
    sender: Option<Sender<CleanRequest>>,
}

/// Coalesces cleaning requests of one cache instance into one background pass at a time
pub struct BackgroundCleaner {
    name: String,
    task: Weak<dyn CleaningTask>,
    cleaning: Arc<AtomicBool>,
    control: Mutex<Control>,
}

impl BackgroundCleaner {
    /// Create an idle cleaner; no thread is spawned until the first `clean`
    pub fn new(name: impl Into<String>, task: Weak<dyn CleaningTask>) -> Self {
        Self {
            name: name.into(),
            task,
            cleaning: Arc::new(AtomicBool::new(false)),
            control: Mutex::new(Control {
                last_clean: None,
                modification_count: 0,
                sender: None,
            }),
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a pass is queued or running
    #[inline]
    pub fn is_cleaning(&self) -> bool {
        self.cleaning.load(Ordering::Acquire)
    }

    /// Poll until the cleaner is idle or `timeout` elapses
    ///
    /// Returns `true` when the cleaner went idle in time.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_cleaning() {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(2));
        }
        true
    }

    /// Start a cleaning pass unless one is already in flight
    pub fn clean(&self) {
        let mut control = self.lock_control();
        control.last_clean = Some(Instant::now());
        control.modification_count = 0;

        if self.cleaning.load(Ordering::Acquire) {
            return;
        }

        self.cleaning.store(true, Ordering::Release);
        if !self.dispatch(&mut control) {
            self.cleaning.store(false, Ordering::Release);
        }
    }

    /// Record one cache access and start a pass when a threshold is crossed
    ///
    /// `time_delay` is in milliseconds. Only modifications count against
    /// `modification_limit`; both limits are compared strictly.
    pub fn access(&self, is_modification: bool, time_delay: i64, modification_limit: i64) {
        let triggered = {
            let mut control = self.lock_control();
            if is_modification {
                control.modification_count += 1;
            }

            let now = Instant::now();
            let last_clean = *control.last_clean.get_or_insert(now);
            let elapsed = i64::try_from(now.duration_since(last_clean).as_millis())
                .unwrap_or(i64::MAX);

            elapsed > time_delay || control.modification_count > modification_limit
        };

        if triggered {
            self.clean();
        }
    }

    fn lock_control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a request, spawning the worker on first use
    fn dispatch(&self, control: &mut Control) -> bool {
        if control.sender.is_none() {
            control.sender = self.spawn_worker();
        }
        let Some(sender) = control.sender.as_ref() else {
            return false;
        };

        match sender.try_send(CleanRequest::now()) {
            Ok(()) => true,
            // a request is already waiting for the worker
            Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Disconnected(_)) => {
                log::warn!("Cleaner worker of '{}' has exited, respawning", self.name);
                control.sender = self.spawn_worker();
                control
                    .sender
                    .as_ref()
                    .is_some_and(|sender| sender.try_send(CleanRequest::now()).is_ok())
            }
        }
    }

    fn spawn_worker(&self) -> Option<Sender<CleanRequest>> {
        let (sender, receiver) = bounded(1);
        let task = self.task.clone();
        let cleaning = Arc::clone(&self.cleaning);
        let name = self.name.clone();

        match thread::Builder::new()
            .name(format!("{}-cleaner", self.name))
            .spawn(move || worker_loop(&name, receiver, task, cleaning))
        {
            Ok(_) => {
                log::debug!("Spawned cleaner worker for '{}'", self.name);
                Some(sender)
            }
            Err(e) => {
                log::error!("Failed to spawn cleaner worker for '{}': {:?}", self.name, e);
                None
            }
        }
    }
}

impl std::fmt::Debug for BackgroundCleaner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundCleaner")
            .field("name", &self.name)
            .field("cleaning", &self.is_cleaning())
            .finish()
    }
}

/// Runs passes until the owning cache is dropped
///
/// The loop ends when every sender is gone or the task can no longer be upgraded.
fn worker_loop(
    name: &str,
    receiver: Receiver<CleanRequest>,
    task: Weak<dyn CleaningTask>,
    cleaning: Arc<AtomicBool>,
) {
    while let Ok(request) = receiver.recv() {
        let Some(task) = task.upgrade() else {
            cleaning.store(false, Ordering::Release);
            break;
        };

        let started = Instant::now();
        log::trace!(
            "Cleaning pass of '{}' started {:?} after request",
            name,
            started.duration_since(request.requested_at)
        );

        match catch_unwind(AssertUnwindSafe(|| task.clean_cache())) {
            Ok(Ok(report)) => log::debug!(
                "Cleaning pass of '{}' finished in {:?}: deleted {} items ({} bytes), discarded {}, {} remaining",
                name,
                started.elapsed(),
                report.deleted_items,
                report.deleted_size,
                report.discarded,
                report.remaining_size
            ),
            Ok(Err(e)) => log::warn!("Cleaning pass of '{}' failed: {}", name, e),
            Err(_) => log::error!("Cleaning pass of '{}' panicked", name),
        }

        drop(task);
        cleaning.store(false, Ordering::Release);
    }
    log::debug!("Cleaner worker of '{}' stopped", name);
}
