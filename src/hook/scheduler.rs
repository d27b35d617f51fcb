//! Debounced callback firing.
//!
//! Fired callbacks never run on the pump thread: each firing gets its own
//! short-lived thread, started after a small fixed delay. The delay absorbs
//! timing jitter between the combo's last key-up and OS delivery, and keeps
//! a callback that types synthetic text from racing its own trigger.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Shared user callback for a registered hotkey.
pub type Callback = Arc<dyn Fn() + Send + Sync + 'static>;

/// Invokes `callback` exactly once, `delay` from now, off the calling
/// thread. A panicking callback is caught and logged; it never unwinds
/// into the pump or poisons the registry.
pub fn schedule(delay: Duration, callback: Callback) {
    let spawned = thread::Builder::new()
        .name("hotkey-fire".to_owned())
        .spawn(move || {
            thread::sleep(delay);
            if catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                tracing::error!("hotkey callback panicked; engine continues");
            }
        });
    if let Err(e) = spawned {
        tracing::error!(error = %e, "failed to spawn hotkey fire thread");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Instant;

    #[test]
    fn fires_exactly_once_after_delay() {
        let count = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::channel();
        let counter = Arc::clone(&count);
        let start = Instant::now();

        schedule(
            Duration::from_millis(20),
            Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                let _ = tx.send(Instant::now());
            }),
        );

        let fired_at = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(fired_at.duration_since(start) >= Duration::from_millis(20));
        // Give a straggler duplicate a chance to show up.
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn runs_off_the_calling_thread() {
        let (tx, rx) = mpsc::channel();
        schedule(
            Duration::from_millis(1),
            Arc::new(move || {
                let _ = tx.send(thread::current().id());
            }),
        );
        let fired_on = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_ne!(fired_on, thread::current().id());
    }

    #[test]
    fn panicking_callback_is_contained() {
        schedule(
            Duration::from_millis(1),
            Arc::new(|| panic!("callback blew up")),
        );
        // Nothing to assert beyond "the process survives"; the panic must
        // stay on the fire thread.
        thread::sleep(Duration::from_millis(50));
    }
}
