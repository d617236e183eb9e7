//! Control flags and the interruptible wait primitive
//!
//! Every wait in the worker goes through `interruptible_sleep`, so a stop
//! request is observed within one slice no matter how long the nominal
//! delay is. Pause is observed only between phases, via `park_while_paused`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Slice between cancellation checks during a wait.
const SLEEP_SLICE: Duration = Duration::from_millis(100);
/// Slice between resume checks while parked on pause.
const PARK_SLICE: Duration = Duration::from_millis(500);

/// The three control flags shared between the control thread and the
/// worker. The control thread only ever writes flags; the worker reads
/// them and clears `running` on exit.
#[derive(Clone, Default)]
pub struct ControlFlags {
    pub running: Arc<AtomicBool>,
    pub paused: Arc<AtomicBool>,
    pub cancel: Arc<AtomicBool>,
}

impl ControlFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    pub fn request_cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Clear everything back to the idle state.
    pub fn reset(&self) {
        self.running.store(false, Ordering::Relaxed);
        self.paused.store(false, Ordering::Relaxed);
        self.cancel.store(false, Ordering::Relaxed);
    }
}

/// Whether a wait ran its full duration or was cut short by cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    Completed,
    Interrupted,
}

impl WaitOutcome {
    pub fn completed(self) -> bool {
        self == WaitOutcome::Completed
    }
}

/// Sleep for `duration` in short slices, aborting as soon as cancellation
/// is requested.
pub fn interruptible_sleep(duration: Duration, flags: &ControlFlags) -> WaitOutcome {
    let deadline = Instant::now() + duration;
    loop {
        if flags.is_cancelled() {
            return WaitOutcome::Interrupted;
        }
        let now = Instant::now();
        if now >= deadline {
            return WaitOutcome::Completed;
        }
        std::thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}

/// Block while the pause flag is set. Returns `Interrupted` if cancellation
/// arrives while parked.
pub fn park_while_paused(flags: &ControlFlags) -> WaitOutcome {
    while flags.is_paused() {
        if flags.is_cancelled() {
            return WaitOutcome::Interrupted;
        }
        std::thread::sleep(PARK_SLICE);
    }
    if flags.is_cancelled() {
        WaitOutcome::Interrupted
    } else {
        WaitOutcome::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_completes_when_uncancelled() {
        let flags = ControlFlags::new();
        let start = Instant::now();
        let outcome = interruptible_sleep(Duration::from_millis(50), &flags);
        assert_eq!(outcome, WaitOutcome::Completed);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn sleep_interrupts_promptly_on_cancel() {
        let flags = ControlFlags::new();
        let waiter = {
            let flags = flags.clone();
            std::thread::spawn(move || {
                let start = Instant::now();
                let outcome = interruptible_sleep(Duration::from_secs(30), &flags);
                (outcome, start.elapsed())
            })
        };
        std::thread::sleep(Duration::from_millis(50));
        flags.request_cancel();

        let (outcome, elapsed) = waiter.join().unwrap();
        assert_eq!(outcome, WaitOutcome::Interrupted);
        assert!(elapsed < Duration::from_secs(1), "took {elapsed:?}");
    }

    #[test]
    fn park_returns_once_resumed() {
        let flags = ControlFlags::new();
        flags.paused.store(true, Ordering::Relaxed);
        let parker = {
            let flags = flags.clone();
            std::thread::spawn(move || park_while_paused(&flags))
        };
        std::thread::sleep(Duration::from_millis(50));
        flags.paused.store(false, Ordering::Relaxed);
        assert_eq!(parker.join().unwrap(), WaitOutcome::Completed);
    }

    #[test]
    fn cancel_while_parked_interrupts() {
        let flags = ControlFlags::new();
        flags.paused.store(true, Ordering::Relaxed);
        let parker = {
            let flags = flags.clone();
            std::thread::spawn(move || park_while_paused(&flags))
        };
        std::thread::sleep(Duration::from_millis(50));
        flags.request_cancel();
        assert_eq!(parker.join().unwrap(), WaitOutcome::Interrupted);
    }

    #[test]
    fn reset_clears_all_flags() {
        let flags = ControlFlags::new();
        flags.running.store(true, Ordering::Relaxed);
        flags.paused.store(true, Ordering::Relaxed);
        flags.request_cancel();
        flags.reset();
        assert!(!flags.is_running());
        assert!(!flags.is_paused());
        assert!(!flags.is_cancelled());
    }
}
