//! Macro playback
//!
//! Replays a stored event sequence with its original timing (scaled by a
//! speed factor) on a dedicated thread, reporting completion over a
//! channel. Playback honors a shared cancel flag and an overall timeout,
//! and always releases keys it pressed before returning.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::{bounded, Receiver};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::input::{InputActuator, Key};
use crate::macros::{MacroEvent, MacroEventKind};

/// Slice between cancel checks while waiting for an event's timestamp.
const WAIT_SLICE: Duration = Duration::from_millis(50);

/// How a playback run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Completed,
    Cancelled,
    TimedOut,
}

/// Shared handle to the actuator, lockable per event so playback can run
/// off the worker thread.
pub type SharedActuator = Arc<Mutex<Box<dyn InputActuator>>>;

/// Replay `events` synchronously. `speed` scales time (2.0 = twice as
/// fast), `loop_count` repeats the whole sequence, `timeout` bounds the
/// entire run.
pub fn play(
    actuator: &SharedActuator,
    events: &[MacroEvent],
    speed: f64,
    loop_count: u32,
    timeout: Duration,
    cancel: &AtomicBool,
) -> Result<PlaybackOutcome> {
    let speed = if speed > 0.0 { speed } else { 1.0 };
    let start = Instant::now();
    let mut held: Vec<char> = Vec::new();

    let outcome = (|| {
        for iteration in 0..loop_count.max(1) {
            let loop_start = Instant::now();
            debug!(iteration, "macro playback loop");

            for event in events {
                let target = Duration::from_secs_f64(event.timestamp / speed);
                loop {
                    if cancel.load(Ordering::Relaxed) {
                        return Ok(PlaybackOutcome::Cancelled);
                    }
                    if start.elapsed() > timeout {
                        return Ok(PlaybackOutcome::TimedOut);
                    }
                    let elapsed = loop_start.elapsed();
                    if elapsed >= target {
                        break;
                    }
                    std::thread::sleep((target - elapsed).min(WAIT_SLICE));
                }

                let mut actuator = actuator.lock();
                match event.kind {
                    MacroEventKind::Move { x, y } => actuator.move_cursor(x, y)?,
                    MacroEventKind::Click => actuator.click()?,
                    MacroEventKind::KeyPress { key } => {
                        actuator.press_key(Key(key))?;
                        if !held.contains(&key) {
                            held.push(key);
                        }
                    }
                    MacroEventKind::KeyRelease { key } => {
                        actuator.release_key(Key(key))?;
                        held.retain(|&h| h != key);
                    }
                }
            }
        }
        Ok(PlaybackOutcome::Completed)
    })();

    // Whatever happened, do not leave keys physically down.
    if !held.is_empty() {
        warn!("releasing {} key(s) still held after playback", held.len());
        let mut actuator = actuator.lock();
        for key in held.drain(..) {
            if let Err(e) = actuator.release_key(Key(key)) {
                warn!("failed to release held key '{key}': {e:#}");
            }
        }
    }

    outcome
}

/// Asynchronous playback: runs `play` on its own thread, delivering the
/// result over the returned channel. Callers treat playback as successful
/// only when `Ok(Completed)` arrives within their own wait.
pub fn spawn(
    actuator: SharedActuator,
    events: Vec<MacroEvent>,
    speed: f64,
    loop_count: u32,
    timeout: Duration,
    cancel: Arc<AtomicBool>,
) -> Receiver<Result<PlaybackOutcome>> {
    let (tx, rx) = bounded(1);
    std::thread::Builder::new()
        .name("macro-playback".into())
        .spawn(move || {
            let result = play(&actuator, &events, speed, loop_count, timeout, &cancel);
            let _ = tx.send(result);
        })
        .ok();
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::recording::{Action, RecordingActuator};

    fn shared(actuator: RecordingActuator) -> SharedActuator {
        Arc::new(Mutex::new(Box::new(actuator) as Box<dyn InputActuator>))
    }

    fn quick_events() -> Vec<MacroEvent> {
        vec![
            MacroEvent { timestamp: 0.0, kind: MacroEventKind::KeyPress { key: 'w' } },
            MacroEvent { timestamp: 0.01, kind: MacroEventKind::KeyRelease { key: 'w' } },
            MacroEvent { timestamp: 0.02, kind: MacroEventKind::Move { x: 3, y: 4 } },
            MacroEvent { timestamp: 0.02, kind: MacroEventKind::Click },
        ]
    }

    #[test]
    fn replays_events_in_order() {
        let recorder = RecordingActuator::new();
        let actuator = shared(recorder.clone());
        let cancel = AtomicBool::new(false);

        let outcome =
            play(&actuator, &quick_events(), 1.0, 1, Duration::from_secs(5), &cancel).unwrap();
        assert_eq!(outcome, PlaybackOutcome::Completed);
        assert_eq!(
            recorder.taken(),
            vec![
                Action::Press('w'),
                Action::Release('w'),
                Action::Move(3, 4),
                Action::Click,
            ]
        );
    }

    #[test]
    fn loops_repeat_the_sequence() {
        let recorder = RecordingActuator::new();
        let actuator = shared(recorder.clone());
        let cancel = AtomicBool::new(false);

        play(&actuator, &quick_events(), 4.0, 3, Duration::from_secs(5), &cancel).unwrap();
        assert_eq!(recorder.taken().len(), 12);
    }

    #[test]
    fn cancel_stops_playback_and_releases_keys() {
        let recorder = RecordingActuator::new();
        let actuator = shared(recorder.clone());
        let cancel = AtomicBool::new(false);

        let events = vec![
            MacroEvent { timestamp: 0.0, kind: MacroEventKind::KeyPress { key: 'w' } },
            // Far in the future; cancel fires long before.
            MacroEvent { timestamp: 30.0, kind: MacroEventKind::KeyRelease { key: 'w' } },
        ];
        cancel.store(true, Ordering::Relaxed);
        // Cancel observed before the long wait; the pressed key never
        // happens, so nothing to release.
        let outcome = play(&actuator, &events, 1.0, 1, Duration::from_secs(60), &cancel).unwrap();
        assert_eq!(outcome, PlaybackOutcome::Cancelled);
        assert!(recorder.held_keys().is_empty());
    }

    #[test]
    fn timeout_releases_held_keys() {
        let recorder = RecordingActuator::new();
        let actuator = shared(recorder.clone());
        let cancel = AtomicBool::new(false);

        let events = vec![
            MacroEvent { timestamp: 0.0, kind: MacroEventKind::KeyPress { key: 's' } },
            MacroEvent { timestamp: 30.0, kind: MacroEventKind::KeyRelease { key: 's' } },
        ];
        let outcome =
            play(&actuator, &events, 1.0, 1, Duration::from_millis(120), &cancel).unwrap();
        assert_eq!(outcome, PlaybackOutcome::TimedOut);
        assert!(recorder.held_keys().is_empty());
        assert!(recorder.taken().contains(&Action::Release('s')));
    }

    #[test]
    fn spawned_playback_reports_over_channel() {
        let recorder = RecordingActuator::new();
        let actuator = shared(recorder.clone());
        let cancel = Arc::new(AtomicBool::new(false));

        let rx = spawn(
            actuator,
            quick_events(),
            1.0,
            1,
            Duration::from_secs(5),
            cancel,
        );
        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert_eq!(result, PlaybackOutcome::Completed);
        assert_eq!(recorder.taken().len(), 4);
    }
}
