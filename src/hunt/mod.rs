//! Hunt orchestration
//!
//! The cooperative state machine that drives movement, encounter checks,
//! battle responses, healing, repositioning and stuck-dialog recovery on a
//! single background worker. The control thread only flips flags and reads
//! snapshots; all perception and actuation happens on the worker.

pub mod events;
pub mod session;
pub mod wait;

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::capture::FrameSource;
use crate::config::HuntConfig;
use crate::error::HuntError;
use crate::hunt::events::{Callbacks, SpecialCallback, StatusCallback, StatusEvent};
use crate::hunt::session::{HuntSession, HuntStatistics, Phase};
use crate::hunt::wait::{interruptible_sleep, park_while_paused, ControlFlags, WaitOutcome};
use crate::input::playback::{self, PlaybackOutcome, SharedActuator};
use crate::input::Key;
use crate::macros::{MacroEvent, MacroStore};
use crate::vision::classifier::{EncounterClassification, EncounterKind, TextClassifier};
use crate::vision::CompositeStateDetector;

/// Bound on joining the worker in `stop()`.
const JOIN_TIMEOUT: Duration = Duration::from_secs(3);
/// Delay before the first movement when starting from the current spot,
/// giving the operator time to focus the target window.
const INITIAL_FOCUS_DELAY: Duration = Duration::from_secs(2);
/// Second look before acting on a suspected stuck dialog.
const STUCK_DEBOUNCE: Duration = Duration::from_secs(3);
/// Escape sequence: hold one key while tapping another.
const ESCAPE_HOLD_KEY: char = 's';
const ESCAPE_TAP_KEY: char = 'e';
const ESCAPE_TAPS: u32 = 6;
const ESCAPE_TAP_INTERVAL: Duration = Duration::from_millis(500);

/// Everything the worker perceives and acts through.
pub struct Collaborators {
    pub source: Box<dyn FrameSource>,
    pub actuator: SharedActuator,
    pub detector: CompositeStateDetector,
    pub classifier: TextClassifier,
    pub store: MacroStore,
}

/// What the orchestrator should do about a classified encounter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponsePlan {
    Ordinary,
    Duplicated,
    SpecialPause,
}

/// Map a classification to the response branch. An unknown with no
/// subjects at all means OCR failed outright; policy is to keep hunting
/// with the ordinary response rather than stall, logged as a warning.
pub fn response_plan(classification: &EncounterClassification) -> ResponsePlan {
    match classification.kind {
        EncounterKind::Ordinary => ResponsePlan::Ordinary,
        EncounterKind::Duplicated => ResponsePlan::Duplicated,
        EncounterKind::Flagged => ResponsePlan::SpecialPause,
        EncounterKind::Unknown if classification.subjects.is_empty() => {
            warn!("no subjects readable; defaulting to ordinary response");
            ResponsePlan::Ordinary
        }
        EncounterKind::Unknown => ResponsePlan::SpecialPause,
    }
}

/// Control surface over one hunt session at a time.
pub struct HuntOrchestrator {
    config: HuntConfig,
    engine: Arc<Mutex<Collaborators>>,
    flags: ControlFlags,
    stats: Arc<Mutex<HuntStatistics>>,
    callbacks: Callbacks,
    worker: Option<JoinHandle<()>>,
}

impl HuntOrchestrator {
    pub fn new(config: HuntConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            engine: Arc::new(Mutex::new(collaborators)),
            flags: ControlFlags::new(),
            stats: Arc::new(Mutex::new(HuntStatistics::idle())),
            callbacks: Callbacks::default(),
            worker: None,
        }
    }

    pub fn on_status(&mut self, callback: StatusCallback) {
        self.callbacks.on_status = Some(callback);
    }

    pub fn on_special_encounter(&mut self, callback: SpecialCallback) {
        self.callbacks.on_special = Some(callback);
    }

    pub fn config(&self) -> &HuntConfig {
        &self.config
    }

    /// Begin a session, repositioning to the hunting spot first when a
    /// macro is configured.
    pub fn start(&mut self) -> Result<()> {
        self.launch(false)
    }

    /// Begin a session from wherever the player currently stands; skips
    /// the initial repositioning and waits briefly for window focus.
    pub fn start_from_current_position(&mut self) -> Result<()> {
        self.launch(true)
    }

    fn launch(&mut self, from_current: bool) -> Result<()> {
        anyhow::ensure!(!self.flags.is_running(), "session already running");
        self.reap_worker();

        let macro_events = self.load_reposition_macro()?;

        {
            let mut engine = self.engine.lock();
            if engine.source.capture_full_area().is_none() {
                return Err(anyhow::Error::new(HuntError::PerceptionUnavailable(
                    "target window cannot be captured".into(),
                )));
            }
        }

        self.flags.reset();
        self.flags.running.store(true, Ordering::Relaxed);
        *self.stats.lock() = HuntStatistics::idle();

        let ctx = WorkerCtx {
            engine: Arc::clone(&self.engine),
            config: self.config.clone(),
            macro_events,
            flags: self.flags.clone(),
            stats: Arc::clone(&self.stats),
            callbacks: self.callbacks.clone(),
            from_current,
        };
        let handle = std::thread::Builder::new()
            .name("hunt-worker".into())
            .spawn(move || worker_main(ctx))
            .context("failed to spawn hunt worker")?;
        self.worker = Some(handle);
        info!(from_current, "hunt session started");
        Ok(())
    }

    fn load_reposition_macro(&self) -> Result<Option<Vec<MacroEvent>>> {
        let Some(name) = &self.config.recovery.reposition_macro else {
            return Ok(None);
        };
        let engine = self.engine.lock();
        let file = engine.store.load(name).map_err(|e| {
            anyhow::Error::new(HuntError::MacroFailure(format!(
                "repositioning macro '{name}' unavailable: {e:#}"
            )))
        })?;
        Ok(Some(file.events))
    }

    /// Freeze the loop at the next phase boundary.
    pub fn pause(&self) {
        if self.flags.is_running() && !self.flags.is_paused() {
            self.flags.paused.store(true, Ordering::Relaxed);
            self.callbacks.emit(StatusEvent::Paused);
        }
    }

    pub fn resume(&self) {
        if self.flags.is_running() && self.flags.is_paused() {
            self.flags.paused.store(false, Ordering::Relaxed);
            self.callbacks.emit(StatusEvent::Resumed);
        }
    }

    /// Request cancellation and join the worker with a bounded timeout.
    /// After this returns no further input is issued (best effort; a join
    /// timeout is logged instead of blocking forever).
    pub fn stop(&mut self) {
        self.flags.request_cancel();

        if let Some(handle) = self.worker.take() {
            let deadline = Instant::now() + JOIN_TIMEOUT;
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(20));
            }
            if handle.is_finished() {
                let _ = handle.join();
                self.flags.reset();
            } else {
                warn!("worker did not stop within {JOIN_TIMEOUT:?}");
                self.flags.running.store(false, Ordering::Relaxed);
            }
        } else {
            self.flags.reset();
        }

        let mut stats = self.stats.lock();
        stats.is_hunting = false;
        stats.is_paused = false;
    }

    /// Clear all control flags unconditionally. Safe to call repeatedly;
    /// intended for when the worker is known dead or wedged.
    pub fn force_reset_state(&mut self) {
        self.reap_worker();
        self.flags.reset();
        let mut stats = self.stats.lock();
        stats.is_hunting = false;
        stats.is_paused = false;
        stats.phase = Phase::Idle;
    }

    pub fn statistics(&self) -> HuntStatistics {
        let mut stats = self.stats.lock().clone();
        stats.is_hunting = self.flags.is_running();
        stats.is_paused = self.flags.is_paused();
        stats
    }

    fn reap_worker(&mut self) {
        if let Some(handle) = &self.worker {
            if handle.is_finished() {
                if let Some(handle) = self.worker.take() {
                    let _ = handle.join();
                }
            }
        }
    }
}

impl Drop for HuntOrchestrator {
    fn drop(&mut self) {
        if self.flags.is_running() {
            self.stop();
        }
    }
}

struct WorkerCtx {
    engine: Arc<Mutex<Collaborators>>,
    config: HuntConfig,
    macro_events: Option<Vec<MacroEvent>>,
    flags: ControlFlags,
    stats: Arc<Mutex<HuntStatistics>>,
    callbacks: Callbacks,
    from_current: bool,
}

fn worker_main(ctx: WorkerCtx) {
    let outcome = catch_unwind(AssertUnwindSafe(|| run_session(&ctx)));

    let reason = match outcome {
        Ok(Ok(())) => String::new(),
        Ok(Err(e)) => {
            error!("session ended with error: {e}");
            ctx.callbacks.emit(StatusEvent::Error(e.to_string()));
            e.to_string()
        }
        Err(_) => {
            error!("worker panicked; releasing keys and stopping");
            release_all_best_effort(&ctx);
            ctx.callbacks.emit(StatusEvent::Error("internal worker failure".into()));
            "internal worker failure".into()
        }
    };

    ctx.flags.running.store(false, Ordering::Relaxed);
    ctx.flags.paused.store(false, Ordering::Relaxed);
    {
        let mut stats = ctx.stats.lock();
        stats.is_hunting = false;
        stats.is_paused = false;
        stats.phase = Phase::Stopped;
    }
    ctx.callbacks.emit(StatusEvent::Stopped { reason });
}

/// Last-ditch key release when the loop did not unwind cleanly.
fn release_all_best_effort(ctx: &WorkerCtx) {
    let engine = ctx.engine.lock();
    let mut actuator = engine.actuator.lock();
    for key in ctx
        .config
        .movement
        .direction_keys
        .iter()
        .copied()
        .chain([ESCAPE_HOLD_KEY])
    {
        let _ = actuator.release_key(Key(key));
    }
}

fn run_session(ctx: &WorkerCtx) -> Result<(), HuntError> {
    let mut engine = ctx.engine.lock();
    let engine = &mut *engine;
    let mut session = HuntSession::new();

    publish(ctx, &session);
    ctx.callbacks.emit(StatusEvent::Started);

    if ctx.from_current {
        if !interruptible_sleep(INITIAL_FOCUS_DELAY, &ctx.flags).completed() {
            return Ok(());
        }
    } else if let Some(events) = &ctx.macro_events {
        set_phase(ctx, &mut session, Phase::Repositioning);
        if reposition(ctx, engine, events)? == WaitOutcome::Interrupted {
            return Ok(());
        }
    }

    let mut last_stuck_check = Instant::now();

    loop {
        if ctx.flags.is_cancelled() {
            return Ok(());
        }
        if ctx.flags.is_paused() {
            publish(ctx, &session);
            if !park_while_paused(&ctx.flags).completed() {
                return Ok(());
            }
        }

        if ctx.config.recovery.stuck_check_enabled
            && last_stuck_check.elapsed()
                >= Duration::from_secs_f64(ctx.config.recovery.stuck_check_interval)
        {
            last_stuck_check = Instant::now();
            if check_stuck(ctx, engine, &mut session)? == WaitOutcome::Interrupted {
                return Ok(());
            }
        }

        if movement_step(ctx, engine, &mut session)? == WaitOutcome::Interrupted {
            return Ok(());
        }

        // Config from disk is clamped, but a caller-built config may not be.
        let batch = u64::from(ctx.config.movement.check_batch_size.max(1));
        if session.moves % batch != 0 {
            continue;
        }

        if encounter_check(ctx, engine, &mut session)? == WaitOutcome::Interrupted {
            return Ok(());
        }
    }
}

/// One movement: hold the next direction key, then pause. The key is
/// released even when the hold is interrupted.
fn movement_step(
    ctx: &WorkerCtx,
    engine: &mut Collaborators,
    session: &mut HuntSession,
) -> Result<WaitOutcome, HuntError> {
    set_phase(ctx, session, Phase::Moving);
    let cfg = &ctx.config.movement;
    let key = Key(cfg.direction_keys[(session.moves % 2) as usize]);

    if let Err(e) = engine.actuator.lock().press_key(key) {
        warn!("{}", HuntError::ActuationFailure(format!("{e:#}")));
    }
    let hold = interruptible_sleep(Duration::from_secs_f64(cfg.key_hold_duration), &ctx.flags);
    if let Err(e) = engine.actuator.lock().release_key(key) {
        warn!("{}", HuntError::ActuationFailure(format!("{e:#}")));
    }
    if !hold.completed() {
        return Ok(WaitOutcome::Interrupted);
    }

    if !interruptible_sleep(Duration::from_secs_f64(cfg.move_pause), &ctx.flags).completed() {
        return Ok(WaitOutcome::Interrupted);
    }
    session.moves += 1;
    publish(ctx, session);
    Ok(WaitOutcome::Completed)
}

/// Settle, look for the response menu (with pre-transition gating and a
/// confirming re-capture), then run the battle branch.
fn encounter_check(
    ctx: &WorkerCtx,
    engine: &mut Collaborators,
    session: &mut HuntSession,
) -> Result<WaitOutcome, HuntError> {
    set_phase(ctx, session, Phase::Checking);

    let settle = Duration::from_secs_f64(ctx.config.response.settle_delay);
    if !interruptible_sleep(settle, &ctx.flags).completed() {
        return Ok(WaitOutcome::Interrupted);
    }

    let Some(frame) = engine.source.capture_full_area() else {
        warn!("{}", HuntError::PerceptionUnavailable("frame capture failed".into()));
        ctx.callbacks
            .emit(StatusEvent::Warning("cannot capture target window".into()));
        return Ok(WaitOutcome::Completed);
    };

    let frame = if engine.detector.pre_transition_visible(&frame) {
        debug!("pre-transition marker visible, extra settle");
        let extra = Duration::from_secs_f64(ctx.config.response.pre_transition_settle);
        if !interruptible_sleep(extra, &ctx.flags).completed() {
            return Ok(WaitOutcome::Interrupted);
        }
        // The menu renders during the transition; judge it on a frame taken
        // after the settle, not the one that showed the marker.
        match engine.source.capture_full_area() {
            Some(fresh) => fresh,
            None => return Ok(WaitOutcome::Completed),
        }
    } else {
        frame
    };

    if !engine.detector.response_menu_visible(&frame) {
        return Ok(WaitOutcome::Completed);
    }

    // A stale frame must not trigger battle input; confirm on a fresh one.
    let Some(confirm) = engine.source.capture_full_area() else {
        return Ok(WaitOutcome::Completed);
    };
    if !engine.detector.response_menu_visible(&confirm) {
        debug!("menu not confirmed on re-capture");
        return Ok(WaitOutcome::Completed);
    }

    battle(ctx, engine, session, &confirm)
}

fn battle(
    ctx: &WorkerCtx,
    engine: &mut Collaborators,
    session: &mut HuntSession,
    frame: &crate::capture::Frame,
) -> Result<WaitOutcome, HuntError> {
    set_phase(ctx, session, Phase::Battling);

    let classification = match engine.classifier.classify(frame, &ctx.config.roster) {
        Ok(c) => c,
        Err(e) => {
            warn!("{}", HuntError::DetectionAmbiguous(format!("{e:#}")));
            EncounterClassification::unknown_empty()
        }
    };
    info!(kind = ?classification.kind, subjects = ?classification.subjects, "encounter");
    ctx.callbacks.emit(StatusEvent::Encounter(classification.clone()));

    let cfg = &ctx.config.response;
    match response_plan(&classification) {
        ResponsePlan::Ordinary => {
            for _ in 0..cfg.action_repeats {
                tap_best_effort(engine, Key(cfg.action_key));
                let interval = Duration::from_secs_f64(cfg.action_interval);
                if !interruptible_sleep(interval, &ctx.flags).completed() {
                    return Ok(WaitOutcome::Interrupted);
                }
            }
            let settle = Duration::from_secs_f64(cfg.settle_delay);
            if !interruptible_sleep(settle, &ctx.flags).completed() {
                return Ok(WaitOutcome::Interrupted);
            }
        }
        ResponsePlan::Duplicated => {
            for key in cfg.duplicated_keys {
                tap_best_effort(engine, Key(key));
                let interval = Duration::from_secs_f64(cfg.action_interval);
                if !interruptible_sleep(interval, &ctx.flags).completed() {
                    return Ok(WaitOutcome::Interrupted);
                }
            }
            let settle = Duration::from_secs_f64(cfg.duplicated_settle_delay);
            if !interruptible_sleep(settle, &ctx.flags).completed() {
                return Ok(WaitOutcome::Interrupted);
            }
        }
        ResponsePlan::SpecialPause => {
            set_phase(ctx, session, Phase::SpecialPaused);
            ctx.flags.paused.store(true, Ordering::Relaxed);
            ctx.callbacks
                .emit(StatusEvent::SpecialEncounter(classification));
            publish(ctx, session);
            return Ok(WaitOutcome::Completed);
        }
    }

    session.total_encounters += 1;
    session.cycle_encounters += 1;
    publish(ctx, session);

    if session.cycle_encounters >= ctx.config.recovery.encounters_per_cycle {
        return heal_cycle(ctx, engine, session);
    }
    Ok(WaitOutcome::Completed)
}

/// Heal, then replay the repositioning macro when one is configured.
/// Resets the cycle-encounter counter on success.
fn heal_cycle(
    ctx: &WorkerCtx,
    engine: &mut Collaborators,
    session: &mut HuntSession,
) -> Result<WaitOutcome, HuntError> {
    set_phase(ctx, session, Phase::Healing);
    tap_best_effort(engine, Key(ctx.config.recovery.heal_key));
    let delay = Duration::from_secs_f64(ctx.config.recovery.heal_delay);
    if !interruptible_sleep(delay, &ctx.flags).completed() {
        return Ok(WaitOutcome::Interrupted);
    }

    if let Some(events) = &ctx.macro_events {
        set_phase(ctx, session, Phase::Repositioning);
        if reposition(ctx, engine, events)? == WaitOutcome::Interrupted {
            return Ok(WaitOutcome::Interrupted);
        }
    }

    session.cycle_encounters = 0;
    session.heal_cycles += 1;
    publish(ctx, session);
    Ok(WaitOutcome::Completed)
}

/// Play the repositioning macro, waiting interruptibly for its completion
/// report. Anything other than a completed playback is a `MacroFailure`.
fn reposition(
    ctx: &WorkerCtx,
    engine: &mut Collaborators,
    events: &[MacroEvent],
) -> Result<WaitOutcome, HuntError> {
    let timeout = Duration::from_secs_f64(ctx.config.recovery.macro_timeout);
    let rx = playback::spawn(
        Arc::clone(&engine.actuator),
        events.to_vec(),
        ctx.config.recovery.macro_speed,
        1,
        timeout,
        Arc::clone(&ctx.flags.cancel),
    );

    // The playback thread observes the same cancel flag, so a stop request
    // surfaces here as a Cancelled report rather than a hung recv.
    let deadline = Instant::now() + timeout + Duration::from_secs(2);
    loop {
        match rx.recv_timeout(Duration::from_millis(100)) {
            Ok(Ok(PlaybackOutcome::Completed)) => return Ok(WaitOutcome::Completed),
            Ok(Ok(PlaybackOutcome::Cancelled)) => return Ok(WaitOutcome::Interrupted),
            Ok(Ok(PlaybackOutcome::TimedOut)) => {
                return Err(HuntError::MacroFailure("repositioning macro timed out".into()));
            }
            Ok(Err(e)) => {
                return Err(HuntError::MacroFailure(format!(
                    "repositioning macro failed: {e:#}"
                )));
            }
            Err(_) if Instant::now() >= deadline => {
                return Err(HuntError::MacroFailure(
                    "repositioning macro never reported completion".into(),
                ));
            }
            Err(_) => continue,
        }
    }
}

/// Periodic stuck-dialog detection with debounce and the escape sequence.
/// Exhausted recovery is fatal.
fn check_stuck(
    ctx: &WorkerCtx,
    engine: &mut Collaborators,
    session: &mut HuntSession,
) -> Result<WaitOutcome, HuntError> {
    let Some(frame) = engine.source.capture_full_area() else {
        return Ok(WaitOutcome::Completed);
    };
    if !engine.detector.blocking_dialog_visible(&frame) {
        return Ok(WaitOutcome::Completed);
    }

    set_phase(ctx, session, Phase::Recovering);
    ctx.callbacks.emit(StatusEvent::StuckDetected);
    info!("blocking dialog suspected, debouncing");

    if !interruptible_sleep(STUCK_DEBOUNCE, &ctx.flags).completed() {
        return Ok(WaitOutcome::Interrupted);
    }
    let Some(frame) = engine.source.capture_full_area() else {
        return Ok(WaitOutcome::Completed);
    };
    if !engine.detector.blocking_dialog_visible(&frame) {
        debug!("dialog cleared on its own");
        return Ok(WaitOutcome::Completed);
    }

    // Escape: hold one key to walk out of the dialog trigger while tapping
    // the interact key to dismiss it.
    if let Err(e) = engine.actuator.lock().press_key(Key(ESCAPE_HOLD_KEY)) {
        warn!("{}", HuntError::ActuationFailure(format!("{e:#}")));
    }
    for _ in 0..ESCAPE_TAPS {
        tap_best_effort(engine, Key(ESCAPE_TAP_KEY));
        if !interruptible_sleep(ESCAPE_TAP_INTERVAL, &ctx.flags).completed() {
            let _ = engine.actuator.lock().release_key(Key(ESCAPE_HOLD_KEY));
            return Ok(WaitOutcome::Interrupted);
        }
    }
    if let Err(e) = engine.actuator.lock().release_key(Key(ESCAPE_HOLD_KEY)) {
        warn!("{}", HuntError::ActuationFailure(format!("{e:#}")));
    }

    if !interruptible_sleep(Duration::from_secs(1), &ctx.flags).completed() {
        return Ok(WaitOutcome::Interrupted);
    }
    match engine.source.capture_full_area() {
        Some(frame) if engine.detector.blocking_dialog_visible(&frame) => {
            Err(HuntError::StuckState("escape sequence did not clear the dialog".into()))
        }
        _ => {
            info!("stuck dialog cleared, healing and repositioning");
            ctx.callbacks.emit(StatusEvent::StuckRecovered);
            heal_cycle(ctx, engine, session)
        }
    }
}

fn tap_best_effort(engine: &mut Collaborators, key: Key) {
    if let Err(e) = engine.actuator.lock().tap_key(key) {
        warn!("{}", HuntError::ActuationFailure(format!("{e:#}")));
    }
}

fn set_phase(ctx: &WorkerCtx, session: &mut HuntSession, phase: Phase) {
    if session.phase != phase {
        session.phase = phase;
        ctx.callbacks.emit(StatusEvent::PhaseChanged(phase));
        publish(ctx, session);
    }
}

fn publish(ctx: &WorkerCtx, session: &HuntSession) {
    *ctx.stats.lock() = session.snapshot(
        ctx.flags.is_running() && !ctx.flags.is_cancelled(),
        ctx.flags.is_paused(),
    );
}
