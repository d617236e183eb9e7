//! Session error taxonomy
//!
//! Only `MacroFailure` and `StuckState` terminate a session; everything
//! else is degraded-but-running and surfaces through status events.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HuntError {
    /// Frame capture failed; retry on the next tick, no state change.
    #[error("perception unavailable: {0}")]
    PerceptionUnavailable(String),

    /// Signals disagree or OCR produced nothing usable.
    #[error("detection ambiguous: {0}")]
    DetectionAmbiguous(String),

    /// An input injection call failed; the phase continues best-effort.
    #[error("actuation failure: {0}")]
    ActuationFailure(String),

    /// Repositioning macro missing, unloadable or timed out. Fatal.
    #[error("macro failure: {0}")]
    MacroFailure(String),

    /// Blocking-dialog recovery exhausted. Fatal.
    #[error("stuck state: {0}")]
    StuckState(String),
}
