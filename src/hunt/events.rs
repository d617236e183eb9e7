//! Status events emitted by the worker

use std::sync::Arc;

use crate::hunt::session::Phase;
use crate::vision::classifier::EncounterClassification;

/// Everything the worker reports back to the operator surface.
#[derive(Debug, Clone)]
pub enum StatusEvent {
    Started,
    Paused,
    Resumed,
    /// Session ended; `reason` is empty for a clean operator stop.
    Stopped { reason: String },
    PhaseChanged(Phase),
    Encounter(EncounterClassification),
    /// Flagged or off-roster encounter; session is paused for review.
    SpecialEncounter(EncounterClassification),
    StuckDetected,
    StuckRecovered,
    Warning(String),
    Error(String),
}

pub type StatusCallback = Arc<dyn Fn(&StatusEvent) + Send + Sync>;
pub type SpecialCallback = Arc<dyn Fn(&EncounterClassification) + Send + Sync>;

/// Registered callbacks, cloned into the worker on start.
#[derive(Clone, Default)]
pub struct Callbacks {
    pub on_status: Option<StatusCallback>,
    pub on_special: Option<SpecialCallback>,
}

impl Callbacks {
    pub fn emit(&self, event: StatusEvent) {
        if let Some(cb) = &self.on_status {
            cb(&event);
        }
        if let StatusEvent::SpecialEncounter(c) = &event {
            if let Some(cb) = &self.on_special {
                cb(c);
            }
        }
    }
}
