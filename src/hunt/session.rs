//! Session state and its read-only snapshot

use std::time::{Duration, Instant};

/// Where the worker currently is in the hunt cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Moving,
    Checking,
    Battling,
    SpecialPaused,
    Healing,
    Repositioning,
    Recovering,
    Stopped,
}

/// Mutable run state, owned by the worker thread.
#[derive(Debug)]
pub struct HuntSession {
    pub phase: Phase,
    pub moves: u64,
    pub cycle_encounters: u32,
    pub total_encounters: u64,
    pub heal_cycles: u64,
    pub started_at: Instant,
}

impl HuntSession {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            moves: 0,
            cycle_encounters: 0,
            total_encounters: 0,
            heal_cycles: 0,
            started_at: Instant::now(),
        }
    }

    pub fn snapshot(&self, is_hunting: bool, is_paused: bool) -> HuntStatistics {
        HuntStatistics {
            is_hunting,
            is_paused,
            phase: self.phase,
            moves: self.moves,
            cycle_encounters: self.cycle_encounters,
            total_encounters: self.total_encounters,
            heal_cycles: self.heal_cycles,
            elapsed: self.started_at.elapsed(),
        }
    }
}

impl Default for HuntSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only snapshot for the control thread.
#[derive(Debug, Clone)]
pub struct HuntStatistics {
    pub is_hunting: bool,
    pub is_paused: bool,
    pub phase: Phase,
    pub moves: u64,
    pub cycle_encounters: u32,
    pub total_encounters: u64,
    pub heal_cycles: u64,
    pub elapsed: Duration,
}

impl HuntStatistics {
    pub fn idle() -> Self {
        Self {
            is_hunting: false,
            is_paused: false,
            phase: Phase::Idle,
            moves: 0,
            cycle_encounters: 0,
            total_encounters: 0,
            heal_cycles: 0,
            elapsed: Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let mut session = HuntSession::new();
        session.moves = 42;
        session.total_encounters = 7;
        session.cycle_encounters = 3;
        session.phase = Phase::Checking;

        let stats = session.snapshot(true, false);
        assert!(stats.is_hunting);
        assert_eq!(stats.moves, 42);
        assert_eq!(stats.total_encounters, 7);
        assert_eq!(stats.cycle_encounters, 3);
        assert_eq!(stats.phase, Phase::Checking);
    }
}
