//! Run and chamber state enumerations plus the observer-facing snapshot.

use serde::{Deserialize, Serialize};

use leaktest_hal::CHAMBER_COUNT;

/// Per-chamber test phase.
///
/// Transitions are monotonic along the declared order, except for the
/// emergency jump into `Emptying` that any abort path takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ChamberPhase {
    Idle,
    Filling,
    Regulating,
    Stabilizing,
    Testing,
    Emptying,
    Complete,
}

impl ChamberPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, ChamberPhase::Complete)
    }

    /// Whether a transition to `next` respects phase monotonicity.
    pub fn may_advance_to(self, next: ChamberPhase) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == ChamberPhase::Emptying {
            // Emergency venting is reachable from any non-terminal phase.
            return true;
        }
        next > self
    }

    pub fn label(self) -> &'static str {
        match self {
            ChamberPhase::Idle => "idle",
            ChamberPhase::Filling => "filling",
            ChamberPhase::Regulating => "regulating",
            ChamberPhase::Stabilizing => "stabilizing",
            ChamberPhase::Testing => "testing",
            ChamberPhase::Emptying => "emptying",
            ChamberPhase::Complete => "complete",
        }
    }
}

/// Regulation activity reported per chamber while in the Regulating phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RegulationMode {
    #[default]
    Idle,
    Filling,
    Venting,
    Stable,
}

/// Engine-level run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    Idle,
    Filling,
    Regulating,
    Stabilizing,
    Testing,
    Emptying,
    Complete,
    Error,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Complete | RunState::Error)
    }

    pub fn label(self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Filling => "filling",
            RunState::Regulating => "regulating",
            RunState::Stabilizing => "stabilizing",
            RunState::Testing => "testing",
            RunState::Emptying => "emptying",
            RunState::Complete => "complete",
            RunState::Error => "error",
        }
    }
}

/// Per-chamber slice of a status snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct ChamberStatus {
    pub enabled: bool,
    pub phase: ChamberPhase,
    pub pressure_mbar: f32,
    pub regulation_mode: RegulationMode,
}

impl ChamberStatus {
    fn idle() -> Self {
        Self {
            enabled: false,
            phase: ChamberPhase::Idle,
            pressure_mbar: 0.0,
            regulation_mode: RegulationMode::Idle,
        }
    }
}

/// Non-blocking view of a run, handed to observers by value.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub state: RunState,
    /// Human-readable description of the current activity.
    pub detail: String,
    pub elapsed_ms: u64,
    /// Progress through the current phase, 0.0-1.0.
    pub progress: f32,
    pub chambers: [ChamberStatus; CHAMBER_COUNT],
}

impl StatusSnapshot {
    pub fn idle() -> Self {
        Self {
            state: RunState::Idle,
            detail: String::from("Ready"),
            elapsed_ms: 0,
            progress: 0.0,
            chambers: std::array::from_fn(|_| ChamberStatus::idle()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phases_advance_monotonically() {
        assert!(ChamberPhase::Idle.may_advance_to(ChamberPhase::Filling));
        assert!(ChamberPhase::Filling.may_advance_to(ChamberPhase::Regulating));
        assert!(ChamberPhase::Emptying.may_advance_to(ChamberPhase::Complete));
        assert!(!ChamberPhase::Regulating.may_advance_to(ChamberPhase::Filling));
        assert!(!ChamberPhase::Testing.may_advance_to(ChamberPhase::Testing));
    }

    #[test]
    fn emergency_emptying_from_any_active_phase() {
        for phase in [
            ChamberPhase::Idle,
            ChamberPhase::Filling,
            ChamberPhase::Regulating,
            ChamberPhase::Stabilizing,
            ChamberPhase::Testing,
        ] {
            assert!(phase.may_advance_to(ChamberPhase::Emptying));
        }
    }

    #[test]
    fn complete_is_frozen() {
        assert!(!ChamberPhase::Complete.may_advance_to(ChamberPhase::Emptying));
        assert!(!ChamberPhase::Complete.may_advance_to(ChamberPhase::Complete));
    }

    #[test]
    fn terminal_run_states() {
        assert!(RunState::Complete.is_terminal());
        assert!(RunState::Error.is_terminal());
        assert!(!RunState::Emptying.is_terminal());
    }
}
