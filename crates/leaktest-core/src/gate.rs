//! Serialized, safety-checked actuator access.
//!
//! Every actuator write in the system flows through a `ValveGate`. The gate
//! owns the actuator outright, so writes are serialized by construction,
//! and it is the sole enforcer of the two hardware-protection rules:
//! a chamber's inlet and outlet are never open together, and an inlet only
//! opens after a both-closed dead time guarantees the outlet has seated.

use crate::config::VALVE_DEAD_TIME_MS;
use leaktest_hal::{ActuatorError, Clock, ValveActuator, ValveState, CHAMBER_COUNT};

pub struct ValveGate<V: ValveActuator> {
    actuator: V,
    states: [ValveState; CHAMBER_COUNT],
}

impl<V: ValveActuator> ValveGate<V> {
    pub fn new(actuator: V) -> Self {
        Self {
            actuator,
            states: [ValveState::CLOSED; CHAMBER_COUNT],
        }
    }

    /// Last state successfully written for a chamber.
    pub fn state(&self, chamber: usize) -> ValveState {
        self.states[chamber]
    }

    /// Drive one chamber's solenoid pair.
    ///
    /// A command with both valves open is downgraded to outlet-only with a
    /// warning. Opening an inlet from a closed-inlet state first drives
    /// both valves closed and waits out the dead time. On an actuator
    /// error the gate tries to close both valves before reporting.
    pub fn set(
        &mut self,
        clock: &mut impl Clock,
        chamber: usize,
        inlet_open: bool,
        outlet_open: bool,
    ) -> Result<(), ActuatorError> {
        let mut inlet_open = inlet_open;
        if inlet_open && outlet_open {
            log::warn!(
                "chamber {}: refused command to open inlet and outlet together",
                chamber + 1
            );
            inlet_open = false;
        }

        let requested = ValveState {
            inlet_open,
            outlet_open,
        };
        if self.states[chamber] == requested {
            return Ok(());
        }

        if inlet_open && !self.states[chamber].inlet_open {
            self.write(chamber, ValveState::CLOSED)?;
            clock.sleep_ms(VALVE_DEAD_TIME_MS);
        }
        self.write(chamber, requested)
    }

    /// Drive every chamber to both-closed. Attempts all chambers even after
    /// a failure and reports the first error. Safe to call repeatedly and
    /// on any error path.
    pub fn close_all(&mut self) -> Result<(), ActuatorError> {
        let mut first_error = None;
        for chamber in 0..CHAMBER_COUNT {
            match self.actuator.set_chamber_valves(chamber, false, false) {
                Ok(()) => self.states[chamber] = ValveState::CLOSED,
                Err(e) => {
                    log::error!("chamber {}: failed to close valves: {}", chamber + 1, e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        match first_error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    pub fn into_inner(self) -> V {
        self.actuator
    }

    fn write(&mut self, chamber: usize, state: ValveState) -> Result<(), ActuatorError> {
        match self
            .actuator
            .set_chamber_valves(chamber, state.inlet_open, state.outlet_open)
        {
            Ok(()) => {
                self.states[chamber] = state;
                Ok(())
            }
            Err(e) => {
                log::error!("chamber {}: valve write failed: {}", chamber + 1, e);
                if self
                    .actuator
                    .set_chamber_valves(chamber, false, false)
                    .is_ok()
                {
                    self.states[chamber] = ValveState::CLOSED;
                }
                Err(e)
            }
        }
    }
}

/// Best-effort both-closed sweep through a bare actuator, for shutdown
/// paths that have no gate instance at hand.
pub fn close_all_valves(actuator: &mut impl ValveActuator) -> Result<(), ActuatorError> {
    let mut first_error = None;
    for chamber in 0..CHAMBER_COUNT {
        if let Err(e) = actuator.set_chamber_valves(chamber, false, false) {
            log::error!("chamber {}: failed to close valves: {}", chamber + 1, e);
            if first_error.is_none() {
                first_error = Some(e);
            }
        }
    }
    match first_error {
        None => Ok(()),
        Some(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leaktest_hal::{MockClock, SimRig};

    #[test]
    fn both_open_command_is_downgraded() {
        let mut clock = MockClock::new();
        let rig = SimRig::new(clock.clone());
        let mut gate = ValveGate::new(rig.valve_actuator());

        gate.set(&mut clock, 0, true, true).unwrap();
        let state = rig.valve_state(0);
        assert!(!state.inlet_open);
        assert!(state.outlet_open);
    }

    #[test]
    fn inlet_opening_respects_dead_time() {
        let mut clock = MockClock::new();
        let rig = SimRig::new(clock.clone());
        let mut gate = ValveGate::new(rig.valve_actuator());

        gate.set(&mut clock, 1, false, true).unwrap();
        gate.set(&mut clock, 1, true, false).unwrap();

        let writes = rig.writes();
        // outlet open, both closed, dead time, inlet open.
        assert_eq!(writes.len(), 3);
        assert!(writes[1].state.is_closed());
        assert!(writes[2].state.inlet_open);
        assert!(writes[2].at_ms - writes[1].at_ms >= VALVE_DEAD_TIME_MS);
    }

    #[test]
    fn repeated_identical_commands_write_once() {
        let mut clock = MockClock::new();
        let rig = SimRig::new(clock.clone());
        let mut gate = ValveGate::new(rig.valve_actuator());

        gate.set(&mut clock, 0, true, false).unwrap();
        let writes_after_first = rig.writes().len();
        gate.set(&mut clock, 0, true, false).unwrap();
        gate.set(&mut clock, 0, true, false).unwrap();
        assert_eq!(rig.writes().len(), writes_after_first);
    }

    #[test]
    fn write_failure_closes_both_valves() {
        let mut clock = MockClock::new();
        let rig = SimRig::new(clock.clone());
        let mut gate = ValveGate::new(rig.valve_actuator());

        gate.set(&mut clock, 2, false, true).unwrap();
        rig.fail_next_valve_writes(2, 1);
        assert!(gate.set(&mut clock, 2, false, false).is_err());
        // The recovery write landed.
        assert!(rig.valve_state(2).is_closed());
        assert!(gate.state(2).is_closed());
    }

    #[test]
    fn close_all_sweeps_every_chamber_despite_errors() {
        let mut clock = MockClock::new();
        let rig = SimRig::new(clock.clone());
        let mut gate = ValveGate::new(rig.valve_actuator());

        for chamber in 0..CHAMBER_COUNT {
            gate.set(&mut clock, chamber, false, true).unwrap();
        }
        rig.fail_next_valve_writes(0, 1);
        assert!(gate.close_all().is_err());
        // The other chambers still closed.
        assert!(rig.valve_state(1).is_closed());
        assert!(rig.valve_state(2).is_closed());
        // A second sweep is safe and closes the straggler.
        assert!(gate.close_all().is_ok());
        assert!(rig.valve_state(0).is_closed());
    }
}
