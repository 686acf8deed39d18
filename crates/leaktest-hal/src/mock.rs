//! Simulated rig and mock clock for testing without hardware.
//!
//! `SimRig` models the pneumatics of the three-chamber fixture: pressure
//! integrates over simulated time according to the commanded valve states,
//! a configurable fill/vent/leak rate per chamber, and optional fault
//! injection. Both capability handles (`PressureSource`, `ValveActuator`)
//! share one rig, so the physics always reflect the latest valve commands.

use std::sync::{Arc, Mutex};

use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

use crate::error::{ActuatorError, SensorError};
use crate::traits::{Clock, PressureSource, ValveActuator};
use crate::types::{ValveState, CHAMBER_COUNT};

/// Shared, manually-advanced clock.
///
/// `sleep_until_ms` jumps simulated time forward instead of blocking, so a
/// whole test run executes in microseconds of real time while remaining
/// fully deterministic.
#[derive(Clone)]
pub struct MockClock {
    now_ms: Arc<Mutex<u64>>,
}

impl MockClock {
    pub fn new() -> Self {
        Self {
            now_ms: Arc::new(Mutex::new(0)),
        }
    }

    /// Advance simulated time without sleeping.
    pub fn advance_ms(&self, ms: u64) {
        let mut now = self.now_ms.lock().unwrap();
        *now += ms;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        *self.now_ms.lock().unwrap()
    }

    fn sleep_until_ms(&mut self, deadline_ms: u64) {
        let mut now = self.now_ms.lock().unwrap();
        if deadline_ms > *now {
            *now = deadline_ms;
        }
    }

    fn wall_timestamp(&self) -> String {
        let stamp = OffsetDateTime::UNIX_EPOCH + Duration::milliseconds(self.now_ms() as i64);
        stamp
            .format(&Rfc3339)
            .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
    }
}

/// Static pneumatic parameters for a simulated rig.
#[derive(Debug, Clone, Copy)]
pub struct SimRigConfig {
    /// Pressure gain in mbar/s while a chamber's inlet is open.
    pub fill_rate: f32,
    /// Pressure loss in mbar/s while a chamber's outlet is open.
    pub vent_rate: f32,
    /// Continuous pressure loss in mbar/s per chamber.
    pub leak_rate: [f32; CHAMBER_COUNT],
}

impl Default for SimRigConfig {
    fn default() -> Self {
        Self {
            fill_rate: 30.0,
            vent_rate: 60.0,
            leak_rate: [0.0; CHAMBER_COUNT],
        }
    }
}

/// One successful actuator write, as observed by the simulated hardware.
#[derive(Debug, Clone, Copy)]
pub struct ValveWrite {
    pub at_ms: u64,
    pub chamber: usize,
    pub state: ValveState,
}

struct SimChamber {
    pressure: f32,
    valves: ValveState,
    fill_rate: f32,
    vent_rate: f32,
    leak_rate: f32,
}

struct ScheduledEvent {
    at_ms: u64,
    action: Box<dyn FnOnce() + Send>,
}

struct SimState {
    chambers: [SimChamber; CHAMBER_COUNT],
    last_integration_ms: u64,
    writes: Vec<ValveWrite>,
    events: Vec<ScheduledEvent>,
    fail_reads_from_ms: Option<u64>,
    fail_next_reads: u32,
    forced_readings: [Option<f32>; CHAMBER_COUNT],
    fail_next_valve_writes: [u32; CHAMBER_COUNT],
}

impl SimState {
    /// Advance the pneumatics to `now` under the current valve states.
    fn integrate(&mut self, now_ms: u64) {
        let dt_s = now_ms.saturating_sub(self.last_integration_ms) as f32 / 1000.0;
        if dt_s > 0.0 {
            for chamber in &mut self.chambers {
                if chamber.valves.inlet_open {
                    chamber.pressure += chamber.fill_rate * dt_s;
                }
                if chamber.valves.outlet_open {
                    chamber.pressure -= chamber.vent_rate * dt_s;
                }
                chamber.pressure -= chamber.leak_rate * dt_s;
                chamber.pressure = chamber.pressure.max(0.0);
            }
        }
        self.last_integration_ms = now_ms;
    }
}

/// Simulated three-chamber fixture.
#[derive(Clone)]
pub struct SimRig {
    state: Arc<Mutex<SimState>>,
    clock: MockClock,
}

impl SimRig {
    pub fn new(clock: MockClock) -> Self {
        Self::with_config(clock, SimRigConfig::default())
    }

    pub fn with_config(clock: MockClock, config: SimRigConfig) -> Self {
        let chambers = std::array::from_fn(|i| SimChamber {
            pressure: 0.0,
            valves: ValveState::CLOSED,
            fill_rate: config.fill_rate,
            vent_rate: config.vent_rate,
            leak_rate: config.leak_rate[i],
        });
        let state = SimState {
            chambers,
            last_integration_ms: clock.now_ms(),
            writes: Vec::new(),
            events: Vec::new(),
            fail_reads_from_ms: None,
            fail_next_reads: 0,
            forced_readings: [None; CHAMBER_COUNT],
            fail_next_valve_writes: [0; CHAMBER_COUNT],
        };
        Self {
            state: Arc::new(Mutex::new(state)),
            clock,
        }
    }

    /// Pressure-source capability handle onto this rig.
    pub fn pressure_source(&self) -> SimPressure {
        SimPressure {
            state: Arc::clone(&self.state),
            clock: self.clock.clone(),
        }
    }

    /// Valve-actuator capability handle onto this rig.
    pub fn valve_actuator(&self) -> SimValves {
        SimValves {
            state: Arc::clone(&self.state),
            clock: self.clock.clone(),
        }
    }

    /// Current chamber pressure after integrating up to now.
    pub fn pressure_of(&self, chamber: usize) -> f32 {
        let mut state = self.state.lock().unwrap();
        state.integrate(self.clock.now_ms());
        state.chambers[chamber].pressure
    }

    pub fn set_pressure(&self, chamber: usize, mbar: f32) {
        let mut state = self.state.lock().unwrap();
        state.integrate(self.clock.now_ms());
        state.chambers[chamber].pressure = mbar;
    }

    pub fn set_leak_rate(&self, chamber: usize, mbar_per_s: f32) {
        let mut state = self.state.lock().unwrap();
        state.integrate(self.clock.now_ms());
        state.chambers[chamber].leak_rate = mbar_per_s;
    }

    pub fn set_fill_rate(&self, chamber: usize, mbar_per_s: f32) {
        let mut state = self.state.lock().unwrap();
        state.integrate(self.clock.now_ms());
        state.chambers[chamber].fill_rate = mbar_per_s;
    }

    /// Run an action once simulated time reaches `at_ms`. Events fire on the
    /// next capability access at or after their due time, outside the rig
    /// lock, so they may call back into the rig or into engine handles.
    pub fn schedule(&self, at_ms: u64, action: impl FnOnce() + Send + 'static) {
        let mut state = self.state.lock().unwrap();
        state.events.push(ScheduledEvent {
            at_ms,
            action: Box::new(action),
        });
    }

    /// Every read from `at_ms` onward fails.
    pub fn fail_reads_from(&self, at_ms: u64) {
        self.state.lock().unwrap().fail_reads_from_ms = Some(at_ms);
    }

    /// The next `n` reads fail, then reads recover.
    pub fn fail_next_reads(&self, n: u32) {
        self.state.lock().unwrap().fail_next_reads = n;
    }

    /// Override the reported value for one chamber (e.g. an implausible
    /// reading); `None` restores the physical value.
    pub fn force_reading(&self, chamber: usize, mbar: Option<f32>) {
        self.state.lock().unwrap().forced_readings[chamber] = mbar;
    }

    /// The next `n` valve writes for `chamber` fail.
    pub fn fail_next_valve_writes(&self, chamber: usize, n: u32) {
        self.state.lock().unwrap().fail_next_valve_writes[chamber] = n;
    }

    /// Log of every successful actuator write, in arrival order.
    pub fn writes(&self) -> Vec<ValveWrite> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn valve_state(&self, chamber: usize) -> ValveState {
        self.state.lock().unwrap().chambers[chamber].valves
    }
}

fn fire_due_events(state: &Arc<Mutex<SimState>>, now_ms: u64) {
    let due: Vec<ScheduledEvent> = {
        let mut state = state.lock().unwrap();
        let mut due = Vec::new();
        let mut i = 0;
        while i < state.events.len() {
            if state.events[i].at_ms <= now_ms {
                due.push(state.events.remove(i));
            } else {
                i += 1;
            }
        }
        due
    };
    for event in due {
        (event.action)();
    }
}

/// Pressure-source half of a [`SimRig`].
pub struct SimPressure {
    state: Arc<Mutex<SimState>>,
    clock: MockClock,
}

impl PressureSource for SimPressure {
    fn read_all(&mut self) -> Result<[f32; CHAMBER_COUNT], SensorError> {
        let now = self.clock.now_ms();
        fire_due_events(&self.state, now);

        let mut state = self.state.lock().unwrap();
        state.integrate(now);

        if state.fail_next_reads > 0 {
            state.fail_next_reads -= 1;
            return Err(SensorError::read_failed("injected read failure"));
        }
        if state.fail_reads_from_ms.is_some_and(|t| now >= t) {
            return Err(SensorError::read_failed("simulated sensor failure"));
        }

        let mut out = [0.0; CHAMBER_COUNT];
        for (i, chamber) in state.chambers.iter().enumerate() {
            out[i] = state.forced_readings[i].unwrap_or(chamber.pressure);
        }
        Ok(out)
    }
}

/// Valve-actuator half of a [`SimRig`].
pub struct SimValves {
    state: Arc<Mutex<SimState>>,
    clock: MockClock,
}

impl ValveActuator for SimValves {
    fn set_chamber_valves(
        &mut self,
        chamber: usize,
        inlet_open: bool,
        outlet_open: bool,
    ) -> Result<(), ActuatorError> {
        if chamber >= CHAMBER_COUNT {
            return Err(ActuatorError::NoSuchChamber(chamber));
        }
        let now = self.clock.now_ms();
        fire_due_events(&self.state, now);

        let mut state = self.state.lock().unwrap();
        // Account for time spent under the previous valve state before
        // switching.
        state.integrate(now);

        if state.fail_next_valve_writes[chamber] > 0 {
            state.fail_next_valve_writes[chamber] -= 1;
            return Err(ActuatorError::communication("injected driver fault"));
        }

        let valve_state = ValveState {
            inlet_open,
            outlet_open,
        };
        state.chambers[chamber].valves = valve_state;
        state.writes.push(ValveWrite {
            at_ms: now,
            chamber,
            state: valve_state,
        });
        log::trace!(
            "sim chamber {}: inlet={} outlet={}",
            chamber + 1,
            inlet_open,
            outlet_open
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_and_vent_integrate_over_time() {
        let clock = MockClock::new();
        let rig = SimRig::new(clock.clone());
        let mut valves = rig.valve_actuator();

        valves.set_chamber_valves(0, true, false).unwrap();
        clock.advance_ms(2000);
        let p = rig.pressure_of(0);
        assert!((p - 60.0).abs() < 0.01, "expected 60 mbar, got {p}");

        valves.set_chamber_valves(0, false, true).unwrap();
        clock.advance_ms(500);
        let p = rig.pressure_of(0);
        assert!((p - 30.0).abs() < 0.01, "expected 30 mbar, got {p}");
    }

    #[test]
    fn pressure_never_goes_negative() {
        let clock = MockClock::new();
        let rig = SimRig::new(clock.clone());
        let mut valves = rig.valve_actuator();
        valves.set_chamber_valves(1, false, true).unwrap();
        clock.advance_ms(60_000);
        assert_eq!(rig.pressure_of(1), 0.0);
    }

    #[test]
    fn scheduled_events_fire_on_access() {
        let clock = MockClock::new();
        let rig = SimRig::new(clock.clone());
        let fired = Arc::new(Mutex::new(false));
        let flag = Arc::clone(&fired);
        rig.schedule(1000, move || *flag.lock().unwrap() = true);

        let mut source = rig.pressure_source();
        source.read_all().unwrap();
        assert!(!*fired.lock().unwrap());

        clock.advance_ms(1000);
        source.read_all().unwrap();
        assert!(*fired.lock().unwrap());
    }

    #[test]
    fn injected_read_failures_recover() {
        let clock = MockClock::new();
        let rig = SimRig::new(clock);
        rig.fail_next_reads(2);
        let mut source = rig.pressure_source();
        assert!(source.read_all().is_err());
        assert!(source.read_all().is_err());
        assert!(source.read_all().is_ok());
    }

    #[test]
    fn injected_valve_failure_is_consumed() {
        let clock = MockClock::new();
        let rig = SimRig::new(clock);
        rig.fail_next_valve_writes(2, 1);
        let mut valves = rig.valve_actuator();
        assert!(valves.set_chamber_valves(2, false, false).is_err());
        assert!(valves.set_chamber_valves(2, false, false).is_ok());
        // The failed write never reached the hardware log.
        assert_eq!(rig.writes().len(), 1);
    }

    #[test]
    fn mock_clock_sleep_advances() {
        let mut clock = MockClock::new();
        clock.sleep_until_ms(250);
        assert_eq!(clock.now_ms(), 250);
        // Past deadlines do not rewind time.
        clock.sleep_until_ms(100);
        assert_eq!(clock.now_ms(), 250);
    }
}
