//! Paced pressure acquisition with retry and error accounting.
//!
//! The bus exclusively owns the `PressureSource`; every pressure the rest
//! of the engine sees comes through here. Pacing uses absolute deadlines so
//! acquisition jitter cannot stretch a phase, and per-chamber calibration
//! offsets are applied in exactly this one place.

use crate::config::{
    TestConfig, MAX_CONSECUTIVE_SENSOR_ERRORS, SAMPLE_PERIOD_ACTIVE_MS, SAMPLE_PERIOD_MONITOR_MS,
    SENSOR_RETRY_BACKOFF_MS, SENSOR_RETRY_MAX,
};
use leaktest_hal::{Clock, Pressure, PressureSample, PressureSource, SensorError, CHAMBER_COUNT};

/// Acquisition pacing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleCadence {
    /// 10 Hz, used while valves may move.
    Active,
    /// 20 Hz, used while the loop is purely observing.
    Monitor,
}

impl SampleCadence {
    fn period_ms(self) -> u64 {
        match self {
            SampleCadence::Active => SAMPLE_PERIOD_ACTIVE_MS,
            SampleCadence::Monitor => SAMPLE_PERIOD_MONITOR_MS,
        }
    }
}

pub struct SampleBus<P: PressureSource> {
    source: P,
    offsets: [f32; CHAMBER_COUNT],
    cadence: SampleCadence,
    next_due_ms: Option<u64>,
    consecutive_errors: u32,
    last_timestamp_ms: Option<u64>,
}

impl<P: PressureSource> SampleBus<P> {
    pub fn new(source: P, config: &TestConfig) -> Self {
        let offsets = std::array::from_fn(|i| config.chambers[i].clamped_offset());
        Self {
            source,
            offsets,
            cadence: SampleCadence::Active,
            next_due_ms: None,
            consecutive_errors: 0,
            last_timestamp_ms: None,
        }
    }

    pub fn set_cadence(&mut self, cadence: SampleCadence) {
        self.cadence = cadence;
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn into_inner(self) -> P {
        self.source
    }

    /// One unpaced acquisition, used by the startup self-check.
    pub fn probe(&mut self, clock: &mut impl Clock) -> Result<PressureSample, SensorError> {
        self.acquire(clock)
    }

    /// Wait for the next cadence deadline, then acquire with retry.
    ///
    /// A `Fault` return means the consecutive-failure budget is exhausted
    /// and the engine must abort; any other error marks a single abandoned
    /// sample the caller may skip.
    pub fn next_sample(&mut self, clock: &mut impl Clock) -> Result<PressureSample, SensorError> {
        let due = self.next_due_ms.unwrap_or_else(|| clock.now_ms());
        clock.sleep_until_ms(due);
        let now = clock.now_ms();
        // Absolute schedule; skip forward rather than bursting after a
        // long valve pulse.
        self.next_due_ms = Some((due + self.cadence.period_ms()).max(now));
        self.acquire(clock)
    }

    fn acquire(&mut self, clock: &mut impl Clock) -> Result<PressureSample, SensorError> {
        let mut clamped_fallback: Option<[f32; CHAMBER_COUNT]> = None;

        for attempt in 0..SENSOR_RETRY_MAX {
            if attempt > 0 {
                clock.sleep_ms(SENSOR_RETRY_BACKOFF_MS);
            }
            match self.source.read_all() {
                Ok(raw) => {
                    if raw.iter().all(|p| Pressure::from_mbar(*p).is_plausible()) {
                        self.consecutive_errors = 0;
                        return Ok(self.stamp(clock, raw, false));
                    }
                    // Implausible values clamp to zero and burn a retry.
                    log::warn!("implausible pressure reading {raw:?}, clamping to 0");
                    let mut clamped = raw;
                    for value in &mut clamped {
                        if !Pressure::from_mbar(*value).is_plausible() {
                            *value = 0.0;
                        }
                    }
                    clamped_fallback = Some(clamped);
                }
                Err(e) => {
                    log::warn!("pressure read attempt {} failed: {}", attempt + 1, e);
                }
            }
        }

        self.consecutive_errors += 1;
        if self.consecutive_errors >= MAX_CONSECUTIVE_SENSOR_ERRORS {
            log::error!(
                "sensor fault: {} consecutive failed acquisitions",
                self.consecutive_errors
            );
            return Err(SensorError::Fault {
                consecutive: self.consecutive_errors,
            });
        }
        if let Some(values) = clamped_fallback {
            return Ok(self.stamp(clock, values, true));
        }
        Err(SensorError::read_failed("all read attempts failed"))
    }

    fn stamp(
        &mut self,
        clock: &mut impl Clock,
        raw: [f32; CHAMBER_COUNT],
        clamped: bool,
    ) -> PressureSample {
        let mut timestamp_ms = clock.now_ms();
        // Two samples must never share a timestamp.
        if let Some(last) = self.last_timestamp_ms {
            if timestamp_ms <= last {
                timestamp_ms = last + 1;
            }
        }
        self.last_timestamp_ms = Some(timestamp_ms);
        let pressures = std::array::from_fn(|i| Pressure::from_mbar(raw[i] + self.offsets[i]));
        PressureSample {
            timestamp_ms,
            pressures,
            clamped,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChamberConfig;
    use leaktest_hal::{MockClock, SimRig};

    fn bus_on_rig(rig: &SimRig) -> SampleBus<leaktest_hal::mock::SimPressure> {
        SampleBus::new(rig.pressure_source(), &TestConfig::default())
    }

    #[test]
    fn samples_are_paced_on_the_cadence() {
        let mut clock = MockClock::new();
        let rig = SimRig::new(clock.clone());
        let mut bus = bus_on_rig(&rig);

        let first = bus.next_sample(&mut clock).unwrap();
        let second = bus.next_sample(&mut clock).unwrap();
        let third = bus.next_sample(&mut clock).unwrap();
        assert_eq!(second.timestamp_ms - first.timestamp_ms, 100);
        assert_eq!(third.timestamp_ms - second.timestamp_ms, 100);

        // The new cadence takes effect from the next scheduling decision.
        bus.set_cadence(SampleCadence::Monitor);
        let fourth = bus.next_sample(&mut clock).unwrap();
        let fifth = bus.next_sample(&mut clock).unwrap();
        assert_eq!(fifth.timestamp_ms - fourth.timestamp_ms, 50);
    }

    #[test]
    fn transient_failures_are_retried_with_backoff() {
        let mut clock = MockClock::new();
        let rig = SimRig::new(clock.clone());
        rig.set_pressure(0, 123.0);
        rig.fail_next_reads(2);
        let mut bus = bus_on_rig(&rig);

        let t0 = clock.now_ms();
        let sample = bus.next_sample(&mut clock).unwrap();
        assert_eq!(sample.chamber(0).mbar(), 123.0);
        // Two backoffs were taken before the third attempt succeeded.
        assert!(clock.now_ms() - t0 >= 2 * SENSOR_RETRY_BACKOFF_MS);
        assert_eq!(bus.consecutive_errors(), 0);
    }

    #[test]
    fn exhausted_retries_abandon_the_sample() {
        let mut clock = MockClock::new();
        let rig = SimRig::new(clock.clone());
        rig.fail_next_reads(SENSOR_RETRY_MAX);
        let mut bus = bus_on_rig(&rig);

        let err = bus.next_sample(&mut clock).unwrap_err();
        assert!(!err.is_fault());
        assert_eq!(bus.consecutive_errors(), 1);

        // A later success resets the account.
        bus.next_sample(&mut clock).unwrap();
        assert_eq!(bus.consecutive_errors(), 0);
    }

    #[test]
    fn fault_after_exactly_max_consecutive_failures() {
        let mut clock = MockClock::new();
        let rig = SimRig::new(clock.clone());
        rig.fail_reads_from(0);
        let mut bus = bus_on_rig(&rig);

        for expected in 1..MAX_CONSECUTIVE_SENSOR_ERRORS {
            let err = bus.next_sample(&mut clock).unwrap_err();
            assert!(!err.is_fault());
            assert_eq!(bus.consecutive_errors(), expected);
        }
        let err = bus.next_sample(&mut clock).unwrap_err();
        assert!(err.is_fault());
    }

    #[test]
    fn four_failures_then_success_is_not_a_fault() {
        let mut clock = MockClock::new();
        let rig = SimRig::new(clock.clone());
        rig.fail_next_reads((MAX_CONSECUTIVE_SENSOR_ERRORS - 1) * SENSOR_RETRY_MAX);
        let mut bus = bus_on_rig(&rig);

        for _ in 0..(MAX_CONSECUTIVE_SENSOR_ERRORS - 1) {
            assert!(!bus.next_sample(&mut clock).unwrap_err().is_fault());
        }
        assert!(bus.next_sample(&mut clock).is_ok());
        assert_eq!(bus.consecutive_errors(), 0);
    }

    #[test]
    fn implausible_values_clamp_and_count() {
        let mut clock = MockClock::new();
        let rig = SimRig::new(clock.clone());
        rig.set_pressure(1, 200.0);
        rig.force_reading(0, Some(5000.0));
        let mut bus = bus_on_rig(&rig);

        let sample = bus.next_sample(&mut clock).unwrap();
        assert!(sample.clamped);
        assert_eq!(sample.chamber(0).mbar(), 0.0);
        assert_eq!(sample.chamber(1).mbar(), 200.0);
        assert_eq!(bus.consecutive_errors(), 1);
    }

    #[test]
    fn calibration_offset_is_applied() {
        let mut clock = MockClock::new();
        let rig = SimRig::new(clock.clone());
        rig.set_pressure(2, 100.0);
        let mut config = TestConfig::default();
        config.chambers[2] = ChamberConfig {
            offset_mbar: 2.5,
            ..ChamberConfig::default()
        };
        let mut bus = SampleBus::new(rig.pressure_source(), &config);

        let sample = bus.next_sample(&mut clock).unwrap();
        assert_eq!(sample.chamber(2).mbar(), 102.5);
    }

    #[test]
    fn timestamps_strictly_increase() {
        let mut clock = MockClock::new();
        let rig = SimRig::new(clock.clone());
        let mut bus = bus_on_rig(&rig);
        let mut last = None;
        for _ in 0..10 {
            let sample = bus.next_sample(&mut clock).unwrap();
            if let Some(prev) = last {
                assert!(sample.timestamp_ms > prev);
            }
            last = Some(sample.timestamp_ms);
        }
    }
}
