//! Per-chamber runtime state and its pure transforms.
//!
//! A `ChamberController` never touches hardware: the engine feeds it
//! samples and asks it phase-exit questions, then seals it once the run
//! ends. After sealing, no field mutates.

use heapless::Deque;

use crate::config::{ChamberConfig, STABILITY_STREAK};
use crate::record::ChamberSummary;
use crate::state::{ChamberPhase, ChamberStatus, RegulationMode};
use leaktest_hal::{Pressure, PressureSample};

/// Test-phase sample history. FIFO eviction once full, so statistics for
/// very long tests describe the trailing window.
pub const SAMPLE_RING_CAPACITY: usize = 1000;
/// Raw stability readings kept; the criterion inspects the newest 20.
const STABILITY_RING_CAPACITY: usize = 50;
/// Recent pressure rates in mbar/s.
const RATE_RING_CAPACITY: usize = 10;

fn push_evict<const N: usize>(buf: &mut Deque<f32, N>, value: f32) {
    if buf.is_full() {
        buf.pop_front();
    }
    let _ = buf.push_back(value);
}

fn mean_and_std<const N: usize>(buf: &Deque<f32, N>) -> (f32, f32) {
    let n = buf.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = buf.iter().sum::<f32>() / n as f32;
    if n < 2 {
        return (mean, 0.0);
    }
    let variance = buf.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / n as f32;
    (mean, variance.sqrt())
}

pub struct ChamberController {
    index: usize,
    config: ChamberConfig,
    phase: ChamberPhase,
    regulation_mode: RegulationMode,
    current: Pressure,
    start_pressure: Pressure,
    final_pressure: Pressure,
    mean_pressure: f32,
    pressure_std: f32,
    samples: Deque<f32, SAMPLE_RING_CAPACITY>,
    stability_window: Deque<f32, STABILITY_RING_CAPACITY>,
    rate_window: Deque<f32, RATE_RING_CAPACITY>,
    last_sample: Option<(u64, f32)>,
    consecutive_stable: u32,
    stability_achieved: bool,
    result: Option<bool>,
    sealed: bool,
}

impl ChamberController {
    pub fn new(index: usize, config: ChamberConfig) -> Self {
        Self {
            index,
            config,
            phase: ChamberPhase::Idle,
            regulation_mode: RegulationMode::Idle,
            current: Pressure::ZERO,
            start_pressure: Pressure::ZERO,
            final_pressure: Pressure::ZERO,
            mean_pressure: 0.0,
            pressure_std: 0.0,
            samples: Deque::new(),
            stability_window: Deque::new(),
            rate_window: Deque::new(),
            last_sample: None,
            consecutive_stable: 0,
            stability_achieved: false,
            result: None,
            sealed: false,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn config(&self) -> &ChamberConfig {
        &self.config
    }

    pub fn phase(&self) -> ChamberPhase {
        self.phase
    }

    pub fn regulation_mode(&self) -> RegulationMode {
        self.regulation_mode
    }

    pub fn set_regulation_mode(&mut self, mode: RegulationMode) {
        if !self.sealed {
            self.regulation_mode = mode;
        }
    }

    pub fn current_pressure(&self) -> Pressure {
        self.current
    }

    pub fn result(&self) -> Option<bool> {
        self.result
    }

    pub fn stability_achieved(&self) -> bool {
        self.stability_achieved
    }

    /// Advance to `next`, ignoring transitions that would violate phase
    /// monotonicity (emergency jumps to Emptying are always allowed).
    pub fn enter_phase(&mut self, next: ChamberPhase) {
        if self.sealed {
            return;
        }
        if !self.phase.may_advance_to(next) {
            if next != self.phase {
                log::warn!(
                    "chamber {}: ignoring phase transition {} -> {}",
                    self.index + 1,
                    self.phase.label(),
                    next.label()
                );
            }
            return;
        }
        self.phase = next;
        if next == ChamberPhase::Stabilizing {
            // The stability criterion only considers readings taken with
            // all valves closed.
            self.stability_window.clear();
        }
    }

    /// Ingest one bus sample: update the live pressure, the rate window and
    /// the stability window.
    pub fn on_sample(&mut self, sample: &PressureSample) {
        if self.sealed {
            return;
        }
        let pressure = sample.chamber(self.index).mbar();
        if let Some((last_ts, last_pressure)) = self.last_sample {
            let dt_s = sample.timestamp_ms.saturating_sub(last_ts) as f32 / 1000.0;
            if dt_s > 0.0 {
                push_evict(&mut self.rate_window, (pressure - last_pressure) / dt_s);
            }
        }
        self.last_sample = Some((sample.timestamp_ms, pressure));
        self.current = Pressure::from_mbar(pressure);
        push_evict(&mut self.stability_window, pressure);
    }

    /// Regulation error in mbar, positive when under target.
    pub fn error_mbar(&self) -> f32 {
        self.config.target_mbar as f32 - self.current.mbar()
    }

    /// Mean of the recent rate window in mbar/s.
    pub fn mean_rate(&self) -> Option<f32> {
        if self.rate_window.is_empty() {
            return None;
        }
        Some(self.rate_window.iter().sum::<f32>() / self.rate_window.len() as f32)
    }

    pub fn should_exit_filling(&self) -> bool {
        self.current.mbar() >= self.config.target_mbar as f32
    }

    /// Track the in-tolerance streak; true once the chamber has held the
    /// band for `STABILITY_STREAK` consecutive samples.
    pub fn should_exit_regulation(&mut self) -> bool {
        if self.error_mbar().abs() <= self.config.tolerance_mbar as f32 {
            self.consecutive_stable += 1;
        } else {
            self.consecutive_stable = 0;
        }
        if self.consecutive_stable >= STABILITY_STREAK {
            self.regulation_mode = RegulationMode::Stable;
            true
        } else {
            false
        }
    }

    /// Stability criterion: at least `window` quiescent readings, and the
    /// largest deviation from their mean within tolerance.
    pub fn is_stable(&self, window: usize) -> bool {
        if self.stability_window.len() < window {
            return false;
        }
        let skip = self.stability_window.len() - window;
        let mean = self.stability_window.iter().skip(skip).sum::<f32>() / window as f32;
        let max_deviation = self
            .stability_window
            .iter()
            .skip(skip)
            .map(|p| (p - mean).abs())
            .fold(0.0, f32::max);
        max_deviation <= self.config.tolerance_mbar as f32
    }

    pub fn set_stability(&mut self, achieved: bool) {
        if !self.sealed {
            self.stability_achieved = achieved;
        }
    }

    /// Mark the start of the Testing phase: record the start pressure and
    /// reset the sample history to this point.
    pub fn begin_testing(&mut self) {
        if self.sealed {
            return;
        }
        self.start_pressure = self.current;
        self.final_pressure = self.current;
        self.samples.clear();
        push_evict(&mut self.samples, self.current.mbar());
    }

    /// Append the live pressure to the test history and apply the failure
    /// threshold. Returns true when this sample newly latched a failure;
    /// the latch never releases, even if pressure later recovers.
    pub fn record_test_sample(&mut self) -> bool {
        if self.sealed {
            return false;
        }
        push_evict(&mut self.samples, self.current.mbar());
        self.final_pressure = self.current;
        if self.current.mbar() < self.config.threshold_mbar as f32 {
            let newly = self.result.is_none();
            self.result = Some(false);
            newly
        } else {
            false
        }
    }

    /// Freeze the chamber: compute statistics, resolve the result and move
    /// to Complete. Further mutation calls become no-ops.
    pub fn seal(&mut self, completed_normally: bool) {
        if self.sealed {
            return;
        }
        let (mean, std) = mean_and_std(&self.samples);
        self.mean_pressure = mean;
        self.pressure_std = std;
        if self.result.is_none() {
            self.result = Some(self.config.enabled && completed_normally);
        }
        if !self.config.enabled {
            self.result = Some(false);
        }
        self.phase = ChamberPhase::Complete;
        self.regulation_mode = RegulationMode::Idle;
        self.sealed = true;
    }

    pub fn summary(&self) -> ChamberSummary {
        ChamberSummary {
            enabled: self.config.enabled,
            pressure_target: self.config.target_mbar as f32,
            pressure_threshold: self.config.threshold_mbar as f32,
            pressure_tolerance: self.config.tolerance_mbar as f32,
            start_pressure: self.start_pressure.mbar(),
            final_pressure: self.final_pressure.mbar(),
            mean_pressure: self.mean_pressure,
            pressure_std: self.pressure_std,
            result: self.result.unwrap_or(false),
        }
    }

    pub fn status(&self) -> ChamberStatus {
        ChamberStatus {
            enabled: self.config.enabled,
            phase: self.phase,
            pressure_mbar: self.current.mbar(),
            regulation_mode: self.regulation_mode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use leaktest_hal::CHAMBER_COUNT;

    fn sample(ts: u64, pressure: f32) -> PressureSample {
        PressureSample {
            timestamp_ms: ts,
            pressures: [Pressure::from_mbar(pressure); CHAMBER_COUNT],
            clamped: false,
        }
    }

    fn controller() -> ChamberController {
        ChamberController::new(0, ChamberConfig::default())
    }

    #[test]
    fn filling_exits_at_or_above_target() {
        let mut chamber = controller();
        chamber.on_sample(&sample(0, 299.9));
        assert!(!chamber.should_exit_filling());
        chamber.on_sample(&sample(100, 300.0));
        assert!(chamber.should_exit_filling());
    }

    #[test]
    fn regulation_streak_requires_five_consecutive_samples() {
        let mut chamber = controller();
        for i in 0..4 {
            chamber.on_sample(&sample(i * 100, 300.0));
            assert!(!chamber.should_exit_regulation());
        }
        // An out-of-band excursion resets the streak.
        chamber.on_sample(&sample(400, 280.0));
        assert!(!chamber.should_exit_regulation());
        for i in 5..9 {
            chamber.on_sample(&sample(i * 100, 301.0));
            assert!(!chamber.should_exit_regulation());
        }
        chamber.on_sample(&sample(900, 301.0));
        assert!(chamber.should_exit_regulation());
        assert_eq!(chamber.regulation_mode(), RegulationMode::Stable);
    }

    #[test]
    fn exact_target_counts_toward_streak() {
        let mut chamber = controller();
        for i in 0..5 {
            chamber.on_sample(&sample(i * 100, 300.0));
        }
        // Five in-band samples, the fifth closes the streak.
        let mut exits = 0;
        for _ in 0..5 {
            if chamber.should_exit_regulation() {
                exits += 1;
            }
        }
        assert_eq!(exits, 1);
    }

    #[test]
    fn stability_needs_full_window() {
        let mut chamber = controller();
        chamber.enter_phase(ChamberPhase::Filling);
        chamber.enter_phase(ChamberPhase::Regulating);
        chamber.enter_phase(ChamberPhase::Stabilizing);
        for i in 0..19 {
            chamber.on_sample(&sample(i * 50, 300.0));
        }
        assert!(!chamber.is_stable(20));
        chamber.on_sample(&sample(1000, 300.5));
        assert!(chamber.is_stable(20));
    }

    #[test]
    fn stability_rejects_wide_excursions() {
        let mut chamber = controller();
        for i in 0..20 {
            let p = if i == 10 { 310.0 } else { 300.0 };
            chamber.on_sample(&sample(i * 50, p));
        }
        assert!(!chamber.is_stable(20));
    }

    #[test]
    fn entering_stabilizing_discards_regulation_readings() {
        let mut chamber = controller();
        chamber.enter_phase(ChamberPhase::Filling);
        chamber.enter_phase(ChamberPhase::Regulating);
        for i in 0..30 {
            chamber.on_sample(&sample(i * 100, 250.0));
        }
        chamber.enter_phase(ChamberPhase::Stabilizing);
        assert!(!chamber.is_stable(20));
    }

    #[test]
    fn threshold_failure_latches() {
        let mut chamber = controller();
        chamber.on_sample(&sample(0, 300.0));
        chamber.begin_testing();
        chamber.on_sample(&sample(100, 289.0));
        assert!(chamber.record_test_sample());
        // Recovery above threshold does not release the latch.
        chamber.on_sample(&sample(200, 300.0));
        assert!(!chamber.record_test_sample());
        assert_eq!(chamber.result(), Some(false));
        chamber.seal(true);
        assert!(!chamber.summary().result);
    }

    #[test]
    fn passing_chamber_resolves_true_on_seal() {
        let mut chamber = controller();
        chamber.on_sample(&sample(0, 300.0));
        chamber.begin_testing();
        for i in 1..10 {
            chamber.on_sample(&sample(i * 100, 299.0));
            chamber.record_test_sample();
        }
        chamber.seal(true);
        let summary = chamber.summary();
        assert!(summary.result);
        assert_relative_eq!(summary.start_pressure, 300.0);
        assert_relative_eq!(summary.final_pressure, 299.0);
    }

    #[test]
    fn aborted_run_resolves_false() {
        let mut chamber = controller();
        chamber.on_sample(&sample(0, 150.0));
        chamber.seal(false);
        assert_eq!(chamber.result(), Some(false));
    }

    #[test]
    fn disabled_chamber_result_is_false_by_convention() {
        let config = ChamberConfig {
            enabled: false,
            ..ChamberConfig::default()
        };
        let mut chamber = ChamberController::new(2, config);
        chamber.seal(true);
        let summary = chamber.summary();
        assert!(!summary.enabled);
        assert!(!summary.result);
    }

    #[test]
    fn seal_freezes_all_state() {
        let mut chamber = controller();
        chamber.on_sample(&sample(0, 300.0));
        chamber.begin_testing();
        chamber.seal(true);
        let before = chamber.summary();
        chamber.on_sample(&sample(100, 100.0));
        chamber.record_test_sample();
        chamber.enter_phase(ChamberPhase::Emptying);
        chamber.set_regulation_mode(RegulationMode::Venting);
        assert_eq!(chamber.summary(), before);
        assert_eq!(chamber.phase(), ChamberPhase::Complete);
    }

    #[test]
    fn sample_ring_evicts_oldest() {
        let mut chamber = controller();
        chamber.on_sample(&sample(0, 300.0));
        chamber.begin_testing();
        for i in 0..(SAMPLE_RING_CAPACITY + 100) {
            chamber.on_sample(&sample((i as u64 + 1) * 100, 300.0 + i as f32));
            chamber.record_test_sample();
        }
        chamber.seal(true);
        // Mean reflects only the newest 1000 samples.
        let summary = chamber.summary();
        assert!(summary.mean_pressure > 300.0 + 100.0);
    }

    #[test]
    fn rate_window_tracks_recent_slope() {
        let mut chamber = controller();
        for i in 0..5 {
            chamber.on_sample(&sample(i * 1000, i as f32 * 30.0));
        }
        let rate = chamber.mean_rate().unwrap();
        assert_relative_eq!(rate, 30.0, epsilon = 0.01);
    }

    #[test]
    fn backwards_phase_transition_is_ignored() {
        let mut chamber = controller();
        chamber.enter_phase(ChamberPhase::Filling);
        chamber.enter_phase(ChamberPhase::Regulating);
        chamber.enter_phase(ChamberPhase::Filling);
        assert_eq!(chamber.phase(), ChamberPhase::Regulating);
    }
}
