//! The test execution engine.
//!
//! `TestRun` drives one test through its phases on whichever thread calls
//! [`TestRun::execute`]; `Engine` wraps that in a spawned run thread with a
//! stop latch, a status snapshot, and hardware hand-back so the same
//! instance can run test after test.
//!
//! The three chambers are multiplexed cooperatively inside the run loop.
//! Exclusive ownership does the synchronization: the valve gate owns the
//! actuator, the sample bus owns the sensor, the run owns the chamber
//! state. The only cross-thread state is the stop latch and the status
//! snapshot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::chamber::ChamberController;
use crate::config::{
    TestConfig, EMPTY_PRESSURE_MBAR, EMPTY_TIMEOUT_MS, FILL_TIMEOUT_MS, REGULATION_TIMEOUT_MS,
    STABILITY_DURATION_MS, STABILITY_WINDOW,
};
use crate::error::{RunError, StartError, StoreError};
use crate::gate::{close_all_valves, ValveGate};
use crate::record::{ChamberSummary, RunRecord};
use crate::regulator::{AdaptiveRegulator, PulseCommand};
use crate::sampling::{SampleBus, SampleCadence};
use crate::sink::{ResultSink, SinkOptions};
use crate::state::{ChamberPhase, RunState, StatusSnapshot};
use crate::traits::{Printer, RecordId, ResultStore, StatusObserver};
use leaktest_hal::{Clock, PressureSource, ValveActuator, CHAMBER_COUNT};

/// Cooperative stop request, shared between the engine and its run thread.
///
/// Release/acquire ordering guarantees that once `trigger` returns, the
/// next latch check in the run loop observes the request.
#[derive(Debug, Clone, Default)]
pub struct StopLatch {
    flag: Arc<AtomicBool>,
}

impl StopLatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    fn clear(&self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// The capabilities one run consumes. Handed to the run thread at start and
/// handed back when the run ends.
pub struct Resources<V, P, C, S> {
    pub valves: V,
    pub pressure: P,
    pub clock: C,
    pub store: S,
    pub printer: Option<Box<dyn Printer + Send>>,
}

/// Terminal summary of one run.
#[derive(Debug)]
pub struct RunOutcome {
    /// `Complete` or `Error`.
    pub state: RunState,
    pub overall_pass: bool,
    pub record: RunRecord,
    /// Assigned id when persistence succeeded.
    pub record_id: Option<RecordId>,
    /// The fault that aborted the run, if any.
    pub error: Option<RunError>,
    /// Set when the record could not be persisted after all retries.
    pub persistence_error: Option<StoreError>,
}

struct EngineShared {
    status: Mutex<StatusSnapshot>,
    running: AtomicBool,
}

impl EngineShared {
    fn new() -> Self {
        Self {
            status: Mutex::new(StatusSnapshot::idle()),
            running: AtomicBool::new(false),
        }
    }
}

enum Flow {
    Advance,
    Stopped,
}

type PhaseResult = Result<Flow, RunError>;

/// Interval between unforced observer notifications.
const OBSERVER_PERIOD_MS: u64 = 1_000;

/// One test run, executed to completion on the calling thread.
pub struct TestRun<V: ValveActuator, P: PressureSource, C: Clock, S: ResultStore> {
    config: TestConfig,
    gate: ValveGate<V>,
    bus: SampleBus<P>,
    clock: C,
    sink: ResultSink<S>,
    printer: Option<Box<dyn Printer + Send>>,
    chambers: [ChamberController; CHAMBER_COUNT],
    regulator: AdaptiveRegulator,
    latch: StopLatch,
    shared: Arc<EngineShared>,
    observers: Vec<Arc<dyn StatusObserver>>,
    options: SinkOptions,
    state: RunState,
    detail: String,
    started_ms: u64,
    phase_started_ms: u64,
    last_observer_ms: u64,
    strikes: [u8; CHAMBER_COUNT],
}

impl<V, P, C, S> TestRun<V, P, C, S>
where
    V: ValveActuator,
    P: PressureSource,
    C: Clock,
    S: ResultStore,
{
    pub fn new(
        config: TestConfig,
        resources: Resources<V, P, C, S>,
        latch: StopLatch,
    ) -> Result<Self, StartError> {
        config.validate()?;
        Ok(Self::with_shared(
            config,
            resources,
            latch,
            Arc::new(EngineShared::new()),
        ))
    }

    fn with_shared(
        config: TestConfig,
        resources: Resources<V, P, C, S>,
        latch: StopLatch,
        shared: Arc<EngineShared>,
    ) -> Self {
        let bus = SampleBus::new(resources.pressure, &config);
        let chambers = std::array::from_fn(|i| ChamberController::new(i, config.chambers[i].clone()));
        Self {
            config,
            gate: ValveGate::new(resources.valves),
            bus,
            clock: resources.clock,
            sink: ResultSink::new(resources.store),
            printer: resources.printer,
            chambers,
            regulator: AdaptiveRegulator::new(),
            latch,
            shared,
            observers: Vec::new(),
            options: SinkOptions::default(),
            state: RunState::Idle,
            detail: String::from("Ready"),
            started_ms: 0,
            phase_started_ms: 0,
            last_observer_ms: 0,
            strikes: [0; CHAMBER_COUNT],
        }
    }

    pub fn add_observer(&mut self, observer: Arc<dyn StatusObserver>) {
        self.observers.push(observer);
    }

    pub fn set_options(&mut self, options: SinkOptions) {
        self.options = options;
    }

    pub fn status(&self) -> StatusSnapshot {
        self.shared.status.lock().unwrap().clone()
    }

    pub fn stop_latch(&self) -> StopLatch {
        self.latch.clone()
    }

    pub fn into_resources(self) -> Resources<V, P, C, S> {
        Resources {
            valves: self.gate.into_inner(),
            pressure: self.bus.into_inner(),
            clock: self.clock,
            store: self.sink.into_inner(),
            printer: self.printer,
        }
    }

    /// Drive every chamber closed and take one full pressure reading.
    /// Must pass before any phase may begin.
    pub fn self_check(&mut self) -> Result<(), StartError> {
        log::info!("running hardware self-check");
        if let Err(e) = self.gate.close_all() {
            return Err(StartError::HardwareSelfCheckFailed(e.to_string()));
        }
        if let Err(e) = self.bus.probe(&mut self.clock) {
            let _ = self.gate.close_all();
            return Err(StartError::HardwareSelfCheckFailed(e.to_string()));
        }
        log::info!("hardware self-check passed");
        Ok(())
    }

    /// Run the whole state machine to completion and hand the capabilities
    /// back alongside the outcome.
    pub fn execute(mut self) -> (RunOutcome, Resources<V, P, C, S>) {
        self.started_ms = self.clock.now_ms();
        let enabled: Vec<usize> = self.config.enabled_chambers().map(|i| i + 1).collect();
        log::info!("test started for chambers {enabled:?}");

        let mut flow = self.phase_filling();
        if matches!(flow, Ok(Flow::Advance)) {
            flow = self.phase_regulating();
        }
        if matches!(flow, Ok(Flow::Advance)) {
            flow = self.phase_stabilizing();
        }
        if matches!(flow, Ok(Flow::Advance)) {
            flow = self.phase_testing();
        }

        let tested = matches!(flow, Ok(Flow::Advance));
        let mut failure = match flow {
            Err(e) => {
                log::error!("test aborted: {e}");
                Some(e)
            }
            Ok(Flow::Stopped) => {
                log::warn!("stop requested, abandoning test and emptying chambers");
                None
            }
            Ok(Flow::Advance) => None,
        };

        // Every exit path, normal or not, runs the emptying protocol.
        if let Err(e) = self.phase_emptying() {
            log::error!("emptying failed: {e}");
            if failure.is_none() {
                failure = Some(e);
            }
        }

        self.finish(tested, failure)
    }

    fn finish(
        mut self,
        tested: bool,
        failure: Option<RunError>,
    ) -> (RunOutcome, Resources<V, P, C, S>) {
        for chamber in &mut self.chambers {
            chamber.seal(tested);
        }
        let overall_pass = tested
            && failure.is_none()
            && self
                .chambers
                .iter()
                .filter(|c| c.enabled())
                .all(|c| c.result() == Some(true));

        for chamber in self.chambers.iter().filter(|c| c.enabled()) {
            let summary = chamber.summary();
            log::info!(
                "chamber {}: start={:.1} final={:.1} drop={:.1} mbar result={}",
                chamber.index() + 1,
                summary.start_pressure,
                summary.final_pressure,
                summary.pressure_drop(),
                if summary.result { "PASS" } else { "FAIL" }
            );
        }

        let summaries: [ChamberSummary; CHAMBER_COUNT] =
            std::array::from_fn(|i| self.chambers[i].summary());
        let record = RunRecord::assemble(
            &self.config,
            self.clock.wall_timestamp(),
            overall_pass,
            failure.as_ref().map(|e| e.to_string()),
            summaries,
        );

        let mut record_id = None;
        let mut persistence_error = None;
        let printer: Option<&mut dyn Printer> = match self.printer.as_deref_mut() {
            Some(p) => Some(p),
            None => None,
        };
        match self
            .sink
            .commit(&mut self.clock, &record, printer, &self.observers, self.options)
        {
            Ok(id) => record_id = id,
            Err(e) => {
                log::error!("failed to persist run record: {e}");
                persistence_error = Some(e);
            }
        }

        let state = if failure.is_some() {
            RunState::Error
        } else {
            RunState::Complete
        };
        let detail = match &failure {
            Some(e) => format!("Test error: {e}"),
            None if overall_pass => String::from("Test completed: PASS"),
            None => String::from("Test completed: FAIL"),
        };
        self.state = state;
        self.detail = detail;
        self.publish_status(1.0, true);
        log::info!("{}", self.shared.status.lock().unwrap().detail);

        let outcome = RunOutcome {
            state,
            overall_pass,
            record,
            record_id,
            error: failure,
            persistence_error,
        };
        (outcome, self.into_resources())
    }

    fn enabled_indices(&self) -> Vec<usize> {
        self.config.enabled_chambers().collect()
    }

    fn enter_run_state(&mut self, state: RunState, detail: &str, cadence: SampleCadence) {
        self.state = state;
        self.detail = detail.to_string();
        self.phase_started_ms = self.clock.now_ms();
        self.strikes = [0; CHAMBER_COUNT];
        self.bus.set_cadence(cadence);
        log::info!("{detail}");
        self.publish_status(0.0, true);
    }

    /// Refresh the shared snapshot; notify observers on transitions
    /// (`force`) and at least once per second otherwise.
    fn publish_status(&mut self, progress: f32, force: bool) {
        let now = self.clock.now_ms();
        let snapshot = StatusSnapshot {
            state: self.state,
            detail: self.detail.clone(),
            elapsed_ms: now.saturating_sub(self.started_ms),
            progress: progress.clamp(0.0, 1.0),
            chambers: std::array::from_fn(|i| self.chambers[i].status()),
        };
        *self.shared.status.lock().unwrap() = snapshot.clone();
        if force || now.saturating_sub(self.last_observer_ms) >= OBSERVER_PERIOD_MS {
            for observer in &self.observers {
                observer.on_status(&snapshot);
            }
            self.last_observer_ms = now;
        }
    }

    /// Acquire the next paced sample and feed the enabled chambers.
    /// `Ok(false)` marks a transient acquisition failure the caller skips;
    /// `Err` is a sensor fault and fatal.
    fn sample(&mut self) -> Result<bool, RunError> {
        match self.bus.next_sample(&mut self.clock) {
            Ok(sample) => {
                for chamber in &mut self.chambers {
                    if chamber.enabled() {
                        chamber.on_sample(&sample);
                    }
                }
                Ok(true)
            }
            Err(e) if e.is_fault() => Err(RunError::Sensor(e)),
            Err(e) => {
                log::debug!("sample abandoned: {e}");
                Ok(false)
            }
        }
    }

    /// Gate write with the per-phase two-strike policy: one isolated
    /// actuator error per chamber is tolerated, a second within the same
    /// phase is fatal.
    fn command_valves(
        &mut self,
        chamber: usize,
        inlet_open: bool,
        outlet_open: bool,
    ) -> Result<(), RunError> {
        match self.gate.set(&mut self.clock, chamber, inlet_open, outlet_open) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.strikes[chamber] += 1;
                if self.strikes[chamber] >= 2 {
                    Err(RunError::Actuator {
                        chamber,
                        source: e,
                    })
                } else {
                    log::warn!(
                        "chamber {}: tolerating isolated actuator error: {}",
                        chamber + 1,
                        e
                    );
                    Ok(())
                }
            }
        }
    }

    fn apply_pulse(&mut self, chamber: usize, command: PulseCommand) -> Result<(), RunError> {
        if command.is_hold() {
            return self.command_valves(chamber, false, false);
        }
        if command.inlet_ms > 0 {
            self.command_valves(chamber, true, false)?;
            self.clock.sleep_ms(command.inlet_ms);
        } else {
            self.command_valves(chamber, false, true)?;
            self.clock.sleep_ms(command.outlet_ms);
        }
        self.command_valves(chamber, false, false)?;
        // A stop observed at the pulse boundary skips the rest period.
        if command.rest_ms > 0 && !self.latch.is_set() {
            self.clock.sleep_ms(command.rest_ms);
        }
        Ok(())
    }

    fn phase_filling(&mut self) -> PhaseResult {
        self.enter_run_state(RunState::Filling, "Filling chambers...", SampleCadence::Active);
        let deadline = self.phase_started_ms + FILL_TIMEOUT_MS;
        let enabled = self.enabled_indices();
        for &i in &enabled {
            self.chambers[i].enter_phase(ChamberPhase::Filling);
        }
        let mut filling = enabled.clone();

        while !filling.is_empty() {
            if self.latch.is_set() {
                return Ok(Flow::Stopped);
            }
            if self.clock.now_ms() >= deadline {
                return Err(RunError::FillTimeout(FILL_TIMEOUT_MS / 1000));
            }
            if !self.sample()? {
                continue;
            }

            let mut still_filling = Vec::with_capacity(filling.len());
            for &i in &filling {
                if self.chambers[i].should_exit_filling() {
                    self.command_valves(i, false, false)?;
                    self.chambers[i].enter_phase(ChamberPhase::Regulating);
                    log::info!(
                        "chamber {} filled to {}",
                        i + 1,
                        self.chambers[i].current_pressure()
                    );
                } else {
                    self.command_valves(i, true, false)?;
                    still_filling.push(i);
                }
            }
            filling = still_filling;

            let progress = (enabled.len() - filling.len()) as f32 / enabled.len() as f32;
            self.publish_status(progress, false);
        }
        log::info!("all chambers filled");
        Ok(Flow::Advance)
    }

    fn phase_regulating(&mut self) -> PhaseResult {
        self.enter_run_state(
            RunState::Regulating,
            "Regulating pressures to target...",
            SampleCadence::Active,
        );
        let deadline = self.phase_started_ms + REGULATION_TIMEOUT_MS;
        let enabled = self.enabled_indices();
        let mut regulating = enabled.clone();

        while !regulating.is_empty() {
            if self.latch.is_set() {
                return Ok(Flow::Stopped);
            }
            if self.clock.now_ms() >= deadline {
                // Non-fatal: the stability phase will catch a chamber that
                // genuinely cannot hold its band.
                log::warn!(
                    "regulation timeout, advancing {} unsettled chamber(s)",
                    regulating.len()
                );
                break;
            }
            if !self.sample()? {
                continue;
            }

            let mut still_regulating = Vec::with_capacity(regulating.len());
            for &i in &regulating {
                if self.chambers[i].should_exit_regulation() {
                    self.command_valves(i, false, false)?;
                    self.chambers[i].enter_phase(ChamberPhase::Stabilizing);
                    log::info!(
                        "chamber {} holding target at {}",
                        i + 1,
                        self.chambers[i].current_pressure()
                    );
                } else {
                    let (command, mode) = self.regulator.command(
                        self.chambers[i].error_mbar(),
                        self.chambers[i].mean_rate(),
                        self.chambers[i].config().tolerance_mbar as f32,
                    );
                    self.chambers[i].set_regulation_mode(mode);
                    self.apply_pulse(i, command)?;
                    still_regulating.push(i);
                }
            }
            regulating = still_regulating;

            let settled = enabled.len() - regulating.len();
            self.publish_status(settled as f32 / enabled.len() as f32, false);
        }

        // Quiesce everything and advance any stragglers.
        for &i in &enabled {
            self.command_valves(i, false, false)?;
            self.chambers[i].enter_phase(ChamberPhase::Stabilizing);
        }
        Ok(Flow::Advance)
    }

    fn phase_stabilizing(&mut self) -> PhaseResult {
        self.enter_run_state(
            RunState::Stabilizing,
            "Verifying pressure stability...",
            SampleCadence::Monitor,
        );
        let deadline = self.phase_started_ms + STABILITY_DURATION_MS;
        let enabled = self.enabled_indices();
        let mut all_stable = false;

        loop {
            if self.latch.is_set() {
                return Ok(Flow::Stopped);
            }
            let now = self.clock.now_ms();
            if now >= deadline {
                // Recorded but non-fatal; the test itself is the arbiter.
                log::warn!("stabilization timeout, proceeding with test");
                break;
            }
            if !self.sample()? {
                continue;
            }
            all_stable = enabled
                .iter()
                .all(|&i| self.chambers[i].is_stable(STABILITY_WINDOW));
            if all_stable {
                log::info!("all chambers stable");
                break;
            }
            let progress = (now - self.phase_started_ms) as f32 / STABILITY_DURATION_MS as f32;
            self.publish_status(progress, false);
        }

        for &i in &enabled {
            self.chambers[i].set_stability(all_stable);
            self.chambers[i].enter_phase(ChamberPhase::Testing);
        }
        Ok(Flow::Advance)
    }

    fn phase_testing(&mut self) -> PhaseResult {
        self.enter_run_state(
            RunState::Testing,
            "Testing in progress...",
            SampleCadence::Active,
        );
        let duration_ms = u64::from(self.config.test_duration_s) * 1000;
        let deadline = self.phase_started_ms + duration_ms;
        let enabled = self.enabled_indices();
        for &i in &enabled {
            self.chambers[i].begin_testing();
        }

        loop {
            if self.latch.is_set() {
                return Ok(Flow::Stopped);
            }
            let now = self.clock.now_ms();
            if now >= deadline {
                break;
            }
            if !self.sample()? {
                continue;
            }
            for &i in &enabled {
                if self.chambers[i].record_test_sample() {
                    log::error!(
                        "chamber {} failed: {} below threshold {} mbar",
                        i + 1,
                        self.chambers[i].current_pressure(),
                        self.chambers[i].config().threshold_mbar
                    );
                }
            }
            self.publish_status((now - self.phase_started_ms) as f32 / duration_ms as f32, false);
        }
        log::info!("test phase completed");
        Ok(Flow::Advance)
    }

    /// The single emptying path every exit takes: inlets closed, outlets
    /// open, sample until empty or timeout, then everything closed.
    fn phase_emptying(&mut self) -> Result<(), RunError> {
        self.enter_run_state(RunState::Emptying, "Emptying chambers...", SampleCadence::Monitor);
        let enabled = self.enabled_indices();
        for &i in &enabled {
            self.chambers[i].enter_phase(ChamberPhase::Emptying);
        }

        let mut first_error: Option<RunError> = None;
        for &i in &enabled {
            if let Err(e) = self.gate.set(&mut self.clock, i, false, true) {
                log::error!("chamber {}: failed to open outlet for emptying: {}", i + 1, e);
                if first_error.is_none() {
                    first_error = Some(RunError::Actuator {
                        chamber: i,
                        source: e,
                    });
                }
            }
        }

        let deadline = self.phase_started_ms + EMPTY_TIMEOUT_MS;
        if first_error.is_none() {
            loop {
                let now = self.clock.now_ms();
                if now >= deadline {
                    log::warn!("emptying timeout, closing outlets with residual pressure");
                    break;
                }
                match self.sample() {
                    Ok(true) => {
                        if enabled
                            .iter()
                            .all(|&i| self.chambers[i].current_pressure().mbar() <= EMPTY_PRESSURE_MBAR)
                        {
                            log::info!(
                                "all chambers emptied in {:.1} s",
                                (now - self.phase_started_ms) as f32 / 1000.0
                            );
                            break;
                        }
                    }
                    Ok(false) => {}
                    Err(e) => {
                        // Sensor is dead: vent blind for the full window,
                        // then secure the valves.
                        log::error!("sensor fault during emptying, venting until timeout: {e}");
                        first_error = Some(e);
                        self.clock.sleep_until_ms(deadline);
                        break;
                    }
                }
                let progress = (self.clock.now_ms() - self.phase_started_ms) as f32
                    / EMPTY_TIMEOUT_MS as f32;
                self.publish_status(progress, false);
            }
        }

        if let Err(e) = self.gate.close_all() {
            if first_error.is_none() {
                first_error = Some(RunError::Shutdown(e));
            }
        }
        match first_error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}

/// Thread-spawning front end over [`TestRun`].
pub struct Engine<V, P, C, S> {
    resources: Arc<Mutex<Option<Resources<V, P, C, S>>>>,
    shared: Arc<EngineShared>,
    latch: StopLatch,
    observers: Vec<Arc<dyn StatusObserver>>,
    options: SinkOptions,
    worker: Option<JoinHandle<RunOutcome>>,
}

impl<V, P, C, S> Engine<V, P, C, S>
where
    V: ValveActuator + Send + 'static,
    P: PressureSource + Send + 'static,
    C: Clock + Send + 'static,
    S: ResultStore + Send + 'static,
{
    pub fn new(resources: Resources<V, P, C, S>) -> Self {
        Self {
            resources: Arc::new(Mutex::new(Some(resources))),
            shared: Arc::new(EngineShared::new()),
            latch: StopLatch::new(),
            observers: Vec::new(),
            options: SinkOptions::default(),
            worker: None,
        }
    }

    pub fn add_observer(&mut self, observer: Arc<dyn StatusObserver>) {
        self.observers.push(observer);
    }

    pub fn set_options(&mut self, options: SinkOptions) {
        self.options = options;
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    /// Non-blocking view of the current (or last) run.
    pub fn status(&self) -> StatusSnapshot {
        self.shared.status.lock().unwrap().clone()
    }

    /// Handle that requests a stop without joining the run.
    pub fn stop_latch(&self) -> StopLatch {
        self.latch.clone()
    }

    /// Validate, self-check and launch a run on its own thread.
    pub fn start(&mut self, config: TestConfig) -> Result<(), StartError> {
        if self.is_running() {
            return Err(StartError::AlreadyRunning);
        }
        // Reap a finished run nobody waited on.
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        config.validate()?;

        let resources = self
            .resources
            .lock()
            .unwrap()
            .take()
            .ok_or(StartError::AlreadyRunning)?;
        self.latch.clear();

        let mut run = TestRun::with_shared(
            config,
            resources,
            self.latch.clone(),
            Arc::clone(&self.shared),
        );
        for observer in &self.observers {
            run.add_observer(Arc::clone(observer));
        }
        run.set_options(self.options);

        if let Err(e) = run.self_check() {
            *self.resources.lock().unwrap() = Some(run.into_resources());
            return Err(e);
        }

        self.shared.running.store(true, Ordering::Release);
        let slot = Arc::clone(&self.resources);
        let shared = Arc::clone(&self.shared);
        self.worker = Some(thread::spawn(move || {
            let (outcome, resources) = run.execute();
            *slot.lock().unwrap() = Some(resources);
            shared.running.store(false, Ordering::Release);
            outcome
        }));
        Ok(())
    }

    /// Request a graceful stop and wait for the run to finish emptying.
    ///
    /// Idempotent; when it returns, all valves are closed. Returns the
    /// outcome when a run was actually joined.
    pub fn stop(&mut self) -> Option<RunOutcome> {
        self.latch.trigger();
        let outcome = self.join_worker();
        // Defensive sweep; the run already closed everything on its way out.
        if let Some(resources) = self.resources.lock().unwrap().as_mut() {
            if let Err(e) = close_all_valves(&mut resources.valves) {
                log::error!("post-stop valve sweep failed: {e}");
            }
        }
        outcome
    }

    /// Block until the active run finishes and return its outcome.
    pub fn wait(&mut self) -> Option<RunOutcome> {
        self.join_worker()
    }

    fn join_worker(&mut self) -> Option<RunOutcome> {
        let worker = self.worker.take()?;
        match worker.join() {
            Ok(outcome) => Some(outcome),
            Err(_) => {
                log::error!("run thread panicked");
                None
            }
        }
    }
}
