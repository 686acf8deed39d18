//! Desktop simulator for the multi-chamber leak tester.
//!
//! Runs the real test engine against the simulated rig with a
//! fast-forwarding clock, so a full run finishes in milliseconds while
//! exercising exactly the production state machine. Useful for validating
//! parameter sets and watching the phase sequence without hardware.

mod config;
mod scenarios;
mod store;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use clap::{Arg, Command};
use console::style;

use leaktest_core::{
    ChamberSummary, Engine, Resources, RunOutcome, RunState, StatusObserver, StatusSnapshot,
};
use leaktest_hal::{MockClock, SimRig};

use config::{default_config_path, load_test_config};
use scenarios::Scenario;
use store::JsonlStore;

fn main() -> Result<()> {
    env_logger::init();

    let matches = Command::new("leaktest-sim")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Desktop simulator for the multi-chamber leak tester")
        .arg(
            Arg::new("scenario")
                .short('s')
                .long("scenario")
                .value_name("SCENARIO")
                .help("Named scenario to run")
                .value_parser(Scenario::NAMES)
                .default_value("pass"),
        )
        .arg(
            Arg::new("duration")
                .short('d')
                .long("duration")
                .value_name("SECONDS")
                .help("Test phase duration")
                .value_parser(clap::value_parser!(u32).range(1..))
                .default_value("10"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("TOML test configuration overriding the scenario defaults"),
        )
        .arg(
            Arg::new("results")
                .short('r')
                .long("results")
                .value_name("FILE")
                .help("Results file (JSON lines)"),
        )
        .get_matches();

    let scenario_name = matches.get_one::<String>("scenario").unwrap();
    let scenario = Scenario::from_name(scenario_name)
        .ok_or_else(|| anyhow!("unknown scenario {scenario_name}"))?;
    let duration = *matches.get_one::<u32>("duration").unwrap();

    let test_config = match matches.get_one::<String>("config") {
        Some(path) => load_test_config(&PathBuf::from(path))?,
        None => {
            // An existing file at the conventional location wins over the
            // scenario's built-in parameters.
            match default_config_path().filter(|p| p.exists()) {
                Some(path) => load_test_config(&path)?,
                None => scenario.test_config(duration),
            }
        }
    };

    let results_path = matches
        .get_one::<String>("results")
        .map(PathBuf::from)
        .unwrap_or_else(JsonlStore::default_path);

    log::info!(
        "scenario {scenario_name}, test duration {} s",
        test_config.test_duration_s
    );

    println!(
        "Scenario: {} ({})",
        style(scenario_name).bold(),
        scenario.describe()
    );
    println!("Results:  {}", results_path.display());
    println!();

    let clock = MockClock::new();
    let rig = SimRig::with_config(clock.clone(), scenario.rig_config());
    let store = JsonlStore::new(results_path);

    let mut engine = Engine::new(Resources {
        valves: rig.valve_actuator(),
        pressure: rig.pressure_source(),
        clock: clock.clone(),
        store,
        printer: None,
    });
    engine.add_observer(Arc::new(PhasePrinter::default()));

    scenario.arm(&rig, &engine.stop_latch());

    engine
        .start(test_config)
        .map_err(|e| anyhow!("start rejected: {e}"))?;
    let outcome = engine
        .wait()
        .ok_or_else(|| anyhow!("run thread terminated abnormally"))?;

    println!();
    report(&outcome);
    Ok(())
}

/// Prints one line per engine phase transition.
#[derive(Default)]
struct PhasePrinter {
    last: Mutex<Option<RunState>>,
}

impl StatusObserver for PhasePrinter {
    fn on_status(&self, snapshot: &StatusSnapshot) {
        let mut last = self.last.lock().unwrap();
        if *last != Some(snapshot.state) {
            *last = Some(snapshot.state);
            println!(
                "[{:>6.1} s] {}",
                snapshot.elapsed_ms as f32 / 1000.0,
                style(&snapshot.detail).cyan()
            );
        }
    }
}

fn report(outcome: &RunOutcome) {
    let verdict = if outcome.overall_pass {
        style("PASS").green().bold()
    } else {
        style("FAIL").red().bold()
    };
    println!("Overall result: {verdict}");
    if let Some(error) = &outcome.error {
        println!("Run fault:      {}", style(error).red());
    }
    if let Some(error) = &outcome.persistence_error {
        println!("Persistence:    {}", style(error).yellow());
    }
    println!();
    for (index, chamber) in outcome.record.chambers.iter().enumerate() {
        print_chamber(index, chamber);
    }
}

fn print_chamber(index: usize, chamber: &ChamberSummary) {
    if !chamber.enabled {
        println!("  chamber {}: {}", index + 1, style("disabled").dim());
        return;
    }
    let verdict = if chamber.result {
        style("pass").green()
    } else {
        style("fail").red()
    };
    println!(
        "  chamber {}: {}  start {:7.1} mbar  final {:7.1} mbar  drop {:5.1} mbar  std {:4.2}",
        index + 1,
        verdict,
        chamber.start_pressure,
        chamber.final_pressure,
        chamber.pressure_drop(),
        chamber.pressure_std,
    );
}
