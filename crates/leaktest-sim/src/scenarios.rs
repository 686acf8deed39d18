//! Named simulation scenarios.
//!
//! Each scenario pairs a rig setup (fill/vent/leak rates, fault injection,
//! timed events) with a matching test configuration, covering the
//! interesting run shapes: a clean pass, a leaking chamber, an operator
//! stop mid-fill, a dying sensor, and a supply too weak to fill in time.

use leaktest_core::{ChamberConfig, StopLatch, TestConfig, TestMode};
use leaktest_hal::{SimRig, SimRigConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// All chambers hold pressure; the run passes.
    Pass,
    /// Chamber 2 loses 2 mbar/s and fails its threshold.
    Leak,
    /// The operator stops the run three seconds into filling.
    StopMidFill,
    /// The sensor dies fifteen seconds into the run.
    SensorFault,
    /// The supply fills at 5 mbar/s against a 600 mbar target.
    SlowFill,
}

impl Scenario {
    pub const NAMES: [&'static str; 5] =
        ["pass", "leak", "stop-mid-fill", "sensor-fault", "slow-fill"];

    pub fn from_name(name: &str) -> Option<Scenario> {
        match name {
            "pass" => Some(Scenario::Pass),
            "leak" => Some(Scenario::Leak),
            "stop-mid-fill" => Some(Scenario::StopMidFill),
            "sensor-fault" => Some(Scenario::SensorFault),
            "slow-fill" => Some(Scenario::SlowFill),
            _ => None,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Scenario::Pass => "all chambers hold pressure and the run passes",
            Scenario::Leak => "chamber 2 leaks 2 mbar/s and fails",
            Scenario::StopMidFill => "stop requested 3 s into filling",
            Scenario::SensorFault => "pressure sensor dies 15 s into the run",
            Scenario::SlowFill => "supply too weak, fill times out",
        }
    }

    /// Rig pneumatics for this scenario.
    pub fn rig_config(self) -> SimRigConfig {
        match self {
            Scenario::SlowFill => SimRigConfig {
                fill_rate: 5.0,
                ..SimRigConfig::default()
            },
            Scenario::Leak => SimRigConfig {
                leak_rate: [0.0, 2.0, 0.0],
                ..SimRigConfig::default()
            },
            _ => SimRigConfig::default(),
        }
    }

    /// Install the scenario's timed events and fault injections.
    pub fn arm(self, rig: &SimRig, latch: &StopLatch) {
        match self {
            Scenario::StopMidFill => {
                let stop = latch.clone();
                rig.schedule(3_000, move || stop.trigger());
            }
            Scenario::SensorFault => rig.fail_reads_from(15_000),
            _ => {}
        }
    }

    /// Test parameters matching the scenario.
    pub fn test_config(self, duration_s: u32) -> TestConfig {
        let (target_mbar, threshold_mbar) = match self {
            Scenario::SlowFill => (600, 580),
            _ => (300, 290),
        };
        TestConfig {
            chambers: std::array::from_fn(|_| ChamberConfig {
                enabled: true,
                target_mbar,
                threshold_mbar,
                tolerance_mbar: 5,
                offset_mbar: 0.0,
            }),
            test_duration_s: duration_s,
            mode: TestMode::Manual,
            operator_id: None,
            operator_name: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_name_resolves() {
        for name in Scenario::NAMES {
            assert!(Scenario::from_name(name).is_some(), "unknown name {name}");
        }
        assert!(Scenario::from_name("bogus").is_none());
    }

    #[test]
    fn scenario_configs_are_valid() {
        for name in Scenario::NAMES {
            let scenario = Scenario::from_name(name).unwrap();
            assert!(scenario.test_config(10).validate().is_ok());
        }
    }
}
