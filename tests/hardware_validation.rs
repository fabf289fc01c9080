//! Lab Rack Hardware Validation Tests
//!
//! Smoke tests against the physically connected instruments. Addresses
//! below match the cryostat rack's usual wiring; adjust before running on
//! another setup.
//!
//! Run with: cargo test --features "hardware_tests,gpib" --test hardware_validation -- --nocapture --test-threads=1
//!
//! SAFETY: These tests only read. Nothing here ramps the magnet, changes a
//! set point or switches a relay.

#![cfg(feature = "hardware_tests")]

use std::time::Duration;

#[cfg(feature = "gpib")]
use cryolab::visa;

#[cfg(feature = "gpib")]
const ITC_ADDRESS: &str = "GPIB::24";
#[cfg(feature = "gpib")]
const ILM_ADDRESS: &str = "GPIB::6";
#[cfg(feature = "gpib")]
const LOCKIN_ADDRESS: &str = "GPIB::8";

#[cfg(feature = "serial")]
const GAUGE_PORT: &str = "/dev/ttyUSB0";
#[cfg(feature = "serial")]
const FLOW_PORT: &str = "/dev/ttyUSB1";
#[cfg(feature = "modbus")]
const MINI8_PORT: &str = "/dev/ttyUSB2";

#[cfg(feature = "gpib")]
#[test]
fn test_itc503_reports_plausible_temperatures() {
    use cryolab::devices::oxford::Itc503;

    let handle = visa::open(ITC_ADDRESS, Duration::from_secs(2)).expect("open ITC");
    let mut itc = Itc503::new(handle).expect("wrap ITC");

    for sensor in 1..=3 {
        let kelvin = itc.temperature(sensor).expect("read sensor");
        println!("ITC sensor {sensor}: {kelvin} K");
        assert!(
            (0.0..400.0).contains(&kelvin),
            "sensor {sensor} reads {kelvin} K"
        );
    }
}

#[cfg(feature = "gpib")]
#[test]
fn test_ilm_level_is_a_percentage() {
    use cryolab::devices::oxford::Ilm;

    let handle = visa::open(ILM_ADDRESS, Duration::from_secs(2)).expect("open ILM");
    let mut ilm = Ilm::new(handle).expect("wrap ILM");

    let level = ilm.helium_level().expect("read level");
    println!("helium level: {level} %");
    assert!((0.0..=100.0).contains(&level));
}

#[cfg(feature = "gpib")]
#[test]
fn test_sr830_snapshot_is_finite() {
    use cryolab::devices::srs::Sr830;

    let handle = visa::open(LOCKIN_ADDRESS, Duration::from_secs(2)).expect("open lock-in");
    let mut lia = Sr830::new(handle).expect("wrap lock-in");

    let snap = lia.snapshot().expect("snapshot");
    println!("lock-in: {snap:?}");
    assert!(snap.x.is_finite() && snap.y.is_finite());
    assert!(snap.frequency > 0.0);
}

#[cfg(feature = "serial")]
#[test]
fn test_tpg361_reports_a_gauge_state() {
    use cryolab::devices::pfeiffer::Tpg361;

    let mut gauge = Tpg361::open(GAUGE_PORT, Duration::from_secs(2)).expect("open gauge");
    let (state, mbar) = gauge.pressure(1).expect("read pressure");
    println!("gauge 1: {state:?} at {mbar} mbar");
    assert!(mbar.is_finite());
}

#[cfg(feature = "serial")]
#[test]
fn test_alicat_data_frame_has_all_fields() {
    use cryolab::devices::alicat::FlowController;

    let mut flow =
        FlowController::open(FLOW_PORT, 'A', Duration::from_secs(2)).expect("open controller");
    let fields = flow.poll().expect("poll");
    println!("alicat frame: {fields:?}");
    assert!(fields.len() >= 6, "short frame: {fields:?}");
    assert_eq!(fields[0], "A");
}

#[cfg(feature = "modbus")]
#[test]
fn test_mini8_thermocouples_read_in_range() {
    use cryolab::devices::eurotherm::Mini8;

    let mini8 = Mini8::open(MINI8_PORT, Duration::from_secs(1)).expect("open Mini8");
    for sensor in 0..2 {
        let celsius = mini8.temperature(sensor).expect("read thermocouple");
        println!("thermocouple {sensor}: {celsius} C");
        assert!((-50.0..800.0).contains(&celsius));
    }
}
