//! End-to-end exercises of the execution controller against the simulated
//! driver: arming compiles and writes the expected buffers, the start order
//! keeps the clock last, retriggering follows the run flags, and every
//! operation respects the lifecycle state.

use ndarray::{s, Array2};
use seqexpctrl_backend::{
    ChannelTable, CtrlError, DriverError, ExecState, ExecutionController, SimDriver,
};

fn test_table() -> ChannelTable {
    ChannelTable::from_json_str(
        r#"{
            "digital_out": {
                "(4) PulseTrigger": { "address": "Dev1/port0/line4" },
                "(5) CamTrigger": { "address": "Dev1/port0/line5", "invert_polarity": true }
            },
            "analog_out": { "AO0": "Dev1/ao1" },
            "analog_in": { "AI0": "Dev1/ai0" },
            "clock": { "counter": "Dev1/ctr0", "terminal": "/Dev1/Ctr0InternalOutput" }
        }"#,
    )
    .unwrap()
}

fn controller(driver: &SimDriver) -> ExecutionController<SimDriver> {
    ExecutionController::new(driver.clone(), test_table()).unwrap()
}

/// Registers the standard sequence used by most tests: two digital windows,
/// one analog level, one monitor input. Armed at 1 ms / 1 MHz this compiles
/// to 1000 samples per channel.
fn load_sequence(ctrl: &mut ExecutionController<SimDriver>) {
    ctrl.add_digital_output("(4) PulseTrigger", 100e-6, 300e-6)
        .unwrap();
    ctrl.add_digital_output("(5) CamTrigger", 250e-6, 400e-6)
        .unwrap();
    ctrl.add_analog_output("AO0", 0.0, 500e-6, 2.5).unwrap();
    ctrl.add_analog_input("AI0", -5.0, 5.0).unwrap();
}

fn expected_digital() -> Array2<u8> {
    let mut data = Array2::<u8>::zeros((2, 1000));
    data.slice_mut(s![0, 100..300]).fill(1);
    // CamTrigger is polarity-inverted: idle high, low inside the window
    data.row_mut(1).fill(1);
    data.slice_mut(s![1, 250..400]).fill(0);
    data
}

#[test]
fn start_from_idle_is_rejected() {
    let driver = SimDriver::new();
    let mut ctrl = controller(&driver);
    let err = ctrl.start(false).unwrap_err();
    assert!(matches!(err, CtrlError::InvalidState { op: "start", .. }));
    assert_eq!(ctrl.state(), ExecState::Idle);
}

#[test]
fn arm_compiles_and_writes_buffers() {
    let driver = SimDriver::new();
    let mut ctrl = controller(&driver);
    load_sequence(&mut ctrl);

    let warnings = ctrl.arm(1e-3, 1e6).unwrap();
    assert!(warnings.is_empty());
    assert_eq!(ctrl.state(), ExecState::Armed);
    assert_eq!(ctrl.armed_seq_len(), Some(1000));

    let digital = driver.task("digital-out").unwrap();
    assert_eq!(digital.written_digital().unwrap(), expected_digital());
    assert_eq!(
        digital.channel_addresses(),
        vec!["Dev1/port0/line4", "Dev1/port0/line5"]
    );
    assert!(digital.is_committed());
    assert!(!digital.is_running());

    let analog = driver.task("analog-out").unwrap();
    let written = analog.written_analog().unwrap();
    assert_eq!(written.dim(), (1, 1000));
    assert_eq!(written[[0, 0]], 2.5);
    assert_eq!(written[[0, 499]], 2.5);
    assert_eq!(written[[0, 500]], 0.0);
}

#[test]
fn arm_configures_clocking() {
    let driver = SimDriver::new();
    let mut ctrl = controller(&driver);
    load_sequence(&mut ctrl);
    ctrl.arm(1e-3, 1e6).unwrap();

    let clock = driver.task("clock").unwrap();
    assert_eq!(clock.clock_chan(), Some(("Dev1/ctr0".to_string(), 1e6)));
    assert_eq!(clock.implicit_timing(), Some(1000));

    for label in ["digital-out", "analog-out", "analog-in"] {
        let task = driver.task(label).unwrap();
        assert_eq!(
            task.sample_clk(),
            Some(("/Dev1/Ctr0InternalOutput".to_string(), 1e6, 1000)),
            "engine {} clocks off the shared terminal",
            label
        );
    }

    let acquisition = driver.task("analog-in").unwrap();
    assert_eq!(acquisition.channel_volt_ranges(), vec![Some((-5.0, 5.0))]);
}

#[test]
fn start_begins_engines_before_clock() {
    let driver = SimDriver::new();
    let mut ctrl = controller(&driver);
    load_sequence(&mut ctrl);
    ctrl.arm(1e-3, 1e6).unwrap();
    ctrl.start(false).unwrap();
    assert_eq!(ctrl.state(), ExecState::Running);

    let order = driver.start_order();
    assert_eq!(order.last().map(String::as_str), Some("clock"));
    assert_eq!(order.len(), 4);
    for label in ["digital-out", "analog-out", "analog-in"] {
        assert!(order.contains(&label.to_string()));
    }
}

#[test]
fn run_only_once_halts_after_one_period() {
    let driver = SimDriver::new();
    let mut ctrl = controller(&driver);
    load_sequence(&mut ctrl);
    ctrl.arm(1e-3, 1e6).unwrap();
    ctrl.start(true).unwrap();

    let digital = driver.task("digital-out").unwrap();
    digital.fire_done(0);
    assert_eq!(digital.start_count(), 1);
    assert!(!digital.is_running());
}

#[test]
fn continuous_run_retriggers_each_period() {
    let driver = SimDriver::new();
    let mut ctrl = controller(&driver);
    load_sequence(&mut ctrl);
    ctrl.arm(1e-3, 1e6).unwrap();
    ctrl.start(false).unwrap();

    let digital = driver.task("digital-out").unwrap();
    digital.fire_done(0);
    assert_eq!(digital.start_count(), 2);
    assert!(digital.is_running());
    digital.fire_done(0);
    assert_eq!(digital.start_count(), 3);
}

#[test]
fn negative_completion_status_still_honors_run_flag() {
    let driver = SimDriver::new();
    let mut ctrl = controller(&driver);
    load_sequence(&mut ctrl);
    ctrl.arm(1e-3, 1e6).unwrap();
    ctrl.start(false).unwrap();

    let digital = driver.task("digital-out").unwrap();
    digital.fire_done(-200010);
    assert_eq!(digital.start_count(), 2);
}

#[test]
fn stop_returns_to_idle_and_disarms_retrigger() {
    let driver = SimDriver::new();
    let mut ctrl = controller(&driver);
    load_sequence(&mut ctrl);
    ctrl.arm(1e-3, 1e6).unwrap();
    ctrl.start(false).unwrap();
    ctrl.stop().unwrap();
    assert_eq!(ctrl.state(), ExecState::Idle);

    // A completion landing after stop() must not restart anything
    let digital = driver.task("digital-out").unwrap();
    digital.fire_done(0);
    assert_eq!(digital.start_count(), 1);
    assert!(!digital.is_running());
    assert!(!driver.task("clock").unwrap().is_running());
}

#[test]
fn mutations_rejected_while_running() {
    let driver = SimDriver::new();
    let mut ctrl = controller(&driver);
    load_sequence(&mut ctrl);
    ctrl.arm(1e-3, 1e6).unwrap();
    ctrl.start(false).unwrap();

    assert!(matches!(
        ctrl.arm(1e-3, 1e6),
        Err(CtrlError::InvalidState { op: "arm", .. })
    ));
    assert!(matches!(
        ctrl.add_digital_output("(4) PulseTrigger", 0.0, 1e-6),
        Err(CtrlError::InvalidState { .. })
    ));
    assert!(matches!(
        ctrl.clear_digital_sequence(),
        Err(CtrlError::InvalidState { .. })
    ));
    assert_eq!(ctrl.state(), ExecState::Running);
}

#[test]
fn stop_from_armed_is_rejected() {
    let driver = SimDriver::new();
    let mut ctrl = controller(&driver);
    load_sequence(&mut ctrl);
    ctrl.arm(1e-3, 1e6).unwrap();
    let err = ctrl.stop().unwrap_err();
    assert!(matches!(err, CtrlError::InvalidState { op: "stop", .. }));
    assert_eq!(ctrl.state(), ExecState::Armed);
}

#[test]
fn out_of_range_entries_are_skipped_and_reported() {
    let driver = SimDriver::new();
    let mut ctrl = controller(&driver);
    ctrl.add_digital_output("(4) PulseTrigger", 100e-6, 300e-6)
        .unwrap();
    ctrl.add_digital_output("(4) PulseTrigger", 900e-6, 1.2e-3)
        .unwrap();

    let warnings = ctrl.arm(1e-3, 1e6).unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].channel, "(4) PulseTrigger");

    let written = driver.task("digital-out").unwrap().written_digital().unwrap();
    assert_eq!(written[[0, 150]], 1);
    assert_eq!(written[[0, 950]], 0);
}

#[test]
fn unmapped_channel_fails_arm_then_recovers() {
    let driver = SimDriver::new();
    let mut ctrl = controller(&driver);
    ctrl.add_digital_output("Bogus", 0.0, 100e-6).unwrap();

    let err = ctrl.arm(1e-3, 1e6).unwrap_err();
    assert!(matches!(err, CtrlError::MissingChannelMapping(name) if name == "Bogus"));
    assert_eq!(ctrl.state(), ExecState::Idle);

    ctrl.clear_digital_sequence().unwrap();
    ctrl.add_digital_output("(4) PulseTrigger", 0.0, 100e-6)
        .unwrap();
    ctrl.arm(1e-3, 1e6).unwrap();
    assert_eq!(ctrl.state(), ExecState::Armed);
}

#[test]
fn driver_failure_during_arm_leaves_controller_rearmable() {
    let driver = SimDriver::new();
    let mut ctrl = controller(&driver);
    load_sequence(&mut ctrl);

    driver.refuse_new_tasks(true);
    let err = ctrl.arm(1e-3, 1e6).unwrap_err();
    assert!(matches!(err, CtrlError::Driver(DriverError::Busy(_))));
    assert_eq!(ctrl.state(), ExecState::Idle);

    driver.refuse_new_tasks(false);
    ctrl.arm(1e-3, 1e6).unwrap();
    assert_eq!(ctrl.state(), ExecState::Armed);
}

#[test]
fn read_analog_values_returns_named_rows() {
    let driver = SimDriver::new();
    driver.set_ai_level(1.25);
    let mut ctrl = controller(&driver);
    load_sequence(&mut ctrl);
    ctrl.arm(1e-3, 1e6).unwrap();
    ctrl.start(false).unwrap();

    let values = ctrl.read_analog_values(4).unwrap();
    assert_eq!(values.len(), 1);
    assert_eq!(values["AI0"], vec![1.25; 4]);
}

#[test]
fn read_without_acquisition_engine_is_an_error() {
    let driver = SimDriver::new();
    let mut ctrl = controller(&driver);
    ctrl.add_digital_output("(4) PulseTrigger", 0.0, 100e-6)
        .unwrap();
    ctrl.arm(1e-3, 1e6).unwrap();
    assert!(matches!(
        ctrl.read_analog_values(4),
        Err(CtrlError::NoAnalogInputEngine)
    ));
}

#[test]
fn read_before_start_times_out() {
    let driver = SimDriver::new();
    let mut ctrl = controller(&driver);
    load_sequence(&mut ctrl);
    ctrl.arm(1e-3, 1e6).unwrap();

    let err = ctrl.read_analog_values(4).unwrap_err();
    assert!(matches!(
        err,
        CtrlError::Driver(DriverError::ReadTimeout { .. })
    ));
}

#[test]
fn rearming_reproduces_identical_buffers() {
    let driver = SimDriver::new();
    let mut ctrl = controller(&driver);
    load_sequence(&mut ctrl);

    ctrl.arm(1e-3, 1e6).unwrap();
    let first = driver.task("digital-out").unwrap().written_digital().unwrap();
    // Re-arm from Armed, then run a full start/stop cycle and arm again
    ctrl.arm(1e-3, 1e6).unwrap();
    let second = driver.task("digital-out").unwrap().written_digital().unwrap();
    assert_eq!(first, second);

    ctrl.start(false).unwrap();
    ctrl.stop().unwrap();
    ctrl.arm(1e-3, 1e6).unwrap();
    let third = driver.task("digital-out").unwrap().written_digital().unwrap();
    assert_eq!(first, third);
}

#[test]
fn cleared_digital_channels_leave_no_stale_buffers() {
    let driver = SimDriver::new();
    let mut ctrl = controller(&driver);
    load_sequence(&mut ctrl);
    ctrl.arm(1e-3, 1e6).unwrap();
    assert!(driver.task("digital-out").unwrap().written_digital().is_some());

    ctrl.clear_digital_sequence().unwrap();
    ctrl.arm(1e-3, 1e6).unwrap();

    // No digital channels remain, so the new engine set has no digital
    // task; the one visible in the driver is the discarded previous one.
    let stale = driver.task("digital-out").unwrap();
    assert!(!stale.is_running());
    ctrl.start(false).unwrap();
    assert!(!driver.start_order().contains(&"digital-out".to_string()));
}

#[test]
fn channel_list_follows_the_table() {
    let driver = SimDriver::new();
    let ctrl = controller(&driver);
    let (digital, analog_in, analog_out) = ctrl.channel_list();
    assert_eq!(digital, vec!["(4) PulseTrigger", "(5) CamTrigger"]);
    assert_eq!(analog_in, vec!["AI0"]);
    assert_eq!(analog_out, vec!["AO0"]);
}

#[test]
fn polarity_is_seeded_from_the_table() {
    let driver = SimDriver::new();
    let mut ctrl = controller(&driver);
    ctrl.add_digital_output("(5) CamTrigger", 0.0, 100e-6)
        .unwrap();
    let chan = ctrl.registry().chan("(5) CamTrigger").unwrap();
    assert!(chan.invert_polarity());
}
