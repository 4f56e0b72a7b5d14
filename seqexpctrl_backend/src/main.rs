//! Demo: one full arm/start/retrigger/read/stop cycle against the simulated
//! driver. The table and sequence mirror a typical cold-atom shot: two
//! camera/pulse triggers, one analog ramp level, one monitor input.

use seqexpctrl_backend::{
    ChannelTable, ClockSpec, CtrlError, DigitalLine, ExecutionController, SimDriver,
};
use tracing::info;

fn demo_table() -> ChannelTable {
    let mut table = ChannelTable {
        digital_out: Default::default(),
        analog_out: Default::default(),
        analog_in: Default::default(),
        clock: ClockSpec {
            counter: "Dev1/ctr0".to_string(),
            terminal: "/Dev1/Ctr0InternalOutput".to_string(),
        },
    };
    table.digital_out.insert(
        "(4) PulseTrigger".to_string(),
        DigitalLine {
            address: "Dev1/port0/line4".to_string(),
            invert_polarity: false,
        },
    );
    table.digital_out.insert(
        "(5) CamTrigger".to_string(),
        DigitalLine {
            address: "Dev1/port0/line5".to_string(),
            invert_polarity: true,
        },
    );
    table
        .analog_out
        .insert("AO0".to_string(), "Dev1/ao1".to_string());
    table
        .analog_in
        .insert("AI0".to_string(), "Dev1/ai0".to_string());
    table
}

fn main() -> Result<(), CtrlError> {
    tracing_subscriber::fmt().init();

    let driver = SimDriver::new();
    driver.set_ai_level(1.25);
    let mut ctrl = ExecutionController::new(driver.clone(), demo_table())?;

    ctrl.add_digital_output("(4) PulseTrigger", 100e-6, 300e-6)?;
    ctrl.add_digital_output("(5) CamTrigger", 250e-6, 400e-6)?;
    ctrl.add_analog_output("AO0", 0.0, 500e-6, 2.5)?;
    ctrl.add_analog_input("AI0", -5.0, 5.0)?;

    // 1 ms sequence at 1 MHz: 1000 samples per period
    let warnings = ctrl.arm(1e-3, 1e6)?;
    for warning in &warnings {
        info!(%warning, "entry skipped");
    }
    info!(
        seq_len = ctrl.armed_seq_len().unwrap_or(0),
        state = %ctrl.state(),
        "armed"
    );

    ctrl.start(false)?;
    info!(start_order = ?driver.start_order(), state = %ctrl.state(), "running");

    // Play the hardware's role: one period completes on each generation
    // engine, and the run flags retrigger them.
    for label in ["digital-out", "analog-out"] {
        if let Some(task) = driver.task(label) {
            task.fire_done(0);
            info!(engine = label, start_count = task.start_count(), "retriggered");
        }
    }

    let values = ctrl.read_analog_values(5)?;
    for (name, samples) in &values {
        info!(channel = name.as_str(), ?samples, "acquired");
    }

    ctrl.stop()?;
    info!(state = %ctrl.state(), "done");
    Ok(())
}
