//! The hardware driver boundary.
//!
//! The execution controller never talks to a vendor DAQ library directly; it
//! consumes the capability set below. A [`HardwareDriver`] creates tasks and
//! a [`HardwareTask`] wraps one generation/acquisition/clock task bound to a
//! named hardware clock signal, exposing configure/write/read/start/stop and
//! a completion-callback hook.
//!
//! Completion callbacks are invoked by the driver from its own execution
//! context whenever a task exhausts its configured sample count, so they run
//! concurrently with the caller's thread. Handlers must therefore be
//! `Send + Sync` and touch only state designed for that (see
//! [`EngineAdapter`]).
//!
//! [`EngineAdapter`]: crate::adapter::EngineAdapter

use ndarray::Array2;
use thiserror::Error;

/// Errors surfaced by a hardware driver.
///
/// `ReadTimeout` signals only that samples were not ready in time and is
/// deliberately distinct from a hardware fault.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DriverError {
    #[error("hardware fault: {0}")]
    Fault(String),
    #[error("device busy: {0}")]
    Busy(String),
    #[error("read timed out after {timeout} s")]
    ReadTimeout { timeout: f64 },
}

/// Completion event delivered when a task exhausts its configured sample
/// count. `status` follows the driver convention that negative means error.
#[derive(Debug, Clone, Copy)]
pub struct PeriodCompleted {
    pub status: i32,
}

/// Handler signature for completion events. Invoked from the driver's own
/// execution context, not the caller's thread.
pub type DoneCallback = Box<dyn Fn(PeriodCompleted) + Send + Sync>;

/// One vendor task: a generation, acquisition or clock engine.
pub trait HardwareTask: Send + Sync {
    /// Adds a free-running pulse (counter) channel at the given rate.
    fn create_clock_chan(&self, counter: &str, rate: f64) -> Result<(), DriverError>;
    /// Adds one digital output line.
    fn create_do_chan(&self, address: &str, name: &str) -> Result<(), DriverError>;
    /// Adds one analog output line with the given voltage limits.
    fn create_ao_chan(
        &self,
        address: &str,
        name: &str,
        min_volt: f64,
        max_volt: f64,
    ) -> Result<(), DriverError>;
    /// Adds one analog input line with the given voltage range.
    fn create_ai_chan(
        &self,
        address: &str,
        name: &str,
        min_volt: f64,
        max_volt: f64,
    ) -> Result<(), DriverError>;

    /// Clocks the task off `src` at `rate`, generating/acquiring a finite
    /// `samps_per_period` samples per start.
    fn cfg_sample_clk(&self, src: &str, rate: f64, samps_per_period: u64)
        -> Result<(), DriverError>;
    /// Implicit timing for clock tasks: the pulse train free-runs, with
    /// `samps_per_period` pulses forming one logical period.
    fn cfg_implicit_timing(&self, samps_per_period: u64) -> Result<(), DriverError>;

    /// Writes one row per channel, one column per sample.
    fn write_digital_lines(&self, data: &Array2<u8>) -> Result<usize, DriverError>;
    fn write_analog(&self, data: &Array2<f64>) -> Result<usize, DriverError>;
    /// Blocking read of `samps_per_chan` samples per channel, bounded by
    /// `timeout` seconds. Returns one row per channel.
    fn read_analog(&self, samps_per_chan: usize, timeout: f64) -> Result<Array2<f64>, DriverError>;

    /// Registers the handler invoked on buffer exhaustion. Registered once
    /// per task, at arm time.
    fn register_done_callback(&self, callback: DoneCallback) -> Result<(), DriverError>;

    /// Commits the configuration to hardware without starting.
    fn commit(&self) -> Result<(), DriverError>;
    /// Starts the task; a committed, clock-driven task is then waiting for
    /// its clock's first edge.
    fn start(&self) -> Result<(), DriverError>;
    fn stop(&self) -> Result<(), DriverError>;
}

/// Factory for hardware tasks.
pub trait HardwareDriver {
    type Task: HardwareTask + 'static;

    /// Creates a fresh, unconfigured task. `label` is a human-readable name
    /// used in logs and diagnostics.
    fn new_task(&self, label: &str) -> Result<Self::Task, DriverError>;
}
