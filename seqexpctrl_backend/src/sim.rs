//! A simulated hardware driver.
//!
//! [`SimDriver`] implements the [`HardwareDriver`] boundary entirely in
//! memory: tasks record the channels created on them, their clocking
//! configuration and the buffers written to them, and expose
//! [`SimTask::fire_done`] so that tests (and the demo binary) can play the
//! role of the hardware completion context. A shared start-order log allows
//! asserting that the generation/acquisition engines reach their
//! waiting-for-clock state before the clock engine starts.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use ndarray::Array2;
use parking_lot::Mutex;

use crate::driver::{DoneCallback, DriverError, HardwareDriver, HardwareTask, PeriodCompleted};

#[derive(Debug, Clone)]
struct SimChan {
    address: String,
    name: String,
    volt_range: Option<(f64, f64)>,
}

#[derive(Default)]
struct SimState {
    start_log: Mutex<Vec<String>>,
    tasks: Mutex<IndexMap<String, Arc<SimTaskInner>>>,
    refuse_new_tasks: AtomicBool,
    ai_level: Mutex<f64>,
}

/// Simulated driver handle. Cheap to clone; clones share all state, so a
/// clone kept by a test can inspect tasks created through the controller's
/// copy.
#[derive(Clone, Default)]
pub struct SimDriver {
    state: Arc<SimState>,
}

impl SimDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `new_task` fail with [`DriverError::Busy`], to exercise
    /// arm-time hardware failures.
    pub fn refuse_new_tasks(&self, refuse: bool) {
        self.state.refuse_new_tasks.store(refuse, Ordering::SeqCst);
    }

    /// Constant voltage returned by every analog input read.
    pub fn set_ai_level(&self, volts: f64) {
        *self.state.ai_level.lock() = volts;
    }

    /// Labels of every task start, in order, retriggers included.
    pub fn start_order(&self) -> Vec<String> {
        self.state.start_log.lock().clone()
    }

    /// The most recently created task with the given label.
    pub fn task(&self, label: &str) -> Option<SimTask> {
        self.state
            .tasks
            .lock()
            .get(label)
            .map(|inner| SimTask {
                inner: Arc::clone(inner),
            })
    }
}

impl HardwareDriver for SimDriver {
    type Task = SimTask;

    fn new_task(&self, label: &str) -> Result<SimTask, DriverError> {
        if self.state.refuse_new_tasks.load(Ordering::SeqCst) {
            return Err(DriverError::Busy(format!(
                "simulated driver refusing task {}",
                label
            )));
        }
        let inner = Arc::new(SimTaskInner {
            label: label.to_string(),
            state: Arc::clone(&self.state),
            chans: Mutex::new(Vec::new()),
            clock_chan: Mutex::new(None),
            sample_clk: Mutex::new(None),
            implicit_timing: Mutex::new(None),
            digital_data: Mutex::new(None),
            analog_data: Mutex::new(None),
            committed: AtomicBool::new(false),
            running: AtomicBool::new(false),
            start_count: AtomicUsize::new(0),
            done_cb: Mutex::new(None),
        });
        self.state
            .tasks
            .lock()
            .insert(label.to_string(), Arc::clone(&inner));
        Ok(SimTask { inner })
    }
}

struct SimTaskInner {
    label: String,
    state: Arc<SimState>,
    chans: Mutex<Vec<SimChan>>,
    clock_chan: Mutex<Option<(String, f64)>>,
    sample_clk: Mutex<Option<(String, f64, u64)>>,
    implicit_timing: Mutex<Option<u64>>,
    digital_data: Mutex<Option<Array2<u8>>>,
    analog_data: Mutex<Option<Array2<f64>>>,
    committed: AtomicBool,
    running: AtomicBool,
    start_count: AtomicUsize,
    done_cb: Mutex<Option<DoneCallback>>,
}

/// One simulated task. Records every configuration call for inspection.
pub struct SimTask {
    inner: Arc<SimTaskInner>,
}

impl SimTask {
    pub fn label(&self) -> String {
        self.inner.label.clone()
    }
    pub fn channel_names(&self) -> Vec<String> {
        self.inner.chans.lock().iter().map(|c| c.name.clone()).collect()
    }
    pub fn channel_addresses(&self) -> Vec<String> {
        self.inner
            .chans
            .lock()
            .iter()
            .map(|c| c.address.clone())
            .collect()
    }
    pub fn channel_volt_ranges(&self) -> Vec<Option<(f64, f64)>> {
        self.inner.chans.lock().iter().map(|c| c.volt_range).collect()
    }
    pub fn clock_chan(&self) -> Option<(String, f64)> {
        self.inner.clock_chan.lock().clone()
    }
    pub fn sample_clk(&self) -> Option<(String, f64, u64)> {
        self.inner.sample_clk.lock().clone()
    }
    pub fn implicit_timing(&self) -> Option<u64> {
        *self.inner.implicit_timing.lock()
    }
    pub fn written_digital(&self) -> Option<Array2<u8>> {
        self.inner.digital_data.lock().clone()
    }
    pub fn written_analog(&self) -> Option<Array2<f64>> {
        self.inner.analog_data.lock().clone()
    }
    pub fn is_committed(&self) -> bool {
        self.inner.committed.load(Ordering::SeqCst)
    }
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }
    pub fn start_count(&self) -> usize {
        self.inner.start_count.load(Ordering::SeqCst)
    }

    /// Delivers a completion event to the registered callback, as the
    /// hardware driver would on buffer exhaustion. The caller's thread plays
    /// the role of the driver's execution context.
    pub fn fire_done(&self, status: i32) {
        let cb = self.inner.done_cb.lock();
        if let Some(cb) = cb.as_ref() {
            cb(PeriodCompleted { status });
        }
    }

    fn push_chan(&self, address: &str, name: &str, volt_range: Option<(f64, f64)>) {
        self.inner.chans.lock().push(SimChan {
            address: address.to_string(),
            name: name.to_string(),
            volt_range,
        });
    }
}

impl HardwareTask for SimTask {
    fn create_clock_chan(&self, counter: &str, rate: f64) -> Result<(), DriverError> {
        *self.inner.clock_chan.lock() = Some((counter.to_string(), rate));
        Ok(())
    }

    fn create_do_chan(&self, address: &str, name: &str) -> Result<(), DriverError> {
        self.push_chan(address, name, None);
        Ok(())
    }

    fn create_ao_chan(
        &self,
        address: &str,
        name: &str,
        min_volt: f64,
        max_volt: f64,
    ) -> Result<(), DriverError> {
        self.push_chan(address, name, Some((min_volt, max_volt)));
        Ok(())
    }

    fn create_ai_chan(
        &self,
        address: &str,
        name: &str,
        min_volt: f64,
        max_volt: f64,
    ) -> Result<(), DriverError> {
        self.push_chan(address, name, Some((min_volt, max_volt)));
        Ok(())
    }

    fn cfg_sample_clk(
        &self,
        src: &str,
        rate: f64,
        samps_per_period: u64,
    ) -> Result<(), DriverError> {
        *self.inner.sample_clk.lock() = Some((src.to_string(), rate, samps_per_period));
        Ok(())
    }

    fn cfg_implicit_timing(&self, samps_per_period: u64) -> Result<(), DriverError> {
        *self.inner.implicit_timing.lock() = Some(samps_per_period);
        Ok(())
    }

    fn write_digital_lines(&self, data: &Array2<u8>) -> Result<usize, DriverError> {
        let nchans = self.inner.chans.lock().len();
        if data.dim().0 != nchans {
            return Err(DriverError::Fault(format!(
                "task {}: buffer has {} rows but {} channels",
                self.inner.label,
                data.dim().0,
                nchans
            )));
        }
        *self.inner.digital_data.lock() = Some(data.clone());
        Ok(data.dim().1)
    }

    fn write_analog(&self, data: &Array2<f64>) -> Result<usize, DriverError> {
        let nchans = self.inner.chans.lock().len();
        if data.dim().0 != nchans {
            return Err(DriverError::Fault(format!(
                "task {}: buffer has {} rows but {} channels",
                self.inner.label,
                data.dim().0,
                nchans
            )));
        }
        *self.inner.analog_data.lock() = Some(data.clone());
        Ok(data.dim().1)
    }

    fn read_analog(&self, samps_per_chan: usize, timeout: f64) -> Result<Array2<f64>, DriverError> {
        // Samples only accumulate while the engine is consuming clock edges
        if !self.inner.running.load(Ordering::SeqCst) {
            return Err(DriverError::ReadTimeout { timeout });
        }
        let nchans = self.inner.chans.lock().len();
        let level = *self.inner.state.ai_level.lock();
        Ok(Array2::from_elem((nchans, samps_per_chan), level))
    }

    fn register_done_callback(&self, callback: DoneCallback) -> Result<(), DriverError> {
        *self.inner.done_cb.lock() = Some(callback);
        Ok(())
    }

    fn commit(&self) -> Result<(), DriverError> {
        self.inner.committed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn start(&self) -> Result<(), DriverError> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Err(DriverError::Busy(format!(
                "task {} is already running",
                self.inner.label
            )));
        }
        self.inner.start_count.fetch_add(1, Ordering::SeqCst);
        self.inner.state.start_log.lock().push(self.inner.label.clone());
        Ok(())
    }

    fn stop(&self) -> Result<(), DriverError> {
        // Idempotent, like the vendor driver's task stop
        self.inner.running.store(false, Ordering::SeqCst);
        Ok(())
    }
}
