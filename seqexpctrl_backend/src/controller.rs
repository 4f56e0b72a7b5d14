//! The execution controller: arm / start / retrigger / stop.
//!
//! One [`ExecutionController`] owns the channel registry, the static channel
//! table and the hardware driver, and coordinates up to three engine
//! adapters (digital-out, analog-out, analog-in) sharing one clock engine.
//!
//! State machine: `Idle` (no hardware engines configured) → `arm()` →
//! `Armed` (buffers compiled and written, engines committed) → `start()` →
//! `Running` (clock pulsing, engines consuming it and retriggering per their
//! run flags) → `stop()` → `Idle`. `arm()` may also be called from `Armed`
//! to recompile; it is invalid while `Running`, as is any registry mutation.
//!
//! All controller operations execute synchronously on the calling thread.
//! The only concurrent activity is the driver's completion callback, which
//! is confined to [`EngineAdapter`] and its atomic run flag.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use ndarray::Array2;
use thiserror::Error;
use tracing::{debug, info};

use seqcompiler_backend::{
    compile_analog, compile_digital, BufferOverrun, Channel, ChannelRegistry, SeqError,
    SequenceClock,
};

use crate::adapter::EngineAdapter;
use crate::config::{BadLineAddress, ChannelTable};
use crate::driver::{DriverError, HardwareDriver, HardwareTask};

/// Bounded wait for analog input samples, seconds.
pub const READ_TIMEOUT_SECS: f64 = 10.0;

/// Output limits for analog generation lines, volts.
const AO_MIN_VOLT: f64 = -5.0;
const AO_MAX_VOLT: f64 = 5.0;

/// Controller lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecState {
    Idle,
    Armed,
    Running,
}
impl fmt::Display for ExecState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ExecState::Idle => "idle",
                ExecState::Armed => "armed",
                ExecState::Running => "running",
            }
        )
    }
}

/// Errors surfaced by controller operations.
#[derive(Debug, Error)]
pub enum CtrlError {
    #[error("{op} is not allowed while the controller is {state}")]
    InvalidState { op: &'static str, state: ExecState },
    #[error("no physical line mapped for channel {0}")]
    MissingChannelMapping(String),
    #[error("no analog input channels are configured")]
    NoAnalogInputEngine,
    #[error(transparent)]
    BadLineAddress(#[from] BadLineAddress),
    #[error(transparent)]
    Sequence(#[from] SeqError),
    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// The engine set of one arm cycle.
struct Engines<T: HardwareTask> {
    clock: Arc<T>,
    digital: Option<EngineAdapter<T>>,
    analog_out: Option<EngineAdapter<T>>,
    analog_in: Option<EngineAdapter<T>>,
    ai_names: Vec<String>,
    seq_len: usize,
}

impl<T: HardwareTask> Engines<T> {
    fn adapters(&self) -> impl Iterator<Item = &EngineAdapter<T>> {
        self.digital
            .iter()
            .chain(self.analog_out.iter())
            .chain(self.analog_in.iter())
    }
}

/// Owns one channel registry and the hardware engines compiled from it.
pub struct ExecutionController<D: HardwareDriver> {
    driver: D,
    table: ChannelTable,
    registry: ChannelRegistry,
    state: ExecState,
    engines: Option<Engines<D::Task>>,
}

impl<D: HardwareDriver> ExecutionController<D> {
    /// Validates the channel table and constructs an idle controller.
    pub fn new(driver: D, table: ChannelTable) -> Result<Self, CtrlError> {
        table.validate()?;
        Ok(Self {
            driver,
            table,
            registry: ChannelRegistry::new(),
            state: ExecState::Idle,
            engines: None,
        })
    }

    pub fn state(&self) -> ExecState {
        self.state
    }
    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// Addressable (digital-output, analog-input, analog-output) channel
    /// names from the static table. Pure query.
    pub fn channel_list(&self) -> (Vec<String>, Vec<String>, Vec<String>) {
        (
            self.table.digital_out.keys().cloned().collect(),
            self.table.analog_in.keys().cloned().collect(),
            self.table.analog_out.keys().cloned().collect(),
        )
    }

    fn check_not_running(&self, op: &'static str) -> Result<(), CtrlError> {
        if self.state == ExecState::Running {
            return Err(CtrlError::InvalidState {
                op,
                state: self.state,
            });
        }
        Ok(())
    }

    /// Appends an active interval to the named digital output channel,
    /// seeding the polarity flag from the channel table.
    pub fn add_digital_output(
        &mut self,
        name: &str,
        t_start: f64,
        t_stop: f64,
    ) -> Result<(), CtrlError> {
        self.check_not_running("add_digital_output")?;
        self.registry.add_digital_output(name, t_start, t_stop)?;
        if let Some(line) = self.table.digital_out.get(name) {
            self.registry
                .set_invert_polarity(name, line.invert_polarity)?;
        }
        Ok(())
    }

    pub fn add_analog_output(
        &mut self,
        name: &str,
        t_start: f64,
        t_stop: f64,
        voltage: f64,
    ) -> Result<(), CtrlError> {
        self.check_not_running("add_analog_output")?;
        self.registry
            .add_analog_output(name, t_start, t_stop, voltage)?;
        Ok(())
    }

    pub fn add_analog_input(
        &mut self,
        name: &str,
        min_volt: f64,
        max_volt: f64,
    ) -> Result<(), CtrlError> {
        self.check_not_running("add_analog_input")?;
        self.registry.add_analog_input(name, min_volt, max_volt)?;
        Ok(())
    }

    pub fn clear_digital_sequence(&mut self) -> Result<(), CtrlError> {
        self.check_not_running("clear_digital_sequence")?;
        self.registry.clear_digital_sequence();
        Ok(())
    }

    pub fn clear_analog_output(&mut self) -> Result<(), CtrlError> {
        self.check_not_running("clear_analog_output")?;
        self.registry.clear_analog_output();
        Ok(())
    }

    /// Compiles every output channel against the shared clock and commits
    /// the hardware engines.
    ///
    /// Returns the [`BufferOverrun`] warnings collected during compilation;
    /// entries they refer to were skipped, everything else was compiled and
    /// written. Any configuration failure surfaces immediately: the locally
    /// created tasks are dropped and the controller keeps its pre-arm state,
    /// so `arm()` can simply be retried.
    pub fn arm(&mut self, duration: f64, clock_rate: f64) -> Result<Vec<BufferOverrun>, CtrlError> {
        self.check_not_running("arm")?;
        let clock = SequenceClock::new(clock_rate, duration);
        let seq_len = clock.total_samps();
        info!(duration, clock_rate, seq_len, "arming sequence");
        let mut warnings = Vec::new();

        // Shared clock engine: free-running pulse source, logically periodic
        // with seq_len pulses per period. It is never stopped between
        // periods; the downstream engines decide whether to keep consuming.
        let clock_task = self.driver.new_task("clock")?;
        clock_task.create_clock_chan(&self.table.clock.counter, clock_rate)?;
        clock_task.cfg_implicit_timing(seq_len as u64)?;

        let digital = {
            let chans: Vec<&Channel> = self.registry.digital_outputs().collect();
            if chans.is_empty() {
                None
            } else {
                let task = self.driver.new_task("digital-out")?;
                let mut data = Array2::<u8>::zeros((chans.len(), seq_len));
                for (i, chan) in chans.iter().enumerate() {
                    let line = self.table.digital_out.get(chan.name()).ok_or_else(|| {
                        CtrlError::MissingChannelMapping(chan.name().to_string())
                    })?;
                    task.create_do_chan(&line.address, chan.name())?;
                    let (buf, mut warns) = compile_digital(chan, &clock);
                    warnings.append(&mut warns);
                    data.row_mut(i).assign(&buf);
                }
                task.cfg_sample_clk(&self.table.clock.terminal, clock_rate, seq_len as u64)?;
                task.write_digital_lines(&data)?;
                task.commit()?;
                debug!(channels = chans.len(), "digital generation engine committed");
                let adapter = EngineAdapter::new("digital-out", task);
                adapter.install_retrigger_hook()?;
                Some(adapter)
            }
        };

        let analog_out = {
            let chans: Vec<&Channel> = self.registry.analog_outputs().collect();
            if chans.is_empty() {
                None
            } else {
                let task = self.driver.new_task("analog-out")?;
                let mut data = Array2::<f64>::zeros((chans.len(), seq_len));
                for (i, chan) in chans.iter().enumerate() {
                    let address = self.table.analog_out.get(chan.name()).ok_or_else(|| {
                        CtrlError::MissingChannelMapping(chan.name().to_string())
                    })?;
                    task.create_ao_chan(address, chan.name(), AO_MIN_VOLT, AO_MAX_VOLT)?;
                    let (buf, mut warns) = compile_analog(chan, &clock);
                    warnings.append(&mut warns);
                    data.row_mut(i).assign(&buf);
                }
                task.cfg_sample_clk(&self.table.clock.terminal, clock_rate, seq_len as u64)?;
                task.write_analog(&data)?;
                task.commit()?;
                debug!(channels = chans.len(), "analog generation engine committed");
                let adapter = EngineAdapter::new("analog-out", task);
                adapter.install_retrigger_hook()?;
                Some(adapter)
            }
        };

        let (analog_in, ai_names) = {
            let chans: Vec<&Channel> = self.registry.analog_inputs().collect();
            if chans.is_empty() {
                (None, Vec::new())
            } else {
                let task = self.driver.new_task("analog-in")?;
                for chan in &chans {
                    let address = self.table.analog_in.get(chan.name()).ok_or_else(|| {
                        CtrlError::MissingChannelMapping(chan.name().to_string())
                    })?;
                    let (min_volt, max_volt) = chan.volt_range();
                    task.create_ai_chan(address, chan.name(), min_volt, max_volt)?;
                }
                task.cfg_sample_clk(&self.table.clock.terminal, clock_rate, seq_len as u64)?;
                task.commit()?;
                debug!(channels = chans.len(), "acquisition engine committed");
                let adapter = EngineAdapter::new("analog-in", task);
                adapter.install_retrigger_hook()?;
                let names = chans.iter().map(|c| c.name().to_string()).collect();
                (Some(adapter), names)
            }
        };

        // Commit point: replaces any previous engine set
        self.engines = Some(Engines {
            clock: Arc::new(clock_task),
            digital,
            analog_out,
            analog_in,
            ai_names,
            seq_len,
        });
        self.state = ExecState::Armed;
        info!(
            warnings = warnings.len(),
            "sequence armed, engines waiting for start"
        );
        Ok(warnings)
    }

    /// Begins all engines, then starts the shared clock.
    ///
    /// Every generation/acquisition engine reaches its waiting-for-clock
    /// state strictly before the clock starts; starting the clock first
    /// would silently lose the first period's edges. With `run_only_once`
    /// the run flags stay cleared and each engine halts after one period;
    /// otherwise the engines replay their buffers until `stop()`.
    pub fn start(&mut self, run_only_once: bool) -> Result<(), CtrlError> {
        let (Some(engines), ExecState::Armed) = (self.engines.as_ref(), self.state) else {
            return Err(CtrlError::InvalidState {
                op: "start",
                state: self.state,
            });
        };
        let mut begun: Vec<&EngineAdapter<D::Task>> = Vec::new();
        for adapter in engines.adapters() {
            if let Err(err) = adapter.begin(!run_only_once) {
                for adapter in begun {
                    let _ = adapter.halt();
                }
                return Err(err.into());
            }
            debug!(engine = adapter.name(), "engine waiting for clock");
            begun.push(adapter);
        }
        if let Err(err) = engines.clock.start() {
            for adapter in engines.adapters() {
                let _ = adapter.halt();
            }
            return Err(err.into());
        }
        self.state = ExecState::Running;
        info!(run_only_once, "clock started, sequence running");
        Ok(())
    }

    /// Clears every run flag (so an in-flight completion cannot retrigger),
    /// halts the engines and the clock, and returns to idle.
    ///
    /// Cooperative: a period already in flight plays out on the hardware;
    /// there is no mid-buffer preemption.
    pub fn stop(&mut self) -> Result<(), CtrlError> {
        if self.state != ExecState::Running {
            return Err(CtrlError::InvalidState {
                op: "stop",
                state: self.state,
            });
        }
        let engines = self.engines.take().expect("running controller has engines");
        for adapter in engines.adapters() {
            adapter.clear_run();
        }
        let mut result = Ok(());
        for adapter in engines.adapters() {
            if let Err(err) = adapter.halt() {
                if result.is_ok() {
                    result = Err(err.into());
                }
            }
        }
        if let Err(err) = engines.clock.stop() {
            if result.is_ok() {
                result = Err(err.into());
            }
        }
        self.state = ExecState::Idle;
        info!("sequence stopped, engines released");
        result
    }

    /// Blocking read of `npoints` samples per analog input channel, bounded
    /// by [`READ_TIMEOUT_SECS`]. A timeout surfaces as
    /// [`DriverError::ReadTimeout`], distinct from a hardware fault.
    pub fn read_analog_values(
        &self,
        npoints: usize,
    ) -> Result<IndexMap<String, Vec<f64>>, CtrlError> {
        let Some(engines) = self.engines.as_ref() else {
            return Err(CtrlError::InvalidState {
                op: "read_analog_values",
                state: self.state,
            });
        };
        let Some(adapter) = engines.analog_in.as_ref() else {
            return Err(CtrlError::NoAnalogInputEngine);
        };
        let data = adapter.task().read_analog(npoints, READ_TIMEOUT_SECS)?;
        Ok(engines
            .ai_names
            .iter()
            .zip(data.outer_iter())
            .map(|(name, row)| (name.clone(), row.to_vec()))
            .collect())
    }

    /// Sample count of the currently armed period, if any.
    pub fn armed_seq_len(&self) -> Option<usize> {
        self.engines.as_ref().map(|engines| engines.seq_len)
    }
}
