//! Engine adapters: one generation/acquisition task plus its run flag.
//!
//! The run flag is the only state shared between the caller's thread (which
//! clears it in `stop()`) and the driver's completion context (which reads
//! it to decide retrigger-or-halt), so it is atomic. The completion handler
//! itself is registered once, at arm time, and does nothing beyond stopping
//! the finished iteration and conditionally replaying it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tracing::{debug, warn};

use crate::driver::{DriverError, HardwareTask, PeriodCompleted};

/// Wraps one hardware engine task with the retrigger run flag.
pub struct EngineAdapter<T> {
    name: &'static str,
    task: Arc<T>,
    run: Arc<AtomicBool>,
}

impl<T: HardwareTask + 'static> EngineAdapter<T> {
    pub fn new(name: &'static str, task: T) -> Self {
        Self {
            name,
            task: Arc::new(task),
            run: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
    pub fn task(&self) -> &T {
        &self.task
    }
    pub fn run_flag(&self) -> bool {
        self.run.load(Ordering::SeqCst)
    }

    /// Registers the completion handler: stop the exhausted iteration, then
    /// replay the same buffer from sample 0 iff the run flag is still set.
    /// The handler holds only a weak task reference so that dropping the
    /// adapter retires it.
    pub fn install_retrigger_hook(&self) -> Result<(), DriverError> {
        let run = Arc::clone(&self.run);
        let task: Weak<T> = Arc::downgrade(&self.task);
        let name = self.name;
        self.task
            .register_done_callback(Box::new(move |event: PeriodCompleted| {
                let Some(task) = task.upgrade() else {
                    return;
                };
                if event.status < 0 {
                    warn!(engine = name, status = event.status, "period completed with error status");
                }
                if let Err(err) = task.stop() {
                    warn!(engine = name, %err, "failed to stop engine after completion");
                    return;
                }
                if run.load(Ordering::SeqCst) {
                    debug!(engine = name, "run flag set, retriggering");
                    if let Err(err) = task.start() {
                        warn!(engine = name, %err, "failed to retrigger engine");
                    }
                } else {
                    debug!(engine = name, "run flag cleared, engine left stopped");
                }
            }))
    }

    /// Stores the run flag, then starts the task so it is committed and
    /// waiting for the shared clock's first edge.
    pub fn begin(&self, run: bool) -> Result<(), DriverError> {
        self.run.store(run, Ordering::SeqCst);
        self.task.start()
    }

    /// Clears the run flag (so the next completion will not retrigger) and
    /// issues an explicit stop for the case where the engine is mid-period.
    pub fn halt(&self) -> Result<(), DriverError> {
        self.clear_run();
        self.task.stop()
    }

    pub fn clear_run(&self) {
        self.run.store(false, Ordering::SeqCst);
    }
}
