//! Hardware-backed execution layer for compiled timing sequences.
//!
//! [`seqcompiler_backend`] turns per-channel timing entries into sample
//! buffers; this crate pushes those buffers to hardware and runs them. The
//! pieces, bottom up:
//!
//! - [`driver`]: the vendor-neutral [`HardwareDriver`]/[`HardwareTask`]
//!   boundary the controller is written against.
//! - [`sim`]: an in-memory driver implementation used by the tests and the
//!   demo binary.
//! - [`adapter`]: one engine task plus its retrigger run flag.
//! - [`config`]: the static channel-name to physical-line table.
//! - [`controller`]: the arm/start/stop state machine tying it together.
//!
//! [`HardwareDriver`]: driver::HardwareDriver
//! [`HardwareTask`]: driver::HardwareTask

pub mod adapter;
pub mod config;
pub mod controller;
pub mod driver;
pub mod sim;

pub use adapter::*;
pub use config::*;
pub use controller::*;
pub use driver::*;
pub use sim::*;
