//! Hardware-agnostic sequence compilation for a multi-channel timing
//! sequencer.
//!
//! Callers register per-channel timing entries through a
//! [`ChannelRegistry`], then compile each output channel against one shared
//! [`SequenceClock`] into fixed-length sample buffers. Nothing in this crate
//! touches hardware; the companion execution crate owns the engines the
//! buffers are written to.
//!
//! [`ChannelRegistry`]: registry::ChannelRegistry
//! [`SequenceClock`]: compiler::SequenceClock

pub mod channel;
pub mod compiler;
pub mod error;
pub mod registry;

pub use channel::*;
pub use compiler::*;
pub use error::*;
pub use registry::*;
