use thiserror::Error;

use crate::channel::ChannelKind;

/// Errors raised while editing the channel registry.
///
/// Compilation problems are not represented here: out-of-range intervals are
/// collected as [`BufferOverrun`] warnings instead so that one bad entry does
/// not abort the whole arm cycle.
///
/// [`BufferOverrun`]: crate::compiler::BufferOverrun
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SeqError {
    #[error(
        "channel {channel}: t_start {t_start} s must be strictly less than t_stop {t_stop} s"
    )]
    InvalidInterval {
        channel: String,
        t_start: f64,
        t_stop: f64,
    },
    #[error("channel {channel} is already registered as {existing}, cannot use it as {requested}")]
    ChannelKindMismatch {
        channel: String,
        existing: ChannelKind,
        requested: ChannelKind,
    },
}
