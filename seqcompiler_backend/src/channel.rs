use std::fmt;

use crate::error::SeqError;

/// Kind of hardware line a channel addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    DigitalOutput,
    AnalogOutput,
    AnalogInput,
}
impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                ChannelKind::DigitalOutput => "digital-output",
                ChannelKind::AnalogOutput => "analog-output",
                ChannelKind::AnalogInput => "analog-input",
            }
        )
    }
}

/// One timing interval on a channel, in seconds from sequence start.
///
/// `t_start` is inclusive, `t_stop` exclusive. For digital channels the
/// interval marks where the line is *active* (the electrically asserted
/// state, whichever raw level that is) and `voltage` is ignored; for analog
/// output channels `voltage` is the constant level held over the interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimingEntry {
    pub t_start: f64,
    pub t_stop: f64,
    pub voltage: f64,
}
impl TimingEntry {
    /// Constructs an entry, rejecting `t_start >= t_stop` at add time.
    pub fn new(channel: &str, t_start: f64, t_stop: f64, voltage: f64) -> Result<Self, SeqError> {
        if t_start >= t_stop {
            return Err(SeqError::InvalidInterval {
                channel: channel.to_string(),
                t_start,
                t_stop,
            });
        }
        Ok(Self {
            t_start,
            t_stop,
            voltage,
        })
    }
}
impl fmt::Display for TimingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TimingEntry({}-{} s, {} V)",
            self.t_start, self.t_stop, self.voltage
        )
    }
}

/// A named sequencer channel and its pending timing entries.
///
/// Channels are owned exclusively by a [`ChannelRegistry`] and created
/// through its get-or-create operations.
///
/// [`ChannelRegistry`]: crate::registry::ChannelRegistry
#[derive(Debug, Clone)]
pub struct Channel {
    name: String,
    kind: ChannelKind,
    invert_polarity: bool,
    min_volt: f64,
    max_volt: f64,
    entries: Vec<TimingEntry>,
}

impl Channel {
    pub fn new(name: &str, kind: ChannelKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            invert_polarity: false,
            min_volt: -5.0,
            max_volt: 5.0,
            entries: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }
    /// Whether the compiled *active* level is represented by raw logic-low.
    pub fn invert_polarity(&self) -> bool {
        self.invert_polarity
    }
    pub fn set_invert_polarity(&mut self, invert: bool) {
        self.invert_polarity = invert;
    }
    /// Analog input voltage range `(min_volt, max_volt)`.
    pub fn volt_range(&self) -> (f64, f64) {
        (self.min_volt, self.max_volt)
    }
    pub fn set_volt_range(&mut self, min_volt: f64, max_volt: f64) {
        self.min_volt = min_volt;
        self.max_volt = max_volt;
    }

    pub fn entries(&self) -> &[TimingEntry] {
        &self.entries
    }
    pub fn push_entry(&mut self, entry: TimingEntry) {
        self.entries.push(entry);
    }

    /// Entries in ascending `t_start` order. The sort is stable, so of two
    /// overlapping entries with equal `t_start` the later-added one keeps
    /// sorting later and its write wins in the overlap region.
    pub fn sorted_entries(&self) -> Vec<TimingEntry> {
        let mut sorted = self.entries.clone();
        sorted.sort_by(|a, b| a.t_start.total_cmp(&b.t_start));
        sorted
    }
}
