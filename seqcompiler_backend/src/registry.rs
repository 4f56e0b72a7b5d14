//! The channel registry: per-name channel bookkeeping and entry editing.
//!
//! One [`ChannelRegistry`] is owned by a single execution controller and
//! replaces the per-kind global dictionaries of earlier designs. Channels
//! are created lazily through [`ChannelRegistry::get_or_create`], which also
//! makes the kind check explicit: a name registered as one kind cannot be
//! reused as another.

use indexmap::IndexMap;

use crate::channel::{Channel, ChannelKind, TimingEntry};
use crate::error::SeqError;

/// Registry of all channels participating in the next arm cycle.
#[derive(Debug, Clone, Default)]
pub struct ChannelRegistry {
    channels: IndexMap<String, Channel>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            channels: IndexMap::new(),
        }
    }

    /// Borrows the named channel, creating it with the given kind if absent.
    ///
    /// Fails with [`SeqError::ChannelKindMismatch`] if the name is already
    /// registered under a different kind.
    pub fn get_or_create(
        &mut self,
        name: &str,
        kind: ChannelKind,
    ) -> Result<&mut Channel, SeqError> {
        if let Some(existing) = self.channels.get(name).map(|chan| chan.kind()) {
            if existing != kind {
                return Err(SeqError::ChannelKindMismatch {
                    channel: name.to_string(),
                    existing,
                    requested: kind,
                });
            }
        }
        Ok(self
            .channels
            .entry(name.to_string())
            .or_insert_with(|| Channel::new(name, kind)))
    }

    /// Appends an active interval to the named digital output channel.
    pub fn add_digital_output(
        &mut self,
        name: &str,
        t_start: f64,
        t_stop: f64,
    ) -> Result<(), SeqError> {
        let entry = TimingEntry::new(name, t_start, t_stop, 0.0)?;
        self.get_or_create(name, ChannelKind::DigitalOutput)?
            .push_entry(entry);
        Ok(())
    }

    /// Appends a constant-voltage interval to the named analog output channel.
    pub fn add_analog_output(
        &mut self,
        name: &str,
        t_start: f64,
        t_stop: f64,
        voltage: f64,
    ) -> Result<(), SeqError> {
        let entry = TimingEntry::new(name, t_start, t_stop, voltage)?;
        self.get_or_create(name, ChannelKind::AnalogOutput)?
            .push_entry(entry);
        Ok(())
    }

    /// Sets (or overwrites) the voltage range of the named analog input
    /// channel. Analog inputs carry no timing entries; they are sampled for
    /// the whole sequence.
    pub fn add_analog_input(
        &mut self,
        name: &str,
        min_volt: f64,
        max_volt: f64,
    ) -> Result<(), SeqError> {
        self.get_or_create(name, ChannelKind::AnalogInput)?
            .set_volt_range(min_volt, max_volt);
        Ok(())
    }

    /// Sets the polarity-inversion flag on the named digital output channel,
    /// creating it if absent.
    pub fn set_invert_polarity(&mut self, name: &str, invert: bool) -> Result<(), SeqError> {
        self.get_or_create(name, ChannelKind::DigitalOutput)?
            .set_invert_polarity(invert);
        Ok(())
    }

    /// Discards all digital output channels and their entries.
    pub fn clear_digital_sequence(&mut self) {
        self.channels
            .retain(|_name, chan| chan.kind() != ChannelKind::DigitalOutput);
    }

    /// Discards all analog output channels and their entries.
    pub fn clear_analog_output(&mut self) {
        self.channels
            .retain(|_name, chan| chan.kind() != ChannelKind::AnalogOutput);
    }

    pub fn chan(&self, name: &str) -> Option<&Channel> {
        self.channels.get(name)
    }
    pub fn channels(&self) -> &IndexMap<String, Channel> {
        &self.channels
    }

    pub fn digital_outputs(&self) -> impl Iterator<Item = &Channel> {
        self.of_kind(ChannelKind::DigitalOutput)
    }
    pub fn analog_outputs(&self) -> impl Iterator<Item = &Channel> {
        self.of_kind(ChannelKind::AnalogOutput)
    }
    pub fn analog_inputs(&self) -> impl Iterator<Item = &Channel> {
        self.of_kind(ChannelKind::AnalogInput)
    }

    fn of_kind(&self, kind: ChannelKind) -> impl Iterator<Item = &Channel> {
        self.channels
            .values()
            .filter(move |chan| chan.kind() == kind)
    }
}
