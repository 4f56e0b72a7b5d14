//! Compiles a channel's timing entries into a discrete sample buffer.
//!
//! All channels of one arm cycle share a single [`SequenceClock`], so every
//! compiled buffer has the same length `round(samp_rate * duration)`. Sample
//! indices are obtained by rounding to the nearest clock tick, which bounds
//! the worst-case timing error to half a clock period (flooring would make
//! it a full period).
//!
//! An entry whose rounded interval falls outside the buffer is reported as a
//! [`BufferOverrun`] and skipped; compilation of the remaining entries and
//! channels continues, so one bad interval never aborts an arm cycle.

use ndarray::{s, Array1};
use thiserror::Error;

use crate::channel::{Channel, ChannelKind, TimingEntry};

/// The (sample rate, duration) pair shared by every channel compiled within
/// one arm cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequenceClock {
    /// Sample clock rate in samples per second.
    pub samp_rate: f64,
    /// Logical period length in seconds.
    pub duration: f64,
}

impl SequenceClock {
    pub fn new(samp_rate: f64, duration: f64) -> Self {
        Self {
            samp_rate,
            duration,
        }
    }

    /// Buffer length shared by all channels: `round(samp_rate * duration)`.
    pub fn total_samps(&self) -> usize {
        (self.samp_rate * self.duration).round() as usize
    }

    /// Nearest sample index for a time point, kept as `f64` so that negative
    /// times survive until the range check.
    fn sample_index(&self, t: f64) -> f64 {
        (self.samp_rate * t).round()
    }
}

/// A compiled interval that falls outside the `[0, seq_len]` sample range.
///
/// Collected into a warning list during compilation rather than propagated:
/// the offending entry is skipped and everything else still compiles.
#[derive(Debug, Clone, PartialEq, Error)]
#[error(
    "channel {channel}: interval {t_start}-{t_stop} s rounds to samples {n_start}-{n_stop}, \
     outside the {seq_len}-sample sequence; entry skipped"
)]
pub struct BufferOverrun {
    pub channel: String,
    pub t_start: f64,
    pub t_stop: f64,
    pub n_start: i64,
    pub n_stop: i64,
    pub seq_len: usize,
}

/// Rounds an entry to sample indices, recording a [`BufferOverrun`] and
/// returning `None` if either end lands outside the buffer.
fn sample_range(
    chan: &Channel,
    entry: &TimingEntry,
    clock: &SequenceClock,
    seq_len: usize,
    warnings: &mut Vec<BufferOverrun>,
) -> Option<(usize, usize)> {
    let n_start = clock.sample_index(entry.t_start);
    let n_stop = clock.sample_index(entry.t_stop);
    if n_start < 0.0 || n_stop > seq_len as f64 {
        warnings.push(BufferOverrun {
            channel: chan.name().to_string(),
            t_start: entry.t_start,
            t_stop: entry.t_stop,
            n_start: n_start as i64,
            n_stop: n_stop as i64,
            seq_len,
        });
        return None;
    }
    Some((n_start as usize, n_stop as usize))
}

/// Compiles a digital output channel into a bit buffer.
///
/// The buffer starts at the channel's inactive raw level (1 when the
/// polarity-inversion flag is set, 0 otherwise) and every in-range entry
/// sets `[n_start, n_stop)` to the active raw level. Entries are processed
/// in ascending `t_start` order, so the later-sorted entry's write wins in
/// any overlap region.
pub fn compile_digital(
    chan: &Channel,
    clock: &SequenceClock,
) -> (Array1<u8>, Vec<BufferOverrun>) {
    assert_eq!(
        chan.kind(),
        ChannelKind::DigitalOutput,
        "attempting to digitally compile {} channel {}",
        chan.kind(),
        chan.name()
    );
    let seq_len = clock.total_samps();
    let (inactive, active) = if chan.invert_polarity() {
        (1u8, 0u8)
    } else {
        (0u8, 1u8)
    };
    let mut buffer = Array1::from_elem(seq_len, inactive);
    let mut warnings = Vec::new();
    for entry in chan.sorted_entries() {
        if let Some((n_start, n_stop)) = sample_range(chan, &entry, clock, seq_len, &mut warnings)
        {
            buffer.slice_mut(s![n_start..n_stop]).fill(active);
        }
    }
    (buffer, warnings)
}

/// Compiles an analog output channel into a voltage buffer.
///
/// Same allocation and rounding algorithm as [`compile_digital`]; the buffer
/// is initialized to 0.0 V and every in-range entry holds its constant
/// voltage over `[n_start, n_stop)`.
pub fn compile_analog(
    chan: &Channel,
    clock: &SequenceClock,
) -> (Array1<f64>, Vec<BufferOverrun>) {
    assert_eq!(
        chan.kind(),
        ChannelKind::AnalogOutput,
        "attempting to analog-compile {} channel {}",
        chan.kind(),
        chan.name()
    );
    let seq_len = clock.total_samps();
    let mut buffer = Array1::from_elem(seq_len, 0.0);
    let mut warnings = Vec::new();
    for entry in chan.sorted_entries() {
        if let Some((n_start, n_stop)) = sample_range(chan, &entry, clock, seq_len, &mut warnings)
        {
            buffer.slice_mut(s![n_start..n_stop]).fill(entry.voltage);
        }
    }
    (buffer, warnings)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::registry::ChannelRegistry;

    const CLOCK: SequenceClock = SequenceClock {
        samp_rate: 1e6,
        duration: 1e-3,
    };

    #[test]
    fn empty_channel_compiles_all_inactive() {
        let mut reg = ChannelRegistry::new();
        reg.get_or_create("X", ChannelKind::DigitalOutput).unwrap();
        let (buf, warnings) = compile_digital(reg.chan("X").unwrap(), &CLOCK);
        assert_eq!(buf.len(), 1000);
        assert!(buf.iter().all(|&s| s == 0));
        assert!(warnings.is_empty());
    }

    #[test]
    fn single_interval_sets_exact_sample_range() {
        let mut reg = ChannelRegistry::new();
        reg.add_digital_output("X", 100e-6, 300e-6).unwrap();
        let (buf, warnings) = compile_digital(reg.chan("X").unwrap(), &CLOCK);
        assert!(warnings.is_empty());
        for (i, &s) in buf.iter().enumerate() {
            let expect = if (100..300).contains(&i) { 1 } else { 0 };
            assert_eq!(s, expect, "sample {}", i);
        }
    }

    #[test]
    fn polarity_inversion_flips_raw_levels() {
        let mut reg = ChannelRegistry::new();
        reg.add_digital_output("X", 0.0, 500e-6).unwrap();
        reg.set_invert_polarity("X", true).unwrap();
        let (buf, warnings) = compile_digital(reg.chan("X").unwrap(), &CLOCK);
        assert!(warnings.is_empty());
        assert!(buf.slice(s![0..500]).iter().all(|&s| s == 0));
        assert!(buf.slice(s![500..1000]).iter().all(|&s| s == 1));
    }

    #[test]
    fn disjoint_intervals_compile_to_their_union() {
        let mut reg = ChannelRegistry::new();
        reg.add_digital_output("X", 200e-6, 300e-6).unwrap();
        reg.add_digital_output("X", 0.0, 100e-6).unwrap();
        let (buf, warnings) = compile_digital(reg.chan("X").unwrap(), &CLOCK);
        assert!(warnings.is_empty());
        for (i, &s) in buf.iter().enumerate() {
            let expect = if i < 100 || (200..300).contains(&i) { 1 } else { 0 };
            assert_eq!(s, expect, "sample {}", i);
        }
    }

    #[test]
    fn analog_interval_holds_constant_voltage() {
        let mut reg = ChannelRegistry::new();
        reg.add_analog_output("Y", 0.0, 500e-6, 2.5).unwrap();
        let (buf, warnings) = compile_analog(reg.chan("Y").unwrap(), &CLOCK);
        assert!(warnings.is_empty());
        assert!(buf.slice(s![0..500]).iter().all(|&v| v == 2.5));
        assert!(buf.slice(s![500..1000]).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn later_sorted_entry_wins_in_overlap() {
        let mut reg = ChannelRegistry::new();
        reg.add_analog_output("Y", 0.0, 300e-6, 1.0).unwrap();
        reg.add_analog_output("Y", 200e-6, 400e-6, 2.0).unwrap();
        let (buf, _) = compile_analog(reg.chan("Y").unwrap(), &CLOCK);
        assert!(buf.slice(s![0..200]).iter().all(|&v| v == 1.0));
        assert!(buf.slice(s![200..400]).iter().all(|&v| v == 2.0));
        assert!(buf.slice(s![400..1000]).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn overrun_entry_is_skipped_and_reported() {
        let mut reg = ChannelRegistry::new();
        reg.add_digital_output("X", 100e-6, 300e-6).unwrap();
        reg.add_digital_output("X", 500e-6, 2e-3).unwrap();
        let (buf, warnings) = compile_digital(reg.chan("X").unwrap(), &CLOCK);
        // In-range entry still compiled
        assert!(buf.slice(s![100..300]).iter().all(|&s| s == 1));
        assert!(buf.slice(s![300..1000]).iter().all(|&s| s == 0));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].n_stop, 2000);
        assert_eq!(warnings[0].seq_len, 1000);
    }

    #[test]
    fn negative_start_is_an_overrun() {
        let mut reg = ChannelRegistry::new();
        reg.add_digital_output("X", -100e-6, 100e-6).unwrap();
        let (buf, warnings) = compile_digital(reg.chan("X").unwrap(), &CLOCK);
        assert!(buf.iter().all(|&s| s == 0));
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].n_start, -100);
    }

    #[test]
    fn interval_covering_whole_sequence_is_in_range() {
        let mut reg = ChannelRegistry::new();
        reg.add_digital_output("X", 0.0, 1e-3).unwrap();
        let (buf, warnings) = compile_digital(reg.chan("X").unwrap(), &CLOCK);
        assert!(warnings.is_empty());
        assert!(buf.iter().all(|&s| s == 1));
    }

    #[test]
    fn compilation_is_deterministic() {
        let mut reg = ChannelRegistry::new();
        reg.add_digital_output("X", 100e-6, 300e-6).unwrap();
        reg.add_analog_output("Y", 50e-6, 250e-6, -1.25).unwrap();
        let (dig_a, _) = compile_digital(reg.chan("X").unwrap(), &CLOCK);
        let (dig_b, _) = compile_digital(reg.chan("X").unwrap(), &CLOCK);
        assert_eq!(dig_a, dig_b);
        let (ana_a, _) = compile_analog(reg.chan("Y").unwrap(), &CLOCK);
        let (ana_b, _) = compile_analog(reg.chan("Y").unwrap(), &CLOCK);
        assert_eq!(ana_a, ana_b);
    }
}
