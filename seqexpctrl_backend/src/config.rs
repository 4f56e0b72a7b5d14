//! Static per-deployment channel table.
//!
//! Maps caller-facing channel names to physical line addresses, carries the
//! per-channel polarity metadata for digital lines, and names the counter
//! and terminal of the shared clock engine. The table is supplied at
//! controller construction time and is not part of the sequencing algorithm
//! itself.

use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A physical line address that does not follow the expected format.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("channel {channel}: line address '{address}' does not match '{expected}'")]
pub struct BadLineAddress {
    pub channel: String,
    pub address: String,
    pub expected: &'static str,
}

/// One digital output line and its polarity metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigitalLine {
    pub address: String,
    #[serde(default)]
    pub invert_polarity: bool,
}

/// Counter and terminal of the shared clock engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockSpec {
    /// Counter channel generating the pulse train, e.g. `Dev1/ctr0`.
    pub counter: String,
    /// Terminal the downstream engines clock off, e.g. `/Dev1/Ctr0InternalOutput`.
    pub terminal: String,
}

/// Channel-name to physical-line table for one deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelTable {
    #[serde(default)]
    pub digital_out: IndexMap<String, DigitalLine>,
    #[serde(default)]
    pub analog_out: IndexMap<String, String>,
    #[serde(default)]
    pub analog_in: IndexMap<String, String>,
    pub clock: ClockSpec,
}

impl ChannelTable {
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Checks every line address against the naming convention of the
    /// hardware driver: digital lines are `dev/port(number)/line(number)`,
    /// analog lines `dev/ao(number)` / `dev/ai(number)`.
    pub fn validate(&self) -> Result<(), BadLineAddress> {
        let do_re = Regex::new(r"^\w+/port\d+/line\d+$").unwrap();
        let ao_re = Regex::new(r"^\w+/ao\d+$").unwrap();
        let ai_re = Regex::new(r"^\w+/ai\d+$").unwrap();

        let check = |name: &str,
                     address: &str,
                     re: &Regex,
                     expected: &'static str|
         -> Result<(), BadLineAddress> {
            if re.is_match(address) {
                Ok(())
            } else {
                Err(BadLineAddress {
                    channel: name.to_string(),
                    address: address.to_string(),
                    expected,
                })
            }
        };

        for (name, line) in &self.digital_out {
            check(name, &line.address, &do_re, "dev/port(number)/line(number)")?;
        }
        for (name, address) in &self.analog_out {
            check(name, address, &ao_re, "dev/ao(number)")?;
        }
        for (name, address) in &self.analog_in {
            check(name, address, &ai_re, "dev/ai(number)")?;
        }
        Ok(())
    }
}
