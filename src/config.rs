//! Instrument-model constants and runtime settings.
//!
//! Nothing here is discovered at runtime: the Commfil v.2 framing, field
//! widths and spectrum length are properties of the counter model. The
//! defaults match the Triathler/BetaScout family. A YAML file can override
//! any subset of fields:
//!
//! ```rust
//! use commfil::Config;
//!
//! let config = Config::from_yaml_str("decoder:\n  channel_count: 2048\n").unwrap();
//! assert_eq!(config.decoder.channel_count, 2048);
//! assert_eq!(config.decoder.delimiter, b'\r');
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{CommfilError, Result};

/// Channels in a Triathler/BetaScout spectrum
pub const DEFAULT_CHANNEL_COUNT: usize = 1024;

/// Largest frame accepted before the framer discards and resynchronizes.
/// A full spectrum block in one frame is at most about 5 KiB.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024;

/// Serial line speed fixed by the instrument
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// How a repeated elapsed-time value is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepeatedTimePolicy {
    /// Elapsed time must strictly increase; a repeat starts a new run
    #[default]
    NewRun,
    /// The counter reports in units coarser than seconds but still updates
    /// once per second. A repeat advances elapsed time by one second and
    /// only a decrease starts a new run.
    CoarseUnits,
}

/// Decoder constants for one counter model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DecoderConfig {
    /// Spectrum length in channels
    pub channel_count: usize,
    /// Maximum bytes in one frame
    pub max_frame_len: usize,
    /// Frame delimiter byte
    pub delimiter: u8,
    /// Maximum digits in the elapsed-time field of a time sample
    pub elapsed_field_width: usize,
    /// Maximum digits in the count-rate field of a time sample
    pub rate_field_width: usize,
    /// Maximum base-250 digits in one spectrum channel value
    pub max_value_digits: usize,
    pub repeated_time: RepeatedTimePolicy,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            channel_count: DEFAULT_CHANNEL_COUNT,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            delimiter: b'\r',
            elapsed_field_width: 8,
            rate_field_width: 10,
            max_value_digits: 4,
            repeated_time: RepeatedTimePolicy::NewRun,
        }
    }
}

impl DecoderConfig {
    /// Check the constants are usable.
    pub fn validate(&self) -> Result<()> {
        if self.channel_count == 0 {
            return Err(CommfilError::config("channel_count must be greater than zero"));
        }
        if self.max_frame_len < 64 {
            return Err(CommfilError::config(format!(
                "max_frame_len {} is below the minimum of 64 bytes",
                self.max_frame_len
            )));
        }
        if self.delimiter == b'\n' {
            return Err(CommfilError::config("delimiter cannot be a line feed"));
        }
        if self.elapsed_field_width == 0 || self.elapsed_field_width > 9 {
            return Err(CommfilError::config("elapsed_field_width must be in 1..=9"));
        }
        if self.rate_field_width == 0 || self.rate_field_width > 15 {
            return Err(CommfilError::config("rate_field_width must be in 1..=15"));
        }
        // 250^4 - 1 is the largest value that still fits a u32
        if !(1..=4).contains(&self.max_value_digits) {
            return Err(CommfilError::config("max_value_digits must be in 1..=4"));
        }
        Ok(())
    }
}

/// Serial port settings for a live instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SerialSettings {
    /// Port path, e.g. `/dev/ttyUSB0` or `COM3`
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Read size per chunk
    #[serde(default = "default_read_size")]
    pub read_size: usize,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_read_size() -> usize {
    256
}

impl SerialSettings {
    pub fn new(port: impl Into<String>) -> Self {
        Self { port: port.into(), baud_rate: DEFAULT_BAUD_RATE, read_size: default_read_size() }
    }
}

/// Where finished runs are written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AutosaveSettings {
    pub enabled: bool,
    pub directory: PathBuf,
}

impl Default for AutosaveSettings {
    fn default() -> Self {
        // Prefer ./Autosave when present, like the instrument workstation layout
        let directory = if Path::new("Autosave").is_dir() {
            PathBuf::from("Autosave")
        } else {
            PathBuf::from(".")
        };
        Self { enabled: true, directory }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub decoder: DecoderConfig,
    pub serial: Option<SerialSettings>,
    pub autosave: AutosaveSettings,
}

impl Config {
    /// Parse and validate configuration from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml_ng::from_str(yaml)?;
        config.decoder.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(&path)
            .map_err(|e| CommfilError::file_error(path.as_ref().to_path_buf(), e))?;
        Self::from_yaml_str(&text)
    }

    /// Render as YAML, e.g. to write a starting configuration file.
    pub fn to_yaml_string(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }
}
