//! Agent configuration, loaded from a TOML file
//!
//! Every field has a default, so an empty file (or no file at all) gives a working agent that
//! logs to the current directory and uploads nothing.

use serde::Deserialize;
use std::{path::Path, path::PathBuf, time::Duration};

use crate::{device::Timing, session::SessionConfig, Error, Result};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Bit rates to try on each endpoint, in order
    pub baud_rates: Vec<u32>,
    /// How long to wait for the identification reply
    pub probe_wait_ms: u64,
    pub command_spacing_ms: u64,
    pub receive_timeout_ms: u64,
    pub round_delay_ms: u64,
    pub dtc_interval_secs: u64,
    pub dead_link_rounds: u32,
    /// Stop after this many rounds; run until the link is lost if unset
    pub max_rounds: Option<u64>,
    /// `code,description` table for stored trouble codes
    pub dtc_table: PathBuf,
    /// Directory for the daily CSV logs
    pub log_dir: PathBuf,
    /// Live upload endpoint; uploads are off if unset
    pub upload: Option<UploadConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UploadConfig {
    pub url: String,
    pub device_key: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            baud_rates: crate::device::DEFAULT_BAUD_RATES.to_vec(),
            probe_wait_ms: 400,
            command_spacing_ms: 300,
            receive_timeout_ms: 5000,
            round_delay_ms: 300,
            dtc_interval_secs: 90,
            dead_link_rounds: 5,
            max_rounds: None,
            dtc_table: PathBuf::from("data/obd_trouble_codes.csv"),
            log_dir: PathBuf::from("."),
            upload: None,
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        Self::parse(&contents).map_err(|e| match e {
            Error::Config(msg) => Error::Config(format!("{}: {}", path.display(), msg)),
            e => e,
        })
    }

    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents).map_err(|e| Error::Config(e.to_string()))?;
        if config.baud_rates.is_empty() {
            return Err(Error::Config("baud_rates must not be empty".to_owned()));
        }
        if config.dead_link_rounds == 0 {
            return Err(Error::Config("dead_link_rounds must be at least 1".to_owned()));
        }
        Ok(config)
    }

    pub fn probe_wait(&self) -> Duration {
        Duration::from_millis(self.probe_wait_ms)
    }

    pub fn timing(&self) -> Timing {
        Timing {
            command_spacing: Duration::from_millis(self.command_spacing_ms),
            receive_timeout: Duration::from_millis(self.receive_timeout_ms),
        }
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            round_delay: Duration::from_millis(self.round_delay_ms),
            dtc_interval: Duration::from_secs(self.dtc_interval_secs),
            dead_link_rounds: self.dead_link_rounds,
        }
    }
}
