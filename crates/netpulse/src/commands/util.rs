//! Shared helpers for command handlers.

use std::path::PathBuf;
use std::time::Duration;

use netpulse_config::Config;
use netpulse_probe::{CounterWidth, NameSource, SnmpVersion};

use crate::cli::{GlobalOpts, NameSourceArg, SnmpVersionArg, WidthArg};
use crate::error::CliError;

/// `--config`, or the platform default.
pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(netpulse_config::config_path)
}

/// Load the config file, failing when it does not exist.
pub fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    let path = config_file(global);
    if !path.exists() {
        return Err(CliError::NoConfig {
            path: path.display().to_string(),
        });
    }
    Ok(netpulse_config::load_config_from(&path)?)
}

/// Parse a humantime duration flag.
pub fn parse_duration(field: &str, value: &str) -> Result<Duration, CliError> {
    humantime::parse_duration(value.trim()).map_err(|e| CliError::Validation {
        field: field.into(),
        reason: format!("'{value}': {e}"),
    })
}

pub fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl From<SnmpVersionArg> for SnmpVersion {
    fn from(arg: SnmpVersionArg) -> Self {
        match arg {
            SnmpVersionArg::V1 => Self::V1,
            SnmpVersionArg::V2c => Self::V2c,
        }
    }
}

impl From<NameSourceArg> for NameSource {
    fn from(arg: NameSourceArg) -> Self {
        match arg {
            NameSourceArg::IfDescr => Self::IfDescr,
            NameSourceArg::IfName => Self::IfName,
            NameSourceArg::IfAlias => Self::IfAlias,
        }
    }
}

impl From<WidthArg> for CounterWidth {
    fn from(arg: WidthArg) -> Self {
        match arg {
            WidthArg::Bits32 => Self::Bits32,
            WidthArg::Bits64 => Self::Bits64,
        }
    }
}
