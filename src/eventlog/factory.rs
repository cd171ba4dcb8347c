//! Event log construction from configuration

use crate::eventlog::{JsonDevice, Log, TextDevice};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;

/// Rendering device selected in configuration
///
/// Unknown values are rejected when the configuration is parsed, so a
/// factory always holds a valid choice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceType {
    Json,
    #[default]
    Text,
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Text => write!(f, "text"),
        }
    }
}

/// Creates event logs for a configured device type
#[derive(Debug, Clone, Copy)]
pub struct Factory {
    device_type: DeviceType,
}

impl Factory {
    pub fn new(device_type: DeviceType) -> Self {
        Self { device_type }
    }

    /// Log writing to stdout
    pub fn new_log(&self) -> Log {
        self.new_log_with_writer(std::io::stdout())
    }

    /// Log writing to an arbitrary writer
    pub fn new_log_with_writer<W: Write + Send + 'static>(&self, writer: W) -> Log {
        match self.device_type {
            DeviceType::Json => Log::new(JsonDevice::new(writer)),
            DeviceType::Text => Log::new(TextDevice::new(writer)),
        }
    }
}
