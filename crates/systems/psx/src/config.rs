//! Peripheral configuration: what is plugged in where.

use crate::controller::ControllerType;
use crate::error::PadError;
use crate::pad::NUM_CONTROLLER_AND_CARD_PORTS;
use emu_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Which physical ports have a multitap attached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MultitapMode {
    #[default]
    Disabled,
    Port1Only,
    Port2Only,
    BothPorts,
}

impl MultitapMode {
    /// Multitap presence on physical port 0 or 1
    pub fn is_enabled(self, port: usize) -> bool {
        match self {
            MultitapMode::Disabled => false,
            MultitapMode::Port1Only => port == 0,
            MultitapMode::Port2Only => port == 1,
            MultitapMode::BothPorts => port < 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PadConfig {
    pub controller_types: [ControllerType; NUM_CONTROLLER_AND_CARD_PORTS],
    pub memory_cards: [bool; NUM_CONTROLLER_AND_CARD_PORTS],
    pub multitap_mode: MultitapMode,
    /// Take button/axis state from save states instead of keeping live input
    pub load_input_from_save_states: bool,
}

impl Default for PadConfig {
    fn default() -> Self {
        let mut controller_types = [ControllerType::None; NUM_CONTROLLER_AND_CARD_PORTS];
        controller_types[0] = ControllerType::DigitalController;
        let mut memory_cards = [false; NUM_CONTROLLER_AND_CARD_PORTS];
        memory_cards[0] = true;
        memory_cards[1] = true;

        Self {
            controller_types,
            memory_cards,
            multitap_mode: MultitapMode::Disabled,
            load_input_from_save_states: false,
        }
    }
}

impl PadConfig {
    pub fn from_json_str(contents: &str) -> Result<Self, PadError> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn to_json_string(&self) -> Result<String, PadError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load from a file, falling back to defaults on error
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => Self::from_json_str(&contents).unwrap_or_else(|e| {
                log(LogCategory::Config, LogLevel::Warn, || {
                    format!(
                        "Failed to parse pad config {}: {}. Using defaults.",
                        path.display(),
                        e
                    )
                });
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }
}
