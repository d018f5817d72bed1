//! Namco NeGcon twist controller.
//!
//! The two halves of the pad twist against each other; the twist is the
//! steering axis. I, II and L are pressure-sensitive and reported as
//! analog bytes after the usual button word.

use super::{apply_button, do_input_value, CONTROLLER_READ, CONTROLLER_SELECT};
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::settings::SettingsSource;
use emu_core::state::StateWrapper;
use serde::{Deserialize, Serialize};

const ID: u16 = 0x5A23;

const DEFAULT_STEERING_DEADZONE: f32 = 0.10;
const MAX_STEERING_DEADZONE: f32 = 0.99;

/// Steering byte with the controller untouched
const STEERING_CENTRE: u8 = 0x80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum TransferState {
    Idle,
    Ready,
    IdMsb,
    ButtonsLsb,
    ButtonsMsb,
    AnalogSteering,
    AnalogI,
    AnalogII,
    AnalogL,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NeGconButton {
    Start,
    Up,
    Right,
    Down,
    Left,
    R,
    B,
    A,
}

impl NeGconButton {
    pub const ALL: [NeGconButton; 8] = [
        NeGconButton::Start,
        NeGconButton::Up,
        NeGconButton::Right,
        NeGconButton::Down,
        NeGconButton::Left,
        NeGconButton::R,
        NeGconButton::B,
        NeGconButton::A,
    ];

    pub const NAMES: [&'static str; 8] = ["Start", "Up", "Right", "Down", "Left", "R", "B", "A"];

    const BITS: [u8; 8] = [3, 4, 5, 6, 7, 11, 12, 13];

    pub fn from_index(index: i32) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    fn bit(self) -> u8 {
        Self::BITS[self as usize]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NeGconAxis {
    Steering,
    I,
    II,
    L,
}

impl NeGconAxis {
    pub const ALL: [NeGconAxis; 4] = [
        NeGconAxis::Steering,
        NeGconAxis::I,
        NeGconAxis::II,
        NeGconAxis::L,
    ];

    pub const NAMES: [&'static str; 4] = ["Steering", "I", "II", "L"];

    pub fn from_index(index: i32) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }
}

/// Curve applied to the steering axis after the deadzone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TwistResponse {
    #[default]
    Linear,
    Quadratic,
    Cubic,
}

impl TwistResponse {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "linear" => Some(TwistResponse::Linear),
            "quadratic" => Some(TwistResponse::Quadratic),
            "cubic" => Some(TwistResponse::Cubic),
            _ => None,
        }
    }

    /// Apply to a value in [-1, 1], keeping its sign
    fn apply(self, value: f32) -> f32 {
        match self {
            TwistResponse::Linear => value,
            TwistResponse::Quadratic => value * value.abs(),
            TwistResponse::Cubic => value * value * value,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NeGcon {
    /// Active low: 1 = released
    button_state: u16,
    /// Steering, I, II, L
    axis_state: [u8; 4],
    transfer_state: TransferState,
    steering_deadzone: f32,
    twist_response: TwistResponse,
}

impl Default for NeGcon {
    fn default() -> Self {
        Self::new()
    }
}

impl NeGcon {
    pub fn new() -> Self {
        Self {
            button_state: 0xFFFF,
            axis_state: [STEERING_CENTRE, 0x00, 0x00, 0x00],
            transfer_state: TransferState::Idle,
            steering_deadzone: DEFAULT_STEERING_DEADZONE,
            twist_response: TwistResponse::Linear,
        }
    }

    pub fn reset(&mut self) {
        self.transfer_state = TransferState::Idle;
    }

    pub fn reset_transfer_state(&mut self) {
        self.transfer_state = TransferState::Idle;
    }

    pub fn set_button_state(&mut self, button: NeGconButton, pressed: bool) {
        apply_button(&mut self.button_state, button.bit(), pressed);
    }

    /// Set an axis. Steering takes [-1, 1]; I, II and L take [0, 1].
    pub fn set_axis_state(&mut self, axis: NeGconAxis, value: f32) {
        match axis {
            NeGconAxis::Steering => {
                let magnitude = value.abs();
                let deadzone = self.steering_deadzone;
                let value = if magnitude < deadzone {
                    0.0
                } else {
                    ((magnitude - deadzone) / (1.0 - deadzone))
                        .min(1.0)
                        .copysign(value)
                };
                let value = self.twist_response.apply(value);
                self.axis_state[0] = (((value + 1.0) / 2.0) * 255.0).round().clamp(0.0, 255.0) as u8;
            }
            _ => {
                self.axis_state[axis as usize] = (value * 255.0).clamp(0.0, 255.0) as u8;
            }
        }
    }

    pub fn axis_state(&self, axis: NeGconAxis) -> u8 {
        self.axis_state[axis as usize]
    }

    pub fn button_state_bits(&self) -> u32 {
        u32::from(!self.button_state)
    }

    /// `L << 24 | II << 16 | I << 8 | Steering`
    pub fn analog_input_bytes(&self) -> u32 {
        u32::from(self.axis_state[3]) << 24
            | u32::from(self.axis_state[2]) << 16
            | u32::from(self.axis_state[1]) << 8
            | u32::from(self.axis_state[0])
    }

    pub fn steering_deadzone(&self) -> f32 {
        self.steering_deadzone
    }

    pub fn twist_response(&self) -> TwistResponse {
        self.twist_response
    }

    pub fn load_settings(&mut self, settings: &dyn SettingsSource, section: &str) {
        self.steering_deadzone = settings
            .get_float(section, "SteeringDeadzone", DEFAULT_STEERING_DEADZONE)
            .clamp(0.0, MAX_STEERING_DEADZONE);

        self.twist_response = match settings.get_string(section, "TwistResponse") {
            None => TwistResponse::default(),
            Some(name) => TwistResponse::from_name(&name).unwrap_or_else(|| {
                log(LogCategory::Devices, LogLevel::Warn, || {
                    format!("{}: unknown TwistResponse '{}', using linear", section, name)
                });
                TwistResponse::default()
            }),
        };
    }

    pub fn transfer(&mut self, data_in: u8) -> (u8, bool) {
        let (data_out, next) = match self.transfer_state {
            TransferState::Idle if data_in == CONTROLLER_SELECT => (0xFF, Some(TransferState::Ready)),
            TransferState::Idle => (0xFF, None),
            TransferState::Ready if data_in == CONTROLLER_READ => {
                (ID as u8, Some(TransferState::IdMsb))
            }
            TransferState::Ready => (0xFF, None),
            TransferState::IdMsb => ((ID >> 8) as u8, Some(TransferState::ButtonsLsb)),
            TransferState::ButtonsLsb => (self.button_state as u8, Some(TransferState::ButtonsMsb)),
            TransferState::ButtonsMsb => (
                (self.button_state >> 8) as u8,
                Some(TransferState::AnalogSteering),
            ),
            TransferState::AnalogSteering => (self.axis_state[0], Some(TransferState::AnalogI)),
            TransferState::AnalogI => (self.axis_state[1], Some(TransferState::AnalogII)),
            TransferState::AnalogII => (self.axis_state[2], Some(TransferState::AnalogL)),
            TransferState::AnalogL => (self.axis_state[3], None),
        };

        log(LogCategory::Devices, LogLevel::Trace, || {
            format!(
                "NeGcon {:?}: 0x{:02X} -> 0x{:02X}",
                self.transfer_state, data_in, data_out
            )
        });
        self.transfer_state = next.unwrap_or(TransferState::Idle);
        (data_out, next.is_some())
    }

    pub fn do_state(&mut self, sw: &mut StateWrapper, apply_input_state: bool) -> bool {
        do_input_value(sw, &mut self.button_state, apply_input_state);
        do_input_value(sw, &mut self.axis_state, apply_input_state);
        sw.do_value(&mut self.transfer_state);
        !sw.has_error()
    }
}
