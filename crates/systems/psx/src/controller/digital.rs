//! Standard digital pad (SCPH-1080)

use super::{apply_button, do_input_value, CONTROLLER_READ, CONTROLLER_SELECT};
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::state::StateWrapper;
use serde::{Deserialize, Serialize};

const ID: u16 = 0x5A41;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum TransferState {
    Idle,
    Ready,
    IdMsb,
    ButtonsLsb,
    ButtonsMsb,
}

/// Digital pad buttons, in wire bit order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DigitalButton {
    Select,
    L3,
    R3,
    Start,
    Up,
    Right,
    Down,
    Left,
    L2,
    R2,
    L1,
    R1,
    Triangle,
    Circle,
    Cross,
    Square,
}

impl DigitalButton {
    pub const ALL: [DigitalButton; 16] = [
        DigitalButton::Select,
        DigitalButton::L3,
        DigitalButton::R3,
        DigitalButton::Start,
        DigitalButton::Up,
        DigitalButton::Right,
        DigitalButton::Down,
        DigitalButton::Left,
        DigitalButton::L2,
        DigitalButton::R2,
        DigitalButton::L1,
        DigitalButton::R1,
        DigitalButton::Triangle,
        DigitalButton::Circle,
        DigitalButton::Cross,
        DigitalButton::Square,
    ];

    pub const NAMES: [&'static str; 16] = [
        "Select", "L3", "R3", "Start", "Up", "Right", "Down", "Left", "L2", "R2", "L1", "R1",
        "Triangle", "Circle", "Cross", "Square",
    ];

    pub fn from_index(index: i32) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    pub fn name(self) -> &'static str {
        Self::NAMES[self as usize]
    }

    /// Bit in the 16-bit button word
    fn bit(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone)]
pub struct DigitalController {
    /// Active low: 1 = released
    button_state: u16,
    transfer_state: TransferState,
}

impl Default for DigitalController {
    fn default() -> Self {
        Self::new()
    }
}

impl DigitalController {
    pub fn new() -> Self {
        Self {
            button_state: 0xFFFF,
            transfer_state: TransferState::Idle,
        }
    }

    pub fn reset(&mut self) {
        self.transfer_state = TransferState::Idle;
    }

    pub fn reset_transfer_state(&mut self) {
        self.transfer_state = TransferState::Idle;
    }

    pub fn set_button_state(&mut self, button: DigitalButton, pressed: bool) {
        apply_button(&mut self.button_state, button.bit(), pressed);
    }

    pub fn button_state_bits(&self) -> u32 {
        u32::from(!self.button_state)
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
            TransferState::ButtonsMsb => ((self.button_state >> 8) as u8, None),
        };

        log(LogCategory::Devices, LogLevel::Trace, || {
            format!(
                "Digital pad {:?}: 0x{:02X} -> 0x{:02X}",
                self.transfer_state, data_in, data_out
            )
        });
        self.transfer_state = next.unwrap_or(TransferState::Idle);
        (data_out, next.is_some())
    }

    pub fn do_state(&mut self, sw: &mut StateWrapper, apply_input_state: bool) -> bool {
        do_input_value(sw, &mut self.button_state, apply_input_state);
        sw.do_value(&mut self.transfer_state);
        !sw.has_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_reports_buttons() {
        let mut pad = DigitalController::new();
        pad.set_button_state(DigitalButton::Start, true);
        pad.set_button_state(DigitalButton::Cross, true);

        let replies: Vec<(u8, bool)> = [0x01, 0x42, 0x00, 0x00, 0x00]
            .iter()
            .map(|&b| pad.transfer(b))
            .collect();
        assert_eq!(
            replies,
            vec![
                (0xFF, true),
                (0x41, true),
                (0x5A, true),
                (0xF7, true),
                (0xBF, false),
            ]
        );
        assert_eq!(pad.button_state_bits(), (1 << 3) | (1 << 14));
    }

    #[test]
    fn test_release_restores_bit() {
        let mut pad = DigitalController::new();
        pad.set_button_state(DigitalButton::Square, true);
        pad.set_button_state(DigitalButton::Square, false);
        assert_eq!(pad.button_state_bits(), 0);
    }

    #[test]
    fn test_button_table() {
        assert_eq!(DigitalButton::from_index(0), Some(DigitalButton::Select));
        assert_eq!(DigitalButton::from_index(15), Some(DigitalButton::Square));
        assert_eq!(DigitalButton::from_index(16), None);
        assert_eq!(DigitalButton::Triangle.name(), "Triangle");
    }

    #[test]
    fn test_state_respects_apply_input_flag() {
        let mut pad = DigitalController::new();
        pad.set_button_state(DigitalButton::Up, true);
        pad.transfer(0x01);
        let mut sw = StateWrapper::writer(1);
        assert!(pad.do_state(&mut sw, true));
        let doc = sw.finish().unwrap();

        let mut restored = DigitalController::new();
        let mut sw = StateWrapper::reader(&doc).unwrap();
        assert!(restored.do_state(&mut sw, false));
        assert_eq!(restored.button_state_bits(), 0);
        // Protocol state restored regardless
        assert_eq!(restored.transfer(0x42), (0x41, true));

        let mut restored = DigitalController::new();
        let mut sw = StateWrapper::reader(&doc).unwrap();
        assert!(restored.do_state(&mut sw, true));
        assert_eq!(restored.button_state_bits(), 1 << 4);
    }
}
