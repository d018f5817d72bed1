//! Controllers that plug into a pad port.
//!
//! Every controller answers the same handshake: the host selects it with
//! `0x01`, sends the read command `0x42`, and then clocks out the 16-bit
//! device ID followed by a device-specific payload. Each byte exchange
//! returns the byte sent back and whether the device pulls /ACK to ask for
//! another one; the last byte of a packet is never acknowledged.
//!
//! Buttons are active low on the wire: a set bit means released.

mod digital;
mod guncon;
mod negcon;

pub use digital::{DigitalButton, DigitalController};
pub use guncon::{GunConButton, NamcoGunCon};
pub use negcon::{NeGcon, NeGconAxis, NeGconButton, TwistResponse};

use crate::display::{PointerSource, SoftwareCursor};
use emu_core::settings::SettingsSource;
use emu_core::state::StateWrapper;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// Select byte that opens a controller packet
pub const CONTROLLER_SELECT: u8 = 0x01;
/// Read command, second byte of a controller packet
pub const CONTROLLER_READ: u8 = 0x42;

/// Kind of device attached to a controller slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ControllerType {
    #[default]
    None,
    DigitalController,
    NeGcon,
    NamcoGunCon,
}

impl ControllerType {
    pub const ALL: [ControllerType; 4] = [
        ControllerType::None,
        ControllerType::DigitalController,
        ControllerType::NeGcon,
        ControllerType::NamcoGunCon,
    ];

    /// Identifier used in configuration files
    pub fn name(self) -> &'static str {
        match self {
            ControllerType::None => "None",
            ControllerType::DigitalController => "DigitalController",
            ControllerType::NeGcon => "NeGcon",
            ControllerType::NamcoGunCon => "NamcoGunCon",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ControllerType::None => "Not Connected",
            ControllerType::DigitalController => "Digital Controller",
            ControllerType::NeGcon => "NeGcon",
            ControllerType::NamcoGunCon => "Namco GunCon",
        }
    }

    /// Parse either the identifier or the display name, ignoring case
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|ty| {
            ty.name().eq_ignore_ascii_case(name) || ty.display_name().eq_ignore_ascii_case(name)
        })
    }

    pub fn button_names(self) -> &'static [&'static str] {
        match self {
            ControllerType::None => &[],
            ControllerType::DigitalController => &DigitalButton::NAMES,
            ControllerType::NeGcon => &NeGconButton::NAMES,
            ControllerType::NamcoGunCon => &GunConButton::NAMES,
        }
    }

    pub fn axis_names(self) -> &'static [&'static str] {
        match self {
            ControllerType::NeGcon => &NeGconAxis::NAMES,
            _ => &[],
        }
    }
}

/// A connected controller
#[derive(Debug, Clone)]
pub enum Controller {
    Digital(DigitalController),
    NeGcon(NeGcon),
    GunCon(NamcoGunCon),
}

impl Controller {
    /// Create a device of the given type; None for [`ControllerType::None`]
    pub fn create(controller_type: ControllerType) -> Option<Self> {
        match controller_type {
            ControllerType::None => None,
            ControllerType::DigitalController => {
                Some(Controller::Digital(DigitalController::new()))
            }
            ControllerType::NeGcon => Some(Controller::NeGcon(NeGcon::new())),
            ControllerType::NamcoGunCon => Some(Controller::GunCon(NamcoGunCon::new())),
        }
    }

    pub fn controller_type(&self) -> ControllerType {
        match self {
            Controller::Digital(_) => ControllerType::DigitalController,
            Controller::NeGcon(_) => ControllerType::NeGcon,
            Controller::GunCon(_) => ControllerType::NamcoGunCon,
        }
    }

    pub fn reset(&mut self) {
        match self {
            Controller::Digital(c) => c.reset(),
            Controller::NeGcon(c) => c.reset(),
            Controller::GunCon(c) => c.reset(),
        }
    }

    /// Abandon any packet in progress
    pub fn reset_transfer_state(&mut self) {
        match self {
            Controller::Digital(c) => c.reset_transfer_state(),
            Controller::NeGcon(c) => c.reset_transfer_state(),
            Controller::GunCon(c) => c.reset_transfer_state(),
        }
    }

    /// Exchange one byte. Returns the reply and whether the device acknowledges.
    pub fn transfer(&mut self, data_in: u8) -> (u8, bool) {
        match self {
            Controller::Digital(c) => c.transfer(data_in),
            Controller::NeGcon(c) => c.transfer(data_in),
            Controller::GunCon(c) => c.transfer(data_in),
        }
    }

    /// Serialize or restore. Input state (buttons, axes) is only taken from
    /// the stream when `apply_input_state` is set; protocol state always is.
    pub fn do_state(&mut self, sw: &mut StateWrapper, apply_input_state: bool) -> bool {
        match self {
            Controller::Digital(c) => c.do_state(sw, apply_input_state),
            Controller::NeGcon(c) => c.do_state(sw, apply_input_state),
            Controller::GunCon(c) => c.do_state(sw, apply_input_state),
        }
    }

    /// Press or release a button by index into [`Self::button_names`].
    /// Unknown indices are ignored.
    pub fn set_button_state(&mut self, code: i32, pressed: bool) {
        match self {
            Controller::Digital(c) => {
                if let Some(button) = DigitalButton::from_index(code) {
                    c.set_button_state(button, pressed);
                }
            }
            Controller::NeGcon(c) => {
                if let Some(button) = NeGconButton::from_index(code) {
                    c.set_button_state(button, pressed);
                }
            }
            Controller::GunCon(c) => {
                if let Some(button) = GunConButton::from_index(code) {
                    c.set_button_state(button, pressed);
                }
            }
        }
    }

    /// Press or release a button by name. Returns false for unknown names.
    pub fn set_button_state_by_name(&mut self, name: &str, pressed: bool) -> bool {
        match self.button_code(name) {
            Some(code) => {
                self.set_button_state(code, pressed);
                true
            }
            None => false,
        }
    }

    /// Set an axis by index into [`Self::axis_names`]. Unknown indices and
    /// controllers without axes ignore the call.
    pub fn set_axis_state(&mut self, code: i32, value: f32) {
        if let Controller::NeGcon(c) = self {
            if let Some(axis) = NeGconAxis::from_index(code) {
                c.set_axis_state(axis, value);
            }
        }
    }

    /// Set an axis by name. Returns false for unknown names.
    pub fn set_axis_state_by_name(&mut self, name: &str, value: f32) -> bool {
        match self.axis_code(name) {
            Some(code) => {
                self.set_axis_state(code, value);
                true
            }
            None => false,
        }
    }

    pub fn button_code(&self, name: &str) -> Option<i32> {
        code_for(self.button_names(), name)
    }

    pub fn axis_code(&self, name: &str) -> Option<i32> {
        code_for(self.axis_names(), name)
    }

    pub fn button_names(&self) -> &'static [&'static str] {
        self.controller_type().button_names()
    }

    pub fn axis_names(&self) -> &'static [&'static str] {
        self.controller_type().axis_names()
    }

    /// Currently pressed buttons, one bit per wire bit, pressed = 1
    pub fn button_state_bits(&self) -> u32 {
        match self {
            Controller::Digital(c) => c.button_state_bits(),
            Controller::NeGcon(c) => c.button_state_bits(),
            Controller::GunCon(c) => c.button_state_bits(),
        }
    }

    /// Packed analog bytes for input display, if the device has axes
    pub fn analog_input_bytes(&self) -> Option<u32> {
        match self {
            Controller::NeGcon(c) => Some(c.analog_input_bytes()),
            _ => None,
        }
    }

    /// Reload tunables from `section` of the settings
    pub fn load_settings(&mut self, settings: &dyn SettingsSource, section: &str) {
        match self {
            Controller::Digital(_) => {}
            Controller::NeGcon(c) => c.load_settings(settings, section),
            Controller::GunCon(c) => c.load_settings(settings, section),
        }
    }

    /// Attach the host pointer. Only pointing devices use it.
    pub fn set_pointer_source(&mut self, source: Option<Rc<dyn PointerSource>>) {
        if let Controller::GunCon(c) = self {
            c.set_pointer_source(source);
        }
    }

    /// Cursor the host should draw for this device, if any
    pub fn software_cursor(&self) -> Option<SoftwareCursor> {
        match self {
            Controller::GunCon(c) => Some(c.software_cursor()),
            _ => None,
        }
    }
}

fn code_for(names: &[&str], name: &str) -> Option<i32> {
    names
        .iter()
        .position(|n| n.eq_ignore_ascii_case(name))
        .and_then(|i| i32::try_from(i).ok())
}

/// Clear (pressed) or set (released) an active-low button bit
pub(crate) fn apply_button(state: &mut u16, bit: u8, pressed: bool) {
    if pressed {
        *state &= !(1u16 << bit);
    } else {
        *state |= 1u16 << bit;
    }
}

/// Round-trip an input field, only overwriting it on restore when asked to.
/// The item is consumed either way so the stream stays aligned.
pub(crate) fn do_input_value<T>(sw: &mut StateWrapper, live: &mut T, apply_input_state: bool)
where
    T: Serialize + DeserializeOwned + Clone,
{
    let mut value = live.clone();
    sw.do_value(&mut value);
    if apply_input_state && sw.is_reading() && !sw.has_error() {
        *live = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Clock a full read packet through a controller
    fn read_packet(controller: &mut Controller, len: usize) -> Vec<(u8, bool)> {
        let mut out = vec![controller.transfer(CONTROLLER_SELECT)];
        out.push(controller.transfer(CONTROLLER_READ));
        for _ in 2..len {
            out.push(controller.transfer(0x00));
        }
        out
    }

    #[test]
    fn test_create_matches_type() {
        for ty in ControllerType::ALL {
            let controller = Controller::create(ty);
            assert_eq!(
                controller.as_ref().map(Controller::controller_type),
                if ty == ControllerType::None { None } else { Some(ty) }
            );
        }
    }

    #[test]
    fn test_type_names() {
        assert_eq!(
            ControllerType::from_name("digitalcontroller"),
            Some(ControllerType::DigitalController)
        );
        assert_eq!(
            ControllerType::from_name("Namco GunCon"),
            Some(ControllerType::NamcoGunCon)
        );
        assert_eq!(ControllerType::from_name("DualShock"), None);
        assert_eq!(ControllerType::NeGcon.axis_names(), &["Steering", "I", "II", "L"]);
        assert!(ControllerType::None.button_names().is_empty());
    }

    #[test]
    fn test_input_by_name() {
        let mut pad = Controller::create(ControllerType::DigitalController).unwrap();
        assert!(pad.set_button_state_by_name("Cross", true));
        assert!(!pad.set_button_state_by_name("Turbo", true));
        assert!(!pad.set_axis_state_by_name("Steering", 0.5));
        assert_eq!(pad.button_state_bits(), 1 << 14);

        // Out of range codes are ignored
        pad.set_button_state(99, true);
        pad.set_button_state(-1, true);
        assert_eq!(pad.button_state_bits(), 1 << 14);
    }

    #[test]
    fn test_packet_lengths() {
        let cases = [
            (ControllerType::DigitalController, 5, 0x41),
            (ControllerType::NeGcon, 9, 0x23),
            (ControllerType::NamcoGunCon, 9, 0x63),
        ];
        for (ty, len, id) in cases {
            let mut controller = Controller::create(ty).unwrap();
            let packet = read_packet(&mut controller, len);
            assert_eq!(packet[1], (id, true), "{:?}", ty);
            assert_eq!(packet[2], (0x5A, true), "{:?}", ty);
            let acks: Vec<bool> = packet.iter().map(|&(_, ack)| ack).collect();
            let mut expected = vec![true; len];
            expected[len - 1] = false;
            assert_eq!(acks, expected, "{:?}", ty);

            // Back to Idle: a new packet starts cleanly
            assert_eq!(controller.transfer(CONTROLLER_SELECT), (0xFF, true));
        }
    }

    #[test]
    fn test_bad_command_returns_to_idle() {
        for ty in [
            ControllerType::DigitalController,
            ControllerType::NeGcon,
            ControllerType::NamcoGunCon,
        ] {
            let mut controller = Controller::create(ty).unwrap();
            assert_eq!(controller.transfer(CONTROLLER_SELECT), (0xFF, true));
            assert_eq!(controller.transfer(0x43), (0xFF, false));
            // Not selected: anything but 0x01 is ignored
            assert_eq!(controller.transfer(CONTROLLER_READ), (0xFF, false));
            assert_eq!(controller.transfer(CONTROLLER_SELECT), (0xFF, true));
        }
    }

    #[test]
    fn test_reset_transfer_state_abandons_packet() {
        let mut controller = Controller::create(ControllerType::NeGcon).unwrap();
        controller.transfer(CONTROLLER_SELECT);
        controller.transfer(CONTROLLER_READ);
        controller.reset_transfer_state();
        assert_eq!(controller.transfer(CONTROLLER_READ), (0xFF, false));
    }

    #[test]
    fn test_apply_button_active_low() {
        let mut state = 0xFFFFu16;
        apply_button(&mut state, 3, true);
        assert_eq!(state, 0xFFF7);
        apply_button(&mut state, 3, false);
        assert_eq!(state, 0xFFFF);
    }
}
