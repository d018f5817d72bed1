//! Namco GunCon light gun.
//!
//! The gun reports the beam position its sensor last saw, in 8 MHz dot
//! clock units horizontally and scanlines vertically. Position is sampled
//! when the host clocks out the X low byte.

use super::{apply_button, do_input_value, CONTROLLER_READ, CONTROLLER_SELECT};
use crate::display::{crosshair_image, PointerSource, SoftwareCursor};
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::settings::SettingsSource;
use emu_core::state::StateWrapper;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

const ID: u16 = 0x5A63;

/// Position reported when the gun is not pointing at the screen
const OFFSCREEN_X: u16 = 0x0001;
const OFFSCREEN_Y: u16 = 0x000A;

/// Horizontal position unit
const GUN_CLOCK_HZ: f64 = 8_000_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum TransferState {
    Idle,
    Ready,
    IdMsb,
    ButtonsLsb,
    ButtonsMsb,
    XLsb,
    XMsb,
    YLsb,
    YMsb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GunConButton {
    Trigger,
    A,
    B,
    /// Fire while pointing away from the screen (reload)
    ShootOffscreen,
}

impl GunConButton {
    pub const ALL: [GunConButton; 4] = [
        GunConButton::Trigger,
        GunConButton::A,
        GunConButton::B,
        GunConButton::ShootOffscreen,
    ];

    pub const NAMES: [&'static str; 4] = ["Trigger", "A", "B", "ShootOffscreen"];

    pub fn from_index(index: i32) -> Option<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
    }

    fn bit(self) -> Option<u8> {
        match self {
            GunConButton::Trigger => Some(13),
            GunConButton::A => Some(3),
            GunConButton::B => Some(14),
            GunConButton::ShootOffscreen => None,
        }
    }
}

#[derive(Clone)]
pub struct NamcoGunCon {
    /// Active low: 1 = released
    button_state: u16,
    position_x: u16,
    position_y: u16,
    shoot_offscreen: bool,
    transfer_state: TransferState,
    x_scale: f32,
    y_scale: f32,
    pointer: Option<Rc<dyn PointerSource>>,
}

impl fmt::Debug for NamcoGunCon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamcoGunCon")
            .field("button_state", &self.button_state)
            .field("position_x", &self.position_x)
            .field("position_y", &self.position_y)
            .field("shoot_offscreen", &self.shoot_offscreen)
            .field("transfer_state", &self.transfer_state)
            .field("x_scale", &self.x_scale)
            .field("y_scale", &self.y_scale)
            .field("pointer", &self.pointer.is_some())
            .finish()
    }
}

impl Default for NamcoGunCon {
    fn default() -> Self {
        Self::new()
    }
}

impl NamcoGunCon {
    pub fn new() -> Self {
        Self {
            button_state: 0xFFFF,
            position_x: 0,
            position_y: 0,
            shoot_offscreen: false,
            transfer_state: TransferState::Idle,
            x_scale: 1.0,
            y_scale: 1.0,
            pointer: None,
        }
    }

    pub fn reset(&mut self) {
        self.transfer_state = TransferState::Idle;
    }

    pub fn reset_transfer_state(&mut self) {
        self.transfer_state = TransferState::Idle;
    }

    /// Without a pointer source the gun always reads off-screen
    pub fn set_pointer_source(&mut self, source: Option<Rc<dyn PointerSource>>) {
        self.pointer = source;
    }

    pub fn set_button_state(&mut self, button: GunConButton, pressed: bool) {
        match button.bit() {
            Some(bit) => apply_button(&mut self.button_state, bit, pressed),
            None => {
                if self.shoot_offscreen != pressed {
                    self.shoot_offscreen = pressed;
                    self.set_button_state(GunConButton::Trigger, pressed);
                }
            }
        }
    }

    pub fn button_state_bits(&self) -> u32 {
        u32::from(!self.button_state)
    }

    /// Last sampled position
    pub fn position(&self) -> (u16, u16) {
        (self.position_x, self.position_y)
    }

    pub fn load_settings(&mut self, settings: &dyn SettingsSource, section: &str) {
        self.x_scale = settings.get_float(section, "XScale", 1.0);
        self.y_scale = settings.get_float(section, "YScale", 1.0);
    }

    pub fn software_cursor(&self) -> SoftwareCursor {
        SoftwareCursor {
            image: crosshair_image(),
            scale: 1.0,
            relative_mode: false,
        }
    }

    fn sample_position(&mut self) {
        let beam = self.pointer.as_ref().and_then(|pointer| {
            let (x, y) = pointer.pointer_position();
            let frequency = pointer.crtc_frequency();
            if x < 0 || y < 0 || self.shoot_offscreen || frequency == 0 {
                return None;
            }
            pointer
                .screen_to_beam(x, y, self.x_scale, self.y_scale)
                .map(|(tick, line)| (tick, line, frequency))
        });

        match beam {
            Some((tick, line, frequency)) => {
                let ticks_per_unit = f64::from(frequency) / GUN_CLOCK_HZ;
                self.position_x = (f64::from(tick) / ticks_per_unit) as u16;
                self.position_y = line as u16;
            }
            None => {
                self.position_x = OFFSCREEN_X;
                self.position_y = OFFSCREEN_Y;
            }
        }

        log(LogCategory::Devices, LogLevel::Trace, || {
            format!("GunCon position: ({}, {})", self.position_x, self.position_y)
        });
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
            TransferState::ButtonsMsb => ((self.button_state >> 8) as u8, Some(TransferState::XLsb)),
            TransferState::XLsb => {
                self.sample_position();
                (self.position_x as u8, Some(TransferState::XMsb))
            }
            TransferState::XMsb => ((self.position_x >> 8) as u8, Some(TransferState::YLsb)),
            TransferState::YLsb => (self.position_y as u8, Some(TransferState::YMsb)),
            TransferState::YMsb => ((self.position_y >> 8) as u8, None),
        };

        log(LogCategory::Devices, LogLevel::Trace, || {
            format!(
                "GunCon {:?}: 0x{:02X} -> 0x{:02X}",
                self.transfer_state, data_in, data_out
            )
        });
        self.transfer_state = next.unwrap_or(TransferState::Idle);
        (data_out, next.is_some())
    }

    pub fn do_state(&mut self, sw: &mut StateWrapper, apply_input_state: bool) -> bool {
        do_input_value(sw, &mut self.button_state, apply_input_state);
        do_input_value(sw, &mut self.shoot_offscreen, apply_input_state);
        sw.do_value(&mut self.position_x);
        sw.do_value(&mut self.position_y);
        sw.do_value(&mut self.transfer_state);
        !sw.has_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::FixedPointer;
    use emu_core::settings::JsonSettings;

    fn packet(gun: &mut NamcoGunCon) -> Vec<u8> {
        let mut out = Vec::new();
        for (i, byte) in [0x01, 0x42, 0, 0, 0, 0, 0, 0, 0].into_iter().enumerate() {
            let (data, ack) = gun.transfer(byte);
            assert_eq!(ack, i != 8, "ack on byte {}", i);
            out.push(data);
        }
        out
    }

    fn gun_with_pointer() -> (NamcoGunCon, Rc<FixedPointer>) {
        let pointer = Rc::new(FixedPointer::ntsc_320x240());
        let mut gun = NamcoGunCon::new();
        gun.set_pointer_source(Some(pointer.clone()));
        (gun, pointer)
    }

    #[test]
    fn test_no_pointer_reads_offscreen() {
        let mut gun = NamcoGunCon::new();
        let bytes = packet(&mut gun);
        assert_eq!(&bytes[1..5], &[0x63, 0x5A, 0xFF, 0xFF]);
        assert_eq!(&bytes[5..], &[0x01, 0x00, 0x0A, 0x00]);
    }

    #[test]
    fn test_position_from_pointer() {
        let (mut gun, pointer) = gun_with_pointer();
        pointer.set_position(160, 100);

        let bytes = packet(&mut gun);
        // tick = 0x260 + 160 * 8 = 1888; 53.693175 MHz / 8 MHz = 6.7116...
        let expected_x = (1888.0 / (53_693_175.0 / 8_000_000.0)) as u16;
        assert_eq!(gun.position(), (expected_x, 116));
        assert_eq!(bytes[5], expected_x as u8);
        assert_eq!(bytes[6], (expected_x >> 8) as u8);
        assert_eq!(bytes[7], 116);
        assert_eq!(bytes[8], 0);
    }

    #[test]
    fn test_pointer_outside_window_is_offscreen() {
        let (mut gun, pointer) = gun_with_pointer();
        pointer.set_position(-5, 20);
        packet(&mut gun);
        assert_eq!(gun.position(), (OFFSCREEN_X, OFFSCREEN_Y));

        pointer.set_position(400, 20);
        packet(&mut gun);
        assert_eq!(gun.position(), (OFFSCREEN_X, OFFSCREEN_Y));
    }

    #[test]
    fn test_shoot_offscreen_toggles_trigger_once() {
        let (mut gun, pointer) = gun_with_pointer();
        pointer.set_position(100, 100);

        gun.set_button_state(GunConButton::ShootOffscreen, true);
        assert_eq!(gun.button_state_bits(), 1 << 13);
        gun.set_button_state(GunConButton::ShootOffscreen, true);
        assert_eq!(gun.button_state_bits(), 1 << 13);

        packet(&mut gun);
        assert_eq!(gun.position(), (OFFSCREEN_X, OFFSCREEN_Y));

        gun.set_button_state(GunConButton::ShootOffscreen, false);
        assert_eq!(gun.button_state_bits(), 0);
        gun.set_button_state(GunConButton::ShootOffscreen, false);
        assert_eq!(gun.button_state_bits(), 0);
    }

    #[test]
    fn test_buttons_on_wire() {
        let mut gun = NamcoGunCon::new();
        gun.set_button_state(GunConButton::Trigger, true);
        gun.set_button_state(GunConButton::A, true);
        let bytes = packet(&mut gun);
        assert_eq!(bytes[3], 0xF7);
        assert_eq!(bytes[4], 0xDF);
    }

    #[test]
    fn test_scale_settings() {
        let (mut gun, pointer) = gun_with_pointer();
        let mut settings = JsonSettings::new();
        settings.set("Controller2", "XScale", serde_json::json!(2.0));
        gun.load_settings(&settings, "Controller2");

        // Left of centre by 100px; doubled it leaves the screen
        pointer.set_position(60, 120);
        packet(&mut gun);
        assert_eq!(gun.position(), (OFFSCREEN_X, OFFSCREEN_Y));

        gun.load_settings(&JsonSettings::new(), "Controller2");
        packet(&mut gun);
        assert_ne!(gun.position(), (OFFSCREEN_X, OFFSCREEN_Y));
    }

    #[test]
    fn test_software_cursor() {
        let cursor = NamcoGunCon::new().software_cursor();
        assert_eq!(cursor.scale, 1.0);
        assert!(!cursor.relative_mode);
        assert_eq!(cursor.image.width, 32);
    }
}
