//! Host pointer and display beam mapping used by the light gun.
//!
//! The light gun reports where on the CRT the beam was when its sensor saw
//! it. The emulator has no beam, so the gun asks a [`PointerSource`] for the
//! host pointer position and converts it to a beam tick/line through the
//! display's current geometry.

use emu_core::types::Frame;
use std::cell::Cell;

/// Host pointer plus the display geometry needed to map it onto the beam
pub trait PointerSource {
    /// Pointer position in window pixels; negative coordinates mean the
    /// pointer has left the window
    fn pointer_position(&self) -> (i32, i32);

    /// Map a window position to the beam `(tick, line)` it corresponds to,
    /// after scaling around the window centre. None when the point falls
    /// outside the active display area.
    fn screen_to_beam(&self, x: i32, y: i32, x_scale: f32, y_scale: f32) -> Option<(u32, u32)>;

    /// Frequency of the clock the beam tick counts, in Hz
    fn crtc_frequency(&self) -> u32;
}

/// On-screen cursor a device asks the host to draw in place of the pointer
#[derive(Debug, Clone, PartialEq)]
pub struct SoftwareCursor {
    pub image: Frame,
    pub scale: f32,
    /// Relative (captured) pointer instead of absolute window coordinates
    pub relative_mode: bool,
}

const CROSSHAIR_SIZE: u32 = 32;
const CROSSHAIR_GAP: i32 = 3;
const CROSSHAIR_ARM: i32 = 13;

const OPAQUE_WHITE: u32 = 0xFFFF_FFFF;
const OPAQUE_BLACK: u32 = 0xFF00_0000;

fn crosshair_arm(dx: i32, dy: i32) -> bool {
    let along = |d: i32| (CROSSHAIR_GAP..=CROSSHAIR_ARM).contains(&d.abs());
    (dx == 0 && along(dy)) || (dy == 0 && along(dx))
}

/// Crosshair image: white arms with a black outline on a transparent
/// background, with a gap at the centre so the aimed pixel stays visible
pub fn crosshair_image() -> Frame {
    let mut image = Frame::new(CROSSHAIR_SIZE, CROSSHAIR_SIZE);
    let centre = (CROSSHAIR_SIZE / 2) as i32;

    for y in 0..CROSSHAIR_SIZE {
        for x in 0..CROSSHAIR_SIZE {
            let dx = x as i32 - centre;
            let dy = y as i32 - centre;
            if crosshair_arm(dx, dy) {
                image.set_pixel(x, y, OPAQUE_WHITE);
                continue;
            }
            let outline = (-1..=1)
                .flat_map(|oy| (-1..=1).map(move |ox| (ox, oy)))
                .any(|(ox, oy)| crosshair_arm(dx + ox, dy + oy));
            if outline {
                image.set_pixel(x, y, OPAQUE_BLACK);
            }
        }
    }

    image
}

/// [`PointerSource`] with a fixed linear window-to-beam mapping.
///
/// The pointer is moved with [`FixedPointer::set_position`], which takes
/// `&self` so the source can be shared with a light gun through an `Rc`.
#[derive(Debug, Clone)]
pub struct FixedPointer {
    position: Cell<(i32, i32)>,
    width: u32,
    height: u32,
    /// Beam tick at the left edge of the active area
    tick_origin: u32,
    ticks_per_pixel: f32,
    /// Beam line at the top edge of the active area
    line_origin: u32,
    crtc_frequency: u32,
}

impl FixedPointer {
    /// NTSC GPU clock
    pub const NTSC_CRTC_FREQUENCY: u32 = 53_693_175;

    /// 320x240 NTSC display: 8 ticks per pixel (dot clock /8), active area
    /// starting at tick 0x260, line 16
    pub fn ntsc_320x240() -> Self {
        Self::new(320, 240, 0x260, 8.0, 16, Self::NTSC_CRTC_FREQUENCY)
    }

    pub fn new(
        width: u32,
        height: u32,
        tick_origin: u32,
        ticks_per_pixel: f32,
        line_origin: u32,
        crtc_frequency: u32,
    ) -> Self {
        Self {
            position: Cell::new((-1, -1)),
            width,
            height,
            tick_origin,
            ticks_per_pixel,
            line_origin,
            crtc_frequency,
        }
    }

    pub fn set_position(&self, x: i32, y: i32) {
        self.position.set((x, y));
    }
}

impl PointerSource for FixedPointer {
    fn pointer_position(&self) -> (i32, i32) {
        self.position.get()
    }

    fn screen_to_beam(&self, x: i32, y: i32, x_scale: f32, y_scale: f32) -> Option<(u32, u32)> {
        let half_w = self.width as f32 / 2.0;
        let half_h = self.height as f32 / 2.0;
        let sx = (x as f32 - half_w) * x_scale + half_w;
        let sy = (y as f32 - half_h) * y_scale + half_h;
        if sx < 0.0 || sy < 0.0 || sx >= self.width as f32 || sy >= self.height as f32 {
            return None;
        }

        let tick = self.tick_origin + (sx * self.ticks_per_pixel) as u32;
        let line = self.line_origin + sy as u32;
        Some((tick, line))
    }

    fn crtc_frequency(&self) -> u32 {
        self.crtc_frequency
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crosshair_shape() {
        let image = crosshair_image();
        assert_eq!(image.width, 32);
        assert_eq!(image.height, 32);
        // Centre gap is transparent
        assert_eq!(image.pixel(16, 16), Some(0));
        // Arms
        assert_eq!(image.pixel(16, 16 + 5), Some(OPAQUE_WHITE));
        assert_eq!(image.pixel(16 - 10, 16), Some(OPAQUE_WHITE));
        // Outline beside an arm
        assert_eq!(image.pixel(17, 16 + 5), Some(OPAQUE_BLACK));
        // Corners untouched
        assert_eq!(image.pixel(0, 0), Some(0));
    }

    #[test]
    fn test_fixed_pointer_mapping() {
        let pointer = FixedPointer::ntsc_320x240();
        assert_eq!(pointer.pointer_position(), (-1, -1));
        pointer.set_position(10, 20);
        assert_eq!(pointer.pointer_position(), (10, 20));

        assert_eq!(pointer.screen_to_beam(0, 0, 1.0, 1.0), Some((0x260, 16)));
        assert_eq!(pointer.screen_to_beam(10, 20, 1.0, 1.0), Some((0x260 + 80, 36)));
        assert_eq!(pointer.screen_to_beam(320, 0, 1.0, 1.0), None);
        assert_eq!(pointer.screen_to_beam(-1, 0, 1.0, 1.0), None);
    }

    #[test]
    fn test_fixed_pointer_scale_around_centre() {
        let pointer = FixedPointer::ntsc_320x240();
        // Centre is a fixed point of the scale
        assert_eq!(
            pointer.screen_to_beam(160, 120, 2.0, 2.0),
            pointer.screen_to_beam(160, 120, 1.0, 1.0)
        );
        // Point near the edge is pushed off screen by a 2x scale
        assert_eq!(pointer.screen_to_beam(300, 120, 2.0, 1.0), None);
    }
}
