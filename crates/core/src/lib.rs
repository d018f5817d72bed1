//! Core emulator primitives shared by the system crates.
//!
//! - [`logging`]: category/level logging with rate limiting
//! - [`timing`]: discrete events on the virtual tick counter
//! - [`state`]: versioned save state cursor
//! - [`settings`]: per-section key/value settings lookup

pub mod logging;
pub mod settings;
pub mod state;
pub mod timing;

pub mod types {
    use serde::{Deserialize, Serialize};

    /// RGBA8888 pixel buffer (one `u32` per pixel, `0xAARRGGBB`)
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Frame {
        pub width: u32,
        pub height: u32,
        pub pixels: Vec<u32>,
    }

    impl Frame {
        pub fn new(width: u32, height: u32) -> Self {
            Self {
                width,
                height,
                pixels: vec![0; (width * height) as usize],
            }
        }

        /// Pixel at (x, y), or None outside the frame
        pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
            if x < self.width && y < self.height {
                self.pixels.get((y * self.width + x) as usize).copied()
            } else {
                None
            }
        }

        /// Set the pixel at (x, y); writes outside the frame are ignored
        pub fn set_pixel(&mut self, x: u32, y: u32, color: u32) {
            if x < self.width && y < self.height {
                if let Some(p) = self.pixels.get_mut((y * self.width + x) as usize) {
                    *p = color;
                }
            }
        }
    }
}
