//! PlayStation controller and memory card bus.
//!
//! [`Pad`] is the SIO0 serial interface the CPU uses to talk to what is
//! plugged into the two front ports: controllers ([`controller`]), memory
//! cards ([`memory_card`]) and multitaps ([`multitap`]). The host drives it
//! through register reads/writes and by advancing time with
//! [`Pad::execute`]; acknowledge interrupts come out through an
//! [`InterruptSink`].
//!
//! ```
//! use emu_psx::{Controller, ControllerType, InterruptLatch, Irq, Pad};
//! use emu_psx::pad::{JOY_BAUD, JOY_CTRL, JOY_DATA};
//!
//! let mut pad = Pad::new();
//! pad.set_controller(0, Controller::create(ControllerType::DigitalController))
//!     .unwrap();
//! let mut irq = InterruptLatch::new();
//!
//! pad.write_register(JOY_BAUD, 0x88);
//! pad.write_register(JOY_CTRL, 0x1003); // TXEN | SELECT | ACKINTEN
//! pad.write_register(JOY_DATA, 0x01);
//! pad.execute(0x88 * 8 + 1000, &mut irq);
//! assert!(irq.is_pending(Irq::Pad));
//! ```

pub mod config;
pub mod controller;
pub mod display;
pub mod error;
pub mod interrupt;
pub mod memory_card;
pub mod multitap;
pub mod pad;

pub use config::{MultitapMode, PadConfig};
pub use controller::{Controller, ControllerType};
pub use display::{PointerSource, SoftwareCursor};
pub use error::PadError;
pub use interrupt::{InterruptLatch, InterruptSink, Irq};
pub use memory_card::MemoryCard;
pub use multitap::Multitap;
pub use pad::{ActiveDevice, BusState, Pad};
