//! Interrupt lines and the sink the peripheral bus raises them on.
//!
//! The bus only ever raises [`Irq::Pad`]; the remaining lines are listed so
//! the latch mirrors the console's I_STAT layout.

use emu_core::logging::{log, LogCategory, LogLevel};
use serde::{Deserialize, Serialize};

/// Interrupt controller input lines (bit position in I_STAT)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Irq {
    Vblank = 0,
    Gpu = 1,
    Cdrom = 2,
    Dma = 3,
    Tmr0 = 4,
    Tmr1 = 5,
    Tmr2 = 6,
    /// Controller and memory card byte received (IRQ7)
    Pad = 7,
    Sio = 8,
    Spu = 9,
    Lightpen = 10,
}

impl Irq {
    /// I_STAT/I_MASK bit for this line
    pub fn mask(self) -> u16 {
        1 << (self as u16)
    }
}

/// Receiver of interrupt requests
pub trait InterruptSink {
    fn raise(&mut self, irq: Irq);
}

/// Edge-latched interrupt status with a mask, like I_STAT/I_MASK
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptLatch {
    status: u16,
    mask: u16,
}

impl InterruptLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw I_STAT bits
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn mask(&self) -> u16 {
        self.mask
    }

    pub fn set_mask(&mut self, mask: u16) {
        self.mask = mask;
    }

    pub fn is_pending(&self, irq: Irq) -> bool {
        self.status & irq.mask() != 0
    }

    /// I_STAT write semantics: bits written as 0 are acknowledged
    pub fn acknowledge(&mut self, value: u16) {
        self.status &= value;
    }

    /// Acknowledge a single line
    pub fn clear(&mut self, irq: Irq) {
        self.status &= !irq.mask();
    }

    /// True when any unmasked line is pending
    pub fn irq_line(&self) -> bool {
        self.status & self.mask != 0
    }
}

impl InterruptSink for InterruptLatch {
    fn raise(&mut self, irq: Irq) {
        log(LogCategory::Interrupts, LogLevel::Debug, || {
            format!("{:?} (IRQ{}) raised", irq, irq as u16)
        });
        self.status |= irq.mask();
    }
}
