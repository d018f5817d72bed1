//! Drives the pad bus the way the console firmware does: one byte at a
//! time, waiting for the acknowledge interrupt before sending the next.

#![allow(dead_code)]

use emu_psx::pad::{JoyCtrl, JOY_BAUD, JOY_CTRL, JOY_DATA, MEMORY_CARD_ACK_TICKS};
use emu_psx::{InterruptLatch, Irq, Pad};

pub const BAUD: u16 = 0x88;

pub fn transfer_ticks() -> i32 {
    i32::from(BAUD) * 8
}

pub struct Host {
    pub pad: Pad,
    pub irq: InterruptLatch,
    port: usize,
}

impl Host {
    pub fn new(mut pad: Pad) -> Self {
        pad.write_register(JOY_BAUD, u32::from(BAUD));
        Self {
            pad,
            irq: InterruptLatch::new(),
            port: 0,
        }
    }

    pub fn ctrl_bits(&self) -> u32 {
        let mut ctrl = JoyCtrl::TXEN | JoyCtrl::SELECT | JoyCtrl::ACKINTEN;
        if self.port == 1 {
            ctrl |= JoyCtrl::SLOT;
        }
        u32::from(ctrl.bits())
    }

    pub fn select(&mut self, port: usize) {
        self.port = port;
        let ctrl = self.ctrl_bits();
        self.pad.write_register(JOY_CTRL, ctrl);
    }

    pub fn deselect(&mut self) {
        self.pad.write_register(JOY_CTRL, 0);
    }

    /// Send one byte and wait long enough for any acknowledge.
    /// Returns the received byte and whether the IRQ fired.
    pub fn exchange(&mut self, byte: u8) -> (u8, bool) {
        self.pad.write_register(JOY_DATA, u32::from(byte));
        self.pad.execute(transfer_ticks(), &mut self.irq);
        let data = self.pad.read_register(JOY_DATA, &mut self.irq) as u8;
        self.pad.execute(MEMORY_CARD_ACK_TICKS, &mut self.irq);

        let acked = self.irq.is_pending(Irq::Pad);
        if acked {
            self.irq.clear(Irq::Pad);
            let ctrl = self.ctrl_bits() | u32::from(JoyCtrl::ACK.bits());
            self.pad.write_register(JOY_CTRL, ctrl);
        }
        (data, acked)
    }

    /// Select `port`, exchange every byte, deselect
    pub fn packet(&mut self, port: usize, bytes: &[u8]) -> Vec<(u8, bool)> {
        self.select(port);
        let replies = bytes.iter().map(|&b| self.exchange(b)).collect();
        self.deselect();
        replies
    }

    pub fn data(replies: &[(u8, bool)]) -> Vec<u8> {
        replies.iter().map(|r| r.0).collect()
    }
}
