//! Serial bus controller for controllers and memory cards (SIO0).
//!
//! # Registers
//!
//! | Offset | Name      | Access | Notes                                        |
//! |--------|-----------|--------|----------------------------------------------|
//! | 0x00   | JOY_DATA  | R/W    | write: TX byte; read: RX byte (0xFF if empty) |
//! | 0x04   | JOY_STAT  | R      | reading clears ACKINPUT                      |
//! | 0x08   | JOY_MODE  | R/W    |                                              |
//! | 0x0A   | JOY_CTRL  | R/W    | TXEN, SELECT, ACK, RESET, IRQ enables, SLOT  |
//! | 0x0E   | JOY_BAUD  | R/W    | one byte takes `JOY_BAUD * 8` ticks          |
//!
//! # Transfer timing
//!
//! ```text
//! write JOY_DATA ──► Transmitting ──(baud*8)──► byte exchanged with device
//!                                                 │
//!                        no ack ◄─────────────────┤
//!                        (Idle, device released)  │ ack
//!                                                 ▼
//!                                  WaitingForAck ──(ack delay)──► ACKINPUT,
//!                                                                  IRQ7 if enabled,
//!                                                                  next byte if queued
//! ```
//!
//! The received byte is visible before the acknowledge arrives. Firmware
//! relies on that gap to tell whether a device answered, so the acknowledge
//! delay is emulated rather than folded into the transfer.

use crate::config::PadConfig;
use crate::controller::{Controller, ControllerType};
use crate::display::PointerSource;
use crate::error::PadError;
use crate::interrupt::{InterruptSink, Irq};
use crate::memory_card::MemoryCard;
use crate::multitap::Multitap;
use bitflags::bitflags;
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::settings::SettingsSource;
use emu_core::state::StateWrapper;
use emu_core::timing::{TickCount, TimingEvent};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::rc::Rc;

/// Controller and memory card slots: two ports plus three extra per multitap
pub const NUM_CONTROLLER_AND_CARD_PORTS: usize = 8;
/// Physical ports
pub const NUM_PORTS: usize = 2;
pub const NUM_MULTITAPS: usize = 2;

pub const JOY_DATA: u32 = 0x00;
pub const JOY_STAT: u32 = 0x04;
pub const JOY_MODE: u32 = 0x08;
pub const JOY_CTRL: u32 = 0x0A;
pub const JOY_BAUD: u32 = 0x0E;

/// Save state format of the pad block
pub const STATE_VERSION: u32 = 3;
pub const MIN_STATE_VERSION: u32 = 1;
/// First version with ports 3-8 and multitaps
const VERSION_ALL_PORTS: u32 = 2;
/// First version with the active device, transmit value and event state
const VERSION_TRANSFER_STATE: u32 = 3;

/// Delay from the end of a byte to the controller's /ACK pulse
pub const CONTROLLER_ACK_TICKS: TickCount = 170;
/// Memory cards take longer to acknowledge
pub const MEMORY_CARD_ACK_TICKS: TickCount = 450;

bitflags! {
    /// JOY_CTRL
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct JoyCtrl: u16 {
        const TXEN = 1 << 0;
        const SELECT = 1 << 1;
        const RXEN = 1 << 2;
        const ACK = 1 << 4;
        const RESET = 1 << 6;
        const RXIMODE = 0b11 << 8;
        const TXINTEN = 1 << 10;
        const RXINTEN = 1 << 11;
        const ACKINTEN = 1 << 12;
        const SLOT = 1 << 13;
    }
}

bitflags! {
    /// JOY_STAT
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct JoyStat: u32 {
        const TXRDY = 1 << 0;
        const RXFIFONEMPTY = 1 << 1;
        const TXDONE = 1 << 2;
        const ACKINPUT = 1 << 7;
        const INTR = 1 << 9;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BusState {
    #[default]
    Idle,
    Transmitting,
    WaitingForAck,
}

/// Device that claimed the current packet by acknowledging its first byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ActiveDevice {
    #[default]
    None,
    Controller,
    MemoryCard,
    Multitap,
}

pub struct Pad {
    transfer_event: TimingEvent,

    controllers: [Option<Controller>; NUM_CONTROLLER_AND_CARD_PORTS],
    memory_cards: [Option<MemoryCard>; NUM_CONTROLLER_AND_CARD_PORTS],
    multitaps: [Multitap; NUM_MULTITAPS],

    state: BusState,
    active_device: ActiveDevice,

    joy_ctrl: JoyCtrl,
    joy_stat: JoyStat,
    joy_mode: u16,
    joy_baud: u16,

    receive_buffer: u8,
    transmit_buffer: u8,
    /// Byte being shifted out by the transfer in flight
    transmit_value: u8,
    receive_buffer_full: bool,
    transmit_buffer_full: bool,

    load_input_from_save_states: bool,
    pointer_source: Option<Rc<dyn PointerSource>>,
}

impl Default for Pad {
    fn default() -> Self {
        Self::new()
    }
}

impl Pad {
    /// Empty bus: nothing plugged in, no multitaps
    pub fn new() -> Self {
        let mut pad = Self {
            transfer_event: TimingEvent::new("Pad Serial Transfer", 1, 1),
            controllers: Default::default(),
            memory_cards: Default::default(),
            multitaps: [Multitap::new(0), Multitap::new(1)],
            state: BusState::Idle,
            active_device: ActiveDevice::None,
            joy_ctrl: JoyCtrl::empty(),
            joy_stat: JoyStat::empty(),
            joy_mode: 0,
            joy_baud: 0,
            receive_buffer: 0,
            transmit_buffer: 0,
            transmit_value: 0,
            receive_buffer_full: false,
            transmit_buffer_full: false,
            load_input_from_save_states: false,
            pointer_source: None,
        };
        pad.soft_reset();
        pad
    }

    /// Power-on reset of the bus and everything plugged into it
    pub fn reset(&mut self) {
        self.soft_reset();

        for controller in self.controllers.iter_mut().flatten() {
            controller.reset();
        }
        for card in self.memory_cards.iter_mut().flatten() {
            card.reset();
        }
        for multitap in &mut self.multitaps {
            multitap.reset();
        }
    }

    /// JOY_CTRL.RESET: registers and buffers cleared, devices released.
    /// The baud rate is kept.
    pub fn soft_reset(&mut self) {
        if self.is_transmitting() {
            self.end_transfer();
        }

        self.joy_ctrl = JoyCtrl::empty();
        self.joy_stat = JoyStat::empty();
        self.joy_mode = 0;
        self.receive_buffer = 0;
        self.receive_buffer_full = false;
        self.transmit_buffer = 0;
        self.transmit_buffer_full = false;
        self.reset_device_transfer_state();
        self.update_joy_stat();
    }

    // Slots

    fn check_slot(slot: usize) -> Result<(), PadError> {
        if slot < NUM_CONTROLLER_AND_CARD_PORTS {
            Ok(())
        } else {
            Err(PadError::InvalidSlot(slot))
        }
    }

    pub fn controller(&self, slot: usize) -> Option<&Controller> {
        self.controllers.get(slot).and_then(Option::as_ref)
    }

    pub fn controller_mut(&mut self, slot: usize) -> Option<&mut Controller> {
        self.controllers.get_mut(slot).and_then(Option::as_mut)
    }

    /// Plug in (or unplug, with None) a controller. Returns the previous one.
    pub fn set_controller(
        &mut self,
        slot: usize,
        controller: Option<Controller>,
    ) -> Result<Option<Controller>, PadError> {
        Self::check_slot(slot)?;
        let mut controller = controller;
        if let Some(c) = controller.as_mut() {
            c.set_pointer_source(self.pointer_source.clone());
        }
        log(LogCategory::Devices, LogLevel::Info, || {
            format!(
                "Slot {}: controller {}",
                slot + 1,
                controller
                    .as_ref()
                    .map_or(ControllerType::None, Controller::controller_type)
                    .display_name()
            )
        });
        Ok(std::mem::replace(&mut self.controllers[slot], controller))
    }

    pub fn controller_type(&self, slot: usize) -> ControllerType {
        self.controller(slot)
            .map_or(ControllerType::None, Controller::controller_type)
    }

    pub fn memory_card(&self, slot: usize) -> Option<&MemoryCard> {
        self.memory_cards.get(slot).and_then(Option::as_ref)
    }

    pub fn memory_card_mut(&mut self, slot: usize) -> Option<&mut MemoryCard> {
        self.memory_cards.get_mut(slot).and_then(Option::as_mut)
    }

    /// Insert (or eject, with None) a memory card. Returns the previous one.
    pub fn set_memory_card(
        &mut self,
        slot: usize,
        card: Option<MemoryCard>,
    ) -> Result<Option<MemoryCard>, PadError> {
        Self::check_slot(slot)?;
        log(LogCategory::Devices, LogLevel::Info, || {
            format!(
                "Slot {}: memory card {}",
                slot + 1,
                if card.is_some() { "inserted" } else { "removed" }
            )
        });
        Ok(std::mem::replace(&mut self.memory_cards[slot], card))
    }

    /// Eject a memory card. The card is reset so it can be reinserted cleanly.
    pub fn remove_memory_card(&mut self, slot: usize) -> Result<Option<MemoryCard>, PadError> {
        let mut card = self.set_memory_card(slot, None)?;
        if let Some(card) = card.as_mut() {
            card.reset();
        }
        Ok(card)
    }

    pub fn multitap(&self, port: usize) -> Result<&Multitap, PadError> {
        self.multitaps.get(port).ok_or(PadError::InvalidPort(port))
    }

    pub fn set_multitap_enabled(&mut self, port: usize, enabled: bool) -> Result<(), PadError> {
        let multitap = self
            .multitaps
            .get_mut(port)
            .ok_or(PadError::InvalidPort(port))?;
        if multitap.is_enabled() != enabled {
            multitap.set_enabled(enabled);
        }
        Ok(())
    }

    /// Host pointer for light guns, current and future
    pub fn set_pointer_source(&mut self, source: Option<Rc<dyn PointerSource>>) {
        for controller in self.controllers.iter_mut().flatten() {
            controller.set_pointer_source(source.clone());
        }
        self.pointer_source = source;
    }

    pub fn set_load_input_from_save_states(&mut self, enabled: bool) {
        self.load_input_from_save_states = enabled;
    }

    /// Bring the attached devices in line with `config`.
    ///
    /// Only slots whose device type changed are replugged, so a controller
    /// that stays put keeps its input and protocol state. Per-device
    /// settings are reloaded from sections `Controller1`..`Controller8`.
    pub fn apply_config(&mut self, config: &PadConfig, settings: &dyn SettingsSource) {
        for slot in 0..NUM_CONTROLLER_AND_CARD_PORTS {
            let wanted = config.controller_types[slot];
            if self.controller_type(slot) != wanted {
                let mut controller = Controller::create(wanted);
                if let Some(c) = controller.as_mut() {
                    c.set_pointer_source(self.pointer_source.clone());
                }
                log(LogCategory::Devices, LogLevel::Info, || {
                    format!("Slot {}: now {}", slot + 1, wanted.display_name())
                });
                self.controllers[slot] = controller;
            }
            if let Some(controller) = self.controllers[slot].as_mut() {
                controller.load_settings(settings, &format!("Controller{}", slot + 1));
            }

            match (config.memory_cards[slot], self.memory_cards[slot].is_some()) {
                (true, false) => {
                    log(LogCategory::Devices, LogLevel::Info, || {
                        format!("Slot {}: inserting new memory card", slot + 1)
                    });
                    self.memory_cards[slot] = Some(MemoryCard::new());
                }
                (false, true) => {
                    log(LogCategory::Devices, LogLevel::Info, || {
                        format!("Slot {}: removing memory card", slot + 1)
                    });
                    self.memory_cards[slot] = None;
                }
                _ => {}
            }
        }

        for (port, multitap) in self.multitaps.iter_mut().enumerate() {
            let enabled = config.multitap_mode.is_enabled(port);
            if multitap.is_enabled() != enabled {
                multitap.set_enabled(enabled);
            }
        }

        self.load_input_from_save_states = config.load_input_from_save_states;
    }

    // Status

    pub fn bus_state(&self) -> BusState {
        self.state
    }

    pub fn active_device(&self) -> ActiveDevice {
        self.active_device
    }

    pub fn is_transmitting(&self) -> bool {
        self.state != BusState::Idle
    }

    pub fn joy_ctrl(&self) -> JoyCtrl {
        self.joy_ctrl
    }

    /// JOY_STAT without the read side effects
    pub fn joy_stat(&self) -> JoyStat {
        self.joy_stat
    }

    /// Ticks until the pending transfer or acknowledge completes
    pub fn ticks_until_event(&self) -> Option<TickCount> {
        self.transfer_event
            .is_active()
            .then(|| self.transfer_event.ticks_until_due())
    }

    // Time

    /// Advance `ticks`, running each transfer step at its due point.
    pub fn execute<I: InterruptSink + ?Sized>(&mut self, ticks: TickCount, irq: &mut I) {
        let mut remaining = ticks.max(0);
        loop {
            if self.transfer_event.take_due().is_some() {
                self.on_transfer_event(irq);
                continue;
            }
            if remaining == 0 || !self.transfer_event.is_active() {
                break;
            }
            let step = remaining.min(self.transfer_event.ticks_until_due());
            self.transfer_event.add_ticks(step);
            remaining -= step;
        }
    }

    /// Let time pass without dispatching, as a CPU slice in progress does.
    /// Register reads catch up on an overdue transfer.
    pub fn add_pending_ticks(&mut self, ticks: TickCount) {
        self.transfer_event.add_ticks(ticks.max(0));
    }

    /// Dispatch whatever is due
    pub fn run_events<I: InterruptSink + ?Sized>(&mut self, irq: &mut I) {
        while self.transfer_event.take_due().is_some() {
            self.on_transfer_event(irq);
        }
    }

    fn on_transfer_event<I: InterruptSink + ?Sized>(&mut self, irq: &mut I) {
        match self.state {
            BusState::Transmitting => self.do_transfer(),
            BusState::WaitingForAck => self.do_ack(irq),
            BusState::Idle => self.transfer_event.deactivate(),
        }
    }

    // Registers

    pub fn read_register<I: InterruptSink + ?Sized>(&mut self, offset: u32, irq: &mut I) -> u32 {
        match offset {
            JOY_DATA => {
                self.catch_up(irq);
                let value = if self.receive_buffer_full {
                    self.receive_buffer
                } else {
                    0xFF
                };
                self.receive_buffer_full = false;
                self.update_joy_stat();
                log(LogCategory::Bus, LogLevel::Trace, || {
                    format!("JOY_DATA read 0x{:02X}", value)
                });
                u32::from(value) * 0x0101_0101
            }
            JOY_STAT => {
                self.catch_up(irq);
                let bits = self.joy_stat.bits();
                self.joy_stat.remove(JoyStat::ACKINPUT);
                bits
            }
            JOY_MODE => u32::from(self.joy_mode),
            JOY_CTRL => u32::from(self.joy_ctrl.bits()),
            JOY_BAUD => u32::from(self.joy_baud),
            _ => {
                log(LogCategory::Stubs, LogLevel::Debug, || {
                    format!("Unknown pad register read 0x{:02X}", offset)
                });
                0xFFFF_FFFF
            }
        }
    }

    pub fn write_register(&mut self, offset: u32, value: u32) {
        match offset {
            JOY_DATA => {
                log(LogCategory::Bus, LogLevel::Trace, || {
                    format!("JOY_DATA write 0x{:02X}", value as u8)
                });
                if self.transmit_buffer_full {
                    log(LogCategory::Bus, LogLevel::Debug, || {
                        "TX buffer overrun".to_string()
                    });
                }
                self.transmit_buffer = value as u8;
                self.transmit_buffer_full = true;

                if !self.is_transmitting() && self.can_transfer() {
                    self.begin_transfer();
                }
                self.update_joy_stat();
            }
            JOY_CTRL => self.write_ctrl(value as u16),
            JOY_MODE => {
                log(LogCategory::Bus, LogLevel::Debug, || {
                    format!("JOY_MODE <- 0x{:04X}", value as u16)
                });
                self.joy_mode = value as u16;
            }
            JOY_BAUD => {
                log(LogCategory::Bus, LogLevel::Debug, || {
                    format!("JOY_BAUD <- 0x{:04X}", value as u16)
                });
                self.joy_baud = value as u16;
            }
            _ => {
                log(LogCategory::Stubs, LogLevel::Debug, || {
                    format!(
                        "Unknown pad register write 0x{:02X} <- 0x{:08X}",
                        offset, value
                    )
                });
            }
        }
    }

    fn write_ctrl(&mut self, value: u16) {
        log(LogCategory::Bus, LogLevel::Trace, || {
            format!("JOY_CTRL <- 0x{:04X}", value)
        });

        self.joy_ctrl = JoyCtrl::from_bits_retain(value);
        if self.joy_ctrl.contains(JoyCtrl::RESET) {
            self.soft_reset();
        }

        if self.joy_ctrl.contains(JoyCtrl::ACK) {
            self.joy_stat.remove(JoyStat::INTR);
        }

        let selected = self.joy_ctrl.contains(JoyCtrl::SELECT);
        if !selected {
            self.reset_device_transfer_state();
        }

        if !selected || !self.joy_ctrl.contains(JoyCtrl::TXEN) {
            if self.is_transmitting() {
                self.end_transfer();
            }
        } else if !self.is_transmitting() && self.can_transfer() {
            self.begin_transfer();
        }

        self.update_joy_stat();
    }

    // Transfers

    fn selected_port(&self) -> usize {
        usize::from(self.joy_ctrl.contains(JoyCtrl::SLOT))
    }

    fn can_transfer(&self) -> bool {
        self.transmit_buffer_full
            && self.joy_ctrl.contains(JoyCtrl::SELECT)
            && self.joy_ctrl.contains(JoyCtrl::TXEN)
    }

    fn transfer_ticks(&self) -> TickCount {
        TickCount::from(self.joy_baud) * 8
    }

    /// Run an overdue transfer step before a register is observed
    fn catch_up<I: InterruptSink + ?Sized>(&mut self, irq: &mut I) {
        if self.is_transmitting() && self.transfer_event.invoke_early().is_some() {
            self.on_transfer_event(irq);
        }
    }

    fn begin_transfer(&mut self) {
        self.joy_ctrl.insert(JoyCtrl::RXEN);
        self.transmit_value = self.transmit_buffer;
        self.transmit_buffer_full = false;
        self.state = BusState::Transmitting;
        let ticks = self.transfer_ticks();
        log(LogCategory::Bus, LogLevel::Trace, || {
            format!(
                "Begin transfer of 0x{:02X}, {} ticks",
                self.transmit_value, ticks
            )
        });
        self.transfer_event.schedule(ticks);
    }

    fn end_transfer(&mut self) {
        self.state = BusState::Idle;
        self.transfer_event.deactivate();
    }

    fn reset_device_transfer_state(&mut self) {
        for controller in self.controllers.iter_mut().flatten() {
            controller.reset_transfer_state();
        }
        for card in self.memory_cards.iter_mut().flatten() {
            card.reset_transfer_state();
        }
        for multitap in &mut self.multitaps {
            multitap.reset_transfer_state();
        }
        self.active_device = ActiveDevice::None;
    }

    /// Exchange the byte in flight with whichever device owns the packet
    fn do_transfer(&mut self) {
        let port = self.selected_port();
        let data_out = self.transmit_value;

        let (data_in, ack) = match self.active_device {
            ActiveDevice::None => self.claim_packet(port, data_out),
            ActiveDevice::Controller => self.controllers[port]
                .as_mut()
                .map_or((0xFF, false), |c| c.transfer(data_out)),
            ActiveDevice::MemoryCard => self.memory_cards[port]
                .as_mut()
                .map_or((0xFF, false), |m| m.transfer(data_out)),
            ActiveDevice::Multitap if self.multitaps[port].is_enabled() => self.multitaps[port]
                .transfer(data_out, &mut self.controllers, &mut self.memory_cards),
            // Unplugged mid-packet
            ActiveDevice::Multitap => (0xFF, false),
        };

        self.receive_buffer = data_in;
        self.receive_buffer_full = true;

        log(LogCategory::Bus, LogLevel::Trace, || {
            format!(
                "Transfer port {} ({:?}): 0x{:02X} -> 0x{:02X}{}",
                port + 1,
                self.active_device,
                data_out,
                data_in,
                if ack { " ACK" } else { "" }
            )
        });

        if ack {
            let memory_card_transfer = self.active_device == ActiveDevice::MemoryCard
                || (self.active_device == ActiveDevice::Multitap
                    && self.multitaps[port].is_reading_memory_card());
            let ack_ticks = if memory_card_transfer {
                MEMORY_CARD_ACK_TICKS
            } else {
                CONTROLLER_ACK_TICKS
            };
            self.state = BusState::WaitingForAck;
            self.transfer_event.schedule(ack_ticks);
        } else {
            self.active_device = ActiveDevice::None;
            self.end_transfer();
        }

        self.update_joy_stat();
    }

    /// Offer the first byte of a packet to the devices on `port`
    fn claim_packet(&mut self, port: usize, data_out: u8) -> (u8, bool) {
        if self.multitaps[port].is_enabled() {
            let result = self.multitaps[port].transfer(
                data_out,
                &mut self.controllers,
                &mut self.memory_cards,
            );
            if result.1 {
                self.active_device = ActiveDevice::Multitap;
            }
            return result;
        }

        let mut result = (0xFF, false);
        if let Some(controller) = self.controllers[port].as_mut() {
            result = controller.transfer(data_out);
            if result.1 {
                self.active_device = ActiveDevice::Controller;
                return result;
            }
        }
        if let Some(card) = self.memory_cards[port].as_mut() {
            result = card.transfer(data_out);
            if result.1 {
                self.active_device = ActiveDevice::MemoryCard;
            }
        }
        result
    }

    fn do_ack<I: InterruptSink + ?Sized>(&mut self, irq: &mut I) {
        self.joy_stat.insert(JoyStat::ACKINPUT);

        if self.joy_ctrl.contains(JoyCtrl::ACKINTEN) {
            log(LogCategory::Interrupts, LogLevel::Trace, || {
                "Pad ACK interrupt".to_string()
            });
            self.joy_stat.insert(JoyStat::INTR);
            irq.raise(Irq::Pad);
        }

        self.end_transfer();
        self.update_joy_stat();

        if self.can_transfer() {
            self.begin_transfer();
        }
    }

    fn update_joy_stat(&mut self) {
        self.joy_stat
            .set(JoyStat::RXFIFONEMPTY, self.receive_buffer_full);
        self.joy_stat.set(
            JoyStat::TXDONE,
            !self.transmit_buffer_full && self.state != BusState::Transmitting,
        );
        self.joy_stat
            .set(JoyStat::TXRDY, !self.transmit_buffer_full);
    }

    // Save states

    pub fn save_state(&mut self) -> Result<Value, PadError> {
        let mut sw = StateWrapper::writer(STATE_VERSION);
        self.do_state(&mut sw);
        Ok(sw.finish()?)
    }

    /// Restore from a document written by [`Pad::save_state`] (any supported
    /// version). Stops at the first stream error.
    pub fn load_state(&mut self, document: &Value) -> Result<(), PadError> {
        let mut sw = StateWrapper::reader(document)?;
        self.do_state(&mut sw);
        sw.status().map_err(|e| {
            log(LogCategory::SaveState, LogLevel::Error, || {
                format!("Failed to restore pad state: {}", e)
            });
            // Partially restored registers; leave the bus idle and usable
            self.soft_reset();
            PadError::from(e)
        })
    }

    /// Serialize into, or restore from, a shared state stream
    pub fn do_state(&mut self, sw: &mut StateWrapper) -> bool {
        if sw.is_reading() && !sw.require_version(MIN_STATE_VERSION, STATE_VERSION) {
            return false;
        }

        for slot in 0..NUM_CONTROLLER_AND_CARD_PORTS {
            if sw.version() < VERSION_ALL_PORTS && slot >= NUM_PORTS {
                // Not in the stream: reset rather than keep stale state
                if let Some(controller) = self.controllers[slot].as_mut() {
                    controller.reset();
                }
                self.memory_cards[slot] = None;
                continue;
            }

            if !self.do_state_controller(sw, slot) || !self.do_state_memory_card(sw, slot) {
                return false;
            }
        }

        if sw.version() >= VERSION_ALL_PORTS {
            for multitap in &mut self.multitaps {
                if !multitap.do_state(sw) {
                    return false;
                }
            }
        } else if sw.is_reading() {
            for multitap in &mut self.multitaps {
                multitap.reset();
            }
        }

        sw.do_value(&mut self.state);
        let mut ctrl = self.joy_ctrl.bits();
        sw.do_value(&mut ctrl);
        let mut stat = self.joy_stat.bits();
        sw.do_value(&mut stat);
        sw.do_value(&mut self.joy_mode);
        sw.do_value(&mut self.joy_baud);
        sw.do_value(&mut self.receive_buffer);
        sw.do_value(&mut self.transmit_buffer);
        sw.do_value(&mut self.receive_buffer_full);
        sw.do_value(&mut self.transmit_buffer_full);

        if sw.version() >= VERSION_TRANSFER_STATE {
            sw.do_value(&mut self.active_device);
            sw.do_value(&mut self.transmit_value);
            let mut event = self.transfer_event.save_state();
            sw.do_value(&mut event);
            if sw.is_reading() && !sw.has_error() {
                self.transfer_event.load_state(&event);
            }
        } else if sw.is_reading() {
            self.active_device = ActiveDevice::None;
            self.transmit_value = self.transmit_buffer;
            match self.state {
                BusState::Idle => self.transfer_event.deactivate(),
                BusState::Transmitting => self.transfer_event.schedule(self.transfer_ticks()),
                BusState::WaitingForAck => self.transfer_event.schedule(CONTROLLER_ACK_TICKS),
            }
        }

        if sw.has_error() {
            return false;
        }

        if sw.is_reading() {
            self.joy_ctrl = JoyCtrl::from_bits_retain(ctrl);
            self.joy_stat = JoyStat::from_bits_retain(stat);
            if self.state != BusState::Idle && !self.transfer_event.is_active() {
                self.transfer_event.activate();
            }
        }
        true
    }

    fn do_state_controller(&mut self, sw: &mut StateWrapper, slot: usize) -> bool {
        let controller_type = self.controller_type(slot);
        let mut state_type = controller_type;
        sw.do_value(&mut state_type);
        if sw.has_error() {
            return false;
        }

        if controller_type != state_type {
            log(LogCategory::SaveState, LogLevel::Warn, || {
                format!(
                    "Save state has {} in slot {} but {} is connected; resetting it",
                    state_type.display_name(),
                    slot + 1,
                    controller_type.display_name()
                )
            });
            if let Some(controller) = self.controllers[slot].as_mut() {
                controller.reset();
            }
        }

        if state_type == ControllerType::None {
            return true;
        }
        if !sw.do_marker("Controller") {
            return false;
        }

        let apply_input_state = self.load_input_from_save_states;
        match self.controllers[slot].as_mut() {
            Some(controller) if controller.controller_type() == state_type => {
                controller.do_state(sw, apply_input_state)
            }
            // Consume the saved device through a throwaway instance
            _ => Controller::create(state_type)
                .map_or(true, |mut dummy| dummy.do_state(sw, false)),
        }
    }

    fn do_state_memory_card(&mut self, sw: &mut StateWrapper, slot: usize) -> bool {
        let mut present = self.memory_cards[slot].is_some();
        sw.do_value(&mut present);
        if sw.has_error() {
            return false;
        }

        if sw.is_writing() {
            return match self.memory_cards[slot].as_mut() {
                Some(card) => sw.do_marker("MemoryCard") && card.do_state(sw),
                None => true,
            };
        }

        if !present {
            if self.memory_cards[slot].take().is_some() {
                log(LogCategory::SaveState, LogLevel::Warn, || {
                    format!("No memory card in slot {} in save state; removing", slot + 1)
                });
            }
            return true;
        }

        if !sw.do_marker("MemoryCard") {
            return false;
        }
        let mut card_from_state = MemoryCard::new();
        if !card_from_state.do_state(sw) {
            return false;
        }

        let adopt = self.memory_cards[slot]
            .as_ref()
            .map_or(true, |live| live.data() == card_from_state.data());
        if adopt {
            if self.memory_cards[slot].is_none() {
                log(LogCategory::SaveState, LogLevel::Warn, || {
                    format!("Memory card in slot {} only in save state; inserting", slot + 1)
                });
            }
            self.memory_cards[slot] = Some(card_from_state);
        } else if let Some(live) = self.memory_cards[slot].as_mut() {
            log(LogCategory::SaveState, LogLevel::Warn, || {
                format!(
                    "Memory card in slot {} differs from save state; resetting it",
                    slot + 1
                )
            });
            live.reset();
        }
        true
    }
}
