//! Multitap: four controllers and four memory cards on one port.
//!
//! The first byte of a packet picks the sub-device: `0x01..=0x04` address
//! controllers A-D, `0x81..=0x84` memory cards A-D. The tap then relays the
//! rest of the packet to that device.
//!
//! Sending `0x01` as the third byte of a controller read arms "read all":
//! the next controller packet is answered by the tap itself with `0x80 0x5A`
//! followed by eight bytes from each of the four sub-pads.

use crate::controller::{Controller, CONTROLLER_READ, CONTROLLER_SELECT};
use crate::memory_card::{MemoryCard, MEMORY_CARD_SELECT};
use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::state::StateWrapper;
use serde::{Deserialize, Serialize};

pub const NUM_SUB_SLOTS: usize = 4;

const BYTES_PER_PAD: usize = 8;
const TRANSFER_ALL_LEN: usize = NUM_SUB_SLOTS * BYTES_PER_PAD;
const TRANSFER_ALL_ID: u16 = 0x5A80;

/// Third packet byte that arms "read all"
const TRANSFER_ALL_ENABLE: u8 = 0x01;

/// Device slot index for sub-slot `sub_slot` (A-D) on physical `port`.
///
/// Sub-slot A is the port's own slot; B-D use the extra slots 2-4 for
/// port 0 and 5-7 for port 1.
pub fn slot_index(port: usize, sub_slot: usize) -> usize {
    if sub_slot == 0 {
        port
    } else {
        2 + port * (NUM_SUB_SLOTS - 1) + (sub_slot - 1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum TransferState {
    Idle,
    SingleController,
    MemoryCard,
    AllControllersCommand,
    AllControllersId,
    AllControllersData,
}

#[derive(Debug, Clone)]
pub struct Multitap {
    port: usize,
    enabled: bool,
    transfer_state: TransferState,
    selected_sub_slot: u8,
    /// Bytes relayed to the selected controller after its select byte
    controller_step: u8,
    /// Command byte of the relayed controller packet
    command: u8,
    transfer_all_controllers: bool,
    transfer_buffer: [u8; TRANSFER_ALL_LEN],
    buffer_index: u8,
}

impl Multitap {
    pub fn new(port: usize) -> Self {
        Self {
            port,
            enabled: false,
            transfer_state: TransferState::Idle,
            selected_sub_slot: 0,
            controller_step: 0,
            command: 0,
            transfer_all_controllers: false,
            transfer_buffer: [0xFF; TRANSFER_ALL_LEN],
            buffer_index: 0,
        }
    }

    pub fn port(&self) -> usize {
        self.port
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.enabled != enabled {
            log(LogCategory::Devices, LogLevel::Info, || {
                format!(
                    "Multitap on port {} {}",
                    self.port + 1,
                    if enabled { "enabled" } else { "disabled" }
                )
            });
        }
        self.enabled = enabled;
        self.reset();
    }

    pub fn reset(&mut self) {
        self.transfer_all_controllers = false;
        self.reset_transfer_state();
    }

    pub fn reset_transfer_state(&mut self) {
        self.transfer_state = TransferState::Idle;
        self.selected_sub_slot = 0;
        self.controller_step = 0;
        self.command = 0;
        self.buffer_index = 0;
    }

    /// True while a memory card packet is being relayed
    pub fn is_reading_memory_card(&self) -> bool {
        self.transfer_state == TransferState::MemoryCard
    }

    fn selected_slot(&self) -> usize {
        slot_index(self.port, usize::from(self.selected_sub_slot))
    }

    /// Exchange one byte, relaying to the addressed sub-device.
    pub fn transfer(
        &mut self,
        data_in: u8,
        controllers: &mut [Option<Controller>],
        memory_cards: &mut [Option<MemoryCard>],
    ) -> (u8, bool) {
        let state = self.transfer_state;
        let (data_out, ack) = match state {
            TransferState::Idle => match data_in {
                0x01..=0x04 => {
                    self.selected_sub_slot = data_in - CONTROLLER_SELECT;
                    if self.transfer_all_controllers && data_in == CONTROLLER_SELECT {
                        self.transfer_state = TransferState::AllControllersCommand;
                        (0xFF, true)
                    } else {
                        let slot = self.selected_slot();
                        let result = relay_controller(controllers, slot, CONTROLLER_SELECT);
                        if result.1 {
                            self.transfer_state = TransferState::SingleController;
                            self.controller_step = 0;
                        }
                        result
                    }
                }
                0x81..=0x84 => {
                    self.selected_sub_slot = data_in - MEMORY_CARD_SELECT;
                    let slot = self.selected_slot();
                    let result = relay_memory_card(memory_cards, slot, MEMORY_CARD_SELECT);
                    if result.1 {
                        self.transfer_state = TransferState::MemoryCard;
                    }
                    result
                }
                _ => (0xFF, false),
            },

            TransferState::SingleController => {
                self.controller_step = self.controller_step.saturating_add(1);
                match self.controller_step {
                    1 => self.command = data_in,
                    2 if self.command == CONTROLLER_READ => {
                        self.transfer_all_controllers = data_in == TRANSFER_ALL_ENABLE;
                    }
                    _ => {}
                }
                relay_controller(controllers, self.selected_slot(), data_in)
            }

            TransferState::MemoryCard => {
                relay_memory_card(memory_cards, self.selected_slot(), data_in)
            }

            TransferState::AllControllersCommand => {
                if data_in == CONTROLLER_READ {
                    self.transfer_state = TransferState::AllControllersId;
                    (TRANSFER_ALL_ID as u8, true)
                } else {
                    (0xFF, false)
                }
            }

            TransferState::AllControllersId => {
                self.transfer_all_controllers = data_in == TRANSFER_ALL_ENABLE;
                self.gather_controllers(controllers);
                self.buffer_index = 0;
                self.transfer_state = TransferState::AllControllersData;
                ((TRANSFER_ALL_ID >> 8) as u8, true)
            }

            TransferState::AllControllersData => {
                let index = usize::from(self.buffer_index);
                let value = self.transfer_buffer.get(index).copied().unwrap_or(0xFF);
                self.buffer_index = self.buffer_index.saturating_add(1);
                (value, usize::from(self.buffer_index) < TRANSFER_ALL_LEN)
            }
        };

        log(LogCategory::Devices, LogLevel::Trace, || {
            format!(
                "Multitap {} {:?} (sub-slot {}): 0x{:02X} -> 0x{:02X}{}",
                self.port + 1,
                state,
                self.selected_sub_slot,
                data_in,
                data_out,
                if ack { "" } else { " (end)" }
            )
        });

        if !ack {
            self.reset_transfer_state();
        }
        (data_out, ack)
    }

    /// Run a full read packet against each sub-pad
    fn gather_controllers(&mut self, controllers: &mut [Option<Controller>]) {
        self.transfer_buffer = [0xFF; TRANSFER_ALL_LEN];

        for sub_slot in 0..NUM_SUB_SLOTS {
            let slot = slot_index(self.port, sub_slot);
            let Some(controller) = controllers.get_mut(slot).and_then(Option::as_mut) else {
                continue;
            };

            controller.reset_transfer_state();
            if controller.transfer(CONTROLLER_SELECT).1 {
                let chunk = &mut self.transfer_buffer
                    [sub_slot * BYTES_PER_PAD..(sub_slot + 1) * BYTES_PER_PAD];
                for (i, byte) in chunk.iter_mut().enumerate() {
                    let command = if i == 0 { CONTROLLER_READ } else { 0x00 };
                    let (data_out, ack) = controller.transfer(command);
                    *byte = data_out;
                    if !ack {
                        break;
                    }
                }
            }
            controller.reset_transfer_state();
        }
    }

    pub fn do_state(&mut self, sw: &mut StateWrapper) -> bool {
        sw.do_value(&mut self.transfer_state);
        sw.do_value(&mut self.selected_sub_slot);
        sw.do_value(&mut self.controller_step);
        sw.do_value(&mut self.command);
        sw.do_value(&mut self.transfer_all_controllers);
        sw.do_value(&mut self.transfer_buffer);
        sw.do_value(&mut self.buffer_index);

        if sw.is_reading() && usize::from(self.selected_sub_slot) >= NUM_SUB_SLOTS {
            self.selected_sub_slot = 0;
        }
        !sw.has_error()
    }
}

fn relay_controller(controllers: &mut [Option<Controller>], slot: usize, data_in: u8) -> (u8, bool) {
    controllers
        .get_mut(slot)
        .and_then(Option::as_mut)
        .map_or((0xFF, false), |c| c.transfer(data_in))
}

fn relay_memory_card(memory_cards: &mut [Option<MemoryCard>], slot: usize, data_in: u8) -> (u8, bool) {
    memory_cards
        .get_mut(slot)
        .and_then(Option::as_mut)
        .map_or((0xFF, false), |m| m.transfer(data_in))
}
