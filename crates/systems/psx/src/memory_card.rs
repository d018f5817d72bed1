//! Memory card: 128 KiB of sector storage behind the pad bus.
//!
//! Packets start with the select byte `0x81` followed by a command:
//!
//! ```text
//! read   81 52 00 00 MSB LSB 00 00 00 00 [128 x 00] 00 00
//!    <-  FF FLAG 5A 5D 00 MSB 5C 5D MSB LSB [data] CHK 47
//! write  81 57 00 00 MSB LSB [128 bytes] CHK 00 00 00
//!    <-  FF FLAG 5A 5D 00 MSB [...] CHK 5C 5D 47
//! get id 81 53 00 00 00 00 00 00 00 00
//!    <-  FF FLAG 5A 5D 5C 5D 04 00 00 80
//! ```
//!
//! The sector address is masked to 10 bits. The checksum is the XOR of the
//! two address bytes and the 128 data bytes. Contents only live in memory.

use emu_core::logging::{log, LogCategory, LogLevel};
use emu_core::state::StateWrapper;
use serde::{Deserialize, Serialize};

/// Select byte that opens a memory card packet
pub const MEMORY_CARD_SELECT: u8 = 0x81;

pub const FRAME_SIZE: usize = 128;
pub const NUM_FRAMES: usize = 1024;
pub const DATA_SIZE: usize = FRAME_SIZE * NUM_FRAMES;

/// Frames per 8 KiB block
const FRAMES_PER_BLOCK: usize = 64;

const ADDRESS_MASK: u16 = (NUM_FRAMES - 1) as u16;

/// FLAG bit set until the first write after power-on/insertion
const FLAG_NO_WRITE_YET: u8 = 0x08;

const COMMAND_READ: u8 = 0x52;
const COMMAND_WRITE: u8 = 0x57;
const COMMAND_GET_ID: u8 = 0x53;

const CARD_ID_1: u8 = 0x5A;
const CARD_ID_2: u8 = 0x5D;
const COMMAND_ACK_1: u8 = 0x5C;
const COMMAND_ACK_2: u8 = 0x5D;
const END_GOOD: u8 = 0x47;

/// Trailer of the get-id reply
const CARD_SIZE_ID: [u8; 4] = [0x04, 0x00, 0x00, 0x80];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum TransferState {
    Idle,
    Command,

    ReadCardId1,
    ReadCardId2,
    ReadAddressMsb,
    ReadAddressLsb,
    ReadAck1,
    ReadAck2,
    ReadConfirmAddressMsb,
    ReadConfirmAddressLsb,
    ReadData,
    ReadChecksum,
    ReadEnd,

    WriteCardId1,
    WriteCardId2,
    WriteAddressMsb,
    WriteAddressLsb,
    WriteData,
    WriteChecksum,
    WriteAck1,
    WriteAck2,
    WriteEnd,

    GetIdCardId1,
    GetIdCardId2,
    GetIdAck1,
    GetIdAck2,
    GetId1,
    GetId2,
    GetId3,
    GetId4,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryCard {
    transfer_state: TransferState,
    flag: u8,
    address: u16,
    sector_offset: u8,
    checksum: u8,
    /// Previous byte received, echoed back in some reply slots
    last_byte: u8,
    /// Written to since the last [`MemoryCard::take_changed`]
    changed: bool,
    data: Vec<u8>,
}

impl Default for MemoryCard {
    fn default() -> Self {
        Self::new()
    }
}

fn frame_checksum(frame: &[u8]) -> u8 {
    frame[..FRAME_SIZE - 1].iter().fold(0, |acc, &b| acc ^ b)
}

impl MemoryCard {
    /// A freshly formatted card
    pub fn new() -> Self {
        let mut card = Self {
            transfer_state: TransferState::Idle,
            flag: FLAG_NO_WRITE_YET,
            address: 0,
            sector_offset: 0,
            checksum: 0,
            last_byte: 0,
            changed: false,
            data: vec![0; DATA_SIZE],
        };
        card.format();
        card
    }

    /// Back to the power-on state: packet abandoned, "no write yet" raised
    pub fn reset(&mut self) {
        self.reset_transfer_state();
        self.flag |= FLAG_NO_WRITE_YET;
    }

    pub fn reset_transfer_state(&mut self) {
        self.transfer_state = TransferState::Idle;
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn flag(&self) -> u8 {
        self.flag
    }

    /// True when the card was written since the last call
    pub fn take_changed(&mut self) -> bool {
        std::mem::take(&mut self.changed)
    }

    /// Write an empty filesystem: header, free directory, empty broken
    /// sector list, and a copy of the header in the write-test frame
    pub fn format(&mut self) {
        self.data.fill(0);

        let header = &mut self.data[..FRAME_SIZE];
        header[0] = b'M';
        header[1] = b'C';
        let checksum = frame_checksum(header);
        header[FRAME_SIZE - 1] = checksum;

        for frame in 1..16 {
            let f = &mut self.data[frame * FRAME_SIZE..(frame + 1) * FRAME_SIZE];
            f[0] = 0xA0;
            f[8] = 0xFF;
            f[9] = 0xFF;
            let checksum = frame_checksum(f);
            f[FRAME_SIZE - 1] = checksum;
        }

        for frame in 16..36 {
            let f = &mut self.data[frame * FRAME_SIZE..(frame + 1) * FRAME_SIZE];
            f[..4].fill(0xFF);
            f[8] = 0xFF;
            f[9] = 0xFF;
            let checksum = frame_checksum(f);
            f[FRAME_SIZE - 1] = checksum;
        }

        // Broken sector replacement data and unused frames
        self.data[36 * FRAME_SIZE..(FRAMES_PER_BLOCK - 1) * FRAME_SIZE].fill(0xFF);

        let write_test = (FRAMES_PER_BLOCK - 1) * FRAME_SIZE;
        self.data.copy_within(..FRAME_SIZE, write_test);

        self.changed = true;
    }

    fn data_index(&self) -> usize {
        usize::from(self.address) * FRAME_SIZE + usize::from(self.sector_offset)
    }

    /// Exchange one byte. Returns the reply and whether the card acknowledges.
    pub fn transfer(&mut self, data_in: u8) -> (u8, bool) {
        use TransferState::*;

        let state = self.transfer_state;
        let (data_out, next) = match state {
            Idle if data_in == MEMORY_CARD_SELECT => (0xFF, Some(Command)),
            Idle => (0xFF, None),

            Command => match data_in {
                COMMAND_READ => (self.flag, Some(ReadCardId1)),
                COMMAND_WRITE => (self.flag, Some(WriteCardId1)),
                COMMAND_GET_ID => (self.flag, Some(GetIdCardId1)),
                _ => {
                    log(LogCategory::Stubs, LogLevel::Debug, || {
                        format!("Memory card: invalid command 0x{:02X}", data_in)
                    });
                    (self.flag, None)
                }
            },

            ReadCardId1 => (CARD_ID_1, Some(ReadCardId2)),
            ReadCardId2 => (CARD_ID_2, Some(ReadAddressMsb)),
            ReadAddressMsb => {
                self.address = u16::from(data_in) << 8;
                (0x00, Some(ReadAddressLsb))
            }
            ReadAddressLsb => {
                self.address = (self.address | u16::from(data_in)) & ADDRESS_MASK;
                (self.last_byte, Some(ReadAck1))
            }
            ReadAck1 => (COMMAND_ACK_1, Some(ReadAck2)),
            ReadAck2 => (COMMAND_ACK_2, Some(ReadConfirmAddressMsb)),
            ReadConfirmAddressMsb => ((self.address >> 8) as u8, Some(ReadConfirmAddressLsb)),
            ReadConfirmAddressLsb => {
                let (msb, lsb) = ((self.address >> 8) as u8, self.address as u8);
                self.checksum = msb ^ lsb;
                self.sector_offset = 0;
                (lsb, Some(ReadData))
            }
            ReadData => {
                let value = self.data.get(self.data_index()).copied().unwrap_or(0xFF);
                self.checksum ^= value;
                self.sector_offset = self.sector_offset.saturating_add(1);
                if usize::from(self.sector_offset) >= FRAME_SIZE {
                    log(LogCategory::Devices, LogLevel::Debug, || {
                        format!("Memory card: read sector {}", self.address)
                    });
                    (value, Some(ReadChecksum))
                } else {
                    (value, Some(ReadData))
                }
            }
            ReadChecksum => (self.checksum, Some(ReadEnd)),
            ReadEnd => (END_GOOD, None),

            WriteCardId1 => (CARD_ID_1, Some(WriteCardId2)),
            WriteCardId2 => (CARD_ID_2, Some(WriteAddressMsb)),
            WriteAddressMsb => {
                self.address = u16::from(data_in) << 8;
                (0x00, Some(WriteAddressLsb))
            }
            WriteAddressLsb => {
                self.address = (self.address | u16::from(data_in)) & ADDRESS_MASK;
                self.checksum = ((self.address >> 8) as u8) ^ (self.address as u8);
                self.sector_offset = 0;
                (self.last_byte, Some(WriteData))
            }
            WriteData => {
                if self.sector_offset == 0 {
                    self.flag &= !FLAG_NO_WRITE_YET;
                }
                let index = self.data_index();
                if let Some(slot) = self.data.get_mut(index) {
                    *slot = data_in;
                }
                self.checksum ^= data_in;
                self.sector_offset = self.sector_offset.saturating_add(1);
                self.changed = true;
                if usize::from(self.sector_offset) >= FRAME_SIZE {
                    log(LogCategory::Devices, LogLevel::Debug, || {
                        format!("Memory card: wrote sector {}", self.address)
                    });
                    (self.last_byte, Some(WriteChecksum))
                } else {
                    (self.last_byte, Some(WriteData))
                }
            }
            WriteChecksum => (self.checksum, Some(WriteAck1)),
            WriteAck1 => (COMMAND_ACK_1, Some(WriteAck2)),
            WriteAck2 => (COMMAND_ACK_2, Some(WriteEnd)),
            WriteEnd => (END_GOOD, None),

            GetIdCardId1 => (CARD_ID_1, Some(GetIdCardId2)),
            GetIdCardId2 => (CARD_ID_2, Some(GetIdAck1)),
            GetIdAck1 => (COMMAND_ACK_1, Some(GetIdAck2)),
            GetIdAck2 => (COMMAND_ACK_2, Some(GetId1)),
            GetId1 => (CARD_SIZE_ID[0], Some(GetId2)),
            GetId2 => (CARD_SIZE_ID[1], Some(GetId3)),
            GetId3 => (CARD_SIZE_ID[2], Some(GetId4)),
            GetId4 => (CARD_SIZE_ID[3], None),
        };

        log(LogCategory::Devices, LogLevel::Trace, || {
            format!(
                "Memory card {:?}: 0x{:02X} -> 0x{:02X}",
                state, data_in, data_out
            )
        });

        self.last_byte = data_in;
        self.transfer_state = next.unwrap_or(Idle);
        (data_out, next.is_some())
    }

    pub fn do_state(&mut self, sw: &mut StateWrapper) -> bool {
        sw.do_value(&mut self.transfer_state);
        sw.do_value(&mut self.flag);
        sw.do_value(&mut self.address);
        sw.do_value(&mut self.sector_offset);
        sw.do_value(&mut self.checksum);
        sw.do_value(&mut self.last_byte);
        sw.do_value(&mut self.changed);
        sw.do_value(&mut self.data);

        if sw.is_reading() && !sw.has_error() && self.data.len() != DATA_SIZE {
            log(LogCategory::SaveState, LogLevel::Warn, || {
                format!(
                    "Memory card image is {} bytes, expected {}; resizing",
                    self.data.len(),
                    DATA_SIZE
                )
            });
            self.data.resize(DATA_SIZE, 0);
        }
        !sw.has_error()
    }
}
