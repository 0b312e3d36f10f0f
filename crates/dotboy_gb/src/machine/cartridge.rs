//! Cartridge loading, header validation and the banking unit.
//!
//! Only the bankless reference scheme (header type 0x00) is supported;
//! the bank-select interface exists so additional mappers can be added
//! without touching the CPU or the memory mapper.

use thiserror::Error;

use super::mmu::Mmu;

/// The 48-byte boot logo every licensed cartridge carries at 0x0104. The
/// boot ROM refuses to start a cartridge without it, and so do we.
pub const LOGO: [u8; 48] = [
    0xCE, 0xED, 0x66, 0x66, 0xCC, 0x0D, 0x00, 0x0B, 0x03, 0x73, 0x00, 0x83, 0x00, 0x0C, 0x00,
    0x0D, 0x00, 0x08, 0x11, 0x1F, 0x88, 0x89, 0x00, 0x0E, 0xDC, 0xCC, 0x6E, 0xE6, 0xDD, 0xDD,
    0xD9, 0x99, 0xBB, 0xBB, 0x67, 0x63, 0x6E, 0x0E, 0xEC, 0xCC, 0xDD, 0xDC, 0x99, 0x9F, 0xBB,
    0xB9, 0x33, 0x3E,
];

/// Header field offsets within the ROM image.
const HEADER_END: usize = 0x0150;
const OFFSET_ENTRY: usize = 0x0100;
const OFFSET_LOGO: usize = 0x0104;
const OFFSET_TITLE: usize = 0x0134;
const OFFSET_CARTRIDGE_TYPE: usize = 0x0147;
const OFFSET_ROM_SIZE: usize = 0x0148;
const OFFSET_RAM_SIZE: usize = 0x0149;
const OFFSET_HEADER_CHECKSUM: usize = 0x014D;
const OFFSET_GLOBAL_CHECKSUM: usize = 0x014E;

/// One ROM bank is 16 KiB; the bankless scheme maps exactly two.
pub const ROM_BANK_SIZE: usize = 0x4000;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CartridgeError {
    #[error("invalid rom: {0}")]
    InvalidRom(&'static str),
    #[error("rom type unsupported: 0x{0:02X}")]
    UnsupportedType(u8),
}

/// Quick validity probe for loaders: length sanity plus logo signature.
pub fn is_valid_rom(rom: &[u8]) -> bool {
    rom.len() >= HEADER_END && rom[OFFSET_LOGO..OFFSET_LOGO + LOGO.len()] == LOGO
}

/// Structured view of the cartridge header at 0x0100.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RomHeader {
    pub entry_point: [u8; 4],
    pub logo: [u8; 48],
    pub title: [u8; 16],
    pub cartridge_type: u8,
    pub rom_size_code: u8,
    pub ram_size_code: u8,
    pub header_checksum: u8,
    pub global_checksum: u16,
}

impl RomHeader {
    /// Fixed-offset structured read; fails only when the buffer is too
    /// short to contain a header.
    pub fn parse(rom: &[u8]) -> Result<Self, CartridgeError> {
        if rom.len() < HEADER_END {
            return Err(CartridgeError::InvalidRom("shorter than the cartridge header"));
        }

        let mut entry_point = [0u8; 4];
        entry_point.copy_from_slice(&rom[OFFSET_ENTRY..OFFSET_ENTRY + 4]);
        let mut logo = [0u8; 48];
        logo.copy_from_slice(&rom[OFFSET_LOGO..OFFSET_LOGO + 48]);
        let mut title = [0u8; 16];
        title.copy_from_slice(&rom[OFFSET_TITLE..OFFSET_TITLE + 16]);

        Ok(Self {
            entry_point,
            logo,
            title,
            cartridge_type: rom[OFFSET_CARTRIDGE_TYPE],
            rom_size_code: rom[OFFSET_ROM_SIZE],
            ram_size_code: rom[OFFSET_RAM_SIZE],
            header_checksum: rom[OFFSET_HEADER_CHECKSUM],
            global_checksum: u16::from_be_bytes([
                rom[OFFSET_GLOBAL_CHECKSUM],
                rom[OFFSET_GLOBAL_CHECKSUM + 1],
            ]),
        })
    }

    /// Game title with trailing padding stripped.
    pub fn title_str(&self) -> String {
        let end = self
            .title
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.title.len());
        String::from_utf8_lossy(&self.title[..end]).into_owned()
    }

    /// Declared ROM size in bytes. Codes 0x00-0x08 double from 32 KiB.
    pub fn rom_size_bytes(&self) -> Option<usize> {
        if self.rom_size_code <= 0x08 {
            Some((32 * 1024) << self.rom_size_code)
        } else {
            None
        }
    }

    /// Declared external RAM size in bytes.
    pub fn ram_size_bytes(&self) -> Option<usize> {
        match self.ram_size_code {
            0x00 => Some(0),
            0x02 => Some(8 * 1024),
            0x03 => Some(32 * 1024),
            0x04 => Some(128 * 1024),
            0x05 => Some(64 * 1024),
            _ => None,
        }
    }
}

/// Recompute the header checksum over 0x0134..=0x014C.
fn compute_header_checksum(rom: &[u8]) -> u8 {
    rom[OFFSET_TITLE..OFFSET_HEADER_CHECKSUM]
        .iter()
        .fold(0u8, |sum, &byte| sum.wrapping_sub(byte).wrapping_sub(1))
}

/// Banking scheme selected from the header cartridge type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Mapper {
    /// Type 0x00: no banking hardware; the whole ROM is mapped once.
    Bankless,
}

/// The cartridge and its banking state.
pub(super) struct Cartridge {
    header: RomHeader,
    rom: Vec<u8>,
    ram: Vec<u8>,
    mapper: Mapper,
    rom_bank0: u16,
    rom_bank1: u16,
    ram_bank: u8,
    banking_mode: u8,
}

impl Cartridge {
    /// Validate and take ownership of a ROM image.
    pub(super) fn new(rom: &[u8]) -> Result<Self, CartridgeError> {
        let header = RomHeader::parse(rom)?;

        if header.logo != LOGO {
            return Err(CartridgeError::InvalidRom("logo signature mismatch"));
        }
        if compute_header_checksum(rom) != header.header_checksum {
            return Err(CartridgeError::InvalidRom("header checksum mismatch"));
        }
        let rom_size = header
            .rom_size_bytes()
            .ok_or(CartridgeError::InvalidRom("unknown rom size code"))?;
        if rom.len() < rom_size {
            return Err(CartridgeError::InvalidRom("shorter than declared rom size"));
        }
        let ram_size = header
            .ram_size_bytes()
            .ok_or(CartridgeError::InvalidRom("unknown ram size code"))?;

        let mapper = match header.cartridge_type {
            0x00 => Mapper::Bankless,
            other => return Err(CartridgeError::UnsupportedType(other)),
        };

        Ok(Self {
            header,
            rom: rom[..rom_size].to_vec(),
            ram: vec![0u8; ram_size],
            mapper,
            rom_bank0: 0,
            rom_bank1: 1,
            ram_bank: 0,
            banking_mode: 0,
        })
    }

    pub(super) fn header(&self) -> &RomHeader {
        &self.header
    }

    pub(super) fn ram(&self) -> &[u8] {
        &self.ram
    }

    /// Restore battery-backed RAM. The buffer must match the declared
    /// size exactly; anything else is ignored.
    pub(super) fn load_ram(&mut self, data: &[u8]) {
        if data.len() == self.ram.len() {
            self.ram.copy_from_slice(data);
        } else {
            log::warn!(
                "external ram size mismatch: expected {}, got {}",
                self.ram.len(),
                data.len()
            );
        }
    }

    pub(super) fn ram_mut(&mut self) -> &mut [u8] {
        &mut self.ram
    }

    /// Copy the currently selected banks into the mapper's ROM window.
    /// For the bankless scheme that is the whole image, once.
    pub(super) fn map_into(&self, mmu: &mut Mmu) {
        let len = self.rom.len().min(2 * ROM_BANK_SIZE);
        mmu.slice_mut(0, len).copy_from_slice(&self.rom[..len]);
    }

    /// Read from the external RAM window (0xA000..=0xBFFF). Open bus
    /// (0xFF) when the cartridge has no RAM or the bank is out of range.
    pub(super) fn ram_read(&self, addr: u16) -> u8 {
        let offset = (addr as usize & 0x1FFF) + self.ram_bank as usize * 0x2000;
        self.ram.get(offset).copied().unwrap_or(0xFF)
    }

    /// Write to the external RAM window; dropped when no RAM is present.
    pub(super) fn ram_write(&mut self, addr: u16, value: u8) {
        let offset = (addr as usize & 0x1FFF) + self.ram_bank as usize * 0x2000;
        if let Some(slot) = self.ram.get_mut(offset) {
            *slot = value;
        }
    }

    /// A CPU write into the ROM window addresses the banking unit, never
    /// memory. The register ranges follow the common mapper layout.
    pub(super) fn rom_write(&mut self, addr: u16, value: u8) {
        match addr {
            0x2000..=0x3FFF => self.select_rom_bank(value as u16),
            0x4000..=0x5FFF => self.select_ram_bank(value & 0x03),
            0x6000..=0x7FFF => self.set_banking_mode(value & 0x01),
            _ => {
                log::trace!("rom write ignored: 0x{addr:04X} <- 0x{value:02X}");
            }
        }
    }

    /// Bank-select interface. The bankless scheme records the request;
    /// there is nothing to remap until a banked mapper exists.
    pub(super) fn select_rom_bank(&mut self, bank: u16) {
        match self.mapper {
            // Bank 0 in the switchable slot reads as bank 1.
            Mapper::Bankless => self.rom_bank1 = bank.max(1),
        }
    }

    pub(super) fn select_ram_bank(&mut self, bank: u8) {
        self.ram_bank = bank;
    }

    pub(super) fn set_banking_mode(&mut self, mode: u8) {
        self.banking_mode = mode;
    }

    pub(super) fn banking_snapshot(&self) -> (u16, u16, u8, u8) {
        (self.rom_bank0, self.rom_bank1, self.ram_bank, self.banking_mode)
    }

    pub(super) fn restore_banking(&mut self, rom_bank0: u16, rom_bank1: u16, ram_bank: u8, mode: u8) {
        self.rom_bank0 = rom_bank0;
        self.rom_bank1 = rom_bank1;
        self.ram_bank = ram_bank;
        self.banking_mode = mode;
    }
}
