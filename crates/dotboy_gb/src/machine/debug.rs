//! Read-only introspection surface for an external debugger transport.
//!
//! The wire protocol (sockets, framing, polling cadence) lives outside
//! the core; these accessors expose the raw material it serializes:
//! the register file, the full memory snapshot, the most recently
//! executed instruction and the most recent memory accesses.

use crate::cpu::{InstructionRecord, Registers};

use super::cartridge::RomHeader;
use super::GameBoy;

impl GameBoy {
    /// Current CPU register file.
    pub fn cpu_registers(&self) -> Registers {
        self.cpu.regs
    }

    /// The full 64 KiB address space as the CPU last left it.
    ///
    /// Component-owned registers (DIV, TIMA, IF and friends) are live in
    /// their components, not in this snapshot; a debugger that needs
    /// their current values reads them through the bus like the CPU does.
    pub fn memory(&self) -> &[u8] {
        self.bus.mmu.bytes()
    }

    /// Address, opcode and pre-execution registers of the last executed
    /// instruction.
    pub fn last_instruction(&self) -> &InstructionRecord {
        self.cpu.last_instruction()
    }

    /// Parsed cartridge header of the loaded ROM.
    pub fn rom_header(&self) -> &RomHeader {
        self.bus.cartridge.header()
    }

    /// Current PPU position: (mode bits, scanline).
    pub fn ppu_position(&self) -> (u8, u8) {
        (self.bus.ppu.mode() as u8, self.bus.ppu.line())
    }

    /// Address of the most recent CPU memory read.
    pub fn last_read_address(&self) -> u16 {
        self.bus.mmu.last_read_address()
    }

    /// Address and value of the most recent CPU memory write.
    pub fn last_write(&self) -> (u16, u8) {
        (
            self.bus.mmu.last_write_address(),
            self.bus.mmu.last_value_written(),
        )
    }
}
