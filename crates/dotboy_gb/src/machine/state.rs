//! Versioned binary save states.
//!
//! Layout: 4-byte magic, 2-byte cartridge global checksum
//! (little-endian), 1-byte version, then a flat dump of CPU, interrupt,
//! timer, PPU, banking and joypad state followed by the RAM regions
//! (VRAM, WRAM, OAM, IO, HRAM, external RAM). The exact size is known up
//! front via [`GameBoy::state_size`]; callers allocate once, no growable
//! buffer is involved.

use thiserror::Error;

use crate::cpu::Flags;

use super::{EventMask, GameBoy};

/// File signature of a state blob.
pub const STATE_MAGIC: [u8; 4] = *b"KGBC";
/// Current state format version. Older (or newer) blobs are rejected.
pub const STATE_VERSION: u8 = 1;

const HEADER_SIZE: usize = 4 + 2 + 1;

const VRAM_START: u16 = 0x8000;
const VRAM_SIZE: usize = 0x2000;
const WRAM_START: u16 = 0xC000;
const WRAM_SIZE: usize = 0x2000;
const OAM_START: u16 = 0xFE00;
const OAM_SIZE: usize = 0xA0;
const IO_START: u16 = 0xFF00;
const IO_SIZE: usize = 0x80;
const HRAM_START: u16 = 0xFF80;
const HRAM_SIZE: usize = 0x7F;

/// CPU (15) + interrupts (3) + timer (6) + PPU (7) + banking (6) +
/// joypad (1).
const COMPONENT_SIZE: usize = 15 + 3 + 6 + 7 + 6 + 1;

const FIXED_SIZE: usize = HEADER_SIZE
    + COMPONENT_SIZE
    + VRAM_SIZE
    + WRAM_SIZE
    + OAM_SIZE
    + IO_SIZE
    + HRAM_SIZE;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum StateSaveError {
    #[error("state buffer size mismatch: need {expected} bytes, got {got}")]
    BufferSize { expected: usize, got: usize },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum StateLoadError {
    #[error("not a state file")]
    NotAStateFile,
    #[error("old state version {found}, expected {STATE_VERSION}")]
    OldStateVersion { found: u8 },
    #[error("state was saved for a different rom")]
    WrongRom,
    #[error("truncated state file")]
    Truncated,
}

/// Deterministic state file name for a ROM base name and save slot.
pub fn state_file_name(rom_base: &str, slot: u8) -> String {
    format!("{rom_base}_{slot}.state")
}

struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    fn u8(&mut self, value: u8) {
        self.buf[self.pos] = value;
        self.pos += 1;
    }

    fn u16(&mut self, value: u16) {
        self.bytes(&value.to_le_bytes());
    }

    fn u32(&mut self, value: u32) {
        self.bytes(&value.to_le_bytes());
    }

    fn bytes(&mut self, data: &[u8]) {
        self.buf[self.pos..self.pos + data.len()].copy_from_slice(data);
        self.pos += data.len();
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn u8(&mut self) -> u8 {
        let value = self.buf[self.pos];
        self.pos += 1;
        value
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes([self.u8(), self.u8()])
    }

    fn u32(&mut self) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.buf[self.pos..self.pos + 4]);
        self.pos += 4;
        u32::from_le_bytes(raw)
    }

    fn bytes(&mut self, len: usize) -> &'a [u8] {
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        slice
    }
}

impl GameBoy {
    /// Exact byte size of a serialized state for this instance. Call this
    /// before allocating the buffer passed to [`GameBoy::save_state`].
    pub fn state_size(&self) -> usize {
        FIXED_SIZE + self.bus.cartridge.ram().len()
    }

    /// Serialize the complete emulator state into `out`.
    ///
    /// The buffer must be exactly [`GameBoy::state_size`] bytes; anything
    /// else is a caller contract violation reported as an error. On
    /// success the `STATE_SAVED` event is latched for the next `advance`.
    pub fn save_state(&mut self, out: &mut [u8]) -> Result<(), StateSaveError> {
        let expected = self.state_size();
        if out.len() != expected {
            return Err(StateSaveError::BufferSize {
                expected,
                got: out.len(),
            });
        }

        let mut w = Writer { buf: out, pos: 0 };
        w.bytes(&STATE_MAGIC);
        w.u16(self.bus.cartridge.header().global_checksum);
        w.u8(STATE_VERSION);

        // CPU.
        let regs = self.cpu.regs;
        w.u8(regs.a);
        w.u8(regs.f.bits());
        w.u8(regs.b);
        w.u8(regs.c);
        w.u8(regs.d);
        w.u8(regs.e);
        w.u8(regs.h);
        w.u8(regs.l);
        w.u16(regs.sp);
        w.u16(regs.pc);
        w.u8(self.cpu.halted as u8);
        let (ime_pending, ime_delay) = self.cpu.ime_delay_snapshot();
        w.u8(ime_pending as u8);
        w.u8(ime_delay as u8);

        // Interrupt controller.
        w.u8(self.bus.interrupts.read_enable());
        w.u8(self.bus.interrupts.raw_flags());
        w.u8(self.bus.interrupts.master_enable() as u8);

        // Timer.
        let (counter, tima, tma, tac, reload) = self.bus.timer.snapshot();
        w.u16(counter);
        w.u8(tima);
        w.u8(tma);
        w.u8(tac);
        w.u8(reload as u8);

        // PPU.
        let (mode, dot, line, window_line) = self.bus.ppu.snapshot();
        w.u8(mode);
        w.u32(dot);
        w.u8(line);
        w.u8(window_line);

        // Banking unit.
        let (rom_bank0, rom_bank1, ram_bank, banking_mode) = self.bus.cartridge.banking_snapshot();
        w.u16(rom_bank0);
        w.u16(rom_bank1);
        w.u8(ram_bank);
        w.u8(banking_mode);

        // Joypad select bits (the button snapshot belongs to the host).
        w.u8(self.bus.joypad.select_bits());

        // RAM regions.
        w.bytes(self.bus.mmu.slice(VRAM_START, VRAM_SIZE));
        w.bytes(self.bus.mmu.slice(WRAM_START, WRAM_SIZE));
        w.bytes(self.bus.mmu.slice(OAM_START, OAM_SIZE));
        w.bytes(self.bus.mmu.slice(IO_START, IO_SIZE));
        w.bytes(self.bus.mmu.slice(HRAM_START, HRAM_SIZE));
        w.bytes(self.bus.cartridge.ram());

        debug_assert_eq!(w.pos, expected);
        self.pending_events |= EventMask::STATE_SAVED;
        Ok(())
    }

    /// Restore a previously serialized state.
    ///
    /// Validates the signature, the cartridge identity and the format
    /// version before touching any live state; a rejected blob leaves the
    /// instance untouched. On success the `STATE_LOADED` event is latched
    /// for the next `advance`.
    pub fn load_state(&mut self, data: &[u8]) -> Result<(), StateLoadError> {
        if data.len() < HEADER_SIZE {
            return Err(StateLoadError::NotAStateFile);
        }
        if data[..4] != STATE_MAGIC {
            return Err(StateLoadError::NotAStateFile);
        }
        let checksum = u16::from_le_bytes([data[4], data[5]]);
        if checksum != self.bus.cartridge.header().global_checksum {
            return Err(StateLoadError::WrongRom);
        }
        let version = data[6];
        if version != STATE_VERSION {
            return Err(StateLoadError::OldStateVersion { found: version });
        }
        if data.len() != self.state_size() {
            return Err(StateLoadError::Truncated);
        }

        // Validation is complete; everything below is infallible.
        let mut r = Reader {
            buf: data,
            pos: HEADER_SIZE,
        };

        self.cpu.regs.a = r.u8();
        self.cpu.regs.f = Flags::from_bits_truncate(r.u8());
        self.cpu.regs.b = r.u8();
        self.cpu.regs.c = r.u8();
        self.cpu.regs.d = r.u8();
        self.cpu.regs.e = r.u8();
        self.cpu.regs.h = r.u8();
        self.cpu.regs.l = r.u8();
        self.cpu.regs.sp = r.u16();
        self.cpu.regs.pc = r.u16();
        self.cpu.halted = r.u8() != 0;
        let ime_pending = r.u8() != 0;
        let ime_delay = r.u8() != 0;
        self.cpu.restore_ime_delay(ime_pending, ime_delay);

        let enable = r.u8();
        let flags = r.u8();
        let master = r.u8() != 0;
        self.bus.interrupts.restore(enable, flags, master);

        let counter = r.u16();
        let tima = r.u8();
        let tma = r.u8();
        let tac = r.u8();
        let reload = r.u8() != 0;
        self.bus.timer.restore(counter, tima, tma, tac, reload);

        let mode = r.u8();
        let dot = r.u32();
        let line = r.u8();
        let window_line = r.u8();

        let rom_bank0 = r.u16();
        let rom_bank1 = r.u16();
        let ram_bank = r.u8();
        let banking_mode = r.u8();
        self.bus
            .cartridge
            .restore_banking(rom_bank0, rom_bank1, ram_bank, banking_mode);

        let joyp_select = r.u8();
        self.bus.joypad.restore(joyp_select);

        self.bus
            .mmu
            .slice_mut(VRAM_START, VRAM_SIZE)
            .copy_from_slice(r.bytes(VRAM_SIZE));
        self.bus
            .mmu
            .slice_mut(WRAM_START, WRAM_SIZE)
            .copy_from_slice(r.bytes(WRAM_SIZE));
        // Refresh the echo mirror from the restored work RAM.
        let wram: Vec<u8> = self.bus.mmu.slice(WRAM_START, 0x1E00).to_vec();
        self.bus.mmu.slice_mut(0xE000, 0x1E00).copy_from_slice(&wram);
        self.bus
            .mmu
            .slice_mut(OAM_START, OAM_SIZE)
            .copy_from_slice(r.bytes(OAM_SIZE));
        self.bus
            .mmu
            .slice_mut(IO_START, IO_SIZE)
            .copy_from_slice(r.bytes(IO_SIZE));
        self.bus
            .mmu
            .slice_mut(HRAM_START, HRAM_SIZE)
            .copy_from_slice(r.bytes(HRAM_SIZE));
        let ram_len = self.bus.cartridge.ram().len();
        self.bus
            .cartridge
            .ram_mut()
            .copy_from_slice(r.bytes(ram_len));

        // PPU last: it re-derives LY and the STAT mode bits.
        self.bus.ppu.restore(mode, dot, line, window_line, &mut self.bus.mmu);

        self.pending_events |= EventMask::STATE_LOADED;
        Ok(())
    }
}
