//! Flat 64 KiB memory substrate with echo-RAM write-through and access
//! tracking.
//!
//! Address routing policy (what a ROM write means, which IO register a
//! read hits) lives in the system bus; this type only knows about the
//! byte space itself, the work-RAM mirror, and the most recent access for
//! the debugger.

use super::MEMORY_SIZE;

/// Primary work RAM range mirrored into the echo range.
const WRAM_START: u16 = 0xC000;
const WRAM_ECHO_END: u16 = 0xDDFF;
/// Echo range offset: `0xE000..=0xFDFF` mirrors `0xC000..=0xDDFF`.
const ECHO_OFFSET: u16 = 0x2000;
const ECHO_START: u16 = 0xE000;
const ECHO_END: u16 = 0xFDFF;

pub(super) struct Mmu {
    memory: Box<[u8; MEMORY_SIZE]>,
    last_read_address: u16,
    last_write_address: u16,
    last_value_written: u8,
}

impl Mmu {
    pub(super) fn new() -> Self {
        Self {
            memory: vec![0u8; MEMORY_SIZE]
                .into_boxed_slice()
                .try_into()
                .expect("fixed allocation size"),
            last_read_address: 0,
            last_write_address: 0,
            last_value_written: 0,
        }
    }

    pub(super) fn reset(&mut self) {
        self.memory.fill(0);
        self.last_read_address = 0;
        self.last_write_address = 0;
        self.last_value_written = 0;
    }

    pub(super) fn read8(&mut self, addr: u16) -> u8 {
        self.last_read_address = addr;
        self.memory[addr as usize]
    }

    /// Write one byte, mirroring between work RAM and its echo range.
    pub(super) fn write8(&mut self, addr: u16, value: u8) {
        self.last_write_address = addr;
        self.last_value_written = value;
        self.memory[addr as usize] = value;

        match addr {
            WRAM_START..=WRAM_ECHO_END => {
                self.memory[(addr + ECHO_OFFSET) as usize] = value;
            }
            ECHO_START..=ECHO_END => {
                self.memory[(addr - ECHO_OFFSET) as usize] = value;
            }
            _ => {}
        }
    }

    /// Read without touching the access tracking. Used by the PPU and the
    /// save-state codec, which are not observable memory traffic.
    #[inline]
    pub(super) fn peek(&self, addr: u16) -> u8 {
        self.memory[addr as usize]
    }

    /// Write without echo mirroring or tracking, for component-owned
    /// registers (LY, STAT mode bits) and state restoration.
    #[inline]
    pub(super) fn poke(&mut self, addr: u16, value: u8) {
        self.memory[addr as usize] = value;
    }

    /// Bulk read-only access for frame composition, state dumps and the
    /// debugger memory view.
    pub(super) fn slice(&self, start: u16, len: usize) -> &[u8] {
        &self.memory[start as usize..start as usize + len]
    }

    pub(super) fn slice_mut(&mut self, start: u16, len: usize) -> &mut [u8] {
        &mut self.memory[start as usize..start as usize + len]
    }

    /// The whole address space, for the debugger memory snapshot.
    pub(super) fn bytes(&self) -> &[u8] {
        &self.memory[..]
    }

    pub(super) fn last_read_address(&self) -> u16 {
        self.last_read_address
    }

    pub(super) fn last_write_address(&self) -> u16 {
        self.last_write_address
    }

    pub(super) fn last_value_written(&self) -> u8 {
        self.last_value_written
    }
}
