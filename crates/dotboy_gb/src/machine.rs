//! The assembled DMG machine: CPU plus system bus, driven by
//! [`GameBoy::advance`].

mod bus;
pub mod cartridge;
mod debug;
pub mod interrupts;
mod joypad;
mod mmu;
mod ppu;
pub mod state;
mod timer;

#[cfg(test)]
mod tests;

use bitflags::bitflags;
use thiserror::Error;

use crate::cpu::{Cpu, CpuFault};
use bus::SystemBus;
use cartridge::{Cartridge, CartridgeError};

pub use joypad::JoypadState;

/// Total addressable memory (64 KiB).
pub(crate) const MEMORY_SIZE: usize = 0x10000;

bitflags! {
    /// Events observed during a call to [`GameBoy::advance`].
    ///
    /// Consumers poll this mask after each call; save/load and debugger
    /// bits are latched by the corresponding operations and reported by
    /// the next `advance`.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct EventMask: u32 {
        const VBLANK                = 0x01;
        const STATE_SAVED           = 0x02;
        const STATE_LOADED          = 0x04;
        const DEBUGGER_CONNECTED    = 0x08;
        const DEBUGGER_DISCONNECTED = 0x10;
    }
}

/// Fatal condition raised while advancing the machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum RunError {
    #[error(transparent)]
    Cpu(#[from] CpuFault),
}

/// Idle time charged per step while the CPU is halted, so that the timer
/// and PPU keep running towards the interrupt that will wake it.
const HALT_IDLE_CYCLES: u32 = 4;

/// A complete emulator instance.
///
/// Constructed once by the host, reset explicitly, mutated only through
/// `advance` and the state/input entry points. The core is single-threaded
/// and synchronous; every operation runs to completion.
pub struct GameBoy {
    cpu: Cpu,
    bus: SystemBus,
    /// Events latched between `advance` calls (state saved/loaded,
    /// debugger attach/detach).
    pending_events: EventMask,
    debugger_attached: bool,
}

impl GameBoy {
    /// Build an instance around a ROM image.
    ///
    /// The ROM is validated (logo signature, header checksum, declared
    /// sizes) and mapped; malformed images are rejected, never silently
    /// accepted.
    pub fn new(rom: &[u8]) -> Result<Self, CartridgeError> {
        let cartridge = Cartridge::new(rom)?;
        let mut bus = SystemBus::new(cartridge);
        bus.map_cartridge();
        Ok(Self {
            cpu: Cpu::new(),
            bus,
            pending_events: EventMask::empty(),
            debugger_attached: false,
        })
    }

    /// Reset to power-on defaults, keeping the loaded cartridge.
    ///
    /// Hosts are expected to call this between frames only, never
    /// mid-instruction; the core itself has no suspension points, so any
    /// call site satisfies that by construction.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.bus.reset();
        self.bus.map_cartridge();
        self.pending_events = EventMask::empty();
    }

    /// Run the machine for at least `cycles` T-cycles.
    ///
    /// Steps the CPU instruction by instruction; each instruction's cycle
    /// cost drives the PPU and timer. Execution stops at the first
    /// instruction boundary at or past the budget, so slightly more than
    /// `cycles` may be consumed.
    pub fn advance(&mut self, cycles: u32) -> Result<EventMask, RunError> {
        let mut events = self.pending_events;
        self.pending_events = EventMask::empty();

        let mut consumed = 0u32;
        while consumed < cycles {
            let step_cycles = self.cpu.step(&mut self.bus)?;
            // Zero cycles means the CPU is halted with nothing pending;
            // charge idle time so peripherals still make progress.
            let cost = if step_cycles == 0 {
                HALT_IDLE_CYCLES
            } else {
                step_cycles
            };

            if self.bus.tick(cost) {
                events |= EventMask::VBLANK;
            }
            consumed += cost;
        }

        Ok(events)
    }

    /// The presentable frame buffer: packed 2-bit pixels of the most
    /// recently completed frame (see [`crate::FRAME_BUFFER_SIZE`]).
    pub fn frame_buffer(&self) -> &[u8] {
        self.bus.ppu.presented_frame()
    }

    /// Apply a joypad snapshot. Takes effect before the next `advance`;
    /// a newly pressed button requests the joypad interrupt.
    pub fn set_joypad(&mut self, state: JoypadState) {
        self.bus.set_joypad(state);
    }

    /// Battery-backed external RAM contents, for host-side persistence.
    /// Zero-length when the cartridge declares no RAM.
    pub fn external_ram(&self) -> &[u8] {
        self.bus.cartridge.ram()
    }

    /// Restore battery-backed external RAM, typically right after
    /// construction. Ignores a buffer of the wrong size.
    pub fn load_external_ram(&mut self, data: &[u8]) {
        self.bus.cartridge.load_ram(data);
    }

    /// Latch a debugger attach/detach event for the next `advance`.
    ///
    /// The wire transport lives outside the core; this only feeds the
    /// event mask consumers poll.
    pub fn set_debugger_attached(&mut self, attached: bool) {
        if attached == self.debugger_attached {
            return;
        }
        self.debugger_attached = attached;
        self.pending_events |= if attached {
            EventMask::DEBUGGER_CONNECTED
        } else {
            EventMask::DEBUGGER_DISCONNECTED
        };
    }
}
