//! System bus: routes CPU memory traffic to the mapper, cartridge and IO
//! registers, and fans consumed cycles out to the timer and PPU.

use crate::cpu::Bus;

use super::cartridge::Cartridge;
use super::interrupts::InterruptController;
use super::joypad::{Joypad, JoypadState};
use super::mmu::Mmu;
use super::ppu::Ppu;
use super::timer::Timer;

const ROM_END: u16 = 0x7FFF;
const EXTERNAL_RAM_START: u16 = 0xA000;
const EXTERNAL_RAM_END: u16 = 0xBFFF;

const REG_JOYP: u16 = 0xFF00;
const REG_DIV: u16 = 0xFF04;
const REG_TIMA: u16 = 0xFF05;
const REG_TMA: u16 = 0xFF06;
const REG_TAC: u16 = 0xFF07;
const REG_IF: u16 = 0xFF0F;
const REG_STAT: u16 = 0xFF41;
const REG_LY: u16 = 0xFF44;
const REG_DMA: u16 = 0xFF46;
const REG_IE: u16 = 0xFFFF;

pub(super) struct SystemBus {
    pub(super) mmu: Mmu,
    pub(super) cartridge: Cartridge,
    pub(super) interrupts: InterruptController,
    pub(super) timer: Timer,
    pub(super) ppu: Ppu,
    pub(super) joypad: Joypad,
}

impl SystemBus {
    pub(super) fn new(cartridge: Cartridge) -> Self {
        Self {
            mmu: Mmu::new(),
            cartridge,
            interrupts: InterruptController::new(),
            timer: Timer::new(),
            ppu: Ppu::new(),
            joypad: Joypad::new(),
        }
    }

    /// Reset all components to power-on defaults, keeping the cartridge.
    pub(super) fn reset(&mut self) {
        self.mmu.reset();
        self.interrupts.reset();
        self.timer.reset();
        self.ppu.reset();
        self.joypad.reset();
        self.apply_boot_io_state();
    }

    /// Copy the cartridge's mapped banks into the ROM window and set the
    /// post-boot IO register values.
    pub(super) fn map_cartridge(&mut self) {
        self.cartridge.map_into(&mut self.mmu);
        self.apply_boot_io_state();
    }

    /// IO registers as the DMG boot ROM leaves them.
    fn apply_boot_io_state(&mut self) {
        self.mmu.poke(0xFF40, 0x91); // LCDC: display + background on
        self.mmu.poke(0xFF47, 0xFC); // BGP
        self.mmu.poke(0xFF48, 0xFF); // OBP0
        self.mmu.poke(0xFF49, 0xFF); // OBP1
    }

    /// Advance timer and PPU by `cycles`. Returns true when a frame
    /// completed.
    pub(super) fn tick(&mut self, cycles: u32) -> bool {
        self.timer.tick(cycles, &mut self.interrupts);
        self.ppu.tick(cycles, &mut self.mmu, &mut self.interrupts)
    }

    pub(super) fn set_joypad(&mut self, state: JoypadState) {
        self.joypad.set_state(state, &mut self.interrupts);
    }

    /// OAM DMA: a write to 0xFF46 copies 160 bytes from `value << 8` into
    /// the sprite attribute table. Modelled as an instantaneous copy.
    fn oam_dma(&mut self, value: u8) {
        let source = (value as u16) << 8;
        for offset in 0..0xA0u16 {
            let byte = self.mmu.peek(source + offset);
            self.mmu.poke(0xFE00 + offset, byte);
        }
    }
}

impl Bus for SystemBus {
    fn read8(&mut self, addr: u16) -> u8 {
        match addr {
            EXTERNAL_RAM_START..=EXTERNAL_RAM_END => self.cartridge.ram_read(addr),
            REG_JOYP => self.joypad.read(),
            REG_DIV => self.timer.read_divider(),
            REG_TIMA => self.timer.read_counter(),
            REG_TMA => self.timer.read_modulo(),
            REG_TAC => self.timer.read_control(),
            REG_IF => self.interrupts.read_flags(),
            REG_IE => self.interrupts.read_enable(),
            _ => self.mmu.read8(addr),
        }
    }

    fn write8(&mut self, addr: u16, value: u8) {
        match addr {
            // ROM window writes address the banking unit, never memory.
            0x0000..=ROM_END => self.cartridge.rom_write(addr, value),
            EXTERNAL_RAM_START..=EXTERNAL_RAM_END => self.cartridge.ram_write(addr, value),
            REG_JOYP => self.joypad.write(value),
            REG_DIV => self.timer.write_divider(&mut self.interrupts),
            REG_TIMA => self.timer.write_counter(value),
            REG_TMA => self.timer.write_modulo(value),
            REG_TAC => self.timer.write_control(value),
            REG_IF => self.interrupts.write_flags(value),
            REG_IE => self.interrupts.write_enable(value),
            REG_STAT => {
                // Bits 0-2 are owned by the PPU.
                let current = self.mmu.peek(REG_STAT);
                self.mmu.poke(REG_STAT, (value & 0x78) | (current & 0x07));
            }
            REG_LY => {} // read-only
            REG_DMA => {
                self.mmu.poke(REG_DMA, value);
                self.oam_dma(value);
            }
            _ => self.mmu.write8(addr, value),
        }
    }

    fn irq_pending(&self) -> u8 {
        self.interrupts.pending_and_enabled()
    }

    fn irq_service(&mut self) -> Option<u16> {
        self.interrupts.service()
    }

    fn irq_set_master_enable(&mut self, enabled: bool) {
        self.interrupts.set_master_enable(enabled);
    }
}
