//! Interrupt controller: enable mask (IE, 0xFFFF), pending flags
//! (IF, 0xFF0F) and the master enable flag.

/// Interrupt sources in priority order (lowest bit wins).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interrupt {
    VBlank = 0,
    LcdStat = 1,
    Timer = 2,
    Serial = 3,
    Joypad = 4,
}

impl Interrupt {
    /// Fixed dispatch address for this interrupt.
    pub fn vector(self) -> u16 {
        0x0040 + (self as u16) * 8
    }
}

/// Only five interrupt lines exist; upper IF/IE bits are unused.
const SOURCE_MASK: u8 = 0x1F;

#[derive(Clone, Copy, Debug, Default)]
pub struct InterruptController {
    enable: u8,
    flags: u8,
    master_enable: bool,
}

impl InterruptController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// OR a pending bit in; peripherals call this regardless of whether
    /// the interrupt is enabled.
    pub fn request(&mut self, interrupt: Interrupt) {
        self.flags |= 1 << interrupt as u8;
    }

    /// Mask of interrupts both pending and enabled. Non-zero wakes a
    /// halted CPU even while the master enable flag is off.
    pub fn pending_and_enabled(&self) -> u8 {
        self.enable & self.flags & SOURCE_MASK
    }

    /// Arbitrate and dispatch.
    ///
    /// When the master enable flag is set and some interrupt is pending
    /// and enabled, picks the lowest-numbered set bit (VBlank > LCD-STAT
    /// > Timer > Serial > Joypad), clears its pending bit and the master
    /// enable flag, and returns the dispatch vector. The CPU pushes the
    /// return address and jumps there.
    pub fn service(&mut self) -> Option<u16> {
        if !self.master_enable {
            return None;
        }
        let pending = self.pending_and_enabled();
        if pending == 0 {
            return None;
        }

        let index = pending.trailing_zeros() as u8;
        self.flags &= !(1 << index);
        self.master_enable = false;
        Some(0x0040 + (index as u16) * 8)
    }

    pub fn master_enable(&self) -> bool {
        self.master_enable
    }

    pub fn set_master_enable(&mut self, enabled: bool) {
        self.master_enable = enabled;
    }

    /// IF as seen through the memory map; unused bits read back as 1.
    pub fn read_flags(&self) -> u8 {
        self.flags | !SOURCE_MASK
    }

    pub fn write_flags(&mut self, value: u8) {
        self.flags = value & SOURCE_MASK;
    }

    pub fn read_enable(&self) -> u8 {
        self.enable
    }

    pub fn write_enable(&mut self, value: u8) {
        self.enable = value;
    }

    pub(super) fn raw_flags(&self) -> u8 {
        self.flags
    }

    pub(super) fn restore(&mut self, enable: u8, flags: u8, master_enable: bool) {
        self.enable = enable;
        self.flags = flags & SOURCE_MASK;
        self.master_enable = master_enable;
    }
}
