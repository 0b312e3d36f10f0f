//! Joypad input: an 8-button snapshot applied between CPU steps, plus
//! the JOYP (0xFF00) register semantics.

use bitflags::bitflags;

use super::interrupts::{Interrupt, InterruptController};

bitflags! {
    /// Host-side button snapshot; a set bit means "pressed".
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct JoypadState: u8 {
        const RIGHT  = 0x01;
        const LEFT   = 0x02;
        const UP     = 0x04;
        const DOWN   = 0x08;
        const A      = 0x10;
        const B      = 0x20;
        const SELECT = 0x40;
        const START  = 0x80;
    }
}

pub(super) struct Joypad {
    /// JOYP select bits 4 (d-pad) and 5 (buttons); 0 selects a group.
    select: u8,
    state: JoypadState,
}

impl Joypad {
    pub(super) fn new() -> Self {
        Self {
            select: 0x30,
            state: JoypadState::empty(),
        }
    }

    pub(super) fn reset(&mut self) {
        *self = Self::new();
    }

    /// Apply a new snapshot; a fresh press requests the joypad interrupt.
    pub(super) fn set_state(&mut self, state: JoypadState, irq: &mut InterruptController) {
        let newly_pressed = state & !self.state;
        self.state = state;
        if !newly_pressed.is_empty() {
            irq.request(Interrupt::Joypad);
        }
    }

    /// JOYP read: low nibble is active-low button lines of the selected
    /// group(s); bits 6-7 are unused and read back as 1.
    pub(super) fn read(&self) -> u8 {
        let mut lines = 0x0F;
        if self.select & 0x10 == 0 {
            lines &= !(self.state.bits() & 0x0F);
        }
        if self.select & 0x20 == 0 {
            lines &= !(self.state.bits() >> 4);
        }
        0xC0 | self.select | lines
    }

    /// JOYP write: only the two select bits are writable.
    pub(super) fn write(&mut self, value: u8) {
        self.select = value & 0x30;
    }

    pub(super) fn select_bits(&self) -> u8 {
        self.select
    }

    pub(super) fn restore(&mut self, select: u8) {
        self.select = select & 0x30;
    }
}
