//! Timer and divider unit.
//!
//! A free-running 16-bit counter advances every T-cycle; DIV exposes its
//! upper byte. TIMA increments on a falling edge of the TAC-selected tap
//! bit. On overflow the interrupt fires immediately, TIMA reads 0x00 for
//! one machine cycle, and the reload from TMA happens on the next machine
//! cycle.

use super::interrupts::{Interrupt, InterruptController};

/// Tap bit of the internal counter per TAC frequency select.
/// 00 -> 4096 Hz, 01 -> 262144 Hz, 10 -> 65536 Hz, 11 -> 16384 Hz.
const TAP_BITS: [u16; 4] = [9, 3, 5, 7];

const TCYCLES_PER_MCYCLE: u32 = 4;

pub(super) struct Timer {
    counter: u16,
    tima: u8,
    tma: u8,
    tac: u8,
    enabled: bool,
    /// Overflow happened last machine cycle; the reload from TMA is still
    /// pending.
    reload_pending: bool,
    /// Sub-machine-cycle remainder carried between `tick` calls.
    cycle_remainder: u32,
}

impl Timer {
    pub(super) fn new() -> Self {
        Self {
            counter: 0,
            tima: 0,
            tma: 0,
            tac: 0,
            enabled: false,
            reload_pending: false,
            cycle_remainder: 0,
        }
    }

    pub(super) fn reset(&mut self) {
        *self = Self::new();
    }

    #[inline]
    fn tap_bit(&self) -> bool {
        let bit = TAP_BITS[(self.tac & 0x03) as usize];
        (self.counter >> bit) & 1 != 0
    }

    /// Advance by a batch of T-cycles.
    pub(super) fn tick(&mut self, cycles: u32, irq: &mut InterruptController) {
        let total = self.cycle_remainder + cycles;
        self.cycle_remainder = total % TCYCLES_PER_MCYCLE;
        for _ in 0..total / TCYCLES_PER_MCYCLE {
            self.tick_mcycle(irq);
        }
    }

    fn tick_mcycle(&mut self, irq: &mut InterruptController) {
        if self.reload_pending {
            // One machine cycle after overflow: TIMA picks up the modulo
            // value. The interrupt already fired at the overflow instant.
            self.tima = self.tma;
            self.reload_pending = false;
            self.counter = self.counter.wrapping_add(TCYCLES_PER_MCYCLE as u16);
            return;
        }

        let old_bit = self.tap_bit();
        self.counter = self.counter.wrapping_add(TCYCLES_PER_MCYCLE as u16);
        if self.enabled && old_bit && !self.tap_bit() {
            self.increment(irq);
        }
    }

    fn increment(&mut self, irq: &mut InterruptController) {
        let (next, overflowed) = self.tima.overflowing_add(1);
        self.tima = next;
        if overflowed {
            // TIMA reads 0x00 for this machine cycle; the interrupt fires
            // now, the reload happens next cycle.
            self.reload_pending = true;
            irq.request(Interrupt::Timer);
        }
    }

    /// DIV: the counter's upper byte.
    pub(super) fn read_divider(&self) -> u8 {
        (self.counter >> 8) as u8
    }

    /// Any write to DIV clears the whole internal counter. A falling edge
    /// produced by the clear still clocks TIMA.
    pub(super) fn write_divider(&mut self, irq: &mut InterruptController) {
        if self.enabled && self.tap_bit() {
            self.increment(irq);
        }
        self.counter = 0;
    }

    pub(super) fn read_counter(&self) -> u8 {
        self.tima
    }

    /// A TIMA write during the reload-pending cycle cancels the reload.
    pub(super) fn write_counter(&mut self, value: u8) {
        self.tima = value;
        self.reload_pending = false;
    }

    pub(super) fn read_modulo(&self) -> u8 {
        self.tma
    }

    pub(super) fn write_modulo(&mut self, value: u8) {
        self.tma = value;
    }

    /// TAC: unused upper bits read back as 1.
    pub(super) fn read_control(&self) -> u8 {
        0xF8 | self.tac
    }

    pub(super) fn write_control(&mut self, value: u8) {
        self.tac = value & 0x07;
        self.enabled = value & 0x04 != 0;
    }

    pub(super) fn snapshot(&self) -> (u16, u8, u8, u8, bool) {
        (self.counter, self.tima, self.tma, self.tac, self.reload_pending)
    }

    pub(super) fn restore(&mut self, counter: u16, tima: u8, tma: u8, tac: u8, reload: bool) {
        self.counter = counter;
        self.tima = tima;
        self.tma = tma;
        self.tac = tac & 0x07;
        self.enabled = tac & 0x04 != 0;
        self.reload_pending = reload;
        self.cycle_remainder = 0;
    }
}
