//! Sharp LR35902 CPU core.
//!
//! The interpreter is instruction-stepped: [`Cpu::step`] executes exactly
//! one instruction (or one interrupt dispatch) against a [`Bus`] and
//! reports the T-cycle cost. All flag results are computed from operand
//! bit patterns; nothing is derived from host arithmetic flags.

mod alu;
mod cb;
mod ops;


use bitflags::bitflags;
use thiserror::Error;

bitflags! {
    /// Flag bits of the F register. The low nibble of F is always zero.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Flags: u8 {
        const ZERO       = 0x80;
        const SUBTRACT   = 0x40;
        const HALF_CARRY = 0x20;
        const CARRY      = 0x10;
    }
}

/// CPU register file.
///
/// Eight 8-bit registers pairable into four 16-bit views. The pairs are
/// computed by the accessors below instead of relying on any memory
/// layout aliasing, so there is no platform-dependent behaviour here.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Registers {
    pub a: u8,
    pub f: Flags,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,
    pub sp: u16,
    pub pc: u16,
}

impl Registers {
    #[inline]
    pub fn af(&self) -> u16 {
        u16::from_be_bytes([self.a, self.f.bits()])
    }

    #[inline]
    pub fn set_af(&mut self, value: u16) {
        let [a, f] = value.to_be_bytes();
        self.a = a;
        // The low nibble of F does not exist in hardware.
        self.f = Flags::from_bits_truncate(f);
    }

    #[inline]
    pub fn bc(&self) -> u16 {
        u16::from_be_bytes([self.b, self.c])
    }

    #[inline]
    pub fn set_bc(&mut self, value: u16) {
        let [b, c] = value.to_be_bytes();
        self.b = b;
        self.c = c;
    }

    #[inline]
    pub fn de(&self) -> u16 {
        u16::from_be_bytes([self.d, self.e])
    }

    #[inline]
    pub fn set_de(&mut self, value: u16) {
        let [d, e] = value.to_be_bytes();
        self.d = d;
        self.e = e;
    }

    #[inline]
    pub fn hl(&self) -> u16 {
        u16::from_be_bytes([self.h, self.l])
    }

    #[inline]
    pub fn set_hl(&mut self, value: u16) {
        let [h, l] = value.to_be_bytes();
        self.h = h;
        self.l = l;
    }
}

/// Memory and interrupt substrate the CPU executes against.
///
/// The system bus routes reads and writes to ROM, VRAM, work RAM, OAM,
/// IO registers and HRAM; the interrupt hooks give the CPU access to the
/// interrupt controller without coupling it to a concrete machine type.
pub trait Bus {
    fn read8(&mut self, addr: u16) -> u8;
    fn write8(&mut self, addr: u16, value: u8);

    /// Little-endian 16-bit read: low byte at `addr`, high byte at `addr + 1`.
    fn read16(&mut self, addr: u16) -> u16 {
        let lo = self.read8(addr) as u16;
        let hi = self.read8(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    fn write16(&mut self, addr: u16, value: u16) {
        self.write8(addr, value as u8);
        self.write8(addr.wrapping_add(1), (value >> 8) as u8);
    }

    /// Mask of interrupts that are both pending and enabled (`IE & IF`).
    fn irq_pending(&self) -> u8;

    /// Ask the interrupt controller to dispatch.
    ///
    /// Returns the interrupt vector when the master enable flag is set and
    /// a pending, enabled interrupt exists; the controller clears the
    /// serviced IF bit and the master enable flag itself.
    fn irq_service(&mut self) -> Option<u16>;

    /// Set or clear the master interrupt enable flag (EI/DI/RETI).
    fn irq_set_master_enable(&mut self, enabled: bool);
}

/// Address, opcode byte and pre-execution register file of the most
/// recently executed instruction. Exposed read-only so an external
/// debugger transport can serialize it.
#[derive(Clone, Copy, Debug, Default)]
pub struct InstructionRecord {
    pub address: u16,
    pub opcode: u8,
    pub registers: Registers,
}

/// Fatal CPU condition. Execution must not continue past one of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum CpuFault {
    #[error("undefined opcode 0x{opcode:02X} at 0x{address:04X}")]
    UndefinedOpcode { address: u16, opcode: u8 },
}

/// T-cycle cost of an interrupt dispatch (push PC + jump to vector).
pub const INTERRUPT_DISPATCH_CYCLES: u32 = 20;

/// The CPU execution engine.
///
/// Two execution states exist: running and halted. A halted CPU consumes
/// no cycles ([`Cpu::step`] returns `Ok(0)`, which the machine loop treats
/// as idle time) until an enabled interrupt becomes pending.
#[derive(Clone, Debug)]
pub struct Cpu {
    pub regs: Registers,
    pub halted: bool,
    /// EI takes effect after the *next* instruction completes; these two
    /// stages model that delay.
    ime_enable_pending: bool,
    ime_enable_delay: bool,
    last_instruction: InstructionRecord,
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    pub fn new() -> Self {
        let mut cpu = Self {
            regs: Registers::default(),
            halted: false,
            ime_enable_pending: false,
            ime_enable_delay: false,
            last_instruction: InstructionRecord::default(),
        };
        cpu.apply_boot_state();
        cpu
    }

    /// Reset to the DMG power-on state.
    pub fn reset(&mut self) {
        self.regs = Registers::default();
        self.halted = false;
        self.ime_enable_pending = false;
        self.ime_enable_delay = false;
        self.last_instruction = InstructionRecord::default();
        self.apply_boot_state();
    }

    /// Register values after the DMG boot ROM hands control to cartridge
    /// code at 0x0100 (per Pan Docs).
    fn apply_boot_state(&mut self) {
        self.regs.a = 0x01;
        self.regs.f = Flags::ZERO | Flags::HALF_CARRY | Flags::CARRY;
        self.regs.b = 0x00;
        self.regs.c = 0x13;
        self.regs.d = 0x00;
        self.regs.e = 0xD8;
        self.regs.h = 0x01;
        self.regs.l = 0x4D;
        self.regs.sp = 0xFFFE;
        self.regs.pc = 0x0100;
    }

    /// Most recently executed instruction, for debugger consumers.
    pub fn last_instruction(&self) -> &InstructionRecord {
        &self.last_instruction
    }

    /// The two EI delay stages, for state serialization.
    pub(crate) fn ime_delay_snapshot(&self) -> (bool, bool) {
        (self.ime_enable_pending, self.ime_enable_delay)
    }

    pub(crate) fn restore_ime_delay(&mut self, pending: bool, delay: bool) {
        self.ime_enable_pending = pending;
        self.ime_enable_delay = delay;
    }

    /// Execute one instruction or interrupt dispatch.
    ///
    /// Returns the T-cycle cost. `Ok(0)` means the CPU is halted with no
    /// wake condition; the caller must treat that as idle time, not as an
    /// error. Undefined opcodes are fatal and reported as a [`CpuFault`].
    pub fn step<B: Bus>(&mut self, bus: &mut B) -> Result<u32, CpuFault> {
        if let Some(vector) = bus.irq_service() {
            // The controller has already cleared the IF bit and the
            // master enable flag; the CPU pushes the return address and
            // jumps to the fixed vector.
            self.halted = false;
            self.ime_enable_pending = false;
            self.ime_enable_delay = false;
            let pc = self.regs.pc;
            self.push16(bus, pc);
            self.regs.pc = vector;
            log::debug!("irq dispatch: vector=0x{:04X} from pc=0x{:04X}", vector, pc);
            return Ok(INTERRUPT_DISPATCH_CYCLES);
        }

        if self.halted {
            // HALT exits on any pending, enabled interrupt even while the
            // master enable flag is off; whether it is *serviced* was
            // decided above.
            if bus.irq_pending() != 0 {
                self.halted = false;
            } else {
                return Ok(0);
            }
        }

        let address = self.regs.pc;
        let opcode = bus.read8(address);
        self.last_instruction = InstructionRecord {
            address,
            opcode,
            registers: self.regs,
        };
        self.regs.pc = self.regs.pc.wrapping_add(1);

        let cycles = self.execute(bus, opcode)?;
        self.apply_ime_delay(bus);
        Ok(cycles)
    }

    /// Advance the two-stage EI delay after an instruction completes.
    fn apply_ime_delay<B: Bus>(&mut self, bus: &mut B) {
        if self.ime_enable_delay {
            self.ime_enable_delay = false;
            bus.irq_set_master_enable(true);
        }
        if self.ime_enable_pending {
            self.ime_enable_pending = false;
            self.ime_enable_delay = true;
        }
    }

    #[inline]
    pub(crate) fn flag(&self, flag: Flags) -> bool {
        self.regs.f.contains(flag)
    }

    #[inline]
    pub(crate) fn fetch8<B: Bus>(&mut self, bus: &mut B) -> u8 {
        let value = bus.read8(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        value
    }

    #[inline]
    pub(crate) fn fetch16<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let lo = self.fetch8(bus) as u16;
        let hi = self.fetch8(bus) as u16;
        (hi << 8) | lo
    }

    /// Push a 16-bit value: SP decrements before each byte, high byte
    /// written first so that memory[SP] ends up holding the low byte.
    #[inline]
    pub(crate) fn push16<B: Bus>(&mut self, bus: &mut B, value: u16) {
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        bus.write8(self.regs.sp, (value >> 8) as u8);
        self.regs.sp = self.regs.sp.wrapping_sub(1);
        bus.write8(self.regs.sp, value as u8);
    }

    /// Pop a 16-bit value: low byte read first, SP increments by two.
    #[inline]
    pub(crate) fn pop16<B: Bus>(&mut self, bus: &mut B) -> u16 {
        let lo = bus.read8(self.regs.sp) as u16;
        let hi = bus.read8(self.regs.sp.wrapping_add(1)) as u16;
        self.regs.sp = self.regs.sp.wrapping_add(2);
        (hi << 8) | lo
    }

    /// Read an 8-bit operand by table index: 0=B 1=C 2=D 3=E 4=H 5=L
    /// 6=(HL) 7=A.
    #[inline]
    pub(crate) fn read_operand<B: Bus>(&mut self, bus: &mut B, index: u8) -> u8 {
        match index & 0x07 {
            0 => self.regs.b,
            1 => self.regs.c,
            2 => self.regs.d,
            3 => self.regs.e,
            4 => self.regs.h,
            5 => self.regs.l,
            6 => bus.read8(self.regs.hl()),
            _ => self.regs.a,
        }
    }

    /// Write an 8-bit operand by table index (same encoding as
    /// [`Cpu::read_operand`]).
    #[inline]
    pub(crate) fn write_operand<B: Bus>(&mut self, bus: &mut B, index: u8, value: u8) {
        match index & 0x07 {
            0 => self.regs.b = value,
            1 => self.regs.c = value,
            2 => self.regs.d = value,
            3 => self.regs.e = value,
            4 => self.regs.h = value,
            5 => self.regs.l = value,
            6 => bus.write8(self.regs.hl(), value),
            _ => self.regs.a = value,
        }
    }

    /// Evaluate a branch condition by table index: 0=NZ 1=Z 2=NC 3=C.
    #[inline]
    pub(crate) fn condition(&self, index: u8) -> bool {
        match index & 0x03 {
            0 => !self.flag(Flags::ZERO),
            1 => self.flag(Flags::ZERO),
            2 => !self.flag(Flags::CARRY),
            _ => self.flag(Flags::CARRY),
        }
    }
}
