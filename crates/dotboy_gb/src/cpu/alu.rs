//! 8-bit and 16-bit ALU primitives.
//!
//! Every operation assigns all four flags explicitly. Half carry is the
//! carry out of bit 3 for 8-bit operations and out of bit 11 for the
//! 16-bit ADD HL form.

use super::{Cpu, Flags};

impl Cpu {
    /// ADD/ADC core: `A <- A + value (+ carry)`.
    pub(super) fn alu_add(&mut self, value: u8, with_carry: bool) {
        let a = self.regs.a;
        let carry_in = (with_carry && self.flag(Flags::CARRY)) as u8;

        let half = (a & 0x0F) + (value & 0x0F) + carry_in;
        let full = a as u16 + value as u16 + carry_in as u16;
        let result = full as u8;
        self.regs.a = result;

        let mut f = Flags::empty();
        f.set(Flags::ZERO, result == 0);
        f.set(Flags::HALF_CARRY, half > 0x0F);
        f.set(Flags::CARRY, full > 0xFF);
        self.regs.f = f;
    }

    /// SUB/SBC core: `A <- A - value (- carry)`.
    pub(super) fn alu_sub(&mut self, value: u8, with_carry: bool) {
        let a = self.regs.a;
        let carry_in = (with_carry && self.flag(Flags::CARRY)) as u8;

        let half = (a & 0x0F) as i16 - (value & 0x0F) as i16 - carry_in as i16;
        let full = a as i16 - value as i16 - carry_in as i16;
        let result = full as u8;
        self.regs.a = result;

        let mut f = Flags::SUBTRACT;
        f.set(Flags::ZERO, result == 0);
        f.set(Flags::HALF_CARRY, half < 0);
        f.set(Flags::CARRY, full < 0);
        self.regs.f = f;
    }

    /// CP: SUB flags without storing the result.
    pub(super) fn alu_cp(&mut self, value: u8) {
        let a = self.regs.a;
        self.alu_sub(value, false);
        self.regs.a = a;
    }

    pub(super) fn alu_and(&mut self, value: u8) {
        self.regs.a &= value;
        let mut f = Flags::HALF_CARRY;
        f.set(Flags::ZERO, self.regs.a == 0);
        self.regs.f = f;
    }

    pub(super) fn alu_or(&mut self, value: u8) {
        self.regs.a |= value;
        let mut f = Flags::empty();
        f.set(Flags::ZERO, self.regs.a == 0);
        self.regs.f = f;
    }

    pub(super) fn alu_xor(&mut self, value: u8) {
        self.regs.a ^= value;
        let mut f = Flags::empty();
        f.set(Flags::ZERO, self.regs.a == 0);
        self.regs.f = f;
    }

    /// 8-bit INC: updates Z/N/H, leaves carry untouched.
    pub(super) fn alu_inc8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_add(1);
        let mut f = self.regs.f & Flags::CARRY;
        f.set(Flags::ZERO, result == 0);
        f.set(Flags::HALF_CARRY, (value & 0x0F) == 0x0F);
        self.regs.f = f;
        result
    }

    /// 8-bit DEC: updates Z/N/H, leaves carry untouched.
    pub(super) fn alu_dec8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_sub(1);
        let mut f = (self.regs.f & Flags::CARRY) | Flags::SUBTRACT;
        f.set(Flags::ZERO, result == 0);
        f.set(Flags::HALF_CARRY, (value & 0x0F) == 0);
        self.regs.f = f;
        result
    }

    /// ADD HL, rr: Z preserved, half carry out of bit 11, carry out of
    /// bit 15.
    pub(super) fn alu_add_hl(&mut self, value: u16) {
        let hl = self.regs.hl();
        let (result, carry) = hl.overflowing_add(value);
        let mut f = self.regs.f & Flags::ZERO;
        f.set(Flags::HALF_CARRY, (hl & 0x0FFF) + (value & 0x0FFF) > 0x0FFF);
        f.set(Flags::CARRY, carry);
        self.regs.f = f;
        self.regs.set_hl(result);
    }

    /// Shared core of ADD SP,r8 and LD HL,SP+r8.
    ///
    /// The flags come from unsigned byte addition of SP's low byte and the
    /// raw offset, regardless of the offset's sign; Z and N are cleared.
    pub(super) fn alu_sp_offset(&mut self, offset: i8) -> u16 {
        let sp = self.regs.sp;
        let raw = offset as u8;
        let mut f = Flags::empty();
        f.set(Flags::HALF_CARRY, (sp & 0x000F) + (raw & 0x0F) as u16 > 0x000F);
        f.set(Flags::CARRY, (sp & 0x00FF) + raw as u16 > 0x00FF);
        self.regs.f = f;
        sp.wrapping_add(offset as i16 as u16)
    }

    /// Decimal adjust A after a BCD addition or subtraction.
    pub(super) fn alu_daa(&mut self) {
        let mut a = self.regs.a;
        let mut carry = self.flag(Flags::CARRY);

        if self.flag(Flags::SUBTRACT) {
            if carry {
                a = a.wrapping_sub(0x60);
            }
            if self.flag(Flags::HALF_CARRY) {
                a = a.wrapping_sub(0x06);
            }
        } else {
            if carry || a > 0x99 {
                a = a.wrapping_add(0x60);
                carry = true;
            }
            if self.flag(Flags::HALF_CARRY) || (a & 0x0F) > 0x09 {
                a = a.wrapping_add(0x06);
            }
        }

        self.regs.a = a;
        let mut f = self.regs.f & Flags::SUBTRACT;
        f.set(Flags::ZERO, a == 0);
        f.set(Flags::CARRY, carry);
        self.regs.f = f;
    }

    /// Rotate left; bit 7 moves into carry. `through_carry` selects RL
    /// (old carry becomes bit 0) over RLC (bit 7 becomes bit 0).
    pub(super) fn alu_rl(&mut self, value: u8, through_carry: bool, set_zero: bool) -> u8 {
        let carry_out = (value & 0x80) != 0;
        let bit0 = if through_carry {
            self.flag(Flags::CARRY) as u8
        } else {
            value >> 7
        };
        let result = (value << 1) | bit0;

        let mut f = Flags::empty();
        f.set(Flags::ZERO, set_zero && result == 0);
        f.set(Flags::CARRY, carry_out);
        self.regs.f = f;
        result
    }

    /// Rotate right; bit 0 moves into carry.
    pub(super) fn alu_rr(&mut self, value: u8, through_carry: bool, set_zero: bool) -> u8 {
        let carry_out = (value & 0x01) != 0;
        let bit7 = if through_carry {
            (self.flag(Flags::CARRY) as u8) << 7
        } else {
            value << 7
        };
        let result = (value >> 1) | bit7;

        let mut f = Flags::empty();
        f.set(Flags::ZERO, set_zero && result == 0);
        f.set(Flags::CARRY, carry_out);
        self.regs.f = f;
        result
    }

    /// SLA: shift left, bit 7 into carry, bit 0 cleared.
    pub(super) fn alu_sla(&mut self, value: u8) -> u8 {
        let result = value << 1;
        let mut f = Flags::empty();
        f.set(Flags::ZERO, result == 0);
        f.set(Flags::CARRY, (value & 0x80) != 0);
        self.regs.f = f;
        result
    }

    /// SRA: shift right preserving the sign bit, bit 0 into carry.
    pub(super) fn alu_sra(&mut self, value: u8) -> u8 {
        let result = (value >> 1) | (value & 0x80);
        let mut f = Flags::empty();
        f.set(Flags::ZERO, result == 0);
        f.set(Flags::CARRY, (value & 0x01) != 0);
        self.regs.f = f;
        result
    }

    /// SRL: shift right, bit 7 cleared, bit 0 into carry.
    pub(super) fn alu_srl(&mut self, value: u8) -> u8 {
        let result = value >> 1;
        let mut f = Flags::empty();
        f.set(Flags::ZERO, result == 0);
        f.set(Flags::CARRY, (value & 0x01) != 0);
        self.regs.f = f;
        result
    }

    /// SWAP: exchange nibbles, all flags except Z cleared.
    pub(super) fn alu_swap(&mut self, value: u8) -> u8 {
        let result = value.rotate_left(4);
        let mut f = Flags::empty();
        f.set(Flags::ZERO, result == 0);
        self.regs.f = f;
        result
    }
}
