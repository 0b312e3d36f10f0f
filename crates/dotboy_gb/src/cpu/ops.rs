//! Unprefixed opcode dispatch.
//!
//! Decoding leans on the regular structure of the opcode map: the middle
//! quadrants (0x40-0xBF) decode by bit fields, the irregular top and
//! bottom rows are matched individually. Every arm returns its T-cycle
//! cost, including the extra cost of taken conditional branches.

use super::{Bus, Cpu, CpuFault, Flags};

impl Cpu {
    pub(super) fn execute<B: Bus>(&mut self, bus: &mut B, opcode: u8) -> Result<u32, CpuFault> {
        let cycles = match opcode {
            0x00 => 4, // NOP

            0xCB => self.execute_cb(bus),

            // STOP: officially two bytes; the padding byte is fetched and
            // discarded. We model it as a HALT-equivalent low-power state.
            0x10 => {
                let _padding = self.fetch8(bus);
                self.halted = true;
                4
            }

            0x76 => {
                self.halted = true;
                4
            }

            // -- 16-bit loads -------------------------------------------------
            0x01 | 0x11 | 0x21 | 0x31 => {
                let value = self.fetch16(bus);
                self.write_pair_sp(opcode >> 4, value);
                12
            }
            0x08 => {
                // LD (a16), SP
                let addr = self.fetch16(bus);
                bus.write16(addr, self.regs.sp);
                20
            }
            0xF8 => {
                // LD HL, SP+r8
                let offset = self.fetch8(bus) as i8;
                let value = self.alu_sp_offset(offset);
                self.regs.set_hl(value);
                12
            }
            0xF9 => {
                self.regs.sp = self.regs.hl();
                8
            }

            // -- 8-bit loads --------------------------------------------------
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E => {
                let value = self.fetch8(bus);
                let dst = (opcode >> 3) & 0x07;
                self.write_operand(bus, dst, value);
                if dst == 6 {
                    12
                } else {
                    8
                }
            }
            0x40..=0x7F => {
                // LD r, r' (0x76 is HALT, handled above).
                let dst = (opcode >> 3) & 0x07;
                let src = opcode & 0x07;
                let value = self.read_operand(bus, src);
                self.write_operand(bus, dst, value);
                if dst == 6 || src == 6 {
                    8
                } else {
                    4
                }
            }
            0x02 | 0x12 | 0x22 | 0x32 => {
                let addr = self.indirect_address(opcode >> 4);
                bus.write8(addr, self.regs.a);
                8
            }
            0x0A | 0x1A | 0x2A | 0x3A => {
                let addr = self.indirect_address(opcode >> 4);
                self.regs.a = bus.read8(addr);
                8
            }
            0xE0 => {
                // LDH (a8), A
                let offset = self.fetch8(bus);
                bus.write8(0xFF00 | offset as u16, self.regs.a);
                12
            }
            0xF0 => {
                // LDH A, (a8)
                let offset = self.fetch8(bus);
                self.regs.a = bus.read8(0xFF00 | offset as u16);
                12
            }
            0xE2 => {
                bus.write8(0xFF00 | self.regs.c as u16, self.regs.a);
                8
            }
            0xF2 => {
                self.regs.a = bus.read8(0xFF00 | self.regs.c as u16);
                8
            }
            0xEA => {
                let addr = self.fetch16(bus);
                bus.write8(addr, self.regs.a);
                16
            }
            0xFA => {
                let addr = self.fetch16(bus);
                self.regs.a = bus.read8(addr);
                16
            }

            // -- 16-bit inc/dec/add (no flags for inc/dec) --------------------
            0x03 | 0x13 | 0x23 | 0x33 => {
                let pair = opcode >> 4;
                let value = self.read_pair_sp(pair).wrapping_add(1);
                self.write_pair_sp(pair, value);
                8
            }
            0x0B | 0x1B | 0x2B | 0x3B => {
                let pair = opcode >> 4;
                let value = self.read_pair_sp(pair).wrapping_sub(1);
                self.write_pair_sp(pair, value);
                8
            }
            0x09 | 0x19 | 0x29 | 0x39 => {
                let value = self.read_pair_sp(opcode >> 4);
                self.alu_add_hl(value);
                8
            }
            0xE8 => {
                let offset = self.fetch8(bus) as i8;
                self.regs.sp = self.alu_sp_offset(offset);
                16
            }

            // -- 8-bit inc/dec (carry untouched) ------------------------------
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
                let index = (opcode >> 3) & 0x07;
                let value = self.read_operand(bus, index);
                let result = self.alu_inc8(value);
                self.write_operand(bus, index, result);
                if index == 6 {
                    12
                } else {
                    4
                }
            }
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
                let index = (opcode >> 3) & 0x07;
                let value = self.read_operand(bus, index);
                let result = self.alu_dec8(value);
                self.write_operand(bus, index, result);
                if index == 6 {
                    12
                } else {
                    4
                }
            }

            // -- accumulator rotates (Z always cleared) -----------------------
            0x07 | 0x0F | 0x17 | 0x1F => {
                let a = self.regs.a;
                let through_carry = (opcode & 0x10) != 0;
                self.regs.a = if (opcode & 0x08) != 0 {
                    self.alu_rr(a, through_carry, false)
                } else {
                    self.alu_rl(a, through_carry, false)
                };
                4
            }

            // -- 8-bit ALU ----------------------------------------------------
            0x80..=0xBF => {
                let value = self.read_operand(bus, opcode & 0x07);
                self.alu_dispatch((opcode >> 3) & 0x07, value);
                if opcode & 0x07 == 6 {
                    8
                } else {
                    4
                }
            }
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
                let value = self.fetch8(bus);
                self.alu_dispatch((opcode >> 3) & 0x07, value);
                8
            }

            // -- misc accumulator/flag ops ------------------------------------
            0x27 => {
                self.alu_daa();
                4
            }
            0x2F => {
                // CPL: complement A; N and H set, Z and C untouched.
                self.regs.a = !self.regs.a;
                self.regs.f |= Flags::SUBTRACT | Flags::HALF_CARRY;
                4
            }
            0x37 => {
                // SCF
                let mut f = self.regs.f & Flags::ZERO;
                f.insert(Flags::CARRY);
                self.regs.f = f;
                4
            }
            0x3F => {
                // CCF
                let mut f = self.regs.f & (Flags::ZERO | Flags::CARRY);
                f.toggle(Flags::CARRY);
                self.regs.f = f;
                4
            }

            // -- control flow -------------------------------------------------
            0x18 => self.op_jr(bus, true),
            0x20 | 0x28 | 0x30 | 0x38 => {
                let taken = self.condition((opcode >> 3) & 0x03);
                self.op_jr(bus, taken)
            }
            0xC3 => {
                self.regs.pc = self.fetch16(bus);
                16
            }
            0xC2 | 0xCA | 0xD2 | 0xDA => {
                let taken = self.condition((opcode >> 3) & 0x03);
                self.op_jp(bus, taken)
            }
            0xE9 => {
                self.regs.pc = self.regs.hl();
                4
            }
            0xCD => self.op_call(bus, true),
            0xC4 | 0xCC | 0xD4 | 0xDC => {
                let taken = self.condition((opcode >> 3) & 0x03);
                self.op_call(bus, taken)
            }
            0xC9 => {
                self.regs.pc = self.pop16(bus);
                16
            }
            0xC0 | 0xC8 | 0xD0 | 0xD8 => {
                // RET cc: 20 cycles taken, 8 when not.
                if self.condition((opcode >> 3) & 0x03) {
                    self.regs.pc = self.pop16(bus);
                    20
                } else {
                    8
                }
            }
            0xD9 => {
                // RETI: return and restore the master enable flag
                // immediately (no EI-style delay).
                self.regs.pc = self.pop16(bus);
                bus.irq_set_master_enable(true);
                16
            }
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                // RST: call to a fixed address encoded in the opcode.
                let target = (opcode & 0x38) as u16;
                let ret = self.regs.pc;
                self.push16(bus, ret);
                self.regs.pc = target;
                16
            }

            // -- stack --------------------------------------------------------
            0xC5 | 0xD5 | 0xE5 | 0xF5 => {
                let value = self.read_pair_af(opcode >> 4);
                self.push16(bus, value);
                16
            }
            0xC1 | 0xD1 | 0xE1 | 0xF1 => {
                let value = self.pop16(bus);
                self.write_pair_af(opcode >> 4, value);
                12
            }

            // -- interrupt master enable --------------------------------------
            0xF3 => {
                bus.irq_set_master_enable(false);
                self.ime_enable_pending = false;
                self.ime_enable_delay = false;
                4
            }
            0xFB => {
                // EI: takes effect after the next instruction.
                self.ime_enable_pending = true;
                4
            }

            // Opcode holes: no defined behaviour exists, continuing would
            // execute garbage semantics.
            0xD3 | 0xDB | 0xDD | 0xE3 | 0xE4 | 0xEB | 0xEC | 0xED | 0xF4 | 0xFC | 0xFD => {
                let address = self.regs.pc.wrapping_sub(1);
                log::error!(
                    "undefined opcode 0x{opcode:02X} at 0x{address:04X} \
                     (AF=0x{af:04X} BC=0x{bc:04X} DE=0x{de:04X} HL=0x{hl:04X} SP=0x{sp:04X})",
                    af = self.regs.af(),
                    bc = self.regs.bc(),
                    de = self.regs.de(),
                    hl = self.regs.hl(),
                    sp = self.regs.sp,
                );
                return Err(CpuFault::UndefinedOpcode { address, opcode });
            }
        };

        Ok(cycles)
    }

    /// ALU operation select by table index: 0=ADD 1=ADC 2=SUB 3=SBC
    /// 4=AND 5=XOR 6=OR 7=CP.
    fn alu_dispatch(&mut self, index: u8, value: u8) {
        match index & 0x07 {
            0 => self.alu_add(value, false),
            1 => self.alu_add(value, true),
            2 => self.alu_sub(value, false),
            3 => self.alu_sub(value, true),
            4 => self.alu_and(value),
            5 => self.alu_xor(value),
            6 => self.alu_or(value),
            _ => self.alu_cp(value),
        }
    }

    /// Address for the (BC)/(DE)/(HL+)/(HL-) indirect forms, applying the
    /// HL post-increment/post-decrement side effect.
    fn indirect_address(&mut self, row: u8) -> u16 {
        match row & 0x03 {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => {
                let hl = self.regs.hl();
                self.regs.set_hl(hl.wrapping_add(1));
                hl
            }
            _ => {
                let hl = self.regs.hl();
                self.regs.set_hl(hl.wrapping_sub(1));
                hl
            }
        }
    }

    /// Register pair by row index with SP in slot 3 (BC/DE/HL/SP).
    fn read_pair_sp(&self, row: u8) -> u16 {
        match row & 0x03 {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.regs.hl(),
            _ => self.regs.sp,
        }
    }

    fn write_pair_sp(&mut self, row: u8, value: u16) {
        match row & 0x03 {
            0 => self.regs.set_bc(value),
            1 => self.regs.set_de(value),
            2 => self.regs.set_hl(value),
            _ => self.regs.sp = value,
        }
    }

    /// Register pair by row index with AF in slot 3 (PUSH/POP encoding).
    fn read_pair_af(&self, row: u8) -> u16 {
        match row & 0x03 {
            0 => self.regs.bc(),
            1 => self.regs.de(),
            2 => self.regs.hl(),
            _ => self.regs.af(),
        }
    }

    fn write_pair_af(&mut self, row: u8, value: u16) {
        match row & 0x03 {
            0 => self.regs.set_bc(value),
            1 => self.regs.set_de(value),
            2 => self.regs.set_hl(value),
            _ => self.regs.set_af(value),
        }
    }

    /// JR / JR cc: signed displacement relative to the next instruction.
    fn op_jr<B: Bus>(&mut self, bus: &mut B, taken: bool) -> u32 {
        let offset = self.fetch8(bus) as i8;
        if taken {
            self.regs.pc = self.regs.pc.wrapping_add(offset as i16 as u16);
            12
        } else {
            8
        }
    }

    /// JP cc, a16.
    fn op_jp<B: Bus>(&mut self, bus: &mut B, taken: bool) -> u32 {
        let target = self.fetch16(bus);
        if taken {
            self.regs.pc = target;
            16
        } else {
            12
        }
    }

    /// CALL / CALL cc, a16.
    fn op_call<B: Bus>(&mut self, bus: &mut B, taken: bool) -> u32 {
        let target = self.fetch16(bus);
        if taken {
            let ret = self.regs.pc;
            self.push16(bus, ret);
            self.regs.pc = target;
            24
        } else {
            12
        }
    }
}
