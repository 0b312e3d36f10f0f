//! 0xCB-prefixed instructions: rotates, shifts, SWAP and the bit
//! test/set/reset group.

use super::{Bus, Cpu, Flags};

impl Cpu {
    pub(super) fn execute_cb<B: Bus>(&mut self, bus: &mut B) -> u32 {
        let cb = self.fetch8(bus);
        let group = cb >> 6;
        let bit = (cb >> 3) & 0x07;
        let operand = cb & 0x07;
        let memory = operand == 6;

        match group {
            0 => {
                // Rotates and shifts; every variant clears N and H and sets
                // Z from the result.
                let value = self.read_operand(bus, operand);
                let result = match bit {
                    0 => self.alu_rl(value, false, true),  // RLC
                    1 => self.alu_rr(value, false, true),  // RRC
                    2 => self.alu_rl(value, true, true),   // RL
                    3 => self.alu_rr(value, true, true),   // RR
                    4 => self.alu_sla(value),
                    5 => self.alu_sra(value),
                    6 => self.alu_swap(value),
                    _ => self.alu_srl(value),
                };
                self.write_operand(bus, operand, result);
                if memory {
                    16
                } else {
                    8
                }
            }
            1 => {
                // BIT b, r: Z from the inverse of the tested bit, H set,
                // N cleared, carry untouched.
                let value = self.read_operand(bus, operand);
                let mut f = (self.regs.f & Flags::CARRY) | Flags::HALF_CARRY;
                f.set(Flags::ZERO, value & (1 << bit) == 0);
                self.regs.f = f;
                if memory {
                    12
                } else {
                    8
                }
            }
            2 => {
                // RES b, r: no flags.
                let value = self.read_operand(bus, operand);
                self.write_operand(bus, operand, value & !(1 << bit));
                if memory {
                    16
                } else {
                    8
                }
            }
            _ => {
                // SET b, r: no flags.
                let value = self.read_operand(bus, operand);
                self.write_operand(bus, operand, value | (1 << bit));
                if memory {
                    16
                } else {
                    8
                }
            }
        }
    }
}
