//! The W65C02S instruction set (everything below PC 0x6000 — the traps
//! above it are [`crate::traps`]'s job). One [`System::execute_opcode`]
//! call runs exactly one instruction: resolve the addressing mode, read
//! the operand (unless the mode is store-only), do the op, write back if
//! the op produced a new operand value.
//!
//! Flags aren't read from or written to `regs.p` on every instruction.
//! [`cpu::unpack_flags`] loads live `Flags` once at the top of
//! [`System::execute_opcode`]; [`cpu::pack_flags`] folds them back in
//! before returning, the same convention the addressing/arithmetic core
//! in [`crate::cpu`] was built around.

use crate::cpu::{self, AddrMode, Flags};
use crate::error::{EmuError, Result};
use crate::system::{StepOutcome, System};

/// Where an instruction's operand lives. Distinct from [`AddrMode`]: this
/// is the *resolved* location (a register or a concrete address), not the
/// encoding that produced it.
#[derive(Clone, Copy)]
enum Operand {
    None,
    Acc,
    RegX,
    RegY,
    Imm(u8),
    Addr(u16),
}

impl System {
    pub(crate) fn fetch_u8(&mut self) -> u8 {
        let b = self.ram[self.regs.pc as usize];
        self.regs.pc = self.regs.pc.wrapping_add(1);
        b
    }

    fn fetch_u16(&mut self) -> u16 {
        let lo = self.fetch_u8() as u16;
        let hi = self.fetch_u8() as u16;
        lo | hi << 8
    }

    fn fetch_i8(&mut self) -> i8 {
        self.fetch_u8() as i8
    }

    /// Computes the operand location for every mode except `Rel`/`ZpRel`,
    /// which the branch-family opcodes resolve inline (a relative offset
    /// isn't a location at all). Zero-page pointer dereferences read
    /// `ram` directly through [`System::zp_ptr16`], bypassing the
    /// memory-mapped read-effect switch exactly as the pointer bytes
    /// themselves always do.
    fn resolve(&mut self, mode: AddrMode) -> Operand {
        use AddrMode::*;
        match mode {
            Nul => Operand::None,
            Imm => Operand::Imm(self.fetch_u8()),
            Acc => Operand::Acc,
            XReg => Operand::RegX,
            YReg => Operand::RegY,
            Zp => Operand::Addr(self.fetch_u8() as u16),
            ZpX => Operand::Addr(self.fetch_u8().wrapping_add(self.regs.x) as u16),
            ZpY => Operand::Addr(self.fetch_u8().wrapping_add(self.regs.y) as u16),
            ZpInd => {
                let zp = self.fetch_u8();
                Operand::Addr(self.zp_ptr16(zp))
            }
            ZpXInd => {
                let zp = self.fetch_u8().wrapping_add(self.regs.x);
                Operand::Addr(self.zp_ptr16(zp))
            }
            ZpIndY => {
                let zp = self.fetch_u8();
                let base = self.zp_ptr16(zp);
                Operand::Addr(base.wrapping_add(self.regs.y as u16))
            }
            Abs => Operand::Addr(self.fetch_u16()),
            AbsX => {
                let base = self.fetch_u16();
                Operand::Addr(base.wrapping_add(self.regs.x as u16))
            }
            AbsY => {
                let base = self.fetch_u16();
                Operand::Addr(base.wrapping_add(self.regs.y as u16))
            }
            Rel | ZpRel => Operand::None,
        }
    }

    /// Reads the operand. `is_store` opcodes never read theirs — the
    /// memory-mapped read side effects (button polling, flash status
    /// bits) must not fire for a plain store.
    fn load(&mut self, operand: Operand, is_store: bool) -> u8 {
        if is_store {
            return 0;
        }
        match operand {
            Operand::None => 0,
            Operand::Acc => self.regs.a,
            Operand::RegX => self.regs.x,
            Operand::RegY => self.regs.y,
            Operand::Imm(v) => v,
            Operand::Addr(addr) => self.mem_read(addr),
        }
    }

    /// Writes the operand back. Unlike `load`, this always runs — the
    /// memory-mapped write side effects (flash protocol, power-off,
    /// display-off) apply to every write-back regardless of addressing
    /// mode, store opcode or read-modify-write alike.
    fn store(&mut self, operand: Operand, value: u8) -> Result<()> {
        match operand {
            Operand::Acc => self.regs.a = value,
            Operand::RegX => self.regs.x = value,
            Operand::RegY => self.regs.y = value,
            Operand::Addr(addr) => self.mem_write(addr, value)?,
            Operand::None | Operand::Imm(_) => {}
        }
        Ok(())
    }

    /// Reads the word at `addr`/`addr+1` the way `JMP (a)`/`JMP (a,x)` do:
    /// the low byte goes through the normal read-effect switch (it's the
    /// instruction's one resolved address), the high byte is a raw
    /// adjacent read that never triggers anything.
    fn read_indirect_jmp_target(&mut self, addr: u16) -> u16 {
        let lo = self.mem_read(addr) as u16;
        let hi = self.ram[addr.wrapping_add(1) as usize] as u16;
        lo | hi << 8
    }

    pub(crate) fn execute_opcode(&mut self, op: u8, pc: u16) -> Result<StepOutcome> {
        let mut f = cpu::unpack_flags(self.regs.p);

        match op {
            0x10 | 0x30 | 0x50 | 0x70 | 0x80 | 0x90 | 0xb0 | 0xd0 | 0xf0 => {
                let offset = self.fetch_i8();
                let taken = match op {
                    0x10 => !f.negative(),
                    0x30 => f.negative(),
                    0x50 => !f.overflow(),
                    0x70 => f.overflow(),
                    0x80 => true,
                    0x90 => !f.carry(),
                    0xb0 => f.carry(),
                    0xd0 => !f.zero(),
                    0xf0 => f.zero(),
                    _ => unreachable!(),
                };
                if taken {
                    self.regs.pc = self.regs.pc.wrapping_add(offset as i16 as u16);
                }
                return Ok(StepOutcome::Continue);
            }

            0x0f | 0x1f | 0x2f | 0x3f | 0x4f | 0x5f | 0x6f | 0x7f | 0x8f | 0x9f | 0xaf | 0xbf
            | 0xcf | 0xdf | 0xef | 0xff => {
                let zp = self.fetch_u8();
                let value = self.mem_read(zp as u16);
                let offset = self.fetch_i8();
                let bit = (value >> (op >> 4 & 7)) & 1;
                if (bit != 0) == (op & 0x80 != 0) {
                    self.regs.pc = self.regs.pc.wrapping_add(offset as i16 as u16);
                }
                return Ok(StepOutcome::Continue);
            }

            0x20 => {
                // JSR: the return address pushed is the address of the high
                // byte of the target, not the next instruction — RTS adds 1.
                let lo = self.fetch_u8();
                let ret = self.regs.pc;
                self.push8((ret >> 8) as u8);
                self.push8(ret as u8);
                let hi = self.fetch_u8();
                self.regs.pc = lo as u16 | (hi as u16) << 8;
                return Ok(StepOutcome::Continue);
            }

            0x4c => {
                self.regs.pc = self.fetch_u16();
                return Ok(StepOutcome::Continue);
            }

            0x6c | 0x7c => {
                let base = self.fetch_u16();
                let addr =
                    if op == 0x7c { base.wrapping_add(self.regs.x as u16) } else { base };
                self.regs.pc = self.read_indirect_jmp_target(addr);
                return Ok(StepOutcome::Continue);
            }

            0x40 => {
                let p = self.pop8();
                self.regs.p = p;
                let lo = self.pop8() as u16;
                let hi = self.pop8() as u16;
                self.regs.pc = lo | hi << 8;
                return Ok(StepOutcome::Continue);
            }

            0x60 => {
                self.synthetic_rts();
                return Ok(StepOutcome::Continue);
            }

            0x08 => {
                let packed = cpu::pack_flags(self.regs.p, &f);
                self.push8(packed);
                return Ok(StepOutcome::Continue);
            }
            0x28 => {
                let p = self.pop8();
                self.regs.p = p;
                return Ok(StepOutcome::Continue);
            }

            0x18 => f.cflag = 0,
            0x38 => f.cflag = 0x100,
            0x58 => self.regs.p &= !cpu::MASK_I,
            0x78 => self.regs.p |= cpu::MASK_I,
            0xb8 => f.vflag = 0,
            0xd8 => self.regs.p &= !cpu::MASK_D,
            0xf8 => self.regs.p |= cpu::MASK_D,

            0xea => {}

            0xcb => {
                self.keys |= crate::input::FLAG_WAI;
                self.regs.p = cpu::pack_flags(self.regs.p, &f);
                return Ok(StepOutcome::FrameDone);
            }

            0x00 => return Err(EmuError::Break { pc }),
            0xdb => return Err(EmuError::Stop { pc }),

            _ => {
                let (mode, is_store) = cpu::addr_mode(op);
                let operand = self.resolve(mode);
                let t_in = self.load(operand, is_store);

                match op {
                    // ASL
                    0x06 | 0x0e | 0x16 | 0x1e | 0x0a => {
                        let t = (t_in as u32) << 1;
                        f.set_nz(t as u8);
                        f.cflag = t;
                        self.store(operand, t as u8)?;
                    }
                    // ROL
                    0x26 | 0x2e | 0x36 | 0x3e | 0x2a => {
                        let t = (t_in as u32) << 1 | (f.cflag >> 8 & 1);
                        f.set_nz(t as u8);
                        f.cflag = t;
                        self.store(operand, t as u8)?;
                    }
                    // LSR
                    0x46 | 0x4e | 0x56 | 0x5e | 0x4a => {
                        let full = t_in as u32;
                        f.cflag = (full & 1) << 8;
                        let t = full >> 1;
                        f.set_nz(t as u8);
                        self.store(operand, t as u8)?;
                    }
                    // ROR
                    0x66 | 0x6e | 0x76 | 0x7e | 0x6a => {
                        let mut full = t_in as u32;
                        full |= f.cflag & 0x100;
                        f.cflag = (full & 1) << 8;
                        let t = full >> 1;
                        f.set_nz(t as u8);
                        self.store(operand, t as u8)?;
                    }
                    // DEC / DEY / DEX
                    0xc6 | 0xce | 0xd6 | 0xde | 0x3a | 0x88 | 0xca => {
                        let t = t_in.wrapping_sub(1);
                        f.set_nz(t);
                        self.store(operand, t)?;
                    }
                    // INC / INY / INX
                    0xe6 | 0xee | 0xf6 | 0xfe | 0x1a | 0xc8 | 0xe8 => {
                        let t = t_in.wrapping_add(1);
                        f.set_nz(t);
                        self.store(operand, t)?;
                    }
                    // BIT (memory and immediate alike)
                    0x24 | 0x2c | 0x34 | 0x3c | 0x89 => {
                        f.zflag = t_in & self.regs.a;
                        f.nflag = t_in as i8;
                        f.vflag = ((t_in as i32) << 1) as i8;
                    }
                    // TSB
                    0x04 | 0x0c => {
                        let a = self.regs.a;
                        f.zflag = t_in & a;
                        self.store(operand, t_in | a)?;
                    }
                    // TRB
                    0x14 | 0x1c => {
                        let a = self.regs.a;
                        f.zflag = t_in & a;
                        self.store(operand, t_in & !a)?;
                    }
                    // RMBn
                    0x07 | 0x17 | 0x27 | 0x37 | 0x47 | 0x57 | 0x67 | 0x77 => {
                        self.store(operand, t_in & !(1 << (op >> 4 & 7)))?;
                    }
                    // SMBn
                    0x87 | 0x97 | 0xa7 | 0xb7 | 0xc7 | 0xd7 | 0xe7 | 0xf7 => {
                        self.store(operand, t_in | 1 << (op >> 4 & 7))?;
                    }
                    // ORA
                    0x01 | 0x05 | 0x09 | 0x0d | 0x11 | 0x12 | 0x15 | 0x19 | 0x1d => {
                        self.regs.a |= t_in;
                        f.set_nz(self.regs.a);
                    }
                    // AND
                    0x21 | 0x25 | 0x29 | 0x2d | 0x31 | 0x32 | 0x35 | 0x39 | 0x3d => {
                        self.regs.a &= t_in;
                        f.set_nz(self.regs.a);
                    }
                    // EOR
                    0x41 | 0x45 | 0x49 | 0x4d | 0x51 | 0x52 | 0x55 | 0x59 | 0x5d => {
                        self.regs.a ^= t_in;
                        f.set_nz(self.regs.a);
                    }
                    // ADC
                    0x61 | 0x65 | 0x69 | 0x6d | 0x71 | 0x72 | 0x75 | 0x79 | 0x7d => {
                        let decimal = self.regs.p & cpu::MASK_D != 0;
                        let r = cpu::adc(self.regs.a, t_in, f.carry(), decimal, false);
                        self.regs.a = r.result;
                        f.cflag = r.carry;
                        f.vflag = r.overflow;
                        f.set_nz(r.result);
                    }
                    // SBC
                    0xe1 | 0xe5 | 0xe9 | 0xed | 0xf1 | 0xf2 | 0xf5 | 0xf9 | 0xfd => {
                        let decimal = self.regs.p & cpu::MASK_D != 0;
                        let r = cpu::adc(self.regs.a, t_in, f.carry(), decimal, true);
                        self.regs.a = r.result;
                        f.cflag = r.carry;
                        f.vflag = r.overflow;
                        f.set_nz(r.result);
                    }
                    // STZ
                    0x64 | 0x74 | 0x9c | 0x9e => self.store(operand, 0)?,
                    // STY
                    0x84 | 0x8c | 0x94 => self.store(operand, self.regs.y)?,
                    // STX
                    0x86 | 0x8e | 0x96 => self.store(operand, self.regs.x)?,
                    // STA
                    0x81 | 0x85 | 0x8d | 0x91 | 0x92 | 0x95 | 0x99 | 0x9d => {
                        self.store(operand, self.regs.a)?
                    }
                    // LDY
                    0xa0 | 0xa4 | 0xac | 0xb4 | 0xbc => {
                        self.regs.y = t_in;
                        f.set_nz(t_in);
                    }
                    // LDX
                    0xa2 | 0xa6 | 0xae | 0xb6 | 0xbe => {
                        self.regs.x = t_in;
                        f.set_nz(t_in);
                    }
                    // LDA
                    0xa1 | 0xa5 | 0xa9 | 0xad | 0xb1 | 0xb2 | 0xb5 | 0xb9 | 0xbd => {
                        self.regs.a = t_in;
                        f.set_nz(t_in);
                    }
                    // CPY
                    0xc0 | 0xc4 | 0xcc => {
                        let t = self.regs.y as i32 - t_in as i32;
                        f.cflag = (t + 0x100) as u32;
                        f.set_nz(t as u8);
                    }
                    // CPX
                    0xe0 | 0xe4 | 0xec => {
                        let t = self.regs.x as i32 - t_in as i32;
                        f.cflag = (t + 0x100) as u32;
                        f.set_nz(t as u8);
                    }
                    // CMP
                    0xc1 | 0xc5 | 0xc9 | 0xcd | 0xd1 | 0xd2 | 0xd5 | 0xd9 | 0xdd => {
                        let t = self.regs.a as i32 - t_in as i32;
                        f.cflag = (t + 0x100) as u32;
                        f.set_nz(t as u8);
                    }
                    // TXA / TYA / TXS / TAY / TAX / TSX
                    0x8a => {
                        self.regs.a = self.regs.x;
                        f.set_nz(self.regs.a);
                    }
                    0x98 => {
                        self.regs.a = self.regs.y;
                        f.set_nz(self.regs.a);
                    }
                    0x9a => self.regs.sp = self.regs.x,
                    0xa8 => {
                        self.regs.y = self.regs.a;
                        f.set_nz(self.regs.y);
                    }
                    0xaa => {
                        self.regs.x = self.regs.a;
                        f.set_nz(self.regs.x);
                    }
                    0xba => {
                        self.regs.x = self.regs.sp;
                        f.set_nz(self.regs.x);
                    }
                    // PHA / PHY / PHX
                    0x48 | 0x5a | 0xda => self.push8(t_in),
                    // PLA / PLY / PLX. The reference firmware's interpreter
                    // doesn't touch N/Z here (only the trace-build variant
                    // reads the popped byte at all) — kept faithfully.
                    0x68 | 0x7a | 0xfa => {
                        let v = self.pop8();
                        self.store(operand, v)?;
                    }
                    _ => {
                        self.regs.p = cpu::pack_flags(self.regs.p, &f);
                        return Err(EmuError::UndefinedOpcode { opcode: op, pc });
                    }
                }
            }
        }

        self.regs.p = cpu::pack_flags(self.regs.p, &f);
        Ok(StepOutcome::Continue)
    }
}
