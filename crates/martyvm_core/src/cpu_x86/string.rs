/*
    MartyVM
    https://github.com/dbalsom/martyvm

    Copyright 2022-2025 Daniel Balsom

    Permission is hereby granted, free of charge, to any person obtaining a
    copy of this software and associated documentation files (the “Software”),
    to deal in the Software without restriction, including without limitation
    the rights to use, copy, modify, merge, publish, distribute, sublicense,
    and/or sell copies of the Software, and to permit persons to whom the
    Software is furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in
    all copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED “AS IS”, WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING
    FROM, OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
    DEALINGS IN THE SOFTWARE.

    ---------------------------------------------------------------------------

    cpu_x86::string.rs

    String move/compare/scan/load/store with REP/REPE/REPNE. Pointer and
    count registers commit after each completed iteration, so a fault in
    the middle of a repeated operation leaves the architecturally correct
    partial state: the VM engine re-enters the same instruction and the
    remaining iterations continue where they stopped.

    Source operands honor a segment override; the destination is always
    ES:DI - that rule is applied here, not in the address resolver.

*/

#![allow(dead_code)]

use crate::{
    bus::Bus,
    cpu_common::{alu::Xi, CpuError, ExecutionResult, InstructionWidth, Mnemonic, Register64, Segment},
    cpu_x86::{CpuX86, Flag},
};

// Register file indices for the implicit string registers.
const REG_CX: u8 = 1;
const REG_SI: u8 = 6;
const REG_DI: u8 = 7;

impl CpuX86 {
    fn string_width(&self) -> InstructionWidth {
        use Mnemonic::*;
        match self.i.mnemonic {
            MOVSB | CMPSB | STOSB | LODSB | SCASB => InstructionWidth::Byte,
            MOVSW | CMPSW | STOSW | LODSW | SCASW => InstructionWidth::Word,
            MOVSD | CMPSD | STOSD | LODSD | SCASD => InstructionWidth::Dword,
            _ => InstructionWidth::Qword,
        }
    }

    #[inline]
    fn string_step(&self, width: InstructionWidth) -> i64 {
        if self.get_flag(Flag::Direction) {
            -(width.bytes() as i64)
        }
        else {
            width.bytes() as i64
        }
    }

    #[inline]
    fn advance_index(&mut self, idx: u8, step: i64) {
        let size = self.i.address_size;
        let v = self.regs.read_idx(idx, size).wrapping_add(step as u64) & size.mask();
        self.regs.write_idx(idx, size, v);
    }

    fn source_segment(&self) -> Segment {
        self.i.segment_override.unwrap_or(Segment::DS)
    }

    fn src_linear(&self) -> u64 {
        let si = self.regs.read_idx(REG_SI, self.i.address_size);
        self.linear(self.source_segment(), si)
    }

    fn dst_linear(&self) -> u64 {
        let di = self.regs.read_idx(REG_DI, self.i.address_size);
        self.linear(Segment::ES, di)
    }

    /// Execute a string operation, including any REP prefix, synchronously.
    /// One non-repeated iteration runs when no REP prefix is present.
    pub(crate) fn string_op(&mut self, bus: &mut dyn Bus) -> Result<ExecutionResult, CpuError> {
        use Mnemonic::*;
        let width = self.string_width();
        let step = self.string_step(width);
        let counted = self.i.has_rep();
        // REPNE only terminates the compare/scan family early; REP on
        // MOVS/STOS/LODS is a plain count.
        let scan_family = matches!(self.i.mnemonic, CMPSB | CMPSW | CMPSD | CMPSQ | SCASB | SCASW | SCASD | SCASQ);

        loop {
            if counted {
                let cx = self.regs.read_idx(REG_CX, self.i.address_size);
                if cx == 0 {
                    break;
                }
            }

            match self.i.mnemonic {
                MOVSB | MOVSW | MOVSD | MOVSQ => {
                    let value = bus.read(self.src_linear(), width)?;
                    bus.write(self.dst_linear(), width, value)?;
                    self.advance_index(REG_SI, step);
                    self.advance_index(REG_DI, step);
                }
                STOSB | STOSW | STOSD | STOSQ => {
                    let value = self.regs.read_g64(Register64::RAX) & width.mask();
                    bus.write(self.dst_linear(), width, value)?;
                    self.advance_index(REG_DI, step);
                }
                LODSB | LODSW | LODSD | LODSQ => {
                    let value = bus.read(self.src_linear(), width)?;
                    self.store_accumulator(value, width);
                    self.advance_index(REG_SI, step);
                }
                SCASB | SCASW | SCASD | SCASQ => {
                    let memory = bus.read(self.dst_linear(), width)?;
                    let acc = self.regs.read_g64(Register64::RAX) & width.mask();
                    let saved_width = self.i.width;
                    self.i.width = width;
                    self.alu_op(Xi::CMP, acc, memory);
                    self.i.width = saved_width;
                    self.advance_index(REG_DI, step);
                }
                CMPSB | CMPSW | CMPSD | CMPSQ => {
                    let src = bus.read(self.src_linear(), width)?;
                    let dst = bus.read(self.dst_linear(), width)?;
                    let saved_width = self.i.width;
                    self.i.width = width;
                    self.alu_op(Xi::CMP, src, dst);
                    self.i.width = saved_width;
                    self.advance_index(REG_SI, step);
                    self.advance_index(REG_DI, step);
                }
                other => panic!("string_op(): non-string mnemonic {:?}", other),
            }

            if !counted {
                break;
            }

            let cx = self
                .regs
                .read_idx(REG_CX, self.i.address_size)
                .wrapping_sub(1)
                & self.i.address_size.mask();
            self.regs.write_idx(REG_CX, self.i.address_size, cx);

            if scan_family {
                // REPE continues while ZF, REPNE while !ZF.
                let zf = self.get_flag(Flag::Zero);
                if self.i.has_repne() {
                    if zf {
                        break;
                    }
                }
                else if !zf {
                    break;
                }
            }
        }

        Ok(ExecutionResult::Okay)
    }

    /// Store a loaded value into the accumulator at the string width,
    /// honoring the usual partial-register write rules.
    fn store_accumulator(&mut self, value: u64, width: InstructionWidth) {
        use crate::cpu_common::{Register16, Register32, Register8};
        match width {
            InstructionWidth::Byte => self.regs.write_g8(Register8::AL, value as u8),
            InstructionWidth::Word => self.regs.write_g16(Register16::AX, value as u16),
            InstructionWidth::Dword => self.regs.write_g32(Register32::EAX, value as u32),
            InstructionWidth::Qword => self.regs.write_g64(Register64::RAX, value),
        }
    }
}
