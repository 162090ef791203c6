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

    cpu_x86::execute.rs

    Turns a decoded Instruction into architectural effects. One exhaustive
    match over the closed mnemonic set - no function pointers - with all
    operand traffic routed through the fetch/store abstraction in ops.rs.
    Anything whose side effects exceed the inline model hands off to the
    execution delegate after operand decode.

*/

#![allow(dead_code)]

use crate::{
    bus::Bus,
    cpu_common::{
        alu::Xi,
        services::{DelegateAction, ExecutionDelegate, FarTarget},
        CpuError,
        CpuException,
        CpuMode,
        ExecutionResult,
        InstructionWidth,
        Mnemonic,
        OperandSize,
        OperandType,
        Register16,
        Register32,
        Register64,
        Register8,
        Segment,
    },
    cpu_x86::{
        ops::OperandAccess,
        registers::FLAG_DEFAULT,
        CpuX86,
        Flag,
        CPU_FLAG_AUX_CARRY,
        CPU_FLAG_CARRY,
        CPU_FLAG_PARITY,
        CPU_FLAG_SIGN,
        CPU_FLAG_ZERO,
    },
};

// Flags SAHF/LAHF traffic in.
const LAHF_MASK: u32 = CPU_FLAG_SIGN | CPU_FLAG_ZERO | CPU_FLAG_AUX_CARRY | CPU_FLAG_PARITY | CPU_FLAG_CARRY;

impl CpuX86 {
    /* -------------------------- Operand traffic ------------------------- */

    pub(crate) fn read_operand(&mut self, bus: &mut dyn Bus, operand: OperandType) -> Result<u64, CpuError> {
        let loc = self.resolve_operand(operand, false);
        loc.fetch(self, bus)
    }

    pub(crate) fn write_operand(
        &mut self,
        bus: &mut dyn Bus,
        operand: OperandType,
        value: u64,
    ) -> Result<(), CpuError> {
        let loc = self.resolve_operand(operand, true);
        loc.commit(self, bus, value)
    }

    /// Width in bits of a resolved operand descriptor (for the widening
    /// moves, which read narrower than the instruction width).
    fn operand_bits(&self, operand: OperandType) -> u32 {
        match operand {
            OperandType::Register8(_) | OperandType::Immediate8(_) | OperandType::Immediate8s(_) => 8,
            OperandType::Register16(_) | OperandType::Immediate16(_) => 16,
            OperandType::Register32(_) | OperandType::Immediate32(_) => 32,
            OperandType::Register64(_) | OperandType::Immediate64(_) => 64,
            OperandType::AddressingMode(_, size) => InstructionWidth::from(size).bits(),
            _ => self.i.width.bits(),
        }
    }

    /* ------------------------- Branch utilities ------------------------- */

    #[inline]
    fn ip_mask(&self) -> u64 {
        match self.i.operand_size {
            OperandSize::Operand16 => 0xFFFF,
            OperandSize::Operand32 => 0xFFFF_FFFF,
            _ => u64::MAX,
        }
    }

    fn relative_target(&self) -> u64 {
        let next = self.regs.rip.wrapping_add(self.i.size as u64);
        let disp = match self.i.operand1_type {
            OperandType::Relative8(d) => d as i64,
            OperandType::Relative16(d) => d as i64,
            OperandType::Relative32(d) => d as i64,
            _ => 0,
        };
        next.wrapping_add(disp as u64) & self.ip_mask()
    }

    fn condition(&self, mnemonic: Mnemonic) -> bool {
        use Mnemonic::*;
        let cf = self.get_flag(Flag::Carry);
        let zf = self.get_flag(Flag::Zero);
        let sf = self.get_flag(Flag::Sign);
        let of = self.get_flag(Flag::Overflow);
        let pf = self.get_flag(Flag::Parity);
        match mnemonic {
            JO | SETO | CMOVO => of,
            JNO | SETNO | CMOVNO => !of,
            JB | SETB | CMOVB => cf,
            JNB | SETNB | CMOVNB => !cf,
            JZ | SETZ | CMOVZ => zf,
            JNZ | SETNZ | CMOVNZ => !zf,
            JBE | SETBE | CMOVBE => cf || zf,
            JNBE | SETNBE | CMOVNBE => !cf && !zf,
            JS | SETS | CMOVS => sf,
            JNS | SETNS | CMOVNS => !sf,
            JP | SETP | CMOVP => pf,
            JNP | SETNP | CMOVNP => !pf,
            JL | SETL | CMOVL => sf != of,
            JNL | SETNL | CMOVNL => sf == of,
            JLE | SETLE | CMOVLE => zf || (sf != of),
            JNLE | SETNLE | CMOVNLE => !zf && (sf == of),
            _ => false,
        }
    }

    /* ------------------------------ Dispatch ---------------------------- */

    pub(crate) fn execute_instruction(
        &mut self,
        bus: &mut dyn Bus,
        delegate: &mut dyn ExecutionDelegate,
    ) -> Result<ExecutionResult, CpuError> {
        use Mnemonic::*;

        let op1 = self.i.operand1_type;
        let op2 = self.i.operand2_type;
        let op3 = self.i.operand3_type;

        match self.i.mnemonic {
            NOP => Ok(ExecutionResult::Okay),

            /* Common binary ALU path: fetch, reference, helper, commit. */
            ADD | ADC | SUB | SBB | AND | OR | XOR | CMP | TEST => {
                let xi = self.i.xi.expect("ALU mnemonic without Xi");
                let writes = !matches!(self.i.mnemonic, CMP | TEST);
                let dst = self.resolve_operand(op1, writes);
                let dst_val = if writes && dst.is_memory() {
                    dst.fetch_rmw(self, bus)?
                }
                else {
                    dst.fetch(self, bus)?
                };
                let src_val = self.read_operand(bus, op2)?;
                let result = self.alu_op(xi, dst_val, src_val);
                if writes {
                    dst.commit(self, bus, result)?;
                }
                Ok(ExecutionResult::Okay)
            }

            /* Unary ALU (group forms and short INC/DEC). */
            INC | DEC | NOT | NEG => {
                let xi = self.i.xi.expect("unary mnemonic without Xi");
                let dst = self.resolve_operand(op1, true);
                let dst_val = if dst.is_memory() {
                    dst.fetch_rmw(self, bus)?
                }
                else {
                    dst.fetch(self, bus)?
                };
                let result = self.alu_op(xi, dst_val, 0);
                dst.commit(self, bus, result)?;
                Ok(ExecutionResult::Okay)
            }

            /* Shift/rotate family. */
            ROL | ROR | RCL | RCR | SHL | SHR | SAL | SAR => {
                let xi = self.i.xi.expect("shift mnemonic without Xi");
                let dst = self.resolve_operand(op1, true);
                let dst_val = if dst.is_memory() {
                    dst.fetch_rmw(self, bus)?
                }
                else {
                    dst.fetch(self, bus)?
                };
                let count = self.read_operand(bus, op2)?;
                let result = self.shift_op(xi, dst_val, count);
                dst.commit(self, bus, result)?;
                Ok(ExecutionResult::Okay)
            }

            SHLD | SHRD => {
                let left = self.i.mnemonic == SHLD;
                let dst = self.resolve_operand(op1, true);
                let dst_val = if dst.is_memory() {
                    dst.fetch_rmw(self, bus)?
                }
                else {
                    dst.fetch(self, bus)?
                };
                let src = self.read_operand(bus, op2)?;
                let count = self.read_operand(bus, op3)?;
                let (result, store) = self.shift_double_op(left, dst_val, src, count);
                if store {
                    dst.commit(self, bus, result)?;
                }
                Ok(ExecutionResult::Okay)
            }

            MOV => match (op1, op2) {
                (OperandType::SegmentRegister(seg), _) => {
                    // MOV to CS has no legal encoding.
                    if seg == Segment::CS {
                        return Err(CpuError::Exception(CpuException::InvalidOpcode));
                    }
                    let selector = self.read_operand(bus, op2)? as u16;
                    self.load_segment(bus, delegate, seg, selector)
                }
                (_, OperandType::SegmentRegister(seg)) => {
                    let selector = self.regs.segment(seg);
                    self.write_operand(bus, op1, selector as u64)?;
                    Ok(ExecutionResult::Okay)
                }
                (OperandType::ControlRegister(_), _)
                | (OperandType::DebugRegister(_), _)
                | (_, OperandType::ControlRegister(_))
                | (_, OperandType::DebugRegister(_)) => {
                    let i = self.i;
                    match delegate.system_op(&i)? {
                        DelegateAction::Unhandled => Ok(ExecutionResult::NotImplemented(MOV)),
                        _ => Ok(ExecutionResult::Delegated),
                    }
                }
                _ => {
                    let value = self.read_operand(bus, op2)?;
                    self.write_operand(bus, op1, value)?;
                    Ok(ExecutionResult::Okay)
                }
            },

            MOVZX => {
                let value = self.read_operand(bus, op2)?;
                self.write_operand(bus, op1, value)?;
                Ok(ExecutionResult::Okay)
            }

            MOVSX | MOVSXD => {
                let bits = self.operand_bits(op2);
                let value = self.read_operand(bus, op2)?;
                let shift = 64 - bits;
                let extended = ((value << shift) as i64 >> shift) as u64 & self.i.width.mask();
                self.write_operand(bus, op1, extended)?;
                Ok(ExecutionResult::Okay)
            }

            LEA => {
                let amode = match op2 {
                    OperandType::AddressingMode(amode, _) => amode,
                    _ => return Err(CpuError::Exception(CpuException::InvalidOpcode)),
                };
                let (_, offset) = self.calc_effective_address(&amode);
                self.write_operand(bus, op1, offset & self.i.width.mask())?;
                Ok(ExecutionResult::Okay)
            }

            XCHG => {
                let a = self.resolve_operand(op1, true);
                let b = self.resolve_operand(op2, true);
                // XCHG with memory is implicitly locked on real silicon;
                // the memory side maps for write either way.
                let a_val = if a.is_memory() { a.fetch_rmw(self, bus)? } else { a.fetch(self, bus)? };
                let b_val = if b.is_memory() { b.fetch_rmw(self, bus)? } else { b.fetch(self, bus)? };
                a.commit(self, bus, b_val)?;
                b.commit(self, bus, a_val)?;
                Ok(ExecutionResult::Okay)
            }

            XLAT => {
                let table = self.regs.read_idx(3, self.i.address_size);
                let al = self.regs.read_g8(Register8::AL) as u64;
                let seg = self.i.segment_override.unwrap_or(Segment::DS);
                let addr = table.wrapping_add(al) & self.i.address_size.mask();
                let value = bus.read(self.linear(seg, addr), InstructionWidth::Byte)?;
                self.regs.write_g8(Register8::AL, value as u8);
                Ok(ExecutionResult::Okay)
            }

            /* Sign/zero extension of the accumulator. */
            CBW => {
                let al = self.regs.read_g8(Register8::AL) as i8;
                self.regs.write_g16(Register16::AX, al as i16 as u16);
                Ok(ExecutionResult::Okay)
            }
            CWDE => {
                let ax = self.regs.read_g16(Register16::AX) as i16;
                self.regs.write_g32(Register32::EAX, ax as i32 as u32);
                Ok(ExecutionResult::Okay)
            }
            CDQE => {
                let eax = self.regs.read_g32(Register32::EAX) as i32;
                self.regs.write_g64(Register64::RAX, eax as i64 as u64);
                Ok(ExecutionResult::Okay)
            }
            CWD => {
                let ax = self.regs.read_g16(Register16::AX) as i16;
                self.regs.write_g16(Register16::DX, if ax < 0 { 0xFFFF } else { 0 });
                Ok(ExecutionResult::Okay)
            }
            CDQ => {
                let eax = self.regs.read_g32(Register32::EAX) as i32;
                self.regs.write_g32(Register32::EDX, if eax < 0 { 0xFFFF_FFFF } else { 0 });
                Ok(ExecutionResult::Okay)
            }
            CQO => {
                let rax = self.regs.read_g64(Register64::RAX) as i64;
                self.regs.write_g64(Register64::RDX, if rax < 0 { u64::MAX } else { 0 });
                Ok(ExecutionResult::Okay)
            }

            /* Multiply / divide. */
            MUL | IMUL if matches!(op2, OperandType::NoOperand) => {
                let operand = self.read_operand(bus, op1)?;
                self.mul_op(self.i.mnemonic == IMUL, operand);
                Ok(ExecutionResult::Okay)
            }
            IMUL => {
                // Two- and three-operand forms.
                let a = self.read_operand(bus, op2)?;
                let b = if matches!(op3, OperandType::NoOperand) {
                    self.read_operand(bus, op1)?
                }
                else {
                    self.read_operand(bus, op3)?
                };
                let result = self.imul_general(a, b);
                self.write_operand(bus, op1, result)?;
                Ok(ExecutionResult::Okay)
            }
            DIV | IDIV => {
                let operand = self.read_operand(bus, op1)?;
                match self.div_op(self.i.mnemonic == IDIV, operand) {
                    Ok(()) => Ok(ExecutionResult::Okay),
                    Err(e) => Err(CpuError::Exception(e)),
                }
            }

            /* Stack operations. */
            PUSH => {
                let width = self.i.width;
                let value = match op1 {
                    OperandType::SegmentRegister(seg) => self.regs.segment(seg) as u64,
                    other => self.read_operand(bus, other)?,
                };
                self.push_value(bus, value, width)?;
                Ok(ExecutionResult::Okay)
            }
            POP => {
                let width = self.i.width;
                let value = self.pop_value(bus, width)?;
                match op1 {
                    OperandType::SegmentRegister(seg) => {
                        // SP has moved; a failed segment load on the
                        // delegate path surfaces before the write-back of
                        // anything else.
                        self.load_segment(bus, delegate, seg, value as u16)
                    }
                    other => {
                        self.write_operand(bus, other, value)?;
                        Ok(ExecutionResult::Okay)
                    }
                }
            }
            PUSHF | PUSHFD | PUSHFQ => {
                let flags = self.regs.flags() as u64;
                let width = self.i.width;
                self.push_value(bus, flags & width.mask(), width)?;
                Ok(ExecutionResult::Okay)
            }
            POPF | POPFD | POPFQ => {
                let width = self.i.width;
                let value = self.pop_value(bus, width)?;
                self.regs.set_flags((value as u32) | FLAG_DEFAULT);
                Ok(ExecutionResult::Okay)
            }
            PUSHA | PUSHAD => {
                let width = self.i.width;
                let original_sp = self.regs.read_idx(4, self.i.address_size);
                for idx in 0..8u8 {
                    let value = if idx == 4 { original_sp } else { self.regs.read_idx(idx, self.i.address_size) };
                    self.push_value(bus, value & width.mask(), width)?;
                }
                Ok(ExecutionResult::Okay)
            }
            POPA | POPAD => {
                let width = self.i.width;
                for idx in (0..8u8).rev() {
                    let value = self.pop_value(bus, width)?;
                    if idx != 4 {
                        // SP is discarded; the pops themselves advance it.
                        self.regs.write_idx(idx, self.i.address_size, value);
                    }
                }
                Ok(ExecutionResult::Okay)
            }
            ENTER => {
                let frame_size = self.read_operand(bus, op1)? as u16;
                let nesting = (self.read_operand(bus, op2)? as u8) % 32;
                let width = self.i.width;
                self.push_value(bus, self.regs.read_idx(5, self.i.address_size), width)?;
                let frame_ptr = self.regs.read_idx(4, self.i.address_size);
                if nesting > 0 {
                    // Walk the previous display with a scratch pointer; BP
                    // itself only commits once the pushes have succeeded.
                    let mut walk = self.regs.read_idx(5, self.i.address_size);
                    for _ in 1..nesting {
                        walk = walk.wrapping_sub(width.bytes() as u64) & self.i.address_size.mask();
                        let value = bus.read(self.linear(Segment::SS, walk), width)?;
                        self.push_value(bus, value, width)?;
                    }
                    self.push_value(bus, frame_ptr, width)?;
                }
                self.regs.write_idx(5, self.i.address_size, frame_ptr);
                let sp = frame_ptr.wrapping_sub(frame_size as u64) & self.i.address_size.mask();
                self.regs.write_idx(4, self.i.address_size, sp);
                Ok(ExecutionResult::Okay)
            }
            LEAVE => {
                let width = self.i.width;
                let bp = self.regs.read_idx(5, self.i.address_size);
                self.regs.write_idx(4, self.i.address_size, bp);
                let value = self.pop_value(bus, width)?;
                self.regs.write_idx(5, self.i.address_size, value);
                Ok(ExecutionResult::Okay)
            }

            /* Near control transfers. */
            JO | JNO | JB | JNB | JZ | JNZ | JBE | JNBE | JS | JNS | JP | JNP | JL | JNL | JLE | JNLE => {
                if self.condition(self.i.mnemonic) {
                    self.regs.rip = self.relative_target();
                    Ok(ExecutionResult::OkayJump)
                }
                else {
                    Ok(ExecutionResult::Okay)
                }
            }
            JCXZ | JECXZ | JRCXZ => {
                let cx = self.regs.read_idx(1, self.i.address_size);
                if cx == 0 {
                    self.regs.rip = self.relative_target();
                    Ok(ExecutionResult::OkayJump)
                }
                else {
                    Ok(ExecutionResult::Okay)
                }
            }
            LOOP | LOOPE | LOOPNE => {
                let cx = self
                    .regs
                    .read_idx(1, self.i.address_size)
                    .wrapping_sub(1)
                    & self.i.address_size.mask();
                self.regs.write_idx(1, self.i.address_size, cx);
                let zf = self.get_flag(Flag::Zero);
                let proceed = match self.i.mnemonic {
                    LOOPE => cx != 0 && zf,
                    LOOPNE => cx != 0 && !zf,
                    _ => cx != 0,
                };
                if proceed {
                    self.regs.rip = self.relative_target();
                    Ok(ExecutionResult::OkayJump)
                }
                else {
                    Ok(ExecutionResult::Okay)
                }
            }
            JMP => {
                let target = match op1 {
                    OperandType::Relative8(_) | OperandType::Relative16(_) | OperandType::Relative32(_) => {
                        self.relative_target()
                    }
                    other => self.read_operand(bus, other)? & self.ip_mask(),
                };
                self.regs.rip = target;
                Ok(ExecutionResult::OkayJump)
            }
            CALL => {
                let target = match op1 {
                    OperandType::Relative8(_) | OperandType::Relative16(_) | OperandType::Relative32(_) => {
                        self.relative_target()
                    }
                    other => self.read_operand(bus, other)? & self.ip_mask(),
                };
                let ret = self.regs.rip.wrapping_add(self.i.size as u64) & self.ip_mask();
                self.push_value(bus, ret, self.i.width)?;
                self.regs.rip = target;
                Ok(ExecutionResult::OkayJump)
            }
            RET => {
                let target = self.pop_value(bus, self.i.width)? & self.ip_mask();
                if let OperandType::Immediate16(adjust) = op1 {
                    let sp_size = self.stack_addr_size();
                    let sp = self
                        .regs
                        .read_idx(4, sp_size)
                        .wrapping_add(adjust as u64)
                        & sp_size.mask();
                    self.regs.write_idx(4, sp_size, sp);
                }
                self.regs.rip = target;
                Ok(ExecutionResult::OkayJump)
            }

            /* Conditional data movement. */
            SETO | SETNO | SETB | SETNB | SETZ | SETNZ | SETBE | SETNBE | SETS | SETNS | SETP | SETNP | SETL
            | SETNL | SETLE | SETNLE => {
                let value = self.condition(self.i.mnemonic) as u64;
                self.write_operand(bus, op1, value)?;
                Ok(ExecutionResult::Okay)
            }
            CMOVO | CMOVNO | CMOVB | CMOVNB | CMOVZ | CMOVNZ | CMOVBE | CMOVNBE | CMOVS | CMOVNS | CMOVP
            | CMOVNP | CMOVL | CMOVNL | CMOVLE | CMOVNLE => {
                // The source is read (and may fault) whether or not the
                // condition holds; only the destination write is gated.
                let value = self.read_operand(bus, op2)?;
                if self.condition(self.i.mnemonic) {
                    self.write_operand(bus, op1, value)?;
                }
                else if self.i.operand_size == OperandSize::Operand32 {
                    // A 32-bit CMOV zero-extends the destination even when
                    // the move does not happen.
                    let current = self.read_operand(bus, op1)?;
                    self.write_operand(bus, op1, current)?;
                }
                Ok(ExecutionResult::Okay)
            }

            /* Bit operations. */
            BT | BTS | BTR | BTC => self.bit_op(bus),
            BSF | BSR => {
                let src = self.read_operand(bus, op2)?;
                if src & self.i.width.mask() == 0 {
                    self.set_flag(Flag::Zero);
                    // Destination is left unchanged on a zero source.
                    return Ok(ExecutionResult::Okay);
                }
                self.clear_flag(Flag::Zero);
                let masked = src & self.i.width.mask();
                let index = if self.i.mnemonic == BSF {
                    masked.trailing_zeros() as u64
                }
                else {
                    (63 - masked.leading_zeros()) as u64
                };
                self.write_operand(bus, op1, index)?;
                Ok(ExecutionResult::Okay)
            }
            POPCNT => {
                let src = self.read_operand(bus, op2)? & self.i.width.mask();
                let count = src.count_ones() as u64;
                self.clear_flag(Flag::Carry);
                self.clear_flag(Flag::Overflow);
                self.clear_flag(Flag::Sign);
                self.clear_flag(Flag::AuxCarry);
                self.clear_flag(Flag::Parity);
                self.set_flag_state(Flag::Zero, src == 0);
                self.write_operand(bus, op1, count)?;
                Ok(ExecutionResult::Okay)
            }
            ANDN => {
                let a = self.read_operand(bus, op2)?;
                let b = self.read_operand(bus, op3)?;
                let result = !a & b & self.i.width.mask();
                self.clear_flag(Flag::Carry);
                self.clear_flag(Flag::Overflow);
                self.set_flag_state(Flag::Zero, result == 0);
                self.set_flag_state(Flag::Sign, result & self.i.width.sign_mask() != 0);
                self.write_operand(bus, op1, result)?;
                Ok(ExecutionResult::Okay)
            }
            BSWAP => {
                let value = self.read_operand(bus, op1)?;
                let swapped = match self.i.width {
                    InstructionWidth::Qword => value.swap_bytes(),
                    _ => (value as u32).swap_bytes() as u64,
                };
                self.write_operand(bus, op1, swapped & self.i.width.mask())?;
                Ok(ExecutionResult::Okay)
            }

            /* Interlocked primitives. */
            CMPXCHG => {
                let dst = self.resolve_operand(op1, true);
                let dst_val = if dst.is_memory() {
                    dst.fetch_rmw(self, bus)?
                }
                else {
                    dst.fetch(self, bus)?
                };
                let src = self.read_operand(bus, op2)?;
                let acc = self.accumulator();
                self.alu_op(Xi::CMP, acc, dst_val);
                if self.get_flag(Flag::Zero) {
                    dst.commit(self, bus, src)?;
                }
                else {
                    // The destination is written back either way - that is
                    // what makes the locked form atomic.
                    dst.commit(self, bus, dst_val)?;
                    self.set_accumulator(dst_val);
                }
                Ok(ExecutionResult::Okay)
            }
            XADD => {
                let dst = self.resolve_operand(op1, true);
                let src = self.resolve_operand(op2, true);
                let dst_val = if dst.is_memory() {
                    dst.fetch_rmw(self, bus)?
                }
                else {
                    dst.fetch(self, bus)?
                };
                let src_val = src.fetch(self, bus)?;
                let sum = self.alu_op(Xi::ADD, dst_val, src_val);
                dst.commit(self, bus, sum)?;
                src.commit(self, bus, dst_val)?;
                Ok(ExecutionResult::Okay)
            }

            /* Flag housekeeping. */
            CLC => {
                self.clear_flag(Flag::Carry);
                Ok(ExecutionResult::Okay)
            }
            STC => {
                self.set_flag(Flag::Carry);
                Ok(ExecutionResult::Okay)
            }
            CMC => {
                let cf = self.get_flag(Flag::Carry);
                self.set_flag_state(Flag::Carry, !cf);
                Ok(ExecutionResult::Okay)
            }
            CLD => {
                self.clear_flag(Flag::Direction);
                Ok(ExecutionResult::Okay)
            }
            STD => {
                self.set_flag(Flag::Direction);
                Ok(ExecutionResult::Okay)
            }
            CLI => {
                self.clear_flag(Flag::Interrupt);
                Ok(ExecutionResult::Okay)
            }
            STI => {
                self.set_flag(Flag::Interrupt);
                Ok(ExecutionResult::Okay)
            }
            LAHF => {
                let low = (self.regs.flags() & LAHF_MASK) as u8 | 0x02;
                self.regs.write_g8(Register8::AH, low);
                Ok(ExecutionResult::Okay)
            }
            SAHF => {
                let ah = self.regs.read_g8(Register8::AH) as u32;
                let flags = (self.regs.flags() & !LAHF_MASK) | (ah & LAHF_MASK);
                self.regs.set_flags(flags);
                Ok(ExecutionResult::Okay)
            }
            SALC => {
                let al = if self.get_flag(Flag::Carry) { 0xFF } else { 0x00 };
                self.regs.write_g8(Register8::AL, al);
                Ok(ExecutionResult::Okay)
            }

            /* BCD adjustments. */
            DAA => {
                self.daa();
                Ok(ExecutionResult::Okay)
            }
            DAS => {
                self.das();
                Ok(ExecutionResult::Okay)
            }
            AAA => {
                self.aaa();
                Ok(ExecutionResult::Okay)
            }
            AAS => {
                self.aas();
                Ok(ExecutionResult::Okay)
            }
            AAM => {
                let base = self.read_operand(bus, op1)? as u8;
                match self.aam(base) {
                    Ok(()) => Ok(ExecutionResult::Okay),
                    Err(e) => Err(CpuError::Exception(e)),
                }
            }
            AAD => {
                let base = self.read_operand(bus, op1)? as u8;
                self.aad(base);
                Ok(ExecutionResult::Okay)
            }

            /* Strings. */
            MOVSB | MOVSW | MOVSD | MOVSQ | CMPSB | CMPSW | CMPSD | CMPSQ | STOSB | STOSW | STOSD | STOSQ
            | LODSB | LODSW | LODSD | LODSQ | SCASB | SCASW | SCASD | SCASQ => self.string_op(bus),

            INSB | INSW | INSD | OUTSB | OUTSW | OUTSD => self.string_io_op(bus, delegate),

            /* Port I/O. */
            IN => {
                let port = self.read_operand(bus, op2)? as u16;
                let value = delegate.io_read(port, self.i.width).map_err(CpuError::Exception)?;
                self.write_operand(bus, op1, value & self.i.width.mask())?;
                Ok(ExecutionResult::Okay)
            }
            OUT => {
                let port = self.read_operand(bus, op1)? as u16;
                let value = self.read_operand(bus, op2)? & self.i.width.mask();
                delegate
                    .io_write(port, self.i.width, value)
                    .map_err(CpuError::Exception)?;
                Ok(ExecutionResult::Okay)
            }

            /* Checked array index. */
            BOUND => {
                let index = self.read_operand(bus, op1)?;
                let amode = match op2 {
                    OperandType::AddressingMode(amode, _) => amode,
                    _ => return Err(CpuError::Exception(CpuException::InvalidOpcode)),
                };
                let (seg, addr) = self.calc_effective_address(&amode);
                let width = self.i.width;
                // Fault ordering for the two bound reads is unverified
                // against hardware; both reads complete before #BR.
                let lower = bus.read(self.linear(seg, addr), width)?;
                let upper = bus.read(self.linear(seg, addr.wrapping_add(width.bytes() as u64)), width)?;
                let shift = 64 - width.bits();
                let idx_s = ((index << shift) as i64) >> shift;
                let lo_s = ((lower << shift) as i64) >> shift;
                let hi_s = ((upper << shift) as i64) >> shift;
                if idx_s < lo_s || idx_s > hi_s {
                    return Err(CpuError::Exception(CpuException::BoundRange));
                }
                Ok(ExecutionResult::Okay)
            }

            ARPL => {
                let dst = self.resolve_operand(op1, true);
                let dst_val = if dst.is_memory() {
                    dst.fetch_rmw(self, bus)?
                }
                else {
                    dst.fetch(self, bus)?
                } as u16;
                let src = self.read_operand(bus, op2)? as u16;
                if dst_val & 3 < src & 3 {
                    self.set_flag(Flag::Zero);
                    dst.commit(self, bus, ((dst_val & !3) | (src & 3)) as u64)?;
                }
                else {
                    self.clear_flag(Flag::Zero);
                    dst.commit(self, bus, dst_val as u64)?;
                }
                Ok(ExecutionResult::Okay)
            }

            /* x87. */
            ESC => self.esc_op(bus),
            FWAIT => {
                if self.fpu.error_pending() {
                    return Err(CpuError::Exception(CpuException::FpuError));
                }
                Ok(ExecutionResult::Okay)
            }

            /* Far transfers and software interrupts: delegate territory. */
            CALLF | JMPF => {
                let target = match op1 {
                    OperandType::FarPointer16(selector, offset) => Some(FarTarget {
                        selector,
                        offset: offset as u64,
                    }),
                    OperandType::FarPointer32(selector, offset) => Some(FarTarget {
                        selector,
                        offset: offset as u64,
                    }),
                    OperandType::AddressingMode(amode, _) => {
                        // m16:16/m16:32 - offset then selector.
                        let (seg, addr) = self.calc_effective_address(&amode);
                        let offset = bus.read(self.linear(seg, addr), self.i.width)?;
                        let selector = bus.read(
                            self.linear(seg, addr.wrapping_add(self.i.width.bytes() as u64)),
                            InstructionWidth::Word,
                        )? as u16;
                        Some(FarTarget { selector, offset })
                    }
                    _ => None,
                };
                self.delegate_far(delegate, target)
            }
            RETF | IRET => self.delegate_far(delegate, None),
            INT => {
                let vector = self.read_operand(bus, op1)? as u8;
                self.delegate_int(delegate, vector)
            }
            INT3 => self.delegate_int(delegate, 3),
            INT1 => self.delegate_int(delegate, 1),
            INTO => {
                if self.get_flag(Flag::Overflow) {
                    self.delegate_int(delegate, 4)
                }
                else {
                    Ok(ExecutionResult::Okay)
                }
            }

            /* Far pointer loads. */
            LES | LDS | LSS | LFS | LGS => {
                let amode = match op2 {
                    OperandType::AddressingMode(amode, _) => amode,
                    _ => return Err(CpuError::Exception(CpuException::InvalidOpcode)),
                };
                let (seg, addr) = self.calc_effective_address(&amode);
                let offset = bus.read(self.linear(seg, addr), self.i.width)?;
                let selector = bus.read(
                    self.linear(seg, addr.wrapping_add(self.i.width.bytes() as u64)),
                    InstructionWidth::Word,
                )? as u16;
                let target_seg = match self.i.mnemonic {
                    LES => Segment::ES,
                    LDS => Segment::DS,
                    LSS => Segment::SS,
                    LFS => Segment::FS,
                    _ => Segment::GS,
                };
                let result = self.load_segment(bus, delegate, target_seg, selector)?;
                if matches!(result, ExecutionResult::NotImplemented(_)) {
                    return Ok(result);
                }
                self.write_operand(bus, op1, offset)?;
                Ok(result)
            }

            HLT => Ok(ExecutionResult::Halt),
            UD2 => Err(CpuError::Exception(CpuException::InvalidOpcode)),

            /* System instructions: decoded here, executed by the VMM. */
            LAR | LSL | CLTS | SLDT | STR | LLDT | LTR | VERR | VERW | SGDT | SIDT | LGDT | LIDT | SMSW
            | LMSW | INVLPG | CPUID | RDTSC | RDMSR | WRMSR | RSM => {
                let i = self.i;
                match delegate.system_op(&i)? {
                    DelegateAction::Completed => Ok(ExecutionResult::Delegated),
                    DelegateAction::Branched => Ok(ExecutionResult::OkayJump),
                    DelegateAction::Unhandled => Ok(ExecutionResult::NotImplemented(self.i.mnemonic)),
                }
            }

            NotImpl => Ok(ExecutionResult::NotImplemented(self.i.mnemonic)),

            other => {
                log::warn!("execute: unhandled mnemonic {:?}", other);
                Ok(ExecutionResult::NotImplemented(other))
            }
        }
    }

    /* --------------------------- Sub-handlers --------------------------- */

    fn accumulator(&self) -> u64 {
        self.regs.read_g64(Register64::RAX) & self.i.width.mask()
    }

    fn set_accumulator(&mut self, value: u64) {
        match self.i.width {
            InstructionWidth::Byte => self.regs.write_g8(Register8::AL, value as u8),
            InstructionWidth::Word => self.regs.write_g16(Register16::AX, value as u16),
            InstructionWidth::Dword => self.regs.write_g32(Register32::EAX, value as u32),
            InstructionWidth::Qword => self.regs.write_g64(Register64::RAX, value),
        }
    }

    /// BT/BTS/BTR/BTC. For a register destination the bit index wraps at
    /// the operand width. For memory with a register index the bit string
    /// extends beyond the operand: the effective byte address moves by the
    /// signed bit index before the masked bit is tested.
    fn bit_op(&mut self, bus: &mut dyn Bus) -> Result<ExecutionResult, CpuError> {
        use Mnemonic::*;
        let op1 = self.i.operand1_type;
        let op2 = self.i.operand2_type;
        let bits = self.i.width.bits() as u64;
        let writes = self.i.mnemonic != BT;

        let index_raw = self.read_operand(bus, op2)?;
        let from_register_index = !matches!(op2, OperandType::Immediate8(_));

        let (loc, bit) = match (op1, from_register_index) {
            (OperandType::AddressingMode(amode, size), true) => {
                let shift = 64 - bits as u32;
                let signed_index = ((index_raw << shift) as i64) >> shift;
                let byte_offset = signed_index.div_euclid(bits as i64) * (bits as i64 / 8);
                let bit = signed_index.rem_euclid(bits as i64) as u64;
                let (seg, addr) = self.calc_effective_address(&amode);
                let adjusted = addr.wrapping_add(byte_offset as u64) & self.i.address_size.mask();
                let loc = self.resolve_operand(
                    OperandType::AddressingMode(amode, size),
                    writes,
                );
                // Rebuild the memory location at the adjusted address.
                let loc = match loc {
                    crate::cpu_x86::ops::OperandLoc::MemoryOperand(mut m) => {
                        m.segment = seg;
                        m.addr = adjusted;
                        crate::cpu_x86::ops::OperandLoc::MemoryOperand(m)
                    }
                    other => other,
                };
                (loc, bit)
            }
            _ => (self.resolve_operand(op1, writes), index_raw % bits),
        };

        let value = if writes && loc.is_memory() {
            loc.fetch_rmw(self, bus)?
        }
        else {
            loc.fetch(self, bus)?
        };
        let mask = 1u64 << bit;
        self.set_flag_state(Flag::Carry, value & mask != 0);

        if writes {
            let new_value = match self.i.mnemonic {
                BTS => value | mask,
                BTR => value & !mask,
                _ => value ^ mask,
            };
            loc.commit(self, bus, new_value)?;
        }
        Ok(ExecutionResult::Okay)
    }

    /// INS/OUTS with optional REP: port I/O through the delegate with the
    /// memory side on the bus, iteration state committing per element.
    fn string_io_op(
        &mut self,
        bus: &mut dyn Bus,
        delegate: &mut dyn ExecutionDelegate,
    ) -> Result<ExecutionResult, CpuError> {
        use Mnemonic::*;
        let width = match self.i.mnemonic {
            INSB | OUTSB => InstructionWidth::Byte,
            INSW | OUTSW => InstructionWidth::Word,
            _ => InstructionWidth::Dword,
        };
        let step = if self.get_flag(Flag::Direction) {
            -(width.bytes() as i64)
        }
        else {
            width.bytes() as i64
        };
        let port = self.regs.read_g16(Register16::DX);
        let counted = self.i.has_rep();
        let input = matches!(self.i.mnemonic, INSB | INSW | INSD);

        loop {
            if counted && self.regs.read_idx(1, self.i.address_size) == 0 {
                break;
            }

            if input {
                let value = delegate.io_read(port, width).map_err(CpuError::Exception)?;
                let di = self.regs.read_idx(7, self.i.address_size);
                bus.write(self.linear(Segment::ES, di), width, value)?;
                let new_di = di.wrapping_add(step as u64) & self.i.address_size.mask();
                self.regs.write_idx(7, self.i.address_size, new_di);
            }
            else {
                let si = self.regs.read_idx(6, self.i.address_size);
                let seg = self.i.segment_override.unwrap_or(Segment::DS);
                let value = bus.read(self.linear(seg, si), width)?;
                delegate.io_write(port, width, value).map_err(CpuError::Exception)?;
                let new_si = si.wrapping_add(step as u64) & self.i.address_size.mask();
                self.regs.write_idx(6, self.i.address_size, new_si);
            }

            if !counted {
                break;
            }
            let cx = self
                .regs
                .read_idx(1, self.i.address_size)
                .wrapping_sub(1)
                & self.i.address_size.mask();
            self.regs.write_idx(1, self.i.address_size, cx);
        }
        Ok(ExecutionResult::Okay)
    }

    /// Segment register load. Real-address 16-bit mode installs the
    /// selector-shifted base inline; protected/long mode descriptor loads
    /// belong to the VM engine.
    fn load_segment(
        &mut self,
        _bus: &mut dyn Bus,
        delegate: &mut dyn ExecutionDelegate,
        segment: Segment,
        selector: u16,
    ) -> Result<ExecutionResult, CpuError> {
        match self.mode() {
            CpuMode::Mode16 => {
                self.regs.set_segment_real(segment, selector);
                Ok(ExecutionResult::Okay)
            }
            _ => {
                let i = self.i;
                match delegate.system_op(&i)? {
                    DelegateAction::Unhandled => Ok(ExecutionResult::NotImplemented(self.i.mnemonic)),
                    _ => Ok(ExecutionResult::Delegated),
                }
            }
        }
    }

    fn delegate_far(
        &mut self,
        delegate: &mut dyn ExecutionDelegate,
        target: Option<FarTarget>,
    ) -> Result<ExecutionResult, CpuError> {
        match delegate.far_transfer(self.i.mnemonic, target).map_err(CpuError::Exception)? {
            DelegateAction::Completed => Ok(ExecutionResult::Delegated),
            DelegateAction::Branched => Ok(ExecutionResult::OkayJump),
            DelegateAction::Unhandled => Ok(ExecutionResult::NotImplemented(self.i.mnemonic)),
        }
    }

    fn delegate_int(
        &mut self,
        delegate: &mut dyn ExecutionDelegate,
        vector: u8,
    ) -> Result<ExecutionResult, CpuError> {
        match delegate.software_interrupt(vector).map_err(CpuError::Exception)? {
            DelegateAction::Completed => Ok(ExecutionResult::Delegated),
            DelegateAction::Branched => Ok(ExecutionResult::OkayJump),
            DelegateAction::Unhandled => Ok(ExecutionResult::NotImplemented(self.i.mnemonic)),
        }
    }
}
