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

    cpu_x86::mod.rs

    The per-vCPU execution engine. One instruction is fully decoded and
    executed (or faulted) per step; there is no internal suspension. All
    decode state lives in the current Instruction and the engine fields -
    never in globals - so the VM engine may run one CpuX86 per vCPU thread.

*/

#![allow(dead_code)]

pub mod alu;
pub mod bcd;
pub mod bitwise;
pub mod decode;
pub mod execute;
pub mod fpu;
pub mod modrm;
pub mod muldiv;
pub mod ops;
pub mod registers;
pub mod string;

use crate::{
    bus::Bus,
    bytequeue::ByteQueue,
    cpu_common::{
        services::ExecutionDelegate,
        CpuError,
        CpuException,
        CpuMode,
        CpuModel,
        DecodeError,
        ExecutionResult,
        Instruction,
        InstructionWidth,
        Segment,
        StepResult,
        TraceMode,
        VendorPolicy,
        PARITY_TABLE,
    },
    cpu_x86::{decode::template_gdr, fpu::FpuStack, registers::Registers},
};

pub const CPU_FLAG_CARRY: u32 = 0b0000_0000_0000_0001;
pub const CPU_FLAG_RESERVED1: u32 = 0b0000_0000_0000_0010;
pub const CPU_FLAG_PARITY: u32 = 0b0000_0000_0000_0100;
pub const CPU_FLAG_AUX_CARRY: u32 = 0b0000_0000_0001_0000;
pub const CPU_FLAG_ZERO: u32 = 0b0000_0000_0100_0000;
pub const CPU_FLAG_SIGN: u32 = 0b0000_0000_1000_0000;
pub const CPU_FLAG_TRAP: u32 = 0b0000_0001_0000_0000;
pub const CPU_FLAG_INT_ENABLE: u32 = 0b0000_0010_0000_0000;
pub const CPU_FLAG_DIRECTION: u32 = 0b0000_0100_0000_0000;
pub const CPU_FLAG_OVERFLOW: u32 = 0b0000_1000_0000_0000;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Flag {
    Carry,
    Parity,
    AuxCarry,
    Zero,
    Sign,
    Trap,
    Interrupt,
    Direction,
    Overflow,
}

impl Flag {
    #[inline]
    pub const fn mask(&self) -> u32 {
        match self {
            Flag::Carry => CPU_FLAG_CARRY,
            Flag::Parity => CPU_FLAG_PARITY,
            Flag::AuxCarry => CPU_FLAG_AUX_CARRY,
            Flag::Zero => CPU_FLAG_ZERO,
            Flag::Sign => CPU_FLAG_SIGN,
            Flag::Trap => CPU_FLAG_TRAP,
            Flag::Interrupt => CPU_FLAG_INT_ENABLE,
            Flag::Direction => CPU_FLAG_DIRECTION,
            Flag::Overflow => CPU_FLAG_OVERFLOW,
        }
    }
}

pub struct CpuX86 {
    pub regs: Registers,
    pub fpu: FpuStack,
    mode: CpuMode,
    model: CpuModel,
    vendor: VendorPolicy,
    pub(crate) i: Instruction,
    instruction_count: u64,
    trace_mode: TraceMode,
}

impl CpuX86 {
    pub fn new(mode: CpuMode, model: CpuModel, vendor: VendorPolicy) -> Self {
        Self {
            regs: Registers::new(),
            fpu: FpuStack::new(),
            mode,
            model,
            vendor,
            i: Instruction::default(),
            instruction_count: 0,
            trace_mode: TraceMode::None,
        }
    }

    #[inline]
    pub fn mode(&self) -> CpuMode {
        self.mode
    }

    /// The VM engine switches us between 16/32/64-bit execution when the
    /// guest changes CS attributes.
    pub fn set_mode(&mut self, mode: CpuMode) {
        self.mode = mode;
    }

    #[inline]
    pub fn model(&self) -> CpuModel {
        self.model
    }

    #[inline]
    pub fn vendor(&self) -> VendorPolicy {
        self.vendor
    }

    #[inline]
    pub fn instruction_count(&self) -> u64 {
        self.instruction_count
    }

    pub fn set_trace_mode(&mut self, mode: TraceMode) {
        self.trace_mode = mode;
    }

    /* ------------------------------ Flags ------------------------------- */

    #[inline]
    pub fn get_flag(&self, flag: Flag) -> bool {
        self.regs.flags & flag.mask() != 0
    }

    #[inline]
    pub fn set_flag(&mut self, flag: Flag) {
        self.regs.flags |= flag.mask();
    }

    #[inline]
    pub fn clear_flag(&mut self, flag: Flag) {
        self.regs.flags &= !flag.mask();
    }

    #[inline]
    pub fn set_flag_state(&mut self, flag: Flag, state: bool) {
        if state {
            self.set_flag(flag)
        }
        else {
            self.clear_flag(flag)
        }
    }

    #[inline]
    pub(crate) fn set_parity_flag_from_result(&mut self, result: u64) {
        self.set_flag_state(Flag::Parity, PARITY_TABLE[(result & 0xFF) as usize]);
    }

    /// Sign/Zero/Parity from a result at the current instruction width.
    pub(crate) fn set_szp_flags_from_result(&mut self, result: u64) {
        let masked = result & self.i.width.mask();
        self.set_flag_state(Flag::Sign, masked & self.i.width.sign_mask() != 0);
        self.set_flag_state(Flag::Zero, masked == 0);
        self.set_parity_flag_from_result(masked);
    }

    /* ------------------------------ Stack ------------------------------- */

    #[inline]
    fn stack_addr_size(&self) -> crate::cpu_common::AddressSize {
        self.mode.default_address_size()
    }

    fn stack_linear(&self, sp: u64) -> u64 {
        match self.mode {
            CpuMode::Mode64 => sp,
            _ => self.regs.segment_base(Segment::SS).wrapping_add(sp & self.stack_addr_size().mask()),
        }
    }

    /// Push a value at the effective stack width. The memory write happens
    /// before the stack pointer commits so a stack fault leaves SP intact.
    pub(crate) fn push_value(&mut self, bus: &mut dyn Bus, value: u64, width: InstructionWidth) -> Result<(), CpuError> {
        let sp_size = self.stack_addr_size();
        let new_sp = self
            .regs
            .read_idx(4, sp_size)
            .wrapping_sub(width.bytes() as u64)
            & sp_size.mask();
        bus.write(self.stack_linear(new_sp), width, value)?;
        self.regs.write_idx(4, sp_size, new_sp);
        Ok(())
    }

    pub(crate) fn pop_value(&mut self, bus: &mut dyn Bus, width: InstructionWidth) -> Result<u64, CpuError> {
        let sp_size = self.stack_addr_size();
        let sp = self.regs.read_idx(4, sp_size);
        let value = bus.read(self.stack_linear(sp), width)?;
        self.regs
            .write_idx(4, sp_size, sp.wrapping_add(width.bytes() as u64) & sp_size.mask());
        Ok(value)
    }

    /* ------------------------------- Step ------------------------------- */

    /// Decode and execute one instruction from the code window.
    ///
    /// On success RIP has advanced (or branched) and the consumed byte
    /// count is returned. On a fault RIP and all architectural state are
    /// as-if the instruction never started, except for the documented
    /// partial-execution points of REP string operations.
    pub fn step(
        &mut self,
        bytes: &mut impl ByteQueue,
        bus: &mut dyn Bus,
        delegate: &mut dyn ExecutionDelegate,
    ) -> Result<(StepResult, u32), CpuError> {
        let start_rip = self.regs.rip;

        let mut instruction = match decode::decode(bytes, self.mode, self.model) {
            Ok(i) => i,
            Err(DecodeError::Incomplete) => {
                return Err(CpuError::InstructionDecode(DecodeError::Incomplete, start_rip));
            }
            Err(DecodeError::InvalidOpcode(op)) => {
                log::debug!("invalid opcode {:02X} at {:012X}", op, start_rip);
                return Err(CpuError::Exception(CpuException::InvalidOpcode));
            }
            Err(DecodeError::TooLong) => {
                // Exceeding the 15-byte limit is #GP(0) on 286+.
                return Err(CpuError::Exception(CpuException::GeneralProtection));
            }
        };
        instruction.address = start_rip;

        // LOCK is only legal on a lockable operation with a memory
        // destination; anywhere else it is #UD.
        if instruction.prefix_flags & crate::cpu_common::PrefixFlags::LOCK != 0 {
            let gdr = template_gdr(instruction.decode_idx);
            let memory_dst =
                instruction.operand1_type.is_memory() || instruction.operand2_type.is_memory();
            if !gdr.lockable() || !memory_dst {
                return Err(CpuError::Exception(CpuException::InvalidOpcode));
            }
        }

        self.i = instruction;
        self.instruction_count += 1;

        if let TraceMode::Instruction = self.trace_mode {
            log::trace!("{:012X} {}", start_rip, self.i);
        }

        let size = self.i.size;
        match self.execute_instruction(bus, delegate) {
            Ok(ExecutionResult::Okay | ExecutionResult::OkayRep) => {
                self.regs.rip = start_rip.wrapping_add(size as u64);
                Ok((StepResult::Normal, size))
            }
            Ok(ExecutionResult::OkayJump) => Ok((StepResult::Jump, size)),
            Ok(ExecutionResult::Delegated) => {
                self.regs.rip = start_rip.wrapping_add(size as u64);
                Ok((StepResult::Delegated, size))
            }
            Ok(ExecutionResult::Halt) => {
                self.regs.rip = start_rip.wrapping_add(size as u64);
                Ok((StepResult::Halt, size))
            }
            Ok(ExecutionResult::ExceptionError(e)) => {
                // RIP stays at the faulting instruction for re-injection.
                Err(CpuError::Exception(e))
            }
            Ok(ExecutionResult::NotImplemented(m)) => {
                log::warn!("unimplemented instruction {} at {:012X}", m, start_rip);
                Err(CpuError::UnhandledInstruction(self.i.opcode, start_rip))
            }
            Ok(ExecutionResult::ExecutionError(msg)) => Err(CpuError::Execution(start_rip, msg)),
            // Faults and host errors propagate with RIP unmoved, so the VM
            // engine can re-inject or retry at the same instruction.
            Err(e) => Err(e),
        }
    }
}
