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

    cpu_common::services.rs

    The complex-instruction delegate. Instructions whose side effects reach
    beyond the inline execution model (far transfers, software interrupts,
    task switches, port I/O, system table loads, FPU environment images)
    are decoded here but executed by the VM engine through this hook.

*/

use crate::cpu_common::{CpuException, Instruction, InstructionWidth, Mnemonic};

/// What the delegate did with the instruction it was handed.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum DelegateAction {
    /// Side effects applied; continue at the next sequential instruction.
    Completed,
    /// Side effects applied and control flow changed; RIP was set by the
    /// delegate.
    Branched,
    /// The delegate does not handle this instruction.
    Unhandled,
}

/// Far control transfer target decoded from the instruction.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FarTarget {
    pub selector: u16,
    pub offset: u64,
}

#[allow(unused_variables)]
pub trait ExecutionDelegate {
    /// Far call/jump/return, IRET, INT n, task switches. The core has
    /// already resolved operands; the delegate owns descriptor loading and
    /// stack/TSS side effects.
    fn far_transfer(
        &mut self,
        mnemonic: Mnemonic,
        target: Option<FarTarget>,
    ) -> Result<DelegateAction, CpuException> {
        Ok(DelegateAction::Unhandled)
    }

    /// Software interrupt request (INT n / INT3 / INTO / ICEBP).
    fn software_interrupt(&mut self, vector: u8) -> Result<DelegateAction, CpuException> {
        Ok(DelegateAction::Unhandled)
    }

    /// Port input. Width is 1, 2 or 4 bytes.
    fn io_read(&mut self, port: u16, width: InstructionWidth) -> Result<u64, CpuException> {
        Err(CpuException::GeneralProtection)
    }

    /// Port output.
    fn io_write(&mut self, port: u16, width: InstructionWidth, value: u64) -> Result<(), CpuException> {
        Err(CpuException::GeneralProtection)
    }

    /// System instructions with machine-global effects (LGDT/LIDT/LMSW,
    /// MOV to/from CRn/DRn, RDMSR/WRMSR, CPUID, INVLPG, HLT wakeup policy).
    fn system_op(&mut self, instruction: &Instruction) -> Result<DelegateAction, CpuException> {
        Ok(DelegateAction::Unhandled)
    }
}

/// A delegate that handles nothing; useful for tests exercising pure
/// decode/ALU paths.
#[derive(Default)]
pub struct NullDelegate {}

impl ExecutionDelegate for NullDelegate {}
