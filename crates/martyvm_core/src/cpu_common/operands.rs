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

    cpu_common::operands.rs

    Resolved operand descriptors as produced by decode. These are what the
    execution layer's fetch/store abstraction consumes; it never needs to
    know whether a value came from a register, memory, or an immediate.

*/

use crate::cpu_common::{AddressingMode, OperandSize, Register16, Register32, Register64, Register8, Segment};

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub enum OperandType {
    Immediate8(u8),
    Immediate16(u16),
    Immediate32(u32),
    Immediate64(u64),
    Immediate8s(i8),
    Relative8(i8),
    Relative16(i16),
    Relative32(i32),
    /// Direct moffs offset (MOV AL/AX/EAX/RAX, [moffs]); width is the
    /// effective address size.
    Offset(u64),
    Register8(Register8),
    Register16(Register16),
    Register32(Register32),
    Register64(Register64),
    SegmentRegister(Segment),
    /// Control/debug register index, REX.R-extended. Only ever reaches the
    /// system-op delegate.
    ControlRegister(u8),
    DebugRegister(u8),
    AddressingMode(AddressingMode, OperandSize),
    FarPointer16(u16, u16),
    FarPointer32(u16, u32),
    #[default]
    NoOperand,
    InvalidOperand,
}

impl OperandType {
    #[inline]
    pub fn is_memory(&self) -> bool {
        matches!(
            self,
            OperandType::AddressingMode(_, _) | OperandType::Offset(_)
        )
    }
}
