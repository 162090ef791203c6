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

    cpu_common::instruction.rs

    The decoded instruction record: everything execution needs, and nothing
    that depends on the byte source it was decoded from. Decoding the same
    window twice must produce an identical record.

*/

#![allow(dead_code)]

use std::fmt::{Display, Formatter};

use modular_bitfield::prelude::*;

use crate::cpu_common::{
    alu::Xi,
    AddressSize,
    Mnemonic,
    OperandSize,
    OperandType,
    Segment,
};

/// REX prefix bit layout (0x40-0x4F). Low nibble is B/X/R/W.
#[bitfield]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RexPrefix {
    pub b: bool,
    pub x: bool,
    pub r: bool,
    pub w: bool,
    #[skip]
    __: B4,
}

/// Decoded VEX/XOP payload, normalized across the 2-byte (C5) and 3-byte
/// (C4/8F) encodings. vvvv is stored already inverted (register number).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct VexPrefix {
    pub r: bool,
    pub x: bool,
    pub b: bool,
    pub w: bool,
    /// Opcode map select: 1 = 0F, 2 = 0F38, 3 = 0F3A; XOP maps 8-10.
    pub map: u8,
    pub vvvv: u8,
    pub l: bool,
    /// Implied mandatory prefix: 0 = none, 1 = 66, 2 = F3, 3 = F2.
    pub pp: u8,
    pub xop: bool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum InstructionWidth {
    Byte,
    #[default]
    Word,
    Dword,
    Qword,
}

impl InstructionWidth {
    #[inline]
    pub fn bits(&self) -> u32 {
        match self {
            InstructionWidth::Byte => 8,
            InstructionWidth::Word => 16,
            InstructionWidth::Dword => 32,
            InstructionWidth::Qword => 64,
        }
    }

    #[inline]
    pub fn bytes(&self) -> u32 {
        self.bits() / 8
    }

    #[inline]
    pub fn mask(&self) -> u64 {
        match self {
            InstructionWidth::Byte => 0xFF,
            InstructionWidth::Word => 0xFFFF,
            InstructionWidth::Dword => 0xFFFF_FFFF,
            InstructionWidth::Qword => u64::MAX,
        }
    }

    #[inline]
    pub fn sign_mask(&self) -> u64 {
        match self {
            InstructionWidth::Byte => 0x80,
            InstructionWidth::Word => 0x8000,
            InstructionWidth::Dword => 0x8000_0000,
            InstructionWidth::Qword => 0x8000_0000_0000_0000,
        }
    }

    /// Architectural shift/rotate count mask for this width.
    #[inline]
    pub fn shift_mask(&self) -> u8 {
        match self {
            InstructionWidth::Qword => 0x3F,
            _ => 0x1F,
        }
    }
}

impl From<OperandSize> for InstructionWidth {
    fn from(size: OperandSize) -> Self {
        match size {
            OperandSize::Operand8 => InstructionWidth::Byte,
            OperandSize::Operand16 => InstructionWidth::Word,
            OperandSize::Operand32 => InstructionWidth::Dword,
            OperandSize::Operand64 => InstructionWidth::Qword,
            _ => InstructionWidth::Word,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Instruction {
    pub decode_idx: usize,
    pub opcode: u8,
    pub prefix_flags: u32,
    /// Mandatory-prefix dispatch column: 0=none, 1=66, 2=F3, 3=F2.
    pub prefix_index: u8,
    pub address: u64,
    pub size: u32,
    pub width: InstructionWidth,
    pub mnemonic: Mnemonic,
    pub xi: Option<Xi>,
    pub segment_override: Option<Segment>,
    pub operand_size: OperandSize,
    pub address_size: AddressSize,
    pub rex: Option<RexPrefix>,
    pub vex: Option<VexPrefix>,
    /// Raw ModRM byte when one was consumed; the x87 dispatch and group
    /// diagnostics need the original fields.
    pub modrm: Option<u8>,
    pub operand1_type: OperandType,
    pub operand2_type: OperandType,
    pub operand3_type: OperandType,
}

impl Instruction {
    #[inline]
    pub fn has_lock(&self) -> bool {
        self.prefix_flags & super::PrefixFlags::LOCK != 0
    }

    #[inline]
    pub fn has_rep(&self) -> bool {
        self.prefix_flags & super::PrefixFlags::REP_MASK != 0
    }

    #[inline]
    pub fn has_repne(&self) -> bool {
        self.prefix_flags & super::PrefixFlags::REPNE != 0
    }

    /// REX.W if a REX prefix survived to the opcode.
    #[inline]
    pub fn rex_w(&self) -> bool {
        self.rex.map(|r| r.w()).unwrap_or(false)
    }

    /// ModRM reg field, extended by REX.R.
    #[inline]
    pub fn modrm_reg(&self) -> u8 {
        let reg = self.modrm.map(|m| (m >> 3) & 0x07).unwrap_or(0);
        let ext = self.rex.map(|r| (r.r() as u8) << 3).unwrap_or(0);
        reg | ext
    }

    /// ModRM reg field without REX extension (group/opcode extension).
    #[inline]
    pub fn op_extension(&self) -> u8 {
        self.modrm.map(|m| (m >> 3) & 0x07).unwrap_or(0)
    }
}

impl Display for Instruction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.mnemonic)?;
        match self.operand1_type {
            OperandType::NoOperand => {}
            ref op => write!(f, " {:?}", op)?,
        }
        match self.operand2_type {
            OperandType::NoOperand => {}
            ref op => write!(f, ", {:?}", op)?,
        }
        Ok(())
    }
}
