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

    cpu_x86::decode.rs

    Opcode fetch and instruction decoding. decode() is a pure function of
    the byte window, execution mode, and target model: decoding the same
    window twice produces identical Instructions. The prefix scanner,
    primary/extended dispatch tables, and VEX/XOP disambiguation all live
    here; ModRM/SIB resolution is in modrm.rs.

*/

#![allow(dead_code)]

use lazy_static::lazy_static;

use crate::{
    bytequeue::ByteQueue,
    cpu_common::{
        alu::Xi,
        instruction::{RexPrefix, VexPrefix},
        AddressSize,
        AddressingMode,
        CpuFeature,
        CpuMode,
        CpuModel,
        DecodeError,
        Instruction,
        InstructionWidth,
        Mnemonic,
        OperandSize,
        OperandType,
        PrefixFlags,
        Segment,
        REGISTER16_LUT,
        REGISTER32_LUT,
        REGISTER64_LUT,
        REGISTER8_LUT,
        REGISTER8_REX_LUT,
    },
    cpu_x86::modrm::{read_modrm_16, read_modrm_32, ModRmByte},
};

pub const MAX_INSTRUCTION_LENGTH: u32 = 15;

/* --------------------------- Group Decode ROM --------------------------- */

// Attribute word for each dispatch entry. The name is a nod to the original
// group decode ROM; here it gates ModRM loading, LOCK legality, 64-bit mode
// validity, and the minimum model.
pub const GDR_HAS_MODRM: u16 = 0b0000_0000_0000_0001;
pub const GDR_NO_REG_FORM: u16 = 0b0000_0000_0000_0010; // mod=3 is invalid (LEA, LES, BOUND...)
pub const GDR_PREFIX: u16 = 0b0000_0000_0000_0100;
pub const GDR_IO: u16 = 0b0000_0000_0000_1000;
pub const GDR_INVALID_64: u16 = 0b0000_0000_0001_0000; // encoding removed in long mode
pub const GDR_DEFAULT_64: u16 = 0b0000_0000_0010_0000; // d64: stack ops default to 64-bit
pub const GDR_STRING: u16 = 0b0000_0000_0100_0000; // REP applies
pub const GDR_LOCKABLE: u16 = 0b0000_0000_1000_0000; // LOCK legal with a memory destination
pub const GDR_MIN_186: u16 = 0b0000_0001_0000_0000;
pub const GDR_MIN_286: u16 = 0b0000_0010_0000_0000;
pub const GDR_MIN_386: u16 = 0b0000_0100_0000_0000;
pub const GDR_MIN_486: u16 = 0b0000_1000_0000_0000;
pub const GDR_MIN_586: u16 = 0b0001_0000_0000_0000;
pub const GDR_FORCE_64: u16 = 0b0010_0000_0000_0000; // f64: operand size fixed at 64-bit (near branches)

#[derive(Copy, Clone, Default, PartialEq)]
pub struct GdrEntry(pub u16);

impl GdrEntry {
    #[inline(always)]
    pub fn has_modrm(&self) -> bool {
        self.0 & GDR_HAS_MODRM != 0
    }
    #[inline(always)]
    pub fn has_reg_form(&self) -> bool {
        self.0 & GDR_NO_REG_FORM == 0
    }
    #[inline(always)]
    pub fn is_prefix(&self) -> bool {
        self.0 & GDR_PREFIX != 0
    }
    #[inline(always)]
    pub fn invalid_in_long_mode(&self) -> bool {
        self.0 & GDR_INVALID_64 != 0
    }
    #[inline(always)]
    pub fn default_64(&self) -> bool {
        self.0 & GDR_DEFAULT_64 != 0
    }
    #[inline(always)]
    pub fn force_64(&self) -> bool {
        self.0 & GDR_FORCE_64 != 0
    }
    #[inline(always)]
    pub fn is_string(&self) -> bool {
        self.0 & GDR_STRING != 0
    }
    #[inline(always)]
    pub fn lockable(&self) -> bool {
        self.0 & GDR_LOCKABLE != 0
    }

    /// Lowest model this entry exists on.
    pub fn minimum_model(&self) -> CpuModel {
        if self.0 & GDR_MIN_586 != 0 {
            CpuModel::Cpu586
        }
        else if self.0 & GDR_MIN_486 != 0 {
            CpuModel::Cpu80486
        }
        else if self.0 & GDR_MIN_386 != 0 {
            CpuModel::Cpu80386
        }
        else if self.0 & GDR_MIN_286 != 0 {
            CpuModel::Cpu80286
        }
        else if self.0 & GDR_MIN_186 != 0 {
            CpuModel::Cpu80186
        }
        else {
            CpuModel::Cpu8086
        }
    }
}

/* --------------------------- Operand templates -------------------------- */

#[derive(Copy, Clone, Default, PartialEq)]
pub enum OperandTemplate {
    #[default]
    NoTemplate,
    NoOperand,
    ModRM8,
    /// r/m at the effective operand size (16/32/64).
    ModRMv,
    /// r/m fixed at 16 bits (segment moves, system table limits).
    ModRM16,
    /// r/m fixed at 32 bits (MOVSXD source, MOV to/from CRn).
    ModRMd,
    /// ESC (x87) ModRM: memory forms carry the EA, register forms are
    /// selected from the raw ModRM byte by the FPU dispatcher.
    ModRMEsc,
    Register8,
    Registerv,
    Register16,
    SegmentRegister,
    ControlRegister,
    DebugRegister,
    Immediate8,
    Immediate16,
    /// imm16/imm32; imm32 sign-extends to 64 at 64-bit operand size.
    Immediatev,
    /// imm16/imm32/imm64 (only MOV reg, imm takes a true imm64).
    ImmediateFull,
    Immediate8SignExtendedv,
    FixedImmediate8(u8),
    Relative8,
    Relativev,
    Offset8,
    Offsetv,
    /// Implicit register operand; never REX-extended (AL, DX, CL...).
    FixedRegister8(u8),
    FixedRegister16(u8),
    FixedRegisterv(u8),
    /// Opcode-embedded register; REX.B-extended (PUSH r64, MOV r, imm...).
    OpcodeRegister8(u8),
    OpcodeRegisterv(u8),
    FixedSegment(Segment),
    /// The VEX vvvv register at the effective operand size.
    VexVReg,
    FarPointer,
}

impl OperandTemplate {
    #[inline]
    pub fn is_byte_sized(&self) -> bool {
        matches!(
            self,
            OperandTemplate::ModRM8
                | OperandTemplate::Register8
                | OperandTemplate::FixedRegister8(_)
                | OperandTemplate::OpcodeRegister8(_)
                | OperandTemplate::Offset8
        )
    }

    pub fn resolve_operand(
        &self,
        bytes: &mut impl ByteQueue,
        ctx: &DecodeContext,
        modrm: &ModRmByte,
        amode: AddressingMode,
        size: &mut u32,
    ) -> Result<OperandType, DecodeError> {
        let op_size = ctx.operand_size;
        let is_mem = !matches!(amode, AddressingMode::RegisterMode);
        match self {
            OperandTemplate::ModRM8 => Ok(match is_mem {
                true => OperandType::AddressingMode(amode, OperandSize::Operand8),
                false => OperandType::Register8(modrm.rm_reg8(ctx.rex)),
            }),
            OperandTemplate::ModRMv => Ok(match (is_mem, op_size) {
                (true, _) => OperandType::AddressingMode(amode, op_size),
                (false, OperandSize::Operand16) => OperandType::Register16(modrm.rm_reg16(ctx.rex)),
                (false, OperandSize::Operand64) => OperandType::Register64(modrm.rm_reg64(ctx.rex)),
                (false, _) => OperandType::Register32(modrm.rm_reg32(ctx.rex)),
            }),
            OperandTemplate::ModRM16 => Ok(match is_mem {
                true => OperandType::AddressingMode(amode, OperandSize::Operand16),
                false => OperandType::Register16(modrm.rm_reg16(ctx.rex)),
            }),
            OperandTemplate::ModRMd => Ok(match is_mem {
                true => OperandType::AddressingMode(amode, OperandSize::Operand32),
                false => OperandType::Register32(modrm.rm_reg32(ctx.rex)),
            }),
            OperandTemplate::ModRMEsc => Ok(match is_mem {
                true => OperandType::AddressingMode(amode, OperandSize::NoSize),
                false => OperandType::NoOperand,
            }),
            OperandTemplate::Register8 => Ok(OperandType::Register8(modrm.reg_reg8(ctx.rex))),
            OperandTemplate::Registerv => Ok(match op_size {
                OperandSize::Operand16 => OperandType::Register16(modrm.reg_reg16(ctx.rex)),
                OperandSize::Operand64 => OperandType::Register64(modrm.reg_reg64(ctx.rex)),
                _ => OperandType::Register32(modrm.reg_reg32(ctx.rex)),
            }),
            OperandTemplate::Register16 => Ok(OperandType::Register16(modrm.reg_reg16(ctx.rex))),
            OperandTemplate::SegmentRegister => Ok(match modrm.reg_segment() {
                Some(segment) => OperandType::SegmentRegister(segment),
                None => OperandType::InvalidOperand,
            }),
            OperandTemplate::ControlRegister => {
                let ext = ctx.rex.map(|r| (r.r() as u8) << 3).unwrap_or(0);
                Ok(OperandType::ControlRegister(modrm.reg() | ext))
            }
            OperandTemplate::DebugRegister => {
                let ext = ctx.rex.map(|r| (r.r() as u8) << 3).unwrap_or(0);
                Ok(OperandType::DebugRegister(modrm.reg() | ext))
            }
            OperandTemplate::Immediate8 => {
                *size += 1;
                Ok(OperandType::Immediate8(bytes.q_read_u8()?))
            }
            OperandTemplate::Immediate16 => {
                *size += 2;
                Ok(OperandType::Immediate16(bytes.q_read_u16()?))
            }
            OperandTemplate::Immediatev => match op_size {
                OperandSize::Operand16 => {
                    *size += 2;
                    Ok(OperandType::Immediate16(bytes.q_read_u16()?))
                }
                OperandSize::Operand64 => {
                    // imm32, sign-extended to the 64-bit operand width.
                    *size += 4;
                    Ok(OperandType::Immediate64(bytes.q_read_i32()? as i64 as u64))
                }
                _ => {
                    *size += 4;
                    Ok(OperandType::Immediate32(bytes.q_read_u32()?))
                }
            },
            OperandTemplate::ImmediateFull => match op_size {
                OperandSize::Operand16 => {
                    *size += 2;
                    Ok(OperandType::Immediate16(bytes.q_read_u16()?))
                }
                OperandSize::Operand64 => {
                    *size += 8;
                    Ok(OperandType::Immediate64(bytes.q_read_u64()?))
                }
                _ => {
                    *size += 4;
                    Ok(OperandType::Immediate32(bytes.q_read_u32()?))
                }
            },
            OperandTemplate::Immediate8SignExtendedv => {
                *size += 1;
                Ok(OperandType::Immediate8s(bytes.q_read_i8()?))
            }
            OperandTemplate::FixedImmediate8(val) => Ok(OperandType::Immediate8(*val)),
            OperandTemplate::Relative8 => {
                *size += 1;
                Ok(OperandType::Relative8(bytes.q_read_i8()?))
            }
            OperandTemplate::Relativev => match op_size {
                OperandSize::Operand16 => {
                    *size += 2;
                    Ok(OperandType::Relative16(bytes.q_read_i16()?))
                }
                _ => {
                    *size += 4;
                    Ok(OperandType::Relative32(bytes.q_read_i32()?))
                }
            },
            OperandTemplate::Offset8 | OperandTemplate::Offsetv => {
                let offset = match ctx.address_size {
                    AddressSize::Address16 => {
                        *size += 2;
                        bytes.q_read_u16()? as u64
                    }
                    AddressSize::Address32 => {
                        *size += 4;
                        bytes.q_read_u32()? as u64
                    }
                    AddressSize::Address64 => {
                        *size += 8;
                        bytes.q_read_u64()?
                    }
                };
                Ok(OperandType::Offset(offset))
            }
            OperandTemplate::FixedRegister8(idx) => Ok(OperandType::Register8(REGISTER8_LUT[*idx as usize])),
            OperandTemplate::FixedRegister16(idx) => Ok(OperandType::Register16(REGISTER16_LUT[*idx as usize])),
            OperandTemplate::FixedRegisterv(idx) => Ok(fixed_register_v(op_size, *idx)),
            OperandTemplate::OpcodeRegister8(idx) => {
                let reg = match ctx.rex {
                    Some(r) => REGISTER8_REX_LUT[(idx | (r.b() as u8) << 3) as usize],
                    None => REGISTER8_LUT[*idx as usize],
                };
                Ok(OperandType::Register8(reg))
            }
            OperandTemplate::OpcodeRegisterv(idx) => {
                let ext = ctx.rex.map(|r| (r.b() as u8) << 3).unwrap_or(0);
                Ok(fixed_register_v(op_size, idx | ext))
            }
            OperandTemplate::FixedSegment(segment) => Ok(OperandType::SegmentRegister(*segment)),
            OperandTemplate::VexVReg => {
                let vvvv = ctx.vex.map(|v| v.vvvv).unwrap_or(0);
                Ok(fixed_register_v(op_size, vvvv))
            }
            OperandTemplate::FarPointer => match op_size {
                OperandSize::Operand16 => {
                    *size += 4;
                    let offset = bytes.q_read_u16()?;
                    let segment = bytes.q_read_u16()?;
                    Ok(OperandType::FarPointer16(segment, offset))
                }
                _ => {
                    *size += 6;
                    let offset = bytes.q_read_u32()?;
                    let segment = bytes.q_read_u16()?;
                    Ok(OperandType::FarPointer32(segment, offset))
                }
            },
            _ => Ok(OperandType::NoOperand),
        }
    }
}

#[inline]
fn fixed_register_v(op_size: OperandSize, idx: u8) -> OperandType {
    match op_size {
        OperandSize::Operand16 => OperandType::Register16(REGISTER16_LUT[idx as usize]),
        OperandSize::Operand64 => OperandType::Register64(REGISTER64_LUT[idx as usize]),
        _ => OperandType::Register32(REGISTER32_LUT[idx as usize]),
    }
}

type Ot = OperandTemplate;

/* ----------------------------- Decode tables ---------------------------- */

#[derive(Copy, Clone, Default)]
pub struct InstTemplate {
    pub grp: u8,
    pub gdr: GdrEntry,
    pub xi: Option<Xi>,
    pub mnemonic: Mnemonic,
    pub operand1: OperandTemplate,
    pub operand2: OperandTemplate,
    pub operand3: OperandTemplate,
}

impl InstTemplate {
    pub(crate) const fn constdefault() -> Self {
        Self {
            grp: 0,
            gdr: GdrEntry(0),
            xi: None,
            mnemonic: Mnemonic::Invalid,
            operand1: OperandTemplate::NoOperand,
            operand2: OperandTemplate::NoOperand,
            operand3: OperandTemplate::NoOperand,
        }
    }
}

macro_rules! inst_skip {
    ($init:ident, $ct:literal) => {
        $init.idx += $ct;
    };
}
macro_rules! inst {
    ($opcode:literal, $init:ident, $grp:literal, $gdr:literal, $xi:ident, $m:ident, $o1:expr, $o2:expr) => {
        $init.table[$init.idx] = InstTemplate {
            grp: $grp,
            gdr: GdrEntry($gdr),
            xi: Some(Xi::$xi),
            mnemonic: Mnemonic::$m,
            operand1: $o1,
            operand2: $o2,
            operand3: OperandTemplate::NoOperand,
        };
        $init.idx += 1;
    };
    ($opcode:literal, $init:ident, $grp:literal, $gdr:literal, $m:ident, $o1:expr, $o2:expr) => {
        $init.table[$init.idx] = InstTemplate {
            grp: $grp,
            gdr: GdrEntry($gdr),
            xi: None,
            mnemonic: Mnemonic::$m,
            operand1: $o1,
            operand2: $o2,
            operand3: OperandTemplate::NoOperand,
        };
        $init.idx += 1;
    };
    ($opcode:literal, $init:ident, $grp:literal, $gdr:literal, $m:ident, $o1:expr, $o2:expr, $o3:expr) => {
        $init.table[$init.idx] = InstTemplate {
            grp: $grp,
            gdr: GdrEntry($gdr),
            xi: None,
            mnemonic: Mnemonic::$m,
            operand1: $o1,
            operand2: $o2,
            operand3: $o3,
        };
        $init.idx += 1;
    };
}

pub const REGULAR_OPS_LEN: usize = 256 + (14 * 8); // 256 opcodes + 14 groups of 8
pub const EXTENDED_OPS_LEN: usize = 256 + (3 * 8); // 256 opcodes + 3 groups of 8

pub struct TableInitializer<const N: usize> {
    pub idx: usize,
    pub table: [InstTemplate; N],
}

impl<const N: usize> TableInitializer<N> {
    const fn new() -> Self {
        Self {
            idx: 0,
            table: [InstTemplate::constdefault(); N],
        }
    }
}

#[rustfmt::skip]
pub static DECODE: [InstTemplate; REGULAR_OPS_LEN] = {
    let mut o: TableInitializer<REGULAR_OPS_LEN> = TableInitializer::new();
    inst!( 0x00, o, 0, 0b0000_0000_1000_0001, ADD   , ADD,     Ot::ModRM8,                  Ot::Register8);
    inst!( 0x01, o, 0, 0b0000_0000_1000_0001, ADD   , ADD,     Ot::ModRMv,                  Ot::Registerv);
    inst!( 0x02, o, 0, 0b0000_0000_0000_0001, ADD   , ADD,     Ot::Register8,               Ot::ModRM8);
    inst!( 0x03, o, 0, 0b0000_0000_0000_0001, ADD   , ADD,     Ot::Registerv,               Ot::ModRMv);
    inst!( 0x04, o, 0, 0b0000_0000_0000_0000, ADD   , ADD,     Ot::FixedRegister8(0),       Ot::Immediate8);
    inst!( 0x05, o, 0, 0b0000_0000_0000_0000, ADD   , ADD,     Ot::FixedRegisterv(0),       Ot::Immediatev);
    inst!( 0x06, o, 0, 0b0000_0000_0011_0000,         PUSH,    Ot::FixedSegment(Segment::ES), Ot::NoOperand);
    inst!( 0x07, o, 0, 0b0000_0000_0011_0000,         POP,     Ot::FixedSegment(Segment::ES), Ot::NoOperand);
    inst!( 0x08, o, 0, 0b0000_0000_1000_0001, OR    , OR,      Ot::ModRM8,                  Ot::Register8);
    inst!( 0x09, o, 0, 0b0000_0000_1000_0001, OR    , OR,      Ot::ModRMv,                  Ot::Registerv);
    inst!( 0x0A, o, 0, 0b0000_0000_0000_0001, OR    , OR,      Ot::Register8,               Ot::ModRM8);
    inst!( 0x0B, o, 0, 0b0000_0000_0000_0001, OR    , OR,      Ot::Registerv,               Ot::ModRMv);
    inst!( 0x0C, o, 0, 0b0000_0000_0000_0000, OR    , OR,      Ot::FixedRegister8(0),       Ot::Immediate8);
    inst!( 0x0D, o, 0, 0b0000_0000_0000_0000, OR    , OR,      Ot::FixedRegisterv(0),       Ot::Immediatev);
    inst!( 0x0E, o, 0, 0b0000_0000_0011_0000,         PUSH,    Ot::FixedSegment(Segment::CS), Ot::NoOperand);
    // POP CS: only reachable on pre-286 models; 286+ dispatches the
    // extended table before the primary lookup.
    inst!( 0x0F, o, 0, 0b0000_0000_0001_0000,         POP,     Ot::FixedSegment(Segment::CS), Ot::NoOperand);
    inst!( 0x10, o, 0, 0b0000_0000_1000_0001, ADC   , ADC,     Ot::ModRM8,                  Ot::Register8);
    inst!( 0x11, o, 0, 0b0000_0000_1000_0001, ADC   , ADC,     Ot::ModRMv,                  Ot::Registerv);
    inst!( 0x12, o, 0, 0b0000_0000_0000_0001, ADC   , ADC,     Ot::Register8,               Ot::ModRM8);
    inst!( 0x13, o, 0, 0b0000_0000_0000_0001, ADC   , ADC,     Ot::Registerv,               Ot::ModRMv);
    inst!( 0x14, o, 0, 0b0000_0000_0000_0000, ADC   , ADC,     Ot::FixedRegister8(0),       Ot::Immediate8);
    inst!( 0x15, o, 0, 0b0000_0000_0000_0000, ADC   , ADC,     Ot::FixedRegisterv(0),       Ot::Immediatev);
    inst!( 0x16, o, 0, 0b0000_0000_0011_0000,         PUSH,    Ot::FixedSegment(Segment::SS), Ot::NoOperand);
    inst!( 0x17, o, 0, 0b0000_0000_0011_0000,         POP,     Ot::FixedSegment(Segment::SS), Ot::NoOperand);
    inst!( 0x18, o, 0, 0b0000_0000_1000_0001, SBB   , SBB,     Ot::ModRM8,                  Ot::Register8);
    inst!( 0x19, o, 0, 0b0000_0000_1000_0001, SBB   , SBB,     Ot::ModRMv,                  Ot::Registerv);
    inst!( 0x1A, o, 0, 0b0000_0000_0000_0001, SBB   , SBB,     Ot::Register8,               Ot::ModRM8);
    inst!( 0x1B, o, 0, 0b0000_0000_0000_0001, SBB   , SBB,     Ot::Registerv,               Ot::ModRMv);
    inst!( 0x1C, o, 0, 0b0000_0000_0000_0000, SBB   , SBB,     Ot::FixedRegister8(0),       Ot::Immediate8);
    inst!( 0x1D, o, 0, 0b0000_0000_0000_0000, SBB   , SBB,     Ot::FixedRegisterv(0),       Ot::Immediatev);
    inst!( 0x1E, o, 0, 0b0000_0000_0011_0000,         PUSH,    Ot::FixedSegment(Segment::DS), Ot::NoOperand);
    inst!( 0x1F, o, 0, 0b0000_0000_0011_0000,         POP,     Ot::FixedSegment(Segment::DS), Ot::NoOperand);
    inst!( 0x20, o, 0, 0b0000_0000_1000_0001, AND   , AND,     Ot::ModRM8,                  Ot::Register8);
    inst!( 0x21, o, 0, 0b0000_0000_1000_0001, AND   , AND,     Ot::ModRMv,                  Ot::Registerv);
    inst!( 0x22, o, 0, 0b0000_0000_0000_0001, AND   , AND,     Ot::Register8,               Ot::ModRM8);
    inst!( 0x23, o, 0, 0b0000_0000_0000_0001, AND   , AND,     Ot::Registerv,               Ot::ModRMv);
    inst!( 0x24, o, 0, 0b0000_0000_0000_0000, AND   , AND,     Ot::FixedRegister8(0),       Ot::Immediate8);
    inst!( 0x25, o, 0, 0b0000_0000_0000_0000, AND   , AND,     Ot::FixedRegisterv(0),       Ot::Immediatev);
    inst!( 0x26, o, 0, 0b0000_0000_0000_0100,         Prefix,  Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x27, o, 0, 0b0000_0000_0001_0000,         DAA,     Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x28, o, 0, 0b0000_0000_1000_0001, SUB   , SUB,     Ot::ModRM8,                  Ot::Register8);
    inst!( 0x29, o, 0, 0b0000_0000_1000_0001, SUB   , SUB,     Ot::ModRMv,                  Ot::Registerv);
    inst!( 0x2A, o, 0, 0b0000_0000_0000_0001, SUB   , SUB,     Ot::Register8,               Ot::ModRM8);
    inst!( 0x2B, o, 0, 0b0000_0000_0000_0001, SUB   , SUB,     Ot::Registerv,               Ot::ModRMv);
    inst!( 0x2C, o, 0, 0b0000_0000_0000_0000, SUB   , SUB,     Ot::FixedRegister8(0),       Ot::Immediate8);
    inst!( 0x2D, o, 0, 0b0000_0000_0000_0000, SUB   , SUB,     Ot::FixedRegisterv(0),       Ot::Immediatev);
    inst!( 0x2E, o, 0, 0b0000_0000_0000_0100,         Prefix,  Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x2F, o, 0, 0b0000_0000_0001_0000,         DAS,     Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x30, o, 0, 0b0000_0000_1000_0001, XOR   , XOR,     Ot::ModRM8,                  Ot::Register8);
    inst!( 0x31, o, 0, 0b0000_0000_1000_0001, XOR   , XOR,     Ot::ModRMv,                  Ot::Registerv);
    inst!( 0x32, o, 0, 0b0000_0000_0000_0001, XOR   , XOR,     Ot::Register8,               Ot::ModRM8);
    inst!( 0x33, o, 0, 0b0000_0000_0000_0001, XOR   , XOR,     Ot::Registerv,               Ot::ModRMv);
    inst!( 0x34, o, 0, 0b0000_0000_0000_0000, XOR   , XOR,     Ot::FixedRegister8(0),       Ot::Immediate8);
    inst!( 0x35, o, 0, 0b0000_0000_0000_0000, XOR   , XOR,     Ot::FixedRegisterv(0),       Ot::Immediatev);
    inst!( 0x36, o, 0, 0b0000_0000_0000_0100,         Prefix,  Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x37, o, 0, 0b0000_0000_0001_0000,         AAA,     Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x38, o, 0, 0b0000_0000_0000_0001, CMP   , CMP,     Ot::ModRM8,                  Ot::Register8);
    inst!( 0x39, o, 0, 0b0000_0000_0000_0001, CMP   , CMP,     Ot::ModRMv,                  Ot::Registerv);
    inst!( 0x3A, o, 0, 0b0000_0000_0000_0001, CMP   , CMP,     Ot::Register8,               Ot::ModRM8);
    inst!( 0x3B, o, 0, 0b0000_0000_0000_0001, CMP   , CMP,     Ot::Registerv,               Ot::ModRMv);
    inst!( 0x3C, o, 0, 0b0000_0000_0000_0000, CMP   , CMP,     Ot::FixedRegister8(0),       Ot::Immediate8);
    inst!( 0x3D, o, 0, 0b0000_0000_0000_0000, CMP   , CMP,     Ot::FixedRegisterv(0),       Ot::Immediatev);
    inst!( 0x3E, o, 0, 0b0000_0000_0000_0100,         Prefix,  Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x3F, o, 0, 0b0000_0000_0001_0000,         AAS,     Ot::NoOperand,               Ot::NoOperand);
    // 0x40-0x4F decode as REX prefixes in long mode; the prefix scanner
    // consumes them before this table is consulted there.
    inst!( 0x40, o, 0, 0b0000_0000_0000_0000, INC   , INC,     Ot::OpcodeRegisterv(0),      Ot::NoOperand);
    inst!( 0x41, o, 0, 0b0000_0000_0000_0000, INC   , INC,     Ot::OpcodeRegisterv(1),      Ot::NoOperand);
    inst!( 0x42, o, 0, 0b0000_0000_0000_0000, INC   , INC,     Ot::OpcodeRegisterv(2),      Ot::NoOperand);
    inst!( 0x43, o, 0, 0b0000_0000_0000_0000, INC   , INC,     Ot::OpcodeRegisterv(3),      Ot::NoOperand);
    inst!( 0x44, o, 0, 0b0000_0000_0000_0000, INC   , INC,     Ot::OpcodeRegisterv(4),      Ot::NoOperand);
    inst!( 0x45, o, 0, 0b0000_0000_0000_0000, INC   , INC,     Ot::OpcodeRegisterv(5),      Ot::NoOperand);
    inst!( 0x46, o, 0, 0b0000_0000_0000_0000, INC   , INC,     Ot::OpcodeRegisterv(6),      Ot::NoOperand);
    inst!( 0x47, o, 0, 0b0000_0000_0000_0000, INC   , INC,     Ot::OpcodeRegisterv(7),      Ot::NoOperand);
    inst!( 0x48, o, 0, 0b0000_0000_0000_0000, DEC   , DEC,     Ot::OpcodeRegisterv(0),      Ot::NoOperand);
    inst!( 0x49, o, 0, 0b0000_0000_0000_0000, DEC   , DEC,     Ot::OpcodeRegisterv(1),      Ot::NoOperand);
    inst!( 0x4A, o, 0, 0b0000_0000_0000_0000, DEC   , DEC,     Ot::OpcodeRegisterv(2),      Ot::NoOperand);
    inst!( 0x4B, o, 0, 0b0000_0000_0000_0000, DEC   , DEC,     Ot::OpcodeRegisterv(3),      Ot::NoOperand);
    inst!( 0x4C, o, 0, 0b0000_0000_0000_0000, DEC   , DEC,     Ot::OpcodeRegisterv(4),      Ot::NoOperand);
    inst!( 0x4D, o, 0, 0b0000_0000_0000_0000, DEC   , DEC,     Ot::OpcodeRegisterv(5),      Ot::NoOperand);
    inst!( 0x4E, o, 0, 0b0000_0000_0000_0000, DEC   , DEC,     Ot::OpcodeRegisterv(6),      Ot::NoOperand);
    inst!( 0x4F, o, 0, 0b0000_0000_0000_0000, DEC   , DEC,     Ot::OpcodeRegisterv(7),      Ot::NoOperand);
    inst!( 0x50, o, 0, 0b0000_0000_0010_0000,         PUSH,    Ot::OpcodeRegisterv(0),      Ot::NoOperand);
    inst!( 0x51, o, 0, 0b0000_0000_0010_0000,         PUSH,    Ot::OpcodeRegisterv(1),      Ot::NoOperand);
    inst!( 0x52, o, 0, 0b0000_0000_0010_0000,         PUSH,    Ot::OpcodeRegisterv(2),      Ot::NoOperand);
    inst!( 0x53, o, 0, 0b0000_0000_0010_0000,         PUSH,    Ot::OpcodeRegisterv(3),      Ot::NoOperand);
    inst!( 0x54, o, 0, 0b0000_0000_0010_0000,         PUSH,    Ot::OpcodeRegisterv(4),      Ot::NoOperand);
    inst!( 0x55, o, 0, 0b0000_0000_0010_0000,         PUSH,    Ot::OpcodeRegisterv(5),      Ot::NoOperand);
    inst!( 0x56, o, 0, 0b0000_0000_0010_0000,         PUSH,    Ot::OpcodeRegisterv(6),      Ot::NoOperand);
    inst!( 0x57, o, 0, 0b0000_0000_0010_0000,         PUSH,    Ot::OpcodeRegisterv(7),      Ot::NoOperand);
    inst!( 0x58, o, 0, 0b0000_0000_0010_0000,         POP,     Ot::OpcodeRegisterv(0),      Ot::NoOperand);
    inst!( 0x59, o, 0, 0b0000_0000_0010_0000,         POP,     Ot::OpcodeRegisterv(1),      Ot::NoOperand);
    inst!( 0x5A, o, 0, 0b0000_0000_0010_0000,         POP,     Ot::OpcodeRegisterv(2),      Ot::NoOperand);
    inst!( 0x5B, o, 0, 0b0000_0000_0010_0000,         POP,     Ot::OpcodeRegisterv(3),      Ot::NoOperand);
    inst!( 0x5C, o, 0, 0b0000_0000_0010_0000,         POP,     Ot::OpcodeRegisterv(4),      Ot::NoOperand);
    inst!( 0x5D, o, 0, 0b0000_0000_0010_0000,         POP,     Ot::OpcodeRegisterv(5),      Ot::NoOperand);
    inst!( 0x5E, o, 0, 0b0000_0000_0010_0000,         POP,     Ot::OpcodeRegisterv(6),      Ot::NoOperand);
    inst!( 0x5F, o, 0, 0b0000_0000_0010_0000,         POP,     Ot::OpcodeRegisterv(7),      Ot::NoOperand);
    inst!( 0x60, o, 0, 0b0000_0001_0001_0000,         PUSHA,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x61, o, 0, 0b0000_0001_0001_0000,         POPA,    Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x62, o, 0, 0b0000_0001_0001_0011,         BOUND,   Ot::Registerv,               Ot::ModRMv);
    inst!( 0x63, o, 0, 0b0000_0010_0000_0001,         ARPL,    Ot::ModRM16,                 Ot::Register16);
    inst!( 0x64, o, 0, 0b0000_0100_0000_0100,         Prefix,  Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x65, o, 0, 0b0000_0100_0000_0100,         Prefix,  Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x66, o, 0, 0b0000_0100_0000_0100,         Prefix,  Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x67, o, 0, 0b0000_0100_0000_0100,         Prefix,  Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x68, o, 0, 0b0000_0001_0010_0000,         PUSH,    Ot::Immediatev,              Ot::NoOperand);
    inst!( 0x69, o, 0, 0b0000_0001_0000_0001,         IMUL,    Ot::Registerv,               Ot::ModRMv, Ot::Immediatev);
    inst!( 0x6A, o, 0, 0b0000_0001_0010_0000,         PUSH,    Ot::Immediate8SignExtendedv, Ot::NoOperand);
    inst!( 0x6B, o, 0, 0b0000_0001_0000_0001,         IMUL,    Ot::Registerv,               Ot::ModRMv, Ot::Immediate8SignExtendedv);
    inst!( 0x6C, o, 0, 0b0000_0001_0100_1000,         INSB,    Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x6D, o, 0, 0b0000_0001_0100_1000,         INSW,    Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x6E, o, 0, 0b0000_0001_0100_1000,         OUTSB,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x6F, o, 0, 0b0000_0001_0100_1000,         OUTSW,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x70, o, 0, 0b0010_0000_0000_0000,         JO,      Ot::Relative8,               Ot::NoOperand);
    inst!( 0x71, o, 0, 0b0010_0000_0000_0000,         JNO,     Ot::Relative8,               Ot::NoOperand);
    inst!( 0x72, o, 0, 0b0010_0000_0000_0000,         JB,      Ot::Relative8,               Ot::NoOperand);
    inst!( 0x73, o, 0, 0b0010_0000_0000_0000,         JNB,     Ot::Relative8,               Ot::NoOperand);
    inst!( 0x74, o, 0, 0b0010_0000_0000_0000,         JZ,      Ot::Relative8,               Ot::NoOperand);
    inst!( 0x75, o, 0, 0b0010_0000_0000_0000,         JNZ,     Ot::Relative8,               Ot::NoOperand);
    inst!( 0x76, o, 0, 0b0010_0000_0000_0000,         JBE,     Ot::Relative8,               Ot::NoOperand);
    inst!( 0x77, o, 0, 0b0010_0000_0000_0000,         JNBE,    Ot::Relative8,               Ot::NoOperand);
    inst!( 0x78, o, 0, 0b0010_0000_0000_0000,         JS,      Ot::Relative8,               Ot::NoOperand);
    inst!( 0x79, o, 0, 0b0010_0000_0000_0000,         JNS,     Ot::Relative8,               Ot::NoOperand);
    inst!( 0x7A, o, 0, 0b0010_0000_0000_0000,         JP,      Ot::Relative8,               Ot::NoOperand);
    inst!( 0x7B, o, 0, 0b0010_0000_0000_0000,         JNP,     Ot::Relative8,               Ot::NoOperand);
    inst!( 0x7C, o, 0, 0b0010_0000_0000_0000,         JL,      Ot::Relative8,               Ot::NoOperand);
    inst!( 0x7D, o, 0, 0b0010_0000_0000_0000,         JNL,     Ot::Relative8,               Ot::NoOperand);
    inst!( 0x7E, o, 0, 0b0010_0000_0000_0000,         JLE,     Ot::Relative8,               Ot::NoOperand);
    inst!( 0x7F, o, 0, 0b0010_0000_0000_0000,         JNLE,    Ot::Relative8,               Ot::NoOperand);
    inst!( 0x80, o, 1, 0b0000_0000_1000_0001,         Group,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x81, o, 2, 0b0000_0000_1000_0001,         Group,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x82, o, 3, 0b0000_0000_1001_0001,         Group,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x83, o, 4, 0b0000_0000_1000_0001,         Group,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x84, o, 0, 0b0000_0000_0000_0001, TEST  , TEST,    Ot::ModRM8,                  Ot::Register8);
    inst!( 0x85, o, 0, 0b0000_0000_0000_0001, TEST  , TEST,    Ot::ModRMv,                  Ot::Registerv);
    inst!( 0x86, o, 0, 0b0000_0000_1000_0001,         XCHG,    Ot::Register8,               Ot::ModRM8);
    inst!( 0x87, o, 0, 0b0000_0000_1000_0001,         XCHG,    Ot::Registerv,               Ot::ModRMv);
    inst!( 0x88, o, 0, 0b0000_0000_0000_0001,         MOV,     Ot::ModRM8,                  Ot::Register8);
    inst!( 0x89, o, 0, 0b0000_0000_0000_0001,         MOV,     Ot::ModRMv,                  Ot::Registerv);
    inst!( 0x8A, o, 0, 0b0000_0000_0000_0001,         MOV,     Ot::Register8,               Ot::ModRM8);
    inst!( 0x8B, o, 0, 0b0000_0000_0000_0001,         MOV,     Ot::Registerv,               Ot::ModRMv);
    inst!( 0x8C, o, 0, 0b0000_0000_0000_0001,         MOV,     Ot::ModRM16,                 Ot::SegmentRegister);
    inst!( 0x8D, o, 0, 0b0000_0000_0000_0011,         LEA,     Ot::Registerv,               Ot::ModRMv);
    inst!( 0x8E, o, 0, 0b0000_0000_0000_0001,         MOV,     Ot::SegmentRegister,         Ot::ModRM16);
    inst!( 0x8F, o, 0, 0b0000_0000_0010_0001,         POP,     Ot::ModRMv,                  Ot::NoOperand);
    inst!( 0x90, o, 0, 0b0000_0000_0000_0000,         NOP,     Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x91, o, 0, 0b0000_0000_0000_0000,         XCHG,    Ot::OpcodeRegisterv(1),      Ot::FixedRegisterv(0));
    inst!( 0x92, o, 0, 0b0000_0000_0000_0000,         XCHG,    Ot::OpcodeRegisterv(2),      Ot::FixedRegisterv(0));
    inst!( 0x93, o, 0, 0b0000_0000_0000_0000,         XCHG,    Ot::OpcodeRegisterv(3),      Ot::FixedRegisterv(0));
    inst!( 0x94, o, 0, 0b0000_0000_0000_0000,         XCHG,    Ot::OpcodeRegisterv(4),      Ot::FixedRegisterv(0));
    inst!( 0x95, o, 0, 0b0000_0000_0000_0000,         XCHG,    Ot::OpcodeRegisterv(5),      Ot::FixedRegisterv(0));
    inst!( 0x96, o, 0, 0b0000_0000_0000_0000,         XCHG,    Ot::OpcodeRegisterv(6),      Ot::FixedRegisterv(0));
    inst!( 0x97, o, 0, 0b0000_0000_0000_0000,         XCHG,    Ot::OpcodeRegisterv(7),      Ot::FixedRegisterv(0));
    inst!( 0x98, o, 0, 0b0000_0000_0000_0000,         CBW,     Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x99, o, 0, 0b0000_0000_0000_0000,         CWD,     Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x9A, o, 0, 0b0000_0000_0001_0000,         CALLF,   Ot::FarPointer,              Ot::NoOperand);
    inst!( 0x9B, o, 0, 0b0000_0000_0000_0000,         FWAIT,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x9C, o, 0, 0b0000_0000_0010_0000,         PUSHF,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x9D, o, 0, 0b0000_0000_0010_0000,         POPF,    Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x9E, o, 0, 0b0000_0000_0000_0000,         SAHF,    Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x9F, o, 0, 0b0000_0000_0000_0000,         LAHF,    Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xA0, o, 0, 0b0000_0000_0000_0000,         MOV,     Ot::FixedRegister8(0),       Ot::Offset8);
    inst!( 0xA1, o, 0, 0b0000_0000_0000_0000,         MOV,     Ot::FixedRegisterv(0),       Ot::Offsetv);
    inst!( 0xA2, o, 0, 0b0000_0000_0000_0000,         MOV,     Ot::Offset8,                 Ot::FixedRegister8(0));
    inst!( 0xA3, o, 0, 0b0000_0000_0000_0000,         MOV,     Ot::Offsetv,                 Ot::FixedRegisterv(0));
    inst!( 0xA4, o, 0, 0b0000_0000_0100_0000,         MOVSB,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xA5, o, 0, 0b0000_0000_0100_0000,         MOVSW,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xA6, o, 0, 0b0000_0000_0100_0000,         CMPSB,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xA7, o, 0, 0b0000_0000_0100_0000,         CMPSW,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xA8, o, 0, 0b0000_0000_0000_0000, TEST  , TEST,    Ot::FixedRegister8(0),       Ot::Immediate8);
    inst!( 0xA9, o, 0, 0b0000_0000_0000_0000, TEST  , TEST,    Ot::FixedRegisterv(0),       Ot::Immediatev);
    inst!( 0xAA, o, 0, 0b0000_0000_0100_0000,         STOSB,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xAB, o, 0, 0b0000_0000_0100_0000,         STOSW,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xAC, o, 0, 0b0000_0000_0100_0000,         LODSB,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xAD, o, 0, 0b0000_0000_0100_0000,         LODSW,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xAE, o, 0, 0b0000_0000_0100_0000,         SCASB,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xAF, o, 0, 0b0000_0000_0100_0000,         SCASW,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xB0, o, 0, 0b0000_0000_0000_0000,         MOV,     Ot::OpcodeRegister8(0),      Ot::Immediate8);
    inst!( 0xB1, o, 0, 0b0000_0000_0000_0000,         MOV,     Ot::OpcodeRegister8(1),      Ot::Immediate8);
    inst!( 0xB2, o, 0, 0b0000_0000_0000_0000,         MOV,     Ot::OpcodeRegister8(2),      Ot::Immediate8);
    inst!( 0xB3, o, 0, 0b0000_0000_0000_0000,         MOV,     Ot::OpcodeRegister8(3),      Ot::Immediate8);
    inst!( 0xB4, o, 0, 0b0000_0000_0000_0000,         MOV,     Ot::OpcodeRegister8(4),      Ot::Immediate8);
    inst!( 0xB5, o, 0, 0b0000_0000_0000_0000,         MOV,     Ot::OpcodeRegister8(5),      Ot::Immediate8);
    inst!( 0xB6, o, 0, 0b0000_0000_0000_0000,         MOV,     Ot::OpcodeRegister8(6),      Ot::Immediate8);
    inst!( 0xB7, o, 0, 0b0000_0000_0000_0000,         MOV,     Ot::OpcodeRegister8(7),      Ot::Immediate8);
    inst!( 0xB8, o, 0, 0b0000_0000_0000_0000,         MOV,     Ot::OpcodeRegisterv(0),      Ot::ImmediateFull);
    inst!( 0xB9, o, 0, 0b0000_0000_0000_0000,         MOV,     Ot::OpcodeRegisterv(1),      Ot::ImmediateFull);
    inst!( 0xBA, o, 0, 0b0000_0000_0000_0000,         MOV,     Ot::OpcodeRegisterv(2),      Ot::ImmediateFull);
    inst!( 0xBB, o, 0, 0b0000_0000_0000_0000,         MOV,     Ot::OpcodeRegisterv(3),      Ot::ImmediateFull);
    inst!( 0xBC, o, 0, 0b0000_0000_0000_0000,         MOV,     Ot::OpcodeRegisterv(4),      Ot::ImmediateFull);
    inst!( 0xBD, o, 0, 0b0000_0000_0000_0000,         MOV,     Ot::OpcodeRegisterv(5),      Ot::ImmediateFull);
    inst!( 0xBE, o, 0, 0b0000_0000_0000_0000,         MOV,     Ot::OpcodeRegisterv(6),      Ot::ImmediateFull);
    inst!( 0xBF, o, 0, 0b0000_0000_0000_0000,         MOV,     Ot::OpcodeRegisterv(7),      Ot::ImmediateFull);
    inst!( 0xC0, o, 5, 0b0000_0001_0000_0001,         Group,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xC1, o, 6, 0b0000_0001_0000_0001,         Group,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xC2, o, 0, 0b0010_0000_0000_0000,         RET,     Ot::Immediate16,             Ot::NoOperand);
    inst!( 0xC3, o, 0, 0b0010_0000_0000_0000,         RET,     Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xC4, o, 0, 0b0000_0000_0001_0011,         LES,     Ot::Registerv,               Ot::ModRMv);
    inst!( 0xC5, o, 0, 0b0000_0000_0001_0011,         LDS,     Ot::Registerv,               Ot::ModRMv);
    inst!( 0xC6, o, 0, 0b0000_0000_0000_0001,         MOV,     Ot::ModRM8,                  Ot::Immediate8);
    inst!( 0xC7, o, 0, 0b0000_0000_0000_0001,         MOV,     Ot::ModRMv,                  Ot::Immediatev);
    inst!( 0xC8, o, 0, 0b0000_0001_0000_0000,         ENTER,   Ot::Immediate16,             Ot::Immediate8);
    inst!( 0xC9, o, 0, 0b0000_0001_0010_0000,         LEAVE,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xCA, o, 0, 0b0000_0000_0000_0000,         RETF,    Ot::Immediate16,             Ot::NoOperand);
    inst!( 0xCB, o, 0, 0b0000_0000_0000_0000,         RETF,    Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xCC, o, 0, 0b0000_0000_0000_0000,         INT3,    Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xCD, o, 0, 0b0000_0000_0000_0000,         INT,     Ot::Immediate8,              Ot::NoOperand);
    inst!( 0xCE, o, 0, 0b0000_0000_0001_0000,         INTO,    Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xCF, o, 0, 0b0000_0000_0000_0000,         IRET,    Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xD0, o, 7, 0b0000_0000_0000_0001,         Group,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xD1, o, 8, 0b0000_0000_0000_0001,         Group,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xD2, o, 9, 0b0000_0000_0000_0001,         Group,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xD3, o,10, 0b0000_0000_0000_0001,         Group,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xD4, o, 0, 0b0000_0000_0001_0000,         AAM,     Ot::Immediate8,              Ot::NoOperand);
    inst!( 0xD5, o, 0, 0b0000_0000_0001_0000,         AAD,     Ot::Immediate8,              Ot::NoOperand);
    inst!( 0xD6, o, 0, 0b0000_0000_0001_0000,         SALC,    Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xD7, o, 0, 0b0000_0000_0000_0000,         XLAT,    Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xD8, o, 0, 0b0000_0000_0000_0001,         ESC,     Ot::ModRMEsc,                Ot::NoOperand);
    inst!( 0xD9, o, 0, 0b0000_0000_0000_0001,         ESC,     Ot::ModRMEsc,                Ot::NoOperand);
    inst!( 0xDA, o, 0, 0b0000_0000_0000_0001,         ESC,     Ot::ModRMEsc,                Ot::NoOperand);
    inst!( 0xDB, o, 0, 0b0000_0000_0000_0001,         ESC,     Ot::ModRMEsc,                Ot::NoOperand);
    inst!( 0xDC, o, 0, 0b0000_0000_0000_0001,         ESC,     Ot::ModRMEsc,                Ot::NoOperand);
    inst!( 0xDD, o, 0, 0b0000_0000_0000_0001,         ESC,     Ot::ModRMEsc,                Ot::NoOperand);
    inst!( 0xDE, o, 0, 0b0000_0000_0000_0001,         ESC,     Ot::ModRMEsc,                Ot::NoOperand);
    inst!( 0xDF, o, 0, 0b0000_0000_0000_0001,         ESC,     Ot::ModRMEsc,                Ot::NoOperand);
    inst!( 0xE0, o, 0, 0b0010_0000_0000_0000,         LOOPNE,  Ot::Relative8,               Ot::NoOperand);
    inst!( 0xE1, o, 0, 0b0010_0000_0000_0000,         LOOPE,   Ot::Relative8,               Ot::NoOperand);
    inst!( 0xE2, o, 0, 0b0010_0000_0000_0000,         LOOP,    Ot::Relative8,               Ot::NoOperand);
    inst!( 0xE3, o, 0, 0b0010_0000_0000_0000,         JCXZ,    Ot::Relative8,               Ot::NoOperand);
    inst!( 0xE4, o, 0, 0b0000_0000_0000_1000,         IN,      Ot::FixedRegister8(0),       Ot::Immediate8);
    inst!( 0xE5, o, 0, 0b0000_0000_0000_1000,         IN,      Ot::FixedRegisterv(0),       Ot::Immediate8);
    inst!( 0xE6, o, 0, 0b0000_0000_0000_1000,         OUT,     Ot::Immediate8,              Ot::FixedRegister8(0));
    inst!( 0xE7, o, 0, 0b0000_0000_0000_1000,         OUT,     Ot::Immediate8,              Ot::FixedRegisterv(0));
    inst!( 0xE8, o, 0, 0b0010_0000_0000_0000,         CALL,    Ot::Relativev,               Ot::NoOperand);
    inst!( 0xE9, o, 0, 0b0010_0000_0000_0000,         JMP,     Ot::Relativev,               Ot::NoOperand);
    inst!( 0xEA, o, 0, 0b0000_0000_0001_0000,         JMPF,    Ot::FarPointer,              Ot::NoOperand);
    inst!( 0xEB, o, 0, 0b0010_0000_0000_0000,         JMP,     Ot::Relative8,               Ot::NoOperand);
    inst!( 0xEC, o, 0, 0b0000_0000_0000_1000,         IN,      Ot::FixedRegister8(0),       Ot::FixedRegister16(2));
    inst!( 0xED, o, 0, 0b0000_0000_0000_1000,         IN,      Ot::FixedRegisterv(0),       Ot::FixedRegister16(2));
    inst!( 0xEE, o, 0, 0b0000_0000_0000_1000,         OUT,     Ot::FixedRegister16(2),      Ot::FixedRegister8(0));
    inst!( 0xEF, o, 0, 0b0000_0000_0000_1000,         OUT,     Ot::FixedRegister16(2),      Ot::FixedRegisterv(0));
    inst!( 0xF0, o, 0, 0b0000_0000_0000_0100,         LOCK,    Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xF1, o, 0, 0b0000_0000_0000_0000,         INT1,    Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xF2, o, 0, 0b0000_0000_0000_0100,         Prefix,  Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xF3, o, 0, 0b0000_0000_0000_0100,         Prefix,  Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xF4, o, 0, 0b0000_0000_0000_0000,         HLT,     Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xF5, o, 0, 0b0000_0000_0000_0000,         CMC,     Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xF6, o,11, 0b0000_0000_1000_0001,         Group,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xF7, o,12, 0b0000_0000_1000_0001,         Group,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xF8, o, 0, 0b0000_0000_0000_0000,         CLC,     Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xF9, o, 0, 0b0000_0000_0000_0000,         STC,     Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xFA, o, 0, 0b0000_0000_0000_0000,         CLI,     Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xFB, o, 0, 0b0000_0000_0000_0000,         STI,     Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xFC, o, 0, 0b0000_0000_0000_0000,         CLD,     Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xFD, o, 0, 0b0000_0000_0000_0000,         STD,     Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xFE, o,13, 0b0000_0000_1000_0001,         Group,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xFF, o,14, 0b0000_0000_1000_0001,         Group,   Ot::NoOperand,               Ot::NoOperand);
    // Group 1: 0x80 alu r/m8, imm8
    inst!( 0x80, o, 1, 0b0000_0000_1000_0001, ADD   , ADD,     Ot::ModRM8,                  Ot::Immediate8);
    inst!( 0x80, o, 1, 0b0000_0000_1000_0001, OR    , OR,      Ot::ModRM8,                  Ot::Immediate8);
    inst!( 0x80, o, 1, 0b0000_0000_1000_0001, ADC   , ADC,     Ot::ModRM8,                  Ot::Immediate8);
    inst!( 0x80, o, 1, 0b0000_0000_1000_0001, SBB   , SBB,     Ot::ModRM8,                  Ot::Immediate8);
    inst!( 0x80, o, 1, 0b0000_0000_1000_0001, AND   , AND,     Ot::ModRM8,                  Ot::Immediate8);
    inst!( 0x80, o, 1, 0b0000_0000_1000_0001, SUB   , SUB,     Ot::ModRM8,                  Ot::Immediate8);
    inst!( 0x80, o, 1, 0b0000_0000_1000_0001, XOR   , XOR,     Ot::ModRM8,                  Ot::Immediate8);
    inst!( 0x80, o, 1, 0b0000_0000_0000_0001, CMP   , CMP,     Ot::ModRM8,                  Ot::Immediate8);
    // Group 2: 0x81 alu r/mv, immv
    inst!( 0x81, o, 2, 0b0000_0000_1000_0001, ADD   , ADD,     Ot::ModRMv,                  Ot::Immediatev);
    inst!( 0x81, o, 2, 0b0000_0000_1000_0001, OR    , OR,      Ot::ModRMv,                  Ot::Immediatev);
    inst!( 0x81, o, 2, 0b0000_0000_1000_0001, ADC   , ADC,     Ot::ModRMv,                  Ot::Immediatev);
    inst!( 0x81, o, 2, 0b0000_0000_1000_0001, SBB   , SBB,     Ot::ModRMv,                  Ot::Immediatev);
    inst!( 0x81, o, 2, 0b0000_0000_1000_0001, AND   , AND,     Ot::ModRMv,                  Ot::Immediatev);
    inst!( 0x81, o, 2, 0b0000_0000_1000_0001, SUB   , SUB,     Ot::ModRMv,                  Ot::Immediatev);
    inst!( 0x81, o, 2, 0b0000_0000_1000_0001, XOR   , XOR,     Ot::ModRMv,                  Ot::Immediatev);
    inst!( 0x81, o, 2, 0b0000_0000_0000_0001, CMP   , CMP,     Ot::ModRMv,                  Ot::Immediatev);
    // Group 3: 0x82, an alias of 0x80; removed in long mode
    inst!( 0x82, o, 3, 0b0000_0000_1001_0001, ADD   , ADD,     Ot::ModRM8,                  Ot::Immediate8);
    inst!( 0x82, o, 3, 0b0000_0000_1001_0001, OR    , OR,      Ot::ModRM8,                  Ot::Immediate8);
    inst!( 0x82, o, 3, 0b0000_0000_1001_0001, ADC   , ADC,     Ot::ModRM8,                  Ot::Immediate8);
    inst!( 0x82, o, 3, 0b0000_0000_1001_0001, SBB   , SBB,     Ot::ModRM8,                  Ot::Immediate8);
    inst!( 0x82, o, 3, 0b0000_0000_1001_0001, AND   , AND,     Ot::ModRM8,                  Ot::Immediate8);
    inst!( 0x82, o, 3, 0b0000_0000_1001_0001, SUB   , SUB,     Ot::ModRM8,                  Ot::Immediate8);
    inst!( 0x82, o, 3, 0b0000_0000_1001_0001, XOR   , XOR,     Ot::ModRM8,                  Ot::Immediate8);
    inst!( 0x82, o, 3, 0b0000_0000_0001_0001, CMP   , CMP,     Ot::ModRM8,                  Ot::Immediate8);
    // Group 4: 0x83 alu r/mv, imm8 sign-extended
    inst!( 0x83, o, 4, 0b0000_0000_1000_0001, ADD   , ADD,     Ot::ModRMv,                  Ot::Immediate8SignExtendedv);
    inst!( 0x83, o, 4, 0b0000_0000_1000_0001, OR    , OR,      Ot::ModRMv,                  Ot::Immediate8SignExtendedv);
    inst!( 0x83, o, 4, 0b0000_0000_1000_0001, ADC   , ADC,     Ot::ModRMv,                  Ot::Immediate8SignExtendedv);
    inst!( 0x83, o, 4, 0b0000_0000_1000_0001, SBB   , SBB,     Ot::ModRMv,                  Ot::Immediate8SignExtendedv);
    inst!( 0x83, o, 4, 0b0000_0000_1000_0001, AND   , AND,     Ot::ModRMv,                  Ot::Immediate8SignExtendedv);
    inst!( 0x83, o, 4, 0b0000_0000_1000_0001, SUB   , SUB,     Ot::ModRMv,                  Ot::Immediate8SignExtendedv);
    inst!( 0x83, o, 4, 0b0000_0000_1000_0001, XOR   , XOR,     Ot::ModRMv,                  Ot::Immediate8SignExtendedv);
    inst!( 0x83, o, 4, 0b0000_0000_0000_0001, CMP   , CMP,     Ot::ModRMv,                  Ot::Immediate8SignExtendedv);
    // Group 5: 0xC0 shift r/m8, imm8 (186+)
    inst!( 0xC0, o, 5, 0b0000_0001_0000_0001, ROL   , ROL,     Ot::ModRM8,                  Ot::Immediate8);
    inst!( 0xC0, o, 5, 0b0000_0001_0000_0001, ROR   , ROR,     Ot::ModRM8,                  Ot::Immediate8);
    inst!( 0xC0, o, 5, 0b0000_0001_0000_0001, RCL   , RCL,     Ot::ModRM8,                  Ot::Immediate8);
    inst!( 0xC0, o, 5, 0b0000_0001_0000_0001, RCR   , RCR,     Ot::ModRM8,                  Ot::Immediate8);
    inst!( 0xC0, o, 5, 0b0000_0001_0000_0001, SHL   , SHL,     Ot::ModRM8,                  Ot::Immediate8);
    inst!( 0xC0, o, 5, 0b0000_0001_0000_0001, SHR   , SHR,     Ot::ModRM8,                  Ot::Immediate8);
    inst!( 0xC0, o, 5, 0b0000_0001_0000_0001, SHL   , SAL,     Ot::ModRM8,                  Ot::Immediate8);
    inst!( 0xC0, o, 5, 0b0000_0001_0000_0001, SAR   , SAR,     Ot::ModRM8,                  Ot::Immediate8);
    // Group 6: 0xC1 shift r/mv, imm8 (186+)
    inst!( 0xC1, o, 6, 0b0000_0001_0000_0001, ROL   , ROL,     Ot::ModRMv,                  Ot::Immediate8);
    inst!( 0xC1, o, 6, 0b0000_0001_0000_0001, ROR   , ROR,     Ot::ModRMv,                  Ot::Immediate8);
    inst!( 0xC1, o, 6, 0b0000_0001_0000_0001, RCL   , RCL,     Ot::ModRMv,                  Ot::Immediate8);
    inst!( 0xC1, o, 6, 0b0000_0001_0000_0001, RCR   , RCR,     Ot::ModRMv,                  Ot::Immediate8);
    inst!( 0xC1, o, 6, 0b0000_0001_0000_0001, SHL   , SHL,     Ot::ModRMv,                  Ot::Immediate8);
    inst!( 0xC1, o, 6, 0b0000_0001_0000_0001, SHR   , SHR,     Ot::ModRMv,                  Ot::Immediate8);
    inst!( 0xC1, o, 6, 0b0000_0001_0000_0001, SHL   , SAL,     Ot::ModRMv,                  Ot::Immediate8);
    inst!( 0xC1, o, 6, 0b0000_0001_0000_0001, SAR   , SAR,     Ot::ModRMv,                  Ot::Immediate8);
    // Group 7: 0xD0 shift r/m8, 1
    inst!( 0xD0, o, 7, 0b0000_0000_0000_0001, ROL   , ROL,     Ot::ModRM8,                  Ot::FixedImmediate8(1));
    inst!( 0xD0, o, 7, 0b0000_0000_0000_0001, ROR   , ROR,     Ot::ModRM8,                  Ot::FixedImmediate8(1));
    inst!( 0xD0, o, 7, 0b0000_0000_0000_0001, RCL   , RCL,     Ot::ModRM8,                  Ot::FixedImmediate8(1));
    inst!( 0xD0, o, 7, 0b0000_0000_0000_0001, RCR   , RCR,     Ot::ModRM8,                  Ot::FixedImmediate8(1));
    inst!( 0xD0, o, 7, 0b0000_0000_0000_0001, SHL   , SHL,     Ot::ModRM8,                  Ot::FixedImmediate8(1));
    inst!( 0xD0, o, 7, 0b0000_0000_0000_0001, SHR   , SHR,     Ot::ModRM8,                  Ot::FixedImmediate8(1));
    inst!( 0xD0, o, 7, 0b0000_0000_0000_0001, SHL   , SAL,     Ot::ModRM8,                  Ot::FixedImmediate8(1));
    inst!( 0xD0, o, 7, 0b0000_0000_0000_0001, SAR   , SAR,     Ot::ModRM8,                  Ot::FixedImmediate8(1));
    // Group 8: 0xD1 shift r/mv, 1
    inst!( 0xD1, o, 8, 0b0000_0000_0000_0001, ROL   , ROL,     Ot::ModRMv,                  Ot::FixedImmediate8(1));
    inst!( 0xD1, o, 8, 0b0000_0000_0000_0001, ROR   , ROR,     Ot::ModRMv,                  Ot::FixedImmediate8(1));
    inst!( 0xD1, o, 8, 0b0000_0000_0000_0001, RCL   , RCL,     Ot::ModRMv,                  Ot::FixedImmediate8(1));
    inst!( 0xD1, o, 8, 0b0000_0000_0000_0001, RCR   , RCR,     Ot::ModRMv,                  Ot::FixedImmediate8(1));
    inst!( 0xD1, o, 8, 0b0000_0000_0000_0001, SHL   , SHL,     Ot::ModRMv,                  Ot::FixedImmediate8(1));
    inst!( 0xD1, o, 8, 0b0000_0000_0000_0001, SHR   , SHR,     Ot::ModRMv,                  Ot::FixedImmediate8(1));
    inst!( 0xD1, o, 8, 0b0000_0000_0000_0001, SHL   , SAL,     Ot::ModRMv,                  Ot::FixedImmediate8(1));
    inst!( 0xD1, o, 8, 0b0000_0000_0000_0001, SAR   , SAR,     Ot::ModRMv,                  Ot::FixedImmediate8(1));
    // Group 9: 0xD2 shift r/m8, CL
    inst!( 0xD2, o, 9, 0b0000_0000_0000_0001, ROL   , ROL,     Ot::ModRM8,                  Ot::FixedRegister8(1));
    inst!( 0xD2, o, 9, 0b0000_0000_0000_0001, ROR   , ROR,     Ot::ModRM8,                  Ot::FixedRegister8(1));
    inst!( 0xD2, o, 9, 0b0000_0000_0000_0001, RCL   , RCL,     Ot::ModRM8,                  Ot::FixedRegister8(1));
    inst!( 0xD2, o, 9, 0b0000_0000_0000_0001, RCR   , RCR,     Ot::ModRM8,                  Ot::FixedRegister8(1));
    inst!( 0xD2, o, 9, 0b0000_0000_0000_0001, SHL   , SHL,     Ot::ModRM8,                  Ot::FixedRegister8(1));
    inst!( 0xD2, o, 9, 0b0000_0000_0000_0001, SHR   , SHR,     Ot::ModRM8,                  Ot::FixedRegister8(1));
    inst!( 0xD2, o, 9, 0b0000_0000_0000_0001, SHL   , SAL,     Ot::ModRM8,                  Ot::FixedRegister8(1));
    inst!( 0xD2, o, 9, 0b0000_0000_0000_0001, SAR   , SAR,     Ot::ModRM8,                  Ot::FixedRegister8(1));
    // Group 10: 0xD3 shift r/mv, CL
    inst!( 0xD3, o,10, 0b0000_0000_0000_0001, ROL   , ROL,     Ot::ModRMv,                  Ot::FixedRegister8(1));
    inst!( 0xD3, o,10, 0b0000_0000_0000_0001, ROR   , ROR,     Ot::ModRMv,                  Ot::FixedRegister8(1));
    inst!( 0xD3, o,10, 0b0000_0000_0000_0001, RCL   , RCL,     Ot::ModRMv,                  Ot::FixedRegister8(1));
    inst!( 0xD3, o,10, 0b0000_0000_0000_0001, RCR   , RCR,     Ot::ModRMv,                  Ot::FixedRegister8(1));
    inst!( 0xD3, o,10, 0b0000_0000_0000_0001, SHL   , SHL,     Ot::ModRMv,                  Ot::FixedRegister8(1));
    inst!( 0xD3, o,10, 0b0000_0000_0000_0001, SHR   , SHR,     Ot::ModRMv,                  Ot::FixedRegister8(1));
    inst!( 0xD3, o,10, 0b0000_0000_0000_0001, SHL   , SAL,     Ot::ModRMv,                  Ot::FixedRegister8(1));
    inst!( 0xD3, o,10, 0b0000_0000_0000_0001, SAR   , SAR,     Ot::ModRMv,                  Ot::FixedRegister8(1));
    // Group 11: 0xF6
    inst!( 0xF6, o,11, 0b0000_0000_0000_0001, TEST  , TEST,    Ot::ModRM8,                  Ot::Immediate8);
    inst!( 0xF6, o,11, 0b0000_0000_0000_0001, TEST  , TEST,    Ot::ModRM8,                  Ot::Immediate8);
    inst!( 0xF6, o,11, 0b0000_0000_1000_0001, NOT   , NOT,     Ot::ModRM8,                  Ot::NoOperand);
    inst!( 0xF6, o,11, 0b0000_0000_1000_0001, NEG   , NEG,     Ot::ModRM8,                  Ot::NoOperand);
    inst!( 0xF6, o,11, 0b0000_0000_0000_0001,         MUL,     Ot::ModRM8,                  Ot::NoOperand);
    inst!( 0xF6, o,11, 0b0000_0000_0000_0001,         IMUL,    Ot::ModRM8,                  Ot::NoOperand);
    inst!( 0xF6, o,11, 0b0000_0000_0000_0001,         DIV,     Ot::ModRM8,                  Ot::NoOperand);
    inst!( 0xF6, o,11, 0b0000_0000_0000_0001,         IDIV,    Ot::ModRM8,                  Ot::NoOperand);
    // Group 12: 0xF7
    inst!( 0xF7, o,12, 0b0000_0000_0000_0001, TEST  , TEST,    Ot::ModRMv,                  Ot::Immediatev);
    inst!( 0xF7, o,12, 0b0000_0000_0000_0001, TEST  , TEST,    Ot::ModRMv,                  Ot::Immediatev);
    inst!( 0xF7, o,12, 0b0000_0000_1000_0001, NOT   , NOT,     Ot::ModRMv,                  Ot::NoOperand);
    inst!( 0xF7, o,12, 0b0000_0000_1000_0001, NEG   , NEG,     Ot::ModRMv,                  Ot::NoOperand);
    inst!( 0xF7, o,12, 0b0000_0000_0000_0001,         MUL,     Ot::ModRMv,                  Ot::NoOperand);
    inst!( 0xF7, o,12, 0b0000_0000_0000_0001,         IMUL,    Ot::ModRMv,                  Ot::NoOperand);
    inst!( 0xF7, o,12, 0b0000_0000_0000_0001,         DIV,     Ot::ModRMv,                  Ot::NoOperand);
    inst!( 0xF7, o,12, 0b0000_0000_0000_0001,         IDIV,    Ot::ModRMv,                  Ot::NoOperand);
    // Group 13: 0xFE
    inst!( 0xFE, o,13, 0b0000_0000_1000_0001, INC   , INC,     Ot::ModRM8,                  Ot::NoOperand);
    inst!( 0xFE, o,13, 0b0000_0000_1000_0001, DEC   , DEC,     Ot::ModRM8,                  Ot::NoOperand);
    inst!( 0xFE, o,13, 0b0000_0000_0000_0001,         Invalid, Ot::ModRM8,                  Ot::NoOperand);
    inst!( 0xFE, o,13, 0b0000_0000_0000_0001,         Invalid, Ot::ModRM8,                  Ot::NoOperand);
    inst!( 0xFE, o,13, 0b0000_0000_0000_0001,         Invalid, Ot::ModRM8,                  Ot::NoOperand);
    inst!( 0xFE, o,13, 0b0000_0000_0000_0001,         Invalid, Ot::ModRM8,                  Ot::NoOperand);
    inst!( 0xFE, o,13, 0b0000_0000_0000_0001,         Invalid, Ot::ModRM8,                  Ot::NoOperand);
    inst!( 0xFE, o,13, 0b0000_0000_0000_0001,         Invalid, Ot::ModRM8,                  Ot::NoOperand);
    // Group 14: 0xFF
    inst!( 0xFF, o,14, 0b0000_0000_1000_0001, INC   , INC,     Ot::ModRMv,                  Ot::NoOperand);
    inst!( 0xFF, o,14, 0b0000_0000_1000_0001, DEC   , DEC,     Ot::ModRMv,                  Ot::NoOperand);
    inst!( 0xFF, o,14, 0b0010_0000_0000_0001,         CALL,    Ot::ModRMv,                  Ot::NoOperand);
    inst!( 0xFF, o,14, 0b0000_0000_0000_0011,         CALLF,   Ot::ModRMv,                  Ot::NoOperand);
    inst!( 0xFF, o,14, 0b0010_0000_0000_0001,         JMP,     Ot::ModRMv,                  Ot::NoOperand);
    inst!( 0xFF, o,14, 0b0000_0000_0000_0011,         JMPF,    Ot::ModRMv,                  Ot::NoOperand);
    inst!( 0xFF, o,14, 0b0000_0000_0010_0001,         PUSH,    Ot::ModRMv,                  Ot::NoOperand);
    inst!( 0xFF, o,14, 0b0000_0000_0000_0001,         Invalid, Ot::ModRMv,                  Ot::NoOperand);

    assert!(o.idx == o.table.len());
    o.table
};

#[rustfmt::skip]
pub static EXTENDED_BASE: [InstTemplate; EXTENDED_OPS_LEN] = {
    let mut o: TableInitializer<EXTENDED_OPS_LEN> = TableInitializer::new();
    inst!( 0x00, o, 1, 0b0000_0010_0000_0001,         Group,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x01, o, 2, 0b0000_0010_0000_0001,         Group,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x02, o, 0, 0b0000_0010_0000_0001,         LAR,     Ot::Registerv,               Ot::ModRM16);
    inst!( 0x03, o, 0, 0b0000_0010_0000_0001,         LSL,     Ot::Registerv,               Ot::ModRM16);
    inst_skip!(o, 2); // 0x04, 0x05
    inst!( 0x06, o, 0, 0b0000_0010_0000_0000,         CLTS,    Ot::NoOperand,               Ot::NoOperand);
    inst_skip!(o, 4); // 0x07-0x0A
    inst!( 0x0B, o, 0, 0b0000_0010_0000_0000,         UD2,     Ot::NoOperand,               Ot::NoOperand);
    inst_skip!(o, 19); // 0x0C-0x1E
    inst!( 0x1F, o, 0, 0b0000_0100_0000_0001,         NOP,     Ot::ModRMv,                  Ot::NoOperand);
    inst!( 0x20, o, 0, 0b0000_0100_0000_0001,         MOV,     Ot::ModRMd,                  Ot::ControlRegister);
    inst!( 0x21, o, 0, 0b0000_0100_0000_0001,         MOV,     Ot::ModRMd,                  Ot::DebugRegister);
    inst!( 0x22, o, 0, 0b0000_0100_0000_0001,         MOV,     Ot::ControlRegister,         Ot::ModRMd);
    inst!( 0x23, o, 0, 0b0000_0100_0000_0001,         MOV,     Ot::DebugRegister,           Ot::ModRMd);
    inst_skip!(o, 12); // 0x24-0x2F
    inst!( 0x30, o, 0, 0b0001_0000_0000_0000,         WRMSR,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x31, o, 0, 0b0001_0000_0000_0000,         RDTSC,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x32, o, 0, 0b0001_0000_0000_0000,         RDMSR,   Ot::NoOperand,               Ot::NoOperand);
    inst_skip!(o, 13); // 0x33-0x3F
    inst!( 0x40, o, 0, 0b0001_0000_0000_0001,         CMOVO,   Ot::Registerv,               Ot::ModRMv);
    inst!( 0x41, o, 0, 0b0001_0000_0000_0001,         CMOVNO,  Ot::Registerv,               Ot::ModRMv);
    inst!( 0x42, o, 0, 0b0001_0000_0000_0001,         CMOVB,   Ot::Registerv,               Ot::ModRMv);
    inst!( 0x43, o, 0, 0b0001_0000_0000_0001,         CMOVNB,  Ot::Registerv,               Ot::ModRMv);
    inst!( 0x44, o, 0, 0b0001_0000_0000_0001,         CMOVZ,   Ot::Registerv,               Ot::ModRMv);
    inst!( 0x45, o, 0, 0b0001_0000_0000_0001,         CMOVNZ,  Ot::Registerv,               Ot::ModRMv);
    inst!( 0x46, o, 0, 0b0001_0000_0000_0001,         CMOVBE,  Ot::Registerv,               Ot::ModRMv);
    inst!( 0x47, o, 0, 0b0001_0000_0000_0001,         CMOVNBE, Ot::Registerv,               Ot::ModRMv);
    inst!( 0x48, o, 0, 0b0001_0000_0000_0001,         CMOVS,   Ot::Registerv,               Ot::ModRMv);
    inst!( 0x49, o, 0, 0b0001_0000_0000_0001,         CMOVNS,  Ot::Registerv,               Ot::ModRMv);
    inst!( 0x4A, o, 0, 0b0001_0000_0000_0001,         CMOVP,   Ot::Registerv,               Ot::ModRMv);
    inst!( 0x4B, o, 0, 0b0001_0000_0000_0001,         CMOVNP,  Ot::Registerv,               Ot::ModRMv);
    inst!( 0x4C, o, 0, 0b0001_0000_0000_0001,         CMOVL,   Ot::Registerv,               Ot::ModRMv);
    inst!( 0x4D, o, 0, 0b0001_0000_0000_0001,         CMOVNL,  Ot::Registerv,               Ot::ModRMv);
    inst!( 0x4E, o, 0, 0b0001_0000_0000_0001,         CMOVLE,  Ot::Registerv,               Ot::ModRMv);
    inst!( 0x4F, o, 0, 0b0001_0000_0000_0001,         CMOVNLE, Ot::Registerv,               Ot::ModRMv);
    inst_skip!(o, 48); // 0x50-0x7F: SSE/MMX territory, patched to NotImpl
    inst!( 0x80, o, 0, 0b0010_0100_0000_0000,         JO,      Ot::Relativev,               Ot::NoOperand);
    inst!( 0x81, o, 0, 0b0010_0100_0000_0000,         JNO,     Ot::Relativev,               Ot::NoOperand);
    inst!( 0x82, o, 0, 0b0010_0100_0000_0000,         JB,      Ot::Relativev,               Ot::NoOperand);
    inst!( 0x83, o, 0, 0b0010_0100_0000_0000,         JNB,     Ot::Relativev,               Ot::NoOperand);
    inst!( 0x84, o, 0, 0b0010_0100_0000_0000,         JZ,      Ot::Relativev,               Ot::NoOperand);
    inst!( 0x85, o, 0, 0b0010_0100_0000_0000,         JNZ,     Ot::Relativev,               Ot::NoOperand);
    inst!( 0x86, o, 0, 0b0010_0100_0000_0000,         JBE,     Ot::Relativev,               Ot::NoOperand);
    inst!( 0x87, o, 0, 0b0010_0100_0000_0000,         JNBE,    Ot::Relativev,               Ot::NoOperand);
    inst!( 0x88, o, 0, 0b0010_0100_0000_0000,         JS,      Ot::Relativev,               Ot::NoOperand);
    inst!( 0x89, o, 0, 0b0010_0100_0000_0000,         JNS,     Ot::Relativev,               Ot::NoOperand);
    inst!( 0x8A, o, 0, 0b0010_0100_0000_0000,         JP,      Ot::Relativev,               Ot::NoOperand);
    inst!( 0x8B, o, 0, 0b0010_0100_0000_0000,         JNP,     Ot::Relativev,               Ot::NoOperand);
    inst!( 0x8C, o, 0, 0b0010_0100_0000_0000,         JL,      Ot::Relativev,               Ot::NoOperand);
    inst!( 0x8D, o, 0, 0b0010_0100_0000_0000,         JNL,     Ot::Relativev,               Ot::NoOperand);
    inst!( 0x8E, o, 0, 0b0010_0100_0000_0000,         JLE,     Ot::Relativev,               Ot::NoOperand);
    inst!( 0x8F, o, 0, 0b0010_0100_0000_0000,         JNLE,    Ot::Relativev,               Ot::NoOperand);
    inst!( 0x90, o, 0, 0b0000_0100_0000_0001,         SETO,    Ot::ModRM8,                  Ot::NoOperand);
    inst!( 0x91, o, 0, 0b0000_0100_0000_0001,         SETNO,   Ot::ModRM8,                  Ot::NoOperand);
    inst!( 0x92, o, 0, 0b0000_0100_0000_0001,         SETB,    Ot::ModRM8,                  Ot::NoOperand);
    inst!( 0x93, o, 0, 0b0000_0100_0000_0001,         SETNB,   Ot::ModRM8,                  Ot::NoOperand);
    inst!( 0x94, o, 0, 0b0000_0100_0000_0001,         SETZ,    Ot::ModRM8,                  Ot::NoOperand);
    inst!( 0x95, o, 0, 0b0000_0100_0000_0001,         SETNZ,   Ot::ModRM8,                  Ot::NoOperand);
    inst!( 0x96, o, 0, 0b0000_0100_0000_0001,         SETBE,   Ot::ModRM8,                  Ot::NoOperand);
    inst!( 0x97, o, 0, 0b0000_0100_0000_0001,         SETNBE,  Ot::ModRM8,                  Ot::NoOperand);
    inst!( 0x98, o, 0, 0b0000_0100_0000_0001,         SETS,    Ot::ModRM8,                  Ot::NoOperand);
    inst!( 0x99, o, 0, 0b0000_0100_0000_0001,         SETNS,   Ot::ModRM8,                  Ot::NoOperand);
    inst!( 0x9A, o, 0, 0b0000_0100_0000_0001,         SETP,    Ot::ModRM8,                  Ot::NoOperand);
    inst!( 0x9B, o, 0, 0b0000_0100_0000_0001,         SETNP,   Ot::ModRM8,                  Ot::NoOperand);
    inst!( 0x9C, o, 0, 0b0000_0100_0000_0001,         SETL,    Ot::ModRM8,                  Ot::NoOperand);
    inst!( 0x9D, o, 0, 0b0000_0100_0000_0001,         SETNL,   Ot::ModRM8,                  Ot::NoOperand);
    inst!( 0x9E, o, 0, 0b0000_0100_0000_0001,         SETLE,   Ot::ModRM8,                  Ot::NoOperand);
    inst!( 0x9F, o, 0, 0b0000_0100_0000_0001,         SETNLE,  Ot::ModRM8,                  Ot::NoOperand);
    inst!( 0xA0, o, 0, 0b0000_0100_0010_0000,         PUSH,    Ot::FixedSegment(Segment::FS), Ot::NoOperand);
    inst!( 0xA1, o, 0, 0b0000_0100_0010_0000,         POP,     Ot::FixedSegment(Segment::FS), Ot::NoOperand);
    inst!( 0xA2, o, 0, 0b0001_0000_0000_0000,         CPUID,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xA3, o, 0, 0b0000_0100_0000_0001,         BT,      Ot::ModRMv,                  Ot::Registerv);
    inst!( 0xA4, o, 0, 0b0000_0100_0000_0001,         SHLD,    Ot::ModRMv,                  Ot::Registerv, Ot::Immediate8);
    inst!( 0xA5, o, 0, 0b0000_0100_0000_0001,         SHLD,    Ot::ModRMv,                  Ot::Registerv, Ot::FixedRegister8(1));
    inst_skip!(o, 2); // 0xA6, 0xA7
    inst!( 0xA8, o, 0, 0b0000_0100_0010_0000,         PUSH,    Ot::FixedSegment(Segment::GS), Ot::NoOperand);
    inst!( 0xA9, o, 0, 0b0000_0100_0010_0000,         POP,     Ot::FixedSegment(Segment::GS), Ot::NoOperand);
    inst!( 0xAA, o, 0, 0b0000_0100_0000_0000,         RSM,     Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xAB, o, 0, 0b0000_0100_1000_0001,         BTS,     Ot::ModRMv,                  Ot::Registerv);
    inst!( 0xAC, o, 0, 0b0000_0100_0000_0001,         SHRD,    Ot::ModRMv,                  Ot::Registerv, Ot::Immediate8);
    inst!( 0xAD, o, 0, 0b0000_0100_0000_0001,         SHRD,    Ot::ModRMv,                  Ot::Registerv, Ot::FixedRegister8(1));
    inst_skip!(o, 1); // 0xAE: FXSAVE group, patched to NotImpl
    inst!( 0xAF, o, 0, 0b0000_0100_0000_0001,         IMUL,    Ot::Registerv,               Ot::ModRMv);
    inst!( 0xB0, o, 0, 0b0000_1000_1000_0001,         CMPXCHG, Ot::ModRM8,                  Ot::Register8);
    inst!( 0xB1, o, 0, 0b0000_1000_1000_0001,         CMPXCHG, Ot::ModRMv,                  Ot::Registerv);
    inst!( 0xB2, o, 0, 0b0000_0100_0000_0011,         LSS,     Ot::Registerv,               Ot::ModRMv);
    inst!( 0xB3, o, 0, 0b0000_0100_1000_0001,         BTR,     Ot::ModRMv,                  Ot::Registerv);
    inst!( 0xB4, o, 0, 0b0000_0100_0000_0011,         LFS,     Ot::Registerv,               Ot::ModRMv);
    inst!( 0xB5, o, 0, 0b0000_0100_0000_0011,         LGS,     Ot::Registerv,               Ot::ModRMv);
    inst!( 0xB6, o, 0, 0b0000_0100_0000_0001,         MOVZX,   Ot::Registerv,               Ot::ModRM8);
    inst!( 0xB7, o, 0, 0b0000_0100_0000_0001,         MOVZX,   Ot::Registerv,               Ot::ModRM16);
    inst_skip!(o, 2); // 0xB8 (POPCNT under F3, patched), 0xB9
    inst!( 0xBA, o, 3, 0b0000_0100_0000_0001,         Group,   Ot::NoOperand,               Ot::NoOperand);
    inst!( 0xBB, o, 0, 0b0000_0100_1000_0001,         BTC,     Ot::ModRMv,                  Ot::Registerv);
    inst!( 0xBC, o, 0, 0b0000_0100_0000_0001,         BSF,     Ot::Registerv,               Ot::ModRMv);
    inst!( 0xBD, o, 0, 0b0000_0100_0000_0001,         BSR,     Ot::Registerv,               Ot::ModRMv);
    inst!( 0xBE, o, 0, 0b0000_0100_0000_0001,         MOVSX,   Ot::Registerv,               Ot::ModRM8);
    inst!( 0xBF, o, 0, 0b0000_0100_0000_0001,         MOVSX,   Ot::Registerv,               Ot::ModRM16);
    inst!( 0xC0, o, 0, 0b0000_1000_1000_0001,         XADD,    Ot::ModRM8,                  Ot::Register8);
    inst!( 0xC1, o, 0, 0b0000_1000_1000_0001,         XADD,    Ot::ModRMv,                  Ot::Registerv);
    inst_skip!(o, 6); // 0xC2-0xC7: SSE, patched to NotImpl
    inst!( 0xC8, o, 0, 0b0000_1000_0000_0000,         BSWAP,   Ot::OpcodeRegisterv(0),      Ot::NoOperand);
    inst!( 0xC9, o, 0, 0b0000_1000_0000_0000,         BSWAP,   Ot::OpcodeRegisterv(1),      Ot::NoOperand);
    inst!( 0xCA, o, 0, 0b0000_1000_0000_0000,         BSWAP,   Ot::OpcodeRegisterv(2),      Ot::NoOperand);
    inst!( 0xCB, o, 0, 0b0000_1000_0000_0000,         BSWAP,   Ot::OpcodeRegisterv(3),      Ot::NoOperand);
    inst!( 0xCC, o, 0, 0b0000_1000_0000_0000,         BSWAP,   Ot::OpcodeRegisterv(4),      Ot::NoOperand);
    inst!( 0xCD, o, 0, 0b0000_1000_0000_0000,         BSWAP,   Ot::OpcodeRegisterv(5),      Ot::NoOperand);
    inst!( 0xCE, o, 0, 0b0000_1000_0000_0000,         BSWAP,   Ot::OpcodeRegisterv(6),      Ot::NoOperand);
    inst!( 0xCF, o, 0, 0b0000_1000_0000_0000,         BSWAP,   Ot::OpcodeRegisterv(7),      Ot::NoOperand);
    inst_skip!(o, 48); // 0xD0-0xFF: SSE/MMX, patched to NotImpl
    // Extended group 1: 0F 00
    inst!( 0x00, o, 1, 0b0000_0010_0000_0001,         SLDT,    Ot::ModRM16,                 Ot::NoOperand);
    inst!( 0x00, o, 1, 0b0000_0010_0000_0001,         STR,     Ot::ModRM16,                 Ot::NoOperand);
    inst!( 0x00, o, 1, 0b0000_0010_0000_0001,         LLDT,    Ot::ModRM16,                 Ot::NoOperand);
    inst!( 0x00, o, 1, 0b0000_0010_0000_0001,         LTR,     Ot::ModRM16,                 Ot::NoOperand);
    inst!( 0x00, o, 1, 0b0000_0010_0000_0001,         VERR,    Ot::ModRM16,                 Ot::NoOperand);
    inst!( 0x00, o, 1, 0b0000_0010_0000_0001,         VERW,    Ot::ModRM16,                 Ot::NoOperand);
    inst!( 0x00, o, 1, 0b0000_0010_0000_0001,         Invalid, Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x00, o, 1, 0b0000_0010_0000_0001,         Invalid, Ot::NoOperand,               Ot::NoOperand);
    // Extended group 2: 0F 01
    inst!( 0x01, o, 2, 0b0000_0010_0000_0011,         SGDT,    Ot::ModRMv,                  Ot::NoOperand);
    inst!( 0x01, o, 2, 0b0000_0010_0000_0011,         SIDT,    Ot::ModRMv,                  Ot::NoOperand);
    inst!( 0x01, o, 2, 0b0000_0010_0000_0011,         LGDT,    Ot::ModRMv,                  Ot::NoOperand);
    inst!( 0x01, o, 2, 0b0000_0010_0000_0011,         LIDT,    Ot::ModRMv,                  Ot::NoOperand);
    inst!( 0x01, o, 2, 0b0000_0010_0000_0001,         SMSW,    Ot::ModRM16,                 Ot::NoOperand);
    inst!( 0x01, o, 2, 0b0000_0010_0000_0001,         Invalid, Ot::NoOperand,               Ot::NoOperand);
    inst!( 0x01, o, 2, 0b0000_0010_0000_0001,         LMSW,    Ot::ModRM16,                 Ot::NoOperand);
    inst!( 0x01, o, 2, 0b0000_0100_0000_0011,         INVLPG,  Ot::ModRMv,                  Ot::NoOperand);
    // Extended group 3: 0F BA
    inst!( 0xBA, o, 3, 0b0000_0100_0000_0001,         Invalid, Ot::ModRMv,                  Ot::NoOperand);
    inst!( 0xBA, o, 3, 0b0000_0100_0000_0001,         Invalid, Ot::ModRMv,                  Ot::NoOperand);
    inst!( 0xBA, o, 3, 0b0000_0100_0000_0001,         Invalid, Ot::ModRMv,                  Ot::NoOperand);
    inst!( 0xBA, o, 3, 0b0000_0100_0000_0001,         Invalid, Ot::ModRMv,                  Ot::NoOperand);
    inst!( 0xBA, o, 3, 0b0000_0100_0000_0001,         BT,      Ot::ModRMv,                  Ot::Immediate8);
    inst!( 0xBA, o, 3, 0b0000_0100_1000_0001,         BTS,     Ot::ModRMv,                  Ot::Immediate8);
    inst!( 0xBA, o, 3, 0b0000_0100_1000_0001,         BTR,     Ot::ModRMv,                  Ot::Immediate8);
    inst!( 0xBA, o, 3, 0b0000_0100_1000_0001,         BTC,     Ot::ModRMv,                  Ot::Immediate8);

    assert!(o.idx == o.table.len());
    o.table
};

lazy_static! {
    /// The extended (0F) dispatch map proper: 256 opcodes x 4 mandatory
    /// prefix columns. Most entries are identical across columns; the
    /// overrides below install prefix-selected variants and mark the
    /// SSE/MMX space as recognized-but-unimplemented so decode still
    /// consumes operand bytes correctly.
    static ref EXTENDED_MAP: Box<[[InstTemplate; 4]; 256]> = build_extended_map();
}

fn build_extended_map() -> Box<[[InstTemplate; 4]; 256]> {
    let mut map = Box::new([[InstTemplate::constdefault(); 4]; 256]);

    for (op, row) in map.iter_mut().enumerate() {
        *row = [EXTENDED_BASE[op]; 4];
    }

    let not_impl_modrm = InstTemplate {
        grp: 0,
        gdr: GdrEntry(GDR_HAS_MODRM | GDR_MIN_586),
        xi: None,
        mnemonic: Mnemonic::NotImpl,
        operand1: OperandTemplate::ModRMv,
        operand2: OperandTemplate::NoOperand,
        operand3: OperandTemplate::NoOperand,
    };

    // SSE/MMX ranges: recognized encodings this core does not execute.
    for op in 0x10..=0x17 {
        map[op] = [not_impl_modrm; 4];
    }
    for op in 0x28..=0x2F {
        map[op] = [not_impl_modrm; 4];
    }
    for op in 0x50..=0x7F {
        map[op] = [not_impl_modrm; 4];
    }
    for op in 0xC2..=0xC7 {
        map[op] = [not_impl_modrm; 4];
    }
    for op in 0xD0..=0xFF {
        map[op] = [not_impl_modrm; 4];
    }
    map[0xAE] = [not_impl_modrm; 4];

    // 0F B8: POPCNT with the F3 mandatory prefix, invalid otherwise.
    let popcnt = InstTemplate {
        grp: 0,
        gdr: GdrEntry(GDR_HAS_MODRM | GDR_MIN_586),
        xi: None,
        mnemonic: Mnemonic::POPCNT,
        operand1: OperandTemplate::Registerv,
        operand2: OperandTemplate::ModRMv,
        operand3: OperandTemplate::NoOperand,
    };
    map[0xB8][PREFIX_INDEX_F3] = popcnt;

    map
}

pub const PREFIX_INDEX_NONE: usize = 0;
pub const PREFIX_INDEX_66: usize = 1;
pub const PREFIX_INDEX_F3: usize = 2;
pub const PREFIX_INDEX_F2: usize = 3;

/* ----------------------------- Decode context --------------------------- */

/// Per-instruction decode state, created fresh for every instruction and
/// discarded on completion or fault. The durable fields are copied into the
/// resulting Instruction.
#[derive(Copy, Clone, Debug)]
pub struct DecodeContext {
    pub mode: CpuMode,
    pub model: CpuModel,
    pub operand_size: OperandSize,
    pub address_size: AddressSize,
    pub segment_override: Option<Segment>,
    pub prefix_flags: u32,
    pub rex: Option<RexPrefix>,
    pub vex: Option<VexPrefix>,
    pub prefix_index: u8,
    pub cursor: u32,
}

impl DecodeContext {
    pub fn new(mode: CpuMode, model: CpuModel) -> Self {
        Self {
            mode,
            model,
            operand_size: mode.default_operand_size(),
            address_size: mode.default_address_size(),
            segment_override: None,
            prefix_flags: 0,
            rex: None,
            vex: None,
            prefix_index: 0,
            cursor: 0,
        }
    }
}

/* --------------------------------- Decode ------------------------------- */

/// Decode one instruction from the byte window. Pure: no register or memory
/// state is touched, and the same window always yields the same Instruction.
#[rustfmt::skip]
pub fn decode(
    bytes: &mut impl ByteQueue,
    mode: CpuMode,
    model: CpuModel,
) -> Result<Instruction, DecodeError> {
    let mut ctx = DecodeContext::new(mode, model);
    let mut size: u32 = 1;
    let mut opcode = bytes.q_read_u8()?;
    let mut extended = false;

    // Scan prefixes until a real opcode byte is found. A legacy prefix
    // arriving after a REX clears the recorded REX state; REX is only valid
    // immediately before the opcode.
    loop {
        match opcode {
            0x26 => {
                ctx.prefix_flags |= PrefixFlags::ES_OVERRIDE;
                ctx.segment_override = Some(Segment::ES);
                ctx.rex = None;
            }
            0x2E => {
                ctx.prefix_flags |= PrefixFlags::CS_OVERRIDE;
                ctx.segment_override = Some(Segment::CS);
                ctx.rex = None;
            }
            0x36 => {
                ctx.prefix_flags |= PrefixFlags::SS_OVERRIDE;
                ctx.segment_override = Some(Segment::SS);
                ctx.rex = None;
            }
            0x3E => {
                ctx.prefix_flags |= PrefixFlags::DS_OVERRIDE;
                ctx.segment_override = Some(Segment::DS);
                ctx.rex = None;
            }
            0x64 if model.minimum(CpuModel::Cpu80386) => {
                ctx.prefix_flags |= PrefixFlags::FS_OVERRIDE;
                ctx.segment_override = Some(Segment::FS);
                ctx.rex = None;
            }
            0x65 if model.minimum(CpuModel::Cpu80386) => {
                ctx.prefix_flags |= PrefixFlags::GS_OVERRIDE;
                ctx.segment_override = Some(Segment::GS);
                ctx.rex = None;
            }
            0x66 if model.minimum(CpuModel::Cpu80386) => {
                ctx.prefix_flags |= PrefixFlags::OPERAND_SIZE;
                ctx.rex = None;
            }
            0x67 if model.minimum(CpuModel::Cpu80386) => {
                ctx.prefix_flags |= PrefixFlags::ADDRESS_SIZE;
                ctx.rex = None;
            }
            0xF0 => {
                ctx.prefix_flags |= PrefixFlags::LOCK;
                ctx.rex = None;
            }
            0xF2 => {
                ctx.prefix_flags |= PrefixFlags::REPNE;
                ctx.rex = None;
            }
            0xF3 => {
                ctx.prefix_flags |= PrefixFlags::REP;
                ctx.rex = None;
            }
            0x40..=0x4F if mode.is_long() => {
                // REX. The last REX before the opcode wins.
                ctx.prefix_flags |= PrefixFlags::REX;
                ctx.rex = Some(RexPrefix::from_bytes([opcode]));
            }
            _ => break,
        }
        if size >= MAX_INSTRUCTION_LENGTH {
            return Err(DecodeError::TooLong);
        }
        opcode = bytes.q_read_u8()?;
        size += 1;
    }

    // VEX/XOP/EVEX lead bytes overlap legacy LES/LDS/BOUND/POP encodings.
    // Commit to the prefix interpretation only when the mode forbids the
    // legacy form or the following byte is in register-operand form; peek
    // before consuming.
    match opcode {
        0xC4 | 0xC5 if model.supports(CpuFeature::Vex) => {
            let next = bytes.q_peek_u8()?;
            if mode.is_long() || next & 0xC0 == 0xC0 {
                return decode_vex(bytes, ctx, opcode, size);
            }
        }
        0x8F if model.supports(CpuFeature::Xop) => {
            let next = bytes.q_peek_u8()?;
            // XOP only when the map field selects map 8+; otherwise POP r/m.
            if next & 0x1F >= 8 {
                return decode_vex(bytes, ctx, opcode, size);
            }
        }
        0x62 if mode.is_long() => {
            // EVEX: recognized, not implemented. (Outside long mode 0x62 is
            // BOUND unless the next byte is in register form.)
            return Err(DecodeError::InvalidOpcode(0x62));
        }
        _ => {}
    }

    // Two-byte escape, gated on the target model: pre-286 parts decode 0x0F
    // as POP CS via the primary table instead.
    if opcode == 0x0F && model.has_0f_escape() {
        extended = true;
        ctx.prefix_flags |= PrefixFlags::EXTENDED_0F;
        opcode = bytes.q_read_u8()?;
        size += 1;
    }

    // Pre-186 models alias several later encodings onto older instructions.
    if !extended && !model.minimum(CpuModel::Cpu80186) {
        opcode = match opcode {
            0x60..=0x6F => opcode + 0x10, // short jumps alias
            0xC0 => 0xC2,
            0xC1 => 0xC3,
            0xC8 => 0xCA,
            0xC9 => 0xCB,
            _ => opcode,
        };
    }

    // Mandatory-prefix column: REP/REPNE take priority over operand size.
    ctx.prefix_index = if ctx.prefix_flags & PrefixFlags::REPNE != 0 {
        PREFIX_INDEX_F2 as u8
    }
    else if ctx.prefix_flags & PrefixFlags::REP != 0 {
        PREFIX_INDEX_F3 as u8
    }
    else if ctx.prefix_flags & PrefixFlags::OPERAND_SIZE != 0 {
        PREFIX_INDEX_66 as u8
    }
    else {
        PREFIX_INDEX_NONE as u8
    };

    // Effective sizes from the prefix *set* present, never their order.
    if ctx.prefix_flags & PrefixFlags::OPERAND_SIZE != 0 {
        ctx.operand_size = mode.operand_size_override();
    }
    if ctx.prefix_flags & PrefixFlags::ADDRESS_SIZE != 0 {
        ctx.address_size = mode.address_size_override();
    }
    if ctx.rex.map(|r| r.w()).unwrap_or(false) {
        // REX.W wins over a 66 prefix.
        ctx.operand_size = OperandSize::Operand64;
    }

    // Table lookup.
    let (mut op_lu, mut decode_idx) = if extended {
        let entry = &EXTENDED_MAP[opcode as usize][ctx.prefix_index as usize];
        (entry, REGULAR_OPS_LEN + opcode as usize)
    }
    else if opcode == 0x63 && mode.is_long() {
        // 0x63 reinterprets as MOVSXD in long mode.
        (&MOVSXD_TEMPLATE, 0x63)
    }
    else {
        (&DECODE[opcode as usize], opcode as usize)
    };

    if op_lu.gdr.invalid_in_long_mode() && mode.is_long() {
        return Err(DecodeError::InvalidOpcode(opcode));
    }
    if !model.minimum(op_lu.gdr.minimum_model()) {
        log::debug!("opcode {:02x} rejected by model gate {:?}", opcode, model);
        return Err(DecodeError::InvalidOpcode(opcode));
    }
    if op_lu.gdr.is_prefix() {
        // A prefix byte fell through the scanner (e.g. 66 on a pre-386
        // model was consumed as an opcode): invalid encoding.
        return Err(DecodeError::InvalidOpcode(opcode));
    }

    // Load ModRM (and SIB) if this opcode requires it, resolving the
    // effective-address form. Group opcodes always carry a ModRM.
    let mut modrm = ModRmByte::from_bytes([0]);
    let mut modrm_raw: Option<u8> = None;
    let mut amode = AddressingMode::RegisterMode;

    if op_lu.gdr.has_modrm() || op_lu.grp != 0 {
        let (m, mode_resolved, modrm_size) = match ctx.address_size {
            AddressSize::Address16 => read_modrm_16(bytes)?,
            _ => read_modrm_32(bytes, ctx.rex, ctx.address_size == AddressSize::Address64)?,
        };
        modrm = m;
        modrm_raw = Some(u8::from(m.into_bytes()[0]));
        amode = mode_resolved;
        size += modrm_size;

        if op_lu.grp != 0 {
            // Secondary lookup of opcode group + extension.
            let grp_idx = 256 + ((op_lu.grp as usize - 1) * 8) + modrm.op_extension() as usize;
            if extended {
                op_lu = &EXTENDED_BASE[grp_idx];
                decode_idx = REGULAR_OPS_LEN + grp_idx;
            }
            else {
                op_lu = &DECODE[grp_idx];
                decode_idx = grp_idx;
            }
            if op_lu.gdr.invalid_in_long_mode() && mode.is_long() {
                return Err(DecodeError::InvalidOpcode(opcode));
            }
            if !model.minimum(op_lu.gdr.minimum_model()) {
                return Err(DecodeError::InvalidOpcode(opcode));
            }
        }

        // Memory-only encodings reject the register form.
        if !op_lu.gdr.has_reg_form() && !modrm.is_addressing_mode() {
            return Err(DecodeError::InvalidOpcode(opcode));
        }
    }

    if op_lu.mnemonic == Mnemonic::Invalid {
        return Err(DecodeError::InvalidOpcode(opcode));
    }

    // d64/f64: stack and branch operations in long mode. Applied after
    // group resolution so group members (PUSH/CALL/JMP r/m) see it too.
    if mode.is_long() {
        if op_lu.gdr.force_64() {
            ctx.operand_size = OperandSize::Operand64;
        }
        else if op_lu.gdr.default_64() && ctx.prefix_flags & PrefixFlags::OPERAND_SIZE == 0 {
            ctx.operand_size = OperandSize::Operand64;
        }
    }

    // Resolve operand templates.
    let operand1_type = op_lu.operand1.resolve_operand(bytes, &ctx, &modrm, amode, &mut size)?;
    let operand2_type = op_lu.operand2.resolve_operand(bytes, &ctx, &modrm, amode, &mut size)?;
    let operand3_type = op_lu.operand3.resolve_operand(bytes, &ctx, &modrm, amode, &mut size)?;

    if operand1_type == OperandType::InvalidOperand || operand2_type == OperandType::InvalidOperand {
        return Err(DecodeError::InvalidOpcode(opcode));
    }

    if size > MAX_INSTRUCTION_LENGTH {
        return Err(DecodeError::TooLong);
    }

    let width = if op_lu.operand1.is_byte_sized()
        || (op_lu.operand1 == Ot::NoOperand && op_lu.operand2.is_byte_sized())
    {
        InstructionWidth::Byte
    }
    else {
        InstructionWidth::from(ctx.operand_size)
    };

    let mnemonic = op_lu
        .mnemonic
        .widen(ctx.operand_size)
        .widen_addr(ctx.address_size);

    ctx.cursor = size;

    Ok(Instruction {
        decode_idx,
        opcode,
        prefix_flags: ctx.prefix_flags,
        prefix_index: ctx.prefix_index,
        address: 0,
        size,
        width,
        mnemonic,
        xi: op_lu.xi,
        segment_override: ctx.segment_override,
        operand_size: ctx.operand_size,
        address_size: ctx.address_size,
        rex: ctx.rex,
        vex: ctx.vex,
        modrm: modrm_raw,
        operand1_type,
        operand2_type,
        operand3_type,
    })
}

/// Recover the attribute word for a decoded instruction from its dispatch
/// index. VEX-space entries all behave like plain ModRM instructions for
/// the purposes the execution layer cares about.
pub fn template_gdr(decode_idx: usize) -> GdrEntry {
    if decode_idx < REGULAR_OPS_LEN {
        DECODE[decode_idx].gdr
    }
    else if decode_idx < REGULAR_OPS_LEN + EXTENDED_OPS_LEN {
        EXTENDED_BASE[decode_idx - REGULAR_OPS_LEN].gdr
    }
    else {
        GdrEntry(GDR_HAS_MODRM)
    }
}

static MOVSXD_TEMPLATE: InstTemplate = InstTemplate {
    grp: 0,
    gdr: GdrEntry(GDR_HAS_MODRM),
    xi: None,
    mnemonic: Mnemonic::MOVSXD,
    operand1: OperandTemplate::Registerv,
    operand2: OperandTemplate::ModRMd,
    operand3: OperandTemplate::NoOperand,
};

/// Decode the body of a VEX/XOP-prefixed instruction. The lead byte has
/// been identified but not consumed past; `opcode_byte` is 0xC4/0xC5/0x8F.
fn decode_vex(
    bytes: &mut impl ByteQueue,
    mut ctx: DecodeContext,
    lead: u8,
    mut size: u32,
) -> Result<Instruction, DecodeError> {
    // A VEX prefix must be the first and only prefix-like byte: any legacy
    // prefix or REX before it is an invalid encoding.
    if ctx.prefix_flags
        & (PrefixFlags::LOCK | PrefixFlags::REP | PrefixFlags::REPNE | PrefixFlags::OPERAND_SIZE | PrefixFlags::REX)
        != 0
    {
        return Err(DecodeError::InvalidOpcode(lead));
    }

    let mut vex = VexPrefix::default();
    match lead {
        0xC5 => {
            let b2 = bytes.q_read_u8()?;
            size += 1;
            vex.r = b2 & 0x80 == 0;
            vex.vvvv = (!(b2 >> 3)) & 0x0F;
            vex.l = b2 & 0x04 != 0;
            vex.pp = b2 & 0x03;
            vex.map = 1;
        }
        _ => {
            // 3-byte VEX (C4) and XOP (8F) share a layout.
            let b2 = bytes.q_read_u8()?;
            let b3 = bytes.q_read_u8()?;
            size += 2;
            vex.r = b2 & 0x80 == 0;
            vex.x = b2 & 0x40 == 0;
            vex.b = b2 & 0x20 == 0;
            vex.map = b2 & 0x1F;
            vex.w = b3 & 0x80 != 0;
            vex.vvvv = (!(b3 >> 3)) & 0x0F;
            vex.l = b3 & 0x04 != 0;
            vex.pp = b3 & 0x03;
            vex.xop = lead == 0x8F;
        }
    }
    ctx.prefix_flags |= if vex.xop { PrefixFlags::XOP } else { PrefixFlags::VEX };
    ctx.vex = Some(vex);
    ctx.prefix_index = vex.pp;

    // Synthesize a REX image from the VEX fields so register extension
    // flows through the same paths.
    let mut rex = RexPrefix::new();
    rex.set_r(vex.r);
    rex.set_x(vex.x);
    rex.set_b(vex.b);
    rex.set_w(vex.w);
    if ctx.mode.is_long() {
        ctx.rex = Some(rex);
    }
    if vex.w {
        ctx.operand_size = OperandSize::Operand64;
    }

    let opcode = bytes.q_read_u8()?;
    size += 1;

    let op_lu = vex_lookup(&vex, opcode);
    if op_lu.mnemonic == Mnemonic::Invalid {
        return Err(DecodeError::InvalidOpcode(opcode));
    }

    let mut modrm = ModRmByte::from_bytes([0]);
    let mut modrm_raw = None;
    let mut amode = AddressingMode::RegisterMode;
    if op_lu.gdr.has_modrm() {
        let (m, mode_resolved, modrm_size) = match ctx.address_size {
            AddressSize::Address16 => read_modrm_16(bytes)?,
            _ => read_modrm_32(bytes, ctx.rex, ctx.address_size == AddressSize::Address64)?,
        };
        modrm = m;
        modrm_raw = Some(u8::from(m.into_bytes()[0]));
        amode = mode_resolved;
        size += modrm_size;
    }

    let operand1_type = op_lu.operand1.resolve_operand(bytes, &ctx, &modrm, amode, &mut size)?;
    let operand2_type = op_lu.operand2.resolve_operand(bytes, &ctx, &modrm, amode, &mut size)?;
    let operand3_type = op_lu.operand3.resolve_operand(bytes, &ctx, &modrm, amode, &mut size)?;

    if size > MAX_INSTRUCTION_LENGTH {
        return Err(DecodeError::TooLong);
    }

    Ok(Instruction {
        decode_idx: REGULAR_OPS_LEN + EXTENDED_OPS_LEN + opcode as usize,
        opcode,
        prefix_flags: ctx.prefix_flags,
        prefix_index: ctx.prefix_index,
        address: 0,
        size,
        width: InstructionWidth::from(ctx.operand_size),
        mnemonic: op_lu.mnemonic,
        xi: op_lu.xi,
        segment_override: ctx.segment_override,
        operand_size: ctx.operand_size,
        address_size: ctx.address_size,
        rex: ctx.rex,
        vex: ctx.vex,
        modrm: modrm_raw,
        operand1_type,
        operand2_type,
        operand3_type,
    })
}

/// VEX/XOP map dispatch. The GPR subset (ANDN today) executes inline;
/// everything else that is a recognized AVX/XOP encoding reports as
/// NotImpl so the VM engine can fall back, and unknown map/opcode pairs
/// are invalid.
fn vex_lookup(vex: &VexPrefix, opcode: u8) -> InstTemplate {
    match (vex.xop, vex.map, opcode, vex.pp) {
        (false, 2, 0xF2, 0) => InstTemplate {
            grp: 0,
            gdr: GdrEntry(GDR_HAS_MODRM),
            xi: None,
            mnemonic: Mnemonic::ANDN,
            operand1: OperandTemplate::Registerv,
            operand2: OperandTemplate::VexVReg,
            operand3: OperandTemplate::ModRMv,
        },
        (false, 1..=3, _, _) | (true, 8..=10, _, _) => InstTemplate {
            grp: 0,
            gdr: GdrEntry(GDR_HAS_MODRM),
            xi: None,
            mnemonic: Mnemonic::NotImpl,
            operand1: OperandTemplate::ModRMv,
            operand2: OperandTemplate::NoOperand,
            operand3: OperandTemplate::NoOperand,
        },
        _ => InstTemplate::constdefault(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytequeue::CodeWindow;

    fn decode_bytes(bytes: &[u8], mode: CpuMode, model: CpuModel) -> Result<Instruction, DecodeError> {
        let mut q = CodeWindow::new(bytes, 0);
        decode(&mut q, mode, model)
    }

    fn decode64(bytes: &[u8]) -> Instruction {
        decode_bytes(bytes, CpuMode::Mode64, CpuModel::Cpu64).unwrap()
    }

    #[test]
    fn every_primary_opcode_dispatches() {
        // Every byte 0x00-0xFF must resolve to exactly one entry: a real
        // instruction, a prefix, or an explicit invalid-opcode error.
        for op in 0..=255u8 {
            let buf = [op, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
            let mut q = CodeWindow::new(&buf, 0);
            let _ = decode(&mut q, CpuMode::Mode16, CpuModel::Cpu80386);
        }
    }

    #[test]
    fn decode_is_idempotent() {
        let windows: &[&[u8]] = &[
            &[0x01, 0xD8],                          // add ax, bx
            &[0x66, 0x01, 0xD8],                    // add eax, ebx (16-bit mode)
            &[0x81, 0x86, 0x00, 0x10, 0x34, 0x12],  // add [bp+0x1000], 0x1234
            &[0xB8, 0x78, 0x56],                    // mov ax, 0x5678
        ];
        for w in windows {
            let a = decode_bytes(w, CpuMode::Mode16, CpuModel::Cpu80386).unwrap();
            let b = decode_bytes(w, CpuMode::Mode16, CpuModel::Cpu80386).unwrap();
            assert_eq!(a, b);
            assert_eq!(a.size as usize, w.len());
        }
    }

    #[test]
    fn prefix_effect_depends_on_set_not_order() {
        // All legal permutations of {66, 2E, F0} before the opcode must
        // produce the same effective sizes and segment.
        let perms: &[&[u8]] = &[
            &[0x66, 0x2E, 0xF0, 0x01, 0x00],
            &[0x66, 0xF0, 0x2E, 0x01, 0x00],
            &[0x2E, 0x66, 0xF0, 0x01, 0x00],
            &[0x2E, 0xF0, 0x66, 0x01, 0x00],
            &[0xF0, 0x66, 0x2E, 0x01, 0x00],
            &[0xF0, 0x2E, 0x66, 0x01, 0x00],
        ];
        let first = decode_bytes(perms[0], CpuMode::Mode16, CpuModel::Cpu80386).unwrap();
        assert_eq!(first.operand_size, OperandSize::Operand32);
        assert_eq!(first.segment_override, Some(Segment::CS));
        assert!(first.has_lock());
        for w in &perms[1..] {
            let i = decode_bytes(w, CpuMode::Mode16, CpuModel::Cpu80386).unwrap();
            assert_eq!(i.operand_size, first.operand_size);
            assert_eq!(i.segment_override, first.segment_override);
            assert_eq!(i.prefix_flags, first.prefix_flags);
        }
    }

    #[test]
    fn rex_must_be_adjacent_to_opcode() {
        // REX.W then a 66 prefix: the 66 clears the REX, leaving a 16-bit
        // operand size.
        let i = decode64(&[0x48, 0x66, 0x01, 0xD8]);
        assert!(i.rex.is_none());
        assert_eq!(i.operand_size, OperandSize::Operand16);

        // 66 then REX.W: REX survives and W wins.
        let i = decode64(&[0x66, 0x48, 0x01, 0xD8]);
        assert!(i.rex.is_some());
        assert_eq!(i.operand_size, OperandSize::Operand64);
    }

    #[test]
    fn inc_becomes_rex_in_long_mode() {
        // 0x41 is INC CX outside long mode...
        let i = decode_bytes(&[0x41], CpuMode::Mode16, CpuModel::Cpu80386).unwrap();
        assert_eq!(i.mnemonic, Mnemonic::INC);

        // ...and a REX.B prefix in long mode.
        let i = decode64(&[0x41, 0xFF, 0xC0]); // inc r8d
        assert_eq!(i.mnemonic, Mnemonic::INC);
        assert_eq!(i.operand1_type, OperandType::Register32(crate::cpu_common::Register32::R8D));
    }

    #[test]
    fn escape_0f_is_pop_cs_before_286() {
        let i = decode_bytes(&[0x0F], CpuMode::Mode16, CpuModel::Cpu8086).unwrap();
        assert_eq!(i.mnemonic, Mnemonic::POP);
        assert_eq!(i.operand1_type, OperandType::SegmentRegister(Segment::CS));

        let i = decode_bytes(&[0x0F, 0xB6, 0xC3], CpuMode::Mode16, CpuModel::Cpu80386).unwrap();
        assert_eq!(i.mnemonic, Mnemonic::MOVZX);
    }

    #[test]
    fn pre_186_aliases() {
        // 0x60 aliases JO on the 8086, and is PUSHA from the 186 up.
        let i = decode_bytes(&[0x60, 0x10], CpuMode::Mode16, CpuModel::Cpu8086).unwrap();
        assert_eq!(i.mnemonic, Mnemonic::JO);
        let i = decode_bytes(&[0x60], CpuMode::Mode16, CpuModel::Cpu80286).unwrap();
        assert_eq!(i.mnemonic, Mnemonic::PUSHA);

        // 0xC1 aliases RET on the 8086; shift group on 186+.
        let i = decode_bytes(&[0xC1], CpuMode::Mode16, CpuModel::Cpu8086).unwrap();
        assert_eq!(i.mnemonic, Mnemonic::RET);
        let i = decode_bytes(&[0xC1, 0xE0, 0x04], CpuMode::Mode16, CpuModel::Cpu80286).unwrap();
        assert_eq!(i.mnemonic, Mnemonic::SHL);
    }

    #[test]
    fn rep_beats_66_for_prefix_index() {
        let i = decode_bytes(&[0x66, 0xF3, 0xA5], CpuMode::Mode32, CpuModel::Cpu64).unwrap();
        assert_eq!(i.prefix_index as usize, PREFIX_INDEX_F3);
        // Operand size override still applies to the operation itself.
        assert_eq!(i.operand_size, OperandSize::Operand16);
        assert_eq!(i.mnemonic, Mnemonic::MOVSW);
    }

    #[test]
    fn string_mnemonics_widen() {
        let i = decode_bytes(&[0xA5], CpuMode::Mode32, CpuModel::Cpu64).unwrap();
        assert_eq!(i.mnemonic, Mnemonic::MOVSD);
        let i = decode64(&[0x48, 0xA5]);
        assert_eq!(i.mnemonic, Mnemonic::MOVSQ);
        let i = decode_bytes(&[0xE3, 0x00], CpuMode::Mode32, CpuModel::Cpu64).unwrap();
        assert_eq!(i.mnemonic, Mnemonic::JECXZ);
    }

    #[test]
    fn rip_relative_resolution_is_deferred() {
        // mov rax, [rip+0x100]
        let i = decode64(&[0x48, 0x8B, 0x05, 0x00, 0x01, 0x00, 0x00]);
        assert_eq!(i.size, 7);
        match i.operand2_type {
            OperandType::AddressingMode(AddressingMode::RipRelative(d), _) => {
                assert_eq!(d.value(), 0x100);
            }
            other => panic!("expected RIP-relative operand, got {:?}", other),
        }
    }

    #[test]
    fn vex_disambiguates_from_les() {
        // In 16-bit mode, C4 with a memory-form ModRM is LES.
        let i = decode_bytes(&[0xC4, 0x07], CpuMode::Mode16, CpuModel::Cpu64).unwrap();
        assert_eq!(i.mnemonic, Mnemonic::LES);

        // With a register-form second byte it is a VEX prefix. ANDN needs
        // VEX.L=0 and pp=0; c4 e2 78 f2 d9 = andn ebx, eax, ecx.
        let i = decode_bytes(&[0xC4, 0xE2, 0x78, 0xF2, 0xD9], CpuMode::Mode32, CpuModel::Cpu64).unwrap();
        assert_eq!(i.mnemonic, Mnemonic::ANDN);

        // On a model without VEX support, the register form is just an
        // invalid LES.
        let r = decode_bytes(&[0xC4, 0xE2, 0x78, 0xF2, 0xD9], CpuMode::Mode32, CpuModel::Cpu586);
        assert!(r.is_err());
    }

    #[test]
    fn xop_disambiguates_from_pop() {
        // 8F with map < 8 is POP r/m.
        let i = decode64(&[0x8F, 0xC0]);
        assert_eq!(i.mnemonic, Mnemonic::POP);

        // 8F with map >= 8 is an XOP prefix (recognized, unimplemented).
        let i = decode64(&[0x8F, 0xE8, 0x78, 0x01, 0xC0]);
        assert_eq!(i.mnemonic, Mnemonic::NotImpl);
        assert!(i.vex.unwrap().xop);
    }

    #[test]
    fn incomplete_window_is_never_misread() {
        // Truncated mid-prefix, mid-opcode, and mid-immediate.
        assert!(matches!(
            decode_bytes(&[0x66], CpuMode::Mode32, CpuModel::Cpu64),
            Err(DecodeError::Incomplete)
        ));
        assert!(matches!(
            decode_bytes(&[0x81, 0xC0, 0x34], CpuMode::Mode16, CpuModel::Cpu80386),
            Err(DecodeError::Incomplete)
        ));
        assert!(matches!(
            decode_bytes(&[0x0F], CpuMode::Mode32, CpuModel::Cpu80386),
            Err(DecodeError::Incomplete)
        ));
    }

    #[test]
    fn long_mode_removes_legacy_encodings() {
        for op in [0x06u8, 0x0E, 0x16, 0x1E, 0x27, 0x2F, 0x37, 0x3F, 0x60, 0x61, 0xD4, 0xD5, 0xCE] {
            let buf = [op, 0x00, 0x00];
            let mut q = CodeWindow::new(&buf, 0);
            let r = decode(&mut q, CpuMode::Mode64, CpuModel::Cpu64);
            assert!(
                matches!(r, Err(DecodeError::InvalidOpcode(_))),
                "opcode {:02X} should be invalid in long mode",
                op
            );
        }
    }

    #[test]
    fn prefix_limit_is_enforced() {
        let buf = [0x66u8; 20];
        let mut q = CodeWindow::new(&buf, 0);
        assert!(matches!(
            decode(&mut q, CpuMode::Mode32, CpuModel::Cpu64),
            Err(DecodeError::TooLong)
        ));
    }

    #[test]
    fn push_defaults_to_64_bit_operand() {
        let i = decode64(&[0x50]);
        assert_eq!(i.operand_size, OperandSize::Operand64);
        // 66 push is still a legal 16-bit push.
        let i = decode64(&[0x66, 0x50]);
        assert_eq!(i.operand_size, OperandSize::Operand16);
    }

    #[test]
    fn mov_imm64_consumes_a_full_quadword() {
        let i = decode64(&[0x48, 0xB8, 1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(i.size, 10);
        assert_eq!(i.operand2_type, OperandType::Immediate64(0x0807_0605_0403_0201));
    }

    #[test]
    fn lock_survives_into_prefix_flags() {
        let i = decode_bytes(&[0xF0, 0x01, 0x06, 0x00, 0x10], CpuMode::Mode16, CpuModel::Cpu80386).unwrap();
        assert!(i.has_lock());
        assert_eq!(i.mnemonic, Mnemonic::ADD);
    }
}
