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

    cpu_common::mod.rs

    Types shared across the decode and execution layers: register identifiers,
    execution modes, operand/address sizes, the target model gate, vendor
    policy, and the fault taxonomy.

*/

#![allow(dead_code)]

pub mod addressing;
pub mod alu;
pub mod error;
pub mod instruction;
pub mod mnemonic;
pub mod operands;
pub mod services;

use std::{
    fmt,
    fmt::{Display, Formatter},
    str::FromStr,
};

use serde::{Deserialize, Deserializer};

pub use addressing::{AddressingMode, Displacement};
pub use error::{CpuError, DecodeError};
pub use instruction::{Instruction, InstructionWidth};
pub use mnemonic::Mnemonic;
pub use operands::OperandType;

// Instruction prefix flags, accumulated by the prefix scanner.
pub struct PrefixFlags {}

impl PrefixFlags {
    pub const ES_OVERRIDE: u32 = 0b_0000_0000_0000_0100;
    pub const CS_OVERRIDE: u32 = 0b_0000_0000_0000_1000;
    pub const SS_OVERRIDE: u32 = 0b_0000_0000_0001_0000;
    pub const DS_OVERRIDE: u32 = 0b_0000_0000_0010_0000;
    pub const FS_OVERRIDE: u32 = 0b_0000_0000_0100_0000;
    pub const GS_OVERRIDE: u32 = 0b_0000_0000_1000_0000;
    pub const SEG_OVERRIDE_MASK: u32 = 0b_0000_0000_1111_1100;
    pub const LOCK: u32 = 0b_0000_0001_0000_0000;
    pub const REPNE: u32 = 0b_0000_0010_0000_0000;
    pub const REP: u32 = 0b_0000_0100_0000_0000;
    pub const REP_MASK: u32 = 0b_0000_0110_0000_0000;
    pub const OPERAND_SIZE: u32 = 0b_0010_0000_0000_0000;
    pub const ADDRESS_SIZE: u32 = 0b_0100_0000_0000_0000;
    pub const EXTENDED_0F: u32 = 0b_1000_0000_0000_0000;
    pub const REX: u32 = 0b_0001_0000_0000_0000_0000;
    pub const VEX: u32 = 0b_0010_0000_0000_0000_0000;
    pub const XOP: u32 = 0b_0100_0000_0000_0000_0000;
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Register8 {
    AL,
    CL,
    DL,
    BL,
    AH,
    CH,
    DH,
    BH,
    SPL,
    BPL,
    SIL,
    DIL,
    R8B,
    R9B,
    R10B,
    R11B,
    R12B,
    R13B,
    R14B,
    R15B,
}

impl Register8 {
    /// Return the backing GPR index and whether this register aliases the
    /// high byte of its word register.
    #[inline]
    pub fn bank(&self) -> (usize, bool) {
        use Register8::*;
        match self {
            AL => (0, false),
            CL => (1, false),
            DL => (2, false),
            BL => (3, false),
            AH => (0, true),
            CH => (1, true),
            DH => (2, true),
            BH => (3, true),
            SPL => (4, false),
            BPL => (5, false),
            SIL => (6, false),
            DIL => (7, false),
            R8B => (8, false),
            R9B => (9, false),
            R10B => (10, false),
            R11B => (11, false),
            R12B => (12, false),
            R13B => (13, false),
            R14B => (14, false),
            R15B => (15, false),
        }
    }
}

impl Display for Register8 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        use Register8::*;
        let s = match self {
            AL => "al",
            CL => "cl",
            DL => "dl",
            BL => "bl",
            AH => "ah",
            CH => "ch",
            DH => "dh",
            BH => "bh",
            SPL => "spl",
            BPL => "bpl",
            SIL => "sil",
            DIL => "dil",
            R8B => "r8b",
            R9B => "r9b",
            R10B => "r10b",
            R11B => "r11b",
            R12B => "r12b",
            R13B => "r13b",
            R14B => "r14b",
            R15B => "r15b",
        };
        write!(f, "{}", s)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Register16 {
    AX,
    CX,
    DX,
    BX,
    SP,
    BP,
    SI,
    DI,
    R8W,
    R9W,
    R10W,
    R11W,
    R12W,
    R13W,
    R14W,
    R15W,
    PC,
    InvalidRegister,
}

impl Display for Register16 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        use Register16::*;
        let s = match self {
            AX => "ax",
            CX => "cx",
            DX => "dx",
            BX => "bx",
            SP => "sp",
            BP => "bp",
            SI => "si",
            DI => "di",
            R8W => "r8w",
            R9W => "r9w",
            R10W => "r10w",
            R11W => "r11w",
            R12W => "r12w",
            R13W => "r13w",
            R14W => "r14w",
            R15W => "r15w",
            PC => "ip",
            InvalidRegister => "invalid",
        };
        write!(f, "{}", s)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Register32 {
    EAX,
    ECX,
    EDX,
    EBX,
    ESP,
    EBP,
    ESI,
    EDI,
    R8D,
    R9D,
    R10D,
    R11D,
    R12D,
    R13D,
    R14D,
    R15D,
}

impl Display for Register32 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        use Register32::*;
        let s = match self {
            EAX => "eax",
            ECX => "ecx",
            EDX => "edx",
            EBX => "ebx",
            ESP => "esp",
            EBP => "ebp",
            ESI => "esi",
            EDI => "edi",
            R8D => "r8d",
            R9D => "r9d",
            R10D => "r10d",
            R11D => "r11d",
            R12D => "r12d",
            R13D => "r13d",
            R14D => "r14d",
            R15D => "r15d",
        };
        write!(f, "{}", s)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Register64 {
    RAX,
    RCX,
    RDX,
    RBX,
    RSP,
    RBP,
    RSI,
    RDI,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
}

impl Display for Register64 {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        use Register64::*;
        let s = match self {
            RAX => "rax",
            RCX => "rcx",
            RDX => "rdx",
            RBX => "rbx",
            RSP => "rsp",
            RBP => "rbp",
            RSI => "rsi",
            RDI => "rdi",
            R8 => "r8",
            R9 => "r9",
            R10 => "r10",
            R11 => "r11",
            R12 => "r12",
            R13 => "r13",
            R14 => "r14",
            R15 => "r15",
        };
        write!(f, "{}", s)
    }
}

// 8-bit register selector without a REX prefix present: indices 4-7 select
// the high-byte aliases.
pub const REGISTER8_LUT: [Register8; 8] = [
    Register8::AL,
    Register8::CL,
    Register8::DL,
    Register8::BL,
    Register8::AH,
    Register8::CH,
    Register8::DH,
    Register8::BH,
];

// 8-bit register selector with any REX prefix present: indices 4-7 select
// the new low-byte registers instead of the high-byte aliases.
pub const REGISTER8_REX_LUT: [Register8; 16] = [
    Register8::AL,
    Register8::CL,
    Register8::DL,
    Register8::BL,
    Register8::SPL,
    Register8::BPL,
    Register8::SIL,
    Register8::DIL,
    Register8::R8B,
    Register8::R9B,
    Register8::R10B,
    Register8::R11B,
    Register8::R12B,
    Register8::R13B,
    Register8::R14B,
    Register8::R15B,
];

pub const REGISTER16_LUT: [Register16; 16] = [
    Register16::AX,
    Register16::CX,
    Register16::DX,
    Register16::BX,
    Register16::SP,
    Register16::BP,
    Register16::SI,
    Register16::DI,
    Register16::R8W,
    Register16::R9W,
    Register16::R10W,
    Register16::R11W,
    Register16::R12W,
    Register16::R13W,
    Register16::R14W,
    Register16::R15W,
];

pub const REGISTER32_LUT: [Register32; 16] = [
    Register32::EAX,
    Register32::ECX,
    Register32::EDX,
    Register32::EBX,
    Register32::ESP,
    Register32::EBP,
    Register32::ESI,
    Register32::EDI,
    Register32::R8D,
    Register32::R9D,
    Register32::R10D,
    Register32::R11D,
    Register32::R12D,
    Register32::R13D,
    Register32::R14D,
    Register32::R15D,
];

pub const REGISTER64_LUT: [Register64; 16] = [
    Register64::RAX,
    Register64::RCX,
    Register64::RDX,
    Register64::RBX,
    Register64::RSP,
    Register64::RBP,
    Register64::RSI,
    Register64::RDI,
    Register64::R8,
    Register64::R9,
    Register64::R10,
    Register64::R11,
    Register64::R12,
    Register64::R13,
    Register64::R14,
    Register64::R15,
];

// Segment register selector for the ModRM reg field. Encodings 6 and 7 have
// no architectural segment register and decode as invalid.
pub const SREGISTER_LUT: [Option<Segment>; 8] = [
    Some(Segment::ES),
    Some(Segment::CS),
    Some(Segment::SS),
    Some(Segment::DS),
    Some(Segment::FS),
    Some(Segment::GS),
    None,
    None,
];

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Segment {
    None,
    ES,
    CS,
    SS,
    #[default]
    DS,
    FS,
    GS,
}

impl Display for Segment {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Segment::None => "",
            Segment::ES => "es",
            Segment::CS => "cs",
            Segment::SS => "ss",
            Segment::DS => "ds",
            Segment::FS => "fs",
            Segment::GS => "gs",
        };
        write!(f, "{}", s)
    }
}

/// Execution mode of the virtual CPU for the current instruction stream.
/// Determines default operand/address size and how mode-overloaded bytes
/// (0x40-0x4F, 0x63, etc.) decode.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum CpuMode {
    #[default]
    Mode16,
    Mode32,
    Mode64,
}

impl CpuMode {
    #[inline]
    pub fn default_operand_size(&self) -> OperandSize {
        match self {
            CpuMode::Mode16 => OperandSize::Operand16,
            CpuMode::Mode32 | CpuMode::Mode64 => OperandSize::Operand32,
        }
    }

    #[inline]
    pub fn default_address_size(&self) -> AddressSize {
        match self {
            CpuMode::Mode16 => AddressSize::Address16,
            CpuMode::Mode32 => AddressSize::Address32,
            CpuMode::Mode64 => AddressSize::Address64,
        }
    }

    /// Operand size in effect when the 0x66 prefix is present.
    #[inline]
    pub fn operand_size_override(&self) -> OperandSize {
        match self {
            CpuMode::Mode16 => OperandSize::Operand32,
            CpuMode::Mode32 | CpuMode::Mode64 => OperandSize::Operand16,
        }
    }

    /// Address size in effect when the 0x67 prefix is present.
    #[inline]
    pub fn address_size_override(&self) -> AddressSize {
        match self {
            CpuMode::Mode16 => AddressSize::Address32,
            CpuMode::Mode32 => AddressSize::Address16,
            CpuMode::Mode64 => AddressSize::Address32,
        }
    }

    #[inline]
    pub fn is_long(&self) -> bool {
        matches!(self, CpuMode::Mode64)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum OperandSize {
    #[default]
    NoOperand,
    NoSize,
    Operand8,
    Operand16,
    Operand32,
    Operand64,
}

impl OperandSize {
    #[inline]
    pub fn bytes(&self) -> u32 {
        match self {
            OperandSize::Operand8 => 1,
            OperandSize::Operand16 => 2,
            OperandSize::Operand32 => 4,
            OperandSize::Operand64 => 8,
            _ => 0,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum AddressSize {
    #[default]
    Address16,
    Address32,
    Address64,
}

impl AddressSize {
    /// Mask applied to computed effective addresses before segment bases.
    #[inline]
    pub fn mask(&self) -> u64 {
        match self {
            AddressSize::Address16 => 0xFFFF,
            AddressSize::Address32 => 0xFFFF_FFFF,
            AddressSize::Address64 => u64::MAX,
        }
    }
}

/// The emulated CPU model. Consulted throughout decode to reject or
/// reinterpret opcodes that did not exist (or meant something else) on the
/// configured target.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub enum CpuModel {
    Cpu8086,
    Cpu80186,
    Cpu80286,
    Cpu80386,
    Cpu80486,
    Cpu586,
    #[default]
    Cpu64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CpuFeature {
    X87,
    Cmov,
    Cpuid,
    Cmpxchg,
    Bswap,
    Popcnt,
    Vex,
    Xop,
    LongMode,
}

impl CpuModel {
    /// 0x0F became the two-byte escape on the 286. Before that it decoded
    /// as POP CS.
    #[inline]
    pub fn has_0f_escape(&self) -> bool {
        *self >= CpuModel::Cpu80286
    }

    #[inline]
    pub fn minimum(&self, model: CpuModel) -> bool {
        *self >= model
    }

    pub fn supports(&self, feature: CpuFeature) -> bool {
        use CpuFeature::*;
        match feature {
            X87 => true,
            Cmov | Cpuid => *self >= CpuModel::Cpu586,
            Cmpxchg | Bswap => *self >= CpuModel::Cpu80486,
            Popcnt => *self >= CpuModel::Cpu64,
            Vex => *self >= CpuModel::Cpu64,
            // XOP was AMD-only; the vendor policy is checked separately.
            Xop => *self >= CpuModel::Cpu64,
            LongMode => *self >= CpuModel::Cpu64,
        }
    }
}

/// We accept model strings in config files in a few familiar spellings, so a
/// custom deserializer beats a derive here.
impl<'de> Deserialize<'de> for CpuModel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct CpuModelVisitor;

        impl serde::de::Visitor<'_> for CpuModelVisitor {
            type Value = CpuModel;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a CPU model string like '8086', '80386', 'x64'")
            }

            fn visit_str<E>(self, value: &str) -> Result<CpuModel, E>
            where
                E: serde::de::Error,
            {
                CpuModel::from_str(value).map_err(|_| E::custom(format!("unknown CpuModel '{}'", value)))
            }
        }

        deserializer.deserialize_any(CpuModelVisitor)
    }
}

impl FromStr for CpuModel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, String>
    where
        Self: Sized,
    {
        match s.to_lowercase().as_str() {
            "8086" | "intel8086" => Ok(CpuModel::Cpu8086),
            "80186" | "186" => Ok(CpuModel::Cpu80186),
            "80286" | "286" => Ok(CpuModel::Cpu80286),
            "80386" | "386" => Ok(CpuModel::Cpu80386),
            "80486" | "486" => Ok(CpuModel::Cpu80486),
            "586" | "pentium" => Ok(CpuModel::Cpu586),
            "x64" | "x86_64" | "amd64" => Ok(CpuModel::Cpu64),
            _ => Err("Bad value for cpumodel".to_string()),
        }
    }
}

/// Vendor behavior policy for architecturally undefined results, selected
/// once per vCPU configuration and threaded into the helpers that need it.
#[derive(Copy, Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VendorPolicy {
    #[default]
    Intel,
    Amd,
}

impl FromStr for VendorPolicy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, String>
    where
        Self: Sized,
    {
        match s.to_lowercase().as_str() {
            "intel" => Ok(VendorPolicy::Intel),
            "amd" => Ok(VendorPolicy::Amd),
            _ => Err("Bad value for vendor policy".to_string()),
        }
    }
}

/// Architectural exception vectors, as reported back to the VM engine.
#[repr(u8)]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CpuException {
    DivideError = 0,         // #DE
    Debug = 1,               // #DB
    Breakpoint = 3,          // #BP
    Overflow = 4,            // #OF
    BoundRange = 5,          // #BR
    InvalidOpcode = 6,       // #UD
    DeviceNotAvailable = 7,  // #NM
    DoubleFault = 8,         // #DF
    InvalidTss = 10,         // #TS
    SegmentNotPresent = 11,  // #NP
    StackFault = 12,         // #SS
    GeneralProtection = 13,  // #GP
    PageFault = 14,          // #PF
    FpuError = 16,           // #MF
    AlignmentCheck = 17,     // #AC
}

impl CpuException {
    #[inline]
    pub const fn vector(self) -> u8 {
        self as u8
    }

    /// Whether the CPU pushes an error code when delivering this exception.
    #[inline]
    pub const fn pushes_error_code(self) -> bool {
        matches!(
            self,
            CpuException::DoubleFault
                | CpuException::InvalidTss
                | CpuException::SegmentNotPresent
                | CpuException::StackFault
                | CpuException::GeneralProtection
                | CpuException::PageFault
                | CpuException::AlignmentCheck
        )
    }
}

#[derive(Debug, Default, PartialEq)]
pub enum ExecutionResult {
    #[default]
    Okay,
    OkayJump,
    OkayRep,
    Delegated,
    ExecutionError(String),
    ExceptionError(CpuException),
    NotImplemented(Mnemonic),
    Halt,
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum StepResult {
    Normal,
    Jump,
    Delegated,
    Halt,
}

#[derive(Copy, Clone, Debug, Deserialize, PartialEq, Default)]
pub enum TraceMode {
    #[default]
    None,
    Instruction,
}

impl FromStr for TraceMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, String>
    where
        Self: Sized,
    {
        match s.to_lowercase().as_str() {
            "none" => Ok(TraceMode::None),
            "instruction" => Ok(TraceMode::Instruction),
            _ => Err("Bad value for tracemode".to_string()),
        }
    }
}

// Parity of the low byte of a result: true when the number of set bits is
// even. Indexed by the result byte.
pub const PARITY_TABLE: [bool; 256] = {
    let mut table = [false; 256];
    let mut i: usize = 0;
    while i < 256 {
        table[i] = (i as u8).count_ones() % 2 == 0;
        i += 1;
    }
    table
};

pub fn format_instruction_bytes(bytes: &[u8]) -> String {
    let mut s = String::new();
    for b in bytes {
        s.push_str(&format!("{:02X} ", b));
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parity_table_matches_popcount() {
        assert!(PARITY_TABLE[0x00]);
        assert!(!PARITY_TABLE[0x01]);
        assert!(!PARITY_TABLE[0x02]);
        assert!(PARITY_TABLE[0x03]);
        assert!(PARITY_TABLE[0xFF]);
    }

    #[test]
    fn model_gates() {
        assert!(!CpuModel::Cpu8086.has_0f_escape());
        assert!(!CpuModel::Cpu80186.has_0f_escape());
        assert!(CpuModel::Cpu80286.has_0f_escape());
        assert!(CpuModel::Cpu64.supports(CpuFeature::Popcnt));
        assert!(!CpuModel::Cpu80486.supports(CpuFeature::Cmov));
        assert!(CpuModel::Cpu586.minimum(CpuModel::Cpu80386));
    }

    #[test]
    fn model_from_str() {
        assert_eq!(CpuModel::from_str("80386").unwrap(), CpuModel::Cpu80386);
        assert_eq!(CpuModel::from_str("x64").unwrap(), CpuModel::Cpu64);
        assert!(CpuModel::from_str("z80").is_err());
    }

    #[test]
    fn high_byte_banks() {
        assert_eq!(Register8::AH.bank(), (0, true));
        assert_eq!(Register8::SPL.bank(), (4, false));
        assert_eq!(Register8::R15B.bank(), (15, false));
    }
}
