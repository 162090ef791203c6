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

    cpu_common::mnemonic.rs

    Defines the mnemonic enum. Pseudo-mnemonics (Invalid, Prefix, Group,
    Extension, NotImpl) mark table entries that dispatch further or terminate
    decode rather than executing.

*/

use strum_macros::Display;

#[allow(dead_code)]
#[allow(clippy::upper_case_acronyms)]
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Mnemonic {
    #[default]
    Invalid,
    NoOpcode,
    Prefix,
    Group,
    Extension,
    NotImpl,
    NOP,
    AAA,
    AAD,
    AAM,
    AAS,
    ADC,
    ADD,
    AND,
    ANDN,
    ARPL,
    BOUND,
    BSF,
    BSR,
    BSWAP,
    BT,
    BTC,
    BTR,
    BTS,
    CALL,
    CALLF,
    CBW,
    CWDE,
    CDQE,
    CLC,
    CLD,
    CLI,
    CLTS,
    CMC,
    CMP,
    CMPSB,
    CMPSW,
    CMPSD,
    CMPSQ,
    CMPXCHG,
    CPUID,
    CWD,
    CDQ,
    CQO,
    DAA,
    DAS,
    DEC,
    DIV,
    ENTER,
    ESC,
    FWAIT,
    HLT,
    IDIV,
    IMUL,
    IN,
    INC,
    INSB,
    INSW,
    INSD,
    INT,
    INT1,
    INT3,
    INTO,
    INVLPG,
    IRET,
    JB,
    JBE,
    JCXZ,
    JECXZ,
    JRCXZ,
    JL,
    JLE,
    JMP,
    JMPF,
    JNB,
    JNBE,
    JNL,
    JNLE,
    JNO,
    JNP,
    JNS,
    JNZ,
    JO,
    JP,
    JS,
    JZ,
    LAHF,
    LAR,
    LDS,
    LEA,
    LEAVE,
    LES,
    LFS,
    LGDT,
    LGS,
    LIDT,
    LLDT,
    LMSW,
    LOCK,
    LODSB,
    LODSW,
    LODSD,
    LODSQ,
    LOOP,
    LOOPE,
    LOOPNE,
    LSL,
    LSS,
    LTR,
    MOV,
    MOVSB,
    MOVSW,
    MOVSD,
    MOVSQ,
    MOVSX,
    MOVSXD,
    MOVZX,
    MUL,
    NEG,
    NOT,
    OR,
    OUT,
    OUTSB,
    OUTSW,
    OUTSD,
    POP,
    POPA,
    POPAD,
    POPCNT,
    POPF,
    POPFD,
    POPFQ,
    PUSH,
    PUSHA,
    PUSHAD,
    PUSHF,
    PUSHFD,
    PUSHFQ,
    RCL,
    RCR,
    RDMSR,
    RDTSC,
    RET,
    RETF,
    ROL,
    ROR,
    RSM,
    SAHF,
    SAL,
    SALC,
    SAR,
    SBB,
    SCASB,
    SCASW,
    SCASD,
    SCASQ,
    SETO,
    SETNO,
    SETB,
    SETNB,
    SETZ,
    SETNZ,
    SETBE,
    SETNBE,
    SETS,
    SETNS,
    SETP,
    SETNP,
    SETL,
    SETNL,
    SETLE,
    SETNLE,
    CMOVO,
    CMOVNO,
    CMOVB,
    CMOVNB,
    CMOVZ,
    CMOVNZ,
    CMOVBE,
    CMOVNBE,
    CMOVS,
    CMOVNS,
    CMOVP,
    CMOVNP,
    CMOVL,
    CMOVNL,
    CMOVLE,
    CMOVNLE,
    SGDT,
    SHL,
    SHLD,
    SHR,
    SHRD,
    SIDT,
    SLDT,
    SMSW,
    STC,
    STD,
    STI,
    STOSB,
    STOSW,
    STOSD,
    STOSQ,
    STR,
    SUB,
    TEST,
    UD2,
    VERR,
    VERW,
    WRMSR,
    XADD,
    XCHG,
    XLAT,
    XOR,
    // x87
    FADD,
    FADDP,
    FABS,
    FCHS,
    FCOM,
    FCOMP,
    FCOMPP,
    FDECSTP,
    FDIV,
    FDIVP,
    FDIVR,
    FDIVRP,
    FFREE,
    FILD,
    FINCSTP,
    FIST,
    FISTP,
    FLD,
    FLD1,
    FLDCW,
    FLDZ,
    FMUL,
    FMULP,
    FNCLEX,
    FNINIT,
    FNSTCW,
    FNSTSW,
    FPTAN,
    FSQRT,
    FST,
    FSTP,
    FSUB,
    FSUBP,
    FSUBR,
    FSUBRP,
    FTST,
    FUCOM,
    FUCOMP,
    FUCOMPP,
    FXCH,
    FXTRACT,
}

impl Mnemonic {
    /// Several mnemonics change spelling with the effective operand size
    /// (string ops, conversions, stack-image ops). The decode table stores
    /// the 16-bit spelling; widen to the effective size here.
    pub fn widen(&self, wide: super::OperandSize) -> Mnemonic {
        use super::OperandSize::*;
        use Mnemonic::*;
        match (self, wide) {
            (MOVSW, Operand32) => MOVSD,
            (MOVSW, Operand64) => MOVSQ,
            (CMPSW, Operand32) => CMPSD,
            (CMPSW, Operand64) => CMPSQ,
            (STOSW, Operand32) => STOSD,
            (STOSW, Operand64) => STOSQ,
            (LODSW, Operand32) => LODSD,
            (LODSW, Operand64) => LODSQ,
            (SCASW, Operand32) => SCASD,
            (SCASW, Operand64) => SCASQ,
            (INSW, Operand32 | Operand64) => INSD,
            (OUTSW, Operand32 | Operand64) => OUTSD,
            (CBW, Operand32) => CWDE,
            (CBW, Operand64) => CDQE,
            (CWD, Operand32) => CDQ,
            (CWD, Operand64) => CQO,
            (PUSHA, Operand32) => PUSHAD,
            (POPA, Operand32) => POPAD,
            (PUSHF, Operand32) => PUSHFD,
            (PUSHF, Operand64) => PUSHFQ,
            (POPF, Operand32) => POPFD,
            (POPF, Operand64) => POPFQ,
            _ => *self,
        }
    }

    /// JCXZ respells with the effective *address* size.
    pub fn widen_addr(&self, wide: super::AddressSize) -> Mnemonic {
        use super::AddressSize::*;
        use Mnemonic::*;
        match (self, wide) {
            (JCXZ, Address32) => JECXZ,
            (JCXZ, Address64) => JRCXZ,
            _ => *self,
        }
    }
}
