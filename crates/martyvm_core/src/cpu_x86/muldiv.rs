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

    cpu_x86::muldiv.rs

    Widening multiply and narrowing divide with the accumulator register
    pair implicit at every width. Divide raises #DE on a zero divisor or a
    quotient that does not fit the destination, before any register is
    written.

*/

#![allow(dead_code)]

use crate::{
    cpu_common::{CpuException, InstructionWidth, Register16, Register32, Register64, Register8},
    cpu_x86::{CpuX86, Flag},
};

impl CpuX86 {
    /// MUL/IMUL one-operand form: widen the accumulator by the operand
    /// into the register pair. CF/OF are set when the upper half holds
    /// significant bits. SF/ZF/AF/PF are undefined; both vendor policies
    /// set SZP from the low half and clear AF, as pinned by the vectors.
    pub(crate) fn mul_op(&mut self, signed: bool, operand: u64) {
        let (low, high, upper_significant) = match self.i.width {
            InstructionWidth::Byte => {
                let a = self.regs.read_g8(Register8::AL);
                let product: u16 = if signed {
                    ((a as i8 as i16).wrapping_mul(operand as i8 as i16)) as u16
                }
                else {
                    (a as u16).wrapping_mul(operand as u8 as u16)
                };
                let sig = if signed {
                    product as i16 != product as u8 as i8 as i16
                }
                else {
                    product & 0xFF00 != 0
                };
                // Byte form stores the full product in AX.
                self.regs.write_g16(Register16::AX, product);
                (product as u64 & 0xFF, (product >> 8) as u64, sig)
            }
            InstructionWidth::Word => {
                let a = self.regs.read_g16(Register16::AX);
                let product: u32 = if signed {
                    ((a as i16 as i32).wrapping_mul(operand as i16 as i32)) as u32
                }
                else {
                    (a as u32).wrapping_mul(operand as u16 as u32)
                };
                let sig = if signed {
                    product as i32 != product as u16 as i16 as i32
                }
                else {
                    product & 0xFFFF_0000 != 0
                };
                self.regs.write_g16(Register16::AX, product as u16);
                self.regs.write_g16(Register16::DX, (product >> 16) as u16);
                (product as u64 & 0xFFFF, (product >> 16) as u64, sig)
            }
            InstructionWidth::Dword => {
                let a = self.regs.read_g32(Register32::EAX);
                let product: u64 = if signed {
                    ((a as i32 as i64).wrapping_mul(operand as i32 as i64)) as u64
                }
                else {
                    (a as u64).wrapping_mul(operand as u32 as u64)
                };
                let sig = if signed {
                    product as i64 != product as u32 as i32 as i64
                }
                else {
                    product & 0xFFFF_FFFF_0000_0000 != 0
                };
                self.regs.write_g32(Register32::EAX, product as u32);
                self.regs.write_g32(Register32::EDX, (product >> 32) as u32);
                (product & 0xFFFF_FFFF, product >> 32, sig)
            }
            InstructionWidth::Qword => {
                let a = self.regs.read_g64(Register64::RAX);
                let product: u128 = if signed {
                    ((a as i64 as i128).wrapping_mul(operand as i64 as i128)) as u128
                }
                else {
                    (a as u128).wrapping_mul(operand as u128)
                };
                let sig = if signed {
                    product as i128 != product as u64 as i64 as i128
                }
                else {
                    product >> 64 != 0
                };
                self.regs.write_g64(Register64::RAX, product as u64);
                self.regs.write_g64(Register64::RDX, (product >> 64) as u64);
                (product as u64, (product >> 64) as u64, sig)
            }
        };
        let _ = high;

        self.set_flag_state(Flag::Carry, upper_significant);
        self.set_flag_state(Flag::Overflow, upper_significant);
        self.clear_flag(Flag::AuxCarry);
        self.set_szp_flags_from_result(low);
    }

    /// IMUL two/three-operand form: truncating signed multiply. CF/OF set
    /// when the product did not fit the destination width.
    pub(crate) fn imul_general(&mut self, a: u64, b: u64) -> u64 {
        let mask = self.i.width.mask();
        let sign_bits = 64 - self.i.width.bits();
        // Sign-extend both operands from the operation width.
        let a_s = ((a & mask) << sign_bits) as i64 >> sign_bits;
        let b_s = ((b & mask) << sign_bits) as i64 >> sign_bits;
        let wide = (a_s as i128).wrapping_mul(b_s as i128);
        let result = (wide as u64) & mask;
        let result_s = ((result << sign_bits) as i64 >> sign_bits) as i128;

        let overflow = wide != result_s;
        self.set_flag_state(Flag::Carry, overflow);
        self.set_flag_state(Flag::Overflow, overflow);
        self.clear_flag(Flag::AuxCarry);
        self.set_szp_flags_from_result(result);
        result
    }

    /// DIV/IDIV: divide the accumulator pair by the operand. Returns the
    /// #DE fault before any architectural state changes.
    pub(crate) fn div_op(&mut self, signed: bool, operand: u64) -> Result<(), CpuException> {
        match self.i.width {
            InstructionWidth::Byte => {
                let dividend = self.regs.read_g16(Register16::AX);
                let divisor = operand as u8;
                if divisor == 0 {
                    return Err(CpuException::DivideError);
                }
                let (quot, rem): (i32, i32) = if signed {
                    let d = dividend as i16 as i32;
                    (d.wrapping_div(divisor as i8 as i32), d.wrapping_rem(divisor as i8 as i32))
                }
                else {
                    ((dividend as u32 / divisor as u32) as i32, (dividend as u32 % divisor as u32) as i32)
                };
                let fits = if signed {
                    quot >= i8::MIN as i32 && quot <= i8::MAX as i32
                }
                else {
                    quot as u32 <= u8::MAX as u32
                };
                if !fits {
                    return Err(CpuException::DivideError);
                }
                self.regs.write_g8(Register8::AL, quot as u8);
                self.regs.write_g8(Register8::AH, rem as u8);
            }
            InstructionWidth::Word => {
                let dividend =
                    ((self.regs.read_g16(Register16::DX) as u32) << 16) | self.regs.read_g16(Register16::AX) as u32;
                let divisor = operand as u16;
                if divisor == 0 {
                    return Err(CpuException::DivideError);
                }
                let (quot, rem): (i64, i64) = if signed {
                    let d = dividend as i32 as i64;
                    (d.wrapping_div(divisor as i16 as i64), d.wrapping_rem(divisor as i16 as i64))
                }
                else {
                    ((dividend / divisor as u32) as i64, (dividend % divisor as u32) as i64)
                };
                let fits = if signed {
                    quot >= i16::MIN as i64 && quot <= i16::MAX as i64
                }
                else {
                    quot as u64 <= u16::MAX as u64
                };
                if !fits {
                    return Err(CpuException::DivideError);
                }
                self.regs.write_g16(Register16::AX, quot as u16);
                self.regs.write_g16(Register16::DX, rem as u16);
            }
            InstructionWidth::Dword => {
                let dividend =
                    ((self.regs.read_g32(Register32::EDX) as u64) << 32) | self.regs.read_g32(Register32::EAX) as u64;
                let divisor = operand as u32;
                if divisor == 0 {
                    return Err(CpuException::DivideError);
                }
                let (quot, rem): (i128, i128) = if signed {
                    let d = dividend as i64 as i128;
                    (d.wrapping_div(divisor as i32 as i128), d.wrapping_rem(divisor as i32 as i128))
                }
                else {
                    ((dividend / divisor as u64) as i128, (dividend % divisor as u64) as i128)
                };
                let fits = if signed {
                    quot >= i32::MIN as i128 && quot <= i32::MAX as i128
                }
                else {
                    quot as u128 <= u32::MAX as u128
                };
                if !fits {
                    return Err(CpuException::DivideError);
                }
                self.regs.write_g32(Register32::EAX, quot as u32);
                self.regs.write_g32(Register32::EDX, rem as u32);
            }
            InstructionWidth::Qword => {
                let dividend = ((self.regs.read_g64(Register64::RDX) as u128) << 64)
                    | self.regs.read_g64(Register64::RAX) as u128;
                let divisor = operand;
                if divisor == 0 {
                    return Err(CpuException::DivideError);
                }
                if signed {
                    let d = dividend as i128;
                    let v = divisor as i64 as i128;
                    let quot = d.wrapping_div(v);
                    let rem = d.wrapping_rem(v);
                    if quot < i64::MIN as i128 || quot > i64::MAX as i128 {
                        return Err(CpuException::DivideError);
                    }
                    self.regs.write_g64(Register64::RAX, quot as u64);
                    self.regs.write_g64(Register64::RDX, rem as u64);
                }
                else {
                    let quot = dividend / divisor as u128;
                    let rem = dividend % divisor as u128;
                    if quot > u64::MAX as u128 {
                        return Err(CpuException::DivideError);
                    }
                    self.regs.write_g64(Register64::RAX, quot as u64);
                    self.regs.write_g64(Register64::RDX, rem as u64);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu_common::{CpuMode, CpuModel, Instruction, VendorPolicy};

    fn cpu_with_width(width: InstructionWidth) -> CpuX86 {
        let mut cpu = CpuX86::new(CpuMode::Mode32, CpuModel::Cpu64, VendorPolicy::Intel);
        cpu.i = Instruction {
            width,
            ..Default::default()
        };
        cpu
    }

    #[test]
    fn mul_sets_carry_when_high_half_significant() {
        let mut cpu = cpu_with_width(InstructionWidth::Byte);
        cpu.regs.write_g8(Register8::AL, 0x10);
        cpu.mul_op(false, 0x10);
        assert_eq!(cpu.regs.read_g16(Register16::AX), 0x0100);
        assert!(cpu.get_flag(Flag::Carry));
        assert!(cpu.get_flag(Flag::Overflow));

        cpu.regs.write_g8(Register8::AL, 2);
        cpu.mul_op(false, 3);
        assert_eq!(cpu.regs.read_g16(Register16::AX), 6);
        assert!(!cpu.get_flag(Flag::Carry));
    }

    #[test]
    fn imul_signed_significance() {
        let mut cpu = cpu_with_width(InstructionWidth::Byte);
        // -1 * -1 = 1: high byte is 0x00 but significant? No - sign
        // extension of 1 is all zeroes, so no overflow.
        cpu.regs.write_g8(Register8::AL, 0xFF);
        cpu.mul_op(true, 0xFF);
        assert_eq!(cpu.regs.read_g16(Register16::AX), 0x0001);
        assert!(!cpu.get_flag(Flag::Carry));

        // 127 * 2 = 254 does not fit a signed byte.
        cpu.regs.write_g8(Register8::AL, 127);
        cpu.mul_op(true, 2);
        assert!(cpu.get_flag(Flag::Carry));
    }

    #[test]
    fn imul_general_truncation() {
        let mut cpu = cpu_with_width(InstructionWidth::Word);
        let r = cpu.imul_general(300, 100);
        assert_eq!(r, 30000);
        assert!(!cpu.get_flag(Flag::Overflow));

        let r = cpu.imul_general(0x4000, 4);
        assert_eq!(r, 0);
        assert!(cpu.get_flag(Flag::Overflow));

        // Negative operands sign-extend from the operation width.
        let r = cpu.imul_general(0xFFFF, 5); // -1 * 5
        assert_eq!(r, 0xFFFB);
        assert!(!cpu.get_flag(Flag::Overflow));
    }

    #[test]
    fn div_by_zero_faults() {
        let mut cpu = cpu_with_width(InstructionWidth::Word);
        cpu.regs.write_g16(Register16::AX, 100);
        assert_eq!(cpu.div_op(false, 0), Err(CpuException::DivideError));
        // Registers untouched after the fault.
        assert_eq!(cpu.regs.read_g16(Register16::AX), 100);
    }

    #[test]
    fn div_quotient_overflow_faults() {
        let mut cpu = cpu_with_width(InstructionWidth::Byte);
        // 0x1000 / 2 = 0x800 does not fit AL.
        cpu.regs.write_g16(Register16::AX, 0x1000);
        assert_eq!(cpu.div_op(false, 2), Err(CpuException::DivideError));

        // The classic IDIV overflow: INT_MIN / -1.
        let mut cpu = cpu_with_width(InstructionWidth::Word);
        cpu.regs.write_g16(Register16::AX, 0x8000);
        cpu.regs.write_g16(Register16::DX, 0xFFFF);
        assert_eq!(cpu.div_op(true, 0xFFFF), Err(CpuException::DivideError));
    }

    #[test]
    fn div_results_by_width() {
        let mut cpu = cpu_with_width(InstructionWidth::Byte);
        cpu.regs.write_g16(Register16::AX, 100);
        cpu.div_op(false, 7).unwrap();
        assert_eq!(cpu.regs.read_g8(Register8::AL), 14);
        assert_eq!(cpu.regs.read_g8(Register8::AH), 2);

        let mut cpu = cpu_with_width(InstructionWidth::Qword);
        cpu.regs.write_g64(Register64::RDX, 0);
        cpu.regs.write_g64(Register64::RAX, 1_000_000_007);
        cpu.div_op(false, 10).unwrap();
        assert_eq!(cpu.regs.read_g64(Register64::RAX), 100_000_000);
        assert_eq!(cpu.regs.read_g64(Register64::RDX), 7);

        // Signed remainder carries the dividend's sign.
        let mut cpu = cpu_with_width(InstructionWidth::Word);
        cpu.regs.write_g16(Register16::AX, (-7i16) as u16);
        cpu.regs.write_g16(Register16::DX, 0xFFFF);
        cpu.div_op(true, 2).unwrap();
        assert_eq!(cpu.regs.read_g16(Register16::AX), (-3i16) as u16);
        assert_eq!(cpu.regs.read_g16(Register16::DX), (-1i16) as u16);
    }
}
