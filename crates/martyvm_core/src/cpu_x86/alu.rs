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

    cpu_x86::alu.rs

    Integer ALU execution at the current instruction width. Computes the
    architectural result and updates exactly the flags the real CPU
    updates; values travel as u64 and are masked by the helpers.

*/

#![allow(dead_code)]

use crate::{
    cpu_common::{alu::*, InstructionWidth},
    cpu_x86::{CpuX86, Flag},
};

// One ALU case at a concrete primitive width: run the trait method, apply
// the full CF/OF/AF/SZP update, return the widened result.
macro_rules! alu_case {
    ($self:ident, $ty:ty, $o1:expr, $o2:expr, $method:ident) => {{
        let (result, carry, overflow, aux_carry) = ($o1 as $ty).$method($o2 as $ty);
        $self.set_flag_state(Flag::Carry, carry);
        $self.set_flag_state(Flag::Overflow, overflow);
        $self.set_flag_state(Flag::AuxCarry, aux_carry);
        $self.set_szp_flags_from_result(result as u64);
        result as u64
    }};
    ($self:ident, $ty:ty, $o1:expr, $o2:expr, $method:ident, $carry_in:expr) => {{
        let (result, carry, overflow, aux_carry) = ($o1 as $ty).$method($o2 as $ty, $carry_in);
        $self.set_flag_state(Flag::Carry, carry);
        $self.set_flag_state(Flag::Overflow, overflow);
        $self.set_flag_state(Flag::AuxCarry, aux_carry);
        $self.set_szp_flags_from_result(result as u64);
        result as u64
    }};
}

// As alu_case, but the carry flag is left unmodified (INC/DEC).
macro_rules! alu_case_nc {
    ($self:ident, $ty:ty, $o1:expr, $o2:expr, $method:ident) => {{
        let (result, _carry, overflow, aux_carry) = ($o1 as $ty).$method($o2 as $ty);
        $self.set_flag_state(Flag::Overflow, overflow);
        $self.set_flag_state(Flag::AuxCarry, aux_carry);
        $self.set_szp_flags_from_result(result as u64);
        result as u64
    }};
}

macro_rules! alu_widths {
    ($self:ident, $o1:expr, $o2:expr, $case:ident, $method:ident $(, $extra:expr)?) => {
        match $self.i.width {
            InstructionWidth::Byte => $case!($self, u8, $o1, $o2, $method $(, $extra)?),
            InstructionWidth::Word => $case!($self, u16, $o1, $o2, $method $(, $extra)?),
            InstructionWidth::Dword => $case!($self, u32, $o1, $o2, $method $(, $extra)?),
            InstructionWidth::Qword => $case!($self, u64, $o1, $o2, $method $(, $extra)?),
        }
    };
}

impl CpuX86 {
    /// Execute one ALU operation selected by Xi at the current width.
    /// CMP and TEST compute flags only and return operand1 unchanged.
    pub(crate) fn alu_op(&mut self, xi: Xi, operand1: u64, operand2: u64) -> u64 {
        use Xi::*;
        match xi {
            ADD => alu_widths!(self, operand1, operand2, alu_case, alu_add),
            ADC => {
                let carry_in = self.get_flag(Flag::Carry);
                alu_widths!(self, operand1, operand2, alu_case, alu_adc, carry_in)
            }
            SUB => alu_widths!(self, operand1, operand2, alu_case, alu_sub),
            SBB => {
                let carry_in = self.get_flag(Flag::Carry);
                alu_widths!(self, operand1, operand2, alu_case, alu_sbb, carry_in)
            }
            CMP => {
                // CMP behaves like SUB except the result is not stored.
                alu_widths!(self, operand1, operand2, alu_case, alu_sub);
                operand1
            }
            NEG => {
                // CF is set unless the operand was zero; remaining flags
                // follow the subtraction 0 - operand.
                let result = alu_widths!(self, 0u64, operand1, alu_case, alu_sub);
                self.set_flag_state(Flag::Carry, operand1 & self.i.width.mask() != 0);
                result
            }
            INC => alu_widths!(self, operand1, 1u64, alu_case_nc, alu_add),
            DEC => alu_widths!(self, operand1, 1u64, alu_case_nc, alu_sub),
            OR => {
                let result = (operand1 | operand2) & self.i.width.mask();
                self.clear_flag(Flag::Carry);
                self.clear_flag(Flag::Overflow);
                self.clear_flag(Flag::AuxCarry);
                self.set_szp_flags_from_result(result);
                result
            }
            AND => {
                let result = (operand1 & operand2) & self.i.width.mask();
                self.clear_flag(Flag::Carry);
                self.clear_flag(Flag::Overflow);
                self.clear_flag(Flag::AuxCarry);
                self.set_szp_flags_from_result(result);
                result
            }
            XOR => {
                let result = (operand1 ^ operand2) & self.i.width.mask();
                self.clear_flag(Flag::Carry);
                self.clear_flag(Flag::Overflow);
                self.clear_flag(Flag::AuxCarry);
                self.set_szp_flags_from_result(result);
                result
            }
            TEST => {
                let result = (operand1 & operand2) & self.i.width.mask();
                self.clear_flag(Flag::Carry);
                self.clear_flag(Flag::Overflow);
                self.clear_flag(Flag::AuxCarry);
                self.set_szp_flags_from_result(result);
                // TEST does not modify operand1.
                operand1
            }
            NOT => {
                // Flags: none.
                !operand1 & self.i.width.mask()
            }
            _ => panic!("alu_op(): shift/rotate Xi routed to the wrong helper: {:?}", xi),
        }
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

    fn flags_of(cpu: &CpuX86) -> (bool, bool, bool, bool, bool, bool) {
        (
            cpu.get_flag(Flag::Carry),
            cpu.get_flag(Flag::Overflow),
            cpu.get_flag(Flag::AuxCarry),
            cpu.get_flag(Flag::Zero),
            cpu.get_flag(Flag::Sign),
            cpu.get_flag(Flag::Parity),
        )
    }

    #[test]
    fn add_flag_vectors_8bit() {
        let mut cpu = cpu_with_width(InstructionWidth::Byte);

        // add(1, 1) = 2: no carry, no overflow, no aux, not zero, positive,
        // parity odd (one bit set).
        let r = cpu.alu_op(Xi::ADD, 1, 1);
        assert_eq!(r, 2);
        assert_eq!(flags_of(&cpu), (false, false, false, false, false, false));

        // add(128, 128) = 0 with carry out and signed overflow; result zero
        // has even parity.
        let r = cpu.alu_op(Xi::ADD, 128, 128);
        assert_eq!(r, 0);
        assert_eq!(flags_of(&cpu), (true, true, false, true, false, true));

        // add(0x0F, 0x01): aux carry from the low nibble.
        let r = cpu.alu_op(Xi::ADD, 0x0F, 0x01);
        assert_eq!(r, 0x10);
        assert!(cpu.get_flag(Flag::AuxCarry));
    }

    #[test]
    fn add_boundary_vectors_by_width() {
        // Width-max wraps to zero with carry at every width.
        for (width, max) in [
            (InstructionWidth::Byte, 0xFFu64),
            (InstructionWidth::Word, 0xFFFF),
            (InstructionWidth::Dword, 0xFFFF_FFFF),
            (InstructionWidth::Qword, u64::MAX),
        ] {
            let mut cpu = cpu_with_width(width);
            let r = cpu.alu_op(Xi::ADD, max, 1);
            assert_eq!(r, 0, "width {:?}", width);
            assert!(cpu.get_flag(Flag::Carry));
            assert!(cpu.get_flag(Flag::Zero));
            assert!(!cpu.get_flag(Flag::Overflow));
        }

        // Signed-min minus one overflows at every width.
        for (width, smin) in [
            (InstructionWidth::Byte, 0x80u64),
            (InstructionWidth::Word, 0x8000),
            (InstructionWidth::Dword, 0x8000_0000),
            (InstructionWidth::Qword, 0x8000_0000_0000_0000),
        ] {
            let mut cpu = cpu_with_width(width);
            cpu.alu_op(Xi::SUB, smin, 1);
            assert!(cpu.get_flag(Flag::Overflow), "width {:?}", width);
            assert!(!cpu.get_flag(Flag::Sign));
        }
    }

    #[test]
    fn inc_preserves_carry() {
        let mut cpu = cpu_with_width(InstructionWidth::Word);
        cpu.set_flag(Flag::Carry);
        let r = cpu.alu_op(Xi::INC, 0xFFFF, 0);
        assert_eq!(r, 0);
        // INC wrapped but must not touch CF.
        assert!(cpu.get_flag(Flag::Carry));
        assert!(cpu.get_flag(Flag::Zero));

        cpu.clear_flag(Flag::Carry);
        cpu.alu_op(Xi::DEC, 0, 0);
        assert!(!cpu.get_flag(Flag::Carry));
    }

    #[test]
    fn logical_ops_clear_carry_and_overflow() {
        let mut cpu = cpu_with_width(InstructionWidth::Dword);
        cpu.set_flag(Flag::Carry);
        cpu.set_flag(Flag::Overflow);
        let r = cpu.alu_op(Xi::AND, 0xFF00_FF00, 0x0FF0_0FF0);
        assert_eq!(r, 0x0F00_0F00);
        assert!(!cpu.get_flag(Flag::Carry));
        assert!(!cpu.get_flag(Flag::Overflow));
    }

    #[test]
    fn cmp_and_test_do_not_modify_dest() {
        let mut cpu = cpu_with_width(InstructionWidth::Word);
        assert_eq!(cpu.alu_op(Xi::CMP, 5, 9), 5);
        assert!(cpu.get_flag(Flag::Carry));
        assert_eq!(cpu.alu_op(Xi::TEST, 0xF0F0, 0x0F0F), 0xF0F0);
        assert!(cpu.get_flag(Flag::Zero));
    }

    #[test]
    fn neg_carry_rule() {
        let mut cpu = cpu_with_width(InstructionWidth::Byte);
        cpu.alu_op(Xi::NEG, 0, 0);
        assert!(!cpu.get_flag(Flag::Carry));
        let r = cpu.alu_op(Xi::NEG, 1, 0);
        assert_eq!(r, 0xFF);
        assert!(cpu.get_flag(Flag::Carry));
    }
}
