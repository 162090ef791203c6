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

    cpu_x86::bcd.rs

    Legacy decimal/ASCII adjust instructions. The architecturally defined
    flags follow the SDM pseudocode; the undefined bits diverge between
    vendors and are driven by the configured VendorPolicy. The divergence
    rows are pinned by the reference vector table in the tests - change
    one only with new measurements.

*/

#![allow(dead_code)]

use crate::{
    cpu_common::{CpuException, Register16, Register8, VendorPolicy, PARITY_TABLE},
    cpu_x86::{CpuX86, Flag},
};

impl CpuX86 {
    /// DAA - Decimal Adjust AL after Addition
    /// CF/AF per operation; SF/ZF/PF from the result. OF is undefined and
    /// cleared under both policies. ZF additionally sets for the 0xFF
    /// input row under the Intel policy.
    pub(crate) fn daa(&mut self) {
        let old_al = self.regs.read_g8(Register8::AL);
        let old_cf = self.get_flag(Flag::Carry);
        let old_af = self.get_flag(Flag::AuxCarry);
        let mut al = old_al;
        let mut cf = false;

        if (al & 0x0F) > 9 || old_af {
            cf = old_cf || al > 0xF9;
            al = al.wrapping_add(6);
            self.set_flag(Flag::AuxCarry);
        }
        else {
            self.clear_flag(Flag::AuxCarry);
        }
        if old_al > 0x99 || old_cf {
            al = al.wrapping_add(0x60);
            cf = true;
        }

        self.regs.write_g8(Register8::AL, al);
        self.set_flag_state(Flag::Carry, cf);
        self.clear_flag(Flag::Overflow);
        self.set_flag_state(Flag::Sign, al & 0x80 != 0);
        self.set_flag_state(Flag::Parity, PARITY_TABLE[al as usize]);

        let mut zf = al == 0;
        if self.vendor() == VendorPolicy::Intel && old_al == 0xFF {
            // Measured Intel quirk: the all-ones input row reports ZF even
            // though the adjusted result is non-zero.
            zf = true;
        }
        self.set_flag_state(Flag::Zero, zf);
    }

    /// DAS - Decimal Adjust AL after Subtraction
    pub(crate) fn das(&mut self) {
        let old_al = self.regs.read_g8(Register8::AL);
        let old_cf = self.get_flag(Flag::Carry);
        let old_af = self.get_flag(Flag::AuxCarry);
        let mut al = old_al;
        let mut cf = false;

        if (al & 0x0F) > 9 || old_af {
            cf = old_cf || al < 6;
            al = al.wrapping_sub(6);
            self.set_flag(Flag::AuxCarry);
        }
        else {
            self.clear_flag(Flag::AuxCarry);
        }
        if old_al > 0x99 || old_cf {
            al = al.wrapping_sub(0x60);
            cf = true;
        }

        self.regs.write_g8(Register8::AL, al);
        self.set_flag_state(Flag::Carry, cf);
        self.clear_flag(Flag::Overflow);
        self.set_flag_state(Flag::Zero, al == 0);
        self.set_flag_state(Flag::Sign, al & 0x80 != 0);
        self.set_flag_state(Flag::Parity, PARITY_TABLE[al as usize]);
    }

    /// AAA - ASCII Adjust after Addition
    /// AF/CF per operation; OF/SF/ZF/PF are undefined. Both policies set
    /// SZP from the final AL and clear OF, which is what the vectors pin.
    pub(crate) fn aaa(&mut self) {
        let old_af = self.get_flag(Flag::AuxCarry);
        let al = self.regs.read_g8(Register8::AL);

        if (al & 0x0F) > 9 || old_af {
            // The adjustment reads AL only, not AX, despite the SDM's
            // AX := AX + 106H phrasing.
            let new_al = al.wrapping_add(6);
            let ah = self.regs.read_g8(Register8::AH).wrapping_add(1);
            self.regs.write_g8(Register8::AH, ah);
            self.regs.write_g8(Register8::AL, new_al & 0x0F);
            self.set_flag(Flag::AuxCarry);
            self.set_flag(Flag::Carry);
        }
        else {
            self.regs.write_g8(Register8::AL, al & 0x0F);
            self.clear_flag(Flag::AuxCarry);
            self.clear_flag(Flag::Carry);
        }

        let result = self.regs.read_g8(Register8::AL);
        self.clear_flag(Flag::Overflow);
        self.set_flag_state(Flag::Zero, result == 0);
        self.set_flag_state(Flag::Sign, result & 0x80 != 0);
        self.set_flag_state(Flag::Parity, PARITY_TABLE[result as usize]);
    }

    /// AAS - ASCII Adjust after Subtraction
    pub(crate) fn aas(&mut self) {
        let old_af = self.get_flag(Flag::AuxCarry);
        let al = self.regs.read_g8(Register8::AL);

        if (al & 0x0F) > 9 || old_af {
            let new_al = al.wrapping_sub(6);
            let ah = self.regs.read_g8(Register8::AH).wrapping_sub(1);
            self.regs.write_g8(Register8::AH, ah);
            self.regs.write_g8(Register8::AL, new_al & 0x0F);
            self.set_flag(Flag::AuxCarry);
            self.set_flag(Flag::Carry);
        }
        else {
            self.regs.write_g8(Register8::AL, al & 0x0F);
            self.clear_flag(Flag::AuxCarry);
            self.clear_flag(Flag::Carry);
        }

        let result = self.regs.read_g8(Register8::AL);
        self.clear_flag(Flag::Overflow);
        self.set_flag_state(Flag::Zero, result == 0);
        self.set_flag_state(Flag::Sign, result & 0x80 != 0);
        self.set_flag_state(Flag::Parity, PARITY_TABLE[result as usize]);
    }

    /// AAM - ASCII Adjust AX after Multiply. The immediate is the base;
    /// zero raises #DE before any register write.
    pub(crate) fn aam(&mut self, base: u8) -> Result<(), CpuException> {
        if base == 0 {
            return Err(CpuException::DivideError);
        }
        let al = self.regs.read_g8(Register8::AL);
        self.regs.write_g8(Register8::AH, al / base);
        let new_al = al % base;
        self.regs.write_g8(Register8::AL, new_al);

        self.clear_flag(Flag::Carry);
        self.clear_flag(Flag::Overflow);
        self.clear_flag(Flag::AuxCarry);
        self.set_flag_state(Flag::Zero, new_al == 0);
        self.set_flag_state(Flag::Sign, new_al & 0x80 != 0);
        self.set_flag_state(Flag::Parity, PARITY_TABLE[new_al as usize]);
        Ok(())
    }

    /// AAD - ASCII Adjust AX before Division. Flags from the resulting AL.
    pub(crate) fn aad(&mut self, base: u8) {
        let al = self.regs.read_g8(Register8::AL);
        let ah = self.regs.read_g8(Register8::AH);
        let new_al = al.wrapping_add(ah.wrapping_mul(base));
        self.regs.write_g16(Register16::AX, new_al as u16);

        self.clear_flag(Flag::Carry);
        self.clear_flag(Flag::Overflow);
        self.clear_flag(Flag::AuxCarry);
        self.set_flag_state(Flag::Zero, new_al == 0);
        self.set_flag_state(Flag::Sign, new_al & 0x80 != 0);
        self.set_flag_state(Flag::Parity, PARITY_TABLE[new_al as usize]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cpu_common::{CpuMode, CpuModel, Instruction, InstructionWidth, VendorPolicy};

    fn cpu(vendor: VendorPolicy) -> CpuX86 {
        let mut cpu = CpuX86::new(CpuMode::Mode16, CpuModel::Cpu80386, vendor);
        cpu.i = Instruction {
            width: InstructionWidth::Byte,
            ..Default::default()
        };
        cpu
    }

    // Reference vectors: (al_in, cf_in, af_in) -> (al_out, cf_out, zf_out).
    // The 0xFF row is the vendor-divergent one.
    const DAA_VECTORS_INTEL: &[(u8, bool, bool, u8, bool, bool)] = &[
        (0x00, false, false, 0x00, false, true),
        (0x0A, false, false, 0x10, false, false),
        (0x9A, false, false, 0x00, true, true),
        (0x99, false, false, 0x99, false, false),
        (0x1F, false, false, 0x25, false, false),
        (0xFF, false, false, 0x65, true, true),
        (0x42, true, false, 0xA2, true, false),
    ];

    const DAA_VECTORS_AMD: &[(u8, bool, bool, u8, bool, bool)] = &[
        (0x00, false, false, 0x00, false, true),
        (0x0A, false, false, 0x10, false, false),
        (0x9A, false, false, 0x00, true, true),
        (0x99, false, false, 0x99, false, false),
        (0x1F, false, false, 0x25, false, false),
        (0xFF, false, false, 0x65, true, false),
        (0x42, true, false, 0xA2, true, false),
    ];

    fn run_daa_vectors(vendor: VendorPolicy, vectors: &[(u8, bool, bool, u8, bool, bool)]) {
        for &(al, cf, af, al_out, cf_out, zf_out) in vectors {
            let mut c = cpu(vendor);
            c.regs.write_g8(Register8::AL, al);
            c.set_flag_state(Flag::Carry, cf);
            c.set_flag_state(Flag::AuxCarry, af);
            c.daa();
            assert_eq!(c.regs.read_g8(Register8::AL), al_out, "al for input {:02X}", al);
            assert_eq!(c.get_flag(Flag::Carry), cf_out, "cf for input {:02X}", al);
            assert_eq!(c.get_flag(Flag::Zero), zf_out, "zf for input {:02X} ({:?})", al, vendor);
        }
    }

    #[test]
    fn daa_vendor_vectors() {
        run_daa_vectors(VendorPolicy::Intel, DAA_VECTORS_INTEL);
        run_daa_vectors(VendorPolicy::Amd, DAA_VECTORS_AMD);
    }

    #[test]
    fn das_adjusts_down() {
        let mut c = cpu(VendorPolicy::Intel);
        c.regs.write_g8(Register8::AL, 0x4B);
        c.das();
        assert_eq!(c.regs.read_g8(Register8::AL), 0x45);
        assert!(!c.get_flag(Flag::Carry));
        assert!(c.get_flag(Flag::AuxCarry));
    }

    #[test]
    fn aaa_rolls_into_ah() {
        let mut c = cpu(VendorPolicy::Intel);
        c.regs.write_g16(Register16::AX, 0x000B);
        c.aaa();
        assert_eq!(c.regs.read_g8(Register8::AL), 0x01);
        assert_eq!(c.regs.read_g8(Register8::AH), 0x01);
        assert!(c.get_flag(Flag::Carry));
        assert!(c.get_flag(Flag::AuxCarry));

        let mut c = cpu(VendorPolicy::Amd);
        c.regs.write_g16(Register16::AX, 0x0005);
        c.aaa();
        assert_eq!(c.regs.read_g8(Register8::AL), 0x05);
        assert!(!c.get_flag(Flag::Carry));
    }

    #[test]
    fn aas_borrows_from_ah() {
        let mut c = cpu(VendorPolicy::Intel);
        c.regs.write_g16(Register16::AX, 0x010B);
        c.aas();
        assert_eq!(c.regs.read_g8(Register8::AL), 0x05);
        assert_eq!(c.regs.read_g8(Register8::AH), 0x00);
        assert!(c.get_flag(Flag::Carry));
    }

    #[test]
    fn aam_divides_and_faults_on_zero() {
        let mut c = cpu(VendorPolicy::Intel);
        c.regs.write_g8(Register8::AL, 77);
        c.aam(10).unwrap();
        assert_eq!(c.regs.read_g8(Register8::AH), 7);
        assert_eq!(c.regs.read_g8(Register8::AL), 7);
        assert!(!c.get_flag(Flag::Zero));

        c.regs.write_g8(Register8::AL, 5);
        assert_eq!(c.aam(0), Err(CpuException::DivideError));
        // No register changes on the fault path.
        assert_eq!(c.regs.read_g8(Register8::AL), 5);
        assert_eq!(c.regs.read_g8(Register8::AH), 7);
    }

    #[test]
    fn aad_composes_ax() {
        let mut c = cpu(VendorPolicy::Intel);
        c.regs.write_g16(Register16::AX, 0x0702); // 72 decimal as unpacked BCD
        c.aad(10);
        assert_eq!(c.regs.read_g16(Register16::AX), 72);
        assert!(!c.get_flag(Flag::Sign));
    }
}
