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

    cpu_x86::modrm.rs

    ModRM and SIB decoding for both addressing widths. 16-bit addressing
    uses the legacy BX/SI/DI/BP table; 32/64-bit addressing reads a SIB
    byte when rm=4. Register numbers are extended by REX.R/X/B where a REX
    prefix survived to the opcode. Byte counts returned here include the
    ModRM byte itself, any SIB byte, and the displacement.

*/

#![allow(dead_code)]

use modular_bitfield::prelude::*;

use crate::{
    bytequeue::ByteQueue,
    cpu_common::{
        instruction::RexPrefix,
        AddressingMode,
        DecodeError,
        Displacement,
        Register16,
        Register32,
        Register64,
        Register8,
        Segment,
        REGISTER16_LUT,
        REGISTER32_LUT,
        REGISTER64_LUT,
        REGISTER8_LUT,
        REGISTER8_REX_LUT,
        SREGISTER_LUT,
    },
};

#[bitfield]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ModRmByte {
    pub rm: B3,
    pub reg: B3,
    pub md: B2,
}

#[bitfield]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SibByte {
    pub base: B3,
    pub index: B3,
    pub scale: B2,
}

impl ModRmByte {
    #[inline]
    pub fn is_addressing_mode(&self) -> bool {
        self.md() != 0b11
    }

    /// ModRM reg field as a 3-bit opcode extension (group selector).
    /// Never REX-extended; REX.R does not reach opcode extensions.
    #[inline]
    pub fn op_extension(&self) -> u8 {
        self.reg()
    }

    // R/M field register selectors (mod=3 register form), extended by REX.B.

    #[inline]
    pub fn rm_reg8(&self, rex: Option<RexPrefix>) -> Register8 {
        match rex {
            Some(r) => REGISTER8_REX_LUT[(self.rm() | (r.b() as u8) << 3) as usize],
            None => REGISTER8_LUT[self.rm() as usize],
        }
    }

    #[inline]
    pub fn rm_reg16(&self, rex: Option<RexPrefix>) -> Register16 {
        REGISTER16_LUT[(self.rm() | rex_b(rex)) as usize]
    }

    #[inline]
    pub fn rm_reg32(&self, rex: Option<RexPrefix>) -> Register32 {
        REGISTER32_LUT[(self.rm() | rex_b(rex)) as usize]
    }

    #[inline]
    pub fn rm_reg64(&self, rex: Option<RexPrefix>) -> Register64 {
        REGISTER64_LUT[(self.rm() | rex_b(rex)) as usize]
    }

    // REG field register selectors, extended by REX.R.

    #[inline]
    pub fn reg_reg8(&self, rex: Option<RexPrefix>) -> Register8 {
        match rex {
            Some(r) => REGISTER8_REX_LUT[(self.reg() | (r.r() as u8) << 3) as usize],
            None => REGISTER8_LUT[self.reg() as usize],
        }
    }

    #[inline]
    pub fn reg_reg16(&self, rex: Option<RexPrefix>) -> Register16 {
        REGISTER16_LUT[(self.reg() | rex_r(rex)) as usize]
    }

    #[inline]
    pub fn reg_reg32(&self, rex: Option<RexPrefix>) -> Register32 {
        REGISTER32_LUT[(self.reg() | rex_r(rex)) as usize]
    }

    #[inline]
    pub fn reg_reg64(&self, rex: Option<RexPrefix>) -> Register64 {
        REGISTER64_LUT[(self.reg() | rex_r(rex)) as usize]
    }

    /// REG field as a segment register. Encodings 6/7 are invalid.
    #[inline]
    pub fn reg_segment(&self) -> Option<Segment> {
        SREGISTER_LUT[self.reg() as usize]
    }
}

#[inline]
fn rex_b(rex: Option<RexPrefix>) -> u8 {
    rex.map(|r| (r.b() as u8) << 3).unwrap_or(0)
}

#[inline]
fn rex_x(rex: Option<RexPrefix>) -> u8 {
    rex.map(|r| (r.x() as u8) << 3).unwrap_or(0)
}

#[inline]
fn rex_r(rex: Option<RexPrefix>) -> u8 {
    rex.map(|r| (r.r() as u8) << 3).unwrap_or(0)
}

/// Read a ModRM byte and resolve its 16-bit addressing form, loading any
/// displacement. Returns (modrm, mode, bytes consumed).
pub fn read_modrm_16(bytes: &mut impl ByteQueue) -> Result<(ModRmByte, AddressingMode, u32), DecodeError> {
    let byte = bytes.q_read_u8()?;
    let modrm = ModRmByte::from_bytes([byte]);
    let mut size = 1;

    if !modrm.is_addressing_mode() {
        return Ok((modrm, AddressingMode::RegisterMode, size));
    }

    // Displacement per mod field; the disp16-only row sits at mod=0, rm=6.
    let disp = match modrm.md() {
        0b00 if modrm.rm() == 6 => {
            size += 2;
            Displacement::Disp16(bytes.q_read_i16()?)
        }
        0b00 => Displacement::NoDisp,
        0b01 => {
            size += 1;
            Displacement::Disp8(bytes.q_read_i8()?)
        }
        _ => {
            size += 2;
            Displacement::Disp16(bytes.q_read_i16()?)
        }
    };

    let mode = match modrm.rm() {
        0 => AddressingMode::BxSi(disp),
        1 => AddressingMode::BxDi(disp),
        2 => AddressingMode::BpSi(disp),
        3 => AddressingMode::BpDi(disp),
        4 => AddressingMode::Si(disp),
        5 => AddressingMode::Di(disp),
        6 => {
            if modrm.md() == 0b00 {
                AddressingMode::Disp16(disp)
            }
            else {
                AddressingMode::Bp(disp)
            }
        }
        _ => AddressingMode::Bx(disp),
    };

    Ok((modrm, mode, size))
}

/// Read a ModRM byte (and SIB byte if required) and resolve its 32/64-bit
/// addressing form. `long_mode` selects RIP-relative for the mod=0, rm=5
/// row; outside long mode that row is an absolute disp32.
pub fn read_modrm_32(
    bytes: &mut impl ByteQueue,
    rex: Option<RexPrefix>,
    long_mode: bool,
) -> Result<(ModRmByte, AddressingMode, u32), DecodeError> {
    let byte = bytes.q_read_u8()?;
    let modrm = ModRmByte::from_bytes([byte]);
    let mut size = 1;

    if !modrm.is_addressing_mode() {
        return Ok((modrm, AddressingMode::RegisterMode, size));
    }

    // The SIB byte must be consumed before the displacement.
    let sib = if modrm.rm() == 4 {
        size += 1;
        Some(SibByte::from_bytes([bytes.q_read_u8()?]))
    }
    else {
        None
    };

    let pending = match modrm.md() {
        0b01 => Displacement::Pending8,
        0b10 => Displacement::Pending32,
        _ => Displacement::NoDisp,
    };

    let mode = match (modrm.rm(), sib) {
        // mod=0, rm=5: RIP-relative in long mode, absolute disp32 otherwise.
        (5, None) if modrm.md() == 0b00 => {
            size += 4;
            let disp = Displacement::Disp32(bytes.q_read_i32()?);
            if long_mode {
                AddressingMode::RipRelative(disp)
            }
            else {
                AddressingMode::Disp32(disp)
            }
        }
        (_, Some(sib)) => {
            // Index field 4 with no REX.X extension means no index register.
            let index_bits = sib.index() | rex_x(rex);
            let index = if sib.index() == 4 && rex_x(rex) == 0 {
                None
            }
            else {
                Some(index_bits)
            };

            // Base field 5 with mod=0 means disp32 and no base register.
            if sib.base() == 5 && modrm.md() == 0b00 {
                size += 4;
                let disp = Displacement::Disp32(bytes.q_read_i32()?);
                AddressingMode::BaseIndexScale {
                    base: None,
                    index,
                    scale: 1 << sib.scale(),
                    disp,
                }
            }
            else {
                let disp = load_disp(bytes, pending, &mut size)?;
                AddressingMode::BaseIndexScale {
                    base: Some(sib.base() | rex_b(rex)),
                    index,
                    scale: 1 << sib.scale(),
                    disp,
                }
            }
        }
        (rm, None) => {
            let disp = load_disp(bytes, pending, &mut size)?;
            AddressingMode::Base {
                base: rm | rex_b(rex),
                disp,
            }
        }
    };

    Ok((modrm, mode, size))
}

fn load_disp(
    bytes: &mut impl ByteQueue,
    pending: Displacement,
    size: &mut u32,
) -> Result<Displacement, DecodeError> {
    match pending {
        Displacement::Pending8 => {
            *size += 1;
            Ok(Displacement::Disp8(bytes.q_read_i8()?))
        }
        Displacement::Pending32 => {
            *size += 4;
            Ok(Displacement::Disp32(bytes.q_read_i32()?))
        }
        other => Ok(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytequeue::CodeWindow;

    // Expected (bytes consumed) for each 16-bit ModRM value, per the
    // legacy addressing table.
    fn expected_size_16(byte: u8) -> u32 {
        let md = byte >> 6;
        let rm = byte & 0x07;
        match md {
            0b00 => {
                if rm == 6 {
                    3
                }
                else {
                    1
                }
            }
            0b01 => 2,
            0b10 => 3,
            _ => 1,
        }
    }

    #[test]
    fn modrm16_exhaustive() {
        // Enough trailing bytes for the largest displacement.
        for byte in 0..=255u8 {
            let buf = [byte, 0x34, 0x12, 0x00, 0x00, 0x00];
            let mut q = CodeWindow::new(&buf, 0);
            let (modrm, mode, size) = read_modrm_16(&mut q).unwrap();
            assert_eq!(size, expected_size_16(byte), "modrm byte {:02X}", byte);
            assert_eq!(modrm.md(), byte >> 6);
            assert_eq!(modrm.reg(), (byte >> 3) & 7);
            assert_eq!(modrm.rm(), byte & 7);

            if byte >> 6 == 0b11 {
                assert_eq!(mode, AddressingMode::RegisterMode);
            }
            else {
                // The disp16-only row must carry no base register.
                if byte >> 6 == 0b00 && byte & 7 == 6 {
                    assert_eq!(mode, AddressingMode::Disp16(Displacement::Disp16(0x1234)));
                }
                else {
                    assert_ne!(mode, AddressingMode::RegisterMode);
                }
            }
        }
    }

    fn expected_size_32(byte: u8) -> u32 {
        let md = byte >> 6;
        let rm = byte & 0x07;
        if md == 0b11 {
            return 1;
        }
        let mut size = 1;
        let mut sib_base5 = false;
        if rm == 4 {
            size += 1;
            // Our probe SIB byte is 0x25: base=5, index=4 (none), scale=0.
            sib_base5 = true;
        }
        match md {
            0b00 => {
                if rm == 5 || (sib_base5 && md == 0b00) {
                    size += 4;
                }
            }
            0b01 => size += 1,
            _ => size += 4,
        }
        size
    }

    #[test]
    fn modrm32_exhaustive() {
        for byte in 0..=255u8 {
            // SIB probe: base=5, index=none, scale=1; exercises the
            // disp32-no-base rule when mod=0.
            let buf = [byte, 0x25, 0x78, 0x56, 0x34, 0x12, 0x00, 0x00, 0x00];
            let mut q = CodeWindow::new(&buf, 0);
            let (_, mode, size) = read_modrm_32(&mut q, None, false).unwrap();
            assert_eq!(size, expected_size_32(byte), "modrm byte {:02X}", byte);

            let md = byte >> 6;
            let rm = byte & 0x07;
            if md == 0b00 && rm == 5 {
                // Outside long mode: absolute disp32, no base.
                assert_eq!(mode, AddressingMode::Disp32(Displacement::Disp32(0x12345678)));
            }
            if md == 0b00 && rm == 4 {
                // SIB base=5, mod=0: disp32 with no base register.
                assert_eq!(
                    mode,
                    AddressingMode::BaseIndexScale {
                        base: None,
                        index: None,
                        scale: 1,
                        disp: Displacement::Disp32(0x12345678),
                    }
                );
            }
        }
    }

    #[test]
    fn modrm64_rip_relative() {
        // mod=0, rm=5 in long mode defers to RIP-relative.
        let buf = [0x05, 0x10, 0x00, 0x00, 0x00];
        let mut q = CodeWindow::new(&buf, 0);
        let (_, mode, size) = read_modrm_32(&mut q, None, true).unwrap();
        assert_eq!(size, 5);
        assert_eq!(mode, AddressingMode::RipRelative(Displacement::Disp32(0x10)));
    }

    #[test]
    fn rex_x_extends_index_past_the_none_row() {
        // SIB index=4 normally means "no index"; with REX.X it selects r12.
        let buf = [0x04, 0xA4, 0x00]; // modrm rm=4, sib: scale=2, index=4, base=4
        let mut rex = RexPrefix::new();
        rex.set_x(true);

        let mut q = CodeWindow::new(&buf, 0);
        let (_, mode, _) = read_modrm_32(&mut q, Some(rex), true).unwrap();
        assert_eq!(
            mode,
            AddressingMode::BaseIndexScale {
                base: Some(4),
                index: Some(12),
                scale: 4,
                disp: Displacement::NoDisp,
            }
        );

        let mut q = CodeWindow::new(&buf, 0);
        let (_, mode, _) = read_modrm_32(&mut q, None, true).unwrap();
        assert_eq!(
            mode,
            AddressingMode::BaseIndexScale {
                base: Some(4),
                index: None,
                scale: 4,
                disp: Displacement::NoDisp,
            }
        );
    }

    #[test]
    fn truncated_displacement_is_incomplete() {
        let buf = [0x86]; // mod=10, rm=6: BP+disp16, but no disp bytes
        let mut q = CodeWindow::new(&buf, 0);
        assert!(matches!(read_modrm_16(&mut q), Err(DecodeError::Incomplete)));
    }
}
