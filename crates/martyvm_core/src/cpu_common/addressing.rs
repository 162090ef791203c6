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

    cpu_common::addressing.rs

    Addressing mode forms produced by the ModRM/SIB resolver. The 16-bit
    forms mirror the legacy BX/SI/DI/BP table one-to-one; 32/64-bit forms
    carry raw (REX-extended) register indices so the execution layer can
    read the register file directly. RIP-relative carries only the
    displacement; the add against the post-instruction pointer is deferred
    until total instruction length is known.

*/

#![allow(dead_code)]

use std::fmt::{Display, Formatter};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum Displacement {
    #[default]
    NoDisp,
    Pending8,
    Pending16,
    Pending32,
    Disp8(i8),
    Disp16(i16),
    Disp32(i32),
}

impl Displacement {
    /// Sign-extended displacement value.
    #[inline]
    pub fn value(&self) -> i64 {
        match self {
            Displacement::Disp8(d) => *d as i64,
            Displacement::Disp16(d) => *d as i64,
            Displacement::Disp32(d) => *d as i64,
            _ => 0,
        }
    }

    /// Encoded size of the displacement in bytes.
    #[inline]
    pub fn size(&self) -> u32 {
        match self {
            Displacement::Disp8(_) | Displacement::Pending8 => 1,
            Displacement::Disp16(_) | Displacement::Pending16 => 2,
            Displacement::Disp32(_) | Displacement::Pending32 => 4,
            Displacement::NoDisp => 0,
        }
    }

    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            Displacement::Pending8 | Displacement::Pending16 | Displacement::Pending32
        )
    }
}

impl Display for Displacement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Displacement::Disp8(d) => write!(f, "{:+#x}", d),
            Displacement::Disp16(d) => write!(f, "{:+#x}", d),
            Displacement::Disp32(d) => write!(f, "{:+#x}", d),
            _ => write!(f, ""),
        }
    }
}

/// Every memory form the resolver can produce.
///
/// The eight 16-bit rows are the legacy table keyed by the low three R/M
/// bits: BX+SI, BX+DI, BP+SI, BP+DI, SI, DI, BP (disp16-only at mod=0),
/// BX. 32/64-bit forms carry REX-extended register indices (0-15).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum AddressingMode {
    #[default]
    RegisterMode,
    // 16-bit addressing
    BxSi(Displacement),
    BxDi(Displacement),
    BpSi(Displacement),
    BpDi(Displacement),
    Si(Displacement),
    Di(Displacement),
    Disp16(Displacement),
    Bp(Displacement),
    Bx(Displacement),
    // 32/64-bit addressing; widths come from the effective address size.
    Base {
        base: u8,
        disp: Displacement,
    },
    BaseIndexScale {
        base: Option<u8>,
        index: Option<u8>,
        scale: u8,
        disp: Displacement,
    },
    Disp32(Displacement),
    RipRelative(Displacement),
}

impl AddressingMode {
    /// Whether the default segment for this mode is SS rather than DS:
    /// BP-based 16-bit forms, and 32/64-bit forms based on ESP/RSP (4) or
    /// EBP/RBP (5). The bare disp16/disp32 rows default to DS.
    pub fn default_segment_is_stack(&self) -> bool {
        match self {
            AddressingMode::BpSi(_) | AddressingMode::BpDi(_) | AddressingMode::Bp(_) => true,
            AddressingMode::Base { base, .. } => *base == 4 || *base == 5,
            AddressingMode::BaseIndexScale { base: Some(b), .. } => *b == 4 || *b == 5,
            _ => false,
        }
    }

    /// Replace a pending displacement with the loaded one.
    pub fn with_displacement(&self, disp: Displacement) -> AddressingMode {
        use AddressingMode::*;
        match *self {
            BxSi(_) => BxSi(disp),
            BxDi(_) => BxDi(disp),
            BpSi(_) => BpSi(disp),
            BpDi(_) => BpDi(disp),
            Si(_) => Si(disp),
            Di(_) => Di(disp),
            Disp16(_) => Disp16(disp),
            Bp(_) => Bp(disp),
            Bx(_) => Bx(disp),
            Base { base, .. } => Base { base, disp },
            BaseIndexScale { base, index, scale, .. } => BaseIndexScale { base, index, scale, disp },
            Disp32(_) => Disp32(disp),
            RipRelative(_) => RipRelative(disp),
            RegisterMode => RegisterMode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displacement_values() {
        assert_eq!(Displacement::Disp8(-1).value(), -1);
        assert_eq!(Displacement::Disp16(-300).value(), -300);
        assert_eq!(Displacement::Disp32(0x1000).value(), 0x1000);
        assert_eq!(Displacement::NoDisp.size(), 0);
        assert_eq!(Displacement::Disp32(5).size(), 4);
    }

    #[test]
    fn stack_segment_defaults() {
        assert!(AddressingMode::BpSi(Displacement::NoDisp).default_segment_is_stack());
        assert!(AddressingMode::Bp(Displacement::Disp8(2)).default_segment_is_stack());
        assert!(!AddressingMode::Disp16(Displacement::Disp16(0)).default_segment_is_stack());
        assert!(AddressingMode::Base {
            base: 5,
            disp: Displacement::Disp8(0)
        }
        .default_segment_is_stack());
        assert!(!AddressingMode::Base {
            base: 0,
            disp: Displacement::NoDisp
        }
        .default_segment_is_stack());
    }
}
