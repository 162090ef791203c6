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

    cpu_x86::fpu.rs

    The x87 stack engine: eight tagged slots, a rotating top-of-stack
    pointer, and control/status words. Stack overflow and underflow set
    C1/SF/IE; when the invalid-operation exception is masked the operation
    substitutes the indefinite QNaN instead of faulting, without touching
    any other slot.

    Register contents are f64. Real x87 registers are 80-bit extended
    precision; the narrower representation diverges from hardware in the
    last bits of some integer conversions and transcendentals. The 80-bit
    memory image conversions below preserve what an f64 can hold.

*/

#![allow(dead_code)]

use crate::{
    bus::Bus,
    cpu_common::{CpuError, CpuException, ExecutionResult, InstructionWidth, Mnemonic, OperandType, Register16},
    cpu_x86::CpuX86,
};

pub const FCW_DEFAULT: u16 = 0x037F;
const FCW_EXCEPTION_MASK: u16 = 0b11_1111;

pub const FSW_IE: u16 = 1 << 0;
pub const FSW_DE: u16 = 1 << 1;
pub const FSW_ZE: u16 = 1 << 2;
pub const FSW_OE: u16 = 1 << 3;
pub const FSW_UE: u16 = 1 << 4;
pub const FSW_PE: u16 = 1 << 5;
pub const FSW_SF: u16 = 1 << 6;
pub const FSW_ES: u16 = 1 << 7;
pub const FSW_C0: u16 = 1 << 8;
pub const FSW_C1: u16 = 1 << 9;
pub const FSW_C2: u16 = 1 << 10;
const FSW_TOP_MASK: u16 = 0b111 << 11;
pub const FSW_C3: u16 = 1 << 14;

type FpuResult<T> = Result<T, CpuException>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum FpuTag {
    Valid = 0b00,
    Zero = 0b01,
    Special = 0b10,
    Empty = 0b11,
}

impl FpuTag {
    fn from_f64(v: f64) -> Self {
        if v.is_nan() || v.is_infinite() || v.is_subnormal() {
            FpuTag::Special
        }
        else if v == 0.0 {
            FpuTag::Zero
        }
        else {
            FpuTag::Valid
        }
    }
}

#[derive(Clone, Debug)]
pub struct FpuStack {
    regs: [f64; 8],
    tags: [FpuTag; 8],
    top: u8,
    fcw: u16,
    fsw: u16,
}

impl Default for FpuStack {
    fn default() -> Self {
        let mut s = Self {
            regs: [0.0; 8],
            tags: [FpuTag::Empty; 8],
            top: 0,
            fcw: FCW_DEFAULT,
            fsw: 0,
        };
        s.sync_top();
        s
    }
}

impl FpuStack {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn fninit(&mut self) {
        *self = Self::default();
    }

    /// FNCLEX: clear the exception status flags and the summary bit.
    pub fn fnclex(&mut self) {
        self.fsw &= !(FSW_IE | FSW_DE | FSW_ZE | FSW_OE | FSW_UE | FSW_PE | FSW_SF | FSW_ES);
    }

    #[inline]
    pub fn control_word(&self) -> u16 {
        self.fcw
    }

    #[inline]
    pub fn status_word(&self) -> u16 {
        self.fsw
    }

    pub fn set_control_word(&mut self, cw: u16) {
        self.fcw = cw;
        self.sync_es();
    }

    pub fn tag_word(&self) -> u16 {
        let mut tw = 0u16;
        for (i, tag) in self.tags.iter().copied().enumerate() {
            tw |= (tag as u16) << (i * 2);
        }
        tw
    }

    #[inline]
    pub fn top(&self) -> u8 {
        self.top
    }

    /// Whether an unmasked exception is pending (drives FWAIT/#MF).
    pub fn error_pending(&self) -> bool {
        self.fsw & FSW_ES != 0
    }

    pub fn st(&self, i: usize) -> Option<f64> {
        let phys = self.phys_index(i)?;
        match self.tags[phys] {
            FpuTag::Empty => None,
            _ => Some(self.regs[phys]),
        }
    }

    pub fn st_tag(&self, i: usize) -> Option<FpuTag> {
        let phys = self.phys_index(i)?;
        Some(self.tags[phys])
    }

    fn phys_index(&self, st: usize) -> Option<usize> {
        if st < 8 {
            Some((self.top as usize + st) & 7)
        }
        else {
            None
        }
    }

    fn sync_top(&mut self) {
        self.fsw = (self.fsw & !FSW_TOP_MASK) | ((self.top as u16) << 11);
    }

    fn sync_es(&mut self) {
        let flags = self.fsw & FCW_EXCEPTION_MASK;
        let masks = self.fcw & FCW_EXCEPTION_MASK;
        if flags & !masks != 0 {
            self.fsw |= FSW_ES;
        }
        else {
            self.fsw &= !FSW_ES;
        }
    }

    fn signal_exception(&mut self, flag: u16) -> FpuResult<()> {
        self.fsw |= flag;
        self.sync_es();
        let masks = self.fcw & FCW_EXCEPTION_MASK;
        if flag & !masks != 0 {
            Err(CpuException::FpuError)
        }
        else {
            Ok(())
        }
    }

    fn signal_invalid(&mut self) -> FpuResult<()> {
        self.signal_exception(FSW_IE)
    }

    fn signal_zero_divide(&mut self) -> FpuResult<()> {
        self.signal_exception(FSW_ZE)
    }

    /// Stack overflow: C1 set (push direction), SF set, IE signaled.
    fn stack_overflow(&mut self) -> FpuResult<()> {
        self.fsw |= FSW_C1;
        self.fsw |= FSW_SF;
        self.signal_exception(FSW_IE)
    }

    /// Stack underflow: C1 cleared (pop direction), SF set, IE signaled.
    fn stack_underflow(&mut self) -> FpuResult<()> {
        self.fsw &= !FSW_C1;
        self.fsw |= FSW_SF;
        self.signal_exception(FSW_IE)
    }

    pub(crate) fn read_st(&mut self, st: usize) -> FpuResult<f64> {
        let phys = self.phys_index(st).ok_or(CpuException::FpuError)?;
        if matches!(self.tags[phys], FpuTag::Empty) {
            // Masked underflow substitutes the indefinite value.
            self.stack_underflow()?;
            Ok(f64::NAN)
        }
        else {
            Ok(self.regs[phys])
        }
    }

    pub(crate) fn write_st(&mut self, st: usize, v: f64) -> FpuResult<()> {
        let phys = self.phys_index(st).ok_or(CpuException::FpuError)?;
        self.regs[phys] = v;
        self.tags[phys] = FpuTag::from_f64(v);
        Ok(())
    }

    /// Push rotates TOP down one slot. Pushing onto a full stack signals
    /// overflow; under a masked IE the slot receives the indefinite QNaN
    /// and the rest of the stack is untouched.
    pub(crate) fn push(&mut self, v: f64) -> FpuResult<()> {
        let new_top = (self.top + 7) & 7;
        let phys = new_top as usize;
        if !matches!(self.tags[phys], FpuTag::Empty) {
            self.stack_overflow()?;
            self.top = new_top;
            self.sync_top();
            self.regs[phys] = f64::NAN;
            self.tags[phys] = FpuTag::Special;
            return Ok(());
        }
        self.top = new_top;
        self.sync_top();
        self.regs[phys] = v;
        self.tags[phys] = FpuTag::from_f64(v);
        Ok(())
    }

    pub(crate) fn pop(&mut self) -> FpuResult<()> {
        let phys = self.top as usize;
        if matches!(self.tags[phys], FpuTag::Empty) {
            self.stack_underflow()
        }
        else {
            self.tags[phys] = FpuTag::Empty;
            self.regs[phys] = 0.0;
            self.top = (self.top + 1) & 7;
            self.sync_top();
            Ok(())
        }
    }

    pub(crate) fn ffree(&mut self, st: usize) -> FpuResult<()> {
        let phys = self.phys_index(st).ok_or(CpuException::FpuError)?;
        self.tags[phys] = FpuTag::Empty;
        self.regs[phys] = 0.0;
        Ok(())
    }

    pub(crate) fn fincstp(&mut self) {
        self.top = (self.top + 1) & 7;
        self.fsw &= !FSW_C1;
        self.sync_top();
    }

    pub(crate) fn fdecstp(&mut self) {
        self.top = (self.top + 7) & 7;
        self.fsw &= !FSW_C1;
        self.sync_top();
    }

    pub(crate) fn fxch(&mut self, st: usize) -> FpuResult<()> {
        if st == 0 {
            return Ok(());
        }
        let a = self.phys_index(0).ok_or(CpuException::FpuError)?;
        let b = self.phys_index(st).ok_or(CpuException::FpuError)?;
        if matches!(self.tags[a], FpuTag::Empty) || matches!(self.tags[b], FpuTag::Empty) {
            self.stack_underflow()?;
        }
        self.regs.swap(a, b);
        self.tags.swap(a, b);
        Ok(())
    }

    /// Condition codes from a compare of a against b. Unordered sets
    /// C0/C2/C3 and signals IE.
    pub(crate) fn compare(&mut self, a: f64, b: f64) -> FpuResult<()> {
        self.fsw &= !(FSW_C0 | FSW_C1 | FSW_C2 | FSW_C3);
        if a.is_nan() || b.is_nan() {
            self.fsw |= FSW_C0 | FSW_C2 | FSW_C3;
            self.signal_invalid()?;
            return Ok(());
        }
        if a > b {
            // all condition bits already cleared
        }
        else if a < b {
            self.fsw |= FSW_C0;
        }
        else {
            self.fsw |= FSW_C3;
        }
        Ok(())
    }
}

/// Rounding control from the FCW, applied to integer stores.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Rounding {
    NearestEven,
    Down,
    Up,
    TowardZero,
}

impl Rounding {
    fn from_fcw(fcw: u16) -> Self {
        match (fcw >> 10) & 0b11 {
            0b00 => Rounding::NearestEven,
            0b01 => Rounding::Down,
            0b10 => Rounding::Up,
            _ => Rounding::TowardZero,
        }
    }

    fn round(self, v: f64) -> f64 {
        match self {
            Rounding::NearestEven => v.round_ties_even(),
            Rounding::Down => v.floor(),
            Rounding::Up => v.ceil(),
            Rounding::TowardZero => v.trunc(),
        }
    }
}

/* ----------------------- 80-bit image conversion ------------------------ */

pub fn ext80_from_f64(v: f64) -> (u64, u16) {
    let bits = v.to_bits();
    let sign = (bits >> 63) as u16;
    let exp = ((bits >> 52) & 0x7FF) as u16;
    let frac = bits & ((1u64 << 52) - 1);

    let mut sign_exp: u16 = sign << 15;
    let mant: u64 = match exp {
        0x7FF => {
            sign_exp |= 0x7FFF;
            if frac == 0 {
                1u64 << 63
            }
            else {
                (1u64 << 63) | (1u64 << 62)
            }
        }
        0 => {
            if frac == 0 {
                0
            }
            else {
                // Subnormal f64 values are representable as normal 80-bit
                // values.
                let k = 63 - frac.leading_zeros();
                let exp_unbiased = (k as i32) - 1074;
                sign_exp |= (exp_unbiased + 16383) as u16;
                frac << (63 - k)
            }
        }
        _ => {
            let exp_unbiased = (exp as i32) - 1023;
            sign_exp |= (exp_unbiased + 16383) as u16;
            (1u64 << 63) | (frac << 11)
        }
    };
    (mant, sign_exp)
}

pub fn f64_from_ext80(mant: u64, sign_exp: u16) -> f64 {
    let sign = (sign_exp >> 15) & 1;
    let exp = sign_exp & 0x7FFF;

    if exp == 0 && mant == 0 {
        return if sign == 1 { -0.0 } else { 0.0 };
    }
    if exp == 0x7FFF {
        let int_bit = mant >> 63;
        let frac = mant & ((1u64 << 63) - 1);
        if int_bit == 1 && frac == 0 {
            return if sign == 1 { f64::NEG_INFINITY } else { f64::INFINITY };
        }
        return f64::NAN;
    }

    let m = (mant as f64) / ((1u64 << 63) as f64);
    let exp_unbiased = if exp == 0 { 1i32 - 16383 } else { (exp as i32) - 16383 };
    let mut out = m * 2f64.powi(exp_unbiased);
    if sign == 1 {
        out = -out;
    }
    out
}

/* --------------------------- ESC dispatcher ----------------------------- */

// Memory operand widths per ESC opcode for the arithmetic rows: narrower
// reals and integers widen to the internal representation before use.
#[derive(Copy, Clone, Debug, PartialEq)]
enum EscOperand {
    F32,
    F64,
    I16,
    I32,
}

impl CpuX86 {
    fn esc_mem_addr(&self) -> Option<(crate::cpu_common::Segment, u64)> {
        match self.i.operand1_type {
            OperandType::AddressingMode(amode, _) => Some(self.calc_effective_address(&amode)),
            _ => None,
        }
    }

    fn esc_load(&mut self, bus: &mut dyn Bus, kind: EscOperand) -> Result<f64, CpuError> {
        let (seg, off) = self.esc_mem_addr().expect("memory-form ESC without an EA");
        let linear = self.linear(seg, off);
        Ok(match kind {
            EscOperand::F32 => f32::from_bits(bus.read(linear, InstructionWidth::Dword)? as u32) as f64,
            EscOperand::F64 => f64::from_bits(bus.read(linear, InstructionWidth::Qword)?),
            EscOperand::I16 => bus.read(linear, InstructionWidth::Word)? as u16 as i16 as f64,
            EscOperand::I32 => bus.read(linear, InstructionWidth::Dword)? as u32 as i32 as f64,
        })
    }

    /// Arithmetic rows shared by D8/DC (reals) and DA/DE (integers): the
    /// reg field selects the operation, the memory operand is the source.
    fn esc_arith_mem(&mut self, bus: &mut dyn Bus, reg: u8, kind: EscOperand) -> Result<ExecutionResult, CpuError> {
        let operand = self.esc_load(bus, kind)?;
        let st0 = self.fpu.read_st(0)?;
        match reg {
            0 => self.fpu.write_st(0, st0 + operand)?,
            1 => self.fpu.write_st(0, st0 * operand)?,
            2 => self.fpu.compare(st0, operand)?,
            3 => {
                self.fpu.compare(st0, operand)?;
                self.fpu.pop()?;
            }
            4 => self.fpu.write_st(0, st0 - operand)?,
            5 => self.fpu.write_st(0, operand - st0)?,
            6 => {
                if operand == 0.0 {
                    self.fpu.signal_zero_divide()?;
                }
                self.fpu.write_st(0, st0 / operand)?;
            }
            _ => {
                if st0 == 0.0 {
                    self.fpu.signal_zero_divide()?;
                }
                self.fpu.write_st(0, operand / st0)?;
            }
        }
        Ok(ExecutionResult::Okay)
    }

    /// D8/DC/DE register forms. The computed value is the same family at
    /// each reg row; st_dest selects whether ST(i) or ST(0) receives it
    /// (D8: ST(0), DC/DE: ST(i)), and DE pops afterwards.
    fn esc_arith_reg(&mut self, reg: u8, rm: u8, st_dest: bool, pop: bool) -> Result<ExecutionResult, CpuError> {
        let st0 = self.fpu.read_st(0)?;
        let sti = self.fpu.read_st(rm as usize)?;
        let dst = if st_dest { rm as usize } else { 0 };
        match reg {
            0 => self.fpu.write_st(dst, st0 + sti)?,
            1 => self.fpu.write_st(dst, st0 * sti)?,
            2 => {
                self.fpu.compare(st0, sti)?;
            }
            3 => {
                self.fpu.compare(st0, sti)?;
                self.fpu.pop()?;
                // FCOMP already popped; the trailing pop below belongs to
                // the arithmetic P forms only.
                return Ok(ExecutionResult::Okay);
            }
            4 => self.fpu.write_st(dst, st0 - sti)?,
            5 => self.fpu.write_st(dst, sti - st0)?,
            6 => {
                if sti == 0.0 {
                    self.fpu.signal_zero_divide()?;
                }
                self.fpu.write_st(dst, st0 / sti)?;
            }
            _ => {
                if st0 == 0.0 {
                    self.fpu.signal_zero_divide()?;
                }
                self.fpu.write_st(dst, sti / st0)?;
            }
        }
        if pop {
            self.fpu.pop()?;
        }
        Ok(ExecutionResult::Okay)
    }

    fn esc_store(&mut self, bus: &mut dyn Bus, kind: EscOperand, pop: bool) -> Result<ExecutionResult, CpuError> {
        let (seg, off) = self.esc_mem_addr().expect("memory-form ESC without an EA");
        let linear = self.linear(seg, off);
        let st0 = self.fpu.read_st(0)?;
        match kind {
            EscOperand::F32 => bus.write(linear, InstructionWidth::Dword, (st0 as f32).to_bits() as u64)?,
            EscOperand::F64 => bus.write(linear, InstructionWidth::Qword, st0.to_bits())?,
            EscOperand::I16 => {
                let rounded = Rounding::from_fcw(self.fpu.control_word()).round(st0);
                let out = if !rounded.is_finite() || rounded < i16::MIN as f64 || rounded > i16::MAX as f64 {
                    self.fpu.signal_invalid()?;
                    i16::MIN
                }
                else {
                    rounded as i16
                };
                bus.write(linear, InstructionWidth::Word, out as u16 as u64)?;
            }
            EscOperand::I32 => {
                let rounded = Rounding::from_fcw(self.fpu.control_word()).round(st0);
                let out = if !rounded.is_finite() || rounded < i32::MIN as f64 || rounded > i32::MAX as f64 {
                    self.fpu.signal_invalid()?;
                    i32::MIN
                }
                else {
                    rounded as i32
                };
                bus.write(linear, InstructionWidth::Dword, out as u32 as u64)?;
            }
        }
        if pop {
            self.fpu.pop()?;
        }
        Ok(ExecutionResult::Okay)
    }

    /// Execute an ESC (D8-DF) instruction. Operand decode has already run;
    /// the raw ModRM selects the operation.
    pub(crate) fn esc_op(&mut self, bus: &mut dyn Bus) -> Result<ExecutionResult, CpuError> {
        let modrm = self.i.modrm.unwrap_or(0);
        let reg = (modrm >> 3) & 7;
        let rm = modrm & 7;
        let is_mem = modrm & 0xC0 != 0xC0;
        let esc = self.i.opcode & 7;

        if is_mem {
            return match (esc, reg) {
                (0, _) => self.esc_arith_mem(bus, reg, EscOperand::F32),
                (4, _) => self.esc_arith_mem(bus, reg, EscOperand::F64),
                (2, _) => self.esc_arith_mem(bus, reg, EscOperand::I32),
                (6, _) => self.esc_arith_mem(bus, reg, EscOperand::I16),
                (1, 0) => {
                    let v = self.esc_load(bus, EscOperand::F32)?;
                    self.fpu.push(v)?;
                    Ok(ExecutionResult::Okay)
                }
                (1, 2) => self.esc_store(bus, EscOperand::F32, false),
                (1, 3) => self.esc_store(bus, EscOperand::F32, true),
                (1, 5) => {
                    let (seg, off) = self.esc_mem_addr().expect("FLDCW without an EA");
                    let linear = self.linear(seg, off);
                    let cw = bus.read(linear, InstructionWidth::Word)? as u16;
                    self.fpu.set_control_word(cw);
                    Ok(ExecutionResult::Okay)
                }
                (1, 7) => {
                    let (seg, off) = self.esc_mem_addr().expect("FNSTCW without an EA");
                    let linear = self.linear(seg, off);
                    bus.write(linear, InstructionWidth::Word, self.fpu.control_word() as u64)?;
                    Ok(ExecutionResult::Okay)
                }
                (3, 0) => {
                    let v = self.esc_load(bus, EscOperand::I32)?;
                    self.fpu.push(v)?;
                    Ok(ExecutionResult::Okay)
                }
                (3, 2) => self.esc_store(bus, EscOperand::I32, false),
                (3, 3) => self.esc_store(bus, EscOperand::I32, true),
                (3, 5) => {
                    // FLD m80: ten-byte extended image.
                    let (seg, off) = self.esc_mem_addr().expect("FLD m80 without an EA");
                    let linear = self.linear(seg, off);
                    let mant = bus.read(linear, InstructionWidth::Qword)?;
                    let sign_exp = bus.read(linear.wrapping_add(8), InstructionWidth::Word)? as u16;
                    self.fpu.push(f64_from_ext80(mant, sign_exp))?;
                    Ok(ExecutionResult::Okay)
                }
                (3, 7) => {
                    // FSTP m80.
                    let (seg, off) = self.esc_mem_addr().expect("FSTP m80 without an EA");
                    let linear = self.linear(seg, off);
                    let st0 = self.fpu.read_st(0)?;
                    let (mant, sign_exp) = ext80_from_f64(st0);
                    bus.write(linear, InstructionWidth::Qword, mant)?;
                    bus.write(linear.wrapping_add(8), InstructionWidth::Word, sign_exp as u64)?;
                    self.fpu.pop()?;
                    Ok(ExecutionResult::Okay)
                }
                (5, 0) => {
                    let v = self.esc_load(bus, EscOperand::F64)?;
                    self.fpu.push(v)?;
                    Ok(ExecutionResult::Okay)
                }
                (5, 2) => self.esc_store(bus, EscOperand::F64, false),
                (5, 3) => self.esc_store(bus, EscOperand::F64, true),
                (5, 7) => {
                    // FNSTSW m16.
                    let (seg, off) = self.esc_mem_addr().expect("FNSTSW without an EA");
                    let linear = self.linear(seg, off);
                    bus.write(linear, InstructionWidth::Word, self.fpu.status_word() as u64)?;
                    Ok(ExecutionResult::Okay)
                }
                (7, 0) => {
                    let v = self.esc_load(bus, EscOperand::I16)?;
                    self.fpu.push(v)?;
                    Ok(ExecutionResult::Okay)
                }
                (7, 2) => self.esc_store(bus, EscOperand::I16, false),
                (7, 3) => self.esc_store(bus, EscOperand::I16, true),
                (7, 5) => {
                    // FILD m64int.
                    let (seg, off) = self.esc_mem_addr().expect("FILD m64 without an EA");
                    let linear = self.linear(seg, off);
                    let v = bus.read(linear, InstructionWidth::Qword)? as i64 as f64;
                    self.fpu.push(v)?;
                    Ok(ExecutionResult::Okay)
                }
                (7, 7) => {
                    // FISTP m64int.
                    let (seg, off) = self.esc_mem_addr().expect("FISTP m64 without an EA");
                    let linear = self.linear(seg, off);
                    let st0 = self.fpu.read_st(0)?;
                    let rounded = Rounding::from_fcw(self.fpu.control_word()).round(st0);
                    let out = if !rounded.is_finite()
                        || rounded < i64::MIN as f64
                        || rounded >= i64::MAX as f64
                    {
                        self.fpu.signal_invalid()?;
                        i64::MIN
                    }
                    else {
                        rounded as i64
                    };
                    bus.write(linear, InstructionWidth::Qword, out as u64)?;
                    self.fpu.pop()?;
                    Ok(ExecutionResult::Okay)
                }
                // FLDENV/FNSTENV/FRSTOR/FNSAVE carry whole-environment
                // images; the VM engine owns those.
                _ => Ok(ExecutionResult::NotImplemented(Mnemonic::ESC)),
            };
        }

        // Register forms, selected by the full low byte of the ModRM.
        match (esc, modrm) {
            (0, _) => self.esc_arith_reg(reg, rm, false, false),
            (4, _) => self.esc_arith_reg(reg, rm, true, false),
            (6, 0xD9) => {
                // FCOMPP
                let st0 = self.fpu.read_st(0)?;
                let st1 = self.fpu.read_st(1)?;
                self.fpu.compare(st0, st1)?;
                self.fpu.pop()?;
                self.fpu.pop()?;
                Ok(ExecutionResult::Okay)
            }
            (6, _) => self.esc_arith_reg(reg, rm, true, true),
            (1, 0xC0..=0xC7) => {
                // FLD ST(i)
                let v = self.fpu.read_st(rm as usize)?;
                self.fpu.push(v)?;
                Ok(ExecutionResult::Okay)
            }
            (1, 0xC8..=0xCF) => {
                self.fpu.fxch(rm as usize)?;
                Ok(ExecutionResult::Okay)
            }
            (1, 0xD0) => Ok(ExecutionResult::Okay), // FNOP
            (1, 0xE0) => {
                let v = self.fpu.read_st(0)?;
                self.fpu.write_st(0, -v)?;
                Ok(ExecutionResult::Okay)
            }
            (1, 0xE1) => {
                let v = self.fpu.read_st(0)?;
                self.fpu.write_st(0, v.abs())?;
                Ok(ExecutionResult::Okay)
            }
            (1, 0xE4) => {
                // FTST: compare ST(0) against +0.0; pops nothing.
                let st0 = self.fpu.read_st(0)?;
                self.fpu.compare(st0, 0.0)?;
                Ok(ExecutionResult::Okay)
            }
            (1, 0xE8) => {
                self.fpu.push(1.0)?;
                Ok(ExecutionResult::Okay)
            }
            (1, 0xEE) => {
                self.fpu.push(0.0)?;
                Ok(ExecutionResult::Okay)
            }
            (1, 0xF2) => {
                // FPTAN: replaces ST(0) with tan, then pushes 1.0 - the
                // one mnemonic here that produces two outputs.
                let v = self.fpu.read_st(0)?;
                self.fpu.write_st(0, v.tan())?;
                self.fpu.push(1.0)?;
                self.fpu.fsw &= !FSW_C2;
                Ok(ExecutionResult::Okay)
            }
            (1, 0xF4) => {
                // FXTRACT: splits ST(0) into exponent and significand.
                let v = self.fpu.read_st(0)?;
                if v == 0.0 {
                    self.fpu.signal_zero_divide()?;
                    self.fpu.write_st(0, f64::NEG_INFINITY)?;
                    self.fpu.push(v)?;
                }
                else {
                    let exponent = v.abs().log2().floor();
                    let significand = v / 2f64.powf(exponent);
                    self.fpu.write_st(0, exponent)?;
                    self.fpu.push(significand)?;
                }
                Ok(ExecutionResult::Okay)
            }
            (1, 0xFA) => {
                let v = self.fpu.read_st(0)?;
                if v < 0.0 {
                    self.fpu.signal_invalid()?;
                }
                self.fpu.write_st(0, v.sqrt())?;
                Ok(ExecutionResult::Okay)
            }
            (2, 0xE9) => {
                // FUCOMPP
                let st0 = self.fpu.read_st(0)?;
                let st1 = self.fpu.read_st(1)?;
                self.fpu.compare(st0, st1)?;
                self.fpu.pop()?;
                self.fpu.pop()?;
                Ok(ExecutionResult::Okay)
            }
            (3, 0xE2) => {
                self.fpu.fnclex();
                Ok(ExecutionResult::Okay)
            }
            (3, 0xE3) => {
                self.fpu.fninit();
                Ok(ExecutionResult::Okay)
            }
            (5, 0xC0..=0xC7) => {
                self.fpu.ffree(rm as usize)?;
                Ok(ExecutionResult::Okay)
            }
            (5, 0xD0..=0xD7) => {
                // FST ST(i)
                let v = self.fpu.read_st(0)?;
                self.fpu.write_st(rm as usize, v)?;
                Ok(ExecutionResult::Okay)
            }
            (5, 0xD8..=0xDF) => {
                // FSTP ST(i)
                let v = self.fpu.read_st(0)?;
                self.fpu.write_st(rm as usize, v)?;
                self.fpu.pop()?;
                Ok(ExecutionResult::Okay)
            }
            (5, 0xE0..=0xE7) => {
                // FUCOM ST(i)
                let st0 = self.fpu.read_st(0)?;
                let sti = self.fpu.read_st(rm as usize)?;
                self.fpu.compare(st0, sti)?;
                Ok(ExecutionResult::Okay)
            }
            (5, 0xE8..=0xEF) => {
                // FUCOMP ST(i)
                let st0 = self.fpu.read_st(0)?;
                let sti = self.fpu.read_st(rm as usize)?;
                self.fpu.compare(st0, sti)?;
                self.fpu.pop()?;
                Ok(ExecutionResult::Okay)
            }
            (7, 0xE0) => {
                // FNSTSW AX
                let sw = self.fpu.status_word();
                self.regs.write_g16(Register16::AX, sw);
                Ok(ExecutionResult::Okay)
            }
            _ => Ok(ExecutionResult::NotImplemented(Mnemonic::ESC)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_rotates_top() {
        let mut f = FpuStack::new();
        f.push(1.0).unwrap();
        assert_eq!(f.top(), 7);
        f.push(2.0).unwrap();
        assert_eq!(f.top(), 6);
        assert_eq!(f.st(0), Some(2.0));
        assert_eq!(f.st(1), Some(1.0));
        f.pop().unwrap();
        assert_eq!(f.st(0), Some(1.0));
        assert_eq!(f.top(), 7);
    }

    #[test]
    fn overflow_yields_indefinite_under_masked_exceptions() {
        let mut f = FpuStack::new();
        for n in 0..8 {
            f.push(n as f64).unwrap();
        }
        // Ninth push overflows. IE is masked by default, so the slot gets
        // the indefinite value and the other slots keep their contents.
        f.push(99.0).unwrap();
        assert!(f.st(0).unwrap().is_nan());
        assert!(f.status_word() & FSW_IE != 0);
        assert!(f.status_word() & FSW_C1 != 0);
        assert!(f.status_word() & FSW_SF != 0);
        for st in 1..8 {
            assert_eq!(f.st(st), Some(7.0 - (st as f64 - 1.0)));
        }
    }

    #[test]
    fn overflow_faults_when_unmasked() {
        let mut f = FpuStack::new();
        f.set_control_word(FCW_DEFAULT & !0x0001); // unmask IE
        for n in 0..8 {
            f.push(n as f64).unwrap();
        }
        assert_eq!(f.push(99.0), Err(CpuException::FpuError));
    }

    #[test]
    fn underflow_on_empty_pop() {
        let mut f = FpuStack::new();
        // Masked: pop of an empty slot signals but does not fault.
        assert!(f.pop().is_ok());
        assert!(f.status_word() & FSW_IE != 0);
        assert!(f.status_word() & FSW_SF != 0);
        assert!(f.status_word() & FSW_C1 == 0);

        let mut f = FpuStack::new();
        f.set_control_word(FCW_DEFAULT & !0x0001);
        assert_eq!(f.pop(), Err(CpuException::FpuError));
    }

    #[test]
    fn empty_read_substitutes_indefinite() {
        let mut f = FpuStack::new();
        let v = f.read_st(0).unwrap();
        assert!(v.is_nan());
        assert!(f.status_word() & FSW_IE != 0);
    }

    #[test]
    fn compare_sets_condition_codes() {
        let mut f = FpuStack::new();
        f.compare(1.0, 2.0).unwrap();
        assert!(f.status_word() & FSW_C0 != 0);
        f.compare(2.0, 1.0).unwrap();
        assert!(f.status_word() & (FSW_C0 | FSW_C2 | FSW_C3) == 0);
        f.compare(1.0, 1.0).unwrap();
        assert!(f.status_word() & FSW_C3 != 0);
        f.compare(f64::NAN, 1.0).unwrap();
        assert!(f.status_word() & (FSW_C0 | FSW_C2 | FSW_C3) == (FSW_C0 | FSW_C2 | FSW_C3));
    }

    #[test]
    fn tag_word_reflects_contents() {
        let mut f = FpuStack::new();
        assert_eq!(f.tag_word(), 0xFFFF);
        f.push(0.0).unwrap();
        assert_eq!(f.st_tag(0), Some(FpuTag::Zero));
        f.pop().unwrap();
        f.push(1.5).unwrap();
        assert_eq!(f.st_tag(0), Some(FpuTag::Valid));
        f.pop().unwrap();
        f.push(f64::INFINITY).unwrap();
        assert_eq!(f.st_tag(0), Some(FpuTag::Special));
    }

    #[test]
    fn ext80_round_trip() {
        for v in [0.0, -0.0, 1.0, -1.5, 3.25e10, f64::INFINITY, f64::NEG_INFINITY, 1e-308] {
            let (mant, se) = ext80_from_f64(v);
            let back = f64_from_ext80(mant, se);
            if v == 0.0 {
                assert_eq!(back, 0.0);
            }
            else {
                assert_eq!(back, v, "round trip of {}", v);
            }
        }
        let (mant, se) = ext80_from_f64(f64::NAN);
        assert!(f64_from_ext80(mant, se).is_nan());
    }

    #[test]
    fn fxch_swaps_and_flags_empty() {
        let mut f = FpuStack::new();
        f.push(1.0).unwrap();
        f.push(2.0).unwrap();
        f.fxch(1).unwrap();
        assert_eq!(f.st(0), Some(1.0));
        assert_eq!(f.st(1), Some(2.0));
    }
}
