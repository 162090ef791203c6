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

    cpu_x86::ops.rs

    The operand fetch/store abstraction. Instruction handlers never touch
    registers or the bus directly for their operands; they resolve each
    operand descriptor to an OperandLoc and go through the capability set
    below. The sequence for a read-modify-write destination is:

        resolve -> fetch_rmw (map + read) -> helper -> commit

    The map step validates the destination before any computation, so a
    faulting operation never partially writes memory, and a LOCK-prefixed
    sequence holds the bus's exclusivity between map and commit.

*/

#![allow(dead_code)]

use enum_dispatch::enum_dispatch;

use crate::{
    bus::Bus,
    cpu_common::{
        AddressSize,
        AddressingMode,
        CpuError,
        CpuMode,
        InstructionWidth,
        OperandSize,
        OperandType,
        Register16,
        Register32,
        Register64,
        Register8,
        Segment,
    },
    cpu_x86::CpuX86,
};

#[derive(Copy, Clone, Debug)]
pub enum RegRef {
    R8(Register8),
    R16(Register16),
    R32(Register32),
    R64(Register64),
}

#[derive(Copy, Clone, Debug)]
pub struct RegisterOperand {
    pub reg: RegRef,
}

#[derive(Copy, Clone, Debug)]
pub struct MemoryOperand {
    pub segment: Segment,
    pub addr: u64,
    pub width: InstructionWidth,
    pub locked: bool,
}

#[derive(Copy, Clone, Debug)]
pub struct ImmediateOperand {
    pub value: u64,
}

#[enum_dispatch]
pub trait OperandAccess {
    /// Read the operand value, zero-extended to u64.
    fn fetch(&self, cpu: &CpuX86, bus: &mut dyn Bus) -> Result<u64, CpuError>;

    /// Read the operand as the destination of a read-modify-write. For
    /// memory this maps the location for write before reading, so a later
    /// commit cannot fault after the helper has run.
    fn fetch_rmw(&self, cpu: &CpuX86, bus: &mut dyn Bus) -> Result<u64, CpuError>;

    /// Write the operand. Memory commits pair with a prior fetch_rmw when
    /// the operation read the destination; plain stores go through write.
    fn commit(&self, cpu: &mut CpuX86, bus: &mut dyn Bus, value: u64) -> Result<(), CpuError>;

    fn is_memory(&self) -> bool;
}

impl OperandAccess for RegisterOperand {
    fn fetch(&self, cpu: &CpuX86, _bus: &mut dyn Bus) -> Result<u64, CpuError> {
        Ok(match self.reg {
            RegRef::R8(r) => cpu.regs.read_g8(r) as u64,
            RegRef::R16(r) => cpu.regs.read_g16(r) as u64,
            RegRef::R32(r) => cpu.regs.read_g32(r) as u64,
            RegRef::R64(r) => cpu.regs.read_g64(r),
        })
    }

    fn fetch_rmw(&self, cpu: &CpuX86, bus: &mut dyn Bus) -> Result<u64, CpuError> {
        // Registers need no mapping; an in-place reference is just a read.
        self.fetch(cpu, bus)
    }

    fn commit(&self, cpu: &mut CpuX86, _bus: &mut dyn Bus, value: u64) -> Result<(), CpuError> {
        match self.reg {
            RegRef::R8(r) => cpu.regs.write_g8(r, value as u8),
            RegRef::R16(r) => cpu.regs.write_g16(r, value as u16),
            RegRef::R32(r) => cpu.regs.write_g32(r, value as u32),
            RegRef::R64(r) => cpu.regs.write_g64(r, value),
        }
        Ok(())
    }

    fn is_memory(&self) -> bool {
        false
    }
}

impl OperandAccess for MemoryOperand {
    fn fetch(&self, cpu: &CpuX86, bus: &mut dyn Bus) -> Result<u64, CpuError> {
        let linear = cpu.linear(self.segment, self.addr);
        Ok(bus.read(linear, self.width)?)
    }

    fn fetch_rmw(&self, cpu: &CpuX86, bus: &mut dyn Bus) -> Result<u64, CpuError> {
        let linear = cpu.linear(self.segment, self.addr);
        Ok(bus.rmw_begin(linear, self.width, self.locked)?)
    }

    fn commit(&self, cpu: &mut CpuX86, bus: &mut dyn Bus, value: u64) -> Result<(), CpuError> {
        let linear = cpu.linear(self.segment, self.addr);
        if self.locked {
            bus.rmw_commit(linear, self.width, value, true)?;
        }
        else {
            bus.write(linear, self.width, value)?;
        }
        Ok(())
    }

    fn is_memory(&self) -> bool {
        true
    }
}

impl OperandAccess for ImmediateOperand {
    fn fetch(&self, _cpu: &CpuX86, _bus: &mut dyn Bus) -> Result<u64, CpuError> {
        Ok(self.value)
    }

    fn fetch_rmw(&self, _cpu: &CpuX86, _bus: &mut dyn Bus) -> Result<u64, CpuError> {
        Ok(self.value)
    }

    fn commit(&self, _cpu: &mut CpuX86, _bus: &mut dyn Bus, _value: u64) -> Result<(), CpuError> {
        // An immediate destination is a decode bug, not a guest error.
        panic!("attempted store to immediate operand");
    }

    fn is_memory(&self) -> bool {
        false
    }
}

#[enum_dispatch(OperandAccess)]
#[derive(Copy, Clone, Debug)]
pub enum OperandLoc {
    RegisterOperand,
    MemoryOperand,
    ImmediateOperand,
}

impl CpuX86 {
    /// Effective-address computation for a resolved addressing form,
    /// returning the default-or-overridden segment and the offset within
    /// it. RIP-relative forms add the displacement to the address of the
    /// *next* instruction, known only now that decode has finished.
    pub(crate) fn calc_effective_address(&self, amode: &AddressingMode) -> (Segment, u64) {
        use AddressingMode::*;
        let r = &self.regs;
        let a16 = AddressSize::Address16;

        let (default_stack, offset) = match amode {
            BxSi(d) => (false, r.read_idx(3, a16).wrapping_add(r.read_idx(6, a16)).wrapping_add(d.value() as u64)),
            BxDi(d) => (false, r.read_idx(3, a16).wrapping_add(r.read_idx(7, a16)).wrapping_add(d.value() as u64)),
            BpSi(d) => (true, r.read_idx(5, a16).wrapping_add(r.read_idx(6, a16)).wrapping_add(d.value() as u64)),
            BpDi(d) => (true, r.read_idx(5, a16).wrapping_add(r.read_idx(7, a16)).wrapping_add(d.value() as u64)),
            Si(d) => (false, r.read_idx(6, a16).wrapping_add(d.value() as u64)),
            Di(d) => (false, r.read_idx(7, a16).wrapping_add(d.value() as u64)),
            Disp16(d) => (false, d.value() as u64),
            Bp(d) => (true, r.read_idx(5, a16).wrapping_add(d.value() as u64)),
            Bx(d) => (false, r.read_idx(3, a16).wrapping_add(d.value() as u64)),
            Base { base, disp } => (
                *base == 4 || *base == 5,
                r.read_idx(*base, self.i.address_size).wrapping_add(disp.value() as u64),
            ),
            BaseIndexScale { base, index, scale, disp } => {
                let base_val = base.map(|b| r.read_idx(b, self.i.address_size)).unwrap_or(0);
                let index_val = index.map(|x| r.read_idx(x, self.i.address_size)).unwrap_or(0);
                (
                    matches!(base, Some(4) | Some(5)),
                    base_val
                        .wrapping_add(index_val.wrapping_mul(*scale as u64))
                        .wrapping_add(disp.value() as u64),
                )
            }
            Disp32(d) => (false, d.value() as u64),
            RipRelative(d) => (
                false,
                self.regs
                    .rip
                    .wrapping_add(self.i.size as u64)
                    .wrapping_add(d.value() as u64),
            ),
            RegisterMode => (false, 0),
        };

        // Explicit override wins; otherwise BP/SP-based addressing implies
        // SS and everything else DS. String-destination ES is applied by
        // the string handlers, not here.
        let segment = match self.i.segment_override {
            Some(s) => s,
            None if default_stack => Segment::SS,
            None => Segment::DS,
        };

        (segment, offset & self.i.address_size.mask())
    }

    /// Segment-relative to linear translation. In long mode only FS/GS
    /// carry a base; other segments are flat and offsets are not masked.
    #[inline]
    pub(crate) fn linear(&self, segment: Segment, offset: u64) -> u64 {
        match self.mode() {
            CpuMode::Mode64 => match segment {
                Segment::FS | Segment::GS => self.regs.segment_base(segment).wrapping_add(offset),
                _ => offset,
            },
            _ => self
                .regs
                .segment_base(segment)
                .wrapping_add(offset & self.i.address_size.mask()),
        }
    }

    /// Resolve a decoded operand descriptor into a fetch/store location.
    /// `writable` marks the operand as a (possibly locked) destination.
    pub(crate) fn resolve_operand(&self, operand: OperandType, writable: bool) -> OperandLoc {
        match operand {
            OperandType::Register8(r) => OperandLoc::from(RegisterOperand { reg: RegRef::R8(r) }),
            OperandType::Register16(r) => OperandLoc::from(RegisterOperand { reg: RegRef::R16(r) }),
            OperandType::Register32(r) => OperandLoc::from(RegisterOperand { reg: RegRef::R32(r) }),
            OperandType::Register64(r) => OperandLoc::from(RegisterOperand { reg: RegRef::R64(r) }),
            OperandType::AddressingMode(amode, op_size) => {
                let (segment, addr) = self.calc_effective_address(&amode);
                let width = match op_size {
                    OperandSize::NoSize => self.i.width,
                    other => InstructionWidth::from(other),
                };
                OperandLoc::from(MemoryOperand {
                    segment,
                    addr,
                    width,
                    locked: writable && self.i.has_lock(),
                })
            }
            OperandType::Offset(offset) => {
                let segment = self.i.segment_override.unwrap_or(Segment::DS);
                OperandLoc::from(MemoryOperand {
                    segment,
                    addr: offset,
                    width: self.i.width,
                    locked: false,
                })
            }
            OperandType::Immediate8(v) => OperandLoc::from(ImmediateOperand { value: v as u64 }),
            OperandType::Immediate16(v) => OperandLoc::from(ImmediateOperand { value: v as u64 }),
            OperandType::Immediate32(v) => OperandLoc::from(ImmediateOperand { value: v as u64 }),
            OperandType::Immediate64(v) => OperandLoc::from(ImmediateOperand { value: v }),
            OperandType::Immediate8s(v) => OperandLoc::from(ImmediateOperand {
                // Sign-extend to the effective operand width.
                value: (v as i64 as u64) & self.i.width.mask(),
            }),
            _ => OperandLoc::from(ImmediateOperand { value: 0 }),
        }
    }
}
