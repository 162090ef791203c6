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

    bus.rs

    Guest memory access seam. The VM engine owns paging, the TLB and MMIO;
    this core only ever sees linear addresses and fault results. The rmw
    pair exists so a read-modify-write destination is mapped (and validated
    for write) before the operation computes - a faulting operation must
    never partially write memory - and so LOCK atomicity can be delegated
    to the memory collaborator where other vCPUs can observe it.

*/

use crate::cpu_common::{CpuException, InstructionWidth};

/// Faults surfaced by the memory collaborator. `Host` is fatal and
/// propagates unchanged; everything else maps onto an architectural
/// exception.
#[derive(Debug)]
pub enum BusFault {
    /// #PF with the faulting linear address.
    Page(u64),
    /// #GP(0) - e.g. non-canonical access.
    General,
    /// #SS(0) - stack segment violation.
    Stack,
    /// #AC alignment failure while alignment checking is enabled.
    Alignment,
    /// Fatal host-side failure (backing store torn down, I/O error).
    Host(anyhow::Error),
}

impl BusFault {
    pub fn exception(&self) -> Option<CpuException> {
        match self {
            BusFault::Page(_) => Some(CpuException::PageFault),
            BusFault::General => Some(CpuException::GeneralProtection),
            BusFault::Stack => Some(CpuException::StackFault),
            BusFault::Alignment => Some(CpuException::AlignmentCheck),
            BusFault::Host(_) => None,
        }
    }
}

pub type BusResult<T> = Result<T, BusFault>;

impl From<BusFault> for crate::cpu_common::CpuError {
    fn from(fault: BusFault) -> Self {
        match fault {
            BusFault::Host(e) => crate::cpu_common::CpuError::Host(e),
            other => crate::cpu_common::CpuError::Exception(
                other.exception().unwrap_or(CpuException::GeneralProtection),
            ),
        }
    }
}

pub trait Bus {
    /// Read `width` bytes at a linear address. Values are zero-extended
    /// into the returned u64.
    fn read(&mut self, addr: u64, width: InstructionWidth) -> BusResult<u64>;

    /// Write the low `width` bytes of `value` at a linear address.
    fn write(&mut self, addr: u64, width: InstructionWidth, value: u64) -> BusResult<()>;

    /// Map a read-modify-write destination: validate writability, perform
    /// the read, and (when `locked`) acquire whatever exclusivity the
    /// platform provides until the matching `rmw_commit`.
    fn rmw_begin(&mut self, addr: u64, width: InstructionWidth, locked: bool) -> BusResult<u64>;

    /// Commit the write half of a read-modify-write. Must be paired with
    /// `rmw_begin` on the same address/width.
    fn rmw_commit(&mut self, addr: u64, width: InstructionWidth, value: u64, locked: bool) -> BusResult<()>;
}
