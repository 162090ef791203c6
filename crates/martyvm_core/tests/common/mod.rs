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

    tests::common

    A flat-memory bus harness standing in for the VM engine's guest memory
    collaborator, with a configurable faulting window and counters for the
    read-modify-write protocol so tests can assert LOCK routing.

*/

#![allow(dead_code)]

use martyvm_core::{
    bus::{Bus, BusFault, BusResult},
    cpu_common::{instruction::InstructionWidth, services::ExecutionDelegate, CpuException},
};

pub struct TestBus {
    pub mem: Vec<u8>,
    /// Linear range [start, end) that faults with #PF on any access.
    pub fault_range: Option<(u64, u64)>,
    pub rmw_begins: u32,
    pub rmw_commits: u32,
    pub locked_begins: u32,
}

impl TestBus {
    pub fn new(size: usize) -> Self {
        Self {
            mem: vec![0; size],
            fault_range: None,
            rmw_begins: 0,
            rmw_commits: 0,
            locked_begins: 0,
        }
    }

    fn check(&self, addr: u64, len: u64) -> BusResult<()> {
        if let Some((start, end)) = self.fault_range {
            if addr < end && addr + len > start {
                return Err(BusFault::Page(addr));
            }
        }
        if addr + len > self.mem.len() as u64 {
            return Err(BusFault::General);
        }
        Ok(())
    }
}

impl Bus for TestBus {
    fn read(&mut self, addr: u64, width: InstructionWidth) -> BusResult<u64> {
        let len = width.bytes() as u64;
        self.check(addr, len)?;
        let mut value = 0u64;
        for n in 0..len {
            value |= (self.mem[(addr + n) as usize] as u64) << (n * 8);
        }
        Ok(value)
    }

    fn write(&mut self, addr: u64, width: InstructionWidth, value: u64) -> BusResult<()> {
        let len = width.bytes() as u64;
        self.check(addr, len)?;
        for n in 0..len {
            self.mem[(addr + n) as usize] = (value >> (n * 8)) as u8;
        }
        Ok(())
    }

    fn rmw_begin(&mut self, addr: u64, width: InstructionWidth, locked: bool) -> BusResult<u64> {
        self.rmw_begins += 1;
        if locked {
            self.locked_begins += 1;
        }
        self.read(addr, width)
    }

    fn rmw_commit(&mut self, addr: u64, width: InstructionWidth, value: u64, _locked: bool) -> BusResult<()> {
        self.rmw_commits += 1;
        self.write(addr, width, value)
    }
}

/// Delegate that records port I/O against a small port-value table.
#[derive(Default)]
pub struct IoDelegate {
    pub reads: Vec<(u16, u32)>,
    pub writes: Vec<(u16, u64)>,
    pub in_value: u64,
}

impl ExecutionDelegate for IoDelegate {
    fn io_read(&mut self, port: u16, width: InstructionWidth) -> Result<u64, CpuException> {
        self.reads.push((port, width.bits()));
        Ok(self.in_value)
    }

    fn io_write(&mut self, port: u16, width: InstructionWidth, value: u64) -> Result<(), CpuException> {
        let _ = width;
        self.writes.push((port, value));
        Ok(())
    }
}
