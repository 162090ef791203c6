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

    lib.rs

    MartyVM's instruction decode and execution core. The VM monitor hands
    this crate a prefetched code window, a guest-memory bus, and a delegate
    for instructions with machine-global side effects; the core decodes,
    resolves operands, and executes with bit-exact architectural results,
    reporting success, faults, or emulation gaps back to the caller.

*/

pub mod bus;
pub mod bytequeue;
pub mod cpu_common;
pub mod cpu_x86;

pub use crate::{
    bus::{Bus, BusFault, BusResult},
    bytequeue::{ByteQueue, CodeWindow},
    cpu_common::{
        services::{DelegateAction, ExecutionDelegate, FarTarget, NullDelegate},
        CpuError,
        CpuException,
        CpuMode,
        CpuModel,
        DecodeError,
        Instruction,
        Mnemonic,
        StepResult,
        VendorPolicy,
    },
    cpu_x86::{decode::decode, CpuX86},
};
