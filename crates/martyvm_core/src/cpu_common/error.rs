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

    cpu_common::error.rs

    Error taxonomy for the core. Decode errors never mutate state.
    Architectural exceptions are reported as data for the VM engine to
    inject; emulation gaps are distinct from invalid opcodes so the caller
    can choose a fallback; host errors propagate unchanged.

*/

use crate::{bytequeue::QueueError, cpu_common::CpuException};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Instruction window exhausted before decode completed")]
    Incomplete,
    #[error("Instruction exceeded the architectural 15-byte limit")]
    TooLong,
    #[error("An invalid opcode was encountered: {0:#04x}")]
    InvalidOpcode(u8),
}

impl From<QueueError> for DecodeError {
    fn from(_: QueueError) -> Self {
        DecodeError::Incomplete
    }
}

impl From<CpuException> for CpuError {
    fn from(e: CpuException) -> Self {
        CpuError::Exception(e)
    }
}

#[derive(Debug, Error)]
pub enum CpuError {
    #[error("An invalid instruction was encountered: {0:02X} at address: {1:012X}")]
    InvalidInstruction(u8, u64),
    #[error("An unhandled instruction was encountered: {0:02X} at address: {1:012X}")]
    UnhandledInstruction(u8, u64),
    #[error("An error occurred during instruction decode at address: {1:012X}: {0}")]
    InstructionDecode(DecodeError, u64),
    #[error("An execution error occurred at: {0:012X} Message: {1}")]
    Execution(u64, String),
    #[error("The CPU raised an exception: {0:?}")]
    Exception(CpuException),
    #[error("Host resource error")]
    Host(#[from] anyhow::Error),
}
