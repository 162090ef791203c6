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

    bytequeue.rs

    The instruction byte cursor. ByteQueue is implemented by CodeWindow,
    which reads from a prefetched slice of guest code; the VM engine can
    supply its own implementation to decode straight out of a mapped guest
    page. Running out of bytes is always an explicit QueueError, never a
    silently substituted value - the decoder relies on this to signal
    incomplete fetches.

*/

/// Exhaustion of the prefetched window. The VM engine responds by fetching
/// a larger window and retrying the instruction.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct QueueError {}

pub type QueueResult<T> = Result<T, QueueError>;

pub trait ByteQueue {
    /// Cursor position relative to the start of the window (bytes consumed).
    fn tell(&self) -> usize;
    fn seek(&mut self, pos: usize);

    fn q_read_u8(&mut self) -> QueueResult<u8>;
    fn q_read_i8(&mut self) -> QueueResult<i8>;
    fn q_read_u16(&mut self) -> QueueResult<u16>;
    fn q_read_i16(&mut self) -> QueueResult<i16>;
    fn q_read_u32(&mut self) -> QueueResult<u32>;
    fn q_read_i32(&mut self) -> QueueResult<i32>;
    fn q_read_u64(&mut self) -> QueueResult<u64>;

    fn q_peek_u8(&mut self) -> QueueResult<u8>;
    fn q_peek_u16(&mut self) -> QueueResult<u16>;
}

/// A byte cursor over a prefetched instruction window. The logical
/// instruction pointer of the window start is carried so RIP-relative
/// resolution can recover absolute addresses.
pub struct CodeWindow<'a> {
    bytes: &'a [u8],
    pos: usize,
    ip: u64,
}

impl<'a> CodeWindow<'a> {
    pub fn new(bytes: &'a [u8], ip: u64) -> Self {
        Self { bytes, pos: 0, ip }
    }

    #[inline]
    pub fn ip(&self) -> u64 {
        self.ip
    }

    #[inline]
    fn take(&mut self, count: usize) -> QueueResult<&'a [u8]> {
        if self.pos + count > self.bytes.len() {
            return Err(QueueError {});
        }
        let slice = &self.bytes[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }
}

impl ByteQueue for CodeWindow<'_> {
    #[inline]
    fn tell(&self) -> usize {
        self.pos
    }

    #[inline]
    fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    #[inline]
    fn q_read_u8(&mut self) -> QueueResult<u8> {
        Ok(self.take(1)?[0])
    }

    #[inline]
    fn q_read_i8(&mut self) -> QueueResult<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    #[inline]
    fn q_read_u16(&mut self) -> QueueResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    #[inline]
    fn q_read_i16(&mut self) -> QueueResult<i16> {
        Ok(self.q_read_u16()? as i16)
    }

    #[inline]
    fn q_read_u32(&mut self) -> QueueResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    #[inline]
    fn q_read_i32(&mut self) -> QueueResult<i32> {
        Ok(self.q_read_u32()? as i32)
    }

    #[inline]
    fn q_read_u64(&mut self) -> QueueResult<u64> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    #[inline]
    fn q_peek_u8(&mut self) -> QueueResult<u8> {
        if self.pos >= self.bytes.len() {
            return Err(QueueError {});
        }
        Ok(self.bytes[self.pos])
    }

    #[inline]
    fn q_peek_u16(&mut self) -> QueueResult<u16> {
        if self.pos + 2 > self.bytes.len() {
            return Err(QueueError {});
        }
        Ok(u16::from_le_bytes([self.bytes[self.pos], self.bytes[self.pos + 1]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_reads_little_endian() {
        let bytes = [0x78, 0x56, 0x34, 0x12, 0xFF];
        let mut q = CodeWindow::new(&bytes, 0x1000);
        assert_eq!(q.q_read_u32().unwrap(), 0x1234_5678);
        assert_eq!(q.tell(), 4);
        assert_eq!(q.q_read_u8().unwrap(), 0xFF);
    }

    #[test]
    fn window_exhaustion_is_explicit() {
        let bytes = [0x01];
        let mut q = CodeWindow::new(&bytes, 0);
        assert!(q.q_read_u16().is_err());
        // A failed read must not advance the cursor.
        assert_eq!(q.tell(), 0);
        assert_eq!(q.q_read_u8().unwrap(), 0x01);
        assert!(q.q_read_u8().is_err());
    }

    #[test]
    fn peek_does_not_advance() {
        let bytes = [0xC3, 0x90];
        let mut q = CodeWindow::new(&bytes, 0);
        assert_eq!(q.q_peek_u8().unwrap(), 0xC3);
        assert_eq!(q.q_peek_u16().unwrap(), 0x90C3);
        assert_eq!(q.tell(), 0);
    }
}
