//! Cursor tracking encoded output into a borrowed byte slice.

use crate::Error;

/// Tracks a write position within a destination slice. All writes are
/// bounds-checked; nothing is written past the end of the slice.
pub(crate) struct WriteCursor<'d> {
    pos: usize,
    data: &'d mut [u8],
}

impl<'d> WriteCursor<'d> {
    pub fn new(data: &'d mut [u8]) -> Self {
        Self { pos: 0, data }
    }

    /// Append a byte slice.
    pub fn append(&mut self, data: &[u8]) -> Result<(), Error> {
        if self.available() < data.len() {
            Err(Error::InsufficientSpace)
        } else {
            self.data[self.pos..self.pos + data.len()].copy_from_slice(data);
            self.pos += data.len();
            Ok(())
        }
    }

    pub fn write_u8(&mut self, val: u8) -> Result<(), Error> {
        self.append(&[val])
    }

    /// Write a 16-bit value in little-endian order.
    pub fn write_u16(&mut self, val: u16) -> Result<(), Error> {
        self.append(&val.to_le_bytes())
    }

    pub fn available(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.pos
    }
}
