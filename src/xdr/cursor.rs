use std::io::{self, Cursor, Read};

use crate::Error;

/// An immutable read cursor over an exact message slice.
///
/// Unlike [`std::io::Cursor`], [`ByteCursor::done`] lets callers assert that
/// every byte of the slice was consumed by parsing - this is how
/// [`Error::GarbageArgs`](crate::Error::GarbageArgs) is detected: a procedure
/// handler that doesn't exhaust the argument cursor has been handed
/// arguments it didn't fully understand.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    inner: Cursor<&'a [u8]>,
}

impl<'a> ByteCursor<'a> {
    /// Wraps `data` for reading.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            inner: Cursor::new(data),
        }
    }

    /// Returns the current read position, in bytes from the start.
    pub fn position(&self) -> usize {
        self.inner.position() as usize
    }

    /// Returns the total length of the wrapped slice.
    pub fn len(&self) -> usize {
        self.inner.get_ref().len()
    }

    /// Returns `true` if the wrapped slice is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of unread bytes remaining in the cursor.
    pub fn remaining(&self) -> usize {
        self.len() - self.position()
    }

    /// Returns the entire wrapped slice, irrespective of the read position.
    pub fn as_slice(&self) -> &'a [u8] {
        *self.inner.get_ref()
    }

    /// Returns the unread tail of the wrapped slice.
    pub fn remaining_slice(&self) -> &'a [u8] {
        let pos = self.position();
        &self.as_slice()[pos..]
    }

    /// Seeks the cursor to an absolute byte offset.
    pub(crate) fn set_position(&mut self, pos: usize) {
        self.inner.set_position(pos as u64);
    }

    /// Reads exactly `n` bytes without copying, advancing the cursor.
    ///
    /// Returns [`Error::InvalidLength`] if fewer than `n` bytes remain.
    pub fn read_slice(&mut self, n: usize) -> Result<&'a [u8], Error> {
        let start = self.position();
        let end = start
            .checked_add(n)
            .ok_or(Error::InvalidLength)?;
        if end > self.len() {
            return Err(Error::InvalidLength);
        }
        let out = &self.as_slice()[start..end];
        self.set_position(end);
        Ok(out)
    }

    /// Returns `Ok(())` if every byte of this cursor has been consumed,
    /// otherwise [`Error::GarbageArgs`] describing how many bytes are left.
    pub fn done(&self) -> Result<(), Error> {
        let unconsumed = self.remaining();
        if unconsumed != 0 {
            return Err(Error::GarbageArgs { unconsumed });
        }
        Ok(())
    }
}

impl<'a> Read for ByteCursor<'a> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}
