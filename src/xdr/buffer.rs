use std::io::{self, Write};

/// An append-only, growable byte buffer used to serialise XDR values.
///
/// [`ByteBuffer`] implements [`Write`] so the `byteorder` extension traits
/// can be used directly to append big-endian primitives. [`ByteBuffer::reset`]
/// truncates the buffer without releasing its allocation, so a single buffer
/// can be reused across many messages (e.g. one per accepted connection).
#[derive(Debug, Default, Clone)]
pub struct ByteBuffer {
    inner: Vec<u8>,
}

impl ByteBuffer {
    /// Constructs a new, empty buffer.
    pub fn new() -> Self {
        Self { inner: Vec::new() }
    }

    /// Constructs a new, empty buffer with at least `capacity` bytes of
    /// pre-allocated storage.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
        }
    }

    /// Truncates the buffer back to empty, retaining its current allocation.
    pub fn reset(&mut self) {
        self.inner.clear();
    }

    /// Returns the number of bytes currently held in the buffer.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the buffered bytes as a slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.inner
    }

    /// Consumes `self`, returning the underlying storage.
    pub fn into_vec(self) -> Vec<u8> {
        self.inner
    }
}

impl Write for ByteBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl AsRef<[u8]> for ByteBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.inner
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(inner: Vec<u8>) -> Self {
        Self { inner }
    }
}
