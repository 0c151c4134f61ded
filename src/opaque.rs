use std::io::Write;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::xdr::{pad_length, ByteCursor};
use crate::Error;

/// [`Opaque`] is a wrapper over an opaque / uninterpreted byte array.
///
/// See [RFC1014] section 3.12.
///
/// [RFC1014]: https://datatracker.ietf.org/doc/html/rfc1014#section-3.12
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Opaque<T> {
    body: T,
}

impl<T> Opaque<T>
where
    T: AsRef<[u8]>,
{
    /// Construct an [`Opaque`] from the provided user payload (NOT a wire
    /// payload that includes a length prefix).
    pub(crate) fn from_user_payload(body: T) -> Opaque<T> {
        Opaque { body }
    }

    /// Construct an [`Opaque`] from the provided serialised / wire payload
    /// (that includes a length prefix).
    ///
    /// Returns an error without allocating any memory if the payload length
    /// prefix in `c` exceeds `max_len`.
    pub(crate) fn from_wire<'a>(
        c: &mut ByteCursor<'a>,
        max_len: usize,
    ) -> Result<Opaque<&'a [u8]>, Error> {
        let payload_len = c.read_u32::<BigEndian>()?;
        if payload_len as usize > max_len {
            return Err(Error::InvalidLength);
        }

        let body = c.read_slice(payload_len as usize)?;

        // Discard the appropriate amount of padding.
        let pad = pad_length(payload_len) as usize;
        if pad > 0 {
            c.read_slice(pad)?;
        }

        Ok(Opaque { body })
    }

    /// Return the inner payload.
    pub(crate) fn into_payload(self) -> T {
        self.body
    }

    /// Return the payload length without serialisation overhead.
    pub(crate) fn len(&self) -> usize {
        self.body.as_ref().len()
    }

    /// Serialise the [`Opaque`] into `buf`, including the length prefix bytes.
    pub(crate) fn serialise_into<W: Write>(&self, buf: &mut W) -> Result<(), std::io::Error> {
        // Write the length prefix.
        let len = self.len() as u32;
        buf.write_u32::<BigEndian>(len)?;

        // Write the actual payload.
        buf.write_all(self.body.as_ref())?;

        // Pad the opaque bytes to have a length that is a multiple of 4.
        //
        // https://datatracker.ietf.org/doc/html/rfc1014#section-3.9
        let fill_bytes = pad_length(len) as usize;
        const PADDING: [u8; 3] = [0; 3];
        if fill_bytes > 0 {
            buf.write_all(&PADDING[..fill_bytes])?;
        }

        Ok(())
    }

    /// Return the serialised length of `self`, inclusive of length prefix
    /// bytes.
    pub(crate) fn serialised_len(&self) -> u32 {
        let payload_len: u32 = self.as_ref().len() as u32;
        4 /* length prefix */ + payload_len + pad_length(payload_len)
    }
}

impl<T> AsRef<[u8]> for Opaque<T>
where
    T: AsRef<[u8]>,
{
    fn as_ref(&self) -> &[u8] {
        self.body.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use hex_literal::hex;
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_one_padded_opaque() {
        let raw = hex!("0000000f4c4150544f502d315151425044474d00").as_slice();
        let payload: [u8; 15] = [76, 65, 80, 84, 79, 80, 45, 49, 81, 81, 66, 80, 68, 71, 77];
        let mut cursor = ByteCursor::new(raw);
        let data = Opaque::<&[u8]>::from_wire(&mut cursor, 100).unwrap();
        assert_eq!(raw.len(), 20);
        assert_eq!(data.as_ref().len(), 15);
        assert_eq!(data.as_ref(), payload.as_slice());

        let mut buf = Vec::new();
        data.serialise_into(&mut buf).unwrap();
        assert_eq!(buf.len(), 20);
        assert_eq!(buf.as_slice(), raw);
    }

    #[test]
    fn test_no_padded_opaque() {
        let raw = hex!("0000000c4c4150544f5151425044474d").as_slice();
        let payload: [u8; 12] = [76, 65, 80, 84, 79, 81, 81, 66, 80, 68, 71, 77];
        let mut cursor = ByteCursor::new(raw);
        let data = Opaque::<&[u8]>::from_wire(&mut cursor, 100).unwrap();
        assert_eq!(raw.len(), 16);
        assert_eq!(data.as_ref(), payload.as_slice());

        let mut buf = Vec::new();
        data.serialise_into(&mut buf).unwrap();
        assert_eq!(buf.as_slice(), raw);
    }

    #[test]
    fn test_max_bytes() {
        let payload: [u8; 12] = [255, 65, 80, 84, 79, 81, 81, 66, 80, 68, 71, 77];
        let mut cursor = ByteCursor::new(payload.as_slice());
        Opaque::<&[u8]>::from_wire(&mut cursor, 100).expect_err("should hit max size");
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            data in prop::collection::vec(any::<u8>(), 0..256),
        ) {
            let mut buf = Vec::new();
            Opaque::from_user_payload(data.clone()).serialise_into(&mut buf).unwrap();

            let mut c = ByteCursor::new(buf.as_slice());
            let got = Opaque::<&[u8]>::from_wire(&mut c, data.len() + 1).unwrap().into_payload();

            assert_eq!(data, got);
        }
    }
}
