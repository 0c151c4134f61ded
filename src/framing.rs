//! Record marking for stream transports, [RFC 5531 section
//! 11](https://tools.ietf.org/html/rfc5531#section-11).
//!
//! A single RPC message may be split across multiple fragments. Each
//! fragment is prefixed with a 4 byte big-endian header: the top bit marks
//! the last fragment of the record, the remaining 31 bits are the fragment's
//! byte length.

use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use tracing::trace;

use crate::Error;

const HEADER_LEN: usize = 4;
const LAST_FRAGMENT_BIT: u32 = 1 << 31;

/// The largest fragment this crate will produce, `2^31 - 1` bytes.
pub const MAX_FRAGMENT_SIZE: u32 = 0x7fff_ffff;

/// Writes a single fragment header plus `frag` to `w`.
fn send_fragment<W: Write>(w: &mut W, last: bool, frag: &[u8]) -> Result<(), Error> {
    let mut header = frag.len() as u32;
    if last {
        header |= LAST_FRAGMENT_BIT;
    }
    w.write_u32::<BigEndian>(header)?;
    w.write_all(frag)?;
    Ok(())
}

/// Writes `record` to `w`, splitting it into fragments no larger than
/// `frag_size` bytes.
///
/// A zero-length record is still sent as a single, empty, last fragment -
/// every record produces at least one fragment on the wire, so the reader
/// always observes a terminating header.
pub fn send_record<W: Write>(w: &mut W, record: &[u8], frag_size: u32) -> Result<(), Error> {
    let frag_size = frag_size.max(1) as usize;
    let mut remaining = record;

    loop {
        let chunk_len = remaining.len().min(frag_size);
        let (chunk, rest) = remaining.split_at(chunk_len);
        let last = rest.is_empty();

        trace!(chunk_len, last, "sending rpc fragment");
        send_fragment(w, last, chunk)?;

        remaining = rest;
        if last {
            break;
        }
    }

    Ok(())
}

/// Reads a single fragment from `r`, returning whether it was the last
/// fragment of the record and its payload.
fn recv_fragment<R: Read>(r: &mut R) -> Result<(bool, Vec<u8>), Error> {
    let header = match r.read_u32::<BigEndian>() {
        Ok(h) => h,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(Error::ConnectionClosed)
        }
        Err(e) => return Err(e.into()),
    };

    let last = header & LAST_FRAGMENT_BIT != 0;
    let size = (header & !LAST_FRAGMENT_BIT) as usize;

    let mut frag = vec![0u8; size];
    if let Err(e) = r.read_exact(&mut frag) {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            return Err(Error::TruncatedFragment {
                wanted: size,
                got: 0,
            });
        }
        return Err(e.into());
    }

    Ok((last, frag))
}

/// Reads a complete record from `r`, reassembling however many fragments it
/// is split across.
pub fn recv_record<R: Read>(r: &mut R) -> Result<Vec<u8>, Error> {
    let mut record = Vec::new();
    loop {
        let (last, mut frag) = recv_fragment(r)?;
        record.append(&mut frag);
        if last {
            return Ok(record);
        }
    }
}

/// Returns the number of fragments `send_record` will emit for a record of
/// `len` bytes, given a maximum fragment size of `frag_size`.
///
/// Every record produces at least one fragment, even an empty one.
pub fn fragment_count(len: usize, frag_size: u32) -> usize {
    let frag_size = frag_size.max(1) as usize;
    if len == 0 {
        1
    } else {
        len.div_ceil(frag_size)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_round_trip_single_fragment() {
        let record = b"hello world".to_vec();
        let mut buf = Vec::new();
        send_record(&mut buf, &record, MAX_FRAGMENT_SIZE).unwrap();

        let mut c = Cursor::new(buf);
        let got = recv_record(&mut c).unwrap();
        assert_eq!(got, record);
    }

    #[test]
    fn test_round_trip_multi_fragment() {
        let record = vec![7u8; 10];
        let mut buf = Vec::new();
        send_record(&mut buf, &record, 3).unwrap();

        // 10 bytes split into fragments of 3 -> 4 fragments.
        assert_eq!(fragment_count(record.len(), 3), 4);

        let mut c = Cursor::new(buf);
        let got = recv_record(&mut c).unwrap();
        assert_eq!(got, record);
    }

    #[test]
    fn test_empty_record_is_one_fragment() {
        let mut buf = Vec::new();
        send_record(&mut buf, &[], MAX_FRAGMENT_SIZE).unwrap();
        assert_eq!(buf.len(), HEADER_LEN);
        assert_eq!(fragment_count(0, MAX_FRAGMENT_SIZE), 1);

        let mut c = Cursor::new(buf);
        let got = recv_record(&mut c).unwrap();
        assert!(got.is_empty());
    }

    #[test]
    fn test_truncated_connection() {
        // A header promising 10 bytes, but the stream ends immediately.
        let buf = 10u32.to_be_bytes().to_vec();
        let mut c = Cursor::new(buf);
        let err = recv_record(&mut c).unwrap_err();
        assert!(matches!(err, Error::TruncatedFragment { wanted: 10, .. }));
    }

    #[test]
    fn test_connection_closed_before_header() {
        let mut c = Cursor::new(Vec::<u8>::new());
        let err = recv_record(&mut c).unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
    }

    proptest! {
        #[test]
        fn prop_round_trip(
            data in prop::collection::vec(any::<u8>(), 0..512),
            frag_size in 1u32..64,
        ) {
            let mut buf = Vec::new();
            send_record(&mut buf, &data, frag_size).unwrap();

            let mut c = Cursor::new(buf);
            let got = recv_record(&mut c).unwrap();
            assert_eq!(got, data);
        }
    }
}
