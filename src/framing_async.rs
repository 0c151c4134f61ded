//! Async counterpart of [`crate::framing`], used by the `cooperative`
//! transports.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::Error;

const LAST_FRAGMENT_BIT: u32 = 1 << 31;

async fn send_fragment<W: AsyncWrite + Unpin>(
    w: &mut W,
    last: bool,
    frag: &[u8],
) -> Result<(), Error> {
    let mut header = frag.len() as u32;
    if last {
        header |= LAST_FRAGMENT_BIT;
    }
    w.write_all(&header.to_be_bytes()).await?;
    w.write_all(frag).await?;
    Ok(())
}

/// Writes `record` to `w`, splitting it into fragments no larger than
/// `frag_size` bytes. See [`crate::framing::send_record`].
pub async fn send_record<W: AsyncWrite + Unpin>(
    w: &mut W,
    record: &[u8],
    frag_size: u32,
) -> Result<(), Error> {
    let frag_size = frag_size.max(1) as usize;
    let mut remaining = record;

    loop {
        let chunk_len = remaining.len().min(frag_size);
        let (chunk, rest) = remaining.split_at(chunk_len);
        let last = rest.is_empty();

        trace!(chunk_len, last, "sending rpc fragment (async)");
        send_fragment(w, last, chunk).await?;

        remaining = rest;
        if last {
            break;
        }
    }

    Ok(())
}

async fn recv_fragment<R: AsyncRead + Unpin>(r: &mut R) -> Result<(bool, Vec<u8>), Error> {
    let mut header_buf = [0u8; 4];
    if let Err(e) = r.read_exact(&mut header_buf).await {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            return Err(Error::ConnectionClosed);
        }
        return Err(e.into());
    }
    let header = u32::from_be_bytes(header_buf);

    let last = header & LAST_FRAGMENT_BIT != 0;
    let size = (header & !LAST_FRAGMENT_BIT) as usize;

    let mut frag = vec![0u8; size];
    if let Err(e) = r.read_exact(&mut frag).await {
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
/// is split across. See [`crate::framing::recv_record`].
pub async fn recv_record<R: AsyncRead + Unpin>(r: &mut R) -> Result<Vec<u8>, Error> {
    let mut record = Vec::new();
    loop {
        let (last, mut frag) = recv_fragment(r).await?;
        record.append(&mut frag);
        if last {
            return Ok(record);
        }
    }
}
