use std::convert::TryFrom;
use std::io::Write;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::message::{CallHeader, ReplyBody};
use crate::xdr::ByteCursor;
use crate::Error;

const MSG_HEADER_LEN: usize = 4;
const LAST_FRAGMENT_BIT: u32 = 1 << 31;

const MESSAGE_TYPE_CALL: u32 = 0;
const MESSAGE_TYPE_REPLY: u32 = 1;

/// The type of RPC message.
#[derive(Debug, PartialEq)]
pub enum MessageType<'a> {
    /// This message is invoking an RPC.
    Call(CallHeader<'a>),
    /// This message is a response to an RPC request.
    Reply(ReplyBody<'a>),
}

impl<'a> MessageType<'a> {
    pub(crate) fn from_cursor(r: &mut ByteCursor<'a>) -> Result<Self, Error> {
        match r.read_u32::<BigEndian>()? {
            MESSAGE_TYPE_CALL => Ok(MessageType::Call(CallHeader::from_cursor(r)?)),
            MESSAGE_TYPE_REPLY => Ok(MessageType::Reply(ReplyBody::from_cursor(r)?)),
            v => Err(Error::InvalidMessageType(v)),
        }
    }

    /// Serialises this `MessageType` into `buf`.
    pub fn serialise_into<W: Write>(&self, mut buf: W) -> Result<(), std::io::Error> {
        match self {
            Self::Call(b) => {
                buf.write_u32::<BigEndian>(MESSAGE_TYPE_CALL)?;
                b.serialise_into(buf)?;
            }
            Self::Reply(b) => {
                buf.write_u32::<BigEndian>(MESSAGE_TYPE_REPLY)?;
                b.serialise_into(buf)?;
            }
        }

        Ok(())
    }

    /// Returns the on-wire length of this message once serialised.
    pub fn serialised_len(&self) -> u32 {
        4 + match self {
            Self::Call(c) => c.serialised_len(),
            Self::Reply(r) => r.serialised_len(),
        }
    }
}

/// An Open Network Computing RPC message: a transaction ID plus a call or
/// reply body.
///
/// This type represents a single, fully reassembled record - see
/// [`crate::framing`] for splitting/joining the wire fragments a stream
/// transport carries this message in.
#[derive(Debug, PartialEq)]
pub struct RpcMessage<'a> {
    xid: u32,
    message_type: MessageType<'a>,
}

impl<'a> RpcMessage<'a> {
    /// Construct a new `RpcMessage` with the specified transaction ID and
    /// message body.
    pub fn new(xid: u32, message_type: MessageType<'a>) -> Self {
        Self { xid, message_type }
    }

    /// Deserialises a new [`RpcMessage`] from `buf`.
    ///
    /// `buf` must contain exactly one reassembled record (record-marking
    /// framing already stripped) - if `buf` contains trailing or truncated
    /// data, [`Error::IncompleteMessage`] is returned.
    pub fn from_bytes(buf: &'a [u8]) -> Result<Self, Error> {
        let mut r = ByteCursor::new(buf);

        let xid = r.read_u32::<BigEndian>()?;
        let message_type = MessageType::from_cursor(&mut r)?;

        let msg = RpcMessage { xid, message_type };

        let want_len = buf.len() as u32;
        if msg.serialised_len() != want_len {
            return Err(Error::IncompleteMessage {
                buffer_len: buf.len(),
                expected: msg.serialised_len() as usize,
            });
        }

        Ok(msg)
    }

    /// Write this `RpcMessage` into `buf`.
    ///
    /// This writes the message body only; callers sending over a
    /// record-marked stream transport should instead use
    /// [`crate::framing::send_record`], which adds the fragment header.
    pub fn serialise_into<W: Write>(&self, mut buf: W) -> Result<(), std::io::Error> {
        buf.write_u32::<BigEndian>(self.xid)?;
        self.message_type.serialise_into(buf)
    }

    /// Serialise this `RpcMessage` into a new [`Vec`].
    pub fn serialise(&self) -> Result<Vec<u8>, std::io::Error> {
        let mut buf = Vec::with_capacity(self.serialised_len() as usize);
        self.serialise_into(&mut buf)?;
        Ok(buf)
    }

    /// Returns the on-wire length of this message once serialised.
    pub fn serialised_len(&self) -> u32 {
        self.message_type.serialised_len() + 4
    }

    /// The transaction ID for this request.
    pub fn xid(&self) -> u32 {
        self.xid
    }

    /// The [`MessageType`] contained in this request.
    pub fn message(&self) -> &MessageType<'a> {
        &self.message_type
    }

    /// Returns the [`CallHeader`] in this request, or `None` if this message
    /// is not an RPC call.
    pub fn call_header(&self) -> Option<&CallHeader<'a>> {
        match self.message_type {
            MessageType::Call(ref b) => Some(b),
            _ => None,
        }
    }

    /// Returns the [`ReplyBody`] in this request, or `None` if this message
    /// is not an RPC response.
    pub fn reply_body(&self) -> Option<&ReplyBody<'a>> {
        match self.message_type {
            MessageType::Reply(ref b) => Some(b),
            _ => None,
        }
    }
}

impl<'a> TryFrom<&'a [u8]> for RpcMessage<'a> {
    type Error = Error;

    fn try_from(v: &'a [u8]) -> Result<Self, Self::Error> {
        RpcMessage::from_bytes(v)
    }
}

/// Reads the record-marking fragment header from `data`, and returns the
/// total expected length of the fragment (the header plus its payload).
///
/// `data` must contain at least 4 bytes. [`Error::Fragmented`] is never
/// returned by this function; it reports only whether the length is
/// well-formed. See [`crate::framing`] for reassembling multi-fragment
/// records.
pub fn expected_message_len(data: &[u8]) -> Result<u32, Error> {
    if data.len() < MSG_HEADER_LEN {
        return Err(Error::IncompleteHeader);
    }

    let mut header_bytes = [0u8; 4];
    header_bytes.copy_from_slice(&data[..MSG_HEADER_LEN]);
    let header = u32::from_be_bytes(header_bytes);

    let size = header & !LAST_FRAGMENT_BIT;

    Ok(MSG_HEADER_LEN as u32 + size)
}
