//! A single outstanding RPC invocation: the pre-seeded outbound message plus
//! whatever reply has been correlated against it so far.

use crate::auth::AuthFlavor;
use crate::message::{AcceptedReply, AcceptedStatus, CallHeader, MessageType, ReplyBody, RpcMessage};
use crate::{ByteBuffer, Error};

/// An in-flight RPC call.
///
/// A [`Call`] owns the transaction ID it was issued with, the arguments
/// accumulated so far, and - once one arrives - the raw bytes of the reply
/// that matched its transaction ID. [`Call::set_reply`] is the correlation
/// point: a reply carrying a different `xid` (a stale retransmission, or a
/// reply to some other in-flight call sharing the same connection) is
/// rejected rather than accepted, leaving this call still waiting.
#[derive(Debug)]
pub struct Call {
    xid: u32,
    program: u32,
    version: u32,
    procedure: u32,
    credentials: AuthFlavor<Vec<u8>>,
    verifier: AuthFlavor<Vec<u8>>,
    args: ByteBuffer,
    reply: Option<Vec<u8>>,
}

impl Call {
    /// Constructs a new call, ready to have arguments appended via
    /// [`Call::args_mut`].
    pub fn new(
        xid: u32,
        program: u32,
        version: u32,
        procedure: u32,
        credentials: AuthFlavor<Vec<u8>>,
        verifier: AuthFlavor<Vec<u8>>,
    ) -> Self {
        Self {
            xid,
            program,
            version,
            procedure,
            credentials,
            verifier,
            args: ByteBuffer::new(),
            reply: None,
        }
    }

    /// The transaction ID identifying this call.
    pub fn xid(&self) -> u32 {
        self.xid
    }

    /// The procedure number this call invokes.
    pub fn procedure(&self) -> u32 {
        self.procedure
    }

    /// Mutable access to the argument buffer, for a caller to pack its
    /// request arguments into before sending.
    pub fn args_mut(&mut self) -> &mut ByteBuffer {
        &mut self.args
    }

    /// Serialises the full RPC call message (header and arguments) ready to
    /// hand to [`crate::framing::send_record`].
    pub fn encode(&self) -> Result<Vec<u8>, std::io::Error> {
        let header = CallHeader::new(
            self.program,
            self.version,
            self.procedure,
            self.credentials.as_borrowed(),
            self.verifier.as_borrowed(),
            self.args.as_slice(),
        );
        RpcMessage::new(self.xid, MessageType::Call(header)).serialise()
    }

    /// Attempts to correlate `raw` (a complete, reassembled reply record) as
    /// the answer to this call.
    ///
    /// Returns `Ok(true)` if `raw`'s transaction ID matches this call's, in
    /// which case the reply is stored and retrievable via
    /// [`Call::reply_message`]. Returns `Ok(false)` - leaving this call's
    /// stored reply untouched - if the transaction ID does not match, which
    /// happens when a UDP retransmission's reply arrives alongside a stale
    /// duplicate, or a reply for a different in-flight call is read off a
    /// shared connection.
    pub fn set_reply(&mut self, raw: Vec<u8>) -> Result<bool, Error> {
        let msg = RpcMessage::from_bytes(&raw)?;
        if msg.xid() != self.xid {
            return Ok(false);
        }
        self.reply = Some(raw);
        Ok(true)
    }

    /// Returns `true` once a correctly-correlated reply has been stored.
    pub fn has_reply(&self) -> bool {
        self.reply.is_some()
    }

    /// Installs `payload` as a synthesized successful reply to this call.
    ///
    /// Used by [`crate::client::UdpClient`] when a call is routed through a
    /// portmapper `CALLIT` tunnel: the tunnel's own reply is correlated by
    /// transaction ID before reaching here, so the tunneled result is
    /// installed directly rather than re-parsed as a message carrying this
    /// call's `xid` off the wire.
    pub(crate) fn set_synthetic_reply(&mut self, payload: &[u8]) {
        let reply = ReplyBody::Accepted(AcceptedReply::new(
            AuthFlavor::none(),
            AcceptedStatus::Success(payload),
        ));
        let raw = RpcMessage::new(self.xid, MessageType::Reply(reply))
            .serialise()
            .expect("serialising an in-memory reply cannot fail");
        self.reply = Some(raw);
    }

    /// Parses and returns the stored reply, if any.
    pub fn reply_message(&self) -> Option<RpcMessage<'_>> {
        self.reply
            .as_deref()
            .map(|raw| RpcMessage::from_bytes(raw).expect("reply validated in set_reply"))
    }
}
