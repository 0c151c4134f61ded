//! RPC server dispatch: procedure registration and the call/reply state
//! machine shared by every transport.
//!
//! [`TcpServer`] and [`UdpServer`] are blocking, synchronous servers.
//! [`CooperativeTcpServer`] (behind the `cooperative` feature) is their
//! `tokio`-based async counterpart, handling many connections concurrently.

mod tcp;
mod udp;

#[cfg(feature = "cooperative")]
mod cooperative;

pub use tcp::TcpServer;
pub use udp::UdpServer;

#[cfg(feature = "cooperative")]
pub use cooperative::CooperativeTcpServer;

use std::collections::HashMap;
use std::fmt;

use byteorder::{BigEndian, ReadBytesExt};

use crate::auth::AuthFlavor;
use crate::message::{AcceptedReply, AcceptedStatus, MessageType, RejectedReply, ReplyBody, RpcMessage};
use crate::xdr::ByteCursor;
use crate::Error;

const RPC_VERSION: u32 = 2;
const MESSAGE_TYPE_CALL: u32 = 0;

/// A handler for a single procedure number: reads its arguments from
/// `cursor` and returns the packed result payload.
///
/// A handler that leaves unread bytes in `cursor` is reported to the caller
/// as `GARBAGE_ARGS` without the handler needing to check for this itself.
/// A handler that returns `Err` has no wire encoding: it is fatal to the
/// connection it arrived on, reported to the caller as [`DispatchOutcome::Fatal`].
type Handler = Box<dyn Fn(&mut ByteCursor<'_>) -> Result<Vec<u8>, Error> + Send + Sync>;

/// The result of dispatching one reassembled call record.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// A well-formed RPC reply, ready to be sent back to the caller.
    Reply(Vec<u8>),

    /// The call record was too short to contain even a transaction ID, so
    /// no reply can be correlated to it. The transport should send nothing.
    Silent,

    /// A handler raised an application error, which this library has no
    /// wire encoding for. The connection this call arrived on must be
    /// closed (stream transports) or the datagram dropped and logged
    /// (datagram transports).
    Fatal(Error),
}

/// An intermediate dispatch failure: either a protocol-level reply body, or
/// an application error with no wire encoding.
enum DispatchFailure {
    Reply(ReplyBody<'static>),
    Application(Error),
}

impl From<ReplyBody<'static>> for DispatchFailure {
    fn from(body: ReplyBody<'static>) -> Self {
        DispatchFailure::Reply(body)
    }
}

/// Maps procedure numbers to handlers for a single `(program, version)`.
pub struct ProcedureRegistry {
    program: u32,
    version: u32,
    handlers: HashMap<u32, Handler>,
}

impl fmt::Debug for ProcedureRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcedureRegistry")
            .field("program", &self.program)
            .field("version", &self.version)
            .field("procedures", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ProcedureRegistry {
    /// Creates a registry for `program` version `version`, with procedure 0
    /// pre-registered as the standard "turn around" no-op: it takes no
    /// arguments and returns an empty reply. The shared post-handler check
    /// in [`ProcedureRegistry::dispatch_call`] rejects any trailing bytes
    /// as `GARBAGE_ARGS`, so this handler need not check for them itself.
    pub fn new(program: u32, version: u32) -> Self {
        let mut handlers = HashMap::new();
        let turn_around: Handler = Box::new(|_cursor: &mut ByteCursor<'_>| Ok(Vec::new()));
        handlers.insert(0, turn_around);

        Self {
            program,
            version,
            handlers,
        }
    }

    /// The program number this registry serves.
    pub fn program(&self) -> u32 {
        self.program
    }

    /// The program version this registry serves.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Registers `handler` to serve `procedure`, replacing any existing
    /// handler for that number.
    pub fn register<F>(&mut self, procedure: u32, handler: F)
    where
        F: Fn(&mut ByteCursor<'_>) -> Result<Vec<u8>, Error> + Send + Sync + 'static,
    {
        self.handlers.insert(procedure, Box::new(handler));
    }

    /// Dispatches one reassembled call record, returning the outcome the
    /// transport should act on.
    ///
    /// A malformed call, an unknown program/version/procedure, all produce
    /// a well-formed RPC reply. A buffer too short to contain even a
    /// transaction ID produces [`DispatchOutcome::Silent`], leaving the
    /// transport with nothing it can correlate a response to. A handler
    /// error produces [`DispatchOutcome::Fatal`], since this library
    /// defines no wire encoding for an application error.
    pub fn dispatch(&self, raw: &[u8]) -> DispatchOutcome {
        let mut cursor = ByteCursor::new(raw);
        let xid = match cursor.read_u32::<BigEndian>() {
            Ok(v) => v,
            Err(_) => return DispatchOutcome::Silent,
        };

        match self.dispatch_call(&mut cursor) {
            Ok(payload) => DispatchOutcome::Reply(serialise_reply(
                xid,
                ReplyBody::Accepted(AcceptedReply::new(
                    AuthFlavor::none(),
                    AcceptedStatus::Success(&payload),
                )),
            )),
            Err(DispatchFailure::Reply(body)) => DispatchOutcome::Reply(serialise_reply(xid, body)),
            Err(DispatchFailure::Application(e)) => DispatchOutcome::Fatal(e),
        }
    }

    /// Validates the call header and dispatches to the matching handler.
    ///
    /// Mirrors the validation order of a hand-packed reply buffer: the
    /// `rpcvers`/`prog`/`vers` checks run in this exact sequence, each one
    /// short-circuiting with the matching accept/deny reply.
    fn dispatch_call(&self, cursor: &mut ByteCursor<'_>) -> Result<Vec<u8>, DispatchFailure> {
        let msg_type = cursor.read_u32::<BigEndian>().map_err(|_| garbage())?;
        if msg_type != MESSAGE_TYPE_CALL {
            return Err(garbage().into());
        }

        let rpc_vers = cursor.read_u32::<BigEndian>().map_err(|_| garbage())?;
        if rpc_vers != RPC_VERSION {
            return Err(ReplyBody::Denied(RejectedReply::RpcVersionMismatch {
                low: RPC_VERSION,
                high: RPC_VERSION,
            })
            .into());
        }

        let program = cursor.read_u32::<BigEndian>().map_err(|_| garbage())?;
        if program != self.program {
            return Err(accepted(AcceptedStatus::ProgramUnavailable).into());
        }

        let version = cursor.read_u32::<BigEndian>().map_err(|_| garbage())?;
        if version != self.version {
            return Err(accepted(AcceptedStatus::ProgramMismatch {
                low: self.version,
                high: self.version,
            })
            .into());
        }

        let procedure = cursor.read_u32::<BigEndian>().map_err(|_| garbage())?;
        let _credentials = AuthFlavor::from_cursor(cursor).map_err(|_| garbage())?;
        let _verifier = AuthFlavor::from_cursor(cursor).map_err(|_| garbage())?;

        let handler = self
            .handlers
            .get(&procedure)
            .ok_or_else(|| accepted(AcceptedStatus::ProcedureUnavailable))?;

        let payload = handler(cursor).map_err(DispatchFailure::Application)?;

        if cursor.done().is_err() {
            return Err(accepted(AcceptedStatus::GarbageArgs).into());
        }

        Ok(payload)
    }
}

fn accepted(status: AcceptedStatus<'static>) -> ReplyBody<'static> {
    ReplyBody::Accepted(AcceptedReply::new(AuthFlavor::none(), status))
}

fn garbage() -> ReplyBody<'static> {
    accepted(AcceptedStatus::GarbageArgs)
}

fn serialise_reply(xid: u32, body: ReplyBody<'_>) -> Vec<u8> {
    RpcMessage::new(xid, MessageType::Reply(body))
        .serialise()
        .expect("serialising an in-memory reply cannot fail")
}
