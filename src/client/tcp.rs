use std::fmt;
use std::net::{TcpStream, ToSocketAddrs};

use tracing::trace;

use crate::auth::AuthFlavor;
use crate::call::Call;
use crate::framing::{recv_record, send_record, MAX_FRAGMENT_SIZE};
use crate::xdr::ByteBuffer;
use crate::Error;

use super::ClientState;

/// A blocking RPC client communicating over a single, long-lived TCP
/// connection.
pub struct TcpClient {
    state: ClientState,
    stream: TcpStream,
}

impl fmt::Debug for TcpClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpClient")
            .field("state", &self.state)
            .field("peer", &self.stream.peer_addr().ok())
            .finish()
    }
}

impl TcpClient {
    /// Connects to `addr`, ready to invoke procedures of `program` version
    /// `version`.
    pub fn connect<A: ToSocketAddrs>(addr: A, program: u32, version: u32) -> Result<Self, Error> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Self {
            state: ClientState::new(program, version),
            stream,
        })
    }

    /// Sets the credentials and verifier attached to every subsequent call.
    pub fn set_auth(&mut self, credentials: AuthFlavor<Vec<u8>>, verifier: AuthFlavor<Vec<u8>>) {
        self.state.set_auth(credentials, verifier);
    }

    /// Invokes `procedure`, packing its arguments with `pack_args`, and
    /// blocks until the correlated reply arrives.
    pub fn call(
        &mut self,
        procedure: u32,
        pack_args: impl FnOnce(&mut ByteBuffer),
    ) -> Result<Call, Error> {
        let mut call = self.state.make_call(procedure);
        pack_args(call.args_mut());
        self.do_call(call)
    }

    fn do_call(&mut self, mut call: Call) -> Result<Call, Error> {
        let encoded = call.encode()?;
        trace!(xid = call.xid(), len = encoded.len(), "sending rpc call");
        send_record(&mut self.stream, &encoded, MAX_FRAGMENT_SIZE)?;

        loop {
            let raw = recv_record(&mut self.stream)?;
            if call.set_reply(raw)? {
                return Ok(call);
            }
        }
    }
}
