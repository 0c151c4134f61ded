use std::net::{TcpListener, TcpStream, ToSocketAddrs};

use tracing::{debug, trace};

use crate::framing::{recv_record, send_record, MAX_FRAGMENT_SIZE};
use crate::server::{DispatchOutcome, ProcedureRegistry};
use crate::Error;

/// A blocking RPC server over TCP.
///
/// Only one connection is served at a time - while a client is connected,
/// no other connection attempt is accepted. Concurrent connection handling
/// is the job of [`crate::server::CooperativeTcpServer`] (behind the
/// `cooperative` feature).
#[derive(Debug)]
pub struct TcpServer {
    listener: TcpListener,
    registry: ProcedureRegistry,
}

impl TcpServer {
    /// Binds to `addr`, ready to serve `registry`'s program/version.
    pub fn bind<A: ToSocketAddrs>(addr: A, registry: ProcedureRegistry) -> Result<Self, Error> {
        Ok(Self {
            listener: TcpListener::bind(addr)?,
            registry,
        })
    }

    /// The address this server is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts and serves connections forever, one at a time.
    pub fn serve_forever(&self) -> Result<(), Error> {
        loop {
            let (stream, peer) = self.listener.accept()?;
            debug!(%peer, "accepted tcp connection");
            if let Err(e) = self.handle_connection(stream) {
                debug!(%peer, error = %e, "connection closed");
            }
        }
    }

    fn handle_connection(&self, mut stream: TcpStream) -> Result<(), Error> {
        stream.set_nodelay(true)?;
        loop {
            let call = match recv_record(&mut stream) {
                Ok(c) => c,
                Err(Error::ConnectionClosed) => return Ok(()),
                Err(e) => return Err(e),
            };

            trace!(len = call.len(), "dispatching tcp call");
            match self.registry.dispatch(&call) {
                DispatchOutcome::Reply(reply) => {
                    send_record(&mut stream, &reply, MAX_FRAGMENT_SIZE)?;
                }
                DispatchOutcome::Silent => {}
                DispatchOutcome::Fatal(e) => {
                    debug!(error = %e, "handler raised an application error, closing connection");
                    return Err(e);
                }
            }
        }
    }
}
