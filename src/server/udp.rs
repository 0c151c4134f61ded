use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use tracing::{trace, warn};

use crate::server::{DispatchOutcome, ProcedureRegistry};
use crate::Error;

const RECV_BUFFER_SIZE: usize = 8192;

/// A blocking RPC server over UDP.
#[derive(Debug)]
pub struct UdpServer {
    socket: UdpSocket,
    registry: ProcedureRegistry,
}

impl UdpServer {
    /// Binds to `addr`, ready to serve `registry`'s program/version.
    pub fn bind<A: ToSocketAddrs>(addr: A, registry: ProcedureRegistry) -> Result<Self, Error> {
        Ok(Self {
            socket: UdpSocket::bind(addr)?,
            registry,
        })
    }

    /// The address this server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.socket.local_addr()?)
    }

    /// Serves incoming datagrams forever.
    pub fn serve_forever(&self) -> Result<(), Error> {
        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        loop {
            let (n, peer) = self.socket.recv_from(&mut buf)?;
            trace!(%peer, len = n, "dispatching udp call");

            match self.registry.dispatch(&buf[..n]) {
                DispatchOutcome::Reply(reply) => {
                    self.socket.send_to(&reply, peer)?;
                }
                DispatchOutcome::Silent => {}
                DispatchOutcome::Fatal(e) => {
                    warn!(%peer, error = %e, "handler raised an application error, dropping datagram");
                }
            }
        }
    }
}
