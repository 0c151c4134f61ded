//! RPC clients: build a [`Call`](crate::call::Call), send it, and correlate
//! the reply by transaction ID.
//!
//! [`TcpClient`] and [`UdpClient`] are blocking, synchronous transports.
//! [`CooperativeTcpClient`] (behind the `cooperative` feature) is their
//! `tokio`-based async counterpart, opening a fresh connection per call.

mod tcp;
mod udp;

#[cfg(feature = "cooperative")]
mod cooperative;

pub use tcp::TcpClient;
pub use udp::UdpClient;

#[cfg(feature = "cooperative")]
pub use cooperative::CooperativeTcpClient;

use crate::auth::AuthFlavor;
use crate::call::Call;

/// Bookkeeping shared by every client transport: the target program/version,
/// the credentials attached to outgoing calls, and the monotonically
/// increasing transaction ID.
#[derive(Debug)]
pub(crate) struct ClientState {
    program: u32,
    version: u32,
    next_xid: u32,
    credentials: AuthFlavor<Vec<u8>>,
    verifier: AuthFlavor<Vec<u8>>,
}

impl ClientState {
    pub(crate) fn new(program: u32, version: u32) -> Self {
        Self {
            program,
            version,
            next_xid: 1,
            credentials: AuthFlavor::none(),
            verifier: AuthFlavor::none(),
        }
    }

    pub(crate) fn set_auth(
        &mut self,
        credentials: AuthFlavor<Vec<u8>>,
        verifier: AuthFlavor<Vec<u8>>,
    ) {
        self.credentials = credentials;
        self.verifier = verifier;
    }

    pub(crate) fn make_call(&mut self, procedure: u32) -> Call {
        let xid = self.next_xid;
        self.next_xid = match self.next_xid.wrapping_add(1) {
            0 => 1,
            n => n,
        };

        Call::new(
            xid,
            self.program,
            self.version,
            procedure,
            self.credentials.clone(),
            self.verifier.clone(),
        )
    }
}
