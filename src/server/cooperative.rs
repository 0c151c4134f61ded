use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{debug, trace};

use crate::framing::MAX_FRAGMENT_SIZE;
use crate::framing_async::{recv_record, send_record};
use crate::server::{DispatchOutcome, ProcedureRegistry};
use crate::Error;

/// A `tokio`-based RPC server over TCP, handling many connections
/// concurrently - each accepted connection is served by its own task.
#[derive(Debug)]
pub struct CooperativeTcpServer {
    listener: TcpListener,
    registry: Arc<ProcedureRegistry>,
}

impl CooperativeTcpServer {
    /// Binds to `addr`, ready to serve `registry`'s program/version.
    pub async fn bind<A: ToSocketAddrs>(
        addr: A,
        registry: ProcedureRegistry,
    ) -> Result<Self, Error> {
        Ok(Self {
            listener: TcpListener::bind(addr).await?,
            registry: Arc::new(registry),
        })
    }

    /// The address this server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts connections forever, spawning a task per connection.
    pub async fn serve_forever(&self) -> Result<(), Error> {
        loop {
            let (stream, peer) = self.listener.accept().await?;
            debug!(%peer, "accepted cooperative tcp connection");

            let registry = Arc::clone(&self.registry);
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, registry).await {
                    debug!(%peer, error = %e, "cooperative connection closed");
                }
            });
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    registry: Arc<ProcedureRegistry>,
) -> Result<(), Error> {
    stream.set_nodelay(true)?;
    loop {
        let call = match recv_record(&mut stream).await {
            Ok(c) => c,
            Err(Error::ConnectionClosed) => return Ok(()),
            Err(e) => return Err(e),
        };

        trace!(len = call.len(), "dispatching cooperative call");
        match registry.dispatch(&call) {
            DispatchOutcome::Reply(reply) => {
                send_record(&mut stream, &reply, MAX_FRAGMENT_SIZE).await?;
            }
            DispatchOutcome::Silent => {}
            DispatchOutcome::Fatal(e) => return Err(e),
        }
    }
}
