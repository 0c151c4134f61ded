//! A header-rewriting RPC proxy: a server front-end that re-emits the RPC
//! header toward an upstream client and splices the opaque argument/result
//! payload through unexamined.
//!
//! The proxy need not understand any program's procedure-specific argument
//! schema - it only has to understand enough of the header (§4.3) to decide
//! where a call is going, and forwards the rest as an opaque byte tail.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::net::{TcpListener, TcpStream, ToSocketAddrs};

use tracing::{debug, trace};

use crate::auth::AuthFlavor;
use crate::call::Call;
use crate::framing::{recv_record, send_record, MAX_FRAGMENT_SIZE};
use crate::message::{MessageType, RpcMessage};
use crate::Error;

/// A per-procedure override of the default "plain forward" behaviour,
/// given the raw opaque argument tail and returning the raw opaque result
/// tail.
type ProcedureHook = Box<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>;

/// An observer invoked once per direction with a complete serialized wire
/// record. Proxies are free to discard it; the default does nothing.
type ObserverHook = Box<dyn Fn(&[u8], bool) + Send + Sync>;

fn noop_observer(_buf: &[u8], _is_request: bool) {}

/// A server front-end that forwards calls to an upstream server, rewriting
/// only the RPC header and otherwise splicing payload through untouched.
///
/// Structurally this owns both a server binding (the inbound [`TcpListener`])
/// and a client targeting upstream - the upstream connection is established
/// once, when the proxy is bound, and held open for the proxy's whole
/// lifetime rather than reconnected per call.
pub struct Proxy {
    listener: TcpListener,
    upstream: RefCell<TcpStream>,
    procedure_hooks: HashMap<u32, ProcedureHook>,
    observer: ObserverHook,
}

impl fmt::Debug for Proxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("listener", &self.listener)
            .field("hooked_procedures", &self.procedure_hooks.len())
            .finish()
    }
}

impl Proxy {
    /// Binds the proxy's inbound listener to `listen_addr` and connects to
    /// `upstream_addr`, forwarding every accepted call on to that single
    /// upstream connection.
    pub fn bind<L: ToSocketAddrs, U: ToSocketAddrs>(
        listen_addr: L,
        upstream_addr: U,
    ) -> Result<Self, Error> {
        let upstream = TcpStream::connect(upstream_addr)?;
        upstream.set_nodelay(true)?;

        Ok(Self {
            listener: TcpListener::bind(listen_addr)?,
            upstream: RefCell::new(upstream),
            procedure_hooks: HashMap::new(),
            observer: Box::new(noop_observer),
        })
    }

    /// The address this proxy's inbound listener is bound to.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, Error> {
        Ok(self.listener.local_addr()?)
    }

    /// Installs a hook that replaces the default forward-to-upstream
    /// behaviour for `procedure`, given the raw argument tail and producing
    /// the raw result tail directly, without contacting upstream at all.
    pub fn set_procedure_hook<F>(&mut self, procedure: u32, hook: F)
    where
        F: Fn(&[u8]) -> Vec<u8> + Send + Sync + 'static,
    {
        self.procedure_hooks.insert(procedure, Box::new(hook));
    }

    /// Installs an observer invoked with the complete serialized wire record
    /// once per direction (`is_request` is `true` for the inbound call,
    /// `false` for the outbound reply). Observers may not modify the data.
    pub fn set_observer<F>(&mut self, observer: F)
    where
        F: Fn(&[u8], bool) + Send + Sync + 'static,
    {
        self.observer = Box::new(observer);
    }

    /// Accepts and services connections forever, one at a time.
    pub fn serve_forever(&self) -> Result<(), Error> {
        loop {
            let (stream, peer) = self.listener.accept()?;
            debug!(%peer, "accepted proxy connection");
            if let Err(e) = self.handle_connection(stream) {
                debug!(%peer, error = %e, "proxy connection closed");
            }
        }
    }

    fn handle_connection(&self, mut stream: TcpStream) -> Result<(), Error> {
        stream.set_nodelay(true)?;
        loop {
            let raw = match recv_record(&mut stream) {
                Ok(c) => c,
                Err(Error::ConnectionClosed) => return Ok(()),
                Err(e) => return Err(e),
            };
            (self.observer)(&raw, true);

            let reply = self.dispatch(&raw);
            if let Some(reply) = reply {
                (self.observer)(&reply, false);
                send_record(&mut stream, &reply, MAX_FRAGMENT_SIZE)?;
            }
        }
    }

    /// Processes one serialized inbound record, returning the serialized
    /// reply to send back, or `None` if the record was not a call (it is
    /// silently dropped, matching a non-proxying server's handling of a
    /// malformed message type).
    fn dispatch(&self, raw: &[u8]) -> Option<Vec<u8>> {
        let msg = match RpcMessage::from_bytes(raw) {
            Ok(m) => m,
            Err(e) => {
                trace!(error = %e, "dropping unparseable proxy record");
                return None;
            }
        };

        let header = match msg.message() {
            MessageType::Call(h) => h,
            MessageType::Reply(_) => return None,
        };

        let xid = msg.xid();
        let procedure = header.procedure();

        if let Some(hook) = self.procedure_hooks.get(&procedure) {
            let result = hook(header.payload());
            return Some(synthetic_reply(xid, &result));
        }

        match self.forward(
            xid,
            header.program(),
            header.program_version(),
            procedure,
            header.auth_credentials().as_borrowed_into_owned(),
            header.auth_verifier().as_borrowed_into_owned(),
            header.payload(),
        ) {
            Ok(reply) => Some(reply),
            Err(e) => {
                trace!(error = %e, "upstream forward failed");
                None
            }
        }
    }

    /// Forwards a single call to upstream, mirroring the inbound
    /// credentials, verifier and transaction ID onto the upstream call so
    /// its header is indistinguishable from one the original caller sent
    /// directly.
    ///
    /// Because the upstream call carries the same `xid` as the inbound
    /// call, the upstream's raw reply bytes are already addressed to the
    /// inbound caller - they are forwarded verbatim rather than re-packed,
    /// which also means any non-success accepted status (or a rejection)
    /// from upstream is transparently relayed rather than collapsed to
    /// `SUCCESS`.
    fn forward(
        &self,
        xid: u32,
        program: u32,
        version: u32,
        procedure: u32,
        credentials: AuthFlavor<Vec<u8>>,
        verifier: AuthFlavor<Vec<u8>>,
        payload: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let mut call = Call::new(xid, program, version, procedure, credentials, verifier);
        std::io::Write::write_all(call.args_mut(), payload)?;

        let encoded = call.encode()?;
        let mut upstream = self.upstream.borrow_mut();

        send_record(&mut *upstream, &encoded, MAX_FRAGMENT_SIZE)?;
        loop {
            let raw = recv_record(&mut *upstream)?;
            if call.set_reply(raw.clone())? {
                return Ok(raw);
            }
        }
    }
}

fn synthetic_reply(xid: u32, payload: &[u8]) -> Vec<u8> {
    use crate::message::{AcceptedReply, AcceptedStatus, ReplyBody};

    let reply = ReplyBody::Accepted(AcceptedReply::new(
        AuthFlavor::none(),
        AcceptedStatus::Success(payload),
    ));
    RpcMessage::new(xid, MessageType::Reply(reply))
        .serialise()
        .expect("serialising an in-memory reply cannot fail")
}

trait ToOwnedAuth {
    fn as_borrowed_into_owned(&self) -> AuthFlavor<Vec<u8>>;
}

impl<'a> ToOwnedAuth for AuthFlavor<&'a [u8]> {
    fn as_borrowed_into_owned(&self) -> AuthFlavor<Vec<u8>> {
        use crate::auth::AuthUnixParams;

        match self {
            AuthFlavor::AuthNone(d) => AuthFlavor::AuthNone(d.map(|v| v.to_vec())),
            AuthFlavor::AuthUnix(p) => AuthFlavor::AuthUnix(AuthUnixParams::new(
                p.stamp(),
                p.machine_name().to_vec(),
                p.uid(),
                p.gid(),
                p.gids().cloned(),
            )),
            AuthFlavor::AuthShort(d) => AuthFlavor::AuthShort(d.to_vec()),
            AuthFlavor::Unknown { id, data } => AuthFlavor::Unknown {
                id: *id,
                data: data.to_vec(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use byteorder::{BigEndian, ReadBytesExt};

    use super::*;
    use crate::message::{AcceptedStatus, CallHeader, ReplyBody};
    use crate::server::{ProcedureRegistry, TcpServer};
    use crate::xdr::ByteCursor;

    fn spawn_upstream() -> std::net::SocketAddr {
        let mut registry = ProcedureRegistry::new(100000, 2);
        registry.register(1, |c: &mut ByteCursor<'_>| {
            let n = c.read_u32::<BigEndian>()?;
            Ok((n * 2).to_be_bytes().to_vec())
        });
        let server = TcpServer::bind("127.0.0.1:0", registry).unwrap();
        let addr = server.local_addr().unwrap();
        std::thread::spawn(move || {
            let _ = server.serve_forever();
        });
        addr
    }

    #[test]
    fn test_transparent_forward() {
        let upstream_addr = spawn_upstream();
        let proxy = Proxy::bind("127.0.0.1:0", upstream_addr).unwrap();
        let proxy_addr = proxy.local_addr().unwrap();
        std::thread::spawn(move || {
            let _ = proxy.serve_forever();
        });

        let mut client = TcpStream::connect(proxy_addr).unwrap();
        let call = RpcMessage::new(
            9,
            MessageType::Call(CallHeader::new(
                100000,
                2,
                1,
                AuthFlavor::none(),
                AuthFlavor::none(),
                &20u32.to_be_bytes(),
            )),
        );
        send_record(&mut client, &call.serialise().unwrap(), MAX_FRAGMENT_SIZE).unwrap();

        let raw = recv_record(&mut client).unwrap();
        let msg = RpcMessage::from_bytes(&raw).unwrap();
        assert_eq!(msg.xid(), 9);

        let payload = match msg.reply_body().unwrap() {
            ReplyBody::Accepted(a) => match a.status() {
                AcceptedStatus::Success(p) => *p,
                _ => panic!("expected success"),
            },
            _ => panic!("expected accepted"),
        };
        let n = ByteCursor::new(payload).read_u32::<BigEndian>().unwrap();
        assert_eq!(n, 40);
    }

    #[test]
    fn test_procedure_hook_bypasses_upstream() {
        let upstream_addr = spawn_upstream();
        let mut proxy = Proxy::bind("127.0.0.1:0", upstream_addr).unwrap();
        proxy.set_procedure_hook(1, |_payload| vec![0, 0, 0, 99]);
        let proxy_addr = proxy.local_addr().unwrap();
        std::thread::spawn(move || {
            let _ = proxy.serve_forever();
        });

        let mut client = TcpStream::connect(proxy_addr).unwrap();
        let call = RpcMessage::new(
            1,
            MessageType::Call(CallHeader::new(
                100000,
                2,
                1,
                AuthFlavor::none(),
                AuthFlavor::none(),
                &20u32.to_be_bytes(),
            )),
        );
        send_record(&mut client, &call.serialise().unwrap(), MAX_FRAGMENT_SIZE).unwrap();

        let raw = recv_record(&mut client).unwrap();
        let msg = RpcMessage::from_bytes(&raw).unwrap();
        let payload = match msg.reply_body().unwrap() {
            ReplyBody::Accepted(a) => match a.status() {
                AcceptedStatus::Success(p) => *p,
                _ => panic!("expected success"),
            },
            _ => panic!("expected accepted"),
        };
        let n = ByteCursor::new(payload).read_u32::<BigEndian>().unwrap();
        assert_eq!(n, 99);
    }
}
