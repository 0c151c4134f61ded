use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use tracing::{debug, trace};

use crate::auth::AuthFlavor;
use crate::call::Call;
use crate::message::{AcceptedStatus, RpcMessage, ReplyBody};
use crate::portmapper::{PMAPPROC_CALLIT, PMAP_PROGRAM, PMAP_VERSION};
use crate::retry::RetryPolicy;
use crate::xdr::{ByteBuffer, ByteCursor};
use crate::{Error, Opaque};

use super::ClientState;

const RECV_BUFFER_SIZE: usize = 8192;

/// A blocking RPC client communicating over UDP.
///
/// Calls that go unanswered are retransmitted following a [`RetryPolicy`]
/// (five retransmissions doubling from one second up to a 25 second cap, by
/// default) - see [`UdpClient::set_retry_policy`].
#[derive(Debug)]
pub struct UdpClient {
    state: ClientState,
    socket: UdpSocket,
    target: SocketAddr,
    broadcast: bool,
    retry: RetryPolicy,
    tunnel: Option<SocketAddr>,
}

impl UdpClient {
    /// Binds an ephemeral local socket and targets `addr` for calls to
    /// `program` version `version`.
    pub fn connect<A: ToSocketAddrs>(addr: A, program: u32, version: u32) -> Result<Self, Error> {
        let target = addr
            .to_socket_addrs()?
            .next()
            .ok_or(Error::BadFormat("no address resolved".into()))?;
        let socket = UdpSocket::bind("0.0.0.0:0")?;

        Ok(Self {
            state: ClientState::new(program, version),
            socket,
            target,
            broadcast: false,
            retry: RetryPolicy::default(),
            tunnel: None,
        })
    }

    /// Sets the credentials and verifier attached to every subsequent call.
    pub fn set_auth(&mut self, credentials: AuthFlavor<Vec<u8>>, verifier: AuthFlavor<Vec<u8>>) {
        self.state.set_auth(credentials, verifier);
    }

    /// Overrides the default retransmission schedule.
    pub fn set_retry_policy(&mut self, policy: RetryPolicy) {
        self.retry = policy;
    }

    /// Allows replies to be accepted from an address other than the one a
    /// request was sent to.
    ///
    /// Used when a reply legitimately arrives from a different source than
    /// the destination of the request, such as a `CALLIT` tunnel's response
    /// coming from the target service's port rather than the portmapper's.
    pub fn enable_broadcast(&mut self) -> Result<(), Error> {
        self.broadcast = true;
        self.socket.set_broadcast(true)?;
        Ok(())
    }

    /// Routes every call through a portmapper's `CALLIT` facility at
    /// `portmapper_addr`, rather than sending directly to the configured
    /// target.
    ///
    /// The tunnel's lifetime is tied to this client: it is torn down when
    /// this `UdpClient` is dropped.
    pub fn set_tunnel<A: ToSocketAddrs>(&mut self, portmapper_addr: A) -> Result<(), Error> {
        let addr = portmapper_addr
            .to_socket_addrs()?
            .next()
            .ok_or(Error::BadFormat("no address resolved".into()))?;
        self.tunnel = Some(addr);
        self.enable_broadcast()
    }

    /// Invokes `procedure`, packing its arguments with `pack_args`, and
    /// blocks until the correlated reply arrives or the retry budget is
    /// exhausted.
    pub fn call(
        &mut self,
        procedure: u32,
        pack_args: impl FnOnce(&mut ByteBuffer),
    ) -> Result<Call, Error> {
        let mut call = self.state.make_call(procedure);
        pack_args(call.args_mut());
        self.do_call(call)
    }

    fn do_call(&mut self, call: Call) -> Result<Call, Error> {
        match self.tunnel {
            Some(tunnel_addr) => self.do_call_tunneled(call, tunnel_addr),
            None => self.do_call_direct(call),
        }
    }

    fn do_call_direct(&mut self, mut call: Call) -> Result<Call, Error> {
        let encoded = call.encode()?;
        let xid = call.xid();
        let target = self.target;

        let raw = self.send_with_retry(&encoded, target, xid)?;
        call.set_reply(raw)?;
        Ok(call)
    }

    fn do_call_tunneled(&mut self, mut call: Call, tunnel_addr: SocketAddr) -> Result<Call, Error> {
        let procedure = call.procedure();
        let inner = call.encode()?;

        let mut args = ByteBuffer::new();
        args.write_u32::<BigEndian>(self.state.program)?;
        args.write_u32::<BigEndian>(self.state.version)?;
        args.write_u32::<BigEndian>(procedure)?;
        Opaque::from_user_payload(inner.as_slice()).serialise_into(&mut args)?;

        let mut callit = Call::new(
            call.xid(),
            PMAP_PROGRAM,
            PMAP_VERSION,
            PMAPPROC_CALLIT,
            AuthFlavor::none(),
            AuthFlavor::none(),
        );
        *callit.args_mut() = args;

        let encoded = callit.encode()?;
        let xid = callit.xid();
        let raw = self.send_with_retry(&encoded, tunnel_addr, xid)?;
        callit.set_reply(raw)?;

        let reply = callit
            .reply_message()
            .expect("send_with_retry only returns a reply matching this xid");
        let payload = match reply.reply_body() {
            Some(ReplyBody::Accepted(a)) => match a.status() {
                AcceptedStatus::Success(p) => *p,
                other => {
                    return Err(Error::BadFormat(format!(
                        "portmapper rejected tunneled call: {other:?}"
                    )))
                }
            },
            other => {
                return Err(Error::BadFormat(format!(
                    "portmapper denied tunneled call: {other:?}"
                )))
            }
        };

        let mut cursor = ByteCursor::new(payload);
        let _port = cursor.read_u32::<BigEndian>()?;
        let result = Opaque::<&[u8]>::from_wire(&mut cursor, payload.len())?.into_payload();
        call.set_synthetic_reply(result);
        Ok(call)
    }

    /// Sends `encoded` to `target`, retransmitting per the configured
    /// [`RetryPolicy`] until a reply carrying `xid` arrives.
    fn send_with_retry(
        &mut self,
        encoded: &[u8],
        target: SocketAddr,
        xid: u32,
    ) -> Result<Vec<u8>, Error> {
        let send = |socket: &UdpSocket| -> Result<(), Error> {
            if self.broadcast {
                socket.send_to(encoded, target)?;
            } else {
                socket.send_to(encoded, target)?;
            }
            Ok(())
        };
        send(&self.socket)?;

        let mut buf = vec![0u8; RECV_BUFFER_SIZE];
        for attempt in 0..=self.retry.attempts {
            let timeout = self.retry.timeout_for_attempt(attempt);
            self.socket.set_read_timeout(Some(timeout))?;

            loop {
                match self.socket.recv(&mut buf) {
                    Ok(n) => {
                        if let Ok(msg) = RpcMessage::from_bytes(&buf[..n]) {
                            if msg.xid() == xid {
                                return Ok(buf[..n].to_vec());
                            }
                        }
                        trace!(xid, "discarding unrelated udp reply");
                    }
                    Err(e) if is_timeout(&e) => break,
                    Err(e) => return Err(e.into()),
                }
            }

            if attempt == self.retry.attempts {
                debug!(xid, attempts = attempt + 1, "udp call timed out");
                return Err(Error::Timeout);
            }

            send(&self.socket)?;
        }

        Err(Error::Timeout)
    }
}

fn is_timeout(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use std::net::UdpSocket;
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::message::{AcceptedReply, MessageType};

    #[test]
    fn test_call_round_trip() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let server_addr = server.local_addr().unwrap();

        let handle = thread::spawn(move || {
            let mut buf = [0u8; 8192];
            let (n, peer) = server.recv_from(&mut buf).unwrap();
            let msg = RpcMessage::from_bytes(&buf[..n]).unwrap();

            let reply = RpcMessage::new(
                msg.xid(),
                MessageType::Reply(ReplyBody::Accepted(AcceptedReply::new(
                    AuthFlavor::none(),
                    AcceptedStatus::Success(&[9, 9]),
                ))),
            );
            server.send_to(&reply.serialise().unwrap(), peer).unwrap();
        });

        let mut client = UdpClient::connect(server_addr, 100000, 2).unwrap();
        let call = client.call(0, |_args| {}).unwrap();
        assert!(call.has_reply());

        handle.join().unwrap();
    }

    #[test]
    fn test_timeout_when_server_silent() {
        let server = UdpSocket::bind("127.0.0.1:0").unwrap();
        let server_addr = server.local_addr().unwrap();

        let mut client = UdpClient::connect(server_addr, 100000, 2).unwrap();
        client.set_retry_policy(RetryPolicy {
            attempts: 1,
            initial: Duration::from_millis(20),
            max: Duration::from_millis(20),
            doubling: false,
        });

        let err = client.call(0, |_args| {}).unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }
}
