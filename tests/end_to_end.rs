//! Concrete end-to-end scenarios tying the wire-level crate together:
//! a TCP echo, the accepted/denied reply shapes, fragmented reassembly,
//! UDP retry behaviour, a portmapper DUMP round trip, and proxy
//! transparency.

use std::net::{TcpStream, UdpSocket};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use onc_rpc_stack::auth::AuthFlavor;
use onc_rpc_stack::client::{TcpClient, UdpClient};
use onc_rpc_stack::framing::{recv_record, send_record, MAX_FRAGMENT_SIZE};
use onc_rpc_stack::message::{
    AcceptedStatus, CallHeader, MessageType, RejectedReply, ReplyBody, RpcMessage,
};
use onc_rpc_stack::portmapper::{PMAP_PROGRAM, PMAP_VERSION};
use onc_rpc_stack::proxy::Proxy;
use onc_rpc_stack::server::{DispatchOutcome, ProcedureRegistry, TcpServer, UdpServer};
use onc_rpc_stack::xdr::ByteCursor;
use onc_rpc_stack::{ByteBuffer, RetryPolicy};

const ECHO_PROGRAM: u32 = 1337;
const ECHO_VERSION: u32 = 2;
const ECHO_PROCEDURE: u32 = 1;

fn pack_string(buf: &mut ByteBuffer, s: &str) {
    use std::io::Write;
    buf.write_u32::<BigEndian>(s.len() as u32).unwrap();
    buf.write_all(s.as_bytes()).unwrap();
    let pad = (4 - s.len() % 4) % 4;
    buf.write_all(&[0u8; 3][..pad]).unwrap();
}

fn unpack_string(payload: &[u8]) -> String {
    let mut c = ByteCursor::new(payload);
    let len = c.read_u32::<BigEndian>().unwrap() as usize;
    let bytes = c.read_slice(len).unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn echo_registry() -> ProcedureRegistry {
    let mut registry = ProcedureRegistry::new(ECHO_PROGRAM, ECHO_VERSION);
    registry.register(ECHO_PROCEDURE, |cursor: &mut ByteCursor<'_>| {
        let len = cursor.read_u32::<BigEndian>()?;
        let bytes = cursor.read_slice(len as usize)?;
        let pad = (4 - (len as usize) % 4) % 4;
        if pad > 0 {
            cursor.read_slice(pad)?;
        }

        let mut reply = Vec::new();
        reply.write_u32::<BigEndian>(len).unwrap();
        reply.extend_from_slice(bytes);
        reply.extend_from_slice(&[0u8; 3][..pad]);
        Ok(reply)
    });
    registry
}

/// Scenario 1: echo over TCP.
#[test]
fn scenario_echo_over_tcp() {
    let server = TcpServer::bind("127.0.0.1:0", echo_registry()).unwrap();
    let addr = server.local_addr().unwrap();
    std::thread::spawn(move || {
        let _ = server.serve_forever();
    });

    let mut client = TcpClient::connect(addr, ECHO_PROGRAM, ECHO_VERSION).unwrap();
    let call = client
        .call(ECHO_PROCEDURE, |args| pack_string(args, "hi"))
        .unwrap();

    assert_eq!(call.xid(), 1);
    let reply = call.reply_message().unwrap();
    let payload = match reply.reply_body().unwrap() {
        ReplyBody::Accepted(a) => match a.status() {
            AcceptedStatus::Success(p) => *p,
            other => panic!("unexpected status: {other:?}"),
        },
        other => panic!("unexpected reply: {other:?}"),
    };
    assert_eq!(unpack_string(payload), "hi");
}

/// Scenario 2: a call declaring an unsupported RPC version is denied with
/// RPC_MISMATCH{2,2}, regardless of which program/procedure it names.
#[test]
fn scenario_version_mismatch_is_denied() {
    let reg = echo_registry();

    let header = CallHeader::new(
        ECHO_PROGRAM,
        ECHO_VERSION,
        ECHO_PROCEDURE,
        AuthFlavor::none(),
        AuthFlavor::none(),
        &[],
    );
    let mut raw = RpcMessage::new(1, MessageType::Call(header)).serialise().unwrap();
    // byte layout: xid(4) msgtype(4) rpcvers(4) ...
    raw[11] = 3;

    let reply = match reg.dispatch(&raw) {
        DispatchOutcome::Reply(raw) => raw,
        other => panic!("expected a reply, got {other:?}"),
    };
    let msg = RpcMessage::from_bytes(&reply).unwrap();
    assert_eq!(msg.xid(), 1);
    match msg.reply_body().unwrap() {
        ReplyBody::Denied(RejectedReply::RpcVersionMismatch { low: 2, high: 2 }) => {}
        other => panic!("wrong reply: {other:?}"),
    }
}

/// Scenario 3: an unregistered program is reported PROG_UNAVAIL.
#[test]
fn scenario_program_unavailable() {
    let reg = echo_registry();

    let header = CallHeader::new(9999, ECHO_VERSION, 0, AuthFlavor::none(), AuthFlavor::none(), &[]);
    let raw = RpcMessage::new(7, MessageType::Call(header)).serialise().unwrap();

    let reply = match reg.dispatch(&raw) {
        DispatchOutcome::Reply(raw) => raw,
        other => panic!("expected a reply, got {other:?}"),
    };
    let msg = RpcMessage::from_bytes(&reply).unwrap();
    assert_eq!(msg.xid(), 7);
    match msg.reply_body().unwrap() {
        ReplyBody::Accepted(a) => assert!(matches!(a.status(), AcceptedStatus::ProgramUnavailable)),
        other => panic!("wrong reply: {other:?}"),
    }
}

/// Scenario 4: a 100 KiB opaque argument sent with a 32 KiB fragment
/// ceiling is reassembled whole by the server and echoed back intact.
#[test]
fn scenario_fragmented_call_reassembly() {
    const FRAG_SIZE: u32 = 32 * 1024;
    const PAYLOAD_LEN: usize = 100 * 1024;

    let server = TcpServer::bind("127.0.0.1:0", echo_registry()).unwrap();
    let addr = server.local_addr().unwrap();
    std::thread::spawn(move || {
        let _ = server.serve_forever();
    });

    let payload: Vec<u8> = (0..PAYLOAD_LEN).map(|i| (i % 256) as u8).collect();

    let mut args = ByteBuffer::new();
    {
        use std::io::Write;
        args.write_u32::<BigEndian>(payload.len() as u32).unwrap();
        args.write_all(&payload).unwrap();
    }

    let header = CallHeader::new(
        ECHO_PROGRAM,
        ECHO_VERSION,
        ECHO_PROCEDURE,
        AuthFlavor::none(),
        AuthFlavor::none(),
        args.as_slice(),
    );
    let encoded = RpcMessage::new(1, MessageType::Call(header)).serialise().unwrap();

    let mut stream = TcpStream::connect(addr).unwrap();
    stream.set_nodelay(true).unwrap();
    send_record(&mut stream, &encoded, FRAG_SIZE).unwrap();

    let raw = recv_record(&mut stream).unwrap();
    let msg = RpcMessage::from_bytes(&raw).unwrap();
    let reply_payload = match msg.reply_body().unwrap() {
        ReplyBody::Accepted(a) => match a.status() {
            AcceptedStatus::Success(p) => *p,
            other => panic!("unexpected status: {other:?}"),
        },
        other => panic!("unexpected reply: {other:?}"),
    };

    let mut c = ByteCursor::new(reply_payload);
    let got_len = c.read_u32::<BigEndian>().unwrap() as usize;
    assert_eq!(got_len, payload.len());
    assert_eq!(c.read_slice(got_len).unwrap(), payload.as_slice());
}

/// Scenario 5: the server is silent on the first two datagrams and only
/// answers the third; the client must observe exactly two retransmissions
/// before the successful reply.
#[test]
fn scenario_udp_retry_exactly_two_retransmissions() {
    let fake = UdpSocket::bind("127.0.0.1:0").unwrap();
    let fake_addr = fake.local_addr().unwrap();

    let seen = Arc::new(Mutex::new(0u32));
    let seen_bg = Arc::clone(&seen);

    std::thread::spawn(move || {
        let mut buf = [0u8; 4096];
        loop {
            let (n, peer) = match fake.recv_from(&mut buf) {
                Ok(v) => v,
                Err(_) => return,
            };
            let mut count = seen_bg.lock().unwrap();
            *count += 1;
            if *count < 3 {
                continue;
            }

            let msg = RpcMessage::from_bytes(&buf[..n]).unwrap();
            let reply = RpcMessage::new(
                msg.xid(),
                MessageType::Reply(ReplyBody::Accepted(
                    onc_rpc_stack::message::AcceptedReply::new(
                        AuthFlavor::none(),
                        AcceptedStatus::Success(&[0, 0, 0, 1]),
                    ),
                )),
            );
            let _ = fake.send_to(&reply.serialise().unwrap(), peer);
            return;
        }
    });

    let mut client = UdpClient::connect(fake_addr, ECHO_PROGRAM, ECHO_VERSION).unwrap();
    client.set_retry_policy(RetryPolicy {
        attempts: 5,
        initial: Duration::from_millis(50),
        max: Duration::from_millis(200),
        doubling: true,
    });

    let call = client.call(ECHO_PROCEDURE, |_args| {}).unwrap();
    assert!(call.has_reply());

    // Give the fake server's send a moment to land before we check its count.
    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(*seen.lock().unwrap(), 3, "expected exactly two retransmissions");
}

/// Scenario 6: after two SET calls, DUMP returns exactly those two mappings
/// in insertion order.
#[test]
fn scenario_portmapper_dump_insertion_order() {
    use onc_rpc_stack::portmapper::{PortMapping, Protocol, TcpPortmapperClient};

    let mappings: Arc<Mutex<Vec<PortMapping>>> = Arc::new(Mutex::new(Vec::new()));

    let mut registry = ProcedureRegistry::new(PMAP_PROGRAM, PMAP_VERSION);

    let set_store = Arc::clone(&mappings);
    registry.register(1, move |c: &mut ByteCursor<'_>| {
        let program = c.read_u32::<BigEndian>()?;
        let version = c.read_u32::<BigEndian>()?;
        let protocol = match c.read_u32::<BigEndian>()? {
            6 => Protocol::Tcp,
            17 => Protocol::Udp,
            v => return Err(onc_rpc_stack::Error::InvalidProtocol(v)),
        };
        let port = c.read_u32::<BigEndian>()? as u16;
        set_store.lock().unwrap().push(PortMapping {
            program,
            version,
            protocol,
            port,
        });
        Ok(1u32.to_be_bytes().to_vec())
    });

    let dump_store = Arc::clone(&mappings);
    registry.register(4, move |_c: &mut ByteCursor<'_>| {
        let mut reply = Vec::new();
        for m in dump_store.lock().unwrap().iter() {
            reply.write_u32::<BigEndian>(1).unwrap();
            reply.write_u32::<BigEndian>(m.program).unwrap();
            reply.write_u32::<BigEndian>(m.version).unwrap();
            reply.write_u32::<BigEndian>(m.protocol.number()).unwrap();
            reply.write_u32::<BigEndian>(m.port as u32).unwrap();
        }
        reply.write_u32::<BigEndian>(0).unwrap();
        Ok(reply)
    });

    let server = TcpServer::bind("127.0.0.1:0", registry).unwrap();
    let addr = server.local_addr().unwrap();
    std::thread::spawn(move || {
        let _ = server.serve_forever();
    });

    let mut client = TcpPortmapperClient::connect(addr).unwrap();
    assert!(client.set(100003, 3, Protocol::Tcp, 2049).unwrap());
    assert!(client.set(100005, 1, Protocol::Udp, 635).unwrap());

    let dumped = client.dump().unwrap();
    assert_eq!(dumped.len(), 2);
    assert_eq!(dumped[0].program, 100003);
    assert_eq!(dumped[0].port, 2049);
    assert_eq!(dumped[1].program, 100005);
    assert_eq!(dumped[1].port, 635);
}

/// Scenario 7: forwarding a call through the proxy yields identical result
/// bytes to calling the upstream handler directly (modulo the xid used).
#[test]
fn scenario_proxy_transparency() {
    let upstream = TcpServer::bind("127.0.0.1:0", echo_registry()).unwrap();
    let upstream_addr = upstream.local_addr().unwrap();
    std::thread::spawn(move || {
        let _ = upstream.serve_forever();
    });

    // Baseline: call the upstream server directly.
    let mut direct = TcpClient::connect(upstream_addr, ECHO_PROGRAM, ECHO_VERSION).unwrap();
    let direct_call = direct
        .call(ECHO_PROCEDURE, |args| pack_string(args, "through the wire"))
        .unwrap();
    let direct_payload = match direct_call.reply_message().unwrap().reply_body().unwrap() {
        ReplyBody::Accepted(a) => match a.status() {
            AcceptedStatus::Success(p) => p.to_vec(),
            other => panic!("unexpected status: {other:?}"),
        },
        other => panic!("unexpected reply: {other:?}"),
    };

    // Now the same call, routed through the proxy.
    let proxy = Proxy::bind("127.0.0.1:0", upstream_addr).unwrap();
    let proxy_addr = proxy.local_addr().unwrap();
    std::thread::spawn(move || {
        let _ = proxy.serve_forever();
    });

    let mut via_proxy = TcpClient::connect(proxy_addr, ECHO_PROGRAM, ECHO_VERSION).unwrap();
    let proxied_call = via_proxy
        .call(ECHO_PROCEDURE, |args| pack_string(args, "through the wire"))
        .unwrap();
    let proxied_payload = match proxied_call.reply_message().unwrap().reply_body().unwrap() {
        ReplyBody::Accepted(a) => match a.status() {
            AcceptedStatus::Success(p) => p.to_vec(),
            other => panic!("unexpected status: {other:?}"),
        },
        other => panic!("unexpected reply: {other:?}"),
    };

    assert_eq!(direct_payload, proxied_payload);
}

/// Sanity check that [`UdpServer`] itself replies promptly (used as a
/// baseline contrast with the silent-then-answer fake server above).
#[test]
fn scenario_udp_server_replies_immediately() {
    let server = UdpServer::bind("127.0.0.1:0", echo_registry()).unwrap();
    let addr = server.local_addr().unwrap();
    std::thread::spawn(move || {
        let _ = server.serve_forever();
    });

    let mut client = UdpClient::connect(addr, ECHO_PROGRAM, ECHO_VERSION).unwrap();
    let call = client
        .call(ECHO_PROCEDURE, |args| pack_string(args, "udp"))
        .unwrap();
    let payload = match call.reply_message().unwrap().reply_body().unwrap() {
        ReplyBody::Accepted(a) => match a.status() {
            AcceptedStatus::Success(p) => p.to_vec(),
            other => panic!("unexpected status: {other:?}"),
        },
        other => panic!("unexpected reply: {other:?}"),
    };
    assert_eq!(unpack_string(&payload), "udp");
}
