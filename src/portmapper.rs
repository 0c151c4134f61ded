//! A client for the ONC RPC portmapper (`rpcbind`), program 100000 version 2,
//! [RFC 1833](https://tools.ietf.org/html/rfc1833).
//!
//! Only the subset of procedures in common use are implemented: `SET`,
//! `UNSET`, `GETPORT`, `DUMP` and `CALLIT`. The legacy `GETADDR`/`TASKADDR`
//! callback-style procedures from later `rpcbind` versions are out of scope.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::client::{TcpClient, UdpClient};
use crate::xdr::ByteCursor;
use crate::Error;

/// The well known portmapper program number.
pub const PMAP_PROGRAM: u32 = 100000;
/// The only portmapper version this crate implements.
pub const PMAP_VERSION: u32 = 2;
/// The well known port portmapper/`rpcbind` listens on.
pub const PMAP_PORT: u16 = 111;

pub(crate) const PMAPPROC_NULL: u32 = 0;
pub(crate) const PMAPPROC_SET: u32 = 1;
pub(crate) const PMAPPROC_UNSET: u32 = 2;
pub(crate) const PMAPPROC_GETPORT: u32 = 3;
pub(crate) const PMAPPROC_DUMP: u32 = 4;
pub(crate) const PMAPPROC_CALLIT: u32 = 5;

/// The transport protocol a portmapper mapping applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// `IPPROTO_TCP`.
    Tcp,
    /// `IPPROTO_UDP`.
    Udp,
}

impl Protocol {
    /// Returns the on-wire protocol number for this transport.
    pub fn number(self) -> u32 {
        match self {
            Self::Tcp => 6,
            Self::Udp => 17,
        }
    }

    pub(crate) fn from_number(v: u32) -> Result<Self, Error> {
        match v {
            6 => Ok(Self::Tcp),
            17 => Ok(Self::Udp),
            v => Err(Error::InvalidProtocol(v)),
        }
    }
}

/// A single `(program, version, protocol, port)` registration as returned by
/// [`PortmapperClient::dump`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    /// The registered program number.
    pub program: u32,
    /// The registered program version.
    pub version: u32,
    /// The transport the registration applies to.
    pub protocol: Protocol,
    /// The port the program is listening on.
    pub port: u16,
}

fn unpack_mapping(c: &mut ByteCursor<'_>) -> Result<PortMapping, Error> {
    Ok(PortMapping {
        program: c.read_u32::<BigEndian>()?,
        version: c.read_u32::<BigEndian>()?,
        protocol: Protocol::from_number(c.read_u32::<BigEndian>()?)?,
        port: c.read_u32::<BigEndian>()? as u16,
    })
}

/// Extracts `bool` replies produced by `SET`/`UNSET`, which XDR encodes as a
/// 4-byte `0`/`1` value.
fn unpack_bool(payload: &[u8]) -> Result<bool, Error> {
    let mut c = ByteCursor::new(payload);
    Ok(c.read_u32::<BigEndian>()? != 0)
}

fn accepted_payload<'a>(reply: &'a crate::message::RpcMessage<'a>) -> Result<&'a [u8], Error> {
    use crate::message::{AcceptedStatus, ReplyBody};

    match reply.reply_body() {
        Some(ReplyBody::Accepted(a)) => match a.status() {
            AcceptedStatus::Success(p) => Ok(p),
            _ => Err(Error::BadFormat("portmapper call was not accepted".into())),
        },
        _ => Err(Error::BadFormat("portmapper reply was denied".into())),
    }
}

/// A portmapper client over TCP.
#[derive(Debug)]
pub struct TcpPortmapperClient {
    inner: TcpClient,
}

impl TcpPortmapperClient {
    /// Connects to the portmapper listening at `addr`.
    pub fn connect<A: std::net::ToSocketAddrs>(addr: A) -> Result<Self, Error> {
        Ok(Self {
            inner: TcpClient::connect(addr, PMAP_PROGRAM, PMAP_VERSION)?,
        })
    }

    /// Registers `(program, version, protocol, port)` with the portmapper.
    pub fn set(
        &mut self,
        program: u32,
        version: u32,
        protocol: Protocol,
        port: u16,
    ) -> Result<bool, Error> {
        let call = self.inner.call(PMAPPROC_SET, |args| {
            let _ = args.write_u32::<BigEndian>(program);
            let _ = args.write_u32::<BigEndian>(version);
            let _ = args.write_u32::<BigEndian>(protocol.number());
            let _ = args.write_u32::<BigEndian>(port as u32);
        })?;
        unpack_bool(accepted_payload(&call.reply_message().unwrap())?)
    }

    /// Removes any registration(s) for `(program, version)`.
    pub fn unset(
        &mut self,
        program: u32,
        version: u32,
        protocol: Protocol,
        port: u16,
    ) -> Result<bool, Error> {
        let call = self.inner.call(PMAPPROC_UNSET, |args| {
            let _ = args.write_u32::<BigEndian>(program);
            let _ = args.write_u32::<BigEndian>(version);
            let _ = args.write_u32::<BigEndian>(protocol.number());
            let _ = args.write_u32::<BigEndian>(port as u32);
        })?;
        unpack_bool(accepted_payload(&call.reply_message().unwrap())?)
    }

    /// Looks up the port `(program, version)` is registered on for
    /// `protocol`. Returns port `0` if no such registration exists.
    pub fn get_port(
        &mut self,
        program: u32,
        version: u32,
        protocol: Protocol,
    ) -> Result<u16, Error> {
        let call = self.inner.call(PMAPPROC_GETPORT, |args| {
            let _ = args.write_u32::<BigEndian>(program);
            let _ = args.write_u32::<BigEndian>(version);
            let _ = args.write_u32::<BigEndian>(protocol.number());
            let _ = args.write_u32::<BigEndian>(0);
        })?;
        let mut c = ByteCursor::new(accepted_payload(&call.reply_message().unwrap())?);
        Ok(c.read_u32::<BigEndian>()? as u16)
    }

    /// Lists every mapping currently registered with the portmapper.
    pub fn dump(&mut self) -> Result<Vec<PortMapping>, Error> {
        let call = self.inner.call(PMAPPROC_DUMP, |_args| {})?;
        let mut c = ByteCursor::new(accepted_payload(&call.reply_message().unwrap())?);

        let mut mappings = Vec::new();
        while c.read_u32::<BigEndian>()? != 0 {
            mappings.push(unpack_mapping(&mut c)?);
        }
        Ok(mappings)
    }

    /// Invokes the `NULL` procedure, a no-op liveness check.
    pub fn ping(&mut self) -> Result<(), Error> {
        self.inner.call(PMAPPROC_NULL, |_args| {})?;
        Ok(())
    }
}

/// A portmapper client over UDP.
#[derive(Debug)]
pub struct UdpPortmapperClient {
    inner: UdpClient,
}

impl UdpPortmapperClient {
    /// Connects to the portmapper listening at `addr`.
    pub fn connect<A: std::net::ToSocketAddrs>(addr: A) -> Result<Self, Error> {
        Ok(Self {
            inner: UdpClient::connect(addr, PMAP_PROGRAM, PMAP_VERSION)?,
        })
    }

    /// Registers `(program, version, protocol, port)` with the portmapper.
    pub fn set(
        &mut self,
        program: u32,
        version: u32,
        protocol: Protocol,
        port: u16,
    ) -> Result<bool, Error> {
        let call = self.inner.call(PMAPPROC_SET, |args| {
            let _ = args.write_u32::<BigEndian>(program);
            let _ = args.write_u32::<BigEndian>(version);
            let _ = args.write_u32::<BigEndian>(protocol.number());
            let _ = args.write_u32::<BigEndian>(port as u32);
        })?;
        unpack_bool(accepted_payload(&call.reply_message().unwrap())?)
    }

    /// Removes any registration(s) for `(program, version)`.
    pub fn unset(
        &mut self,
        program: u32,
        version: u32,
        protocol: Protocol,
        port: u16,
    ) -> Result<bool, Error> {
        let call = self.inner.call(PMAPPROC_UNSET, |args| {
            let _ = args.write_u32::<BigEndian>(program);
            let _ = args.write_u32::<BigEndian>(version);
            let _ = args.write_u32::<BigEndian>(protocol.number());
            let _ = args.write_u32::<BigEndian>(port as u32);
        })?;
        unpack_bool(accepted_payload(&call.reply_message().unwrap())?)
    }

    /// Looks up the port `(program, version)` is registered on for
    /// `protocol`. Returns port `0` if no such registration exists.
    pub fn get_port(
        &mut self,
        program: u32,
        version: u32,
        protocol: Protocol,
    ) -> Result<u16, Error> {
        let call = self.inner.call(PMAPPROC_GETPORT, |args| {
            let _ = args.write_u32::<BigEndian>(program);
            let _ = args.write_u32::<BigEndian>(version);
            let _ = args.write_u32::<BigEndian>(protocol.number());
            let _ = args.write_u32::<BigEndian>(0);
        })?;
        let mut c = ByteCursor::new(accepted_payload(&call.reply_message().unwrap())?);
        Ok(c.read_u32::<BigEndian>()? as u16)
    }

    /// Lists every mapping currently registered with the portmapper.
    pub fn dump(&mut self) -> Result<Vec<PortMapping>, Error> {
        let call = self.inner.call(PMAPPROC_DUMP, |_args| {})?;
        let mut c = ByteCursor::new(accepted_payload(&call.reply_message().unwrap())?);

        let mut mappings = Vec::new();
        while c.read_u32::<BigEndian>()? != 0 {
            mappings.push(unpack_mapping(&mut c)?);
        }
        Ok(mappings)
    }

    /// Allows the underlying [`UdpClient`] to receive replies from an
    /// address other than the one a request was sent to - required to
    /// observe `CALLIT` replies, which arrive from the target service's own
    /// port rather than the portmapper's.
    pub fn enable_broadcast(&mut self) -> Result<(), Error> {
        self.inner.enable_broadcast()
    }

    /// Tunnels an RPC call to `(program, version, procedure)` through the
    /// portmapper's `CALLIT` facility, without contacting the target service
    /// directly.
    ///
    /// `rpcbind` implementations commonly disable `CALLIT` by default.
    pub fn callit(
        &mut self,
        program: u32,
        version: u32,
        procedure: u32,
        args: &[u8],
    ) -> Result<(u16, Vec<u8>), Error> {
        let call = self.inner.call(PMAPPROC_CALLIT, |buf| {
            use std::io::Write;
            let _ = buf.write_u32::<BigEndian>(program);
            let _ = buf.write_u32::<BigEndian>(version);
            let _ = buf.write_u32::<BigEndian>(procedure);
            let _ = buf.write_u32::<BigEndian>(args.len() as u32);
            let _ = buf.write_all(args);
            let pad = crate::xdr::pad_length(args.len() as u32);
            let _ = buf.write_all(&[0u8; 3][..pad as usize]);
        })?;

        let mut c = ByteCursor::new(accepted_payload(&call.reply_message().unwrap())?);
        let port = c.read_u32::<BigEndian>()? as u16;
        let len = c.read_u32::<BigEndian>()? as usize;
        let result = c.read_slice(len)?.to_vec();
        Ok((port, result))
    }
}
