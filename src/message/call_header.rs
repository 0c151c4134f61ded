use std::convert::TryFrom;
use std::io::Write;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::auth::AuthFlavor;
use crate::xdr::ByteCursor;
use crate::Error;

const RPC_VERSION: u32 = 2;

/// A request invoking an RPC.
///
/// This is the Rust equivalent of the `call_body` structure defined in the
/// [RFC](https://tools.ietf.org/html/rfc5531#section-9). The `rpcvers` field
/// is hard coded to `2` - this crate implements ONC RPC version 2 only.
#[derive(Debug, PartialEq)]
pub struct CallHeader<'a> {
    program: u32,
    program_version: u32,
    procedure: u32,

    auth_credentials: AuthFlavor<&'a [u8]>,
    auth_verifier: AuthFlavor<&'a [u8]>,

    payload: &'a [u8],
}

impl<'a> CallHeader<'a> {
    /// Constructs a new `CallHeader` by parsing the wire format read from `r`.
    ///
    /// `from_cursor` advances the position of `r` to the end of the
    /// `CallHeader` structure; any bytes remaining in `r` are the opaque
    /// argument payload.
    pub(crate) fn from_cursor(r: &mut ByteCursor<'a>) -> Result<Self, Error> {
        let rpc_version = r.read_u32::<BigEndian>()?;
        if rpc_version != RPC_VERSION {
            return Err(Error::BadVersion {
                found: rpc_version,
                expected_low: RPC_VERSION,
                expected_high: RPC_VERSION,
            });
        }

        let program = r.read_u32::<BigEndian>()?;
        let program_version = r.read_u32::<BigEndian>()?;
        let procedure = r.read_u32::<BigEndian>()?;
        let auth_credentials = AuthFlavor::from_cursor(r)?;
        let auth_verifier = AuthFlavor::from_cursor(r)?;

        let payload = r.remaining_slice();
        r.set_position(r.len());

        Ok(CallHeader {
            program,
            program_version,
            procedure,
            auth_credentials,
            auth_verifier,
            payload,
        })
    }

    /// Construct a new RPC invocation request.
    pub fn new(
        program: u32,
        program_version: u32,
        procedure: u32,
        auth_credentials: AuthFlavor<&'a [u8]>,
        auth_verifier: AuthFlavor<&'a [u8]>,
        payload: &'a [u8],
    ) -> Self {
        CallHeader {
            program,
            program_version,
            procedure,
            auth_credentials,
            auth_verifier,
            payload,
        }
    }

    /// Serialises this `CallHeader` into `buf`, advancing the cursor position
    /// by [`serialised_len`](CallHeader::serialised_len) bytes.
    pub fn serialise_into<W: Write>(&self, mut buf: W) -> Result<(), std::io::Error> {
        buf.write_u32::<BigEndian>(RPC_VERSION)?;
        buf.write_u32::<BigEndian>(self.program)?;
        buf.write_u32::<BigEndian>(self.program_version)?;
        buf.write_u32::<BigEndian>(self.procedure)?;

        self.auth_credentials.serialise_into(&mut buf)?;
        self.auth_verifier.serialise_into(&mut buf)?;

        buf.write_all(self.payload)
    }

    /// Returns the on-wire length of this call body once serialised.
    pub fn serialised_len(&self) -> u32 {
        let mut l = std::mem::size_of::<u32>() * 4;

        l += self.auth_credentials.serialised_len() as usize;
        l += self.auth_verifier.serialised_len() as usize;
        l += self.payload.len();

        l as u32
    }

    /// Returns the RPC version of this request.
    ///
    /// This crate supports ONC RPC version 2 only.
    pub fn rpc_version(&self) -> u32 {
        RPC_VERSION
    }

    /// Returns the program identifier in this request.
    pub fn program(&self) -> u32 {
        self.program
    }

    /// The version of the program to be invoked.
    pub fn program_version(&self) -> u32 {
        self.program_version
    }

    /// The program procedure number identifying the RPC to invoke.
    pub fn procedure(&self) -> u32 {
        self.procedure
    }

    /// The credentials to use for authenticating the request.
    pub fn auth_credentials(&self) -> &AuthFlavor<&'a [u8]> {
        &self.auth_credentials
    }

    /// The verifier that should be used to validate the authentication
    /// credentials.
    pub fn auth_verifier(&self) -> &AuthFlavor<&'a [u8]> {
        &self.auth_verifier
    }

    /// Returns a reference to the opaque message payload bytes.
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }
}

impl<'a> TryFrom<&'a [u8]> for CallHeader<'a> {
    type Error = Error;

    fn try_from(v: &'a [u8]) -> Result<Self, Self::Error> {
        let mut c = ByteCursor::new(v);
        CallHeader::from_cursor(&mut c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let payload = [1, 2, 3, 4];
        let call = CallHeader::new(
            100003,
            3,
            0,
            AuthFlavor::none(),
            AuthFlavor::none(),
            &payload,
        );

        let mut buf = Vec::new();
        call.serialise_into(&mut buf).unwrap();
        assert_eq!(buf.len(), call.serialised_len() as usize);

        let got = CallHeader::try_from(buf.as_slice()).unwrap();
        assert_eq!(got, call);
    }

    #[test]
    fn test_bad_version() {
        let mut buf = Vec::new();
        buf.write_u32::<BigEndian>(4).unwrap();
        let err = CallHeader::try_from(buf.as_slice()).unwrap_err();
        assert!(matches!(err, Error::BadVersion { found: 4, .. }));
    }
}
