use thiserror::Error as ThisError;

/// Error types returned by this crate.
#[non_exhaustive]
#[derive(Debug, ThisError, PartialEq)]
pub enum Error {
    /// The message header indicates the RPC message is longer than the amount
    /// of data in the buffer, or the buffer contains more than one message.
    ///
    /// This error may also be returned if the RPC message parsed from the
    /// buffer is unexpectedly shorter than the header length indicates - in
    /// this case, `buffer_len` will be more than `expected` and may indicate a
    /// parsing error.
    #[error("incomplete rpc message (got {buffer_len} bytes, expected {expected})")]
    IncompleteMessage {
        /// The length of the buffer provided.
        buffer_len: usize,

        /// The length expected for this message type.
        expected: usize,
    },

    /// The buffer is too small to contain the fragment header.
    #[error("incomplete fragment header")]
    IncompleteHeader,

    /// A fragment's declared length exceeds the bytes actually available on
    /// the transport, or the connection was closed mid-fragment.
    #[error("truncated fragment: wanted {wanted} bytes, connection yielded {got}")]
    TruncatedFragment {
        /// The number of bytes the fragment header declared.
        wanted: usize,
        /// The number of bytes actually read before the stream ended.
        got: usize,
    },

    /// The record-marking header on a stream transport was malformed.
    #[error("invalid record fragment framing")]
    InvalidFraming,

    /// The peer closed the connection.
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// No reply was received for a call within the retry budget.
    #[error("rpc call timed out")]
    Timeout,

    /// The message type in the RPC request is neither [`MessageType::Call`]
    /// or [`MessageType::Reply`].
    ///
    /// This is a violation of the protocol.
    ///
    /// [`MessageType::Call`]: crate::message::MessageType::Call
    /// [`MessageType::Reply`]: crate::message::MessageType::Reply
    #[error("invalid rpc message type {0}")]
    InvalidMessageType(u32),

    /// The message type in the RPC request is neither
    /// [`ReplyBody::Accepted`] or [`ReplyBody::Denied`].
    ///
    /// This is a violation of the protocol.
    ///
    /// [`ReplyBody::Accepted`]: crate::message::ReplyBody::Accepted
    /// [`ReplyBody::Denied`]: crate::message::ReplyBody::Denied
    #[error("invalid rpc reply type {0}")]
    InvalidReplyType(u32),

    /// The reply status code is not one of the specified
    /// [status codes](crate::message::AcceptedStatus).
    ///
    /// This is a violation of the protocol.
    #[error("invalid rpc reply status {0}")]
    InvalidReplyStatus(u32),

    /// The auth or verifier is invalid or malformed.
    #[error("invalid rpc auth data")]
    InvalidAuthData,

    /// The auth error code is not one of the specified
    /// [error codes](crate::message::AuthError).
    ///
    /// This is a violation of the protocol.
    #[error("invalid rpc auth error status {0}")]
    InvalidAuthError(u32),

    /// The rejected reply status code is not one of the specified
    /// [status codes](crate::message::RejectedReply).
    ///
    /// This is a violation of the protocol.
    #[error("invalid rpc rejected reply type {0}")]
    InvalidRejectedReplyType(u32),

    /// A variable length type has a malformed length value which would exceed
    /// the length of the buffer.
    #[error("invalid length in rpc message")]
    InvalidLength,

    /// The message contains an RPC protocol identifier that is not 2.
    #[error("invalid rpc version {0}, expected low={expected_low} high={expected_high}")]
    BadVersion {
        /// The version found on the wire.
        found: u32,
        /// Lowest version this peer accepts.
        expected_low: u32,
        /// Highest version this peer accepts.
        expected_high: u32,
    },

    /// The message does not follow the on-wire grammar (bad discriminator,
    /// truncated field, malformed length prefix).
    #[error("malformed rpc message: {0}")]
    BadFormat(String),

    /// A typed argument descriptor failed to decode its payload.
    #[error("failed to unpack argument: {0}")]
    UnpackError(String),

    /// The [machine name](crate::auth::AuthUnixParams::machine_name) contains
    /// non-UTF8 characters.
    #[error("invalid machine name: {0}")]
    InvalidMachineName(#[from] std::str::Utf8Error),

    /// No procedure handler is registered for the requested program number.
    #[error("unknown program {0}")]
    UnknownProgram(u32),

    /// The requested program is registered, but not at the requested version.
    #[error("program {program} version {requested} not supported (have {low}..={high})")]
    VersionMismatch {
        /// The program identifier.
        program: u32,
        /// The version the caller requested.
        requested: u32,
        /// Lowest version supported by the registered handler.
        low: u32,
        /// Highest version supported by the registered handler.
        high: u32,
    },

    /// The requested procedure number has no handler within the program.
    #[error("unknown procedure {procedure} for program {program}")]
    UnknownProcedure {
        /// The program identifier.
        program: u32,
        /// The procedure number that was not recognised.
        procedure: u32,
    },

    /// A handler did not consume the entire argument payload.
    #[error("garbage arguments: {unconsumed} trailing byte(s)")]
    GarbageArgs {
        /// The number of bytes left unconsumed in the argument cursor.
        unconsumed: usize,
    },

    /// Registering (or unregistering) a service with the portmapper failed.
    #[error("portmapper registration failed for program {program} version {version}")]
    RegisterFailed {
        /// The program identifier that could not be registered.
        program: u32,
        /// The version that could not be registered.
        version: u32,
    },

    /// An unsupported transport protocol number was supplied to the
    /// portmapper client.
    #[error("invalid transport protocol number {0}")]
    InvalidProtocol(u32),

    /// An I/O error occurred when trying to read or write the buffer or the
    /// underlying transport.
    #[error("i/o error ({0:?}): {1}")]
    IOError(std::io::ErrorKind, String),
}

impl From<std::io::Error> for Error {
    fn from(v: std::io::Error) -> Self {
        Self::IOError(v.kind(), v.to_string())
    }
}
