//! Types implementing the Open Network Computing RPC message grammar defined
//! in [RFC 5531](https://tools.ietf.org/html/rfc5531#section-9).

mod call_header;
mod reply_header;
mod rpc_message;

pub use call_header::CallHeader;
pub use reply_header::{AcceptedReply, AcceptedStatus, AuthError, RejectedReply, ReplyBody};
pub use rpc_message::{expected_message_len, MessageType, RpcMessage};
