//! Open Network Computing (Sun) RPC version 2 - [RFC
//! 5531](https://tools.ietf.org/html/rfc5531).
//!
//! This crate provides the XDR wire codec, typed argument descriptors, RPC
//! message framing, record-marked stream transport, blocking and cooperative
//! client/server implementations, a portmapper client, and a header-rewriting
//! proxy.

#![deny(rustdoc::broken_intra_doc_links, rust_2018_idioms)]
#![warn(
    clippy::clone_on_ref_ptr,
    clippy::dbg_macro,
    clippy::explicit_iter_loop,
    clippy::future_not_send,
    clippy::todo,
    clippy::unimplemented,
    clippy::use_self,
    clippy::doc_markdown,
    clippy::print_stdout,
    missing_debug_implementations,
    unreachable_pub,
    missing_docs
)]

mod error;
pub use error::Error;

mod opaque;
pub(crate) use opaque::Opaque;

pub mod xdr;
pub use xdr::{ByteBuffer, ByteCursor};

pub mod auth;
pub mod message;

pub mod descriptor;
pub use descriptor::{TypeDescriptor, Value};

pub mod framing;

#[cfg(feature = "cooperative")]
pub mod framing_async;

pub mod retry;
pub use retry::RetryPolicy;

mod call;
pub use call::Call;

pub mod client;
pub mod portmapper;
pub mod server;
pub mod proxy;
