//! Local byte-stream transport toward the native engine.
//!
//! The native engine is reachable only through named local sockets, one
//! endpoint per channel per direction. This crate provides the raw
//! primitives everything else builds on:
//! - [`LocalEndpoint`]: bind + single blocking accept (rendezvous server)
//! - [`connect`] / [`connect_with_retry`]: outbound connection, the latter
//!   with the bounded retry-and-sleep policy the engine side expects
//! - [`LocalStream`]: a connected stream with timeouts and `shutdown`

pub mod error;
pub mod stream;
pub mod uds;

pub use error::{Result, TransportError};
pub use stream::LocalStream;
pub use uds::{connect, connect_with_retry, LocalEndpoint};
