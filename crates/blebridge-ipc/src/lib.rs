//! IPC toward the native engine.
//!
//! The engine exposes three logical channels over named local sockets:
//! outbound data, inbound data, and outbound control. This crate owns
//! them as one unit: [`SocketSender`] / [`SocketReceiver`] wrap a single
//! channel each, and [`NativeAdapter`] serializes every connect, read
//! registration and write against all three onto one worker thread with
//! a strictly ordered op queue, so no two socket operations ever race.

pub mod adapter;
pub mod error;
pub mod receiver;
pub mod sender;

pub use adapter::{AdapterConfig, AdapterEvent, AdapterHandle, NativeAdapter};
pub use error::{IpcError, Result};
pub use receiver::SocketReceiver;
pub use sender::SocketSender;
