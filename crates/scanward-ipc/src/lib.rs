//! Scanward IPC Protocol and Client/Server
//!
//! Request/response protocol for driving the scan daemon over a Unix socket,
//! plus the client used by the CLI and the server used by the daemon.

mod client;
mod error;
mod frame;
mod protocol;
mod server;

pub use client::{ConnectedClient, IpcClient};
pub use error::IpcError;
pub use protocol::*;
pub use server::{IpcServer, RequestHandler};
