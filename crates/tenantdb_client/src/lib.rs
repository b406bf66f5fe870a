//! # TenantDB Client
//!
//! Remote implementation of the `EntityDatabase` contract.
//!
//! This crate provides:
//! - `Connection`, the request/response seam, with TCP and loopback
//!   implementations
//! - `DatabaseClient`, which authenticates a context and maps every
//!   `EntityDatabase` operation onto protocol messages
//! - `RemoteCursor`, a lazily advancing cursor over owner ids or query
//!   results
//!
//! ## Cursors
//!
//! A cursor borrows the client's connection mutably, so no other request can
//! be interleaved while it is alive. Stop early by calling
//! [`RemoteCursor::close`]; dropping an active cursor closes it as well.
//!
//! ## Deadlocks
//!
//! When the server refuses a `for_update` load, a save or a delete to break
//! a lock cycle, it has already rolled back every open level of this
//! connection. The client resets its own depth to zero and returns
//! `CoreError::Deadlock`.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod client;
mod config;
mod connection;
mod cursor;

pub use client::DatabaseClient;
pub use config::ClientConfig;
pub use connection::{Connection, LoopbackConnection, TcpConnection};
pub use cursor::{CursorState, RemoteCursor};
pub use tenantdb_protocol::ContextType;
