//! # TenantDB Server
//!
//! Reference server for remote TenantDB connections.
//!
//! This crate provides:
//! - `Backend`, the shared store guarded by one mutex, with row locks and
//!   wait-for deadlock detection
//! - `Session`, the per-connection protocol handler with nested transaction
//!   undo logs and server-side cursors
//! - `DatabaseServer`, a blocking TCP accept loop with one thread per
//!   connection
//!
//! # Transactions
//!
//! Every write made inside a transaction records the prior state of the
//! entity in the undo log of the innermost level. Rolling a level back
//! restores those states; committing an inner level hands its log to the
//! enclosing one.
//!
//! Saves, deletes and `for_update` loads take the row lock of the entity.
//! Inside a transaction the lock is held until the outermost level ends, so
//! no other session can write a row whose prior state may still be restored.
//! Outside a transaction the lock is released as soon as the request is done.
//!
//! # Deadlocks
//!
//! When a lock request would wait on a session that (transitively) waits on
//! the requester, the requester loses: all of its levels are rolled back and
//! its locks are released. A load answers with the deadlock flag; a save or
//! delete answers with a `Deadlock` error.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod backend;
mod config;
mod cursor;
mod error;
mod server;
mod session;

pub use backend::{Backend, SessionId};
pub use config::ServerConfig;
pub use cursor::CursorTable;
pub use error::{ServerError, ServerResult};
pub use server::{DatabaseServer, ServerHandle};
pub use session::Session;
