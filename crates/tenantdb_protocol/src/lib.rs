//! # TenantDB Protocol
//!
//! Wire protocol spoken between a TenantDB client and server.
//!
//! This crate provides:
//! - `MessageType` codes and the `ProtocolMessage` enum
//! - Request/response payloads, CBOR-encoded with `ciborium`
//! - Length-prefixed framing over any `Read`/`Write`
//! - `CursorKind`, tying each cursor kind to its message codes
//! - `MessageHandler`, the seam between a connection and whatever serves it
//!
//! This is a pure protocol crate; it performs I/O only on the readers and
//! writers handed to it.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod codec;
mod cursor;
mod error;
mod handler;
mod messages;

pub use codec::{decode_frame, encode_frame, read_frame, write_frame, FRAME_HEADER_LEN, MAX_FRAME_SIZE};
pub use cursor::{CursorKind, OwnerCursor, QueryCursor};
pub use error::{ProtocolError, ProtocolResult};
pub use handler::MessageHandler;
pub use messages::{
    AuthenticateAck, AuthenticateContext, Batch, ContextType, CursorRef, DeleteEntity,
    DeleteEntityResult, ErrorKind, ErrorResponse, IsEntityOwner, IsEntityOwnerResult, LoadEntity,
    LoadEntityResult, MessageType, ProtocolMessage, SaveEntity, SaveEntityAck, StartOwnerCursor,
    StartQueryCursor, TransactionAck,
};
