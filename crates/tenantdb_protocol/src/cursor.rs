//! Cursor kinds.

use crate::messages::{Batch, CursorRef, MessageType, ProtocolMessage};
use tenantdb_core::{Entity, PrincipalId};

/// Binds a cursor kind to its item type and message channel.
///
/// Owner and query cursors share one state machine but travel on disjoint
/// message types; implementing this trait is the only way to get a batch in
/// or out of a message, so kinds cannot be cross-wired.
pub trait CursorKind {
    /// Item carried in batches.
    type Item;

    /// Human-readable kind name, for logs.
    const NAME: &'static str;
    /// Message carrying a batch.
    const BATCH: MessageType;
    /// Message requesting the next batch.
    const PULL: MessageType;
    /// Message abandoning the cursor.
    const CLOSE: MessageType;

    /// Wraps a batch.
    fn batch_message(batch: Batch<Self::Item>) -> ProtocolMessage;

    /// Builds a pull request.
    fn pull_message(cursor: CursorRef) -> ProtocolMessage;

    /// Builds a close request.
    fn close_message(cursor: CursorRef) -> ProtocolMessage;

    /// Extracts a batch, handing back any other message untouched.
    fn into_batch(message: ProtocolMessage) -> Result<Batch<Self::Item>, ProtocolMessage>;
}

/// Cursor over the owners of one entity.
#[derive(Debug, Clone, Copy)]
pub enum OwnerCursor {}

impl CursorKind for OwnerCursor {
    type Item = PrincipalId;

    const NAME: &'static str = "owners";
    const BATCH: MessageType = MessageType::OwnerBatch;
    const PULL: MessageType = MessageType::PullOwnerBatch;
    const CLOSE: MessageType = MessageType::CloseOwnerCursor;

    fn batch_message(batch: Batch<PrincipalId>) -> ProtocolMessage {
        ProtocolMessage::OwnerBatch(batch)
    }

    fn pull_message(cursor: CursorRef) -> ProtocolMessage {
        ProtocolMessage::PullOwnerBatch(cursor)
    }

    fn close_message(cursor: CursorRef) -> ProtocolMessage {
        ProtocolMessage::CloseOwnerCursor(cursor)
    }

    fn into_batch(message: ProtocolMessage) -> Result<Batch<PrincipalId>, ProtocolMessage> {
        match message {
            ProtocolMessage::OwnerBatch(batch) => Ok(batch),
            other => Err(other),
        }
    }
}

/// Cursor over query results.
#[derive(Debug, Clone, Copy)]
pub enum QueryCursor {}

impl CursorKind for QueryCursor {
    type Item = Entity;

    const NAME: &'static str = "query";
    const BATCH: MessageType = MessageType::QueryBatch;
    const PULL: MessageType = MessageType::PullQueryBatch;
    const CLOSE: MessageType = MessageType::CloseQueryCursor;

    fn batch_message(batch: Batch<Entity>) -> ProtocolMessage {
        ProtocolMessage::QueryBatch(batch)
    }

    fn pull_message(cursor: CursorRef) -> ProtocolMessage {
        ProtocolMessage::PullQueryBatch(cursor)
    }

    fn close_message(cursor: CursorRef) -> ProtocolMessage {
        ProtocolMessage::CloseQueryCursor(cursor)
    }

    fn into_batch(message: ProtocolMessage) -> Result<Batch<Entity>, ProtocolMessage> {
        match message {
            ProtocolMessage::QueryBatch(batch) => Ok(batch),
            other => Err(other),
        }
    }
}
