//! Protocol messages.

use crate::error::{ProtocolError, ProtocolResult};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tenantdb_core::{CoreError, Entity, EntityId, LockType, PrincipalId, Query};

/// Type code of a message, carried in every frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum MessageType {
    /// Client announces its execution context.
    AuthenticateContext = 101,
    /// Server accepts the context.
    AuthenticateAck = 102,
    /// Client ends the session. No response.
    ExitContext = 104,
    /// Save an entity.
    SaveEntity = 201,
    /// Result of a save.
    SaveEntityAck = 202,
    /// Load an entity, optionally locking it.
    LoadEntity = 203,
    /// Result of a load.
    LoadEntityResult = 204,
    /// Start enumerating owners.
    StartOwnerCursor = 205,
    /// A batch of owners.
    OwnerBatch = 206,
    /// Request the next batch of owners.
    PullOwnerBatch = 207,
    /// Abandon an owner cursor. No response.
    CloseOwnerCursor = 208,
    /// Delete an entity.
    DeleteEntity = 209,
    /// Result of a delete.
    DeleteEntityResult = 210,
    /// Ask whether a principal owns an entity.
    IsEntityOwner = 211,
    /// Result of an ownership check.
    IsEntityOwnerResult = 212,
    /// Start a query.
    StartQueryCursor = 213,
    /// A batch of query results.
    QueryBatch = 214,
    /// Request the next batch of query results.
    PullQueryBatch = 215,
    /// Abandon a query cursor. No response.
    CloseQueryCursor = 216,
    /// Open a transaction level.
    StartTransaction = 301,
    /// Commit the innermost level.
    CommitTransaction = 302,
    /// Roll back the innermost level.
    RollbackTransaction = 303,
    /// Transaction depth after a transaction request.
    TransactionAck = 304,
    /// A request failed.
    Error = 900,
}

impl MessageType {
    /// Numeric code.
    #[must_use]
    pub const fn code(self) -> u16 {
        self as u16
    }

    /// Looks up a type by code.
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        Some(match code {
            101 => Self::AuthenticateContext,
            102 => Self::AuthenticateAck,
            104 => Self::ExitContext,
            201 => Self::SaveEntity,
            202 => Self::SaveEntityAck,
            203 => Self::LoadEntity,
            204 => Self::LoadEntityResult,
            205 => Self::StartOwnerCursor,
            206 => Self::OwnerBatch,
            207 => Self::PullOwnerBatch,
            208 => Self::CloseOwnerCursor,
            209 => Self::DeleteEntity,
            210 => Self::DeleteEntityResult,
            211 => Self::IsEntityOwner,
            212 => Self::IsEntityOwnerResult,
            213 => Self::StartQueryCursor,
            214 => Self::QueryBatch,
            215 => Self::PullQueryBatch,
            216 => Self::CloseQueryCursor,
            301 => Self::StartTransaction,
            302 => Self::CommitTransaction,
            303 => Self::RollbackTransaction,
            304 => Self::TransactionAck,
            900 => Self::Error,
            _ => return None,
        })
    }

    /// Returns true if the server sends no response to this message.
    #[must_use]
    pub const fn is_one_way(self) -> bool {
        matches!(
            self,
            Self::ExitContext | Self::CloseOwnerCursor | Self::CloseQueryCursor
        )
    }
}

/// Kind of execution context a connection runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextType {
    /// Trusted backend code; entity access allowed.
    Backend,
    /// Client-side code; every entity request is refused.
    Client,
}

/// Opens a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticateContext {
    /// Context kind.
    pub context_type: ContextType,
    /// Identifier of the execution, for logging.
    pub execution_id: String,
}

impl AuthenticateContext {
    /// Creates a backend context request.
    pub fn backend(execution_id: impl Into<String>) -> Self {
        Self {
            context_type: ContextType::Backend,
            execution_id: execution_id.into(),
        }
    }
}

/// Session accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticateAck {
    /// Server-assigned session number.
    pub session_id: u64,
}

/// Save request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaveEntity {
    /// Entity to save; its owner delta is applied if the set is incomplete.
    pub entity: Entity,
}

/// Save result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveEntityAck {
    /// Id of the saved entity.
    pub entity_id: EntityId,
    /// Insert timestamp.
    pub created_at: DateTime<Utc>,
    /// Save timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Load request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadEntity {
    /// Entity to load.
    pub entity_id: EntityId,
    /// Lock to acquire.
    #[serde(default)]
    pub lock_type: Option<LockType>,
}

/// Load result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadEntityResult {
    /// The entity, if it exists.
    pub entity: Option<Entity>,
    /// The lock request closed a wait cycle; every transaction level was
    /// rolled back and `entity` is `None`.
    #[serde(default)]
    pub deadlock: bool,
}

impl LoadEntityResult {
    /// A successful load.
    #[must_use]
    pub fn found(entity: Option<Entity>) -> Self {
        Self {
            entity,
            deadlock: false,
        }
    }

    /// A load that lost a deadlock.
    #[must_use]
    pub fn deadlock() -> Self {
        Self {
            entity: None,
            deadlock: true,
        }
    }
}

/// Start of an owner enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOwnerCursor {
    /// Entity whose owners are enumerated.
    pub entity_id: EntityId,
}

/// Start of a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartQueryCursor {
    /// Query to run.
    pub query: Query,
}

/// Reference to an open cursor, used by pull and close messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorRef {
    /// Cursor id.
    pub cursor_id: u64,
}

/// One batch of cursor items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch<T> {
    /// Cursor id; `None` when the first batch is already final.
    pub cursor_id: Option<u64>,
    /// Items in this batch.
    pub items: Vec<T>,
    /// No further batches follow; the cursor is closed on the server.
    pub is_final: bool,
}

impl<T> Batch<T> {
    /// A batch that ends the cursor.
    #[must_use]
    pub fn last(cursor_id: Option<u64>, items: Vec<T>) -> Self {
        Self {
            cursor_id,
            items,
            is_final: true,
        }
    }

    /// A batch with more to come.
    #[must_use]
    pub fn more(cursor_id: u64, items: Vec<T>) -> Self {
        Self {
            cursor_id: Some(cursor_id),
            items,
            is_final: false,
        }
    }
}

/// Delete request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteEntity {
    /// Entity to delete.
    pub entity_id: EntityId,
}

/// Delete result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteEntityResult {
    /// Whether the entity existed.
    pub deleted: bool,
}

/// Ownership check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsEntityOwner {
    /// Entity to check.
    pub entity_id: EntityId,
    /// Candidate owner.
    pub principal_id: PrincipalId,
}

/// Ownership check result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsEntityOwnerResult {
    /// Whether the principal owns the entity.
    pub is_owner: bool,
}

/// Transaction depth after start, commit or rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionAck {
    /// Depth on the server.
    pub level: u64,
}

/// Category of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// An argument was rejected.
    InvalidArgument,
    /// The query was malformed.
    InvalidQuery,
    /// The cursor was already closed.
    CursorClosed,
    /// The session may not access entities.
    Forbidden,
    /// The session has not authenticated.
    NotAuthenticated,
    /// A lock cycle was broken by failing this request.
    Deadlock,
    /// The request was not valid in the session's state.
    InvalidOperation,
    /// Anything else.
    Internal,
}

/// Failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Category.
    pub kind: ErrorKind,
    /// Human-readable description.
    pub message: String,
    /// Cursor involved, for `CursorClosed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor_id: Option<u64>,
}

impl ErrorResponse {
    /// Creates an error response.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cursor_id: None,
        }
    }

    /// Describes a core error for the wire.
    #[must_use]
    pub fn from_core(err: &CoreError) -> Self {
        let kind = match err {
            CoreError::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            CoreError::InvalidQuery { .. } => ErrorKind::InvalidQuery,
            CoreError::CursorClosed { .. } => ErrorKind::CursorClosed,
            CoreError::Forbidden => ErrorKind::Forbidden,
            CoreError::NotAuthenticated => ErrorKind::NotAuthenticated,
            CoreError::Deadlock => ErrorKind::Deadlock,
            CoreError::InvalidOperation { .. } => ErrorKind::InvalidOperation,
            _ => ErrorKind::Internal,
        };
        let message = match err {
            CoreError::InvalidArgument { message }
            | CoreError::InvalidQuery { message }
            | CoreError::InvalidOperation { message } => message.clone(),
            other => other.to_string(),
        };
        Self {
            kind,
            message,
            cursor_id: match err {
                CoreError::CursorClosed { cursor_id } => Some(*cursor_id),
                _ => None,
            },
        }
    }

    /// Rebuilds the core error this response describes.
    #[must_use]
    pub fn into_core(self) -> CoreError {
        match self.kind {
            ErrorKind::InvalidArgument => CoreError::invalid_argument(self.message),
            ErrorKind::InvalidQuery => CoreError::invalid_query(self.message),
            ErrorKind::CursorClosed => CoreError::CursorClosed {
                cursor_id: self.cursor_id.unwrap_or_default(),
            },
            ErrorKind::Forbidden => CoreError::Forbidden,
            ErrorKind::NotAuthenticated => CoreError::NotAuthenticated,
            ErrorKind::Deadlock => CoreError::Deadlock,
            ErrorKind::InvalidOperation => CoreError::invalid_operation(self.message),
            ErrorKind::Internal => CoreError::protocol(format!("server error: {}", self.message)),
        }
    }
}

/// A protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolMessage {
    /// See [`MessageType::AuthenticateContext`].
    AuthenticateContext(AuthenticateContext),
    /// See [`MessageType::AuthenticateAck`].
    AuthenticateAck(AuthenticateAck),
    /// See [`MessageType::ExitContext`].
    ExitContext,
    /// See [`MessageType::SaveEntity`].
    SaveEntity(SaveEntity),
    /// See [`MessageType::SaveEntityAck`].
    SaveEntityAck(SaveEntityAck),
    /// See [`MessageType::LoadEntity`].
    LoadEntity(LoadEntity),
    /// See [`MessageType::LoadEntityResult`].
    LoadEntityResult(LoadEntityResult),
    /// See [`MessageType::StartOwnerCursor`].
    StartOwnerCursor(StartOwnerCursor),
    /// See [`MessageType::OwnerBatch`].
    OwnerBatch(Batch<PrincipalId>),
    /// See [`MessageType::PullOwnerBatch`].
    PullOwnerBatch(CursorRef),
    /// See [`MessageType::CloseOwnerCursor`].
    CloseOwnerCursor(CursorRef),
    /// See [`MessageType::DeleteEntity`].
    DeleteEntity(DeleteEntity),
    /// See [`MessageType::DeleteEntityResult`].
    DeleteEntityResult(DeleteEntityResult),
    /// See [`MessageType::IsEntityOwner`].
    IsEntityOwner(IsEntityOwner),
    /// See [`MessageType::IsEntityOwnerResult`].
    IsEntityOwnerResult(IsEntityOwnerResult),
    /// See [`MessageType::StartQueryCursor`].
    StartQueryCursor(StartQueryCursor),
    /// See [`MessageType::QueryBatch`].
    QueryBatch(Batch<Entity>),
    /// See [`MessageType::PullQueryBatch`].
    PullQueryBatch(CursorRef),
    /// See [`MessageType::CloseQueryCursor`].
    CloseQueryCursor(CursorRef),
    /// See [`MessageType::StartTransaction`].
    StartTransaction,
    /// See [`MessageType::CommitTransaction`].
    CommitTransaction,
    /// See [`MessageType::RollbackTransaction`].
    RollbackTransaction,
    /// See [`MessageType::TransactionAck`].
    TransactionAck(TransactionAck),
    /// See [`MessageType::Error`].
    Error(ErrorResponse),
}

impl ProtocolMessage {
    /// Message type.
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::AuthenticateContext(_) => MessageType::AuthenticateContext,
            Self::AuthenticateAck(_) => MessageType::AuthenticateAck,
            Self::ExitContext => MessageType::ExitContext,
            Self::SaveEntity(_) => MessageType::SaveEntity,
            Self::SaveEntityAck(_) => MessageType::SaveEntityAck,
            Self::LoadEntity(_) => MessageType::LoadEntity,
            Self::LoadEntityResult(_) => MessageType::LoadEntityResult,
            Self::StartOwnerCursor(_) => MessageType::StartOwnerCursor,
            Self::OwnerBatch(_) => MessageType::OwnerBatch,
            Self::PullOwnerBatch(_) => MessageType::PullOwnerBatch,
            Self::CloseOwnerCursor(_) => MessageType::CloseOwnerCursor,
            Self::DeleteEntity(_) => MessageType::DeleteEntity,
            Self::DeleteEntityResult(_) => MessageType::DeleteEntityResult,
            Self::IsEntityOwner(_) => MessageType::IsEntityOwner,
            Self::IsEntityOwnerResult(_) => MessageType::IsEntityOwnerResult,
            Self::StartQueryCursor(_) => MessageType::StartQueryCursor,
            Self::QueryBatch(_) => MessageType::QueryBatch,
            Self::PullQueryBatch(_) => MessageType::PullQueryBatch,
            Self::CloseQueryCursor(_) => MessageType::CloseQueryCursor,
            Self::StartTransaction => MessageType::StartTransaction,
            Self::CommitTransaction => MessageType::CommitTransaction,
            Self::RollbackTransaction => MessageType::RollbackTransaction,
            Self::TransactionAck(_) => MessageType::TransactionAck,
            Self::Error(_) => MessageType::Error,
        }
    }

    /// Numeric type code.
    #[must_use]
    pub fn type_code(&self) -> u16 {
        self.message_type().code()
    }

    /// Encodes the payload to CBOR. Payload-less messages encode to nothing.
    ///
    /// # Errors
    ///
    /// Returns `Encode` if serialization fails.
    pub fn encode_payload(&self) -> ProtocolResult<Vec<u8>> {
        match self {
            Self::AuthenticateContext(m) => to_cbor(m),
            Self::AuthenticateAck(m) => to_cbor(m),
            Self::SaveEntity(m) => to_cbor(m),
            Self::SaveEntityAck(m) => to_cbor(m),
            Self::LoadEntity(m) => to_cbor(m),
            Self::LoadEntityResult(m) => to_cbor(m),
            Self::StartOwnerCursor(m) => to_cbor(m),
            Self::OwnerBatch(m) => to_cbor(m),
            Self::PullOwnerBatch(m) | Self::CloseOwnerCursor(m) => to_cbor(m),
            Self::DeleteEntity(m) => to_cbor(m),
            Self::DeleteEntityResult(m) => to_cbor(m),
            Self::IsEntityOwner(m) => to_cbor(m),
            Self::IsEntityOwnerResult(m) => to_cbor(m),
            Self::StartQueryCursor(m) => to_cbor(m),
            Self::QueryBatch(m) => to_cbor(m),
            Self::PullQueryBatch(m) | Self::CloseQueryCursor(m) => to_cbor(m),
            Self::TransactionAck(m) => to_cbor(m),
            Self::Error(m) => to_cbor(m),
            Self::ExitContext
            | Self::StartTransaction
            | Self::CommitTransaction
            | Self::RollbackTransaction => Ok(Vec::new()),
        }
    }

    /// Decodes a message from its type code and payload.
    ///
    /// # Errors
    ///
    /// Returns `UnknownMessageType` for an unused code, or `Decode` if the
    /// payload does not match the type.
    pub fn decode(type_code: u16, payload: &[u8]) -> ProtocolResult<Self> {
        let message_type =
            MessageType::from_code(type_code).ok_or(ProtocolError::UnknownMessageType(type_code))?;
        let code = type_code;
        Ok(match message_type {
            MessageType::AuthenticateContext => Self::AuthenticateContext(from_cbor(code, payload)?),
            MessageType::AuthenticateAck => Self::AuthenticateAck(from_cbor(code, payload)?),
            MessageType::ExitContext => Self::ExitContext,
            MessageType::SaveEntity => Self::SaveEntity(from_cbor(code, payload)?),
            MessageType::SaveEntityAck => Self::SaveEntityAck(from_cbor(code, payload)?),
            MessageType::LoadEntity => Self::LoadEntity(from_cbor(code, payload)?),
            MessageType::LoadEntityResult => Self::LoadEntityResult(from_cbor(code, payload)?),
            MessageType::StartOwnerCursor => Self::StartOwnerCursor(from_cbor(code, payload)?),
            MessageType::OwnerBatch => Self::OwnerBatch(from_cbor(code, payload)?),
            MessageType::PullOwnerBatch => Self::PullOwnerBatch(from_cbor(code, payload)?),
            MessageType::CloseOwnerCursor => Self::CloseOwnerCursor(from_cbor(code, payload)?),
            MessageType::DeleteEntity => Self::DeleteEntity(from_cbor(code, payload)?),
            MessageType::DeleteEntityResult => Self::DeleteEntityResult(from_cbor(code, payload)?),
            MessageType::IsEntityOwner => Self::IsEntityOwner(from_cbor(code, payload)?),
            MessageType::IsEntityOwnerResult => {
                Self::IsEntityOwnerResult(from_cbor(code, payload)?)
            }
            MessageType::StartQueryCursor => Self::StartQueryCursor(from_cbor(code, payload)?),
            MessageType::QueryBatch => Self::QueryBatch(from_cbor(code, payload)?),
            MessageType::PullQueryBatch => Self::PullQueryBatch(from_cbor(code, payload)?),
            MessageType::CloseQueryCursor => Self::CloseQueryCursor(from_cbor(code, payload)?),
            MessageType::StartTransaction => Self::StartTransaction,
            MessageType::CommitTransaction => Self::CommitTransaction,
            MessageType::RollbackTransaction => Self::RollbackTransaction,
            MessageType::TransactionAck => Self::TransactionAck(from_cbor(code, payload)?),
            MessageType::Error => Self::Error(from_cbor(code, payload)?),
        })
    }

    /// Wraps a core error in an error message.
    #[must_use]
    pub fn error(err: &CoreError) -> Self {
        Self::Error(ErrorResponse::from_core(err))
    }
}

fn to_cbor<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| ProtocolError::encode(e.to_string()))?;
    Ok(buf)
}

fn from_cbor<T: DeserializeOwned>(type_code: u16, payload: &[u8]) -> ProtocolResult<T> {
    ciborium::from_reader(payload).map_err(|e| ProtocolError::decode(type_code, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn round_trip(message: &ProtocolMessage) -> ProtocolMessage {
        let payload = message.encode_payload().unwrap();
        ProtocolMessage::decode(message.type_code(), &payload).unwrap()
    }

    #[test]
    fn type_codes_are_stable() {
        assert_eq!(MessageType::AuthenticateContext.code(), 101);
        assert_eq!(MessageType::SaveEntityAck.code(), 202);
        assert_eq!(MessageType::PullOwnerBatch.code(), 207);
        assert_eq!(MessageType::CloseQueryCursor.code(), 216);
        assert_eq!(MessageType::TransactionAck.code(), 304);
        for code in [101, 102, 104, 201, 208, 209, 213, 216, 301, 304, 900] {
            assert_eq!(MessageType::from_code(code).unwrap().code(), code);
        }
        assert!(MessageType::from_code(103).is_none());
    }

    #[test]
    fn one_way_messages() {
        assert!(MessageType::ExitContext.is_one_way());
        assert!(MessageType::CloseOwnerCursor.is_one_way());
        assert!(!MessageType::PullQueryBatch.is_one_way());
    }

    #[test]
    fn entity_payload_survives_cbor() {
        let mut entity = Entity::new("Item", json!({ "level": 3, "tags": ["a"], "ratio": 0.5 }))
            .with_owner("alice");
        entity.mark_saved(EntityId::new("e1"), Utc::now(), Utc::now());
        let message = ProtocolMessage::QueryBatch(Batch::more(4, vec![entity]));
        assert_eq!(round_trip(&message), message);
    }

    #[test]
    fn query_payload_survives_cbor() {
        let query = Query::new("Item")
            .require_owner("alice")
            .where_path("Foo->Bar", "<", json!(50))
            .unwrap()
            .take(3);
        let message = ProtocolMessage::StartQueryCursor(StartQueryCursor { query });
        assert_eq!(round_trip(&message), message);
    }

    #[test]
    fn lock_type_wire_name() {
        let message = ProtocolMessage::LoadEntity(LoadEntity {
            entity_id: EntityId::new("x"),
            lock_type: Some(LockType::ForUpdate),
        });
        let payload = message.encode_payload().unwrap();
        let value: ciborium::Value = ciborium::from_reader(payload.as_slice()).unwrap();
        let text = format!("{value:?}");
        assert!(text.contains("for_update"));
        assert_eq!(round_trip(&message), message);
    }

    #[test]
    fn payload_less_messages() {
        for message in [
            ProtocolMessage::ExitContext,
            ProtocolMessage::StartTransaction,
            ProtocolMessage::CommitTransaction,
            ProtocolMessage::RollbackTransaction,
        ] {
            assert!(message.encode_payload().unwrap().is_empty());
            assert_eq!(round_trip(&message), message);
        }
    }

    #[test]
    fn unknown_type_and_bad_payload() {
        assert!(matches!(
            ProtocolMessage::decode(555, &[]),
            Err(ProtocolError::UnknownMessageType(555))
        ));
        assert!(matches!(
            ProtocolMessage::decode(MessageType::SaveEntity.code(), &[0xff, 0x00]),
            Err(ProtocolError::Decode { type_code: 201, .. })
        ));
    }

    #[test]
    fn error_response_maps_core_errors() {
        let closed = ErrorResponse::from_core(&CoreError::CursorClosed { cursor_id: 9 });
        assert_eq!(closed.kind, ErrorKind::CursorClosed);
        assert!(matches!(
            closed.into_core(),
            CoreError::CursorClosed { cursor_id: 9 }
        ));

        let bad = ErrorResponse::from_core(&CoreError::invalid_query("unknown operator"));
        assert_eq!(bad.message, "unknown operator");
        assert!(matches!(bad.into_core(), CoreError::InvalidQuery { .. }));

        let io = CoreError::storage("disk full");
        assert_eq!(ErrorResponse::from_core(&io).kind, ErrorKind::Internal);
    }
}
