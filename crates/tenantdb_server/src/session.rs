//! Per-connection request handling.

use crate::backend::{Backend, LockOutcome, SessionId};
use crate::cursor::CursorTable;
use std::collections::BTreeSet;
use std::sync::Arc;
use tenantdb_core::{
    CoreError, CoreResult, Entity, EntityDatabase, EntityId, LockType, PrincipalId,
    TransactionTracker,
};
use tenantdb_protocol::{
    AuthenticateAck, AuthenticateContext, ContextType, CursorKind, CursorRef, DeleteEntity,
    DeleteEntityResult, IsEntityOwner, IsEntityOwnerResult, LoadEntity, LoadEntityResult,
    MessageHandler, OwnerCursor, ProtocolMessage, QueryCursor, SaveEntity, SaveEntityAck,
    StartOwnerCursor, StartQueryCursor, TransactionAck,
};

/// Prior state of one entity, restored on rollback. `None` means the entity
/// did not exist.
type UndoEntry = (EntityId, Option<Entity>);

/// Server side of one connection.
///
/// A session must authenticate before anything else. It tracks its own
/// transaction depth with one undo log per open level, the row locks it
/// holds, and its open cursors. Dropping a session rolls back open levels
/// and releases its locks.
pub struct Session {
    id: SessionId,
    backend: Arc<Backend>,
    context: Option<ContextType>,
    execution_id: String,
    transactions: TransactionTracker,
    undo: Vec<Vec<UndoEntry>>,
    held_locks: BTreeSet<EntityId>,
    owner_cursors: CursorTable<PrincipalId>,
    query_cursors: CursorTable<Entity>,
}

impl Session {
    /// Creates an unauthenticated session.
    #[must_use]
    pub fn new(backend: Arc<Backend>) -> Self {
        let config = backend.config();
        let (batch_size, max_open) = (config.batch_size, config.max_open_cursors);
        Self {
            id: backend.next_session_id(),
            backend,
            context: None,
            execution_id: String::new(),
            transactions: TransactionTracker::new(),
            undo: Vec::new(),
            held_locks: BTreeSet::new(),
            owner_cursors: CursorTable::new(batch_size, max_open),
            query_cursors: CursorTable::new(batch_size, max_open),
        }
    }

    /// Session id.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns true once the context is authenticated.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.context.is_some()
    }

    /// Current transaction depth.
    #[must_use]
    pub fn transaction_level(&self) -> usize {
        self.transactions.level()
    }

    /// Number of row locks held.
    #[must_use]
    pub fn held_locks(&self) -> usize {
        self.held_locks.len()
    }

    /// Number of open cursors of both kinds.
    #[must_use]
    pub fn open_cursors(&self) -> usize {
        self.owner_cursors.len() + self.query_cursors.len()
    }

    fn dispatch(&mut self, message: ProtocolMessage) -> CoreResult<Option<ProtocolMessage>> {
        if let ProtocolMessage::AuthenticateContext(request) = message {
            return self.authenticate(request).map(Some);
        }

        let Some(context) = self.context else {
            return Err(CoreError::NotAuthenticated);
        };

        if let ProtocolMessage::ExitContext = message {
            self.exit();
            return Ok(None);
        }

        if context == ContextType::Client {
            return Err(CoreError::Forbidden);
        }

        let reply = match message {
            ProtocolMessage::SaveEntity(request) => ProtocolMessage::SaveEntityAck(self.save(request)?),
            ProtocolMessage::LoadEntity(request) => {
                ProtocolMessage::LoadEntityResult(self.load(request)?)
            }
            ProtocolMessage::DeleteEntity(request) => {
                ProtocolMessage::DeleteEntityResult(self.delete(request)?)
            }
            ProtocolMessage::IsEntityOwner(request) => {
                ProtocolMessage::IsEntityOwnerResult(self.is_owner(request)?)
            }
            ProtocolMessage::StartOwnerCursor(request) => self.start_owner_cursor(request)?,
            ProtocolMessage::PullOwnerBatch(cursor) => {
                OwnerCursor::batch_message(self.owner_cursors.pull(cursor.cursor_id)?)
            }
            ProtocolMessage::CloseOwnerCursor(cursor) => {
                let closed = self.owner_cursors.close(cursor.cursor_id);
                self.log_stale_close::<OwnerCursor>(cursor, closed);
                return Ok(None);
            }
            ProtocolMessage::StartQueryCursor(request) => self.start_query_cursor(request)?,
            ProtocolMessage::PullQueryBatch(cursor) => {
                QueryCursor::batch_message(self.query_cursors.pull(cursor.cursor_id)?)
            }
            ProtocolMessage::CloseQueryCursor(cursor) => {
                let closed = self.query_cursors.close(cursor.cursor_id);
                self.log_stale_close::<QueryCursor>(cursor, closed);
                return Ok(None);
            }
            ProtocolMessage::StartTransaction => self.start_transaction(),
            ProtocolMessage::CommitTransaction => self.commit_transaction(),
            ProtocolMessage::RollbackTransaction => self.rollback_transaction(),
            other => {
                return Err(CoreError::invalid_operation(format!(
                    "message type {} is not a request",
                    other.type_code()
                )))
            }
        };
        Ok(Some(reply))
    }

    fn authenticate(&mut self, request: AuthenticateContext) -> CoreResult<ProtocolMessage> {
        if self.context.is_some() {
            return Err(CoreError::invalid_operation("context already authenticated"));
        }
        tracing::info!(
            session = self.id,
            execution_id = %request.execution_id,
            context = ?request.context_type,
            "context authenticated"
        );
        self.context = Some(request.context_type);
        self.execution_id = request.execution_id;
        Ok(ProtocolMessage::AuthenticateAck(AuthenticateAck {
            session_id: self.id,
        }))
    }

    fn exit(&mut self) {
        tracing::info!(session = self.id, execution_id = %self.execution_id, "context exited");
        self.abort_all();
        self.owner_cursors.clear();
        self.query_cursors.clear();
        self.context = None;
    }

    fn save(&mut self, request: SaveEntity) -> CoreResult<SaveEntityAck> {
        let mut entity = request.entity;
        let id = match entity.id() {
            Some(id) => id.clone(),
            None => {
                let id = EntityId::generate();
                entity = entity.with_id(id.clone());
                id
            }
        };
        if id.is_empty() {
            return Err(CoreError::invalid_argument("entity id is empty"));
        }
        let in_transaction = self.transactions.in_transaction();
        let release_after_write = self.lock_row(&id)?;

        let undo = self.backend.with_store(|store| -> CoreResult<Option<UndoEntry>> {
            let prior = if in_transaction { store.get(&id) } else { None };
            store.save_entity(&mut entity)?;
            Ok(in_transaction.then(|| (id.clone(), prior)))
        });
        if release_after_write {
            self.backend.release_locks(self.id, [&id]);
        }
        self.record_undo(undo?);

        match (entity.id(), entity.created_at(), entity.updated_at()) {
            (Some(id), Some(created_at), Some(updated_at)) => Ok(SaveEntityAck {
                entity_id: id.clone(),
                created_at,
                updated_at,
            }),
            _ => Err(CoreError::invalid_operation("saved entity is missing metadata")),
        }
    }

    fn load(&mut self, request: LoadEntity) -> CoreResult<LoadEntityResult> {
        let id = request.entity_id;
        if id.is_empty() {
            return Err(CoreError::invalid_argument("entity id is empty"));
        }

        let release_after_load = match request.lock_type {
            Some(LockType::ForUpdate) => match self.lock_row(&id) {
                Err(err) if err.is_deadlock() => return Ok(LoadEntityResult::deadlock()),
                other => other?,
            },
            None => false,
        };

        let entity = self
            .backend
            .with_store(|store| store.load_entity(&id, request.lock_type));
        if release_after_load {
            self.backend.release_locks(self.id, [&id]);
        }
        Ok(LoadEntityResult::found(entity?))
    }

    fn delete(&mut self, request: DeleteEntity) -> CoreResult<DeleteEntityResult> {
        let id = request.entity_id;
        if id.is_empty() {
            return Err(CoreError::invalid_argument("entity id is empty"));
        }
        let in_transaction = self.transactions.in_transaction();
        let release_after_write = self.lock_row(&id)?;

        let result = self.backend.with_store(|store| -> CoreResult<_> {
            let prior = if in_transaction { store.get(&id) } else { None };
            let deleted = store.delete_entity(&id)?;
            let undo = (deleted && in_transaction).then(|| (id.clone(), prior));
            Ok((deleted, undo))
        });
        if release_after_write {
            self.backend.release_locks(self.id, [&id]);
        }
        let (deleted, undo) = result?;
        self.record_undo(undo);
        Ok(DeleteEntityResult { deleted })
    }

    /// Takes the row lock of `id`, waiting while another session holds it.
    ///
    /// Inside a transaction the lock is kept until the outermost level ends.
    /// Outside one, a returned `true` asks the caller to release it once the
    /// operation is done. Losing a deadlock rolls back every level and
    /// returns `CoreError::Deadlock`.
    fn lock_row(&mut self, id: &EntityId) -> CoreResult<bool> {
        match self.backend.acquire_lock(self.id, id) {
            LockOutcome::Deadlock => {
                tracing::warn!(
                    session = self.id,
                    entity_id = %id,
                    level = self.transactions.level(),
                    "rolling back all transaction levels after deadlock"
                );
                self.abort_all();
                Err(CoreError::Deadlock)
            }
            LockOutcome::Acquired if self.transactions.in_transaction() => {
                self.held_locks.insert(id.clone());
                Ok(false)
            }
            LockOutcome::Acquired => Ok(true),
            LockOutcome::AlreadyHeld => Ok(false),
        }
    }

    fn is_owner(&mut self, request: IsEntityOwner) -> CoreResult<IsEntityOwnerResult> {
        let is_owner = self
            .backend
            .with_store(|store| store.is_entity_owner(&request.entity_id, &request.principal_id))?;
        Ok(IsEntityOwnerResult { is_owner })
    }

    fn start_owner_cursor(&mut self, request: StartOwnerCursor) -> CoreResult<ProtocolMessage> {
        let owners = self.backend.with_store(|store| {
            store
                .entity_owners(&request.entity_id)?
                .collect::<CoreResult<Vec<_>>>()
        })?;
        let batch = self.owner_cursors.open(owners)?;
        Ok(OwnerCursor::batch_message(batch))
    }

    fn start_query_cursor(&mut self, request: StartQueryCursor) -> CoreResult<ProtocolMessage> {
        let entities = self.backend.with_store(|store| {
            store
                .query_entities(&request.query)?
                .collect::<CoreResult<Vec<_>>>()
        })?;
        tracing::debug!(
            session = self.id,
            entity_type = %request.query.entity_type,
            results = entities.len(),
            "query cursor started"
        );
        let batch = self.query_cursors.open(entities)?;
        Ok(QueryCursor::batch_message(batch))
    }

    fn log_stale_close<K: CursorKind>(&self, cursor: CursorRef, closed: bool) {
        if !closed {
            tracing::debug!(
                session = self.id,
                cursor_id = cursor.cursor_id,
                kind = K::NAME,
                "close of a cursor that is not open"
            );
        }
    }

    fn start_transaction(&mut self) -> ProtocolMessage {
        self.transactions.start();
        self.undo.push(Vec::new());
        self.transaction_ack()
    }

    fn commit_transaction(&mut self) -> ProtocolMessage {
        if self.transactions.commit() {
            let log = self.undo.pop().unwrap_or_default();
            match self.undo.last_mut() {
                Some(outer) => outer.extend(log),
                None => self.release_all_locks(),
            }
        }
        self.transaction_ack()
    }

    fn rollback_transaction(&mut self) -> ProtocolMessage {
        if self.transactions.rollback() {
            let log = self.undo.pop().unwrap_or_default();
            self.apply_undo(log);
            if self.undo.is_empty() {
                self.release_all_locks();
            }
        }
        self.transaction_ack()
    }

    fn transaction_ack(&self) -> ProtocolMessage {
        ProtocolMessage::TransactionAck(TransactionAck {
            level: self.transactions.level() as u64,
        })
    }

    fn record_undo(&mut self, entry: Option<UndoEntry>) {
        if let (Some(entry), Some(log)) = (entry, self.undo.last_mut()) {
            log.push(entry);
        }
    }

    fn apply_undo(&self, log: Vec<UndoEntry>) {
        if log.is_empty() {
            return;
        }
        self.backend.with_store(|store| {
            for (id, prior) in log.into_iter().rev() {
                store.restore_entity(&id, prior);
            }
        });
    }

    /// Rolls back every open level and releases every lock.
    fn abort_all(&mut self) {
        while let Some(log) = self.undo.pop() {
            self.apply_undo(log);
        }
        self.transactions.reset();
        self.release_all_locks();
    }

    fn release_all_locks(&mut self) {
        if self.held_locks.is_empty() {
            return;
        }
        let held = std::mem::take(&mut self.held_locks);
        self.backend.release_locks(self.id, &held);
    }
}

impl MessageHandler for Session {
    fn handle(&mut self, message: ProtocolMessage) -> Option<ProtocolMessage> {
        let message_type = message.message_type();
        match self.dispatch(message) {
            Ok(reply) => reply,
            Err(err) => {
                tracing::debug!(
                    session = self.id,
                    message_type = message_type.code(),
                    error = %err,
                    "request failed"
                );
                if message_type.is_one_way() {
                    None
                } else {
                    Some(ProtocolMessage::error(&err))
                }
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.abort_all();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("context", &self.context)
            .field("level", &self.transactions.level())
            .field("held_locks", &self.held_locks.len())
            .finish()
    }
}
