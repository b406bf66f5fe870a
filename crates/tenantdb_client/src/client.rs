//! Database client.

use crate::config::ClientConfig;
use crate::connection::{unexpected, Connection, TcpConnection};
use crate::cursor::RemoteCursor;
use std::net::ToSocketAddrs;
use tenantdb_core::{
    CoreError, CoreResult, Entity, EntityDatabase, EntityId, LockType, PrincipalId, Query,
    TransactionTracker,
};
use tenantdb_protocol::{
    DeleteEntity, IsEntityOwner, LoadEntity, MessageType, OwnerCursor, ProtocolMessage,
    QueryCursor, SaveEntity, StartOwnerCursor, StartQueryCursor,
};

/// `EntityDatabase` backed by a remote server.
///
/// The client mirrors the server's transaction depth from every
/// acknowledgement, so [`transaction_level`](EntityDatabase::transaction_level)
/// never needs a round trip.
#[derive(Debug)]
pub struct DatabaseClient<C: Connection> {
    connection: C,
    config: ClientConfig,
    session_id: u64,
    transactions: TransactionTracker,
    connected: bool,
}

impl DatabaseClient<TcpConnection> {
    /// Connects over TCP and authenticates.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the server is unreachable, or the server's
    /// refusal.
    pub fn connect_tcp(addr: impl ToSocketAddrs, config: ClientConfig) -> CoreResult<Self> {
        let mut connection = TcpConnection::connect(addr)?;
        connection.set_read_timeout(config.read_timeout)?;
        Self::connect(connection, config)
    }
}

impl<C: Connection> DatabaseClient<C> {
    /// Authenticates a context over `connection`.
    ///
    /// # Errors
    ///
    /// Returns the server's refusal or a transport error.
    pub fn connect(mut connection: C, config: ClientConfig) -> CoreResult<Self> {
        let reply =
            connection.call(&ProtocolMessage::AuthenticateContext(config.authenticate_message()))?;
        let ProtocolMessage::AuthenticateAck(ack) = reply else {
            return Err(unexpected(MessageType::AuthenticateAck, &reply));
        };
        tracing::info!(
            session_id = ack.session_id,
            execution_id = %config.execution_id,
            "connected"
        );
        Ok(Self {
            connection,
            config,
            session_id: ack.session_id,
            transactions: TransactionTracker::new(),
            connected: true,
        })
    }

    /// Server-assigned session id.
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Client configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The underlying connection.
    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Ends the context. Open transaction levels are rolled back by the
    /// server.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the exit message cannot be sent.
    pub fn disconnect(mut self) -> CoreResult<()> {
        self.exit()
    }

    /// Starts a cursor over the owners of an entity.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty id, or the server's error.
    pub fn owner_cursor(&mut self, id: &EntityId) -> CoreResult<RemoteCursor<'_, C, OwnerCursor>> {
        require_id(id)?;
        let start = ProtocolMessage::StartOwnerCursor(StartOwnerCursor {
            entity_id: id.clone(),
        });
        RemoteCursor::start(&mut self.connection, &start)
    }

    /// Starts a cursor over the results of a query.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an invalid query, or the server's error.
    pub fn query_cursor(&mut self, query: &Query) -> CoreResult<RemoteCursor<'_, C, QueryCursor>> {
        query.validate()?;
        let start = ProtocolMessage::StartQueryCursor(StartQueryCursor {
            query: query.clone(),
        });
        RemoteCursor::start(&mut self.connection, &start)
    }

    fn exit(&mut self) -> CoreResult<()> {
        if !self.connected {
            return Ok(());
        }
        self.connected = false;
        self.transactions.reset();
        tracing::info!(session_id = self.session_id, "disconnecting");
        self.connection.send(&ProtocolMessage::ExitContext)
    }

    /// Sends a save or delete. The server takes the row lock first, so a
    /// write can lose a deadlock just as a `for_update` load can.
    fn write_call(&mut self, request: &ProtocolMessage) -> CoreResult<ProtocolMessage> {
        let reply = self.connection.call(request);
        if matches!(&reply, Err(err) if err.is_deadlock()) {
            tracing::warn!(
                session_id = self.session_id,
                level = self.transactions.level(),
                "deadlock on write; every transaction level was rolled back"
            );
            self.transactions.reset();
        }
        reply
    }

    fn transaction_call(&mut self, message: ProtocolMessage) -> CoreResult<()> {
        match self.connection.call(&message)? {
            ProtocolMessage::TransactionAck(ack) => {
                self.transactions.set_level(ack.level as usize);
                Ok(())
            }
            other => Err(unexpected(MessageType::TransactionAck, &other)),
        }
    }
}

impl<C: Connection> EntityDatabase for DatabaseClient<C> {
    type Owners<'a>
        = RemoteCursor<'a, C, OwnerCursor>
    where
        Self: 'a;

    type Entities<'a>
        = RemoteCursor<'a, C, QueryCursor>
    where
        Self: 'a;

    fn save_entity(&mut self, entity: &mut Entity) -> CoreResult<()> {
        if entity.entity_type().is_empty() {
            return Err(CoreError::invalid_argument("entity type is empty"));
        }
        if let Some(id) = entity.id() {
            require_id(id)?;
        }

        let request = ProtocolMessage::SaveEntity(SaveEntity {
            entity: entity.clone(),
        });
        match self.write_call(&request)? {
            ProtocolMessage::SaveEntityAck(ack) => {
                tracing::debug!(entity_id = %ack.entity_id, "entity saved");
                entity.mark_saved(ack.entity_id, ack.created_at, ack.updated_at);
                Ok(())
            }
            other => Err(unexpected(MessageType::SaveEntityAck, &other)),
        }
    }

    fn load_entity(&mut self, id: &EntityId, lock: Option<LockType>) -> CoreResult<Option<Entity>> {
        require_id(id)?;
        let request = ProtocolMessage::LoadEntity(LoadEntity {
            entity_id: id.clone(),
            lock_type: lock,
        });
        match self.connection.call(&request)? {
            ProtocolMessage::LoadEntityResult(result) if result.deadlock => {
                tracing::warn!(
                    session_id = self.session_id,
                    entity_id = %id,
                    level = self.transactions.level(),
                    "deadlock; every transaction level was rolled back"
                );
                self.transactions.reset();
                Err(CoreError::Deadlock)
            }
            ProtocolMessage::LoadEntityResult(result) => Ok(result.entity),
            other => Err(unexpected(MessageType::LoadEntityResult, &other)),
        }
    }

    fn delete_entity(&mut self, id: &EntityId) -> CoreResult<bool> {
        require_id(id)?;
        let request = ProtocolMessage::DeleteEntity(DeleteEntity {
            entity_id: id.clone(),
        });
        match self.write_call(&request)? {
            ProtocolMessage::DeleteEntityResult(result) => Ok(result.deleted),
            other => Err(unexpected(MessageType::DeleteEntityResult, &other)),
        }
    }

    fn entity_owners<'a>(&'a mut self, id: &EntityId) -> CoreResult<Self::Owners<'a>> {
        self.owner_cursor(id)
    }

    fn is_entity_owner(&mut self, id: &EntityId, principal: &PrincipalId) -> CoreResult<bool> {
        require_id(id)?;
        if principal.is_empty() {
            return Err(CoreError::invalid_argument("principal id is empty"));
        }
        let request = ProtocolMessage::IsEntityOwner(IsEntityOwner {
            entity_id: id.clone(),
            principal_id: principal.clone(),
        });
        match self.connection.call(&request)? {
            ProtocolMessage::IsEntityOwnerResult(result) => Ok(result.is_owner),
            other => Err(unexpected(MessageType::IsEntityOwnerResult, &other)),
        }
    }

    fn query_entities<'a>(&'a mut self, query: &Query) -> CoreResult<Self::Entities<'a>> {
        self.query_cursor(query)
    }

    fn start_transaction(&mut self) -> CoreResult<()> {
        self.transaction_call(ProtocolMessage::StartTransaction)
    }

    fn commit_transaction(&mut self) -> CoreResult<()> {
        self.transaction_call(ProtocolMessage::CommitTransaction)
    }

    fn rollback_transaction(&mut self) -> CoreResult<()> {
        self.transaction_call(ProtocolMessage::RollbackTransaction)
    }

    fn transaction_level(&self) -> usize {
        self.transactions.level()
    }
}

impl<C: Connection> Drop for DatabaseClient<C> {
    fn drop(&mut self) {
        if let Err(err) = self.exit() {
            tracing::debug!(error = %err, "exit on drop failed");
        }
    }
}

fn require_id(id: &EntityId) -> CoreResult<()> {
    if id.is_empty() {
        return Err(CoreError::invalid_argument("entity id is empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::LoopbackConnection;
    use serde_json::json;
    use std::sync::Arc;
    use tenantdb_core::EmulatedStore;
    use tenantdb_server::{Backend, ServerConfig, Session};

    fn client() -> DatabaseClient<LoopbackConnection<Session>> {
        let backend = Arc::new(Backend::new(
            ServerConfig::default().with_batch_size(3),
            EmulatedStore::new(),
        ));
        let connection = LoopbackConnection::new(Session::new(backend));
        DatabaseClient::connect(connection, ClientConfig::new("unit")).unwrap()
    }

    #[test]
    fn connect_assigns_session() {
        let client = client();
        assert!(client.session_id() > 0);
        assert!(client.connection().handler().is_authenticated());
    }

    #[test]
    fn save_populates_metadata() {
        let mut client = client();
        let mut entity = Entity::new("Item", json!({ "n": 1 })).with_owner("alice");
        client.save_entity(&mut entity).unwrap();

        let id = entity.id().unwrap().clone();
        assert!(entity.created_at().is_some());
        assert!(entity.owners().delta().added.is_empty());

        let loaded = client.load_entity(&id, None).unwrap().unwrap();
        assert_eq!(loaded.data(), &json!({ "n": 1 }));
        assert!(client.is_entity_owner(&id, &"alice".into()).unwrap());
    }

    #[test]
    fn empty_ids_fail_before_sending() {
        let mut client = client();
        let empty = EntityId::new("");
        assert!(matches!(
            client.load_entity(&empty, None),
            Err(CoreError::InvalidArgument { .. })
        ));
        assert!(matches!(
            client.delete_entity(&empty),
            Err(CoreError::InvalidArgument { .. })
        ));
        assert!(client.entity_owners(&empty).is_err());
    }

    #[test]
    fn transaction_level_mirrors_server() {
        let mut client = client();
        client.start_transaction().unwrap();
        client.start_transaction().unwrap();
        assert_eq!(client.transaction_level(), 2);
        assert_eq!(client.connection().handler().transaction_level(), 2);

        client.rollback_transaction().unwrap();
        client.commit_transaction().unwrap();
        client.commit_transaction().unwrap();
        assert_eq!(client.transaction_level(), 0);
    }

    #[test]
    fn query_through_cursor() {
        let mut client = client();
        for i in 0..7 {
            let mut entity = Entity::new("Item", json!({ "i": i }));
            client.save_entity(&mut entity).unwrap();
        }
        let query = Query::new("Item").where_path("i", ">=", json!(2)).unwrap();
        let found: Vec<Entity> = client
            .query_entities(&query)
            .unwrap()
            .collect::<CoreResult<_>>()
            .unwrap();
        assert_eq!(found.len(), 5);
    }

    #[test]
    fn disconnect_sends_exit() {
        let client = client();
        client.disconnect().unwrap();
    }
}
