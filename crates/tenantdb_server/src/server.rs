//! TCP accept loop.

use crate::backend::Backend;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::session::Session;
use std::io::{BufReader, BufWriter};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tenantdb_core::{CoreError, EmulatedStore, Snapshot, StoreConfig};
use tenantdb_protocol::{read_frame, write_frame, MessageHandler, ProtocolMessage};

type DisconnectHook = Arc<dyn Fn(&Backend) + Send + Sync>;

/// Counts one connection against `max_connections` until dropped.
struct ConnectionSlot(Arc<AtomicUsize>);

impl ConnectionSlot {
    fn acquire(active: &Arc<AtomicUsize>) -> Self {
        active.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(active))
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Serves one shared store to any number of TCP connections.
///
/// Each connection gets its own thread and [`Session`]. When a connection
/// ends, the session is dropped (rolling back whatever it left open) and the
/// disconnect hook, if any, runs. The CLI uses the hook to persist the
/// store.
#[derive(Clone)]
pub struct DatabaseServer {
    backend: Arc<Backend>,
    on_disconnect: Option<DisconnectHook>,
}

impl DatabaseServer {
    /// Creates a server for `store`.
    #[must_use]
    pub fn new(config: ServerConfig, store: EmulatedStore) -> Self {
        Self {
            backend: Arc::new(Backend::new(config, store)),
            on_disconnect: None,
        }
    }

    /// Creates a server whose store is restored from a snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot holds an invalid entity.
    pub fn from_snapshot(config: ServerConfig, snapshot: Snapshot) -> ServerResult<Self> {
        let store = EmulatedStore::from_snapshot(snapshot, StoreConfig::default())?;
        Ok(Self::new(config, store))
    }

    /// Sets a hook that runs after every connection ends.
    #[must_use]
    pub fn on_disconnect(mut self, hook: impl Fn(&Backend) + Send + Sync + 'static) -> Self {
        self.on_disconnect = Some(Arc::new(hook));
        self
    }

    /// Shared backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }

    /// Opens an in-process session on the shared backend.
    #[must_use]
    pub fn session(&self) -> Session {
        Session::new(Arc::clone(&self.backend))
    }

    /// Captures every entity.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        self.backend.snapshot()
    }

    /// Binds the configured address and serves until the process exits.
    ///
    /// # Errors
    ///
    /// Returns an error if binding fails.
    pub fn run(self) -> ServerResult<()> {
        let listener = TcpListener::bind(self.backend.config().bind_addr)?;
        self.serve(listener, &AtomicBool::new(false))
    }

    /// Accepts connections on `listener` until `stop` is set.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener address cannot be read.
    pub fn serve(&self, listener: TcpListener, stop: &AtomicBool) -> ServerResult<()> {
        let local_addr = listener.local_addr()?;
        tracing::info!(addr = %local_addr, "tenantdb server listening");
        let active = Arc::new(AtomicUsize::new(0));

        for stream in listener.incoming() {
            if stop.load(Ordering::Acquire) {
                break;
            }
            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    tracing::warn!(error = %err, "accept failed");
                    continue;
                }
            };

            let max = self.backend.config().max_connections;
            if active.load(Ordering::Acquire) >= max {
                tracing::warn!(max, "rejecting connection");
                reject(stream, &ServerError::TooManyConnections(max));
                continue;
            }

            let slot = ConnectionSlot::acquire(&active);
            let server = self.clone();
            // the slot is released when the closure is dropped, including
            // when the thread never starts
            let spawned = thread::Builder::new()
                .name("tenantdb-conn".into())
                .spawn(move || {
                    let _slot = slot;
                    let peer = stream.peer_addr().ok();
                    if let Err(err) = server.handle_connection(stream) {
                        tracing::warn!(peer = ?peer, error = %err, "connection ended with error");
                    }
                });
            if let Err(err) = spawned {
                tracing::error!(error = %err, "failed to spawn connection thread");
            }
        }

        tracing::info!(addr = %local_addr, "tenantdb server stopped");
        Ok(())
    }

    /// Serves `listener` on a background thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener address cannot be read or the thread
    /// cannot be spawned.
    pub fn spawn(self, listener: TcpListener) -> ServerResult<ServerHandle> {
        let local_addr = listener.local_addr()?;
        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("tenantdb-accept".into())
                .spawn(move || {
                    if let Err(err) = self.serve(listener, &stop) {
                        tracing::error!(error = %err, "accept loop failed");
                    }
                })?
        };
        Ok(ServerHandle {
            local_addr,
            stop,
            thread: Some(thread),
        })
    }

    fn handle_connection(&self, stream: TcpStream) -> ServerResult<()> {
        let peer = stream.peer_addr()?;
        stream.set_nodelay(true)?;
        tracing::debug!(%peer, "connection opened");

        let mut reader = BufReader::new(stream.try_clone()?);
        let mut writer = BufWriter::new(stream);
        let result = {
            let mut session = Session::new(Arc::clone(&self.backend));
            serve_session(&mut session, &mut reader, &mut writer)
        };

        if let Some(hook) = &self.on_disconnect {
            hook(&self.backend);
        }
        tracing::debug!(%peer, "connection closed");
        result
    }
}

impl std::fmt::Debug for DatabaseServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseServer")
            .field("backend", &self.backend)
            .field("on_disconnect", &self.on_disconnect.is_some())
            .finish()
    }
}

fn serve_session(
    session: &mut Session,
    reader: &mut BufReader<TcpStream>,
    writer: &mut BufWriter<TcpStream>,
) -> ServerResult<()> {
    loop {
        let message = match read_frame(reader) {
            Ok(Some(message)) => message,
            Ok(None) => return Ok(()),
            Err(err) if err.is_fatal() => return Err(err.into()),
            Err(err) => {
                tracing::debug!(error = %err, "undecodable frame");
                let reply = ProtocolMessage::error(&CoreError::from(err));
                write_frame(writer, &reply)?;
                continue;
            }
        };

        let exiting = matches!(message, ProtocolMessage::ExitContext);
        if let Some(reply) = session.handle(message) {
            write_frame(writer, &reply)?;
        }
        if exiting {
            return Ok(());
        }
    }
}

fn reject(stream: TcpStream, err: &ServerError) {
    let reply = ProtocolMessage::error(&CoreError::invalid_operation(err.to_string()));
    let mut writer = BufWriter::new(&stream);
    if write_frame(&mut writer, &reply).is_err() {
        tracing::debug!("could not deliver rejection");
    }
    drop(writer);
    let _ = stream.shutdown(Shutdown::Both);
}

/// Handle to a server running on a background thread.
#[derive(Debug)]
pub struct ServerHandle {
    local_addr: SocketAddr,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ServerHandle {
    /// Address the server listens on.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops accepting connections and waits for the accept loop to exit.
    ///
    /// Connections already accepted keep running until their peers leave.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        self.stop.store(true, Ordering::Release);
        // wake the blocking accept
        let _ = TcpStream::connect(self.local_addr);
        if thread.join().is_err() {
            tracing::error!("accept thread panicked");
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tenantdb_core::Entity;
    use tenantdb_protocol::{AuthenticateContext, SaveEntity, TransactionAck};

    fn spawn(server: DatabaseServer) -> ServerHandle {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        server.spawn(listener).unwrap()
    }

    fn connect(handle: &ServerHandle) -> (BufReader<TcpStream>, BufWriter<TcpStream>) {
        let stream = TcpStream::connect(handle.local_addr()).unwrap();
        (BufReader::new(stream.try_clone().unwrap()), BufWriter::new(stream))
    }

    fn request(
        io: &mut (BufReader<TcpStream>, BufWriter<TcpStream>),
        message: ProtocolMessage,
    ) -> ProtocolMessage {
        write_frame(&mut io.1, &message).unwrap();
        read_frame(&mut io.0).unwrap().unwrap()
    }

    #[test]
    fn serves_requests_over_tcp() {
        let server = DatabaseServer::new(ServerConfig::default(), EmulatedStore::new());
        let backend = Arc::clone(server.backend());
        let handle = spawn(server);

        let mut io = connect(&handle);
        let reply = request(
            &mut io,
            ProtocolMessage::AuthenticateContext(AuthenticateContext::backend("tcp")),
        );
        assert!(matches!(reply, ProtocolMessage::AuthenticateAck(_)));

        let reply = request(
            &mut io,
            ProtocolMessage::SaveEntity(SaveEntity {
                entity: Entity::new("Item", json!({ "n": 1 })),
            }),
        );
        assert!(matches!(reply, ProtocolMessage::SaveEntityAck(_)));
        assert_eq!(backend.with_store(|store| store.len()), 1);

        let reply = request(&mut io, ProtocolMessage::StartTransaction);
        assert_eq!(reply, ProtocolMessage::TransactionAck(TransactionAck { level: 1 }));

        write_frame(&mut io.1, &ProtocolMessage::ExitContext).unwrap();
        assert!(read_frame(&mut io.0).unwrap().is_none());
        handle.shutdown();
    }

    #[test]
    fn disconnect_hook_runs_after_session_cleanup() {
        let calls = Arc::new(AtomicUsize::new(0));
        let server = {
            let calls = Arc::clone(&calls);
            DatabaseServer::new(ServerConfig::default(), EmulatedStore::new()).on_disconnect(
                move |backend| {
                    // the abandoned transaction is already rolled back
                    assert_eq!(backend.with_store(|store| store.len()), 0);
                    calls.fetch_add(1, Ordering::SeqCst);
                },
            )
        };
        let handle = spawn(server);

        {
            let mut io = connect(&handle);
            request(
                &mut io,
                ProtocolMessage::AuthenticateContext(AuthenticateContext::backend("hook")),
            );
            request(&mut io, ProtocolMessage::StartTransaction);
            request(
                &mut io,
                ProtocolMessage::SaveEntity(SaveEntity {
                    entity: Entity::empty("Item"),
                }),
            );
        }

        for _ in 0..500 {
            if calls.load(Ordering::SeqCst) > 0 {
                break;
            }
            thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        handle.shutdown();
    }

    #[test]
    fn garbage_frame_gets_error_reply() {
        let handle = spawn(DatabaseServer::new(
            ServerConfig::default(),
            EmulatedStore::new(),
        ));
        let mut io = connect(&handle);
        // unknown message type 0x7777 with an empty payload
        std::io::Write::write_all(&mut io.1, &[0x77, 0x77, 0, 0, 0, 0]).unwrap();
        std::io::Write::flush(&mut io.1).unwrap();
        let reply = read_frame(&mut io.0).unwrap().unwrap();
        assert!(matches!(reply, ProtocolMessage::Error(_)));
        handle.shutdown();
    }

    #[test]
    fn from_snapshot_restores_entities() {
        let mut store = EmulatedStore::new();
        tenantdb_core::EntityDatabase::save_entity(&mut store, &mut Entity::empty("Item")).unwrap();
        let server =
            DatabaseServer::from_snapshot(ServerConfig::default(), store.to_snapshot()).unwrap();
        assert_eq!(server.snapshot().entities.len(), 1);
        assert!(!server.backend().is_dirty());
    }

    #[test]
    fn connection_slot_released_when_task_never_runs() {
        let active = Arc::new(AtomicUsize::new(0));
        let slot = ConnectionSlot::acquire(&active);
        let task = move || {
            let _slot = slot;
        };
        assert_eq!(active.load(Ordering::Acquire), 1);

        drop(task);
        assert_eq!(active.load(Ordering::Acquire), 0);
    }

    #[test]
    fn connection_slot_released_when_task_finishes() {
        let active = Arc::new(AtomicUsize::new(0));
        let slot = ConnectionSlot::acquire(&active);
        thread::spawn(move || {
            let _slot = slot;
        })
        .join()
        .unwrap();
        assert_eq!(active.load(Ordering::Acquire), 0);
    }
}
