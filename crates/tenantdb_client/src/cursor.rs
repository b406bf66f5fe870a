//! Remote cursors.

use crate::connection::{unexpected, Connection};
use std::collections::VecDeque;
use std::marker::PhantomData;
use tenantdb_core::{CoreError, CoreResult};
use tenantdb_protocol::{Batch, CursorKind, CursorRef, ProtocolMessage};

/// Lifecycle of a remote cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// The server holds more items under this id.
    Active(u64),
    /// The last batch arrived; the server has already released the cursor.
    Final,
    /// Closed by the caller or after an error.
    Closed,
}

/// A cursor over items held by the server.
///
/// Iterating pulls further batches as the buffered items run out. The
/// cursor borrows the connection for its whole life.
pub struct RemoteCursor<'a, C: Connection, K: CursorKind> {
    connection: &'a mut C,
    state: CursorState,
    last_id: u64,
    buffer: VecDeque<K::Item>,
    _kind: PhantomData<K>,
}

impl<'a, C: Connection, K: CursorKind> RemoteCursor<'a, C, K> {
    /// Sends `start` and wraps the first batch.
    pub(crate) fn start(connection: &'a mut C, start: &ProtocolMessage) -> CoreResult<Self> {
        let reply = connection.call(start)?;
        let batch = K::into_batch(reply).map_err(|other| unexpected(K::BATCH, &other))?;

        let mut cursor = Self {
            connection,
            state: CursorState::Closed,
            last_id: 0,
            buffer: VecDeque::new(),
            _kind: PhantomData,
        };
        cursor.accept(batch);
        tracing::debug!(kind = K::NAME, state = ?cursor.state, "cursor started");
        Ok(cursor)
    }

    /// Current state.
    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Server-side id while the cursor is active.
    pub fn cursor_id(&self) -> Option<u64> {
        match self.state {
            CursorState::Active(id) => Some(id),
            _ => None,
        }
    }

    /// Returns the buffered items, or pulls the next batch if none are
    /// buffered.
    ///
    /// # Errors
    ///
    /// Returns `CursorClosed` once the cursor is final and drained, or
    /// closed.
    pub fn next_batch(&mut self) -> CoreResult<Vec<K::Item>> {
        if !self.buffer.is_empty() {
            return Ok(self.buffer.drain(..).collect());
        }
        match self.state {
            CursorState::Active(cursor_id) => {
                self.pull(cursor_id)?;
                Ok(self.buffer.drain(..).collect())
            }
            CursorState::Final | CursorState::Closed => Err(CoreError::CursorClosed {
                cursor_id: self.last_id,
            }),
        }
    }

    /// Abandons the rest of the cursor.
    ///
    /// Closing a final cursor sends nothing.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the close message cannot be sent.
    pub fn close(mut self) -> CoreResult<()> {
        self.close_in_place()
    }

    fn close_in_place(&mut self) -> CoreResult<()> {
        self.buffer.clear();
        let state = std::mem::replace(&mut self.state, CursorState::Closed);
        if let CursorState::Active(cursor_id) = state {
            tracing::debug!(kind = K::NAME, cursor_id, "closing cursor");
            self.connection.send(&K::close_message(CursorRef { cursor_id }))?;
        }
        Ok(())
    }

    fn pull(&mut self, cursor_id: u64) -> CoreResult<()> {
        let reply = self
            .connection
            .call(&K::pull_message(CursorRef { cursor_id }));
        let batch = match reply {
            Ok(reply) => K::into_batch(reply).map_err(|other| unexpected(K::BATCH, &other)),
            Err(err) => Err(err),
        };
        match batch {
            Ok(batch) => {
                self.accept(batch);
                Ok(())
            }
            Err(err) => {
                // the server forgets a cursor it failed on
                self.state = CursorState::Closed;
                Err(err)
            }
        }
    }

    fn accept(&mut self, batch: Batch<K::Item>) {
        if let Some(id) = batch.cursor_id {
            self.last_id = id;
        }
        self.state = match (batch.is_final, batch.cursor_id) {
            (false, Some(id)) => CursorState::Active(id),
            _ => CursorState::Final,
        };
        self.buffer.extend(batch.items);
    }
}

impl<C: Connection, K: CursorKind> Iterator for RemoteCursor<'_, C, K> {
    type Item = CoreResult<K::Item>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.buffer.pop_front() {
                return Some(Ok(item));
            }
            let CursorState::Active(cursor_id) = self.state else {
                return None;
            };
            if let Err(err) = self.pull(cursor_id) {
                return Some(Err(err));
            }
        }
    }
}

impl<C: Connection, K: CursorKind> Drop for RemoteCursor<'_, C, K> {
    fn drop(&mut self) {
        if let Err(err) = self.close_in_place() {
            tracing::debug!(kind = K::NAME, error = %err, "close on drop failed");
        }
    }
}

impl<C: Connection, K: CursorKind> std::fmt::Debug for RemoteCursor<'_, C, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCursor")
            .field("kind", &K::NAME)
            .field("state", &self.state)
            .field("buffered", &self.buffer.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::LoopbackConnection;
    use tenantdb_core::PrincipalId;
    use tenantdb_protocol::{MessageHandler, OwnerCursor, StartOwnerCursor};

    /// Serves owner ids `0..total` in batches of `size`, recording every
    /// message it sees.
    struct Scripted {
        total: usize,
        size: usize,
        sent: usize,
        log: Vec<ProtocolMessage>,
    }

    impl Scripted {
        fn new(total: usize, size: usize) -> Self {
            Self {
                total,
                size,
                sent: 0,
                log: Vec::new(),
            }
        }

        fn next_batch(&mut self) -> ProtocolMessage {
            let end = (self.sent + self.size).min(self.total);
            let items = (self.sent..end).map(|i| PrincipalId::new(i.to_string())).collect();
            self.sent = end;
            let batch = if end == self.total {
                Batch::last(Some(9), items)
            } else {
                Batch::more(9, items)
            };
            ProtocolMessage::OwnerBatch(batch)
        }
    }

    impl MessageHandler for Scripted {
        fn handle(&mut self, message: ProtocolMessage) -> Option<ProtocolMessage> {
            self.log.push(message.clone());
            match message {
                ProtocolMessage::StartOwnerCursor(_) | ProtocolMessage::PullOwnerBatch(_) => {
                    Some(self.next_batch())
                }
                _ => None,
            }
        }
    }

    fn start_message() -> ProtocolMessage {
        ProtocolMessage::StartOwnerCursor(StartOwnerCursor {
            entity_id: "e".into(),
        })
    }

    #[test]
    fn iterates_across_batches() {
        let mut conn = LoopbackConnection::new(Scripted::new(5, 2));
        let cursor = RemoteCursor::<_, OwnerCursor>::start(&mut conn, &start_message()).unwrap();
        let owners: Vec<_> = cursor.collect::<CoreResult<_>>().unwrap();
        assert_eq!(owners.len(), 5);

        // start + two pulls, no close after the final batch
        let log = &conn.handler().log;
        assert_eq!(log.len(), 3);
        assert!(!log
            .iter()
            .any(|m| matches!(m, ProtocolMessage::CloseOwnerCursor(_))));
    }

    #[test]
    fn close_active_cursor_sends_close() {
        let mut conn = LoopbackConnection::new(Scripted::new(10, 2));
        let mut cursor =
            RemoteCursor::<_, OwnerCursor>::start(&mut conn, &start_message()).unwrap();
        assert_eq!(cursor.cursor_id(), Some(9));
        assert!(cursor.next().is_some());
        cursor.close().unwrap();

        let last = conn.handler().log.last().cloned();
        assert_eq!(
            last,
            Some(ProtocolMessage::CloseOwnerCursor(CursorRef { cursor_id: 9 }))
        );
    }

    #[test]
    fn drop_closes_active_cursor() {
        let mut conn = LoopbackConnection::new(Scripted::new(10, 2));
        {
            let _cursor =
                RemoteCursor::<_, OwnerCursor>::start(&mut conn, &start_message()).unwrap();
        }
        assert!(matches!(
            conn.handler().log.last(),
            Some(ProtocolMessage::CloseOwnerCursor(_))
        ));
    }

    #[test]
    fn final_cursor_rejects_further_batches() {
        let mut conn = LoopbackConnection::new(Scripted::new(2, 5));
        let mut cursor =
            RemoteCursor::<_, OwnerCursor>::start(&mut conn, &start_message()).unwrap();
        assert_eq!(cursor.state(), CursorState::Final);
        assert_eq!(cursor.next_batch().unwrap().len(), 2);
        assert!(matches!(
            cursor.next_batch(),
            Err(CoreError::CursorClosed { .. })
        ));
        cursor.close().unwrap();
        assert_eq!(conn.handler().log.len(), 1);
    }
}
