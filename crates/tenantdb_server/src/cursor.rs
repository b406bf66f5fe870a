//! Server-side cursors.

use std::collections::{HashMap, VecDeque};
use tenantdb_core::{CoreError, CoreResult};
use tenantdb_protocol::Batch;

/// Open cursors of one kind for one connection.
///
/// A cursor holds the items not yet sent. It disappears when its last batch
/// is sent or when it is closed; pulling it afterwards fails with
/// `CursorClosed`.
#[derive(Debug)]
pub struct CursorTable<T> {
    batch_size: usize,
    max_open: usize,
    next_id: u64,
    open: HashMap<u64, VecDeque<T>>,
}

impl<T> CursorTable<T> {
    /// Creates an empty table.
    #[must_use]
    pub fn new(batch_size: usize, max_open: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            max_open,
            next_id: 1,
            open: HashMap::new(),
        }
    }

    /// Opens a cursor over `items` and returns its first batch.
    ///
    /// If everything fits in the first batch no cursor is kept and the batch
    /// carries no id.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if too many cursors are open.
    pub fn open(&mut self, items: Vec<T>) -> CoreResult<Batch<T>> {
        let mut remaining: VecDeque<T> = items.into();
        let first = take_batch(&mut remaining, self.batch_size);
        if remaining.is_empty() {
            return Ok(Batch::last(None, first));
        }

        if self.open.len() >= self.max_open {
            return Err(CoreError::invalid_operation(format!(
                "too many open cursors (limit {})",
                self.max_open
            )));
        }

        let cursor_id = self.next_id;
        self.next_id += 1;
        self.open.insert(cursor_id, remaining);
        Ok(Batch::more(cursor_id, first))
    }

    /// Returns the next batch of a cursor.
    ///
    /// # Errors
    ///
    /// Returns `CursorClosed` if the cursor is exhausted, closed or unknown.
    pub fn pull(&mut self, cursor_id: u64) -> CoreResult<Batch<T>> {
        let remaining = self
            .open
            .get_mut(&cursor_id)
            .ok_or(CoreError::CursorClosed { cursor_id })?;
        let items = take_batch(remaining, self.batch_size);
        if remaining.is_empty() {
            self.open.remove(&cursor_id);
            Ok(Batch::last(Some(cursor_id), items))
        } else {
            Ok(Batch::more(cursor_id, items))
        }
    }

    /// Closes a cursor. Returns false if it was not open.
    pub fn close(&mut self, cursor_id: u64) -> bool {
        self.open.remove(&cursor_id).is_some()
    }

    /// Closes every cursor.
    pub fn clear(&mut self) {
        self.open.clear();
    }

    /// Number of open cursors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.open.len()
    }

    /// Returns true if no cursor is open.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.open.is_empty()
    }
}

fn take_batch<T>(items: &mut VecDeque<T>, size: usize) -> Vec<T> {
    let n = size.min(items.len());
    items.drain(..n).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_result_needs_no_cursor() {
        let mut table = CursorTable::new(10, 4);
        let batch = table.open(vec![1, 2, 3]).unwrap();
        assert!(batch.is_final);
        assert_eq!(batch.cursor_id, None);
        assert_eq!(batch.items, [1, 2, 3]);
        assert!(table.is_empty());
    }

    #[test]
    fn batches_until_final() {
        let mut table = CursorTable::new(2, 4);
        let first = table.open((0..5).collect()).unwrap();
        let id = first.cursor_id.unwrap();
        assert_eq!(first.items, [0, 1]);
        assert!(!first.is_final);

        let second = table.pull(id).unwrap();
        assert_eq!(second.items, [2, 3]);
        assert!(!second.is_final);

        let third = table.pull(id).unwrap();
        assert_eq!(third.items, [4]);
        assert!(third.is_final);
        assert!(table.is_empty());

        assert!(matches!(
            table.pull(id),
            Err(CoreError::CursorClosed { cursor_id }) if cursor_id == id
        ));
    }

    #[test]
    fn exact_multiple_ends_on_full_batch() {
        let mut table = CursorTable::new(2, 4);
        let first = table.open(vec![1, 2, 3, 4]).unwrap();
        let last = table.pull(first.cursor_id.unwrap()).unwrap();
        assert_eq!(last.items, [3, 4]);
        assert!(last.is_final);
    }

    #[test]
    fn close_then_pull_fails() {
        let mut table = CursorTable::new(1, 4);
        let id = table.open(vec!['a', 'b']).unwrap().cursor_id.unwrap();
        assert!(table.close(id));
        assert!(!table.close(id));
        assert!(table.pull(id).is_err());
    }

    #[test]
    fn open_limit() {
        let mut table = CursorTable::new(1, 1);
        table.open(vec![1, 2]).unwrap();
        assert!(matches!(
            table.open(vec![3, 4]),
            Err(CoreError::InvalidOperation { .. })
        ));
        // fits in one batch, so it does not count against the limit
        assert!(table.open(vec![5]).unwrap().is_final);
    }
}
