use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, Ordering::SeqCst},
};

use bytes::Bytes;

use crate::{
    cursor::Cursor,
    error::Result,
    memtable::{MemIter, MemTable},
    options::OpenOptions,
    status::Code,
};

/// Engine-side state shared by a [`Database`] and every cursor derived from
/// it. Raw operations report [`Code`]s; the public wrappers translate them
/// exactly once.
pub(crate) struct DbCore {
    table: MemTable,
    seq: AtomicU64,
    closed: AtomicBool,
    mem_limit: usize,
}

impl DbCore {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(SeqCst)
    }

    pub(crate) fn range_capable(&self) -> bool {
        self.table.range_capable()
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, SeqCst) + 1
    }

    fn over_budget(&self) -> bool {
        self.table.mem_usage() > self.mem_limit
    }

    pub(crate) fn kv_store(&self, key: &[u8], value: &[u8]) -> Code {
        if self.is_closed() {
            return Code::Closed;
        }
        if self.over_budget() {
            return Code::Full;
        }
        self.table.put(self.next_seq(), key, value);
        Code::Ok
    }

    pub(crate) fn kv_append(&self, key: &[u8], value: &[u8]) -> Code {
        if self.is_closed() {
            return Code::Closed;
        }
        if self.over_budget() {
            return Code::Full;
        }
        match self.table.get(key) {
            Some(existing) => {
                let mut joined = Vec::with_capacity(existing.len() + value.len());
                joined.extend_from_slice(&existing);
                joined.extend_from_slice(value);
                self.table.put(self.next_seq(), key, &joined);
            }
            None => self.table.put(self.next_seq(), key, value),
        }
        Code::Ok
    }

    pub(crate) fn kv_fetch(&self, key: &[u8]) -> (Code, Option<Bytes>) {
        if self.is_closed() {
            return (Code::Closed, None);
        }
        match self.table.get(key) {
            Some(value) => (Code::Ok, Some(value)),
            None => (Code::NotFound, None),
        }
    }

    /// Tombstones `key`. Reports `NotFound` when no live revision exists.
    /// Deletes are exempt from the memory budget so a full database can
    /// still be emptied.
    pub(crate) fn kv_delete(&self, key: &[u8]) -> Code {
        if self.is_closed() {
            return Code::Closed;
        }
        if self.table.get(key).is_none() {
            return Code::NotFound;
        }
        self.table.tombstone(self.next_seq(), key);
        Code::Ok
    }

    /// Cursor-state allocation per the storage-handle contract.
    pub(crate) fn cursor_init(&self) -> (Code, Option<MemIter>) {
        if self.is_closed() {
            return (Code::Closed, None);
        }
        (Code::Ok, Some(self.table.raw_iter()))
    }

    /// Cursor-state release. Succeeds even after the handle itself was
    /// closed: cleanup ordering between a cursor and its handle is
    /// caller-managed and must stay forgiving.
    pub(crate) fn cursor_release(&self, state: MemIter) -> Code {
        drop(state);
        Code::Ok
    }
}

/// An open handle onto an ordered key-value space.
///
/// The handle owns the key space; cursors borrow into it and every cursor
/// operation re-checks that the handle is still open. Closing is idempotent
/// and also runs from `Drop` as a safety net.
pub struct Database {
    core: Arc<DbCore>,
}

impl Database {
    pub fn open(options: OpenOptions) -> Result<Database> {
        let core = Arc::new(DbCore {
            table: MemTable::new(),
            seq: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            mem_limit: options.mem_limit,
        });

        tracing::info!(mem_limit = options.mem_limit, "database opened");
        Ok(Database { core })
    }

    pub fn close(&mut self) -> Result<()> {
        if self.core.closed.swap(true, SeqCst) {
            tracing::warn!("database is already closed");
            return Ok(());
        }
        tracing::info!("database closed");
        Ok(())
    }

    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.core.kv_store(key, value).into_result()
    }

    /// Appends `value` to the record stored under `key`, storing it outright
    /// when the key is absent.
    pub fn append(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.core.kv_append(key, value).into_result()
    }

    pub fn get(&self, key: &[u8]) -> Result<Option<Bytes>> {
        match self.core.kv_fetch(key) {
            (Code::NotFound, _) => Ok(None),
            (code, value) => {
                code.into_result()?;
                Ok(value)
            }
        }
    }

    /// Removes the record stored under `key`. Deleting an absent key reports
    /// [`Error::NotFound`](crate::error::Error::NotFound).
    pub fn delete(&self, key: &[u8]) -> Result<()> {
        self.core.kv_delete(key).into_result()
    }

    /// Allocates a cursor over this handle's key space. The cursor starts
    /// unpositioned.
    pub fn cursor(&self) -> Result<Cursor> {
        Cursor::create(self.core.clone())
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if self.core.is_closed() {
            return;
        }
        if let Err(err) = self.close() {
            tracing::error!("failed to close database: {err}");
        }
    }
}
