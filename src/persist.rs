// used for persistence
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params};

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::debug;

use crate::construct::TxId;
use crate::encoding::KeyRange;
use crate::error::{StorageError, StorageResult};
use crate::storage::{BatchOp, DEFAULT_PAGE_SIZE, Entry, PageSource, ScanIter, Storage, WriteBatch, check_marker};

pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistenceMode {
    InMemory,
    File(PathBuf),
}

/// An embedded SQLite backend. Keys and values are stored as blobs, which
/// SQLite compares with `memcmp`, so `order by key` is the byte order the
/// index encoding relies on.
///
/// A file database runs in WAL mode with a second connection for reads, so
/// readers never queue behind a batch that is waiting for the write lock.
#[derive(Debug)]
pub struct Persistor {
    // None once closed
    db: Mutex<Option<Connection>>,
    // file mode only, an in-memory database is private to `db`
    reader: Option<Mutex<Option<Connection>>>,
    mode: PersistenceMode,
    page_size: usize,
}

impl Persistor {
    pub fn new(mode: PersistenceMode) -> StorageResult<Self> {
        Self::with_options(mode, DEFAULT_PAGE_SIZE, DEFAULT_BUSY_TIMEOUT_MS)
    }

    pub fn with_options(mode: PersistenceMode, page_size: usize, busy_timeout_ms: u64) -> StorageResult<Self> {
        let busy_timeout = Duration::from_millis(busy_timeout_ms);
        let connection = match &mode {
            PersistenceMode::InMemory => Connection::open_in_memory()?,
            PersistenceMode::File(path) => {
                let connection = Connection::open(path)?;
                connection.execute_batch("pragma journal_mode = wal;")?;
                connection
            }
        };
        // a writer waiting on another process gives up after this long and
        // reports a timeout instead of blocking indefinitely
        connection.busy_timeout(busy_timeout)?;
        // The "STRICT" keyword introduced in 3.37.0 breaks JDBC connections, which makes
        // debugging using an external tool like DBeaver impossible
        connection.execute_batch(
            "
            pragma synchronous = full;
            create table if not exists Entry (
                EntryKey blob not null,
                EntryValue blob not null,
                constraint unique_and_ordered_EntryKey primary key (
                    EntryKey
                )
            ) without rowid;-- STRICT;
            create table if not exists CommitMarker (
                Marker_Identity integer not null check (Marker_Identity = 0),
                Latest_T integer not null,
                constraint single_CommitMarker primary key (
                    Marker_Identity
                )
            );-- STRICT;
            ",
        )?;
        let reader = match &mode {
            PersistenceMode::InMemory => None,
            PersistenceMode::File(path) => {
                let reader = Connection::open(path)?;
                reader.busy_timeout(busy_timeout)?;
                Some(Mutex::new(Some(reader)))
            }
        };
        debug!(mode = ?mode, page_size, busy_timeout_ms, "sqlite storage opened");
        Ok(Self {
            db: Mutex::new(Some(connection)),
            reader,
            mode,
            page_size: page_size.max(1),
        })
    }

    pub fn mode(&self) -> &PersistenceMode {
        &self.mode
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_reader(&self) -> MutexGuard<'_, Option<Connection>> {
        match &self.reader {
            Some(reader) => reader.lock().unwrap_or_else(PoisonError::into_inner),
            None => self.lock(),
        }
    }

    fn unavailable() -> StorageError {
        StorageError::Unavailable("sqlite storage is closed".into())
    }
}

// SQLite integers are signed
fn to_sql_t(t: TxId) -> StorageResult<i64> {
    i64::try_from(t).map_err(|_| StorageError::Unavailable(format!("t={} exceeds the sqlite integer range", t)))
}

fn from_sql_t(t: i64) -> StorageResult<TxId> {
    TxId::try_from(t).map_err(|_| StorageError::Corrupt(format!("negative commit marker {}", t)))
}

fn read_marker(db: &Connection) -> StorageResult<Option<TxId>> {
    db.query_row(
        "select Latest_T from CommitMarker where Marker_Identity = 0",
        [],
        |r| r.get::<_, i64>(0),
    )
    .optional()?
    .map(from_sql_t)
    .transpose()
}

impl Persistor {
    fn fetch_page(&self, range: &KeyRange, after: Option<&[u8]>, limit: usize) -> StorageResult<Vec<Entry>> {
        let guard = self.lock_reader();
        let db = guard.as_ref().ok_or_else(Self::unavailable)?;
        let (op, lower) = match after {
            Some(key) if key >= range.start.as_slice() => (">", key),
            _ => (">=", range.start.as_slice()),
        };
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = match &range.end {
            Some(end) => {
                let mut statement = db.prepare_cached(&format!(
                    "select EntryKey, EntryValue from Entry where EntryKey {} ?1 and EntryKey < ?2 order by EntryKey limit ?3",
                    op
                ))?;
                let rows = statement
                    .query_map(params![lower, end, limit], |r| Ok((r.get(0)?, r.get(1)?)))?
                    .collect::<Result<Vec<Entry>, _>>()?;
                rows
            }
            None => {
                let mut statement = db.prepare_cached(&format!(
                    "select EntryKey, EntryValue from Entry where EntryKey {} ?1 order by EntryKey limit ?2",
                    op
                ))?;
                let rows = statement
                    .query_map(params![lower, limit], |r| Ok((r.get(0)?, r.get(1)?)))?
                    .collect::<Result<Vec<Entry>, _>>()?;
                rows
            }
        };
        Ok(rows)
    }

    fn lookup(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let guard = self.lock_reader();
        let db = guard.as_ref().ok_or_else(Self::unavailable)?;
        let value = db
            .prepare_cached("select EntryValue from Entry where EntryKey = ?1")?
            .query_row(params![key], |r| r.get::<_, Vec<u8>>(0))
            .optional()?;
        Ok(value)
    }
}

impl PageSource for Persistor {
    fn page(&self, range: &KeyRange, after: Option<&[u8]>, limit: usize) -> StorageResult<Vec<Entry>> {
        self.fetch_page(range, after, limit).map_err(StorageError::for_read)
    }
}

impl Storage for Persistor {
    fn read(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.lookup(key).map_err(StorageError::for_read)
    }

    fn scan(&self, range: KeyRange) -> StorageResult<ScanIter<'_>> {
        if self.lock_reader().is_none() {
            return Err(Self::unavailable());
        }
        Ok(ScanIter::paged(self, range, self.page_size))
    }

    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut guard = self.lock();
        let db = guard.as_mut().ok_or_else(Self::unavailable)?;
        // immediate: the write lock is taken before the marker is checked, so
        // no other process can slip a commit in between
        let tx = db.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if let Some(t) = batch.marker() {
            check_marker(read_marker(&tx)?, t)?;
        }
        {
            let mut put = tx.prepare_cached("insert or replace into Entry (EntryKey, EntryValue) values (?1, ?2)")?;
            let mut delete = tx.prepare_cached("delete from Entry where EntryKey = ?1")?;
            for op in batch.ops() {
                match op {
                    BatchOp::Put { key, value } => put.execute(params![key, value])?,
                    BatchOp::Delete { key } => delete.execute(params![key])?,
                };
            }
        }
        if let Some(t) = batch.marker() {
            tx.execute(
                "insert into CommitMarker (Marker_Identity, Latest_T) values (0, ?1)
                    on conflict (Marker_Identity) do update set Latest_T = excluded.Latest_T",
                params![to_sql_t(t)?],
            )?;
        }
        // dropping an uncommitted transaction rolls it back
        tx.commit()?;
        debug!(ops = batch.len(), marker = ?batch.marker(), "sqlite batch committed");
        Ok(())
    }

    fn latest_committed_marker(&self) -> StorageResult<Option<TxId>> {
        let guard = self.lock_reader();
        let db = guard.as_ref().ok_or_else(Self::unavailable)?;
        read_marker(db).map_err(StorageError::for_read)
    }

    fn close(&self) -> StorageResult<()> {
        // the writer goes last so the WAL is checkpointed on its way out
        if let Some(reader) = &self.reader {
            if let Some(db) = reader.lock().unwrap_or_else(PoisonError::into_inner).take() {
                db.close().map_err(|(_, e)| StorageError::from(e))?;
            }
        }
        if let Some(db) = self.lock().take() {
            db.close().map_err(|(_, e)| StorageError::from(e))?;
            debug!(mode = ?self.mode, "sqlite storage closed");
        }
        Ok(())
    }
}
