#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tempora::construct::{EntityId, TxId};
use tempora::database::Database;
use tempora::encoding::{Index, KeyRange};
use tempora::error::{StorageError, StorageResult};
use tempora::schema::AttributeSchema;
use tempora::storage::{MemoryStorage, ScanIter, Storage, WriteBatch};
use tempora::{Connection, Fact, Transaction, ValueType};

pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// What the next `write_batch` does instead of simply applying the batch.
pub enum Fault {
    None,
    FailBeforeApply,
    TimeoutAfterApply,
    TimeoutWithoutApply,
    // applies the batch, times out, then fails the given number of reads
    TimeoutAfterApplyThenReadsFail(usize),
    // runs right before the batch is handed to the backend
    Interleave(Box<dyn FnOnce() + Send>),
}

/// A memory backend with injectable failures.
pub struct FaultyStorage {
    inner: MemoryStorage,
    next_write: Mutex<Fault>,
    reads_down: AtomicBool,
    failing_reads: AtomicUsize,
}

impl FaultyStorage {
    pub fn new(inner: MemoryStorage) -> Self {
        Self {
            inner,
            next_write: Mutex::new(Fault::None),
            reads_down: AtomicBool::new(false),
            failing_reads: AtomicUsize::new(0),
        }
    }
    pub fn arm(&self, fault: Fault) {
        *self.next_write.lock().unwrap() = fault;
    }
    pub fn reads_down(&self, down: bool) {
        self.reads_down.store(down, Ordering::SeqCst);
    }
    pub fn inner(&self) -> &MemoryStorage {
        &self.inner
    }
    fn check_reads(&self) -> StorageResult<()> {
        let failing = self
            .failing_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing || self.reads_down.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable("injected read outage".into()))
        } else {
            Ok(())
        }
    }
}

impl Storage for FaultyStorage {
    fn read(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        self.check_reads()?;
        self.inner.read(key)
    }
    fn scan(&self, range: KeyRange) -> StorageResult<ScanIter<'_>> {
        self.check_reads()?;
        self.inner.scan(range)
    }
    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()> {
        let fault = std::mem::replace(&mut *self.next_write.lock().unwrap(), Fault::None);
        match fault {
            Fault::None => self.inner.write_batch(batch),
            Fault::FailBeforeApply => Err(StorageError::Unavailable("injected write failure".into())),
            Fault::TimeoutAfterApply => {
                self.inner.write_batch(batch)?;
                Err(StorageError::Timeout("injected timeout after apply".into()))
            }
            Fault::TimeoutWithoutApply => Err(StorageError::Timeout("injected timeout".into())),
            Fault::TimeoutAfterApplyThenReadsFail(reads) => {
                self.inner.write_batch(batch)?;
                self.failing_reads.store(reads, Ordering::SeqCst);
                Err(StorageError::Timeout("injected timeout after apply".into()))
            }
            Fault::Interleave(other_writer) => {
                other_writer();
                self.inner.write_batch(batch)
            }
        }
    }
    fn latest_committed_marker(&self) -> StorageResult<Option<TxId>> {
        self.check_reads()?;
        self.inner.latest_committed_marker()
    }
}

pub fn faulty_connection() -> (Arc<FaultyStorage>, Connection) {
    init_logging();
    let storage = Arc::new(FaultyStorage::new(MemoryStorage::new()));
    let connection = Connection::with_shared(storage.clone()).expect("connection");
    (storage, connection)
}

pub fn memory_connection() -> Connection {
    init_logging();
    Connection::new(MemoryStorage::new()).expect("connection")
}

/// The people schema used throughout the tests.
pub fn people_schema() -> Transaction {
    Transaction::new()
        .append(&AttributeSchema::new("person/name", ValueType::String).doc("full name"))
        .append(&AttributeSchema::new("person/email", ValueType::String).unique())
        .append(&AttributeSchema::new("person/friend", ValueType::Ref).many())
        .append(&AttributeSchema::new("person/tag", ValueType::String).many())
        .append(&AttributeSchema::new("person/age", ValueType::Integer).indexed())
        .append(&AttributeSchema::new("person/height", ValueType::Float))
}

pub fn declare_people(connection: &Connection) -> TxId {
    connection.transact(&people_schema()).expect("schema").t()
}

pub fn attr(db: &Database, ident: &str) -> EntityId {
    db.lookup_ident(ident)
        .expect("lookup")
        .unwrap_or_else(|| panic!("attribute {} not declared", ident))
}

/// Every index view is a consistent projection of the same facts.
pub fn assert_indexes_consistent(db: &Database) {
    let mut eavt = db.datoms(Index::Eavt).unwrap();
    let mut aevt = db.datoms(Index::Aevt).unwrap();
    eavt.sort();
    aevt.sort();
    assert_eq!(eavt, aevt, "EAVT and AEVT must hold the same facts");
    let expected = |index: Index| -> Vec<Fact> {
        eavt.iter()
            .filter(|f| db.attribute(f.attribute()).unwrap().unwrap().in_index(index))
            .cloned()
            .collect()
    };
    for index in [Index::Avet, Index::Vaet] {
        let mut found = db.datoms(index).unwrap();
        found.sort();
        assert_eq!(found, expected(index), "{} out of step with EAVT", index.name());
    }
}
