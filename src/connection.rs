//! The orchestration façade: owns a storage backend, hands out snapshots and
//! serializes transactions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::StoreConfig;
use crate::construct::{GENESIS, TxId};
use crate::database::Database;
use crate::encoding::{self, Index};
use crate::error::{ConnectionError, ConnectionResult, StorageError, StorageResult, TransactionError, TxResult};
use crate::storage::{BatchOp, Storage, WriteBatch};
use crate::transaction::{self, Staged, Transactable, Transaction, TransactionResult};

// reads of the commit marker after a write timed out
const OUTCOME_ATTEMPTS: u64 = 3;

pub struct Connection {
    storage: Arc<dyn Storage>,
    // held from reserving a t until the batch for it has landed (or failed)
    writer: Mutex<()>,
    // the highest t this connection has seen durable
    latest: AtomicU64,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("latest", &self.latest.load(Ordering::SeqCst))
            .finish()
    }
}

impl Connection {
    /// Takes ownership of `storage`.
    pub fn new(storage: impl Storage + 'static) -> ConnectionResult<Self> {
        Self::with_shared(Arc::new(storage))
    }

    /// Wraps an already shared backend. Other connections over the same
    /// durable store are fenced off by the commit marker.
    pub fn with_shared(storage: Arc<dyn Storage>) -> ConnectionResult<Self> {
        let latest = storage.latest_committed_marker()?.unwrap_or(GENESIS);
        info!(t = latest, "connection opened");
        Ok(Self {
            storage,
            writer: Mutex::new(()),
            latest: AtomicU64::new(latest),
        })
    }

    /// Opens the backend `config` selects.
    pub fn open(config: &StoreConfig) -> ConnectionResult<Self> {
        Self::with_shared(config.open_storage()?)
    }

    /// The latest durable `t`. Also refreshes the cached value, which may lag
    /// when another connection writes to the same store.
    pub fn latest_t(&self) -> ConnectionResult<TxId> {
        let durable = self.storage.latest_committed_marker()?.unwrap_or(GENESIS);
        self.latest.fetch_max(durable, Ordering::SeqCst);
        Ok(durable)
    }

    /// The latest `t` this connection knows of, without asking the backend.
    pub fn cached_t(&self) -> TxId {
        self.latest.load(Ordering::SeqCst)
    }

    pub fn as_of(&self, t: TxId) -> ConnectionResult<Database> {
        let latest = self.latest_t()?;
        if t > latest {
            return Err(ConnectionError::UnknownT { requested: t, latest });
        }
        Ok(Database::new(self.storage.clone(), t))
    }

    pub fn db(&self) -> ConnectionResult<Database> {
        let latest = self.latest_t()?;
        Ok(Database::new(self.storage.clone(), latest))
    }

    pub fn transact(&self, txable: &impl Transactable) -> TxResult<TransactionResult> {
        self.transact_tx(txable.transaction())
    }

    pub fn transact_tx(&self, tx: Transaction) -> TxResult<TransactionResult> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let latest = self.storage.latest_committed_marker()?.unwrap_or(GENESIS);
        let t = latest
            .checked_add(1)
            .ok_or_else(|| TransactionError::StorageFailure("transaction counter exhausted".into()))?;
        let before = Database::new(self.storage.clone(), latest);
        let staged = transaction::stage(&before, &tx, t).inspect_err(|e| {
            warn!(t, error = %e, "transaction rejected");
        })?;
        let batch = staged.batch(Utc::now())?;
        self.commit(t, &staged, batch)?;
        self.latest.fetch_max(t, Ordering::SeqCst);
        info!(t, facts = staged.facts().len(), "transaction committed");
        let after = Database::new(self.storage.clone(), t);
        Ok(TransactionResult::new(before, after, staged))
    }

    fn commit(&self, t: TxId, staged: &Staged, batch: WriteBatch) -> TxResult<()> {
        // kept to tell our own commit apart after a timeout
        let record_key = encoding::tx_key(t);
        let record = batch.ops().iter().find_map(|op| match op {
            BatchOp::Put { key, value } if *key == record_key => Some(value.clone()),
            _ => None,
        });
        match self.storage.write_batch(batch) {
            Ok(()) => Ok(()),
            Err(StorageError::Conflict { found, .. }) => {
                warn!(reserved = t, found = ?found, "lost the race for t to another writer");
                Err(TransactionError::WriteConflict { reserved: t, found })
            }
            Err(StorageError::Timeout(msg)) => {
                warn!(t, error = %msg, "write timed out, checking whether it landed");
                if self.landed(t, staged, record.as_deref())? {
                    info!(t, "timed out write did land");
                    Ok(())
                } else {
                    Err(TransactionError::StorageFailure(format!(
                        "write of t={} timed out and was not applied: {}",
                        t, msg
                    )))
                }
            }
            Err(e) => {
                warn!(t, error = %e, "write failed");
                Err(TransactionError::StorageFailure(e.to_string()))
            }
        }
    }

    // Whether the batch for `t` is durable: what sits at `t` must be what we
    // wrote. Someone else's commit at `t` means we lost the race after all.
    fn landed(&self, t: TxId, staged: &Staged, record: Option<&[u8]>) -> TxResult<bool> {
        let unknown = |e: StorageError| {
            warn!(t, error = %e, "outcome of timed out write unknown");
            TransactionError::StorageFailure(format!(
                "write of t={} timed out and its outcome is unknown, it may have landed: {}",
                t, e
            ))
        };
        let durable = self.marker_after_timeout(t).map_err(unknown)?;
        debug!(t, durable = ?durable, "commit marker after timeout");
        if durable.is_none_or(|d| d < t) {
            return Ok(false);
        }
        let written = self.storage.read(&encoding::tx_key(t)).map_err(unknown)?;
        let ours = written.as_deref() == record
            && match staged.facts().first() {
                Some(fact) => self
                    .storage
                    .read(&encoding::encode_key(Index::Eavt, fact))
                    .map_err(unknown)?
                    .is_some(),
                None => true,
            };
        if ours {
            Ok(true)
        } else {
            Err(TransactionError::WriteConflict { reserved: t, found: durable })
        }
    }

    fn marker_after_timeout(&self, t: TxId) -> StorageResult<Option<TxId>> {
        let mut attempt = 1;
        loop {
            match self.storage.latest_committed_marker() {
                Err(e) if attempt < OUTCOME_ATTEMPTS => {
                    debug!(t, attempt, error = %e, "commit marker unreadable, retrying");
                    thread::sleep(Duration::from_millis(10 * attempt));
                    attempt += 1;
                }
                marker => return marker,
            }
        }
    }

    /// Closes the backend. Snapshots handed out earlier fail with
    /// `Unavailable` from then on.
    pub fn close(&self) -> ConnectionResult<()> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.storage.close()?;
        info!(t = self.cached_t(), "connection closed");
        Ok(())
    }
}
