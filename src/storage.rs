//! The persistence contract every backend satisfies, plus the in-memory backend.
//!
//! A backend is an ordered key-value store. It never interprets keys beyond
//! their byte order, applies a [`WriteBatch`] atomically and keeps the commit
//! marker (the highest durable transaction id) next to the data it covers.

use std::collections::{BTreeMap, VecDeque};
use std::ops::Bound;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::construct::{GENESIS, TxId};
use crate::encoding::KeyRange;
use crate::error::{StorageError, StorageResult};

pub const DEFAULT_PAGE_SIZE: usize = 256;

pub type Entry = (Vec<u8>, Vec<u8>);

pub trait Storage: Send + Sync {
    fn read(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;
    /// Entries in `range`, ascending by key. Every call starts over at the
    /// beginning of the range.
    fn scan(&self, range: KeyRange) -> StorageResult<ScanIter<'_>>;
    /// Applies every operation of the batch, or none of them.
    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()>;
    fn latest_committed_marker(&self) -> StorageResult<Option<TxId>>;
    fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}

// ------------- Write batches -------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<BatchOp>,
    marker: Option<TxId>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> &mut Self {
        self.ops.push(BatchOp::Put { key, value });
        self
    }
    pub fn delete(&mut self, key: Vec<u8>) -> &mut Self {
        self.ops.push(BatchOp::Delete { key });
        self
    }
    /// The batch commits transaction `t`; the backend advances its marker to
    /// `t` atomically with the operations.
    pub fn commit_marker(&mut self, t: TxId) -> &mut Self {
        self.marker = Some(t);
        self
    }
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }
    pub fn marker(&self) -> Option<TxId> {
        self.marker
    }
    pub fn len(&self) -> usize {
        self.ops.len()
    }
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty() && self.marker.is_none()
    }
}

/// Fencing: a batch carrying marker `t` is only accepted directly on top of
/// `t - 1`. A writer that lost the race for `t` finds the marker already moved.
pub fn check_marker(durable: Option<TxId>, proposed: TxId) -> StorageResult<()> {
    let current = durable.unwrap_or(GENESIS);
    if proposed == GENESIS || current.checked_add(1) != Some(proposed) {
        return Err(StorageError::Conflict {
            expected: proposed.checked_sub(1).filter(|t| *t > GENESIS),
            found: durable,
        });
    }
    Ok(())
}

// ------------- Scans -------------
/// A backend able to serve a scan one page at a time.
pub trait PageSource: Send + Sync {
    /// At most `limit` entries of `range` with keys strictly after `after`
    /// (or from the start of the range), ascending.
    fn page(&self, range: &KeyRange, after: Option<&[u8]>, limit: usize) -> StorageResult<Vec<Entry>>;
}

/// A lazy, ordered sequence of entries. Paged backends fetch the next page
/// only when the previous one has been consumed, so no backend lock is held
/// between pages. The first error ends the sequence.
pub struct ScanIter<'a> {
    inner: Box<dyn Iterator<Item = StorageResult<Entry>> + Send + 'a>,
}

impl<'a> ScanIter<'a> {
    pub fn new(inner: impl Iterator<Item = StorageResult<Entry>> + Send + 'a) -> Self {
        Self { inner: Box::new(inner) }
    }
    pub fn paged(source: &'a dyn PageSource, range: KeyRange, page_size: usize) -> Self {
        Self::new(Paged {
            source,
            range,
            page_size: page_size.max(1),
            last: None,
            buffer: VecDeque::new(),
            done: false,
        })
    }
}

impl Iterator for ScanIter<'_> {
    type Item = StorageResult<Entry>;
    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

struct Paged<'a> {
    source: &'a dyn PageSource,
    range: KeyRange,
    page_size: usize,
    last: Option<Vec<u8>>,
    buffer: VecDeque<Entry>,
    done: bool,
}

impl Iterator for Paged<'_> {
    type Item = StorageResult<Entry>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.done {
            match self.source.page(&self.range, self.last.as_deref(), self.page_size) {
                Ok(page) => {
                    if page.len() < self.page_size {
                        self.done = true;
                    }
                    self.buffer.extend(page);
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
        let entry = self.buffer.pop_front()?;
        self.last = Some(entry.0.clone());
        Some(Ok(entry))
    }
}

// ------------- Memory -------------
#[derive(Debug, Default)]
struct MemoryState {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
    marker: Option<TxId>,
    closed: bool,
}

/// An ordered in-memory store. Clones are handles on the same store, which is
/// how several connections can be pointed at one "durable" state.
#[derive(Debug, Clone)]
pub struct MemoryStorage {
    state: Arc<RwLock<MemoryState>>,
    page_size: usize,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::with_page_size(DEFAULT_PAGE_SIZE)
    }
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            page_size: page_size.max(1),
        }
    }
    pub fn len(&self) -> usize {
        self.state.read().unwrap_or_else(PoisonError::into_inner).map.len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn closed() -> StorageError {
        StorageError::Unavailable("memory storage is closed".into())
    }
}

impl PageSource for MemoryStorage {
    fn page(&self, range: &KeyRange, after: Option<&[u8]>, limit: usize) -> StorageResult<Vec<Entry>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return Err(Self::closed());
        }
        let lower = match after {
            Some(key) if key >= range.start.as_slice() => Bound::Excluded(key.to_vec()),
            _ => Bound::Included(range.start.clone()),
        };
        // BTreeMap::range panics on an inverted range
        if let (Some(end), Bound::Included(start) | Bound::Excluded(start)) = (&range.end, &lower) {
            if start >= end {
                return Ok(Vec::new());
            }
        }
        let upper = match &range.end {
            Some(end) => Bound::Excluded(end.clone()),
            None => Bound::Unbounded,
        };
        Ok(state
            .map
            .range((lower, upper))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

impl Storage for MemoryStorage {
    fn read(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return Err(Self::closed());
        }
        Ok(state.map.get(key).cloned())
    }

    fn scan(&self, range: KeyRange) -> StorageResult<ScanIter<'_>> {
        if self.state.read().unwrap_or_else(PoisonError::into_inner).closed {
            return Err(Self::closed());
        }
        Ok(ScanIter::paged(self, range, self.page_size))
    }

    fn write_batch(&self, batch: WriteBatch) -> StorageResult<()> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return Err(Self::closed());
        }
        if let Some(t) = batch.marker() {
            check_marker(state.marker, t)?;
        }
        let marker = batch.marker();
        let ops = batch.ops.len();
        // everything below is infallible, so the batch lands whole
        for op in batch.ops {
            match op {
                BatchOp::Put { key, value } => {
                    state.map.insert(key, value);
                }
                BatchOp::Delete { key } => {
                    state.map.remove(&key);
                }
            }
        }
        if marker.is_some() {
            state.marker = marker;
        }
        debug!(ops, marker = ?marker, "memory batch applied");
        Ok(())
    }

    fn latest_committed_marker(&self) -> StorageResult<Option<TxId>> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if state.closed {
            return Err(Self::closed());
        }
        Ok(state.marker)
    }

    fn close(&self) -> StorageResult<()> {
        self.state.write().unwrap_or_else(PoisonError::into_inner).closed = true;
        Ok(())
    }
}
