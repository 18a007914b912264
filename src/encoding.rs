//! Order-preserving byte encoding of facts, index entries and bookkeeping keys.
//!
//! Every index entry is a key with an empty value:
//!
//! ```text
//! [index tag][components in index order][tx: u64 BE][added: u8]
//! ```
//!
//! Entity and attribute ids are big-endian `u64`. Values are a type tag
//! ([`ValueType::uid`]) followed by a payload that sorts like the value:
//! integers with the sign bit flipped, floats with the IEEE 754 bits
//! transformed so that byte order equals [`f64::total_cmp`], strings and
//! byte blobs with every `0x00` escaped as `0x00 0x01` and terminated by
//! `0x00 0x00`. Comparing two encoded keys byte by byte therefore gives the
//! same answer as comparing the logical tuples.
//!
//! Transaction records live under their own prefix, keyed by `t`, and so does
//! the persisted entity counter.

use chrono::{DateTime, Utc};

use crate::construct::{EntityId, Fact, TxId, TxRecord};
use crate::datatype::{Value, ValueType};
use crate::error::{StorageError, StorageResult};

const SIGN_FLIP: u64 = 0x8000_0000_0000_0000;
const ESCAPE_BYTE: u8 = 0x01;
const TERMINATOR: u8 = 0x00;

pub const TX_LOG: u8 = 0x10;
pub const META: u8 = 0x20;

const ENTITY_COUNTER: &[u8] = b"entity-counter";

// ------------- Index -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Index {
    /// entity, attribute, value, tx
    Eavt,
    /// attribute, entity, value, tx
    Aevt,
    /// attribute, value, entity, tx; unique and indexed attributes only
    Avet,
    /// value, attribute, entity, tx; reference-typed attributes only
    Vaet,
}

impl Index {
    pub const ALL: [Index; 4] = [Index::Eavt, Index::Aevt, Index::Avet, Index::Vaet];

    pub fn tag(self) -> u8 {
        match self {
            Index::Eavt => 0x01,
            Index::Aevt => 0x02,
            Index::Avet => 0x03,
            Index::Vaet => 0x04,
        }
    }
    pub fn from_tag(tag: u8) -> Option<Index> {
        Index::ALL.into_iter().find(|i| i.tag() == tag)
    }
    pub fn name(self) -> &'static str {
        match self {
            Index::Eavt => "EAVT",
            Index::Aevt => "AEVT",
            Index::Avet => "AVET",
            Index::Vaet => "VAET",
        }
    }
}

// ------------- Values -------------
fn encode_bytes_escaped(data: &[u8], buf: &mut Vec<u8>) {
    for &byte in data {
        if byte == 0x00 {
            buf.push(0x00);
            buf.push(ESCAPE_BYTE);
        } else {
            buf.push(byte);
        }
    }
    buf.push(TERMINATOR);
    buf.push(TERMINATOR);
}

fn float_to_sortable(f: f64) -> u64 {
    let bits = f.to_bits();
    if bits & SIGN_FLIP == 0 { bits ^ SIGN_FLIP } else { !bits }
}

fn float_from_sortable(encoded: u64) -> f64 {
    let bits = if encoded & SIGN_FLIP != 0 { encoded ^ SIGN_FLIP } else { !encoded };
    f64::from_bits(bits)
}

pub fn encode_value(value: &Value, buf: &mut Vec<u8>) {
    buf.push(value.value_type().uid());
    match value {
        Value::Boolean(b) => buf.push(u8::from(*b)),
        Value::Integer(i) => buf.extend_from_slice(&((*i as u64) ^ SIGN_FLIP).to_be_bytes()),
        Value::Float(f) => buf.extend_from_slice(&float_to_sortable(*f).to_be_bytes()),
        Value::String(s) => encode_bytes_escaped(s.as_bytes(), buf),
        Value::Bytes(b) => encode_bytes_escaped(b, buf),
        Value::Ref(e) => buf.extend_from_slice(&e.to_be_bytes()),
    }
}

pub fn value_bytes(value: &Value) -> Vec<u8> {
    let mut buf = Vec::with_capacity(10);
    encode_value(value, &mut buf);
    buf
}

/// A cursor over encoded bytes. Every read either succeeds or reports
/// [`StorageError::Corrupt`]; nothing is ever repaired or defaulted.
struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
    fn corrupt(&self, what: &str) -> StorageError {
        StorageError::Corrupt(format!("{} at byte {} of a {} byte key", what, self.pos, self.data.len()))
    }
    fn u8(&mut self) -> StorageResult<u8> {
        let byte = *self.data.get(self.pos).ok_or_else(|| self.corrupt("truncated"))?;
        self.pos += 1;
        Ok(byte)
    }
    fn take<const N: usize>(&mut self) -> StorageResult<[u8; N]> {
        let end = self.pos + N;
        let slice = self.data.get(self.pos..end).ok_or_else(|| self.corrupt("truncated"))?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        self.pos = end;
        Ok(out)
    }
    fn u64(&mut self) -> StorageResult<u64> {
        Ok(u64::from_be_bytes(self.take::<8>()?))
    }
    fn escaped(&mut self) -> StorageResult<Vec<u8>> {
        let mut result = Vec::new();
        loop {
            match self.u8()? {
                0x00 => match self.u8()? {
                    TERMINATOR => return Ok(result),
                    ESCAPE_BYTE => result.push(0x00),
                    other => {
                        return Err(self.corrupt(&format!("invalid escape sequence 0x00 0x{:02x}", other)));
                    }
                },
                byte => result.push(byte),
            }
        }
    }
    fn value(&mut self) -> StorageResult<Value> {
        let tag = self.u8()?;
        let value_type = ValueType::from_uid(tag)
            .ok_or_else(|| self.corrupt(&format!("unknown value tag 0x{:02x}", tag)))?;
        Ok(match value_type {
            ValueType::Boolean => match self.u8()? {
                0 => Value::Boolean(false),
                1 => Value::Boolean(true),
                other => return Err(self.corrupt(&format!("invalid boolean byte {}", other))),
            },
            ValueType::Integer => Value::Integer((self.u64()? ^ SIGN_FLIP) as i64),
            ValueType::Float => Value::Float(float_from_sortable(self.u64()?)),
            ValueType::String => {
                let bytes = self.escaped()?;
                let s = String::from_utf8(bytes).map_err(|_| self.corrupt("invalid UTF-8 in string"))?;
                Value::String(s)
            }
            ValueType::Bytes => Value::Bytes(self.escaped()?),
            ValueType::Ref => Value::Ref(self.u64()?),
        })
    }
    fn finish(&self) -> StorageResult<()> {
        if self.pos == self.data.len() {
            Ok(())
        } else {
            Err(self.corrupt("trailing bytes"))
        }
    }
}

pub fn decode_value(data: &[u8]) -> StorageResult<Value> {
    let mut decoder = Decoder::new(data);
    let value = decoder.value()?;
    decoder.finish()?;
    Ok(value)
}

// ------------- Index keys -------------
pub fn encode_key(index: Index, fact: &Fact) -> Vec<u8> {
    let mut buf = Vec::with_capacity(36);
    buf.push(index.tag());
    let (e, a) = (fact.entity(), fact.attribute());
    match index {
        Index::Eavt => {
            buf.extend_from_slice(&e.to_be_bytes());
            buf.extend_from_slice(&a.to_be_bytes());
            encode_value(fact.value(), &mut buf);
        }
        Index::Aevt => {
            buf.extend_from_slice(&a.to_be_bytes());
            buf.extend_from_slice(&e.to_be_bytes());
            encode_value(fact.value(), &mut buf);
        }
        Index::Avet => {
            buf.extend_from_slice(&a.to_be_bytes());
            encode_value(fact.value(), &mut buf);
            buf.extend_from_slice(&e.to_be_bytes());
        }
        Index::Vaet => {
            encode_value(fact.value(), &mut buf);
            buf.extend_from_slice(&a.to_be_bytes());
            buf.extend_from_slice(&e.to_be_bytes());
        }
    }
    buf.extend_from_slice(&fact.tx().to_be_bytes());
    buf.push(u8::from(fact.added()));
    buf
}

pub fn decode_key(key: &[u8]) -> StorageResult<(Index, Fact)> {
    let mut d = Decoder::new(key);
    let tag = d.u8()?;
    let index = Index::from_tag(tag).ok_or_else(|| d.corrupt(&format!("unknown index tag 0x{:02x}", tag)))?;
    let (e, a, v) = match index {
        Index::Eavt => {
            let e = d.u64()?;
            let a = d.u64()?;
            (e, a, d.value()?)
        }
        Index::Aevt => {
            let a = d.u64()?;
            let e = d.u64()?;
            (e, a, d.value()?)
        }
        Index::Avet => {
            let a = d.u64()?;
            let v = d.value()?;
            (d.u64()?, a, v)
        }
        Index::Vaet => {
            let v = d.value()?;
            let a = d.u64()?;
            (d.u64()?, a, v)
        }
    };
    let tx = d.u64()?;
    let added = match d.u8()? {
        0 => false,
        1 => true,
        other => return Err(d.corrupt(&format!("invalid added flag {}", other))),
    };
    d.finish()?;
    Ok((index, Fact::new(e, a, v, tx, added)))
}

/// Decodes a key expected to belong to `index`.
pub fn decode_index_key(index: Index, key: &[u8]) -> StorageResult<Fact> {
    let (found, fact) = decode_key(key)?;
    if found != index {
        return Err(StorageError::Corrupt(format!(
            "{} key found while scanning {}",
            found.name(),
            index.name()
        )));
    }
    Ok(fact)
}

// ------------- Ranges -------------
/// A half-open key range `[start, end)`; `end == None` is unbounded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub start: Vec<u8>,
    pub end: Option<Vec<u8>>,
}

impl KeyRange {
    pub fn new(start: Vec<u8>, end: Option<Vec<u8>>) -> Self {
        Self { start, end }
    }
    /// Every key that starts with `prefix`.
    pub fn prefix(prefix: Vec<u8>) -> Self {
        let end = successor(&prefix);
        Self { start: prefix, end }
    }
    pub fn all() -> Self {
        Self {
            start: Vec::new(),
            end: None,
        }
    }
    pub fn contains(&self, key: &[u8]) -> bool {
        key >= self.start.as_slice() && self.end.as_deref().is_none_or(|end| key < end)
    }
    pub fn is_empty(&self) -> bool {
        self.end.as_deref().is_some_and(|end| end <= self.start.as_slice())
    }
}

// the smallest key greater than every key carrying this prefix
fn successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xFF {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

/// Builds index prefixes. Components must be pushed in the index's own order,
/// e.g. attribute then value for [`Index::Avet`].
#[derive(Debug, Clone)]
pub struct KeyPrefix {
    buf: Vec<u8>,
}

impl KeyPrefix {
    pub fn new(index: Index) -> Self {
        Self { buf: vec![index.tag()] }
    }
    pub fn id(mut self, id: EntityId) -> Self {
        self.buf.extend_from_slice(&id.to_be_bytes());
        self
    }
    pub fn value(mut self, value: &Value) -> Self {
        encode_value(value, &mut self.buf);
        self
    }
    pub fn range(self) -> KeyRange {
        KeyRange::prefix(self.buf)
    }
}

// ------------- Transaction log -------------
pub fn tx_key(t: TxId) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(TX_LOG);
    key.extend_from_slice(&t.to_be_bytes());
    key
}

pub fn tx_log_range() -> KeyRange {
    KeyRange::prefix(vec![TX_LOG])
}

pub fn encode_tx_record(record: &TxRecord) -> Vec<u8> {
    let mut buf = Vec::with_capacity(12);
    buf.extend_from_slice(&record.timestamp().timestamp_millis().to_be_bytes());
    buf.extend_from_slice(&record.fact_count().to_be_bytes());
    buf
}

pub fn decode_tx_record(key: &[u8], value: &[u8]) -> StorageResult<TxRecord> {
    let mut k = Decoder::new(key);
    if k.u8()? != TX_LOG {
        return Err(k.corrupt("not a transaction record key"));
    }
    let t = k.u64()?;
    k.finish()?;
    let mut v = Decoder::new(value);
    let millis = i64::from_be_bytes(v.take::<8>()?);
    let fact_count = u32::from_be_bytes(v.take::<4>()?);
    v.finish()?;
    let timestamp: DateTime<Utc> = DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StorageError::Corrupt(format!("timestamp {} out of range for t={}", millis, t)))?;
    Ok(TxRecord::new(t, timestamp, fact_count))
}

// ------------- Meta -------------
pub fn entity_counter_key() -> Vec<u8> {
    let mut key = vec![META];
    key.extend_from_slice(ENTITY_COUNTER);
    key
}

pub fn encode_counter(n: u64) -> Vec<u8> {
    n.to_be_bytes().to_vec()
}

pub fn decode_counter(value: &[u8]) -> StorageResult<u64> {
    let mut d = Decoder::new(value);
    let n = d.u64()?;
    d.finish()?;
    Ok(n)
}
