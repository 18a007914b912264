// other keepers use HashSet or HashMap
use core::hash::BuildHasherDefault;
use seahash::SeaHasher;

// used to print out readable forms of a construct
use std::fmt;

// used to timestamp transactions
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// our own stuff that we need
use crate::datatype::Value;

// ------------- Identities -------------
pub type EntityId = u64;
// attributes are entities too, so they can carry facts describing themselves
pub type AttributeId = EntityId;
// a transaction id is also the point in time `t` it establishes
pub type TxId = u64;

pub type OtherHasher = BuildHasherDefault<SeaHasher>;

/// The point in time before any transaction was committed.
pub const GENESIS: TxId = 0;

/// Entities at or above this id belong to the system partition holding the
/// built-in attributes. User entities are always generated below it.
pub const SYSTEM_PARTITION: EntityId = 1 << 62;

pub fn is_system(entity: EntityId) -> bool {
    entity >= SYSTEM_PARTITION
}

#[derive(Debug, Clone)]
pub struct EntityGenerator {
    lower_bound: EntityId,
}

impl EntityGenerator {
    pub fn new(lower_bound: EntityId) -> Self {
        Self { lower_bound }
    }
    // Entities may be explicitly referenced by id, in which case the
    // generator must never hand out that id later on.
    pub fn retain(&mut self, e: EntityId) {
        if e > self.lower_bound && !is_system(e) {
            self.lower_bound = e;
        }
    }
    pub fn generate(&mut self) -> EntityId {
        self.lower_bound += 1;
        self.lower_bound
    }
    pub fn lower_bound(&self) -> EntityId {
        self.lower_bound
    }
}

// ------------- Fact -------------
/// The atomic unit of data: `(entity, attribute, value, tx, added)`.
///
/// A retraction (`added == false`) records that a prior assertion of the same
/// `(entity, attribute, value)` no longer holds as of `tx`. Nothing is ever
/// deleted. Facts are equal when all five fields are equal, and order by the
/// same tuple, which is the EAVT order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Fact {
    entity: EntityId,
    attribute: AttributeId,
    value: Value,
    tx: TxId,
    added: bool,
}

impl Fact {
    pub fn new(entity: EntityId, attribute: AttributeId, value: Value, tx: TxId, added: bool) -> Self {
        Self {
            entity,
            attribute,
            value,
            tx,
            added,
        }
    }
    pub fn assertion(entity: EntityId, attribute: AttributeId, value: Value, tx: TxId) -> Self {
        Self::new(entity, attribute, value, tx, true)
    }
    pub fn retraction(entity: EntityId, attribute: AttributeId, value: Value, tx: TxId) -> Self {
        Self::new(entity, attribute, value, tx, false)
    }
    // Encapsulated fields with getters only, so a fact cannot change
    // once it has been created.
    pub fn entity(&self) -> EntityId {
        self.entity
    }
    pub fn attribute(&self) -> AttributeId {
        self.attribute
    }
    pub fn value(&self) -> &Value {
        &self.value
    }
    pub fn tx(&self) -> TxId {
        self.tx
    }
    pub fn added(&self) -> bool {
        self.added
    }
    pub fn into_value(self) -> Value {
        self.value
    }
    pub fn same_triple(&self, other: &Fact) -> bool {
        self.entity == other.entity && self.attribute == other.attribute && self.value == other.value
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "[{} {} {} {} {}]",
            self.entity,
            self.attribute,
            self.value,
            self.tx,
            if self.added { "+" } else { "-" }
        )
    }
}

// ------------- Transaction Record -------------
/// Written once per committed transaction, next to its facts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRecord {
    t: TxId,
    timestamp: DateTime<Utc>,
    fact_count: u32,
}

impl TxRecord {
    pub fn new(t: TxId, timestamp: DateTime<Utc>, fact_count: u32) -> Self {
        Self {
            t,
            timestamp,
            fact_count,
        }
    }
    pub fn t(&self) -> TxId {
        self.t
    }
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
    pub fn fact_count(&self) -> u32 {
        self.fact_count
    }
}

impl fmt::Display for TxRecord {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "t={} at {} ({} facts)",
            self.t,
            self.timestamp.to_rfc3339(),
            self.fact_count
        )
    }
}
