//! Point-in-time, read-only snapshots.
//!
//! A [`Database`] is nothing more than a shared handle on the storage plus the
//! `t` it is pinned to. Storage is append-only, so everything a snapshot needs
//! stays readable no matter how far the connection advances; readers never
//! take the writer lock.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::construct::{AttributeId, EntityId, Fact, OtherHasher, TxId, TxRecord};
use crate::datatype::{DataType, Value};
use crate::encoding::{self, Index, KeyPrefix, KeyRange};
use crate::error::{QueryError, QueryResult};
use crate::schema::{self, Attribute, IDENT};
use crate::storage::Storage;
use crate::transaction::EntityRef;

#[derive(Clone)]
pub struct Database {
    storage: Arc<dyn Storage>,
    t: TxId,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Database").field("t", &self.t).finish()
    }
}

/// Keeps, for each `(entity, attribute, value)`, the fact with the highest
/// `tx`, and drops the triple if that fact is a retraction. Facts of one
/// triple are adjacent in every index, ordered by `tx`.
fn resolve(history: Vec<Fact>) -> Vec<Fact> {
    let mut current: Vec<Fact> = Vec::with_capacity(history.len());
    let mut pending: Option<Fact> = None;
    for fact in history {
        if let Some(previous) = pending.take() {
            if !previous.same_triple(&fact) && previous.added() {
                current.push(previous);
            }
        }
        pending = Some(fact);
    }
    if let Some(last) = pending.filter(Fact::added) {
        current.push(last);
    }
    current
}

impl Database {
    pub(crate) fn new(storage: Arc<dyn Storage>, t: TxId) -> Self {
        Self { storage, t }
    }

    /// The point in time this snapshot is pinned to.
    pub fn t(&self) -> TxId {
        self.t
    }

    /// Every fact in `range` of `index` with `tx <= t`, retractions included,
    /// in index order.
    fn history(&self, index: Index, range: KeyRange) -> QueryResult<Vec<Fact>> {
        let mut facts = Vec::new();
        for entry in self.storage.scan(range)? {
            let (key, _) = entry?;
            let fact = encoding::decode_index_key(index, &key)?;
            if fact.tx() <= self.t {
                facts.push(fact);
            }
        }
        Ok(facts)
    }

    fn current(&self, index: Index, range: KeyRange) -> QueryResult<Vec<Fact>> {
        Ok(resolve(self.history(index, range)?))
    }

    // ------------- Entities -------------
    /// The facts currently asserted about `entity`, in attribute then value order.
    pub fn entity_facts(&self, entity: EntityId) -> QueryResult<Vec<Fact>> {
        self.current(Index::Eavt, KeyPrefix::new(Index::Eavt).id(entity).range())
    }

    /// Everything ever recorded about `entity` up to `t`, retractions included.
    pub fn entity_history(&self, entity: EntityId) -> QueryResult<Vec<Fact>> {
        self.history(Index::Eavt, KeyPrefix::new(Index::Eavt).id(entity).range())
    }

    pub fn values(&self, entity: EntityId, attribute: AttributeId) -> QueryResult<Vec<Value>> {
        let range = KeyPrefix::new(Index::Eavt).id(entity).id(attribute).range();
        Ok(self.current(Index::Eavt, range)?.into_iter().map(Fact::into_value).collect())
    }

    /// The single current value of `attribute` on `entity`, the lowest one
    /// for a many-valued attribute.
    pub fn value(&self, entity: EntityId, attribute: AttributeId) -> QueryResult<Option<Value>> {
        Ok(self.values(entity, attribute)?.into_iter().next())
    }

    pub fn value_as<T: DataType>(&self, entity: EntityId, attribute: AttributeId) -> QueryResult<Option<T>> {
        match self.value(entity, attribute)? {
            None => Ok(None),
            Some(value) => T::from_value(&value).map(Some).ok_or(QueryError::TypeMismatch {
                entity,
                attribute,
                expected: T::DATA_TYPE,
            }),
        }
    }

    /// Whether the triple is currently asserted.
    pub fn contains(&self, entity: EntityId, attribute: AttributeId, value: &Value) -> QueryResult<bool> {
        let range = KeyPrefix::new(Index::Eavt).id(entity).id(attribute).value(value).range();
        Ok(!self.current(Index::Eavt, range)?.is_empty())
    }

    // ------------- Attributes -------------
    /// The facts currently asserted with `attribute`, in entity order.
    pub fn attribute_facts(&self, attribute: AttributeId) -> QueryResult<Vec<Fact>> {
        self.current(Index::Aevt, KeyPrefix::new(Index::Aevt).id(attribute).range())
    }

    /// Entities currently holding `value` for `attribute`. Goes through AVET
    /// when the attribute is indexed as of this snapshot, otherwise filters AEVT.
    pub fn entities_with(&self, attribute: AttributeId, value: &Value) -> QueryResult<Vec<EntityId>> {
        let indexed = self.attribute(attribute)?.is_some_and(|a| a.in_avet());
        let facts = if indexed {
            self.current(Index::Avet, KeyPrefix::new(Index::Avet).id(attribute).value(value).range())?
        } else {
            let mut facts = self.attribute_facts(attribute)?;
            facts.retain(|f| f.value() == value);
            facts
        };
        Ok(facts.iter().map(Fact::entity).collect())
    }

    /// Facts currently referring to `target`, optionally through one attribute only.
    pub fn referrers(&self, target: EntityId, attribute: Option<AttributeId>) -> QueryResult<Vec<Fact>> {
        let prefix = KeyPrefix::new(Index::Vaet).value(&Value::Ref(target));
        let range = match attribute {
            Some(a) => prefix.id(a).range(),
            None => prefix.range(),
        };
        self.current(Index::Vaet, range)
    }

    /// The raw content of one index view up to `t`, retractions included.
    /// AVET only shows attributes that are in it as of `t`.
    pub fn datoms(&self, index: Index) -> QueryResult<Vec<Fact>> {
        let history = self.history(index, KeyRange::prefix(vec![index.tag()]))?;
        if !matches!(index, Index::Avet) {
            return Ok(history);
        }
        // a backfill writes entries with the tx that first asserted them, so
        // an attribute indexed after t can already have entries below t
        let mut in_avet: HashMap<AttributeId, bool, OtherHasher> = HashMap::default();
        let mut facts = Vec::with_capacity(history.len());
        for fact in history {
            let keep = match in_avet.get(&fact.attribute()) {
                Some(keep) => *keep,
                None => {
                    let keep = self.attribute(fact.attribute())?.is_some_and(|a| a.in_avet());
                    in_avet.insert(fact.attribute(), keep);
                    keep
                }
            };
            if keep {
                facts.push(fact);
            }
        }
        Ok(facts)
    }

    /// The raw history of `attribute` up to `t`, in AEVT order.
    pub fn attribute_history(&self, attribute: AttributeId) -> QueryResult<Vec<Fact>> {
        self.history(Index::Aevt, KeyPrefix::new(Index::Aevt).id(attribute).range())
    }

    /// The definition of `attribute` as of this snapshot, `None` if the entity
    /// is not an attribute.
    pub fn attribute(&self, attribute: AttributeId) -> QueryResult<Option<Attribute>> {
        if let Some(builtin) = schema::builtin_attribute(attribute) {
            return Ok(Some(builtin));
        }
        let facts = self.entity_facts(attribute)?;
        Attribute::from_pairs(attribute, facts.iter().map(|f| (f.attribute(), f.value())))
            .map_err(QueryError::Corrupt)
    }

    // ------------- Identities -------------
    pub fn lookup_ident(&self, ident: &str) -> QueryResult<Option<EntityId>> {
        if let Some(builtin) = schema::builtin_ident(ident) {
            return Ok(Some(builtin));
        }
        Ok(self.entities_with(IDENT, &Value::from(ident))?.into_iter().next())
    }

    pub fn ident_of(&self, entity: EntityId) -> QueryResult<Option<String>> {
        if let Some(builtin) = schema::builtin_name(entity) {
            return Ok(Some(builtin));
        }
        Ok(self.value_as::<String>(entity, IDENT)?)
    }

    /// Resolves a reference against this snapshot. Temporary ids only have a
    /// meaning inside the transaction that uses them.
    pub fn resolve(&self, reference: &EntityRef) -> QueryResult<Option<EntityId>> {
        match reference {
            EntityRef::Id(id) => Ok(Some(*id)),
            EntityRef::Temp(name) => Err(QueryError::UnresolvedEntity(format!(
                "temporary id {:?} outside of a transaction",
                name
            ))),
            EntityRef::Ident(ident) => self.lookup_ident(ident),
            EntityRef::Unique(attribute, value) => {
                let Some(attribute) = self.resolve(attribute)? else {
                    return Ok(None);
                };
                match self.attribute(attribute)? {
                    Some(a) if a.unique() => Ok(self.entities_with(attribute, value)?.into_iter().next()),
                    _ => Err(QueryError::UnresolvedEntity(format!(
                        "attribute {} is not unique",
                        attribute
                    ))),
                }
            }
        }
    }

    // ------------- Transactions -------------
    /// The highest entity id handed out by any commit so far. Unlike every
    /// other read this is not pinned to `t`; only staging uses it.
    pub(crate) fn entity_counter(&self) -> QueryResult<EntityId> {
        match self.storage.read(&encoding::entity_counter_key())? {
            Some(value) => Ok(encoding::decode_counter(&value)?),
            None => Ok(0),
        }
    }

    pub fn tx_record(&self, t: TxId) -> QueryResult<Option<TxRecord>> {
        if t > self.t {
            return Ok(None);
        }
        let key = encoding::tx_key(t);
        match self.storage.read(&key)? {
            Some(value) => Ok(Some(encoding::decode_tx_record(&key, &value)?)),
            None => Ok(None),
        }
    }

    /// Records of every transaction up to `t`, oldest first.
    pub fn tx_records(&self) -> QueryResult<Vec<TxRecord>> {
        let mut records = Vec::new();
        for entry in self.storage.scan(encoding::tx_log_range())? {
            let (key, value) = entry?;
            let record = encoding::decode_tx_record(&key, &value)?;
            if record.t() > self.t {
                break;
            }
            records.push(record);
        }
        Ok(records)
    }
}
