//! The mutation request model and the staging step that turns a request into
//! the exact facts and index entries one commit writes.
//!
//! A [`Transaction`] is an ordered list of operations whose entities,
//! attributes and reference values may be given symbolically (temporary ids,
//! idents, unique lookups). Staging resolves them against the snapshot the
//! transaction builds on, validates the result and produces a [`Staged`]
//! commit. Nothing touches storage until the connection writes that commit as
//! one batch.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::construct::{AttributeId, EntityGenerator, EntityId, Fact, OtherHasher, TxId, TxRecord, is_system};
use crate::database::Database;
use crate::datatype::Value;
use crate::encoding::{self, Index};
use crate::error::{TransactionError, TxResult};
use crate::schema::{self, Attribute, Cardinality, IDENT};
use crate::storage::WriteBatch;

// ------------- References -------------
/// How an operation names an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityRef {
    Id(EntityId),
    /// A placeholder resolved to a fresh entity (or, when the entity declares
    /// an existing ident, to that entity) for the duration of one transaction.
    Temp(String),
    /// The entity whose `db/ident` is the given name.
    Ident(String),
    /// The entity holding `value` for a unique attribute.
    Unique(Box<EntityRef>, Value),
}

impl EntityRef {
    pub fn temp(name: impl Into<String>) -> Self {
        EntityRef::Temp(name.into())
    }
    pub fn ident(name: impl Into<String>) -> Self {
        EntityRef::Ident(name.into())
    }
    pub fn unique(attribute: impl Into<EntityRef>, value: impl Into<Value>) -> Self {
        EntityRef::Unique(Box::new(attribute.into()), value.into())
    }
}

impl From<EntityId> for EntityRef {
    fn from(id: EntityId) -> Self {
        EntityRef::Id(id)
    }
}
// attributes are mostly referred to by their ident
impl From<&str> for EntityRef {
    fn from(ident: &str) -> Self {
        EntityRef::Ident(ident.to_string())
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EntityRef::Id(id) => write!(f, "#{}", id),
            EntityRef::Temp(name) => write!(f, "temp:{}", name),
            EntityRef::Ident(ident) => write!(f, ":{}", ident),
            EntityRef::Unique(attribute, value) => write!(f, "[{} {}]", attribute, value),
        }
    }
}

/// The value position of an operation: a plain value, or a reference that
/// resolves to [`Value::Ref`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxValue {
    Value(Value),
    Entity(EntityRef),
}

impl From<Value> for TxValue {
    fn from(v: Value) -> Self {
        TxValue::Value(v)
    }
}
impl From<EntityRef> for TxValue {
    fn from(r: EntityRef) -> Self {
        TxValue::Entity(r)
    }
}
impl From<bool> for TxValue {
    fn from(v: bool) -> Self {
        TxValue::Value(v.into())
    }
}
impl From<i64> for TxValue {
    fn from(v: i64) -> Self {
        TxValue::Value(v.into())
    }
}
impl From<f64> for TxValue {
    fn from(v: f64) -> Self {
        TxValue::Value(v.into())
    }
}
impl From<&str> for TxValue {
    fn from(v: &str) -> Self {
        TxValue::Value(v.into())
    }
}
impl From<String> for TxValue {
    fn from(v: String) -> Self {
        TxValue::Value(v.into())
    }
}
impl From<Vec<u8>> for TxValue {
    fn from(v: Vec<u8>) -> Self {
        TxValue::Value(v.into())
    }
}

// ------------- Transaction -------------
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Assert {
        entity: EntityRef,
        attribute: EntityRef,
        value: TxValue,
    },
    Retract {
        entity: EntityRef,
        attribute: EntityRef,
        value: TxValue,
    },
    /// Retracts whatever the current value of a single-valued attribute is.
    RetractAttribute { entity: EntityRef, attribute: EntityRef },
}

/// An ordered sequence of proposed operations. The transaction id is only
/// assigned when the connection commits it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transaction {
    ops: Vec<Op>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn assert(
        mut self,
        entity: impl Into<EntityRef>,
        attribute: impl Into<EntityRef>,
        value: impl Into<TxValue>,
    ) -> Self {
        self.ops.push(Op::Assert {
            entity: entity.into(),
            attribute: attribute.into(),
            value: value.into(),
        });
        self
    }
    /// Asserts several attribute values on one entity, in iteration order.
    pub fn assert_many<A, V>(mut self, entity: impl Into<EntityRef>, values: impl IntoIterator<Item = (A, V)>) -> Self
    where
        A: Into<EntityRef>,
        V: Into<TxValue>,
    {
        let entity = entity.into();
        for (attribute, value) in values {
            self.ops.push(Op::Assert {
                entity: entity.clone(),
                attribute: attribute.into(),
                value: value.into(),
            });
        }
        self
    }
    pub fn retract(
        mut self,
        entity: impl Into<EntityRef>,
        attribute: impl Into<EntityRef>,
        value: impl Into<TxValue>,
    ) -> Self {
        self.ops.push(Op::Retract {
            entity: entity.into(),
            attribute: attribute.into(),
            value: value.into(),
        });
        self
    }
    pub fn retract_attribute(mut self, entity: impl Into<EntityRef>, attribute: impl Into<EntityRef>) -> Self {
        self.ops.push(Op::RetractAttribute {
            entity: entity.into(),
            attribute: attribute.into(),
        });
        self
    }
    /// Adds the operations of another transactable after the current ones.
    pub fn append(mut self, other: &impl Transactable) -> Self {
        self.ops.extend(other.transaction().ops);
        self
    }
    pub fn push(&mut self, op: Op) {
        self.ops.push(op);
    }
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }
    pub fn len(&self) -> usize {
        self.ops.len()
    }
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Anything that can be submitted to a connection.
pub trait Transactable {
    fn transaction(&self) -> Transaction;
}

impl Transactable for Transaction {
    fn transaction(&self) -> Transaction {
        self.clone()
    }
}

impl Transactable for Vec<Op> {
    fn transaction(&self) -> Transaction {
        Transaction { ops: self.clone() }
    }
}

// ------------- Result -------------
pub type TempIds = HashMap<String, EntityId, OtherHasher>;

/// The outcome of a commit.
#[derive(Debug, Clone)]
pub struct TransactionResult {
    t: TxId,
    before: Database,
    after: Database,
    facts: Vec<Fact>,
    tempids: TempIds,
}

impl TransactionResult {
    pub(crate) fn new(before: Database, after: Database, staged: Staged) -> Self {
        Self {
            t: after.t(),
            before,
            after,
            facts: staged.facts,
            tempids: staged.tempids,
        }
    }
    pub fn t(&self) -> TxId {
        self.t
    }
    /// The snapshot the transaction was staged against.
    pub fn before(&self) -> &Database {
        &self.before
    }
    /// The snapshot at the new `t`.
    pub fn after(&self) -> &Database {
        &self.after
    }
    pub fn db(&self) -> &Database {
        &self.after
    }
    /// The facts written, write-time retractions included.
    pub fn facts(&self) -> &[Fact] {
        &self.facts
    }
    pub fn tempids(&self) -> &TempIds {
        &self.tempids
    }
    pub fn tempid(&self, name: &str) -> Option<EntityId> {
        self.tempids.get(name).copied()
    }
}

// ------------- Staging -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Assert,
    Retract,
}

#[derive(Debug, Clone)]
struct Resolved {
    kind: Kind,
    entity: EntityId,
    attribute: AttributeId,
    value: Value,
}

/// A validated commit, ready to be written.
#[derive(Debug, Clone)]
pub struct Staged {
    t: TxId,
    facts: Vec<Fact>,
    // every fact with the index views it belongs to
    entries: Vec<(Fact, Vec<Index>)>,
    // AVET entries for existing history of attributes that just became indexed
    backfill: Vec<Fact>,
    tempids: TempIds,
    entity_counter: EntityId,
}

impl Staged {
    pub fn t(&self) -> TxId {
        self.t
    }
    pub fn facts(&self) -> &[Fact] {
        &self.facts
    }
    /// The single batch that commits this transaction at `timestamp`.
    pub fn batch(&self, timestamp: DateTime<Utc>) -> TxResult<WriteBatch> {
        let count = u32::try_from(self.facts.len())
            .map_err(|_| TransactionError::ValidationFailed(format!("{} facts in one transaction", self.facts.len())))?;
        let mut batch = WriteBatch::new();
        for (fact, indexes) in &self.entries {
            for index in indexes {
                batch.put(encoding::encode_key(*index, fact), Vec::new());
            }
        }
        for fact in &self.backfill {
            batch.put(encoding::encode_key(Index::Avet, fact), Vec::new());
        }
        batch.put(
            encoding::tx_key(self.t),
            encoding::encode_tx_record(&TxRecord::new(self.t, timestamp, count)),
        );
        batch.put(encoding::entity_counter_key(), encoding::encode_counter(self.entity_counter));
        batch.commit_marker(self.t);
        Ok(batch)
    }
}

fn invalid(msg: impl Into<String>) -> TransactionError {
    TransactionError::ValidationFailed(msg.into())
}

fn conflicting(msg: impl Into<String>) -> TransactionError {
    TransactionError::ConflictingOps(msg.into())
}

/// The persisted entity counter, which never falls behind an id in use.
pub(crate) fn restore_generator(db: &Database) -> TxResult<EntityGenerator> {
    let lower_bound = db.entity_counter()?;
    Ok(EntityGenerator::new(lower_bound))
}

struct Resolver<'a> {
    db: &'a Database,
    generator: EntityGenerator,
    temps: TempIds,
    // idents declared by this transaction
    pending: HashMap<String, EntityId, OtherHasher>,
}

impl Resolver<'_> {
    fn temp(&mut self, name: &str) -> EntityId {
        if let Some(id) = self.temps.get(name) {
            return *id;
        }
        let id = self.generator.generate();
        self.temps.insert(name.to_string(), id);
        id
    }

    fn ident(&self, ident: &str) -> TxResult<Option<EntityId>> {
        if let Some(id) = self.pending.get(ident) {
            return Ok(Some(*id));
        }
        Ok(self.db.lookup_ident(ident)?)
    }

    fn resolve(&mut self, reference: &EntityRef) -> TxResult<EntityId> {
        let id = match reference {
            EntityRef::Id(id) => *id,
            EntityRef::Temp(name) => self.temp(name),
            EntityRef::Ident(ident) => self
                .ident(ident)?
                .ok_or_else(|| invalid(format!("unknown ident {:?}", ident)))?,
            EntityRef::Unique(attribute, value) => {
                let attribute = self.resolve(attribute)?;
                match self.db.attribute(attribute)? {
                    Some(a) if a.unique() => {}
                    _ => return Err(invalid(format!("lookup through attribute {} which is not unique", attribute))),
                }
                self.db
                    .entities_with(attribute, value)?
                    .into_iter()
                    .next()
                    .ok_or_else(|| invalid(format!("no entity holds {} for attribute {}", value, attribute)))?
            }
        };
        if id == 0 {
            return Err(invalid("entity id 0 is not a valid entity"));
        }
        Ok(id)
    }

    fn value(&mut self, value: &TxValue) -> TxResult<Value> {
        let value = match value {
            TxValue::Value(v) => v.clone(),
            TxValue::Entity(r) => Value::Ref(self.resolve(r)?),
        };
        if !value.is_well_formed() {
            return Err(invalid(format!("value {} is not well-formed", value)));
        }
        if value.as_entity() == Some(0) {
            return Err(invalid("entity id 0 cannot be referenced"));
        }
        Ok(value)
    }
}

fn retain_explicit(reference: &EntityRef, generator: &mut EntityGenerator) {
    match reference {
        EntityRef::Id(id) => generator.retain(*id),
        EntityRef::Unique(attribute, _) => retain_explicit(attribute, generator),
        EntityRef::Temp(_) | EntityRef::Ident(_) => {}
    }
}

fn is_ident_attribute(reference: &EntityRef) -> bool {
    match reference {
        EntityRef::Id(id) => *id == IDENT,
        EntityRef::Ident(name) => schema::builtin_ident(name) == Some(IDENT),
        _ => false,
    }
}

/// Validates `tx` against `before` and stages it as transaction `t`.
pub fn stage(before: &Database, tx: &Transaction, t: TxId) -> TxResult<Staged> {
    let mut generator = restore_generator(before)?;
    // explicit ids first, so no fresh id can collide with one in use
    for op in tx.ops() {
        let (entity, attribute, value) = match op {
            Op::Assert { entity, attribute, value } | Op::Retract { entity, attribute, value } => {
                (entity, attribute, Some(value))
            }
            Op::RetractAttribute { entity, attribute } => (entity, attribute, None),
        };
        retain_explicit(entity, &mut generator);
        retain_explicit(attribute, &mut generator);
        match value {
            Some(TxValue::Entity(r)) => retain_explicit(r, &mut generator),
            Some(TxValue::Value(Value::Ref(id))) => generator.retain(*id),
            _ => {}
        }
    }
    let mut resolver = Resolver {
        db: before,
        generator,
        temps: TempIds::default(),
        pending: HashMap::default(),
    };

    // Idents declared here are usable by every operation of the transaction,
    // whatever its position. An existing ident keeps its entity, which turns a
    // temporary entity declaring it into that entity.
    let declarations: Vec<(&EntityRef, &str)> = tx
        .ops()
        .iter()
        .filter_map(|op| match op {
            Op::Assert {
                entity,
                attribute,
                value: TxValue::Value(Value::String(name)),
            } if is_ident_attribute(attribute) => Some((entity, name.as_str())),
            _ => None,
        })
        .collect();
    let mut deferred = Vec::new();
    for (entity, name) in declarations {
        if let Some(existing) = before.lookup_ident(name)? {
            if let EntityRef::Temp(temp) = entity {
                resolver.temps.entry(temp.clone()).or_insert(existing);
            }
            continue;
        }
        let id = match entity {
            EntityRef::Ident(own) if own == name => resolver.generator.generate(),
            EntityRef::Id(id) => *id,
            EntityRef::Temp(temp) => resolver.temp(temp),
            other => {
                deferred.push((other, name));
                continue;
            }
        };
        if let Some(previous) = resolver.pending.insert(name.to_string(), id) {
            if previous != id {
                return Err(conflicting(format!("ident {:?} declared for two entities", name)));
            }
        }
    }
    for (entity, name) in deferred {
        let id = resolver.resolve(entity)?;
        resolver.pending.insert(name.to_string(), id);
    }

    // resolve every operation
    let mut resolved = Vec::with_capacity(tx.len());
    let mut retract_attributes = Vec::new();
    for op in tx.ops() {
        match op {
            Op::Assert { entity, attribute, value } | Op::Retract { entity, attribute, value } => {
                let kind = if matches!(op, Op::Assert { .. }) { Kind::Assert } else { Kind::Retract };
                let entity = resolver.resolve(entity)?;
                let attribute = resolver.resolve(attribute)?;
                let value = resolver.value(value)?;
                resolved.push(Resolved {
                    kind,
                    entity,
                    attribute,
                    value,
                });
            }
            Op::RetractAttribute { entity, attribute } => {
                let entity = resolver.resolve(entity)?;
                let attribute = resolver.resolve(attribute)?;
                retract_attributes.push((entity, attribute));
            }
        }
    }
    for r in &resolved {
        if is_system(r.entity) {
            return Err(invalid(format!("system entity {} is read-only", r.entity)));
        }
    }
    for (entity, _) in &retract_attributes {
        if is_system(*entity) {
            return Err(invalid(format!("system entity {} is read-only", entity)));
        }
    }

    let schemas = stage_schemas(before, &resolved)?;
    let schema_of = |attribute: AttributeId| -> TxResult<&Attribute> {
        schemas
            .get(&attribute)
            .ok_or_else(|| invalid(format!("entity {} is not an attribute", attribute)))
    };
    for (entity, attribute) in retract_attributes {
        let schema = schema_of(attribute)?;
        if schema.is_many() {
            return Err(invalid(format!(
                "attribute {} is many-valued, retract specific values instead",
                schema
            )));
        }
        let current = before
            .value(entity, attribute)?
            .ok_or_else(|| invalid(format!("entity {} has no value for {} to retract", entity, schema)))?;
        resolved.push(Resolved {
            kind: Kind::Retract,
            entity,
            attribute,
            value: current,
        });
    }
    for r in &resolved {
        let schema = schema_of(r.attribute)?;
        if r.value.value_type() != schema.value_type() {
            return Err(invalid(format!(
                "attribute {} expects {} values, got {}",
                schema,
                schema.value_type(),
                r.value
            )));
        }
    }

    // conflicts within the submission
    let mut kinds: BTreeMap<(EntityId, AttributeId, &Value), Kind> = BTreeMap::new();
    let mut single: BTreeMap<(EntityId, AttributeId), &Value> = BTreeMap::new();
    let mut claimed: BTreeMap<(AttributeId, &Value), EntityId> = BTreeMap::new();
    for r in &resolved {
        if let Some(previous) = kinds.insert((r.entity, r.attribute, &r.value), r.kind) {
            if previous != r.kind {
                return Err(conflicting(format!(
                    "[{} {} {}] is both asserted and retracted",
                    r.entity, r.attribute, r.value
                )));
            }
        }
        if r.kind != Kind::Assert {
            continue;
        }
        let schema = schema_of(r.attribute)?;
        if !schema.is_many() {
            if let Some(other) = single.insert((r.entity, r.attribute), &r.value) {
                if *other != r.value {
                    return Err(conflicting(format!(
                        "two values for single-valued attribute {} of entity {}",
                        schema, r.entity
                    )));
                }
            }
        }
        if schema.unique() {
            if let Some(other) = claimed.insert((r.attribute, &r.value), r.entity) {
                if other != r.entity {
                    return Err(conflicting(format!(
                        "entities {} and {} both claim {} for unique attribute {}",
                        other, r.entity, r.value, schema
                    )));
                }
            }
        }
    }
    let retracted: HashSet<(EntityId, AttributeId, &Value), OtherHasher> = kinds
        .iter()
        .filter(|(_, kind)| **kind == Kind::Retract)
        .map(|(key, _)| *key)
        .collect();

    // the facts this transaction writes
    let mut facts: BTreeSet<Fact> = BTreeSet::new();
    for (&(entity, attribute, value), kind) in &kinds {
        let schema = schema_of(attribute)?;
        let current = before.values(entity, attribute)?;
        let holds = current.contains(value);
        match kind {
            Kind::Retract if holds => {
                facts.insert(Fact::retraction(entity, attribute, value.clone(), t));
            }
            Kind::Retract => {}
            Kind::Assert if holds => {}
            Kind::Assert => {
                if schema.cardinality() == Cardinality::One {
                    // latest wins by attribute, settled here rather than on read
                    for old in current.iter().filter(|old| *old != value) {
                        facts.insert(Fact::retraction(entity, attribute, old.clone(), t));
                    }
                }
                if schema.unique() {
                    for holder in before.entities_with(attribute, value)? {
                        if holder != entity && !retracted.contains(&(holder, attribute, value)) {
                            let moved = single.get(&(holder, attribute)).is_some_and(|v| *v != value);
                            if !moved {
                                return Err(invalid(format!(
                                    "{} for unique attribute {} already belongs to entity {}",
                                    value, schema, holder
                                )));
                            }
                        }
                    }
                }
                facts.insert(Fact::assertion(entity, attribute, value.clone(), t));
            }
        }
    }

    let backfill = stage_schema_changes(before, &schemas)?;
    let facts: Vec<Fact> = facts.into_iter().collect();
    let mut entries = Vec::with_capacity(facts.len());
    for fact in &facts {
        entries.push((fact.clone(), schema_of(fact.attribute())?.indexes()));
    }
    debug!(
        t,
        ops = tx.len(),
        facts = facts.len(),
        backfill = backfill.len(),
        tempids = resolver.temps.len(),
        "transaction staged"
    );
    Ok(Staged {
        t,
        facts,
        entries,
        backfill,
        tempids: resolver.temps,
        entity_counter: resolver.generator.lower_bound(),
    })
}

/// The definition in force for every attribute the transaction uses: the
/// snapshot's definition overlaid with the schema operations of this very
/// transaction.
fn stage_schemas(before: &Database, resolved: &[Resolved]) -> TxResult<HashMap<AttributeId, Attribute, OtherHasher>> {
    let mut used: BTreeSet<AttributeId> = resolved.iter().map(|r| r.attribute).collect();
    // entities whose schema facts change are staged too, even if unused
    used.extend(
        resolved
            .iter()
            .filter(|r| schema::is_schema_attribute(r.attribute))
            .map(|r| r.entity),
    );
    let mut schemas = HashMap::default();
    for attribute in used {
        if let Some(builtin) = schema::builtin_attribute(attribute) {
            schemas.insert(attribute, builtin);
            continue;
        }
        let mut pairs: BTreeMap<AttributeId, Value> = BTreeMap::new();
        for fact in before.entity_facts(attribute)? {
            if schema::is_schema_attribute(fact.attribute()) {
                pairs.insert(fact.attribute(), fact.into_value());
            }
        }
        let previous = Attribute::from_pairs(attribute, pairs.iter().map(|(a, v)| (*a, v)))
            .map_err(TransactionError::StorageFailure)?;
        // schema attributes are all single-valued
        for r in resolved
            .iter()
            .filter(|r| r.entity == attribute && schema::is_schema_attribute(r.attribute))
        {
            match r.kind {
                Kind::Assert => {
                    pairs.insert(r.attribute, r.value.clone());
                }
                Kind::Retract => {
                    if pairs.get(&r.attribute) == Some(&r.value) {
                        pairs.remove(&r.attribute);
                    }
                }
            }
        }
        let staged = Attribute::from_pairs(attribute, pairs.iter().map(|(a, v)| (*a, v))).map_err(invalid)?;
        match (previous, staged) {
            (Some(previous), Some(staged)) if previous.value_type() != staged.value_type() => {
                return Err(invalid(format!(
                    "attribute {} cannot change its value type from {} to {}",
                    staged,
                    previous.value_type(),
                    staged.value_type()
                )));
            }
            (Some(previous), None) => {
                return Err(invalid(format!("attribute {} cannot lose its value type", previous)));
            }
            (_, Some(staged)) => {
                schemas.insert(attribute, staged);
            }
            (None, None) => {}
        }
    }
    Ok(schemas)
}

/// Checks schema changes against existing data and returns the AVET entries
/// needed by attributes that start being indexed.
fn stage_schema_changes(
    before: &Database,
    schemas: &HashMap<AttributeId, Attribute, OtherHasher>,
) -> TxResult<Vec<Fact>> {
    let mut backfill = Vec::new();
    for (id, staged) in schemas {
        let Some(previous) = before.attribute(*id)? else {
            continue;
        };
        let newly_unique = staged.unique() && !previous.unique();
        let newly_single = !staged.is_many() && previous.is_many();
        if newly_unique || newly_single {
            let current = before.attribute_facts(*id)?;
            let mut holders: HashMap<&Value, EntityId, OtherHasher> = HashMap::default();
            let mut counts: HashMap<EntityId, usize, OtherHasher> = HashMap::default();
            for fact in &current {
                if newly_unique {
                    if let Some(other) = holders.insert(fact.value(), fact.entity()) {
                        if other != fact.entity() {
                            return Err(invalid(format!(
                                "attribute {} cannot become unique, entities {} and {} share {}",
                                staged,
                                other,
                                fact.entity(),
                                fact.value()
                            )));
                        }
                    }
                }
                let count = counts.entry(fact.entity()).or_default();
                *count += 1;
                if newly_single && *count > 1 {
                    return Err(invalid(format!(
                        "attribute {} cannot become single-valued, entity {} holds several values",
                        staged,
                        fact.entity()
                    )));
                }
            }
        }
        if staged.in_avet() && !previous.in_avet() {
            backfill.extend(before.attribute_history(*id)?);
        }
    }
    Ok(backfill)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatype::ValueType;
    use crate::schema::{AttributeSchema, VALUE_TYPE};

    #[test]
    fn assert_many_targets_one_entity() {
        let tx = Transaction::new().assert_many(
            EntityRef::temp("ada"),
            [("person/name", TxValue::from("Ada")), ("person/age", TxValue::from(36i64))],
        );
        assert_eq!(
            tx,
            Transaction::new()
                .assert(EntityRef::temp("ada"), "person/name", "Ada")
                .assert(EntityRef::temp("ada"), "person/age", 36i64)
        );
        assert!(Transaction::new().assert_many(7u64, Vec::<(&str, TxValue)>::new()).is_empty());
    }

    #[test]
    fn builders_keep_submission_order() {
        let tx = Transaction::new()
            .assert(EntityRef::temp("a"), "person/name", "Ada")
            .retract(7u64, "person/name", "Grace")
            .retract_attribute(7u64, "person/age");
        assert_eq!(tx.len(), 3);
        assert!(matches!(tx.ops()[1], Op::Retract { entity: EntityRef::Id(7), .. }));
        let appended = Transaction::new().append(&AttributeSchema::new("person/name", ValueType::String));
        assert!(matches!(
            &appended.ops()[1],
            Op::Assert { attribute: EntityRef::Id(VALUE_TYPE), .. }
        ));
    }

    #[test]
    fn ident_attribute_is_recognised_by_id_and_name() {
        assert!(is_ident_attribute(&EntityRef::Id(IDENT)));
        assert!(is_ident_attribute(&EntityRef::ident("db/ident")));
        assert!(!is_ident_attribute(&EntityRef::ident("person/name")));
    }
}
