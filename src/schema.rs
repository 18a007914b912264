//! Attributes are entities described by facts about themselves, using a small
//! set of built-in attributes that live in the system partition.
//!
//! An attribute must at least declare its value type. Its other
//! characteristics (cardinality, uniqueness, indexing) decide which index
//! views its facts are written to.

use std::fmt;

use crate::construct::{AttributeId, EntityId, SYSTEM_PARTITION};
use crate::datatype::{Value, ValueType};
use crate::encoding::Index;
use crate::transaction::{EntityRef, Transactable, Transaction};

// ------------- Built-ins -------------
pub const IDENT: AttributeId = SYSTEM_PARTITION + 1;
pub const VALUE_TYPE: AttributeId = SYSTEM_PARTITION + 2;
pub const CARDINALITY: AttributeId = SYSTEM_PARTITION + 3;
pub const UNIQUE: AttributeId = SYSTEM_PARTITION + 4;
pub const INDEX: AttributeId = SYSTEM_PARTITION + 5;
pub const DOC: AttributeId = SYSTEM_PARTITION + 6;

pub const CARDINALITY_ONE: EntityId = SYSTEM_PARTITION + 16;
pub const CARDINALITY_MANY: EntityId = SYSTEM_PARTITION + 17;

const TYPE_BASE: EntityId = SYSTEM_PARTITION + 32;

/// The entity standing for a value type, used as the value of `db/valueType`.
pub const fn type_entity(value_type: ValueType) -> EntityId {
    TYPE_BASE + value_type.uid() as EntityId
}

pub fn value_type_of(entity: EntityId) -> Option<ValueType> {
    ValueType::ALL.into_iter().find(|t| type_entity(*t) == entity)
}

const BUILTIN_IDENTS: [(EntityId, &str); 8] = [
    (IDENT, "db/ident"),
    (VALUE_TYPE, "db/valueType"),
    (CARDINALITY, "db/cardinality"),
    (UNIQUE, "db/unique"),
    (INDEX, "db/index"),
    (DOC, "db/doc"),
    (CARDINALITY_ONE, "db.cardinality/one"),
    (CARDINALITY_MANY, "db.cardinality/many"),
];

pub fn builtin_ident(name: &str) -> Option<EntityId> {
    BUILTIN_IDENTS
        .iter()
        .find(|(_, ident)| *ident == name)
        .map(|(id, _)| *id)
        .or_else(|| {
            let type_name = name.strip_prefix("db.type/")?;
            ValueType::ALL
                .into_iter()
                .find(|t| t.name() == type_name)
                .map(type_entity)
        })
}

pub fn builtin_name(entity: EntityId) -> Option<String> {
    BUILTIN_IDENTS
        .iter()
        .find(|(id, _)| *id == entity)
        .map(|(_, ident)| ident.to_string())
        .or_else(|| value_type_of(entity).map(|t| format!("db.type/{}", t.name())))
}

pub fn builtin_attribute(id: AttributeId) -> Option<Attribute> {
    let (value_type, unique) = match id {
        IDENT => (ValueType::String, true),
        VALUE_TYPE | CARDINALITY => (ValueType::Ref, false),
        UNIQUE | INDEX => (ValueType::Boolean, false),
        DOC => (ValueType::String, false),
        _ => return None,
    };
    Some(Attribute {
        id,
        ident: builtin_name(id),
        value_type,
        cardinality: Cardinality::One,
        unique,
        indexed: false,
        doc: None,
    })
}

pub fn is_schema_attribute(id: AttributeId) -> bool {
    builtin_attribute(id).is_some()
}

// ------------- Attribute -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    /// A new assertion supersedes the previous value at write time.
    One,
    Many,
}

impl Cardinality {
    pub fn entity(self) -> EntityId {
        match self {
            Cardinality::One => CARDINALITY_ONE,
            Cardinality::Many => CARDINALITY_MANY,
        }
    }
}

/// A resolved attribute definition, as of some point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    id: AttributeId,
    ident: Option<String>,
    value_type: ValueType,
    cardinality: Cardinality,
    unique: bool,
    indexed: bool,
    doc: Option<String>,
}

impl Attribute {
    /// Reads a definition from the current `(schema attribute, value)` pairs
    /// of an entity. `Ok(None)` means the entity declares no value type and is
    /// therefore not an attribute.
    pub fn from_pairs<'a>(
        id: AttributeId,
        pairs: impl IntoIterator<Item = (AttributeId, &'a Value)>,
    ) -> Result<Option<Attribute>, String> {
        if let Some(builtin) = builtin_attribute(id) {
            return Ok(Some(builtin));
        }
        let mut value_type = None;
        let mut attribute = Attribute {
            id,
            ident: None,
            value_type: ValueType::Boolean,
            cardinality: Cardinality::One,
            unique: false,
            indexed: false,
            doc: None,
        };
        for (a, v) in pairs {
            let mismatch = || format!("attribute {} has an invalid {} value {}", id, builtin_name(a).unwrap_or_default(), v);
            match a {
                IDENT => attribute.ident = Some(v.as_str().ok_or_else(mismatch)?.to_string()),
                VALUE_TYPE => {
                    value_type = Some(v.as_entity().and_then(value_type_of).ok_or_else(mismatch)?);
                }
                CARDINALITY => {
                    attribute.cardinality = match v.as_entity() {
                        Some(CARDINALITY_ONE) => Cardinality::One,
                        Some(CARDINALITY_MANY) => Cardinality::Many,
                        _ => return Err(mismatch()),
                    }
                }
                UNIQUE => attribute.unique = v.as_bool().ok_or_else(mismatch)?,
                INDEX => attribute.indexed = v.as_bool().ok_or_else(mismatch)?,
                DOC => attribute.doc = Some(v.as_str().ok_or_else(mismatch)?.to_string()),
                _ => {}
            }
        }
        Ok(value_type.map(|value_type| Attribute {
            value_type,
            ..attribute
        }))
    }

    pub fn id(&self) -> AttributeId {
        self.id
    }
    pub fn ident(&self) -> Option<&str> {
        self.ident.as_deref()
    }
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }
    pub fn cardinality(&self) -> Cardinality {
        self.cardinality
    }
    pub fn is_many(&self) -> bool {
        self.cardinality == Cardinality::Many
    }
    pub fn unique(&self) -> bool {
        self.unique
    }
    pub fn indexed(&self) -> bool {
        self.indexed
    }
    pub fn doc(&self) -> Option<&str> {
        self.doc.as_deref()
    }
    /// Whether value lookups for this attribute can go through AVET.
    pub fn in_avet(&self) -> bool {
        self.unique || self.indexed
    }
    pub fn in_index(&self, index: Index) -> bool {
        match index {
            Index::Eavt | Index::Aevt => true,
            Index::Avet => self.in_avet(),
            Index::Vaet => self.value_type == ValueType::Ref,
        }
    }
    pub fn indexes(&self) -> Vec<Index> {
        Index::ALL.into_iter().filter(|i| self.in_index(*i)).collect()
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.ident {
            Some(ident) => write!(f, "{}", ident)?,
            None => write!(f, "#{}", self.id)?,
        }
        write!(f, " ({}", self.value_type)?;
        if self.is_many() {
            write!(f, ", many")?;
        }
        if self.unique {
            write!(f, ", unique")?;
        } else if self.indexed {
            write!(f, ", indexed")?;
        }
        write!(f, ")")
    }
}

// ------------- Declaring attributes -------------
/// Declares (or redeclares) an attribute identified by its ident.
///
/// ```
/// use tempora::datatype::ValueType;
/// use tempora::schema::AttributeSchema;
/// let email = AttributeSchema::new("person/email", ValueType::String)
///     .unique()
///     .doc("primary contact address");
/// assert_eq!(email.ident(), "person/email");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSchema {
    ident: String,
    value_type: ValueType,
    cardinality: Cardinality,
    unique: bool,
    indexed: bool,
    doc: Option<String>,
}

impl AttributeSchema {
    pub fn new(ident: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            ident: ident.into(),
            value_type,
            cardinality: Cardinality::One,
            unique: false,
            indexed: false,
            doc: None,
        }
    }
    pub fn many(mut self) -> Self {
        self.cardinality = Cardinality::Many;
        self
    }
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }
    pub fn ident(&self) -> &str {
        &self.ident
    }
}

impl Transactable for AttributeSchema {
    fn transaction(&self) -> Transaction {
        // the attribute refers to itself by ident, which resolves to a fresh
        // entity the first time and to the existing one afterwards
        let me = EntityRef::Ident(self.ident.clone());
        let tx = Transaction::new()
            .assert(me.clone(), IDENT, self.ident.as_str())
            .assert(me.clone(), VALUE_TYPE, EntityRef::Id(type_entity(self.value_type)))
            .assert(me.clone(), CARDINALITY, EntityRef::Id(self.cardinality.entity()))
            .assert(me.clone(), UNIQUE, self.unique)
            .assert(me.clone(), INDEX, self.indexed);
        match &self.doc {
            Some(doc) => tx.assert(me, DOC, doc.as_str()),
            None => tx,
        }
    }
}
