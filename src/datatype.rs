// used to print out readable forms of a value
use std::fmt;
// values are compared and hashed by their bits, floats included
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::construct::EntityId;

// ------------- Value Types --------------
/// The declared type of an attribute. Every [`Value`] carries exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Boolean,
    Integer,
    Float,
    String,
    Bytes,
    Ref,
}

impl ValueType {
    pub const ALL: [ValueType; 6] = [
        ValueType::Boolean,
        ValueType::Integer,
        ValueType::Float,
        ValueType::String,
        ValueType::Bytes,
        ValueType::Ref,
    ];
    // The identifier doubles as the type tag in encoded keys, so its numeric
    // order is the order in which values of different types sort.
    pub const fn uid(self) -> u8 {
        match self {
            ValueType::Boolean => 1,
            ValueType::Integer => 2,
            ValueType::Float => 3,
            ValueType::String => 4,
            ValueType::Bytes => 5,
            ValueType::Ref => 6,
        }
    }
    pub fn from_uid(uid: u8) -> Option<ValueType> {
        ValueType::ALL.into_iter().find(|t| t.uid() == uid)
    }
    pub const fn name(self) -> &'static str {
        match self {
            ValueType::Boolean => "boolean",
            ValueType::Integer => "integer",
            ValueType::Float => "float",
            ValueType::String => "string",
            ValueType::Bytes => "bytes",
            ValueType::Ref => "ref",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ------------- Value --------------
/// The value position of a fact.
///
/// Values of different types never compare equal; across types they order by
/// [`ValueType::uid`], within a type by their natural order (floats by
/// [`f64::total_cmp`]). This is the same order the key encoding preserves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Ref(EntityId),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Boolean(_) => ValueType::Boolean,
            Value::Integer(_) => ValueType::Integer,
            Value::Float(_) => ValueType::Float,
            Value::String(_) => ValueType::String,
            Value::Bytes(_) => ValueType::Bytes,
            Value::Ref(_) => ValueType::Ref,
        }
    }
    pub fn as_entity(&self) -> Option<EntityId> {
        match self {
            Value::Ref(e) => Some(*e),
            _ => None,
        }
    }
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }
    // NaN and the infinities cannot be written into a fact
    pub fn is_well_formed(&self) -> bool {
        match self {
            Value::Float(f) => f.is_finite(),
            _ => true,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Value {}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Bytes(a), Value::Bytes(b)) => a.cmp(b),
            (Value::Ref(a), Value::Ref(b)) => a.cmp(b),
            (a, b) => a.value_type().uid().cmp(&b.value_type().uid()),
        }
    }
}
impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.value_type().uid().hash(state);
        match self {
            Value::Boolean(b) => b.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Float(f) => f.to_bits().hash(state),
            Value::String(s) => s.hash(state),
            Value::Bytes(b) => b.hash(state),
            Value::Ref(e) => e.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Bytes(b) => {
                write!(f, "0x")?;
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            Value::Ref(e) => write!(f, "#{}", e),
        }
    }
}

// ------------- Data Types --------------
/// Rust types that map one-to-one onto a [`ValueType`], so snapshot reads can
/// hand back typed values.
pub trait DataType: Sized {
    // static stuff which needs to be implemented downstream
    const UID: u8;
    const DATA_TYPE: &'static str;
    fn into_value(self) -> Value;
    fn from_value(value: &Value) -> Option<Self>;
    // instance callable with pre-made implementation
    fn data_type(&self) -> &'static str {
        Self::DATA_TYPE
    }
    fn identifier(&self) -> u8 {
        Self::UID
    }
}

impl DataType for bool {
    const UID: u8 = ValueType::Boolean.uid();
    const DATA_TYPE: &'static str = ValueType::Boolean.name();
    fn into_value(self) -> Value {
        Value::Boolean(self)
    }
    fn from_value(value: &Value) -> Option<bool> {
        value.as_bool()
    }
}
impl DataType for i64 {
    const UID: u8 = ValueType::Integer.uid();
    const DATA_TYPE: &'static str = ValueType::Integer.name();
    fn into_value(self) -> Value {
        Value::Integer(self)
    }
    fn from_value(value: &Value) -> Option<i64> {
        match value {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }
}
impl DataType for f64 {
    const UID: u8 = ValueType::Float.uid();
    const DATA_TYPE: &'static str = ValueType::Float.name();
    fn into_value(self) -> Value {
        Value::Float(self)
    }
    fn from_value(value: &Value) -> Option<f64> {
        match value {
            Value::Float(x) => Some(*x),
            _ => None,
        }
    }
}
impl DataType for String {
    const UID: u8 = ValueType::String.uid();
    const DATA_TYPE: &'static str = ValueType::String.name();
    fn into_value(self) -> Value {
        Value::String(self)
    }
    fn from_value(value: &Value) -> Option<String> {
        value.as_str().map(String::from)
    }
}
impl DataType for Vec<u8> {
    const UID: u8 = ValueType::Bytes.uid();
    const DATA_TYPE: &'static str = ValueType::Bytes.name();
    fn into_value(self) -> Value {
        Value::Bytes(self)
    }
    fn from_value(value: &Value) -> Option<Vec<u8>> {
        match value {
            Value::Bytes(b) => Some(b.clone()),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        v.into_value()
    }
}
impl From<i64> for Value {
    fn from(v: i64) -> Self {
        v.into_value()
    }
}
impl From<f64> for Value {
    fn from(v: f64) -> Self {
        v.into_value()
    }
}
impl From<String> for Value {
    fn from(v: String) -> Self {
        v.into_value()
    }
}
impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}
impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        v.into_value()
    }
}
