//! Tempora – a temporal, append-only fact store.
//!
//! The unit of data is the *fact* (or datom): `(entity, attribute, value, tx, added)`.
//! Facts are never updated or deleted. A retraction is just another fact with
//! `added == false`, so the whole history stays addressable by the transaction
//! counter `t`:
//! * A [`construct::Fact`] is immutable once created; ids are plain `u64`s.
//! * A [`database::Database`] is a read-only snapshot pinned to one `t`.
//! * A [`transaction::Transaction`] is an ordered list of assert/retract
//!   operations, submitted through anything [`transaction::Transactable`].
//! * A [`connection::Connection`] owns the storage, serializes writers and hands
//!   out snapshots.
//!
//! ## Modules
//! * [`construct`] – Identities, facts and transaction records.
//! * [`datatype`] – The [`datatype::Value`] union and the [`datatype::DataType`]
//!   trait mapping Rust types onto it.
//! * [`encoding`] – Order-preserving key encoding of the four index views
//!   (EAVT, AEVT, AVET, VAET).
//! * [`storage`] – The [`storage::Storage`] contract and the in-memory backend.
//! * [`persist`] – The SQLite backend.
//! * [`schema`] – Built-in attributes and attribute declarations.
//! * [`database`] – Snapshot queries.
//! * [`transaction`] – The request model and the staging pipeline.
//! * [`connection`] – Snapshots, commits and the single-writer discipline.
//! * [`config`] – Backend selection from files and `TEMPORA_*` variables.
//! * [`notation`] / [`interface`] – Text notation and opaque handles for bindings.
//!
//! ## Attributes
//! Attributes are entities themselves and must be declared before (or in the
//! same transaction as) their first use. Their declared characteristics decide
//! where their facts go: every fact lands in EAVT and AEVT, facts of unique or
//! indexed attributes also in AVET, and facts of reference-typed attributes
//! also in VAET. Single-valued attributes keep one value per entity; asserting
//! a new one retracts the old one in the same transaction.
//!
//! ## Quick Start
//! ```
//! use tempora::connection::Connection;
//! use tempora::datatype::ValueType;
//! use tempora::schema::AttributeSchema;
//! use tempora::storage::MemoryStorage;
//! use tempora::transaction::{EntityRef, Transactable};
//!
//! let conn = Connection::new(MemoryStorage::new()).unwrap();
//! let tx = AttributeSchema::new("person/name", ValueType::String)
//!     .transaction()
//!     .assert(EntityRef::temp("ada"), "person/name", "Ada");
//! let result = conn.transact(&tx).unwrap();
//! assert_eq!(result.t(), 1);
//!
//! let ada = result.tempid("ada").unwrap();
//! let db = conn.db().unwrap();
//! let name = db.lookup_ident("person/name").unwrap().unwrap();
//! assert_eq!(db.value_as::<String>(ada, name).unwrap().as_deref(), Some("Ada"));
//! assert!(conn.as_of(0).unwrap().entity_facts(ada).unwrap().is_empty());
//! ```

pub mod config;
pub mod connection;
pub mod construct;
pub mod database;
pub mod datatype;
pub mod encoding;
pub mod error;
pub mod interface;
pub mod notation;
pub mod persist;
pub mod schema;
pub mod storage;
pub mod transaction;

pub use connection::Connection;
pub use construct::{AttributeId, EntityId, Fact, TxId};
pub use database::Database;
pub use datatype::{Value, ValueType};
pub use transaction::{EntityRef, Transactable, Transaction, TransactionResult};
