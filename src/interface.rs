//! The surface a language-binding layer builds on.
//!
//! Connections and facts cross it only as opaque handles: there is no field
//! access and handles compare by nothing. The operations are limited to
//! creating a connection, asking for its latest `t` and moving a fact to and
//! from its text notation.

use std::fmt;
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::connection::Connection;
use crate::construct::{Fact, TxId};
use crate::error::{ConnectionResult, NotationError};
use crate::notation;

/// Shared handle on a connection. Cloning it does not open another connection.
#[derive(Clone)]
pub struct ConnectionHandle(Arc<Connection>);

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ConnectionHandle")
    }
}

pub struct FactHandle(Fact);

impl fmt::Debug for FactHandle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "FactHandle")
    }
}

impl ConnectionHandle {
    pub(crate) fn connection(&self) -> &Connection {
        &self.0
    }
}

impl FactHandle {
    pub(crate) fn fact(&self) -> &Fact {
        &self.0
    }
}

/// Opens a connection over the backend `config` selects.
pub fn new_connection(config: &StoreConfig) -> ConnectionResult<ConnectionHandle> {
    Ok(ConnectionHandle(Arc::new(Connection::open(config)?)))
}

pub fn latest_t(connection: &ConnectionHandle) -> ConnectionResult<TxId> {
    connection.connection().latest_t()
}

pub fn fact_from_text(text: &str) -> Result<FactHandle, NotationError> {
    notation::decode_fact(text).map(FactHandle)
}

pub fn fact_to_text(fact: &FactHandle) -> Result<String, NotationError> {
    notation::encode_fact(fact.fact())
}
