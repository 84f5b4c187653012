//! Concrete node kinds
//!
//! Each submodule holds one family of nodes. Families that need their own
//! connection rules expose a `register_rules` function that
//! [`ConnectionRules::standard`](crate::rules::ConnectionRules::standard) calls.

pub mod comprehension;
pub mod constants;
pub mod csg;
pub mod entry_point;
pub mod functions;
pub mod helpers;
pub mod invocation;
pub mod operators;
pub mod scopes;
pub mod statements;

use crate::error::{Result, ScadGraphError};
use crate::persistence::SavedNode;
use crate::port::PortType;

/// Read a port type stored under `key`
pub(crate) fn saved_port_type(record: &SavedNode, key: &str) -> Result<PortType> {
    let text = record.get_str(key)?;
    serde_json::from_value(serde_json::Value::String(text.to_string()))
        .map_err(|_| ScadGraphError::broken(format!("unknown port type '{}' under '{}'", text, key)))
}

pub(crate) fn port_type_key(port_type: PortType) -> String {
    match serde_json::to_value(port_type) {
        Ok(serde_json::Value::String(s)) => s,
        _ => port_type.label().to_lowercase(),
    }
}
