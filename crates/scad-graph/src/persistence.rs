//! Flat persistence records
//!
//! Nodes persist as a string/int/bool/double key-value bag, connections as
//! explicit id+port quadruples. Restoring a node runs in three phases: port
//! definitions (kind-specific state), literal structures, literal values.
//! Any record that cannot be restored is reported as [`ScadGraphError::BrokenFile`].

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScadGraphError};
use crate::factory::NodeFactory;
use crate::graph::{Connection, ScadGraph};
use crate::library::{InvokableDescription, VariableDescription};
use crate::literal::Literal;
use crate::modifier::Modifiers;
use crate::node::ScadNode;
use crate::port::{PortDirection, PortId};
use crate::project::{ExternalReference, OverlayResolver, ReferenceResolver, ScadProject};

/// One value in a node's key-value bag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SavedValue {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
}

/// Persisted form of a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedNode {
    pub id: String,
    pub kind: String,
    pub position: (f64, f64),
    #[serde(default)]
    pub data: BTreeMap<String, SavedValue>,
}

impl SavedNode {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, position: (f64, f64)) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            position,
            data: BTreeMap::new(),
        }
    }

    pub fn set_str(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data.insert(key.into(), SavedValue::String(value.into()));
    }

    pub fn set_int(&mut self, key: impl Into<String>, value: i64) {
        self.data.insert(key.into(), SavedValue::Int(value));
    }

    pub fn set_bool(&mut self, key: impl Into<String>, value: bool) {
        self.data.insert(key.into(), SavedValue::Bool(value));
    }

    pub fn set_double(&mut self, key: impl Into<String>, value: f64) {
        self.data.insert(key.into(), SavedValue::Double(value));
    }

    pub fn has(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    fn require(&self, key: &str) -> Result<&SavedValue> {
        self.data.get(key).ok_or_else(|| {
            ScadGraphError::broken(format!("node '{}' ({}) is missing '{}'", self.id, self.kind, key))
        })
    }

    fn wrong_type(&self, key: &str, expected: &str) -> ScadGraphError {
        ScadGraphError::broken(format!(
            "node '{}' ({}): '{}' is not a {}",
            self.id, self.kind, key, expected
        ))
    }

    pub fn get_str(&self, key: &str) -> Result<&str> {
        match self.require(key)? {
            SavedValue::String(s) => Ok(s),
            _ => Err(self.wrong_type(key, "string")),
        }
    }

    pub fn get_int(&self, key: &str) -> Result<i64> {
        match self.require(key)? {
            SavedValue::Int(i) => Ok(*i),
            _ => Err(self.wrong_type(key, "integer")),
        }
    }

    pub fn get_usize(&self, key: &str) -> Result<usize> {
        usize::try_from(self.get_int(key)?).map_err(|_| self.wrong_type(key, "non-negative integer"))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        match self.require(key)? {
            SavedValue::Bool(b) => Ok(*b),
            _ => Err(self.wrong_type(key, "boolean")),
        }
    }

    pub fn get_double(&self, key: &str) -> Result<f64> {
        match self.require(key)? {
            SavedValue::Double(d) => Ok(*d),
            SavedValue::Int(i) => Ok(*i as f64),
            _ => Err(self.wrong_type(key, "number")),
        }
    }

    /// Optional boolean; missing means `default`
    pub fn get_bool_or(&self, key: &str, default: bool) -> Result<bool> {
        if self.has(key) {
            self.get_bool(key)
        } else {
            Ok(default)
        }
    }
}

fn literal_keys(direction: PortDirection, index: usize) -> (String, String) {
    let prefix = match direction {
        PortDirection::Input => "input",
        PortDirection::Output => "output",
    };
    (
        format!("{}_literal_value.{}", prefix, index),
        format!("{}_literal_set.{}", prefix, index),
    )
}

/// Persist one node
pub fn save_node(node: &dyn ScadNode) -> SavedNode {
    let core = node.core();
    let mut record = SavedNode::new(node.id(), node.kind(), core.position);
    if !core.modifiers.is_empty() {
        record.set_int("modifiers", i64::from(core.modifiers.bits()));
    }
    if let Some(color) = &core.color {
        record.set_str("color", color.clone());
    }
    node.save_state(&mut record);
    for direction in [PortDirection::Input, PortDirection::Output] {
        for index in 0..core.port_count(direction) {
            if let Some(literal) = core.literal(PortId { direction, index }) {
                let (value_key, set_key) = literal_keys(direction, index);
                record.set_str(value_key, literal.serialized_value());
                record.set_bool(set_key, literal.is_set);
            }
        }
    }
    record
}

/// Rebuild a node from its record
pub fn restore_node(record: &SavedNode, resolver: &dyn ReferenceResolver) -> Result<Box<dyn ScadNode>> {
    let mut node = NodeFactory::blank(&record.kind)?;
    {
        let core = node.core_mut();
        core.set_id(record.id.clone());
        core.position = record.position;
        if record.has("modifiers") {
            let bits = record.get_int("modifiers")?;
            core.modifiers = Modifiers::from_bits(
                u8::try_from(bits).map_err(|_| ScadGraphError::broken("modifier bits out of range"))?,
            );
        }
        if record.has("color") {
            core.color = Some(record.get_str("color")?.to_string());
        }
    }

    // ports
    node.restore_state(record, resolver)?;

    // literal structures
    node.core_mut().rebuild_all_literals()?;

    // literal values
    for direction in [PortDirection::Input, PortDirection::Output] {
        for index in 0..node.core().port_count(direction) {
            let port = PortId { direction, index };
            let Some(kind) = node.core().literal(port).map(|l| l.kind()) else {
                continue;
            };
            let (value_key, set_key) = literal_keys(direction, index);
            if !record.has(&value_key) {
                continue;
            }
            let literal = Literal::from_serialized(
                kind,
                record.get_str(&value_key)?,
                record.get_bool_or(&set_key, false)?,
            )?;
            node.core_mut().replace_literal(port, literal);
        }
    }
    Ok(node)
}

/// Persisted form of a connection
pub type SavedConnection = Connection;

/// Persisted form of a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedGraph {
    pub description: InvokableDescription,
    #[serde(default)]
    pub nodes: Vec<SavedNode>,
    #[serde(default)]
    pub connections: Vec<SavedConnection>,
}

pub fn save_graph(graph: &ScadGraph) -> SavedGraph {
    SavedGraph {
        description: (**graph.description()).clone(),
        nodes: graph.nodes().map(save_node).collect(),
        connections: graph.connections().to_vec(),
    }
}

/// Rebuild a graph; its own description resolves even if not yet registered
pub fn load_graph(saved: &SavedGraph, resolver: &dyn ReferenceResolver) -> Result<ScadGraph> {
    let description = Arc::new(saved.description.clone());
    let overlay = OverlayResolver {
        description: description.clone(),
        parent: resolver,
    };
    let mut graph = ScadGraph::new(description);
    for record in &saved.nodes {
        let node = restore_node(record, &overlay)?;
        graph
            .add_node(node)
            .map_err(|e| ScadGraphError::broken(e.to_string()))?;
    }
    for connection in &saved.connections {
        graph
            .add_connection(connection.clone())
            .map_err(|e| ScadGraphError::broken(e.to_string()))?;
    }
    Ok(graph)
}

/// Persisted form of a whole project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedProject {
    pub main_module: SavedGraph,
    #[serde(default)]
    pub functions: Vec<SavedGraph>,
    #[serde(default)]
    pub modules: Vec<SavedGraph>,
    #[serde(default)]
    pub variables: Vec<VariableDescription>,
    #[serde(default)]
    pub external_references: Vec<ExternalReference>,
}

impl SavedProject {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ScadGraphError::broken(e.to_string()))
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

impl ScadProject {
    pub fn save(&self) -> SavedProject {
        SavedProject {
            main_module: save_graph(self.main()),
            functions: self.functions().map(save_graph).collect(),
            modules: self.modules().map(save_graph).collect(),
            variables: self.variables().map(|v| (**v).clone()).collect(),
            external_references: self.external_references().to_vec(),
        }
    }

    /// Rebuild a project. Descriptions are registered before any node is
    /// restored so cross-graph references resolve.
    pub fn load(saved: &SavedProject, parent: Arc<dyn ReferenceResolver>) -> Result<Self> {
        let mut project = ScadProject::new(parent);
        for variable in &saved.variables {
            project
                .add_variable(variable.clone())
                .map_err(|e| ScadGraphError::broken(e.to_string()))?;
        }
        for reference in &saved.external_references {
            project
                .add_external_reference(reference.clone())
                .map_err(|e| ScadGraphError::broken(e.to_string()))?;
        }
        let sections = [(&saved.functions, true), (&saved.modules, false)];
        for (graphs, functions) in sections {
            for saved_graph in graphs {
                let description = &saved_graph.description;
                let misfiled = if functions {
                    !description.is_function()
                } else {
                    !description.is_module()
                };
                if misfiled {
                    return Err(ScadGraphError::broken(format!(
                        "graph '{}' is filed under the wrong section",
                        description.name
                    )));
                }
                project
                    .insert_graph(ScadGraph::new(Arc::new(description.clone())))
                    .map_err(|e| ScadGraphError::broken(e.to_string()))?;
            }
        }
        if !saved.main_module.description.is_main() {
            return Err(ScadGraphError::broken("main module record has the wrong kind"));
        }

        let mut loaded = Vec::new();
        for saved_graph in saved.functions.iter().chain(saved.modules.iter()) {
            loaded.push(load_graph(saved_graph, &project)?);
        }
        let main = load_graph(&saved.main_module, &project)?;

        for graph in loaded {
            let id = graph.id().to_string();
            *project.graph_mut(&id)? = graph;
        }
        project.set_main(main);
        Ok(project)
    }
}
