//! Graph model
//!
//! A [`ScadGraph`] owns the nodes and connections of one invokable. Its
//! mutators only guard structural invariants; whether a connection is
//! *legal* is decided by the rule engine before a refactoring calls in here.

use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScadGraphError};
use crate::library::InvokableDescription;
use crate::node::{NodeId, ScadNode};
use crate::port::{PortId, PortType};

/// Id of a graph; equal to the id of its invokable description
pub type GraphId = String;

/// Directed connection from an output port to an input port
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub from: NodeId,
    pub from_port: usize,
    pub to: NodeId,
    pub to_port: usize,
}

impl Connection {
    pub fn new(
        from: impl Into<NodeId>,
        from_port: usize,
        to: impl Into<NodeId>,
        to_port: usize,
    ) -> Self {
        Self {
            from: from.into(),
            from_port,
            to: to.into(),
            to_port,
        }
    }

    pub fn involves(&self, node_id: &str) -> bool {
        self.from == node_id || self.to == node_id
    }

    pub fn is_from(&self, node_id: &str, port: usize) -> bool {
        self.from == node_id && self.from_port == port
    }

    pub fn is_to(&self, node_id: &str, port: usize) -> bool {
        self.to == node_id && self.to_port == port
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} -> {}:{}", self.from, self.from_port, self.to, self.to_port)
    }
}

/// Nodes and connections of one function, module or main module
#[derive(Debug, Clone)]
pub struct ScadGraph {
    description: Arc<InvokableDescription>,
    nodes: Vec<Box<dyn ScadNode>>,
    connections: Vec<Connection>,
}

impl ScadGraph {
    pub fn new(description: Arc<InvokableDescription>) -> Self {
        Self {
            description,
            nodes: Vec::new(),
            connections: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.description.id
    }

    pub fn description(&self) -> &Arc<InvokableDescription> {
        &self.description
    }

    pub fn set_description(&mut self, description: Arc<InvokableDescription>) {
        self.description = description;
    }

    pub fn nodes(&self) -> impl Iterator<Item = &(dyn ScadNode + 'static)> {
        self.nodes.iter().map(|n| n.as_ref())
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.id().to_string()).collect()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn find_node(&self, id: &str) -> Option<&dyn ScadNode> {
        self.nodes.iter().find(|n| n.id() == id).map(|n| n.as_ref())
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.find_node(id).is_some()
    }

    /// Node by id; a miss is an error
    pub fn by_id(&self, id: &str) -> Result<&dyn ScadNode> {
        self.find_node(id)
            .ok_or_else(|| ScadGraphError::node_not_found(self.id(), id))
    }

    pub fn by_id_mut(&mut self, id: &str) -> Result<&mut (dyn ScadNode + 'static)> {
        let graph_id = self.description.id.clone();
        self.nodes
            .iter_mut()
            .find(|n| n.id() == id)
            .map(|n| n.as_mut())
            .ok_or_else(|| ScadGraphError::node_not_found(&graph_id, id))
    }

    /// Node by id downcast to a concrete kind
    pub fn node_as<T: ScadNode>(&self, id: &str) -> Result<&T> {
        self.by_id(id)?.as_any().downcast_ref::<T>().ok_or_else(|| {
            ScadGraphError::invariant(format!("node '{}' is not of the expected kind", id))
        })
    }

    pub fn node_as_mut<T: ScadNode>(&mut self, id: &str) -> Result<&mut T> {
        self.by_id_mut(id)?
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or_else(|| {
                ScadGraphError::invariant(format!("node '{}' is not of the expected kind", id))
            })
    }

    /// Connections arriving at an input port
    pub fn incoming<'a>(
        &'a self,
        node_id: &'a str,
        port: usize,
    ) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.iter().filter(move |c| c.is_to(node_id, port))
    }

    /// Connections leaving an output port
    pub fn outgoing<'a>(
        &'a self,
        node_id: &'a str,
        port: usize,
    ) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.iter().filter(move |c| c.is_from(node_id, port))
    }

    /// All connections touching the node, in graph order
    pub fn connections_of(&self, node_id: &str) -> Vec<Connection> {
        self.connections
            .iter()
            .filter(|c| c.involves(node_id))
            .cloned()
            .collect()
    }

    /// All connections touching one port of the node
    pub fn connections_at(&self, node_id: &str, port: PortId) -> Vec<Connection> {
        self.connections
            .iter()
            .filter(|c| {
                if port.is_input() {
                    c.is_to(node_id, port.index)
                } else {
                    c.is_from(node_id, port.index)
                }
            })
            .cloned()
            .collect()
    }

    pub fn is_port_connected(&self, node_id: &str, port: PortId) -> bool {
        if port.is_input() {
            self.incoming(node_id, port.index).next().is_some()
        } else {
            self.outgoing(node_id, port.index).next().is_some()
        }
    }

    pub fn has_connection(&self, connection: &Connection) -> bool {
        self.connections.contains(connection)
    }

    /// Whether adding `connection` would close a cycle
    pub fn would_create_cycle(&self, connection: &Connection) -> bool {
        if connection.from == connection.to {
            return true;
        }
        // a path from `to` back to `from` closes the loop
        let mut seen: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([connection.to.as_str()]);
        while let Some(current) = queue.pop_front() {
            if current == connection.from {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            for c in self.connections.iter().filter(|c| c.from == current) {
                queue.push_back(&c.to);
            }
        }
        false
    }

    /// Add a node; the id must be unique in this graph
    pub fn add_node(&mut self, node: Box<dyn ScadNode>) -> Result<()> {
        if self.contains_node(node.id()) {
            return Err(ScadGraphError::invariant(format!(
                "duplicate node id '{}' in graph '{}'",
                node.id(),
                self.id()
            )));
        }
        self.nodes.push(node);
        Ok(())
    }

    /// Remove a node; connections must have been stripped first
    pub fn remove_node(&mut self, id: &str) -> Result<Box<dyn ScadNode>> {
        if self.connections.iter().any(|c| c.involves(id)) {
            return Err(ScadGraphError::invariant(format!(
                "node '{}' still has connections",
                id
            )));
        }
        let index = self
            .nodes
            .iter()
            .position(|n| n.id() == id)
            .ok_or_else(|| ScadGraphError::node_not_found(self.id(), id))?;
        Ok(self.nodes.remove(index))
    }

    /// Add a connection; both endpoints and ports must exist
    pub fn add_connection(&mut self, connection: Connection) -> Result<()> {
        let from = self.by_id(&connection.from)?;
        if from.port_type(PortId::output(connection.from_port)).is_none() {
            return Err(ScadGraphError::invariant(format!(
                "connection {} leaves a missing output port",
                connection
            )));
        }
        let to = self.by_id(&connection.to)?;
        if to.port_type(PortId::input(connection.to_port)).is_none() {
            return Err(ScadGraphError::invariant(format!(
                "connection {} enters a missing input port",
                connection
            )));
        }
        if self.has_connection(&connection) {
            return Err(ScadGraphError::invariant(format!(
                "connection {} already exists",
                connection
            )));
        }
        self.connections.push(connection);
        Ok(())
    }

    pub fn remove_connection(&mut self, connection: &Connection) -> Result<()> {
        let index = self
            .connections
            .iter()
            .position(|c| c == connection)
            .ok_or_else(|| {
                ScadGraphError::invariant(format!("connection {} does not exist", connection))
            })?;
        self.connections.remove(index);
        Ok(())
    }

    /// Whether this graph may contain the node at all
    pub fn can_use(&self, node: &dyn ScadNode) -> bool {
        if node.is_render_helper() {
            return true;
        }
        let own_reference = node
            .as_invokable_reference()
            .map(|r| r.invokable_id() == self.id())
            .unwrap_or(false);
        if node.as_entry_point().is_some() || !node.can_be_deleted() {
            // entry/return nodes only live in their own graph
            return own_reference;
        }
        if self.description.is_function() {
            return node.is_expression();
        }
        true
    }

    pub fn entry_point(&self) -> Option<&dyn ScadNode> {
        self.nodes().find(|n| n.as_entry_point().is_some())
    }

    /// Type of the port a connection leaves from
    pub fn source_type(&self, connection: &Connection) -> Option<PortType> {
        self.find_node(&connection.from)?
            .port_type(PortId::output(connection.from_port))
    }

    /// Type of the port a connection arrives at
    pub fn target_type(&self, connection: &Connection) -> Option<PortType> {
        self.find_node(&connection.to)?
            .port_type(PortId::input(connection.to_port))
    }

    /// Switch off auto-set literals on inputs that have a connection
    pub fn sync_literal_flags(&mut self, node_id: &str) -> Result<()> {
        let connected: Vec<bool> = {
            let node = self.by_id(node_id)?;
            (0..node.input_count())
                .map(|i| self.is_port_connected(node_id, PortId::input(i)))
                .collect()
        };
        let core = self.by_id_mut(node_id)?.core_mut();
        for (index, connected) in connected.into_iter().enumerate() {
            let port = PortId::input(index);
            let auto = core
                .port_definition(port)
                .map(|d| d.auto_set_literal)
                .unwrap_or(false);
            if !auto || !connected {
                continue;
            }
            if let Some(literal) = core.literal_mut(port) {
                literal.is_set = false;
            }
        }
        Ok(())
    }

    /// Move a connection set over to new port indices
    pub(crate) fn replace_connections(&mut self, old: &[Connection], new: Vec<Connection>) -> Result<()> {
        for c in old {
            self.remove_connection(c)?;
        }
        for c in new {
            self.add_connection(c)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::nodes::constants::ConstantValue;
    use crate::nodes::csg::Difference;

    fn sample() -> ScadGraph {
        GraphBuilder::main()
            .add(Difference::new(), "diff", (0.0, 0.0))
            .add(Difference::new(), "inner", (0.0, 50.0))
            .add(ConstantValue::new(PortType::Number), "n", (0.0, 100.0))
            .connect("inner", 0, "diff", 0)
            .build()
            .unwrap()
    }

    #[test]
    fn test_queries() {
        let graph = sample();
        assert_eq!(graph.node_count(), 3);
        assert!(graph.contains_node("n"));
        assert_eq!(graph.incoming("diff", 0).count(), 1);
        assert_eq!(graph.outgoing("inner", 0).count(), 1);
        assert!(graph.is_port_connected("diff", PortId::input(0)));
        assert!(!graph.is_port_connected("diff", PortId::input(1)));
        assert_eq!(graph.connections_of("inner").len(), 1);
        assert_eq!(
            graph.source_type(&graph.connections()[0]),
            Some(PortType::Geometry)
        );
    }

    #[test]
    fn test_duplicate_node_id_rejected() {
        let mut graph = sample();
        let mut dup = Difference::new();
        dup.core_mut().set_id("diff");
        let err = graph.add_node(Box::new(dup)).unwrap_err();
        assert!(matches!(err, ScadGraphError::InvariantViolation(_)));
    }

    #[test]
    fn test_remove_connected_node_rejected() {
        let mut graph = sample();
        assert!(graph.remove_node("diff").is_err());
        let c = graph.connections()[0].clone();
        graph.remove_connection(&c).unwrap();
        assert!(graph.remove_node("diff").is_ok());
        assert!(!graph.contains_node("diff"));
    }

    #[test]
    fn test_add_connection_checks_ports_and_endpoints() {
        let mut graph = sample();
        assert!(graph.add_connection(Connection::new("n", 3, "diff", 1)).is_err());
        assert!(graph.add_connection(Connection::new("ghost", 0, "diff", 1)).is_err());
        assert!(graph.add_connection(Connection::new("inner", 0, "diff", 0)).is_err());
        graph.add_connection(Connection::new("inner", 0, "diff", 1)).unwrap();
    }

    #[test]
    fn test_cycle_detection() {
        let graph = sample();
        assert!(graph.would_create_cycle(&Connection::new("diff", 0, "inner", 0)));
        assert!(graph.would_create_cycle(&Connection::new("diff", 0, "diff", 1)));
        assert!(!graph.would_create_cycle(&Connection::new("inner", 0, "diff", 1)));
    }

    #[test]
    fn test_typed_lookup() {
        let graph = sample();
        assert!(graph.node_as::<Difference>("diff").is_ok());
        assert!(graph.node_as::<Difference>("n").is_err());
    }
}
