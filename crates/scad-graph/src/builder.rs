//! Fluent builder for graphs
//!
//! Assembles a graph directly, without consulting the connection rules.
//! Intended for tests and tooling; editors go through refactorings.
//!
//! # Example
//!
//! ```ignore
//! let graph = GraphBuilder::main()
//!     .add(ConstantValue::number(2.0), "two", (0.0, 0.0))
//!     .add(BinaryOperatorNode::new(BinaryOperator::Add), "add", (200.0, 0.0))
//!     .connect("two", 0, "add", 0)
//!     .build()?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::factory::NodeFactory;
use crate::graph::{Connection, ScadGraph};
use crate::library::InvokableDescription;
use crate::node::ScadNode;

/// Fluent builder for [`ScadGraph`]
pub struct GraphBuilder {
    description: Arc<InvokableDescription>,
    nodes: Vec<Box<dyn ScadNode>>,
    connections: Vec<Connection>,
    // id a node was created with -> id given here
    renamed: HashMap<String, String>,
    failed: Option<crate::error::ScadGraphError>,
}

impl GraphBuilder {
    /// Builder for an empty main module
    pub fn main() -> Self {
        Self::empty(InvokableDescription::main_module())
    }

    /// Builder for a function or module graph, starting with its entry nodes.
    ///
    /// The entry point gets the id `entry`, a function return `return`.
    pub fn for_invokable(description: &InvokableDescription) -> Self {
        let mut builder = Self::empty(description.clone());
        match NodeFactory::entry_nodes(description) {
            Ok(nodes) => {
                for (node, id) in nodes.into_iter().zip(["entry", "return"]) {
                    let position = node.position();
                    builder = builder.add_boxed(node, id, position);
                }
            }
            Err(e) => builder.failed = Some(e),
        }
        builder
    }

    fn empty(description: InvokableDescription) -> Self {
        Self {
            description: Arc::new(description),
            nodes: Vec::new(),
            connections: Vec::new(),
            renamed: HashMap::new(),
            failed: None,
        }
    }

    /// Add a node under the given id
    pub fn add(self, node: impl ScadNode, id: impl Into<String>, position: (f64, f64)) -> Self {
        self.add_boxed(Box::new(node), id, position)
    }

    pub fn add_boxed(mut self, mut node: Box<dyn ScadNode>, id: impl Into<String>, position: (f64, f64)) -> Self {
        let id = id.into();
        self.renamed.insert(node.id().to_string(), id.clone());
        node.core_mut().set_id(id);
        node.core_mut().position = position;
        self.nodes.push(node);
        self
    }

    /// Connect an output port to an input port
    pub fn connect(
        mut self,
        from: impl Into<String>,
        from_port: usize,
        to: impl Into<String>,
        to_port: usize,
    ) -> Self {
        self.connections
            .push(Connection::new(from, from_port, to, to_port));
        self
    }

    /// Build the graph; structural errors surface here, rule checks are skipped
    pub fn build(self) -> Result<ScadGraph> {
        if let Some(e) = self.failed {
            return Err(e);
        }
        let mut graph = ScadGraph::new(self.description);
        for mut node in self.nodes {
            // keep bound pairs linked across the renaming
            if let Some(bound) = node.as_bound_mut() {
                if let Some(other) = self.renamed.get(bound.other_node_id()).cloned() {
                    bound.set_other_node_id(&other);
                }
            }
            graph.add_node(node)?;
        }
        for connection in self.connections {
            graph.add_connection(connection)?;
        }
        for id in graph.node_ids() {
            graph.sync_literal_flags(&id)?;
        }
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScadGraphError;
    use crate::library::ParameterDescription;
    use crate::nodes::comprehension::FilterIf;
    use crate::nodes::constants::ConstantValue;
    use crate::nodes::scopes::{bound_pair, ScopeFlavor};
    use crate::port::{PortId, PortType};

    #[test]
    fn test_function_graph_gets_entry_and_return() {
        let description = InvokableDescription::function("f")
            .with_parameter(ParameterDescription::new("x", PortType::Number));
        let graph = GraphBuilder::for_invokable(&description)
            .connect("entry", 0, "return", 0)
            .build()
            .unwrap();
        assert_eq!(graph.node_ids(), ["entry", "return"]);
        assert_eq!(graph.connections().len(), 1);
        assert_eq!(graph.by_id("return").unwrap().position(), (400.0, 0.0));
    }

    #[test]
    fn test_bound_pairs_stay_linked() {
        let (start, end) = bound_pair(ScopeFlavor::LetBlock);
        let graph = GraphBuilder::main()
            .add(start, "s", (0.0, 0.0))
            .add(end, "e", (10.0, 0.0))
            .build()
            .unwrap();
        assert_eq!(graph.by_id("s").unwrap().as_bound().unwrap().other_node_id(), "e");
        assert_eq!(graph.by_id("e").unwrap().as_bound().unwrap().other_node_id(), "s");
    }

    #[test]
    fn test_connected_literal_is_unset() {
        let graph = GraphBuilder::main()
            .add(ConstantValue::boolean(true), "yes", (0.0, 0.0))
            .add(FilterIf::new(), "if", (0.0, 0.0))
            .connect("yes", 0, "if", 0)
            .build()
            .unwrap();
        let literal = graph.by_id("if").unwrap().core().literal(PortId::input(0)).unwrap();
        assert!(!literal.is_set);

        let err = GraphBuilder::main()
            .add(ConstantValue::number(1.0), "a", (0.0, 0.0))
            .connect("a", 0, "missing", 0)
            .build()
            .unwrap_err();
        assert!(matches!(err, ScadGraphError::NodeNotFound { .. }));
    }
}
