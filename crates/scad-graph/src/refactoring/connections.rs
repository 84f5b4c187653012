//! Connection refactorings
//!
//! These are the only refactorings that consult the rule engine. Side effects
//! handed out by the rules run before the connection is added or removed.

use crate::error::{Result, ScadGraphError};
use crate::graph::{Connection, GraphId};
use crate::node::NodeId;
use crate::port::PortId;
use crate::rules::RuleFlags;

use super::{Refactoring, RefactoringContext};

/// Connect two ports if the rules allow it
#[derive(Debug, Clone)]
pub struct AddConnection {
    graph: GraphId,
    connection: Connection,
}

impl AddConnection {
    pub fn new(graph: &str, connection: Connection) -> Self {
        Self {
            graph: graph.to_string(),
            connection,
        }
    }
}

impl Refactoring for AddConnection {
    fn name(&self) -> String {
        format!("Add connection {}", self.connection)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        let outcome = {
            let graph = ctx.graph(&self.graph)?;
            ctx.rules()
                .can_connect(graph, &self.connection, RuleFlags::default())
        };
        if outcome.is_vetoed() {
            log::warn!("connection {} in '{}' was vetoed", self.connection, self.graph);
            return Err(ScadGraphError::ConnectionVetoed {
                graph: self.graph.clone(),
                connection: self.connection.clone(),
            });
        }
        for effect in outcome.side_effects {
            ctx.perform_boxed(effect)?;
        }
        let graph = ctx.graph_mut(&self.graph)?;
        graph.add_connection(self.connection.clone())?;
        graph.sync_literal_flags(&self.connection.to)
    }
}

/// Remove one connection
#[derive(Debug, Clone)]
pub struct DeleteConnection {
    graph: GraphId,
    connection: Connection,
}

impl DeleteConnection {
    pub fn new(graph: &str, connection: Connection) -> Self {
        Self {
            graph: graph.to_string(),
            connection,
        }
    }
}

impl Refactoring for DeleteConnection {
    fn name(&self) -> String {
        format!("Delete connection {}", self.connection)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        let outcome = {
            let graph = ctx.graph(&self.graph)?;
            ctx.rules().can_disconnect(graph, &self.connection)
        };
        if outcome.is_vetoed() {
            log::warn!("disconnecting {} in '{}' was vetoed", self.connection, self.graph);
            return Err(ScadGraphError::invariant(format!(
                "connection {} may not be removed",
                self.connection
            )));
        }
        for effect in outcome.side_effects {
            ctx.perform_boxed(effect)?;
        }

        let graph = ctx.graph_mut(&self.graph)?;
        graph.remove_connection(&self.connection)?;

        // the literal takes over again once the last connection leaves
        let port = PortId::input(self.connection.to_port);
        if graph.is_port_connected(&self.connection.to, port) {
            return Ok(());
        }
        let Some(target) = graph.find_node(&self.connection.to) else {
            return Ok(());
        };
        let auto = target
            .core()
            .port_definition(port)
            .map(|d| d.auto_set_literal)
            .unwrap_or(false);
        if auto {
            if let Some(literal) = graph
                .by_id_mut(&self.connection.to)?
                .core_mut()
                .literal_mut(port)
            {
                literal.is_set = true;
            }
        }
        Ok(())
    }
}

/// Remove every connection arriving at one input port
#[derive(Debug, Clone)]
pub struct DeleteInputConnections {
    graph: GraphId,
    node: NodeId,
    port: usize,
}

impl DeleteInputConnections {
    pub fn new(graph: &str, node: &str, port: usize) -> Self {
        Self {
            graph: graph.to_string(),
            node: node.to_string(),
            port,
        }
    }
}

impl Refactoring for DeleteInputConnections {
    fn name(&self) -> String {
        format!("Delete connections into {}:{}", self.node, self.port)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        let existing = ctx
            .graph(&self.graph)?
            .connections_at(&self.node, PortId::input(self.port));
        for connection in existing {
            ctx.perform(DeleteConnection::new(&self.graph, connection))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::builtins::BuiltIns;
    use crate::library::MAIN_MODULE_ID;
    use crate::nodes::comprehension::FilterIf;
    use crate::nodes::constants::ConstantValue;
    use crate::nodes::csg::Difference;
    use crate::nodes::operators::{BinaryOperator, BinaryOperatorNode};
    use crate::project::ScadProject;
    use crate::rules::ConnectionRules;
    use std::sync::Arc;

    fn project() -> ScadProject {
        let mut project = ScadProject::new(Arc::new(BuiltIns::new()));
        let graph = GraphBuilder::main()
            .add(ConstantValue::number(1.0), "one", (0.0, 0.0))
            .add(ConstantValue::number(2.0), "two", (0.0, 10.0))
            .add(ConstantValue::string("s"), "text", (0.0, 20.0))
            .add(BinaryOperatorNode::new(BinaryOperator::Multiply), "mul", (50.0, 0.0))
            .add(Difference::new(), "a", (0.0, 30.0))
            .add(Difference::new(), "b", (0.0, 40.0))
            .add(Difference::new(), "sink", (50.0, 40.0))
            .add(ConstantValue::boolean(true), "yes", (0.0, 50.0))
            .add(FilterIf::new(), "if", (50.0, 50.0))
            .build()
            .unwrap();
        project.set_main(graph);
        project
    }

    fn run(project: &mut ScadProject, batch: Vec<Box<dyn Refactoring>>) -> Result<()> {
        let rules = ConnectionRules::standard();
        let mut ctx = RefactoringContext::new(project, &rules, 100);
        ctx.run(batch)
    }

    #[test]
    fn test_second_value_connection_supersedes_first() {
        let mut project = project();
        run(
            &mut project,
            vec![
                Box::new(AddConnection::new(MAIN_MODULE_ID, Connection::new("one", 0, "mul", 0))),
                Box::new(AddConnection::new(MAIN_MODULE_ID, Connection::new("two", 0, "mul", 0))),
            ],
        )
        .unwrap();
        let main = project.main();
        let into: Vec<&Connection> = main.incoming("mul", 0).collect();
        assert_eq!(into.len(), 1);
        assert_eq!(into[0].from, "two");
    }

    #[test]
    fn test_geometry_inputs_fan_in() {
        let mut project = project();
        run(
            &mut project,
            vec![
                Box::new(AddConnection::new(MAIN_MODULE_ID, Connection::new("a", 0, "sink", 0))),
                Box::new(AddConnection::new(MAIN_MODULE_ID, Connection::new("b", 0, "sink", 0))),
            ],
        )
        .unwrap();
        assert_eq!(project.main().incoming("sink", 0).count(), 2);
    }

    #[test]
    fn test_vetoed_connection_is_an_error_and_changes_nothing() {
        let mut project = project();
        let err = run(
            &mut project,
            vec![Box::new(AddConnection::new(
                MAIN_MODULE_ID,
                Connection::new("one", 0, "sink", 0),
            ))],
        )
        .unwrap_err();
        assert!(matches!(err, ScadGraphError::ConnectionVetoed { .. }));
        assert!(project.main().connections().is_empty());
    }

    #[test]
    fn test_literal_flag_follows_connection_state() {
        let mut project = project();
        let port = PortId::input(0);
        run(
            &mut project,
            vec![Box::new(AddConnection::new(
                MAIN_MODULE_ID,
                Connection::new("yes", 0, "if", 0),
            ))],
        )
        .unwrap();
        let filter = project.main().by_id("if").unwrap();
        assert!(!filter.core().literal(port).unwrap().is_set);

        run(
            &mut project,
            vec![Box::new(DeleteInputConnections::new(MAIN_MODULE_ID, "if", 0))],
        )
        .unwrap();
        let filter = project.main().by_id("if").unwrap();
        assert!(project.main().connections().is_empty());
        assert!(filter.core().literal(port).unwrap().is_set);
    }

    #[test]
    fn test_deleting_missing_connection_fails() {
        let mut project = project();
        let err = run(
            &mut project,
            vec![Box::new(DeleteConnection::new(
                MAIN_MODULE_ID,
                Connection::new("a", 0, "sink", 1),
            ))],
        )
        .unwrap_err();
        assert!(matches!(err, ScadGraphError::InvariantViolation(_)));
    }
}
