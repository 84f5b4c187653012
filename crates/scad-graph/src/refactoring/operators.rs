//! Switchable operator refactorings
//!
//! Operand types are inferred from whatever is connected: an input takes the
//! type of its source when the operator supports it, an unconnected input
//! mirrors the connected one, and two unconnected inputs fall back to `Any`.
//! The result type follows from the operator's result table. Connections
//! that no longer fit are removed and downstream operators re-inferred.
//! Sums settle on the one type all their values share.

use crate::error::{Result, ScadGraphError};
use crate::graph::{Connection, GraphId, ScadGraph};
use crate::node::{NodeId, ScadNode};
use crate::nodes::operators::{BinaryOperator, BinaryOperatorNode, Sum};
use crate::port::{PortId, PortType};

use super::connections::{AddConnection, DeleteConnection};
use super::nodes::{AddNode, DeleteNode};
use super::{Refactoring, RefactoringContext};

fn inferred_operands(graph: &ScadGraph, node: &BinaryOperatorNode) -> (PortType, PortType) {
    let id = node.id();
    let source = |operand: usize| {
        graph
            .incoming(id, operand)
            .next()
            .and_then(|c| graph.source_type(c))
            .map(|t| {
                if node.operator().supports(t) {
                    t
                } else {
                    PortType::Any
                }
            })
    };
    match (source(0), source(1)) {
        (Some(a), Some(b)) => (a, b),
        (Some(a), None) => (a, a),
        (None, Some(b)) => (b, b),
        (None, None) => (PortType::Any, PortType::Any),
    }
}

/// Targets of the node's outgoing connections
fn downstream(graph: &ScadGraph, node_id: &str) -> Vec<NodeId> {
    let mut targets: Vec<NodeId> = graph
        .connections()
        .iter()
        .filter(|c| c.from == node_id)
        .map(|c| c.to.clone())
        .collect();
    targets.dedup();
    targets
}

/// Apply operand types, fix the result type, drop misfits
fn retype(ctx: &mut RefactoringContext<'_>, graph_id: &str, node_id: &str, operands: (PortType, PortType)) -> Result<()> {
    let connections = ctx.graph(graph_id)?.connections_of(node_id);
    let changed = {
        let graph = ctx.graph_mut(graph_id)?;
        let node = graph.node_as_mut::<BinaryOperatorNode>(node_id)?;
        let before = node.result_type();
        node.switch_operand(0, operands.0)?;
        node.switch_operand(1, operands.1)?;
        let result = node.inferred_result_type();
        node.set_result_type(result)?;
        graph.sync_literal_flags(node_id)?;
        before != result
    };
    ctx.revalidate(graph_id, connections)?;
    if changed {
        let targets = downstream(ctx.graph(graph_id)?, node_id);
        ctx.schedule_operator_fixups(graph_id, targets)?;
    }
    Ok(())
}

/// Re-infer an operator's port types from its connections
#[derive(Debug, Clone)]
pub struct FixOperatorPortTypes {
    graph: GraphId,
    node: NodeId,
}

impl FixOperatorPortTypes {
    pub fn new(graph: &str, node: &str) -> Self {
        Self {
            graph: graph.to_string(),
            node: node.to_string(),
        }
    }
}

impl Refactoring for FixOperatorPortTypes {
    fn name(&self) -> String {
        format!("Fix operator types of {}", self.node)
    }

    fn is_late(&self) -> bool {
        true
    }

    fn late_key(&self) -> Option<String> {
        Some(format!("fix_operator:{}:{}", self.graph, self.node))
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        // the operator may have been deleted later in the batch
        let operands = {
            let Ok(graph) = ctx.graph(&self.graph) else {
                return Ok(());
            };
            let Some(node) = graph
                .find_node(&self.node)
                .and_then(|n| n.as_any().downcast_ref::<BinaryOperatorNode>())
            else {
                return Ok(());
            };
            inferred_operands(graph, node)
        };
        retype(ctx, &self.graph, &self.node, operands)
    }
}

/// Common type of the values feeding a sum
pub(crate) fn sum_type(sources: &[PortType]) -> PortType {
    let Some(&first) = sources.first() else {
        return PortType::Any;
    };
    if sources.iter().all(|&t| t == first) && Sum::supports(first) {
        return first;
    }
    let vectors = [PortType::Vector, PortType::Vector2, PortType::Vector3];
    if sources.iter().all(|t| vectors.contains(t)) {
        PortType::Vector
    } else {
        PortType::Any
    }
}

/// Re-infer a sum's type from its incoming values
#[derive(Debug, Clone)]
pub struct FixSumPortTypes {
    graph: GraphId,
    node: NodeId,
}

impl FixSumPortTypes {
    pub fn new(graph: &str, node: &str) -> Self {
        Self {
            graph: graph.to_string(),
            node: node.to_string(),
        }
    }
}

impl Refactoring for FixSumPortTypes {
    fn name(&self) -> String {
        format!("Fix sum types of {}", self.node)
    }

    fn is_late(&self) -> bool {
        true
    }

    fn late_key(&self) -> Option<String> {
        Some(format!("fix_sum:{}:{}", self.graph, self.node))
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        let target = {
            let Ok(graph) = ctx.graph(&self.graph) else {
                return Ok(());
            };
            let Some(sum) = graph
                .find_node(&self.node)
                .and_then(|n| n.as_any().downcast_ref::<Sum>())
            else {
                return Ok(());
            };
            let sources: Vec<PortType> = graph
                .incoming(&self.node, 0)
                .map(|c| graph.source_type(c).unwrap_or(PortType::Any))
                .collect();
            let target = sum_type(&sources);
            if target == sum.value_type() {
                return Ok(());
            }
            target
        };
        log::debug!("sum '{}' now carries {}", self.node, target);
        let outgoing: Vec<Connection> = ctx
            .graph(&self.graph)?
            .connections()
            .iter()
            .filter(|c| c.from == self.node)
            .cloned()
            .collect();
        ctx.graph_mut(&self.graph)?
            .node_as_mut::<Sum>(&self.node)?
            .switch_type(target)?;
        ctx.revalidate(&self.graph, outgoing)?;
        let targets = downstream(ctx.graph(&self.graph)?, &self.node);
        ctx.schedule_operator_fixups(&self.graph, targets)
    }
}

/// Drop the values of a sum that cannot take part in a sum of `port_type`
#[derive(Debug, Clone)]
pub struct DeleteUnassignableConnections {
    graph: GraphId,
    node: NodeId,
    port_type: PortType,
}

impl DeleteUnassignableConnections {
    pub fn new(graph: &str, node: &str, port_type: PortType) -> Self {
        Self {
            graph: graph.to_string(),
            node: node.to_string(),
            port_type,
        }
    }
}

impl Refactoring for DeleteUnassignableConnections {
    fn name(&self) -> String {
        format!("Drop values of {} that are not {}", self.node, self.port_type)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        let doomed: Vec<Connection> = {
            let graph = ctx.graph(&self.graph)?;
            graph
                .incoming(&self.node, 0)
                .filter(|c| {
                    !graph
                        .source_type(c)
                        .map(|t| t.is_assignable_to(self.port_type))
                        .unwrap_or(false)
                })
                .cloned()
                .collect()
        };
        for connection in doomed {
            ctx.perform(DeleteConnection::new(&self.graph, connection))?;
        }
        Ok(())
    }
}

/// Manually pick the type of one operand
#[derive(Debug, Clone)]
pub struct SwitchOperandType {
    graph: GraphId,
    node: NodeId,
    operand: usize,
    port_type: PortType,
}

impl SwitchOperandType {
    pub fn new(graph: &str, node: &str, operand: usize, port_type: PortType) -> Self {
        Self {
            graph: graph.to_string(),
            node: node.to_string(),
            operand,
            port_type,
        }
    }
}

impl Refactoring for SwitchOperandType {
    fn name(&self) -> String {
        format!("Switch operand {} of {} to {}", self.operand, self.node, self.port_type)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        let node = ctx.graph(&self.graph)?.node_as::<BinaryOperatorNode>(&self.node)?;
        let mut operands = (node.operand_type(0), node.operand_type(1));
        match self.operand {
            0 => operands.0 = self.port_type,
            1 => operands.1 = self.port_type,
            other => {
                return Err(ScadGraphError::invariant(format!(
                    "operators have no operand {}",
                    other
                )))
            }
        }
        retype(ctx, &self.graph, &self.node, operands)
    }
}

/// Replace an operator node by one of another operator, keeping what fits
#[derive(Debug, Clone)]
pub struct ChangeOperatorType {
    graph: GraphId,
    node: NodeId,
    operator: BinaryOperator,
    replacement_id: NodeId,
}

impl ChangeOperatorType {
    pub fn new(graph: &str, node: &str, operator: BinaryOperator) -> Self {
        Self {
            graph: graph.to_string(),
            node: node.to_string(),
            operator,
            replacement_id: crate::node::new_node_id(),
        }
    }

    /// Id the new operator node will have
    pub fn replacement_id(&self) -> &str {
        &self.replacement_id
    }
}

impl Refactoring for ChangeOperatorType {
    fn name(&self) -> String {
        format!("Change operator of {} to {}", self.node, self.operator.title())
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        let (replacement, connections) = {
            let graph = ctx.graph(&self.graph)?;
            let old = graph.node_as::<BinaryOperatorNode>(&self.node)?;
            let mut replacement = BinaryOperatorNode::new(self.operator);
            replacement.core_mut().set_id(self.replacement_id.clone());
            replacement.core_mut().position = old.position();
            for operand in 0..2 {
                let t = old.operand_type(operand);
                if self.operator.supports(t) {
                    replacement.switch_operand(operand, t)?;
                }
                let port = PortId::input(operand);
                let kept = match (old.core().literal(port), replacement.core().literal(port)) {
                    (Some(literal), Some(fresh)) if literal.kind() == fresh.kind() => {
                        Some(literal.clone())
                    }
                    _ => None,
                };
                if let Some(literal) = kept {
                    replacement.core_mut().replace_literal(port, literal);
                }
            }
            let result = replacement.inferred_result_type();
            replacement.set_result_type(result)?;
            (replacement, graph.connections_of(&self.node))
        };

        ctx.perform(AddNode::new(&self.graph, Box::new(replacement)))?;
        for connection in connections {
            let moved = Connection {
                from: if connection.from == self.node {
                    self.replacement_id.clone()
                } else {
                    connection.from.clone()
                },
                to: if connection.to == self.node {
                    self.replacement_id.clone()
                } else {
                    connection.to.clone()
                },
                ..connection
            };
            if ctx.can_connect(&self.graph, &moved)?.is_vetoed() {
                log::warn!("dropping {} while changing operator of {}", moved, self.node);
                continue;
            }
            ctx.perform(AddConnection::new(&self.graph, moved))?;
        }
        ctx.perform(DeleteNode::new(&self.graph, &self.node))?;
        ctx.perform(FixOperatorPortTypes::new(&self.graph, &self.replacement_id))
    }
}

/// Swap the two operands together with their connections
#[derive(Debug, Clone)]
pub struct FlipOperatorInputs {
    graph: GraphId,
    node: NodeId,
}

impl FlipOperatorInputs {
    pub fn new(graph: &str, node: &str) -> Self {
        Self {
            graph: graph.to_string(),
            node: node.to_string(),
        }
    }
}

impl Refactoring for FlipOperatorInputs {
    fn name(&self) -> String {
        format!("Flip inputs of {}", self.node)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        let graph = ctx.graph_mut(&self.graph)?;
        let old: Vec<Connection> = graph
            .connections()
            .iter()
            .filter(|c| c.to == self.node && c.to_port < 2)
            .cloned()
            .collect();
        let flipped = old
            .iter()
            .map(|c| Connection {
                to_port: 1 - c.to_port,
                ..c.clone()
            })
            .collect();
        graph.node_as_mut::<BinaryOperatorNode>(&self.node)?.swap_operands()?;
        graph.replace_connections(&old, flipped)?;
        graph.sync_literal_flags(&self.node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::builtins::BuiltIns;
    use crate::library::MAIN_MODULE_ID;
    use crate::literal::LiteralKind;
    use crate::nodes::constants::ConstantValue;
    use crate::project::ScadProject;
    use crate::refactoring::connections::DeleteConnection;
    use crate::rules::ConnectionRules;
    use std::sync::Arc;

    fn project() -> ScadProject {
        let mut project = ScadProject::new(Arc::new(BuiltIns::new()));
        let graph = GraphBuilder::main()
            .add(ConstantValue::number(2.0), "two", (0.0, 0.0))
            .add(ConstantValue::string("s"), "text", (0.0, 10.0))
            .add(ConstantValue::vector3([1.0, 2.0, 3.0]), "v", (0.0, 20.0))
            .add(BinaryOperatorNode::new(BinaryOperator::Add), "add", (100.0, 0.0))
            .add(BinaryOperatorNode::new(BinaryOperator::Multiply), "mul", (200.0, 0.0))
            .add(ConstantValue::number(3.0), "three", (0.0, 30.0))
            .add(Sum::new(), "sum", (300.0, 0.0))
            .build()
            .unwrap();
        project.set_main(graph);
        project
    }

    fn run(project: &mut ScadProject, batch: Vec<Box<dyn Refactoring>>) -> Result<Vec<String>> {
        let rules = ConnectionRules::standard();
        let mut ctx = RefactoringContext::new(project, &rules, 100);
        ctx.run(batch)?;
        Ok(ctx.performed().to_vec())
    }

    fn connect(from: &str, from_port: usize, to: &str, to_port: usize) -> Box<dyn Refactoring> {
        Box::new(AddConnection::new(
            MAIN_MODULE_ID,
            Connection::new(from, from_port, to, to_port),
        ))
    }

    fn operator<'a>(project: &'a ScadProject, id: &str) -> &'a BinaryOperatorNode {
        project.main().node_as::<BinaryOperatorNode>(id).unwrap()
    }

    #[test]
    fn test_connecting_a_number_retypes_both_operands() {
        let mut project = project();
        run(&mut project, vec![connect("two", 0, "add", 0)]).unwrap();
        let add = operator(&project, "add");
        assert_eq!(add.operand_type(0), PortType::Number);
        assert_eq!(add.operand_type(1), PortType::Number);
        assert_eq!(add.result_type(), PortType::Number);
        let b = add.core().literal(PortId::input(1)).unwrap();
        assert_eq!(b.kind(), LiteralKind::Number);
        assert!(b.is_set);
        assert!(!add.core().literal(PortId::input(0)).unwrap().is_set);
    }

    #[test]
    fn test_fixups_run_once_per_batch() {
        let mut project = project();
        let performed = run(
            &mut project,
            vec![connect("two", 0, "add", 0), connect("two", 0, "add", 1)],
        )
        .unwrap();
        let fixes = performed.iter().filter(|n| n.starts_with("Fix operator")).count();
        assert_eq!(fixes, 1);
    }

    #[test]
    fn test_result_change_cascades_downstream() {
        let mut project = project();
        run(
            &mut project,
            vec![connect("add", 0, "mul", 0), connect("two", 0, "add", 0)],
        )
        .unwrap();
        assert_eq!(operator(&project, "mul").operand_type(0), PortType::Number);

        // disconnecting the source returns both operators to Any
        run(
            &mut project,
            vec![Box::new(DeleteConnection::new(
                MAIN_MODULE_ID,
                Connection::new("two", 0, "add", 0),
            ))],
        )
        .unwrap();
        assert_eq!(operator(&project, "add").result_type(), PortType::Any);
        assert_eq!(operator(&project, "mul").operand_type(0), PortType::Any);
        assert_eq!(project.main().connections().len(), 1);
    }

    #[test]
    fn test_unsupported_source_is_vetoed() {
        let mut project = project();
        let err = run(&mut project, vec![connect("text", 0, "mul", 0)]);
        assert!(err.is_err());
    }

    #[test]
    fn test_change_operator_keeps_fitting_connections() {
        let mut project = project();
        run(
            &mut project,
            vec![connect("v", 0, "add", 0), connect("two", 0, "add", 1)],
        )
        .unwrap();
        let change = ChangeOperatorType::new(MAIN_MODULE_ID, "add", BinaryOperator::Less);
        let replacement = change.replacement_id().to_string();
        run(&mut project, vec![Box::new(change)]).unwrap();

        let main = project.main();
        assert!(!main.contains_node("add"));
        let less = operator(&project, &replacement);
        assert_eq!(less.operator(), BinaryOperator::Less);
        assert_eq!(less.result_type(), PortType::Boolean);
        // vectors cannot be compared
        let sources: Vec<&str> = main.connections().iter().map(|c| c.from.as_str()).collect();
        assert_eq!(sources, ["two"]);
    }

    #[test]
    fn test_flip_swaps_connections() {
        let mut project = project();
        run(
            &mut project,
            vec![connect("two", 0, "add", 0), connect("v", 0, "mul", 1)],
        )
        .unwrap();
        run(
            &mut project,
            vec![Box::new(FlipOperatorInputs::new(MAIN_MODULE_ID, "add"))],
        )
        .unwrap();
        let main = project.main();
        assert_eq!(main.incoming("add", 1).count(), 1);
        assert_eq!(main.incoming("add", 0).count(), 0);
        assert_eq!(operator(&project, "add").operand_type(1), PortType::Number);
    }

    #[test]
    fn test_switch_operand_type_manually() {
        let mut project = project();
        run(
            &mut project,
            vec![Box::new(SwitchOperandType::new(
                MAIN_MODULE_ID,
                "add",
                0,
                PortType::Vector3,
            ))],
        )
        .unwrap();
        assert_eq!(operator(&project, "add").operand_type(0), PortType::Vector3);
        let err = run(
            &mut project,
            vec![Box::new(SwitchOperandType::new(
                MAIN_MODULE_ID,
                "add",
                0,
                PortType::Geometry,
            ))],
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_sum_keeps_every_value_of_one_type() {
        let mut project = project();
        run(
            &mut project,
            vec![connect("two", 0, "sum", 0), connect("three", 0, "sum", 0)],
        )
        .unwrap();
        let main = project.main();
        assert_eq!(main.incoming("sum", 0).count(), 2);
        assert_eq!(main.node_as::<Sum>("sum").unwrap().value_type(), PortType::Number);

        // a vector pushes the numbers out
        let performed = run(&mut project, vec![connect("v", 0, "sum", 0)]).unwrap();
        assert!(performed.iter().any(|n| n.starts_with("Drop values")));
        let main = project.main();
        let sources: Vec<&str> = main.incoming("sum", 0).map(|c| c.from.as_str()).collect();
        assert_eq!(sources, ["v"]);
        assert_eq!(main.node_as::<Sum>("sum").unwrap().value_type(), PortType::Vector3);
    }

    #[test]
    fn test_sum_retype_reaches_downstream_operator() {
        let mut project = project();
        run(
            &mut project,
            vec![connect("sum", 0, "add", 0), connect("two", 0, "sum", 0)],
        )
        .unwrap();
        assert_eq!(operator(&project, "add").operand_type(0), PortType::Number);

        run(
            &mut project,
            vec![Box::new(DeleteConnection::new(
                MAIN_MODULE_ID,
                Connection::new("two", 0, "sum", 0),
            ))],
        )
        .unwrap();
        assert_eq!(project.main().node_as::<Sum>("sum").unwrap().value_type(), PortType::Any);
        assert_eq!(operator(&project, "add").operand_type(0), PortType::Any);
    }

    #[test]
    fn test_sum_rejects_strings() {
        let mut project = project();
        let err = run(&mut project, vec![connect("text", 0, "sum", 0)]).unwrap_err();
        assert!(matches!(err, ScadGraphError::ConnectionVetoed { .. }));
    }

    #[test]
    fn test_sum_type_of_mixed_vectors() {
        use PortType::*;
        assert_eq!(sum_type(&[]), Any);
        assert_eq!(sum_type(&[Vector2, Vector2]), Vector2);
        assert_eq!(sum_type(&[Vector2, Vector3]), Vector);
        assert_eq!(sum_type(&[Number, Any]), Any);
    }

}
