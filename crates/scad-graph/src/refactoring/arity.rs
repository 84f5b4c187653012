//! Variable-arity and scope mode refactorings
//!
//! Both input arity edits accept either half of a scope; the start owns the
//! slots. Output arity edits apply to the node itself.

use crate::error::{Result, ScadGraphError};
use crate::graph::{GraphId, ScadGraph};
use crate::node::{NodeId, VariableOutputs};
use crate::nodes::scopes::ScopeEnd;
use crate::port::PortId;

use super::connections::DeleteConnection;
use super::{Refactoring, RefactoringContext};

/// Id of the node that owns the variable slots for `node_id`
fn slot_owner(graph: &ScadGraph, node_id: &str) -> Result<NodeId> {
    let node = graph.by_id(node_id)?;
    if node.as_variable_inputs().is_some() {
        return Ok(node_id.to_string());
    }
    if let Some(bound) = node.as_bound() {
        let partner = graph.by_id(bound.other_node_id())?;
        if partner.as_variable_inputs().is_some() {
            return Ok(partner.id().to_string());
        }
    }
    Err(ScadGraphError::invariant(format!(
        "node '{}' has no variable inputs",
        node_id
    )))
}

/// Append one variable slot
#[derive(Debug, Clone)]
pub struct AddVariableInput {
    graph: GraphId,
    node: NodeId,
}

impl AddVariableInput {
    pub fn new(graph: &str, node: &str) -> Self {
        Self {
            graph: graph.to_string(),
            node: node.to_string(),
        }
    }
}

impl Refactoring for AddVariableInput {
    fn name(&self) -> String {
        format!("Add input to {}", self.node)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        let graph = ctx.graph_mut(&self.graph)?;
        let owner = slot_owner(graph, &self.node)?;
        graph
            .by_id_mut(&owner)?
            .as_variable_inputs_mut()
            .ok_or_else(|| ScadGraphError::invariant(format!("node '{}' lost its inputs", owner)))?
            .add_input()
    }
}

/// Drop the last variable slot and whatever is connected to it
#[derive(Debug, Clone)]
pub struct RemoveVariableInput {
    graph: GraphId,
    node: NodeId,
}

impl RemoveVariableInput {
    pub fn new(graph: &str, node: &str) -> Self {
        Self {
            graph: graph.to_string(),
            node: node.to_string(),
        }
    }
}

impl Refactoring for RemoveVariableInput {
    fn name(&self) -> String {
        format!("Remove input from {}", self.node)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        let (owner, doomed) = {
            let graph = ctx.graph(&self.graph)?;
            let owner = slot_owner(graph, &self.node)?;
            let slots = graph
                .by_id(&owner)?
                .as_variable_inputs()
                .ok_or_else(|| ScadGraphError::invariant(format!("node '{}' lost its inputs", owner)))?;
            let size = slots.input_size();
            if size <= slots.minimum_input_size() {
                return Err(ScadGraphError::invariant(format!(
                    "node '{}' already has the minimum number of inputs",
                    owner
                )));
            }
            let last = size - 1;
            let mut doomed = graph.connections_at(&owner, PortId::input(slots.first_variable_input() + last));
            if let Some(first_output) = slots.first_variable_output() {
                doomed.extend(graph.connections_at(&owner, PortId::output(first_output + last)));
            }
            (owner, doomed)
        };
        for connection in doomed {
            ctx.perform(DeleteConnection::new(&self.graph, connection))?;
        }
        ctx.graph_mut(&self.graph)?
            .by_id_mut(&owner)?
            .as_variable_inputs_mut()
            .ok_or_else(|| ScadGraphError::invariant(format!("node '{}' lost its inputs", owner)))?
            .remove_input()
    }
}

fn output_slots<'a>(graph: &'a ScadGraph, node_id: &str) -> Result<&'a dyn VariableOutputs> {
    graph.by_id(node_id)?.as_variable_outputs().ok_or_else(|| {
        ScadGraphError::invariant(format!("node '{}' has no variable outputs", node_id))
    })
}

/// Append one variable output
#[derive(Debug, Clone)]
pub struct AddVariableOutput {
    graph: GraphId,
    node: NodeId,
}

impl AddVariableOutput {
    pub fn new(graph: &str, node: &str) -> Self {
        Self {
            graph: graph.to_string(),
            node: node.to_string(),
        }
    }
}

impl Refactoring for AddVariableOutput {
    fn name(&self) -> String {
        format!("Add output to {}", self.node)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        ctx.graph_mut(&self.graph)?
            .by_id_mut(&self.node)?
            .as_variable_outputs_mut()
            .ok_or_else(|| {
                ScadGraphError::invariant(format!("node '{}' has no variable outputs", self.node))
            })?
            .add_output()
    }
}

/// Drop the last variable output and whatever it feeds
#[derive(Debug, Clone)]
pub struct RemoveVariableOutput {
    graph: GraphId,
    node: NodeId,
}

impl RemoveVariableOutput {
    pub fn new(graph: &str, node: &str) -> Self {
        Self {
            graph: graph.to_string(),
            node: node.to_string(),
        }
    }
}

impl Refactoring for RemoveVariableOutput {
    fn name(&self) -> String {
        format!("Remove output from {}", self.node)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        let doomed = {
            let graph = ctx.graph(&self.graph)?;
            let slots = output_slots(graph, &self.node)?;
            let size = slots.output_size();
            if size <= slots.minimum_output_size() {
                return Err(ScadGraphError::invariant(format!(
                    "node '{}' already has the minimum number of outputs",
                    self.node
                )));
            }
            let last = size - 1;
            let mut doomed = graph.connections_at(&self.node, PortId::output(slots.first_variable_output() + last));
            if let Some(first_input) = slots.first_variable_input() {
                doomed.extend(graph.connections_at(&self.node, PortId::input(first_input + last)));
            }
            doomed
        };
        for connection in doomed {
            ctx.perform(DeleteConnection::new(&self.graph, connection))?;
        }
        ctx.graph_mut(&self.graph)?
            .by_id_mut(&self.node)?
            .as_variable_outputs_mut()
            .ok_or_else(|| {
                ScadGraphError::invariant(format!("node '{}' lost its outputs", self.node))
            })?
            .remove_output()
    }
}

/// Switch a for-loop between `for` and `intersection_for`
#[derive(Debug, Clone)]
pub struct ToggleIntersectMode {
    graph: GraphId,
    node: NodeId,
}

impl ToggleIntersectMode {
    pub fn new(graph: &str, node: &str) -> Self {
        Self {
            graph: graph.to_string(),
            node: node.to_string(),
        }
    }
}

impl Refactoring for ToggleIntersectMode {
    fn name(&self) -> String {
        format!("Toggle intersect mode of {}", self.node)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        let graph = ctx.graph_mut(&self.graph)?;
        let end_id = {
            let node = graph.by_id(&self.node)?;
            match node.as_bound() {
                Some(bound) if bound.is_start() => bound.other_node_id().to_string(),
                Some(_) => self.node.clone(),
                None => {
                    return Err(ScadGraphError::invariant(format!(
                        "node '{}' is not a loop",
                        self.node
                    )))
                }
            }
        };
        let end = graph.node_as_mut::<ScopeEnd>(&end_id)?;
        let intersect = !end.is_intersect();
        end.set_intersect(intersect)
    }
}
