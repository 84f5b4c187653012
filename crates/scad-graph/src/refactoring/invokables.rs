//! Function and module refactorings
//!
//! Signature edits replace the description and then reshape every node that
//! refers to it: literals and connections move with their parameter,
//! connections on vanished ports are deleted, and the rest is re-validated
//! against the new port types.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{Result, ScadGraphError};
use crate::graph::Connection;
use crate::library::{InvokableDescription, InvokableId, ParameterDescription};
use crate::node::{new_node_id, InvokableReference};
use crate::persistence::{load_graph, save_graph, SavedValue};
use crate::port::{PortDirection, PortId, PortType};
use crate::project::{ScadProject, Usage};

use super::connections::DeleteConnection;
use super::nodes::DeleteNode;
use super::{Refactoring, RefactoringContext};

/// Current description of a user-defined function or module
fn editable(ctx: &RefactoringContext<'_>, id: &str) -> Result<InvokableDescription> {
    let description = ctx.project().graph(id)?.description();
    if description.is_main() {
        return Err(ScadGraphError::invariant("the main module has no signature"));
    }
    Ok((**description).clone())
}

fn check_parameter(description: &InvokableDescription, index: usize) -> Result<()> {
    if index >= description.parameters.len() {
        return Err(ScadGraphError::invariant(format!(
            "'{}' has no parameter {}",
            description.name, index
        )));
    }
    Ok(())
}

/// Every node referring to `id`, its own graph included
fn references_to(project: &ScadProject, id: &str) -> Vec<Usage> {
    let mut usages = Vec::new();
    for graph in project.graphs() {
        for node in graph.nodes() {
            let refers = node
                .as_invokable_reference()
                .map(|r| r.invokable_id() == id)
                .unwrap_or(false);
            if refers {
                usages.push(Usage {
                    graph_id: graph.id().to_string(),
                    node_id: node.id().to_string(),
                });
            }
        }
    }
    usages
}

/// Old port index to new port index for one side of a referencing node.
///
/// `moved[p]` is the new index of old parameter `p`, `None` if it is gone.
/// Ports that belong to no parameter and no children slot keep their index.
fn port_map(
    reference: &dyn InvokableReference,
    old: &InvokableDescription,
    new: &InvokableDescription,
    moved: &[Option<usize>],
    direction: PortDirection,
    count: usize,
) -> HashMap<usize, usize> {
    let parameter_port = |description: &InvokableDescription, parameter: usize| match direction {
        PortDirection::Input => reference.parameter_input_port(description, parameter),
        PortDirection::Output => reference.parameter_output_port(description, parameter),
    };
    let children_port = |description: &InvokableDescription| match direction {
        PortDirection::Input => reference.children_input_port(description),
        PortDirection::Output => reference.children_output_port(description),
    };

    let mut map = HashMap::new();
    let mut claimed = HashSet::new();
    for (parameter, target) in moved.iter().enumerate() {
        let Some(old_port) = parameter_port(old, parameter) else {
            continue;
        };
        claimed.insert(old_port);
        if let Some(new_port) = target.and_then(|t| parameter_port(new, t)) {
            map.insert(old_port, new_port);
        }
    }
    if let Some(old_port) = children_port(old) {
        claimed.insert(old_port);
        if let Some(new_port) = children_port(new) {
            map.insert(old_port, new_port);
        }
    }
    for index in (0..count).filter(|i| !claimed.contains(i)) {
        map.insert(index, index);
    }
    map
}

/// Swap in a new description and bring every referencing node in line
fn reshape_invokable(
    ctx: &mut RefactoringContext<'_>,
    description: InvokableDescription,
    moved: Vec<Option<usize>>,
) -> Result<()> {
    let old = ctx.project().graph(&description.id)?.description().clone();
    let new = Arc::new(description);
    ctx.project_mut().replace_description(new.clone())?;
    for usage in references_to(ctx.project(), &new.id) {
        reshape_reference(ctx, &usage, &old, &new, &moved)?;
    }
    Ok(())
}

fn reshape_reference(
    ctx: &mut RefactoringContext<'_>,
    usage: &Usage,
    old: &InvokableDescription,
    new: &InvokableDescription,
    moved: &[Option<usize>],
) -> Result<()> {
    let (graph_id, node_id) = (usage.graph_id.as_str(), usage.node_id.as_str());
    let (inputs, outputs) = {
        let node = ctx.graph(graph_id)?.by_id(node_id)?;
        let reference = node.as_invokable_reference().ok_or_else(|| {
            ScadGraphError::invariant(format!("node '{}' is not a reference", node_id))
        })?;
        (
            port_map(reference, old, new, moved, PortDirection::Input, node.input_count()),
            port_map(reference, old, new, moved, PortDirection::Output, node.output_count()),
        )
    };

    let (kept, dropped): (Vec<Connection>, Vec<Connection>) = ctx
        .graph(graph_id)?
        .connections_of(node_id)
        .into_iter()
        .partition(|c| {
            (c.to != node_id || inputs.contains_key(&c.to_port))
                && (c.from != node_id || outputs.contains_key(&c.from_port))
        });
    for connection in dropped {
        ctx.perform(DeleteConnection::new(graph_id, connection))?;
    }

    let remapped: Vec<Connection> = kept
        .iter()
        .map(|c| {
            let mut moved = c.clone();
            if let (true, Some(port)) = (c.to == node_id, inputs.get(&c.to_port)) {
                moved.to_port = *port;
            }
            if let (true, Some(port)) = (c.from == node_id, outputs.get(&c.from_port)) {
                moved.from_port = *port;
            }
            moved
        })
        .collect();

    {
        let graph = ctx.graph_mut(graph_id)?;
        for connection in &kept {
            graph.remove_connection(connection)?;
        }
        let node = graph.by_id_mut(node_id)?;
        node.core_mut()
            .remap_literals(PortDirection::Input, |i| inputs.get(&i).copied());
        node.core_mut()
            .remap_literals(PortDirection::Output, |i| outputs.get(&i).copied());
        node.as_invokable_reference_mut()
            .ok_or_else(|| ScadGraphError::invariant(format!("node '{}' is not a reference", node_id)))?
            .setup_ports(new)?;
        for connection in &remapped {
            graph.add_connection(connection.clone())?;
        }
        graph.sync_literal_flags(node_id)?;
    }

    let neighbours: Vec<String> = remapped
        .iter()
        .map(|c| if c.from == node_id { c.to.clone() } else { c.from.clone() })
        .collect();
    ctx.revalidate(graph_id, remapped)?;
    ctx.schedule_operator_fixups(graph_id, neighbours)
}

fn identity(description: &InvokableDescription) -> Vec<Option<usize>> {
    (0..description.parameters.len()).map(Some).collect()
}

/// Create a function or module with an empty body
#[derive(Debug, Clone)]
pub struct IntroduceInvokable {
    description: InvokableDescription,
}

impl IntroduceInvokable {
    pub fn new(description: InvokableDescription) -> Self {
        Self { description }
    }

    pub fn id(&self) -> &str {
        &self.description.id
    }
}

impl Refactoring for IntroduceInvokable {
    fn name(&self) -> String {
        format!("Introduce {}", self.description.name)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        if self.description.is_main() {
            return Err(ScadGraphError::invariant("there is only one main module"));
        }
        ctx.project_mut().add_invokable(self.description.clone())?;
        Ok(())
    }
}

/// Delete a function or module and every call to it
#[derive(Debug, Clone)]
pub struct DeleteInvokable {
    id: InvokableId,
}

impl DeleteInvokable {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

impl Refactoring for DeleteInvokable {
    fn name(&self) -> String {
        format!("Delete invokable {}", self.id)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        editable(ctx, &self.id)?;
        for usage in ctx.project().find_usages(&self.id) {
            ctx.perform(DeleteNode::new(&usage.graph_id, &usage.node_id))?;
        }
        ctx.project_mut().remove_invokable(&self.id)?;
        Ok(())
    }
}

/// Copy a function or module, body included, under a new name
#[derive(Debug, Clone)]
pub struct DuplicateInvokable {
    id: InvokableId,
    name: String,
    new_id: InvokableId,
}

impl DuplicateInvokable {
    pub fn new(id: &str, name: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            name: name.into(),
            new_id: crate::library::new_id(),
        }
    }

    /// Id of the copy
    pub fn new_id(&self) -> &str {
        &self.new_id
    }
}

impl Refactoring for DuplicateInvokable {
    fn name(&self) -> String {
        format!("Duplicate {} as {}", self.id, self.name)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        let mut description = editable(ctx, &self.id)?;
        description.id = self.new_id.clone();
        description.name = self.name.clone();
        description.node_name = String::new();

        let mut saved = save_graph(ctx.project().graph(&self.id)?);
        saved.description = description;

        let fresh: HashMap<String, String> = saved
            .nodes
            .iter()
            .map(|n| (n.id.clone(), new_node_id()))
            .collect();
        let renamed = |id: &str| {
            fresh.get(id).cloned().ok_or_else(|| {
                ScadGraphError::invariant(format!("connection to unknown node '{}'", id))
            })
        };
        for record in &mut saved.nodes {
            record.id = renamed(&record.id)?;
            if let Some(SavedValue::String(other)) = record.data.get_mut("other_node_id") {
                if let Some(id) = fresh.get(other.as_str()) {
                    *other = id.clone();
                }
            }
            if let Some(SavedValue::String(target)) = record.data.get_mut("invokable_id") {
                if *target == self.id {
                    *target = self.new_id.clone();
                }
            }
        }
        for connection in &mut saved.connections {
            connection.from = renamed(&connection.from)?;
            connection.to = renamed(&connection.to)?;
        }

        let graph = load_graph(&saved, ctx.project())?;
        ctx.project_mut().insert_graph(graph)
    }
}

/// Give a function or module a new name
#[derive(Debug, Clone)]
pub struct RenameInvokable {
    id: InvokableId,
    name: String,
}

impl RenameInvokable {
    pub fn new(id: &str, name: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            name: name.into(),
        }
    }
}

impl Refactoring for RenameInvokable {
    fn name(&self) -> String {
        format!("Rename {} to {}", self.id, self.name)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        let mut description = editable(ctx, &self.id)?;
        description.name = self.name.clone();
        let moved = identity(&description);
        reshape_invokable(ctx, description, moved)
    }
}

/// Insert a parameter, at the end unless an index is given
#[derive(Debug, Clone)]
pub struct AddInvokableParameter {
    id: InvokableId,
    parameter: ParameterDescription,
    index: Option<usize>,
}

impl AddInvokableParameter {
    pub fn new(id: &str, parameter: ParameterDescription) -> Self {
        Self {
            id: id.to_string(),
            parameter,
            index: None,
        }
    }

    pub fn at(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }
}

impl Refactoring for AddInvokableParameter {
    fn name(&self) -> String {
        format!("Add parameter {} to {}", self.parameter.name, self.id)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        let mut description = editable(ctx, &self.id)?;
        let count = description.parameters.len();
        let index = self.index.unwrap_or(count);
        if index > count {
            return Err(ScadGraphError::invariant(format!(
                "cannot insert parameter at {} of {}",
                index, count
            )));
        }
        if description.parameter_index(&self.parameter.name).is_some() {
            return Err(ScadGraphError::invariant(format!(
                "'{}' already has a parameter '{}'",
                description.name, self.parameter.name
            )));
        }
        description.parameters.insert(index, self.parameter.clone());
        let moved = (0..count)
            .map(|p| Some(if p < index { p } else { p + 1 }))
            .collect();
        reshape_invokable(ctx, description, moved)
    }
}

/// Remove one parameter and whatever was connected to it
#[derive(Debug, Clone)]
pub struct DeleteInvokableParameter {
    id: InvokableId,
    index: usize,
}

impl DeleteInvokableParameter {
    pub fn new(id: &str, index: usize) -> Self {
        Self {
            id: id.to_string(),
            index,
        }
    }
}

impl Refactoring for DeleteInvokableParameter {
    fn name(&self) -> String {
        format!("Delete parameter {} of {}", self.index, self.id)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        let mut description = editable(ctx, &self.id)?;
        check_parameter(&description, self.index)?;
        let count = description.parameters.len();
        description.parameters.remove(self.index);
        let moved = (0..count)
            .map(|p| match p.cmp(&self.index) {
                std::cmp::Ordering::Less => Some(p),
                std::cmp::Ordering::Equal => None,
                std::cmp::Ordering::Greater => Some(p - 1),
            })
            .collect();
        reshape_invokable(ctx, description, moved)
    }
}

/// Move a parameter to another position
#[derive(Debug, Clone)]
pub struct ChangeParameterOrder {
    id: InvokableId,
    from: usize,
    to: usize,
}

impl ChangeParameterOrder {
    pub fn new(id: &str, from: usize, to: usize) -> Self {
        Self {
            id: id.to_string(),
            from,
            to,
        }
    }
}

impl Refactoring for ChangeParameterOrder {
    fn name(&self) -> String {
        format!("Move parameter {} of {} to {}", self.from, self.id, self.to)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        let mut description = editable(ctx, &self.id)?;
        check_parameter(&description, self.from)?;
        check_parameter(&description, self.to)?;
        let count = description.parameters.len();

        // order[new] = old
        let mut order: Vec<usize> = (0..count).collect();
        let moving = order.remove(self.from);
        order.insert(self.to, moving);

        let parameter = description.parameters.remove(self.from);
        description.parameters.insert(self.to, parameter);

        let mut moved = vec![None; count];
        for (new, old) in order.into_iter().enumerate() {
            moved[old] = Some(new);
        }
        reshape_invokable(ctx, description, moved)
    }
}

/// Rename one parameter
#[derive(Debug, Clone)]
pub struct RenameInvokableParameter {
    id: InvokableId,
    index: usize,
    name: String,
}

impl RenameInvokableParameter {
    pub fn new(id: &str, index: usize, name: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            index,
            name: name.into(),
        }
    }
}

impl Refactoring for RenameInvokableParameter {
    fn name(&self) -> String {
        format!("Rename parameter {} of {} to {}", self.index, self.id, self.name)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        let mut description = editable(ctx, &self.id)?;
        check_parameter(&description, self.index)?;
        if let Some(existing) = description.parameter_index(&self.name) {
            if existing != self.index {
                return Err(ScadGraphError::invariant(format!(
                    "'{}' already has a parameter '{}'",
                    description.name, self.name
                )));
            }
        }
        description.parameters[self.index].name = self.name.clone();
        let moved = identity(&description);
        reshape_invokable(ctx, description, moved)
    }
}

/// Change a parameter's type hint; connections that no longer fit go away
#[derive(Debug, Clone)]
pub struct ChangeInvokableParameterType {
    id: InvokableId,
    index: usize,
    type_hint: PortType,
}

impl ChangeInvokableParameterType {
    pub fn new(id: &str, index: usize, type_hint: PortType) -> Self {
        Self {
            id: id.to_string(),
            index,
            type_hint,
        }
    }
}

impl Refactoring for ChangeInvokableParameterType {
    fn name(&self) -> String {
        format!("Change type of parameter {} of {} to {}", self.index, self.id, self.type_hint)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        let mut description = editable(ctx, &self.id)?;
        check_parameter(&description, self.index)?;
        if !self.type_hint.is_expression_type() {
            return Err(ScadGraphError::invariant(format!(
                "parameters cannot be of type {}",
                self.type_hint
            )));
        }
        description.parameters[self.index].type_hint = self.type_hint;
        let moved = identity(&description);
        reshape_invokable(ctx, description, moved)
    }
}

/// Make a parameter optional or mandatory.
///
/// Calls keep the value they had: a parameter turning optional leaves the
/// literal of every unconnected call switched on.
#[derive(Debug, Clone)]
pub struct ChangeInvokableParameterOptionalState {
    id: InvokableId,
    index: usize,
    optional: bool,
}

impl ChangeInvokableParameterOptionalState {
    pub fn new(id: &str, index: usize, optional: bool) -> Self {
        Self {
            id: id.to_string(),
            index,
            optional,
        }
    }
}

impl Refactoring for ChangeInvokableParameterOptionalState {
    fn name(&self) -> String {
        let state = if self.optional { "optional" } else { "mandatory" };
        format!("Make parameter {} of {} {}", self.index, self.id, state)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        let mut description = editable(ctx, &self.id)?;
        check_parameter(&description, self.index)?;
        if description.parameters[self.index].optional == self.optional {
            return Ok(());
        }
        description.parameters[self.index].optional = self.optional;
        let moved = identity(&description);
        reshape_invokable(ctx, description, moved)?;

        let new = ctx.project().graph(&self.id)?.description().clone();
        for usage in references_to(ctx.project(), &self.id) {
            let graph = ctx.graph_mut(&usage.graph_id)?;
            let port = {
                let node = graph.by_id(&usage.node_id)?;
                node.as_invokable_reference()
                    .and_then(|r| r.parameter_input_port(&new, self.index))
            };
            let Some(port) = port else {
                continue;
            };
            let port = PortId::input(port);
            let connected = graph.is_port_connected(&usage.node_id, port);
            if let Some(literal) = graph.by_id_mut(&usage.node_id)?.core_mut().literal_mut(port) {
                literal.is_set = !connected;
            }
        }
        Ok(())
    }
}

/// Change what a function returns
#[derive(Debug, Clone)]
pub struct ChangeFunctionReturnType {
    id: InvokableId,
    return_type: PortType,
}

impl ChangeFunctionReturnType {
    pub fn new(id: &str, return_type: PortType) -> Self {
        Self {
            id: id.to_string(),
            return_type,
        }
    }
}

impl Refactoring for ChangeFunctionReturnType {
    fn name(&self) -> String {
        format!("Change return type of {} to {}", self.id, self.return_type)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        let description = editable(ctx, &self.id)?;
        if !description.is_function() {
            return Err(ScadGraphError::invariant(format!(
                "'{}' is not a function",
                description.name
            )));
        }
        if !self.return_type.is_expression_type() {
            return Err(ScadGraphError::invariant(format!(
                "functions cannot return {}",
                self.return_type
            )));
        }
        let description = description.returning(self.return_type);
        let moved = identity(&description);
        reshape_invokable(ctx, description, moved)
    }
}
