//! Top-level variable refactorings

use std::sync::Arc;

use crate::error::{Result, ScadGraphError};
use crate::library::{VariableDescription, VariableId};
use crate::literal::Literal;
use crate::port::PortType;

use super::nodes::DeleteNode;
use super::{Refactoring, RefactoringContext};

fn current(ctx: &RefactoringContext<'_>, id: &str) -> Result<VariableDescription> {
    ctx.project()
        .variables()
        .find(|v| v.id == id)
        .map(|v| (**v).clone())
        .ok_or_else(|| ScadGraphError::UnresolvedReference {
            kind: "variable",
            id: id.to_string(),
        })
}

#[derive(Debug, Clone)]
pub struct IntroduceVariable {
    description: VariableDescription,
}

impl IntroduceVariable {
    pub fn new(description: VariableDescription) -> Self {
        Self { description }
    }

    pub fn id(&self) -> &str {
        &self.description.id
    }
}

impl Refactoring for IntroduceVariable {
    fn name(&self) -> String {
        format!("Introduce variable {}", self.description.name)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        ctx.project_mut().add_variable(self.description.clone())?;
        Ok(())
    }
}

/// Delete a variable along with every node reading or writing it
#[derive(Debug, Clone)]
pub struct DeleteVariable {
    id: VariableId,
}

impl DeleteVariable {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

impl Refactoring for DeleteVariable {
    fn name(&self) -> String {
        format!("Delete variable {}", self.id)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        current(ctx, &self.id)?;
        for usage in ctx.project().find_usages(&self.id) {
            ctx.perform(DeleteNode::new(&usage.graph_id, &usage.node_id))?;
        }
        ctx.project_mut().remove_variable(&self.id)?;
        Ok(())
    }
}

/// Copy a variable under a new name; usages keep pointing at the original
#[derive(Debug, Clone)]
pub struct DuplicateVariable {
    id: VariableId,
    name: String,
    new_id: VariableId,
}

impl DuplicateVariable {
    pub fn new(id: &str, name: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            name: name.into(),
            new_id: crate::library::new_id(),
        }
    }

    pub fn new_id(&self) -> &str {
        &self.new_id
    }
}

impl Refactoring for DuplicateVariable {
    fn name(&self) -> String {
        format!("Duplicate variable {} as {}", self.id, self.name)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        let mut description = current(ctx, &self.id)?;
        description.id = self.new_id.clone();
        description.name = self.name.clone();
        description.is_external = false;
        ctx.project_mut().add_variable(description)?;
        Ok(())
    }
}

/// Rename a variable and retitle the nodes that use it
#[derive(Debug, Clone)]
pub struct RenameVariable {
    id: VariableId,
    name: String,
}

impl RenameVariable {
    pub fn new(id: &str, name: impl Into<String>) -> Self {
        Self {
            id: id.to_string(),
            name: name.into(),
        }
    }
}

impl Refactoring for RenameVariable {
    fn name(&self) -> String {
        format!("Rename variable {} to {}", self.id, self.name)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        let mut description = current(ctx, &self.id)?;
        if description.is_external {
            return Err(ScadGraphError::invariant(format!(
                "variable '{}' comes from an external file",
                description.name
            )));
        }
        description.name = self.name.clone();
        let description = Arc::new(description);
        ctx.project_mut().replace_variable(description.clone())?;

        // port names and types stay, only titles change
        for usage in ctx.project().find_usages(&self.id) {
            ctx.graph_mut(&usage.graph_id)?
                .by_id_mut(&usage.node_id)?
                .as_variable_reference_mut()
                .ok_or_else(|| {
                    ScadGraphError::invariant(format!("node '{}' is not a variable reference", usage.node_id))
                })?
                .setup_ports(&description)?;
        }
        Ok(())
    }
}

fn locally_editable(ctx: &RefactoringContext<'_>, id: &str) -> Result<VariableDescription> {
    let description = current(ctx, id)?;
    if description.is_external {
        return Err(ScadGraphError::invariant(format!(
            "variable '{}' comes from an external file",
            description.name
        )));
    }
    Ok(description)
}

/// Retype a variable; usages are rebuilt and connections that no longer fit go away
#[derive(Debug, Clone)]
pub struct ChangeVariableType {
    id: VariableId,
    type_hint: PortType,
}

impl ChangeVariableType {
    pub fn new(id: &str, type_hint: PortType) -> Self {
        Self {
            id: id.to_string(),
            type_hint,
        }
    }
}

impl Refactoring for ChangeVariableType {
    fn name(&self) -> String {
        format!("Change type of variable {} to {}", self.id, self.type_hint)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        let mut description = locally_editable(ctx, &self.id)?;
        if description.type_hint == self.type_hint {
            return Ok(());
        }
        if !self.type_hint.is_expression_type() {
            return Err(ScadGraphError::invariant(format!(
                "variables cannot be of type {}",
                self.type_hint
            )));
        }
        description.type_hint = self.type_hint;
        let fits = |l: &Literal| l.kind() == self.type_hint.literal_kind();
        if !description.default_value.as_ref().map(fits).unwrap_or(true) {
            log::debug!("dropping default of '{}' with its old type", description.name);
            description.default_value = None;
        }
        let description = Arc::new(description);
        ctx.project_mut().replace_variable(description.clone())?;

        // retype every usage before judging connections between them
        let mut touched = Vec::new();
        for usage in ctx.project().find_usages(&self.id) {
            let (graph_id, node_id) = (usage.graph_id.as_str(), usage.node_id.as_str());
            let graph = ctx.graph_mut(graph_id)?;
            graph
                .by_id_mut(node_id)?
                .as_variable_reference_mut()
                .ok_or_else(|| {
                    ScadGraphError::invariant(format!("node '{}' is not a variable reference", node_id))
                })?
                .setup_ports(&description)?;
            graph.sync_literal_flags(node_id)?;
            touched.push(usage);
        }
        for usage in touched {
            let node_id = usage.node_id.as_str();
            let connections = ctx.graph(&usage.graph_id)?.connections_of(node_id);
            let neighbours: Vec<String> = connections
                .iter()
                .map(|c| if c.from == node_id { c.to.clone() } else { c.from.clone() })
                .collect();
            ctx.revalidate(&usage.graph_id, connections)?;
            ctx.schedule_operator_fixups(&usage.graph_id, neighbours)?;
        }
        Ok(())
    }
}

/// Set or clear the value a variable is declared with
#[derive(Debug, Clone)]
pub struct ChangeVariableDefaultValue {
    id: VariableId,
    value: Option<Literal>,
}

impl ChangeVariableDefaultValue {
    pub fn new(id: &str, value: Option<Literal>) -> Self {
        Self {
            id: id.to_string(),
            value,
        }
    }
}

impl Refactoring for ChangeVariableDefaultValue {
    fn name(&self) -> String {
        format!("Change default value of variable {}", self.id)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        let mut description = locally_editable(ctx, &self.id)?;
        if let Some(value) = &self.value {
            if value.kind() != description.type_hint.literal_kind() {
                return Err(ScadGraphError::invariant(format!(
                    "a {:?} literal cannot be the default of {} variable '{}'",
                    value.kind(),
                    description.type_hint,
                    description.name
                )));
            }
        }
        description.default_value = self.value.clone();
        ctx.project_mut().replace_variable(Arc::new(description))
    }
}
