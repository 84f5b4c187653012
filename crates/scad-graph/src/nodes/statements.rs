//! Flow statements and variable access
//!
//! Statements on the Flow channel render their predecessor first: a node
//! whose "Before" input is connected emits the upstream statement text, a
//! newline, then its own line.

use crate::error::Result;
use crate::library::{VariableDescription, VariableId};
use crate::node::{NodeCore, ScadNode, VariableInputs, VariableReference};
use crate::persistence::SavedNode;
use crate::port::{PortDefinition, PortType};
use crate::project::{ExternalReference, ReferenceResolver};
use crate::render::RenderContext;

fn after(ctx: &RenderContext<'_>, node: &dyn ScadNode, line: String) -> Result<String> {
    match ctx.input(node, 0)? {
        Some(before) if !before.is_empty() => Ok(format!("{}\n{}", before, line)),
        _ => Ok(line),
    }
}

/// `echo(a, b);` with a growable argument list
#[derive(Debug, Clone)]
pub struct Echo {
    core: NodeCore,
    size: usize,
}

impl Default for Echo {
    fn default() -> Self {
        Self::new()
    }
}

impl Echo {
    pub fn new() -> Self {
        let mut node = Self {
            core: NodeCore::new(),
            size: 1,
        };
        node.build_ports();
        node
    }

    fn build_ports(&mut self) {
        let mut inputs = vec![PortDefinition::flow("Before")];
        inputs.extend((1..=self.size).map(|i| PortDefinition::plain(PortType::Any, format!("Value {}", i))));
        self.core.declare_ports(inputs, vec![PortDefinition::flow("After")]);
    }
}

impl ScadNode for Echo {
    crate::node_boilerplate!("echo");

    fn title(&self) -> String {
        "Echo".to_string()
    }

    fn render(&self, ctx: &RenderContext<'_>, _port: usize) -> Result<String> {
        let mut arguments = Vec::new();
        for port in 1..=self.size {
            if let Some(value) = ctx.input(self, port)? {
                arguments.push(value);
            }
        }
        after(ctx, self, format!("echo({});", arguments.join(", ")))
    }

    fn save_state(&self, record: &mut SavedNode) {
        record.set_int("size", self.size as i64);
    }

    fn restore_state(&mut self, record: &SavedNode, _resolver: &dyn ReferenceResolver) -> Result<()> {
        self.size = record.get_usize("size")?.max(1);
        self.build_ports();
        Ok(())
    }

    fn as_variable_inputs(&self) -> Option<&dyn VariableInputs> {
        Some(self)
    }

    fn as_variable_inputs_mut(&mut self) -> Option<&mut dyn VariableInputs> {
        Some(self)
    }
}

impl VariableInputs for Echo {
    fn input_size(&self) -> usize {
        self.size
    }

    fn first_variable_input(&self) -> usize {
        1
    }

    fn add_input(&mut self) -> Result<()> {
        self.size += 1;
        self.build_ports();
        Ok(())
    }

    fn remove_input(&mut self) -> Result<()> {
        if self.size <= self.minimum_input_size() {
            return Err(crate::error::ScadGraphError::invariant(
                "echo needs at least one argument slot",
            ));
        }
        self.size -= 1;
        self.build_ports();
        Ok(())
    }

    fn add_title(&self) -> String {
        "Add argument".to_string()
    }

    fn remove_title(&self) -> String {
        "Remove argument".to_string()
    }
}

/// `children(selection);` inside a module
#[derive(Debug, Clone)]
pub struct Children {
    core: NodeCore,
}

impl Default for Children {
    fn default() -> Self {
        Self::new()
    }
}

impl Children {
    pub fn new() -> Self {
        let mut core = NodeCore::new();
        core.declare_ports(
            vec![
                PortDefinition::flow("Before"),
                PortDefinition::plain(PortType::Array, "Selection"),
            ],
            vec![PortDefinition::flow("After")],
        );
        Self { core }
    }
}

impl ScadNode for Children {
    crate::node_boilerplate!("children");

    fn title(&self) -> String {
        "Children".to_string()
    }

    fn render(&self, ctx: &RenderContext<'_>, _port: usize) -> Result<String> {
        let selection = ctx.input_or(self, 1, "")?;
        after(ctx, self, format!("children({});", selection))
    }
}

/// `children(index);` for a single child
#[derive(Debug, Clone)]
pub struct Child {
    core: NodeCore,
}

impl Default for Child {
    fn default() -> Self {
        Self::new()
    }
}

impl Child {
    pub fn new() -> Self {
        let mut core = NodeCore::new();
        core.declare_ports(
            vec![
                PortDefinition::flow("Before"),
                PortDefinition::with_literal(PortType::Number, "Index"),
            ],
            vec![PortDefinition::flow("After")],
        );
        Self { core }
    }
}

impl ScadNode for Child {
    crate::node_boilerplate!("child");

    fn title(&self) -> String {
        "Child".to_string()
    }

    fn render(&self, ctx: &RenderContext<'_>, _port: usize) -> Result<String> {
        let index = ctx.input_or(self, 1, "0")?;
        after(ctx, self, format!("children({});", index))
    }
}

/// `use <file>` or `include <file>` placed in the statement flow
#[derive(Debug, Clone)]
pub struct ImportScadFile {
    core: NodeCore,
    path: String,
    title: String,
}

impl ImportScadFile {
    pub fn new(reference: &ExternalReference) -> Self {
        let mut node = Self::unbound();
        node.setup(reference);
        node
    }

    pub(crate) fn unbound() -> Self {
        let mut core = NodeCore::new();
        core.declare_ports(vec![PortDefinition::flow("Before")], vec![PortDefinition::flow("After")]);
        Self {
            core,
            path: String::new(),
            title: "use/include".to_string(),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn setup(&mut self, reference: &ExternalReference) {
        self.path = reference.path.clone();
        self.title = reference.render().replace(['<', '>'], "");
    }
}

impl ScadNode for ImportScadFile {
    crate::node_boilerplate!("import_scad_file");

    fn title(&self) -> String {
        self.title.clone()
    }

    fn render(&self, ctx: &RenderContext<'_>, _port: usize) -> Result<String> {
        let reference = ctx.resolver.require_external_reference(&self.path)?;
        after(ctx, self, reference.render())
    }

    fn save_state(&self, record: &mut SavedNode) {
        record.set_str("path", self.path.clone());
    }

    fn restore_state(&mut self, record: &SavedNode, resolver: &dyn ReferenceResolver) -> Result<()> {
        let reference = resolver.require_external_reference(record.get_str("path")?)?;
        self.setup(&reference);
        Ok(())
    }
}

/// `name = value;`
#[derive(Debug, Clone)]
pub struct SetVariable {
    core: NodeCore,
    variable_id: VariableId,
    title: String,
}

impl SetVariable {
    pub fn new(description: &VariableDescription) -> Result<Self> {
        let mut node = Self::unbound();
        node.variable_id = description.id.clone();
        node.setup_ports(description)?;
        Ok(node)
    }

    pub(crate) fn unbound() -> Self {
        Self {
            core: NodeCore::new(),
            variable_id: VariableId::new(),
            title: String::new(),
        }
    }
}

impl ScadNode for SetVariable {
    crate::node_boilerplate!("set_variable");

    fn title(&self) -> String {
        self.title.clone()
    }

    fn render(&self, ctx: &RenderContext<'_>, _port: usize) -> Result<String> {
        let description = ctx.variable(&self.variable_id)?;
        let value = ctx.input_or_undef(self, 1)?;
        after(ctx, self, format!("{} = {};", description.name, value))
    }

    fn save_state(&self, record: &mut SavedNode) {
        record.set_str("variable_id", self.variable_id.clone());
    }

    fn restore_state(&mut self, record: &SavedNode, resolver: &dyn ReferenceResolver) -> Result<()> {
        let description = resolver.require_variable(record.get_str("variable_id")?)?;
        self.variable_id = description.id.clone();
        self.setup_ports(&description)
    }

    fn as_variable_reference(&self) -> Option<&dyn VariableReference> {
        Some(self)
    }

    fn as_variable_reference_mut(&mut self) -> Option<&mut dyn VariableReference> {
        Some(self)
    }
}

impl VariableReference for SetVariable {
    fn variable_id(&self) -> &str {
        &self.variable_id
    }

    fn set_variable_id(&mut self, id: &str) {
        self.variable_id = id.to_string();
    }

    fn setup_ports(&mut self, description: &VariableDescription) -> Result<()> {
        self.title = format!("Set {}", description.name);
        self.core.set_ports(
            vec![
                PortDefinition::flow("Before"),
                PortDefinition::with_literal(description.type_hint, "Value"),
            ],
            vec![PortDefinition::flow("After")],
        )
    }
}

/// Reads a variable
#[derive(Debug, Clone)]
pub struct GetVariable {
    core: NodeCore,
    variable_id: VariableId,
    title: String,
}

impl GetVariable {
    pub fn new(description: &VariableDescription) -> Result<Self> {
        let mut node = Self::unbound();
        node.variable_id = description.id.clone();
        node.setup_ports(description)?;
        Ok(node)
    }

    pub(crate) fn unbound() -> Self {
        Self {
            core: NodeCore::new(),
            variable_id: VariableId::new(),
            title: String::new(),
        }
    }
}

impl ScadNode for GetVariable {
    crate::node_boilerplate!("get_variable");

    fn title(&self) -> String {
        self.title.clone()
    }

    fn render(&self, ctx: &RenderContext<'_>, _port: usize) -> Result<String> {
        Ok(ctx.variable(&self.variable_id)?.name.clone())
    }

    fn is_expression(&self) -> bool {
        true
    }

    fn save_state(&self, record: &mut SavedNode) {
        record.set_str("variable_id", self.variable_id.clone());
    }

    fn restore_state(&mut self, record: &SavedNode, resolver: &dyn ReferenceResolver) -> Result<()> {
        let description = resolver.require_variable(record.get_str("variable_id")?)?;
        self.variable_id = description.id.clone();
        self.setup_ports(&description)
    }

    fn as_variable_reference(&self) -> Option<&dyn VariableReference> {
        Some(self)
    }

    fn as_variable_reference_mut(&mut self) -> Option<&mut dyn VariableReference> {
        Some(self)
    }
}

impl VariableReference for GetVariable {
    fn variable_id(&self) -> &str {
        &self.variable_id
    }

    fn set_variable_id(&mut self, id: &str) {
        self.variable_id = id.to_string();
    }

    fn setup_ports(&mut self, description: &VariableDescription) -> Result<()> {
        self.title = description.name.clone();
        self.core.set_ports(
            Vec::new(),
            vec![PortDefinition::plain(description.type_hint, description.name.clone())],
        )
    }
}
