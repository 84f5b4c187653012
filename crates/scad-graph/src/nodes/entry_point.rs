//! Entry and return nodes of function and module graphs
//!
//! Every module graph holds one [`ModuleEntryPoint`]; every function graph
//! holds a [`FunctionEntryPoint`] and a [`FunctionReturn`]. They are created
//! with the graph and cannot be deleted on their own.

use crate::error::{Result, ScadGraphError};
use crate::library::{InvokableDescription, InvokableId};
use crate::node::{EntryPoint, InvokableReference, NodeCore, ScadNode};
use crate::persistence::SavedNode;
use crate::port::{PortDefinition, PortId};
use crate::project::ReferenceResolver;
use crate::render::RenderContext;

fn parameter_outputs(description: &InvokableDescription) -> Vec<PortDefinition> {
    description
        .parameters
        .iter()
        .map(|p| PortDefinition::with_literal(p.type_hint, p.display_name()).manual_literal())
        .collect()
}

/// `a, b = 1`; a parameter has a default when its output literal is set
fn signature(node: &dyn ScadNode, description: &InvokableDescription) -> String {
    description
        .parameters
        .iter()
        .enumerate()
        .map(|(i, parameter)| {
            match node.core().literal(PortId::output(i)).filter(|l| l.is_set) {
                Some(default) => format!("{} = {}", parameter.name, default.render()),
                None => parameter.name.clone(),
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn doc_comment(description: &InvokableDescription) -> String {
    description
        .description
        .lines()
        .map(|line| format!("// {}\n", line))
        .collect()
}

fn parameter_name(ctx: &RenderContext<'_>, node: &dyn ScadNode, port: usize) -> Result<String> {
    ctx.graph
        .description()
        .parameters
        .get(port)
        .map(|p| p.name.clone())
        .ok_or_else(|| {
            ScadGraphError::invariant(format!("entry point '{}' has no parameter {}", node.id(), port))
        })
}

fn own_description(
    record: &SavedNode,
    resolver: &dyn ReferenceResolver,
) -> Result<std::sync::Arc<InvokableDescription>> {
    resolver.require_invokable(record.get_str("invokable_id")?)
}

/// Parameters of a module, plus `children()` when the module takes children
#[derive(Debug, Clone)]
pub struct ModuleEntryPoint {
    core: NodeCore,
    invokable_id: InvokableId,
}

impl ModuleEntryPoint {
    pub fn new(description: &InvokableDescription) -> Result<Self> {
        if !description.is_module() {
            return Err(ScadGraphError::invariant(format!(
                "'{}' is not a module",
                description.name
            )));
        }
        let mut node = Self::unbound();
        node.invokable_id = description.id.clone();
        node.setup_ports(description)?;
        Ok(node)
    }

    pub(crate) fn unbound() -> Self {
        Self {
            core: NodeCore::new(),
            invokable_id: InvokableId::new(),
        }
    }
}

impl ScadNode for ModuleEntryPoint {
    crate::node_boilerplate!("module_entry_point");

    fn title(&self) -> String {
        "Module parameters".to_string()
    }

    fn render(&self, ctx: &RenderContext<'_>, port: usize) -> Result<String> {
        let description = ctx.graph.description();
        if self.children_output_port(description) == Some(port) {
            return Ok("children();".to_string());
        }
        parameter_name(ctx, self, port)
    }

    fn can_be_deleted(&self) -> bool {
        false
    }

    fn save_state(&self, record: &mut SavedNode) {
        record.set_str("invokable_id", self.invokable_id.clone());
    }

    fn restore_state(&mut self, record: &SavedNode, resolver: &dyn ReferenceResolver) -> Result<()> {
        let description = own_description(record, resolver)?;
        self.invokable_id = description.id.clone();
        self.setup_ports(&description)
    }

    fn as_invokable_reference(&self) -> Option<&dyn InvokableReference> {
        Some(self)
    }

    fn as_invokable_reference_mut(&mut self) -> Option<&mut dyn InvokableReference> {
        Some(self)
    }

    fn as_entry_point(&self) -> Option<&dyn EntryPoint> {
        Some(self)
    }
}

impl InvokableReference for ModuleEntryPoint {
    fn invokable_id(&self) -> &str {
        &self.invokable_id
    }

    fn set_invokable_id(&mut self, id: &str) {
        self.invokable_id = id.to_string();
    }

    fn setup_ports(&mut self, description: &InvokableDescription) -> Result<()> {
        let mut outputs = parameter_outputs(description);
        if description.supports_children() {
            outputs.push(PortDefinition::geometry("Children"));
        }
        self.core.set_ports(Vec::new(), outputs)
    }

    fn parameter_output_port(&self, description: &InvokableDescription, parameter: usize) -> Option<usize> {
        (parameter < description.parameters.len()).then_some(parameter)
    }

    fn children_output_port(&self, description: &InvokableDescription) -> Option<usize> {
        description
            .supports_children()
            .then_some(description.parameters.len())
    }
}

impl EntryPoint for ModuleEntryPoint {
    fn render_entry_point(&self, ctx: &RenderContext<'_>, content: &str) -> Result<String> {
        let description = ctx.graph.description();
        Ok(format!(
            "{}module {}({}){}",
            doc_comment(description),
            description.name,
            signature(self, description),
            ctx.block(content)
        ))
    }
}

/// Parameters of a function
#[derive(Debug, Clone)]
pub struct FunctionEntryPoint {
    core: NodeCore,
    invokable_id: InvokableId,
}

impl FunctionEntryPoint {
    pub fn new(description: &InvokableDescription) -> Result<Self> {
        if !description.is_function() {
            return Err(ScadGraphError::invariant(format!(
                "'{}' is not a function",
                description.name
            )));
        }
        let mut node = Self::unbound();
        node.invokable_id = description.id.clone();
        node.setup_ports(description)?;
        Ok(node)
    }

    pub(crate) fn unbound() -> Self {
        Self {
            core: NodeCore::new(),
            invokable_id: InvokableId::new(),
        }
    }
}

impl ScadNode for FunctionEntryPoint {
    crate::node_boilerplate!("function_entry_point");

    fn title(&self) -> String {
        "Function parameters".to_string()
    }

    fn render(&self, ctx: &RenderContext<'_>, port: usize) -> Result<String> {
        parameter_name(ctx, self, port)
    }

    fn is_expression(&self) -> bool {
        true
    }

    fn can_be_deleted(&self) -> bool {
        false
    }

    fn save_state(&self, record: &mut SavedNode) {
        record.set_str("invokable_id", self.invokable_id.clone());
    }

    fn restore_state(&mut self, record: &SavedNode, resolver: &dyn ReferenceResolver) -> Result<()> {
        let description = own_description(record, resolver)?;
        self.invokable_id = description.id.clone();
        self.setup_ports(&description)
    }

    fn as_invokable_reference(&self) -> Option<&dyn InvokableReference> {
        Some(self)
    }

    fn as_invokable_reference_mut(&mut self) -> Option<&mut dyn InvokableReference> {
        Some(self)
    }

    fn as_entry_point(&self) -> Option<&dyn EntryPoint> {
        Some(self)
    }
}

impl InvokableReference for FunctionEntryPoint {
    fn invokable_id(&self) -> &str {
        &self.invokable_id
    }

    fn set_invokable_id(&mut self, id: &str) {
        self.invokable_id = id.to_string();
    }

    fn setup_ports(&mut self, description: &InvokableDescription) -> Result<()> {
        self.core
            .set_ports(Vec::new(), parameter_outputs(description))
    }

    fn parameter_output_port(&self, description: &InvokableDescription, parameter: usize) -> Option<usize> {
        (parameter < description.parameters.len()).then_some(parameter)
    }
}

impl EntryPoint for FunctionEntryPoint {
    fn render_entry_point(&self, ctx: &RenderContext<'_>, content: &str) -> Result<String> {
        let description = ctx.graph.description();
        let body = if content.trim().is_empty() {
            "undef"
        } else {
            content
        };
        Ok(format!(
            "{}function {}({}) = {};",
            doc_comment(description),
            description.name,
            signature(self, description),
            body
        ))
    }
}

/// The value a function returns
#[derive(Debug, Clone)]
pub struct FunctionReturn {
    core: NodeCore,
    invokable_id: InvokableId,
}

impl FunctionReturn {
    pub fn new(description: &InvokableDescription) -> Result<Self> {
        let mut node = Self::unbound();
        node.invokable_id = description.id.clone();
        node.setup_ports(description)?;
        Ok(node)
    }

    pub(crate) fn unbound() -> Self {
        Self {
            core: NodeCore::new(),
            invokable_id: InvokableId::new(),
        }
    }
}

impl ScadNode for FunctionReturn {
    crate::node_boilerplate!("function_return");

    fn title(&self) -> String {
        "Return".to_string()
    }

    fn render(&self, ctx: &RenderContext<'_>, _port: usize) -> Result<String> {
        ctx.input_or_undef(self, 0)
    }

    fn can_be_deleted(&self) -> bool {
        false
    }

    fn save_state(&self, record: &mut SavedNode) {
        record.set_str("invokable_id", self.invokable_id.clone());
    }

    fn restore_state(&mut self, record: &SavedNode, resolver: &dyn ReferenceResolver) -> Result<()> {
        let description = own_description(record, resolver)?;
        self.invokable_id = description.id.clone();
        self.setup_ports(&description)
    }

    fn as_invokable_reference(&self) -> Option<&dyn InvokableReference> {
        Some(self)
    }

    fn as_invokable_reference_mut(&mut self) -> Option<&mut dyn InvokableReference> {
        Some(self)
    }
}

impl InvokableReference for FunctionReturn {
    fn invokable_id(&self) -> &str {
        &self.invokable_id
    }

    fn set_invokable_id(&mut self, id: &str) {
        self.invokable_id = id.to_string();
    }

    fn setup_ports(&mut self, description: &InvokableDescription) -> Result<()> {
        let return_type = description.return_type().ok_or_else(|| {
            ScadGraphError::invariant(format!("'{}' is not a function", description.name))
        })?;
        self.core.set_ports(
            vec![PortDefinition::with_literal(return_type, "Result")],
            Vec::new(),
        )
    }

    fn return_ports(&self) -> Vec<PortId> {
        vec![PortId::input(0)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::builtins::BuiltIns;
    use crate::config::RenderSettings;
    use crate::library::ParameterDescription;
    use crate::literal::LiteralValue;
    use crate::nodes::operators::{BinaryOperator, BinaryOperatorNode};
    use crate::port::PortType;
    use crate::render::render_graph;

    #[test]
    fn test_module_signature_with_default() {
        let description = InvokableDescription::module("frame")
            .with_parameter(ParameterDescription::new("w", PortType::Number))
            .with_parameter(ParameterDescription::new("h", PortType::Number))
            .with_description("A picture frame");
        let mut graph = GraphBuilder::for_invokable(&description).build().unwrap();
        let entry = graph.by_id_mut("entry").unwrap().core_mut();
        let default = entry.literal_mut(PortId::output(1)).unwrap();
        default.set_value(LiteralValue::Number(5.0)).unwrap();
        default.is_set = true;

        let text = render_graph(&graph, &BuiltIns::new(), &RenderSettings::default()).unwrap();
        assert_eq!(text, "// A picture frame\nmodule frame(w, h = 5) {}");
    }

    #[test]
    fn test_function_body_is_return_value() {
        let description = InvokableDescription::function("twice")
            .with_parameter(ParameterDescription::new("x", PortType::Number))
            .returning(PortType::Number);
        let mut multiply = BinaryOperatorNode::new(BinaryOperator::Multiply);
        multiply.switch_operand(0, PortType::Number).unwrap();
        multiply.switch_operand(1, PortType::Number).unwrap();
        multiply
            .core_mut()
            .literal_mut(PortId::input(1))
            .unwrap()
            .set_value(LiteralValue::Number(2.0))
            .unwrap();
        let graph = GraphBuilder::for_invokable(&description)
            .add(multiply, "mul", (0.0, 0.0))
            .connect("entry", 0, "mul", 0)
            .connect("mul", 0, "return", 0)
            .build()
            .unwrap();
        let text = render_graph(&graph, &BuiltIns::new(), &RenderSettings::default()).unwrap();
        assert_eq!(text, "function twice(x) = (x * 2);");
    }

    #[test]
    fn test_children_output_renders_children_call() {
        let description = InvokableDescription::module("wrap").with_children();
        let entry = ModuleEntryPoint::new(&description).unwrap();
        assert_eq!(entry.output_count(), 1);
        assert_eq!(entry.children_output_port(&description), Some(0));
        assert!(!entry.can_be_deleted());
        assert!(FunctionEntryPoint::new(&description).is_err());
    }
}
