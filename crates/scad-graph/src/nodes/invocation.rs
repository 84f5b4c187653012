//! Calls to modules and functions
//!
//! Invocation nodes hold only the id of the description they call. Their
//! ports are rebuilt from the description whenever it changes shape.

use crate::error::{Result, ScadGraphError};
use crate::library::{InvokableDescription, InvokableId, ParameterDescription};
use crate::node::{InvokableReference, NodeCore, ScadNode};
use crate::persistence::SavedNode;
use crate::port::{PortDefinition, PortId};
use crate::project::ReferenceResolver;
use crate::render::RenderContext;

fn parameter_port(parameter: &ParameterDescription) -> PortDefinition {
    let port = PortDefinition::with_literal(parameter.type_hint, parameter.display_name());
    if parameter.optional {
        port.manual_literal()
    } else {
        port
    }
}

pub(crate) fn parameter_inputs(description: &InvokableDescription) -> Vec<PortDefinition> {
    description.parameters.iter().map(parameter_port).collect()
}

/// Argument values for every parameter; `None` where nothing feeds it
fn argument_values(
    node: &dyn ScadNode,
    ctx: &RenderContext<'_>,
    description: &InvokableDescription,
) -> Result<Vec<Option<String>>> {
    (0..description.parameters.len())
        .map(|i| ctx.input(node, i))
        .collect()
}

fn restore_reference(
    record: &SavedNode,
    resolver: &dyn ReferenceResolver,
) -> Result<std::sync::Arc<InvokableDescription>> {
    resolver.require_invokable(record.get_str("invokable_id")?)
}

/// Statement calling a module, e.g. `cube(size = [1, 2, 3]);`
#[derive(Debug, Clone)]
pub struct ModuleInvocation {
    core: NodeCore,
    invokable_id: InvokableId,
    title: String,
}

impl ModuleInvocation {
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
            title: String::new(),
        }
    }
}

impl ScadNode for ModuleInvocation {
    crate::node_boilerplate!("module_invocation");

    fn title(&self) -> String {
        self.title.clone()
    }

    fn render(&self, ctx: &RenderContext<'_>, _port: usize) -> Result<String> {
        let description = ctx.invokable(&self.invokable_id)?;
        let values = argument_values(self, ctx, &description)?;
        let arguments: Vec<String> = description
            .parameters
            .iter()
            .zip(values)
            .filter_map(|(parameter, value)| match value {
                Some(value) => Some(format!("{} = {}", parameter.name, value)),
                None if parameter.optional => None,
                None => Some(format!("{} = undef", parameter.name)),
            })
            .collect();
        let call = format!("{}({})", description.name, arguments.join(", "));
        match self.children_input_port(&description) {
            Some(port) => {
                let children = ctx.children(self, port)?;
                if children.is_empty() {
                    Ok(format!("{};", call))
                } else {
                    Ok(format!("{}{}", call, ctx.block(&children)))
                }
            }
            None => Ok(format!("{};", call)),
        }
    }

    fn can_have_modifiers(&self) -> bool {
        true
    }

    fn save_state(&self, record: &mut SavedNode) {
        record.set_str("invokable_id", self.invokable_id.clone());
    }

    fn restore_state(&mut self, record: &SavedNode, resolver: &dyn ReferenceResolver) -> Result<()> {
        let description = restore_reference(record, resolver)?;
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

impl InvokableReference for ModuleInvocation {
    fn invokable_id(&self) -> &str {
        &self.invokable_id
    }

    fn set_invokable_id(&mut self, id: &str) {
        self.invokable_id = id.to_string();
    }

    fn setup_ports(&mut self, description: &InvokableDescription) -> Result<()> {
        let mut inputs = parameter_inputs(description);
        if description.supports_children() {
            inputs.push(PortDefinition::geometry("Children"));
        }
        self.title = description.display_name().to_string();
        self.core
            .set_ports(inputs, vec![PortDefinition::geometry("Out")])
    }

    fn parameter_input_port(&self, description: &InvokableDescription, parameter: usize) -> Option<usize> {
        (parameter < description.parameters.len()).then_some(parameter)
    }

    fn children_input_port(&self, description: &InvokableDescription) -> Option<usize> {
        description
            .supports_children()
            .then_some(description.parameters.len())
    }
}

/// Expression calling a function, e.g. `sin(30)`
#[derive(Debug, Clone)]
pub struct FunctionInvocation {
    core: NodeCore,
    invokable_id: InvokableId,
    title: String,
}

impl FunctionInvocation {
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
            title: String::new(),
        }
    }
}

impl ScadNode for FunctionInvocation {
    crate::node_boilerplate!("function_invocation");

    fn title(&self) -> String {
        self.title.clone()
    }

    fn render(&self, ctx: &RenderContext<'_>, _port: usize) -> Result<String> {
        let description = ctx.invokable(&self.invokable_id)?;
        let mut values = argument_values(self, ctx, &description)?;
        // positional: trailing optional arguments without a value can go
        while let Some(None) = values.last() {
            let index = values.len() - 1;
            if !description.parameters[index].optional {
                break;
            }
            values.pop();
        }
        let arguments: Vec<String> = values
            .into_iter()
            .map(|v| v.unwrap_or_else(|| "undef".to_string()))
            .collect();
        Ok(format!("{}({})", description.name, arguments.join(", ")))
    }

    fn is_expression(&self) -> bool {
        true
    }

    fn save_state(&self, record: &mut SavedNode) {
        record.set_str("invokable_id", self.invokable_id.clone());
    }

    fn restore_state(&mut self, record: &SavedNode, resolver: &dyn ReferenceResolver) -> Result<()> {
        let description = restore_reference(record, resolver)?;
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

impl InvokableReference for FunctionInvocation {
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
        self.title = description.display_name().to_string();
        self.core.set_ports(
            parameter_inputs(description),
            vec![PortDefinition::plain(return_type, "Result")],
        )
    }

    fn parameter_input_port(&self, description: &InvokableDescription, parameter: usize) -> Option<usize> {
        (parameter < description.parameters.len()).then_some(parameter)
    }

    fn return_ports(&self) -> Vec<PortId> {
        vec![PortId::output(0)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::builtins::BuiltIns;
    use crate::config::RenderSettings;
    use crate::literal::LiteralValue;
    use crate::port::PortType;
    use crate::render::render_graph;

    fn render(builder: GraphBuilder) -> String {
        let graph = builder.build().unwrap();
        render_graph(&graph, &BuiltIns::new(), &RenderSettings::default()).unwrap()
    }

    #[test]
    fn test_ports_follow_description() {
        let builtins = BuiltIns::new();
        let translate = ModuleInvocation::new(&builtins.find_by_name("translate").unwrap()).unwrap();
        assert_eq!(translate.input_count(), 2);
        assert_eq!(translate.port_type(PortId::input(1)), Some(PortType::Geometry));
        assert_eq!(translate.title(), "translate");

        let sin = FunctionInvocation::new(&builtins.find_by_name("sin").unwrap()).unwrap();
        assert!(sin.is_expression());
        assert_eq!(sin.port_type(PortId::output(0)), Some(PortType::Number));
        assert!(ModuleInvocation::new(&builtins.find_by_name("sin").unwrap()).is_err());
    }

    #[test]
    fn test_optional_parameters_without_value_are_omitted() {
        let cube = BuiltIns::new().find_by_name("cube").unwrap();
        let mut node = ModuleInvocation::new(&cube).unwrap();
        assert_eq!(render(GraphBuilder::main().add(node.clone(), "c", (0.0, 0.0))), "cube();");

        let size = node.core_mut().literal_mut(PortId::input(0)).unwrap();
        size.set_value(LiteralValue::Vector3([1.0, 2.0, 3.0])).unwrap();
        size.is_set = true;
        assert_eq!(
            render(GraphBuilder::main().add(node, "c", (0.0, 0.0))),
            "cube(size = [1, 2, 3]);"
        );
    }

    #[test]
    fn test_children_render_in_a_block() {
        let builtins = BuiltIns::new();
        let translate = ModuleInvocation::new(&builtins.find_by_name("translate").unwrap()).unwrap();
        let sphere = ModuleInvocation::new(&builtins.find_by_name("sphere").unwrap()).unwrap();
        let text = render(
            GraphBuilder::main()
                .add(translate, "t", (0.0, 0.0))
                .add(sphere, "s", (0.0, -50.0))
                .connect("s", 0, "t", 1),
        );
        assert_eq!(text, "translate(v = [0, 0, 0]) {\n    sphere();\n}");
    }

    #[test]
    fn test_function_arguments_are_positional() {
        let builtins = BuiltIns::new();
        let rands = FunctionInvocation::new(&builtins.find_by_name("rands").unwrap()).unwrap();
        let echo = crate::nodes::statements::Echo::new();
        let text = render(
            GraphBuilder::main()
                .add(rands, "r", (0.0, 0.0))
                .add(echo, "e", (0.0, 10.0))
                .connect("r", 0, "e", 1),
        );
        assert_eq!(text, "echo(rands(0, 0, 0));");
    }
}
