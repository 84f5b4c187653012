//! List comprehension elements and list builders
//!
//! `each`, `if` and `for` elements are only valid inside `[...]`. Their
//! outputs may feed other comprehension elements or a vector construction,
//! nothing else.

use crate::error::{Result, ScadGraphError};
use crate::node::{NodeCore, ScadNode, VariableInputs};
use crate::persistence::SavedNode;
use crate::port::{PortDefinition, PortType};
use crate::project::ReferenceResolver;
use crate::render::RenderContext;
use crate::rules::{ConnectionRule, ConnectionRules, Decision};

/// `each list`
#[derive(Debug, Clone)]
pub struct Each {
    core: NodeCore,
}

impl Default for Each {
    fn default() -> Self {
        Self::new()
    }
}

impl Each {
    pub fn new() -> Self {
        let mut core = NodeCore::new();
        core.declare_ports(
            vec![PortDefinition::plain(PortType::Array, "List")],
            vec![PortDefinition::plain(PortType::Any, "Elements")],
        );
        Self { core }
    }
}

impl ScadNode for Each {
    crate::node_boilerplate!("each");

    fn title(&self) -> String {
        "Each".to_string()
    }

    fn render(&self, ctx: &RenderContext<'_>, _port: usize) -> Result<String> {
        Ok(format!("each {}", ctx.input_or(self, 0, "[]")?))
    }

    fn is_expression(&self) -> bool {
        true
    }

    fn is_list_comprehension(&self) -> bool {
        true
    }
}

/// `if (condition) then else otherwise`
#[derive(Debug, Clone)]
pub struct FilterIf {
    core: NodeCore,
}

impl Default for FilterIf {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterIf {
    pub fn new() -> Self {
        let mut core = NodeCore::new();
        core.declare_ports(
            vec![
                PortDefinition::with_literal(PortType::Boolean, "Condition"),
                PortDefinition::plain(PortType::Any, "Then"),
                PortDefinition::plain(PortType::Any, "Else"),
            ],
            vec![PortDefinition::plain(PortType::Any, "Elements")],
        );
        Self { core }
    }
}

impl ScadNode for FilterIf {
    crate::node_boilerplate!("filter_if");

    fn title(&self) -> String {
        "If".to_string()
    }

    fn render(&self, ctx: &RenderContext<'_>, _port: usize) -> Result<String> {
        let condition = ctx.input_or(self, 0, "false")?;
        let then = ctx.input_or_undef(self, 1)?;
        match ctx.input(self, 2)? {
            Some(otherwise) => Ok(format!("if ({}) {} else {}", condition, then, otherwise)),
            None => Ok(format!("if ({}) {}", condition, then)),
        }
    }

    fn is_expression(&self) -> bool {
        true
    }

    fn is_list_comprehension(&self) -> bool {
        true
    }
}

fn variable_ports(
    core: &mut NodeCore,
    size: usize,
    input_type: PortType,
    output_type: PortType,
) {
    let inputs = (1..=size)
        .map(|i| PortDefinition::plain(input_type, format!("Item {}", i)))
        .collect();
    core.declare_ports(inputs, vec![PortDefinition::plain(output_type, "Result")]);
}

fn shrink(size: &mut usize, minimum: usize, what: &str) -> Result<()> {
    if *size <= minimum {
        return Err(ScadGraphError::invariant(format!(
            "{} needs at least {} input(s)",
            what, minimum
        )));
    }
    *size -= 1;
    Ok(())
}

/// `[a, b, ...]`
#[derive(Debug, Clone)]
pub struct ConstructVector {
    core: NodeCore,
    size: usize,
}

impl Default for ConstructVector {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstructVector {
    pub fn new() -> Self {
        let mut node = Self {
            core: NodeCore::new(),
            size: 2,
        };
        variable_ports(&mut node.core, node.size, PortType::Any, PortType::Vector);
        node
    }
}

impl ScadNode for ConstructVector {
    crate::node_boilerplate!("construct_vector");

    fn title(&self) -> String {
        "Vector".to_string()
    }

    fn render(&self, ctx: &RenderContext<'_>, _port: usize) -> Result<String> {
        let mut items = Vec::with_capacity(self.size);
        for port in 0..self.size {
            match ctx.input(self, port)? {
                // an empty comprehension element contributes nothing
                Some(item) if item.is_empty() => {}
                Some(item) => items.push(item),
                None => items.push("undef".to_string()),
            }
        }
        Ok(format!("[{}]", items.join(", ")))
    }

    fn is_expression(&self) -> bool {
        true
    }

    fn is_vector_construction(&self) -> bool {
        true
    }

    fn save_state(&self, record: &mut SavedNode) {
        record.set_int("size", self.size as i64);
    }

    fn restore_state(&mut self, record: &SavedNode, _resolver: &dyn ReferenceResolver) -> Result<()> {
        self.size = record.get_usize("size")?.max(1);
        variable_ports(&mut self.core, self.size, PortType::Any, PortType::Vector);
        Ok(())
    }

    fn as_variable_inputs(&self) -> Option<&dyn VariableInputs> {
        Some(self)
    }

    fn as_variable_inputs_mut(&mut self) -> Option<&mut dyn VariableInputs> {
        Some(self)
    }
}

impl VariableInputs for ConstructVector {
    fn input_size(&self) -> usize {
        self.size
    }

    fn add_input(&mut self) -> Result<()> {
        self.size += 1;
        variable_ports(&mut self.core, self.size, PortType::Any, PortType::Vector);
        Ok(())
    }

    fn remove_input(&mut self) -> Result<()> {
        let minimum = self.minimum_input_size();
        shrink(&mut self.size, minimum, "a vector")?;
        variable_ports(&mut self.core, self.size, PortType::Any, PortType::Vector);
        Ok(())
    }

    fn add_title(&self) -> String {
        "Add element".to_string()
    }

    fn remove_title(&self) -> String {
        "Remove element".to_string()
    }
}

/// `concat(a, b, ...)`
#[derive(Debug, Clone)]
pub struct Concat {
    core: NodeCore,
    size: usize,
}

impl Default for Concat {
    fn default() -> Self {
        Self::new()
    }
}

impl Concat {
    pub fn new() -> Self {
        let mut node = Self {
            core: NodeCore::new(),
            size: 2,
        };
        variable_ports(&mut node.core, node.size, PortType::Array, PortType::Array);
        node
    }
}

impl ScadNode for Concat {
    crate::node_boilerplate!("concat");

    fn title(&self) -> String {
        "Concat".to_string()
    }

    fn render(&self, ctx: &RenderContext<'_>, _port: usize) -> Result<String> {
        let mut lists = Vec::with_capacity(self.size);
        for port in 0..self.size {
            lists.push(ctx.input_or(self, port, "[]")?);
        }
        Ok(format!("concat({})", lists.join(", ")))
    }

    fn is_expression(&self) -> bool {
        true
    }

    fn save_state(&self, record: &mut SavedNode) {
        record.set_int("size", self.size as i64);
    }

    fn restore_state(&mut self, record: &SavedNode, _resolver: &dyn ReferenceResolver) -> Result<()> {
        self.size = record.get_usize("size")?.max(1);
        variable_ports(&mut self.core, self.size, PortType::Array, PortType::Array);
        Ok(())
    }

    fn as_variable_inputs(&self) -> Option<&dyn VariableInputs> {
        Some(self)
    }

    fn as_variable_inputs_mut(&mut self) -> Option<&mut dyn VariableInputs> {
        Some(self)
    }
}

impl VariableInputs for Concat {
    fn input_size(&self) -> usize {
        self.size
    }

    fn add_input(&mut self) -> Result<()> {
        self.size += 1;
        variable_ports(&mut self.core, self.size, PortType::Array, PortType::Array);
        Ok(())
    }

    fn remove_input(&mut self) -> Result<()> {
        let minimum = self.minimum_input_size();
        shrink(&mut self.size, minimum, "concat")?;
        variable_ports(&mut self.core, self.size, PortType::Array, PortType::Array);
        Ok(())
    }

    fn add_title(&self) -> String {
        "Add list".to_string()
    }

    fn remove_title(&self) -> String {
        "Remove list".to_string()
    }
}

/// Comprehension outputs only feed comprehension elements or vector constructions
pub fn register_rules(rules: &mut ConnectionRules) {
    rules.add_connect_rule(ConnectionRule::new(
        "list_comprehension_consumer",
        Decision::Veto,
        |c| match (c.source(), c.target()) {
            (Some(source), Some(target)) => {
                source.is_list_comprehension()
                    && !target.is_list_comprehension()
                    && !target.is_vector_construction()
            }
            _ => false,
        },
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::builtins::BuiltIns;
    use crate::config::RenderSettings;
    use crate::nodes::constants::ConstantValue;

    fn render_node(builder: GraphBuilder, id: &str) -> String {
        let graph = builder.build().unwrap();
        let builtins = BuiltIns::new();
        let settings = RenderSettings::default();
        let ctx = RenderContext::new(&graph, &builtins, &settings);
        graph.by_id(id).unwrap().render(&ctx, 0).unwrap()
    }

    #[test]
    fn test_each_inside_vector() {
        let text = render_node(
            GraphBuilder::main()
                .add(Each::new(), "each", (0.0, 0.0))
                .add(ConstructVector::new(), "vec", (10.0, 0.0))
                .add(ConstantValue::number(1.0), "one", (0.0, 10.0))
                .connect("each", 0, "vec", 0)
                .connect("one", 0, "vec", 1),
            "vec",
        );
        assert_eq!(text, "[each [], 1]");
    }

    #[test]
    fn test_filter_if_with_and_without_else() {
        let text = render_node(
            GraphBuilder::main()
                .add(FilterIf::new(), "if", (0.0, 0.0))
                .add(ConstantValue::number(1.0), "one", (0.0, 10.0))
                .connect("one", 0, "if", 1),
            "if",
        );
        assert_eq!(text, "if (false) 1");

        let text = render_node(
            GraphBuilder::main()
                .add(FilterIf::new(), "if", (0.0, 0.0))
                .add(ConstantValue::number(1.0), "one", (0.0, 10.0))
                .add(ConstantValue::number(2.0), "two", (0.0, 20.0))
                .connect("one", 0, "if", 1)
                .connect("two", 0, "if", 2),
            "if",
        );
        assert_eq!(text, "if (false) 1 else 2");
    }

    #[test]
    fn test_concat_fills_missing_lists() {
        let text = render_node(GraphBuilder::main().add(Concat::new(), "cat", (0.0, 0.0)), "cat");
        assert_eq!(text, "concat([], [])");
    }

    #[test]
    fn test_variable_arity_floor() {
        let mut vec = ConstructVector::new();
        vec.remove_input().unwrap();
        assert_eq!(vec.input_count(), 1);
        assert!(vec.remove_input().is_err());
        vec.add_input().unwrap();
        vec.add_input().unwrap();
        assert_eq!(vec.input_size(), 3);
        assert_eq!(vec.port_type(crate::port::PortId::output(0)), Some(PortType::Vector));
    }
}
