//! Built-in function calls with their own port layout
//!
//! Calls like `max` or `str` take a growable argument list; indexing and
//! string enums grow their outputs instead.

use crate::error::{Result, ScadGraphError};
use crate::literal::LiteralKind;
use crate::node::{NodeCore, ScadNode, VariableInputs, VariableOutputs};
use crate::persistence::SavedNode;
use crate::port::{PortDefinition, PortId, PortType};
use crate::project::ReferenceResolver;
use crate::render::RenderContext;

use super::{port_type_key, saved_port_type};

/// Built-ins rendered as `name(a, b, ...)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariadicFunction {
    Max,
    Min,
    Str,
    Chr,
}

impl VariadicFunction {
    pub const ALL: [VariadicFunction; 4] = [
        VariadicFunction::Max,
        VariadicFunction::Min,
        VariadicFunction::Str,
        VariadicFunction::Chr,
    ];

    pub fn kind(self) -> &'static str {
        match self {
            VariadicFunction::Max => "max",
            VariadicFunction::Min => "min",
            VariadicFunction::Str => "str",
            VariadicFunction::Chr => "chr",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            VariadicFunction::Max => "Max",
            VariadicFunction::Min => "Min",
            VariadicFunction::Str => "Str",
            VariadicFunction::Chr => "Chr",
        }
    }

    /// A lone `max`/`min` argument may be a whole vector
    fn input_type(self, size: usize) -> PortType {
        match self {
            VariadicFunction::Max | VariadicFunction::Min if size > 1 => PortType::Number,
            _ => PortType::Any,
        }
    }

    fn output_type(self) -> PortType {
        match self {
            VariadicFunction::Max | VariadicFunction::Min => PortType::Number,
            VariadicFunction::Str | VariadicFunction::Chr => PortType::String,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VariadicCall {
    core: NodeCore,
    function: VariadicFunction,
    size: usize,
}

impl VariadicCall {
    pub fn new(function: VariadicFunction) -> Self {
        let mut node = Self {
            core: NodeCore::new(),
            function,
            size: 1,
        };
        node.build_ports();
        node
    }

    pub fn function(&self) -> VariadicFunction {
        self.function
    }

    fn build_ports(&mut self) {
        let input_type = self.function.input_type(self.size);
        let inputs = (1..=self.size)
            .map(|i| PortDefinition::plain(input_type, format!("Input {}", i)))
            .collect();
        self.core.declare_ports(
            inputs,
            vec![PortDefinition::plain(self.function.output_type(), "Result")],
        );
    }
}

impl ScadNode for VariadicCall {
    fn kind(&self) -> &'static str {
        self.function.kind()
    }

    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn clone_node(&self) -> Box<dyn ScadNode> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }

    fn title(&self) -> String {
        self.function.title().to_string()
    }

    fn render(&self, ctx: &RenderContext<'_>, _port: usize) -> Result<String> {
        let mut arguments = Vec::with_capacity(self.size);
        for port in 0..self.size {
            arguments.push(ctx.input_or_undef(self, port)?);
        }
        Ok(format!("{}({})", self.function.kind(), arguments.join(", ")))
    }

    fn is_expression(&self) -> bool {
        true
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

impl VariableInputs for VariadicCall {
    fn input_size(&self) -> usize {
        self.size
    }

    fn add_input(&mut self) -> Result<()> {
        self.size += 1;
        self.build_ports();
        Ok(())
    }

    fn remove_input(&mut self) -> Result<()> {
        if self.size <= self.minimum_input_size() {
            return Err(ScadGraphError::invariant(format!(
                "{} needs at least one argument",
                self.function.kind()
            )));
        }
        self.size -= 1;
        self.build_ports();
        Ok(())
    }

    fn add_title(&self) -> String {
        "Add input value".to_string()
    }

    fn remove_title(&self) -> String {
        "Remove input value".to_string()
    }
}

/// `[start:step:end]`
#[derive(Debug, Clone)]
pub struct ConstructRange {
    core: NodeCore,
}

impl Default for ConstructRange {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstructRange {
    pub fn new() -> Self {
        let mut core = NodeCore::new();
        core.declare_ports(
            vec![
                PortDefinition::with_literal(PortType::Number, "Start"),
                PortDefinition::with_literal(PortType::Number, "Step").with_default("1"),
                PortDefinition::with_literal(PortType::Number, "End"),
            ],
            vec![PortDefinition::plain(PortType::Array, "Range")],
        );
        Self { core }
    }
}

impl ScadNode for ConstructRange {
    crate::node_boilerplate!("construct_range");

    fn title(&self) -> String {
        "Construct Range".to_string()
    }

    fn render(&self, ctx: &RenderContext<'_>, _port: usize) -> Result<String> {
        Ok(format!(
            "[{}:{}:{}]",
            ctx.input_or_undef(self, 0)?,
            ctx.input_or(self, 1, "1")?,
            ctx.input_or_undef(self, 2)?
        ))
    }

    fn is_expression(&self) -> bool {
        true
    }
}

/// `v[i]`, one output per index
#[derive(Debug, Clone)]
pub struct IndexVector {
    core: NodeCore,
    size: usize,
}

impl Default for IndexVector {
    fn default() -> Self {
        Self::new()
    }
}

impl IndexVector {
    pub fn new() -> Self {
        let mut node = Self {
            core: NodeCore::new(),
            size: 1,
        };
        node.build_ports();
        node
    }

    fn build_ports(&mut self) {
        let mut inputs = vec![PortDefinition::plain(PortType::Any, "Vector/String")];
        inputs.extend(
            (1..=self.size).map(|i| PortDefinition::with_literal(PortType::Number, format!("Index {}", i))),
        );
        let outputs = (1..=self.size)
            .map(|i| PortDefinition::plain(PortType::Any, format!("Value {}", i)))
            .collect();
        self.core.declare_ports(inputs, outputs);
    }
}

impl ScadNode for IndexVector {
    crate::node_boilerplate!("index_vector");

    fn title(&self) -> String {
        "Index Vector/String".to_string()
    }

    fn render(&self, ctx: &RenderContext<'_>, port: usize) -> Result<String> {
        if port >= self.size {
            return Ok(String::new());
        }
        Ok(format!(
            "{}[{}]",
            ctx.input_or_undef(self, 0)?,
            ctx.input_or(self, port + 1, "0")?
        ))
    }

    fn is_expression(&self) -> bool {
        true
    }

    fn save_state(&self, record: &mut SavedNode) {
        record.set_int("size", self.size as i64);
    }

    fn restore_state(&mut self, record: &SavedNode, _resolver: &dyn ReferenceResolver) -> Result<()> {
        self.size = record.get_usize("size")?.max(1);
        self.build_ports();
        Ok(())
    }

    fn as_variable_outputs(&self) -> Option<&dyn VariableOutputs> {
        Some(self)
    }

    fn as_variable_outputs_mut(&mut self) -> Option<&mut dyn VariableOutputs> {
        Some(self)
    }
}

impl VariableOutputs for IndexVector {
    fn output_size(&self) -> usize {
        self.size
    }

    fn first_variable_input(&self) -> Option<usize> {
        Some(1)
    }

    fn add_output(&mut self) -> Result<()> {
        self.size += 1;
        self.build_ports();
        Ok(())
    }

    fn remove_output(&mut self) -> Result<()> {
        if self.size <= self.minimum_output_size() {
            return Err(ScadGraphError::invariant("cannot drop the last index"));
        }
        self.size -= 1;
        self.build_ports();
        Ok(())
    }

    fn add_title(&self) -> String {
        "Add index".to_string()
    }

    fn remove_title(&self) -> String {
        "Remove index".to_string()
    }
}

/// One `(value == "option")` check per output
#[derive(Debug, Clone)]
pub struct StringEnum {
    core: NodeCore,
    size: usize,
}

impl Default for StringEnum {
    fn default() -> Self {
        Self::new()
    }
}

impl StringEnum {
    pub fn new() -> Self {
        let mut node = Self {
            core: NodeCore::new(),
            size: 1,
        };
        node.build_ports();
        node
    }

    fn build_ports(&mut self) {
        let outputs = (1..=self.size)
            .map(|i| PortDefinition {
                literal_kind: LiteralKind::String,
                ..PortDefinition::plain(PortType::Boolean, format!("Option {}", i))
            })
            .collect();
        self.core
            .declare_ports(vec![PortDefinition::plain(PortType::String, "Value")], outputs);
    }
}

impl ScadNode for StringEnum {
    crate::node_boilerplate!("string_enum");

    fn title(&self) -> String {
        "String Enum".to_string()
    }

    fn render(&self, ctx: &RenderContext<'_>, port: usize) -> Result<String> {
        let Some(option) = self.core.literal(PortId::output(port)) else {
            return Ok(String::new());
        };
        Ok(format!("({} == {})", ctx.input_or_undef(self, 0)?, option.render()))
    }

    fn is_expression(&self) -> bool {
        true
    }

    fn save_state(&self, record: &mut SavedNode) {
        record.set_int("number_of_outputs", self.size as i64);
    }

    fn restore_state(&mut self, record: &SavedNode, _resolver: &dyn ReferenceResolver) -> Result<()> {
        self.size = record.get_usize("number_of_outputs")?.max(1);
        self.build_ports();
        Ok(())
    }

    fn as_variable_outputs(&self) -> Option<&dyn VariableOutputs> {
        Some(self)
    }

    fn as_variable_outputs_mut(&mut self) -> Option<&mut dyn VariableOutputs> {
        Some(self)
    }
}

impl VariableOutputs for StringEnum {
    fn output_size(&self) -> usize {
        self.size
    }

    fn add_output(&mut self) -> Result<()> {
        self.size += 1;
        self.build_ports();
        Ok(())
    }

    fn remove_output(&mut self) -> Result<()> {
        if self.size <= self.minimum_output_size() {
            return Err(ScadGraphError::invariant("a string enum needs at least one option"));
        }
        self.size -= 1;
        self.build_ports();
        Ok(())
    }

    fn add_title(&self) -> String {
        "Add enum value".to_string()
    }

    fn remove_title(&self) -> String {
        "Remove enum value".to_string()
    }
}

/// Passes its input through under another port type
#[derive(Debug, Clone)]
pub struct Cast {
    core: NodeCore,
    target: PortType,
}

impl Default for Cast {
    fn default() -> Self {
        Self::new(PortType::Any)
    }
}

impl Cast {
    pub fn new(target: PortType) -> Self {
        let mut node = Self {
            core: NodeCore::new(),
            target,
        };
        node.build_ports();
        node
    }

    pub fn target(&self) -> PortType {
        self.target
    }

    fn build_ports(&mut self) {
        self.core.declare_ports(
            vec![PortDefinition::plain(PortType::Any, "Value")],
            vec![PortDefinition::plain(self.target, "Result")],
        );
    }
}

impl ScadNode for Cast {
    crate::node_boilerplate!("cast");

    fn title(&self) -> String {
        format!("Cast to {}", self.target)
    }

    fn render(&self, ctx: &RenderContext<'_>, _port: usize) -> Result<String> {
        ctx.input_or_undef(self, 0)
    }

    fn is_expression(&self) -> bool {
        true
    }

    fn save_state(&self, record: &mut SavedNode) {
        record.set_str("target_type", port_type_key(self.target));
    }

    fn restore_state(&mut self, record: &SavedNode, _resolver: &dyn ReferenceResolver) -> Result<()> {
        let target = saved_port_type(record, "target_type")?;
        if !target.is_expression_type() {
            return Err(ScadGraphError::broken(format!("cannot cast to {}", target)));
        }
        self.target = target;
        self.build_ports();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::builtins::BuiltIns;
    use crate::config::RenderSettings;
    use crate::literal::LiteralValue;
    use crate::nodes::constants::ConstantValue;

    fn render_at(builder: GraphBuilder, id: &str, port: usize) -> String {
        let graph = builder.build().unwrap();
        let builtins = BuiltIns::new();
        let settings = RenderSettings::default();
        let ctx = RenderContext::new(&graph, &builtins, &settings);
        graph.by_id(id).unwrap().render(&ctx, port).unwrap()
    }

    #[test]
    fn test_variadic_calls_render_every_argument() {
        let mut max = VariadicCall::new(VariadicFunction::Max);
        assert_eq!(max.port_type(PortId::input(0)), Some(PortType::Any));
        max.add_input().unwrap();
        assert_eq!(max.port_type(PortId::input(1)), Some(PortType::Number));
        let text = render_at(
            GraphBuilder::main()
                .add(max, "max", (0.0, 0.0))
                .add(ConstantValue::number(3.0), "three", (-50.0, 0.0))
                .connect("three", 0, "max", 1),
            "max",
            0,
        );
        assert_eq!(text, "max(undef, 3)");

        let text = render_at(
            GraphBuilder::main()
                .add(VariadicCall::new(VariadicFunction::Str), "str", (0.0, 0.0))
                .add(ConstantValue::string("a"), "a", (-50.0, 0.0))
                .connect("a", 0, "str", 0),
            "str",
            0,
        );
        assert_eq!(text, "str(\"a\")");
    }

    #[test]
    fn test_variadic_kinds_and_floor() {
        for function in VariadicFunction::ALL {
            let mut node = VariadicCall::new(function);
            assert_eq!(node.kind(), function.kind());
            assert!(node.remove_input().is_err());
        }
        let chr = VariadicCall::new(VariadicFunction::Chr);
        assert_eq!(chr.port_type(PortId::output(0)), Some(PortType::String));
    }

    #[test]
    fn test_range_defaults_step_to_one() {
        let text = render_at(
            GraphBuilder::main().add(ConstructRange::new(), "range", (0.0, 0.0)),
            "range",
            0,
        );
        assert_eq!(text, "[0:1:0]");
    }

    #[test]
    fn test_index_vector_renders_each_output() {
        let mut index = IndexVector::new();
        index.add_output().unwrap();
        index
            .core_mut()
            .literal_mut(PortId::input(2))
            .unwrap()
            .set_value(LiteralValue::Number(2.0))
            .unwrap();
        assert_eq!(index.input_count(), 3);
        assert_eq!(index.output_count(), 2);
        let builder = GraphBuilder::main()
            .add(index, "index", (0.0, 0.0))
            .add(ConstantValue::vector3([1.0, 2.0, 3.0]), "v", (-50.0, 0.0))
            .connect("v", 0, "index", 0);
        assert_eq!(render_at(builder, "index", 1), "[1, 2, 3][2]");
    }

    #[test]
    fn test_string_enum_compares_against_option_literal() {
        let mut options = StringEnum::new();
        options.add_output().unwrap();
        options
            .core_mut()
            .literal_mut(PortId::output(1))
            .unwrap()
            .set_value(LiteralValue::String("round".into()))
            .unwrap();
        assert_eq!(options.port_type(PortId::output(1)), Some(PortType::Boolean));
        let builder = GraphBuilder::main()
            .add(options, "enum", (0.0, 0.0))
            .add(ConstantValue::string("round"), "style", (-50.0, 0.0))
            .connect("style", 0, "enum", 0);
        assert_eq!(render_at(builder, "enum", 1), "(\"round\" == \"round\")");
    }

    #[test]
    fn test_cast_passes_value_through() {
        let cast = Cast::new(PortType::Vector3);
        assert_eq!(cast.port_type(PortId::output(0)), Some(PortType::Vector3));
        let text = render_at(
            GraphBuilder::main()
                .add(cast, "cast", (0.0, 0.0))
                .add(ConstantValue::number(1.0), "one", (-50.0, 0.0))
                .connect("one", 0, "cast", 0),
            "cast",
            0,
        );
        assert_eq!(text, "1");
    }
}
