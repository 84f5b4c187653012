//! Bound start/end pairs for `for`, `let` and list comprehensions
//!
//! The start node owns the clause list: one input (the iterated list or the
//! bound value) and one output (the variable) per clause. The end node owns
//! the body and renders the whole construct by reading its start partner.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScadGraphError};
use crate::node::{BoundNode, NodeCore, NodeId, ScadNode, VariableInputs};
use crate::persistence::SavedNode;
use crate::port::{PortDefinition, PortId, PortType};
use crate::project::ReferenceResolver;
use crate::render::{stable_variable_name, RenderContext};

/// Which construct a bound pair renders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScopeFlavor {
    /// `for(...)` / `intersection_for(...)` over geometry
    ForLoop,
    /// `let(...)` around geometry
    LetBlock,
    /// `let(...) expr` as a value
    LetExpression,
    /// `for(...) expr` inside a list
    ForComprehension,
}

impl ScopeFlavor {
    pub const ALL: [ScopeFlavor; 4] = [
        ScopeFlavor::ForLoop,
        ScopeFlavor::LetBlock,
        ScopeFlavor::LetExpression,
        ScopeFlavor::ForComprehension,
    ];

    pub fn start_kind(self) -> &'static str {
        match self {
            ScopeFlavor::ForLoop => "for_loop_start",
            ScopeFlavor::LetBlock => "let_block_start",
            ScopeFlavor::LetExpression => "let_expression_start",
            ScopeFlavor::ForComprehension => "for_comprehension_start",
        }
    }

    pub fn end_kind(self) -> &'static str {
        match self {
            ScopeFlavor::ForLoop => "for_loop_end",
            ScopeFlavor::LetBlock => "let_block_end",
            ScopeFlavor::LetExpression => "let_expression_end",
            ScopeFlavor::ForComprehension => "for_comprehension_end",
        }
    }

    fn title(self) -> &'static str {
        match self {
            ScopeFlavor::ForLoop => "For loop",
            ScopeFlavor::LetBlock => "Let",
            ScopeFlavor::LetExpression => "Let expression",
            ScopeFlavor::ForComprehension => "For comprehension",
        }
    }

    fn iterates(self) -> bool {
        matches!(self, ScopeFlavor::ForLoop | ScopeFlavor::ForComprehension)
    }

    /// Expression flavors produce a value; the others wrap geometry
    pub fn is_expression(self) -> bool {
        matches!(self, ScopeFlavor::LetExpression | ScopeFlavor::ForComprehension)
    }

    /// Placeholder for an unconnected clause value
    fn empty_value(self) -> &'static str {
        if self.iterates() {
            "[]"
        } else {
            "undef"
        }
    }
}

/// Opening half of a scope: clause values in, variables out
#[derive(Debug, Clone)]
pub struct ScopeStart {
    core: NodeCore,
    flavor: ScopeFlavor,
    size: usize,
    other_node_id: NodeId,
}

impl ScopeStart {
    pub fn new(flavor: ScopeFlavor) -> Self {
        let mut node = Self {
            core: NodeCore::new(),
            flavor,
            size: 1,
            other_node_id: NodeId::new(),
        };
        node.build_ports();
        node
    }

    pub fn flavor(&self) -> ScopeFlavor {
        self.flavor
    }

    fn build_ports(&mut self) {
        let (input_type, input_name) = if self.flavor.iterates() {
            (PortType::Array, "List")
        } else {
            (PortType::Any, "Value")
        };
        let inputs = (1..=self.size)
            .map(|i| PortDefinition::plain(input_type, format!("{} {}", input_name, i)))
            .collect();
        let outputs = (1..=self.size)
            .map(|i| PortDefinition::named_output(format!("Variable {}", i)))
            .collect();
        self.core.declare_ports(inputs, outputs);
    }

    /// Variable name for clause `index`: the user's name if set, else a
    /// synthetic one derived from the node id
    pub fn variable_name(&self, index: usize) -> String {
        match self.core.literal(PortId::output(index)) {
            Some(literal) if literal.has_name() => literal.render(),
            _ => stable_variable_name(self.core.id(), index),
        }
    }

    /// `a = [1, 2], b = x`
    fn clauses(&self, ctx: &RenderContext<'_>) -> Result<String> {
        let mut clauses = Vec::with_capacity(self.size);
        for index in 0..self.size {
            let value = ctx.input_or(self, index, self.flavor.empty_value())?;
            clauses.push(format!("{} = {}", self.variable_name(index), value));
        }
        Ok(clauses.join(", "))
    }
}

impl ScadNode for ScopeStart {
    fn kind(&self) -> &'static str {
        self.flavor.start_kind()
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
        format!("{} start", self.flavor.title())
    }

    fn render(&self, _ctx: &RenderContext<'_>, port: usize) -> Result<String> {
        Ok(self.variable_name(port))
    }

    fn is_expression(&self) -> bool {
        self.flavor.is_expression()
    }

    fn save_state(&self, record: &mut SavedNode) {
        record.set_int("size", self.size as i64);
        record.set_str("other_node_id", self.other_node_id.clone());
    }

    fn restore_state(&mut self, record: &SavedNode, _resolver: &dyn ReferenceResolver) -> Result<()> {
        self.size = record.get_usize("size")?.max(1);
        self.other_node_id = record.get_str("other_node_id")?.to_string();
        self.build_ports();
        Ok(())
    }

    fn as_variable_inputs(&self) -> Option<&dyn VariableInputs> {
        Some(self)
    }

    fn as_variable_inputs_mut(&mut self) -> Option<&mut dyn VariableInputs> {
        Some(self)
    }

    fn as_bound(&self) -> Option<&dyn BoundNode> {
        Some(self)
    }

    fn as_bound_mut(&mut self) -> Option<&mut dyn BoundNode> {
        Some(self)
    }
}

impl VariableInputs for ScopeStart {
    fn input_size(&self) -> usize {
        self.size
    }

    fn first_variable_output(&self) -> Option<usize> {
        Some(0)
    }

    fn add_input(&mut self) -> Result<()> {
        self.size += 1;
        self.build_ports();
        Ok(())
    }

    fn remove_input(&mut self) -> Result<()> {
        if self.size <= self.minimum_input_size() {
            return Err(ScadGraphError::invariant(format!(
                "{} needs at least one clause",
                self.flavor.title()
            )));
        }
        self.size -= 1;
        self.build_ports();
        Ok(())
    }

    fn add_title(&self) -> String {
        if self.flavor.iterates() {
            "Add nest level".to_string()
        } else {
            "Add variable".to_string()
        }
    }

    fn remove_title(&self) -> String {
        if self.flavor.iterates() {
            "Remove nest level".to_string()
        } else {
            "Remove variable".to_string()
        }
    }
}

impl BoundNode for ScopeStart {
    fn other_node_id(&self) -> &str {
        &self.other_node_id
    }

    fn set_other_node_id(&mut self, id: &str) {
        self.other_node_id = id.to_string();
    }

    fn is_start(&self) -> bool {
        true
    }
}

/// Closing half of a scope: body in, construct out
#[derive(Debug, Clone)]
pub struct ScopeEnd {
    core: NodeCore,
    flavor: ScopeFlavor,
    other_node_id: NodeId,
    intersect: bool,
}

impl ScopeEnd {
    pub fn new(flavor: ScopeFlavor) -> Self {
        let mut core = NodeCore::new();
        let (input, output) = match flavor {
            ScopeFlavor::ForLoop | ScopeFlavor::LetBlock => {
                (PortDefinition::geometry("Body"), PortDefinition::geometry("Out"))
            }
            ScopeFlavor::LetExpression => (
                PortDefinition::plain(PortType::Any, "Result"),
                PortDefinition::plain(PortType::Any, "Result"),
            ),
            ScopeFlavor::ForComprehension => (
                PortDefinition::plain(PortType::Any, "Element"),
                PortDefinition::plain(PortType::Any, "Elements"),
            ),
        };
        core.declare_ports(vec![input], vec![output]);
        Self {
            core,
            flavor,
            other_node_id: NodeId::new(),
            intersect: false,
        }
    }

    pub fn flavor(&self) -> ScopeFlavor {
        self.flavor
    }

    pub fn is_intersect(&self) -> bool {
        self.intersect
    }

    /// Switch a for-loop between `for` and `intersection_for`
    pub fn set_intersect(&mut self, intersect: bool) -> Result<()> {
        if self.flavor != ScopeFlavor::ForLoop {
            return Err(ScadGraphError::invariant(format!(
                "{} has no intersect mode",
                self.flavor.title()
            )));
        }
        self.intersect = intersect;
        Ok(())
    }
}

impl ScadNode for ScopeEnd {
    fn kind(&self) -> &'static str {
        self.flavor.end_kind()
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
        format!("{} end", self.flavor.title())
    }

    fn render(&self, ctx: &RenderContext<'_>, _port: usize) -> Result<String> {
        let start: &ScopeStart = ctx.partner(self)?;
        let clauses = start.clauses(ctx)?;
        match self.flavor {
            ScopeFlavor::ForLoop => {
                let keyword = if self.intersect {
                    "intersection_for"
                } else {
                    "for"
                };
                let body = ctx.children(self, 0)?;
                Ok(format!("{}({}){}", keyword, clauses, ctx.block(&body)))
            }
            ScopeFlavor::LetBlock => {
                let body = ctx.children(self, 0)?;
                Ok(format!("let({}){}", clauses, ctx.block(&body)))
            }
            ScopeFlavor::LetExpression => Ok(format!(
                "(let({}) {})",
                clauses,
                ctx.input_or_undef(self, 0)?
            )),
            ScopeFlavor::ForComprehension => match ctx.input(self, 0)? {
                Some(element) => Ok(format!("for({}) {}", clauses, element)),
                None => Ok(String::new()),
            },
        }
    }

    fn is_expression(&self) -> bool {
        self.flavor.is_expression()
    }

    fn can_have_modifiers(&self) -> bool {
        !self.flavor.is_expression()
    }

    fn is_list_comprehension(&self) -> bool {
        self.flavor == ScopeFlavor::ForComprehension
    }

    fn save_state(&self, record: &mut SavedNode) {
        record.set_str("other_node_id", self.other_node_id.clone());
        if self.flavor == ScopeFlavor::ForLoop {
            record.set_bool("intersect", self.intersect);
        }
    }

    fn restore_state(&mut self, record: &SavedNode, _resolver: &dyn ReferenceResolver) -> Result<()> {
        self.other_node_id = record.get_str("other_node_id")?.to_string();
        self.intersect = record.get_bool_or("intersect", false)?;
        Ok(())
    }

    fn as_bound(&self) -> Option<&dyn BoundNode> {
        Some(self)
    }

    fn as_bound_mut(&mut self) -> Option<&mut dyn BoundNode> {
        Some(self)
    }
}

impl BoundNode for ScopeEnd {
    fn other_node_id(&self) -> &str {
        &self.other_node_id
    }

    fn set_other_node_id(&mut self, id: &str) {
        self.other_node_id = id.to_string();
    }

    fn is_start(&self) -> bool {
        false
    }
}

/// Start and end linked to each other
pub fn bound_pair(flavor: ScopeFlavor) -> (ScopeStart, ScopeEnd) {
    let mut start = ScopeStart::new(flavor);
    let mut end = ScopeEnd::new(flavor);
    start.other_node_id = end.id().to_string();
    end.other_node_id = start.id().to_string();
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::builtins::BuiltIns;
    use crate::config::RenderSettings;
    use crate::literal::{Literal, LiteralValue};
    use crate::nodes::comprehension::ConstructVector;
    use crate::nodes::constants::ConstantValue;
    use crate::nodes::invocation::ModuleInvocation;
    use crate::render::render_graph;

    fn linked(flavor: ScopeFlavor) -> (ScopeStart, ScopeEnd) {
        let (mut start, mut end) = bound_pair(flavor);
        start.core_mut().set_id("start");
        end.core_mut().set_id("end");
        start.set_other_node_id("end");
        end.set_other_node_id("start");
        (start, end)
    }

    #[test]
    fn test_for_loop_with_named_variable() {
        let (mut start, end) = linked(ScopeFlavor::ForLoop);
        start
            .core_mut()
            .replace_literal(PortId::output(0), Literal::set(LiteralValue::Name("i".into())));
        let builtins = BuiltIns::new();
        let cube = ModuleInvocation::new(&builtins.find_by_name("cube").unwrap()).unwrap();
        let graph = GraphBuilder::main()
            .add(start, "start", (0.0, 0.0))
            .add(end, "end", (100.0, 0.0))
            .add(cube, "cube", (50.0, 0.0))
            .connect("cube", 0, "end", 0)
            .build()
            .unwrap();
        let text = render_graph(&graph, &builtins, &RenderSettings::default()).unwrap();
        assert_eq!(text, "for(i = []) {\n    cube();\n}");
    }

    #[test]
    fn test_intersection_for_and_synthetic_names() {
        let (start, mut end) = linked(ScopeFlavor::ForLoop);
        end.set_intersect(true).unwrap();
        let graph = GraphBuilder::main()
            .add(start, "start", (0.0, 0.0))
            .add(end, "end", (100.0, 0.0))
            .build()
            .unwrap();
        let text = render_graph(&graph, &BuiltIns::new(), &RenderSettings::default()).unwrap();
        assert_eq!(text, "intersection_for(var_start_0 = []) {}");
        assert!(ScopeEnd::new(ScopeFlavor::LetBlock).set_intersect(true).is_err());
    }

    #[test]
    fn test_let_expression_binds_values() {
        let (start, end) = linked(ScopeFlavor::LetExpression);
        let graph = GraphBuilder::main()
            .add(start, "start", (0.0, 0.0))
            .add(end, "end", (100.0, 0.0))
            .add(ConstantValue::number(2.0), "two", (-50.0, 0.0))
            .connect("two", 0, "start", 0)
            .connect("start", 0, "end", 0)
            .build()
            .unwrap();
        let builtins = BuiltIns::new();
        let settings = RenderSettings::default();
        let ctx = RenderContext::new(&graph, &builtins, &settings);
        let end = graph.by_id("end").unwrap();
        assert_eq!(end.render(&ctx, 0).unwrap(), "(let(var_start_0 = 2) var_start_0)");
    }

    #[test]
    fn test_for_comprehension_inside_vector() {
        let (start, end) = linked(ScopeFlavor::ForComprehension);
        let graph = GraphBuilder::main()
            .add(start, "start", (0.0, 0.0))
            .add(end, "end", (100.0, 0.0))
            .add(ConstructVector::new(), "vec", (200.0, 0.0))
            .connect("start", 0, "end", 0)
            .connect("end", 0, "vec", 0)
            .build()
            .unwrap();
        let builtins = BuiltIns::new();
        let settings = RenderSettings::default();
        let ctx = RenderContext::new(&graph, &builtins, &settings);
        let vec = graph.by_id("vec").unwrap();
        assert_eq!(
            vec.render(&ctx, 0).unwrap(),
            "[for(var_start_0 = []) var_start_0, undef]"
        );
    }

    #[test]
    fn test_arity_floor_and_dangling_partner() {
        let (mut start, end) = linked(ScopeFlavor::LetBlock);
        assert!(start.remove_input().is_err());
        start.add_input().unwrap();
        assert_eq!(start.input_count(), 2);
        assert_eq!(start.output_count(), 2);

        let graph = GraphBuilder::main().add(end, "end", (0.0, 0.0)).build().unwrap();
        let err = render_graph(&graph, &BuiltIns::new(), &RenderSettings::default()).unwrap_err();
        assert!(matches!(err, ScadGraphError::InvariantViolation(_)));
    }
}
