//! Node abstraction
//!
//! A node is one element of a graph: a statement, an expression, a scope
//! boundary or an editor helper. All nodes share a [`NodeCore`] holding id,
//! ports, literals, position and modifiers. Behaviour beyond that is
//! expressed through capability traits that a node kind opts into by
//! overriding the matching `as_*` accessor on [`ScadNode`].

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Result, ScadGraphError};
use crate::library::{InvokableDescription, VariableDescription};
use crate::literal::{Literal, LiteralKind};
use crate::modifier::Modifiers;
use crate::persistence::SavedNode;
use crate::port::{PortDefinition, PortDirection, PortId, PortType};
use crate::project::ReferenceResolver;
use crate::render::RenderContext;

/// Unique identifier for a node within its graph
pub type NodeId = String;

pub(crate) fn new_node_id() -> NodeId {
    uuid::Uuid::new_v4().to_string()
}

/// State shared by every node kind
#[derive(Debug, Clone, PartialEq)]
pub struct NodeCore {
    id: NodeId,
    /// Canvas position; orders render roots
    pub position: (f64, f64),
    inputs: Vec<PortDefinition>,
    outputs: Vec<PortDefinition>,
    input_literals: BTreeMap<usize, Literal>,
    output_literals: BTreeMap<usize, Literal>,
    pub modifiers: Modifiers,
    pub color: Option<String>,
}

impl Default for NodeCore {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeCore {
    /// Fresh core with a random id and no ports
    pub fn new() -> Self {
        Self {
            id: new_node_id(),
            position: (0.0, 0.0),
            inputs: Vec::new(),
            outputs: Vec::new(),
            input_literals: BTreeMap::new(),
            output_literals: BTreeMap::new(),
            modifiers: Modifiers::NONE,
            color: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn set_id(&mut self, id: impl Into<NodeId>) {
        self.id = id.into();
    }

    pub fn inputs(&self) -> &[PortDefinition] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[PortDefinition] {
        &self.outputs
    }

    pub fn port_count(&self, direction: PortDirection) -> usize {
        match direction {
            PortDirection::Input => self.inputs.len(),
            PortDirection::Output => self.outputs.len(),
        }
    }

    pub fn port_definition(&self, port: PortId) -> Option<&PortDefinition> {
        match port.direction {
            PortDirection::Input => self.inputs.get(port.index),
            PortDirection::Output => self.outputs.get(port.index),
        }
    }

    pub fn port_type(&self, port: PortId) -> Option<PortType> {
        self.port_definition(port).map(|d| d.port_type)
    }

    fn literals(&self, direction: PortDirection) -> &BTreeMap<usize, Literal> {
        match direction {
            PortDirection::Input => &self.input_literals,
            PortDirection::Output => &self.output_literals,
        }
    }

    fn literals_mut(&mut self, direction: PortDirection) -> &mut BTreeMap<usize, Literal> {
        match direction {
            PortDirection::Input => &mut self.input_literals,
            PortDirection::Output => &mut self.output_literals,
        }
    }

    pub fn literal(&self, port: PortId) -> Option<&Literal> {
        self.literals(port.direction).get(&port.index)
    }

    pub fn literal_mut(&mut self, port: PortId) -> Option<&mut Literal> {
        self.literals_mut(port.direction).get_mut(&port.index)
    }

    /// Replace a port definition; the literal is rebuilt when its kind changes,
    /// keeping the previous `is_set` flag.
    pub fn set_port_definition(&mut self, port: PortId, definition: PortDefinition) -> Result<()> {
        let slot = match port.direction {
            PortDirection::Input => self.inputs.get_mut(port.index),
            PortDirection::Output => self.outputs.get_mut(port.index),
        }
        .ok_or_else(|| {
            ScadGraphError::invariant(format!("node '{}' has no port {}", self.id, port))
        })?;
        let kind_changed = slot.literal_kind != definition.literal_kind;
        *slot = definition;
        if kind_changed {
            let was_set = self.literal(port).map(|l| l.is_set);
            self.drop_port_literal(port);
            self.build_port_literal(port)?;
            if let (Some(was_set), Some(lit)) = (was_set, self.literal_mut(port)) {
                lit.is_set = was_set;
            }
        }
        Ok(())
    }

    /// Build the literal matching the port's definition.
    ///
    /// The new literal starts set when the port auto-sets, and takes the
    /// definition's default value if one is given.
    pub fn build_port_literal(&mut self, port: PortId) -> Result<()> {
        let Some(def) = self.port_definition(port) else {
            return Err(ScadGraphError::invariant(format!(
                "node '{}' has no port {}",
                self.id, port
            )));
        };
        match port_literal(def)? {
            Some(literal) => {
                self.literals_mut(port.direction).insert(port.index, literal);
            }
            None => self.drop_port_literal(port),
        }
        Ok(())
    }

    pub(crate) fn replace_literal(&mut self, port: PortId, literal: Literal) {
        self.literals_mut(port.direction).insert(port.index, literal);
    }

    pub fn drop_port_literal(&mut self, port: PortId) {
        self.literals_mut(port.direction).remove(&port.index);
    }

    /// Replace both port lists.
    ///
    /// Literals at indices that survive keep their value when the literal kind
    /// is unchanged; literals at removed indices are discarded. Connections on
    /// removed ports must be detached by the caller first. Fails without
    /// touching the node when a default value does not parse.
    pub fn set_ports(
        &mut self,
        inputs: Vec<PortDefinition>,
        outputs: Vec<PortDefinition>,
    ) -> Result<()> {
        for def in inputs.iter().chain(&outputs) {
            port_literal(def)?;
        }
        self.declare_ports(inputs, outputs);
        Ok(())
    }

    /// Replace both port lists with definitions written in code.
    ///
    /// Same literal handling as [`NodeCore::set_ports`], except that a
    /// default which does not parse leaves the literal at its kind's zero value.
    pub fn declare_ports(&mut self, inputs: Vec<PortDefinition>, outputs: Vec<PortDefinition>) {
        self.inputs = inputs;
        self.outputs = outputs;
        for direction in [PortDirection::Input, PortDirection::Output] {
            self.reconcile_literals(direction);
        }
    }

    fn reconcile_literals(&mut self, direction: PortDirection) {
        let count = self.port_count(direction);
        self.literals_mut(direction).retain(|index, _| *index < count);
        for index in 0..count {
            let port = PortId { direction, index };
            let Some(def) = self.port_definition(port) else {
                continue;
            };
            let existing = self.literal(port).map(|l| (l.kind(), l.is_set));
            if matches!(existing, Some((have, _)) if have == def.literal_kind) {
                continue;
            }
            let fresh = port_literal(def).unwrap_or_else(|e| {
                log::warn!(
                    "node '{}': ignoring default of port '{}': {}",
                    self.id,
                    def.name,
                    e
                );
                blank_literal(def)
            });
            match fresh {
                Some(mut literal) => {
                    if let Some((_, was_set)) = existing {
                        literal.is_set = was_set;
                    }
                    self.literals_mut(direction).insert(index, literal);
                }
                None => self.drop_port_literal(port),
            }
        }
    }

    /// Rebuild every literal from scratch (discarding values)
    pub(crate) fn rebuild_all_literals(&mut self) -> Result<()> {
        self.input_literals.clear();
        self.output_literals.clear();
        for direction in [PortDirection::Input, PortDirection::Output] {
            for index in 0..self.port_count(direction) {
                self.build_port_literal(PortId { direction, index })?;
            }
        }
        Ok(())
    }

    /// Move literals to new indices; unmapped ones are dropped
    pub fn remap_literals(
        &mut self,
        direction: PortDirection,
        map: impl Fn(usize) -> Option<usize>,
    ) {
        let old = std::mem::take(self.literals_mut(direction));
        let remapped = old
            .into_iter()
            .filter_map(|(index, literal)| map(index).map(|new| (new, literal)))
            .collect();
        *self.literals_mut(direction) = remapped;
    }

    /// Swap the literals of two ports of the same direction
    pub fn swap_literals(&mut self, direction: PortDirection, a: usize, b: usize) {
        let literals = self.literals_mut(direction);
        let la = literals.remove(&a);
        let lb = literals.remove(&b);
        if let Some(l) = la {
            literals.insert(b, l);
        }
        if let Some(l) = lb {
            literals.insert(a, l);
        }
    }
}

fn blank_literal(def: &PortDefinition) -> Option<Literal> {
    Literal::new(def.literal_kind).map(|mut l| {
        l.is_set = def.auto_set_literal;
        l
    })
}

/// Literal a fresh port of this definition starts with
fn port_literal(def: &PortDefinition) -> Result<Option<Literal>> {
    if def.literal_kind == LiteralKind::None {
        return Ok(None);
    }
    match &def.default_value {
        Some(default) => Ok(Some(Literal::from_serialized(
            def.literal_kind,
            default,
            def.auto_set_literal,
        )?)),
        None => Ok(blank_literal(def)),
    }
}

/// A node in a graph.
///
/// Implementors provide their core, title and render rule; every capability
/// defaults to "not supported".
pub trait ScadNode: fmt::Debug + Send + Sync + 'static {
    /// Stable key used by the factory and persistence
    fn kind(&self) -> &'static str;

    fn core(&self) -> &NodeCore;

    fn core_mut(&mut self) -> &mut NodeCore;

    fn title(&self) -> String;

    fn description(&self) -> String {
        String::new()
    }

    /// Render the value or statement produced at output `port`
    fn render(&self, ctx: &RenderContext<'_>, port: usize) -> Result<String>;

    fn clone_node(&self) -> Box<dyn ScadNode>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    /// Write kind-specific state (arity, references, operand types)
    fn save_state(&self, _record: &mut SavedNode) {}

    /// Restore kind-specific state and rebuild ports accordingly
    fn restore_state(
        &mut self,
        _record: &SavedNode,
        _resolver: &dyn ReferenceResolver,
    ) -> Result<()> {
        Ok(())
    }

    fn id(&self) -> &str {
        self.core().id()
    }

    fn position(&self) -> (f64, f64) {
        self.core().position
    }

    fn port_type(&self, port: PortId) -> Option<PortType> {
        self.core().port_type(port)
    }

    fn input_count(&self) -> usize {
        self.core().inputs().len()
    }

    fn output_count(&self) -> usize {
        self.core().outputs().len()
    }

    /// Produces a value consumed inline by other nodes
    fn is_expression(&self) -> bool {
        false
    }

    /// Participates in Flow/Geometry sequencing
    fn is_statement(&self) -> bool {
        !self.is_expression() && !self.is_render_helper()
    }

    /// Comment and reroute nodes; never render roots
    fn is_render_helper(&self) -> bool {
        false
    }

    fn can_have_modifiers(&self) -> bool {
        false
    }

    fn can_be_deleted(&self) -> bool {
        true
    }

    /// Output restricted to list-comprehension and vector-construction consumers
    fn is_list_comprehension(&self) -> bool {
        false
    }

    fn is_vector_construction(&self) -> bool {
        false
    }

    /// Input that sums up every connection instead of superseding the last one
    fn accepts_multiple_inputs(&self, _port: usize) -> bool {
        false
    }

    fn as_variable_inputs(&self) -> Option<&dyn VariableInputs> {
        None
    }

    fn as_variable_inputs_mut(&mut self) -> Option<&mut dyn VariableInputs> {
        None
    }

    fn as_variable_outputs(&self) -> Option<&dyn VariableOutputs> {
        None
    }

    fn as_variable_outputs_mut(&mut self) -> Option<&mut dyn VariableOutputs> {
        None
    }

    fn as_bound(&self) -> Option<&dyn BoundNode> {
        None
    }

    fn as_bound_mut(&mut self) -> Option<&mut dyn BoundNode> {
        None
    }

    fn as_invokable_reference(&self) -> Option<&dyn InvokableReference> {
        None
    }

    fn as_invokable_reference_mut(&mut self) -> Option<&mut dyn InvokableReference> {
        None
    }

    fn as_variable_reference(&self) -> Option<&dyn VariableReference> {
        None
    }

    fn as_variable_reference_mut(&mut self) -> Option<&mut dyn VariableReference> {
        None
    }

    fn as_entry_point(&self) -> Option<&dyn EntryPoint> {
        None
    }
}

impl Clone for Box<dyn ScadNode> {
    fn clone(&self) -> Self {
        self.clone_node()
    }
}

/// Node whose trailing input ports form a growable list
pub trait VariableInputs {
    fn input_size(&self) -> usize;

    fn minimum_input_size(&self) -> usize {
        1
    }

    /// Index of the first variable input port
    fn first_variable_input(&self) -> usize {
        0
    }

    /// Index of the first output port mirroring the inputs, if outputs follow
    fn first_variable_output(&self) -> Option<usize> {
        None
    }

    fn add_input(&mut self) -> Result<()>;

    /// Drop the last variable slot. Connections on it must be gone already.
    fn remove_input(&mut self) -> Result<()>;

    fn add_title(&self) -> String {
        "Add input".to_string()
    }

    fn remove_title(&self) -> String {
        "Remove input".to_string()
    }
}

/// Node whose trailing output ports form a growable list
pub trait VariableOutputs {
    fn output_size(&self) -> usize;

    fn minimum_output_size(&self) -> usize {
        1
    }

    /// Index of the first variable output port
    fn first_variable_output(&self) -> usize {
        0
    }

    /// Index of the first input port mirroring the outputs, if inputs follow
    fn first_variable_input(&self) -> Option<usize> {
        None
    }

    fn add_output(&mut self) -> Result<()>;

    /// Drop the last variable output. Connections on it must be gone already.
    fn remove_output(&mut self) -> Result<()>;

    fn add_title(&self) -> String {
        "Add output".to_string()
    }

    fn remove_title(&self) -> String {
        "Remove output".to_string()
    }
}

/// One half of a start/end pair
pub trait BoundNode {
    fn other_node_id(&self) -> &str;

    fn set_other_node_id(&mut self, id: &str);

    fn is_start(&self) -> bool;
}

/// Node that refers to a function or module description
pub trait InvokableReference {
    fn invokable_id(&self) -> &str;

    fn set_invokable_id(&mut self, id: &str);

    /// Rebuild ports for the (possibly changed) description
    fn setup_ports(&mut self, description: &InvokableDescription) -> Result<()>;

    fn parameter_input_port(&self, _description: &InvokableDescription, _parameter: usize) -> Option<usize> {
        None
    }

    fn parameter_output_port(&self, _description: &InvokableDescription, _parameter: usize) -> Option<usize> {
        None
    }

    /// Input port carrying children geometry, if any
    fn children_input_port(&self, _description: &InvokableDescription) -> Option<usize> {
        None
    }

    /// Output port rendering `children()`, if any
    fn children_output_port(&self, _description: &InvokableDescription) -> Option<usize> {
        None
    }

    /// Ports whose type follows the function return type
    fn return_ports(&self) -> Vec<PortId> {
        Vec::new()
    }
}

/// Node that refers to a variable description
pub trait VariableReference {
    fn variable_id(&self) -> &str;

    fn set_variable_id(&mut self, id: &str);

    fn setup_ports(&mut self, description: &VariableDescription) -> Result<()>;
}

/// Node that wraps the rendered body of its graph
pub trait EntryPoint {
    fn render_entry_point(&self, ctx: &RenderContext<'_>, content: &str) -> Result<String>;
}

/// Implements the boilerplate half of [`ScadNode`] for a type with a `core` field
#[macro_export]
macro_rules! node_boilerplate {
    ($kind:expr) => {
        fn kind(&self) -> &'static str {
            $kind
        }

        fn core(&self) -> &$crate::node::NodeCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut $crate::node::NodeCore {
            &mut self.core
        }

        fn clone_node(&self) -> Box<dyn $crate::node::ScadNode> {
            Box::new(self.clone())
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::literal::LiteralValue;

    fn core_with(inputs: Vec<PortDefinition>) -> NodeCore {
        let mut core = NodeCore::new();
        core.set_ports(inputs, vec![PortDefinition::plain(PortType::Any, "Out")])
            .unwrap();
        core
    }

    #[test]
    fn test_set_ports_builds_literals_for_typed_ports() {
        let core = core_with(vec![
            PortDefinition::with_literal(PortType::Number, "A"),
            PortDefinition::plain(PortType::Any, "B"),
        ]);
        let lit = core.literal(PortId::input(0)).unwrap();
        assert_eq!(lit.kind(), LiteralKind::Number);
        assert!(lit.is_set);
        assert!(core.literal(PortId::input(1)).is_none());
        assert!(core.literal(PortId::output(0)).is_none());
    }

    #[test]
    fn test_rebuilding_ports_keeps_surviving_literals() {
        let mut core = core_with(vec![
            PortDefinition::with_literal(PortType::Number, "A"),
            PortDefinition::with_literal(PortType::Number, "B"),
        ]);
        core.literal_mut(PortId::input(0))
            .unwrap()
            .set_value(LiteralValue::Number(4.0))
            .unwrap();
        core.set_ports(
            vec![PortDefinition::with_literal(PortType::Number, "A")],
            vec![],
        )
        .unwrap();
        assert_eq!(core.literal(PortId::input(0)).unwrap().render(), "4");
        assert!(core.literal(PortId::input(1)).is_none());
    }

    #[test]
    fn test_switching_type_rebuilds_literal_and_keeps_flag() {
        let mut core = core_with(vec![PortDefinition::with_literal(PortType::Number, "A")]);
        core.literal_mut(PortId::input(0)).unwrap().is_set = false;
        let def = core.inputs()[0].retyped(PortType::String);
        core.set_port_definition(PortId::input(0), def).unwrap();
        let lit = core.literal(PortId::input(0)).unwrap();
        assert_eq!(lit.kind(), LiteralKind::String);
        assert!(!lit.is_set);
    }

    #[test]
    fn test_default_value_applies_on_build() {
        let core = core_with(vec![
            PortDefinition::with_literal(PortType::Vector3, "Size").with_default("[1,2,3]"),
        ]);
        assert_eq!(core.literal(PortId::input(0)).unwrap().render(), "[1, 2, 3]");
    }

    #[test]
    fn test_remap_and_swap_literals() {
        let mut core = core_with(vec![
            PortDefinition::with_literal(PortType::Number, "A").with_default("1"),
            PortDefinition::with_literal(PortType::Number, "B").with_default("2"),
        ]);
        core.swap_literals(PortDirection::Input, 0, 1);
        assert_eq!(core.literal(PortId::input(0)).unwrap().render(), "2");
        core.remap_literals(PortDirection::Input, |i| if i == 0 { None } else { Some(0) });
        assert_eq!(core.literal(PortId::input(0)).unwrap().render(), "1");
        assert!(core.literal(PortId::input(1)).is_none());
    }

    #[test]
    fn test_bad_default_rejected_before_any_change() {
        let mut core = core_with(vec![PortDefinition::with_literal(PortType::Number, "A")]);
        let err = core
            .set_ports(
                vec![PortDefinition::with_literal(PortType::Number, "A").with_default("wide")],
                vec![],
            )
            .unwrap_err();
        assert!(matches!(err, ScadGraphError::BrokenFile(_)));
        assert_eq!(core.outputs().len(), 1);

        core.declare_ports(
            vec![PortDefinition::with_literal(PortType::Vector2, "B").with_default("wide")],
            vec![],
        );
        assert_eq!(core.literal(PortId::input(0)).unwrap().render(), "[0, 0]");
        assert!(core.outputs().is_empty());
    }

    #[test]
    fn test_set_port_definition_out_of_range() {
        let mut core = core_with(vec![]);
        let err = core
            .set_port_definition(PortId::input(3), PortDefinition::plain(PortType::Any, "x"))
            .unwrap_err();
        assert!(matches!(err, ScadGraphError::InvariantViolation(_)));
    }
}
