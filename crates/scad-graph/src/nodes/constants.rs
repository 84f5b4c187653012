//! Literal value producers

use crate::error::{Result, ScadGraphError};
use crate::literal::{Literal, LiteralValue};
use crate::node::{NodeCore, ScadNode};
use crate::nodes::{port_type_key, saved_port_type};
use crate::persistence::SavedNode;
use crate::port::{PortDefinition, PortId, PortType};
use crate::project::ReferenceResolver;
use crate::render::RenderContext;

/// Port types a constant can hold
pub const CONSTANT_TYPES: [PortType; 5] = [
    PortType::Number,
    PortType::String,
    PortType::Boolean,
    PortType::Vector2,
    PortType::Vector3,
];

/// Expression whose value is the literal on its only output
#[derive(Debug, Clone)]
pub struct ConstantValue {
    core: NodeCore,
    value_type: PortType,
}

impl ConstantValue {
    pub fn new(value_type: PortType) -> Self {
        let mut node = Self {
            core: NodeCore::new(),
            value_type,
        };
        node.build_ports();
        node
    }

    fn build_ports(&mut self) {
        self.core.declare_ports(
            Vec::new(),
            vec![PortDefinition::with_literal(self.value_type, "Value")],
        );
    }

    pub fn number(value: f64) -> Self {
        Self::holding(PortType::Number, LiteralValue::Number(value))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::holding(PortType::String, LiteralValue::String(value.into()))
    }

    pub fn boolean(value: bool) -> Self {
        Self::holding(PortType::Boolean, LiteralValue::Boolean(value))
    }

    pub fn vector2(value: [f64; 2]) -> Self {
        Self::holding(PortType::Vector2, LiteralValue::Vector2(value))
    }

    pub fn vector3(value: [f64; 3]) -> Self {
        Self::holding(PortType::Vector3, LiteralValue::Vector3(value))
    }

    fn holding(value_type: PortType, value: LiteralValue) -> Self {
        let mut node = Self::new(value_type);
        node.core.replace_literal(PortId::output(0), Literal::set(value));
        node
    }

    pub fn value_type(&self) -> PortType {
        self.value_type
    }
}

impl ScadNode for ConstantValue {
    crate::node_boilerplate!("constant");

    fn title(&self) -> String {
        format!("{} value", self.value_type)
    }

    fn render(&self, _ctx: &RenderContext<'_>, _port: usize) -> Result<String> {
        Ok(self
            .core
            .literal(PortId::output(0))
            .map(|l| l.render())
            .unwrap_or_else(|| "undef".to_string()))
    }

    fn is_expression(&self) -> bool {
        true
    }

    fn save_state(&self, record: &mut SavedNode) {
        record.set_str("value_type", port_type_key(self.value_type));
    }

    fn restore_state(&mut self, record: &SavedNode, _resolver: &dyn ReferenceResolver) -> Result<()> {
        let value_type = saved_port_type(record, "value_type")?;
        if !CONSTANT_TYPES.contains(&value_type) {
            return Err(ScadGraphError::broken(format!(
                "a constant cannot hold a {} value",
                value_type
            )));
        }
        self.value_type = value_type;
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

    fn render(node: &ConstantValue) -> String {
        let graph = GraphBuilder::main().build().unwrap();
        let builtins = BuiltIns::new();
        let settings = RenderSettings::default();
        let ctx = RenderContext::new(&graph, &builtins, &settings);
        node.render(&ctx, 0).unwrap()
    }

    #[test]
    fn test_constants_render_their_literal() {
        assert_eq!(render(&ConstantValue::number(2.5)), "2.5");
        assert_eq!(render(&ConstantValue::string("a\"b")), "\"a\\\"b\"");
        assert_eq!(render(&ConstantValue::boolean(true)), "true");
        assert_eq!(render(&ConstantValue::vector2([1.0, -1.0])), "[1, -1]");
        assert_eq!(render(&ConstantValue::new(PortType::Number)), "0");
    }

    #[test]
    fn test_restore_rejects_untyped_constant() {
        let mut record = SavedNode::new("c", "constant", (0.0, 0.0));
        record.set_str("value_type", "geometry");
        let mut node = ConstantValue::new(PortType::Number);
        let err = node
            .restore_state(&record, &crate::project::EmptyResolver)
            .unwrap_err();
        assert!(matches!(err, ScadGraphError::BrokenFile(_)));
    }
}
