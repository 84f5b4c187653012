//! Port types, port identity and port definitions
//!
//! Every node exposes an ordered list of input ports and an ordered list of
//! output ports. A port is addressed by [`PortId`] (direction + index) and
//! described by a [`PortDefinition`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::literal::LiteralKind;

/// The data type flowing through a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortType {
    /// Statement sequencing
    Flow,
    /// CSG children
    Geometry,
    Any,
    Number,
    Boolean,
    String,
    Array,
    Vector,
    Vector2,
    Vector3,
}

impl PortType {
    /// All port types, in declaration order
    pub const ALL: [PortType; 10] = [
        PortType::Flow,
        PortType::Geometry,
        PortType::Any,
        PortType::Number,
        PortType::Boolean,
        PortType::String,
        PortType::Array,
        PortType::Vector,
        PortType::Vector2,
        PortType::Vector3,
    ];

    /// Everything except Flow and Geometry carries a value
    pub fn is_expression_type(self) -> bool {
        !matches!(self, PortType::Flow | PortType::Geometry)
    }

    /// Whether an output of this type may feed an input of `target` type.
    ///
    /// Node-specific allowances (switchable operators) are layered on top of
    /// this by the rule engine.
    pub fn is_assignable_to(self, target: PortType) -> bool {
        if self == target {
            return true;
        }
        if !self.is_expression_type() || !target.is_expression_type() {
            return false;
        }
        match (self, target) {
            (PortType::Any, _) | (_, PortType::Any) => true,
            (PortType::Vector | PortType::Vector2 | PortType::Vector3, PortType::Array) => true,
            (PortType::Vector2 | PortType::Vector3, PortType::Vector) => true,
            _ => false,
        }
    }

    /// The literal editor matching this port type
    pub fn literal_kind(self) -> LiteralKind {
        match self {
            PortType::Number => LiteralKind::Number,
            PortType::Boolean => LiteralKind::Boolean,
            PortType::String => LiteralKind::String,
            PortType::Vector2 => LiteralKind::Vector2,
            PortType::Vector3 => LiteralKind::Vector3,
            _ => LiteralKind::None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PortType::Flow => "Flow",
            PortType::Geometry => "Geometry",
            PortType::Any => "Any",
            PortType::Number => "Number",
            PortType::Boolean => "Boolean",
            PortType::String => "String",
            PortType::Array => "Array",
            PortType::Vector => "Vector",
            PortType::Vector2 => "Vector2",
            PortType::Vector3 => "Vector3",
        }
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Direction of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortDirection {
    Input,
    Output,
}

/// Identity of a port on a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortId {
    pub direction: PortDirection,
    pub index: usize,
}

impl PortId {
    pub fn input(index: usize) -> Self {
        Self {
            direction: PortDirection::Input,
            index,
        }
    }

    pub fn output(index: usize) -> Self {
        Self {
            direction: PortDirection::Output,
            index,
        }
    }

    pub fn is_input(&self) -> bool {
        self.direction == PortDirection::Input
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            PortDirection::Input => write!(f, "in[{}]", self.index),
            PortDirection::Output => write!(f, "out[{}]", self.index),
        }
    }
}

/// Editor hint for rendering a literal widget
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderHint {
    #[default]
    None,
    FileInput,
    FontInput,
}

/// Definition of a port on a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortDefinition {
    /// Type carried by the port
    pub port_type: PortType,
    /// Literal editor kind; `None` means the port never holds a literal
    pub literal_kind: LiteralKind,
    /// Display name
    pub name: String,
    /// Serialized default used when the literal is first built
    pub default_value: Option<String>,
    /// Literal is switched off on connect and back on when the last connection leaves
    pub auto_set_literal: bool,
    #[serde(default)]
    pub render_hint: RenderHint,
}

impl PortDefinition {
    /// Port with a literal matching its type that toggles with connections
    pub fn with_literal(port_type: PortType, name: impl Into<String>) -> Self {
        Self {
            port_type,
            literal_kind: port_type.literal_kind(),
            name: name.into(),
            default_value: None,
            auto_set_literal: true,
            render_hint: RenderHint::None,
        }
    }

    /// Port with no literal
    pub fn plain(port_type: PortType, name: impl Into<String>) -> Self {
        Self {
            port_type,
            literal_kind: LiteralKind::None,
            name: name.into(),
            default_value: None,
            auto_set_literal: false,
            render_hint: RenderHint::None,
        }
    }

    /// Any-typed output whose literal holds a user-chosen variable name
    pub fn named_output(name: impl Into<String>) -> Self {
        Self {
            port_type: PortType::Any,
            literal_kind: LiteralKind::Name,
            name: name.into(),
            default_value: None,
            auto_set_literal: false,
            render_hint: RenderHint::None,
        }
    }

    pub fn geometry(name: impl Into<String>) -> Self {
        Self::plain(PortType::Geometry, name)
    }

    pub fn flow(name: impl Into<String>) -> Self {
        Self::plain(PortType::Flow, name)
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Keep the literal set regardless of connections
    pub fn manual_literal(mut self) -> Self {
        self.auto_set_literal = false;
        self
    }

    pub fn with_render_hint(mut self, hint: RenderHint) -> Self {
        self.render_hint = hint;
        self
    }

    /// Same port retyped; the literal kind follows the new type
    pub fn retyped(&self, port_type: PortType) -> Self {
        let mut def = self.clone();
        def.port_type = port_type;
        if self.literal_kind != LiteralKind::Name {
            def.literal_kind = port_type.literal_kind();
        }
        def
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_any_is_bidirectional_for_expressions() {
        for t in PortType::ALL.iter().filter(|t| t.is_expression_type()) {
            assert!(PortType::Any.is_assignable_to(*t), "Any -> {}", t);
            assert!(t.is_assignable_to(PortType::Any), "{} -> Any", t);
        }
        assert!(!PortType::Any.is_assignable_to(PortType::Geometry));
        assert!(!PortType::Flow.is_assignable_to(PortType::Any));
    }

    #[test]
    fn test_vectors_assign_to_lists() {
        assert!(PortType::Vector3.is_assignable_to(PortType::Array));
        assert!(PortType::Vector2.is_assignable_to(PortType::Vector));
        assert!(PortType::Vector.is_assignable_to(PortType::Array));
        assert!(!PortType::Array.is_assignable_to(PortType::Vector3));
        assert!(!PortType::Number.is_assignable_to(PortType::String));
    }

    #[test]
    fn test_retyped_follows_literal_kind() {
        let def = PortDefinition::with_literal(PortType::Any, "A");
        assert_eq!(def.literal_kind, LiteralKind::None);
        let def = def.retyped(PortType::Number);
        assert_eq!(def.literal_kind, LiteralKind::Number);
        assert!(def.auto_set_literal);

        let name = PortDefinition::named_output("i").retyped(PortType::Number);
        assert_eq!(name.literal_kind, LiteralKind::Name);
    }

    #[test]
    fn test_port_id_equality() {
        assert_eq!(PortId::input(1), PortId::input(1));
        assert_ne!(PortId::input(1), PortId::output(1));
        assert_eq!(PortId::output(2).to_string(), "out[2]");
    }
}
