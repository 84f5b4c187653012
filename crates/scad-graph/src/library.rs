//! Invokable and variable descriptions
//!
//! Descriptions are identity records that nodes refer to by id. They are
//! shared behind `Arc` between the owning graph/project and the resolver
//! chain; nodes only ever hold the id.

use serde::{Deserialize, Serialize};

use crate::literal::Literal;
use crate::port::PortType;

/// Id of a function, module or main module description
pub type InvokableId = String;

/// Id of a variable description
pub type VariableId = String;

/// Id of the implicit main module
pub const MAIN_MODULE_ID: &str = "<main>";

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// One parameter of a function or module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDescription {
    pub name: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub description: String,
    pub type_hint: PortType,
    #[serde(default)]
    pub optional: bool,
}

impl ParameterDescription {
    pub fn new(name: impl Into<String>, type_hint: PortType) -> Self {
        Self {
            name: name.into(),
            label: String::new(),
            description: String::new(),
            type_hint,
            optional: false,
        }
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Label if present, else the name
    pub fn display_name(&self) -> &str {
        if self.label.is_empty() {
            &self.name
        } else {
            &self.label
        }
    }
}

/// What kind of invokable a description names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InvokableKind {
    Function { return_type: PortType },
    Module { supports_children: bool },
    MainModule,
}

/// Identity and signature of a function, module or the main module
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvokableDescription {
    pub id: InvokableId,
    pub name: String,
    /// Title for invocation nodes; falls back to `name`
    #[serde(default)]
    pub node_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub parameters: Vec<ParameterDescription>,
    pub kind: InvokableKind,
    #[serde(default)]
    pub is_builtin: bool,
    #[serde(default)]
    pub is_external: bool,
}

impl InvokableDescription {
    fn with_kind(name: impl Into<String>, kind: InvokableKind) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            node_name: String::new(),
            description: String::new(),
            parameters: Vec::new(),
            kind,
            is_builtin: false,
            is_external: false,
        }
    }

    /// New function returning `Any`
    pub fn function(name: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            InvokableKind::Function {
                return_type: PortType::Any,
            },
        )
    }

    /// New module without children support
    pub fn module(name: impl Into<String>) -> Self {
        Self::with_kind(
            name,
            InvokableKind::Module {
                supports_children: false,
            },
        )
    }

    /// The implicit main module
    pub fn main_module() -> Self {
        let mut desc = Self::with_kind("<main>", InvokableKind::MainModule);
        desc.id = MAIN_MODULE_ID.to_string();
        desc
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_parameter(mut self, parameter: ParameterDescription) -> Self {
        self.parameters.push(parameter);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_node_name(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = node_name.into();
        self
    }

    /// Modules only; ignored for other kinds
    pub fn with_children(mut self) -> Self {
        if let InvokableKind::Module { supports_children } = &mut self.kind {
            *supports_children = true;
        }
        self
    }

    /// Functions only; ignored for other kinds
    pub fn returning(mut self, port_type: PortType) -> Self {
        if let InvokableKind::Function { return_type } = &mut self.kind {
            *return_type = port_type;
        }
        self
    }

    pub fn builtin(mut self) -> Self {
        self.is_builtin = true;
        self
    }

    pub fn is_function(&self) -> bool {
        matches!(self.kind, InvokableKind::Function { .. })
    }

    pub fn is_module(&self) -> bool {
        matches!(self.kind, InvokableKind::Module { .. })
    }

    pub fn is_main(&self) -> bool {
        matches!(self.kind, InvokableKind::MainModule)
    }

    pub fn return_type(&self) -> Option<PortType> {
        match self.kind {
            InvokableKind::Function { return_type } => Some(return_type),
            _ => None,
        }
    }

    pub fn supports_children(&self) -> bool {
        matches!(
            self.kind,
            InvokableKind::Module {
                supports_children: true
            }
        )
    }

    pub fn parameter_index(&self, name: &str) -> Option<usize> {
        self.parameters.iter().position(|p| p.name == name)
    }

    pub fn display_name(&self) -> &str {
        if self.node_name.is_empty() {
            &self.name
        } else {
            &self.node_name
        }
    }
}

/// Identity of a top-level variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDescription {
    pub id: VariableId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub type_hint: PortType,
    #[serde(default)]
    pub default_value: Option<Literal>,
    #[serde(default)]
    pub is_external: bool,
}

impl VariableDescription {
    pub fn new(name: impl Into<String>, type_hint: PortType) -> Self {
        Self {
            id: new_id(),
            name: name.into(),
            description: String::new(),
            type_hint,
            default_value: None,
            is_external: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_default(mut self, value: Literal) -> Self {
        self.default_value = Some(value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_respect_kind() {
        let f = InvokableDescription::function("area")
            .returning(PortType::Number)
            .with_children();
        assert_eq!(f.return_type(), Some(PortType::Number));
        assert!(!f.supports_children());

        let m = InvokableDescription::module("frame")
            .with_children()
            .returning(PortType::Number);
        assert!(m.supports_children());
        assert_eq!(m.return_type(), None);
    }

    #[test]
    fn test_fresh_ids_are_unique() {
        let a = InvokableDescription::module("a");
        let b = InvokableDescription::module("a");
        assert_ne!(a.id, b.id);
        assert_eq!(InvokableDescription::main_module().id, MAIN_MODULE_ID);
    }

    #[test]
    fn test_parameter_lookup_and_labels() {
        let desc = InvokableDescription::module("box")
            .with_parameter(ParameterDescription::new("size", PortType::Vector3).with_label("Size"))
            .with_parameter(ParameterDescription::new("center", PortType::Boolean).optional());
        assert_eq!(desc.parameter_index("center"), Some(1));
        assert_eq!(desc.parameters[0].display_name(), "Size");
        assert_eq!(desc.parameters[1].display_name(), "center");
        assert_eq!(desc.display_name(), "box");
    }

    #[test]
    fn test_description_json_shape() {
        let desc = InvokableDescription::function("f").with_id("f1");
        let json = serde_json::to_value(&desc).unwrap();
        assert_eq!(json["kind"]["type"], "function");
        assert_eq!(json["kind"]["return_type"], "any");
        let back: InvokableDescription = serde_json::from_value(json).unwrap();
        assert_eq!(back, desc);
    }
}
