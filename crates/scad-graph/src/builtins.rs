//! Built-in OpenSCAD library catalogue
//!
//! An immutable table of the language's modules and functions. Construct it
//! once and hand it to projects as their parent resolver.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::factory::NodeFactory;
use crate::library::{InvokableDescription, ParameterDescription, VariableDescription};
use crate::port::PortType;
use crate::project::ReferenceResolver;

/// Id prefix of every built-in description
pub const BUILTIN_PREFIX: &str = "builtin:";

fn param(name: &str, port_type: PortType) -> ParameterDescription {
    ParameterDescription::new(name, port_type)
}

fn opt(name: &str, port_type: PortType) -> ParameterDescription {
    ParameterDescription::new(name, port_type).optional()
}

struct Entry {
    name: &'static str,
    description: &'static str,
    parameters: Vec<ParameterDescription>,
}

fn entry(name: &'static str, description: &'static str, parameters: Vec<ParameterDescription>) -> Entry {
    Entry {
        name,
        description,
        parameters,
    }
}

/// Fixed catalogue of built-in modules, functions and constants
#[derive(Debug)]
pub struct BuiltIns {
    invokables: BTreeMap<String, Arc<InvokableDescription>>,
    variables: BTreeMap<String, Arc<VariableDescription>>,
}

impl Default for BuiltIns {
    fn default() -> Self {
        Self::new()
    }
}

impl BuiltIns {
    pub fn new() -> Self {
        use PortType::*;

        let mut catalogue = Self {
            invokables: BTreeMap::new(),
            variables: BTreeMap::new(),
        };

        let primitives = [
            entry("cube", "A cube or cuboid", vec![opt("size", Vector3), opt("center", Boolean)]),
            entry("sphere", "A sphere", vec![opt("r", Number), opt("d", Number), opt("$fn", Number)]),
            entry(
                "cylinder",
                "A cylinder or cone",
                vec![
                    opt("h", Number),
                    opt("r1", Number),
                    opt("r2", Number),
                    opt("r", Number),
                    opt("center", Boolean),
                    opt("$fn", Number),
                ],
            ),
            entry("square", "A square or rectangle", vec![opt("size", Vector2), opt("center", Boolean)]),
            entry("circle", "A circle", vec![opt("r", Number), opt("d", Number), opt("$fn", Number)]),
            entry("polygon", "A polygon", vec![param("points", Array), opt("paths", Array)]),
            entry(
                "text",
                "Text as 2D geometry",
                vec![param("text", String), opt("size", Number), opt("font", String)],
            ),
            entry("import", "Geometry from a file", vec![param("file", String)]),
        ];
        for e in primitives {
            catalogue.add_module(e, false);
        }

        let operations = [
            entry("translate", "Moves children", vec![param("v", Vector3)]),
            entry("rotate", "Rotates children", vec![param("a", Any), opt("v", Vector3)]),
            entry("scale", "Scales children", vec![param("v", Vector3)]),
            entry("mirror", "Mirrors children", vec![param("v", Vector3)]),
            entry("resize", "Resizes children", vec![param("newsize", Vector3)]),
            entry("color", "Colors children", vec![param("c", String), opt("alpha", Number)]),
            entry("union", "Union of children", vec![]),
            entry("intersection", "Intersection of children", vec![]),
            entry("hull", "Convex hull of children", vec![]),
            entry("minkowski", "Minkowski sum of children", vec![]),
            entry(
                "linear_extrude",
                "Extrudes 2D children",
                vec![param("height", Number), opt("center", Boolean), opt("twist", Number)],
            ),
            entry("rotate_extrude", "Revolves 2D children", vec![opt("angle", Number)]),
            entry("offset", "Offsets 2D children", vec![opt("r", Number), opt("delta", Number)]),
            entry("projection", "Projects children onto the XY plane", vec![opt("cut", Boolean)]),
        ];
        for e in operations {
            catalogue.add_module(e, true);
        }

        let numeric = [
            ("abs", "Absolute value"),
            ("sign", "Sign of a number"),
            ("sin", "Sine (degrees)"),
            ("cos", "Cosine (degrees)"),
            ("tan", "Tangent (degrees)"),
            ("asin", "Arc sine"),
            ("acos", "Arc cosine"),
            ("atan", "Arc tangent"),
            ("floor", "Round down"),
            ("ceil", "Round up"),
            ("round", "Round to nearest"),
            ("sqrt", "Square root"),
            ("exp", "Exponential"),
            ("ln", "Natural logarithm"),
        ];
        for (name, description) in numeric {
            catalogue.add_function(entry(name, description, vec![param("x", Number)]), Number);
        }
        catalogue.add_function(
            entry("pow", "Power", vec![param("base", Number), param("exponent", Number)]),
            Number,
        );
        catalogue.add_function(
            entry("atan2", "Two-argument arc tangent", vec![param("y", Number), param("x", Number)]),
            Number,
        );
        catalogue.add_function(entry("len", "Length of a list or string", vec![param("value", Any)]), Number);
        catalogue.add_function(entry("norm", "Euclidean norm", vec![param("v", Vector)]), Number);
        catalogue.add_function(entry("cross", "Cross product", vec![param("a", Vector3), param("b", Vector3)]), Vector3);
        catalogue.add_function(entry("min", "Minimum", vec![param("values", Any)]), Number);
        catalogue.add_function(entry("max", "Maximum", vec![param("values", Any)]), Number);
        catalogue.add_function(entry("str", "Convert to string", vec![param("value", Any)]), String);
        catalogue.add_function(entry("chr", "Characters from code points", vec![param("code", Number)]), String);
        catalogue.add_function(entry("ord", "Code point of a character", vec![param("char", String)]), Number);
        catalogue.add_function(
            entry("lookup", "Interpolated table lookup", vec![param("key", Number), param("table", Array)]),
            Number,
        );
        catalogue.add_function(
            entry(
                "rands",
                "Random numbers",
                vec![param("min", Number), param("max", Number), param("count", Number), opt("seed", Number)],
            ),
            Array,
        );
        catalogue.add_function(
            entry("search", "Search a list", vec![param("match", Any), param("list", Array)]),
            Array,
        );
        catalogue.add_function(entry("is_undef", "Whether a value is undef", vec![param("value", Any)]), Boolean);
        catalogue.add_function(entry("is_num", "Whether a value is a number", vec![param("value", Any)]), Boolean);
        catalogue.add_function(entry("is_list", "Whether a value is a list", vec![param("value", Any)]), Boolean);

        catalogue.add_variable("PI", Number);
        catalogue.add_variable("$fn", Number);
        catalogue.add_variable("$fa", Number);
        catalogue.add_variable("$fs", Number);
        catalogue.add_variable("$t", Number);

        catalogue
    }

    fn add_module(&mut self, entry: Entry, children: bool) {
        let mut description = InvokableDescription::module(entry.name)
            .with_id(format!("{}{}", BUILTIN_PREFIX, entry.name))
            .with_description(entry.description)
            .builtin();
        description.parameters = entry.parameters;
        if children {
            description = description.with_children();
        }
        self.invokables
            .insert(description.id.clone(), Arc::new(description));
    }

    fn add_function(&mut self, entry: Entry, returns: PortType) {
        let mut description = InvokableDescription::function(entry.name)
            .with_id(format!("{}{}", BUILTIN_PREFIX, entry.name))
            .with_description(entry.description)
            .returning(returns)
            .builtin();
        description.parameters = entry.parameters;
        self.invokables
            .insert(description.id.clone(), Arc::new(description));
    }

    fn add_variable(&mut self, name: &str, port_type: PortType) {
        let mut description = VariableDescription::new(name, port_type)
            .with_id(format!("{}{}", BUILTIN_PREFIX, name));
        description.is_external = true;
        self.variables
            .insert(description.id.clone(), Arc::new(description));
    }

    pub fn modules(&self) -> impl Iterator<Item = &Arc<InvokableDescription>> {
        self.invokables.values().filter(|d| d.is_module())
    }

    pub fn functions(&self) -> impl Iterator<Item = &Arc<InvokableDescription>> {
        self.invokables.values().filter(|d| d.is_function())
    }

    pub fn variables(&self) -> impl Iterator<Item = &Arc<VariableDescription>> {
        self.variables.values()
    }

    /// Language-level node kinds the factory can build without a description
    pub fn node_kinds(&self) -> &'static [&'static str] {
        NodeFactory::KINDS
    }

    pub fn find_by_name(&self, name: &str) -> Option<Arc<InvokableDescription>> {
        self.invokables.values().find(|d| d.name == name).cloned()
    }
}

impl ReferenceResolver for BuiltIns {
    fn resolve_invokable(&self, id: &str) -> Option<Arc<InvokableDescription>> {
        self.invokables.get(id).cloned()
    }

    fn resolve_variable(&self, id: &str) -> Option<Arc<VariableDescription>> {
        self.variables.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_contents() {
        let builtins = BuiltIns::new();
        let cube = builtins.require_invokable("builtin:cube").unwrap();
        assert!(cube.is_builtin);
        assert!(cube.is_module());
        assert!(!cube.supports_children());
        assert!(builtins
            .require_invokable("builtin:translate")
            .unwrap()
            .supports_children());
        assert_eq!(
            builtins.find_by_name("sin").unwrap().return_type(),
            Some(PortType::Number)
        );
        assert!(builtins.resolve_variable("builtin:PI").is_some());
        assert!(builtins.modules().all(|m| m.id.starts_with(BUILTIN_PREFIX)));
        assert!(builtins.functions().count() > 20);
    }

    #[test]
    fn test_node_kinds_are_buildable() {
        let builtins = BuiltIns::new();
        for kind in builtins.node_kinds() {
            assert!(NodeFactory::build(kind).is_ok(), "kind {}", kind);
        }
    }
}
