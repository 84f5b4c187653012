//! Node construction by kind key
//!
//! The factory is the only place that maps persisted kind strings to
//! concrete node types.

use crate::error::{Result, ScadGraphError};
use crate::library::InvokableDescription;
use crate::node::ScadNode;
use crate::nodes::comprehension::{Concat, ConstructVector, Each, FilterIf};
use crate::nodes::constants::ConstantValue;
use crate::nodes::csg::Difference;
use crate::nodes::entry_point::{FunctionEntryPoint, FunctionReturn, ModuleEntryPoint};
use crate::nodes::functions::{Cast, ConstructRange, IndexVector, StringEnum, VariadicCall, VariadicFunction};
use crate::nodes::helpers::{Comment, Reroute};
use crate::nodes::invocation::{FunctionInvocation, ModuleInvocation};
use crate::nodes::operators::{
    BinaryOperator, BinaryOperatorNode, Sum, TernaryOperator, UnaryOperator, UnaryOperatorNode,
};
use crate::nodes::scopes::{bound_pair, ScopeEnd, ScopeFlavor, ScopeStart};
use crate::nodes::statements::{Child, Children, Echo, GetVariable, ImportScadFile, SetVariable};
use crate::port::PortType;

/// Builds nodes
pub struct NodeFactory;

impl NodeFactory {
    /// Kinds that need no description to be built
    pub const KINDS: &'static [&'static str] = &[
        "constant",
        "binary_operator",
        "not",
        "negate",
        "ternary",
        "sum",
        "cast",
        "max",
        "min",
        "str",
        "chr",
        "construct_range",
        "index_vector",
        "string_enum",
        "difference",
        "each",
        "filter_if",
        "construct_vector",
        "concat",
        "echo",
        "children",
        "child",
        "comment",
        "reroute",
    ];

    /// A fresh, unbound node of a description-free kind
    pub fn build(kind: &str) -> Result<Box<dyn ScadNode>> {
        let node: Box<dyn ScadNode> = match kind {
            "constant" => Box::new(ConstantValue::new(PortType::Number)),
            "binary_operator" => Box::new(BinaryOperatorNode::new(BinaryOperator::Add)),
            "not" => Box::new(UnaryOperatorNode::new(UnaryOperator::Not)),
            "negate" => Box::new(UnaryOperatorNode::new(UnaryOperator::Negate)),
            "ternary" => Box::new(TernaryOperator::new()),
            "sum" => Box::new(Sum::new()),
            "cast" => Box::new(Cast::default()),
            "max" => Box::new(VariadicCall::new(VariadicFunction::Max)),
            "min" => Box::new(VariadicCall::new(VariadicFunction::Min)),
            "str" => Box::new(VariadicCall::new(VariadicFunction::Str)),
            "chr" => Box::new(VariadicCall::new(VariadicFunction::Chr)),
            "construct_range" => Box::new(ConstructRange::new()),
            "index_vector" => Box::new(IndexVector::new()),
            "string_enum" => Box::new(StringEnum::new()),
            "difference" => Box::new(Difference::new()),
            "each" => Box::new(Each::new()),
            "filter_if" => Box::new(FilterIf::new()),
            "construct_vector" => Box::new(ConstructVector::new()),
            "concat" => Box::new(Concat::new()),
            "echo" => Box::new(Echo::new()),
            "children" => Box::new(Children::new()),
            "child" => Box::new(Child::new()),
            "comment" => Box::new(Comment::new("")),
            "reroute" => Box::new(Reroute::new()),
            other => {
                return Err(ScadGraphError::invariant(format!(
                    "'{}' cannot be built without a description",
                    other
                )))
            }
        };
        Ok(node)
    }

    /// A node to restore a persisted record into; state comes later
    pub fn blank(kind: &str) -> Result<Box<dyn ScadNode>> {
        if let Ok(node) = Self::build(kind) {
            return Ok(node);
        }
        let node: Box<dyn ScadNode> = match kind {
            "module_invocation" => Box::new(ModuleInvocation::unbound()),
            "function_invocation" => Box::new(FunctionInvocation::unbound()),
            "module_entry_point" => Box::new(ModuleEntryPoint::unbound()),
            "function_entry_point" => Box::new(FunctionEntryPoint::unbound()),
            "function_return" => Box::new(FunctionReturn::unbound()),
            "set_variable" => Box::new(SetVariable::unbound()),
            "get_variable" => Box::new(GetVariable::unbound()),
            "import_scad_file" => Box::new(ImportScadFile::unbound()),
            other => {
                let scope = ScopeFlavor::ALL.iter().find_map(|flavor| {
                    if flavor.start_kind() == other {
                        Some(Box::new(ScopeStart::new(*flavor)) as Box<dyn ScadNode>)
                    } else if flavor.end_kind() == other {
                        Some(Box::new(ScopeEnd::new(*flavor)) as Box<dyn ScadNode>)
                    } else {
                        None
                    }
                });
                return scope
                    .ok_or_else(|| ScadGraphError::broken(format!("unknown node kind '{}'", other)));
            }
        };
        Ok(node)
    }

    /// Call node for a function or module
    pub fn invocation(description: &InvokableDescription) -> Result<Box<dyn ScadNode>> {
        if description.is_function() {
            Ok(Box::new(FunctionInvocation::new(description)?))
        } else if description.is_module() {
            Ok(Box::new(ModuleInvocation::new(description)?))
        } else {
            Err(ScadGraphError::invariant("the main module cannot be invoked"))
        }
    }

    /// Nodes every graph of this description starts with
    pub fn entry_nodes(description: &InvokableDescription) -> Result<Vec<Box<dyn ScadNode>>> {
        if description.is_module() {
            Ok(vec![Box::new(ModuleEntryPoint::new(description)?)])
        } else if description.is_function() {
            let mut entry = FunctionEntryPoint::new(description)?;
            let mut ret = FunctionReturn::new(description)?;
            entry.core_mut().position = (0.0, 0.0);
            ret.core_mut().position = (400.0, 0.0);
            Ok(vec![Box::new(entry), Box::new(ret)])
        } else {
            Ok(Vec::new())
        }
    }

    /// Linked start and end of a scope
    pub fn bound_pair(flavor: ScopeFlavor) -> (Box<dyn ScadNode>, Box<dyn ScadNode>) {
        let (start, end) = bound_pair(flavor);
        (Box::new(start), Box::new(end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_key_round_trips() {
        for kind in NodeFactory::KINDS {
            assert_eq!(NodeFactory::build(kind).unwrap().kind(), *kind);
        }
        for flavor in ScopeFlavor::ALL {
            assert_eq!(NodeFactory::blank(flavor.start_kind()).unwrap().kind(), flavor.start_kind());
            assert_eq!(NodeFactory::blank(flavor.end_kind()).unwrap().kind(), flavor.end_kind());
        }
        assert_eq!(
            NodeFactory::blank("module_invocation").unwrap().kind(),
            "module_invocation"
        );
        assert_eq!(
            NodeFactory::blank("import_scad_file").unwrap().kind(),
            "import_scad_file"
        );
    }

    #[test]
    fn test_unknown_kind() {
        assert!(matches!(
            NodeFactory::blank("warp_drive"),
            Err(ScadGraphError::BrokenFile(_))
        ));
        assert!(matches!(
            NodeFactory::build("module_invocation"),
            Err(ScadGraphError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_entry_nodes_per_kind() {
        assert_eq!(
            NodeFactory::entry_nodes(&InvokableDescription::function("f")).unwrap().len(),
            2
        );
        assert_eq!(
            NodeFactory::entry_nodes(&InvokableDescription::module("m")).unwrap().len(),
            1
        );
        assert!(NodeFactory::entry_nodes(&InvokableDescription::main_module())
            .unwrap()
            .is_empty());
        assert!(NodeFactory::invocation(&InvokableDescription::main_module()).is_err());
    }

    #[test]
    fn test_bound_pair_is_linked() {
        let (start, end) = NodeFactory::bound_pair(ScopeFlavor::LetBlock);
        assert_eq!(start.as_bound().unwrap().other_node_id(), end.id());
        assert_eq!(end.as_bound().unwrap().other_node_id(), start.id());
        assert!(start.as_bound().unwrap().is_start());
    }
}
