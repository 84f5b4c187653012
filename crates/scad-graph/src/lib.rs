//! Scad Graph - visual node-graph core for OpenSCAD programs
//!
//! This crate holds the editable model behind a node-based OpenSCAD editor
//! and turns it into OpenSCAD source text. It supports:
//!
//! - Typed ports with optional inline literals
//! - Node kinds advertised through capability traits
//! - A connection rule engine with Allow/Veto/Undecided aggregation
//! - Transactional refactorings with late, deduplicated fixups
//! - Deterministic rendering to OpenSCAD text
//! - JSON persistence and compressed snapshot history
//!
//! # Architecture
//!
//! - `ScadProject`: main module, function and module graphs, variables
//! - `ConnectionRules`: decides whether a connection may be made or removed
//! - `Refactoring`: the only way a project is mutated
//! - `Workspace`: runs refactorings as transactions and keeps history
//!
//! # Example
//!
//! ```ignore
//! let mut ws = Workspace::new(
//!     ScadProject::new(Arc::new(BuiltIns::new())),
//!     ConnectionRules::standard(),
//!     EditorConfig::default(),
//! )?;
//! ws.perform_one("Add cube", AddNode::new(MAIN_MODULE_ID, cube))?;
//! println!("{}", ws.render()?);
//! ```

pub mod builder;
pub mod builtins;
pub mod config;
pub mod error;
pub mod factory;
pub mod graph;
pub mod history;
pub mod library;
pub mod literal;
pub mod modifier;
pub mod node;
pub mod nodes;
pub mod persistence;
pub mod port;
pub mod project;
pub mod refactoring;
pub mod render;
pub mod rules;
pub mod validation;
pub mod workspace;

// Re-export key types
pub use builder::GraphBuilder;
pub use builtins::BuiltIns;
pub use config::{EditorConfig, HistorySettings, RenderSettings};
pub use error::{Result, ScadGraphError};
pub use factory::NodeFactory;
pub use graph::{Connection, GraphId, ScadGraph};
pub use history::HistoryStack;
pub use library::{
    InvokableDescription, InvokableKind, ParameterDescription, VariableDescription, MAIN_MODULE_ID,
};
pub use literal::{Literal, LiteralKind, LiteralValue};
pub use modifier::Modifiers;
pub use node::{NodeCore, NodeId, ScadNode};
pub use persistence::{SavedGraph, SavedNode, SavedProject, SavedValue};
pub use port::{PortDefinition, PortDirection, PortId, PortType};
pub use project::{ExternalReference, ReferenceMode, ReferenceResolver, ScadProject, Usage};
pub use refactoring::{Refactoring, RefactoringContext};
pub use rules::{ConnectionRule, ConnectionRules, Decision, RuleFlags, RuleOutcome};
pub use validation::{validate_graph, validate_project, ValidationError};
pub use workspace::Workspace;
