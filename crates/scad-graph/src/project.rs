//! Project aggregation and reference resolution
//!
//! A [`ScadProject`] holds the main module graph plus one graph per function
//! and module, keyed by invokable id, and the project's variables. It
//! resolves ids project-local first, then through external references, then
//! through its parent resolver (normally the built-in catalogue).

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::RenderSettings;
use crate::error::{Result, ScadGraphError};
use crate::factory::NodeFactory;
use crate::graph::{GraphId, ScadGraph};
use crate::library::{InvokableDescription, InvokableId, VariableDescription, VariableId, MAIN_MODULE_ID};
use crate::node::{NodeId, ScadNode};
use crate::nodes::entry_point::FunctionReturn;
use crate::nodes::statements::ImportScadFile;
use crate::render::render_graph;

/// Resolves description ids to shared description records
pub trait ReferenceResolver: fmt::Debug + Send + Sync {
    fn resolve_invokable(&self, id: &str) -> Option<Arc<InvokableDescription>>;

    fn resolve_variable(&self, id: &str) -> Option<Arc<VariableDescription>>;

    fn require_invokable(&self, id: &str) -> Result<Arc<InvokableDescription>> {
        self.resolve_invokable(id)
            .ok_or_else(|| ScadGraphError::UnresolvedReference {
                kind: "invokable",
                id: id.to_string(),
            })
    }

    fn require_variable(&self, id: &str) -> Result<Arc<VariableDescription>> {
        self.resolve_variable(id)
            .ok_or_else(|| ScadGraphError::UnresolvedReference {
                kind: "variable",
                id: id.to_string(),
            })
    }

    /// External files are project-local; other resolvers know none
    fn resolve_external_reference(&self, _path: &str) -> Option<ExternalReference> {
        None
    }

    fn require_external_reference(&self, path: &str) -> Result<ExternalReference> {
        self.resolve_external_reference(path)
            .ok_or_else(|| ScadGraphError::UnresolvedReference {
                kind: "external file",
                id: path.to_string(),
            })
    }
}

/// Resolver that knows nothing
#[derive(Debug, Default)]
pub struct EmptyResolver;

impl ReferenceResolver for EmptyResolver {
    fn resolve_invokable(&self, _id: &str) -> Option<Arc<InvokableDescription>> {
        None
    }

    fn resolve_variable(&self, _id: &str) -> Option<Arc<VariableDescription>> {
        None
    }
}

/// Puts one description in front of another resolver
#[derive(Debug)]
pub(crate) struct OverlayResolver<'a> {
    pub description: Arc<InvokableDescription>,
    pub parent: &'a dyn ReferenceResolver,
}

impl ReferenceResolver for OverlayResolver<'_> {
    fn resolve_invokable(&self, id: &str) -> Option<Arc<InvokableDescription>> {
        if self.description.id == id {
            Some(self.description.clone())
        } else {
            self.parent.resolve_invokable(id)
        }
    }

    fn resolve_variable(&self, id: &str) -> Option<Arc<VariableDescription>> {
        self.parent.resolve_variable(id)
    }

    fn resolve_external_reference(&self, path: &str) -> Option<ExternalReference> {
        self.parent.resolve_external_reference(path)
    }
}

/// How an external file is pulled into the rendered program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceMode {
    /// `include <...>`: declarations and top-level statements
    Include,
    /// `use <...>`: declarations only
    Use,
}

/// An external `.scad` file and the declarations extracted from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalReference {
    pub path: String,
    pub mode: ReferenceMode,
    #[serde(default)]
    pub functions: Vec<InvokableDescription>,
    #[serde(default)]
    pub modules: Vec<InvokableDescription>,
    #[serde(default)]
    pub variables: Vec<VariableDescription>,
}

impl ExternalReference {
    pub fn new(path: impl Into<String>, mode: ReferenceMode) -> Self {
        Self {
            path: path.into(),
            mode,
            functions: Vec::new(),
            modules: Vec::new(),
            variables: Vec::new(),
        }
    }

    fn find_invokable(&self, id: &str) -> Option<&InvokableDescription> {
        self.functions
            .iter()
            .chain(self.modules.iter())
            .find(|d| d.id == id)
    }

    /// `use <path>` or `include <path>`, without the semicolon
    pub fn render(&self) -> String {
        match self.mode {
            ReferenceMode::Include => format!("include <{}>", self.path),
            ReferenceMode::Use => format!("use <{}>", self.path),
        }
    }
}

/// Where an invokable or variable is referenced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Usage {
    pub graph_id: GraphId,
    pub node_id: NodeId,
}

/// All graphs and variables of one program
#[derive(Debug, Clone)]
pub struct ScadProject {
    main: ScadGraph,
    functions: BTreeMap<InvokableId, ScadGraph>,
    modules: BTreeMap<InvokableId, ScadGraph>,
    variables: BTreeMap<VariableId, Arc<VariableDescription>>,
    external_references: Vec<ExternalReference>,
    parent: Arc<dyn ReferenceResolver>,
}

impl ScadProject {
    /// Empty project whose references fall back to `parent`
    pub fn new(parent: Arc<dyn ReferenceResolver>) -> Self {
        Self {
            main: ScadGraph::new(Arc::new(InvokableDescription::main_module())),
            functions: BTreeMap::new(),
            modules: BTreeMap::new(),
            variables: BTreeMap::new(),
            external_references: Vec::new(),
            parent,
        }
    }

    pub fn parent(&self) -> &Arc<dyn ReferenceResolver> {
        &self.parent
    }

    pub fn main(&self) -> &ScadGraph {
        &self.main
    }

    pub fn graph(&self, id: &str) -> Result<&ScadGraph> {
        if id == MAIN_MODULE_ID {
            return Ok(&self.main);
        }
        self.functions
            .get(id)
            .or_else(|| self.modules.get(id))
            .ok_or_else(|| ScadGraphError::GraphNotFound(id.to_string()))
    }

    pub fn graph_mut(&mut self, id: &str) -> Result<&mut ScadGraph> {
        if id == MAIN_MODULE_ID {
            return Ok(&mut self.main);
        }
        if let Some(graph) = self.functions.get_mut(id) {
            return Ok(graph);
        }
        self.modules
            .get_mut(id)
            .ok_or_else(|| ScadGraphError::GraphNotFound(id.to_string()))
    }

    /// Main first, then modules, then functions
    pub fn graphs(&self) -> impl Iterator<Item = &ScadGraph> {
        std::iter::once(&self.main)
            .chain(self.modules.values())
            .chain(self.functions.values())
    }

    pub fn graph_ids(&self) -> Vec<GraphId> {
        self.graphs().map(|g| g.id().to_string()).collect()
    }

    pub fn functions(&self) -> impl Iterator<Item = &ScadGraph> {
        self.functions.values()
    }

    pub fn modules(&self) -> impl Iterator<Item = &ScadGraph> {
        self.modules.values()
    }

    pub fn has_invokable(&self, id: &str) -> bool {
        self.functions.contains_key(id) || self.modules.contains_key(id)
    }

    /// Register a new function or module with a fresh graph holding its
    /// entry (and return) nodes
    pub fn add_invokable(&mut self, description: InvokableDescription) -> Result<Arc<InvokableDescription>> {
        let description = Arc::new(description);
        let mut graph = ScadGraph::new(description.clone());
        for node in NodeFactory::entry_nodes(&description)? {
            graph.add_node(node)?;
        }
        self.insert_graph(graph)?;
        Ok(description)
    }

    /// Register a fully built function or module graph
    pub fn insert_graph(&mut self, graph: ScadGraph) -> Result<()> {
        let description = graph.description().clone();
        if description.is_main() {
            return Err(ScadGraphError::invariant("the main module cannot be inserted"));
        }
        if self.has_invokable(&description.id) {
            return Err(ScadGraphError::invariant(format!(
                "invokable '{}' already exists",
                description.id
            )));
        }
        let target = if description.is_function() {
            &mut self.functions
        } else {
            &mut self.modules
        };
        target.insert(description.id.clone(), graph);
        Ok(())
    }

    pub(crate) fn set_main(&mut self, graph: ScadGraph) {
        self.main = graph;
    }

    pub fn remove_invokable(&mut self, id: &str) -> Result<ScadGraph> {
        self.functions
            .remove(id)
            .or_else(|| self.modules.remove(id))
            .ok_or_else(|| ScadGraphError::GraphNotFound(id.to_string()))
    }

    /// Swap the description of an existing graph; the kind must not change
    pub fn replace_description(&mut self, description: Arc<InvokableDescription>) -> Result<()> {
        let graph = self.graph_mut(&description.id)?;
        if std::mem::discriminant(&graph.description().kind) != std::mem::discriminant(&description.kind) {
            return Err(ScadGraphError::invariant(format!(
                "invokable '{}' cannot change its kind",
                description.id
            )));
        }
        graph.set_description(description);
        Ok(())
    }

    pub fn variables(&self) -> impl Iterator<Item = &Arc<VariableDescription>> {
        self.variables.values()
    }

    pub fn add_variable(&mut self, description: VariableDescription) -> Result<Arc<VariableDescription>> {
        if self.variables.contains_key(&description.id) {
            return Err(ScadGraphError::invariant(format!(
                "variable '{}' already exists",
                description.id
            )));
        }
        let description = Arc::new(description);
        self.variables
            .insert(description.id.clone(), description.clone());
        Ok(description)
    }

    pub fn replace_variable(&mut self, description: Arc<VariableDescription>) -> Result<()> {
        let slot = self.variables.get_mut(&description.id).ok_or_else(|| {
            ScadGraphError::UnresolvedReference {
                kind: "variable",
                id: description.id.clone(),
            }
        })?;
        *slot = description;
        Ok(())
    }

    pub fn remove_variable(&mut self, id: &str) -> Result<Arc<VariableDescription>> {
        self.variables
            .remove(id)
            .ok_or_else(|| ScadGraphError::UnresolvedReference {
                kind: "variable",
                id: id.to_string(),
            })
    }

    pub fn external_references(&self) -> &[ExternalReference] {
        &self.external_references
    }

    pub fn add_external_reference(&mut self, reference: ExternalReference) -> Result<()> {
        if self.external_references.iter().any(|r| r.path == reference.path) {
            return Err(ScadGraphError::invariant(format!(
                "'{}' is already referenced",
                reference.path
            )));
        }
        self.external_references.push(reference);
        Ok(())
    }

    pub fn remove_external_reference(&mut self, path: &str) -> Result<ExternalReference> {
        let index = self
            .external_references
            .iter()
            .position(|r| r.path == path)
            .ok_or_else(|| ScadGraphError::invariant(format!("'{}' is not referenced", path)))?;
        Ok(self.external_references.remove(index))
    }

    /// Nodes referring to an invokable or variable id. Recursive calls in
    /// the invokable's own graph count; its entry and return nodes do not.
    pub fn find_usages(&self, id: &str) -> Vec<Usage> {
        let mut usages = Vec::new();
        for graph in self.graphs() {
            for node in graph.nodes() {
                if graph.id() == id && is_signature_node(node) {
                    continue;
                }
                let refers = node
                    .as_invokable_reference()
                    .map(|r| r.invokable_id() == id)
                    .unwrap_or(false)
                    || node
                        .as_variable_reference()
                        .map(|r| r.variable_id() == id)
                        .unwrap_or(false);
                if refers {
                    usages.push(Usage {
                        graph_id: graph.id().to_string(),
                        node_id: node.id().to_string(),
                    });
                }
            }
        }
        usages
    }

    /// Graph ids that contain at least one usage of `id`
    pub fn graphs_referencing(&self, id: &str) -> Vec<GraphId> {
        let mut ids: Vec<GraphId> = self.find_usages(id).into_iter().map(|u| u.graph_id).collect();
        ids.dedup();
        ids
    }

    pub fn render_graph(&self, id: &str, settings: &RenderSettings) -> Result<String> {
        render_graph(self.graph(id)?, self, settings)
    }

    /// Whole program: external references, variables, modules, functions, main
    pub fn render(&self, settings: &RenderSettings) -> Result<String> {
        let mut sections: Vec<String> = Vec::new();

        // files imported by a node in the main graph render there instead
        let imported: Vec<&str> = self
            .main
            .nodes()
            .filter_map(|n| n.as_any().downcast_ref::<ImportScadFile>())
            .map(|n| n.path())
            .collect();
        let references: Vec<String> = self
            .external_references
            .iter()
            .filter(|r| !imported.contains(&r.path.as_str()))
            .map(|r| r.render())
            .collect();
        sections.push(references.join("\n"));

        let mut variables: Vec<&Arc<VariableDescription>> = self.variables.values().collect();
        variables.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        let variables: Vec<String> = variables
            .iter()
            .map(|v| {
                let value = v
                    .default_value
                    .as_ref()
                    .filter(|l| l.is_set)
                    .map(|l| l.render())
                    .unwrap_or_else(|| "undef".to_string());
                format!("{} = {};", v.name, value)
            })
            .collect();
        sections.push(variables.join("\n"));

        for graphs in [&self.modules, &self.functions] {
            let mut sorted: Vec<&ScadGraph> = graphs.values().collect();
            sorted.sort_by(|a, b| {
                a.description()
                    .name
                    .cmp(&b.description().name)
                    .then(a.id().cmp(b.id()))
            });
            for graph in sorted {
                sections.push(render_graph(graph, self, settings)?);
            }
        }

        sections.push(render_graph(&self.main, self, settings)?);

        Ok(sections
            .into_iter()
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n\n"))
    }
}

fn is_signature_node(node: &dyn ScadNode) -> bool {
    node.as_entry_point().is_some() || node.as_any().is::<FunctionReturn>()
}

impl ReferenceResolver for ScadProject {
    fn resolve_invokable(&self, id: &str) -> Option<Arc<InvokableDescription>> {
        if let Ok(graph) = self.graph(id) {
            return Some(graph.description().clone());
        }
        if let Some(found) = self
            .external_references
            .iter()
            .find_map(|r| r.find_invokable(id))
        {
            return Some(Arc::new(found.clone()));
        }
        self.parent.resolve_invokable(id)
    }

    fn resolve_variable(&self, id: &str) -> Option<Arc<VariableDescription>> {
        if let Some(found) = self.variables.get(id) {
            return Some(found.clone());
        }
        if let Some(found) = self
            .external_references
            .iter()
            .flat_map(|r| r.variables.iter())
            .find(|v| v.id == id)
        {
            return Some(Arc::new(found.clone()));
        }
        self.parent.resolve_variable(id)
    }

    fn resolve_external_reference(&self, path: &str) -> Option<ExternalReference> {
        self.external_references.iter().find(|r| r.path == path).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::BuiltIns;
    use crate::library::ParameterDescription;
    use crate::literal::{Literal, LiteralValue};
    use crate::nodes::invocation::{FunctionInvocation, ModuleInvocation};
    use crate::port::PortType;

    fn project() -> ScadProject {
        ScadProject::new(Arc::new(BuiltIns::new()))
    }

    #[test]
    fn test_resolution_layers() {
        let mut project = project();
        let local = project
            .add_invokable(InvokableDescription::module("cube").with_id("local-cube"))
            .unwrap();
        let mut external = ExternalReference::new("lib/shapes.scad", ReferenceMode::Use);
        external
            .modules
            .push(InvokableDescription::module("rounded_box").with_id("ext-box"));
        project.add_external_reference(external).unwrap();

        assert_eq!(project.resolve_invokable("local-cube").unwrap(), local);
        assert_eq!(project.resolve_invokable("ext-box").unwrap().name, "rounded_box");
        assert_eq!(project.resolve_invokable("builtin:cube").unwrap().name, "cube");
        assert!(project.resolve_invokable("nothing").is_none());
        assert!(matches!(
            project.require_invokable("nothing"),
            Err(ScadGraphError::UnresolvedReference { .. })
        ));
    }

    #[test]
    fn test_add_invokable_creates_entry_nodes() {
        let mut project = project();
        let f = project
            .add_invokable(InvokableDescription::function("twice").returning(PortType::Number))
            .unwrap();
        let m = project.add_invokable(InvokableDescription::module("frame")).unwrap();
        assert_eq!(project.graph(&f.id).unwrap().node_count(), 2);
        assert_eq!(project.graph(&m.id).unwrap().node_count(), 1);
        assert_eq!(project.graph_ids().len(), 3);
        assert!(project.add_invokable((*m).clone()).is_err());
    }

    #[test]
    fn test_find_usages_counts_recursive_calls() {
        let mut project = project();
        let f = project
            .add_invokable(
                InvokableDescription::function("countdown")
                    .with_parameter(ParameterDescription::new("n", PortType::Number))
                    .returning(PortType::Number),
            )
            .unwrap();
        let call = FunctionInvocation::new(&f).unwrap();
        let call_id = call.id().to_string();
        project.graph_mut(&f.id).unwrap().add_node(Box::new(call)).unwrap();

        let usages = project.find_usages(&f.id);
        assert_eq!(
            usages,
            vec![Usage {
                graph_id: f.id.clone(),
                node_id: call_id
            }]
        );
        assert_eq!(project.graphs_referencing(&f.id), vec![f.id.clone()]);
    }

    #[test]
    fn test_find_usages_outside_own_graph() {
        let mut project = project();
        let m = project.add_invokable(InvokableDescription::module("frame")).unwrap();
        let call = ModuleInvocation::new(&m).unwrap();
        let call_id = call.id().to_string();
        project.graph_mut(MAIN_MODULE_ID).unwrap().add_node(Box::new(call)).unwrap();
        let usages = project.find_usages(&m.id);
        assert_eq!(
            usages,
            vec![Usage {
                graph_id: MAIN_MODULE_ID.to_string(),
                node_id: call_id
            }]
        );
        assert_eq!(project.graphs_referencing(&m.id), vec![MAIN_MODULE_ID.to_string()]);
    }

    #[test]
    fn test_replace_description_keeps_kind() {
        let mut project = project();
        let m = project.add_invokable(InvokableDescription::module("frame")).unwrap();
        let mut renamed = (*m).clone();
        renamed.name = "border".into();
        project.replace_description(Arc::new(renamed)).unwrap();
        assert_eq!(project.resolve_invokable(&m.id).unwrap().name, "border");

        let wrong = InvokableDescription::function("border").with_id(m.id.clone());
        assert!(project.replace_description(Arc::new(wrong)).is_err());
    }

    #[test]
    fn test_render_order_of_sections() {
        let mut project = project();
        project
            .add_external_reference(ExternalReference::new("lib.scad", ReferenceMode::Include))
            .unwrap();
        project
            .add_variable(
                VariableDescription::new("width", PortType::Number)
                    .with_default(Literal::set(LiteralValue::Number(10.0))),
            )
            .unwrap();
        project
            .add_invokable(
                InvokableDescription::function("half")
                    .with_parameter(ParameterDescription::new("x", PortType::Number)),
            )
            .unwrap();
        project
            .add_invokable(InvokableDescription::module("frame"))
            .unwrap();
        let text = project.render(&RenderSettings::default()).unwrap();
        assert_eq!(
            text,
            "include <lib.scad>\n\nwidth = 10;\n\nmodule frame() {}\n\nfunction half(x) = undef;"
        );
    }
}
