//! Node refactorings: adding, deleting, moving, modifiers and literals

use crate::error::{Result, ScadGraphError};
use crate::factory::NodeFactory;
use crate::graph::GraphId;
use crate::literal::LiteralValue;
use crate::modifier::Modifiers;
use crate::node::{NodeId, ScadNode};
use crate::nodes::scopes::ScopeFlavor;
use crate::port::PortId;

use super::connections::DeleteConnection;
use super::{Refactoring, RefactoringContext};

/// Add a single, unbound node
#[derive(Debug, Clone)]
pub struct AddNode {
    graph: GraphId,
    node: Box<dyn ScadNode>,
}

impl AddNode {
    pub fn new(graph: &str, node: Box<dyn ScadNode>) -> Self {
        Self {
            graph: graph.to_string(),
            node,
        }
    }

    pub fn node_id(&self) -> &str {
        self.node.id()
    }
}

impl Refactoring for AddNode {
    fn name(&self) -> String {
        format!("Add {}", self.node.title())
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        if self.node.as_bound().is_some() {
            return Err(ScadGraphError::invariant(format!(
                "'{}' is one half of a pair and must be added with its partner",
                self.node.kind()
            )));
        }
        let graph = ctx.graph_mut(&self.graph)?;
        if !graph.can_use(self.node.as_ref()) {
            return Err(ScadGraphError::invariant(format!(
                "graph '{}' cannot contain a '{}' node",
                self.graph,
                self.node.kind()
            )));
        }
        graph.add_node(self.node.clone_node())
    }
}

/// Add both halves of a scope
#[derive(Debug, Clone)]
pub struct AddBoundPair {
    graph: GraphId,
    start: Box<dyn ScadNode>,
    end: Box<dyn ScadNode>,
}

impl AddBoundPair {
    /// Start at `position`, end to its right
    pub fn new(graph: &str, flavor: ScopeFlavor, position: (f64, f64)) -> Self {
        let (mut start, mut end) = NodeFactory::bound_pair(flavor);
        start.core_mut().position = position;
        end.core_mut().position = (position.0 + 300.0, position.1);
        Self {
            graph: graph.to_string(),
            start,
            end,
        }
    }

    pub fn start_id(&self) -> &str {
        self.start.id()
    }

    pub fn end_id(&self) -> &str {
        self.end.id()
    }
}

impl Refactoring for AddBoundPair {
    fn name(&self) -> String {
        format!("Add {}", self.end.title())
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        let graph = ctx.graph_mut(&self.graph)?;
        for node in [&self.start, &self.end] {
            if !graph.can_use(node.as_ref()) {
                return Err(ScadGraphError::invariant(format!(
                    "graph '{}' cannot contain a '{}' node",
                    self.graph,
                    node.kind()
                )));
            }
        }
        graph.add_node(self.start.clone_node())?;
        graph.add_node(self.end.clone_node())
    }
}

/// Delete a node, its connections and its bound partner
#[derive(Debug, Clone)]
pub struct DeleteNode {
    graph: GraphId,
    node: NodeId,
}

impl DeleteNode {
    pub fn new(graph: &str, node: &str) -> Self {
        Self {
            graph: graph.to_string(),
            node: node.to_string(),
        }
    }
}

impl Refactoring for DeleteNode {
    fn name(&self) -> String {
        format!("Delete node {}", self.node)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        let doomed = {
            let graph = ctx.graph(&self.graph)?;
            let node = graph.by_id(&self.node)?;
            if !node.can_be_deleted() {
                return Err(ScadGraphError::invariant(format!(
                    "'{}' cannot be deleted",
                    node.title()
                )));
            }
            let mut doomed = vec![self.node.clone()];
            if let Some(partner) = node.as_bound().map(|b| b.other_node_id().to_string()) {
                if graph.contains_node(&partner) {
                    doomed.push(partner);
                }
            }
            doomed
        };
        for id in &doomed {
            let connections = ctx.graph(&self.graph)?.connections_of(id);
            for connection in connections {
                // the partner pass may already have removed it
                if ctx.graph(&self.graph)?.has_connection(&connection) {
                    ctx.perform(DeleteConnection::new(&self.graph, connection))?;
                }
            }
        }
        let graph = ctx.graph_mut(&self.graph)?;
        for id in &doomed {
            graph.remove_node(id)?;
        }
        Ok(())
    }
}

/// Move a node on the canvas
#[derive(Debug, Clone)]
pub struct MoveNode {
    graph: GraphId,
    node: NodeId,
    position: (f64, f64),
}

impl MoveNode {
    pub fn new(graph: &str, node: &str, position: (f64, f64)) -> Self {
        Self {
            graph: graph.to_string(),
            node: node.to_string(),
            position,
        }
    }
}

impl Refactoring for MoveNode {
    fn name(&self) -> String {
        format!("Move node {}", self.node)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        ctx.graph_mut(&self.graph)?
            .by_id_mut(&self.node)?
            .core_mut()
            .position = self.position;
        Ok(())
    }
}

/// Enable or disable one modifier on a statement node
#[derive(Debug, Clone)]
pub struct ToggleModifier {
    graph: GraphId,
    node: NodeId,
    modifier: Modifiers,
    enable: bool,
    color: Option<String>,
}

impl ToggleModifier {
    pub fn new(graph: &str, node: &str, modifier: Modifiers, enable: bool) -> Self {
        Self {
            graph: graph.to_string(),
            node: node.to_string(),
            modifier,
            enable,
            color: None,
        }
    }

    /// Enable the color modifier with a value
    pub fn color(graph: &str, node: &str, color: impl Into<String>) -> Self {
        Self {
            color: Some(color.into()),
            ..Self::new(graph, node, Modifiers::COLOR, true)
        }
    }
}

impl Refactoring for ToggleModifier {
    fn name(&self) -> String {
        if self.enable {
            format!("Enable modifier on {}", self.node)
        } else {
            format!("Disable modifier on {}", self.node)
        }
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        let graph = ctx.graph_mut(&self.graph)?;
        if !graph.by_id(&self.node)?.can_have_modifiers() {
            return Err(ScadGraphError::invariant(format!(
                "node '{}' does not accept modifiers",
                self.node
            )));
        }
        if self.enable && self.modifier == Modifiers::ROOT {
            // only one root per graph
            for id in graph.node_ids() {
                if id != self.node {
                    graph.by_id_mut(&id)?.core_mut().modifiers.remove(Modifiers::ROOT);
                }
            }
        }
        let core = graph.by_id_mut(&self.node)?.core_mut();
        core.modifiers.toggle(self.modifier, self.enable);
        if self.modifier == Modifiers::COLOR {
            if !self.enable {
                core.color = None;
            } else if let Some(color) = &self.color {
                core.color = Some(color.clone());
            }
        }
        Ok(())
    }
}

/// Store a value in a port literal and mark it set
#[derive(Debug, Clone)]
pub struct SetLiteralValue {
    graph: GraphId,
    node: NodeId,
    port: PortId,
    value: LiteralValue,
}

impl SetLiteralValue {
    pub fn new(graph: &str, node: &str, port: PortId, value: LiteralValue) -> Self {
        Self {
            graph: graph.to_string(),
            node: node.to_string(),
            port,
            value,
        }
    }
}

impl Refactoring for SetLiteralValue {
    fn name(&self) -> String {
        format!("Set value of {} on {}", self.port, self.node)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        let graph = ctx.graph_mut(&self.graph)?;
        // a connected auto-set input keeps its literal switched off
        let connected = self.port.is_input() && graph.is_port_connected(&self.node, self.port);
        let core = graph.by_id_mut(&self.node)?.core_mut();
        let auto = core
            .port_definition(self.port)
            .map(|d| d.auto_set_literal)
            .unwrap_or(false);
        let literal = core.literal_mut(self.port).ok_or_else(|| {
            ScadGraphError::invariant(format!("port {} of '{}' has no literal", self.port, self.node))
        })?;
        literal.set_value(self.value.clone())?;
        if !(connected && auto) {
            literal.is_set = true;
        }
        Ok(())
    }
}

/// Switch a port literal on or off
#[derive(Debug, Clone)]
pub struct ToggleLiteral {
    graph: GraphId,
    node: NodeId,
    port: PortId,
    enabled: bool,
}

impl ToggleLiteral {
    pub fn new(graph: &str, node: &str, port: PortId, enabled: bool) -> Self {
        Self {
            graph: graph.to_string(),
            node: node.to_string(),
            port,
            enabled,
        }
    }
}

impl Refactoring for ToggleLiteral {
    fn name(&self) -> String {
        format!("Toggle literal {} on {}", self.port, self.node)
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
        let literal = ctx
            .graph_mut(&self.graph)?
            .by_id_mut(&self.node)?
            .core_mut()
            .literal_mut(self.port)
            .ok_or_else(|| {
                ScadGraphError::invariant(format!("port {} of '{}' has no literal", self.port, self.node))
            })?;
        literal.is_set = self.enabled;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::builtins::BuiltIns;
    use crate::graph::Connection;
    use crate::library::{InvokableDescription, MAIN_MODULE_ID};
    use crate::nodes::constants::ConstantValue;
    use crate::nodes::csg::Difference;
    use crate::nodes::entry_point::ModuleEntryPoint;
    use crate::nodes::scopes::bound_pair;
    use crate::project::ScadProject;
    use crate::rules::ConnectionRules;
    use std::sync::Arc;

    fn run(project: &mut ScadProject, refactoring: impl Refactoring + 'static) -> Result<()> {
        let rules = ConnectionRules::standard();
        let mut ctx = RefactoringContext::new(project, &rules, 100);
        ctx.run(vec![Box::new(refactoring)])
    }

    fn project() -> ScadProject {
        let mut project = ScadProject::new(Arc::new(BuiltIns::new()));
        let (start, end) = bound_pair(ScopeFlavor::ForLoop);
        let graph = GraphBuilder::main()
            .add(Difference::new(), "a", (0.0, 0.0))
            .add(Difference::new(), "b", (0.0, 100.0))
            .add(start, "start", (0.0, 200.0))
            .add(end, "end", (300.0, 200.0))
            .add(ConstantValue::number(3.0), "n", (0.0, 300.0))
            .connect("a", 0, "b", 0)
            .connect("b", 0, "end", 0)
            .build()
            .unwrap();
        project.set_main(graph);
        project
    }

    #[test]
    fn test_delete_node_strips_connections() {
        let mut project = project();
        run(&mut project, DeleteNode::new(MAIN_MODULE_ID, "b")).unwrap();
        let main = project.main();
        assert!(!main.contains_node("b"));
        assert!(main.connections().is_empty());
    }

    #[test]
    fn test_deleting_one_half_deletes_the_pair() {
        let mut project = project();
        run(&mut project, DeleteNode::new(MAIN_MODULE_ID, "start")).unwrap();
        let main = project.main();
        assert!(!main.contains_node("start"));
        assert!(!main.contains_node("end"));
        assert_eq!(main.connections(), &[Connection::new("a", 0, "b", 0)]);
    }

    #[test]
    fn test_entry_points_cannot_be_deleted() {
        let mut project = ScadProject::new(Arc::new(BuiltIns::new()));
        let module = project.add_invokable(InvokableDescription::module("m")).unwrap();
        let entry = project.graph(&module.id).unwrap().entry_point().unwrap().id().to_string();
        let err = run(&mut project, DeleteNode::new(&module.id, &entry)).unwrap_err();
        assert!(matches!(err, ScadGraphError::InvariantViolation(_)));
        assert!(project
            .graph(&module.id)
            .unwrap()
            .node_as::<ModuleEntryPoint>(&entry)
            .is_ok());
    }

    #[test]
    fn test_add_node_respects_graph_kind() {
        let mut project = ScadProject::new(Arc::new(BuiltIns::new()));
        let function = project.add_invokable(InvokableDescription::function("f")).unwrap();
        let err = run(&mut project, AddNode::new(&function.id, Box::new(Difference::new()))).unwrap_err();
        assert!(matches!(err, ScadGraphError::InvariantViolation(_)));
        run(&mut project, AddNode::new(&function.id, Box::new(ConstantValue::number(1.0)))).unwrap();
        assert_eq!(project.graph(&function.id).unwrap().node_count(), 3);
    }

    #[test]
    fn test_bound_halves_are_added_together() {
        let mut project = project();
        let (start, _) = bound_pair(ScopeFlavor::LetBlock);
        assert!(run(&mut project, AddNode::new(MAIN_MODULE_ID, Box::new(start))).is_err());

        let pair = AddBoundPair::new(MAIN_MODULE_ID, ScopeFlavor::LetBlock, (10.0, 10.0));
        let (start_id, end_id) = (pair.start_id().to_string(), pair.end_id().to_string());
        run(&mut project, pair).unwrap();
        let end = project.main().by_id(&end_id).unwrap();
        assert_eq!(end.as_bound().unwrap().other_node_id(), start_id);
        assert_eq!(end.position(), (310.0, 10.0));
    }

    #[test]
    fn test_root_modifier_is_exclusive() {
        let mut project = project();
        run(&mut project, ToggleModifier::new(MAIN_MODULE_ID, "a", Modifiers::ROOT, true)).unwrap();
        run(&mut project, ToggleModifier::new(MAIN_MODULE_ID, "b", Modifiers::ROOT, true)).unwrap();
        let main = project.main();
        assert!(!main.by_id("a").unwrap().core().modifiers.contains(Modifiers::ROOT));
        assert!(main.by_id("b").unwrap().core().modifiers.contains(Modifiers::ROOT));

        let err = run(&mut project, ToggleModifier::new(MAIN_MODULE_ID, "n", Modifiers::DEBUG, true));
        assert!(err.is_err());
    }

    #[test]
    fn test_color_value_follows_modifier() {
        let mut project = project();
        run(&mut project, ToggleModifier::color(MAIN_MODULE_ID, "a", "red")).unwrap();
        assert_eq!(project.main().by_id("a").unwrap().core().color.as_deref(), Some("red"));
        run(&mut project, ToggleModifier::new(MAIN_MODULE_ID, "a", Modifiers::COLOR, false)).unwrap();
        assert!(project.main().by_id("a").unwrap().core().color.is_none());
    }

    #[test]
    fn test_literal_edits() {
        let mut project = project();
        let port = PortId::output(0);
        run(
            &mut project,
            SetLiteralValue::new(MAIN_MODULE_ID, "n", port, LiteralValue::Number(7.0)),
        )
        .unwrap();
        let literal = project.main().by_id("n").unwrap().core().literal(port).unwrap().clone();
        assert_eq!(literal.render(), "7");
        assert!(literal.is_set);

        run(&mut project, ToggleLiteral::new(MAIN_MODULE_ID, "n", port, false)).unwrap();
        assert!(!project.main().by_id("n").unwrap().core().literal(port).unwrap().is_set);

        let err = run(
            &mut project,
            SetLiteralValue::new(MAIN_MODULE_ID, "n", port, LiteralValue::Boolean(true)),
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_move_node() {
        let mut project = project();
        run(&mut project, MoveNode::new(MAIN_MODULE_ID, "n", (5.0, 6.0))).unwrap();
        assert_eq!(project.main().by_id("n").unwrap().position(), (5.0, 6.0));
    }
}
