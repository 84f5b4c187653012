//! Code generation from graphs to OpenSCAD source
//!
//! Rendering is a pure read over a graph. Statements are produced from the
//! graph's roots (un-consumed statement positions), ordered by canvas
//! position; expressions are rendered inline on demand through the input
//! ports that reference them.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::config::RenderSettings;
use crate::error::{Result, ScadGraphError};
use crate::graph::ScadGraph;
use crate::library::{InvokableDescription, VariableDescription};
use crate::node::ScadNode;
use crate::port::{PortId, PortType};
use crate::project::ReferenceResolver;

/// Everything a node needs to render itself
pub struct RenderContext<'a> {
    pub graph: &'a ScadGraph,
    pub resolver: &'a dyn ReferenceResolver,
    pub settings: &'a RenderSettings,
}

impl<'a> RenderContext<'a> {
    pub fn new(
        graph: &'a ScadGraph,
        resolver: &'a dyn ReferenceResolver,
        settings: &'a RenderSettings,
    ) -> Self {
        Self {
            graph,
            resolver,
            settings,
        }
    }

    /// Value feeding an input: the upstream render if connected, else the
    /// literal if set, else `None`.
    pub fn input(&self, node: &dyn ScadNode, port: usize) -> Result<Option<String>> {
        if let Some(connection) = self.graph.incoming(node.id(), port).next() {
            let source = self.graph.by_id(&connection.from)?;
            return self.statement(source, connection.from_port).map(Some);
        }
        Ok(node
            .core()
            .literal(PortId::input(port))
            .filter(|l| l.is_set)
            .map(|l| l.render()))
    }

    pub fn input_or(&self, node: &dyn ScadNode, port: usize, fallback: &str) -> Result<String> {
        Ok(self
            .input(node, port)?
            .unwrap_or_else(|| fallback.to_string()))
    }

    pub fn input_or_undef(&self, node: &dyn ScadNode, port: usize) -> Result<String> {
        self.input_or(node, port, "undef")
    }

    /// Non-empty renders of everything connected to one input, ordered like roots
    pub fn inputs(&self, node: &dyn ScadNode, port: usize) -> Result<Vec<String>> {
        let mut sources = Vec::new();
        for connection in self.graph.incoming(node.id(), port) {
            sources.push((self.graph.by_id(&connection.from)?, connection.from_port));
        }
        sources.sort_by(|(a, _), (b, _)| by_position(*a, *b));
        let mut parts = Vec::with_capacity(sources.len());
        for (source, from_port) in sources {
            let text = self.statement(source, from_port)?;
            if !text.is_empty() {
                parts.push(text);
            }
        }
        Ok(parts)
    }

    /// All statements connected to a (Geometry) input
    pub fn children(&self, node: &dyn ScadNode, port: usize) -> Result<String> {
        Ok(self.inputs(node, port)?.join("\n"))
    }

    /// Render a node output and wrap it in the node's modifier template
    pub fn statement(&self, node: &dyn ScadNode, port: usize) -> Result<String> {
        let text = node.render(self, port)?;
        if node.can_have_modifiers() {
            let core = node.core();
            Ok(core.modifiers.apply(&text, core.color.as_deref()))
        } else {
            Ok(text)
        }
    }

    /// The bound partner of `node`, downcast to its concrete kind
    pub fn partner<T: ScadNode>(&self, node: &dyn ScadNode) -> Result<&'a T> {
        let bound = node.as_bound().ok_or_else(|| {
            ScadGraphError::invariant(format!("node '{}' is not bound", node.id()))
        })?;
        let other = self.graph.find_node(bound.other_node_id()).ok_or_else(|| {
            ScadGraphError::invariant(format!(
                "bound partner '{}' of node '{}' is missing",
                bound.other_node_id(),
                node.id()
            ))
        })?;
        other.as_any().downcast_ref::<T>().ok_or_else(|| {
            ScadGraphError::invariant(format!(
                "bound partner '{}' of node '{}' has the wrong kind",
                bound.other_node_id(),
                node.id()
            ))
        })
    }

    pub fn invokable(&self, id: &str) -> Result<Arc<InvokableDescription>> {
        self.resolver.require_invokable(id)
    }

    pub fn variable(&self, id: &str) -> Result<Arc<VariableDescription>> {
        self.resolver.require_variable(id)
    }

    /// ` {` + indented content + `}`, or ` {}` when empty
    pub fn block(&self, content: &str) -> String {
        if content.trim().is_empty() {
            " {}".to_string()
        } else {
            format!(" {{\n{}\n}}", self.indent(content))
        }
    }

    pub fn indent(&self, content: &str) -> String {
        content
            .lines()
            .map(|line| {
                if line.is_empty() {
                    String::new()
                } else {
                    format!("{}{}", self.settings.indent, line)
                }
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Deterministic, collision-free name for an intermediate value
pub fn stable_variable_name(node_id: &str, port: usize) -> String {
    let sanitized: String = node_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("var_{}_{}", sanitized, port)
}

fn by_position(a: &dyn ScadNode, b: &dyn ScadNode) -> Ordering {
    let (ax, ay) = a.position();
    let (bx, by) = b.position();
    ay.total_cmp(&by).then(ax.total_cmp(&bx))
}

fn is_statement_type(port_type: PortType) -> bool {
    matches!(port_type, PortType::Geometry | PortType::Flow)
}

/// Whether the node is a trailing, un-consumed statement position
pub fn is_root(graph: &ScadGraph, node: &dyn ScadNode) -> bool {
    if node.is_render_helper() || node.as_entry_point().is_some() {
        return false;
    }
    let outputs = node.core().outputs();
    if outputs.is_empty() {
        return true;
    }
    let statement_ports: Vec<usize> = outputs
        .iter()
        .enumerate()
        .filter(|(_, def)| is_statement_type(def.port_type))
        .map(|(i, _)| i)
        .collect();
    !statement_ports.is_empty()
        && statement_ports
            .iter()
            .all(|port| !graph.is_port_connected(node.id(), PortId::output(*port)))
}

/// Render roots ordered by ascending y, then ascending x
pub fn roots(graph: &ScadGraph) -> Vec<&(dyn ScadNode + 'static)> {
    let mut roots: Vec<&(dyn ScadNode + 'static)> = graph.nodes().filter(|n| is_root(graph, *n)).collect();
    roots.sort_by(|a, b| by_position(*a, *b));
    roots
}

/// Render one graph, wrapping the body with its entry point if it has one
pub fn render_graph(
    graph: &ScadGraph,
    resolver: &dyn ReferenceResolver,
    settings: &RenderSettings,
) -> Result<String> {
    let ctx = RenderContext::new(graph, resolver, settings);
    let mut parts = Vec::new();
    for root in roots(graph) {
        let text = ctx.statement(root, 0)?;
        if !text.is_empty() {
            parts.push(text);
        }
    }
    let content = parts.join("\n");
    match graph.entry_point().and_then(|n| n.as_entry_point()) {
        Some(entry) => entry.render_entry_point(&ctx, &content),
        None => Ok(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::builtins::BuiltIns;
    use crate::nodes::constants::ConstantValue;
    use crate::nodes::csg::Difference;
    use crate::nodes::helpers::Comment;
    use crate::nodes::invocation::ModuleInvocation;

    fn cube(builtins: &BuiltIns) -> ModuleInvocation {
        ModuleInvocation::new(&builtins.require_invokable("builtin:cube").unwrap()).unwrap()
    }

    #[test]
    fn test_roots_are_ordered_by_y_then_x() {
        let builtins = BuiltIns::new();
        let graph = GraphBuilder::main()
            .add(cube(&builtins), "c", (10.0, 20.0))
            .add(cube(&builtins), "a", (50.0, 0.0))
            .add(cube(&builtins), "b", (0.0, 20.0))
            .add(Comment::new("note"), "note", (0.0, -10.0))
            .add(ConstantValue::new(PortType::Number), "n", (0.0, -20.0))
            .build()
            .unwrap();
        let ids: Vec<&str> = roots(&graph).iter().map(|n| n.id()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_consumed_statement_is_not_a_root() {
        let builtins = BuiltIns::new();
        let graph = GraphBuilder::main()
            .add(cube(&builtins), "c", (0.0, 0.0))
            .add(Difference::new(), "d", (0.0, 100.0))
            .connect("c", 0, "d", 0)
            .build()
            .unwrap();
        let ids: Vec<&str> = roots(&graph).iter().map(|n| n.id()).collect();
        assert_eq!(ids, vec!["d"]);
    }

    #[test]
    fn test_render_is_idempotent() {
        let builtins = BuiltIns::new();
        let settings = RenderSettings::default();
        let graph = GraphBuilder::main()
            .add(cube(&builtins), "c1", (0.0, 0.0))
            .add(cube(&builtins), "c2", (0.0, 10.0))
            .add(Difference::new(), "d", (0.0, 100.0))
            .connect("c1", 0, "d", 0)
            .connect("c2", 0, "d", 1)
            .build()
            .unwrap();
        let first = render_graph(&graph, &builtins, &settings).unwrap();
        let second = render_graph(&graph, &builtins, &settings).unwrap();
        assert_eq!(first, second);
        assert!(first.starts_with("difference() {"));
    }

    #[test]
    fn test_block_and_indent() {
        let builtins = BuiltIns::new();
        let settings = RenderSettings::default();
        let graph = GraphBuilder::main().build().unwrap();
        let ctx = RenderContext::new(&graph, &builtins, &settings);
        assert_eq!(ctx.block(""), " {}");
        assert_eq!(ctx.block("a;\n\nb;"), " {\n    a;\n\n    b;\n}");
    }

    #[test]
    fn test_stable_names_are_deterministic_and_distinct() {
        let a = stable_variable_name("1f0e-77", 0);
        assert_eq!(a, "var_1f0e_77_0");
        assert_eq!(a, stable_variable_name("1f0e-77", 0));
        assert_ne!(a, stable_variable_name("1f0e-77", 1));
        assert_ne!(a, stable_variable_name("1f0e-78", 0));
    }
}
