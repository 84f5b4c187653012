//! Editor helpers that never become statements of their own

use crate::error::Result;
use crate::node::{NodeCore, ScadNode};
use crate::persistence::SavedNode;
use crate::port::{PortDefinition, PortType};
use crate::project::ReferenceResolver;
use crate::render::RenderContext;

/// Free-text note on the canvas
#[derive(Debug, Clone)]
pub struct Comment {
    core: NodeCore,
    pub text: String,
}

impl Comment {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            core: NodeCore::new(),
            text: text.into(),
        }
    }
}

impl ScadNode for Comment {
    crate::node_boilerplate!("comment");

    fn title(&self) -> String {
        "Comment".to_string()
    }

    fn description(&self) -> String {
        self.text.clone()
    }

    fn render(&self, _ctx: &RenderContext<'_>, _port: usize) -> Result<String> {
        Ok(String::new())
    }

    fn is_render_helper(&self) -> bool {
        true
    }

    fn save_state(&self, record: &mut SavedNode) {
        record.set_str("text", self.text.clone());
    }

    fn restore_state(&mut self, record: &SavedNode, _resolver: &dyn ReferenceResolver) -> Result<()> {
        self.text = record.get_str("text")?.to_string();
        Ok(())
    }
}

/// Pass-through used to route wires around the canvas
#[derive(Debug, Clone)]
pub struct Reroute {
    core: NodeCore,
}

impl Default for Reroute {
    fn default() -> Self {
        Self::new()
    }
}

impl Reroute {
    pub fn new() -> Self {
        let mut core = NodeCore::new();
        core.declare_ports(
            vec![PortDefinition::plain(PortType::Any, "In")],
            vec![PortDefinition::plain(PortType::Any, "Out")],
        );
        Self { core }
    }
}

impl ScadNode for Reroute {
    crate::node_boilerplate!("reroute");

    fn title(&self) -> String {
        "Reroute".to_string()
    }

    fn render(&self, ctx: &RenderContext<'_>, _port: usize) -> Result<String> {
        ctx.input_or_undef(self, 0)
    }

    fn is_render_helper(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::builtins::BuiltIns;
    use crate::config::RenderSettings;
    use crate::nodes::constants::ConstantValue;
    use crate::nodes::statements::Echo;
    use crate::render::{render_graph, roots};

    #[test]
    fn test_helpers_are_never_roots() {
        let graph = GraphBuilder::main()
            .add(Comment::new("remember the fillet"), "note", (0.0, 0.0))
            .add(Reroute::new(), "r", (0.0, 10.0))
            .build()
            .unwrap();
        assert!(roots(&graph).is_empty());
        let text = render_graph(&graph, &BuiltIns::new(), &RenderSettings::default()).unwrap();
        assert_eq!(text, "");
    }

    #[test]
    fn test_reroute_passes_value_through() {
        let graph = GraphBuilder::main()
            .add(ConstantValue::number(3.0), "n", (0.0, 0.0))
            .add(Reroute::new(), "r", (0.0, 10.0))
            .add(Echo::new(), "e", (0.0, 20.0))
            .connect("n", 0, "r", 0)
            .connect("r", 0, "e", 1)
            .build()
            .unwrap();
        let text = render_graph(&graph, &BuiltIns::new(), &RenderSettings::default()).unwrap();
        assert_eq!(text, "echo(3);");
    }
}
