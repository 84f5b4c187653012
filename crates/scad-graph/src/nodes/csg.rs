//! CSG operations that need ordered child slots
//!
//! Order-insensitive operations (union, intersection, hull, ...) are plain
//! module invocations from the built-in catalogue.

use crate::error::Result;
use crate::node::{NodeCore, ScadNode};
use crate::port::PortDefinition;
use crate::render::RenderContext;

/// `difference()` with the base unioned into its first child
#[derive(Debug, Clone)]
pub struct Difference {
    core: NodeCore,
}

impl Default for Difference {
    fn default() -> Self {
        Self::new()
    }
}

impl Difference {
    pub fn new() -> Self {
        let mut core = NodeCore::new();
        core.declare_ports(
            vec![
                PortDefinition::geometry("Base"),
                PortDefinition::geometry("Subtract"),
            ],
            vec![PortDefinition::geometry("Out")],
        );
        Self { core }
    }
}

impl ScadNode for Difference {
    crate::node_boilerplate!("difference");

    fn title(&self) -> String {
        "Difference".to_string()
    }

    fn description(&self) -> String {
        "Subtracts every child of the second input from the first".to_string()
    }

    fn render(&self, ctx: &RenderContext<'_>, _port: usize) -> Result<String> {
        let base = ctx.children(self, 0)?;
        let subtract = ctx.children(self, 1)?;
        let mut body = format!("union(){}", ctx.block(&base));
        if !subtract.is_empty() {
            body.push('\n');
            body.push_str(&subtract);
        }
        Ok(format!("difference(){}", ctx.block(&body)))
    }

    fn can_have_modifiers(&self) -> bool {
        true
    }
}
