//! Unary and switchable binary operators
//!
//! A binary operator node does not fix its operand types up front. Its
//! inputs start as `Any` and are retyped by a late fixup after every
//! connection change, based on what is connected. The result type follows
//! from the operand types through the operator's combination table.
//!
//! A sum takes any number of connections on its one input and follows the
//! type they agree on the same way.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScadGraphError};
use crate::node::{NodeCore, ScadNode};
use crate::nodes::{port_type_key, saved_port_type};
use crate::persistence::SavedNode;
use crate::port::{PortDefinition, PortDirection, PortId, PortType};
use crate::project::ReferenceResolver;
use crate::refactoring::operators::{DeleteUnassignableConnections, FixOperatorPortTypes, FixSumPortTypes};
use crate::render::RenderContext;
use crate::rules::{Candidate, ConnectionRule, ConnectionRules, Decision};

/// Infix operators with two operands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Exponent,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
    And,
    Or,
}

fn is_vector(t: PortType) -> bool {
    matches!(t, PortType::Vector | PortType::Vector2 | PortType::Vector3)
}

impl BinaryOperator {
    pub const ALL: [BinaryOperator; 14] = [
        BinaryOperator::Add,
        BinaryOperator::Subtract,
        BinaryOperator::Multiply,
        BinaryOperator::Divide,
        BinaryOperator::Modulo,
        BinaryOperator::Exponent,
        BinaryOperator::Less,
        BinaryOperator::LessEqual,
        BinaryOperator::Greater,
        BinaryOperator::GreaterEqual,
        BinaryOperator::Equal,
        BinaryOperator::NotEqual,
        BinaryOperator::And,
        BinaryOperator::Or,
    ];

    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::Exponent => "^",
            BinaryOperator::Less => "<",
            BinaryOperator::LessEqual => "<=",
            BinaryOperator::Greater => ">",
            BinaryOperator::GreaterEqual => ">=",
            BinaryOperator::Equal => "==",
            BinaryOperator::NotEqual => "!=",
            BinaryOperator::And => "&&",
            BinaryOperator::Or => "||",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            BinaryOperator::Add => "Add",
            BinaryOperator::Subtract => "Subtract",
            BinaryOperator::Multiply => "Multiply",
            BinaryOperator::Divide => "Divide",
            BinaryOperator::Modulo => "Modulo",
            BinaryOperator::Exponent => "Exponent",
            BinaryOperator::Less => "Less than",
            BinaryOperator::LessEqual => "Less or equal",
            BinaryOperator::Greater => "Greater than",
            BinaryOperator::GreaterEqual => "Greater or equal",
            BinaryOperator::Equal => "Equal",
            BinaryOperator::NotEqual => "Not equal",
            BinaryOperator::And => "And",
            BinaryOperator::Or => "Or",
        }
    }

    /// Whether an operand of type `t` is meaningful for this operator
    pub fn supports(self, t: PortType) -> bool {
        use BinaryOperator::*;
        if t == PortType::Any {
            return true;
        }
        match self {
            Add | Subtract | Multiply | Divide => t == PortType::Number || is_vector(t),
            Modulo | Exponent => t == PortType::Number,
            Less | LessEqual | Greater | GreaterEqual => {
                matches!(t, PortType::Number | PortType::String)
            }
            Equal | NotEqual => t.is_expression_type(),
            And | Or => t == PortType::Boolean,
        }
    }

    /// Result type for the given operand types
    pub fn result_type(self, a: PortType, b: PortType) -> PortType {
        use BinaryOperator::*;
        use PortType::{Any, Number};
        match self {
            Add | Subtract => match (a, b) {
                _ if a == Any || b == Any => Any,
                _ if a == b => a,
                _ if is_vector(a) && is_vector(b) => PortType::Vector,
                _ => Any,
            },
            Multiply => match (a, b) {
                (Number, Number) => Number,
                (Number, v) | (v, Number) if is_vector(v) => v,
                _ if a == b && is_vector(a) => Number,
                _ => Any,
            },
            Divide => match (a, b) {
                (Number, Number) => Number,
                (v, Number) if is_vector(v) => v,
                _ => Any,
            },
            Modulo | Exponent => Number,
            _ => PortType::Boolean,
        }
    }
}

/// Node for a [`BinaryOperator`]
#[derive(Debug, Clone)]
pub struct BinaryOperatorNode {
    core: NodeCore,
    operator: BinaryOperator,
}

impl BinaryOperatorNode {
    pub fn new(operator: BinaryOperator) -> Self {
        let mut core = NodeCore::new();
        core.declare_ports(
            vec![
                PortDefinition::with_literal(PortType::Any, "A"),
                PortDefinition::with_literal(PortType::Any, "B"),
            ],
            vec![PortDefinition::plain(PortType::Any, "Result")],
        );
        Self { core, operator }
    }

    pub fn operator(&self) -> BinaryOperator {
        self.operator
    }

    pub fn operand_type(&self, operand: usize) -> PortType {
        self.core
            .port_type(PortId::input(operand))
            .unwrap_or(PortType::Any)
    }

    pub fn result_type(&self) -> PortType {
        self.core
            .port_type(PortId::output(0))
            .unwrap_or(PortType::Any)
    }

    /// Retype one operand; its literal follows the new type
    pub fn switch_operand(&mut self, operand: usize, port_type: PortType) -> Result<()> {
        if operand > 1 {
            return Err(ScadGraphError::invariant(format!(
                "operator '{}' has no operand {}",
                self.core.id(),
                operand
            )));
        }
        if !self.operator.supports(port_type) {
            return Err(ScadGraphError::invariant(format!(
                "{} does not support {} operands",
                self.operator.title(),
                port_type
            )));
        }
        let port = PortId::input(operand);
        let definition = self.core.inputs()[operand].retyped(port_type);
        self.core.set_port_definition(port, definition)
    }

    pub fn set_result_type(&mut self, port_type: PortType) -> Result<()> {
        let name = self.core.outputs()[0].name.clone();
        self.core
            .set_port_definition(PortId::output(0), PortDefinition::plain(port_type, name))
    }

    /// Result type implied by the current operand types
    pub fn inferred_result_type(&self) -> PortType {
        self.operator
            .result_type(self.operand_type(0), self.operand_type(1))
    }

    /// Exchange both operands including their literals; port names stay put
    pub fn swap_operands(&mut self) -> Result<()> {
        let mut a = self.core.inputs()[0].clone();
        let mut b = self.core.inputs()[1].clone();
        std::mem::swap(&mut a.name, &mut b.name);
        self.core.swap_literals(PortDirection::Input, 0, 1);
        let outputs = self.core.outputs().to_vec();
        self.core.set_ports(vec![b, a], outputs)
    }
}

impl ScadNode for BinaryOperatorNode {
    crate::node_boilerplate!("binary_operator");

    fn title(&self) -> String {
        self.operator.title().to_string()
    }

    fn render(&self, ctx: &RenderContext<'_>, _port: usize) -> Result<String> {
        Ok(format!(
            "({} {} {})",
            ctx.input_or_undef(self, 0)?,
            self.operator.symbol(),
            ctx.input_or_undef(self, 1)?
        ))
    }

    fn is_expression(&self) -> bool {
        true
    }

    fn save_state(&self, record: &mut SavedNode) {
        if let Ok(serde_json::Value::String(op)) = serde_json::to_value(self.operator) {
            record.set_str("operator", op);
        }
        record.set_str("operand_type.0", port_type_key(self.operand_type(0)));
        record.set_str("operand_type.1", port_type_key(self.operand_type(1)));
        record.set_str("result_type", port_type_key(self.result_type()));
    }

    fn restore_state(&mut self, record: &SavedNode, _resolver: &dyn ReferenceResolver) -> Result<()> {
        let op = record.get_str("operator")?;
        self.operator = serde_json::from_value(serde_json::Value::String(op.to_string()))
            .map_err(|_| ScadGraphError::broken(format!("unknown operator '{}'", op)))?;
        for operand in 0..2 {
            let t = saved_port_type(record, &format!("operand_type.{}", operand))?;
            self.switch_operand(operand, t)
                .map_err(|e| ScadGraphError::broken(e.to_string()))?;
        }
        self.set_result_type(saved_port_type(record, "result_type")?)
    }
}

/// Prefix operators with one operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOperator {
    Not,
    Negate,
}

impl UnaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOperator::Not => "!",
            UnaryOperator::Negate => "-",
        }
    }

    fn kind(self) -> &'static str {
        match self {
            UnaryOperator::Not => "not",
            UnaryOperator::Negate => "negate",
        }
    }

    fn operand_type(self) -> PortType {
        match self {
            UnaryOperator::Not => PortType::Boolean,
            UnaryOperator::Negate => PortType::Any,
        }
    }
}

/// Node for a [`UnaryOperator`]
#[derive(Debug, Clone)]
pub struct UnaryOperatorNode {
    core: NodeCore,
    operator: UnaryOperator,
}

impl UnaryOperatorNode {
    pub fn new(operator: UnaryOperator) -> Self {
        let t = operator.operand_type();
        let mut core = NodeCore::new();
        core.declare_ports(
            vec![PortDefinition::with_literal(t, "Value")],
            vec![PortDefinition::plain(t, "Result")],
        );
        Self { core, operator }
    }

    pub fn operator(&self) -> UnaryOperator {
        self.operator
    }
}

impl ScadNode for UnaryOperatorNode {
    fn kind(&self) -> &'static str {
        self.operator.kind()
    }

    fn core(&self) -> &NodeCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut NodeCore {
        &mut self.core
    }

    fn clone_node(&self) -> Box<dyn ScadNode> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }

    fn title(&self) -> String {
        match self.operator {
            UnaryOperator::Not => "Not".to_string(),
            UnaryOperator::Negate => "Negate".to_string(),
        }
    }

    fn render(&self, ctx: &RenderContext<'_>, _port: usize) -> Result<String> {
        Ok(format!(
            "({}{})",
            self.operator.symbol(),
            ctx.input_or_undef(self, 0)?
        ))
    }

    fn is_expression(&self) -> bool {
        true
    }
}

/// `(condition ? a : b)`
#[derive(Debug, Clone)]
pub struct TernaryOperator {
    core: NodeCore,
}

impl Default for TernaryOperator {
    fn default() -> Self {
        Self::new()
    }
}

impl TernaryOperator {
    pub fn new() -> Self {
        let mut core = NodeCore::new();
        core.declare_ports(
            vec![
                PortDefinition::with_literal(PortType::Boolean, "Condition"),
                PortDefinition::plain(PortType::Any, "True Value"),
                PortDefinition::plain(PortType::Any, "False Value"),
            ],
            vec![PortDefinition::plain(PortType::Any, "Result")],
        );
        Self { core }
    }
}

impl ScadNode for TernaryOperator {
    crate::node_boilerplate!("ternary");

    fn title(&self) -> String {
        "Conditional (?:)".to_string()
    }

    fn render(&self, ctx: &RenderContext<'_>, _port: usize) -> Result<String> {
        Ok(format!(
            "({} ? {} : {})",
            ctx.input_or_undef(self, 0)?,
            ctx.input_or_undef(self, 1)?,
            ctx.input_or_undef(self, 2)?
        ))
    }

    fn is_expression(&self) -> bool {
        true
    }
}

/// `(a + b + ...)` over every connection on its input
#[derive(Debug, Clone)]
pub struct Sum {
    core: NodeCore,
}

impl Default for Sum {
    fn default() -> Self {
        Self::new()
    }
}

impl Sum {
    pub fn new() -> Self {
        let mut core = NodeCore::new();
        core.declare_ports(
            vec![PortDefinition::plain(PortType::Any, "Values")],
            vec![PortDefinition::plain(PortType::Any, "Sum")],
        );
        Self { core }
    }

    /// Numbers and vectors can be summed, as long as they are not mixed
    pub fn supports(port_type: PortType) -> bool {
        matches!(
            port_type,
            PortType::Any | PortType::Number | PortType::Vector | PortType::Vector2 | PortType::Vector3
        )
    }

    pub fn value_type(&self) -> PortType {
        self.core
            .port_type(PortId::input(0))
            .unwrap_or(PortType::Any)
    }

    /// Retype input and output together
    pub fn switch_type(&mut self, port_type: PortType) -> Result<()> {
        if !Self::supports(port_type) {
            return Err(ScadGraphError::invariant(format!("cannot sum {} values", port_type)));
        }
        for port in [PortId::input(0), PortId::output(0)] {
            let definition = self
                .core
                .port_definition(port)
                .map(|d| d.retyped(port_type))
                .ok_or_else(|| ScadGraphError::invariant("sum lost its ports"))?;
            self.core.set_port_definition(port, definition)?;
        }
        Ok(())
    }
}

impl ScadNode for Sum {
    crate::node_boilerplate!("sum");

    fn title(&self) -> String {
        "Sum".to_string()
    }

    fn render(&self, ctx: &RenderContext<'_>, _port: usize) -> Result<String> {
        let values = ctx.inputs(self, 0)?;
        Ok(match values.len() {
            0 => "undef".to_string(),
            1 => values.join(""),
            _ => format!("({})", values.join(" + ")),
        })
    }

    fn is_expression(&self) -> bool {
        true
    }

    fn accepts_multiple_inputs(&self, port: usize) -> bool {
        port == 0
    }

    fn save_state(&self, record: &mut SavedNode) {
        record.set_str("value_type", port_type_key(self.value_type()));
    }

    fn restore_state(&mut self, record: &SavedNode, _resolver: &dyn ReferenceResolver) -> Result<()> {
        let t = saved_port_type(record, "value_type")?;
        self.switch_type(t)
            .map_err(|e| ScadGraphError::broken(e.to_string()))
    }
}

fn target_operator<'a>(candidate: &Candidate<'a>) -> Option<&'a BinaryOperatorNode> {
    candidate
        .target()?
        .as_any()
        .downcast_ref::<BinaryOperatorNode>()
}

fn schedule_fix(candidate: &Candidate<'_>) -> Vec<Box<dyn crate::refactoring::Refactoring>> {
    vec![Box::new(FixOperatorPortTypes::new(
        candidate.graph.id(),
        &candidate.connection.to,
    ))]
}

fn target_sum<'a>(candidate: &Candidate<'a>) -> Option<&'a Sum> {
    candidate.target()?.as_any().downcast_ref::<Sum>()
}

fn schedule_sum_fix(candidate: &Candidate<'_>) -> Vec<Box<dyn crate::refactoring::Refactoring>> {
    vec![Box::new(FixSumPortTypes::new(
        candidate.graph.id(),
        &candidate.connection.to,
    ))]
}

/// Operator rules: supported operand types are allowed even when another
/// type is currently selected, unsupported ones are vetoed, and any
/// change on an operator input retypes the operator afterwards. Sums work
/// the same way over their single input.
pub fn register_rules(rules: &mut ConnectionRules) {
    rules.add_connect_rule(ConnectionRule::new(
        "operator_rejects_unsupported_type",
        Decision::Veto,
        |c| match (target_operator(c), c.source_type()) {
            (Some(op), Some(t)) => !op.operator().supports(t),
            _ => false,
        },
    ));
    rules.add_connect_rule(ConnectionRule::new(
        "operator_accepts_supported_type",
        Decision::Allow,
        |c| match (target_operator(c), c.source_type()) {
            (Some(op), Some(t)) => op.operator().supports(t),
            _ => false,
        },
    ));
    rules.add_connect_rule(
        ConnectionRule::new("operator_retype_on_connect", Decision::Undecided, |c| {
            target_operator(c).is_some()
        })
        .with_side_effect(schedule_fix),
    );
    rules.add_disconnect_rule(
        ConnectionRule::new("operator_retype_on_disconnect", Decision::Undecided, |c| {
            target_operator(c).is_some()
        })
        .with_side_effect(schedule_fix),
    );

    rules.add_connect_rule(ConnectionRule::new(
        "sum_rejects_unsupported_type",
        Decision::Veto,
        |c| match (target_sum(c), c.source_type()) {
            (Some(_), Some(t)) => !Sum::supports(t),
            _ => false,
        },
    ));
    rules.add_connect_rule(ConnectionRule::new(
        "sum_accepts_supported_type",
        Decision::Allow,
        |c| match (target_sum(c), c.source_type()) {
            (Some(_), Some(t)) => Sum::supports(t),
            _ => false,
        },
    ));
    // a value of another kind replaces the values that no longer fit
    rules.add_connect_rule(
        ConnectionRule::new("sum_drops_mismatched_values", Decision::Undecided, |c| {
            match (target_sum(c), c.source_type()) {
                (Some(sum), Some(t)) => !t.is_assignable_to(sum.value_type()),
                _ => false,
            }
        })
        .with_side_effect(|c| {
            let Some(t) = c.source_type() else {
                return Vec::new();
            };
            let drop: Box<dyn crate::refactoring::Refactoring> = Box::new(
                DeleteUnassignableConnections::new(c.graph.id(), &c.connection.to, t),
            );
            vec![drop]
        }),
    );
    rules.add_connect_rule(
        ConnectionRule::new("sum_retype_on_connect", Decision::Undecided, |c| {
            target_sum(c).is_some()
        })
        .with_side_effect(schedule_sum_fix),
    );
    rules.add_disconnect_rule(
        ConnectionRule::new("sum_retype_on_disconnect", Decision::Undecided, |c| {
            target_sum(c).is_some()
        })
        .with_side_effect(schedule_sum_fix),
    );
}
