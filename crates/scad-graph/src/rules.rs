//! Connection rule engine
//!
//! A rule is a predicate over a candidate connection plus a decision and an
//! optional side-effect factory. Aggregation:
//!
//! - the first matching `Veto` ends evaluation; nothing is scheduled;
//! - otherwise any matching `Allow` allows;
//! - otherwise the default applies: connect is vetoed, disconnect allowed.
//!
//! Side effects come from matching `Undecided` rules and are only handed
//! out when the attempt is not vetoed. Late side effects are queued by the
//! refactoring context and run once the batch settles.

use std::fmt;

use crate::graph::{Connection, ScadGraph};
use crate::node::ScadNode;
use crate::port::{PortId, PortType};
use crate::refactoring::connections::DeleteInputConnections;
use crate::refactoring::Refactoring;

/// Verdict of one rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Veto,
    Undecided,
}

/// Evaluation mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleFlags {
    /// Re-checking a connection that already exists: skip the duplicate and
    /// cycle rules and collect no side effects
    pub revalidating: bool,
}

impl RuleFlags {
    pub fn revalidating() -> Self {
        Self { revalidating: true }
    }
}

/// A connection under evaluation
pub struct Candidate<'a> {
    pub graph: &'a ScadGraph,
    pub connection: &'a Connection,
    pub flags: RuleFlags,
}

impl<'a> Candidate<'a> {
    pub fn source(&self) -> Option<&'a dyn ScadNode> {
        self.graph.find_node(&self.connection.from)
    }

    pub fn target(&self) -> Option<&'a dyn ScadNode> {
        self.graph.find_node(&self.connection.to)
    }

    pub fn source_type(&self) -> Option<PortType> {
        self.source()?
            .port_type(PortId::output(self.connection.from_port))
    }

    pub fn target_type(&self) -> Option<PortType> {
        self.target()?
            .port_type(PortId::input(self.connection.to_port))
    }
}

type Predicate = Box<dyn Fn(&Candidate<'_>) -> bool + Send + Sync>;
type SideEffectFactory = Box<dyn Fn(&Candidate<'_>) -> Vec<Box<dyn Refactoring>> + Send + Sync>;

/// One entry in the rule registry
pub struct ConnectionRule {
    name: &'static str,
    decision: Decision,
    predicate: Predicate,
    side_effects: Option<SideEffectFactory>,
}

impl ConnectionRule {
    pub fn new(
        name: &'static str,
        decision: Decision,
        predicate: impl Fn(&Candidate<'_>) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            decision,
            predicate: Box::new(predicate),
            side_effects: None,
        }
    }

    pub fn with_side_effect(
        mut self,
        factory: impl Fn(&Candidate<'_>) -> Vec<Box<dyn Refactoring>> + Send + Sync + 'static,
    ) -> Self {
        self.side_effects = Some(Box::new(factory));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn decision(&self) -> Decision {
        self.decision
    }
}

impl fmt::Debug for ConnectionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRule")
            .field("name", &self.name)
            .field("decision", &self.decision)
            .field("side_effects", &self.side_effects.is_some())
            .finish()
    }
}

/// Aggregated verdict plus the refactorings it asks for
#[derive(Debug)]
pub struct RuleOutcome {
    pub decision: Decision,
    pub side_effects: Vec<Box<dyn Refactoring>>,
}

impl RuleOutcome {
    pub fn is_allowed(&self) -> bool {
        self.decision == Decision::Allow
    }

    pub fn is_vetoed(&self) -> bool {
        self.decision == Decision::Veto
    }
}

/// Rules consulted on connect and disconnect
#[derive(Debug, Default)]
pub struct ConnectionRules {
    connect: Vec<ConnectionRule>,
    disconnect: Vec<ConnectionRule>,
}

/// Rules skipped while re-validating existing connections
const STRUCTURAL_ONLY: [&str; 2] = ["duplicate_connection", "cycle"];

impl ConnectionRules {
    /// No rules: everything is vetoed on connect and allowed on disconnect
    pub fn empty() -> Self {
        Self::default()
    }

    /// Global rules plus every node family's own rules
    pub fn standard() -> Self {
        let mut rules = Self::empty();
        register_global_rules(&mut rules);
        crate::nodes::comprehension::register_rules(&mut rules);
        crate::nodes::operators::register_rules(&mut rules);
        rules
    }

    pub fn add_connect_rule(&mut self, rule: ConnectionRule) {
        self.connect.push(rule);
    }

    pub fn add_disconnect_rule(&mut self, rule: ConnectionRule) {
        self.disconnect.push(rule);
    }

    pub fn connect_rules(&self) -> &[ConnectionRule] {
        &self.connect
    }

    pub fn can_connect(&self, graph: &ScadGraph, connection: &Connection, flags: RuleFlags) -> RuleOutcome {
        evaluate(&self.connect, graph, connection, flags, Decision::Veto)
    }

    pub fn can_disconnect(&self, graph: &ScadGraph, connection: &Connection) -> RuleOutcome {
        evaluate(
            &self.disconnect,
            graph,
            connection,
            RuleFlags::default(),
            Decision::Allow,
        )
    }
}

fn evaluate(
    rules: &[ConnectionRule],
    graph: &ScadGraph,
    connection: &Connection,
    flags: RuleFlags,
    default: Decision,
) -> RuleOutcome {
    let candidate = Candidate {
        graph,
        connection,
        flags,
    };
    let mut allowed = false;
    let mut side_effects = Vec::new();
    for rule in rules {
        if flags.revalidating && STRUCTURAL_ONLY.contains(&rule.name) {
            continue;
        }
        if !(rule.predicate)(&candidate) {
            continue;
        }
        match rule.decision {
            Decision::Veto => {
                log::trace!("rule '{}' vetoes {}", rule.name, connection);
                return RuleOutcome {
                    decision: Decision::Veto,
                    side_effects: Vec::new(),
                };
            }
            Decision::Allow => allowed = true,
            Decision::Undecided => {
                if let (false, Some(factory)) = (flags.revalidating, &rule.side_effects) {
                    side_effects.extend(factory(&candidate));
                }
            }
        }
    }
    let decision = if allowed { Decision::Allow } else { default };
    if decision == Decision::Veto {
        side_effects.clear();
    }
    RuleOutcome {
        decision,
        side_effects,
    }
}

fn register_global_rules(rules: &mut ConnectionRules) {
    rules.add_connect_rule(ConnectionRule::new("missing_endpoint", Decision::Veto, |c| {
        c.source_type().is_none() || c.target_type().is_none()
    }));
    rules.add_connect_rule(ConnectionRule::new("self_connection", Decision::Veto, |c| {
        c.connection.from == c.connection.to
    }));
    rules.add_connect_rule(ConnectionRule::new(
        "duplicate_connection",
        Decision::Veto,
        |c| c.graph.has_connection(c.connection),
    ));
    rules.add_connect_rule(ConnectionRule::new("cycle", Decision::Veto, |c| {
        c.graph.would_create_cycle(c.connection)
    }));
    rules.add_connect_rule(
        ConnectionRule::new("supersede_input", Decision::Undecided, |c| {
            let fan_in = c
                .target()
                .map(|t| t.accepts_multiple_inputs(c.connection.to_port))
                .unwrap_or(false);
            !fan_in
                && c.target_type()
                    .map(|t| t != PortType::Geometry)
                    .unwrap_or(false)
        })
        .with_side_effect(|c| {
            let supersede: Box<dyn Refactoring> = Box::new(DeleteInputConnections::new(
                c.graph.id(),
                &c.connection.to,
                c.connection.to_port,
            ));
            vec![supersede]
        }),
    );
    rules.add_connect_rule(ConnectionRule::new("assignable_types", Decision::Allow, |c| {
        match (c.source_type(), c.target_type()) {
            (Some(from), Some(to)) => from.is_assignable_to(to),
            _ => false,
        }
    }));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::GraphBuilder;
    use crate::builtins::BuiltIns;
    use crate::nodes::comprehension::{ConstructVector, Each};
    use crate::nodes::constants::ConstantValue;
    use crate::nodes::csg::Difference;
    use crate::nodes::invocation::ModuleInvocation;
    use crate::nodes::operators::{BinaryOperator, BinaryOperatorNode};

    fn graph() -> ScadGraph {
        let cube = BuiltIns::new().find_by_name("cube").unwrap();
        GraphBuilder::main()
            .add(ModuleInvocation::new(&cube).unwrap(), "cube", (0.0, 0.0))
            .add(Difference::new(), "diff", (0.0, 10.0))
            .add(Difference::new(), "outer", (0.0, 20.0))
            .add(ConstantValue::number(1.0), "one", (0.0, 30.0))
            .add(ConstantValue::string("x"), "text", (0.0, 40.0))
            .add(BinaryOperatorNode::new(BinaryOperator::Add), "add", (0.0, 50.0))
            .add(Each::new(), "each", (0.0, 60.0))
            .add(ConstructVector::new(), "vec", (0.0, 70.0))
            .connect("diff", 0, "outer", 0)
            .build()
            .unwrap()
    }

    fn decide(graph: &ScadGraph, c: Connection) -> Decision {
        ConnectionRules::standard()
            .can_connect(graph, &c, RuleFlags::default())
            .decision
    }

    #[test]
    fn test_geometry_and_types() {
        let g = graph();
        assert_eq!(decide(&g, Connection::new("cube", 0, "diff", 0)), Decision::Allow);
        assert_eq!(decide(&g, Connection::new("one", 0, "diff", 0)), Decision::Veto);
        assert_eq!(decide(&g, Connection::new("cube", 0, "cube", 0)), Decision::Veto);
        assert_eq!(decide(&g, Connection::new("cube", 5, "diff", 0)), Decision::Veto);
    }

    #[test]
    fn test_duplicates_and_cycles() {
        let g = graph();
        assert_eq!(decide(&g, Connection::new("diff", 0, "outer", 0)), Decision::Veto);
        assert_eq!(decide(&g, Connection::new("outer", 0, "diff", 1)), Decision::Veto);
        let revalidated = ConnectionRules::standard().can_connect(
            &g,
            &Connection::new("diff", 0, "outer", 0),
            RuleFlags::revalidating(),
        );
        assert!(revalidated.is_allowed());
        assert!(revalidated.side_effects.is_empty());
    }

    #[test]
    fn test_operator_support_overrides_current_type() {
        let g = graph();
        assert_eq!(decide(&g, Connection::new("one", 0, "add", 0)), Decision::Allow);
        assert_eq!(decide(&g, Connection::new("text", 0, "add", 0)), Decision::Veto);
        let outcome = ConnectionRules::standard().can_connect(
            &g,
            &Connection::new("one", 0, "add", 1),
            RuleFlags::default(),
        );
        let names: Vec<String> = outcome.side_effects.iter().map(|r| r.name()).collect();
        assert_eq!(names.len(), 2);
        assert!(outcome.side_effects.iter().any(|r| r.is_late()));
    }

    #[test]
    fn test_comprehension_consumers() {
        let g = graph();
        assert_eq!(decide(&g, Connection::new("each", 0, "add", 0)), Decision::Veto);
        assert_eq!(decide(&g, Connection::new("each", 0, "vec", 0)), Decision::Allow);
    }

    #[test]
    fn test_veto_discards_side_effects_and_defaults() {
        let g = graph();
        let outcome = ConnectionRules::standard().can_connect(
            &g,
            &Connection::new("text", 0, "add", 0),
            RuleFlags::default(),
        );
        assert!(outcome.is_vetoed());
        assert!(outcome.side_effects.is_empty());

        let empty = ConnectionRules::empty();
        let c = Connection::new("cube", 0, "diff", 0);
        assert!(empty.can_connect(&g, &c, RuleFlags::default()).is_vetoed());
        assert!(empty.can_disconnect(&g, &c).is_allowed());
    }
}
