//! Refactoring engine
//!
//! Every mutation of a project goes through a [`Refactoring`] performed
//! against a [`RefactoringContext`]. Refactorings compose: a high-level edit
//! performs primitive ones through the same context.
//!
//! Refactorings flagged as late are not run when performed. They are queued
//! (deduplicated by [`Refactoring::late_key`]) and drained after the batch's
//! primary refactorings have completed, so connection fixups settle once per
//! batch. A late refactoring may queue further late refactorings; the queue
//! is bounded by `max_late_refactorings`.

pub mod arity;
pub mod connections;
pub mod invokables;
pub mod nodes;
pub mod operators;
pub mod variables;

use std::collections::{HashSet, VecDeque};
use std::fmt;

use crate::error::{Result, ScadGraphError};
use crate::graph::{Connection, ScadGraph};
use crate::nodes::operators::{BinaryOperatorNode, Sum};
use crate::project::ScadProject;
use crate::rules::{ConnectionRules, RuleFlags, RuleOutcome};

use connections::DeleteConnection;
use operators::{FixOperatorPortTypes, FixSumPortTypes};

/// A named, composable edit
pub trait Refactoring: fmt::Debug {
    /// Short human-readable name, used in logs
    fn name(&self) -> String;

    /// Deferred until the batch's primary refactorings are done
    fn is_late(&self) -> bool {
        false
    }

    /// Late refactorings with equal keys are queued once
    fn late_key(&self) -> Option<String> {
        None
    }

    fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()>;
}

/// The only mutation surface for refactorings
pub struct RefactoringContext<'a> {
    project: &'a mut ScadProject,
    rules: &'a ConnectionRules,
    late: VecDeque<Box<dyn Refactoring>>,
    late_keys: HashSet<String>,
    late_budget: usize,
    late_drained: usize,
    performed: Vec<String>,
}

impl<'a> RefactoringContext<'a> {
    pub fn new(project: &'a mut ScadProject, rules: &'a ConnectionRules, late_budget: usize) -> Self {
        Self {
            project,
            rules,
            late: VecDeque::new(),
            late_keys: HashSet::new(),
            late_budget,
            late_drained: 0,
            performed: Vec::new(),
        }
    }

    pub fn project(&self) -> &ScadProject {
        self.project
    }

    pub fn project_mut(&mut self) -> &mut ScadProject {
        self.project
    }

    pub fn rules(&self) -> &'a ConnectionRules {
        self.rules
    }

    pub fn graph(&self, id: &str) -> Result<&ScadGraph> {
        self.project.graph(id)
    }

    pub fn graph_mut(&mut self, id: &str) -> Result<&mut ScadGraph> {
        self.project.graph_mut(id)
    }

    pub fn perform(&mut self, refactoring: impl Refactoring + 'static) -> Result<()> {
        self.perform_boxed(Box::new(refactoring))
    }

    /// Run now, or queue if late
    pub fn perform_boxed(&mut self, refactoring: Box<dyn Refactoring>) -> Result<()> {
        if refactoring.is_late() {
            self.schedule_late(refactoring);
            return Ok(());
        }
        log::debug!("performing {}", refactoring.name());
        refactoring.perform(self)?;
        self.performed.push(refactoring.name());
        Ok(())
    }

    fn schedule_late(&mut self, refactoring: Box<dyn Refactoring>) {
        if let Some(key) = refactoring.late_key() {
            if !self.late_keys.insert(key) {
                log::trace!("{} already queued", refactoring.name());
                return;
            }
        }
        self.late.push_back(refactoring);
    }

    /// Perform a batch of primary refactorings, then drain the late queue
    pub fn run(&mut self, batch: Vec<Box<dyn Refactoring>>) -> Result<()> {
        for refactoring in batch {
            self.perform_boxed(refactoring)?;
        }
        self.drain_late()
    }

    /// Run queued late refactorings until the queue is empty
    pub fn drain_late(&mut self) -> Result<()> {
        while let Some(refactoring) = self.late.pop_front() {
            if let Some(key) = refactoring.late_key() {
                self.late_keys.remove(&key);
            }
            self.late_drained += 1;
            if self.late_drained > self.late_budget {
                return Err(ScadGraphError::invariant(format!(
                    "late refactorings did not settle after {} steps",
                    self.late_budget
                )));
            }
            log::debug!("late {}", refactoring.name());
            refactoring.perform(self)?;
            self.performed.push(refactoring.name());
        }
        Ok(())
    }

    pub fn has_pending_late(&self) -> bool {
        !self.late.is_empty()
    }

    /// Names of every refactoring performed so far, in order
    pub fn performed(&self) -> &[String] {
        &self.performed
    }

    pub fn can_connect(&self, graph_id: &str, connection: &Connection) -> Result<RuleOutcome> {
        let graph = self.graph(graph_id)?;
        Ok(self.rules.can_connect(graph, connection, RuleFlags::default()))
    }

    /// Re-check existing connections; the ones no longer allowed are deleted
    pub fn revalidate(&mut self, graph_id: &str, connections: Vec<Connection>) -> Result<()> {
        for connection in connections {
            let allowed = {
                let graph = self.graph(graph_id)?;
                if !graph.has_connection(&connection) {
                    continue;
                }
                self.rules
                    .can_connect(graph, &connection, RuleFlags::revalidating())
                    .is_allowed()
            };
            if !allowed {
                log::debug!("{} is no longer allowed in '{}'", connection, graph_id);
                self.perform(DeleteConnection::new(graph_id, connection))?;
            }
        }
        Ok(())
    }

    /// Queue a type fixup for every switchable operator or sum among `node_ids`
    pub fn schedule_operator_fixups<I, S>(&mut self, graph_id: &str, node_ids: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut fixups: Vec<Box<dyn Refactoring>> = Vec::new();
        {
            let graph = self.graph(graph_id)?;
            for id in node_ids {
                let Some(node) = graph.find_node(id.as_ref()) else {
                    continue;
                };
                if node.as_any().is::<BinaryOperatorNode>() {
                    fixups.push(Box::new(FixOperatorPortTypes::new(graph_id, id.as_ref())));
                } else if node.as_any().is::<Sum>() {
                    fixups.push(Box::new(FixSumPortTypes::new(graph_id, id.as_ref())));
                }
            }
        }
        for fixup in fixups {
            self.perform_boxed(fixup)?;
        }
        Ok(())
    }
}

impl fmt::Debug for RefactoringContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefactoringContext")
            .field("late", &self.late.len())
            .field("late_drained", &self.late_drained)
            .field("performed", &self.performed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builtins::BuiltIns;
    use crate::library::MAIN_MODULE_ID;
    use crate::nodes::csg::Difference;
    use crate::node::ScadNode;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::sync::Arc;

    #[derive(Debug)]
    struct Counting {
        key: &'static str,
        hits: Rc<Cell<usize>>,
        late: bool,
    }

    impl Refactoring for Counting {
        fn name(&self) -> String {
            format!("Count {}", self.key)
        }

        fn is_late(&self) -> bool {
            self.late
        }

        fn late_key(&self) -> Option<String> {
            Some(self.key.to_string())
        }

        fn perform(&self, _ctx: &mut RefactoringContext<'_>) -> Result<()> {
            self.hits.set(self.hits.get() + 1);
            Ok(())
        }
    }

    /// Re-queues itself forever
    #[derive(Debug)]
    struct Restless;

    impl Refactoring for Restless {
        fn name(&self) -> String {
            "Restless".to_string()
        }

        fn is_late(&self) -> bool {
            true
        }

        fn perform(&self, ctx: &mut RefactoringContext<'_>) -> Result<()> {
            ctx.perform(Restless)
        }
    }

    fn project() -> ScadProject {
        ScadProject::new(Arc::new(BuiltIns::new()))
    }

    #[test]
    fn test_late_refactorings_run_after_primaries_once_per_key() {
        let mut project = project();
        let rules = ConnectionRules::standard();
        let hits = Rc::new(Cell::new(0));
        let mut ctx = RefactoringContext::new(&mut project, &rules, 10);
        for _ in 0..3 {
            ctx.perform(Counting {
                key: "a",
                hits: hits.clone(),
                late: true,
            })
            .unwrap();
        }
        assert_eq!(hits.get(), 0);
        assert!(ctx.has_pending_late());
        ctx.drain_late().unwrap();
        assert_eq!(hits.get(), 1);
        assert_eq!(ctx.performed(), ["Count a".to_string()]);
    }

    #[test]
    fn test_late_budget_aborts_runaway_cascade() {
        let mut project = project();
        let rules = ConnectionRules::standard();
        let mut ctx = RefactoringContext::new(&mut project, &rules, 5);
        let err = ctx.run(vec![Box::new(Restless)]).unwrap_err();
        assert!(matches!(err, ScadGraphError::InvariantViolation(_)));
    }

    #[test]
    fn test_revalidate_skips_missing_connections() {
        let mut project = project();
        let main = project.graph_mut(MAIN_MODULE_ID).unwrap();
        let mut a = Difference::new();
        a.core_mut().set_id("a");
        let mut b = Difference::new();
        b.core_mut().set_id("b");
        main.add_node(Box::new(a)).unwrap();
        main.add_node(Box::new(b)).unwrap();
        main.add_connection(Connection::new("a", 0, "b", 0)).unwrap();

        let rules = ConnectionRules::standard();
        let mut ctx = RefactoringContext::new(&mut project, &rules, 10);
        ctx.revalidate(
            MAIN_MODULE_ID,
            vec![
                Connection::new("a", 0, "b", 0),
                Connection::new("b", 0, "a", 0),
            ],
        )
        .unwrap();
        assert_eq!(ctx.graph(MAIN_MODULE_ID).unwrap().connections().len(), 1);
    }
}
