//! Editing session over one project
//!
//! The [`Workspace`] is the outer surface of the crate: it runs batches of
//! refactorings as transactions, keeps the history, and renders or stores
//! the project. A transaction either commits completely or leaves the
//! project exactly as it was.

use std::path::Path;
use std::sync::Arc;

use crate::config::EditorConfig;
use crate::error::{Result, ScadGraphError};
use crate::graph::Connection;
use crate::history::HistoryStack;
use crate::persistence::SavedProject;
use crate::project::{ReferenceResolver, ScadProject};
use crate::refactoring::{Refactoring, RefactoringContext};
use crate::rules::{ConnectionRules, RuleFlags, RuleOutcome};
use crate::validation::validate_project;

/// One open project with its rules, history and settings
#[derive(Debug)]
pub struct Workspace {
    project: ScadProject,
    rules: ConnectionRules,
    history: HistoryStack,
    config: EditorConfig,
}

impl Workspace {
    /// Open a project; its current state becomes the first history entry
    pub fn new(project: ScadProject, rules: ConnectionRules, config: EditorConfig) -> Result<Self> {
        let mut history = HistoryStack::new(&config.history);
        history.push("Open", &project.save())?;
        Ok(Self {
            project,
            rules,
            history,
            config,
        })
    }

    /// Read a project file
    pub fn load(
        path: &Path,
        parent: Arc<dyn ReferenceResolver>,
        rules: ConnectionRules,
        config: EditorConfig,
    ) -> Result<Self> {
        let saved = SavedProject::read_from(path)?;
        let project = ScadProject::load(&saved, parent)?;
        log::info!("loaded project from {}", path.display());
        Self::new(project, rules, config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        self.project.save().write_to(path)?;
        log::info!("saved project to {}", path.display());
        Ok(())
    }

    pub fn project(&self) -> &ScadProject {
        &self.project
    }

    pub fn rules(&self) -> &ConnectionRules {
        &self.rules
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn history(&self) -> &HistoryStack {
        &self.history
    }

    /// Run a batch of refactorings as one transaction.
    ///
    /// Primary refactorings run in order, then the late queue is drained and
    /// the whole project is validated. Any failure restores the project to
    /// its state before the call.
    pub fn perform(&mut self, title: &str, refactorings: Vec<Box<dyn Refactoring>>) -> Result<()> {
        let snapshot = self.project.clone();
        let committed = self
            .run_transaction(refactorings)
            .and_then(|performed| {
                self.history.push(title, &self.project.save())?;
                Ok(performed)
            });
        match committed {
            Ok(performed) => {
                log::info!("committed '{}' ({} refactorings)", title, performed);
                Ok(())
            }
            Err(e) => {
                self.project = snapshot;
                log::info!("rolled back '{}': {}", title, e);
                Err(e)
            }
        }
    }

    /// Single-refactoring convenience over [`Workspace::perform`]
    pub fn perform_one(&mut self, title: &str, refactoring: impl Refactoring + 'static) -> Result<()> {
        self.perform(title, vec![Box::new(refactoring)])
    }

    fn run_transaction(&mut self, refactorings: Vec<Box<dyn Refactoring>>) -> Result<usize> {
        let performed = {
            let mut ctx = RefactoringContext::new(
                &mut self.project,
                &self.rules,
                self.config.max_late_refactorings,
            );
            ctx.run(refactorings)?;
            ctx.performed().len()
        };

        let errors = validate_project(&self.project, &self.rules);
        if let Some(first) = errors.first() {
            for error in &errors {
                log::warn!("validation: {}", error);
            }
            return Err(ScadGraphError::invariant(format!(
                "transaction left {} problem(s), first: {}",
                errors.len(),
                first
            )));
        }
        Ok(performed)
    }

    /// Whether a connection would be accepted right now
    pub fn can_connect(&self, graph_id: &str, connection: &Connection) -> Result<RuleOutcome> {
        let graph = self.project.graph(graph_id)?;
        Ok(self.rules.can_connect(graph, connection, RuleFlags::default()))
    }

    pub fn can_disconnect(&self, graph_id: &str, connection: &Connection) -> Result<RuleOutcome> {
        let graph = self.project.graph(graph_id)?;
        Ok(self.rules.can_disconnect(graph, connection))
    }

    /// The whole program as OpenSCAD text
    pub fn render(&self) -> Result<String> {
        self.project.render(&self.config.render)
    }

    pub fn render_graph(&self, graph_id: &str) -> Result<String> {
        self.project.render_graph(graph_id, &self.config.render)
    }

    /// Revert the last committed transaction. Returns `false` when there is
    /// nothing to undo.
    pub fn undo(&mut self) -> Result<bool> {
        let title = self.history.undo_title().map(str::to_string);
        match self.history.undo() {
            Some(saved) => {
                self.restore(&saved?)?;
                log::info!("undid '{}'", title.unwrap_or_default());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Re-apply the last undone transaction. Returns `false` when there is
    /// nothing to redo.
    pub fn redo(&mut self) -> Result<bool> {
        let title = self.history.redo_title().map(str::to_string);
        match self.history.redo() {
            Some(saved) => {
                self.restore(&saved?)?;
                log::info!("redid '{}'", title.unwrap_or_default());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn restore(&mut self, saved: &SavedProject) -> Result<()> {
        let parent = self.project.parent().clone();
        self.project = ScadProject::load(saved, parent)?;
        Ok(())
    }
}
