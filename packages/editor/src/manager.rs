//! # Command Manager
//!
//! Executes commands against a document and keeps its undo/redo history.
//!
//! ```text
//! view ──command──▶ plan ──▶ apply steps ──▶ record ──▶ publish events ──▶ views
//!                     │            │
//!                  rejected    rolled back
//! ```
//!
//! Every transition (execute, undo, redo) is atomic: either every step of
//! the transaction lands, or the document is left exactly as it was and no
//! event is published.

use crate::config::EditorConfig;
use crate::document::Document;
use crate::events::{AdvisoryEvent, ChangeEvent, ChangeKind, Phase};
use crate::history::{History, Transaction};
use crate::step::{self, Step};
use crate::view::SharedView;
use crate::{Command, EditorResult, ViewId};
use arbor_model::NodeId;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// What `execute` did with a command that applied cleanly
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// Pushed as a new history entry
    Recorded { transaction: u64 },
    /// Coalesced into the entry on top of the undo stack
    Merged { transaction: u64 },
    /// Added to the open group
    Grouped { transaction: u64 },
    /// Nothing would change; nothing was recorded or published
    Unchanged,
}

impl ExecuteOutcome {
    pub fn transaction(&self) -> Option<u64> {
        match self {
            ExecuteOutcome::Recorded { transaction }
            | ExecuteOutcome::Merged { transaction }
            | ExecuteOutcome::Grouped { transaction } => Some(*transaction),
            ExecuteOutcome::Unchanged => None,
        }
    }

    pub fn changed(&self) -> bool {
        !matches!(self, ExecuteOutcome::Unchanged)
    }
}

struct OpenGroup {
    transaction: Transaction,
    depth: usize,
}

pub struct CommandManager {
    document: Document,
    history: History,
    config: EditorConfig,
    group: Option<OpenGroup>,
    next_transaction: u64,
}

impl CommandManager {
    pub fn new(document: Document) -> Self {
        Self::with_config(document, EditorConfig::default())
    }

    pub fn with_config(document: Document, config: EditorConfig) -> Self {
        Self {
            document,
            history: History::with_max_levels(config.history_limit),
            config,
            group: None,
            next_transaction: 0,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn register_view(&mut self, view: SharedView) -> ViewId {
        self.document.register_view(view)
    }

    pub fn unregister_view(&mut self, id: ViewId) -> bool {
        self.document.unregister_view(id)
    }

    /// Forward background results to views; they never touch history
    pub fn publish_advisories(&mut self, events: &[AdvisoryEvent]) {
        for event in events {
            self.document.publish_advisory(event);
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_transaction += 1;
        self.next_transaction
    }

    /// Execute a command on behalf of no particular view
    pub fn execute(&mut self, command: Command) -> EditorResult<ExecuteOutcome> {
        self.execute_from(ViewId::SYSTEM, command)
    }

    #[instrument(level = "debug", skip_all, fields(command = command.name(), origin = %origin))]
    pub fn execute_from(
        &mut self,
        origin: ViewId,
        command: Command,
    ) -> EditorResult<ExecuteOutcome> {
        let root = self.document.root();
        let plan = command
            .plan(self.document.arena_mut(), root)
            .inspect_err(|err| warn!(error = %err, "command rejected"))?;

        if plan.steps.is_empty() {
            self.free_detached(&plan.allocated);
            debug!("command changes nothing");
            return Ok(ExecuteOutcome::Unchanged);
        }

        if let Err(err) = step::apply_all(self.document.arena_mut(), &plan.steps) {
            self.free_detached(&plan.allocated);
            warn!(error = %err, "command failed to apply, rolled back");
            return Err(err.into());
        }
        self.document.bump_version();

        let changes: Vec<(NodeId, ChangeKind)> =
            plan.steps.iter().map(Step::forward_change).collect();
        let now = Instant::now();

        let outcome = if self.group.is_some() {
            let discarded = self.history.take_redo();
            self.reclaim(&[], &discarded);
            match self.group.as_mut() {
                Some(group) => {
                    group.transaction.commands.push(command);
                    group.transaction.absorb_steps(plan.steps);
                    group.transaction.touched_at = now;
                    ExecuteOutcome::Grouped {
                        transaction: group.transaction.id,
                    }
                }
                None => ExecuteOutcome::Unchanged,
            }
        } else {
            let id = self.next_id();
            let transaction = Transaction::single(id, origin, command, plan.steps, now);
            let pushed = self.history.push(transaction, self.config.merge_window());
            self.reclaim(&pushed.evicted, &pushed.discarded);
            match pushed.merged_into {
                Some(transaction) => ExecuteOutcome::Merged { transaction },
                None => ExecuteOutcome::Recorded { transaction: id },
            }
        };

        let transaction = outcome.transaction().unwrap_or_default();
        debug!(transaction, version = self.document.version(), "command applied");
        let events = changes
            .into_iter()
            .map(|(node, kind)| ChangeEvent::new(transaction, Phase::Execute, origin, node, kind))
            .collect();
        self.document.publish(events);

        Ok(outcome)
    }

    pub fn undo(&mut self) -> bool {
        self.undo_from(ViewId::SYSTEM)
    }

    /// Revert the most recent transaction. Returns false when there is
    /// nothing to undo or the revert failed (the document is then unchanged).
    #[instrument(level = "debug", skip(self))]
    pub fn undo_from(&mut self, origin: ViewId) -> bool {
        self.close_groups();

        let Some(transaction) = self.history.pop_undo() else {
            debug!("nothing to undo");
            return false;
        };

        if let Err(err) = step::revert_all(self.document.arena_mut(), &transaction.steps) {
            error!(transaction = transaction.id, error = %err, "undo failed, history entry kept");
            self.history.restore_undo(transaction);
            return false;
        }
        self.document.bump_version();

        let events = transaction
            .steps
            .iter()
            .rev()
            .map(|step| {
                let (node, kind) = step.reverse_change();
                ChangeEvent::new(transaction.id, Phase::Undo, origin, node, kind)
            })
            .collect();
        info!(transaction = transaction.id, description = %transaction.description, "undo");

        self.history.push_undone(transaction);
        self.document.publish(events);
        true
    }

    pub fn redo(&mut self) -> bool {
        self.redo_from(ViewId::SYSTEM)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn redo_from(&mut self, origin: ViewId) -> bool {
        self.close_groups();

        let Some(transaction) = self.history.pop_redo() else {
            debug!("nothing to redo");
            return false;
        };

        if let Err(err) = step::apply_all(self.document.arena_mut(), &transaction.steps) {
            error!(transaction = transaction.id, error = %err, "redo failed, history entry kept");
            self.history.restore_redo(transaction);
            return false;
        }
        self.document.bump_version();

        let events = transaction
            .steps
            .iter()
            .map(|step| {
                let (node, kind) = step.forward_change();
                ChangeEvent::new(transaction.id, Phase::Redo, origin, node, kind)
            })
            .collect();
        info!(transaction = transaction.id, description = %transaction.description, "redo");

        self.history.push_redone(transaction);
        self.document.publish(events);
        true
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo() || self.group_has_steps()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    pub fn undo_levels(&self) -> usize {
        self.history.undo_levels()
    }

    pub fn redo_levels(&self) -> usize {
        self.history.redo_levels()
    }

    /// Labels of undoable entries, most recent first
    pub fn undo_descriptions(&self) -> Vec<String> {
        self.history.undo_descriptions()
    }

    pub fn redo_descriptions(&self) -> Vec<String> {
        self.history.redo_descriptions()
    }

    /// Merge barrier: the next command starts a fresh history entry even if
    /// it would otherwise coalesce with the previous one.
    pub fn seal(&mut self) {
        self.history.seal();
    }

    /// Start collecting commands into one undo step. Groups nest; only the
    /// outermost `end_group` records the entry.
    pub fn begin_group(&mut self, description: impl Into<String>) {
        match self.group.as_mut() {
            Some(group) => group.depth += 1,
            None => {
                let id = self.next_id();
                let transaction =
                    Transaction::group(id, ViewId::SYSTEM, description.into(), Instant::now());
                self.group = Some(OpenGroup {
                    transaction,
                    depth: 1,
                });
            }
        }
    }

    /// Close one level of grouping. Returns the transaction id once the
    /// outermost group is recorded (None for empty groups).
    pub fn end_group(&mut self) -> Option<u64> {
        let group = self.group.as_mut()?;
        group.depth = group.depth.saturating_sub(1);
        if group.depth > 0 {
            return None;
        }
        let group = self.group.take()?;
        self.commit_group(group)
    }

    pub fn in_group(&self) -> bool {
        self.group.is_some()
    }

    fn group_has_steps(&self) -> bool {
        self.group
            .as_ref()
            .map(|group| !group.transaction.steps.is_empty())
            .unwrap_or(false)
    }

    fn close_groups(&mut self) {
        if let Some(group) = self.group.take() {
            warn!(depth = group.depth, "closing open group before history transition");
            self.commit_group(group);
        }
    }

    fn commit_group(&mut self, group: OpenGroup) -> Option<u64> {
        if group.transaction.steps.is_empty() {
            return None;
        }
        let id = group.transaction.id;
        let pushed = self
            .history
            .push(group.transaction, self.config.merge_window());
        self.reclaim(&pushed.evicted, &pushed.discarded);
        debug!(transaction = id, "group recorded");
        Some(id)
    }

    /// Forget all history (and any open group), reclaiming the subtrees
    /// only history was keeping alive
    pub fn clear(&mut self) {
        let mut applied = Vec::new();
        if let Some(group) = self.group.take() {
            applied.push(group.transaction);
        }
        let (undo, redo) = self.history.clear();
        applied.extend(undo);
        self.reclaim(&applied, &redo);
        debug!("history cleared");
    }

    /// Replace the document wholesale. Views carry over and receive a single
    /// reset event; history starts empty.
    pub fn load(&mut self, mut document: Document) {
        self.group = None;
        // The old arena goes away entirely, nothing to reclaim.
        let _ = self.history.clear();

        let views = self.document.take_views();
        document.adopt_views(views);
        self.document = document;

        let root = self.document.root();
        info!(nodes = self.document.arena().len(), "document loaded");
        self.document.publish(vec![ChangeEvent::new(
            0,
            Phase::Reset,
            ViewId::SYSTEM,
            root,
            ChangeKind::Reset,
        )]);
    }

    fn reclaim(&mut self, applied: &[Transaction], reverted: &[Transaction]) {
        let roots: Vec<NodeId> = applied
            .iter()
            .flat_map(|t| t.steps.iter().filter_map(Step::detached_when_applied))
            .chain(
                reverted
                    .iter()
                    .flat_map(|t| t.steps.iter().filter_map(Step::detached_when_reverted)),
            )
            .collect();
        let freed = self.free_detached(&roots);
        if freed > 0 {
            debug!(freed, "reclaimed detached subtrees");
        }
    }

    fn free_detached(&mut self, roots: &[NodeId]) -> usize {
        let root = self.document.root();
        let arena = self.document.arena_mut();
        let mut freed = 0;
        for id in roots {
            if *id != root && matches!(arena.parent(*id), Ok(None)) {
                freed += arena.free_subtree(*id).unwrap_or(0);
            }
        }
        freed
    }
}

impl std::fmt::Debug for CommandManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandManager")
            .field("document", &self.document)
            .field("undo_levels", &self.history.undo_levels())
            .field("redo_levels", &self.history.redo_levels())
            .field("grouping", &self.group.is_some())
            .finish()
    }
}
