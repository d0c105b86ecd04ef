//! # Undo/Redo History
//!
//! Bounded record of applied transactions.
//!
//! ## Design
//!
//! - Each transaction carries the reversible steps its command planned
//! - Undo reverts the steps and moves the transaction to the redo stack
//! - Redo re-applies the steps and moves it back
//! - New transactions clear the redo stack
//! - A new transaction may merge into the top one (same slot, same origin,
//!   inside the merge window) unless a barrier was set since
//! - When the bound is exceeded the oldest transaction is evicted
//!
//! Dropped transactions (evicted or cleared) are handed back to the caller
//! so the subtrees only they kept alive can be reclaimed.

use crate::step::Step;
use crate::{Command, ViewId};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// One undoable unit: a command (or an explicit group of commands)
#[derive(Debug, Clone)]
pub(crate) struct Transaction {
    pub id: u64,
    pub origin: ViewId,
    pub commands: Vec<Command>,
    pub steps: Vec<Step>,
    pub description: String,
    pub touched_at: Instant,
    /// Groups never merge with neighbours
    pub mergeable: bool,
}

impl Transaction {
    pub fn single(
        id: u64,
        origin: ViewId,
        command: Command,
        steps: Vec<Step>,
        at: Instant,
    ) -> Self {
        Self {
            id,
            origin,
            description: command.describe(),
            commands: vec![command],
            steps,
            touched_at: at,
            mergeable: true,
        }
    }

    pub fn group(id: u64, origin: ViewId, description: String, at: Instant) -> Self {
        Self {
            id,
            origin,
            commands: Vec::new(),
            steps: Vec::new(),
            description,
            touched_at: at,
            mergeable: false,
        }
    }

    pub fn can_merge_with(&self, next: &Transaction, window: Duration) -> bool {
        if !self.mergeable || !next.mergeable || self.origin != next.origin {
            return false;
        }
        let (Some(last), [command]) = (self.commands.last(), next.commands.as_slice()) else {
            return false;
        };
        last.can_merge_with(command)
            && next.touched_at.saturating_duration_since(self.touched_at) <= window
    }

    /// Fold `next` into this transaction, compacting steps that rewrite the
    /// same slot so the entry does not grow with every keystroke.
    pub fn merge_with(&mut self, next: Transaction) {
        for command in next.commands {
            match self.commands.pop() {
                Some(last) if last.can_merge_with(&command) => {
                    self.commands.push(last.merge_with(command))
                }
                Some(last) => {
                    self.commands.push(last);
                    self.commands.push(command);
                }
                None => self.commands.push(command),
            }
        }
        self.absorb_steps(next.steps);
        self.touched_at = next.touched_at;
    }

    pub fn absorb_steps(&mut self, steps: Vec<Step>) {
        for step in steps {
            if let Some(last) = self.steps.last_mut() {
                if last.absorb(&step) {
                    continue;
                }
            }
            self.steps.push(step);
        }
    }
}

/// What a push did to the stacks
#[derive(Debug, Default)]
pub(crate) struct PushOutcome {
    /// Id of the transaction the push merged into, if any
    pub merged_into: Option<u64>,
    /// Oldest entries dropped by the bound (still in applied state)
    pub evicted: Vec<Transaction>,
    /// Former redo entries (in reverted state)
    pub discarded: Vec<Transaction>,
}

#[derive(Debug)]
pub(crate) struct History {
    /// Applied transactions (most recent last)
    undo_stack: VecDeque<Transaction>,

    /// Undone transactions (most recent last)
    redo_stack: Vec<Transaction>,

    /// Maximum number of undo levels (0 = unlimited)
    max_levels: usize,

    /// Set after undo, redo or an explicit seal; blocks merging into the top
    sealed: bool,
}

impl History {
    pub fn with_max_levels(max_levels: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            redo_stack: Vec::new(),
            max_levels,
            sealed: false,
        }
    }

    pub fn push(&mut self, transaction: Transaction, window: Duration) -> PushOutcome {
        let mut outcome = PushOutcome {
            discarded: std::mem::take(&mut self.redo_stack),
            ..PushOutcome::default()
        };

        if !self.sealed {
            if let Some(top) = self.undo_stack.back_mut() {
                if top.can_merge_with(&transaction, window) {
                    top.merge_with(transaction);
                    outcome.merged_into = Some(top.id);
                    return outcome;
                }
            }
        }

        self.undo_stack.push_back(transaction);
        self.sealed = false;

        if self.max_levels > 0 {
            while self.undo_stack.len() > self.max_levels {
                if let Some(oldest) = self.undo_stack.pop_front() {
                    outcome.evicted.push(oldest);
                }
            }
        }

        outcome
    }

    pub fn pop_undo(&mut self) -> Option<Transaction> {
        self.undo_stack.pop_back()
    }

    pub fn pop_redo(&mut self) -> Option<Transaction> {
        self.redo_stack.pop()
    }

    /// Drop the redo stack without recording anything
    pub fn take_redo(&mut self) -> Vec<Transaction> {
        std::mem::take(&mut self.redo_stack)
    }

    /// Put back a transaction whose undo failed
    pub fn restore_undo(&mut self, transaction: Transaction) {
        self.undo_stack.push_back(transaction);
    }

    /// Put back a transaction whose redo failed
    pub fn restore_redo(&mut self, transaction: Transaction) {
        self.redo_stack.push(transaction);
    }

    pub fn push_undone(&mut self, transaction: Transaction) {
        self.redo_stack.push(transaction);
        self.sealed = true;
    }

    pub fn push_redone(&mut self, transaction: Transaction) {
        self.undo_stack.push_back(transaction);
        self.sealed = true;
    }

    /// Stop the next push from merging into the current top
    pub fn seal(&mut self) {
        self.sealed = true;
    }

    /// Drop everything, returning (applied, undone) transactions
    pub fn clear(&mut self) -> (Vec<Transaction>, Vec<Transaction>) {
        self.sealed = false;
        (
            self.undo_stack.drain(..).collect(),
            std::mem::take(&mut self.redo_stack),
        )
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_levels(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_levels(&self) -> usize {
        self.redo_stack.len()
    }

    /// Most recent first
    pub fn undo_descriptions(&self) -> Vec<String> {
        self.undo_stack
            .iter()
            .rev()
            .map(|t| t.description.clone())
            .collect()
    }

    /// Next redo first
    pub fn redo_descriptions(&self) -> Vec<String> {
        self.redo_stack
            .iter()
            .rev()
            .map(|t| t.description.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_model::NodeId;

    const WINDOW: Duration = Duration::from_millis(300);

    fn set_text(id: u64, node: u64, text: &str, at: Instant) -> Transaction {
        let node = NodeId::from_raw(node);
        Transaction::single(
            id,
            ViewId::new(1),
            Command::SetText {
                node,
                text: text.to_string(),
            },
            vec![Step::Text {
                node,
                before: String::new(),
                after: text.to_string(),
            }],
            at,
        )
    }

    #[test]
    fn test_merge_within_window() {
        let mut history = History::with_max_levels(100);
        let start = Instant::now();
        history.push(set_text(1, 7, "a", start), WINDOW);
        let outcome = history.push(
            set_text(2, 7, "ab", start + Duration::from_millis(100)),
            WINDOW,
        );

        assert_eq!(outcome.merged_into, Some(1));
        assert_eq!(history.undo_levels(), 1);
        let top = history.pop_undo().unwrap();
        assert_eq!(top.steps.len(), 1);
    }

    #[test]
    fn test_absorb_steps_keeps_first_before_and_last_after() {
        let start = Instant::now();
        let mut first = set_text(1, 7, "a", start);
        let second = set_text(2, 7, "ab", start);
        let other = set_text(3, 8, "z", start);
        first.absorb_steps(second.steps);
        first.absorb_steps(other.steps);

        assert_eq!(first.steps.len(), 2);
        assert_eq!(
            first.steps[0],
            Step::Text {
                node: NodeId::from_raw(7),
                before: String::new(),
                after: "ab".to_string(),
            }
        );
    }

    #[test]
    fn test_no_merge_outside_window_or_other_node() {
        let mut history = History::with_max_levels(100);
        let start = Instant::now();
        history.push(set_text(1, 7, "a", start), WINDOW);
        history.push(set_text(2, 7, "ab", start + Duration::from_millis(400)), WINDOW);
        history.push(set_text(3, 8, "x", start + Duration::from_millis(450)), WINDOW);
        assert_eq!(history.undo_levels(), 3);
    }

    #[test]
    fn test_seal_blocks_merge() {
        let mut history = History::with_max_levels(100);
        let start = Instant::now();
        history.push(set_text(1, 7, "a", start), WINDOW);
        history.seal();
        history.push(set_text(2, 7, "ab", start), WINDOW);
        assert_eq!(history.undo_levels(), 2);
    }

    #[test]
    fn test_eviction_and_redo_discard() {
        let mut history = History::with_max_levels(2);
        let start = Instant::now();
        for i in 0..3 {
            let outcome = history.push(set_text(i, i, "t", start), WINDOW);
            if i == 2 {
                assert_eq!(outcome.evicted.len(), 1);
                assert_eq!(outcome.evicted[0].id, 0);
            }
        }
        assert_eq!(history.undo_levels(), 2);

        let undone = history.pop_undo().unwrap();
        history.push_undone(undone);
        assert!(history.can_redo());

        let outcome = history.push(set_text(9, 9, "t", start), WINDOW);
        assert_eq!(outcome.discarded.len(), 1);
        assert!(!history.can_redo());
    }

    #[test]
    fn test_descriptions_order() {
        let mut history = History::with_max_levels(0);
        let start = Instant::now();
        history.push(set_text(1, 1, "a", start), WINDOW);
        history.push(
            Transaction::group(2, ViewId::new(1), "Paste rows".into(), start),
            WINDOW,
        );
        assert_eq!(history.undo_descriptions(), vec!["Paste rows", "Edit text"]);
    }
}
