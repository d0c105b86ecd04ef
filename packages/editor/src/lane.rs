//! # Edit Lane
//!
//! The single place where a document is mutated. Views hold an
//! `IntentSender` and submit commands from wherever they run; the lane owner
//! calls `pump` to apply them one at a time, in arrival order, so two views
//! can never interleave partial edits.

use crate::background::BackgroundScheduler;
use crate::manager::{CommandManager, ExecuteOutcome};
use crate::view::SharedView;
use crate::{Command, EditorError, ViewId};
use std::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub enum Intent {
    Execute { origin: ViewId, command: Command },
    Undo { origin: ViewId },
    Redo { origin: ViewId },
    Seal,
}

impl Intent {
    pub fn origin(&self) -> ViewId {
        match self {
            Intent::Execute { origin, .. } | Intent::Undo { origin } | Intent::Redo { origin } => {
                *origin
            }
            Intent::Seal => ViewId::SYSTEM,
        }
    }
}

/// Result of one processed intent
#[derive(Debug)]
pub enum IntentOutcome {
    Executed(ExecuteOutcome),
    Rejected(EditorError),
    /// Undo or redo; false when there was nothing to do or it failed
    Transitioned(bool),
    Sealed,
}

impl IntentOutcome {
    pub fn changed(&self) -> bool {
        match self {
            IntentOutcome::Executed(outcome) => outcome.changed(),
            IntentOutcome::Transitioned(done) => *done,
            IntentOutcome::Rejected(_) | IntentOutcome::Sealed => false,
        }
    }
}

/// Cloneable handle a view uses to queue work on the lane
#[derive(Debug, Clone)]
pub struct IntentSender {
    origin: ViewId,
    tx: mpsc::Sender<Intent>,
}

impl IntentSender {
    pub fn origin(&self) -> ViewId {
        self.origin
    }

    /// Queue a command. Returns false once the lane is gone.
    pub fn submit(&self, command: Command) -> bool {
        self.send(Intent::Execute {
            origin: self.origin,
            command,
        })
    }

    pub fn undo(&self) -> bool {
        self.send(Intent::Undo {
            origin: self.origin,
        })
    }

    pub fn redo(&self) -> bool {
        self.send(Intent::Redo {
            origin: self.origin,
        })
    }

    pub fn seal(&self) -> bool {
        self.send(Intent::Seal)
    }

    fn send(&self, intent: Intent) -> bool {
        self.tx.send(intent).is_ok()
    }
}

pub struct EditLane {
    manager: CommandManager,
    tx: mpsc::Sender<Intent>,
    rx: mpsc::Receiver<Intent>,
    background: Option<BackgroundScheduler>,
}

impl EditLane {
    pub fn new(manager: CommandManager) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            manager,
            tx,
            rx,
            background: None,
        }
    }

    pub fn with_background(mut self, scheduler: BackgroundScheduler) -> Self {
        self.background = Some(scheduler);
        self
    }

    pub fn manager(&self) -> &CommandManager {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut CommandManager {
        &mut self.manager
    }

    pub fn background_mut(&mut self) -> Option<&mut BackgroundScheduler> {
        self.background.as_mut()
    }

    pub fn sender(&self, origin: ViewId) -> IntentSender {
        IntentSender {
            origin,
            tx: self.tx.clone(),
        }
    }

    /// Register a view and hand back the sender it should submit through
    pub fn attach_view(&mut self, view: SharedView) -> IntentSender {
        let id = self.manager.register_view(view);
        self.sender(id)
    }

    /// Apply every queued intent, in arrival order
    pub fn pump(&mut self) -> Vec<(ViewId, IntentOutcome)> {
        let mut outcomes = Vec::new();
        while let Ok(intent) = self.rx.try_recv() {
            let origin = intent.origin();
            let outcome = self.process(intent);
            if outcome.changed() {
                if let Some(background) = self.background.as_mut() {
                    background.note_edit();
                }
            }
            outcomes.push((origin, outcome));
        }
        if !outcomes.is_empty() {
            debug!(processed = outcomes.len(), "intents applied");
        }
        outcomes
    }

    fn process(&mut self, intent: Intent) -> IntentOutcome {
        match intent {
            Intent::Execute { origin, command } => {
                match self.manager.execute_from(origin, command) {
                    Ok(outcome) => IntentOutcome::Executed(outcome),
                    Err(err) => {
                        warn!(origin = %origin, error = %err, "intent rejected");
                        IntentOutcome::Rejected(err)
                    }
                }
            }
            Intent::Undo { origin } => IntentOutcome::Transitioned(self.manager.undo_from(origin)),
            Intent::Redo { origin } => IntentOutcome::Transitioned(self.manager.redo_from(origin)),
            Intent::Seal => {
                self.manager.seal();
                IntentOutcome::Sealed
            }
        }
    }

    /// Start due background work and deliver finished results to views as
    /// advisory events. Returns how many were delivered.
    pub fn tick(&mut self) -> usize {
        let Some(background) = self.background.as_mut() else {
            return 0;
        };
        let events = background.poll(self.manager.document());
        self.manager.publish_advisories(&events);
        events.len()
    }
}
