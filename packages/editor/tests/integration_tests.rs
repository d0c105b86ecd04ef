//! End-to-end tests: views, event ordering, the edit lane and background work

use arbor_editor::{
    AdvisoryEvent, AdvisoryOutcome, BackgroundScheduler, ChangeEvent, ChangeKind, Command,
    CommandManager, DerivedJob, Diagnostic, Document, EditLane, EditorConfig, IntentOutcome,
    Phase, Reanchor, SelectionAnchor, TreeRef, ValidationService, View, ViewId,
};
use arbor_model::{Fragment, NodeId};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct Recorder {
    batches: Vec<Vec<ChangeEvent>>,
    advisories: Vec<AdvisoryEvent>,
    own: bool,
    /// Children of the watched node at delivery time
    watched: Option<NodeId>,
    observed: Vec<usize>,
}

impl View for Recorder {
    fn on_change(&mut self, _doc: &Document, _event: &ChangeEvent) {}

    fn on_changes(&mut self, doc: &Document, events: &[ChangeEvent]) {
        if let Some(watched) = self.watched {
            self.observed.push(doc.children(watched).map(|c| c.len()).unwrap_or(0));
        }
        self.batches.push(events.to_vec());
    }

    fn on_advisory(&mut self, _doc: &Document, event: &AdvisoryEvent) {
        self.advisories.push(event.clone());
    }

    fn receives_own_changes(&self) -> bool {
        self.own
    }
}

fn setup() -> (CommandManager, NodeId) {
    let doc = Document::from_fragment(
        &Fragment::element("list")
            .child(Fragment::leaf("item", "one"))
            .child(Fragment::leaf("item", "two")),
    );
    let list = doc.document_element().unwrap();
    (CommandManager::new(doc), list)
}

#[test]
fn test_views_see_final_state_and_ordered_sequences() {
    let (mut manager, list) = setup();
    let recorder = Rc::new(RefCell::new(Recorder {
        watched: Some(list),
        ..Recorder::default()
    }));
    manager.register_view(recorder.clone());

    manager.begin_group("Add two");
    manager
        .execute(Command::AddChild {
            parent: list,
            index: None,
            fragment: Fragment::element("item"),
        })
        .unwrap();
    manager
        .execute(Command::AddChild {
            parent: list,
            index: None,
            fragment: Fragment::element("item"),
        })
        .unwrap();
    manager.end_group();
    manager.undo();

    let rec = recorder.borrow();
    assert_eq!(rec.observed, vec![3, 4, 2]);

    let sequences: Vec<u64> = rec.batches.iter().flatten().map(|e| e.sequence).collect();
    assert!(sequences.windows(2).all(|w| w[0] < w[1]));

    // Undo of a group reports removals in reverse order
    let undo = &rec.batches[2];
    assert_eq!(undo.len(), 2);
    assert!(undo.iter().all(|e| e.phase == Phase::Undo));
    assert!(matches!(undo[0].kind, ChangeKind::Removed { index: 3, .. }));
    assert!(matches!(undo[1].kind, ChangeKind::Removed { index: 2, .. }));
}

#[test]
fn test_echo_suppression_only_for_originator() {
    let (mut manager, list) = setup();
    let editor = Rc::new(RefCell::new(Recorder::default()));
    let observer = Rc::new(RefCell::new(Recorder::default()));
    let editor_id = manager.register_view(editor.clone());
    manager.register_view(observer.clone());

    let item = manager.document().children(list).unwrap()[0];
    manager
        .execute_from(
            editor_id,
            Command::SetText {
                node: item,
                text: "uno".into(),
            },
        )
        .unwrap();
    assert_eq!(editor.borrow().batches.len(), 0);
    assert_eq!(observer.borrow().batches.len(), 1);
    assert_eq!(observer.borrow().batches[0][0].origin, editor_id);

    // Undo requested by the same view is still delivered to it
    assert!(manager.undo_from(editor_id));
    assert_eq!(editor.borrow().batches.len(), 1);
    assert_eq!(observer.borrow().batches.len(), 2);
}

#[test]
fn test_rejected_command_publishes_nothing() {
    let (mut manager, list) = setup();
    let recorder = Rc::new(RefCell::new(Recorder::default()));
    manager.register_view(recorder.clone());

    let result = manager.execute(Command::MoveNode {
        node: list,
        new_parent: list,
        index: 0,
    });
    assert!(result.is_err());
    assert!(recorder.borrow().batches.is_empty());
    assert_eq!(manager.document().version(), 0);
}

#[test]
fn test_selection_anchor_follows_sibling_edits() {
    let (mut manager, list) = setup();
    let recorder = Rc::new(RefCell::new(Recorder::default()));
    manager.register_view(recorder.clone());

    let second = manager.document().children(list).unwrap()[1];
    let mut anchor = SelectionAnchor::at(manager.document(), second)
        .unwrap()
        .unwrap();
    assert_eq!(anchor.index, 1);

    manager
        .execute(Command::AddChild {
            parent: list,
            index: Some(0),
            fragment: Fragment::element("item"),
        })
        .unwrap();
    manager.execute(Command::DeleteNode { node: second }).unwrap();

    let rec = recorder.borrow();
    let results: Vec<Reanchor> = rec
        .batches
        .iter()
        .flatten()
        .map(|event| anchor.reanchor(event))
        .collect();
    assert_eq!(results, vec![Reanchor::Shifted, Reanchor::Lost]);
    assert_eq!(anchor.index, 2);
}

#[test]
fn test_load_broadcasts_reset() {
    let (mut manager, _) = setup();
    let recorder = Rc::new(RefCell::new(Recorder::default()));
    manager.register_view(recorder.clone());

    manager.load(Document::from_fragment(&Fragment::element("fresh")));
    let rec = recorder.borrow();
    assert_eq!(rec.batches.len(), 1);
    assert_eq!(rec.batches[0][0].kind, ChangeKind::Reset);
    assert_eq!(rec.batches[0][0].origin, ViewId::SYSTEM);
}

#[test]
fn test_lane_serializes_intents_from_many_views() {
    let (manager, list) = setup();
    let mut lane = EditLane::new(manager);
    let a = lane.attach_view(Rc::new(RefCell::new(Recorder::default())));
    let b = lane.attach_view(Rc::new(RefCell::new(Recorder::default())));
    assert_ne!(a.origin(), b.origin());

    let first = lane.manager().document().children(list).unwrap()[0];
    assert!(a.submit(Command::SetAttribute {
        node: first,
        name: "k".into(),
        value: "a".into(),
    }));
    assert!(b.submit(Command::DeleteNode { node: first }));
    assert!(a.submit(Command::SetAttribute {
        node: first,
        name: "k".into(),
        value: "late".into(),
    }));
    assert!(b.undo());

    let outcomes = lane.pump();
    assert_eq!(outcomes.len(), 4);
    assert!(matches!(outcomes[0].1, IntentOutcome::Executed(_)));
    assert!(matches!(outcomes[1].1, IntentOutcome::Executed(_)));
    // The node was already deleted when the third intent ran
    assert!(matches!(outcomes[2].1, IntentOutcome::Rejected(_)));
    assert!(matches!(outcomes[3].1, IntentOutcome::Transitioned(true)));
    assert_eq!(outcomes[2].0, a.origin());

    let doc = lane.manager().document();
    assert!(doc.is_attached(first));
    assert_eq!(doc.node(first).unwrap().attribute("k"), Some("a"));
}

struct CountElements;

impl ValidationService for CountElements {
    fn validate(&self, tree: TreeRef<'_>) -> Vec<Diagnostic> {
        let elements = tree
            .arena()
            .descendants(tree.root())
            .filter(|id| tree.node(*id).map(|n| n.is_element()).unwrap_or(false))
            .count();
        vec![Diagnostic::warning(None, format!("{} elements", elements))]
    }
}

#[test]
fn test_background_results_arrive_as_advisories() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let config = EditorConfig::default().with_derived_debounce(Duration::from_millis(0));
    let (manager, list) = setup();
    let scheduler = BackgroundScheduler::new(runtime.handle().clone(), &config)
        .with_job(DerivedJob::Validate(Arc::new(CountElements)));
    let mut lane = EditLane::new(manager).with_background(scheduler);

    let recorder = Rc::new(RefCell::new(Recorder::default()));
    let sender = lane.attach_view(recorder.clone());
    sender.submit(Command::AddChild {
        parent: list,
        index: None,
        fragment: Fragment::element("item"),
    });
    lane.pump();

    // Starts the debounced job
    lane.tick();
    let background = lane.background_mut().unwrap();
    let events = runtime.block_on(background.flush());
    lane.manager_mut().publish_advisories(&events);

    let rec = recorder.borrow();
    assert_eq!(rec.advisories.len(), 1);
    assert_eq!(rec.advisories[0].document_version, 1);
    match &rec.advisories[0].outcome {
        AdvisoryOutcome::Diagnostics { diagnostics } => {
            assert_eq!(diagnostics[0].message, "4 elements")
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    // History is untouched by derived work
    assert_eq!(lane.manager().undo_levels(), 1);
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

#[test]
fn test_history_limit_from_config_file() -> anyhow::Result<()> {
    init_tracing();
    let dir = std::env::temp_dir().join(format!("arbor-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir)?;
    std::fs::write(
        dir.join(arbor_editor::DEFAULT_CONFIG_NAME),
        r#"{ "historyLimit": 2, "mergeWindowMs": 0 }"#,
    )?;
    let config = EditorConfig::load(&dir)?;
    std::fs::remove_dir_all(&dir)?;
    assert_eq!(config.derived_debounce(), Duration::from_millis(400));

    let doc = Document::from_fragment(&Fragment::element("list"));
    let list = doc.document_element().unwrap();
    let mut manager = CommandManager::with_config(doc, config);
    for name in ["a", "b", "c"] {
        manager.execute(Command::SetAttribute {
            node: list,
            name: name.into(),
            value: "1".into(),
        })?;
    }
    assert_eq!(manager.undo_levels(), 2);
    assert_eq!(manager.undo_descriptions(), vec!["Set @c", "Set @b"]);
    Ok(())
}
