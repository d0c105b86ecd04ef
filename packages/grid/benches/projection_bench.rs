use arbor_editor::{Command, CommandManager, Document};
use arbor_grid::{GridEngine, ProjectionKey};
use arbor_model::{Fragment, NodeId};
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use std::cell::RefCell;
use std::rc::Rc;

fn table(rows: usize) -> Document {
    let mut table = Fragment::element("table");
    for i in 0..rows {
        let mut row = Fragment::element("row")
            .attr("id", i.to_string())
            .child(Fragment::leaf("name", format!("name {}", i)))
            .child(Fragment::leaf("price", (i * 3).to_string()));
        if i % 10 == 0 {
            row = row.attr("flag", "y");
        }
        table = table.child(row);
    }
    Document::from_fragment(&table)
}

fn derive_projection(c: &mut Criterion) {
    let doc = table(10_000);
    let parent = doc.document_element().unwrap();

    c.bench_function("derive_projection_10k_rows", |b| {
        b.iter_batched(
            GridEngine::new,
            |mut engine| {
                black_box(engine.projection_for(&doc, parent, "row").row_count());
            },
            BatchSize::SmallInput,
        )
    });
}

fn incremental_cell_edit(c: &mut Criterion) {
    let doc = table(10_000);
    let parent = doc.document_element().unwrap();
    let mut manager = CommandManager::new(doc);
    let engine = Rc::new(RefCell::new(GridEngine::new()));
    manager.register_view(engine.clone());
    engine
        .borrow_mut()
        .projection_for(manager.document(), parent, "row");

    let key = ProjectionKey::new(parent, "row");
    let target: NodeId = engine.borrow().tracked(&key).unwrap().rows()[5_000];
    let mut flip = false;

    c.bench_function("incremental_attribute_edit_10k_rows", |b| {
        b.iter(|| {
            flip = !flip;
            manager
                .execute(Command::SetAttribute {
                    node: target,
                    name: "id".into(),
                    value: if flip { "a" } else { "b" }.into(),
                })
                .unwrap();
            manager.seal();
        })
    });
}

criterion_group!(benches, derive_projection, incremental_cell_edit);
criterion_main!(benches);
