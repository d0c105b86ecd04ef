use arbor_markup::{parse, serialize, Serializer};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

fn catalog(rows: usize) -> String {
    let mut source = String::from("<catalog>");
    for i in 0..rows {
        source.push_str(&format!(
            r#"<book id="b{}" price="{}"><title>Title &amp; {}</title><tags><tag>x</tag></tags></book>"#,
            i,
            i * 3,
            i
        ));
    }
    source.push_str("</catalog>");
    source
}

fn parse_documents(c: &mut Criterion) {
    let small = catalog(10);
    let large = catalog(10_000);

    c.bench_function("parse_catalog_10", |b| b.iter(|| parse(black_box(&small))));
    c.bench_function("parse_catalog_10k", |b| b.iter(|| parse(black_box(&large))));
}

fn serialize_documents(c: &mut Criterion) {
    let doc = parse(&catalog(10_000)).expect("benchmark input parses");

    c.bench_function("serialize_compact_10k", |b| {
        b.iter(|| serialize(black_box(doc.tree())))
    });
    c.bench_function("serialize_pretty_10k", |b| {
        b.iter(|| Serializer::pretty(2).serialize(black_box(doc.tree())))
    });
}

criterion_group!(benches, parse_documents, serialize_documents);
criterion_main!(benches);
