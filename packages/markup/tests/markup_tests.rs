//! Reading and writing documents through the public markup API

use arbor_editor::{Command, CommandManager, EditorError, SerializationService};
use arbor_markup::{
    format_error, parse, parse_fragment, serialize, MarkupOptions, MarkupService, ParseError,
    Serializer, PROGRESS_INTERVAL,
};
use arbor_model::Fragment;
use proptest::prelude::*;
use std::io::Cursor;
use std::ops::ControlFlow;

#[test]
fn test_compact_round_trip_is_exact() {
    let source = concat!(
        r#"<?xml version="1.0"?>"#,
        r#"<catalog lang="en"><!-- prices in EUR -->"#,
        r#"<book id="b1" price="12"><title>Rust &amp; You</title><summary><![CDATA[<b>bold</b>]]></summary></book>"#,
        r#"<book id="b2"/>"#,
        r#"</catalog>"#,
    );
    let doc = parse(source).unwrap();
    assert_eq!(serialize(doc.tree()), source);
}

#[test]
fn test_doctype_is_skipped() {
    let doc = parse("<!DOCTYPE note>\n<note>hi</note>").unwrap();
    assert_eq!(serialize(doc.tree()), "<note>hi</note>");
}

#[test]
fn test_character_references_are_decoded() {
    let doc = parse(r#"<a title="&quot;x&quot; &#38; y">&lt;&#x41;&gt;</a>"#).unwrap();
    let a = doc.document_element().unwrap();
    assert_eq!(doc.text_content(a).unwrap(), "<A>");
    let element = doc.arena().to_fragment(a).unwrap();
    assert_eq!(element, Fragment::leaf("a", "<A>").attr("title", "\"x\" & y"));
}

#[test]
fn test_pretty_output_parses_back_to_the_same_tree() {
    let source = r#"<rows><row id="1"><name>John</name><tags><tag>a</tag></tags></row><row id="2"/></rows>"#;
    let doc = parse(source).unwrap();
    let pretty = Serializer::pretty(2).serialize(doc.tree());
    assert_eq!(
        pretty,
        "<rows>\n  <row id=\"1\">\n    <name>John</name>\n    <tags>\n      <tag>a</tag>\n    </tags>\n  </row>\n  <row id=\"2\"/>\n</rows>"
    );

    let reparsed = parse(&pretty).unwrap();
    assert_eq!(serialize(reparsed.tree()), source);
}

#[test]
fn test_errors_carry_spans() {
    let source = "<a>\n  <b></c>\n</a>";
    let err = parse(source).unwrap_err();
    let span = err.span().unwrap();
    assert_eq!(&source[span.start..span.end], "</");

    let report = format_error(source, "broken.xml", &err);
    assert!(report.contains("expected </b>, found </c>"));
}

#[test]
fn test_invalid_names_are_rejected() {
    assert!(matches!(parse("<1a/>"), Err(ParseError::InvalidSyntax { .. })));
    assert!(matches!(
        parse(r#"<a 9x="1"/>"#),
        Err(ParseError::InvalidSyntax { .. })
    ));
    assert!(matches!(
        parse("<a x/>"),
        Err(ParseError::UnexpectedToken { .. })
    ));
}

#[test]
fn test_parse_fragment_requires_one_element() {
    assert!(parse_fragment("  <row/>  ").is_ok());
    assert!(parse_fragment("<a/><b/>").is_err());
    assert!(parse_fragment("").is_err());
    assert!(parse_fragment("<!-- c -->").is_err());
}

#[test]
fn test_service_parse_and_serialize() {
    let service = MarkupService::new();
    let doc = service.parse(br#"<rows><row id="1"/></rows>"#).unwrap();
    assert_eq!(
        service.serialize(doc.tree()).unwrap(),
        br#"<rows><row id="1"/></rows>"#.to_vec()
    );

    let err = service.parse(b"<rows>").unwrap_err();
    assert!(matches!(err, EditorError::Serialization(_)));
}

#[test]
fn test_keep_whitespace_option() {
    let service = MarkupService::with_options(MarkupOptions {
        indent: None,
        keep_whitespace: true,
    });
    let source = "<a>\n  <b/>\n</a>";
    let doc = service.parse(source.as_bytes()).unwrap();
    assert_eq!(service.serialize(doc.tree()).unwrap(), source.as_bytes());
}

fn large_document(rows: usize) -> String {
    let mut source = String::from("<table>");
    for i in 0..rows {
        source.push_str(&format!(r#"<row id="{}"><v>{}</v></row>"#, i, i));
    }
    source.push_str("</table>");
    source
}

#[test]
fn test_streaming_reports_bytes_then_nodes() {
    let source = large_document(2_000);
    let mut reports = Vec::new();
    let doc = MarkupService::new()
        .parse_streaming(&mut Cursor::new(source.as_bytes()), &mut |report| {
            reports.push(report);
            ControlFlow::Continue(())
        })
        .unwrap();

    let nodes = doc.document_element().map(|table| doc.children(table).unwrap().len());
    assert_eq!(nodes, Some(2_000));

    let reading: Vec<_> = reports.iter().filter(|r| r.total_bytes.is_none()).collect();
    assert!(!reading.is_empty());
    assert_eq!(reading.last().unwrap().bytes_read, source.len());

    let building: Vec<_> = reports.iter().filter(|r| r.total_bytes.is_some()).collect();
    // row, v and text per row, plus the table
    assert_eq!(building.last().unwrap().nodes, 6_001);
    assert!(building.len() >= 6_001 / PROGRESS_INTERVAL);
    assert!(building.windows(2).all(|w| w[0].nodes <= w[1].nodes));
}

#[test]
fn test_streaming_cancel_while_building() {
    let source = large_document(2_000);
    let err = MarkupService::new()
        .parse_streaming(&mut Cursor::new(source.as_bytes()), &mut |report| {
            if report.nodes > 0 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap_err();
    assert!(matches!(err, EditorError::Cancelled));
}

#[test]
fn test_streaming_cancel_while_reading() {
    let err = MarkupService::new()
        .parse_streaming(&mut Cursor::new(b"<a/>".to_vec()), &mut |_| {
            ControlFlow::Break(())
        })
        .unwrap_err();
    assert!(matches!(err, EditorError::Cancelled));
}

#[test]
fn test_parsed_document_is_editable() {
    let doc = parse("<list><item>a</item></list>").unwrap();
    let list = doc.document_element().unwrap();
    let mut manager = CommandManager::new(doc);
    manager
        .execute(Command::AddChild {
            parent: list,
            index: None,
            fragment: parse_fragment("<item>b</item>").unwrap(),
        })
        .unwrap();
    assert_eq!(
        serialize(manager.document().tree()),
        "<list><item>a</item><item>b</item></list>"
    );

    assert!(manager.undo());
    assert_eq!(
        serialize(manager.document().tree()),
        "<list><item>a</item></list>"
    );
}

fn name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,4}"
}

fn attributes() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::btree_map(name(), "[a-z &<>\"'\n\t]{0,6}", 0..3)
        .prop_map(|attributes| attributes.into_iter().collect())
}

fn with_attributes(element: Fragment, attributes: Vec<(String, String)>) -> Fragment {
    attributes
        .into_iter()
        .fold(element, |element, (name, value)| element.attr(&name, value))
}

/// Content that is not an element: mixed and blank text, comments, CDATA
/// and instructions, all in forms the writer can reproduce
fn special() -> impl Strategy<Value = Fragment> {
    prop_oneof![
        "[a-z&<>\"][a-z &<>\"]{0,6}".prop_map(Fragment::text),
        " {1,3}".prop_map(Fragment::text),
        "([a-z <>]|-[a-z <>]){0,4}".prop_map(Fragment::comment),
        "([a-z<>& ]|\\][a-z ]){1,4}".prop_map(Fragment::cdata),
        (name(), "([a-z=]([a-z= ]{0,4}[a-z=])?)?")
            .prop_map(|(target, data)| Fragment::processing_instruction(target, data)),
    ]
}

/// Adjacent text nodes would read back as one
fn push_child(element: Fragment, child: Fragment) -> Fragment {
    let follows_text = matches!(element.children().last(), Some(Fragment::Text { .. }));
    if follows_text && matches!(child, Fragment::Text { .. }) {
        element
    } else {
        element.child(child)
    }
}

fn tree() -> impl Strategy<Value = Fragment> {
    let leaf = (name(), attributes(), "[a-z&<>\"][a-z &<>\"]{0,6}").prop_map(
        |(name, attributes, text)| with_attributes(Fragment::leaf(name, text), attributes),
    );
    leaf.prop_recursive(4, 32, 4, |inner| {
        let child = prop_oneof![2 => inner, 1 => special()];
        (name(), attributes(), prop::collection::vec(child, 0..5)).prop_map(
            |(name, attributes, children)| {
                let element = with_attributes(Fragment::element(name), attributes);
                children.into_iter().fold(element, push_child)
            },
        )
    })
}

proptest! {
    #[test]
    fn prop_serialized_trees_parse_back(fragment in tree()) {
        let doc = arbor_editor::Document::from_fragment(&fragment);
        let compact = serialize(doc.tree());
        let reparsed = parse(&compact).unwrap();
        let root = reparsed.document_element().unwrap();
        prop_assert_eq!(reparsed.arena().to_fragment(root).unwrap(), fragment.clone());

        let pretty = Serializer::pretty(2).serialize(doc.tree());
        let reparsed = parse(&pretty).unwrap();
        let root = reparsed.document_element().unwrap();
        prop_assert_eq!(reparsed.arena().to_fragment(root).unwrap(), fragment);
    }
}
