//! Per-row summaries. A projection caches one shape per row so that column
//! derivation and cell diffs never have to walk the tree again.

use arbor_model::{Arena, NodeId, NodeKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildSummary {
    pub name: String,
    /// First child element with this name (the one a value cell shows)
    pub first: NodeId,
    pub count: usize,
    /// Some occurrence has element children of its own
    pub complex: bool,
    /// Text content of the first occurrence
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowShape {
    pub attributes: Vec<(String, String)>,
    /// Child element names in first-seen order
    pub children: Vec<ChildSummary>,
}

impl RowShape {
    pub fn capture(arena: &Arena, row: NodeId) -> Self {
        let Some(element) = arena.get(row).ok().and_then(|node| node.as_element()) else {
            return Self::default();
        };

        let attributes = element
            .attributes
            .iter()
            .map(|attr| (attr.name.clone(), attr.value.clone()))
            .collect();

        let mut children: Vec<ChildSummary> = Vec::new();
        for child in &element.children {
            let Some(child_element) = arena.get(*child).ok().and_then(|node| node.as_element())
            else {
                continue;
            };
            let complex = child_element.children.iter().any(|grandchild| {
                arena
                    .get(*grandchild)
                    .map(|node| matches!(node.kind(), NodeKind::Element(_)))
                    .unwrap_or(false)
            });

            match children.iter_mut().find(|s| s.name == child_element.name) {
                Some(summary) => {
                    summary.count += 1;
                    summary.complex |= complex;
                }
                None => children.push(ChildSummary {
                    name: child_element.name.clone(),
                    first: *child,
                    count: 1,
                    complex,
                    text: arena.text_content(*child).unwrap_or_default(),
                }),
            }
        }

        Self {
            attributes,
            children,
        }
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn child(&self, name: &str) -> Option<&ChildSummary> {
        self.children.iter().find(|summary| summary.name == name)
    }

    /// Whether two shapes contribute the same columns
    pub fn same_signature(&self, other: &RowShape) -> bool {
        self.attributes.len() == other.attributes.len()
            && self.children.len() == other.children.len()
            && self
                .attributes
                .iter()
                .zip(&other.attributes)
                .all(|((a, _), (b, _))| a == b)
            && self
                .children
                .iter()
                .zip(&other.children)
                .all(|(a, b)| a.name == b.name && a.complex == b.complex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_model::Fragment;

    #[test]
    fn test_capture_summarizes_children() {
        let mut arena = Arena::new();
        let row = arena.materialize(
            &Fragment::element("p")
                .attr("a", "1")
                .child(Fragment::leaf("x", "one"))
                .child(Fragment::leaf("x", "two"))
                .child(Fragment::element("y").child(Fragment::element("z")))
                .child(Fragment::text("loose text")),
        );

        let shape = RowShape::capture(&arena, row);
        assert_eq!(shape.attribute("a"), Some("1"));
        assert_eq!(shape.children.len(), 2);

        let x = shape.child("x").unwrap();
        assert_eq!((x.count, x.complex, x.text.as_str()), (2, false, "one"));
        assert!(shape.child("y").unwrap().complex);
    }

    #[test]
    fn test_signature_ignores_values() {
        let mut arena = Arena::new();
        let a = arena.materialize(
            &Fragment::element("p")
                .attr("k", "1")
                .child(Fragment::leaf("x", "a")),
        );
        let b = arena.materialize(
            &Fragment::element("p")
                .attr("k", "2")
                .child(Fragment::leaf("x", "b")),
        );
        let c = arena.materialize(&Fragment::element("p").attr("j", "2"));

        let shape_a = RowShape::capture(&arena, a);
        assert!(shape_a.same_signature(&RowShape::capture(&arena, b)));
        assert!(!shape_a.same_signature(&RowShape::capture(&arena, c)));
    }
}
