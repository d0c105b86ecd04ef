use crate::shape::RowShape;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "camelCase")]
pub enum Column {
    /// Synthetic 1-based row number; never part of any command
    RowNumber,
    Attribute(String),
    /// Child element holding plain text
    Value(String),
    /// Child element with element content of its own; not editable
    Marker(String),
}

impl Column {
    pub fn header(&self) -> String {
        match self {
            Column::RowNumber => "#".to_string(),
            Column::Attribute(name) => format!("@{}", name),
            Column::Value(name) | Column::Marker(name) => name.clone(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        match self {
            Column::RowNumber => None,
            Column::Attribute(name) | Column::Value(name) | Column::Marker(name) => Some(name),
        }
    }

    pub fn is_editable(&self) -> bool {
        matches!(self, Column::Attribute(_) | Column::Value(_))
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.header())
    }
}

/// Derive the column list from row shapes taken in row order.
///
/// Row number first, then attribute names in first-seen order, then child
/// names that never hold element content in any row, then the rest as
/// markers. Both child groups keep first-seen order.
pub(crate) fn derive_columns<'a>(shapes: impl IntoIterator<Item = &'a RowShape>) -> Vec<Column> {
    let mut attributes: Vec<&str> = Vec::new();
    let mut children: Vec<(&str, bool)> = Vec::new();
    let mut child_index: HashMap<&str, usize> = HashMap::new();

    for shape in shapes {
        for (name, _) in &shape.attributes {
            if !attributes.contains(&name.as_str()) {
                attributes.push(name.as_str());
            }
        }
        for child in &shape.children {
            match child_index.get(child.name.as_str()) {
                Some(&index) => children[index].1 |= child.complex,
                None => {
                    child_index.insert(child.name.as_str(), children.len());
                    children.push((child.name.as_str(), child.complex));
                }
            }
        }
    }

    let mut columns = Vec::with_capacity(1 + attributes.len() + children.len());
    columns.push(Column::RowNumber);
    columns.extend(attributes.into_iter().map(|name| Column::Attribute(name.to_string())));
    columns.extend(
        children
            .iter()
            .filter(|(_, complex)| !complex)
            .map(|(name, _)| Column::Value(name.to_string())),
    );
    columns.extend(
        children
            .iter()
            .filter(|(_, complex)| *complex)
            .map(|(name, _)| Column::Marker(name.to_string())),
    );
    columns
}
