//! # Arena
//!
//! Owning table `NodeId → Node`. It is the only place nodes are allocated or
//! reclaimed, and its primitives are the only way the tree changes shape.
//!
//! The primitives do not record history or notify anyone; they validate only
//! what would corrupt the tree (dangling ids, double parents, cycles, bad
//! indices).

use crate::{Element, Fragment, IdGenerator, ModelError, ModelResult, Node, NodeId, NodeKind};
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Arena {
    nodes: HashMap<NodeId, Node>,
    ids: IdGenerator,
}

impl Arena {
    pub fn new() -> Self {
        Self::with_generator(IdGenerator::new())
    }

    pub fn with_generator(ids: IdGenerator) -> Self {
        Self {
            nodes: HashMap::new(),
            ids,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn generator(&self) -> &IdGenerator {
        &self.ids
    }

    pub fn get(&self, id: NodeId) -> ModelResult<&Node> {
        self.nodes.get(&id).ok_or(ModelError::DanglingReference(id))
    }

    fn node_mut(&mut self, id: NodeId) -> ModelResult<&mut Node> {
        self.nodes
            .get_mut(&id)
            .ok_or(ModelError::DanglingReference(id))
    }

    fn element_mut(&mut self, id: NodeId) -> ModelResult<&mut Element> {
        let node = self.node_mut(id)?;
        let found = node.kind_name();
        match node.kind_mut() {
            NodeKind::Element(element) => Ok(element),
            _ => Err(ModelError::kind_mismatch(id, "element", found)),
        }
    }

    /// All nodes, attached or not, in no particular order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Allocate a detached node with a fresh id.
    ///
    /// Any children listed in `kind` are discarded; children are attached with
    /// [`Arena::insert_child`].
    pub fn alloc(&mut self, mut kind: NodeKind) -> NodeId {
        if let Some(children) = kind.children_mut() {
            children.clear();
        }
        let id = self.ids.next_id();
        self.nodes.insert(id, Node::new(id, kind));
        id
    }

    pub fn parent(&self, id: NodeId) -> ModelResult<Option<NodeId>> {
        Ok(self.get(id)?.parent())
    }

    pub fn children(&self, id: NodeId) -> ModelResult<&[NodeId]> {
        Ok(self.get(id)?.children())
    }

    /// Parent and sibling index of an attached node
    pub fn position(&self, id: NodeId) -> ModelResult<Option<(NodeId, usize)>> {
        let Some(parent) = self.get(id)?.parent() else {
            return Ok(None);
        };
        let index = self
            .get(parent)?
            .children()
            .iter()
            .position(|child| *child == id)
            .ok_or(ModelError::DanglingReference(id))?;
        Ok(Some((parent, index)))
    }

    /// True when `node` is `ancestor` or sits somewhere below it
    pub fn is_ancestor_or_self(&self, ancestor: NodeId, node: NodeId) -> ModelResult<bool> {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return Ok(true);
            }
            current = self.get(id)?.parent();
        }
        Ok(false)
    }

    /// Topmost ancestor (the node itself when detached)
    pub fn top_of(&self, id: NodeId) -> ModelResult<NodeId> {
        let mut current = id;
        while let Some(parent) = self.get(current)?.parent() {
            current = parent;
        }
        Ok(current)
    }

    /// Number of ancestors between `id` and its top
    pub fn depth(&self, id: NodeId) -> ModelResult<usize> {
        let mut depth = 0;
        let mut current = self.get(id)?.parent();
        while let Some(parent) = current {
            depth += 1;
            current = self.get(parent)?.parent();
        }
        Ok(depth)
    }

    fn check_attachable(&self, parent: NodeId, child: NodeId) -> ModelResult<()> {
        if self.get(child)?.parent().is_some() {
            return Err(ModelError::AlreadyAttached(child));
        }
        if self.is_ancestor_or_self(child, parent)? {
            return Err(ModelError::WouldCycle { child, parent });
        }
        Ok(())
    }

    /// Attach a detached node as child `index` of `parent`
    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) -> ModelResult<()> {
        self.check_attachable(parent, child)?;

        let children = self
            .node_mut(parent)?
            .kind_mut()
            .children_mut()
            .ok_or(ModelError::NotAContainer(parent))?;
        if index > children.len() {
            return Err(ModelError::IndexOutOfBounds {
                parent,
                index,
                len: children.len(),
            });
        }
        children.insert(index, child);

        self.node_mut(child)?.set_parent(Some(parent));
        Ok(())
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> ModelResult<()> {
        let index = self.children(parent)?.len();
        self.insert_child(parent, index, child)
    }

    /// Detach child `index` of `parent`; the node stays in the arena
    pub fn remove_child(&mut self, parent: NodeId, index: usize) -> ModelResult<NodeId> {
        let children = self
            .node_mut(parent)?
            .kind_mut()
            .children_mut()
            .ok_or(ModelError::NotAContainer(parent))?;
        let len = children.len();
        if index >= len {
            return Err(ModelError::IndexOutOfBounds { parent, index, len });
        }
        let child = children.remove(index);

        if let Some(node) = self.nodes.get_mut(&child) {
            node.set_parent(None);
        }
        Ok(child)
    }

    /// Swap child `index` of `parent` for a detached node, returning the old child
    pub fn replace_child(
        &mut self,
        parent: NodeId,
        index: usize,
        new_child: NodeId,
    ) -> ModelResult<NodeId> {
        self.check_attachable(parent, new_child)?;

        let children = self
            .node_mut(parent)?
            .kind_mut()
            .children_mut()
            .ok_or(ModelError::NotAContainer(parent))?;
        let len = children.len();
        if index >= len {
            return Err(ModelError::IndexOutOfBounds { parent, index, len });
        }
        let old = std::mem::replace(&mut children[index], new_child);

        if let Some(node) = self.nodes.get_mut(&old) {
            node.set_parent(None);
        }
        self.node_mut(new_child)?.set_parent(Some(parent));
        Ok(old)
    }

    /// Set an attribute in place (or append it), returning the old value
    pub fn set_attribute(
        &mut self,
        id: NodeId,
        name: &str,
        value: impl Into<String>,
    ) -> ModelResult<Option<String>> {
        Ok(self.element_mut(id)?.attributes.set(name, value))
    }

    /// Put an attribute at an exact position
    pub fn insert_attribute(
        &mut self,
        id: NodeId,
        position: usize,
        name: &str,
        value: impl Into<String>,
    ) -> ModelResult<()> {
        self.element_mut(id)?
            .attributes
            .insert_at(position, name, value);
        Ok(())
    }

    pub fn remove_attribute(
        &mut self,
        id: NodeId,
        name: &str,
    ) -> ModelResult<Option<(usize, String)>> {
        Ok(self.element_mut(id)?.attributes.remove(name))
    }

    /// Replace character data of a text, comment, CDATA or PI node
    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) -> ModelResult<String> {
        let node = self.node_mut(id)?;
        let found = node.kind_name();
        match node.kind_mut() {
            NodeKind::Text(current) | NodeKind::Comment(current) | NodeKind::CData(current) => {
                Ok(std::mem::replace(current, text.into()))
            }
            NodeKind::ProcessingInstruction { data, .. } => {
                Ok(std::mem::replace(data, text.into()))
            }
            _ => Err(ModelError::kind_mismatch(id, "character data", found)),
        }
    }

    /// Rename an element or PI target, returning the old name
    pub fn rename(&mut self, id: NodeId, name: impl Into<String>) -> ModelResult<String> {
        let node = self.node_mut(id)?;
        let found = node.kind_name();
        match node.kind_mut() {
            NodeKind::Element(element) => Ok(std::mem::replace(&mut element.name, name.into())),
            NodeKind::ProcessingInstruction { target, .. } => {
                Ok(std::mem::replace(target, name.into()))
            }
            _ => Err(ModelError::kind_mismatch(id, "element", found)),
        }
    }

    /// Pre-order walk starting at (and including) `id`
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        Descendants {
            arena: self,
            stack: vec![id],
        }
    }

    /// Concatenated text and CDATA below `id`
    pub fn text_content(&self, id: NodeId) -> ModelResult<String> {
        self.get(id)?;
        let mut out = String::new();
        for node_id in self.descendants(id) {
            if let Ok(node) = self.get(node_id) {
                if let NodeKind::Text(text) | NodeKind::CData(text) = node.kind() {
                    out.push_str(text);
                }
            }
        }
        Ok(out)
    }

    /// Deep copy of a subtree under fresh ids, returned detached.
    ///
    /// Attribute and child order are reproduced exactly. When `suffix` is given
    /// and the copied root is an element with an `id` attribute, the suffix is
    /// appended to that attribute's value so the copy stays distinguishable.
    pub fn clone_subtree(&mut self, root: NodeId, suffix: Option<&str>) -> ModelResult<NodeId> {
        self.get(root)?;

        let mut allocated = Vec::new();
        match self.copy_nodes(root, &mut allocated) {
            Ok(copy) => {
                if let Some(suffix) = suffix.filter(|s| !s.is_empty()) {
                    if let Ok(element) = self.element_mut(copy) {
                        if let Some(value) = element.attributes.get("id") {
                            let value = format!("{}{}", value, suffix);
                            element.attributes.set("id", value);
                        }
                    }
                }
                Ok(copy)
            }
            Err(err) => {
                for id in allocated {
                    self.nodes.remove(&id);
                }
                Err(err)
            }
        }
    }

    fn copy_nodes(&mut self, root: NodeId, allocated: &mut Vec<NodeId>) -> ModelResult<NodeId> {
        let mut copy_root = None;
        let mut stack: Vec<(NodeId, Option<NodeId>)> = vec![(root, None)];

        while let Some((source, new_parent)) = stack.pop() {
            let node = self.get(source)?;
            let kind = node.kind().clone();
            let children = node.children().to_vec();

            let copy = self.alloc(kind);
            allocated.push(copy);
            match new_parent {
                Some(parent) => self.attach_last(parent, copy),
                None => copy_root = Some(copy),
            }

            for child in children.into_iter().rev() {
                stack.push((child, Some(copy)));
            }
        }

        copy_root.ok_or(ModelError::DanglingReference(root))
    }

    /// Allocate nodes for a fragment, returned detached
    pub fn materialize(&mut self, fragment: &Fragment) -> NodeId {
        let root = self.alloc(fragment_kind(fragment));
        let mut stack: Vec<(&Fragment, NodeId)> = fragment
            .children()
            .iter()
            .rev()
            .map(|child| (child, root))
            .collect();

        while let Some((fragment, parent)) = stack.pop() {
            let id = self.alloc(fragment_kind(fragment));
            self.attach_last(parent, id);
            for child in fragment.children().iter().rev() {
                stack.push((child, id));
            }
        }

        root
    }

    // Only for freshly allocated containers, which cannot fail the checks.
    fn attach_last(&mut self, parent: NodeId, child: NodeId) {
        if let Some(children) = self
            .nodes
            .get_mut(&parent)
            .and_then(|node| node.kind_mut().children_mut())
        {
            children.push(child);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.set_parent(Some(parent));
        }
    }

    /// Owned copy of a subtree as a fragment
    pub fn to_fragment(&self, id: NodeId) -> ModelResult<Fragment> {
        let node = self.get(id)?;
        Ok(match node.kind() {
            NodeKind::Document { .. } => {
                return Err(ModelError::kind_mismatch(id, "element", "document"))
            }
            NodeKind::Element(element) => Fragment::Element {
                name: element.name.clone(),
                attributes: element.attributes.clone(),
                children: element
                    .children
                    .iter()
                    .map(|child| self.to_fragment(*child))
                    .collect::<ModelResult<Vec<_>>>()?,
            },
            NodeKind::Text(text) => Fragment::text(text.clone()),
            NodeKind::Comment(text) => Fragment::comment(text.clone()),
            NodeKind::CData(text) => Fragment::cdata(text.clone()),
            NodeKind::ProcessingInstruction { target, data } => {
                Fragment::processing_instruction(target.clone(), data.clone())
            }
        })
    }

    /// Drop a detached subtree from the arena, returning how many nodes went
    pub fn free_subtree(&mut self, root: NodeId) -> ModelResult<usize> {
        if self.get(root)?.parent().is_some() {
            return Err(ModelError::AlreadyAttached(root));
        }
        let doomed: Vec<NodeId> = self.descendants(root).collect();
        for id in &doomed {
            self.nodes.remove(id);
        }
        Ok(doomed.len())
    }
}

fn fragment_kind(fragment: &Fragment) -> NodeKind {
    match fragment {
        Fragment::Element {
            name, attributes, ..
        } => NodeKind::Element(Element {
            name: name.clone(),
            attributes: attributes.clone(),
            children: Vec::new(),
        }),
        Fragment::Text { text } => NodeKind::Text(text.clone()),
        Fragment::Comment { text } => NodeKind::Comment(text.clone()),
        Fragment::CData { text } => NodeKind::CData(text.clone()),
        Fragment::ProcessingInstruction { target, data } => NodeKind::ProcessingInstruction {
            target: target.clone(),
            data: data.clone(),
        },
    }
}

/// Pre-order iterator over a subtree
pub struct Descendants<'a> {
    arena: &'a Arena,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        if let Ok(node) = self.arena.get(id) {
            self.stack.extend(node.children().iter().rev().copied());
        }
        Some(id)
    }
}
