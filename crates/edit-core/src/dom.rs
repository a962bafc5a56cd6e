use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

pub const ZERO_WIDTH_SPACE: char = '\u{200B}';

const BLOCK_TAGS: &[&str] = &[
    "address",
    "article",
    "aside",
    "blockquote",
    "dd",
    "div",
    "dl",
    "dt",
    "figcaption",
    "figure",
    "footer",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "li",
    "main",
    "nav",
    "ol",
    "p",
    "pre",
    "section",
    "table",
    "tbody",
    "td",
    "tfoot",
    "th",
    "thead",
    "tr",
    "ul",
];

const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Containers whose direct children are structure, not inline content.
const STRUCTURAL_TAGS: &[&str] = &["ol", "table", "tbody", "tfoot", "thead", "tr", "ul"];

pub const TEXT_BLOCK_TAGS: &[&str] = &["div", "h1", "h2", "h3", "h4", "h5", "h6", "p", "pre"];

pub fn is_block_tag(tag: &str) -> bool {
    BLOCK_TAGS.contains(&tag)
}

pub fn is_void_tag(tag: &str) -> bool {
    VOID_TAGS.contains(&tag)
}

pub fn is_structural_tag(tag: &str) -> bool {
    STRUCTURAL_TAGS.contains(&tag)
}

pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

pub(crate) fn byte_index(s: &str, char_ix: usize) -> usize {
    s.char_indices().nth(char_ix).map_or(s.len(), |(ix, _)| ix)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(u64);

impl NodeId {
    pub fn raw(self) -> u64 {
        self.0
    }
}

pub type Attrs = BTreeMap<String, String>;
pub type Styles = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ElementData {
    pub tag: String,
    pub attrs: Attrs,
    pub styles: Styles,
}

impl ElementData {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            attrs: Attrs::new(),
            styles: Styles::new(),
        }
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn style(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.styles.insert(name.into(), value.into());
        self
    }

    /// No attributes and no inline styles.
    pub fn is_bare(&self) -> bool {
        self.attrs.is_empty() && self.styles.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeData {
    Text(String),
    Element(ElementData),
}

#[derive(Debug, Clone)]
struct NodeSlot {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Visitor verdict for [`Dom::walk`] and [`Dom::walk_from`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Walk {
    Continue,
    /// Do not descend into the visited node.
    Skip,
    Stop,
}

/// Arena-backed document tree with a permanent editing root.
#[derive(Debug, Clone)]
pub struct Dom {
    nodes: HashMap<NodeId, NodeSlot>,
    root: NodeId,
    next_id: u64,
}

impl Default for Dom {
    fn default() -> Self {
        Self::new()
    }
}

impl Dom {
    pub fn new() -> Self {
        let root = NodeId(0);
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            NodeSlot {
                data: NodeData::Element(ElementData::new("div")),
                parent: None,
                children: Vec::new(),
            },
        );
        Self {
            nodes,
            root,
            next_id: 1,
        }
    }

    pub fn from_html(html: &str) -> Self {
        let mut dom = Self::new();
        dom.set_inner_html(html);
        dom
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            NodeSlot {
                data,
                parent: None,
                children: Vec::new(),
            },
        );
        id
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.alloc(NodeData::Text(text.into()))
    }

    pub fn create_element(&mut self, data: ElementData) -> NodeId {
        self.alloc(NodeData::Element(data))
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Whether `id` is alive and reachable from the editing root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        let mut current = id;
        loop {
            if current == self.root {
                return true;
            }
            match self.nodes.get(&current).and_then(|slot| slot.parent) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    pub fn data(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(&id).map(|slot| &slot.data)
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match self.data(id)? {
            NodeData::Element(el) => Some(el),
            NodeData::Text(_) => None,
        }
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut ElementData> {
        match &mut self.nodes.get_mut(&id)?.data {
            NodeData::Element(el) => Some(el),
            NodeData::Text(_) => None,
        }
    }

    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.data(id)? {
            NodeData::Text(text) => Some(text),
            NodeData::Element(_) => None,
        }
    }

    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) -> bool {
        match self.nodes.get_mut(&id).map(|slot| &mut slot.data) {
            Some(NodeData::Text(current)) => {
                *current = text.into();
                true
            }
            _ => false,
        }
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|el| el.tag.as_str())
    }

    pub fn set_tag(&mut self, id: NodeId, tag: &str) -> bool {
        if id == self.root {
            return false;
        }
        match self.element_mut(id) {
            Some(el) => {
                el.tag = tag.to_ascii_lowercase();
                true
            }
            None => false,
        }
    }

    pub fn is_text(&self, id: NodeId) -> bool {
        self.text(id).is_some()
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        self.element(id).is_some()
    }

    pub fn is_tag(&self, id: NodeId, tag: &str) -> bool {
        self.tag(id) == Some(tag)
    }

    pub fn is_block(&self, id: NodeId) -> bool {
        self.tag(id).is_some_and(is_block_tag)
    }

    pub fn is_void(&self, id: NodeId) -> bool {
        self.tag(id).is_some_and(is_void_tag)
    }

    pub fn is_structural(&self, id: NodeId) -> bool {
        id == self.root || self.tag(id).is_some_and(is_structural_tag)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(&id)?.parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(&id)
            .map(|slot| slot.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn child(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.children(id).get(index).copied()
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).first().copied()
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.children(id).last().copied()
    }

    pub fn index_in_parent(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.children(parent).iter().position(|&child| child == id)
    }

    pub fn prev_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        index
            .checked_sub(1)
            .and_then(|prev| self.child(parent, prev))
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        self.child(parent, index + 1)
    }

    /// Offset upper bound: chars for text, children for elements.
    pub fn node_len(&self, id: NodeId) -> usize {
        match self.data(id) {
            Some(NodeData::Text(text)) => char_len(text),
            Some(NodeData::Element(_)) => self.children(id).len(),
            None => 0,
        }
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.contains(id) && self.children(id).is_empty()
    }

    /// Nearest inclusive ancestor matching `predicate`, never the root.
    pub fn closest(&self, id: NodeId, predicate: impl Fn(NodeId) -> bool) -> Option<NodeId> {
        if !self.contains(id) {
            return None;
        }
        let mut current = id;
        while current != self.root {
            if predicate(current) {
                return Some(current);
            }
            current = self.parent(current)?;
        }
        None
    }

    /// Ancestor chain from the root down to `id` (inclusive), empty when detached.
    pub fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut chain = Vec::new();
        let mut current = id;
        loop {
            if !self.contains(current) {
                return Vec::new();
            }
            chain.push(current);
            if current == self.root {
                break;
            }
            match self.parent(current) {
                Some(parent) => current = parent,
                None => return Vec::new(),
            }
        }
        chain.reverse();
        chain
    }

    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut current = Some(id);
        while let Some(node) = current {
            if node == ancestor {
                return true;
            }
            current = self.parent(node);
        }
        false
    }

    /// Index of the root child containing `id`.
    pub fn line_index(&self, id: NodeId) -> Option<usize> {
        self.line_of(id).and_then(|line| self.index_in_parent(line))
    }

    /// The root child containing `id`.
    pub fn line_of(&self, id: NodeId) -> Option<NodeId> {
        let chain = self.ancestors(id);
        chain.get(1).copied()
    }

    /// Child-index position from the root, `None` when detached.
    pub fn position(&self, id: NodeId) -> Option<Vec<usize>> {
        let chain = self.ancestors(id);
        if chain.is_empty() {
            return None;
        }
        chain
            .iter()
            .skip(1)
            .map(|&node| self.index_in_parent(node))
            .collect()
    }

    pub fn compare_order(&self, a: NodeId, b: NodeId) -> Ordering {
        match (self.position(a), self.position(b)) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => Ordering::Equal,
        }
    }

    pub fn compare_boundaries(&self, a: (NodeId, usize), b: (NodeId, usize)) -> Ordering {
        if a.0 == b.0 {
            return a.1.cmp(&b.1);
        }
        let key = |(node, offset): (NodeId, usize)| {
            self.position(node).map(|mut position| {
                position.push(offset);
                position
            })
        };
        match (key(a), key(b)) {
            (Some(a), Some(b)) => a.cmp(&b),
            _ => Ordering::Equal,
        }
    }

    fn detach_inner(&mut self, id: NodeId) {
        let Some(parent) = self.parent(id) else {
            return;
        };
        if let Some(slot) = self.nodes.get_mut(&parent) {
            slot.children.retain(|&child| child != id);
        }
        if let Some(slot) = self.nodes.get_mut(&id) {
            slot.parent = None;
        }
    }

    /// Removes `id` from its parent, keeping the subtree alive.
    pub fn detach(&mut self, id: NodeId) -> bool {
        if id == self.root || self.parent(id).is_none() {
            return false;
        }
        self.detach_inner(id);
        true
    }

    /// Detaches `id` and drops its whole subtree from the arena.
    pub fn remove(&mut self, id: NodeId) -> bool {
        if id == self.root || !self.contains(id) {
            return false;
        }
        self.detach_inner(id);
        let mut stack = vec![id];
        while let Some(node) = stack.pop() {
            if let Some(slot) = self.nodes.remove(&node) {
                stack.extend(slot.children);
            }
        }
        true
    }

    pub fn insert_child(&mut self, parent: NodeId, index: usize, child: NodeId) -> bool {
        if child == self.root
            || !self.contains(child)
            || !self.is_element(parent)
            || self.is_inclusive_ancestor(child, parent)
        {
            return false;
        }
        let mut index = index;
        if self.parent(child) == Some(parent) {
            if let Some(old) = self.index_in_parent(child) {
                if old < index {
                    index -= 1;
                }
            }
        }
        self.detach_inner(child);
        let Some(slot) = self.nodes.get_mut(&parent) else {
            return false;
        };
        let index = index.min(slot.children.len());
        slot.children.insert(index, child);
        if let Some(slot) = self.nodes.get_mut(&child) {
            slot.parent = Some(parent);
        }
        true
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> bool {
        let len = self.children(parent).len();
        self.insert_child(parent, len, child)
    }

    pub fn insert_before(&mut self, reference: NodeId, node: NodeId) -> bool {
        match (self.parent(reference), self.index_in_parent(reference)) {
            (Some(parent), Some(index)) => self.insert_child(parent, index, node),
            _ => false,
        }
    }

    pub fn insert_after(&mut self, reference: NodeId, node: NodeId) -> bool {
        match (self.parent(reference), self.index_in_parent(reference)) {
            (Some(parent), Some(index)) => self.insert_child(parent, index + 1, node),
            _ => false,
        }
    }

    /// Moves the children of `id` into its parent at its position and removes it.
    pub fn replace_with_children(&mut self, id: NodeId) -> bool {
        let (Some(parent), Some(index)) = (self.parent(id), self.index_in_parent(id)) else {
            return false;
        };
        let children = self.children(id).to_vec();
        for (offset, child) in children.into_iter().enumerate() {
            self.insert_child(parent, index + offset, child);
        }
        self.remove(id)
    }

    /// Wraps `id` in a new element placed where `id` was.
    pub fn wrap(&mut self, id: NodeId, wrapper: ElementData) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let index = self.index_in_parent(id)?;
        let element = self.create_element(wrapper);
        self.insert_child(parent, index, element);
        self.append_child(element, id);
        Some(element)
    }

    /// Copy of the node without children.
    pub fn shallow_clone(&mut self, id: NodeId) -> Option<NodeId> {
        let data = self.data(id)?.clone();
        Some(self.alloc(data))
    }

    /// Moves `children[index..]` into a clone of `id` inserted right after it.
    pub fn split_element_at(&mut self, id: NodeId, index: usize) -> Option<NodeId> {
        if id == self.root || !self.is_element(id) || self.parent(id).is_none() {
            return None;
        }
        let moved = self.children(id).get(index..)?.to_vec();
        if moved.is_empty() {
            return None;
        }
        let clone = self.shallow_clone(id)?;
        self.insert_after(id, clone);
        for child in moved {
            self.append_child(clone, child);
        }
        Some(clone)
    }

    /// Moves `children[..index]` into a clone of `id` inserted right before it.
    pub fn split_element_front(&mut self, id: NodeId, index: usize) -> Option<NodeId> {
        if id == self.root || !self.is_element(id) || self.parent(id).is_none() || index == 0 {
            return None;
        }
        let moved = self.children(id).get(..index)?.to_vec();
        let clone = self.shallow_clone(id)?;
        self.insert_before(id, clone);
        for child in moved {
            self.append_child(clone, child);
        }
        Some(clone)
    }

    /// Splits a text node so that `[start, end)` stands alone and returns it.
    ///
    /// The original node keeps the middle segment; the head and tail become new
    /// siblings. A request covering the whole node returns it untouched.
    pub fn split_text(&mut self, id: NodeId, start: usize, end: usize) -> Option<NodeId> {
        let text = self.text(id)?.to_string();
        let len = char_len(&text);
        let start = start.min(len);
        let end = end.clamp(start, len);
        if start == 0 && end == len {
            return Some(id);
        }
        self.parent(id)?;

        let start_byte = byte_index(&text, start);
        let end_byte = byte_index(&text, end);
        let head = &text[..start_byte];
        let middle = &text[start_byte..end_byte];
        let tail = &text[end_byte..];

        if !head.is_empty() {
            let node = self.create_text(head);
            self.insert_before(id, node);
        }
        if !tail.is_empty() {
            let node = self.create_text(tail);
            self.insert_after(id, node);
        }
        self.set_text(id, middle);
        Some(id)
    }

    /// Next node in document order inside `scope`.
    pub fn next_in_order(&self, id: NodeId, scope: NodeId, descend: bool) -> Option<NodeId> {
        if descend {
            if let Some(first) = self.first_child(id) {
                return Some(first);
            }
        }
        let mut current = id;
        loop {
            if current == scope {
                return None;
            }
            if let Some(next) = self.next_sibling(current) {
                return Some(next);
            }
            current = self.parent(current)?;
        }
    }

    /// Pre-order walk over the descendants of `scope`.
    pub fn walk(&self, scope: NodeId, visit: impl FnMut(NodeId) -> Walk) {
        if let Some(first) = self.first_child(scope) {
            self.walk_from(first, scope, visit);
        }
    }

    /// Pre-order walk starting at `start` and continuing in document order
    /// until `scope` is exhausted.
    pub fn walk_from(&self, start: NodeId, scope: NodeId, mut visit: impl FnMut(NodeId) -> Walk) {
        let mut current = Some(start);
        while let Some(node) = current {
            let descend = match visit(node) {
                Walk::Continue => true,
                Walk::Skip => false,
                Walk::Stop => return,
            };
            current = self.next_in_order(node, scope, descend);
        }
    }

    pub fn first_leaf(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(first) = self.first_child(current) {
            current = first;
        }
        current
    }

    pub fn last_leaf(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(last) = self.last_child(current) {
            current = last;
        }
        current
    }

    /// First leaf after the subtree of `id`.
    pub fn next_leaf(&self, id: NodeId) -> Option<NodeId> {
        self.next_in_order(id, self.root, false)
            .map(|next| self.first_leaf(next))
    }

    /// Last leaf before `id` in document order.
    pub fn prev_leaf(&self, id: NodeId) -> Option<NodeId> {
        let mut current = id;
        loop {
            if current == self.root {
                return None;
            }
            if let Some(prev) = self.prev_sibling(current) {
                return Some(self.last_leaf(prev));
            }
            current = self.parent(current)?;
        }
    }

    pub fn leaves_in(&self, scope: NodeId) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        self.walk(scope, |node| {
            if self.is_leaf(node) {
                leaves.push(node);
            }
            Walk::Continue
        });
        leaves
    }

    /// Leaves from `first` through `last` inclusive; empty if `last` is never reached.
    pub fn leaves_between(&self, first: NodeId, last: NodeId) -> Vec<NodeId> {
        let mut leaves = Vec::new();
        let mut finished = false;
        self.walk_from(first, self.root, |node| {
            if self.is_leaf(node) {
                leaves.push(node);
            }
            if node == last {
                finished = true;
                return Walk::Stop;
            }
            Walk::Continue
        });
        if finished { leaves } else { Vec::new() }
    }

    pub fn find_text(&self, needle: &str) -> Option<NodeId> {
        let mut found = None;
        self.walk(self.root, |node| {
            if self.text(node).is_some_and(|text| text.contains(needle)) {
                found = Some(node);
                return Walk::Stop;
            }
            Walk::Continue
        });
        found
    }

    pub fn find_element(&self, tag: &str) -> Option<NodeId> {
        self.find_elements(tag).into_iter().next()
    }

    pub fn find_elements(&self, tag: &str) -> Vec<NodeId> {
        let mut found = Vec::new();
        self.walk(self.root, |node| {
            if self.is_tag(node, tag) {
                found.push(node);
            }
            Walk::Continue
        });
        found
    }

    pub fn text_content(&self, id: NodeId) -> String {
        if let Some(text) = self.text(id) {
            return text.to_string();
        }
        let mut out = String::new();
        self.walk(id, |node| {
            if let Some(text) = self.text(node) {
                out.push_str(text);
            }
            Walk::Continue
        });
        out
    }

    /// Drops every child of the root.
    pub fn clear(&mut self) {
        for child in self.children(self.root).to_vec() {
            self.remove(child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paragraph(dom: &mut Dom, text: &str) -> (NodeId, NodeId) {
        let p = dom.create_element(ElementData::new("p"));
        let t = dom.create_text(text);
        dom.append_child(dom.root(), p);
        dom.append_child(p, t);
        (p, t)
    }

    #[test]
    fn split_text_keeps_middle_in_original_node() {
        let mut dom = Dom::new();
        let (p, t) = paragraph(&mut dom, "Hello World");

        let middle = dom.split_text(t, 2, 7).unwrap();
        assert_eq!(middle, t);
        let texts: Vec<_> = dom
            .children(p)
            .iter()
            .map(|&n| dom.text(n).unwrap().to_string())
            .collect();
        assert_eq!(texts, vec!["He", "llo W", "orld"]);
    }

    #[test]
    fn split_text_full_range_is_identity() {
        let mut dom = Dom::new();
        let (p, t) = paragraph(&mut dom, "abc");
        assert_eq!(dom.split_text(t, 0, 3), Some(t));
        assert_eq!(dom.children(p).len(), 1);
    }

    #[test]
    fn split_text_counts_chars_not_bytes() {
        let mut dom = Dom::new();
        let (_, t) = paragraph(&mut dom, "héllo");
        dom.split_text(t, 1, 3).unwrap();
        assert_eq!(dom.text(t), Some("él"));
    }

    #[test]
    fn detached_nodes_are_no_ops() {
        let mut dom = Dom::new();
        let t = dom.create_text("loose");
        assert_eq!(dom.split_text(t, 1, 2), None);
        assert!(!dom.detach(t));
        assert_eq!(dom.closest(t, |_| true), Some(t));
        assert!(!dom.is_attached(t));

        let (_, attached) = paragraph(&mut dom, "x");
        dom.remove(attached);
        assert_eq!(dom.split_text(attached, 0, 1), None);
        assert_eq!(dom.closest(attached, |_| true), None);
    }

    #[test]
    fn closest_stops_at_root() {
        let mut dom = Dom::new();
        let (p, t) = paragraph(&mut dom, "x");
        assert_eq!(dom.closest(t, |n| dom.is_block(n)), Some(p));
        assert_eq!(dom.closest(t, |n| dom.is_tag(n, "div")), None);
    }

    #[test]
    fn remove_tears_down_subtree() {
        let mut dom = Dom::new();
        let (p, t) = paragraph(&mut dom, "x");
        let before = dom.node_count();
        assert!(dom.remove(p));
        assert!(!dom.contains(t));
        assert_eq!(dom.node_count(), before - 2);
    }

    #[test]
    fn split_element_moves_children_into_clones() {
        let mut dom = Dom::new();
        let b = dom.create_element(ElementData::new("b"));
        dom.append_child(dom.root(), b);
        let nodes: Vec<_> = ["a", "b", "c"].iter().map(|s| dom.create_text(*s)).collect();
        for &n in &nodes {
            dom.append_child(b, n);
        }

        let after = dom.split_element_at(b, 2).unwrap();
        let before = dom.split_element_front(b, 1).unwrap();
        assert_eq!(dom.children(dom.root()), &[before, b, after]);
        assert_eq!(dom.children(b), &[nodes[1]]);
        assert_eq!(dom.split_element_at(b, 1), None);
    }

    #[test]
    fn walk_skip_and_stop() {
        let mut dom = Dom::new();
        let (p1, t1) = paragraph(&mut dom, "one");
        let (p2, t2) = paragraph(&mut dom, "two");

        let mut seen = Vec::new();
        dom.walk(dom.root(), |n| {
            seen.push(n);
            if n == p1 { Walk::Skip } else { Walk::Continue }
        });
        assert_eq!(seen, vec![p1, p2, t2]);

        let mut seen = Vec::new();
        dom.walk(dom.root(), |n| {
            seen.push(n);
            if n == t1 { Walk::Stop } else { Walk::Continue }
        });
        assert_eq!(seen, vec![p1, t1]);
    }

    #[test]
    fn boundary_ordering_follows_document_order() {
        let mut dom = Dom::new();
        let (p, t) = paragraph(&mut dom, "abc");
        let (_, t2) = paragraph(&mut dom, "def");
        assert_eq!(dom.compare_boundaries((t, 1), (t, 2)), Ordering::Less);
        assert_eq!(dom.compare_boundaries((p, 0), (t, 0)), Ordering::Less);
        assert_eq!(dom.compare_boundaries((p, 1), (t, 3)), Ordering::Greater);
        assert_eq!(dom.compare_boundaries((t2, 0), (t, 3)), Ordering::Greater);
        assert_eq!(dom.line_index(t2), Some(1));
    }

    #[test]
    fn leaves_between_returns_empty_when_reversed() {
        let mut dom = Dom::new();
        let (_, t1) = paragraph(&mut dom, "a");
        let (_, t2) = paragraph(&mut dom, "b");
        assert_eq!(dom.leaves_between(t1, t2), vec![t1, t2]);
        assert!(dom.leaves_between(t2, t1).is_empty());
    }
}
