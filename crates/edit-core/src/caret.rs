use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::dom::{Dom, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Boundary {
    pub node: NodeId,
    pub offset: usize,
}

impl Boundary {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }

    /// Position right before `leaf`: its start for text, its parent slot otherwise.
    pub fn before(dom: &Dom, leaf: NodeId) -> Option<Self> {
        if dom.is_text(leaf) || (dom.is_element(leaf) && !dom.is_void(leaf)) {
            return Some(Self::new(leaf, 0));
        }
        Some(Self::new(dom.parent(leaf)?, dom.index_in_parent(leaf)?))
    }

    /// Position right after `leaf`.
    pub fn after(dom: &Dom, leaf: NodeId) -> Option<Self> {
        if dom.is_text(leaf) || (dom.is_element(leaf) && !dom.is_void(leaf)) {
            return Some(Self::new(leaf, dom.node_len(leaf)));
        }
        Some(Self::new(dom.parent(leaf)?, dom.index_in_parent(leaf)? + 1))
    }

    pub fn clamped(self, dom: &Dom) -> Self {
        Self::new(self.node, self.offset.min(dom.node_len(self.node)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Boundary,
    pub end: Boundary,
}

impl Range {
    pub fn new(start: Boundary, end: Boundary) -> Self {
        Self { start, end }
    }

    pub fn collapsed(at: Boundary) -> Self {
        Self { start: at, end: at }
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }

    /// Clamps both ends and puts them in document order.
    pub fn normalized(self, dom: &Dom) -> Self {
        let start = self.start.clamped(dom);
        let end = self.end.clamped(dom);
        match dom.compare_boundaries((start.node, start.offset), (end.node, end.offset)) {
            Ordering::Greater => Self { start: end, end: start },
            _ => Self { start, end },
        }
    }
}

pub fn set_start_to_end(dom: &Dom, node: NodeId, start: usize, end: usize) -> Range {
    let len = dom.node_len(node);
    let (start, end) = (start.min(len), end.min(len));
    let (start, end) = if start <= end { (start, end) } else { (end, start) };
    Range::new(Boundary::new(node, start), Boundary::new(node, end))
}

pub fn set_start(dom: &Dom, range: Range, node: NodeId, offset: usize) -> Range {
    let start = Boundary::new(node, offset).clamped(dom);
    let end = match dom.compare_boundaries((start.node, start.offset), (range.end.node, range.end.offset)) {
        Ordering::Greater => start,
        _ => range.end,
    };
    Range::new(start, end)
}

pub fn set_end(dom: &Dom, range: Range, node: NodeId, offset: usize) -> Range {
    let end = Boundary::new(node, offset).clamped(dom);
    let start = match dom.compare_boundaries((range.start.node, range.start.offset), (end.node, end.offset)) {
        Ordering::Greater => end,
        _ => range.start,
    };
    Range::new(start, end)
}

/// The editor-owned stand-in for the host's native selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    range: Option<Range>,
    cells: Vec<NodeId>,
}

impl Selection {
    pub fn range(&self) -> Option<Range> {
        self.range
    }

    pub fn cells(&self) -> &[NodeId] {
        &self.cells
    }

    /// Selected cells that are still part of the document.
    pub fn live_cells(&self, dom: &Dom) -> Vec<NodeId> {
        self.cells
            .iter()
            .copied()
            .filter(|&cell| dom.is_attached(cell))
            .collect()
    }

    /// Commits `range` as the live selection, leaving table-cell mode.
    pub fn update_range(&mut self, dom: &Dom, range: Range) {
        self.range = Some(range.normalized(dom));
        self.cells.clear();
    }

    pub fn collapse(&mut self, dom: &Dom, at: Boundary) {
        self.update_range(dom, Range::collapsed(at));
    }

    pub fn select_cells(&mut self, cells: Vec<NodeId>) {
        self.range = None;
        self.cells = cells;
    }

    pub fn clear(&mut self) {
        self.range = None;
        self.cells.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaretPoint {
    pub node: NodeId,
    pub offset: usize,
    /// Index of the boundary's top-level block among the root's children.
    pub line: usize,
    /// Ancestor chain from the root down to `node`.
    pub path: Vec<NodeId>,
}

impl CaretPoint {
    fn read(dom: &Dom, boundary: Boundary) -> Option<Self> {
        let path = dom.ancestors(boundary.node);
        if path.is_empty() {
            return None;
        }
        let offset = boundary.offset.min(dom.node_len(boundary.node));
        let line = if boundary.node == dom.root() {
            offset.min(dom.children(dom.root()).len().saturating_sub(1))
        } else {
            dom.line_index(boundary.node)?
        };
        Some(Self {
            node: boundary.node,
            offset,
            line,
            path,
        })
    }

    pub fn boundary(&self) -> Boundary {
        Boundary::new(self.node, self.offset)
    }
}

/// Structured view of the live selection, valid until the next mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caret {
    pub start: CaretPoint,
    pub end: CaretPoint,
    /// Nearest common block ancestor of both ends (or the root).
    pub same_root: NodeId,
}

impl Caret {
    pub fn get(dom: &Dom, selection: &Selection) -> Option<Self> {
        let range = selection.range()?;
        if !dom.is_attached(range.start.node) || !dom.is_attached(range.end.node) {
            tracing::debug!("selection points at detached nodes");
            return None;
        }
        let range = range.normalized(dom);
        let start = CaretPoint::read(dom, range.start)?;
        let end = CaretPoint::read(dom, range.end)?;

        let common = start
            .path
            .iter()
            .zip(end.path.iter())
            .take_while(|(a, b)| a == b)
            .map(|(a, _)| *a)
            .last()
            .unwrap_or(dom.root());
        let same_root = dom
            .closest(common, |node| dom.is_block(node))
            .unwrap_or(dom.root());

        Some(Self {
            start,
            end,
            same_root,
        })
    }

    pub fn is_range(&self) -> bool {
        self.start.node != self.end.node || self.start.offset != self.end.offset
    }

    pub fn is_same_line(&self) -> bool {
        self.start.line == self.end.line
    }

    pub fn range(&self) -> Range {
        Range::new(self.start.boundary(), self.end.boundary())
    }

    /// Root children from the start line through the end line.
    pub fn lines(&self, dom: &Dom) -> Vec<NodeId> {
        let lines = dom.children(dom.root());
        let last = self.end.line.min(lines.len().saturating_sub(1));
        lines
            .get(self.start.line..=last)
            .map(<[NodeId]>::to_vec)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caret_between(dom: &Dom, from: (&str, usize), to: (&str, usize)) -> Caret {
        let start = dom.find_text(from.0).unwrap();
        let end = dom.find_text(to.0).unwrap();
        let mut selection = Selection::default();
        selection.update_range(
            dom,
            Range::new(Boundary::new(start, from.1), Boundary::new(end, to.1)),
        );
        Caret::get(dom, &selection).unwrap()
    }

    #[test]
    fn start_to_end_clamps_and_orders_offsets() {
        let dom = Dom::from_html("<p>Hello</p>");
        let text = dom.find_text("Hello").unwrap();
        let range = set_start_to_end(&dom, text, 9, 2);
        assert_eq!(range.start, Boundary::new(text, 2));
        assert_eq!(range.end, Boundary::new(text, 5));
    }

    #[test]
    fn set_start_past_the_end_collapses_onto_it() {
        let dom = Dom::from_html("<p>Hello</p><p>World</p>");
        let hello = dom.find_text("Hello").unwrap();
        let range = set_start_to_end(&dom, hello, 1, 3);

        let moved = set_start(&dom, range, hello, 99);
        assert_eq!(moved, Range::collapsed(Boundary::new(hello, 5)));

        let moved = set_start(&dom, range, hello, 0);
        assert_eq!(moved.start, Boundary::new(hello, 0));
        assert_eq!(moved.end, Boundary::new(hello, 3));
    }

    #[test]
    fn set_end_before_the_start_collapses_onto_it() {
        let dom = Dom::from_html("<p>Hello</p><p>World</p>");
        let hello = dom.find_text("Hello").unwrap();
        let world = dom.find_text("World").unwrap();
        let range = set_start_to_end(&dom, hello, 1, 3);

        let moved = set_end(&dom, range, hello, 0);
        assert_eq!(moved, Range::collapsed(Boundary::new(hello, 0)));

        let moved = set_end(&dom, range, world, 99);
        assert_eq!(moved.start, Boundary::new(hello, 1));
        assert_eq!(moved.end, Boundary::new(world, 5));
    }

    #[test]
    fn lines_span_from_start_line_to_end_line() {
        let dom = Dom::from_html("<p>a</p><ul><li>b</li><li>c</li></ul><p>d</p><p>e</p>");
        let lines = dom.children(dom.root()).to_vec();

        let caret = caret_between(&dom, ("a", 0), ("d", 1));
        assert!(!caret.is_same_line());
        assert_eq!(caret.lines(&dom), lines[..3].to_vec());
        assert_eq!(caret.same_root, dom.root());

        let caret = caret_between(&dom, ("d", 1), ("d", 1));
        assert!(!caret.is_range());
        assert_eq!(caret.lines(&dom), vec![lines[2]]);
    }

    #[test]
    fn same_root_is_the_nearest_common_block() {
        let dom = Dom::from_html("<ul><li>b</li><li><strong>c</strong>d</li></ul>");
        let list = dom.children(dom.root())[0];

        let caret = caret_between(&dom, ("b", 0), ("d", 1));
        assert!(caret.is_same_line());
        assert_eq!(caret.same_root, list);
        assert_eq!(caret.lines(&dom), vec![list]);

        let caret = caret_between(&dom, ("c", 0), ("d", 1));
        let item = dom.children(list)[1];
        assert_eq!(caret.same_root, item);
    }
}
