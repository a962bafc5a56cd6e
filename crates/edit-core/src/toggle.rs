use std::cmp::Ordering;

use crate::caret::{Boundary, Caret, Range, Selection};
use crate::dom::{
    Dom, ElementData, NodeData, NodeId, TEXT_BLOCK_TAGS, Walk, ZERO_WIDTH_SPACE, char_len,
    is_block_tag, is_structural_tag, is_void_tag,
};
use crate::error::FormatError;
use crate::format::{BlockFormat, DEFAULT_BLOCK, Format, ListFormat, find_format, has_format};

/// Attribute identifying the zero-width element that carries formatting for a
/// collapsed caret until the user types into it.
pub const MARKER_ATTR: &str = "data-caret-marker";

pub fn is_marker(dom: &Dom, id: NodeId) -> bool {
    dom.element(id)
        .is_some_and(|el| el.tag == "span" && el.attrs.contains_key(MARKER_ATTR))
}

pub fn find_markers(dom: &Dom) -> Vec<NodeId> {
    let mut markers = Vec::new();
    dom.walk(dom.root(), |node| {
        if is_marker(dom, node) {
            markers.push(node);
        }
        Walk::Continue
    });
    markers
}

/// Wraps or unwraps `format` around the live selection.
///
/// Returns `Ok(true)` when the tree changed. Selection-absent and
/// structure-mismatch cases are `Ok(false)`; only a malformed descriptor is an
/// error.
pub fn toggle_from_caret(
    dom: &mut Dom,
    selection: &mut Selection,
    format: &Format,
    wrap: bool,
    value: Option<&str>,
) -> Result<bool, FormatError> {
    format.validate()?;
    if wrap && format.is_templated() && value.is_none() {
        return Err(FormatError::MissingValue);
    }

    let mut toggler = Toggler {
        dom: &mut *dom,
        format,
        wrap,
        value,
        changed: false,
    };

    let cells = selection.live_cells(toggler.dom);
    if !cells.is_empty() {
        for cell in cells {
            toggler.toggle_cell(cell);
        }
        return Ok(toggler.changed);
    }

    let Some(caret) = Caret::get(toggler.dom, selection) else {
        tracing::debug!("toggle skipped: nothing selected");
        return Ok(false);
    };

    let mut range = if !caret.is_range() {
        toggler.toggle_collapsed(&caret)
    } else if caret.start.node == caret.end.node && toggler.dom.is_text(caret.start.node) {
        toggler.toggle_fragment(&caret)
    } else {
        toggler.toggle_range(&caret)
    };
    let changed = toggler.changed;

    let anchor = range.or(selection.range()).filter(Range::is_collapsed);
    let keep = anchor.and_then(|r| {
        let dom = &*dom;
        dom.closest(r.start.node, |id| is_marker(dom, id))
    });
    let settled = settle_markers(dom, keep, &mut range);

    if let Some(range) = range {
        selection.update_range(dom, range);
    }
    Ok(changed || settled)
}

/// True when every leaf under the selection (or every selected cell) carries `format`.
pub fn is_format_active(
    dom: &Dom,
    selection: &Selection,
    format: &Format,
    value: Option<&str>,
) -> bool {
    let cells = selection.live_cells(dom);
    let leaves: Vec<NodeId> = if !cells.is_empty() {
        cells.iter().flat_map(|&cell| dom.leaves_in(cell)).collect()
    } else {
        let Some(caret) = Caret::get(dom, selection) else {
            return false;
        };
        if !caret.is_range() {
            return leaf_at(dom, caret.start.boundary())
                .is_some_and(|leaf| has_format(dom, leaf, format, value));
        }
        match (
            first_leaf_from(dom, caret.start.boundary()),
            last_leaf_to(dom, caret.end.boundary()),
        ) {
            (Some(first), Some(last)) => dom.leaves_between(first, last),
            _ => return false,
        }
    };

    let leaves: Vec<NodeId> = leaves
        .into_iter()
        .filter(|&leaf| match dom.data(leaf) {
            Some(NodeData::Text(text)) => text.chars().any(|c| c != ZERO_WIDTH_SPACE),
            Some(NodeData::Element(el)) => matches!(el.tag.as_str(), "br" | "img"),
            None => false,
        })
        .collect();
    !leaves.is_empty()
        && leaves
            .iter()
            .all(|&leaf| has_format(dom, leaf, format, value))
}

/// Removes empty caret markers and splices typed-into ones back into the tree,
/// except `keep`. Boundaries in `range` are moved so they stay attached.
pub(crate) fn settle_markers(
    dom: &mut Dom,
    keep: Option<NodeId>,
    range: &mut Option<Range>,
) -> bool {
    let markers: Vec<NodeId> = find_markers(dom)
        .into_iter()
        .filter(|&marker| Some(marker) != keep)
        .collect();
    let mut changed = false;

    for marker in markers {
        if !dom.contains(marker) {
            continue;
        }
        let (Some(parent), Some(index)) = (dom.parent(marker), dom.index_in_parent(marker)) else {
            continue;
        };
        if keep.is_some_and(|kept| dom.is_inclusive_ancestor(marker, kept)) {
            // Kept marker nested inside a stale one: only the outer span goes.
            strip_marker_text(dom, marker, range);
            let spliced = dom.children(marker).len();
            shift_boundaries(range, parent, index, spliced);
            dom.replace_with_children(marker);
            changed = true;
            continue;
        }

        if marker_chain(dom, marker).is_some() {
            if let Some(range) = range.as_mut() {
                for boundary in [&mut range.start, &mut range.end] {
                    if dom.is_inclusive_ancestor(marker, boundary.node) {
                        *boundary = Boundary::new(parent, index);
                    }
                }
            }
            shift_boundaries(range, parent, index, 0);
            dom.remove(marker);
            restore_break(dom, parent);
        } else {
            strip_marker_text(dom, marker, range);
            let spliced = dom.children(marker).len();
            shift_boundaries(range, parent, index, spliced);
            dom.replace_with_children(marker);
        }
        changed = true;
    }
    changed
}

/// Element boundaries in `parent` past `index` follow a node at `index`
/// being replaced by `replacement` nodes.
fn shift_boundaries(range: &mut Option<Range>, parent: NodeId, index: usize, replacement: usize) {
    let Some(range) = range.as_mut() else {
        return;
    };
    for boundary in [&mut range.start, &mut range.end] {
        if boundary.node == parent && boundary.offset > index {
            boundary.offset = boundary.offset + replacement - 1;
        }
    }
}

/// Puts the placeholder `<br>` back into the block holding `node` once nothing
/// in it renders.
fn restore_break(dom: &mut Dom, node: NodeId) {
    let block = {
        let dom = &*dom;
        dom.closest(node, |id| {
            dom.is_block(id) && !dom.tag(id).is_some_and(is_structural_tag)
        })
    };
    let Some(block) = block.filter(|&block| block != dom.root()) else {
        return;
    };
    let rendered = dom.leaves_in(block).into_iter().any(|leaf| match dom.text(leaf) {
        Some(text) => !text.is_empty(),
        None => dom.is_void(leaf),
    });
    if !rendered {
        let br = dom.create_element(ElementData::new("br"));
        dom.append_child(block, br);
    }
}

fn strip_marker_text(dom: &mut Dom, marker: NodeId, range: &mut Option<Range>) {
    let texts: Vec<NodeId> = {
        let mut texts = Vec::new();
        dom.walk(marker, |node| {
            if dom.is_text(node) {
                texts.push(node);
            }
            Walk::Continue
        });
        texts
    };
    for text_node in texts {
        let Some(text) = dom.text(text_node) else {
            continue;
        };
        if !text.contains(ZERO_WIDTH_SPACE) {
            continue;
        }
        let cleaned: String = text.chars().filter(|&c| c != ZERO_WIDTH_SPACE).collect();
        if let Some(range) = range.as_mut() {
            for boundary in [&mut range.start, &mut range.end] {
                if boundary.node == text_node {
                    let removed = text
                        .chars()
                        .take(boundary.offset)
                        .filter(|&c| c == ZERO_WIDTH_SPACE)
                        .count();
                    boundary.offset -= removed;
                }
            }
        }
        dom.set_text(text_node, cleaned);
    }
}

/// Format chain of an empty marker (one element per level down to the
/// placeholder text); `None` once the marker holds real content.
fn marker_chain(dom: &Dom, marker: NodeId) -> Option<Vec<ElementData>> {
    let mut chain = Vec::new();
    let mut current = marker;
    loop {
        let [child] = dom.children(current) else {
            return None;
        };
        match dom.data(*child)? {
            NodeData::Text(text) => {
                return text.chars().all(|c| c == ZERO_WIDTH_SPACE).then_some(chain);
            }
            NodeData::Element(el) => {
                chain.push(el.clone());
                current = *child;
            }
        }
    }
}

/// Removes empty text nodes and childless inline elements under `scope`.
pub(crate) fn prune_empty(dom: &mut Dom, scope: NodeId) {
    let mut nodes = Vec::new();
    dom.walk(scope, |node| {
        nodes.push(node);
        Walk::Continue
    });
    for &node in nodes.iter().rev() {
        if !dom.contains(node) {
            continue;
        }
        let empty = match dom.data(node) {
            Some(NodeData::Text(text)) => text.is_empty(),
            Some(NodeData::Element(el)) => {
                !is_block_tag(&el.tag) && !is_void_tag(&el.tag) && dom.children(node).is_empty()
            }
            None => false,
        };
        if empty {
            dom.remove(node);
        }
    }
}

fn leaf_at(dom: &Dom, at: Boundary) -> Option<NodeId> {
    if dom.is_text(at.node) || dom.is_leaf(at.node) {
        return Some(at.node);
    }
    let child = dom
        .child(at.node, at.offset)
        .or_else(|| dom.last_child(at.node))?;
    Some(dom.first_leaf(child))
}

fn first_leaf_from(dom: &Dom, at: Boundary) -> Option<NodeId> {
    if let Some(text) = dom.text(at.node) {
        return if at.offset >= char_len(text) {
            dom.next_leaf(at.node)
        } else {
            Some(at.node)
        };
    }
    match dom.child(at.node, at.offset) {
        Some(child) => Some(dom.first_leaf(child)),
        None if dom.is_leaf(at.node) => Some(at.node),
        None => dom.next_leaf(at.node),
    }
}

fn last_leaf_to(dom: &Dom, at: Boundary) -> Option<NodeId> {
    if dom.is_text(at.node) {
        return if at.offset == 0 {
            dom.prev_leaf(at.node)
        } else {
            Some(at.node)
        };
    }
    if at.offset == 0 {
        return if dom.is_leaf(at.node) {
            Some(at.node)
        } else {
            dom.prev_leaf(at.node)
        };
    }
    let child = dom
        .child(at.node, at.offset - 1)
        .or_else(|| dom.last_child(at.node))?;
    Some(dom.last_leaf(child))
}

fn list_item(dom: &Dom, list: &ListFormat, node: NodeId) -> Option<NodeId> {
    dom.closest(node, |id| {
        dom.is_tag(id, &list.item)
            && dom
                .parent(id)
                .and_then(|parent| dom.tag(parent))
                .is_some_and(|tag| list.accepts(tag))
    })
}

enum LineTarget {
    /// A text block that can be retagged in place.
    Block(NodeId),
    /// Consecutive inline siblings with no block of their own.
    Run(NodeId, NodeId),
}

struct Toggler<'a> {
    dom: &'a mut Dom,
    format: &'a Format,
    wrap: bool,
    value: Option<&'a str>,
    changed: bool,
}

impl Toggler<'_> {
    fn is_active(&self, node: NodeId) -> bool {
        let dom = &*self.dom;
        match self.format {
            Format::Block(block) if !self.wrap => dom
                .closest(node, |id| dom.tag(id).is_some_and(|tag| block.accepts(tag)))
                .is_some(),
            Format::List(list) if !self.wrap => list_item(dom, list, node).is_some(),
            format => {
                let value = if self.wrap { self.value } else { None };
                find_format(dom, node, format, value).is_some()
            }
        }
    }

    fn is_toggle_leaf(&self, node: NodeId) -> bool {
        let dom = &*self.dom;
        if !dom.is_leaf(node) {
            return false;
        }
        let parent = dom.parent(node);
        match dom.data(node) {
            Some(NodeData::Text(text)) => {
                if text.chars().all(|c| c == ZERO_WIDTH_SPACE) {
                    return false;
                }
                let structural = parent.is_some_and(|p| dom.is_structural(p));
                !(structural && text.trim().is_empty())
            }
            Some(NodeData::Element(el)) if self.format.is_inline() => match el.tag.as_str() {
                "br" => parent
                    .is_some_and(|p| dom.children(p).len() == 1 && !dom.is_structural(p)),
                "img" => true,
                _ => false,
            },
            Some(NodeData::Element(_)) => !dom.is_structural(node),
            None => false,
        }
    }

    fn toggle_cell(&mut self, cell: NodeId) {
        let leaves: Vec<NodeId> = self
            .dom
            .leaves_in(cell)
            .into_iter()
            .filter(|&leaf| self.is_toggle_leaf(leaf))
            .collect();
        if leaves.is_empty() {
            return;
        }
        self.apply_leaves(&leaves);
        if self.changed {
            self.tidy(cell);
        }
    }

    fn toggle_collapsed(&mut self, caret: &Caret) -> Option<Range> {
        let point = caret.start.boundary();

        if !self.format.is_inline() {
            let leaf = leaf_at(self.dom, point)?;
            if self.is_active(leaf) == self.wrap {
                tracing::debug!("line already in requested state");
                return None;
            }
            self.apply_leaves(&[leaf]);
            if self.changed {
                self.tidy_lines(leaf, leaf);
            }
            if self.dom.is_attached(point.node) {
                return Some(Range::collapsed(point));
            }
            return Boundary::before(self.dom, leaf).map(Range::collapsed);
        }

        if self.is_active(point.node) == self.wrap {
            tracing::debug!("caret already in requested state");
            return None;
        }

        let existing = {
            let dom = &*self.dom;
            dom.closest(point.node, |id| is_marker(dom, id))
                .and_then(|marker| marker_chain(dom, marker).map(|chain| (marker, chain)))
        };
        let settles = existing.is_some();
        let (parent, index, mut chain) = match existing {
            Some((marker, chain)) => {
                let parent = self.dom.parent(marker)?;
                let index = self.dom.index_in_parent(marker)?;
                self.dom.remove(marker);
                (parent, index, chain)
            }
            None => {
                let (parent, index) = self.insertion_point(point)?;
                (parent, index, Vec::new())
            }
        };

        let format = self.format;
        if self.wrap {
            chain.push(format.build_element(self.value));
        } else {
            chain.retain(|el| !format.matches_element(el, None));
        }

        // Nothing left pending: the caret goes back to plain content.
        if settles && chain.is_empty() && !self.is_active(parent) {
            restore_break(self.dom, parent);
            self.changed = true;
            return Some(Range::collapsed(Boundary::new(parent, index)));
        }

        let marker = self
            .dom
            .create_element(ElementData::new("span").attr(MARKER_ATTR, ""));
        let mut holder = marker;
        for data in chain {
            let element = self.dom.create_element(data);
            self.dom.append_child(holder, element);
            holder = element;
        }
        let placeholder = self.dom.create_text(ZERO_WIDTH_SPACE.to_string());
        self.dom.append_child(holder, placeholder);
        self.dom.insert_child(parent, index, marker);

        if !self.wrap {
            self.unwrap_leaf(placeholder);
        }
        self.trim_breaks(marker);
        self.changed = true;
        Some(Range::collapsed(Boundary::new(placeholder, 1)))
    }

    fn insertion_point(&mut self, point: Boundary) -> Option<(NodeId, usize)> {
        if let Some(text) = self.dom.text(point.node) {
            let len = char_len(text);
            let parent = self.dom.parent(point.node)?;
            let index = self.dom.index_in_parent(point.node)?;
            return match point.offset {
                0 => Some((parent, index)),
                offset if offset >= len => Some((parent, index + 1)),
                offset => {
                    self.dom.split_text(point.node, offset, len)?;
                    Some((parent, self.dom.index_in_parent(point.node)?))
                }
            };
        }
        if self.dom.is_void(point.node) {
            return Some((
                self.dom.parent(point.node)?,
                self.dom.index_in_parent(point.node)?,
            ));
        }
        Some((point.node, point.offset.min(self.dom.node_len(point.node))))
    }

    /// Drops the placeholder `<br>` a marker made redundant.
    fn trim_breaks(&mut self, marker: NodeId) {
        let Some(parent) = self.dom.parent(marker) else {
            return;
        };
        let siblings = self.dom.children(parent).to_vec();
        let redundant = match siblings.as_slice() {
            [a, b] if *a == marker && self.dom.is_tag(*b, "br") => Some(*b),
            [a, b] if *b == marker && self.dom.is_tag(*a, "br") => Some(*a),
            _ => self
                .dom
                .next_sibling(marker)
                .filter(|&next| self.dom.is_tag(next, "br") && siblings.last() == Some(&next)),
        };
        if let Some(br) = redundant {
            self.dom.remove(br);
        }
    }

    fn toggle_fragment(&mut self, caret: &Caret) -> Option<Range> {
        let node = caret.start.node;
        if self.is_active(node) == self.wrap {
            tracing::debug!("fragment already in requested state");
            return None;
        }
        let leaf = if self.format.is_inline() {
            self.dom
                .split_text(node, caret.start.offset, caret.end.offset)?
        } else {
            node
        };
        self.apply_leaves(&[leaf]);
        self.finish(leaf, leaf, Some(caret.same_root))
    }

    fn toggle_range(&mut self, caret: &Caret) -> Option<Range> {
        let last = self.end_leaf(caret.end.boundary())?;
        let first = self.start_leaf(caret.start.boundary())?;
        if self.dom.compare_order(first, last) == Ordering::Greater {
            return None;
        }

        let (leaves, scope) = if caret.is_same_line() {
            (self.dom.leaves_between(first, last), Some(caret.same_root))
        } else {
            (self.leaves_by_line(&caret.lines(self.dom), first, last), None)
        };
        let leaves: Vec<NodeId> = leaves
            .into_iter()
            .filter(|&leaf| self.is_toggle_leaf(leaf))
            .collect();
        if leaves.is_empty() {
            return None;
        }

        self.apply_leaves(&leaves);
        self.finish(first, last, scope)
    }

    /// One walk per selected line; only the outer lines are clipped to the
    /// boundary leaves.
    fn leaves_by_line(&self, lines: &[NodeId], first: NodeId, last: NodeId) -> Vec<NodeId> {
        let dom = &*self.dom;
        if lines.is_empty() {
            return dom.leaves_between(first, last);
        }
        let outer = lines.len() - 1;
        let mut leaves = Vec::new();
        for (index, &line) in lines.iter().enumerate() {
            let line_leaves = if dom.is_leaf(line) {
                vec![line]
            } else {
                dom.leaves_in(line)
            };
            let clip = index == 0 || index == outer;
            leaves.extend(line_leaves.into_iter().filter(|&leaf| {
                !clip
                    || (dom.compare_order(leaf, first) != Ordering::Less
                        && dom.compare_order(leaf, last) != Ordering::Greater)
            }));
        }
        leaves
    }

    fn start_leaf(&mut self, at: Boundary) -> Option<NodeId> {
        if let Some(text) = self.dom.text(at.node) {
            let len = char_len(text);
            if at.offset > 0 && at.offset < len {
                return self.dom.split_text(at.node, at.offset, len);
            }
        }
        first_leaf_from(self.dom, at)
    }

    fn end_leaf(&mut self, at: Boundary) -> Option<NodeId> {
        if let Some(text) = self.dom.text(at.node) {
            let len = char_len(text);
            if at.offset > 0 && at.offset < len {
                return self.dom.split_text(at.node, 0, at.offset);
            }
        }
        last_leaf_to(self.dom, at)
    }

    /// Tidies what changed, within `scope` when an inline edit stayed inside
    /// one block.
    fn finish(&mut self, first: NodeId, last: NodeId, scope: Option<NodeId>) -> Option<Range> {
        if self.changed {
            let root = self.dom.root();
            let inline = self.format.is_inline();
            let scope = scope
                .filter(|&block| inline && block != root && self.dom.is_attached(block));
            match scope {
                Some(block) => self.tidy(block),
                None => self.tidy_lines(first, last),
            }
            self.strip_trailing_break(last);
        }
        if !self.dom.is_attached(first) || !self.dom.is_attached(last) {
            return None;
        }
        let start = Boundary::before(self.dom, first)?;
        let end = Boundary::after(self.dom, last)?;
        Some(Range::new(start, end))
    }

    fn apply_leaves(&mut self, leaves: &[NodeId]) {
        let format = self.format;
        match format {
            Format::Inline(_) | Format::Style(_) => {
                for &leaf in leaves {
                    if self.wrap {
                        self.wrap_leaf(leaf);
                    } else {
                        self.unwrap_leaf(leaf);
                    }
                }
            }
            Format::Block(block) if self.wrap => self.wrap_blocks(block, leaves),
            Format::Block(block) => self.unwrap_blocks(block, leaves),
            Format::List(list) if self.wrap => self.wrap_list(list, leaves),
            Format::List(list) => self.unwrap_list(list, leaves),
        }
    }

    fn wrap_leaf(&mut self, leaf: NodeId) {
        let format = self.format;
        if find_format(self.dom, leaf, format, self.value).is_some() {
            return;
        }
        if format.is_templated() && find_format(self.dom, leaf, format, None).is_some() {
            self.unwrap_leaf(leaf);
        }
        if self
            .dom
            .wrap(leaf, format.build_element(self.value))
            .is_some()
        {
            self.changed = true;
        }
    }

    /// Removes every ancestor carrying the format from `leaf` only; content
    /// next to it keeps the format through re-wrapped clones.
    fn unwrap_leaf(&mut self, leaf: NodeId) {
        let format = self.format;
        while let Some(ancestor) = find_format(self.dom, leaf, format, None) {
            self.isolate(leaf, ancestor);
            if !self.strip(ancestor) {
                tracing::debug!(?ancestor, "format ancestor could not be stripped");
                break;
            }
            self.changed = true;
        }
    }

    /// Splits every level from `node` up to `ancestor` so the chain holds
    /// nothing but `node`.
    fn isolate(&mut self, node: NodeId, ancestor: NodeId) {
        let mut current = node;
        while current != ancestor {
            let Some(parent) = self.dom.parent(current) else {
                return;
            };
            if parent == self.dom.root() {
                return;
            }
            let Some(index) = self.dom.index_in_parent(current) else {
                return;
            };
            self.dom.split_element_at(parent, index + 1);
            self.dom.split_element_front(parent, index);
            current = parent;
        }
    }

    fn strip(&mut self, node: NodeId) -> bool {
        let format = self.format;
        let Some(tag) = self.dom.tag(node).map(str::to_string) else {
            return false;
        };
        match format {
            Format::Inline(inline) => {
                if tag == inline.tag || inline.same_tags.contains(&tag) {
                    return self.dom.replace_with_children(node);
                }
                self.strip_styles(node, inline.same_styles.keys())
            }
            Format::Style(style) => self.strip_styles(node, style.styles.keys()),
            Format::Block(_) | Format::List(_) => false,
        }
    }

    fn strip_styles<'k>(&mut self, node: NodeId, names: impl Iterator<Item = &'k String>) -> bool {
        let Some(el) = self.dom.element_mut(node) else {
            return false;
        };
        let mut removed = false;
        for name in names {
            removed |= el.styles.remove(name).is_some();
        }
        let bare = el.is_bare() && matches!(el.tag.as_str(), "span" | "font");
        if bare {
            self.dom.replace_with_children(node);
        }
        removed
    }

    fn line_target(
        &self,
        leaf: NodeId,
        is_container: impl Fn(&str) -> bool,
        is_switchable: impl Fn(&str) -> bool,
    ) -> Option<LineTarget> {
        let dom = &*self.dom;
        let container = match dom.closest(leaf, |id| dom.is_block(id)) {
            None => dom.root(),
            Some(block) => {
                let tag = dom.tag(block)?;
                if is_container(tag) {
                    block
                } else if TEXT_BLOCK_TAGS.contains(&tag) || is_switchable(tag) {
                    return Some(LineTarget::Block(block));
                } else {
                    return None;
                }
            }
        };
        if leaf == container {
            return None;
        }

        let mut top = leaf;
        while dom.parent(top) != Some(container) {
            top = dom.parent(top)?;
        }
        let mut first = top;
        while let Some(prev) = dom.prev_sibling(first).filter(|&n| !dom.is_block(n)) {
            first = prev;
        }
        let mut last = top;
        while let Some(next) = dom.next_sibling(last).filter(|&n| !dom.is_block(n)) {
            last = next;
        }
        Some(LineTarget::Run(first, last))
    }

    fn wrap_run(&mut self, first: NodeId, last: NodeId, data: ElementData) -> Option<NodeId> {
        let parent = self.dom.parent(first)?;
        let start = self.dom.index_in_parent(first)?;
        let end = self.dom.index_in_parent(last)?;
        let run = self.dom.children(parent).get(start..=end)?.to_vec();
        let wrapper = self.dom.create_element(data);
        self.dom.insert_child(parent, start, wrapper);
        for node in run {
            self.dom.append_child(wrapper, node);
        }
        Some(wrapper)
    }

    fn wrap_blocks(&mut self, block: &BlockFormat, leaves: &[NodeId]) {
        for &leaf in leaves {
            if !self.dom.is_attached(leaf) {
                continue;
            }
            let target = self.line_target(
                leaf,
                |tag| block.containers.iter().any(|t| t == tag),
                |tag| block.accepts(tag),
            );
            match target {
                Some(LineTarget::Block(node)) => {
                    if !self.dom.is_tag(node, &block.tag) && self.dom.set_tag(node, &block.tag) {
                        self.changed = true;
                    }
                }
                Some(LineTarget::Run(first, last)) => {
                    if self
                        .wrap_run(first, last, ElementData::new(&block.tag))
                        .is_some()
                    {
                        self.changed = true;
                    }
                }
                None => {}
            }
        }
    }

    fn unwrap_blocks(&mut self, block: &BlockFormat, leaves: &[NodeId]) {
        let groups = self.group_leaves(leaves, |dom, leaf| {
            dom.closest(leaf, |id| dom.tag(id).is_some_and(|tag| block.accepts(tag)))
        });
        for (owner, group) in groups {
            let holds_blocks = self
                .dom
                .children(owner)
                .iter()
                .any(|&child| self.dom.is_block(child));
            if holds_blocks {
                self.isolate_slice(owner, &group);
                self.dom.replace_with_children(owner);
            } else {
                self.dom.set_tag(owner, block.fallback_tag());
            }
            self.changed = true;
        }
    }

    fn wrap_list(&mut self, list: &ListFormat, leaves: &[NodeId]) {
        let mut switches: Vec<(NodeId, Vec<NodeId>)> = Vec::new();
        for &leaf in leaves {
            if !self.dom.is_attached(leaf) {
                continue;
            }
            if let Some(item) = list_item(self.dom, list, leaf) {
                let Some(owner) = self.dom.parent(item) else {
                    continue;
                };
                if self.dom.is_tag(owner, &list.tag) {
                    continue;
                }
                match switches.iter_mut().find(|(o, _)| *o == owner) {
                    Some((_, group)) => group.push(leaf),
                    None => switches.push((owner, vec![leaf])),
                }
                continue;
            }

            let target = self.line_target(
                leaf,
                |tag| matches!(tag, "li" | "td" | "th" | "blockquote"),
                |_| false,
            );
            match target {
                Some(LineTarget::Block(node)) => {
                    let Some(holder) = self.dom.wrap(node, ElementData::new(&list.tag)) else {
                        continue;
                    };
                    self.dom.set_tag(node, &list.item);
                    self.merge_lists(holder);
                    self.changed = true;
                }
                Some(LineTarget::Run(first, last)) => {
                    let Some(item) = self.wrap_run(first, last, ElementData::new(&list.item)) else {
                        continue;
                    };
                    if let Some(holder) = self.dom.wrap(item, ElementData::new(&list.tag)) {
                        self.merge_lists(holder);
                    }
                    self.changed = true;
                }
                None => {}
            }
        }

        for (owner, group) in switches {
            self.isolate_slice(owner, &group);
            self.dom.set_tag(owner, &list.tag);
            self.merge_lists(owner);
            self.changed = true;
        }
    }

    fn unwrap_list(&mut self, list: &ListFormat, leaves: &[NodeId]) {
        let groups = self.group_leaves(leaves, |dom, leaf| {
            list_item(dom, list, leaf).and_then(|item| dom.parent(item))
        });
        for (owner, group) in groups {
            self.isolate_slice(owner, &group);
            for item in self.dom.children(owner).to_vec() {
                if self.dom.is_tag(item, &list.item) {
                    self.demote_item(item);
                }
            }
            self.dom.replace_with_children(owner);
            self.changed = true;
        }
    }

    /// Turns a list item into a plain block, keeping nested blocks as siblings.
    fn demote_item(&mut self, item: NodeId) {
        let children = self.dom.children(item).to_vec();
        let leading: Vec<NodeId> = children
            .iter()
            .copied()
            .take_while(|&child| !self.dom.is_block(child))
            .collect();
        if !leading.is_empty() || children.is_empty() {
            let block = self.dom.create_element(ElementData::new(DEFAULT_BLOCK));
            self.dom.insert_before(item, block);
            if leading.is_empty() {
                let br = self.dom.create_element(ElementData::new("br"));
                self.dom.append_child(block, br);
            }
            for child in leading {
                self.dom.append_child(block, child);
            }
        }
        self.dom.replace_with_children(item);
    }

    fn merge_lists(&mut self, list: NodeId) -> NodeId {
        let Some(tag) = self.dom.tag(list).map(str::to_string) else {
            return list;
        };
        let mut list = list;
        if let Some(prev) = self
            .dom
            .prev_sibling(list)
            .filter(|&prev| self.dom.is_tag(prev, &tag))
        {
            for child in self.dom.children(list).to_vec() {
                self.dom.append_child(prev, child);
            }
            self.dom.remove(list);
            list = prev;
        }
        if let Some(next) = self
            .dom
            .next_sibling(list)
            .filter(|&next| self.dom.is_tag(next, &tag))
        {
            for child in self.dom.children(next).to_vec() {
                self.dom.append_child(list, child);
            }
            self.dom.remove(next);
        }
        list
    }

    fn group_leaves(
        &self,
        leaves: &[NodeId],
        locate: impl Fn(&Dom, NodeId) -> Option<NodeId>,
    ) -> Vec<(NodeId, Vec<NodeId>)> {
        let mut groups: Vec<(NodeId, Vec<NodeId>)> = Vec::new();
        for &leaf in leaves {
            let Some(owner) = locate(self.dom, leaf) else {
                continue;
            };
            match groups.iter_mut().find(|(o, _)| *o == owner) {
                Some((_, group)) => group.push(leaf),
                None => groups.push((owner, vec![leaf])),
            }
        }
        groups
    }

    /// Narrows `container` to the children holding `leaves`; the rest moves
    /// into clones before and after it.
    fn isolate_slice(&mut self, container: NodeId, leaves: &[NodeId]) {
        let (first, last) = {
            let dom = &*self.dom;
            let children = dom.children(container);
            let holds = |child: &NodeId| {
                leaves
                    .iter()
                    .any(|&leaf| dom.is_inclusive_ancestor(*child, leaf))
            };
            match (children.iter().position(holds), children.iter().rposition(holds)) {
                (Some(first), Some(last)) => (first, last),
                _ => return,
            }
        };
        self.dom.split_element_at(container, last + 1);
        self.dom.split_element_front(container, first);
    }

    fn tidy_lines(&mut self, first: NodeId, last: NodeId) {
        let root = self.dom.root();
        let (Some(from), Some(to)) = (self.dom.line_index(first), self.dom.line_index(last)) else {
            return;
        };
        let lines: Vec<NodeId> = self
            .dom
            .children(root)
            .iter()
            .copied()
            .take(to + 1)
            .skip(from)
            .collect();
        for line in lines {
            self.tidy(line);
        }
    }

    /// Drops empty inline elements and empty text, then merges identical
    /// adjacent inline wrappers.
    fn tidy(&mut self, scope: NodeId) {
        prune_empty(self.dom, scope);
        self.merge_adjacent(scope);
    }

    fn merge_adjacent(&mut self, parent: NodeId) {
        let mut index = 0;
        while let Some(child) = self.dom.child(parent, index) {
            if let Some(next) = self.dom.child(parent, index + 1) {
                if self.mergeable(child, next) {
                    for moved in self.dom.children(next).to_vec() {
                        self.dom.append_child(child, moved);
                    }
                    self.dom.remove(next);
                    continue;
                }
            }
            if self.dom.is_element(child) {
                self.merge_adjacent(child);
            }
            index += 1;
        }
    }

    fn mergeable(&self, a: NodeId, b: NodeId) -> bool {
        match (self.dom.element(a), self.dom.element(b)) {
            (Some(a_el), Some(b_el)) => {
                a_el == b_el
                    && !is_block_tag(&a_el.tag)
                    && !is_void_tag(&a_el.tag)
                    && !is_marker(self.dom, a)
            }
            _ => false,
        }
    }

    fn strip_trailing_break(&mut self, last: NodeId) {
        let block = {
            let dom = &*self.dom;
            dom.closest(last, |id| dom.is_block(id))
        };
        let Some(block) = block else {
            return;
        };
        let Some(tail) = self.dom.last_child(block) else {
            return;
        };
        if tail == last || !self.dom.is_tag(tail, "br") {
            return;
        }
        let has_content = self.dom.children(block).iter().any(|&child| {
            child != tail && !self.dom.text(child).is_some_and(str::is_empty)
        });
        if has_content {
            self.dom.remove(tail);
        }
    }
}
