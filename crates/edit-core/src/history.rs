use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::caret::{Boundary, Range, Selection};
use crate::dom::{Dom, NodeId};

/// Caret address that survives replacing the content with its own HTML.
///
/// Indices count a normalized child list: empty text nodes are skipped and a run
/// of adjacent text nodes is one slot whose offsets run across the whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryPath {
    Caret {
        path: Vec<usize>,
        offset: usize,
    },
    NodeRange {
        path: Vec<usize>,
        start: usize,
        end: usize,
    },
    Range {
        start_path: Vec<usize>,
        start_offset: usize,
        end_path: Vec<usize>,
        end_offset: usize,
    },
    Cells {
        table: Vec<usize>,
        cells: Vec<Vec<usize>>,
    },
}

impl HistoryPath {
    pub fn capture(dom: &Dom, selection: &Selection) -> Option<Self> {
        let cells = selection.live_cells(dom);
        if let Some(&first) = cells.first() {
            let table = dom.closest(first, |id| dom.is_tag(id, "table"))?;
            return Some(HistoryPath::Cells {
                table: node_path(dom, table)?,
                cells: cells
                    .iter()
                    .filter_map(|&cell| node_path(dom, cell))
                    .collect(),
            });
        }

        let range = selection.range()?;
        if !dom.is_attached(range.start.node) || !dom.is_attached(range.end.node) {
            return None;
        }
        let (start_path, start_offset) = locate(dom, range.start)?;
        let (end_path, end_offset) = locate(dom, range.end)?;
        Some(if start_path != end_path {
            HistoryPath::Range {
                start_path,
                start_offset,
                end_path,
                end_offset,
            }
        } else if start_offset == end_offset {
            HistoryPath::Caret {
                path: start_path,
                offset: start_offset,
            }
        } else {
            HistoryPath::NodeRange {
                path: start_path,
                start: start_offset,
                end: end_offset,
            }
        })
    }

    /// Rebuilds a selection against `dom`, degrading to the nearest position
    /// that still exists.
    pub fn restore(&self, dom: &Dom) -> Selection {
        let mut selection = Selection::default();
        match self {
            HistoryPath::Caret { path, offset } => {
                selection.collapse(dom, find_path(dom, path, *offset));
            }
            HistoryPath::NodeRange { path, start, end } => {
                let range = Range::new(find_path(dom, path, *start), find_path(dom, path, *end));
                selection.update_range(dom, range);
            }
            HistoryPath::Range {
                start_path,
                start_offset,
                end_path,
                end_offset,
            } => {
                let range = Range::new(
                    find_path(dom, start_path, *start_offset),
                    find_path(dom, end_path, *end_offset),
                );
                selection.update_range(dom, range);
            }
            HistoryPath::Cells { table, cells } => {
                let found: Vec<NodeId> = cells
                    .iter()
                    .filter_map(|path| resolve_node(dom, path))
                    .filter(|&cell| dom.is_tag(cell, "td") || dom.is_tag(cell, "th"))
                    .collect();
                if found.is_empty() {
                    tracing::warn!(?table, "selected cells no longer resolve");
                    selection.collapse(dom, find_path(dom, table, 0));
                } else {
                    selection.select_cells(found);
                }
            }
        }
        selection
    }
}

fn slots(dom: &Dom, parent: NodeId) -> Vec<Vec<NodeId>> {
    let mut slots: Vec<Vec<NodeId>> = Vec::new();
    let mut in_text = false;
    for &child in dom.children(parent) {
        match dom.text(child) {
            Some("") => continue,
            Some(_) if in_text => {
                if let Some(run) = slots.last_mut() {
                    run.push(child);
                }
            }
            Some(_) => {
                slots.push(vec![child]);
                in_text = true;
            }
            None => {
                slots.push(vec![child]);
                in_text = false;
            }
        }
    }
    slots
}

fn node_path(dom: &Dom, node: NodeId) -> Option<Vec<usize>> {
    let chain = dom.ancestors(node);
    if chain.is_empty() {
        return None;
    }
    chain
        .windows(2)
        .map(|pair| {
            slots(dom, pair[0])
                .iter()
                .position(|slot| slot.contains(&pair[1]))
        })
        .collect()
}

fn locate(dom: &Dom, boundary: Boundary) -> Option<(Vec<usize>, usize)> {
    let boundary = if dom.text(boundary.node).is_some_and(str::is_empty) {
        Boundary::new(
            dom.parent(boundary.node)?,
            dom.index_in_parent(boundary.node)?,
        )
    } else {
        boundary.clamped(dom)
    };
    let path = node_path(dom, boundary.node)?;

    let offset = if dom.is_text(boundary.node) {
        let parent = dom.parent(boundary.node)?;
        let run = slots(dom, parent)
            .into_iter()
            .find(|slot| slot.contains(&boundary.node))?;
        run.iter()
            .take_while(|&&node| node != boundary.node)
            .map(|&node| dom.node_len(node))
            .sum::<usize>()
            + boundary.offset
    } else {
        let children = dom.children(boundary.node);
        slots(dom, boundary.node)
            .iter()
            .filter(|slot| {
                children
                    .iter()
                    .position(|&child| child == slot[0])
                    .is_some_and(|index| index < boundary.offset)
            })
            .count()
    };
    Some((path, offset))
}

fn resolve_node(dom: &Dom, path: &[usize]) -> Option<NodeId> {
    let mut current = dom.root();
    for &index in path {
        current = *slots(dom, current).get(index)?.first()?;
    }
    Some(current)
}

/// Resolves a stored path, stopping at the deepest ancestor that still exists.
pub fn find_path(dom: &Dom, path: &[usize], offset: usize) -> Boundary {
    let root = dom.root();
    let mut current = root;
    let mut run = vec![root];
    for (depth, &index) in path.iter().enumerate() {
        match slots(dom, current).into_iter().nth(index) {
            Some(slot) => {
                current = slot[0];
                run = slot;
            }
            None if depth == 0 => {
                tracing::warn!(?path, "history path lost its line; using the first line");
                return match dom.first_child(root) {
                    Some(first) => Boundary::new(first, 0),
                    None => Boundary::new(root, 0),
                };
            }
            None => {
                tracing::warn!(?path, depth, "history path truncated at a live ancestor");
                return Boundary::new(current, 0);
            }
        }
    }

    if dom.is_text(current) {
        let mut remaining = offset;
        for &node in &run {
            let len = dom.node_len(node);
            if remaining <= len {
                return Boundary::new(node, remaining);
            }
            remaining -= len;
        }
        let last = run.last().copied().unwrap_or(current);
        return Boundary::new(last, dom.node_len(last));
    }

    let index = slots(dom, current)
        .get(offset)
        .and_then(|slot| dom.index_in_parent(slot[0]))
        .unwrap_or_else(|| dom.children(current).len());
    Boundary::new(current, index)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// The editing root's serialized content.
    pub data: String,
    /// Where the caret lands when redoing into this record.
    pub redo: Option<HistoryPath>,
    /// Where the caret lands when undoing back into this record.
    pub undo: Option<HistoryPath>,
}

impl HistoryRecord {
    pub fn snapshot(dom: &Dom, selection: &Selection) -> Self {
        Self {
            data: dom.inner_html(),
            redo: HistoryPath::capture(dom, selection),
            undo: None,
        }
    }
}

/// Opaque handle for patching a record after the fact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlagToken(u64);

#[derive(Debug, Clone)]
pub struct History {
    records: Vec<HistoryRecord>,
    current: Option<usize>,
    texting: bool,
    archived: Option<HistoryRecord>,
    flags: HashMap<FlagToken, usize>,
    next_flag: u64,
    max_undo: usize,
}

impl History {
    pub fn new(max_undo: usize) -> Self {
        Self {
            records: Vec::new(),
            current: None,
            texting: false,
            archived: None,
            flags: HashMap::new(),
            next_flag: 1,
            max_undo: max_undo.max(1),
        }
    }

    /// Pushes `record` after the current one, discarding any redoable future.
    pub fn record(&mut self, record: HistoryRecord) {
        let next = self.current.map_or(0, |current| current + 1);
        self.records.truncate(next);
        self.flags.retain(|_, index| *index < next);
        self.records.push(record);
        self.current = Some(next);

        while self.records.len() > self.max_undo {
            self.records.remove(0);
            self.flags.retain(|_, index| *index > 0);
            for index in self.flags.values_mut() {
                *index -= 1;
            }
            self.current = self.current.map(|current| current.saturating_sub(1));
        }
        tracing::trace!(len = self.records.len(), current = ?self.current, "history recorded");
    }

    pub fn undo(&mut self) -> Option<&HistoryRecord> {
        let current = self.current?;
        if current == 0 {
            return None;
        }
        self.current = Some(current - 1);
        tracing::trace!(current = current - 1, "history undo");
        self.records.get(current - 1)
    }

    pub fn redo(&mut self) -> Option<&HistoryRecord> {
        let current = self.current?;
        if current + 1 >= self.records.len() {
            return None;
        }
        self.current = Some(current + 1);
        tracing::trace!(current = current + 1, "history redo");
        self.records.get(current + 1)
    }

    /// Sets where undoing back into the current record should land.
    pub fn add_undo_path(&mut self, path: Option<HistoryPath>) {
        if let Some(record) = self.current.and_then(|current| self.records.get_mut(current)) {
            record.undo = path;
        }
    }

    /// Archives the state after a keystroke. The first keystroke of a run
    /// also pins the undo path to the caret before it.
    pub fn typing(&mut self, before: Option<HistoryPath>, after: HistoryRecord) {
        if !self.texting {
            self.add_undo_path(before);
            self.texting = true;
        }
        self.archived = Some(after);
    }

    /// Ends a typing run, recording its archived state. Returns whether a record was added.
    pub fn flush(&mut self) -> bool {
        self.texting = false;
        match self.archived.take() {
            Some(record) => {
                self.record(record);
                true
            }
            None => false,
        }
    }

    pub fn flag(&mut self) -> Option<FlagToken> {
        let current = self.current?;
        let token = FlagToken(self.next_flag);
        self.next_flag += 1;
        self.flags.insert(token, current);
        Some(token)
    }

    /// Replaces the content of the record `token` was issued for, without
    /// adding an undo step.
    pub fn change_data(&mut self, token: FlagToken, data: impl Into<String>) -> bool {
        let Some(&index) = self.flags.get(&token) else {
            tracing::debug!(?token, "flag token no longer maps to a record");
            return false;
        };
        match self.records.get_mut(index) {
            Some(record) => {
                record.data = data.into();
                true
            }
            None => false,
        }
    }

    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    pub fn current_record(&self) -> Option<&HistoryRecord> {
        self.current.and_then(|current| self.records.get(current))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn can_undo(&self) -> bool {
        self.current.is_some_and(|current| current > 0)
    }

    pub fn can_redo(&self) -> bool {
        self.current
            .is_some_and(|current| current + 1 < self.records.len())
    }

    pub fn is_texting(&self) -> bool {
        self.texting
    }

    pub fn max_undo(&self) -> usize {
        self.max_undo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(data: &str) -> HistoryRecord {
        HistoryRecord {
            data: data.to_string(),
            redo: None,
            undo: None,
        }
    }

    fn data(history: &History) -> Vec<&str> {
        history.records().iter().map(|r| r.data.as_str()).collect()
    }

    #[test]
    fn recording_after_undo_discards_the_future() {
        let mut history = History::new(200);
        history.record(record("A"));
        history.record(record("B"));
        history.record(record("C"));

        assert_eq!(history.undo().map(|r| r.data.clone()), Some("B".to_string()));
        assert_eq!(history.undo().map(|r| r.data.clone()), Some("A".to_string()));
        history.record(record("D"));

        assert_eq!(data(&history), vec!["A", "D"]);
        assert_eq!(history.current_index(), Some(1));
        assert!(!history.can_redo());
    }

    #[test]
    fn undo_and_redo_stop_at_the_ends() {
        let mut history = History::new(200);
        assert!(history.undo().is_none());
        history.record(record("A"));
        assert!(history.undo().is_none());
        assert!(history.redo().is_none());
        history.record(record("B"));
        assert!(history.redo().is_none());
        assert!(history.undo().is_some());
        assert!(history.undo().is_none());
        assert_eq!(history.redo().map(|r| r.data.as_str()), Some("B"));
    }

    #[test]
    fn oldest_records_are_dropped_past_the_limit() {
        let mut history = History::new(2);
        history.record(record("A"));
        let token = history.flag().unwrap();
        history.record(record("B"));
        let kept = history.flag().unwrap();
        history.record(record("C"));

        assert_eq!(data(&history), vec!["B", "C"]);
        assert!(!history.change_data(token, "x"));
        assert!(history.change_data(kept, "B2"));
        assert_eq!(data(&history), vec!["B2", "C"]);
    }

    #[test]
    fn typing_run_becomes_one_record() {
        let mut history = History::new(200);
        history.record(record(""));
        for text in ["a", "ab", "abc"] {
            history.typing(None, record(text));
        }
        assert!(history.is_texting());
        assert_eq!(history.len(), 1);
        assert!(history.flush());
        assert!(!history.flush());
        assert_eq!(data(&history), vec!["", "abc"]);
    }

    #[test]
    fn flag_patches_its_own_record() {
        let mut history = History::new(200);
        history.record(record("<p>uploading</p>"));
        let token = history.flag().unwrap();
        history.record(record("<p>uploading</p><p>more</p>"));

        assert!(history.change_data(token, "<p>done</p>"));
        assert_eq!(history.records()[0].data, "<p>done</p>");
        assert_eq!(history.len(), 2);
    }

    #[test]
    fn flags_into_a_discarded_future_are_dropped() {
        let mut history = History::new(200);
        history.record(record("A"));
        history.record(record("B"));
        let token = history.flag().unwrap();
        history.undo();
        history.record(record("C"));
        assert!(!history.change_data(token, "patched"));
        assert_eq!(data(&history), vec!["A", "C"]);
    }

    #[test]
    fn paths_survive_an_html_round_trip() {
        let mut dom = Dom::from_html("<p>ab</p><p><b>cd</b>ef</p>");
        let line = dom.child(dom.root(), 1).unwrap();
        let tail = dom.last_child(line).unwrap();
        // caret before "f" in a run split into "", "e", "f"
        let empty = dom.create_text("");
        dom.insert_before(tail, empty);
        dom.split_text(tail, 0, 1);
        let f = dom.last_child(line).unwrap();

        let mut selection = Selection::default();
        selection.collapse(&dom, Boundary::new(f, 0));
        let path = HistoryPath::capture(&dom, &selection).unwrap();
        assert_eq!(
            path,
            HistoryPath::Caret {
                path: vec![1, 1],
                offset: 1
            }
        );

        let copy = Dom::from_html(&dom.inner_html());
        let restored = path.restore(&copy).range().unwrap();
        assert_eq!(copy.text(restored.start.node), Some("ef"));
        assert_eq!(restored.start.offset, 1);
    }

    #[test]
    fn lost_paths_degrade_to_a_live_position() {
        let dom = Dom::from_html("<p>one</p><p>two</p>");
        let first = dom.first_child(dom.root()).unwrap();
        assert_eq!(find_path(&dom, &[7, 0], 3), Boundary::new(first, 0));
        let second = dom.child(dom.root(), 1).unwrap();
        assert_eq!(find_path(&dom, &[1, 4], 2), Boundary::new(second, 0));
    }
}
