use serde_json::Value;

use crate::caret::{Boundary, Caret, Range, Selection};
use crate::command::{CommandArgs, Commander, EditorCommand};
use crate::config::EditorConfig;
use crate::detector::Detector;
use crate::dom::{Dom, ElementData, NodeId, TEXT_BLOCK_TAGS, byte_index, char_len};
use crate::error::{CommandError, FormatError};
use crate::format::{DEFAULT_BLOCK, Format};
use crate::history::{FlagToken, History, HistoryPath, HistoryRecord};
use crate::input::{Key, KeyInput};
use crate::table;
use crate::toggle::{
    find_markers, is_format_active, is_marker, prune_empty, settle_markers, toggle_from_caret,
};

pub struct Editor {
    dom: Dom,
    selection: Selection,
    history: History,
    commander: Commander,
    detector: Detector,
    config: EditorConfig,
}

impl Editor {
    pub fn new(html: &str, config: EditorConfig) -> Self {
        let config = config.with_defaults();
        let dom = Dom::from_html(html);
        let mut selection = Selection::default();
        if let Some(first) = dom.first_child(dom.root()) {
            let at = line_start(&dom, first);
            selection.collapse(&dom, at);
        }
        let mut history = History::new(config.max_undo);
        history.record(HistoryRecord::snapshot(&dom, &selection));

        Self {
            dom,
            selection,
            history,
            commander: Commander::with_defaults(),
            detector: Detector::default(),
            config,
        }
    }

    pub fn from_html(html: &str) -> Self {
        Self::new(html, EditorConfig::default())
    }

    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    pub fn html(&self) -> String {
        self.dom.inner_html()
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn caret(&self) -> Option<Caret> {
        Caret::get(&self.dom, &self.selection)
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn commander(&self) -> &Commander {
        &self.commander
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn register_command(&mut self, command: EditorCommand) -> Result<(), CommandError> {
        self.commander.register(command)
    }

    pub fn register_detector(&mut self, callback: impl FnMut(&Dom, &[NodeId]) + 'static) {
        self.detector.register(callback);
    }

    pub fn set_selection(&mut self, range: Range) {
        self.flush_typing();
        self.selection.update_range(&self.dom, range);
        self.settle_stale_markers();
        self.notify();
    }

    pub fn select_cells(&mut self, cells: Vec<NodeId>) {
        self.flush_typing();
        self.selection.select_cells(cells);
        self.notify();
    }

    /// Selects chars `start..end` of the first text node containing `needle`.
    pub fn select_text(&mut self, needle: &str, start: usize, end: usize) -> bool {
        let Some(node) = self.dom.find_text(needle) else {
            tracing::debug!(needle, "no text node contains the needle");
            return false;
        };
        let range = crate::caret::set_start_to_end(&self.dom, node, start, end);
        self.set_selection(range);
        true
    }

    pub fn select_path(&mut self, path: &HistoryPath) {
        self.flush_typing();
        self.selection = path.restore(&self.dom);
        self.settle_stale_markers();
        self.notify();
    }

    pub fn run_command(&mut self, id: &str, args: Option<Value>) -> Result<(), CommandError> {
        let Some(command) = self.commander.command(id) else {
            return Err(CommandError::Unknown(id.to_string()));
        };

        // Command:Before
        self.flush_typing();
        let path = HistoryPath::capture(&self.dom, &self.selection);
        self.history.add_undo_path(path);
        let before = self.settled_html();

        let result = (command.handler)(self, &CommandArgs::new(id, args.as_ref()));

        // Command:After
        let html = self.dom.inner_html();
        let typed = self.history.flush()
            && self
                .history
                .current_record()
                .is_some_and(|record| record.data == html);
        if typed {
            tracing::trace!(id, "command typed; its run is already recorded");
        } else if self.settled_html() != before {
            self.history
                .record(HistoryRecord::snapshot(&self.dom, &self.selection));
        } else {
            tracing::debug!(id, "command left the content unchanged");
        }
        self.notify();
        result
    }

    /// Toggles `format`: unwraps when the whole selection already carries it.
    /// Not recorded on its own; go through [`Editor::run_command`] for that.
    pub fn toggle(&mut self, format: &Format, value: Option<&str>) -> Result<bool, FormatError> {
        let wrap = !self.is_active(format, value);
        self.apply_format(format, wrap, value)
    }

    pub fn apply_format(
        &mut self,
        format: &Format,
        wrap: bool,
        value: Option<&str>,
    ) -> Result<bool, FormatError> {
        toggle_from_caret(&mut self.dom, &mut self.selection, format, wrap, value)
    }

    pub fn is_active(&self, format: &Format, value: Option<&str>) -> bool {
        is_format_active(&self.dom, &self.selection, format, value)
    }

    /// Runs a raw tree edit against the document and selection.
    pub fn edit_tree(&mut self, edit: impl FnOnce(&mut Dom, &mut Selection) -> bool) -> bool {
        edit(&mut self.dom, &mut self.selection)
    }

    pub fn active_cell(&self) -> Option<NodeId> {
        table::cell_context(&self.dom, &self.selection).map(|(_, cell)| cell)
    }

    pub fn undo(&mut self) -> bool {
        self.flush_typing();
        let Some(record) = self.history.undo().cloned() else {
            return false;
        };
        self.dom.set_inner_html(&record.data);
        self.selection = record
            .undo
            .as_ref()
            .or(record.redo.as_ref())
            .map(|path| path.restore(&self.dom))
            .unwrap_or_default();
        self.notify();
        true
    }

    pub fn redo(&mut self) -> bool {
        self.flush_typing();
        let Some(record) = self.history.redo().cloned() else {
            return false;
        };
        self.dom.set_inner_html(&record.data);
        self.selection = record
            .redo
            .as_ref()
            .map(|path| path.restore(&self.dom))
            .unwrap_or_default();
        self.notify();
        true
    }

    pub fn flag(&mut self) -> Option<FlagToken> {
        self.flush_typing();
        self.history.flag()
    }

    pub fn change_data(&mut self, token: FlagToken, data: impl Into<String>) -> bool {
        self.history.change_data(token, data)
    }

    pub fn mouse_down(&mut self, at: Boundary) {
        self.set_selection(Range::collapsed(at));
    }

    pub fn blur(&mut self) {
        self.flush_typing();
        self.settle_all_markers();
    }

    pub fn key_down(&mut self, input: &KeyInput) -> bool {
        match input.key {
            Key::Char('z' | 'Z') if input.ctrl && input.shift => self.redo(),
            Key::Char('z' | 'Z') if input.ctrl => self.undo(),
            Key::Char('y' | 'Y') if input.ctrl => self.redo(),
            Key::Char(_) if input.ctrl => {
                match self.commander.for_shortcut(input).map(str::to_string) {
                    Some(id) => self.run_command(&id, None).is_ok(),
                    None => false,
                }
            }
            Key::Char(c) => self.insert_text(c.encode_utf8(&mut [0; 4])),
            Key::Backspace => self.delete_backward(),
            Key::Enter => {
                self.flush_typing();
                self.run_command("line.split", None).is_ok()
            }
            key if key.is_navigation() => {
                self.flush_typing();
                self.move_caret(key)
            }
            key => {
                tracing::trace!(?key, "key has no binding");
                false
            }
        }
    }

    /// Content as it would read once pending caret markers are gone.
    fn settled_html(&self) -> String {
        if find_markers(&self.dom).is_empty() {
            return self.dom.inner_html();
        }
        let mut dom = self.dom.clone();
        settle_markers(&mut dom, None, &mut None);
        dom.inner_html()
    }

    fn flush_typing(&mut self) {
        self.history.flush();
    }

    fn notify(&mut self) {
        self.detector.notify(&self.dom, &self.selection);
    }

    fn settle_stale_markers(&mut self) {
        let mut range = self.selection.range();
        let keep = range
            .filter(Range::is_collapsed)
            .and_then(|r| self.dom.closest(r.start.node, |id| is_marker(&self.dom, id)));
        if settle_markers(&mut self.dom, keep, &mut range) {
            if let Some(range) = range {
                self.selection.update_range(&self.dom, range);
            }
        }
    }

    fn settle_all_markers(&mut self) {
        let mut range = self.selection.range();
        if settle_markers(&mut self.dom, None, &mut range) {
            if let Some(range) = range {
                self.selection.update_range(&self.dom, range);
            }
        }
    }

    fn after_typing(&mut self, before: Option<HistoryPath>) {
        let snapshot = HistoryRecord::snapshot(&self.dom, &self.selection);
        if self.config.coalesce_typing {
            self.history.typing(before, snapshot);
        } else {
            self.history.add_undo_path(before);
            self.history.record(snapshot);
        }
        self.notify();
    }

    /// Inserts `text` at the caret, replacing a selection inside one text node.
    pub fn insert_text(&mut self, text: &str) -> bool {
        if text.is_empty() {
            return false;
        }
        let before = HistoryPath::capture(&self.dom, &self.selection);
        let Some(at) = self.collapse_for_edit() else {
            tracing::debug!("typing without a caret");
            return false;
        };
        let Some(at) = self.text_point(at) else {
            return false;
        };
        let Some(current) = self.dom.text(at.node).map(str::to_string) else {
            return false;
        };

        let split = byte_index(&current, at.offset);
        let mut updated = String::with_capacity(current.len() + text.len());
        updated.push_str(&current[..split]);
        updated.push_str(text);
        updated.push_str(&current[split..]);
        self.dom.set_text(at.node, updated);
        self.drop_placeholder_break(at.node);

        let mut range = Some(Range::collapsed(Boundary::new(
            at.node,
            at.offset + char_len(text),
        )));
        settle_markers(&mut self.dom, None, &mut range);
        if let Some(range) = range {
            self.selection.update_range(&self.dom, range);
        }
        self.after_typing(before);
        true
    }

    /// Deletes one char before the caret, joining with the previous line at
    /// a line start.
    pub fn delete_backward(&mut self) -> bool {
        let before = HistoryPath::capture(&self.dom, &self.selection);
        let Some(caret) = self.caret() else {
            return false;
        };

        if caret.is_range() {
            if !self.delete_fragment(&caret) {
                self.selection.collapse(&self.dom, caret.start.boundary());
                return false;
            }
            self.after_typing(before);
            return true;
        }

        let at = caret.start.boundary();
        let Some(line) = self.line_for(at) else {
            return false;
        };
        let column = column_of(&self.dom, line, at);
        let changed = if column > 0 {
            self.delete_char_before(line, column)
        } else {
            self.join_with_previous_line(line)
        };
        if changed {
            self.settle_all_markers();
            self.after_typing(before);
        }
        changed
    }

    /// Splits the caret's block in two, leaving the caret at the start of the new one.
    pub fn split_line(&mut self) -> bool {
        let Some(at) = self.collapse_for_edit() else {
            return false;
        };
        let block = {
            let dom = &self.dom;
            dom.closest(at.node, |id| {
                dom.tag(id)
                    .is_some_and(|tag| TEXT_BLOCK_TAGS.contains(&tag) || tag == "li")
            })
        };
        let Some(block) = block else {
            tracing::debug!("caret is not inside a splittable block");
            return false;
        };

        let Some((mut parent, mut index)) = self.split_point(at) else {
            return false;
        };
        let tail = loop {
            let moved = self.dom.split_element_at(parent, index);
            if parent == block {
                match moved {
                    Some(tail) => break tail,
                    None => {
                        let Some(tail) = self.dom.shallow_clone(block) else {
                            return false;
                        };
                        self.dom.insert_after(block, tail);
                        break tail;
                    }
                }
            }
            let Some(next) = self.dom.parent(parent) else {
                return false;
            };
            let Some(position) = self.dom.index_in_parent(parent) else {
                return false;
            };
            index = position + 1;
            parent = next;
        };

        for node in [block, tail] {
            prune_empty(&mut self.dom, node);
            if !has_content(&self.dom, node) {
                let br = self.dom.create_element(ElementData::new("br"));
                self.dom.append_child(node, br);
            }
        }
        let heading = self
            .dom
            .tag(tail)
            .is_some_and(|tag| tag.len() == 2 && tag.starts_with('h'));
        if heading && self.dom.text_content(tail).is_empty() {
            self.dom.set_tag(tail, DEFAULT_BLOCK);
        }

        let at = line_start(&self.dom, tail);
        self.selection.collapse(&self.dom, at);
        true
    }

    fn collapse_for_edit(&mut self) -> Option<Boundary> {
        let caret = self.caret()?;
        if caret.is_range() {
            self.delete_fragment(&caret);
        }
        Some(caret.start.boundary())
    }

    /// Removes a selection that lies inside one text node.
    fn delete_fragment(&mut self, caret: &Caret) -> bool {
        if caret.start.node != caret.end.node {
            return false;
        }
        let Some(text) = self.dom.text(caret.start.node) else {
            return false;
        };
        let start = byte_index(text, caret.start.offset);
        let end = byte_index(text, caret.end.offset);
        let updated = format!("{}{}", &text[..start], &text[end..]);
        self.dom.set_text(caret.start.node, updated);
        self.selection.collapse(&self.dom, caret.start.boundary());
        true
    }

    /// Where typing at `at` lands: an existing text node or a new empty one.
    fn text_point(&mut self, at: Boundary) -> Option<Boundary> {
        if self.dom.is_text(at.node) {
            return Some(at);
        }
        let root = self.dom.root();
        let (parent, index) = if self.dom.is_void(at.node) {
            (self.dom.parent(at.node)?, self.dom.index_in_parent(at.node)?)
        } else {
            (at.node, at.offset)
        };

        if parent == root {
            let line = self
                .dom
                .child(root, index)
                .or_else(|| self.dom.last_child(root));
            if let Some(line) = line.filter(|&l| self.dom.is_element(l) && !self.dom.is_void(l)) {
                return self.text_point(line_start(&self.dom, line));
            }
        }

        let prev = index
            .checked_sub(1)
            .and_then(|i| self.dom.child(parent, i))
            .filter(|&n| self.dom.is_text(n));
        if let Some(prev) = prev {
            return Some(Boundary::new(prev, self.dom.node_len(prev)));
        }
        if let Some(next) = self.dom.child(parent, index).filter(|&n| self.dom.is_text(n)) {
            return Some(Boundary::new(next, 0));
        }
        let text = self.dom.create_text("");
        self.dom.insert_child(parent, index, text);
        Some(Boundary::new(text, 0))
    }

    fn drop_placeholder_break(&mut self, text: NodeId) {
        let Some(next) = self.dom.next_sibling(text) else {
            return;
        };
        if self.dom.is_tag(next, "br") && self.dom.next_sibling(next).is_none() {
            self.dom.remove(next);
        }
    }

    fn split_point(&mut self, at: Boundary) -> Option<(NodeId, usize)> {
        if let Some(text) = self.dom.text(at.node) {
            let len = char_len(text);
            let parent = self.dom.parent(at.node)?;
            let index = self.dom.index_in_parent(at.node)?;
            return match at.offset {
                0 => Some((parent, index)),
                offset if offset >= len => Some((parent, index + 1)),
                offset => {
                    self.dom.split_text(at.node, offset, len)?;
                    Some((parent, self.dom.index_in_parent(at.node)?))
                }
            };
        }
        if self.dom.is_void(at.node) {
            return Some((self.dom.parent(at.node)?, self.dom.index_in_parent(at.node)?));
        }
        Some((at.node, at.offset))
    }

    fn delete_char_before(&mut self, line: NodeId, column: usize) -> bool {
        let at = point_in_line(&self.dom, line, column);
        let Some(text) = self.dom.text(at.node).map(str::to_string) else {
            return false;
        };
        if at.offset == 0 {
            return false;
        }
        let start = byte_index(&text, at.offset - 1);
        let end = byte_index(&text, at.offset);
        let updated = format!("{}{}", &text[..start], &text[end..]);
        self.dom.set_text(at.node, updated);
        let at = Boundary::new(at.node, at.offset - 1);

        if !has_content(&self.dom, line) {
            let br = self.dom.create_element(ElementData::new("br"));
            self.dom.append_child(line, br);
        }
        self.selection.collapse(&self.dom, at);
        true
    }

    fn join_with_previous_line(&mut self, line: NodeId) -> bool {
        let Some(prev) = self.dom.prev_sibling(line) else {
            return false;
        };
        let joinable = |dom: &Dom, id: NodeId| {
            dom.tag(id)
                .is_some_and(|tag| TEXT_BLOCK_TAGS.contains(&tag))
        };
        if !joinable(&self.dom, prev) || !joinable(&self.dom, line) {
            tracing::debug!("previous line cannot absorb this one");
            return false;
        }

        for placeholder in [prev, line] {
            if !has_content(&self.dom, placeholder) {
                for child in self.dom.children(placeholder).to_vec() {
                    self.dom.remove(child);
                }
            }
        }
        let at = match self.dom.last_child(prev) {
            Some(last) if self.dom.is_text(last) => Boundary::new(last, self.dom.node_len(last)),
            _ => Boundary::new(prev, self.dom.children(prev).len()),
        };
        for child in self.dom.children(line).to_vec() {
            self.dom.append_child(prev, child);
        }
        self.dom.remove(line);
        if self.dom.children(prev).is_empty() {
            let br = self.dom.create_element(ElementData::new("br"));
            self.dom.append_child(prev, br);
        }
        self.selection.collapse(&self.dom, at);
        true
    }

    fn line_for(&self, at: Boundary) -> Option<NodeId> {
        let root = self.dom.root();
        if at.node == root {
            return self
                .dom
                .child(root, at.offset)
                .or_else(|| self.dom.last_child(root));
        }
        self.dom.line_of(at.node)
    }

    fn move_caret(&mut self, key: Key) -> bool {
        let Some(caret) = self.caret() else {
            return false;
        };
        let lines = self.dom.children(self.dom.root()).to_vec();
        let (Some(&first), Some(&last)) = (lines.first(), lines.last()) else {
            return false;
        };
        let start = caret.start.boundary();
        let end = caret.end.boundary();
        let focus = if matches!(key, Key::ArrowLeft | Key::ArrowUp | Key::Home | Key::PageUp) {
            start
        } else {
            end
        };
        let Some(line) = self.line_for(focus) else {
            return false;
        };
        let column = column_of(&self.dom, line, focus);
        let index = self.dom.index_in_parent(line).unwrap_or(0);
        let dom = &self.dom;

        let target = match key {
            Key::ArrowLeft if caret.is_range() => start,
            Key::ArrowRight if caret.is_range() => end,
            Key::ArrowLeft if column > 0 => point_in_line(dom, line, column - 1),
            Key::ArrowLeft => match index.checked_sub(1).and_then(|i| lines.get(i)) {
                Some(&prev) => line_end(dom, prev),
                None => line_start(dom, line),
            },
            Key::ArrowRight if column < line_len(dom, line) => point_in_line(dom, line, column + 1),
            Key::ArrowRight => match lines.get(index + 1) {
                Some(&next) => line_start(dom, next),
                None => line_end(dom, line),
            },
            Key::ArrowUp => match index.checked_sub(1).and_then(|i| lines.get(i)) {
                Some(&prev) => point_in_line(dom, prev, column),
                None => line_start(dom, line),
            },
            Key::ArrowDown => match lines.get(index + 1) {
                Some(&next) => point_in_line(dom, next, column),
                None => line_end(dom, line),
            },
            Key::Home => line_start(dom, line),
            Key::End => line_end(dom, line),
            Key::PageUp => line_start(dom, first),
            Key::PageDown => line_end(dom, last),
            Key::Char(_) | Key::Backspace | Key::Enter => return false,
        };

        self.selection.collapse(&self.dom, target);
        self.settle_stale_markers();
        self.notify();
        true
    }
}

fn text_leaves(dom: &Dom, line: NodeId) -> Vec<NodeId> {
    if dom.is_text(line) {
        return vec![line];
    }
    dom.leaves_in(line)
        .into_iter()
        .filter(|&leaf| dom.is_text(leaf))
        .collect()
}

fn line_len(dom: &Dom, line: NodeId) -> usize {
    text_leaves(dom, line)
        .iter()
        .map(|&leaf| dom.node_len(leaf))
        .sum()
}

fn line_start(dom: &Dom, line: NodeId) -> Boundary {
    Boundary::before(dom, dom.first_leaf(line)).unwrap_or(Boundary::new(line, 0))
}

fn line_end(dom: &Dom, line: NodeId) -> Boundary {
    match text_leaves(dom, line).last() {
        Some(&text) => Boundary::new(text, dom.node_len(text)),
        None => line_start(dom, line),
    }
}

/// Char offset of `at` counted across the line's text.
fn column_of(dom: &Dom, line: NodeId, at: Boundary) -> usize {
    text_leaves(dom, line)
        .into_iter()
        .map(|leaf| {
            let len = dom.node_len(leaf);
            if leaf == at.node {
                at.offset.min(len)
            } else if dom.compare_boundaries((leaf, len), (at.node, at.offset))
                != std::cmp::Ordering::Greater
            {
                len
            } else {
                0
            }
        })
        .sum()
}

fn point_in_line(dom: &Dom, line: NodeId, column: usize) -> Boundary {
    let mut remaining = column;
    for leaf in text_leaves(dom, line) {
        let len = dom.node_len(leaf);
        if remaining <= len {
            return Boundary::new(leaf, remaining);
        }
        remaining -= len;
    }
    line_end(dom, line)
}

fn has_content(dom: &Dom, scope: NodeId) -> bool {
    dom.leaves_in(scope).into_iter().any(|leaf| {
        dom.text(leaf).map_or_else(
            || dom.is_void(leaf),
            |text| !text.is_empty(),
        )
    })
}
