use std::num::IntErrorKind;

use serde::{Deserialize, Serialize};

use crate::caret::{Boundary, Selection};
use crate::dom::{Dom, ElementData, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridIndex {
    pub row: usize,
    pub col: usize,
}

/// Logical row/column matrix of a table with spans expanded.
///
/// A cell spanning several rows or columns appears at every position it
/// covers. Ragged rows leave `None` holes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableGrid {
    pub table: NodeId,
    pub rows: Vec<Vec<Option<NodeId>>>,
    pub row_nodes: Vec<NodeId>,
    /// Origin position of the requested cell, `None` when it is not in this table.
    pub target: Option<GridIndex>,
}

pub fn is_cell(dom: &Dom, id: NodeId) -> bool {
    dom.is_tag(id, "td") || dom.is_tag(id, "th")
}

/// Largest span honored per attribute, matching what browsers clamp to.
const MAX_COLSPAN: usize = 1000;
const MAX_ROWSPAN: usize = 65534;

fn max_span(name: &str) -> usize {
    if name == "rowspan" { MAX_ROWSPAN } else { MAX_COLSPAN }
}

fn span(dom: &Dom, cell: NodeId, name: &str) -> usize {
    let max = max_span(name);
    dom.element(cell)
        .and_then(|el| el.attrs.get(name))
        .and_then(|value| match value.trim().parse::<usize>() {
            Ok(span) => Some(span),
            Err(err) if *err.kind() == IntErrorKind::PosOverflow => Some(max),
            Err(_) => None,
        })
        .unwrap_or(1)
        .clamp(1, max)
}

fn set_span(dom: &mut Dom, cell: NodeId, name: &str, value: usize) {
    let value = value.min(max_span(name));
    let Some(el) = dom.element_mut(cell) else {
        return;
    };
    if value <= 1 {
        el.attrs.remove(name);
    } else {
        el.attrs.insert(name.to_string(), value.to_string());
    }
}

/// Rows of `table` in document order, including those inside row groups.
pub fn table_rows(dom: &Dom, table: NodeId) -> Vec<NodeId> {
    let mut rows = Vec::new();
    for &child in dom.children(table) {
        match dom.tag(child) {
            Some("tr") => rows.push(child),
            Some("thead" | "tbody" | "tfoot") => rows.extend(
                dom.children(child)
                    .iter()
                    .copied()
                    .filter(|&row| dom.is_tag(row, "tr")),
            ),
            _ => {}
        }
    }
    rows
}

impl TableGrid {
    pub fn build(dom: &Dom, table: NodeId, target: Option<NodeId>) -> Self {
        let row_nodes = table_rows(dom, table);
        let mut rows: Vec<Vec<Option<NodeId>>> = vec![Vec::new(); row_nodes.len()];
        let mut found = None;

        for (r, &row) in row_nodes.iter().enumerate() {
            let mut col = 0;
            for &cell in dom.children(row) {
                if !is_cell(dom, cell) {
                    continue;
                }
                while rows[r].get(col).is_some_and(Option::is_some) {
                    col += 1;
                }
                let rowspan = span(dom, cell, "rowspan").min(row_nodes.len() - r);
                let colspan = span(dom, cell, "colspan");
                if found.is_none() && target == Some(cell) {
                    found = Some(GridIndex { row: r, col });
                }
                let end = col.saturating_add(colspan);
                for line in rows.iter_mut().skip(r).take(rowspan) {
                    if line.len() < end {
                        line.resize(end, None);
                    }
                    for slot in line.iter_mut().skip(col).take(colspan) {
                        *slot = Some(cell);
                    }
                }
                col = end;
            }
        }

        if target.is_some() && found.is_none() {
            tracing::debug!(?table, "target cell is not part of the table");
        }
        Self {
            table,
            rows,
            row_nodes,
            target: found,
        }
    }

    pub fn width(&self) -> usize {
        self.rows.iter().map(Vec::len).max().unwrap_or(0)
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn cell_at(&self, row: usize, col: usize) -> Option<NodeId> {
        self.rows.get(row)?.get(col).copied().flatten()
    }

    /// Top-left position covered by `cell`.
    pub fn origin_of(&self, cell: NodeId) -> Option<GridIndex> {
        self.rows.iter().enumerate().find_map(|(row, line)| {
            line.iter()
                .position(|&slot| slot == Some(cell))
                .map(|col| GridIndex { row, col })
        })
    }

    pub fn target_cell(&self) -> Option<NodeId> {
        self.target
            .and_then(|at| self.cell_at(at.row, at.col))
    }

    /// True when the same cell covers both positions.
    fn spans(&self, a: (usize, usize), b: (usize, usize)) -> Option<NodeId> {
        let cell = self.cell_at(a.0, a.1)?;
        (self.cell_at(b.0, b.1) == Some(cell)).then_some(cell)
    }
}

/// Table and cell the selection is working in.
pub fn cell_context(dom: &Dom, selection: &Selection) -> Option<(NodeId, NodeId)> {
    let cell = match selection.live_cells(dom).first() {
        Some(&cell) => cell,
        None => {
            let node = selection.range()?.start.node;
            dom.closest(node, |id| is_cell(dom, id))?
        }
    };
    let table = dom.closest(cell, |id| dom.is_tag(id, "table"))?;
    Some((table, cell))
}

fn grid_context(dom: &Dom, selection: &Selection) -> Option<TableGrid> {
    let Some((table, cell)) = cell_context(dom, selection) else {
        tracing::debug!("table operation outside a table");
        return None;
    };
    let grid = TableGrid::build(dom, table, Some(cell));
    grid.target.is_some().then_some(grid)
}

fn empty_cell(dom: &mut Dom, tag: &str) -> NodeId {
    let cell = dom.create_element(ElementData::new(tag));
    let br = dom.create_element(ElementData::new("br"));
    dom.append_child(cell, br);
    cell
}

fn place_caret(dom: &Dom, selection: &mut Selection, cell: NodeId) {
    let leaf = dom.first_leaf(cell);
    let at = Boundary::before(dom, leaf).unwrap_or(Boundary::new(cell, 0));
    selection.collapse(dom, at);
}

fn cell_tag(dom: &Dom, like: Option<NodeId>) -> String {
    like.and_then(|cell| dom.tag(cell))
        .filter(|tag| *tag == "th")
        .unwrap_or("td")
        .to_string()
}

pub fn insert_table(dom: &mut Dom, selection: &mut Selection, rows: usize, cols: usize) -> bool {
    let rows = rows.clamp(1, 32);
    let cols = cols.clamp(1, 32);
    let line = selection
        .range()
        .and_then(|range| dom.line_of(range.start.node));

    let table = dom.create_element(ElementData::new("table"));
    let body = dom.create_element(ElementData::new("tbody"));
    dom.append_child(table, body);
    let mut first_cell = None;
    for _ in 0..rows {
        let row = dom.create_element(ElementData::new("tr"));
        dom.append_child(body, row);
        for _ in 0..cols {
            let cell = empty_cell(dom, "td");
            dom.append_child(row, cell);
            first_cell.get_or_insert(cell);
        }
    }

    match line {
        Some(line) => dom.insert_after(line, table),
        None => dom.append_child(dom.root(), table),
    };
    let paragraph = empty_cell(dom, "p");
    dom.insert_after(table, paragraph);

    if let Some(cell) = first_cell {
        place_caret(dom, selection, cell);
    }
    true
}

pub fn insert_row(dom: &mut Dom, selection: &mut Selection, below: bool) -> bool {
    let Some(grid) = grid_context(dom, selection) else {
        return false;
    };
    let Some((at, target)) = grid.target.zip(grid.target_cell()) else {
        return false;
    };
    let last_row = at.row.saturating_add(span(dom, target, "rowspan") - 1);
    let (index, reference) = if below {
        (last_row + 1, grid.row_nodes[last_row.min(grid.height() - 1)])
    } else {
        (at.row, grid.row_nodes[at.row])
    };

    let row = dom.create_element(ElementData::new("tr"));
    let mut extended: Vec<NodeId> = Vec::new();
    let mut focus = None;
    for col in 0..grid.width() {
        let crossing = if index > 0 {
            grid.spans((index - 1, col), (index, col))
        } else {
            None
        };
        match crossing {
            Some(cell) => {
                if !extended.contains(&cell) {
                    let rowspan = span(dom, cell, "rowspan");
                    set_span(dom, cell, "rowspan", rowspan + 1);
                    extended.push(cell);
                }
            }
            None => {
                let like = grid.cell_at(index.min(grid.height() - 1), col);
                let tag = cell_tag(dom, like);
                let cell = empty_cell(dom, &tag);
                dom.append_child(row, cell);
                if col == at.col || focus.is_none() {
                    focus = Some(cell);
                }
            }
        }
    }

    if below {
        dom.insert_after(reference, row);
    } else {
        dom.insert_before(reference, row);
    }
    if let Some(cell) = focus {
        place_caret(dom, selection, cell);
    }
    true
}

pub fn insert_column(dom: &mut Dom, selection: &mut Selection, right: bool) -> bool {
    let Some(grid) = grid_context(dom, selection) else {
        return false;
    };
    let Some((at, target)) = grid.target.zip(grid.target_cell()) else {
        return false;
    };
    let last_col = at.col.saturating_add(span(dom, target, "colspan") - 1);
    let index = if right { last_col + 1 } else { at.col };

    let mut extended: Vec<NodeId> = Vec::new();
    let mut focus = None;
    for (r, &row) in grid.row_nodes.iter().enumerate() {
        let crossing = if index > 0 {
            grid.spans((r, index - 1), (r, index))
        } else {
            None
        };
        if let Some(cell) = crossing {
            if !extended.contains(&cell) {
                let colspan = span(dom, cell, "colspan");
                set_span(dom, cell, "colspan", colspan + 1);
                extended.push(cell);
            }
            continue;
        }

        // first cell of this row that starts at or after the new column
        let before = dom.children(row).iter().copied().find(|&cell| {
            is_cell(dom, cell)
                && grid
                    .rows
                    .get(r)
                    .and_then(|line| line.iter().position(|&slot| slot == Some(cell)))
                    .is_some_and(|col| col >= index)
        });
        let like = grid.cell_at(r, index.saturating_sub(1).min(last_col));
        let tag = cell_tag(dom, like);
        let cell = empty_cell(dom, &tag);
        match before {
            Some(before) => dom.insert_before(before, cell),
            None => dom.append_child(row, cell),
        };
        if r == at.row {
            focus = Some(cell);
        }
    }

    if let Some(cell) = focus {
        place_caret(dom, selection, cell);
    }
    true
}

pub fn delete_row(dom: &mut Dom, selection: &mut Selection) -> bool {
    let Some(grid) = grid_context(dom, selection) else {
        return false;
    };
    let Some(at) = grid.target else {
        return false;
    };
    if grid.height() <= 1 {
        return replace_table(dom, selection, grid.table);
    }

    let mut seen: Vec<NodeId> = Vec::new();
    for cell in grid.rows[at.row].iter().flatten().copied() {
        if seen.contains(&cell) {
            continue;
        }
        seen.push(cell);
        let rowspan = span(dom, cell, "rowspan");
        if rowspan <= 1 {
            continue;
        }
        let Some(origin) = grid.origin_of(cell) else {
            continue;
        };
        set_span(dom, cell, "rowspan", rowspan - 1);
        if origin.row == at.row {
            let Some(&next) = grid.row_nodes.get(at.row + 1) else {
                continue;
            };
            let before = dom.children(next).iter().copied().find(|&other| {
                is_cell(dom, other)
                    && grid
                        .origin_of(other)
                        .is_some_and(|o| o.row == at.row + 1 && o.col > origin.col)
            });
            match before {
                Some(before) => dom.insert_before(before, cell),
                None => dom.append_child(next, cell),
            };
        }
    }
    dom.remove(grid.row_nodes[at.row]);

    let rebuilt = TableGrid::build(dom, grid.table, None);
    let row = at.row.min(rebuilt.height().saturating_sub(1));
    let col = at.col.min(rebuilt.rows[row].len().saturating_sub(1));
    if let Some(cell) = rebuilt.cell_at(row, col) {
        place_caret(dom, selection, cell);
    }
    true
}

pub fn delete_column(dom: &mut Dom, selection: &mut Selection) -> bool {
    let Some(grid) = grid_context(dom, selection) else {
        return false;
    };
    let Some(at) = grid.target else {
        return false;
    };
    if grid.width() <= 1 {
        return replace_table(dom, selection, grid.table);
    }

    let mut seen: Vec<NodeId> = Vec::new();
    for line in &grid.rows {
        let Some(cell) = line.get(at.col).copied().flatten() else {
            continue;
        };
        if seen.contains(&cell) {
            continue;
        }
        seen.push(cell);
        let colspan = span(dom, cell, "colspan");
        if colspan > 1 {
            set_span(dom, cell, "colspan", colspan - 1);
        } else {
            dom.remove(cell);
        }
    }

    let rebuilt = TableGrid::build(dom, grid.table, None);
    let row = at.row.min(rebuilt.height().saturating_sub(1));
    let col = at
        .col
        .min(rebuilt.rows.get(row).map_or(0, Vec::len).saturating_sub(1));
    if let Some(cell) = rebuilt.cell_at(row, col) {
        place_caret(dom, selection, cell);
    }
    true
}

pub fn delete_table(dom: &mut Dom, selection: &mut Selection) -> bool {
    match cell_context(dom, selection) {
        Some((table, _)) => replace_table(dom, selection, table),
        None => {
            tracing::debug!("delete table outside a table");
            false
        }
    }
}

/// Swaps the table for an empty paragraph holding the caret.
fn replace_table(dom: &mut Dom, selection: &mut Selection, table: NodeId) -> bool {
    let paragraph = empty_cell(dom, "p");
    if !dom.insert_before(table, paragraph) {
        dom.remove(paragraph);
        return false;
    }
    dom.remove(table);
    selection.collapse(dom, Boundary::new(paragraph, 0));
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select_text(dom: &Dom, needle: &str) -> Selection {
        let node = dom.find_text(needle).unwrap();
        let mut selection = Selection::default();
        selection.collapse(dom, Boundary::new(node, 0));
        selection
    }

    #[test]
    fn rowspan_occupies_both_rows() {
        let dom = Dom::from_html(
            "<table><tr><td rowspan=\"2\">a</td><td>b</td></tr><tr><td>c</td></tr></table>",
        );
        let table = dom.find_element("table").unwrap();
        let a = dom.closest(dom.find_text("a").unwrap(), |id| is_cell(&dom, id)).unwrap();
        let c = dom.closest(dom.find_text("c").unwrap(), |id| is_cell(&dom, id)).unwrap();

        let grid = TableGrid::build(&dom, table, Some(c));
        assert_eq!(grid.cell_at(0, 0), Some(a));
        assert_eq!(grid.cell_at(1, 0), Some(a));
        assert_eq!(grid.target, Some(GridIndex { row: 1, col: 1 }));
    }

    #[test]
    fn colspan_and_ragged_rows() {
        let dom = Dom::from_html(
            "<table><tbody><tr><td colspan=\"2\">a</td></tr><tr><td>b</td><td>c</td><td>d</td></tr></tbody></table>",
        );
        let table = dom.find_element("table").unwrap();
        let grid = TableGrid::build(&dom, table, None);
        assert_eq!(grid.width(), 3);
        assert_eq!(grid.rows[0].len(), 2);
        assert_eq!(grid.cell_at(0, 0), grid.cell_at(0, 1));
        assert_eq!(grid.cell_at(0, 2), None);
        assert_eq!(grid.target, None);
    }

    #[test]
    fn missing_target_has_no_index() {
        let dom = Dom::from_html("<table><tr><td>a</td></tr></table><p>x</p>");
        let table = dom.find_element("table").unwrap();
        let p = dom.find_element("p").unwrap();
        assert_eq!(TableGrid::build(&dom, table, Some(p)).target, None);
    }

    #[test]
    fn row_inserted_below_a_spanning_cell_extends_it() {
        let mut dom = Dom::from_html(
            "<table><tr><td rowspan=\"2\">a</td><td>b</td></tr><tr><td>c</td></tr></table>",
        );
        let mut selection = select_text(&dom, "b");
        assert!(insert_row(&mut dom, &mut selection, true));
        assert_eq!(
            dom.inner_html(),
            "<table><tr><td rowspan=\"3\">a</td><td>b</td></tr><tr><td><br></td></tr><tr><td>c</td></tr></table>"
        );
    }

    #[test]
    fn column_deletion_shrinks_spans() {
        let mut dom = Dom::from_html(
            "<table><tr><td colspan=\"2\">a</td></tr><tr><td>b</td><td>c</td></tr></table>",
        );
        let mut selection = select_text(&dom, "c");
        assert!(delete_column(&mut dom, &mut selection));
        assert_eq!(
            dom.inner_html(),
            "<table><tr><td>a</td></tr><tr><td>b</td></tr></table>"
        );
    }

    #[test]
    fn deleting_the_origin_row_moves_the_spanning_cell_down() {
        let mut dom = Dom::from_html(
            "<table><tr><td rowspan=\"2\">a</td><td>b</td></tr><tr><td>c</td></tr></table>",
        );
        let mut selection = select_text(&dom, "b");
        assert!(delete_row(&mut dom, &mut selection));
        assert_eq!(
            dom.inner_html(),
            "<table><tr><td>a</td><td>c</td></tr></table>"
        );
    }

    #[test]
    fn oversized_spans_are_clamped() {
        let dom = Dom::from_html(
            "<table><tr><td>a</td><td colspan=\"18446744073709551615\">b</td></tr>\
             <tr><td colspan=\"99999999999999999999999\" rowspan=\"100000000\">c</td></tr></table>",
        );
        let table = dom.find_element("table").unwrap();
        let grid = TableGrid::build(&dom, table, None);

        assert_eq!(grid.width(), MAX_COLSPAN + 1);
        assert_eq!(grid.height(), 2);
        assert_eq!(grid.rows[1].len(), MAX_COLSPAN);
    }

    #[test]
    fn growing_a_clamped_span_stays_clamped() {
        let mut dom = Dom::from_html(
            "<table><tr><td colspan=\"5000\">a</td></tr><tr><td>b</td></tr></table>",
        );
        let mut selection = select_text(&dom, "b");
        assert!(insert_column(&mut dom, &mut selection, true));
        let a = dom.closest(dom.find_text("a").unwrap(), |id| is_cell(&dom, id)).unwrap();
        assert_eq!(span(&dom, a, "colspan"), MAX_COLSPAN);
    }

    #[test]
    fn operations_outside_a_table_are_noops() {
        let mut dom = Dom::from_html("<p>text</p>");
        let mut selection = select_text(&dom, "text");
        assert!(!insert_row(&mut dom, &mut selection, false));
        assert!(!delete_column(&mut dom, &mut selection));
        assert!(!delete_table(&mut dom, &mut selection));
        assert_eq!(dom.inner_html(), "<p>text</p>");
    }
}
