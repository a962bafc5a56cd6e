use manos_edit_core::{Boundary, Editor, Range};
use serde_json::json;

fn editor_with_caret(html: &str, needle: &str) -> Editor {
    let mut editor = Editor::from_html(html);
    assert!(editor.select_text(needle, 0, 0));
    editor
}

fn select_lines(editor: &mut Editor, first: &str, last: &str) {
    let first = editor.dom().find_text(first).unwrap();
    let last = editor.dom().find_text(last).unwrap();
    let end = editor.dom().node_len(last);
    editor.set_selection(Range::new(Boundary::new(first, 0), Boundary::new(last, end)));
}

#[test]
fn heading_toggles_back_to_paragraph() {
    let mut editor = editor_with_caret("<p>Title</p><p>Body</p>", "Title");
    editor
        .run_command("block.heading", Some(json!({ "level": 1 })))
        .unwrap();
    assert_eq!(editor.html(), "<h1>Title</h1><p>Body</p>");

    editor
        .run_command("block.heading", Some(json!({ "level": 1 })))
        .unwrap();
    assert_eq!(editor.html(), "<p>Title</p><p>Body</p>");
}

#[test]
fn paragraph_on_paragraph_is_not_recorded() {
    let mut editor = editor_with_caret("<p>Hello</p>", "Hello");
    editor.run_command("block.paragraph", None).unwrap();
    assert_eq!(editor.html(), "<p>Hello</p>");
    assert_eq!(editor.history().len(), 1);
}

#[test]
fn unordered_list_wraps_selected_lines() {
    let mut editor = Editor::from_html("<p>one</p><p>two</p><p>three</p>");
    select_lines(&mut editor, "one", "two");
    editor.run_command("list.unordered", None).unwrap();

    assert_eq!(
        editor.html(),
        "<ul><li>one</li><li>two</li></ul><p>three</p>"
    );
}

#[test]
fn list_switches_kind_then_unwraps() {
    let mut editor = Editor::from_html("<p>one</p><p>two</p><p>three</p>");
    select_lines(&mut editor, "one", "two");
    editor.run_command("list.unordered", None).unwrap();

    select_lines(&mut editor, "one", "two");
    editor.run_command("list.ordered", None).unwrap();
    assert_eq!(
        editor.html(),
        "<ol><li>one</li><li>two</li></ol><p>three</p>"
    );

    select_lines(&mut editor, "one", "two");
    editor.run_command("list.ordered", None).unwrap();
    assert_eq!(editor.html(), "<p>one</p><p>two</p><p>three</p>");
}

#[test]
fn unwrapping_a_middle_item_splits_the_list() {
    let mut editor = editor_with_caret("<ul><li>a</li><li>b</li><li>c</li></ul>", "b");
    editor.run_command("list.unordered", None).unwrap();

    assert_eq!(
        editor.html(),
        "<ul><li>a</li></ul><p>b</p><ul><li>c</li></ul>"
    );
}
