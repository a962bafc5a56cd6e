use manos_edit_core::{Boundary, CommandError, Editor, Format, KeyInput, Range};
use serde_json::json;

fn editor_with_selection(html: &str, needle: &str, start: usize, end: usize) -> Editor {
    let mut editor = Editor::from_html(html);
    assert!(editor.select_text(needle, start, end));
    editor
}

#[test]
fn bold_wraps_partial_text() {
    let mut editor = editor_with_selection("<p>Hello World</p>", "Hello", 2, 7);
    editor.run_command("marks.bold", None).unwrap();

    assert_eq!(editor.html(), "<p>He<strong>llo W</strong>orld</p>");
    let caret = editor.caret().unwrap();
    assert_eq!(editor.dom().text(caret.start.node), Some("llo W"));
    assert_eq!((caret.start.offset, caret.end.offset), (0, 5));
}

#[test]
fn bold_unwraps_middle_of_bold_run() {
    let mut editor = editor_with_selection("<p><strong>Hello World</strong></p>", "Hello", 2, 7);
    editor.run_command("marks.bold", None).unwrap();

    assert_eq!(
        editor.html(),
        "<p><strong>He</strong>llo W<strong>orld</strong></p>"
    );
}

#[test]
fn applying_a_present_format_is_a_no_op() {
    let mut editor = editor_with_selection("<p>He<strong>llo W</strong>orld</p>", "llo W", 0, 5);
    assert!(editor.is_active(&Format::bold(), None));
    assert_eq!(editor.apply_format(&Format::bold(), true, None), Ok(false));
    assert_eq!(editor.html(), "<p>He<strong>llo W</strong>orld</p>");

    let mut editor = editor_with_selection("<p>Hello</p>", "Hello", 0, 5);
    assert_eq!(editor.apply_format(&Format::bold(), false, None), Ok(false));
    assert_eq!(editor.html(), "<p>Hello</p>");
}

#[test]
fn unwrap_across_lines_leaves_no_empty_wrappers() {
    let mut editor = Editor::from_html(
        "<p><strong>one</strong></p><p><strong>two</strong></p><p><strong>three</strong></p>",
    );
    let one = editor.dom().find_text("one").unwrap();
    let three = editor.dom().find_text("three").unwrap();
    editor.set_selection(Range::new(Boundary::new(one, 0), Boundary::new(three, 5)));
    editor.run_command("marks.bold", None).unwrap();

    assert_eq!(editor.html(), "<p>one</p><p>two</p><p>three</p>");
}

#[test]
fn wrap_across_lines_splits_edge_texts() {
    let mut editor = Editor::from_html("<p>alpha</p><p>beta</p>");
    let alpha = editor.dom().find_text("alpha").unwrap();
    let beta = editor.dom().find_text("beta").unwrap();
    editor.set_selection(Range::new(Boundary::new(alpha, 2), Boundary::new(beta, 2)));
    editor.run_command("marks.bold", None).unwrap();

    assert_eq!(
        editor.html(),
        "<p>al<strong>pha</strong></p><p><strong>be</strong>ta</p>"
    );
}

#[test]
fn unwrap_keeps_inner_formats_on_both_sides() {
    let mut editor = editor_with_selection("<p><strong>a<em>bc</em>d</strong></p>", "bc", 1, 2);
    editor.run_command("marks.bold", None).unwrap();

    assert_eq!(
        editor.html(),
        "<p><strong>a<em>b</em></strong><em>c</em><strong>d</strong></p>"
    );
}

#[test]
fn text_color_replaces_previous_value() {
    let mut editor = editor_with_selection("<p>red text</p>", "red text", 0, 8);
    editor
        .run_command("marks.text_color", Some(json!({ "color": "red" })))
        .unwrap();
    assert_eq!(editor.html(), "<p><span style=\"color: red\">red text</span></p>");

    editor
        .run_command("marks.text_color", Some(json!({ "color": "blue" })))
        .unwrap();
    assert_eq!(editor.html(), "<p><span style=\"color: blue\">red text</span></p>");

    editor.run_command("marks.unset_text_color", None).unwrap();
    assert_eq!(editor.html(), "<p>red text</p>");
}

#[test]
fn link_requires_url() {
    let mut editor = editor_with_selection("<p>site</p>", "site", 0, 4);
    let err = editor.run_command("link.set", None).unwrap_err();
    assert!(matches!(err, CommandError::InvalidArgs { .. }));
    assert_eq!(editor.html(), "<p>site</p>");
    assert_eq!(editor.history().len(), 1);

    editor
        .run_command("link.set", Some(json!({ "url": "https://example.com" })))
        .unwrap();
    assert_eq!(
        editor.html(),
        "<p><a href=\"https://example.com\">site</a></p>"
    );
}

#[test]
fn collapsed_bold_applies_to_next_typed_text() {
    let mut editor = Editor::from_html("<p>Hello</p>");
    let text = editor.dom().find_text("Hello").unwrap();
    editor.mouse_down(Boundary::new(text, 5));
    editor.run_command("marks.bold", None).unwrap();

    assert_eq!(
        editor.html(),
        "<p>Hello<span data-caret-marker=\"\"><strong>\u{200B}</strong></span></p>"
    );

    editor.key_down(&KeyInput::char('!'));
    assert_eq!(editor.html(), "<p>Hello<strong>!</strong></p>");
}

#[test]
fn collapsed_formats_stack_in_one_marker() {
    let mut editor = Editor::from_html("<p>Hello</p>");
    let text = editor.dom().find_text("Hello").unwrap();
    editor.mouse_down(Boundary::new(text, 5));
    editor.run_command("marks.bold", None).unwrap();
    editor.run_command("marks.italic", None).unwrap();

    editor.key_down(&KeyInput::char('x'));
    assert_eq!(editor.html(), "<p>Hello<strong><em>x</em></strong></p>");
}

#[test]
fn empty_marker_is_dropped_when_caret_moves_away() {
    let mut editor = Editor::from_html("<p>Hello</p>");
    let text = editor.dom().find_text("Hello").unwrap();
    editor.mouse_down(Boundary::new(text, 5));
    editor.run_command("marks.bold", None).unwrap();

    editor.key_down(&KeyInput::new(manos_edit_core::Key::ArrowLeft));
    assert_eq!(editor.html(), "<p>Hello</p>");
}

#[test]
fn collapsed_unbold_inside_bold_text() {
    let mut editor = Editor::from_html("<p><strong>Hello</strong></p>");
    let text = editor.dom().find_text("Hello").unwrap();
    editor.mouse_down(Boundary::new(text, 5));
    editor.run_command("marks.bold", None).unwrap();

    editor.key_down(&KeyInput::char('x'));
    assert_eq!(editor.html(), "<p><strong>Hello</strong>x</p>");
}

#[test]
fn bold_then_unbold_at_caret_leaves_no_marker() {
    let mut editor = Editor::from_html("<p>Hello</p>");
    let text = editor.dom().find_text("Hello").unwrap();
    editor.mouse_down(Boundary::new(text, 5));
    editor.run_command("marks.bold", None).unwrap();
    editor.run_command("marks.bold", None).unwrap();

    assert_eq!(editor.html(), "<p>Hello</p>");
    assert_eq!(editor.history().len(), 1);

    editor.key_down(&KeyInput::char('x'));
    assert_eq!(editor.html(), "<p>Hellox</p>");
}

#[test]
fn leaving_a_marker_in_an_empty_line_restores_its_break() {
    let mut editor = Editor::from_html("<p>a</p><p><br></p>");
    let root = editor.dom().root();
    let empty = editor.dom().children(root)[1];
    editor.mouse_down(Boundary::new(empty, 0));
    editor.run_command("marks.bold", None).unwrap();
    assert!(!editor.html().contains("<br>"));

    editor.key_down(&KeyInput::new(manos_edit_core::Key::ArrowUp));
    assert_eq!(editor.html(), "<p>a</p><p><br></p>");
}

#[test]
fn unbolding_a_pending_marker_in_an_empty_line_restores_its_break() {
    let mut editor = Editor::from_html("<p><br></p>");
    let root = editor.dom().root();
    let line = editor.dom().children(root)[0];
    editor.mouse_down(Boundary::new(line, 0));
    editor.run_command("marks.bold", None).unwrap();
    editor.run_command("marks.bold", None).unwrap();

    assert_eq!(editor.html(), "<p><br></p>");
    assert_eq!(editor.history().len(), 1);
}
