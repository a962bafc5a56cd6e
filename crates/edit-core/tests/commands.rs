use std::cell::RefCell;
use std::rc::Rc;

use manos_edit_core::{Boundary, CommandError, CommandKind, Editor, EditorCommand, Key, KeyInput};

fn editor_with_caret(html: &str, needle: &str, offset: usize) -> Editor {
    let mut editor = Editor::from_html(html);
    let text = editor.dom().find_text(needle).unwrap();
    editor.mouse_down(Boundary::new(text, offset));
    editor
}

#[test]
fn unknown_command_is_an_error() {
    let mut editor = Editor::from_html("<p>Hello</p>");
    let err = editor.run_command("marks.sparkle", None).unwrap_err();
    assert_eq!(err, CommandError::Unknown("marks.sparkle".to_string()));
    assert_eq!(editor.history().len(), 1);
}

#[test]
fn custom_commands_run_and_record() {
    let mut editor = Editor::from_html("<p>Hello</p>");
    editor
        .register_command(EditorCommand::new("text.shout", "Shout", CommandKind::Custom, |editor, _args| {
            editor.edit_tree(|dom, _selection| match dom.find_text("Hello") {
                Some(text) => dom.set_text(text, "HELLO"),
                None => false,
            });
            Ok(())
        }))
        .unwrap();
    let err = editor
        .register_command(EditorCommand::new("text.shout", "Shout", CommandKind::Custom, |_, _| Ok(())))
        .unwrap_err();
    assert_eq!(err, CommandError::Duplicate("text.shout".to_string()));

    editor.run_command("text.shout", None).unwrap();
    assert_eq!(editor.html(), "<p>HELLO</p>");
    assert_eq!(editor.history().len(), 2);
    assert!(editor.undo());
    assert_eq!(editor.html(), "<p>Hello</p>");
}

#[test]
fn detectors_see_the_caret_path() {
    let mut editor = Editor::from_html("<p>Hello World</p>");
    let seen = Rc::new(RefCell::new(Vec::new()));
    let log = Rc::clone(&seen);
    editor.register_detector(move |dom, path| {
        log.borrow_mut()
            .push(path.iter().any(|&node| dom.is_tag(node, "strong")));
    });

    editor.select_text("Hello", 2, 7);
    assert_eq!(seen.borrow().last(), Some(&false));

    editor.run_command("marks.bold", None).unwrap();
    assert_eq!(seen.borrow().last(), Some(&true));
}

#[test]
fn enter_splits_the_line() {
    let mut editor = editor_with_caret("<p>Hello World</p>", "Hello", 5);
    assert!(editor.key_down(&KeyInput::new(Key::Enter)));
    assert_eq!(editor.html(), "<p>Hello</p><p> World</p>");
    assert_eq!(editor.history().len(), 2);

    let caret = editor.caret().unwrap();
    assert_eq!(caret.start.line, 1);
    assert_eq!(caret.start.offset, 0);
}

#[test]
fn enter_at_end_of_heading_opens_paragraph() {
    let mut editor = editor_with_caret("<h2>Title</h2>", "Title", 5);
    editor.key_down(&KeyInput::new(Key::Enter));
    assert_eq!(editor.html(), "<h2>Title</h2><p><br></p>");
}

#[test]
fn backspace_deletes_and_joins_lines() {
    let mut editor = editor_with_caret("<p>abc</p>", "abc", 3);
    editor.key_down(&KeyInput::new(Key::Backspace));
    assert_eq!(editor.html(), "<p>ab</p>");

    let mut editor = editor_with_caret("<p>Hello</p><p> World</p>", " World", 0);
    editor.key_down(&KeyInput::new(Key::Backspace));
    assert_eq!(editor.html(), "<p>Hello World</p>");
}

#[test]
fn arrow_down_keeps_column_within_line_length() {
    let mut editor = editor_with_caret("<p>abc</p><p>de</p>", "abc", 3);
    editor.key_down(&KeyInput::new(Key::ArrowDown));
    editor.key_down(&KeyInput::char('!'));
    assert_eq!(editor.html(), "<p>abc</p><p>de!</p>");
}

#[test]
fn typing_replaces_selected_text() {
    let mut editor = Editor::from_html("<p>Hello World</p>");
    editor.select_text("World", 6, 11);
    editor.key_down(&KeyInput::char('!'));
    assert_eq!(editor.html(), "<p>Hello !</p>");
}

#[test]
fn ctrl_shortcuts_run_their_commands() {
    let mut editor = Editor::from_html("<p>Hello World</p>");
    editor.select_text("Hello", 0, 5);

    assert!(editor.key_down(&KeyInput::char('b').ctrl()));
    assert_eq!(editor.html(), "<p><strong>Hello</strong> World</p>");
    assert_eq!(editor.history().len(), 2);

    assert!(!editor.key_down(&KeyInput::char('q').ctrl()));
    assert_eq!(editor.history().len(), 2);
}

#[test]
fn custom_commands_read_typed_args() {
    let mut editor = Editor::from_html("<p>Hello</p>");
    editor
        .register_command(EditorCommand::new("text.replace", "Replace", CommandKind::Custom, |editor, args| {
            let with = args.string("with")?;
            editor.edit_tree(|dom, _selection| match dom.find_text("Hello") {
                Some(text) => dom.set_text(text, with),
                None => false,
            });
            Ok(())
        }))
        .unwrap();

    let err = editor.run_command("text.replace", None).unwrap_err();
    assert_eq!(
        err,
        CommandError::invalid_args("text.replace", "expected a string `with`")
    );
    assert_eq!(editor.history().len(), 1);

    editor
        .run_command("text.replace", Some(serde_json::json!({ "with": "Howdy" })))
        .unwrap();
    assert_eq!(editor.html(), "<p>Howdy</p>");
}
