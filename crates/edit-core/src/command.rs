use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::caret::Selection;
use crate::dom::Dom;
use crate::editor::Editor;
use crate::error::CommandError;
use crate::format::Format;
use crate::input::{Key, KeyInput};
use crate::table;

pub type CommandHandler =
    Arc<dyn Fn(&mut Editor, &CommandArgs<'_>) -> Result<(), CommandError> + Send + Sync>;

/// What a command edits; drives grouping in toolbars and palettes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Mark,
    Link,
    Block,
    List,
    Table,
    /// Line editing driven by keys, never listed.
    Line,
    Custom,
}

impl CommandKind {
    pub fn is_listed(self) -> bool {
        self != CommandKind::Line
    }
}

/// Arguments handed to a running command, tagged with its id for error reports.
#[derive(Debug, Clone, Copy)]
pub struct CommandArgs<'a> {
    id: &'a str,
    value: Option<&'a Value>,
}

impl<'a> CommandArgs<'a> {
    pub fn new(id: &'a str, value: Option<&'a Value>) -> Self {
        Self { id, value }
    }

    pub fn id(&self) -> &str {
        self.id
    }

    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.value.and_then(|value| value.get(name))
    }

    /// A non-blank string argument, trimmed.
    pub fn string(&self, name: &str) -> Result<String, CommandError> {
        self.get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .ok_or_else(|| self.invalid(format!("expected a string `{name}`")))
    }

    /// A positive count clamped to `1..=max`, `default` when absent.
    pub fn count(&self, name: &str, default: u64, max: u64) -> usize {
        self.get(name)
            .and_then(Value::as_u64)
            .unwrap_or(default)
            .clamp(1, max) as usize
    }

    /// A CSS length: bare numbers are pixels, strings pass through.
    pub fn length(&self, name: &str) -> Result<String, CommandError> {
        match self.get(name) {
            Some(Value::Number(n)) => n
                .as_u64()
                .map(|n| format!("{n}px"))
                .ok_or_else(|| self.invalid(format!("`{name}` must be a positive integer"))),
            _ => self.string(name),
        }
    }

    pub fn invalid(&self, reason: impl Into<String>) -> CommandError {
        CommandError::invalid_args(self.id, reason)
    }
}

#[derive(Clone)]
pub struct EditorCommand {
    pub id: String,
    pub label: String,
    pub kind: CommandKind,
    pub shortcut: Option<KeyInput>,
    pub args_example: Option<Value>,
    pub handler: CommandHandler,
}

impl EditorCommand {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        kind: CommandKind,
        handler: impl Fn(&mut Editor, &CommandArgs<'_>) -> Result<(), CommandError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind,
            shortcut: None,
            args_example: None,
            handler: Arc::new(handler),
        }
    }

    /// Binds a Ctrl chord; letters match in either case.
    pub fn shortcut(mut self, key: char) -> Self {
        self.shortcut = Some(KeyInput::char(key.to_ascii_lowercase()).ctrl());
        self
    }

    pub fn args_example(mut self, args_example: Value) -> Self {
        self.args_example = Some(args_example);
        self
    }

    pub fn matches_shortcut(&self, input: &KeyInput) -> bool {
        let Some(shortcut) = self.shortcut else {
            return false;
        };
        let key = match input.key {
            Key::Char(c) => Key::Char(c.to_ascii_lowercase()),
            key => key,
        };
        shortcut == KeyInput { key, ..*input }
    }
}

impl std::fmt::Debug for EditorCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorCommand")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("shortcut", &self.shortcut)
            .finish_non_exhaustive()
    }
}

/// Named command registry. Ids are unique; registration order is kept for listings.
#[derive(Clone, Default)]
pub struct Commander {
    commands: HashMap<String, EditorCommand>,
    order: Vec<String>,
}

impl Commander {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults() -> Self {
        let mut commander = Self::new();
        for command in default_commands() {
            commander.insert(command);
        }
        commander
    }

    pub fn register(&mut self, command: EditorCommand) -> Result<(), CommandError> {
        if self.commands.contains_key(&command.id) {
            return Err(CommandError::Duplicate(command.id));
        }
        self.insert(command);
        Ok(())
    }

    fn insert(&mut self, command: EditorCommand) {
        if !self.commands.contains_key(&command.id) {
            self.order.push(command.id.clone());
        }
        self.commands.insert(command.id.clone(), command);
    }

    pub fn command(&self, id: &str) -> Option<EditorCommand> {
        self.commands.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.commands.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Id of the first registered command bound to `input`.
    pub fn for_shortcut(&self, input: &KeyInput) -> Option<&str> {
        self.order
            .iter()
            .filter_map(|id| self.commands.get(id))
            .find(|command| command.matches_shortcut(input))
            .map(|command| command.id.as_str())
    }

    /// Listed commands of one kind, in registration order.
    pub fn of_kind(&self, kind: CommandKind) -> Vec<&EditorCommand> {
        self.listed().into_iter().filter(|command| command.kind == kind).collect()
    }

    /// Commands meant for toolbars and palettes.
    pub fn listed(&self) -> Vec<&EditorCommand> {
        self.order
            .iter()
            .filter_map(|id| self.commands.get(id))
            .filter(|command| command.kind.is_listed())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

fn toggle_command(id: &str, label: &str, kind: CommandKind, format: fn() -> Format) -> EditorCommand {
    EditorCommand::new(id, label, kind, move |editor, _args| {
        editor.toggle(&format(), None)?;
        Ok(())
    })
}

fn valued_command(
    id: &str,
    label: &str,
    kind: CommandKind,
    arg: &'static str,
    format: fn() -> Format,
) -> EditorCommand {
    EditorCommand::new(id, label, kind, move |editor, args| {
        let value = args.string(arg)?;
        editor.apply_format(&format(), true, Some(&value))?;
        Ok(())
    })
    .args_example(serde_json::json!({ arg: "value" }))
}

fn unset_command(id: &str, label: &str, kind: CommandKind, format: fn() -> Format) -> EditorCommand {
    EditorCommand::new(id, label, kind, move |editor, _args| {
        editor.apply_format(&format(), false, None)?;
        Ok(())
    })
}

fn table_command(id: &str, label: &str, op: fn(&mut Dom, &mut Selection) -> bool) -> EditorCommand {
    EditorCommand::new(id, label, CommandKind::Table, move |editor, _args| {
        editor.edit_tree(op);
        Ok(())
    })
}

pub fn default_commands() -> Vec<EditorCommand> {
    use CommandKind::{Block, Line, Link, List, Mark};

    vec![
        toggle_command("marks.bold", "Bold", Mark, Format::bold).shortcut('b'),
        toggle_command("marks.italic", "Italic", Mark, Format::italic).shortcut('i'),
        toggle_command("marks.underline", "Underline", Mark, Format::underline).shortcut('u'),
        toggle_command("marks.strikethrough", "Strikethrough", Mark, Format::strikethrough),
        toggle_command("marks.code", "Inline code", Mark, Format::code),
        toggle_command("marks.subscript", "Subscript", Mark, Format::subscript),
        toggle_command("marks.superscript", "Superscript", Mark, Format::superscript),
        valued_command("marks.text_color", "Text color", Mark, "color", Format::text_color),
        unset_command("marks.unset_text_color", "Clear text color", Mark, Format::text_color),
        valued_command(
            "marks.background_color",
            "Background color",
            Mark,
            "color",
            Format::background_color,
        ),
        unset_command(
            "marks.unset_background_color",
            "Clear background color",
            Mark,
            Format::background_color,
        ),
        EditorCommand::new("marks.font_size", "Font size", Mark, |editor, args| {
            let size = args.length("size")?;
            editor.apply_format(&Format::font_size(), true, Some(&size))?;
            Ok(())
        })
        .args_example(serde_json::json!({ "size": 18 })),
        valued_command("link.set", "Set link", Link, "url", Format::link),
        unset_command("link.unset", "Remove link", Link, Format::link),
        EditorCommand::new("block.heading", "Heading", Block, |editor, args| {
            let level = args.count("level", 1, 6) as u8;
            editor.toggle(&Format::heading(level), None)?;
            Ok(())
        })
        .args_example(serde_json::json!({ "level": 2 })),
        EditorCommand::new("block.paragraph", "Paragraph", Block, |editor, _args| {
            editor.apply_format(&Format::paragraph(), true, None)?;
            Ok(())
        }),
        toggle_command("block.blockquote", "Blockquote", Block, Format::blockquote),
        toggle_command("block.code", "Code block", Block, Format::code_block),
        toggle_command("list.ordered", "Numbered list", List, Format::ordered_list),
        toggle_command("list.unordered", "Bulleted list", List, Format::unordered_list),
        EditorCommand::new("line.split", "Split line", Line, |editor, _args| {
            editor.split_line();
            Ok(())
        }),
        EditorCommand::new("table.insert", "Insert table", CommandKind::Table, |editor, args| {
            let rows = args.count("rows", 2, 32);
            let cols = args.count("cols", 2, 32);
            editor.edit_tree(|dom, selection| table::insert_table(dom, selection, rows, cols));
            Ok(())
        })
        .args_example(serde_json::json!({ "rows": 2, "cols": 3 })),
        table_command("table.insert_row_above", "Insert row above", |dom, selection| {
            table::insert_row(dom, selection, false)
        }),
        table_command("table.insert_row_below", "Insert row below", |dom, selection| {
            table::insert_row(dom, selection, true)
        }),
        table_command("table.insert_col_left", "Insert column left", |dom, selection| {
            table::insert_column(dom, selection, false)
        }),
        table_command("table.insert_col_right", "Insert column right", |dom, selection| {
            table::insert_column(dom, selection, true)
        }),
        table_command("table.delete_row", "Delete row", table::delete_row),
        table_command("table.delete_col", "Delete column", table::delete_column),
        table_command("table.delete_table", "Delete table", table::delete_table),
    ]
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut commander = Commander::with_defaults();
        let err = commander
            .register(EditorCommand::new(
                "marks.bold",
                "Bold again",
                CommandKind::Custom,
                |_, _| Ok(()),
            ))
            .unwrap_err();
        assert_eq!(err, CommandError::Duplicate("marks.bold".to_string()));
    }

    #[test]
    fn line_commands_stay_out_of_listings() {
        let commander = Commander::with_defaults();
        assert!(commander.contains("line.split"));
        assert!(commander.listed().iter().all(|command| command.id != "line.split"));
        assert_eq!(commander.ids().next(), Some("marks.bold"));

        let lists: Vec<&str> = commander
            .of_kind(CommandKind::List)
            .iter()
            .map(|command| command.id.as_str())
            .collect();
        assert_eq!(lists, ["list.ordered", "list.unordered"]);
    }

    #[test]
    fn shortcuts_ignore_letter_case() {
        let commander = Commander::with_defaults();
        assert_eq!(commander.for_shortcut(&KeyInput::char('B').ctrl()), Some("marks.bold"));
        assert_eq!(commander.for_shortcut(&KeyInput::char('u').ctrl()), Some("marks.underline"));
        assert_eq!(commander.for_shortcut(&KeyInput::char('k').ctrl()), None);
        assert_eq!(commander.for_shortcut(&KeyInput::char('b')), None);
        assert_eq!(commander.for_shortcut(&KeyInput::char('b').ctrl().shift()), None);
    }

    #[test]
    fn args_report_the_command_id() {
        let value = json!({ "url": "  ", "rows": 99, "size": 18, "level": "two" });
        let args = CommandArgs::new("link.set", Some(&value));

        assert_eq!(
            args.string("url").unwrap_err(),
            CommandError::invalid_args("link.set", "expected a string `url`")
        );
        assert_eq!(args.count("rows", 2, 32), 32);
        assert_eq!(args.count("cols", 2, 32), 2);
        assert_eq!(args.count("level", 1, 6), 1);
        assert_eq!(args.length("size").unwrap(), "18px");

        let none = CommandArgs::new("table.insert", None);
        assert_eq!(none.count("rows", 2, 32), 2);
        assert!(none.length("size").is_err());
    }
}
