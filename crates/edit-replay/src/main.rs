//! Replays a scripted editing session against `manos-edit-core` and prints the
//! resulting document and history as JSON.
//!
//! ```bash
//! manos-edit-replay session.json
//! RUST_LOG=manos_edit_core=trace manos-edit-replay < session.json
//! ```

use std::io::Read as _;
use std::path::PathBuf;

use anyhow::{Context as _, Result, bail};
use manos_edit_core::{Editor, EditorConfig, HistoryPath, Key, KeyInput};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Deserialize)]
struct Script {
    #[serde(default)]
    config: EditorConfig,
    html: String,
    #[serde(default)]
    steps: Vec<Step>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Step {
    Select {
        path: HistoryPath,
    },
    SelectText {
        needle: String,
        #[serde(default)]
        start: usize,
        #[serde(default)]
        end: usize,
    },
    Command {
        id: String,
        #[serde(default)]
        args: Option<Value>,
    },
    Type {
        text: String,
    },
    Key {
        key: Key,
        #[serde(default)]
        ctrl: bool,
        #[serde(default)]
        shift: bool,
    },
    Undo,
    Redo,
    Blur,
}

#[derive(Debug, Serialize)]
struct Report {
    html: String,
    selection: Option<HistoryPath>,
    history: HistorySummary,
}

#[derive(Debug, Serialize)]
struct HistorySummary {
    len: usize,
    current: Option<usize>,
    can_undo: bool,
    can_redo: bool,
}

fn parse_args(args: &[String]) -> Result<Option<PathBuf>> {
    match args {
        [] => Ok(None),
        [flag] if flag == "-h" || flag == "--help" => {
            print_help();
            std::process::exit(0);
        }
        [path] => Ok(Some(PathBuf::from(path))),
        _ => bail!("expected at most one script path, got {}", args.len()),
    }
}

fn print_help() {
    println!("manos-edit-replay [SCRIPT]");
    println!();
    println!("Reads a JSON editing script from SCRIPT (or stdin) and prints the final");
    println!("document, selection and history summary as JSON.");
}

fn read_script(path: Option<&PathBuf>) -> Result<Script> {
    let source = match path {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading script {}", path.display()))?,
        None => {
            let mut source = String::new();
            std::io::stdin()
                .read_to_string(&mut source)
                .context("reading script from stdin")?;
            source
        }
    };
    serde_json::from_str(&source).context("parsing script")
}

fn run_step(editor: &mut Editor, index: usize, step: Step) -> Result<()> {
    tracing::debug!(index, ?step, "replaying step");
    match step {
        Step::Select { path } => editor.select_path(&path),
        Step::SelectText { needle, start, end } => {
            if !editor.select_text(&needle, start, end) {
                bail!("step {index}: no text contains {needle:?}");
            }
        }
        Step::Command { id, args } => editor
            .run_command(&id, args)
            .with_context(|| format!("step {index}: command {id}"))?,
        Step::Type { text } => {
            for c in text.chars() {
                editor.key_down(&KeyInput::char(c));
            }
        }
        Step::Key { key, ctrl, shift } => {
            let handled = editor.key_down(&KeyInput { key, ctrl, shift });
            if !handled {
                tracing::info!(index, ?key, "key had no effect");
            }
        }
        Step::Undo => {
            if !editor.undo() {
                tracing::info!(index, "nothing to undo");
            }
        }
        Step::Redo => {
            if !editor.redo() {
                tracing::info!(index, "nothing to redo");
            }
        }
        Step::Blur => editor.blur(),
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "manos_edit_core=warn,manos_edit_replay=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let path = parse_args(&args)?;
    let script = read_script(path.as_ref())?;

    let mut editor = Editor::new(&script.html, script.config);
    let steps = script.steps.len();
    for (index, step) in script.steps.into_iter().enumerate() {
        run_step(&mut editor, index, step)?;
    }
    editor.blur();
    tracing::info!(steps, "replay finished");

    let history = editor.history();
    let report = Report {
        html: editor.html(),
        selection: HistoryPath::capture(editor.dom(), editor.selection()),
        history: HistorySummary {
            len: history.len(),
            current: history.current_index(),
            can_undo: history.can_undo(),
            can_redo: history.can_redo(),
        },
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_steps_deserialize() {
        let script: Script = serde_json::from_value(serde_json::json!({
            "html": "<p>Hello</p>",
            "steps": [
                { "kind": "select_text", "needle": "Hello", "start": 0, "end": 5 },
                { "kind": "command", "id": "marks.bold" },
                { "kind": "key", "key": { "type": "char", "value": "z" }, "ctrl": true },
                { "kind": "undo" }
            ]
        }))
        .unwrap();

        assert_eq!(script.config, EditorConfig::default());
        assert_eq!(script.steps.len(), 4);
        assert!(matches!(script.steps[2], Step::Key { key: Key::Char('z'), ctrl: true, shift: false }));
    }

    #[test]
    fn replay_applies_commands_in_order() {
        let mut editor = Editor::from_html("<p>Hello</p>");
        let steps = vec![
            Step::SelectText {
                needle: "Hello".to_string(),
                start: 0,
                end: 5,
            },
            Step::Command {
                id: "marks.bold".to_string(),
                args: None,
            },
            Step::Undo,
            Step::Redo,
        ];
        for (index, step) in steps.into_iter().enumerate() {
            run_step(&mut editor, index, step).unwrap();
        }
        assert_eq!(editor.html(), "<p><strong>Hello</strong></p>");
    }

    #[test]
    fn unknown_command_fails_the_replay() {
        let mut editor = Editor::from_html("<p>Hello</p>");
        let step = Step::Command {
            id: "nope".to_string(),
            args: None,
        };
        assert!(run_step(&mut editor, 0, step).is_err());
    }
}
