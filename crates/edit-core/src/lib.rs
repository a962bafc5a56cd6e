mod caret;
mod command;
mod config;
mod detector;
mod dom;
mod editor;
mod error;
mod format;
mod history;
mod html;
mod input;
mod table;
mod toggle;

pub use crate::caret::*;
pub use crate::command::*;
pub use crate::config::*;
pub use crate::detector::*;
pub use crate::dom::*;
pub use crate::editor::*;
pub use crate::error::*;
pub use crate::format::*;
pub use crate::history::*;
pub use crate::html::*;
pub use crate::input::*;
pub use crate::table::*;
pub use crate::toggle::*;
