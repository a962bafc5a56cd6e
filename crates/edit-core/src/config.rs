use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Upper bound on stored history records; the oldest are dropped first.
    pub max_undo: usize,
    /// Fold a run of keystrokes into one history record.
    pub coalesce_typing: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            max_undo: 200,
            coalesce_typing: true,
        }
    }
}

impl EditorConfig {
    pub fn with_defaults(mut self) -> Self {
        if self.max_undo == 0 {
            self.max_undo = 200;
        }
        self
    }

    pub fn from_json_str(source: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str::<Self>(source).map(Self::with_defaults)
    }
}
