use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use crate::RowId;

/// How a persist request on the editor ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaveOutcome {
    /// The server rejected or failed the write.
    Failed,
    /// Field validation rejected the pending changes; nothing was sent.
    Invalid,
    /// Pending changes were written.
    Succeeded,
    /// There was nothing to write.
    Unchanged,
}

impl SaveOutcome {
    /// Maps the editor's wire tag; `None` (no tag) means nothing was pending.
    pub fn from_tag(tag: Option<&str>) -> Option<SaveOutcome> {
        match tag {
            None => Some(SaveOutcome::Unchanged),
            Some("failed") => Some(SaveOutcome::Failed),
            Some("invalid") => Some(SaveOutcome::Invalid),
            Some("succeeded") => Some(SaveOutcome::Succeeded),
            Some(_) => None,
        }
    }

    pub fn is_rejected(self) -> bool {
        matches!(self, SaveOutcome::Failed | SaveOutcome::Invalid)
    }
}

/// Record navigation requested from the editor surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Navigation {
    First,
    Back,
    Next,
    Last,
    New,
}

impl fmt::Display for Navigation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Navigation::First => "first",
            Navigation::Back => "back",
            Navigation::Next => "next",
            Navigation::Last => "last",
            Navigation::New => "new",
        };
        f.write_str(tag)
    }
}

impl FromStr for Navigation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" => Ok(Navigation::First),
            "back" => Ok(Navigation::Back),
            "next" => Ok(Navigation::Next),
            "last" => Ok(Navigation::Last),
            "new" => Ok(Navigation::New),
            other => Err(format!("unknown navigation target {other}")),
        }
    }
}

/// The record-editing surface the controller drives. At most one editing
/// session is open at a time; the `*_record` calls retarget it.
#[async_trait]
pub trait RecordEditor: Send + Sync {
    fn is_open(&self) -> bool;

    /// Persists any in-progress edits and reports how that went.
    async fn save_record(&self) -> SaveOutcome;

    async fn edit_record(&self, row_id: RowId);

    async fn clone_record(&self, row_id: RowId);

    async fn new_record(&self);

    fn close(&self);
}
