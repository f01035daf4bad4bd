use serde::Serialize;
use std::fmt;

/// Lifecycle of an item
///
/// `Fresh → PreProcessed → Archived → PostProcessed`, then one of
/// `Completed`, `Failed`, `GotChildren` or `GotRedirected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Fresh,
    PreProcessed,
    Archived,
    PostProcessed,
    GotChildren,
    GotRedirected,
    Failed,
    Completed,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Fresh => "fresh",
            ItemStatus::PreProcessed => "preprocessed",
            ItemStatus::Archived => "archived",
            ItemStatus::PostProcessed => "postprocessed",
            ItemStatus::GotChildren => "got_children",
            ItemStatus::GotRedirected => "got_redirected",
            ItemStatus::Failed => "failed",
            ItemStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where an item entered the crawler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemSource {
    Insert,
    Queue,
    Hq,
    Postprocess,
    Feedback,
}
