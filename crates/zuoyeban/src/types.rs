use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A label from the catalog (`labels.json`)
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Label {
    pub id: u32,
    pub name: String,

    /// CSS color used as the tag background
    #[serde(default)]
    pub color: Option<String>,
}

/// A homework submission as stored in `submissions.json`
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Submission {
    pub id: u32,

    /// Subject name
    pub subject: String,

    /// Homework text
    pub content: String,

    /// Label names
    #[serde(default)]
    pub labels: Vec<String>,

    /// Label ids into the catalog; preferred over `labels` when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_ids: Option<Vec<u32>>,

    /// Due date in YYYY-MM-DD format, empty when unset
    #[serde(default)]
    pub deadline: String,

    /// Publish time in `YYYY-MM-DD HH:MM:SS` format
    pub timestamp: String,
}

/// A submission resolved against the label catalog, ready for layout
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Entry {
    pub id: u32,
    pub subject: String,
    pub content: String,
    pub deadline: Option<NaiveDate>,

    /// Publish time, `YYYY-MM-DD HH:MM:SS`; sorts chronologically as a string
    pub published_at: String,

    pub labels: Vec<Label>,
}

impl Entry {
    /// An entry is expired once the day after its deadline has started.
    /// Entries without a deadline never expire.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.deadline.is_some_and(|deadline| deadline < today)
    }

    /// Number of characters the height estimator counts
    pub fn content_len(&self) -> usize {
        self.content.chars().count()
    }
}

/// A run of one subject's entries inside a single column
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct SubjectGroup {
    pub subject: String,
    pub entries: Vec<Entry>,

    /// True when the subject started in an earlier column
    pub is_continuation: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct Column {
    pub groups: Vec<SubjectGroup>,

    /// Accumulated estimated height in pixels
    pub height: u32,
}

impl Column {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn entry_count(&self) -> usize {
        self.groups.iter().map(|g| g.entries.len()).sum()
    }
}

/// Output of one layout pass
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct LayoutResult {
    pub columns: Vec<Column>,

    /// Height budget the pass was computed against
    pub max_column_height: u32,

    /// Entries placed despite exceeding the budget
    pub forced_placements: usize,
}

impl LayoutResult {
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn entry_count(&self) -> usize {
        self.columns.iter().map(Column::entry_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count() == 0
    }

    /// Indices of columns whose height exceeds the budget
    pub fn overflowing_columns(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.height > self.max_column_height)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Payload of `GET /api/homework`
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct HomeworkFeed {
    pub submissions: BTreeMap<String, Vec<Submission>>,
    pub labels: Vec<Label>,
}
