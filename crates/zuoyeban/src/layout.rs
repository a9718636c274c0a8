//! Sequential greedy placement of homework entries into columns.
//!
//! Entries arrive grouped by subject. Each subject is placed in turn, entry
//! by entry, into the leftmost column that still has room, scanning forward
//! from the column the subject last used. A subject therefore reads top to
//! bottom, left to right, and only spills into a later column (marked as a
//! continuation) when the current one is full.
//!
//! When nothing fits, the entry is forced into the first empty column at or
//! after the subject's current column, or into the last column if none is
//! empty. Entries are never dropped.

use std::collections::HashMap;
use tracing::debug;

use crate::budget::{ChromeMetrics, ColumnBudget, Viewport};
use crate::estimate::{FontScale, HeightMetrics};
use crate::types::{Column, Entry, LayoutResult, SubjectGroup};

/// An entry paired with its estimated height
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeasuredEntry {
    pub entry: Entry,
    pub height: u32,
}

impl MeasuredEntry {
    pub fn new(entry: Entry, height: u32) -> Self {
        Self { entry, height }
    }
}

/// Place measured entries into `column_count` columns of at most
/// `max_column_height` pixels each.
///
/// `header_height` is charged once per subject group, when the group is
/// opened in a column.
pub fn place(
    entries: Vec<MeasuredEntry>,
    column_count: usize,
    max_column_height: u32,
    header_height: u32,
) -> LayoutResult {
    let column_count = column_count.max(1);
    let mut columns = vec![Column::default(); column_count];
    let mut forced_placements = 0;

    for (subject, items) in group_by_subject(entries) {
        // Column of the subject's first entry, and of its latest one
        let mut start: Option<usize> = None;
        let mut cursor = 0;

        for item in items {
            let cost = |col: &Column| {
                if opens_group(col, &subject) {
                    header_height + item.height
                } else {
                    item.height
                }
            };

            let fitting = (cursor..column_count)
                .find(|&i| columns[i].height + cost(&columns[i]) <= max_column_height);

            let target = match fitting {
                Some(i) => i,
                None => {
                    forced_placements += 1;
                    let target = (cursor..column_count)
                        .find(|&i| columns[i].is_empty())
                        .unwrap_or(column_count - 1);
                    debug!(
                        subject = %subject,
                        entry_id = item.entry.id,
                        height = item.height,
                        column = target,
                        "Forced placement over budget"
                    );
                    target
                }
            };

            let start_column = *start.get_or_insert(target);
            cursor = target;

            let column = &mut columns[target];
            let charged = cost(column);
            column.height += charged;
            if opens_group(column, &subject) {
                column.groups.push(SubjectGroup {
                    subject: subject.clone(),
                    entries: Vec::new(),
                    is_continuation: target > start_column,
                });
            }
            if let Some(group) = column.groups.last_mut() {
                group.entries.push(item.entry);
            }
        }
    }

    LayoutResult {
        columns,
        max_column_height,
        forced_placements,
    }
}

/// Whether adding an entry of `subject` to `column` starts a new group.
///
/// Subjects are placed one at a time, so the current subject can only
/// already exist in a column as that column's last group.
fn opens_group(column: &Column, subject: &str) -> bool {
    column
        .groups
        .last()
        .map_or(true, |group| group.subject != subject)
}

/// Group entries by subject, keeping subjects in order of first appearance
/// and entries in input order.
fn group_by_subject(entries: Vec<MeasuredEntry>) -> Vec<(String, Vec<MeasuredEntry>)> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<(String, Vec<MeasuredEntry>)> = Vec::new();

    for item in entries {
        match index.get(&item.entry.subject) {
            Some(&i) => groups[i].1.push(item),
            None => {
                index.insert(item.entry.subject.clone(), groups.len());
                groups.push((item.entry.subject.clone(), vec![item]));
            }
        }
    }

    groups
}

/// Height metrics and page chrome used to lay out a snapshot
#[derive(Debug, Clone, Default)]
pub struct LayoutEngine {
    pub metrics: HeightMetrics,
    pub chrome: ChromeMetrics,
}

impl LayoutEngine {
    pub fn new(metrics: HeightMetrics, chrome: ChromeMetrics) -> Self {
        Self { metrics, chrome }
    }

    pub fn budget(&self, viewport: Viewport, font_size: u32) -> ColumnBudget {
        ColumnBudget::for_viewport(viewport, &self.chrome, FontScale::from_font_size(font_size))
    }

    /// Estimate every entry and place them for the given viewport
    pub fn arrange(&self, entries: Vec<Entry>, viewport: Viewport, font_size: u32) -> LayoutResult {
        let scale = FontScale::from_font_size(font_size);
        let budget = self.budget(viewport, font_size);

        let measured = entries
            .into_iter()
            .map(|entry| {
                let height = self.metrics.estimate_height(&entry, scale);
                MeasuredEntry::new(entry, height)
            })
            .collect();

        place(
            measured,
            budget.column_count,
            budget.max_column_height,
            self.metrics.subject_header_height(scale),
        )
    }
}
