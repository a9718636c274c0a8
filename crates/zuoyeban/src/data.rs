use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::SubmissionError;
use crate::types::{Entry, HomeworkFeed, Label, Submission};

pub const SUBMISSIONS_FILE: &str = "submissions.json";
pub const LABELS_FILE: &str = "labels.json";
pub const SUBJECTS_FILE: &str = "subjects.json";
pub const GLOBAL_WORDS_FILE: &str = "global_words.json";

pub const DEADLINE_FORMAT: &str = "%Y-%m-%d";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const MIN_CONTENT_CHARS: usize = 5;

/// Name shown for a label id missing from the catalog
pub const UNKNOWN_LABEL: &str = "Unknown label";

/// Everything read from the data directory in one refresh
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub submissions: Vec<Submission>,
    pub labels: Vec<Label>,

    /// Preferred subject display order
    pub subject_order: Vec<String>,
}

impl Snapshot {
    /// Read all data files. Missing files are treated as empty.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let snapshot = Self {
            submissions: load_json(&data_dir.join(SUBMISSIONS_FILE))?,
            labels: load_json(&data_dir.join(LABELS_FILE))?,
            subject_order: load_json(&data_dir.join(SUBJECTS_FILE))?,
        };

        debug!(
            submissions = snapshot.submissions.len(),
            labels = snapshot.labels.len(),
            subjects = snapshot.subject_order.len(),
            "Snapshot loaded"
        );
        Ok(snapshot)
    }

    /// Subjects in display order: configured ones first, then the rest in
    /// order of first appearance. Configured subjects with no submissions
    /// are left out.
    pub fn subjects(&self) -> Vec<String> {
        let mut present: Vec<&str> = Vec::new();
        for sub in &self.submissions {
            if !present.contains(&sub.subject.as_str()) {
                present.push(&sub.subject);
            }
        }

        let mut ordered: Vec<String> = Vec::new();
        for subject in &self.subject_order {
            if present.contains(&subject.as_str()) && !ordered.contains(subject) {
                ordered.push(subject.clone());
            }
        }
        for subject in present {
            if !ordered.iter().any(|s| s == subject) {
                ordered.push(subject.to_string());
            }
        }
        ordered
    }

    /// Resolved entries grouped by subject in display order, newest first
    /// within each subject.
    pub fn entries(&self, today: NaiveDate, hide_expired: bool) -> Vec<Entry> {
        let mut by_subject: HashMap<&str, Vec<&Submission>> = HashMap::new();
        for sub in &self.submissions {
            by_subject.entry(sub.subject.as_str()).or_default().push(sub);
        }

        let mut entries = Vec::with_capacity(self.submissions.len());
        for subject in self.subjects() {
            let Some(mut list) = by_subject.remove(subject.as_str()) else {
                continue;
            };
            // Stable: equal timestamps keep file order
            list.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

            entries.extend(
                list.into_iter()
                    .map(|sub| self.resolve(sub))
                    .filter(|entry| !(hide_expired && entry.is_expired(today))),
            );
        }
        entries
    }

    fn resolve(&self, sub: &Submission) -> Entry {
        Entry {
            id: sub.id,
            subject: sub.subject.clone(),
            content: sub.content.clone(),
            deadline: parse_deadline(&sub.deadline),
            published_at: sub.timestamp.clone(),
            labels: resolve_labels(sub, &self.labels),
        }
    }

    /// Submissions keyed by subject, with the label catalog
    pub fn feed(&self) -> HomeworkFeed {
        let mut feed = HomeworkFeed {
            labels: self.labels.clone(),
            ..Default::default()
        };
        for sub in &self.submissions {
            feed.submissions
                .entry(sub.subject.clone())
                .or_default()
                .push(sub.clone());
        }
        feed
    }
}

/// Whether a changed path is one of the data files
pub fn is_data_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| [SUBMISSIONS_FILE, LABELS_FILE, SUBJECTS_FILE].contains(&n))
        .unwrap_or(false)
}

/// Labels for a submission: by id when ids are present, otherwise by name
pub fn resolve_labels(sub: &Submission, catalog: &[Label]) -> Vec<Label> {
    match &sub.label_ids {
        Some(ids) => ids
            .iter()
            .map(|id| {
                catalog
                    .iter()
                    .find(|l| l.id == *id)
                    .cloned()
                    .unwrap_or_else(|| Label {
                        id: *id,
                        name: UNKNOWN_LABEL.to_string(),
                        color: None,
                    })
            })
            .collect(),
        None => sub
            .labels
            .iter()
            .enumerate()
            .map(|(i, name)| {
                catalog
                    .iter()
                    .find(|l| &l.name == name)
                    .cloned()
                    .unwrap_or_else(|| Label {
                        id: i as u32,
                        name: name.clone(),
                        color: None,
                    })
            })
            .collect(),
    }
}

fn parse_deadline(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match NaiveDate::parse_from_str(raw, DEADLINE_FORMAT) {
        Ok(date) => Some(date),
        Err(_) => {
            debug!(deadline = raw, "Ignoring unparseable deadline");
            None
        }
    }
}

fn load_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

fn save_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;

    // Write beside the target and rename, so readers see the old file or the
    // new one and never a partial write
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let mut file = NamedTempFile::new_in(dir)
        .with_context(|| format!("Failed to create a temporary file in {}", dir.display()))?;
    file.write_all(json.as_bytes())?;
    file.persist(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    debug!(bytes = json.len(), path = %path.display(), "Saved");
    Ok(())
}

/// A submission as entered in the publish form
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewSubmission {
    pub subject: String,
    pub content: String,
    pub deadline: String,
    #[serde(default)]
    pub labels: Vec<String>,

    /// Catalog ids; when present they take precedence over `labels`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_ids: Option<Vec<u32>>,
}

impl NewSubmission {
    /// Check every field, reporting all problems at once
    pub fn validate(&self, catalog: &[Label]) -> Result<NaiveDate, SubmissionError> {
        let mut problems = Vec::new();

        if self.subject.trim().is_empty() {
            problems.push("subject is required".to_string());
        }
        if self.content.trim().chars().count() < MIN_CONTENT_CHARS {
            problems.push(format!(
                "content must be at least {} characters",
                MIN_CONTENT_CHARS
            ));
        }

        let deadline = if self.deadline.trim().is_empty() {
            problems.push("deadline is required".to_string());
            None
        } else {
            let parsed = NaiveDate::parse_from_str(self.deadline.trim(), DEADLINE_FORMAT).ok();
            if parsed.is_none() {
                problems.push("deadline must be a date in YYYY-MM-DD format".to_string());
            }
            parsed
        };

        match &self.label_ids {
            Some(ids) => {
                for id in ids {
                    if !catalog.iter().any(|l| l.id == *id) {
                        problems.push(format!("unknown label id: {}", id));
                    }
                }
            }
            // An empty catalog accepts free-form labels
            None if !catalog.is_empty() => {
                for name in &self.labels {
                    if !catalog.iter().any(|l| &l.name == name) {
                        problems.push(format!("unknown label: {}", name));
                    }
                }
            }
            None => {}
        }

        match deadline {
            Some(date) if problems.is_empty() => Ok(date),
            _ => Err(SubmissionError::Invalid(problems)),
        }
    }

    /// Validate and build the stored form, keeping `id` and `timestamp`
    fn to_submission(
        &self,
        catalog: &[Label],
        id: u32,
        timestamp: String,
    ) -> Result<Submission, SubmissionError> {
        let deadline = self.validate(catalog)?;

        // Ids are stored with their current names so both lookups agree
        let labels = match &self.label_ids {
            Some(ids) => ids
                .iter()
                .filter_map(|id| catalog.iter().find(|l| l.id == *id))
                .map(|l| l.name.clone())
                .collect(),
            None => self.labels.clone(),
        };

        Ok(Submission {
            id,
            subject: self.subject.trim().to_string(),
            content: self.content.trim().to_string(),
            labels,
            label_ids: self.label_ids.clone(),
            deadline: deadline.format(DEADLINE_FORMAT).to_string(),
            timestamp,
        })
    }
}

/// Changes to an existing submission; absent fields are kept
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubmissionEdit {
    pub subject: Option<String>,
    pub content: Option<String>,
    pub deadline: Option<String>,
    pub labels: Option<Vec<String>>,
    pub label_ids: Option<Vec<u32>>,
}

impl SubmissionEdit {
    fn apply(&self, current: &Submission) -> NewSubmission {
        let labels_changed = self.labels.is_some() || self.label_ids.is_some();

        NewSubmission {
            subject: self.subject.clone().unwrap_or_else(|| current.subject.clone()),
            content: self.content.clone().unwrap_or_else(|| current.content.clone()),
            deadline: self.deadline.clone().unwrap_or_else(|| current.deadline.clone()),
            labels: match &self.labels {
                Some(labels) => labels.clone(),
                None if labels_changed => Vec::new(),
                None => current.labels.clone(),
            },
            label_ids: if labels_changed {
                self.label_ids.clone()
            } else {
                current.label_ids.clone()
            },
        }
    }
}

/// Words offered as shortcuts by the quick publish form
pub const DEFAULT_GLOBAL_WORDS: [&str; 9] = [
    "Exercises",
    "Review",
    "Preview",
    "Homework",
    "Test paper",
    "Recite",
    "Dictation",
    "Essay",
    "Notes",
];

const MAX_GLOBAL_WORDS: usize = 9;

/// The data directory. Every write to its files goes through one lock, so
/// read-modify-write cycles never interleave within the process.
#[derive(Debug)]
pub struct DataFiles {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl DataFiles {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn load(&self) -> Result<Snapshot> {
        Snapshot::load(&self.dir)
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn save_submissions(&self, submissions: &[Submission]) -> Result<()> {
        save_json(submissions, &self.dir.join(SUBMISSIONS_FILE))
    }

    /// Validate and append a submission to `submissions.json`
    pub fn publish(
        &self,
        new: &NewSubmission,
        now: NaiveDateTime,
    ) -> Result<Submission, SubmissionError> {
        let _guard = self.lock();
        let snapshot = self.load()?;

        let mut submissions = snapshot.submissions;
        let id = submissions.iter().map(|s| s.id).max().unwrap_or(0) + 1;
        let submission =
            new.to_submission(&snapshot.labels, id, now.format(TIMESTAMP_FORMAT).to_string())?;
        submissions.push(submission.clone());
        self.save_submissions(&submissions)?;

        info!(id = id, subject = %submission.subject, "Submission published");
        Ok(submission)
    }

    /// Apply an edit to a submission, validating the result
    pub fn update(&self, id: u32, edit: &SubmissionEdit) -> Result<Submission, SubmissionError> {
        let _guard = self.lock();
        let snapshot = self.load()?;

        let mut submissions = snapshot.submissions;
        let current = submissions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(SubmissionError::NotFound(id))?;
        let updated = edit
            .apply(current)
            .to_submission(&snapshot.labels, id, current.timestamp.clone())?;
        *current = updated.clone();
        self.save_submissions(&submissions)?;

        info!(id = id, subject = %updated.subject, "Submission updated");
        Ok(updated)
    }

    /// Remove a submission by id
    pub fn remove(&self, id: u32) -> Result<Submission, SubmissionError> {
        let _guard = self.lock();
        let mut submissions: Vec<Submission> = load_json(&self.dir.join(SUBMISSIONS_FILE))?;

        let index = submissions
            .iter()
            .position(|s| s.id == id)
            .ok_or(SubmissionError::NotFound(id))?;
        let removed = submissions.remove(index);
        self.save_submissions(&submissions)?;

        info!(id = id, subject = %removed.subject, "Submission removed");
        Ok(removed)
    }

    /// Shortcut words from `global_words.json`, or the defaults when the
    /// file is missing or empty
    pub fn global_words(&self) -> Result<Vec<String>> {
        let words: Vec<String> = load_json(&self.dir.join(GLOBAL_WORDS_FILE))?;
        let words: Vec<String> = words
            .into_iter()
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty())
            .take(MAX_GLOBAL_WORDS)
            .collect();

        if words.is_empty() {
            return Ok(DEFAULT_GLOBAL_WORDS.iter().map(|w| w.to_string()).collect());
        }
        Ok(words)
    }
}
