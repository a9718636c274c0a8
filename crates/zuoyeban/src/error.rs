use thiserror::Error;

/// Errors from publishing or removing submissions
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("invalid submission: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("submission {0} not found")]
    NotFound(u32),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Preference values outside their allowed range
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PreferenceError {
    #[error("refresh interval must be between 10 and 3600 seconds, got {0}")]
    RefreshInterval(u64),

    #[error("font size must be between 8 and 64 px, got {0}")]
    FontSize(u32),
}
