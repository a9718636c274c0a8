//! Configuration loading from flags and environment variables.

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::budget::ChromeMetrics;

pub const DATA_DIR_VAR: &str = "ZUOYEBAN_DATA_DIR";
pub const DB_VAR: &str = "ZUOYEBAN_DB";
pub const CHROME_TITLE_VAR: &str = "ZUOYEBAN_CHROME_TITLE";
pub const CHROME_TOOLBAR_VAR: &str = "ZUOYEBAN_CHROME_TOOLBAR";
pub const CHROME_HOME_VAR: &str = "ZUOYEBAN_CHROME_HOME";

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_DB_FILE: &str = "preferences.db";

/// Board configuration: where data lives and how tall the page chrome is.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub chrome: ChromeMetrics,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// A `.env` file is read if present. `data_dir` from the command line
    /// takes precedence over `ZUOYEBAN_DATA_DIR`. The database defaults to
    /// `preferences.db` inside the data directory.
    pub fn from_env(data_dir: Option<PathBuf>) -> Result<Self> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();
        Self::from_lookup(data_dir, |key| std::env::var(key).ok())
    }

    fn from_lookup<F>(data_dir: Option<PathBuf>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = data_dir
            .or_else(|| lookup(DATA_DIR_VAR).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        let db_path = lookup(DB_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join(DEFAULT_DB_FILE));

        let defaults = ChromeMetrics::default();
        let chrome = ChromeMetrics {
            title: parse_px(&lookup, CHROME_TITLE_VAR, defaults.title)?,
            toolbar: parse_px(&lookup, CHROME_TOOLBAR_VAR, defaults.toolbar)?,
            home_button: parse_px(&lookup, CHROME_HOME_VAR, defaults.home_button)?,
        };

        Ok(Self {
            data_dir,
            db_path,
            chrome,
        })
    }
}

fn parse_px<F>(lookup: &F, key: &str, default: f64) -> Result<f64>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => {
            let value: f64 = raw
                .trim()
                .parse()
                .with_context(|| format!("{} must be a number of pixels, got {:?}", key, raw))?;
            anyhow::ensure!(
                value.is_finite() && value >= 0.0,
                "{} must be a finite, non-negative number of pixels, got {:?}",
                key,
                raw
            );
            Ok(value)
        }
    }
}
