use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, EnvFilter};

mod budget;
mod config;
mod data;
mod db;
mod debounce;
mod error;
mod estimate;
mod html;
mod layout;
mod prefs;
mod server;
mod types;

use budget::Viewport;
use config::Config;
use data::{DataFiles, NewSubmission, Snapshot};
use estimate::HeightMetrics;
use layout::LayoutEngine;
use prefs::{PreferenceUpdate, Preferences, SqliteStore};

#[derive(Parser, Debug)]
#[command(name = "zuoyeban")]
#[command(about = "Homework board laid out in balanced columns")]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Directory holding submissions.json, labels.json and subjects.json
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the web server (default)
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },

    /// Lay out the board for a viewport without starting the server
    Layout {
        #[arg(long)]
        width: u32,

        #[arg(long)]
        height: u32,

        /// Override the stored font size preference
        #[arg(long)]
        font_size: Option<u32>,

        /// Print the layout as JSON
        #[arg(long)]
        json: bool,

        /// Write the rendered board to an HTML file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Publish a homework submission
    Add {
        #[arg(long)]
        subject: String,

        #[arg(long)]
        content: String,

        /// Deadline as YYYY-MM-DD
        #[arg(long)]
        deadline: String,

        /// Label name, repeatable
        #[arg(long = "label")]
        labels: Vec<String>,

        /// Label id from labels.json, repeatable; wins over --label
        #[arg(long = "label-id")]
        label_ids: Vec<u32>,
    },

    /// Show or change board preferences
    Settings {
        /// Seconds between automatic refreshes
        #[arg(long)]
        refresh_interval: Option<u64>,

        /// Font size in pixels
        #[arg(long)]
        font_size: Option<u32>,

        #[arg(long)]
        hide_expired: Option<bool>,

        #[arg(long)]
        delete_button: Option<bool>,

        #[arg(long)]
        edit_button: Option<bool>,

        #[arg(long)]
        quick_publish: Option<bool>,

        /// Forget every stored preference
        #[arg(long, conflicts_with_all = ["refresh_interval", "font_size", "hide_expired", "delete_button", "edit_button", "quick_publish"])]
        reset: bool,
    },
}

const DEFAULT_PORT: u16 = 2025;

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},hyper=warn,tower_http=warn", log_level))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_max_level(Level::TRACE)
        .init();
}

fn open_store(config: &Config) -> Result<SqliteStore> {
    if let Some(parent) = config.db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
    }
    SqliteStore::open(&config.db_path)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(&args.log_level);

    let config = Config::from_env(args.data_dir)?;

    match args.command {
        // Default to serve if no command specified
        None => {
            server::serve(DEFAULT_PORT, config).await?;
        }
        Some(Commands::Serve { port }) => {
            server::serve(port, config).await?;
        }
        Some(Commands::Layout {
            width,
            height,
            font_size,
            json,
            output,
        }) => {
            let store = open_store(&config)?;
            let mut prefs = Preferences::load(&store)?;
            if let Some(size) = font_size {
                prefs = PreferenceUpdate {
                    font_size: Some(size),
                    ..Default::default()
                }
                .apply(prefs)?;
            }

            let snapshot = Snapshot::load(&config.data_dir)?;
            let today = chrono::Local::now().date_naive();
            let engine = LayoutEngine::new(HeightMetrics::default(), config.chrome);
            let layout = engine.arrange(
                snapshot.entries(today, prefs.hide_expired),
                Viewport::new(width, height),
                prefs.font_size,
            );

            if layout.forced_placements > 0 {
                warn!(
                    forced = layout.forced_placements,
                    overflowing = ?layout.overflowing_columns(),
                    "Entries placed over the column height budget"
                );
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&layout)?);
            } else {
                info!(
                    columns = layout.column_count(),
                    entries = layout.entry_count(),
                    max_column_height = layout.max_column_height,
                    "Layout computed"
                );
                for (i, column) in layout.columns.iter().enumerate() {
                    for group in &column.groups {
                        info!(
                            column = i,
                            subject = %group.subject,
                            entries = group.entries.len(),
                            continued = group.is_continuation,
                            "Group"
                        );
                    }
                }
            }

            if let Some(path) = output {
                html::generate_html(&layout, &prefs, &snapshot.subjects(), &snapshot.labels, &path)?;
                info!(path = %path.display(), "HTML saved");
            }
        }
        Some(Commands::Add {
            subject,
            content,
            deadline,
            labels,
            label_ids,
        }) => {
            let new = NewSubmission {
                subject,
                content,
                deadline,
                labels,
                label_ids: (!label_ids.is_empty()).then_some(label_ids),
            };
            let now = chrono::Local::now().naive_local();
            let submission = DataFiles::new(&config.data_dir).publish(&new, now)?;
            info!(id = submission.id, subject = %submission.subject, "Homework added");
        }
        Some(Commands::Settings {
            refresh_interval,
            font_size,
            hide_expired,
            delete_button,
            edit_button,
            quick_publish,
            reset,
        }) => {
            let store = open_store(&config)?;
            if reset {
                Preferences::reset(&store)?;
                info!("Settings reset to defaults");
            }

            let update = PreferenceUpdate {
                refresh_interval,
                font_size,
                hide_expired,
                delete_button,
                edit_button,
                quick_publish,
            };

            let mut prefs = Preferences::load(&store)?;
            if !update.is_empty() {
                prefs = update.apply(prefs)?;
                prefs.save(&store)?;
                info!("Settings saved");
            }
            println!("{}", serde_json::to_string_pretty(&prefs)?);
        }
    }

    Ok(())
}
