use axum::extract::{Form, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use notify_debouncer_mini::{new_debouncer, notify::RecursiveMode, DebounceEventResult};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::budget::Viewport;
use crate::config::Config;
use crate::data::{self, DataFiles, NewSubmission, Snapshot, SubmissionEdit};
use crate::debounce::Debouncer;
use crate::error::SubmissionError;
use crate::estimate::HeightMetrics;
use crate::html;
use crate::layout::LayoutEngine;
use crate::prefs::{MemoryStore, PreferenceStore, PreferenceUpdate, Preferences, SqliteStore};
use crate::types::{HomeworkFeed, LayoutResult, Submission};

/// Quiet period before a reported viewport triggers a relayout
pub const VIEWPORT_DEBOUNCE: Duration = Duration::from_millis(250);

/// Board data and the layout currently shown on the display
pub struct Board {
    pub files: DataFiles,
    pub engine: LayoutEngine,
    pub prefs: Arc<dyn PreferenceStore>,
    pub snapshot: RwLock<Snapshot>,

    /// Last viewport reported by the display
    pub display: RwLock<Viewport>,

    /// Layout for `display`, replaced wholesale on every pass
    pub layout: RwLock<Arc<LayoutResult>>,

    /// Held for a whole read-compute-store pass
    relayout_lock: Mutex<()>,
}

impl Board {
    pub fn new(
        data_dir: PathBuf,
        engine: LayoutEngine,
        prefs: Arc<dyn PreferenceStore>,
    ) -> anyhow::Result<Self> {
        let files = DataFiles::new(data_dir);
        let snapshot = files.load()?;
        let mut board = Self {
            files,
            engine,
            prefs,
            snapshot: RwLock::new(Snapshot::default()),
            display: RwLock::new(Viewport::default()),
            layout: RwLock::new(Arc::new(LayoutResult::default())),
            relayout_lock: Mutex::new(()),
        };

        let layout = board.compute(&snapshot, Viewport::default());
        board.snapshot = RwLock::new(snapshot);
        board.layout = RwLock::new(Arc::new(layout));
        Ok(board)
    }

    /// Current preferences; storage errors fall back to defaults
    pub fn preferences(&self) -> Preferences {
        Preferences::load(self.prefs.as_ref()).unwrap_or_else(|e| {
            warn!(error = %e, "Failed to read preferences, using defaults");
            Preferences::default()
        })
    }

    fn compute(&self, snapshot: &Snapshot, viewport: Viewport) -> LayoutResult {
        let prefs = self.preferences();
        let today = chrono::Local::now().date_naive();
        let entries = snapshot.entries(today, prefs.hide_expired);
        let layout = self.engine.arrange(entries, viewport, prefs.font_size);

        if layout.forced_placements > 0 {
            warn!(
                forced = layout.forced_placements,
                overflowing = ?layout.overflowing_columns(),
                width = viewport.width,
                height = viewport.height,
                "Entries placed over the column height budget"
            );
        }
        layout
    }

    /// Lay out the current snapshot for any viewport
    pub async fn layout_for(&self, viewport: Viewport) -> LayoutResult {
        let snapshot = self.snapshot.read().await;
        self.compute(&snapshot, viewport)
    }

    pub async fn current_layout(&self) -> Arc<LayoutResult> {
        self.layout.read().await.clone()
    }

    /// Recompute the display layout. Passes are serialized, so the stored
    /// layout always belongs to the latest display viewport and snapshot.
    pub async fn relayout(&self) {
        let _pass = self.relayout_lock.lock().await;
        let viewport = *self.display.read().await;
        let layout = self.layout_for(viewport).await;
        debug!(
            columns = layout.column_count(),
            entries = layout.entry_count(),
            "Display layout updated"
        );
        *self.layout.write().await = Arc::new(layout);
    }

    pub async fn set_display(&self, viewport: Viewport) {
        *self.display.write().await = viewport;
        info!(width = viewport.width, height = viewport.height, "Display viewport changed");
        self.relayout().await;
    }

    /// Reload data files; on failure the previous snapshot stays
    pub async fn reload(&self) -> anyhow::Result<()> {
        {
            // Loading under the write lock keeps concurrent reloads in order
            let mut snapshot = self.snapshot.write().await;
            let new_snapshot = self.files.load()?;
            let old_count = snapshot.submissions.len();
            *snapshot = new_snapshot;
            let new_count = snapshot.submissions.len();
            if new_count != old_count {
                info!(
                    total = new_count,
                    change = new_count as i64 - old_count as i64,
                    "Submissions updated"
                );
            }
        }
        self.relayout().await;
        Ok(())
    }
}

/// Router state: the board plus the viewport report debouncer
#[derive(Clone)]
pub struct AppState {
    pub board: Arc<Board>,
    pub viewport_reports: Arc<Debouncer<Viewport>>,
}

impl AppState {
    pub fn new(board: Arc<Board>) -> Self {
        let target = board.clone();
        let viewport_reports = Debouncer::new(VIEWPORT_DEBOUNCE, move |viewport: Viewport| {
            let board = target.clone();
            async move { board.set_display(viewport).await }
        });

        Self {
            board,
            viewport_reports: Arc::new(viewport_reports),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/homework", get(homework_handler))
        .route("/api/subjects", get(subjects_handler))
        .route("/api/layout", get(layout_handler))
        .route("/api/viewport", post(viewport_handler))
        .route("/api/submissions", post(publish_handler))
        .route("/api/submissions/{id}", put(update_handler).delete(delete_handler))
        .route("/api/global_words", get(global_words_handler))
        .route("/homework/publish", post(publish_form_handler))
        .route("/api/settings", get(settings_handler).post(update_settings_handler))
        .route("/api/refresh", get(refresh_handler))
        .with_state(state)
}

/// Start the web server with file watching and periodic refresh
pub async fn serve(port: u16, config: Config) -> anyhow::Result<()> {
    if !config.data_dir.exists() {
        std::fs::create_dir_all(&config.data_dir)?;
        info!(path = %config.data_dir.display(), "Created data directory");
    }

    let store: Arc<dyn PreferenceStore> = match SqliteStore::open(&config.db_path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!(
                error = %e,
                path = %config.db_path.display(),
                "Preference database unavailable, settings will not persist"
            );
            Arc::new(MemoryStore::new())
        }
    };
    let engine = LayoutEngine::new(HeightMetrics::default(), config.chrome);
    let board = Arc::new(Board::new(config.data_dir.clone(), engine, store)?);

    start_file_watcher(board.clone())?;
    start_refresh_ticker(board.clone());

    let app = router(AppState::new(board)).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!(address = %addr, data_dir = %config.data_dir.display(), "Server running");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Watch the data directory and reload when a data file changes
fn start_file_watcher(board: Arc<Board>) -> anyhow::Result<()> {
    let (tx, mut rx) = tokio::sync::mpsc::channel(10);

    let watch_dir = board.files.dir().to_path_buf();
    std::thread::spawn(move || {
        let mut debouncer = match new_debouncer(
            Duration::from_secs(2),
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    if events.iter().any(|e| data::is_data_file(&e.path)) {
                        let _ = tx.blocking_send(());
                    }
                }
                Err(e) => warn!(error = %e, "File watch error"),
            },
        ) {
            Ok(debouncer) => debouncer,
            Err(e) => {
                error!(error = %e, "Failed to create file watcher");
                return;
            }
        };

        if let Err(e) = debouncer
            .watcher()
            .watch(&watch_dir, RecursiveMode::NonRecursive)
        {
            error!(error = %e, path = %watch_dir.display(), "Failed to watch data directory");
            return;
        }

        // Keep the watcher alive
        loop {
            std::thread::sleep(Duration::from_secs(60));
        }
    });

    tokio::spawn(async move {
        while rx.recv().await.is_some() {
            info!("Detected changes in data directory");
            if let Err(e) = board.reload().await {
                error!(error = %e, "Failed to refresh");
            }
        }
    });

    Ok(())
}

/// Reload on the preferred refresh interval, re-read every tick
fn start_refresh_ticker(board: Arc<Board>) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(board.preferences().refresh_period()).await;
            if let Err(e) = board.reload().await {
                warn!(error = %e, "Periodic refresh failed");
            }
        }
    });
}

#[derive(Debug, Default, Deserialize)]
pub struct ViewportQuery {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl ViewportQuery {
    fn viewport(&self) -> Option<Viewport> {
        Some(Viewport::new(self.width?, self.height?))
    }
}

/// Publish form fields; labels arrive comma separated
#[derive(Debug, Deserialize)]
pub struct PublishForm {
    pub subject: String,
    pub content: String,
    pub deadline: String,
    #[serde(default)]
    pub labels: String,
}

impl From<PublishForm> for NewSubmission {
    fn from(form: PublishForm) -> Self {
        Self {
            subject: form.subject,
            content: form.content,
            deadline: form.deadline,
            labels: form
                .labels
                .split(',')
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            label_ids: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u32>,
}

impl ApiResponse {
    fn ok(message: &str, id: Option<u32>) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            id,
        }
    }

    fn failure(message: String) -> Self {
        Self {
            success: false,
            message,
            id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub success: bool,
    pub submission: Submission,
}

fn submission_error_response(err: SubmissionError) -> Response {
    let status = match &err {
        SubmissionError::Invalid(_) => StatusCode::BAD_REQUEST,
        SubmissionError::NotFound(_) => StatusCode::NOT_FOUND,
        SubmissionError::Storage(e) => {
            error!(error = %e, "Submission storage failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(ApiResponse::failure(err.to_string()))).into_response()
}

async fn reload_after_write(board: &Board) {
    if let Err(e) = board.reload().await {
        error!(error = %e, "Failed to reload after write");
    }
}

/// Serve the board page
async fn index_handler(
    State(state): State<AppState>,
    Query(query): Query<ViewportQuery>,
) -> Html<String> {
    let board = &state.board;
    let layout = match query.viewport() {
        Some(viewport) => Arc::new(board.layout_for(viewport).await),
        None => board.current_layout().await,
    };
    let (subjects, labels) = {
        let snapshot = board.snapshot.read().await;
        (snapshot.subjects(), snapshot.labels.clone())
    };
    let markup = html::render_page(&layout, &board.preferences(), &subjects, &labels);
    Html(markup.into_string())
}

/// Submissions grouped by subject, with labels
async fn homework_handler(State(state): State<AppState>) -> Json<HomeworkFeed> {
    Json(state.board.snapshot.read().await.feed())
}

async fn subjects_handler(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.board.snapshot.read().await.subjects())
}

/// Layout for the given viewport, or the display's current one
async fn layout_handler(
    State(state): State<AppState>,
    Query(query): Query<ViewportQuery>,
) -> Json<LayoutResult> {
    let layout = match query.viewport() {
        Some(viewport) => state.board.layout_for(viewport).await,
        None => state.board.current_layout().await.as_ref().clone(),
    };
    Json(layout)
}

/// Record a display resize; bursts are coalesced before relayout
async fn viewport_handler(
    State(state): State<AppState>,
    Json(viewport): Json<Viewport>,
) -> StatusCode {
    if state.viewport_reports.is_pending() {
        debug!(
            width = viewport.width,
            height = viewport.height,
            window_ms = state.viewport_reports.window().as_millis() as u64,
            "Replacing pending viewport report"
        );
    }
    state.viewport_reports.trigger(viewport);
    StatusCode::ACCEPTED
}

async fn publish_handler(
    State(state): State<AppState>,
    Json(new): Json<NewSubmission>,
) -> Response {
    publish(&state.board, new)
        .await
        .map(|id| {
            (
                StatusCode::CREATED,
                Json(ApiResponse::ok("Homework published", Some(id))),
            )
                .into_response()
        })
        .unwrap_or_else(submission_error_response)
}

async fn publish_form_handler(
    State(state): State<AppState>,
    Form(form): Form<PublishForm>,
) -> Response {
    match publish(&state.board, form.into()).await {
        Ok(_) => Redirect::to("/").into_response(),
        Err(e) => submission_error_response(e),
    }
}

async fn publish(board: &Board, new: NewSubmission) -> Result<u32, SubmissionError> {
    let now = chrono::Local::now().naive_local();
    let submission = board.files.publish(&new, now)?;
    reload_after_write(board).await;
    Ok(submission.id)
}

async fn update_handler(
    State(state): State<AppState>,
    Path(id): Path<u32>,
    Json(edit): Json<SubmissionEdit>,
) -> Response {
    match state.board.files.update(id, &edit) {
        Ok(updated) => {
            reload_after_write(&state.board).await;
            Json(UpdateResponse {
                success: true,
                submission: updated,
            })
            .into_response()
        }
        Err(e) => submission_error_response(e),
    }
}

async fn delete_handler(State(state): State<AppState>, Path(id): Path<u32>) -> Response {
    match state.board.files.remove(id) {
        Ok(removed) => {
            reload_after_write(&state.board).await;
            Json(ApiResponse::ok("Homework deleted", Some(removed.id))).into_response()
        }
        Err(e) => submission_error_response(e),
    }
}

/// Shortcut words for the quick publish form
async fn global_words_handler(State(state): State<AppState>) -> Response {
    match state.board.files.global_words() {
        Ok(words) => Json(words).into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to read global words, using defaults");
            Json(data::DEFAULT_GLOBAL_WORDS).into_response()
        }
    }
}

async fn settings_handler(State(state): State<AppState>) -> Json<Preferences> {
    Json(state.board.preferences())
}

async fn update_settings_handler(
    State(state): State<AppState>,
    Json(update): Json<PreferenceUpdate>,
) -> Response {
    let board = &state.board;
    let updated = match update.apply(board.preferences()) {
        Ok(updated) => updated,
        Err(e) => {
            return (StatusCode::BAD_REQUEST, Json(ApiResponse::failure(e.to_string())))
                .into_response()
        }
    };

    if let Err(e) = updated.save(board.prefs.as_ref()) {
        error!(error = %e, "Failed to save preferences");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiResponse::failure("Failed to save settings".to_string())),
        )
            .into_response();
    }

    info!(?updated, "Settings saved");
    // Font size and expiry filtering change the layout
    board.relayout().await;
    Json(updated).into_response()
}

/// Refresh data from disk (manual trigger)
async fn refresh_handler(State(state): State<AppState>) -> &'static str {
    info!("Manual refresh triggered");

    match state.board.reload().await {
        Ok(()) => "OK",
        Err(e) => {
            error!(error = %e, "Refresh failed");
            "ERROR"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prefs::FONT_SIZE_KEY;
    use crate::types::Submission;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn make_submission(id: u32, subject: &str) -> Submission {
        Submission {
            id,
            subject: subject.to_string(),
            content: format!("Exercises for lesson {}", id),
            labels: Vec::new(),
            label_ids: None,
            deadline: "2099-01-15".to_string(),
            timestamp: format!("2025-01-10 08:{:02}:00", id),
        }
    }

    fn setup() -> (TempDir, Arc<MemoryStore>, AppState) {
        let temp_dir = TempDir::new().unwrap();
        let submissions = vec![
            make_submission(1, "Math"),
            make_submission(2, "Art"),
            make_submission(3, "Math"),
        ];
        std::fs::write(
            temp_dir.path().join(data::SUBMISSIONS_FILE),
            serde_json::to_string(&submissions).unwrap(),
        )
        .unwrap();
        std::fs::write(temp_dir.path().join(data::SUBJECTS_FILE), r#"["Art"]"#).unwrap();

        let store = Arc::new(MemoryStore::new());
        let board = Board::new(
            temp_dir.path().to_path_buf(),
            LayoutEngine::default(),
            store.clone(),
        )
        .unwrap();
        (temp_dir, store, AppState::new(Arc::new(board)))
    }

    async fn send(state: &AppState, request: Request<Body>) -> (StatusCode, String) {
        let response = router(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_board_initial_layout() {
        let (_temp_dir, _store, state) = setup();
        let layout = state.board.current_layout().await;

        assert_eq!(layout.column_count(), 4);
        assert_eq!(layout.entry_count(), 3);
        assert_eq!(layout.columns[0].groups[0].subject, "Art");
    }

    #[tokio::test]
    async fn test_homework_feed() {
        let (_temp_dir, _store, state) = setup();
        let (status, body) = send(&state, get_request("/api/homework")).await;

        assert_eq!(status, StatusCode::OK);
        let feed: HomeworkFeed = serde_json::from_str(&body).unwrap();
        assert_eq!(feed.submissions["Math"].len(), 2);
        assert_eq!(feed.submissions["Art"].len(), 1);
    }

    #[tokio::test]
    async fn test_subjects_order() {
        let (_temp_dir, _store, state) = setup();
        let (_, body) = send(&state, get_request("/api/subjects")).await;

        let subjects: Vec<String> = serde_json::from_str(&body).unwrap();
        assert_eq!(subjects, vec!["Art", "Math"]);
    }

    #[tokio::test]
    async fn test_layout_for_query_viewport() {
        let (_temp_dir, _store, state) = setup();
        let (status, body) = send(&state, get_request("/api/layout?width=500&height=2000")).await;

        assert_eq!(status, StatusCode::OK);
        let layout: LayoutResult = serde_json::from_str(&body).unwrap();
        assert_eq!(layout.column_count(), 1);
        assert_eq!(layout.entry_count(), 3);

        // Newest Math entry first
        let math = &layout.columns[0].groups[1];
        assert_eq!(math.subject, "Math");
        assert_eq!(math.entries[0].id, 3);
    }

    #[tokio::test]
    async fn test_index_renders_page() {
        let (_temp_dir, _store, state) = setup();
        let (status, body) = send(&state, get_request("/?width=1000&height=900")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.matches("class=\"column\"").count(), 3);
        assert!(body.contains("Exercises for lesson 2"));
    }

    #[tokio::test]
    async fn test_publish_json() {
        let (temp_dir, _store, state) = setup();
        let body = r#"{"subject":"Physics","content":"Read chapter 4","deadline":"2099-02-01"}"#;
        let (status, response) = send(&state, json_request("POST", "/api/submissions", body)).await;

        assert_eq!(status, StatusCode::CREATED);
        let response: ApiResponse = serde_json::from_str(&response).unwrap();
        assert!(response.success);
        assert_eq!(response.id, Some(4));

        let snapshot = Snapshot::load(temp_dir.path()).unwrap();
        assert_eq!(snapshot.submissions.len(), 4);
        assert_eq!(state.board.current_layout().await.entry_count(), 4);
    }

    #[tokio::test]
    async fn test_publish_invalid() {
        let (_temp_dir, _store, state) = setup();
        let body = r#"{"subject":"","content":"hi","deadline":""}"#;
        let (status, response) = send(&state, json_request("POST", "/api/submissions", body)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let response: ApiResponse = serde_json::from_str(&response).unwrap();
        assert!(!response.success);
        assert!(response.message.contains("subject is required"));
    }

    #[tokio::test]
    async fn test_publish_form_redirects() {
        let (temp_dir, _store, state) = setup();
        let request = Request::builder()
            .method("POST")
            .uri("/homework/publish")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(
                "subject=Math&content=Workbook+p.+30&deadline=2099-01-20&labels=Written%2C+Oral",
            ))
            .unwrap();
        let (status, _) = send(&state, request).await;

        assert_eq!(status, StatusCode::SEE_OTHER);
        let snapshot = Snapshot::load(temp_dir.path()).unwrap();
        let published = snapshot.submissions.last().unwrap();
        assert_eq!(published.labels, vec!["Written", "Oral"]);
    }

    #[tokio::test]
    async fn test_delete_submission() {
        let (_temp_dir, _store, state) = setup();

        let request = Request::builder()
            .method("DELETE")
            .uri("/api/submissions/2")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&state, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(state.board.current_layout().await.entry_count(), 2);

        let request = Request::builder()
            .method("DELETE")
            .uri("/api/submissions/2")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&state, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_settings_update() {
        let (_temp_dir, store, state) = setup();

        let (status, body) =
            send(&state, json_request("POST", "/api/settings", r#"{"font_size":24}"#)).await;
        assert_eq!(status, StatusCode::OK);
        let prefs: Preferences = serde_json::from_str(&body).unwrap();
        assert_eq!(prefs.font_size, 24);
        assert_eq!(store.get(FONT_SIZE_KEY).unwrap(), Some("24".to_string()));

        let (_, body) = send(&state, get_request("/api/settings")).await;
        let prefs: Preferences = serde_json::from_str(&body).unwrap();
        assert_eq!(prefs.font_size, 24);
    }

    #[tokio::test]
    async fn test_settings_rejects_invalid_interval() {
        let (_temp_dir, store, state) = setup();

        let (status, body) = send(
            &state,
            json_request("POST", "/api/settings", r#"{"refresh_interval":5}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("refresh interval"));
        assert_eq!(store.get(FONT_SIZE_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_viewport_reports_are_debounced() {
        let (_temp_dir, _store, state) = setup();

        for width in [700, 800, 500] {
            let body = format!(r#"{{"width":{},"height":900}}"#, width);
            let (status, _) = send(&state, json_request("POST", "/api/viewport", &body)).await;
            assert_eq!(status, StatusCode::ACCEPTED);
        }
        // Nothing applied inside the window
        assert_eq!(*state.board.display.read().await, Viewport::default());

        tokio::time::sleep(VIEWPORT_DEBOUNCE * 3).await;
        assert_eq!(*state.board.display.read().await, Viewport::new(500, 900));
        assert_eq!(state.board.current_layout().await.column_count(), 1);
    }

    #[tokio::test]
    async fn test_refresh_picks_up_file_changes() {
        let (temp_dir, _store, state) = setup();
        std::fs::write(
            temp_dir.path().join(data::SUBMISSIONS_FILE),
            serde_json::to_string(&vec![make_submission(9, "History")]).unwrap(),
        )
        .unwrap();

        let (status, body) = send(&state, get_request("/api/refresh")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
        assert_eq!(state.board.current_layout().await.entry_count(), 1);
    }

    #[tokio::test]
    async fn test_refresh_keeps_snapshot_on_bad_file() {
        let (temp_dir, _store, state) = setup();
        std::fs::write(temp_dir.path().join(data::SUBMISSIONS_FILE), "{ broken").unwrap();

        let (_, body) = send(&state, get_request("/api/refresh")).await;
        assert_eq!(body, "ERROR");
        assert_eq!(state.board.snapshot.read().await.submissions.len(), 3);
    }
    #[tokio::test]
    async fn test_update_submission() {
        let (temp_dir, _store, state) = setup();

        let body = r#"{"content":"Exercises 6-10 on page 13"}"#;
        let (status, response) =
            send(&state, json_request("PUT", "/api/submissions/1", body)).await;
        assert_eq!(status, StatusCode::OK);
        let response: UpdateResponse = serde_json::from_str(&response).unwrap();
        assert!(response.success);
        assert_eq!(response.submission.id, 1);
        assert_eq!(response.submission.subject, "Math");

        let snapshot = Snapshot::load(temp_dir.path()).unwrap();
        assert_eq!(snapshot.submissions[0].content, "Exercises 6-10 on page 13");
        assert_eq!(snapshot.submissions[0].timestamp, "2025-01-10 08:01:00");
        assert_eq!(state.board.snapshot.read().await.submissions[0].content, "Exercises 6-10 on page 13");
    }

    #[tokio::test]
    async fn test_update_submission_errors() {
        let (_temp_dir, _store, state) = setup();

        let (status, _) =
            send(&state, json_request("PUT", "/api/submissions/1", r#"{"subject":" "}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) =
            send(&state, json_request("PUT", "/api/submissions/42", r#"{"content":"x"}"#)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_publish_with_label_ids() {
        let (temp_dir, _store, state) = setup();
        std::fs::write(
            temp_dir.path().join(data::LABELS_FILE),
            r##"[{"id":1,"name":"Written","color":"#ff9800"}]"##,
        )
        .unwrap();

        let body = r#"{"subject":"Math","content":"Workbook","deadline":"2099-02-01","label_ids":[1]}"#;
        let (status, _) = send(&state, json_request("POST", "/api/submissions", body)).await;
        assert_eq!(status, StatusCode::CREATED);

        let body = r#"{"subject":"Math","content":"Workbook","deadline":"2099-02-01","label_ids":[7]}"#;
        let (status, response) = send(&state, json_request("POST", "/api/submissions", body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(response.contains("unknown label id: 7"));

        let snapshot = Snapshot::load(temp_dir.path()).unwrap();
        assert_eq!(snapshot.submissions.len(), 4);
        assert_eq!(snapshot.submissions[3].label_ids, Some(vec![1]));
    }

    #[tokio::test]
    async fn test_global_words_defaults() {
        let (_temp_dir, _store, state) = setup();
        let (status, body) = send(&state, get_request("/api/global_words")).await;

        assert_eq!(status, StatusCode::OK);
        let words: Vec<String> = serde_json::from_str(&body).unwrap();
        assert_eq!(words, data::DEFAULT_GLOBAL_WORDS.to_vec());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_relayouts_end_on_latest_display() {
        let (_temp_dir, _store, state) = setup();
        let board = state.board.clone();

        let mut tasks = Vec::new();
        for i in 0..32u32 {
            let board = board.clone();
            tasks.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    board.set_display(Viewport::new(700 + i * 40, 900)).await;
                } else {
                    board.reload().await.unwrap();
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        board.set_display(Viewport::new(500, 900)).await;
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let board = board.clone();
            tasks.push(tokio::spawn(async move { board.reload().await.unwrap() }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let layout = board.current_layout().await;
        assert_eq!(layout.column_count(), crate::budget::column_count(500));
        assert_eq!(layout.entry_count(), 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_publish_and_delete() {
        let (temp_dir, _store, state) = setup();

        let mut tasks = Vec::new();
        for i in 0..10 {
            let state = state.clone();
            tasks.push(tokio::spawn(async move {
                let body = format!(
                    r#"{{"subject":"Physics","content":"Problem set {}","deadline":"2099-02-01"}}"#,
                    i
                );
                send(&state, json_request("POST", "/api/submissions", &body)).await.0
            }));
        }
        let delete = {
            let state = state.clone();
            tokio::spawn(async move {
                let request = Request::builder()
                    .method("DELETE")
                    .uri("/api/submissions/2")
                    .body(Body::empty())
                    .unwrap();
                send(&state, request).await.0
            })
        };
        for task in tasks {
            assert_eq!(task.await.unwrap(), StatusCode::CREATED);
        }
        assert_eq!(delete.await.unwrap(), StatusCode::OK);

        let snapshot = Snapshot::load(temp_dir.path()).unwrap();
        assert_eq!(snapshot.submissions.len(), 12);
        assert!(snapshot.submissions.iter().all(|s| s.id != 2));
        let mut ids: Vec<u32> = snapshot.submissions.iter().map(|s| s.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 12);
        assert_eq!(state.board.current_layout().await.entry_count(), 12);
    }
}
