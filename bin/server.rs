// Registry Ledger - Web Server
// Read-only REST API over the master table and the change ledger

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tower_http::cors::CorsLayer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use registry_ledger::{CanonicalRecord, ChangeRecord, CommitInfo, PipelineConfig, SnapshotStore};

const ENV_ADDR: &str = "REGISTRY_LEDGER_ADDR";
const DEFAULT_ADDR: &str = "0.0.0.0:3000";

/// Shared application state
#[derive(Clone)]
struct AppState {
    store: Arc<Mutex<SnapshotStore>>,
}

impl AppState {
    fn query<T>(&self, f: impl FnOnce(&SnapshotStore) -> Result<T>) -> Result<T, String> {
        let store = self
            .store
            .lock()
            .map_err(|_| "store lock poisoned".to_string())?;
        f(&store).map_err(|e| format!("{:#}", e))
    }
}

/// API Response wrapper
#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    fn ok(data: T) -> Response {
        (
            StatusCode::OK,
            Json(ApiResponse {
                success: true,
                data: Some(data),
                error: None,
            }),
        )
            .into_response()
    }

    fn fail(status: StatusCode, error: String) -> Response {
        (
            status,
            Json(ApiResponse::<T> {
                success: false,
                data: None,
                error: Some(error),
            }),
        )
            .into_response()
    }
}

fn respond<T: Serialize>(result: Result<T, String>, what: &str) -> Response {
    match result {
        Ok(data) => ApiResponse::ok(data),
        Err(e) => {
            tracing::error!(error = %e, "failed to {}", what);
            ApiResponse::<T>::fail(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

#[derive(Deserialize)]
struct SearchParams {
    cin: Option<String>,
    name: Option<String>,
}

#[derive(Serialize)]
struct SearchResponse {
    results: Vec<CanonicalRecord>,
    /// History of the first result
    change_history: Vec<ChangeRecord>,
}

#[derive(Deserialize)]
struct ChangesParams {
    since: String,
    until: Option<String>,
}

#[derive(Serialize)]
struct StatusResponse {
    last_commit: Option<CommitInfo>,
    record_count: i64,
    change_count: i64,
}

// ============================================================================
// API Handlers
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    ApiResponse::ok("OK")
}

/// GET /api/search_company?cin=..&name=.. - Lookup by id, else by name fragment
async fn search_company(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Response {
    let cin = params.cin.filter(|s| !s.trim().is_empty());
    let name = params.name.filter(|s| !s.trim().is_empty());
    if cin.is_none() && name.is_none() {
        return ApiResponse::<SearchResponse>::fail(
            StatusCode::BAD_REQUEST,
            "cin or name is required".to_string(),
        );
    }

    let result = state.query(|store| {
        let results = match (&cin, &name) {
            (Some(cin), _) => store.find_by_id(cin)?.into_iter().collect(),
            (None, Some(name)) => store.search_by_name(name)?,
            (None, None) => Vec::new(),
        };
        let change_history = match results.first() {
            Some(first) => store.changes_for_entity(&first.id)?,
            None => Vec::new(),
        };
        Ok(SearchResponse {
            results,
            change_history,
        })
    });

    respond(result, "search companies")
}

/// GET /api/changes?since=..&until=.. - Ledger rows by observed date
async fn get_changes(
    State(state): State<AppState>,
    Query(params): Query<ChangesParams>,
) -> Response {
    let result = state.query(|store| match &params.until {
        Some(until) => store.changes_between(&params.since, until),
        None => store.changes_since(&params.since),
    });
    respond(result, "list changes")
}

/// GET /api/status - Last commit and table sizes
async fn get_status(State(state): State<AppState>) -> Response {
    let result = state.query(|store| {
        Ok(StatusResponse {
            last_commit: store.last_commit()?,
            record_count: store.count_records()?,
            change_count: store.count_changes()?,
        })
    });
    respond(result, "read status")
}

fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_check))
        .route("/search_company", get(search_company))
        .route("/changes", get(get_changes))
        .route("/status", get(get_status))
        .with_state(state);

    Router::new()
        .nest("/api", api_routes)
        .layer(CorsLayer::permissive())
}

// ============================================================================
// Main Server
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().compact())
        .init();

    println!("🌐 Registry Ledger - Web Server");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // Optional config path as the only argument
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = PipelineConfig::load(config_path.as_deref())?;

    let db_path = config.db_path();
    if !db_path.exists() {
        eprintln!("❌ Database not found at {}", db_path.display());
        eprintln!("   Run: registry-ledger run <DATE>...");
        eprintln!("   to commit snapshots first.");
        std::process::exit(1);
    }

    let store = SnapshotStore::open(&db_path)?;
    println!("✓ Database opened: {}", db_path.display());

    let state = AppState {
        store: Arc::new(Mutex::new(store)),
    };

    let addr = std::env::var(ENV_ADDR).unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    println!("\n🚀 Server running on http://{}", addr);
    println!("   API: http://{}/api/search_company?cin=...", addr);
    println!("\n   Press Ctrl+C to stop\n");

    axum::serve(listener, router(state))
        .await
        .context("Server error")?;

    Ok(())
}
