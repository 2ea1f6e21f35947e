use anyhow::Result;
use axum::{extract::{Path, Query, State}, http::{HeaderMap, StatusCode}, routing::{get, post}, Json, Router};
use parking_lot::RwLock;
use recs_core::engine::{DEFAULT_K, USER_ID_LIMIT};
use recs_core::{ItemId, RecommendationError, RecommendationRequest, Snapshot, UserId, Violation};
use serde::{Deserialize, Serialize};
use std::num::IntErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub const USER_SAMPLE_SIZE: usize = 10;

const INVALID_USER_ID: &str = "Invalid user_id. It should be an integer.";
const INTERNAL_ERROR: &str = "An error occurred while processing the recommendation.";

#[derive(Deserialize)]
pub struct RecommendParams {
    pub k: Option<String>,
    pub num_recommendations: Option<String>,
}

#[derive(Serialize)]
pub struct RecommendResponse {
    pub user_id: UserId,
    pub user_name: String,
    pub recommendations: Vec<ItemId>,
    pub recommendations_ext: Vec<RecommendedItem>,
}

#[derive(Serialize)]
pub struct RecommendedItem {
    pub item_id: ItemId,
    pub item_name: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

pub type ApiError = (StatusCode, Json<ErrorBody>);

fn api_error(status: StatusCode, error: &'static str, details: Option<serde_json::Value>) -> ApiError {
    (status, Json(ErrorBody { error, details }))
}

pub struct AppConfig {
    pub artifact_dir: PathBuf,
    pub admin_token: Option<String>,
    /// Comma-separated origins; any origin when unset or empty.
    pub cors_allow_origin: Option<String>,
}

impl AppConfig {
    pub fn from_env(artifact_dir: impl Into<PathBuf>) -> Self {
        Self {
            artifact_dir: artifact_dir.into(),
            admin_token: std::env::var("ADMIN_TOKEN").ok(),
            cors_allow_origin: std::env::var("CORS_ALLOW_ORIGIN").ok(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub artifact_dir: PathBuf,
    snapshot: Arc<RwLock<Arc<Snapshot>>>,
    pub admin_token: Option<String>,
}

impl AppState {
    pub fn new(artifact_dir: PathBuf, snapshot: Snapshot, admin_token: Option<String>) -> Self {
        Self { artifact_dir, snapshot: Arc::new(RwLock::new(Arc::new(snapshot))), admin_token }
    }

    /// Current snapshot. Requests keep the one they started with across a reload.
    pub fn snapshot(&self) -> Arc<Snapshot> { self.snapshot.read().clone() }

    fn replace_snapshot(&self, snapshot: Snapshot) { *self.snapshot.write() = Arc::new(snapshot); }
}

pub fn build_app(artifact_dir: String) -> Result<Router> {
    build_app_with_config(AppConfig::from_env(artifact_dir))
}

pub fn build_app_with_config(config: AppConfig) -> Result<Router> {
    // Refuse to start on a missing or inconsistent artifact
    let snapshot = Snapshot::load(&config.artifact_dir)?;
    let app_state = AppState::new(config.artifact_dir, snapshot, config.admin_token);

    let cors = match config.cors_allow_origin {
        Some(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        None => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/recommend/:user_id", get(recommend_handler))
        .route("/user_sample", get(user_sample_handler))
        .route("/admin/reload", post(reload_handler))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http());
    Ok(app)
}

pub async fn recommend_handler(
    State(state): State<AppState>,
    Path(raw_user_id): Path<String>,
    Query(params): Query<RecommendParams>,
) -> Result<Json<RecommendResponse>, ApiError> {
    let user_id = parse_user_id(&raw_user_id)?;
    let k = parse_k(&params)?;
    let request = RecommendationRequest::new(user_id, k).map_err(|e| error_response(user_id, e))?;

    let snapshot = state.snapshot();
    let scoring = snapshot.clone();
    let result = tokio::task::spawn_blocking(move || scoring.engine.recommend_validated(request))
        .await
        .map_err(|e| {
            warn!(user_id, error = %e, "recommendation worker failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR, None)
        })?
        .map_err(|e| error_response(user_id, e))?;

    let names = &snapshot.names;
    let recommendations_ext = result
        .items
        .iter()
        .map(|&item_id| RecommendedItem { item_id, item_name: names.item_name(item_id).to_string() })
        .collect();
    Ok(Json(RecommendResponse {
        user_id: request.user_id(),
        user_name: names.user_name(request.user_id()).to_string(),
        recommendations: result.items,
        recommendations_ext,
    }))
}

/// Integers too wide for `i64` are out of range, not malformed.
fn parse_user_id(raw: &str) -> Result<i64, ApiError> {
    let raw = raw.trim();
    raw.parse().map_err(|e: std::num::ParseIntError| match e.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => {
            invalid_input(&[Violation::new("user_id", format!("must be > 0 and < {USER_ID_LIMIT}"), raw)])
        }
        _ => api_error(StatusCode::BAD_REQUEST, INVALID_USER_ID, None),
    })
}

/// `k` wins over `num_recommendations`; both absent means the default.
fn parse_k(params: &RecommendParams) -> Result<i64, ApiError> {
    match params.k.as_deref().or(params.num_recommendations.as_deref()) {
        None => Ok(DEFAULT_K),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| invalid_input(&[Violation::new("k", "must be an integer", raw)])),
    }
}

fn invalid_input(violations: &[Violation]) -> ApiError {
    let details = serde_json::to_value(violations).ok();
    api_error(StatusCode::BAD_REQUEST, "Input validation failed", details)
}

fn error_response(user_id: i64, err: RecommendationError) -> ApiError {
    match &err {
        RecommendationError::InvalidInput(violations) => invalid_input(violations),
        RecommendationError::Scoring(cause) => {
            warn!(user_id, error = %cause, "scoring failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, err.public_message(), None)
        }
    }
}

pub async fn user_sample_handler(State(state): State<AppState>) -> Json<Vec<(UserId, String)>> {
    Json(sample_users(&state.snapshot()))
}

fn sample_users(snapshot: &Snapshot) -> Vec<(UserId, String)> {
    let mut rng = rand::thread_rng();
    snapshot
        .names
        .sample_users(USER_SAMPLE_SIZE, &mut rng)
        .into_iter()
        .map(|(id, name)| (id, name.to_string()))
        .collect()
}

// --- Admin endpoints ---
async fn reload_handler(State(state): State<AppState>, headers: HeaderMap) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    authorize(&state, &headers)?;
    let dir = state.artifact_dir.clone();
    let loaded = tokio::task::spawn_blocking(move || Snapshot::load(&dir))
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .and_then(|r| r);
    match loaded {
        Ok(snapshot) => {
            let body = serde_json::json!({
                "status": "reloaded",
                "users": snapshot.meta.num_users,
                "items": snapshot.meta.num_items,
                "created_at": snapshot.meta.created_at,
            });
            state.replace_snapshot(snapshot);
            info!(dir = %state.artifact_dir.display(), "snapshot reloaded");
            Ok(Json(body))
        }
        Err(e) => {
            warn!(error = %format!("{e:#}"), "reload failed, keeping current snapshot");
            Err((StatusCode::INTERNAL_SERVER_ERROR, "reload failed; previous snapshot still serving".into()))
        }
    }
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), (StatusCode, String)> {
    let required = match &state.admin_token {
        Some(t) => t,
        None => return Err((StatusCode::UNAUTHORIZED, "ADMIN_TOKEN not set".into())),
    };
    let provided = headers.get("X-ADMIN-TOKEN").and_then(|v| v.to_str().ok()).unwrap_or("");
    if provided == required {
        Ok(())
    } else {
        warn!("rejected admin request");
        Err((StatusCode::UNAUTHORIZED, "invalid admin token".into()))
    }
}
