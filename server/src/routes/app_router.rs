use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use entity::sea_orm_active_enums::SuggestionStatus;

use crate::{
    error::{AppError, AppJsonResult},
    request_tracing,
    store::Store,
};

/// Read-only surface for the external review UI. All mutation flows through
/// the triage worker; these routes only observe the store.
#[derive(Clone)]
pub struct ServerState {
    pub store: Arc<Store>,
}

pub struct AppRouter;

impl AppRouter {
    pub fn create(state: ServerState) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/api/stats", get(stats))
            .route("/api/suggestions", get(list_suggestions))
            .route("/api/emails/failed", get(list_failed_emails))
            .fallback(handler_404)
            .layer(request_tracing::trace_with_request_id_layer())
            .with_state(state)
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn stats(State(state): State<ServerState>) -> AppJsonResult<Value> {
    let pending = state.store.count_pending_suggestions().await?;
    let failed = state.store.count_failed_classifications().await?;
    let stats = state
        .store
        .get_processing_stats(chrono::Utc::now() - chrono::Duration::days(1))
        .await?;

    Ok(Json(json!({
        "pending_suggestions": pending,
        "failed_classifications": failed,
        "last_24h": stats,
    })))
}

#[derive(Deserialize)]
struct SuggestionsQuery {
    status: Option<String>,
    limit: Option<u64>,
}

async fn list_suggestions(
    State(state): State<ServerState>,
    Query(query): Query<SuggestionsQuery>,
) -> AppJsonResult<Value> {
    let status = match query.status.as_deref() {
        None | Some("pending") => SuggestionStatus::Pending,
        Some("approved") => SuggestionStatus::Approved,
        Some("partial") => SuggestionStatus::Partial,
        Some("rejected") => SuggestionStatus::Rejected,
        Some("auto_approved") => SuggestionStatus::AutoApproved,
        Some("expired") => SuggestionStatus::Expired,
        Some(other) => {
            return Err(AppError::NotFound(format!(
                "unknown suggestion status '{other}'"
            )))
        }
    };

    let suggestions = state
        .store
        .get_suggestions_by_status(status, query.limit.unwrap_or(50))
        .await?;
    Ok(Json(json!({ "suggestions": suggestions })))
}

async fn list_failed_emails(State(state): State<ServerState>) -> AppJsonResult<Value> {
    let emails = state.store.get_failed_emails(50).await?;
    Ok(Json(json!({ "emails": emails })))
}

pub async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "Route does not exist")
}
