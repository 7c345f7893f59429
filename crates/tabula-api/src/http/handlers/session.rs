//! Session HTTP handlers.
//!
//! Endpoints:
//! - POST   /api/v1/sessions               - Upload a CSV body and start a session
//! - GET    /api/v1/sessions/{id}          - Step, handles, undo depth and history
//! - POST   /api/v1/sessions/{id}/messages - Deliver one message and run to the next pause
//! - GET    /api/v1/sessions/{id}/export   - Current dataset as CSV
//! - DELETE /api/v1/sessions/{id}          - Evict the session
//!
//! Handlers never wait for a busy session: if a step is running the request
//! fails with 409 instead of queueing.

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tokio::sync::MutexGuard;

use tabula_core::dataset::DatasetCodec;
use tabula_core::session::registry::SessionSlot;
use tabula_core::session::state::SessionState;
use tabula_core::snapshot::SnapshotStore;
use tabula_core::workflow::engine::Turn;
use tabula_types::error::{RegistryError, SessionError};
use tabula_types::message::{EngineOutput, InboundMessage};
use tabula_types::session::{SessionId, SessionView, Step};

use crate::http::error::AppError;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Rows returned in the upload preview.
const PREVIEW_ROWS: usize = 10;

#[derive(Debug, Serialize)]
pub struct CreatedSession {
    pub session_id: SessionId,
    /// `[rows, columns]`.
    pub shape: [usize; 2],
    pub preview: Vec<serde_json::Value>,
    pub stats: String,
}

#[derive(Debug, Serialize)]
pub struct TurnBody {
    pub outputs: Vec<EngineOutput>,
    pub step: Step,
}

#[derive(Debug, Serialize)]
pub struct DeletedSession {
    pub session_id: SessionId,
}

/// Parse a session id from a path parameter, returning 400 on bad format.
pub(crate) fn parse_session_id(s: &str) -> Result<SessionId, AppError> {
    s.parse()
        .map_err(|_| AppError::Validation(format!("Invalid session id: {s}")))
}

fn links<T: Serialize>(resp: ApiResponse<T>, id: SessionId) -> ApiResponse<T> {
    resp.with_link("self", format!("/api/v1/sessions/{id}"))
        .with_link("export", format!("/api/v1/sessions/{id}/export"))
        .with_link("ws", format!("/api/v1/ws/{id}"))
}

/// Lock without waiting; a running step makes the session busy.
fn try_lock<'a>(
    slot: &'a Arc<SessionSlot>,
    id: SessionId,
) -> Result<MutexGuard<'a, SessionState>, AppError> {
    slot.try_lock().ok_or(AppError::Registry(RegistryError::Busy(id)))
}

/// Run a turn on its own task. A client that disconnects drops only the
/// join handle, so the session still reaches a suspension point.
async fn spawn_turn<F, E>(turn: F) -> Result<Turn, AppError>
where
    F: Future<Output = Result<Turn, E>> + Send + 'static,
    E: Into<AppError> + Send + 'static,
{
    tokio::spawn(turn)
        .await
        .map_err(|e| AppError::Internal(format!("turn task failed: {e}")))?
        .map_err(Into::into)
}

/// POST /api/v1/sessions - Load the request body as the original dataset.
///
/// Runs the session through `Analyze`, so the response already carries the
/// statistics the user sees first.
pub async fn create_session(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<ApiResponse<CreatedSession>>), AppError> {
    let started = Instant::now();
    if body.is_empty() {
        return Err(AppError::Validation("request body must be CSV data".to_string()));
    }

    let codec = state.engine.codec();
    let summary = codec.summarize(&body).map_err(SessionError::from)?;
    let preview = codec.preview(&body, PREVIEW_ROWS).map_err(SessionError::from)?;

    let (id, slot) = state.sessions.create();
    let engine = state.engine.clone();
    let blob = body.to_vec();
    let started_turn = spawn_turn(async move {
        let mut session = slot.lock().await;
        engine.load(&mut session, blob).await?;
        engine.advance(&mut session, slot.cancel_token()).await
    })
    .await;
    let turn = match started_turn {
        Ok(turn) => turn,
        Err(e) => {
            let _ = state.sessions.remove(&id);
            return Err(e);
        }
    };

    let stats = turn
        .outputs
        .iter()
        .find_map(|o| match o {
            EngineOutput::Stats { text } => Some(text.clone()),
            EngineOutput::Chat { .. } => None,
        })
        .unwrap_or_else(|| summary.text.clone());
    let (rows, cols) = summary.shape();

    let created = CreatedSession {
        session_id: id,
        shape: [rows, cols],
        preview,
        stats,
    };
    let resp = links(ApiResponse::success(created, started), id);
    Ok((StatusCode::CREATED, Json(resp)))
}

/// GET /api/v1/sessions/{id} - Session view including the undo history.
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<SessionView>>, AppError> {
    let started = Instant::now();
    let id = parse_session_id(&session_id)?;
    let slot = state.sessions.get(&id)?;
    let view = try_lock(&slot, id)?.view();

    Ok(Json(links(ApiResponse::success(view, started), id)))
}

/// POST /api/v1/sessions/{id}/messages - Deliver one inbound message.
pub async fn post_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(message): Json<InboundMessage>,
) -> Result<Json<ApiResponse<TurnBody>>, AppError> {
    let started = Instant::now();
    let id = parse_session_id(&session_id)?;
    let slot = state.sessions.get(&id)?;

    let sessions = state.sessions.clone();
    let engine = state.engine.clone();
    let turn = spawn_turn(async move {
        let turn = {
            let mut session = try_lock(&slot, id)?;
            engine
                .respond(&mut session, message, slot.cancel_token())
                .await?
        };
        if turn.is_terminal() {
            let _ = sessions.remove(&id);
        }
        Ok::<_, AppError>(turn)
    })
    .await?;

    let body = TurnBody {
        outputs: turn.outputs,
        step: turn.halted_at,
    };
    Ok(Json(ApiResponse::success(body, started)))
}

/// GET /api/v1/sessions/{id}/export - Download the current dataset.
pub async fn export_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_session_id(&session_id)?;
    let slot = state.sessions.get(&id)?;
    let current = try_lock(&slot, id)?
        .current()
        .ok_or(SessionError::NotLoaded)?;

    let blob = state.engine.store().read(&current).await?;
    let disposition = format!(
        "attachment; filename=\"{}\"",
        state.config.engine.default_export_filename
    );

    tracing::info!(session_id = %id, handle = %current, bytes = blob.len(), "dataset downloaded");
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        blob.to_vec(),
    )
        .into_response())
}

/// DELETE /api/v1/sessions/{id} - Evict the session, cancelling running work.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<DeletedSession>>, AppError> {
    let started = Instant::now();
    let id = parse_session_id(&session_id)?;
    state.sessions.remove(&id)?;

    Ok(Json(ApiResponse::success(DeletedSession { session_id: id }, started)))
}
