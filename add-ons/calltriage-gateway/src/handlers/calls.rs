//! Call ingestion, processing, and read-back.
//!
//! Calls arrive already transcribed; `POST /v1/calls/:call_id/process` runs the
//! classification and action pipeline and returns its `ExecutionResult`.

use crate::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use calltriage_core::{CallRecord, CallStatus, ProcessOptions, RecordStore, StoreError, TranscriptSegment};
use serde::Deserialize;

pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

fn store_failure(e: StoreError) -> Response {
    tracing::error!(target: "calltriage::store", error = %e, "record store request failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// Call record as produced by upstream ingestion. A missing `call_id` is generated.
#[derive(Debug, Deserialize)]
pub(crate) struct IngestCallRequest {
    #[serde(default)]
    call_id: Option<String>,
    #[serde(default)]
    conversation_id: Option<String>,
    #[serde(default)]
    caller_phone: Option<String>,
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    recording_ref: Option<String>,
    #[serde(default)]
    transcript: Vec<TranscriptSegment>,
}

/// POST /v1/calls – store a finished call.
pub(crate) async fn ingest_call(State(state): State<AppState>, Json(req): Json<IngestCallRequest>) -> Response {
    let call_id = req
        .call_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    match state.store.get_call(&call_id) {
        Ok(Some(_)) => {
            return error_response(StatusCode::CONFLICT, format!("call {} already exists", call_id));
        }
        Ok(None) => {}
        Err(e) => return store_failure(e),
    }

    let mut transcript = req.transcript;
    transcript.sort_by_key(|s| s.sequence);
    let mut record = CallRecord::new(call_id.clone(), transcript);
    record.conversation_id = req.conversation_id.filter(|c| !c.trim().is_empty());
    record.caller_phone = req.caller_phone;
    record.client_id = req.client_id;
    record.recording_ref = req.recording_ref;

    if let Err(e) = state.store.put_call(&record) {
        return store_failure(e);
    }
    tracing::info!(
        target: "calltriage::pipeline",
        call_id = %call_id,
        segments = record.transcript.len(),
        "call stored"
    );
    (
        StatusCode::CREATED,
        Json(serde_json::json!({ "call_id": call_id, "status": CallStatus::Received })),
    )
        .into_response()
}

/// GET /v1/calls/:call_id
pub(crate) async fn get_call(State(state): State<AppState>, Path(call_id): Path<String>) -> Response {
    match state.store.get_call(&call_id) {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("call {} not found", call_id)),
        Err(e) => store_failure(e),
    }
}

/// GET /v1/calls/by-conversation/:conversation_id
pub(crate) async fn get_call_by_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> Response {
    match state.store.find_call_by_conversation(&conversation_id) {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            format!("no call for conversation {}", conversation_id),
        ),
        Err(e) => store_failure(e),
    }
}

/// POST /v1/calls/:call_id/process – body `{ "use_llm": bool }` is optional.
pub(crate) async fn process_call(
    State(state): State<AppState>,
    Path(call_id): Path<String>,
    body: Bytes,
) -> Response {
    let opts: ProcessOptions = if body.iter().all(u8::is_ascii_whitespace) {
        ProcessOptions::default()
    } else {
        match serde_json::from_slice(&body) {
            Ok(opts) => opts,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("invalid process options: {}", e)),
        }
    };

    match state.store.get_call(&call_id) {
        Ok(Some(_)) => {}
        Ok(None) => return error_response(StatusCode::NOT_FOUND, format!("call {} not found", call_id)),
        Err(e) => return store_failure(e),
    }

    let result = state.pipeline.process_call(&call_id, opts).await;
    Json(result).into_response()
}

/// GET /v1/tickets/:ticket_id – dashboard copy of a submitted ticket.
pub(crate) async fn get_ticket(State(state): State<AppState>, Path(ticket_id): Path<String>) -> Response {
    match state.store.get_ticket(&ticket_id) {
        Ok(Some(ticket)) => Json(ticket).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, format!("ticket {} not found", ticket_id)),
        Err(e) => store_failure(e),
    }
}
