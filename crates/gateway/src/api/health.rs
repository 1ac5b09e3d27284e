//! `GET /healthz` — liveness probe. Deliberately dependency-free: it answers
//! as soon as the process is up and serving, before anything touches the LLM
//! router or the state stores.

use axum::Json;
use serde_json::json;

pub async fn healthz() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}
