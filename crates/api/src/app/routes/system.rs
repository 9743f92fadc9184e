use axum::{Json, http::StatusCode};
use serde_json::{Value, json};

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn ping() -> Json<Value> {
    Json(json!({ "message": "pong" }))
}
