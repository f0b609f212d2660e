use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

#[derive(Serialize)]
pub struct PingResponse {
    pub ok: bool,
}

pub async fn ping_handler() -> impl IntoResponse {
    (StatusCode::OK, Json(PingResponse { ok: true }))
}
