use axum::http::StatusCode;

/// Health check endpoint
///
/// Returns 200 OK while the process is serving. Does not touch the database.
#[utoipa::path(
    get,
    path = "/healthz",
    responses(
        (status = 200, description = "Service is healthy"),
    ),
    tag = "health"
)]
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}
