use axum::{extract::State, routing::get, Json, Router};
use reelpipe_av::TargetFormat;
use serde::Serialize;
use utoipa::ToSchema;

use crate::coordinator::JobCounts;
use crate::server::AppContext;

pub fn api_routes() -> Router<AppContext> {
    Router::new()
        .route("/health", get(health))
        .route("/formats", get(list_formats))
        .route("/tools", get(get_tools))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub jobs: JobCounts,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FormatResponse {
    /// Identifier accepted as `target_format`.
    pub id: String,
    pub description: String,
    pub extension: String,
    pub content_type: String,
    pub audio_only: bool,
}

impl From<TargetFormat> for FormatResponse {
    fn from(format: TargetFormat) -> Self {
        Self {
            id: format.id().to_string(),
            description: format.description().to_string(),
            extension: format.extension().to_string(),
            content_type: format.content_type().to_string(),
            audio_only: format.is_audio_only(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ToolStatusResponse {
    pub name: String,
    pub available: bool,
    pub version: Option<String>,
    pub path: Option<String>,
}

/// Service health and job counts.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        jobs: ctx.coordinator.counts(),
    })
}

/// Supported target formats.
#[utoipa::path(
    get,
    path = "/formats",
    tag = "formats",
    responses(
        (status = 200, description = "Supported target formats", body = Vec<FormatResponse>)
    )
)]
pub async fn list_formats() -> Json<Vec<FormatResponse>> {
    Json(
        TargetFormat::all()
            .iter()
            .copied()
            .map(FormatResponse::from)
            .collect(),
    )
}

/// Availability of external tools.
#[utoipa::path(
    get,
    path = "/tools",
    tag = "tools",
    responses(
        (status = 200, description = "Tool availability", body = Vec<ToolStatusResponse>)
    )
)]
pub async fn get_tools(State(ctx): State<AppContext>) -> Json<Vec<ToolStatusResponse>> {
    let infos = ctx.tools.check_all().await;

    Json(
        infos
            .into_iter()
            .map(|t| ToolStatusResponse {
                name: t.name,
                available: t.available,
                version: t.version,
                path: t.path.map(|p| p.display().to_string()),
            })
            .collect(),
    )
}
