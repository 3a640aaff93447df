use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use reelpipe_common::JobId;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::coordinator::{Job, JobOutcome};
use crate::server::error::{AppError, ErrorBody};
use crate::server::AppContext;

pub fn job_routes() -> Router<AppContext> {
    Router::new()
        .route("/jobs", get(list_jobs).post(submit_job))
        .route("/jobs/:id", get(get_job).delete(cancel_job))
        .route("/jobs/:id/result", get(get_result))
}

/// Request to fetch and transcode one source.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SubmitJobRequest {
    /// Direct media URL, Instagram post/reel URL or Google Drive link.
    #[schema(example = "https://example.com/video.mp4")]
    pub reference: String,
    /// One of the ids listed by `GET /formats`.
    #[schema(example = "mp4-720p")]
    pub target_format: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitJobResponse {
    pub job_id: String,
}

/// Returned by the result endpoint while the job is still running.
#[derive(Debug, Serialize, ToSchema)]
pub struct PendingResponse {
    #[schema(example = "transcoding")]
    pub status: String,
}

/// Returned by the result endpoint for failed or cancelled jobs.
#[derive(Debug, Serialize, ToSchema)]
pub struct FailedResultResponse {
    pub status: String,
    pub error: String,
    pub kind: String,
}

fn parse_job_id(raw: &str) -> Result<JobId, AppError> {
    raw.parse()
        .map_err(|_| AppError::MalformedJobId(raw.to_string()))
}

/// Submit a new job.
#[utoipa::path(
    post,
    path = "/jobs",
    tag = "jobs",
    request_body = SubmitJobRequest,
    responses(
        (status = 201, description = "Job accepted", body = SubmitJobResponse),
        (status = 400, description = "Invalid reference, unsupported format or malformed body", body = ErrorBody),
        (status = 415, description = "Body is not JSON", body = ErrorBody),
        (status = 422, description = "Body is missing fields", body = ErrorBody)
    )
)]
pub async fn submit_job(
    State(ctx): State<AppContext>,
    payload: Result<Json<SubmitJobRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload?;
    let id = ctx
        .coordinator
        .submit(&request.reference, &request.target_format)?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitJobResponse {
            job_id: id.to_string(),
        }),
    ))
}

/// List all known jobs, oldest first.
#[utoipa::path(
    get,
    path = "/jobs",
    tag = "jobs",
    responses(
        (status = 200, description = "Job snapshots", body = Vec<Job>)
    )
)]
pub async fn list_jobs(State(ctx): State<AppContext>) -> Json<Vec<Job>> {
    Json(ctx.coordinator.list())
}

/// Get a job snapshot.
#[utoipa::path(
    get,
    path = "/jobs/{id}",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job snapshot", body = Job),
        (status = 404, description = "Job not found", body = ErrorBody)
    )
)]
pub async fn get_job(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<Job>, AppError> {
    let id = parse_job_id(&id)?;
    Ok(Json(ctx.coordinator.status(id)?))
}

/// Download the transcoded artifact.
#[utoipa::path(
    get,
    path = "/jobs/{id}/result",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Artifact bytes", body = Vec<u8>, content_type = "application/octet-stream"),
        (status = 202, description = "Job still running", body = PendingResponse),
        (status = 404, description = "Job not found", body = ErrorBody),
        (status = 409, description = "Job failed or was cancelled", body = FailedResultResponse)
    )
)]
pub async fn get_result(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_job_id(&id)?;

    let response = match ctx.coordinator.result(id)? {
        JobOutcome::Ready(artifact) => {
            let disposition = format!(
                "attachment; filename=\"{}.{}\"",
                id,
                artifact.format.extension()
            );
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, artifact.content_type().to_string()),
                    (header::CONTENT_DISPOSITION, disposition),
                ],
                artifact.bytes,
            )
                .into_response()
        }
        JobOutcome::Pending(status) => (
            StatusCode::ACCEPTED,
            Json(PendingResponse {
                status: status.to_string(),
            }),
        )
            .into_response(),
        JobOutcome::Failed { status, error } => (
            StatusCode::CONFLICT,
            Json(FailedResultResponse {
                status: status.to_string(),
                error: error.detail,
                kind: error.kind.to_string(),
            }),
        )
            .into_response(),
    };

    Ok(response)
}

/// Cancel a job that has not finished.
#[utoipa::path(
    delete,
    path = "/jobs/{id}",
    tag = "jobs",
    params(
        ("id" = String, Path, description = "Job ID")
    ),
    responses(
        (status = 200, description = "Job snapshot after the request", body = Job),
        (status = 404, description = "Job not found", body = ErrorBody),
        (status = 409, description = "Job already finished", body = ErrorBody)
    )
)]
pub async fn cancel_job(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<Job>, AppError> {
    let id = parse_job_id(&id)?;
    Ok(Json(ctx.coordinator.cancel(id)?))
}
