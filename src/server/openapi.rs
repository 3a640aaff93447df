//! OpenAPI documentation and Swagger UI integration.

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use super::AppContext;

/// OpenAPI documentation for reelpipe.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "reelpipe API",
        version = "0.1.0",
        description = "Fetch media from a URL and transcode it with ffmpeg",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT"),
    ),
    servers(
        (url = "/", description = "Default server")
    ),
    paths(
        super::routes_api::health,
        super::routes_api::list_formats,
        super::routes_api::get_tools,
        super::routes_jobs::submit_job,
        super::routes_jobs::list_jobs,
        super::routes_jobs::get_job,
        super::routes_jobs::get_result,
        super::routes_jobs::cancel_job,
        super::routes_sse::events_handler,
    ),
    components(
        schemas(
            super::routes_api::HealthResponse,
            super::routes_api::FormatResponse,
            super::routes_api::ToolStatusResponse,
            super::routes_jobs::SubmitJobRequest,
            super::routes_jobs::SubmitJobResponse,
            super::routes_jobs::PendingResponse,
            super::routes_jobs::FailedResultResponse,
            super::error::ErrorBody,
            crate::coordinator::Job,
            crate::coordinator::JobResult,
            crate::coordinator::JobFailure,
            crate::coordinator::JobCounts,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "jobs", description = "Fetch-and-transcode jobs"),
        (name = "formats", description = "Supported target formats"),
        (name = "tools", description = "External tools status"),
    )
)]
pub struct ApiDoc;

pub fn openapi_routes() -> Router<AppContext> {
    Router::new().merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_job_paths() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        for expected in ["/jobs", "/jobs/{id}", "/jobs/{id}/result", "/formats", "/health"] {
            assert!(
                paths.iter().any(|p| p.as_str() == expected),
                "missing {expected}"
            );
        }
    }
}
