use crate::coordinator::JobEvent;
use crate::server::AppContext;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::time::Duration;
use tokio_stream::wrappers::{BroadcastStream, IntervalStream};
use tokio_stream::StreamExt;

pub fn sse_routes() -> Router<AppContext> {
    Router::new().route("/events", get(events_handler))
}

/// Stream job lifecycle events.
#[utoipa::path(
    get,
    path = "/events",
    tag = "jobs",
    responses(
        (status = 200, description = "Server-sent event stream of job lifecycle events", body = String, content_type = "text/event-stream")
    )
)]
pub async fn events_handler(
    State(ctx): State<AppContext>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = ctx.coordinator.subscribe();

    // Lagged receivers skip what they missed.
    let stream = BroadcastStream::new(rx)
        .filter_map(|result| result.ok())
        .map(|event: JobEvent| {
            let data = serde_json::to_string(&event).unwrap_or_else(|e| {
                format!(r#"{{"error": "serialization failed: {}"}}"#, e)
            });
            Ok(Event::default().event(event.name()).data(data))
        });

    let heartbeat = IntervalStream::new(tokio::time::interval(Duration::from_secs(30))).map(|_| {
        Ok(Event::default()
            .event("heartbeat")
            .data(r#"{"event_type":"heartbeat"}"#))
    });

    Sse::new(stream.merge(heartbeat)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}
