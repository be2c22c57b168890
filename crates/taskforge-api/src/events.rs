// Event stream HTTP routes (SSE)
//
// Subscribers follow one workflow's channel. The stream replays persisted
// events from the requested sequence, then tails the table by polling; event
// ids are the per-workflow sequence numbers, so clients can reconnect with
// Last-Event-ID semantics.

use std::{convert::Infallible, time::Duration};

use axum::{
    extract::{Path, Query, State},
    response::sse::{Event, KeepAlive, Sse},
    routing::get,
    Router,
};
use futures::stream::{self, Stream, StreamExt};
use serde::Deserialize;

use crate::common::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StreamEventsParams {
    /// Replay starts after this sequence number.
    #[serde(default)]
    pub since: Option<i32>,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/workflows/:id/events", get(stream_events))
        .with_state(state)
}

/// GET /workflows/:id/events - Server-sent event stream for one workflow
pub async fn stream_events(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(params): Query<StreamEventsParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    state
        .db
        .get_workflow(id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("workflow {} not found", id)))?;

    tracing::info!(workflow_id = id, "starting event stream");

    let db = state.db.clone();
    let start = params.since.unwrap_or(0);

    let stream = stream::unfold(start, move |last_sequence| {
        let db = db.clone();
        async move {
            match db.events_for_workflow(id, Some(last_sequence)).await {
                Ok(events) if !events.is_empty() => {
                    let new_sequence = events.last().map(|e| e.sequence).unwrap_or(last_sequence);

                    let sse_events: Vec<Result<Event, Infallible>> = events
                        .into_iter()
                        .map(|row| {
                            let data = serde_json::to_string(&row.data)
                                .unwrap_or_else(|_| "{}".to_string());
                            Ok(Event::default()
                                .event(row.event_type)
                                .data(data)
                                .id(row.sequence.to_string()))
                        })
                        .collect();

                    Some((stream::iter(sse_events), new_sequence))
                }
                Ok(_) => {
                    // No new events; poll again shortly.
                    tokio::time::sleep(Duration::from_millis(500)).await;
                    Some((stream::iter(vec![]), last_sequence))
                }
                Err(e) => {
                    tracing::error!(workflow_id = id, error = %e, "failed to fetch events");
                    None
                }
            }
        }
    })
    .flatten();

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
