//! SSE update stream.
//!
//! A subscriber gets one `snapshot` event with the full fleet view,
//! then incremental `host_update` / `transition` / `health_status`
//! events as they happen. A slow consumer lags only its own broadcast
//! receiver; when it falls behind, skipped events are dropped and the
//! stream continues from the oldest retained one. Dropping the
//! connection drops the receiver.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::ApiState;

const KEEP_ALIVE_SECS: u64 = 25;

/// GET /api/v1/stream
pub async fn stream_updates(
    State(state): State<ApiState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // Subscribe before snapshotting so nothing between the two is lost;
    // an event may then arrive both in the snapshot and incrementally,
    // which consumers absorb (updates are idempotent by host).
    let rx = state.live.subscribe();
    let snapshot = state.live.snapshot().await;

    let first = stream::once(async move {
        let data = serde_json::to_string(&snapshot).unwrap_or_default();
        Ok::<_, Infallible>(Event::default().event("snapshot").data(data))
    });

    let updates = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let Ok(data) = serde_json::to_string(&event) else {
                        continue;
                    };
                    return Some((
                        Ok::<_, Infallible>(Event::default().event(event.kind()).data(data)),
                        rx,
                    ));
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "sse subscriber lagged; continuing");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(first.chain(updates))
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(KEEP_ALIVE_SECS)))
}
