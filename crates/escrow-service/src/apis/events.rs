//! Server-sent event streams of order transitions.

use crate::identity::Caller;
use crate::server::AppState;
use axum::{
	extract::{Path, State},
	response::sse::{Event, KeepAlive, Sse},
};
use escrow_types::{truncate_id, APIError, TransitionEvent};
use futures::{future, Stream, StreamExt};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

/// Handles GET /api/events requests.
///
/// Streams every order's transitions. Restricted to dispute resolvers.
pub async fn all(
	State(state): State<AppState>,
	Caller(caller): Caller,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, APIError> {
	if !state.engine.is_resolver(&caller) {
		return Err(APIError::Forbidden {
			error_type: "FORBIDDEN".to_string(),
			message: "only dispute resolvers can watch all orders".to_string(),
		});
	}

	let stream = BroadcastStream::new(state.engine.subscribe())
		.filter_map(|item| {
			future::ready(match item {
				Ok(event) => Some(event),
				Err(BroadcastStreamRecvError::Lagged(skipped)) => {
					tracing::warn!(skipped, "Event stream subscriber lagged");
					None
				},
			})
		})
		.map(|event| to_sse(&event));

	Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Handles GET /api/orders/{id}/events requests.
///
/// Streams the transitions of one order to its parties and resolvers. The
/// stream ends after the order reaches a terminal status.
pub async fn order(
	State(state): State<AppState>,
	Caller(caller): Caller,
	Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, APIError> {
	let events = state.engine.subscribe_order(&id, &caller).await?;
	tracing::debug!(order_id = %truncate_id(&id), "Order event stream opened");

	let stream = events
		.scan(false, |finished, event| {
			if *finished {
				return future::ready(None);
			}
			*finished = event.is_final();
			future::ready(Some(event))
		})
		.map(|event| to_sse(&event));

	Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn to_sse(event: &TransitionEvent) -> Result<Event, axum::Error> {
	Event::default()
		.event("transition")
		.id(format!("{}:{}", event.order_id, event.sequence))
		.json_data(event)
}
