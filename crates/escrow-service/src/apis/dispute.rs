//! Dispute endpoints.

use crate::identity::Caller;
use crate::server::AppState;
use axum::{
	extract::{Path, State},
	http::StatusCode,
	response::Json,
};
use escrow_types::{APIError, DisputeResponse, OpenDisputeRequest, ResolveDisputeRequest};

/// Handles POST /api/orders/{id}/dispute requests.
pub async fn open(
	State(state): State<AppState>,
	Caller(caller): Caller,
	Path(id): Path<String>,
	Json(request): Json<OpenDisputeRequest>,
) -> Result<(StatusCode, Json<DisputeResponse>), APIError> {
	let (order, dispute) = state
		.engine
		.open_dispute(&id, &caller, &request.reason, request.description)
		.await?;
	Ok((StatusCode::CREATED, Json(DisputeResponse { order, dispute })))
}

/// Handles POST /api/orders/{id}/dispute/resolve requests.
///
/// The caller is the resolver; the engine rejects parties of the order and,
/// when resolvers are configured, anyone not listed.
pub async fn resolve(
	State(state): State<AppState>,
	Caller(resolver): Caller,
	Path(id): Path<String>,
	Json(request): Json<ResolveDisputeRequest>,
) -> Result<Json<DisputeResponse>, APIError> {
	let (order, dispute) = state
		.engine
		.resolve_dispute(&id, &resolver, request.outcome, request.notes)
		.await?;
	Ok(Json(DisputeResponse { order, dispute }))
}
