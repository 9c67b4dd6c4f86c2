//! Offer endpoints.
//!
//! Browsing offers needs no identity; publishing and changing them does.

use crate::identity::Caller;
use crate::server::AppState;
use axum::{
	extract::{Path, State},
	http::StatusCode,
	response::Json,
};
use escrow_types::{APIError, CreateOfferRequest, Offer, OfferStatusRequest, UpdateOfferRequest};

/// Handles POST /api/offers requests.
pub async fn create(
	State(state): State<AppState>,
	Caller(caller): Caller,
	Json(request): Json<CreateOfferRequest>,
) -> Result<(StatusCode, Json<Offer>), APIError> {
	let offer = state.engine.offers().create(&caller, request).await?;
	Ok((StatusCode::CREATED, Json(offer)))
}

/// Handles GET /api/offers requests.
pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Offer>>, APIError> {
	Ok(Json(state.engine.offers().list_active().await?))
}

/// Handles GET /api/offers/{id} requests.
pub async fn get(
	State(state): State<AppState>,
	Path(id): Path<String>,
) -> Result<Json<Offer>, APIError> {
	Ok(Json(state.engine.offers().get(&id).await?))
}

/// Handles PATCH /api/offers/{id} requests.
pub async fn update(
	State(state): State<AppState>,
	Caller(caller): Caller,
	Path(id): Path<String>,
	Json(request): Json<UpdateOfferRequest>,
) -> Result<Json<Offer>, APIError> {
	Ok(Json(
		state.engine.offers().update(&id, &caller, request).await?,
	))
}

/// Handles POST /api/offers/{id}/status requests.
pub async fn set_status(
	State(state): State<AppState>,
	Caller(caller): Caller,
	Path(id): Path<String>,
	Json(request): Json<OfferStatusRequest>,
) -> Result<Json<Offer>, APIError> {
	Ok(Json(
		state
			.engine
			.offers()
			.set_status(&id, &caller, request.status)
			.await?,
	))
}
