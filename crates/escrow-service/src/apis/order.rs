//! Order endpoints.
//!
//! Every route maps onto one engine operation; the engine decides who may
//! act and in which status.

use crate::identity::Caller;
use crate::server::AppState;
use axum::{
	extract::{Path, State},
	http::StatusCode,
	response::Json,
};
use escrow_types::{
	APIError, CreateOrderRequest, InitiatePaymentResponse, MarkPaidRequest, Order,
};

/// Handles POST /api/orders requests.
pub async fn create(
	State(state): State<AppState>,
	Caller(caller): Caller,
	Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Order>), APIError> {
	let order = state.engine.create_order(&request, &caller).await?;
	Ok((StatusCode::CREATED, Json(order)))
}

/// Handles GET /api/orders requests.
pub async fn list(
	State(state): State<AppState>,
	Caller(caller): Caller,
) -> Result<Json<Vec<Order>>, APIError> {
	Ok(Json(state.engine.list_orders(&caller).await?))
}

/// Handles GET /api/orders/{id} requests.
pub async fn get(
	State(state): State<AppState>,
	Caller(caller): Caller,
	Path(id): Path<String>,
) -> Result<Json<Order>, APIError> {
	Ok(Json(state.engine.get_order(&id, &caller).await?))
}

/// Handles POST /api/orders/{id}/payment requests.
pub async fn initiate_payment(
	State(state): State<AppState>,
	Caller(caller): Caller,
	Path(id): Path<String>,
) -> Result<Json<InitiatePaymentResponse>, APIError> {
	let reference = state.engine.initiate_payment(&id, &caller).await?;
	Ok(Json(InitiatePaymentResponse {
		order_id: id,
		payment_reference: reference.into_inner(),
	}))
}

/// Handles POST /api/orders/{id}/paid requests.
pub async fn mark_paid(
	State(state): State<AppState>,
	Caller(caller): Caller,
	Path(id): Path<String>,
	Json(request): Json<MarkPaidRequest>,
) -> Result<Json<Order>, APIError> {
	Ok(Json(
		state
			.engine
			.mark_paid(&id, &caller, &request.payment_reference)
			.await?,
	))
}

/// Handles POST /api/orders/{id}/release requests.
pub async fn release(
	State(state): State<AppState>,
	Caller(caller): Caller,
	Path(id): Path<String>,
) -> Result<Json<Order>, APIError> {
	Ok(Json(state.engine.release(&id, &caller).await?))
}

/// Handles POST /api/orders/{id}/cancel requests.
pub async fn cancel(
	State(state): State<AppState>,
	Caller(caller): Caller,
	Path(id): Path<String>,
) -> Result<Json<Order>, APIError> {
	Ok(Json(state.engine.cancel(&id, &caller).await?))
}
