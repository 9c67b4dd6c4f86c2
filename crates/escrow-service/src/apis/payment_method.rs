//! Payment method endpoints.

use crate::identity::Caller;
use crate::server::AppState;
use axum::{
	extract::{Path, State},
	http::StatusCode,
	response::Json,
};
use escrow_types::{APIError, CreatePaymentMethodRequest, PaymentMethod};

/// Handles POST /api/payment-methods requests.
pub async fn create(
	State(state): State<AppState>,
	Caller(caller): Caller,
	Json(request): Json<CreatePaymentMethodRequest>,
) -> Result<(StatusCode, Json<PaymentMethod>), APIError> {
	let method = state
		.engine
		.payment_methods()
		.create(&caller, request)
		.await?;
	Ok((StatusCode::CREATED, Json(method)))
}

/// Handles GET /api/payment-methods requests.
///
/// Lists the caller's own payment methods, inactive ones included.
pub async fn list(
	State(state): State<AppState>,
	Caller(caller): Caller,
) -> Result<Json<Vec<PaymentMethod>>, APIError> {
	Ok(Json(
		state.engine.payment_methods().list_for_owner(&caller).await?,
	))
}

/// Handles DELETE /api/payment-methods/{id} requests.
pub async fn deactivate(
	State(state): State<AppState>,
	Caller(caller): Caller,
	Path(id): Path<String>,
) -> Result<Json<PaymentMethod>, APIError> {
	Ok(Json(
		state
			.engine
			.payment_methods()
			.deactivate(&id, &caller)
			.await?,
	))
}
