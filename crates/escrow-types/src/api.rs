//! API types for the escrow HTTP API.
//!
//! Request bodies accepted by the `/api` routes and the structured error
//! returned for every rejected request.

use crate::{DisputeOutcome, Dispute, OfferDirection, OfferStatus, Order, PaymentMethodKind};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Request for registering a payment method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePaymentMethodRequest {
	pub kind: PaymentMethodKind,
	pub label: String,
	#[serde(default)]
	pub details: serde_json::Value,
}

/// Request for publishing an offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOfferRequest {
	pub direction: OfferDirection,
	pub asset: String,
	#[serde(rename = "fiatCurrency")]
	pub fiat_currency: String,
	pub price: Decimal,
	#[serde(rename = "minAmount")]
	pub min_amount: Decimal,
	#[serde(rename = "maxAmount")]
	pub max_amount: Decimal,
	#[serde(rename = "paymentMethodIds", default)]
	pub payment_method_ids: Vec<String>,
	#[serde(default)]
	pub terms: Option<String>,
}

/// Partial update of an offer. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateOfferRequest {
	#[serde(default)]
	pub price: Option<Decimal>,
	#[serde(rename = "minAmount", default)]
	pub min_amount: Option<Decimal>,
	#[serde(rename = "maxAmount", default)]
	pub max_amount: Option<Decimal>,
	#[serde(rename = "paymentMethodIds", default)]
	pub payment_method_ids: Option<Vec<String>>,
	#[serde(default)]
	pub terms: Option<String>,
}

/// Request for changing an offer's status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OfferStatusRequest {
	pub status: OfferStatus,
}

/// Request for creating an order against an offer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderRequest {
	#[serde(rename = "offerId")]
	pub offer_id: String,
	#[serde(rename = "fiatAmount")]
	pub fiat_amount: Decimal,
	#[serde(rename = "paymentMethodId", default)]
	pub payment_method_id: Option<String>,
}

/// Request for marking an order paid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkPaidRequest {
	#[serde(rename = "paymentReference")]
	pub payment_reference: String,
}

/// Response carrying a payment reference issued by the payment provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiatePaymentResponse {
	#[serde(rename = "orderId")]
	pub order_id: String,
	#[serde(rename = "paymentReference")]
	pub payment_reference: String,
}

/// Request for opening a dispute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenDisputeRequest {
	pub reason: String,
	#[serde(default)]
	pub description: Option<String>,
}

/// Request for resolving the open dispute of an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveDisputeRequest {
	pub outcome: DisputeOutcome,
	#[serde(default)]
	pub notes: Option<String>,
}

/// An order together with a dispute that changed it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisputeResponse {
	pub order: Order,
	pub dispute: Dispute,
}

/// API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
	/// Error type/code
	pub error: String,
	/// Human-readable description
	pub message: String,
	/// Additional error context
	pub details: Option<serde_json::Value>,
}

/// Structured API error type with appropriate HTTP status mapping.
#[derive(Debug)]
pub enum APIError {
	/// Malformed request (400)
	BadRequest { error_type: String, message: String },
	/// No usable identity on the request (401)
	Unauthorized { error_type: String, message: String },
	/// Caller may not act on this resource (403)
	Forbidden { error_type: String, message: String },
	/// Resource does not exist (404)
	NotFound { error_type: String, message: String },
	/// Request does not apply to the current state (409)
	Conflict {
		error_type: String,
		message: String,
		details: Option<serde_json::Value>,
	},
	/// Input failed business validation (422)
	UnprocessableEntity { error_type: String, message: String },
	/// Internal server error (500)
	InternalServerError { error_type: String, message: String },
	/// A collaborator the request depends on is down (503)
	ServiceUnavailable { error_type: String, message: String },
}

impl APIError {
	/// Get the HTTP status code for this error.
	pub fn status_code(&self) -> u16 {
		match self {
			APIError::BadRequest { .. } => 400,
			APIError::Unauthorized { .. } => 401,
			APIError::Forbidden { .. } => 403,
			APIError::NotFound { .. } => 404,
			APIError::Conflict { .. } => 409,
			APIError::UnprocessableEntity { .. } => 422,
			APIError::InternalServerError { .. } => 500,
			APIError::ServiceUnavailable { .. } => 503,
		}
	}

	/// Convert to ErrorResponse for JSON serialization.
	pub fn to_error_response(&self) -> ErrorResponse {
		let (error_type, message, details) = match self {
			APIError::Conflict {
				error_type,
				message,
				details,
			} => (error_type, message, details.clone()),
			APIError::BadRequest { error_type, message }
			| APIError::Unauthorized { error_type, message }
			| APIError::Forbidden { error_type, message }
			| APIError::NotFound { error_type, message }
			| APIError::UnprocessableEntity { error_type, message }
			| APIError::InternalServerError { error_type, message }
			| APIError::ServiceUnavailable { error_type, message } => (error_type, message, None),
		};
		ErrorResponse {
			error: error_type.clone(),
			message: message.clone(),
			details,
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let response = self.to_error_response();
		write!(f, "{} ({}): {}", response.error, self.status_code(), response.message)
	}
}

impl std::error::Error for APIError {}

impl axum::response::IntoResponse for APIError {
	fn into_response(self) -> axum::response::Response {
		use axum::{http::StatusCode, response::Json};

		let status =
			StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
		(status, Json(self.to_error_response())).into_response()
	}
}
