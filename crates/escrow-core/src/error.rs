//! Caller-facing error taxonomy of the escrow engine.
//!
//! Every variant except [`EscrowError::Storage`] and
//! [`EscrowError::PaymentUnavailable`] is a business outcome: the caller is
//! expected to re-fetch state and decide whether to retry.

use crate::disputes::DisputeError;
use crate::state::OrderStateError;
use escrow_payment::PaymentError;
use escrow_storage::StorageError;
use escrow_types::{APIError, OrderStatus};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EscrowError {
	/// Offer, order, dispute or payment method does not exist.
	#[error("{0}")]
	NotFound(String),
	/// Caller is not permitted to perform this operation.
	#[error("{0}")]
	Forbidden(String),
	/// The operation does not apply to the order's current status.
	#[error("cannot {action} an order that is {status}")]
	InvalidState {
		action: &'static str,
		status: OrderStatus,
	},
	/// Another writer changed the record first.
	#[error("{0}")]
	Conflict(String),
	/// The payment deadline of the order has passed.
	#[error("order {0} has expired")]
	Expired(String),
	#[error("invalid amount: {0}")]
	InvalidAmount(String),
	#[error("invalid payment reference: {0}")]
	InvalidReference(String),
	/// Blocked while a dispute is open on the order.
	#[error("order {0} is under dispute")]
	Disputed(String),
	#[error("offer {0} is not accepting orders")]
	OfferUnavailable(String),
	#[error("you cannot trade against your own offer")]
	SelfTrade,
	#[error("invalid offer: {0}")]
	InvalidOffer(String),
	#[error("invalid input: {0}")]
	InvalidInput(String),
	/// The payment provider could not issue a reference.
	#[error("payment provider unavailable: {0}")]
	PaymentUnavailable(String),
	/// Persistence failure, surfaced unmodified.
	#[error("{0}")]
	Storage(String),
}

impl EscrowError {
	/// Stable machine-readable code.
	pub fn code(&self) -> &'static str {
		match self {
			EscrowError::NotFound(_) => "NOT_FOUND",
			EscrowError::Forbidden(_) => "FORBIDDEN",
			EscrowError::InvalidState { .. } => "INVALID_STATE",
			EscrowError::Conflict(_) => "CONFLICT",
			EscrowError::Expired(_) => "ORDER_EXPIRED",
			EscrowError::InvalidAmount(_) => "INVALID_AMOUNT",
			EscrowError::InvalidReference(_) => "INVALID_REFERENCE",
			EscrowError::Disputed(_) => "ORDER_DISPUTED",
			EscrowError::OfferUnavailable(_) => "OFFER_UNAVAILABLE",
			EscrowError::SelfTrade => "SELF_TRADE",
			EscrowError::InvalidOffer(_) => "INVALID_OFFER",
			EscrowError::InvalidInput(_) => "INVALID_INPUT",
			EscrowError::PaymentUnavailable(_) => "PAYMENT_PROVIDER_UNAVAILABLE",
			EscrowError::Storage(_) => "STORAGE_ERROR",
		}
	}

	/// Whether this is a recoverable, caller-facing rejection.
	pub fn is_business(&self) -> bool {
		!matches!(
			self,
			EscrowError::Storage(_) | EscrowError::PaymentUnavailable(_)
		)
	}

	pub(crate) fn not_found(entity: &str, id: &str) -> Self {
		EscrowError::NotFound(format!("{} {} not found", entity, id))
	}
}

impl From<StorageError> for EscrowError {
	fn from(err: StorageError) -> Self {
		match err {
			StorageError::NotFound => EscrowError::NotFound("record not found".into()),
			StorageError::Conflict(key) => {
				EscrowError::Conflict(format!("{} was modified concurrently, re-fetch and retry", key))
			},
			other => EscrowError::Storage(other.to_string()),
		}
	}
}

impl From<OrderStateError> for EscrowError {
	fn from(err: OrderStateError) -> Self {
		match err {
			OrderStateError::OrderNotFound(id) => EscrowError::not_found("order", &id),
			OrderStateError::InvalidTransition { from, to } => EscrowError::InvalidState {
				action: to.transition_verb(),
				status: from,
			},
			OrderStateError::Conflict {
				order_id,
				found: OrderStatus::Expired,
				..
			} => EscrowError::Expired(order_id),
			OrderStateError::Conflict {
				order_id,
				expected,
				found,
			} => EscrowError::Conflict(format!(
				"order {} moved from {} to {} concurrently, re-fetch and retry",
				order_id, expected, found
			)),
			OrderStateError::AlreadyExists(id) => {
				EscrowError::Conflict(format!("order {} already exists", id))
			},
			OrderStateError::Storage(message) | OrderStateError::Task(message) => {
				EscrowError::Storage(message)
			},
		}
	}
}

impl From<DisputeError> for EscrowError {
	fn from(err: DisputeError) -> Self {
		match err {
			DisputeError::AlreadyOpen(order_id) => EscrowError::Conflict(format!(
				"a dispute is already open on order {}",
				order_id
			)),
			DisputeError::NotFound(id) => EscrowError::not_found("dispute", &id),
			DisputeError::AlreadyResolved(id) => {
				EscrowError::Conflict(format!("dispute {} is already resolved", id))
			},
			DisputeError::Storage(message) => EscrowError::Storage(message),
		}
	}
}

impl From<PaymentError> for EscrowError {
	fn from(err: PaymentError) -> Self {
		match err {
			PaymentError::InvalidReference(message) => EscrowError::InvalidReference(message),
			PaymentError::Provider(message) | PaymentError::Configuration(message) => {
				EscrowError::PaymentUnavailable(message)
			},
		}
	}
}

impl From<EscrowError> for APIError {
	fn from(err: EscrowError) -> Self {
		let error_type = err.code().to_string();
		let message = err.to_string();
		match err {
			EscrowError::NotFound(_) => APIError::NotFound {
				error_type,
				message,
			},
			EscrowError::Forbidden(_) => APIError::Forbidden {
				error_type,
				message,
			},
			EscrowError::InvalidState { status, .. } => APIError::Conflict {
				error_type,
				message,
				details: Some(serde_json::json!({ "currentStatus": status })),
			},
			EscrowError::Conflict(_) | EscrowError::Expired(_) | EscrowError::Disputed(_) => {
				APIError::Conflict {
					error_type,
					message,
					details: None,
				}
			},
			EscrowError::InvalidAmount(_)
			| EscrowError::InvalidReference(_)
			| EscrowError::InvalidOffer(_)
			| EscrowError::SelfTrade
			| EscrowError::OfferUnavailable(_) => APIError::UnprocessableEntity {
				error_type,
				message,
			},
			EscrowError::InvalidInput(_) => APIError::BadRequest {
				error_type,
				message,
			},
			EscrowError::PaymentUnavailable(_) => APIError::ServiceUnavailable {
				error_type,
				message,
			},
			EscrowError::Storage(_) => APIError::InternalServerError {
				error_type,
				message,
			},
		}
	}
}
