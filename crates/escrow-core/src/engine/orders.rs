//! Party-facing order operations.
//!
//! Every operation checks, in order: the order exists, lazy expiry, the
//! caller's role, an open dispute, the current status, the request input.
//! Only then is the conditional transition attempted.

use super::EscrowEngine;
use crate::error::EscrowError;
use crate::state::OrderStateError;
use chrono::{DateTime, Duration, Utc};
use escrow_payment::PaymentRequest;
use escrow_types::{
	truncate_id, Actor, CreateOrderRequest, Identity, Offer, OfferStatus, Order, OrderStatus,
	PartyRole, PaymentMethodKind, PaymentReference, StatusChange,
};
use rust_decimal::{Decimal, RoundingStrategy};
use tracing::instrument;
use uuid::Uuid;

impl EscrowEngine {
	/// Creates a pending order against an active offer.
	///
	/// The caller takes the side opposite to the offer owner: buyer of a sell
	/// offer, seller of a buy offer. Price is copied from the offer and the
	/// asset amount is frozen at `fiat_amount / price`.
	#[instrument(skip_all, fields(offer_id = %truncate_id(&request.offer_id)))]
	pub async fn create_order(
		&self,
		request: &CreateOrderRequest,
		caller: &Identity,
	) -> Result<Order, EscrowError> {
		let result = self.try_create_order(request, caller).await;
		trace_rejection("create order", &result);
		result
	}

	async fn try_create_order(
		&self,
		request: &CreateOrderRequest,
		caller: &Identity,
	) -> Result<Order, EscrowError> {
		let offer = self.offers.get(&request.offer_id).await?;
		if offer.status != OfferStatus::Active {
			return Err(EscrowError::OfferUnavailable(offer.id));
		}
		if &offer.owner == caller {
			return Err(EscrowError::SelfTrade);
		}
		if !offer.accepts_amount(request.fiat_amount) {
			return Err(EscrowError::InvalidAmount(format!(
				"{} {} is outside the offer limits of {} to {}",
				request.fiat_amount, offer.fiat_currency, offer.min_amount, offer.max_amount
			)));
		}
		let payment_method_id =
			select_payment_method(&offer, request.payment_method_id.as_deref())?;
		let asset_amount = self.asset_amount(request.fiat_amount, offer.price)?;

		let now = self.clock.now();
		let (buyer, seller) = offer.counterparties(caller);
		let order = Order {
			id: Uuid::new_v4().to_string(),
			offer_id: offer.id.clone(),
			buyer,
			seller,
			asset: offer.asset.clone(),
			fiat_currency: offer.fiat_currency.clone(),
			price: offer.price,
			asset_amount,
			fiat_amount: request.fiat_amount,
			status: OrderStatus::Pending,
			payment_method_id,
			payment_reference: None,
			expires_at: self.expiry_from(now),
			created_at: now,
			updated_at: now,
			sequence: 1,
			history: vec![StatusChange {
				from: None,
				to: OrderStatus::Pending,
				actor: Actor::Party(caller.clone()),
				at: now,
			}],
		};

		let order = self.state_machine.create_order(order).await?;
		tracing::info!(
			order_id = %truncate_id(&order.id),
			fiat_amount = %order.fiat_amount,
			asset_amount = %order.asset_amount,
			expires_at = %order.expires_at,
			"Order created"
		);
		Ok(order)
	}

	/// Buyer claims the fiat payment and binds its reference.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn mark_paid(
		&self,
		order_id: &str,
		caller: &Identity,
		payment_reference: &str,
	) -> Result<Order, EscrowError> {
		let result = self.try_mark_paid(order_id, caller, payment_reference).await;
		trace_rejection("mark paid", &result);
		result
	}

	async fn try_mark_paid(
		&self,
		order_id: &str,
		caller: &Identity,
		payment_reference: &str,
	) -> Result<Order, EscrowError> {
		let order = self.load_order(order_id).await?;
		require_role(
			&order,
			caller,
			&[PartyRole::Buyer],
			"only the buyer can mark an order paid",
		)?;
		check_status(&order, &[OrderStatus::Pending], OrderStatus::Paid)?;

		let kind = self.payment_method_kind(&order).await?;
		let reference = self.binding.validate(payment_reference, kind)?;

		Ok(self
			.state_machine
			.transition(
				order_id,
				OrderStatus::Pending,
				OrderStatus::Paid,
				Actor::Party(caller.clone()),
				move |o| o.payment_reference = Some(reference.into_inner()),
			)
			.await?)
	}

	/// Seller affirms delivery of the asset.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn release(&self, order_id: &str, caller: &Identity) -> Result<Order, EscrowError> {
		let result = self.try_release(order_id, caller).await;
		trace_rejection("release", &result);
		result
	}

	async fn try_release(
		&self,
		order_id: &str,
		caller: &Identity,
	) -> Result<Order, EscrowError> {
		let order = self.load_order(order_id).await?;
		require_role(
			&order,
			caller,
			&[PartyRole::Seller],
			"only the seller can release an order",
		)?;
		check_status(&order, &[OrderStatus::Paid], OrderStatus::Released)?;

		Ok(self
			.state_machine
			.transition(
				order_id,
				OrderStatus::Paid,
				OrderStatus::Released,
				Actor::Party(caller.clone()),
				|_| {},
			)
			.await?)
	}

	/// Either party abandons an unreleased trade.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn cancel(&self, order_id: &str, caller: &Identity) -> Result<Order, EscrowError> {
		let result = self.try_cancel(order_id, caller).await;
		trace_rejection("cancel", &result);
		result
	}

	async fn try_cancel(
		&self,
		order_id: &str,
		caller: &Identity,
	) -> Result<Order, EscrowError> {
		let order = self.load_order(order_id).await?;
		require_role(
			&order,
			caller,
			&[PartyRole::Buyer, PartyRole::Seller],
			"you are not a party to this order",
		)?;
		check_status(
			&order,
			&[OrderStatus::Pending, OrderStatus::Paid],
			OrderStatus::Cancelled,
		)?;

		Ok(self
			.state_machine
			.transition(
				order_id,
				order.status,
				OrderStatus::Cancelled,
				Actor::Party(caller.clone()),
				|_| {},
			)
			.await?)
	}

	/// Returns an order to one of its parties or a configured resolver.
	pub async fn get_order(&self, order_id: &str, caller: &Identity) -> Result<Order, EscrowError> {
		let order = self.load_order(order_id).await?;
		if !order.is_party(caller) && !self.is_resolver(caller) {
			return Err(EscrowError::Forbidden(
				"you are not a party to this order".into(),
			));
		}
		Ok(order)
	}

	/// Orders where the caller is buyer or seller, newest first.
	pub async fn list_orders(&self, caller: &Identity) -> Result<Vec<Order>, EscrowError> {
		let now = self.clock.now();
		let mut orders = Vec::new();
		for order in self.state_machine.list_orders().await? {
			if !order.is_party(caller) {
				continue;
			}
			if order.is_overdue(now) {
				orders.push(self.expire_lazily(order).await?);
			} else {
				orders.push(order);
			}
		}
		orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
		Ok(orders)
	}

	/// Asks the payment provider for a reference the buyer quotes when
	/// paying. Never changes the order.
	#[instrument(skip_all, fields(order_id = %truncate_id(order_id)))]
	pub async fn initiate_payment(
		&self,
		order_id: &str,
		caller: &Identity,
	) -> Result<PaymentReference, EscrowError> {
		let result = self.try_initiate_payment(order_id, caller).await;
		trace_rejection("initiate payment", &result);
		result
	}

	async fn try_initiate_payment(
		&self,
		order_id: &str,
		caller: &Identity,
	) -> Result<PaymentReference, EscrowError> {
		let order = self.load_order(order_id).await?;
		require_role(
			&order,
			caller,
			&[PartyRole::Buyer],
			"only the buyer can pay for an order",
		)?;
		check_status(&order, &[OrderStatus::Pending], OrderStatus::Paid)?;

		let request = PaymentRequest {
			order_id: order.id.clone(),
			amount: order.fiat_amount,
			fiat_currency: order.fiat_currency.clone(),
			payer: caller.clone(),
		};
		Ok(self.payments.initiate(&request).await?)
	}

	/// Loads an order, forcing `expired` first when its deadline has passed.
	pub(crate) async fn load_order(&self, order_id: &str) -> Result<Order, EscrowError> {
		let order = self.state_machine.get_order(order_id).await?;
		if order.is_overdue(self.clock.now()) {
			return self.expire_lazily(order).await;
		}
		Ok(order)
	}

	async fn expire_lazily(&self, order: Order) -> Result<Order, EscrowError> {
		match self
			.state_machine
			.transition(
				&order.id,
				OrderStatus::Pending,
				OrderStatus::Expired,
				Actor::System,
				|_| {},
			)
			.await
		{
			Ok(expired) => {
				tracing::info!(order_id = %truncate_id(&expired.id), "Order expired on access");
				Ok(expired)
			},
			// moved by someone else first, report what is stored now
			Err(OrderStateError::Conflict { .. }) => {
				Ok(self.state_machine.get_order(&order.id).await?)
			},
			Err(e) => Err(e.into()),
		}
	}

	async fn payment_method_kind(
		&self,
		order: &Order,
	) -> Result<Option<PaymentMethodKind>, EscrowError> {
		let Some(id) = order.payment_method_id.as_deref() else {
			return Ok(None);
		};
		match self.payment_methods.get(id).await {
			Ok(method) => Ok(Some(method.kind)),
			Err(EscrowError::NotFound(_)) => Ok(None),
			Err(e) => Err(e),
		}
	}

	fn asset_amount(&self, fiat_amount: Decimal, price: Decimal) -> Result<Decimal, EscrowError> {
		let amount = fiat_amount
			.checked_div(price)
			.ok_or_else(|| {
				EscrowError::InvalidAmount(format!(
					"{} cannot be converted at price {}",
					fiat_amount, price
				))
			})?
			.round_dp_with_strategy(
				self.config.engine.asset_decimal_places,
				RoundingStrategy::ToZero,
			);
		if amount <= Decimal::ZERO {
			return Err(EscrowError::InvalidAmount(format!(
				"{} buys no asset at price {}",
				fiat_amount, price
			)));
		}
		Ok(amount)
	}

	fn expiry_from(&self, created_at: DateTime<Utc>) -> DateTime<Utc> {
		created_at + Duration::minutes(self.config.engine.order_expiry_minutes as i64)
	}
}

/// Picks the payment method an order is bound to.
///
/// A given method must be one the offer accepts. Without one, the offer's
/// only method is bound when it has exactly one.
fn select_payment_method(
	offer: &Offer,
	requested: Option<&str>,
) -> Result<Option<String>, EscrowError> {
	match requested.map(str::trim).filter(|id| !id.is_empty()) {
		Some(id) if offer.payment_method_ids.iter().any(|m| m == id) => Ok(Some(id.to_string())),
		Some(id) => Err(EscrowError::InvalidReference(format!(
			"payment method {} is not accepted by this offer",
			id
		))),
		None if offer.payment_method_ids.len() == 1 => {
			Ok(offer.payment_method_ids.first().cloned())
		},
		None => Ok(None),
	}
}

/// Rejects callers whose role in the order is not in `allowed`.
pub(super) fn require_role(
	order: &Order,
	caller: &Identity,
	allowed: &[PartyRole],
	message: &str,
) -> Result<(), EscrowError> {
	match order.role_of(caller) {
		Some(role) if allowed.contains(&role) => Ok(()),
		Some(_) => Err(EscrowError::Forbidden(message.to_string())),
		None => Err(EscrowError::Forbidden(
			"you are not a party to this order".into(),
		)),
	}
}

/// Rejects a move to `next` unless the order is in one of `allowed`.
pub(super) fn check_status(
	order: &Order,
	allowed: &[OrderStatus],
	next: OrderStatus,
) -> Result<(), EscrowError> {
	if allowed.contains(&order.status) {
		return Ok(());
	}
	Err(match order.status {
		OrderStatus::Disputed => EscrowError::Disputed(order.id.clone()),
		OrderStatus::Expired if next == OrderStatus::Paid => {
			EscrowError::Expired(order.id.clone())
		},
		status => EscrowError::InvalidState {
			action: next.transition_verb(),
			status,
		},
	})
}

/// Business rejections at debug, infrastructure failures at error.
pub(super) fn trace_rejection<T>(operation: &'static str, result: &Result<T, EscrowError>) {
	match result {
		Err(e) if e.is_business() => {
			tracing::debug!(operation, code = e.code(), reason = %e, "Request rejected")
		},
		Err(e) => tracing::error!(operation, error = %e, "Request failed"),
		Ok(_) => {},
	}
}
