//! Order state machine implementation.
//!
//! Manages order status transitions with validation, ensuring orders only
//! move along the escrow transition table:
//!
//! ```text
//! pending  -> paid | cancelled | disputed | expired
//! paid     -> released | cancelled | disputed
//! disputed -> released | cancelled
//! ```
//!
//! Every transition is a conditional write against the revision that was
//! read, so of two concurrent transitions on the same order at most one is
//! committed. Commit and publication run together in a spawned task.

use crate::clock::Clock;
use crate::event_bus::EventBus;
use escrow_storage::{StorageError, StorageService, Versioned};
use escrow_types::{
	truncate_id, Actor, Order, OrderStatus, StatusChange, StorageKey, TransitionEvent,
};
use once_cell::sync::Lazy;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during order state management.
#[derive(Debug, Error)]
pub enum OrderStateError {
	#[error("Storage error: {0}")]
	Storage(String),
	#[error("Invalid state transition from {from} to {to}")]
	InvalidTransition { from: OrderStatus, to: OrderStatus },
	#[error("Order not found: {0}")]
	OrderNotFound(String),
	/// The stored status was not the expected one, either when read or when
	/// the write was applied.
	#[error("Order {order_id} is {found}, expected {expected}")]
	Conflict {
		order_id: String,
		expected: OrderStatus,
		found: OrderStatus,
	},
	#[error("Order already exists: {0}")]
	AlreadyExists(String),
	#[error("Commit task failed: {0}")]
	Task(String),
}

/// Static transition table - each status maps to allowed next statuses.
static TRANSITIONS: Lazy<HashMap<OrderStatus, HashSet<OrderStatus>>> = Lazy::new(|| {
	let mut m = HashMap::new();
	m.insert(
		OrderStatus::Pending,
		HashSet::from([
			OrderStatus::Paid,
			OrderStatus::Cancelled,
			OrderStatus::Disputed,
			OrderStatus::Expired,
		]),
	);
	m.insert(
		OrderStatus::Paid,
		HashSet::from([
			OrderStatus::Released,
			OrderStatus::Cancelled,
			OrderStatus::Disputed,
		]),
	);
	m.insert(
		OrderStatus::Disputed,
		HashSet::from([OrderStatus::Released, OrderStatus::Cancelled]),
	);
	m.insert(OrderStatus::Released, HashSet::new()); // terminal
	m.insert(OrderStatus::Cancelled, HashSet::new()); // terminal
	m.insert(OrderStatus::Expired, HashSet::new()); // terminal
	m
});

/// Manages order state transitions and persistence.
#[derive(Clone)]
pub struct OrderStateMachine {
	storage: Arc<StorageService>,
	event_bus: EventBus,
	clock: Arc<dyn Clock>,
}

impl OrderStateMachine {
	pub fn new(storage: Arc<StorageService>, event_bus: EventBus, clock: Arc<dyn Clock>) -> Self {
		Self {
			storage,
			event_bus,
			clock,
		}
	}

	/// Checks if a status transition is in the table.
	pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
		TRANSITIONS.get(&from).is_some_and(|set| set.contains(&to))
	}

	/// Gets an order by ID.
	pub async fn get_order(&self, order_id: &str) -> Result<Order, OrderStateError> {
		self.storage
			.retrieve(StorageKey::Orders.as_str(), order_id)
			.await
			.map_err(|e| map_read_error(order_id, e))
	}

	/// Returns every stored order.
	pub async fn list_orders(&self) -> Result<Vec<Order>, OrderStateError> {
		self.storage
			.list(StorageKey::Orders.as_str())
			.await
			.map_err(|e| OrderStateError::Storage(e.to_string()))
	}

	/// Stores a freshly created order and publishes its creation event.
	///
	/// The order must carry its creation entry as the only history entry.
	pub async fn create_order(&self, order: Order) -> Result<Order, OrderStateError> {
		let event = TransitionEvent::latest(&order).ok_or_else(|| {
			OrderStateError::Storage(format!("order {} has no creation entry", order.id))
		})?;
		self.event_bus.expect(&order.id, event.sequence);

		let storage = self.storage.clone();
		let event_bus = self.event_bus.clone();
		tokio::spawn(async move {
			match storage
				.insert_if_absent(StorageKey::Orders.as_str(), &order.id, &order)
				.await
			{
				Ok(_) => {
					event_bus.publish(event);
					Ok(order)
				},
				Err(e) => {
					event_bus.abandon(&order.id, event.sequence);
					Err(match e {
						StorageError::Conflict(_) => OrderStateError::AlreadyExists(order.id),
						other => OrderStateError::Storage(other.to_string()),
					})
				},
			}
		})
		.await
		.map_err(|e| OrderStateError::Task(e.to_string()))?
	}

	/// Transitions an order from `expected` to `next`.
	///
	/// `mutate` may set fields that accompany the transition (for example the
	/// payment reference). Sequence, history and `updated_at` are maintained
	/// here.
	pub async fn transition<F>(
		&self,
		order_id: &str,
		expected: OrderStatus,
		next: OrderStatus,
		actor: Actor,
		mutate: F,
	) -> Result<Order, OrderStateError>
	where
		F: FnOnce(&mut Order) + Send,
	{
		let Versioned {
			value: mut order,
			revision,
		} = self
			.storage
			.retrieve_versioned::<Order>(StorageKey::Orders.as_str(), order_id)
			.await
			.map_err(|e| map_read_error(order_id, e))?;

		if order.status != expected {
			return Err(OrderStateError::Conflict {
				order_id: order_id.to_string(),
				expected,
				found: order.status,
			});
		}
		if !Self::is_valid_transition(expected, next) {
			return Err(OrderStateError::InvalidTransition {
				from: expected,
				to: next,
			});
		}

		let now = self.clock.now();
		mutate(&mut order);
		order.status = next;
		order.sequence += 1;
		order.updated_at = now;
		order.history.push(StatusChange {
			from: Some(expected),
			to: next,
			actor,
			at: now,
		});

		let event = TransitionEvent::latest(&order).ok_or_else(|| {
			OrderStateError::Storage(format!("order {} lost its history", order_id))
		})?;
		self.event_bus.expect(order_id, event.sequence);

		let storage = self.storage.clone();
		let event_bus = self.event_bus.clone();
		tokio::spawn(async move {
			let committed = storage
				.update_if_unchanged(StorageKey::Orders.as_str(), &order.id, &revision, &order)
				.await;
			match committed {
				Ok(_) => {
					tracing::info!(
						order_id = %truncate_id(&order.id),
						from = %expected,
						to = %next,
						sequence = order.sequence,
						"Order transitioned"
					);
					event_bus.publish(event);
					Ok(order)
				},
				Err(StorageError::Conflict(_)) => {
					event_bus.abandon(&order.id, event.sequence);
					let found = storage
						.retrieve::<Order>(StorageKey::Orders.as_str(), &order.id)
						.await
						.map_err(|e| map_read_error(&order.id, e))?
						.status;
					tracing::debug!(
						order_id = %truncate_id(&order.id),
						expected = %expected,
						found = %found,
						"Lost transition race"
					);
					Err(OrderStateError::Conflict {
						order_id: order.id,
						expected,
						found,
					})
				},
				Err(e) => {
					event_bus.abandon(&order.id, event.sequence);
					tracing::error!(
						order_id = %truncate_id(&order.id),
						error = %e,
						"Failed to persist order transition"
					);
					Err(OrderStateError::Storage(e.to_string()))
				},
			}
		})
		.await
		.map_err(|e| OrderStateError::Task(e.to_string()))?
	}
}

fn map_read_error(order_id: &str, err: StorageError) -> OrderStateError {
	match err {
		StorageError::NotFound => OrderStateError::OrderNotFound(order_id.to_string()),
		other => OrderStateError::Storage(other.to_string()),
	}
}
