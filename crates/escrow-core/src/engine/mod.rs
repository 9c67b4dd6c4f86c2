//! Order Lifecycle Engine.
//!
//! The engine owns every status change of every order. Callers pass their
//! identity explicitly with each operation; there is no ambient session.
//! Business rejections come back as [`EscrowError`] values the caller can
//! render, and only persistence failures are fatal.

mod disputes;
mod orders;
mod sweeper;
#[cfg(test)]
mod tests;

use crate::clock::Clock;
use crate::disputes::DisputeService;
use crate::error::EscrowError;
use crate::event_bus::EventBus;
use crate::offers::OfferStore;
use crate::payment_methods::PaymentMethodRegistry;
use crate::state::OrderStateMachine;
use escrow_config::Config;
use escrow_payment::{PaymentBinding, PaymentService};
use escrow_storage::StorageService;
use escrow_types::{Identity, TransitionEvent};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Main escrow engine.
#[derive(Clone)]
pub struct EscrowEngine {
	/// Engine configuration.
	pub(crate) config: Config,
	/// Storage service for persisting state.
	pub(crate) storage: Arc<StorageService>,
	pub(crate) offers: Arc<OfferStore>,
	pub(crate) payment_methods: Arc<PaymentMethodRegistry>,
	pub(crate) disputes: Arc<DisputeService>,
	/// Issues payment references on request.
	pub(crate) payments: Arc<PaymentService>,
	/// Checks the shape of submitted payment references.
	pub(crate) binding: Arc<PaymentBinding>,
	pub(crate) state_machine: OrderStateMachine,
	pub(crate) event_bus: EventBus,
	pub(crate) clock: Arc<dyn Clock>,
}

impl EscrowEngine {
	/// Creates a new engine with the given services.
	pub fn new(
		config: Config,
		storage: Arc<StorageService>,
		payments: Arc<PaymentService>,
		binding: PaymentBinding,
		event_bus: EventBus,
		clock: Arc<dyn Clock>,
	) -> Self {
		let payment_methods = Arc::new(PaymentMethodRegistry::new(storage.clone(), clock.clone()));
		let offers = Arc::new(OfferStore::new(
			storage.clone(),
			payment_methods.clone(),
			clock.clone(),
		));
		let disputes = Arc::new(DisputeService::new(storage.clone(), clock.clone()));
		let state_machine = OrderStateMachine::new(storage.clone(), event_bus.clone(), clock.clone());

		Self {
			config,
			storage,
			offers,
			payment_methods,
			disputes,
			payments,
			binding: Arc::new(binding),
			state_machine,
			event_bus,
			clock,
		}
	}

	/// Runs the periodic expiry sweeper until Ctrl+C.
	pub async fn run(&self) -> Result<(), EscrowError> {
		let mut interval = tokio::time::interval(Duration::from_secs(
			self.config.engine.sweep_interval_seconds,
		));
		interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

		tracing::info!(
			engine_id = %self.config.engine.id,
			sweep_interval_seconds = self.config.engine.sweep_interval_seconds,
			"Escrow engine running"
		);

		loop {
			tokio::select! {
				_ = interval.tick() => {
					match self.expire_sweep(self.clock.now()).await {
						Ok(0) => {}
						Ok(expired) => tracing::info!(expired, "Expiry sweep finished"),
						Err(e) => tracing::error!(error = %e, "Expiry sweep failed"),
					}
				}

				// Shutdown signal
				_ = tokio::signal::ctrl_c() => {
					break;
				}
			}
		}

		tracing::info!("Shutting down escrow engine");
		Ok(())
	}

	/// Subscribes to transition events of every order.
	pub fn subscribe(&self) -> broadcast::Receiver<TransitionEvent> {
		self.event_bus.subscribe()
	}

	/// Subscribes to transition events of one order.
	///
	/// Only the order's parties and configured resolvers may watch it. The
	/// stream of an order that has already finished is empty.
	pub async fn subscribe_order(
		&self,
		order_id: &str,
		caller: &Identity,
	) -> Result<BoxStream<'static, TransitionEvent>, EscrowError> {
		let stream = self.event_bus.subscribe_order(order_id);
		let order = self.get_order(order_id, caller).await?;
		if order.status.is_terminal() {
			return Ok(futures::stream::empty().boxed());
		}
		Ok(stream)
	}

	pub fn offers(&self) -> &Arc<OfferStore> {
		&self.offers
	}

	pub fn payment_methods(&self) -> &Arc<PaymentMethodRegistry> {
		&self.payment_methods
	}

	/// Returns a reference to the event bus.
	pub fn event_bus(&self) -> &EventBus {
		&self.event_bus
	}

	/// Returns a reference to the configuration.
	pub fn config(&self) -> &Config {
		&self.config
	}

	/// Returns a reference to the storage service.
	pub fn storage(&self) -> &Arc<StorageService> {
		&self.storage
	}

	/// Whether `identity` is a configured dispute resolver.
	pub fn is_resolver(&self, identity: &Identity) -> bool {
		self.config
			.dispute
			.resolvers
			.iter()
			.any(|r| r.trim() == identity.as_str())
	}
}
