//! Event bus for order transition notifications.
//!
//! Publication happens only after a transition is committed. Events of one
//! order are released strictly in `sequence` order even when the tasks that
//! committed them publish out of order; there is no ordering across orders.

use escrow_types::{truncate_id, TransitionEvent};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};

/// Default number of events buffered per subscriber before it lags.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Release state of one order with transitions in flight.
///
/// An event is released once no expectation for an earlier sequence is
/// outstanding and no earlier event is waiting. Each sequence commits at
/// most once, so a committed event never waits on a sequence that has
/// already been released.
#[derive(Debug, Default)]
struct OrderCursor {
	/// Announced sequences that are neither published nor abandoned, with
	/// the number of competing writers for each.
	in_flight: BTreeMap<u64, usize>,
	/// Committed events held back by an earlier sequence.
	pending: BTreeMap<u64, TransitionEvent>,
}

impl OrderCursor {
	fn settle(&mut self, sequence: u64) {
		if let Some(count) = self.in_flight.get_mut(&sequence) {
			*count -= 1;
			if *count == 0 {
				self.in_flight.remove(&sequence);
			}
		}
	}

	/// Pops the next event that may be released, if any.
	fn next_ready(&mut self) -> Option<TransitionEvent> {
		let (&sequence, _) = self.pending.first_key_value()?;
		if self
			.in_flight
			.first_key_value()
			.is_some_and(|(&earliest, _)| earliest < sequence)
		{
			return None;
		}
		self.pending.pop_first().map(|(_, event)| event)
	}

	fn is_idle(&self) -> bool {
		self.in_flight.is_empty() && self.pending.is_empty()
	}
}

/// Broadcast channel of [`TransitionEvent`]s with per-order reordering.
#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<TransitionEvent>,
	cursors: Arc<Mutex<HashMap<String, OrderCursor>>>,
}

impl EventBus {
	/// Creates a new event bus with the specified subscriber capacity.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self {
			sender,
			cursors: Arc::new(Mutex::new(HashMap::new())),
		}
	}

	/// Subscribes to the events of every order.
	pub fn subscribe(&self) -> broadcast::Receiver<TransitionEvent> {
		self.sender.subscribe()
	}

	/// Subscribes to the events of a single order.
	///
	/// A subscriber that falls behind skips the events it missed and keeps
	/// going.
	pub fn subscribe_order(&self, order_id: &str) -> BoxStream<'static, TransitionEvent> {
		let order_id = order_id.to_string();
		BroadcastStream::new(self.sender.subscribe()).filter_map(move |item| {
			let item = match item {
				Ok(event) if event.order_id == order_id => Some(event),
				Ok(_) => None,
				Err(BroadcastStreamRecvError::Lagged(skipped)) => {
					tracing::warn!(
						order_id = %truncate_id(&order_id),
						skipped,
						"Order event subscriber lagged"
					);
					None
				},
			};
			futures::future::ready(item)
		})
		.boxed()
	}

	/// Announces that a transition producing `sequence` is about to be
	/// committed.
	///
	/// Must be called before the write, so that any later event of the same
	/// order waits until this one is published or abandoned. Several writers
	/// may announce the same sequence; at most one of them commits.
	pub fn expect(&self, order_id: &str, sequence: u64) {
		let mut cursors = self.cursors.lock().unwrap_or_else(|e| e.into_inner());
		*cursors
			.entry(order_id.to_string())
			.or_default()
			.in_flight
			.entry(sequence)
			.or_insert(0) += 1;
	}

	/// Withdraws an expectation whose write was not committed.
	pub fn abandon(&self, order_id: &str, sequence: u64) {
		let mut cursors = self.cursors.lock().unwrap_or_else(|e| e.into_inner());
		if let Some(cursor) = cursors.get_mut(order_id) {
			cursor.settle(sequence);
			self.release(cursor);
			if cursor.is_idle() {
				cursors.remove(order_id);
			}
		}
	}

	/// Publishes a committed transition.
	///
	/// The event is held back while an earlier sequence of the same order is
	/// still in flight or waiting.
	pub fn publish(&self, event: TransitionEvent) {
		let mut cursors = self.cursors.lock().unwrap_or_else(|e| e.into_inner());
		let order_id = event.order_id.clone();
		let cursor = cursors.entry(order_id.clone()).or_default();

		cursor.settle(event.sequence);
		if cursor.pending.insert(event.sequence, event).is_some() {
			tracing::warn!(
				order_id = %truncate_id(&order_id),
				"Replaced duplicate transition event"
			);
		}
		self.release(cursor);

		if cursor.is_idle() {
			cursors.remove(&order_id);
		}
	}

	fn release(&self, cursor: &mut OrderCursor) {
		while let Some(event) = cursor.next_ready() {
			// No subscribers is not an error
			let _ = self.sender.send(event);
		}
	}

	#[cfg(test)]
	fn tracked_orders(&self) -> usize {
		self.cursors.lock().unwrap_or_else(|e| e.into_inner()).len()
	}
}

impl Default for EventBus {
	fn default() -> Self {
		Self::new(DEFAULT_CAPACITY)
	}
}
