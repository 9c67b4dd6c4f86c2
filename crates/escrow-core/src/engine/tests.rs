use super::*;
use crate::clock::ManualClock;
use chrono::{Duration, Utc};
use escrow_payment::implementations::mock::MockPaymentProvider;
use escrow_payment::PaymentProviderInterface;
use escrow_storage::implementations::memory::MemoryStorage;
use escrow_storage::{StorageError, StorageInterface};
use escrow_types::{
	APIError, Actor, CreateOfferRequest, CreateOrderRequest, CreatePaymentMethodRequest,
	DisputeOutcome, DisputeStatus, Offer, OfferDirection, OfferStatus, Order, OrderStatus,
	PaymentMethodKind, UpdateOfferRequest,
};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

const CONFIG: &str = r#"
[engine]
id = "engine-test"
order_expiry_minutes = 30

[storage]
primary = "memory"
[storage.implementations.memory]

[payment]
primary = "mock"
[payment.implementations.mock]

[dispute]
resolvers = ["support-admin"]
"#;

struct Fixture {
	engine: EscrowEngine,
	clock: Arc<ManualClock>,
	offer: Offer,
}

fn buyer() -> Identity {
	Identity::from("buyer")
}

fn seller() -> Identity {
	Identity::from("seller")
}

fn offer_request(direction: OfferDirection, payment_method_ids: Vec<String>) -> CreateOfferRequest {
	CreateOfferRequest {
		direction,
		asset: "BLURT".into(),
		fiat_currency: "NGN".into(),
		price: Decimal::new(26050, 2),
		min_amount: Decimal::from(5000),
		max_amount: Decimal::from(250000),
		payment_method_ids,
		terms: None,
	}
}

async fn fixture() -> Fixture {
	fixture_on(Box::new(MemoryStorage::new())).await
}

async fn fixture_on(backend: Box<dyn StorageInterface>) -> Fixture {
	let config: Config = CONFIG.parse().unwrap();
	let storage = Arc::new(StorageService::new(backend));

	let mut providers: HashMap<String, Arc<dyn PaymentProviderInterface>> = HashMap::new();
	providers.insert(
		"mock".into(),
		Arc::new(MockPaymentProvider::new("mock".into())),
	);
	let payments = Arc::new(PaymentService::new(providers, "mock".into()).unwrap());
	let binding = PaymentBinding::from_formats(&HashMap::new()).unwrap();

	let clock = Arc::new(ManualClock::new(Utc::now()));
	let engine = EscrowEngine::new(
		config,
		storage,
		payments,
		binding,
		EventBus::new(64),
		clock.clone(),
	);
	let offer = engine
		.offers()
		.create(&seller(), offer_request(OfferDirection::Sell, vec![]))
		.await
		.unwrap();

	Fixture {
		engine,
		clock,
		offer,
	}
}

fn order_request(offer_id: &str, fiat_amount: Decimal) -> CreateOrderRequest {
	CreateOrderRequest {
		offer_id: offer_id.to_string(),
		fiat_amount,
		payment_method_id: None,
	}
}

async fn pending_order(f: &Fixture) -> Order {
	f.engine
		.create_order(&order_request(&f.offer.id, Decimal::from(10000)), &buyer())
		.await
		.unwrap()
}

async fn paid_order(f: &Fixture) -> Order {
	let order = pending_order(f).await;
	f.engine
		.mark_paid(&order.id, &buyer(), "ref-123")
		.await
		.unwrap()
}

#[tokio::test]
async fn test_trade_happy_path() {
	let f = fixture().await;

	let order = pending_order(&f).await;
	assert_eq!(order.status, OrderStatus::Pending);
	assert_eq!(order.buyer, buyer());
	assert_eq!(order.seller, seller());
	assert_eq!(order.fiat_amount, Decimal::from(10000));
	assert_eq!(order.price, Decimal::new(26050, 2));
	assert_eq!(order.asset_amount, "38.38771593".parse::<Decimal>().unwrap());
	assert_eq!(order.expires_at, order.created_at + Duration::minutes(30));

	let order = f
		.engine
		.mark_paid(&order.id, &buyer(), "ref-123")
		.await
		.unwrap();
	assert_eq!(order.status, OrderStatus::Paid);
	assert_eq!(order.payment_reference.as_deref(), Some("ref-123"));

	let order = f.engine.release(&order.id, &seller()).await.unwrap();
	assert_eq!(order.status, OrderStatus::Released);
	assert_eq!(order.sequence, 3);

	let err = f.engine.cancel(&order.id, &buyer()).await.unwrap_err();
	assert!(matches!(
		err,
		EscrowError::InvalidState {
			status: OrderStatus::Released,
			..
		}
	));
}

#[tokio::test]
async fn test_history_records_every_transition() {
	let f = fixture().await;
	let order = paid_order(&f).await;
	let order = f.engine.cancel(&order.id, &seller()).await.unwrap();

	let steps: Vec<_> = order.history.iter().map(|c| (c.from, c.to)).collect();
	assert_eq!(
		steps,
		vec![
			(None, OrderStatus::Pending),
			(Some(OrderStatus::Pending), OrderStatus::Paid),
			(Some(OrderStatus::Paid), OrderStatus::Cancelled),
		]
	);
	assert_eq!(order.history[1].actor, Actor::Party(buyer()));
	assert_eq!(order.history[2].actor, Actor::Party(seller()));
}

#[tokio::test]
async fn test_mark_paid_twice_is_rejected() {
	let f = fixture().await;
	let order = paid_order(&f).await;

	let err = f
		.engine
		.mark_paid(&order.id, &buyer(), "ref-123")
		.await
		.unwrap_err();
	assert!(matches!(
		err,
		EscrowError::InvalidState {
			status: OrderStatus::Paid,
			..
		}
	));

	let err = f
		.engine
		.mark_paid(&order.id, &buyer(), "ref-999")
		.await
		.unwrap_err();
	assert_eq!(err.code(), "INVALID_STATE");

	let stored = f.engine.get_order(&order.id, &buyer()).await.unwrap();
	assert_eq!(stored.payment_reference.as_deref(), Some("ref-123"));
	assert_eq!(stored.sequence, 2);
}

#[tokio::test]
async fn test_amount_outside_bounds_creates_nothing() {
	let f = fixture().await;

	for amount in [Decimal::new(499999, 2), Decimal::new(25000001, 2), Decimal::ZERO] {
		let err = f
			.engine
			.create_order(&order_request(&f.offer.id, amount), &buyer())
			.await
			.unwrap_err();
		assert!(matches!(err, EscrowError::InvalidAmount(_)), "{}", amount);
	}
	assert!(f.engine.list_orders(&buyer()).await.unwrap().is_empty());

	// bounds are inclusive
	for amount in [Decimal::from(5000), Decimal::from(250000)] {
		f.engine
			.create_order(&order_request(&f.offer.id, amount), &buyer())
			.await
			.unwrap();
	}
}

#[tokio::test]
async fn test_create_order_rejections() {
	let f = fixture().await;

	let err = f
		.engine
		.create_order(&order_request("missing", Decimal::from(10000)), &buyer())
		.await
		.unwrap_err();
	assert!(matches!(err, EscrowError::NotFound(_)));

	let err = f
		.engine
		.create_order(&order_request(&f.offer.id, Decimal::from(10000)), &seller())
		.await
		.unwrap_err();
	assert!(matches!(err, EscrowError::SelfTrade));

	f.engine
		.offers()
		.set_status(&f.offer.id, &seller(), OfferStatus::Paused)
		.await
		.unwrap();
	let err = f
		.engine
		.create_order(&order_request(&f.offer.id, Decimal::from(10000)), &buyer())
		.await
		.unwrap_err();
	assert!(matches!(err, EscrowError::OfferUnavailable(_)));
}

#[tokio::test]
async fn test_buy_offer_makes_taker_the_seller() {
	let f = fixture().await;
	let offer = f
		.engine
		.offers()
		.create(&buyer(), offer_request(OfferDirection::Buy, vec![]))
		.await
		.unwrap();

	let order = f
		.engine
		.create_order(&order_request(&offer.id, Decimal::from(10000)), &seller())
		.await
		.unwrap();
	assert_eq!(order.buyer, buyer());
	assert_eq!(order.seller, seller());
}

#[tokio::test]
async fn test_price_is_frozen_at_creation() {
	let f = fixture().await;
	let order = pending_order(&f).await;

	f.engine
		.offers()
		.update(
			&f.offer.id,
			&seller(),
			UpdateOfferRequest {
				price: Some(Decimal::from(300)),
				..Default::default()
			},
		)
		.await
		.unwrap();

	let stored = f.engine.get_order(&order.id, &buyer()).await.unwrap();
	assert_eq!(stored.price, Decimal::new(26050, 2));
	assert_eq!(stored.asset_amount, order.asset_amount);
}

#[tokio::test]
async fn test_payment_method_binding() {
	let f = fixture().await;
	let method = f
		.engine
		.payment_methods()
		.create(
			&seller(),
			CreatePaymentMethodRequest {
				kind: PaymentMethodKind::MobileMoney,
				label: "MoMo".into(),
				details: serde_json::Value::Null,
			},
		)
		.await
		.unwrap();
	let offer = f
		.engine
		.offers()
		.create(&seller(), offer_request(OfferDirection::Sell, vec![method.id.clone()]))
		.await
		.unwrap();

	let mut request = order_request(&offer.id, Decimal::from(10000));
	request.payment_method_id = Some("not-accepted".into());
	let err = f.engine.create_order(&request, &buyer()).await.unwrap_err();
	assert!(matches!(err, EscrowError::InvalidReference(_)));

	// the only accepted method is bound implicitly
	let order = f
		.engine
		.create_order(&order_request(&offer.id, Decimal::from(10000)), &buyer())
		.await
		.unwrap();
	assert_eq!(order.payment_method_id.as_deref(), Some(method.id.as_str()));

	// mobile money references are alphanumeric only
	let err = f
		.engine
		.mark_paid(&order.id, &buyer(), "ref-123")
		.await
		.unwrap_err();
	assert!(matches!(err, EscrowError::InvalidReference(_)));
	let err = f
		.engine
		.mark_paid(&order.id, &buyer(), "   ")
		.await
		.unwrap_err();
	assert!(matches!(err, EscrowError::InvalidReference(_)));

	let order = f
		.engine
		.mark_paid(&order.id, &buyer(), " MP240101ABC ")
		.await
		.unwrap();
	assert_eq!(order.payment_reference.as_deref(), Some("MP240101ABC"));
}

#[tokio::test]
async fn test_only_permitted_parties_transition() {
	let f = fixture().await;
	let order = pending_order(&f).await;
	let stranger = Identity::from("mallory");

	let err = f
		.engine
		.mark_paid(&order.id, &seller(), "ref-123")
		.await
		.unwrap_err();
	assert!(matches!(err, EscrowError::Forbidden(_)));
	let err = f
		.engine
		.mark_paid(&order.id, &stranger, "ref-123")
		.await
		.unwrap_err();
	assert!(matches!(err, EscrowError::Forbidden(_)));
	let err = f.engine.cancel(&order.id, &stranger).await.unwrap_err();
	assert!(matches!(err, EscrowError::Forbidden(_)));

	let order = f
		.engine
		.mark_paid(&order.id, &buyer(), "ref-123")
		.await
		.unwrap();
	let err = f.engine.release(&order.id, &buyer()).await.unwrap_err();
	assert!(matches!(err, EscrowError::Forbidden(_)));

	let err = f.engine.get_order(&order.id, &stranger).await.unwrap_err();
	assert!(matches!(err, EscrowError::Forbidden(_)));
	let resolver_view = f
		.engine
		.get_order(&order.id, &Identity::from("support-admin"))
		.await
		.unwrap();
	assert_eq!(resolver_view.status, OrderStatus::Paid);
}

#[tokio::test]
async fn test_release_requires_paid() {
	let f = fixture().await;
	let order = pending_order(&f).await;

	let err = f.engine.release(&order.id, &seller()).await.unwrap_err();
	assert!(matches!(
		err,
		EscrowError::InvalidState {
			status: OrderStatus::Pending,
			..
		}
	));
	assert_eq!(err.to_string(), "cannot release an order that is pending");
}

#[tokio::test]
async fn test_sweep_expires_overdue_pending_orders() {
	let f = fixture().await;
	let order = pending_order(&f).await;
	let paid = paid_order(&f).await;

	f.clock.set(order.expires_at + Duration::seconds(1));
	let expired = f.engine.expire_sweep(f.clock.now()).await.unwrap();
	assert_eq!(expired, 1);

	let stored = f.engine.get_order(&order.id, &buyer()).await.unwrap();
	assert_eq!(stored.status, OrderStatus::Expired);
	assert_eq!(stored.history.last().unwrap().actor, Actor::System);

	let err = f
		.engine
		.mark_paid(&order.id, &buyer(), "ref-123")
		.await
		.unwrap_err();
	assert!(matches!(err, EscrowError::Expired(_)));

	// a claimed payment is never expired
	let stored = f.engine.get_order(&paid.id, &buyer()).await.unwrap();
	assert_eq!(stored.status, OrderStatus::Paid);
	assert_eq!(f.engine.expire_sweep(f.clock.now()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_sweep_before_deadline_does_nothing() {
	let f = fixture().await;
	let order = pending_order(&f).await;

	f.clock.set(order.expires_at - Duration::seconds(1));
	assert_eq!(f.engine.expire_sweep(f.clock.now()).await.unwrap(), 0);
	let stored = f.engine.get_order(&order.id, &buyer()).await.unwrap();
	assert_eq!(stored.status, OrderStatus::Pending);
}

#[tokio::test]
async fn test_overdue_order_expires_on_access() {
	let f = fixture().await;
	let order = pending_order(&f).await;

	f.clock.set(order.expires_at);
	let err = f
		.engine
		.mark_paid(&order.id, &buyer(), "ref-123")
		.await
		.unwrap_err();
	assert!(matches!(err, EscrowError::Expired(_)));
	assert_eq!(err.code(), "ORDER_EXPIRED");

	let err = f.engine.cancel(&order.id, &seller()).await.unwrap_err();
	assert!(matches!(
		err,
		EscrowError::InvalidState {
			status: OrderStatus::Expired,
			..
		}
	));

	let listed = f.engine.list_orders(&buyer()).await.unwrap();
	assert_eq!(listed.len(), 1);
	assert_eq!(listed[0].status, OrderStatus::Expired);
	// expired exactly once
	assert_eq!(listed[0].sequence, 2);
}

#[tokio::test]
async fn test_dispute_blocks_party_transitions() {
	let f = fixture().await;
	let order = paid_order(&f).await;

	let (order, dispute) = f
		.engine
		.open_dispute(&order.id, &buyer(), "Seller is not responding", None)
		.await
		.unwrap();
	assert_eq!(order.status, OrderStatus::Disputed);
	assert_eq!(dispute.status, DisputeStatus::Open);
	assert_eq!(dispute.raised_by, buyer());

	let err = f.engine.release(&order.id, &seller()).await.unwrap_err();
	assert!(matches!(err, EscrowError::Disputed(_)));
	let err = f.engine.cancel(&order.id, &buyer()).await.unwrap_err();
	assert!(matches!(err, EscrowError::Disputed(_)));
	let err = f
		.engine
		.mark_paid(&order.id, &buyer(), "ref-123")
		.await
		.unwrap_err();
	assert!(matches!(err, EscrowError::Disputed(_)));

	let err = f
		.engine
		.open_dispute(&order.id, &seller(), "Buyer never paid", None)
		.await
		.unwrap_err();
	assert!(matches!(err, EscrowError::Conflict(_)));
}

#[tokio::test]
async fn test_disputed_order_is_not_expired() {
	let f = fixture().await;
	let order = pending_order(&f).await;
	f.engine
		.open_dispute(&order.id, &seller(), "Wrong amount", None)
		.await
		.unwrap();

	f.clock.set(order.expires_at + Duration::minutes(5));
	assert_eq!(f.engine.expire_sweep(f.clock.now()).await.unwrap(), 0);
	let stored = f.engine.get_order(&order.id, &seller()).await.unwrap();
	assert_eq!(stored.status, OrderStatus::Disputed);
}

#[tokio::test]
async fn test_blank_dispute_reason_rejected() {
	let f = fixture().await;
	let order = paid_order(&f).await;

	let err = f
		.engine
		.open_dispute(&order.id, &buyer(), "  ", Some("details".into()))
		.await
		.unwrap_err();
	assert!(matches!(err, EscrowError::InvalidInput(_)));

	let stored = f.engine.get_order(&order.id, &buyer()).await.unwrap();
	assert_eq!(stored.status, OrderStatus::Paid);
}

#[tokio::test]
async fn test_resolve_dispute() {
	let f = fixture().await;
	let order = paid_order(&f).await;
	f.engine
		.open_dispute(
			&order.id,
			&seller(),
			"Payment not received",
			Some("Checked twice".into()),
		)
		.await
		.unwrap();

	let err = f
		.engine
		.resolve_dispute(&order.id, &buyer(), DisputeOutcome::FavorBuyer, None)
		.await
		.unwrap_err();
	assert!(matches!(err, EscrowError::Forbidden(_)));
	let err = f
		.engine
		.resolve_dispute(
			&order.id,
			&Identity::from("mallory"),
			DisputeOutcome::FavorBuyer,
			None,
		)
		.await
		.unwrap_err();
	assert!(matches!(err, EscrowError::Forbidden(_)));

	let resolver = Identity::from("support-admin");
	let (order, dispute) = f
		.engine
		.resolve_dispute(
			&order.id,
			&resolver,
			DisputeOutcome::FavorBuyer,
			Some("Bank statement shows no transfer".into()),
		)
		.await
		.unwrap();
	assert_eq!(order.status, OrderStatus::Cancelled);
	assert_eq!(order.history.last().unwrap().actor, Actor::Resolver(resolver.clone()));
	assert_eq!(dispute.status, DisputeStatus::Resolved);
	assert_eq!(dispute.outcome, Some(DisputeOutcome::FavorBuyer));
	assert_eq!(dispute.resolved_by, Some(resolver.clone()));

	// resolved exactly once
	let err = f
		.engine
		.resolve_dispute(&order.id, &resolver, DisputeOutcome::FavorSeller, None)
		.await
		.unwrap_err();
	assert!(matches!(err, EscrowError::NotFound(_)));

	// terminal after resolution, no re-dispute
	let err = f
		.engine
		.open_dispute(&order.id, &buyer(), "Again", None)
		.await
		.unwrap_err();
	assert!(matches!(
		err,
		EscrowError::InvalidState {
			status: OrderStatus::Cancelled,
			..
		}
	));
}

#[tokio::test]
async fn test_resolve_in_favor_of_seller_releases() {
	let f = fixture().await;
	let order = paid_order(&f).await;
	f.engine
		.open_dispute(&order.id, &buyer(), "Asset not delivered", None)
		.await
		.unwrap();

	let (order, _) = f
		.engine
		.resolve_dispute(
			&order.id,
			&Identity::from("support-admin"),
			DisputeOutcome::FavorSeller,
			None,
		)
		.await
		.unwrap();
	assert_eq!(order.status, OrderStatus::Released);
}

#[tokio::test]
async fn test_resolve_without_open_dispute() {
	let f = fixture().await;
	let order = paid_order(&f).await;

	let err = f
		.engine
		.resolve_dispute(
			&order.id,
			&Identity::from("support-admin"),
			DisputeOutcome::FavorSeller,
			None,
		)
		.await
		.unwrap_err();
	assert!(matches!(err, EscrowError::NotFound(_)));
}

#[tokio::test]
async fn test_initiate_payment_leaves_order_pending() {
	let f = fixture().await;
	let order = pending_order(&f).await;

	let reference = f.engine.initiate_payment(&order.id, &buyer()).await.unwrap();
	assert!(reference.as_str().starts_with("mock-"));

	let err = f
		.engine
		.initiate_payment(&order.id, &seller())
		.await
		.unwrap_err();
	assert!(matches!(err, EscrowError::Forbidden(_)));

	let stored = f.engine.get_order(&order.id, &buyer()).await.unwrap();
	assert_eq!(stored.status, OrderStatus::Pending);
	assert_eq!(stored.sequence, 1);
}

#[tokio::test]
async fn test_events_follow_accepted_transitions() {
	let f = fixture().await;
	let mut rx = f.engine.subscribe();

	let order = paid_order(&f).await;
	// rejected attempts publish nothing
	f.engine.cancel(&order.id, &Identity::from("mallory")).await.unwrap_err();
	f.engine.release(&order.id, &seller()).await.unwrap();

	let mut seen = Vec::new();
	for _ in 0..3 {
		let event = rx.recv().await.unwrap();
		assert_eq!(event.order_id, order.id);
		seen.push((event.sequence, event.from, event.to));
	}
	assert_eq!(
		seen,
		vec![
			(1, None, OrderStatus::Pending),
			(2, Some(OrderStatus::Pending), OrderStatus::Paid),
			(3, Some(OrderStatus::Paid), OrderStatus::Released),
		]
	);
	assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_order_subscription_requires_party() {
	use futures::StreamExt;

	let f = fixture().await;
	let order = pending_order(&f).await;

	let denied = f
		.engine
		.subscribe_order(&order.id, &Identity::from("mallory"))
		.await;
	assert!(matches!(denied, Err(EscrowError::Forbidden(_))));

	let mut stream = f.engine.subscribe_order(&order.id, &seller()).await.unwrap();
	f.engine.cancel(&order.id, &buyer()).await.unwrap();

	let event = stream.next().await.unwrap();
	assert_eq!(event.to, OrderStatus::Cancelled);
	assert_eq!(event.sequence, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_release_and_cancel_single_winner() {
	let f = fixture().await;

	for _ in 0..25 {
		let order = paid_order(&f).await;

		let release = {
			let engine = f.engine.clone();
			let id = order.id.clone();
			tokio::spawn(async move { engine.release(&id, &seller()).await })
		};
		let cancel = {
			let engine = f.engine.clone();
			let id = order.id.clone();
			tokio::spawn(async move { engine.cancel(&id, &buyer()).await })
		};
		let (winner, loser) = match (release.await.unwrap(), cancel.await.unwrap()) {
			(Ok(order), Err(e)) | (Err(e), Ok(order)) => (order.status, e),
			other => panic!("expected exactly one winner: {:?}", other),
		};
		// a loser that read before the commit fails its conditional write, one
		// that read after it sees the winner's status
		match &loser {
			EscrowError::Conflict(_) => {},
			EscrowError::InvalidState { status, .. } => assert_eq!(*status, winner),
			other => panic!("unexpected loser error: {:?}", other),
		}
		assert_eq!(APIError::from(loser).status_code(), 409);

		let stored = f.engine.get_order(&order.id, &buyer()).await.unwrap();
		assert_eq!(stored.status, winner);
		let terminal_entries = stored
			.history
			.iter()
			.filter(|change| change.to.is_terminal())
			.count();
		assert_eq!(terminal_entries, 1);
		assert_eq!(stored.sequence, 3);
	}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_disputes_open_once() {
	let f = fixture().await;
	let order = paid_order(&f).await;

	let mut handles = Vec::new();
	for caller in [buyer(), seller(), buyer(), seller()] {
		let engine = f.engine.clone();
		let id = order.id.clone();
		handles.push(tokio::spawn(async move {
			engine.open_dispute(&id, &caller, "Trade stalled", None).await
		}));
	}

	let mut opened = 0;
	for handle in handles {
		match handle.await.unwrap() {
			Ok(_) => opened += 1,
			Err(e) => assert!(matches!(e, EscrowError::Conflict(_)), "{:?}", e),
		}
	}
	assert_eq!(opened, 1);

	let stored = f.engine.get_order(&order.id, &buyer()).await.unwrap();
	assert_eq!(stored.status, OrderStatus::Disputed);
	assert!(f.engine.disputes.open_for_order(&order.id).await.unwrap().is_some());
}

/// Memory storage that delays order reads once armed.
struct SlowOrderReads {
	inner: MemoryStorage,
	gate: Arc<ReadGate>,
}

/// Lets `fast_reads` order reads through, then delays every later one.
struct ReadGate {
	reads: AtomicUsize,
	fast_reads: AtomicUsize,
}

impl ReadGate {
	fn new() -> Self {
		Self {
			reads: AtomicUsize::new(0),
			fast_reads: AtomicUsize::new(usize::MAX),
		}
	}

	fn arm(&self, fast_reads: usize) {
		self.reads.store(0, Ordering::SeqCst);
		self.fast_reads.store(fast_reads, Ordering::SeqCst);
	}

	fn disarm(&self) {
		self.fast_reads.store(usize::MAX, Ordering::SeqCst);
	}
}

#[async_trait::async_trait]
impl StorageInterface for SlowOrderReads {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		if key.starts_with("orders:") {
			let read = self.gate.reads.fetch_add(1, Ordering::SeqCst);
			if read >= self.gate.fast_reads.load(Ordering::SeqCst) {
				tokio::time::sleep(std::time::Duration::from_millis(150)).await;
			}
		}
		self.inner.get_bytes(key).await
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		self.inner.set_bytes(key, value).await
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.inner.delete(key).await
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		self.inner.exists(key).await
	}

	async fn compare_and_swap(
		&self,
		key: &str,
		expected: Option<&[u8]>,
		new: Option<Vec<u8>>,
	) -> Result<bool, StorageError> {
		self.inner.compare_and_swap(key, expected, new).await
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		self.inner.list_keys(prefix).await
	}

	fn config_schema(&self) -> Box<dyn escrow_types::ConfigSchema> {
		self.inner.config_schema()
	}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_abandoned_dispute_request_still_disputes_the_order() {
	let gate = Arc::new(ReadGate::new());
	let f = fixture_on(Box::new(SlowOrderReads {
		inner: MemoryStorage::new(),
		gate: gate.clone(),
	}))
	.await;
	let order = paid_order(&f).await;

	// the caller gives up after the dispute is recorded, while the order
	// transition is still reading
	gate.arm(1);
	let abandoned = tokio::time::timeout(
		std::time::Duration::from_millis(30),
		f.engine
			.open_dispute(&order.id, &buyer(), "Seller unresponsive", None),
	)
	.await;
	assert!(abandoned.is_err());
	gate.disarm();

	let mut status = OrderStatus::Paid;
	for _ in 0..50 {
		status = f.engine.get_order(&order.id, &buyer()).await.unwrap().status;
		if status == OrderStatus::Disputed {
			break;
		}
		tokio::time::sleep(std::time::Duration::from_millis(20)).await;
	}
	assert_eq!(status, OrderStatus::Disputed);
	assert!(f
		.engine
		.disputes
		.open_for_order(&order.id)
		.await
		.unwrap()
		.is_some());

	let (order, dispute) = f
		.engine
		.resolve_dispute(
			&order.id,
			&Identity::from("support-admin"),
			DisputeOutcome::FavorSeller,
			None,
		)
		.await
		.unwrap();
	assert_eq!(order.status, OrderStatus::Released);
	assert_eq!(dispute.status, DisputeStatus::Resolved);
}

#[tokio::test]
async fn test_subscription_to_finished_order_ends_immediately() {
	use futures::StreamExt;

	let f = fixture().await;
	let order = pending_order(&f).await;
	f.engine.cancel(&order.id, &buyer()).await.unwrap();

	let mut stream = f.engine.subscribe_order(&order.id, &buyer()).await.unwrap();
	assert!(stream.next().await.is_none());
}
