//! Offer store.
//!
//! Offers are independent aggregates: changing one never inspects or waits
//! on its orders, and orders copy everything they need at creation. Updates
//! use the same conditional write as orders.

use crate::clock::Clock;
use crate::error::EscrowError;
use crate::payment_methods::PaymentMethodRegistry;
use escrow_storage::{StorageError, StorageService, Versioned};
use escrow_types::{
	truncate_id, validate_offer_terms, CreateOfferRequest, Identity, Offer, OfferStatus,
	StorageKey, UpdateOfferRequest,
};
use std::sync::Arc;
use uuid::Uuid;

pub struct OfferStore {
	storage: Arc<StorageService>,
	payment_methods: Arc<PaymentMethodRegistry>,
	clock: Arc<dyn Clock>,
}

impl OfferStore {
	pub fn new(
		storage: Arc<StorageService>,
		payment_methods: Arc<PaymentMethodRegistry>,
		clock: Arc<dyn Clock>,
	) -> Self {
		Self {
			storage,
			payment_methods,
			clock,
		}
	}

	/// Publishes a new active offer owned by `owner`.
	pub async fn create(
		&self,
		owner: &Identity,
		request: CreateOfferRequest,
	) -> Result<Offer, EscrowError> {
		let asset = normalize_code("asset", &request.asset)?;
		let fiat_currency = normalize_code("fiat currency", &request.fiat_currency)?;
		validate_offer_terms(request.price, request.min_amount, request.max_amount)
			.map_err(EscrowError::InvalidOffer)?;
		let payment_method_ids = self
			.check_payment_methods(owner, request.payment_method_ids)
			.await?;

		let now = self.clock.now();
		let offer = Offer {
			id: Uuid::new_v4().to_string(),
			owner: owner.clone(),
			direction: request.direction,
			asset,
			fiat_currency,
			price: request.price,
			min_amount: request.min_amount,
			max_amount: request.max_amount,
			payment_method_ids,
			terms: request.terms.filter(|t| !t.trim().is_empty()),
			status: OfferStatus::Active,
			created_at: now,
			updated_at: now,
		};
		self.storage
			.insert_if_absent(StorageKey::Offers.as_str(), &offer.id, &offer)
			.await?;

		tracing::info!(
			offer_id = %truncate_id(&offer.id),
			direction = ?offer.direction,
			price = %offer.price,
			"Offer created"
		);
		Ok(offer)
	}

	pub async fn get(&self, offer_id: &str) -> Result<Offer, EscrowError> {
		Ok(self.load(offer_id).await?.value)
	}

	/// Whether the offer currently accepts new orders.
	pub async fn is_active(&self, offer_id: &str) -> Result<bool, EscrowError> {
		Ok(self.get(offer_id).await?.status == OfferStatus::Active)
	}

	/// Active offers, newest first.
	pub async fn list_active(&self) -> Result<Vec<Offer>, EscrowError> {
		let mut offers: Vec<Offer> = self.storage.list(StorageKey::Offers.as_str()).await?;
		offers.retain(|o| o.status == OfferStatus::Active);
		offers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
		Ok(offers)
	}

	/// Changes price, bounds, terms or payment methods. Owner only.
	pub async fn update(
		&self,
		offer_id: &str,
		caller: &Identity,
		request: UpdateOfferRequest,
	) -> Result<Offer, EscrowError> {
		let Versioned {
			value: mut offer,
			revision,
		} = self.load(offer_id).await?;
		ensure_owner(&offer, caller)?;
		if offer.status.is_final() {
			return Err(EscrowError::InvalidOffer(format!(
				"offer {} is {} and can no longer change",
				offer_id, offer.status
			)));
		}

		let price = request.price.unwrap_or(offer.price);
		let min_amount = request.min_amount.unwrap_or(offer.min_amount);
		let max_amount = request.max_amount.unwrap_or(offer.max_amount);
		validate_offer_terms(price, min_amount, max_amount).map_err(EscrowError::InvalidOffer)?;

		if let Some(ids) = request.payment_method_ids {
			offer.payment_method_ids = self.check_payment_methods(caller, ids).await?;
		}
		if let Some(terms) = request.terms {
			offer.terms = Some(terms).filter(|t| !t.trim().is_empty());
		}
		offer.price = price;
		offer.min_amount = min_amount;
		offer.max_amount = max_amount;
		offer.updated_at = self.clock.now();

		self.storage
			.update_if_unchanged(StorageKey::Offers.as_str(), offer_id, &revision, &offer)
			.await?;
		tracing::debug!(offer_id = %truncate_id(offer_id), "Offer updated");
		Ok(offer)
	}

	/// Changes the publication status. Owner only.
	///
	/// `active` and `paused` toggle freely; either can end as `completed` or
	/// `cancelled`, which are final. Setting the current status is a no-op.
	pub async fn set_status(
		&self,
		offer_id: &str,
		caller: &Identity,
		status: OfferStatus,
	) -> Result<Offer, EscrowError> {
		let Versioned {
			value: mut offer,
			revision,
		} = self.load(offer_id).await?;
		ensure_owner(&offer, caller)?;

		if offer.status == status {
			return Ok(offer);
		}
		if offer.status.is_final() {
			return Err(EscrowError::InvalidOffer(format!(
				"offer {} is {} and cannot become {}",
				offer_id, offer.status, status
			)));
		}

		let from = offer.status;
		offer.status = status;
		offer.updated_at = self.clock.now();
		self.storage
			.update_if_unchanged(StorageKey::Offers.as_str(), offer_id, &revision, &offer)
			.await?;

		tracing::info!(
			offer_id = %truncate_id(offer_id),
			from = %from,
			to = %status,
			"Offer status changed"
		);
		Ok(offer)
	}

	async fn load(&self, offer_id: &str) -> Result<Versioned<Offer>, EscrowError> {
		self.storage
			.retrieve_versioned(StorageKey::Offers.as_str(), offer_id)
			.await
			.map_err(|e| match e {
				StorageError::NotFound => EscrowError::not_found("offer", offer_id),
				other => other.into(),
			})
	}

	/// Ensures every payment method exists, is active and belongs to `owner`.
	async fn check_payment_methods(
		&self,
		owner: &Identity,
		mut ids: Vec<String>,
	) -> Result<Vec<String>, EscrowError> {
		ids.sort();
		ids.dedup();
		for id in &ids {
			let method = match self.payment_methods.get(id).await {
				Ok(method) => method,
				Err(EscrowError::NotFound(_)) => {
					return Err(EscrowError::InvalidOffer(format!(
						"payment method {} does not exist",
						id
					)))
				},
				Err(e) => return Err(e),
			};
			if &method.owner != owner || !method.is_active {
				return Err(EscrowError::InvalidOffer(format!(
					"payment method {} is not an active method of the offer owner",
					id
				)));
			}
		}
		Ok(ids)
	}
}

fn ensure_owner(offer: &Offer, caller: &Identity) -> Result<(), EscrowError> {
	if &offer.owner != caller {
		return Err(EscrowError::Forbidden(
			"only the offer owner can change an offer".into(),
		));
	}
	Ok(())
}

fn normalize_code(field: &str, value: &str) -> Result<String, EscrowError> {
	let value = value.trim();
	if value.is_empty() || !value.chars().all(|c| c.is_ascii_alphanumeric()) {
		return Err(EscrowError::InvalidOffer(format!(
			"{} must be a non-empty alphanumeric code",
			field
		)));
	}
	Ok(value.to_ascii_uppercase())
}
