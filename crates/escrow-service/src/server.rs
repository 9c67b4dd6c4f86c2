//! HTTP server for the escrow API.
//!
//! Routes every request to the engine with the caller identity resolved
//! from the configured header.

use crate::apis::{dispute, events, offer, order, payment_method};
use axum::{
	extract::DefaultBodyLimit,
	http::{HeaderName, HeaderValue, Method},
	routing::{delete, get, post},
	Router,
};
use escrow_config::{ApiConfig, CorsConfig};
use escrow_core::EscrowEngine;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	/// Reference to the escrow engine for processing requests.
	pub engine: Arc<EscrowEngine>,
	/// Header carrying the caller identity.
	pub identity_header: HeaderName,
}

/// Starts the HTTP server for the API.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<EscrowEngine>,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(&api_config, engine)?;

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Escrow API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

/// Builds the router with every route under `/api`.
pub fn router(
	api_config: &ApiConfig,
	engine: Arc<EscrowEngine>,
) -> Result<Router, Box<dyn std::error::Error>> {
	let identity_header = HeaderName::from_bytes(api_config.identity_header.as_bytes())?;
	let cors = cors_layer(api_config.cors.as_ref(), &identity_header)?;

	let state = AppState {
		engine,
		identity_header,
	};

	let api = Router::new()
		.route(
			"/payment-methods",
			post(payment_method::create).get(payment_method::list),
		)
		.route("/payment-methods/{id}", delete(payment_method::deactivate))
		.route("/offers", post(offer::create).get(offer::list))
		.route("/offers/{id}", get(offer::get).patch(offer::update))
		.route("/offers/{id}/status", post(offer::set_status))
		.route("/orders", post(order::create).get(order::list))
		.route("/orders/{id}", get(order::get))
		.route("/orders/{id}/payment", post(order::initiate_payment))
		.route("/orders/{id}/paid", post(order::mark_paid))
		.route("/orders/{id}/release", post(order::release))
		.route("/orders/{id}/cancel", post(order::cancel))
		.route("/orders/{id}/dispute", post(dispute::open))
		.route("/orders/{id}/dispute/resolve", post(dispute::resolve))
		.route("/orders/{id}/events", get(events::order))
		.route("/events", get(events::all));

	Ok(Router::new()
		.nest("/api", api)
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(cors)
				.layer(TimeoutLayer::new(Duration::from_secs(
					api_config.timeout_seconds,
				)))
				.layer(DefaultBodyLimit::max(api_config.max_request_size)),
		)
		.with_state(state))
}

/// Builds the CORS layer; permissive when no CORS section is configured.
fn cors_layer(
	cors: Option<&CorsConfig>,
	identity_header: &HeaderName,
) -> Result<CorsLayer, Box<dyn std::error::Error>> {
	let Some(cors) = cors else {
		return Ok(CorsLayer::permissive());
	};

	let origins = cors
		.allowed_origins
		.iter()
		.map(|origin| HeaderValue::from_str(origin))
		.collect::<Result<Vec<_>, _>>()?;
	let methods = cors
		.allowed_methods
		.iter()
		.map(|method| Method::from_bytes(method.as_bytes()))
		.collect::<Result<Vec<_>, _>>()?;
	let mut headers = cors
		.allowed_headers
		.iter()
		.map(|header| HeaderName::from_bytes(header.as_bytes()))
		.collect::<Result<Vec<_>, _>>()?;
	if !headers.contains(identity_header) {
		headers.push(identity_header.clone());
	}

	Ok(CorsLayer::new()
		.allow_origin(AllowOrigin::list(origins))
		.allow_methods(AllowMethods::list(methods))
		.allow_headers(AllowHeaders::list(headers)))
}
