//! Caller identity extraction.
//!
//! Authentication happens upstream; this service trusts the identity the
//! authenticating proxy puts in the configured header and resolves it once
//! per request.

use crate::server::AppState;
use axum::{extract::FromRequestParts, http::request::Parts};
use escrow_types::{APIError, Identity};

/// The authenticated identity of the caller.
#[derive(Debug, Clone)]
pub struct Caller(pub Identity);

impl FromRequestParts<AppState> for Caller {
	type Rejection = APIError;

	async fn from_request_parts(
		parts: &mut Parts,
		state: &AppState,
	) -> Result<Self, Self::Rejection> {
		parts
			.headers
			.get(&state.identity_header)
			.and_then(|value| value.to_str().ok())
			.and_then(Identity::new)
			.map(Caller)
			.ok_or_else(|| APIError::Unauthorized {
				error_type: "UNAUTHENTICATED".to_string(),
				message: format!("missing or empty {} header", state.identity_header),
			})
	}
}
