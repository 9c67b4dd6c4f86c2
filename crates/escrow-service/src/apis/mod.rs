//! Handlers for the escrow HTTP API.
//!
//! Each handler resolves the caller, hands the request to the engine and
//! maps engine errors to HTTP responses through `APIError`.

pub mod dispute;
pub mod events;
pub mod offer;
pub mod order;
pub mod payment_method;
