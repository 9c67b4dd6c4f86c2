//! Common types module for the P2P escrow system.
//!
//! This module defines the core data types shared by every escrow component:
//! identities, offers, orders, disputes, payment methods, transition events
//! and the request/response types of the HTTP API.

/// API types for HTTP endpoints and request/response structures.
pub mod api;
/// Dispute records and resolution outcomes.
pub mod dispute;
/// Order transition events published to observers.
pub mod events;
/// Opaque authenticated party identifiers.
pub mod identity;
/// Standing trade intents.
pub mod offer;
/// Escrowed trade instances and their status.
pub mod order;
/// Payment methods and payment references.
pub mod payment;
/// Registry trait for pluggable implementations.
pub mod registry;
/// Storage types for managing persistent data.
pub mod storage;
/// Utility functions for formatting.
pub mod utils;
/// Configuration validation types for ensuring type-safe configurations.
pub mod validation;

// Re-export all types for convenient access
pub use api::*;
pub use dispute::*;
pub use events::*;
pub use identity::*;
pub use offer::*;
pub use order::*;
pub use payment::*;
pub use registry::*;
pub use storage::*;
pub use utils::truncate_id;
pub use validation::*;
