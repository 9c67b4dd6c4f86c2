//! Core escrow engine for the P2P escrow system.
//!
//! The engine creates orders against offers and owns every later status
//! change. Status changes are conditional writes keyed on the status the
//! caller observed, so concurrent requests on one order never both win.
//! Payment references are checked by the payment binding before they are
//! bound, disputes are recorded by the dispute service, and every accepted
//! transition is published on the event bus.

pub mod builder;
pub mod clock;
pub mod disputes;
pub mod engine;
pub mod error;
pub mod event_bus;
pub mod offers;
pub mod payment_methods;
pub mod state;

pub use builder::{BuilderError, EscrowBuilder, EscrowFactories};
pub use clock::{Clock, SystemClock};
pub use engine::EscrowEngine;
pub use error::EscrowError;
pub use event_bus::EventBus;

#[cfg(any(test, feature = "testing"))]
pub use clock::ManualClock;
