//! State management for the escrow engine.
//!
//! Order status changes are only ever applied through [`OrderStateMachine`].

pub mod order;

pub use order::{OrderStateError, OrderStateMachine};
