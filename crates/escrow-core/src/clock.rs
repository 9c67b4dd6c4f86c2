//! Time source for the engine.
//!
//! Expiry is decided against [`Clock::now`], so tests can move time without
//! sleeping.

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
	fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> DateTime<Utc> {
		Utc::now()
	}
}

/// Manually driven clock for tests.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug)]
pub struct ManualClock {
	now: std::sync::Mutex<DateTime<Utc>>,
}

#[cfg(any(test, feature = "testing"))]
impl ManualClock {
	pub fn new(start: DateTime<Utc>) -> Self {
		Self {
			now: std::sync::Mutex::new(start),
		}
	}

	pub fn advance(&self, by: chrono::Duration) {
		let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
		*now += by;
	}

	pub fn set(&self, at: DateTime<Utc>) {
		*self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
	}
}

#[cfg(any(test, feature = "testing"))]
impl Clock for ManualClock {
	fn now(&self) -> DateTime<Utc> {
		*self.now.lock().unwrap_or_else(|e| e.into_inner())
	}
}
