//! Sources of time for the blocking waits of a session.
//!
//! Every wait in this crate (boot settle, post-write settle, read polling and
//! retry delays) is a blocking sleep on the calling thread, performed through
//! a [`Clock`]. Production code uses [`SystemClock`]; tests use a mock clock
//! whose sleeps return immediately and advance virtual time.

use std::time::{Duration, Instant};

/// Types that can tell the time and block the current thread.
pub trait Clock {
	/// The current instant.
	fn now(&self) -> Instant;

	/// Block for `duration`.
	fn sleep(&self, duration: Duration);
}

impl<C: Clock + ?Sized> Clock for &C {
	fn now(&self) -> Instant {
		(**self).now()
	}
	fn sleep(&self, duration: Duration) {
		(**self).sleep(duration);
	}
}

/// The operating system's clock.
#[derive(Debug, Default, Copy, Clone)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> Instant {
		Instant::now()
	}
	fn sleep(&self, duration: Duration) {
		std::thread::sleep(duration);
	}
}

#[cfg(any(test, feature = "mock"))]
#[cfg_attr(all(doc, feature = "doc_cfg"), doc(cfg(feature = "mock")))]
pub use mock::MockClock;

#[cfg(any(test, feature = "mock"))]
mod mock {
	use super::Clock;
	use std::{
		sync::{Arc, Mutex, PoisonError},
		time::{Duration, Instant},
	};

	#[derive(Debug)]
	struct State {
		start: Instant,
		elapsed: Duration,
		sleeps: Vec<Duration>,
	}

	/// A clock for use in tests.
	///
	/// Sleeping returns immediately, advancing the clock by the requested
	/// duration and recording it. Clones share the same time line.
	#[derive(Debug, Clone)]
	pub struct MockClock {
		state: Arc<Mutex<State>>,
	}

	impl MockClock {
		/// Create a new clock starting at the current instant.
		pub fn new() -> Self {
			MockClock {
				state: Arc::new(Mutex::new(State {
					start: Instant::now(),
					elapsed: Duration::ZERO,
					sleeps: Vec::new(),
				})),
			}
		}

		fn with<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
			f(&mut self.state.lock().unwrap_or_else(PoisonError::into_inner))
		}

		/// The total virtual time that has passed.
		pub fn elapsed(&self) -> Duration {
			self.with(|state| state.elapsed)
		}

		/// Every sleep so far, in order.
		pub fn sleeps(&self) -> Vec<Duration> {
			self.with(|state| state.sleeps.clone())
		}

		/// The number of sleeps of exactly `duration`.
		pub fn count_sleeps(&self, duration: Duration) -> usize {
			self.with(|state| state.sleeps.iter().filter(|&&d| d == duration).count())
		}

		/// Forget all recorded sleeps. The time is not reset.
		pub fn clear_sleeps(&self) {
			self.with(|state| state.sleeps.clear());
		}
	}

	impl Default for MockClock {
		fn default() -> Self {
			MockClock::new()
		}
	}

	impl Clock for MockClock {
		fn now(&self) -> Instant {
			self.with(|state| state.start + state.elapsed)
		}
		fn sleep(&self, duration: Duration) {
			self.with(|state| {
				state.elapsed += duration;
				state.sleeps.push(duration);
			});
		}
	}
}
