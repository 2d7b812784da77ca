//! Exponential backoff with jitter for retryable transport failures.

// crates.io
use rand::Rng;
// self
use crate::_prelude::*;

/// Base delay; also the width of the uniform jitter window.
pub const BASE: Duration = Duration::from_millis(500);
/// Upper bound on the deterministic part of the delay.
pub const CAP: Duration = Duration::from_secs(30);

/// Deterministic part of the delay: `min(CAP, BASE * 2^attempt)`.
pub fn exponential_delay(attempt: u32) -> Duration {
	let base_ms = BASE.as_millis() as u64;
	let cap_ms = CAP.as_millis() as u64;
	let delay_ms = base_ms.saturating_mul(2_u64.saturating_pow(attempt)).min(cap_ms);

	Duration::from_millis(delay_ms)
}

/// Full delay for the given attempt: the deterministic part plus a uniform
/// jitter in `[0, BASE)` to avoid synchronized retry storms.
pub fn backoff_with_jitter(attempt: u32) -> Duration {
	let jitter_ms = rand::rng().random_range(0..BASE.as_millis() as u64);

	exponential_delay(attempt) + Duration::from_millis(jitter_ms)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn exponential_part_doubles_until_the_cap() {
		assert_eq!(exponential_delay(0), Duration::from_millis(500));
		assert_eq!(exponential_delay(1), Duration::from_millis(1_000));
		assert_eq!(exponential_delay(2), Duration::from_millis(2_000));
		assert_eq!(exponential_delay(6), Duration::from_millis(30_000));
		assert_eq!(exponential_delay(7), CAP);
		// Large attempt counts must not overflow.
		assert_eq!(exponential_delay(u32::MAX), CAP);
	}

	#[test]
	fn exponential_part_is_monotonic() {
		for attempt in 0..16 {
			assert!(exponential_delay(attempt) <= exponential_delay(attempt + 1));
		}
	}

	#[test]
	fn jittered_delay_stays_within_the_window() {
		for attempt in 0..10 {
			let floor = exponential_delay(attempt);

			for _ in 0..32 {
				let delay = backoff_with_jitter(attempt);

				assert!(delay >= floor);
				assert!(delay < floor + BASE);
			}
		}
	}
}
