//! Randomized exponential backoff for processors waiting at a [crate::PhaseBarrier].
//!
//! Delays are drawn from a deterministic hash of the waiting processor's id, the round seed and
//! the retry count, so that competing waiters desynchronize without sharing a random number
//! generator.

use crate::sync::pause;
use crate::types::{get_bit_length_of_num_processors, ProcessorId, Seed};

/// Tuning for the barrier's waiting loop.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BackoffConfig {
    /// The seed of the first round. It advances by one every completed round.
    pub initial_seed: Seed,
    /// The cap on a single delay, in nanoseconds.
    pub max_delay_ns: u64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_seed: 42,
            max_delay_ns: 10_000_000,
        }
    }
}

/// The backoff state of one processor waiting for one round to complete.
#[derive(Debug)]
pub(crate) struct Backoff {
    seed: u64,
    tries: u32,
    max_delay_ns: u64,
}

impl Backoff {
    pub(crate) fn new(
        processor: ProcessorId,
        num_processors: usize,
        round_seed: Seed,
        config: &BackoffConfig,
    ) -> Self {
        // the processor id goes into the most significant bits
        let processor_bits: u32 = get_bit_length_of_num_processors(num_processors);
        let processor_part: u64 = (processor as u64)
            .checked_shl(u64::BITS - processor_bits)
            .unwrap_or(0);
        Self {
            seed: processor_part | round_seed,
            tries: 0,
            max_delay_ns: config.max_delay_ns,
        }
    }

    /// The delay before the next retry. The range it is drawn from doubles every retry until it
    /// reaches the configured cap.
    pub(crate) fn next_delay(&mut self) -> u64 {
        let range: u64 = 2u64
            .checked_shl(self.tries)
            .unwrap_or(u64::MAX)
            .min(self.max_delay_ns);
        let delay: u64 = random_range(self.seed, 0, range);
        self.tries = self.tries.saturating_add(1);
        self.seed = self.seed.wrapping_add(1);
        delay
    }

    pub(crate) fn snooze(&mut self) {
        pause(self.next_delay());
    }
}

/// Thomas Wang style 32-bit integer mixer.
fn hash32(a: u32) -> u32 {
    let a = a.wrapping_add(0x7ed55d16).wrapping_add(a << 12);
    let a = (a ^ 0xc761c23c) ^ (a >> 19);
    let a = a.wrapping_add(0x165667b1).wrapping_add(a << 5);
    let a = a.wrapping_add(0xd3a2646c) ^ (a << 9);
    let a = a.wrapping_add(0xfd7046c5).wrapping_add(a << 3);
    (a ^ 0xb55a4f09) ^ (a >> 16)
}

/// Mix both halves of `x` independently.
fn hash64(x: u64) -> u64 {
    let lower: u32 = x as u32;
    let upper: u32 = (x >> 32) as u32;
    (u64::from(hash32(upper)) << 32) | u64::from(hash32(lower))
}

/// A number in `[lo, hi)` derived from `seed`. An empty range is widened to `[lo, lo + 1)`.
///
/// Both halves of the hash are folded together so that small ranges still depend on the processor
/// id held in the upper half of the seed.
fn random_range(seed: u64, lo: u64, hi: u64) -> u64 {
    let hi: u64 = if hi <= lo { lo + 1 } else { hi };
    let hash: u64 = hash64(seed);
    lo + (hash ^ hash.rotate_left(32)) % (hi - lo)
}

#[cfg(test)]
mod tests {
    use crate::backoff::{hash64, random_range, Backoff, BackoffConfig};
    use test_log::test;

    #[test]
    fn test_random_range_stays_in_bounds() {
        for seed in 0..10_000u64 {
            let value: u64 = random_range(seed, 5, 17);
            assert!((5..17).contains(&value));
        }
        assert_eq!(random_range(1234, 8, 8), 8);
        assert_eq!(random_range(1234, 8, 3), 8);
    }

    #[test]
    fn test_hash_is_deterministic_and_mixes() {
        assert_eq!(hash64(42), hash64(42));
        assert_ne!(hash64(42), hash64(43));
        assert_ne!(hash64(1 << 40), hash64(1 << 41));
    }

    #[test]
    fn test_delays_grow_and_are_capped() {
        let config: BackoffConfig = BackoffConfig {
            initial_seed: 42,
            max_delay_ns: 1000,
        };
        let mut backoff: Backoff = Backoff::new(1, 4, config.initial_seed, &config);

        // retry n draws from [0, 2 << n)
        for tries in 0..9u32 {
            assert!(backoff.next_delay() < (2u64 << tries).min(1000));
        }
        for _ in 0..100 {
            assert!(backoff.next_delay() < 1000);
        }
    }

    #[test]
    fn test_processors_draw_different_delays() {
        let config: BackoffConfig = BackoffConfig {
            initial_seed: 7,
            max_delay_ns: u64::MAX,
        };
        let delays = |processor: usize| -> Vec<u64> {
            let mut backoff: Backoff = Backoff::new(processor, 4, config.initial_seed, &config);
            (0..20).map(|_| backoff.next_delay()).collect()
        };

        assert_eq!(delays(2), delays(2));
        assert_ne!(delays(1), delays(2));
    }

    #[test]
    fn test_single_processor_seed_does_not_overflow() {
        let config: BackoffConfig = BackoffConfig::default();
        let mut backoff: Backoff = Backoff::new(0, 1, u64::MAX, &config);
        for _ in 0..200 {
            assert!(backoff.next_delay() < config.max_delay_ns);
        }
    }
}
