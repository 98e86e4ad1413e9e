//! Random duration generators.
//!
//! Every stochastic quantity in the simulator (travel, filling, emptying)
//! is drawn through a [`TimeDistribution`] from a mean / standard-deviation
//! pair, so the same kernel runs deterministically (mean times), with
//! parameterised noise (uniform), or with a preset noise level that ignores
//! the per-activity deviation.
//!
//! Distributions own their RNG; seeded constructors make replays exact.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Generator of nonnegative random durations.
///
/// # Contract
/// Implementations must reject parameter combinations that could produce a
/// negative duration (panicking, since a negative mean or an oversized
/// deviation is a caller bug the kernel does not recover from).
pub trait TimeDistribution {
    /// Draws a duration with the given mean and standard deviation.
    fn sample(&mut self, mean: f64, sd: f64) -> f64;
}

/// Deterministic distribution: every draw returns the mean.
///
/// Used by controllers that forward-simulate expected behaviour, and by
/// tests that need exact cycle arithmetic.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanTimes;

impl TimeDistribution for MeanTimes {
    fn sample(&mut self, mean: f64, _sd: f64) -> f64 {
        assert!(mean >= 0.0, "negative mean duration: {mean}");
        mean
    }
}

/// Uniform distribution on `mean ± sqrt(3)·sd` (matching the requested
/// standard deviation exactly).
#[derive(Debug)]
pub struct UniformTimes {
    rng: SmallRng,
}

impl UniformTimes {
    /// Creates a generator seeded from the operating system.
    pub fn new() -> Self {
        Self {
            rng: SmallRng::from_os_rng(),
        }
    }

    /// Creates a generator with a fixed seed for reproducible runs.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }
}

impl Default for UniformTimes {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeDistribution for UniformTimes {
    fn sample(&mut self, mean: f64, sd: f64) -> f64 {
        let half_width = 3f64.sqrt() * sd;
        assert!(
            mean - half_width >= 0.0,
            "standard deviation {sd} too large for nonnegative mean {mean}"
        );
        mean + half_width * (2.0 * self.rng.random::<f64>() - 1.0)
    }
}

/// Uniform distribution on `mean·(1 ± noise)`.
///
/// The per-activity standard deviation is ignored; the noise level is fixed
/// at construction. Useful for studying policies under a controlled noise
/// sweep.
#[derive(Debug)]
pub struct PresetUniformTimes {
    noise: f64,
    rng: SmallRng,
}

impl PresetUniformTimes {
    /// Creates a generator with the given relative noise level in `[0, 1)`.
    pub fn new(noise: f64) -> Self {
        Self::with_rng(noise, SmallRng::from_os_rng())
    }

    /// Creates a seeded generator with the given relative noise level.
    pub fn seeded(noise: f64, seed: u64) -> Self {
        Self::with_rng(noise, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(noise: f64, rng: SmallRng) -> Self {
        assert!(
            (0.0..1.0).contains(&noise),
            "noise level must be in [0, 1): {noise}"
        );
        Self { noise, rng }
    }
}

impl TimeDistribution for PresetUniformTimes {
    fn sample(&mut self, mean: f64, _sd: f64) -> f64 {
        let min = mean * (1.0 - self.noise);
        let max = mean * (1.0 + self.noise);
        min + (max - min) * self.rng.random::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_times_returns_mean() {
        let mut tgen = MeanTimes;
        assert_eq!(tgen.sample(5.0, 2.0), 5.0);
        assert_eq!(tgen.sample(0.0, 0.0), 0.0);
    }

    #[test]
    #[should_panic(expected = "negative mean")]
    fn test_mean_times_rejects_negative_mean() {
        MeanTimes.sample(-1.0, 0.0);
    }

    #[test]
    fn test_uniform_times_within_bounds() {
        let mut tgen = UniformTimes::seeded(42);
        let half_width = 3f64.sqrt() * 1.5;
        for _ in 0..1000 {
            let t = tgen.sample(10.0, 1.5);
            assert!(t >= 10.0 - half_width && t <= 10.0 + half_width);
        }
    }

    #[test]
    fn test_uniform_times_zero_sd_is_deterministic() {
        let mut tgen = UniformTimes::seeded(7);
        for _ in 0..10 {
            assert_eq!(tgen.sample(4.0, 0.0), 4.0);
        }
    }

    #[test]
    #[should_panic(expected = "too large")]
    fn test_uniform_times_rejects_oversized_sd() {
        // sqrt(3) * 2 > 3, so draws could go negative.
        UniformTimes::seeded(1).sample(3.0, 2.0);
    }

    #[test]
    fn test_uniform_times_seed_reproducible() {
        let mut a = UniformTimes::seeded(99);
        let mut b = UniformTimes::seeded(99);
        for _ in 0..20 {
            assert_eq!(a.sample(10.0, 2.0), b.sample(10.0, 2.0));
        }
    }

    #[test]
    fn test_preset_uniform_within_bounds() {
        let mut tgen = PresetUniformTimes::seeded(0.2, 42);
        for _ in 0..1000 {
            let t = tgen.sample(10.0, 99.0);
            assert!((8.0..=12.0).contains(&t));
        }
    }

    #[test]
    #[should_panic(expected = "noise level")]
    fn test_preset_uniform_rejects_bad_noise() {
        PresetUniformTimes::new(1.5);
    }
}
