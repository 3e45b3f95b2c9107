//! Stateless hash-based random numbers.
//!
//! Every value is a pure function of `(seed, stream, index)`, so random probe
//! vectors (for example the starting vector of a power iteration) are
//! reproducible for a fixed seed and independent of evaluation order.
//!
//! Uses SplitMix64 as the mixing function and the Box-Muller transform for
//! normally distributed values.

use std::f64::consts::PI;

/// SplitMix64 finaliser.
#[inline]
pub fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e3779b97f4a7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d049bb133111eb);
    x ^ (x >> 31)
}

/// Mix the seed with the stream and element index.
#[inline]
fn combine(seed: u64, stream: u64, index: u64) -> u64 {
    seed ^ stream.wrapping_mul(0x517cc1b727220a95) ^ index.wrapping_mul(0x5851f42d4c957f2d)
}

/// Uniform value in `[0, 1)`.
///
/// ```
/// use linop_core::rng::uniform;
///
/// let value = uniform(42, 0, 7);
/// assert!((0.0..1.0).contains(&value));
/// assert_eq!(uniform(42, 0, 7), value);
/// assert_ne!(uniform(42, 0, 8), value);
/// ```
#[inline]
pub fn uniform(seed: u64, stream: u64, index: u64) -> f64 {
    let hash = splitmix64(combine(seed, stream, index));
    // upper 53 bits fill the f64 mantissa
    (hash >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
}

/// Standard normal value (mean 0, sigma 1).
#[inline]
pub fn gaussian(seed: u64, stream: u64, index: u64) -> f64 {
    let u1 = uniform(seed, stream, index.wrapping_mul(2)).max(1e-300);
    let u2 = uniform(seed, stream, index.wrapping_mul(2).wrapping_add(1));
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// `len` consecutive standard normal values from one stream.
pub fn gaussian_vec(seed: u64, stream: u64, len: usize) -> Vec<f64> {
    (0..len as u64).map(|i| gaussian(seed, stream, i)).collect()
}
