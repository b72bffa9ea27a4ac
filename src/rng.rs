//! Seed Streams
//!
//! Stochastic operators (the noise generators) each receive a fixed seed
//! at lowering time so a compiled program renders identically on every
//! run. The stream behind those seeds is a Xorshift128+ generator: fast,
//! a 2^128 - 1 period, and more than good enough for decorrelating noise
//! voices. One stream is created per compile from an injectable 64-bit
//! seed; when the caller provides none, entropy comes from `rand`.

/// A seedable Xorshift128+ generator.
#[derive(Debug, Clone, Copy)]
pub struct SeedStream {
    s0: u64,
    s1: u64,
}

impl SeedStream {
    /// Create a stream from raw state. The states may not both be zero.
    #[inline]
    pub const fn from_state(s0: u64, s1: u64) -> Self {
        let s0 = if s0 == 0 && s1 == 0 { 1 } else { s0 };
        Self { s0, s1 }
    }

    /// Create a stream from a single 64-bit seed, split into state by a
    /// splitmix64 round per half.
    #[inline]
    pub fn from_seed(seed: u64) -> Self {
        let s0 = splitmix64(seed);
        let s1 = splitmix64(seed.wrapping_add(0x9e3779b97f4a7c15));
        Self::from_state(s0, s1)
    }

    /// Next raw 64-bit value.
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        let s0 = self.s0;
        let mut s1 = self.s1;
        let result = s0.wrapping_add(s1);

        s1 ^= s0;
        self.s0 = s0.rotate_left(24) ^ s1 ^ (s1 << 16);
        self.s1 = s1.rotate_left(37);

        result
    }

    /// Next operator seed (upper half of the raw value).
    #[inline]
    pub fn next_seed(&mut self) -> u32 {
        (self.next_u64() >> 32) as u32
    }
}

impl Default for SeedStream {
    fn default() -> Self {
        Self::from_seed(rand::random::<u64>())
    }
}

/// Splitmix64 mixing round for deriving state from seeds.
#[inline]
fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e3779b97f4a7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d049bb133111eb);
    x ^ (x >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deterministic_under_same_seed() {
        let mut a = SeedStream::from_seed(12345);
        let mut b = SeedStream::from_seed(12345);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn test_different_seeds_diverge() {
        let mut a = SeedStream::from_seed(12345);
        let mut b = SeedStream::from_seed(54321);
        assert_ne!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn test_zero_state_handled() {
        let mut s = SeedStream::from_state(0, 0);
        // Must not get stuck at zero.
        assert_ne!(s.next_u64(), s.next_u64());
    }

    #[test]
    fn test_seed_stream_varies() {
        let mut s = SeedStream::from_seed(42);
        let seeds: Vec<u32> = (0..8).map(|_| s.next_seed()).collect();
        let mut unique = seeds.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), seeds.len());
    }
}
