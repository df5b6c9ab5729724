//! Random-number strategy for the engine.
//!
//! Engine internals never touch an ambient random source directly;
//! they draw from an injected [`Entropy`] strategy. The seeded
//! generator is a Mulberry32, chosen for a stable 32-bit output
//! sequence for a given seed across platforms and runs.

use rand::RngCore;

/// Deterministic 32-bit generator (Mulberry32).
///
/// The same seed produces the same output sequence on every platform,
/// which is what makes seeded field omission reproducible.
#[derive(Debug, Clone)]
pub struct Mulberry32 {
    state: u32,
}

impl Mulberry32 {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }
}

impl RngCore for Mulberry32 {
    fn next_u32(&mut self) -> u32 {
        self.state = self.state.wrapping_add(0x6D2B_79F5);
        let mut z = self.state;
        z = (z ^ (z >> 15)).wrapping_mul(z | 1);
        z ^= z.wrapping_add((z ^ (z >> 7)).wrapping_mul(z | 61));
        z ^ (z >> 14)
    }

    fn next_u64(&mut self) -> u64 {
        let hi = self.next_u32() as u64;
        let lo = self.next_u32() as u64;
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.next_u32().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

/// Source of generators for draws that have no configured seed.
///
/// Production uses [`ThreadEntropy`]; tests inject [`SeededEntropy`]
/// so every draw is reproducible.
pub trait Entropy: Send + Sync {
    fn rng(&self) -> Box<dyn RngCore>;
}

/// Ambient entropy backed by `rand::thread_rng`.
#[derive(Debug, Default)]
pub struct ThreadEntropy;

impl Entropy for ThreadEntropy {
    fn rng(&self) -> Box<dyn RngCore> {
        Box::new(rand::thread_rng())
    }
}

/// Fixed-seed entropy; every `rng()` call starts the same sequence.
#[derive(Debug)]
pub struct SeededEntropy {
    seed: u32,
}

impl SeededEntropy {
    pub fn new(seed: u32) -> Self {
        Self { seed }
    }
}

impl Entropy for SeededEntropy {
    fn rng(&self) -> Box<dyn RngCore> {
        Box::new(Mulberry32::new(self.seed))
    }
}

/// Draw a percentage in `0..100` and compare against a 0-100 rate.
pub fn draw_percent(rng: &mut dyn RngCore, rate: u8) -> bool {
    (rng.next_u32() % 100) < rate as u32
}
