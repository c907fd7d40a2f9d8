//! Park-Miller minimal standard generator (minstd_rand0)
//!
//! Block permutations and intra-block shuffles must be reproducible from a
//! seed alone, so they use this fixed, portable generator instead of a
//! platform-chosen one.

use rand::{Error, RngCore};

const MULTIPLIER: u64 = 16_807;
const MODULUS: u64 = 2_147_483_647;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Minstd {
    state: u32,
}

impl Minstd {
    /// Seed the generator. A seed congruent to zero is mapped to 1.
    pub fn new(seed: u64) -> Self {
        let state = (seed % MODULUS) as u32;
        Minstd {
            state: if state == 0 { 1 } else { state },
        }
    }

    /// Next raw value in `[1, 2^31 - 1)`
    pub fn step(&mut self) -> u32 {
        self.state = ((self.state as u64 * MULTIPLIER) % MODULUS) as u32;
        self.state
    }
}

impl RngCore for Minstd {
    fn next_u32(&mut self) -> u32 {
        // Raw output is 31 bits wide; splice the top 16 bits of two steps.
        let hi = self.step() >> 15;
        let lo = self.step() >> 15;
        (hi << 16) | (lo & 0xFFFF)
    }

    fn next_u64(&mut self) -> u64 {
        ((self.next_u32() as u64) << 32) | self.next_u32() as u64
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.next_u32().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> std::result::Result<(), Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

/// Derive the seed of sub-stream `stream` of `seed`
///
/// SplitMix64 finalizer over both inputs, so neighbouring seeds and streams
/// never alias (`stream_seed(s, 1) != stream_seed(s + 1, 0)`).
pub fn stream_seed(seed: u64, stream: u64) -> u64 {
    let mut z = seed ^ stream.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
