//! Deterministic utilities for reproducible training
//!
//! Provides a seeded RNG, seeded permutations and the split tie-breaker so
//! the same data and seed always give the same split and the same forest,
//! on every platform.

/// SplitMix64 generator; the output stream depends only on the seed
#[derive(Clone, Debug)]
pub struct SeededRng {
    state: u64,
}

impl SeededRng {
    const GAMMA: u64 = 0x9E37_79B9_7F4A_7C15;

    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(Self::GAMMA);
        mix64(self.state)
    }

    /// Uniform value in `[0, bound)`; `bound` must be non-zero
    pub fn next_below(&mut self, bound: u64) -> u64 {
        debug_assert!(bound > 0);
        // Rejection sampling keeps the result unbiased for any bound
        let zone = u64::MAX - (u64::MAX % bound);
        loop {
            let value = self.next_u64();
            if value < zone {
                return value % bound;
            }
        }
    }

    pub fn next_index(&mut self, len: usize) -> usize {
        self.next_below(len as u64) as usize
    }

    /// Uniform value in `[0.0, 1.0)`
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// In-place Fisher–Yates shuffle
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.next_index(i + 1);
            items.swap(i, j);
        }
    }
}

fn mix64(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Seeded permutation of `0..n`
pub fn permutation(n: usize, seed: u64) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..n).collect();
    SeededRng::new(seed).shuffle(&mut indices);
    indices
}

/// Independent stream seed for component `index` under `base`
pub fn derive_seed(base: u64, index: u64) -> u64 {
    mix64(base ^ mix64(index.wrapping_add(1)))
}

/// Deterministic tie-breaker for split selection.
///
/// Among equally good splits the lowest feature index wins, then the
/// lowest threshold position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SplitTieBreaker {
    pub feature_idx: usize,
    pub position: usize,
}

impl SplitTieBreaker {
    pub fn new(feature_idx: usize, position: usize) -> Self {
        Self {
            feature_idx,
            position,
        }
    }
}
