//! 64-bit Mersenne Twister (MT19937-64) and the deterministic function-key
//! generator built on top of it.
//!
//! Ported from the `bytesflops_pass::MersenneTwister` / `FunctionKeyGen`
//! classes (`lib/bytesflops/MersenneTwister.{h,cpp}`,
//! `lib/bytesflops/FunctionKeyGen.{h,cpp}`), which are themselves a C++ port
//! of Matsumoto and Nishimura's reference `mt19937-64.c`. The recurrence and
//! tempering constants below are taken from that generator verbatim so that
//! two runs seeded the same way produce the same key stream.

use std::hash::{Hash, Hasher};

const NN: usize = 312;
const MM: usize = 156;
const MATRIX_A: u64 = 0xB502_6F5A_A966_19E9;
const UM: u64 = 0xFFFF_FFFF_8000_0000; // most significant 33 bits
const LM: u64 = 0x7FFF_FFFF; // least significant 31 bits

/// A 64-bit Mersenne Twister generator with a 312-word state, matching the
/// original `MersenneTwister` class's default (non-array) seeding path.
#[derive(Clone)]
pub struct Mt19937_64 {
    state: Box<[u64; NN]>,
    next_idx: usize,
}

impl Mt19937_64 {
    /// Seed from a single 64-bit value, mirroring `MersenneTwister(const
    /// Value_t &)`.
    pub fn new(seed: u64) -> Self {
        let mut mt = Mt19937_64 {
            state: Box::new([0u64; NN]),
            next_idx: 0,
        };
        mt.init(seed);
        mt
    }

    fn init(&mut self, seed: u64) {
        self.next_idx = 0;
        self.state[0] = seed;
        for i in 1..NN {
            self.state[i] = 6364136223846793005u64
                .wrapping_mul(self.state[i - 1] ^ (self.state[i - 1] >> 62))
                .wrapping_add(i as u64);
        }
        self.generate_next_set();
    }

    fn generate_next_set(&mut self) {
        const MAG01: [u64; 2] = [0, MATRIX_A];
        let s = &mut self.state;

        let mut i = 0;
        while i < NN - MM {
            let x = (s[i] & UM) | (s[i + 1] & LM);
            s[i] = s[i + MM] ^ (x >> 1) ^ MAG01[(x & 1) as usize];
            i += 1;
        }
        while i < NN - 1 {
            let x = (s[i] & UM) | (s[i + 1] & LM);
            s[i] = s[i + MM - NN] ^ (x >> 1) ^ MAG01[(x & 1) as usize];
            i += 1;
        }
        let x = (s[NN - 1] & UM) | (s[0] & LM);
        s[NN - 1] = s[MM - 1] ^ (x >> 1) ^ MAG01[(x & 1) as usize];
    }

    /// Draw the next 64-bit value and advance the generator, mirroring
    /// `MersenneTwister::next()`.
    pub fn next_u64(&mut self) -> u64 {
        if self.next_idx >= NN {
            self.generate_next_set();
            self.next_idx = 0;
        }
        let mut x = self.state[self.next_idx];
        self.next_idx += 1;

        x ^= (x >> 29) & 0x5555_5555_5555_5555;
        x ^= (x << 17) & 0x71D6_7FFF_EDA6_0000;
        x ^= (x << 37) & 0xFFF7_EEE0_0000_0000;
        x ^= x >> 43;
        x
    }
}

/// Hashes a module identifier the same way `BytesFlops::doInitialization`
/// seeds its key generator (`std::hash<std::string>` over the module's
/// identifier). We use `FxHasher` rather than libstdc++'s hash, since the
/// property that matters — same identifier, same seed, same key stream on a
/// given build of Byfl — doesn't require bit-for-bit parity with the C++
/// hash, only internal determinism.
pub fn hash_module_identifier(module_identifier: &str) -> u64 {
    let mut hasher = rustc_hash::FxHasher::default();
    module_identifier.hash(&mut hasher);
    hasher.finish()
}

/// Generates the stable, module-local 64-bit keys used to identify
/// functions in a Byfl binary output file (spec.md §4.9). One generator is
/// created per module, seeded from that module's identifier, and then asked
/// for one key per instrumented function in declaration order — so
/// recompiling the same source reproduces the same key assignment, and
/// distinct modules overwhelmingly get disjoint key streams.
pub struct FunctionKeyGen {
    rng: Mt19937_64,
}

impl FunctionKeyGen {
    pub fn new(seed: u64) -> Self {
        FunctionKeyGen {
            rng: Mt19937_64::new(seed),
        }
    }

    /// Seeds directly from a module identifier string.
    pub fn for_module(module_identifier: &str) -> Self {
        Self::new(hash_module_identifier(module_identifier))
    }

    pub fn next_key(&mut self) -> u64 {
        self.rng.next_u64()
    }
}
