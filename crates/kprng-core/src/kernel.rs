//! Top-level kernel PRNG: a caching CTR-DRBG front-end fed by the Fortuna
//! accumulator, with a SHA-512 bootstrap path for the very first seed.
//!
//! Until the entropy source has delivered 512 samples, refresh ticks are
//! diverted into a running SHA-512 digest instead of the accumulator pools;
//! crossing the threshold latches a reseed demand that the next generate
//! call serves from the digest. After that one-shot bootstrap, refresh ticks
//! drive the accumulator and every scheduled reseed latches a fresh demand.

use log::debug;
use sha2::{Digest, Sha512};

use crate::accumulator::{Diagnostics, EntropyAccumulator};
use crate::crypto_rng::{CryptoRng, SeedSource};
use crate::ctr_drbg::CtrDrbg;
use crate::error::Result;
use crate::source::{EntropyBatch, EntropySource, NonceSource};

/// Personalization label for the output generator: a fixed name plus a
/// one-byte operation code.
const LABEL_INIT_CSPRNG: [u8; 8] = *b"xnuprng\x04";

/// Samples the bootstrap digest must absorb before the first seed is ready.
pub const BOOTSTRAP_NSAMPLES_NEEDED: u64 = 512;

/// One-shot first-seed state: a running digest over every raw sample seen
/// before the threshold.
struct BootstrapState {
    digest: Sha512,
    nsamples: u64,
    first_seed_done: bool,
}

impl BootstrapState {
    fn new() -> Self {
        Self {
            digest: Sha512::new(),
            nsamples: 0,
            first_seed_done: false,
        }
    }

    /// Discard everything absorbed so far. Used on source compromise.
    fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Entropy-source adapter interposed on refresh ticks: during bootstrap it
/// consumes samples into the digest and starves the accumulator; afterwards
/// it is transparent.
struct BootstrapFilter<'a> {
    inner: &'a mut dyn EntropySource,
    bootstrap: &'a mut BootstrapState,
    needreseed: &'a mut bool,
}

impl EntropySource for BootstrapFilter<'_> {
    fn get_entropy(&mut self, nbytes: usize) -> EntropyBatch {
        let batch = self.inner.get_entropy(nbytes);
        match batch {
            EntropyBatch::Compromised => {
                self.bootstrap.reset();
                EntropyBatch::Compromised
            }
            EntropyBatch::Samples {
                nsamples,
                ref bytes,
            } if !self.bootstrap.first_seed_done => {
                self.bootstrap.digest.update(bytes);
                self.bootstrap.nsamples += nsamples;
                if self.bootstrap.nsamples >= BOOTSTRAP_NSAMPLES_NEEDED {
                    self.bootstrap.first_seed_done = true;
                    *self.needreseed = true;
                    debug!("bootstrap digest reached {} samples", self.bootstrap.nsamples);
                }
                EntropyBatch::Pending
            }
            other => other,
        }
    }
}

/// Seed-source adapter for the output generator: serves the bootstrap digest
/// once, then accumulator output.
struct KernelSeedSource<'a> {
    bootstrap: &'a mut BootstrapState,
    accumulator: &'a mut EntropyAccumulator,
    needreseed: &'a mut bool,
}

impl SeedSource for KernelSeedSource<'_> {
    fn needs_reseed(&mut self) -> bool {
        core::mem::take(self.needreseed)
    }

    fn get_seed(&mut self, nbytes: usize) -> Option<Vec<u8>> {
        if self.bootstrap.nsamples >= BOOTSTRAP_NSAMPLES_NEEDED {
            self.bootstrap.nsamples = 0;
            Some(self.bootstrap.digest.clone().finalize().to_vec())
        } else {
            self.accumulator.generate(nbytes).ok()
        }
    }
}

/// The composed kernel PRNG.
pub struct KernelPrng {
    csprng: CryptoRng<CtrDrbg>,
    accumulator: EntropyAccumulator,
    bootstrap: BootstrapState,
    /// Latched reseed demand, read and cleared by the next generate call.
    needreseed: bool,
    source: Box<dyn EntropySource + Send>,
    nonces: Box<dyn NonceSource + Send>,
}

impl KernelPrng {
    /// Instantiate from a boot seed and nonce. Output is available
    /// immediately; its quality rests on the boot seed until the first
    /// entropy-driven reseed.
    pub fn new(
        seed: &[u8],
        nonce: &[u8],
        source: Box<dyn EntropySource + Send>,
        nonces: Box<dyn NonceSource + Send>,
    ) -> Self {
        let drbg = CtrDrbg::new(seed, nonce, &LABEL_INIT_CSPRNG);
        Self {
            csprng: CryptoRng::new(drbg),
            accumulator: EntropyAccumulator::new(),
            bootstrap: BootstrapState::new(),
            needreseed: false,
            source,
            nonces,
        }
    }

    /// One entropy tick. Returns `(did_reseed, nonce)`: whether the
    /// accumulator performed a scheduled reseed, plus the nonce drawn for
    /// the tick. A scheduled reseed latches a demand served by the next
    /// generate call.
    pub fn refresh(&mut self) -> (bool, u64) {
        let mut filter = BootstrapFilter {
            inner: self.source.as_mut(),
            bootstrap: &mut self.bootstrap,
            needreseed: &mut self.needreseed,
        };
        let (did_reseed, nonce) = self.accumulator.refresh(&mut filter, self.nonces.as_mut());
        if did_reseed {
            self.needreseed = true;
        }
        (did_reseed, nonce)
    }

    /// Fill `out` with random bytes, reseeding the output generator first if
    /// a demand is latched.
    pub fn generate(&mut self, out: &mut [u8]) -> Result<()> {
        let mut seeds = KernelSeedSource {
            bootstrap: &mut self.bootstrap,
            accumulator: &mut self.accumulator,
            needreseed: &mut self.needreseed,
        };
        self.csprng.generate(out, &mut seeds)
    }

    /// Caller-supplied reseed of the output generator. A fresh 64-bit nonce
    /// is drawn, mixed in little-endian, and returned.
    pub fn reseed(&mut self, seed: &[u8]) -> Result<u64> {
        let nonce = self.nonces.next_nonce();
        self.csprng.reseed(seed, &nonce.to_le_bytes())?;
        debug!("user reseed of output generator");
        Ok(nonce)
    }

    /// Accumulator diagnostic counters.
    pub fn diagnostics(&self) -> &Diagnostics {
        self.accumulator.diagnostics()
    }
}
