//! Caching front-end over a DRBG.
//!
//! Small requests are served from a 256-byte cache refilled in one DRBG call;
//! requests of 12 bytes or more bypass the cache. Large requests are split
//! into 4096-byte chunks, with an opportunistic reseed check before each
//! chunk. Consumed cache bytes are zeroed immediately, so the cache never
//! retains output it has already handed out.

use log::warn;
use zeroize::Zeroize;

use crate::drbg::Drbg;
use crate::error::{Result, RngError};

/// Cache capacity in bytes.
pub const CACHE_NBYTES: usize = 256;

/// Requests at or above this length skip the cache.
pub const CACHE_BYPASS_THRESHOLD: usize = 12;

/// Largest slice handed to the DRBG in one call.
pub const MAX_CHUNK_NBYTES: usize = 4096;

/// Seed-fetch attempts before an opportunistic reseed gives up.
pub const MAX_RESEED_RETRIES: usize = 100;

/// Seed length requested from the seed source.
pub const SEED_NBYTES: usize = 64;

/// Provider of reseed demand and seed material for opportunistic reseeds.
pub trait SeedSource {
    /// Whether the generator should reseed before its next output. Reading
    /// the demand may clear it.
    fn needs_reseed(&mut self) -> bool;

    /// Try to produce `nbytes` of seed material. `None` means none is
    /// available right now.
    fn get_seed(&mut self, nbytes: usize) -> Option<Vec<u8>>;
}

/// DRBG front-end with an output cache and scheduled-reseed integration.
pub struct CryptoRng<D> {
    drbg: D,
    cache: [u8; CACHE_NBYTES],
    /// Offset of the first unconsumed cache byte; `CACHE_NBYTES` when empty.
    cache_pos: usize,
}

impl<D: Drbg> CryptoRng<D> {
    /// Wrap a freshly seeded DRBG. The cache starts empty.
    pub fn new(drbg: D) -> Self {
        Self {
            drbg,
            cache: [0u8; CACHE_NBYTES],
            cache_pos: CACHE_NBYTES,
        }
    }

    /// Reseed the DRBG directly and invalidate the cache.
    pub fn reseed(&mut self, seed: &[u8], nonce: &[u8]) -> Result<()> {
        self.drbg.reseed(seed, nonce)?;
        self.cache.zeroize();
        self.cache_pos = CACHE_NBYTES;
        Ok(())
    }

    /// Reseed from the seed source, without consulting its reseed demand.
    /// Fails if the source has no seed available.
    pub fn force_reseed_with_entropy(
        &mut self,
        seeds: &mut dyn SeedSource,
        nonce: &[u8],
    ) -> Result<()> {
        let mut seed = seeds
            .get_seed(SEED_NBYTES)
            .ok_or(RngError::EntropyExhausted(1))?;
        let result = self.reseed(&seed, nonce);
        seed.zeroize();
        result
    }

    /// Fill `out` with random bytes.
    ///
    /// The whole request either succeeds or fails; on failure `out` is
    /// zeroed. Cache use is decided once per request: short requests are
    /// served from the cache, and every chunk of a cached request stays
    /// cached.
    pub fn generate(&mut self, out: &mut [u8], seeds: &mut dyn SeedSource) -> Result<()> {
        let bypass = out.len() >= CACHE_BYPASS_THRESHOLD;
        let total = out.len();
        let mut pos = 0;

        while pos < total {
            if seeds.needs_reseed() {
                if let Err(err) = self.reseed_from_source(seeds) {
                    out.zeroize();
                    return Err(err);
                }
            }
            let take = (total - pos).min(MAX_CHUNK_NBYTES);
            if let Err(err) = self.generate_chunk(&mut out[pos..pos + take], bypass) {
                out.zeroize();
                return Err(err);
            }
            pos += take;
        }
        Ok(())
    }

    /// Serve one chunk, from the cache or straight from the DRBG.
    fn generate_chunk(&mut self, chunk: &mut [u8], bypass: bool) -> Result<()> {
        if bypass || chunk.len() > CACHE_NBYTES {
            return self.drbg.generate(chunk, &[]);
        }

        let available = CACHE_NBYTES - self.cache_pos;
        let from_cache = chunk.len().min(available);
        let (head, tail) = chunk.split_at_mut(from_cache);
        head.copy_from_slice(&self.cache[self.cache_pos..self.cache_pos + from_cache]);
        self.cache[self.cache_pos..self.cache_pos + from_cache].zeroize();
        self.cache_pos += from_cache;

        if !tail.is_empty() {
            // Refill the whole cache in one DRBG call, then serve the rest
            // of the chunk from its front.
            self.drbg.generate(&mut self.cache, &[])?;
            tail.copy_from_slice(&self.cache[..tail.len()]);
            self.cache[..tail.len()].zeroize();
            self.cache_pos = tail.len();
        }
        Ok(())
    }

    /// Opportunistic reseed: poll the seed source up to
    /// [`MAX_RESEED_RETRIES`] times for a 64-byte seed.
    fn reseed_from_source(&mut self, seeds: &mut dyn SeedSource) -> Result<()> {
        for _ in 0..MAX_RESEED_RETRIES {
            if let Some(mut seed) = seeds.get_seed(SEED_NBYTES) {
                let result = self.reseed(&seed, &[]);
                seed.zeroize();
                return result;
            }
        }
        warn!(
            "seed source produced nothing across {} attempts",
            MAX_RESEED_RETRIES
        );
        Err(RngError::EntropyExhausted(MAX_RESEED_RETRIES))
    }
}

impl<D> Drop for CryptoRng<D> {
    fn drop(&mut self) {
        self.cache.zeroize();
    }
}
