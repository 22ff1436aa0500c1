//! Fortuna-style entropy accumulator.
//!
//! Incoming samples are hashed round-robin into 32 pools. Every 32nd tick a
//! scheduled reseed drains a prefix of the pools — pool `i` participates in
//! every 2^i-th reseed — into a fresh generator key. Output comes from a
//! forward-secure AES-256-CTR keystream that replaces its own key before
//! emitting a single byte, so compromising the state after a call reveals
//! nothing about earlier output.
//!
//! The accumulator only reports itself seeded once a scheduled reseed has
//! drained at least [`SEED_NSAMPLES_THRESHOLD`] cumulative samples, and it
//! hard-resets its schedule and diagnostics when the entropy source signals
//! compromise.

use log::{debug, warn};
use serde::Serialize;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::block;
use crate::error::{Result, RngError};
use crate::source::{EntropyBatch, EntropySource, NonceSource};

/// Number of entropy pools.
pub const NPOOLS: usize = 32;

/// Size of each pool's hash-accumulator value in bytes.
pub const POOL_NBYTES: usize = 32;

/// Upper bound on a single `generate` request.
pub const MAX_GENERATE_NBYTES: usize = 256;

/// Cumulative drained samples a scheduled reseed must carry before the
/// accumulator reports itself seeded.
pub const SEED_NSAMPLES_THRESHOLD: u64 = 1024;

/// Bytes requested from the entropy source on each refresh tick.
const REFRESH_NBYTES: usize = 64;

// Domain-separation labels: a fixed name plus a one-byte operation code.
const LABEL_SCHED_RESEED: [u8; 8] = *b"xnuprng\x02";
const LABEL_ADD_ENTROPY: [u8; 8] = *b"xnuprng\x03";

/// A single accumulator slot: a running SHA-256 value over every sample the
/// pool has received since it was last drained.
#[derive(Clone)]
struct Pool {
    data: [u8; POOL_NBYTES],
}

/// Diagnostic counters for one pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolDiagnostics {
    /// Samples received since the last drain.
    pub nsamples: u64,
    /// Times this pool has been drained by a scheduled reseed.
    pub ndrains: u64,
    /// High-water mark of `nsamples`.
    pub nsamples_max: u64,
}

/// Accumulator-wide diagnostic counters.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    /// Total reseeds of any kind.
    pub nreseeds: u64,
    /// Reseeds requested directly by a user.
    pub userreseed_nreseeds: u64,
    /// Scheduled reseeds.
    pub schedreseed_nreseeds: u64,
    /// Most samples ever drained by one scheduled reseed.
    pub schedreseed_nsamples_max: u64,
    /// Most samples ever delivered in one entropy addition.
    pub addentropy_nsamples_max: u64,
    /// Per-pool counters.
    pub pools: [PoolDiagnostics; NPOOLS],
}

/// Fortuna-style pooling accumulator with a forward-secure output generator.
pub struct EntropyAccumulator {
    key: [u8; 32],
    ctr: [u8; 16],
    pools: [Pool; NPOOLS],
    /// Next pool to receive entropy.
    pool_i: usize,
    /// Monotonic reseed-tick counter; its least-significant set bit picks
    /// how many pools the next scheduled reseed drains.
    schedule: u64,
    seeded: bool,
    diag: Diagnostics,
}

impl EntropyAccumulator {
    pub fn new() -> Self {
        Self {
            key: [0u8; 32],
            ctr: [0u8; 16],
            pools: core::array::from_fn(|_| Pool {
                data: [0u8; POOL_NBYTES],
            }),
            pool_i: 0,
            schedule: 0,
            seeded: false,
            diag: Diagnostics::default(),
        }
    }

    /// Whether a scheduled reseed has carried enough samples for output to
    /// be trusted.
    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diag
    }

    /// Advance the round-robin pool index. When the index wraps, bump the
    /// schedule counter and select the drain prefix for this tick.
    ///
    /// Returns `(pool_in, pool_out)`: the pre-advance index that receives
    /// this tick's entropy, and — on reseed ticks — the 1-indexed
    /// least-significant set bit of the schedule counter, which is the
    /// number of pools to drain.
    fn schedule_tick(&mut self) -> (usize, Option<usize>) {
        let pool_in = self.pool_i;
        self.pool_i = (self.pool_i + 1) % NPOOLS;

        let mut pool_out = None;
        if pool_in == 0 {
            self.schedule += 1;
            pool_out = Some(self.schedule.trailing_zeros() as usize + 1);
        }

        (pool_in, pool_out)
    }

    /// Fold one entropy sample into a pool:
    /// `pool = SHA-256(label ‖ index ‖ pool ‖ nonce ‖ entropy)`.
    fn add_entropy(&mut self, pool_i: usize, nonce: u64, entropy: &[u8], nsamples: u64) {
        let mut h = Sha256::new();
        h.update(LABEL_ADD_ENTROPY);
        h.update((pool_i as u32).to_be_bytes());
        h.update(self.pools[pool_i].data);
        h.update(nonce.to_be_bytes());
        h.update(entropy);
        self.pools[pool_i].data = h.finalize().into();

        let pool_diag = &mut self.diag.pools[pool_i];
        pool_diag.nsamples += nsamples;
        pool_diag.nsamples_max = pool_diag.nsamples_max.max(pool_diag.nsamples);
        self.diag.addentropy_nsamples_max = self.diag.addentropy_nsamples_max.max(nsamples);
    }

    /// Derive a new generator key from the schedule counter, the current
    /// key, and the drained pool prefix `pools[0..pool_out)`. Drained pools
    /// are zeroed and their sample counts folded into the diagnostics.
    fn scheduled_reseed(&mut self, pool_out: usize) {
        let mut h = Sha256::new();
        h.update(LABEL_SCHED_RESEED);
        h.update(self.schedule.to_be_bytes());
        h.update(self.key);

        let mut nsamples = 0u64;
        for (pool, pool_diag) in self
            .pools
            .iter_mut()
            .zip(self.diag.pools.iter_mut())
            .take(pool_out)
        {
            h.update(pool.data);
            pool.data = [0u8; POOL_NBYTES];
            nsamples += pool_diag.nsamples;
            pool_diag.nsamples = 0;
            pool_diag.ndrains += 1;
        }

        self.key = h.finalize().into();
        self.diag.nreseeds += 1;
        self.diag.schedreseed_nreseeds += 1;
        self.diag.schedreseed_nsamples_max = self.diag.schedreseed_nsamples_max.max(nsamples);

        if nsamples >= SEED_NSAMPLES_THRESHOLD {
            self.seeded = true;
        }

        debug!(
            "scheduled reseed: schedule={} drained_pools={} nsamples={}",
            self.schedule, pool_out, nsamples
        );
    }

    /// Hard reset after an entropy-source compromise: the schedule, the pool
    /// index, the seeded flag, and all diagnostics go back to their initial
    /// values. Pool contents and the generator key are left in place; they
    /// are superseded by the next scheduled reseed.
    fn reset(&mut self) {
        warn!("entropy source reported compromise; resetting accumulator schedule");

        self.seeded = false;
        self.diag.nreseeds = 0;
        self.diag.schedreseed_nsamples_max = 0;
        self.diag.addentropy_nsamples_max = 0;
        for pool_diag in self.diag.pools.iter_mut() {
            *pool_diag = PoolDiagnostics::default();
        }
        self.schedule = 0;
        self.pool_i = 0;
    }

    /// One accumulation tick: pull up to 64 bytes from the entropy source
    /// and drive the schedule.
    ///
    /// A 64-bit nonce is drawn on every tick — including no-op and
    /// compromise ticks — and always returned. Returns `(did_reseed, nonce)`.
    pub fn refresh(
        &mut self,
        source: &mut dyn EntropySource,
        nonces: &mut dyn NonceSource,
    ) -> (bool, u64) {
        let batch = source.get_entropy(REFRESH_NBYTES);
        let nonce = nonces.next_nonce();

        match batch {
            EntropyBatch::Samples { nsamples, bytes } if nsamples > 0 => {
                let (pool_in, pool_out) = self.schedule_tick();
                self.add_entropy(pool_in, nonce, &bytes, nsamples);
                if let Some(pool_out) = pool_out {
                    self.scheduled_reseed(pool_out);
                    return (true, nonce);
                }
                (false, nonce)
            }
            EntropyBatch::Compromised => {
                self.reset();
                (false, nonce)
            }
            _ => (false, nonce),
        }
    }

    /// Produce `nbytes` of output from the forward-secure keystream.
    ///
    /// Fails with [`RngError::RequestTooLarge`] past 256 bytes and with
    /// [`RngError::NotSeeded`] until a scheduled reseed has carried enough
    /// samples. No partial output is ever produced.
    pub fn generate(&mut self, nbytes: usize) -> Result<Vec<u8>> {
        if nbytes > MAX_GENERATE_NBYTES {
            return Err(RngError::RequestTooLarge {
                requested: nbytes,
                limit: MAX_GENERATE_NBYTES,
            });
        }
        if !self.seeded {
            return Err(RngError::NotSeeded);
        }
        Ok(self.keystream(nbytes))
    }

    /// The generator function F: run AES-256-CTR from the current counter
    /// block, consume the first 32 keystream bytes as the replacement key
    /// (rekey-before-emit), then emit the next `nbytes`. Afterwards the
    /// 64-bit field at counter-block offsets 4..12 advances by one.
    fn keystream(&mut self, nbytes: usize) -> Vec<u8> {
        let mut stream = vec![0u8; block::KEY_NBYTES + nbytes];
        block::ctr_keystream(&self.key, &self.ctr, &mut stream);

        self.key.copy_from_slice(&stream[..block::KEY_NBYTES]);

        let mut mid = [0u8; 8];
        mid.copy_from_slice(&self.ctr[4..12]);
        let next = u64::from_be_bytes(mid).wrapping_add(1);
        self.ctr[4..12].copy_from_slice(&next.to_be_bytes());
        self.ctr[12..].fill(0);

        let out = stream[block::KEY_NBYTES..].to_vec();
        stream.zeroize();
        out
    }
}

impl Default for EntropyAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EntropyAccumulator {
    fn drop(&mut self) {
        self.key.zeroize();
        self.ctr.zeroize();
        for pool in self.pools.iter_mut() {
            pool.data.zeroize();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // -----------------------------------------------------------------------
    // Scripted sources
    // -----------------------------------------------------------------------

    /// Source that always reports 1024 samples of 0x01 bytes.
    struct OnesSource;

    impl EntropySource for OnesSource {
        fn get_entropy(&mut self, nbytes: usize) -> EntropyBatch {
            EntropyBatch::Samples {
                nsamples: 1024,
                bytes: vec![0x01; nbytes],
            }
        }
    }

    /// Source that replays a fixed script of batches, then goes quiet.
    struct ScriptedSource {
        script: Vec<EntropyBatch>,
        pos: usize,
    }

    impl ScriptedSource {
        fn new(script: Vec<EntropyBatch>) -> Self {
            Self { script, pos: 0 }
        }
    }

    impl EntropySource for ScriptedSource {
        fn get_entropy(&mut self, _nbytes: usize) -> EntropyBatch {
            let batch = self
                .script
                .get(self.pos)
                .cloned()
                .unwrap_or(EntropyBatch::Pending);
            self.pos += 1;
            batch
        }
    }

    /// Nonce source counting up from a fixed start.
    struct CountingNonces(u64);

    impl NonceSource for CountingNonces {
        fn next_nonce(&mut self) -> u64 {
            let n = self.0;
            self.0 += 1;
            n
        }
    }

    // -----------------------------------------------------------------------
    // Schedule
    // -----------------------------------------------------------------------

    #[test]
    fn test_schedule_selects_least_significant_set_bit() {
        let mut acc = EntropyAccumulator::new();
        let mut selected = Vec::new();
        // Four full trips around the pools produce schedule values 1..=4.
        for _ in 0..4 * NPOOLS {
            let (_, pool_out) = acc.schedule_tick();
            if let Some(out) = pool_out {
                selected.push(out);
            }
        }
        assert_eq!(selected, vec![1, 2, 1, 3]);
    }

    #[test]
    fn test_schedule_pool_in_round_robin() {
        let mut acc = EntropyAccumulator::new();
        for expected in 0..NPOOLS {
            let (pool_in, _) = acc.schedule_tick();
            assert_eq!(pool_in, expected);
        }
        let (pool_in, _) = acc.schedule_tick();
        assert_eq!(pool_in, 0);
    }

    // -----------------------------------------------------------------------
    // Seeding
    // -----------------------------------------------------------------------

    #[test]
    fn test_generate_before_seeding_fails() {
        let mut acc = EntropyAccumulator::new();
        assert_eq!(acc.generate(16), Err(RngError::NotSeeded));
    }

    #[test]
    fn test_single_rich_refresh_seeds() {
        let mut acc = EntropyAccumulator::new();
        let (did_reseed, _) = acc.refresh(&mut OnesSource, &mut CountingNonces(0));
        assert!(did_reseed);
        assert!(acc.is_seeded());
        let out = acc.generate(16).unwrap();
        assert_eq!(out.len(), 16);
    }

    #[test]
    fn test_thin_samples_do_not_seed() {
        // 1 sample per tick: the first scheduled reseed drains far fewer
        // than the 1024-sample threshold.
        let mut acc = EntropyAccumulator::new();
        let mut nonces = CountingNonces(0);
        let mut source = ScriptedSource::new(vec![
            EntropyBatch::Samples {
                nsamples: 1,
                bytes: vec![0xaa; 64],
            };
            NPOOLS + 1
        ]);
        for _ in 0..NPOOLS + 1 {
            acc.refresh(&mut source, &mut nonces);
        }
        assert!(acc.diag.schedreseed_nreseeds >= 1);
        assert!(!acc.is_seeded());
        assert_eq!(acc.generate(16), Err(RngError::NotSeeded));
    }

    #[test]
    fn test_generate_request_too_large() {
        let mut acc = EntropyAccumulator::new();
        acc.refresh(&mut OnesSource, &mut CountingNonces(0));
        assert_eq!(
            acc.generate(MAX_GENERATE_NBYTES + 1),
            Err(RngError::RequestTooLarge {
                requested: 257,
                limit: 256
            })
        );
        // The failed call changed nothing; a valid request still works.
        assert_eq!(acc.generate(MAX_GENERATE_NBYTES).unwrap().len(), 256);
    }

    // -----------------------------------------------------------------------
    // Determinism and forward secrecy
    // -----------------------------------------------------------------------

    #[test]
    fn test_identical_scripts_give_identical_output() {
        let mut a = EntropyAccumulator::new();
        let mut b = EntropyAccumulator::new();
        a.refresh(&mut OnesSource, &mut CountingNonces(7));
        b.refresh(&mut OnesSource, &mut CountingNonces(7));
        assert_eq!(a.generate(16).unwrap(), b.generate(16).unwrap());
    }

    #[test]
    fn test_nonce_changes_output() {
        let mut a = EntropyAccumulator::new();
        let mut b = EntropyAccumulator::new();
        a.refresh(&mut OnesSource, &mut CountingNonces(1));
        b.refresh(&mut OnesSource, &mut CountingNonces(2));
        assert_ne!(a.generate(16).unwrap(), b.generate(16).unwrap());
    }

    #[test]
    fn test_generate_rekeys_before_emitting() {
        let mut acc = EntropyAccumulator::new();
        acc.refresh(&mut OnesSource, &mut CountingNonces(0));
        let key_before = acc.key;
        let out1 = acc.generate(32).unwrap();
        assert_ne!(acc.key, key_before);
        // The old key is gone; consecutive outputs never repeat.
        let out2 = acc.generate(32).unwrap();
        assert_ne!(out1, out2);
    }

    #[test]
    fn test_counter_block_advances_once_per_generate() {
        let mut acc = EntropyAccumulator::new();
        acc.refresh(&mut OnesSource, &mut CountingNonces(0));
        acc.generate(256).unwrap();
        assert_eq!(acc.ctr[4..12], 1u64.to_be_bytes());
        acc.generate(1).unwrap();
        assert_eq!(acc.ctr[4..12], 2u64.to_be_bytes());
    }

    // -----------------------------------------------------------------------
    // Refresh edge cases
    // -----------------------------------------------------------------------

    #[test]
    fn test_noop_tick_still_returns_nonce() {
        let mut acc = EntropyAccumulator::new();
        let mut source = ScriptedSource::new(vec![EntropyBatch::Pending]);
        let (did_reseed, nonce) = acc.refresh(&mut source, &mut CountingNonces(41));
        assert!(!did_reseed);
        assert_eq!(nonce, 41);
        assert_eq!(acc.pool_i, 0);
        assert_eq!(acc.schedule, 0);
    }

    #[test]
    fn test_compromise_resets_state() {
        let mut acc = EntropyAccumulator::new();
        let mut nonces = CountingNonces(0);
        acc.refresh(&mut OnesSource, &mut nonces);
        assert!(acc.is_seeded());

        let mut source = ScriptedSource::new(vec![EntropyBatch::Compromised]);
        let (did_reseed, _) = acc.refresh(&mut source, &mut nonces);
        assert!(!did_reseed);
        assert!(!acc.is_seeded());
        assert_eq!(acc.schedule, 0);
        assert_eq!(acc.pool_i, 0);
        assert_eq!(acc.diag.nreseeds, 0);
        for pool_diag in &acc.diag.pools {
            assert_eq!(*pool_diag, PoolDiagnostics::default());
        }
        assert_eq!(acc.generate(16), Err(RngError::NotSeeded));

        // Recovery requires a fresh reseed over the threshold.
        acc.refresh(&mut OnesSource, &mut nonces);
        assert!(acc.is_seeded());
    }

    // -----------------------------------------------------------------------
    // Diagnostics
    // -----------------------------------------------------------------------

    #[test]
    fn test_diagnostics_track_samples_and_drains() {
        let mut acc = EntropyAccumulator::new();
        let mut nonces = CountingNonces(0);
        acc.refresh(&mut OnesSource, &mut nonces);

        let diag = acc.diagnostics();
        assert_eq!(diag.nreseeds, 1);
        assert_eq!(diag.schedreseed_nreseeds, 1);
        assert_eq!(diag.schedreseed_nsamples_max, 1024);
        assert_eq!(diag.addentropy_nsamples_max, 1024);
        // Pool 0 received this tick's sample and was drained immediately.
        assert_eq!(diag.pools[0].ndrains, 1);
        assert_eq!(diag.pools[0].nsamples, 0);
        assert_eq!(diag.pools[0].nsamples_max, 1024);
    }

    #[test]
    fn test_diagnostics_serialize() {
        let acc = EntropyAccumulator::new();
        let json = serde_json::to_string(acc.diagnostics());
        assert!(json.is_ok());
    }
}
