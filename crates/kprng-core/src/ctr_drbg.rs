//! CTR DRBG per NIST SP 800-90A, instantiated with AES-256 and the
//! block-cipher derivation function.
//!
//! All seed material — entropy, nonce, personalization, additional input —
//! passes through the derivation function, so inputs of any length condition
//! the full 48-byte seed. State is a 32-byte key and a 16-byte counter `V`;
//! every operation finishes with an `update` so the emitting key never
//! survives the call that used it.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::block::{self, BLOCK_NBYTES, KEY_NBYTES};
use crate::drbg::{Drbg, RESEED_INTERVAL};
use crate::error::{Result, RngError};

/// Seed length: key plus one block.
const SEED_NBYTES: usize = KEY_NBYTES + BLOCK_NBYTES;

/// AES-256 CTR DRBG with derivation function.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct CtrDrbg {
    key: [u8; KEY_NBYTES],
    v: [u8; BLOCK_NBYTES],
    #[zeroize(skip)]
    reseed_counter: u64,
}

/// CBC-MAC over `data` (a whole number of blocks) with a zero IV.
fn bcc(key: &[u8; KEY_NBYTES], data: &[u8]) -> [u8; BLOCK_NBYTES] {
    let mut chain = [0u8; BLOCK_NBYTES];
    for chunk in data.chunks_exact(BLOCK_NBYTES) {
        for (c, b) in chain.iter_mut().zip(chunk) {
            *c ^= b;
        }
        chain = block::encrypt_block(key, &chain);
    }
    chain
}

/// Block-cipher derivation function: condition arbitrary-length input into
/// exactly `nbytes` of seed material.
fn df(input: &[u8], nbytes: usize) -> Vec<u8> {
    // S = len(input) ‖ nbytes ‖ input ‖ 0x80, zero-padded to a block.
    let mut s = Vec::with_capacity(8 + input.len() + BLOCK_NBYTES);
    s.extend_from_slice(&(input.len() as u32).to_be_bytes());
    s.extend_from_slice(&(nbytes as u32).to_be_bytes());
    s.extend_from_slice(input);
    s.push(0x80);
    while s.len() % BLOCK_NBYTES != 0 {
        s.push(0x00);
    }

    let key: [u8; KEY_NBYTES] = core::array::from_fn(|i| i as u8);

    let mut temp = Vec::with_capacity(SEED_NBYTES);
    let mut i: u32 = 0;
    while temp.len() < SEED_NBYTES {
        let mut iv = vec![0u8; BLOCK_NBYTES];
        iv[..4].copy_from_slice(&i.to_be_bytes());
        iv.extend_from_slice(&s);
        temp.extend_from_slice(&bcc(&key, &iv));
        i += 1;
    }

    let mut k = [0u8; KEY_NBYTES];
    k.copy_from_slice(&temp[..KEY_NBYTES]);
    let mut x = [0u8; BLOCK_NBYTES];
    x.copy_from_slice(&temp[KEY_NBYTES..SEED_NBYTES]);
    temp.zeroize();

    let mut out = Vec::with_capacity(nbytes);
    while out.len() < nbytes {
        x = block::encrypt_block(&k, &x);
        out.extend_from_slice(&x);
    }
    out.truncate(nbytes);
    k.zeroize();
    x.zeroize();
    s.zeroize();
    out
}

impl CtrDrbg {
    /// Instantiate from entropy, a nonce, and an optional personalization
    /// string. All three are folded through the derivation function.
    pub fn new(entropy: &[u8], nonce: &[u8], personalization: &[u8]) -> Self {
        let mut material = Vec::with_capacity(entropy.len() + nonce.len() + personalization.len());
        material.extend_from_slice(entropy);
        material.extend_from_slice(nonce);
        material.extend_from_slice(personalization);
        let mut seed = df(&material, SEED_NBYTES);
        material.zeroize();

        let mut drbg = Self {
            key: [0u8; KEY_NBYTES],
            v: [0u8; BLOCK_NBYTES],
            reseed_counter: 1,
        };
        drbg.update(&seed);
        seed.zeroize();
        drbg
    }

    /// Advance the low 64 bits of `V` (big-endian, wrapping).
    fn increment_v(&mut self) {
        let mut low = [0u8; 8];
        low.copy_from_slice(&self.v[8..]);
        let next = u64::from_be_bytes(low).wrapping_add(1);
        self.v[8..].copy_from_slice(&next.to_be_bytes());
    }

    /// The SP 800-90A update function: derive three keystream blocks, XOR in
    /// `provided` (exactly one seed length), and split into the new key and
    /// counter.
    fn update(&mut self, provided: &[u8]) {
        debug_assert_eq!(provided.len(), SEED_NBYTES);

        let mut temp = [0u8; SEED_NBYTES];
        for chunk in temp.chunks_exact_mut(BLOCK_NBYTES) {
            self.increment_v();
            chunk.copy_from_slice(&block::encrypt_block(&self.key, &self.v));
        }
        for (t, p) in temp.iter_mut().zip(provided) {
            *t ^= p;
        }
        self.key.copy_from_slice(&temp[..KEY_NBYTES]);
        self.v.copy_from_slice(&temp[KEY_NBYTES..]);
        temp.zeroize();
    }

    #[cfg(test)]
    pub(crate) fn set_reseed_counter(&mut self, counter: u64) {
        self.reseed_counter = counter;
    }
}

impl Drbg for CtrDrbg {
    fn reseed(&mut self, entropy: &[u8], additional: &[u8]) -> Result<()> {
        let mut material = Vec::with_capacity(entropy.len() + additional.len());
        material.extend_from_slice(entropy);
        material.extend_from_slice(additional);
        let mut seed = df(&material, SEED_NBYTES);
        material.zeroize();

        self.update(&seed);
        seed.zeroize();
        self.reseed_counter = 1;
        Ok(())
    }

    fn generate(&mut self, out: &mut [u8], additional: &[u8]) -> Result<()> {
        if self.reseed_counter > RESEED_INTERVAL {
            return Err(RngError::ReseedRequired);
        }

        let mut folded = if additional.is_empty() {
            vec![0u8; SEED_NBYTES]
        } else {
            let folded = df(additional, SEED_NBYTES);
            self.update(&folded);
            folded
        };

        for chunk in out.chunks_mut(BLOCK_NBYTES) {
            self.increment_v();
            let ks = block::encrypt_block(&self.key, &self.v);
            chunk.copy_from_slice(&ks[..chunk.len()]);
        }

        self.update(&folded);
        folded.zeroize();
        self.reseed_counter += 1;
        Ok(())
    }
}
