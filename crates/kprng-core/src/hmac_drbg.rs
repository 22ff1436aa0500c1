//! HMAC DRBG per NIST SP 800-90A, instantiated with HMAC-SHA-256.
//!
//! State is the HMAC key `K` and the chaining value `V`. Instantiation and
//! reseed reject entropy at or below half the hash output length. The reseed
//! interval is enforced only in strict FIPS mode; every output block is
//! always compared against its predecessor, and a repeat wipes the state
//! permanently.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::drbg::{Drbg, RESEED_INTERVAL};
use crate::error::{Result, RngError};

type HmacSha256 = Hmac<Sha256>;

/// Hash output length in bytes.
const OUTLEN: usize = 32;

/// HMAC-SHA-256 DRBG.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct HmacDrbg {
    key: [u8; OUTLEN],
    v: [u8; OUTLEN],
    #[zeroize(skip)]
    reseed_counter: u64,
    #[zeroize(skip)]
    strict_fips: bool,
}

fn mac(key: &[u8; OUTLEN], parts: &[&[u8]]) -> [u8; OUTLEN] {
    let mut h = HmacSha256::new_from_slice(key).expect("HMAC-SHA-256 accepts any key size");
    for part in parts {
        h.update(part);
    }
    h.finalize().into_bytes().into()
}

impl HmacDrbg {
    /// Instantiate from entropy, a nonce, and an optional personalization
    /// string. Entropy must exceed half the hash output length.
    pub fn new(entropy: &[u8], nonce: &[u8], personalization: &[u8], strict_fips: bool) -> Result<Self> {
        Self::check_entropy(entropy)?;

        let mut drbg = Self {
            key: [0x00; OUTLEN],
            v: [0x01; OUTLEN],
            reseed_counter: 1,
            strict_fips,
        };
        drbg.update(&[entropy, nonce, personalization]);
        Ok(drbg)
    }

    fn check_entropy(entropy: &[u8]) -> Result<()> {
        if entropy.len() <= OUTLEN / 2 {
            return Err(RngError::Configuration("insufficient entropy length"));
        }
        Ok(())
    }

    /// The SP 800-90A update function: two HMAC rounds keyed by a round
    /// byte, with the second round skipped when no data is provided.
    fn update(&mut self, data: &[&[u8]]) {
        let empty = data.iter().all(|d| d.is_empty());
        for round in 0u8..2 {
            let mut h = HmacSha256::new_from_slice(&self.key).expect("HMAC-SHA-256 accepts any key size");
            h.update(&self.v);
            h.update(&[round]);
            for part in data {
                h.update(part);
            }
            self.key = h.finalize().into_bytes().into();
            self.v = mac(&self.key, &[&self.v]);
            if empty {
                break;
            }
        }
    }

    /// Wipe the state and make the instance permanently unusable.
    fn done(&mut self) {
        self.key.zeroize();
        self.v.zeroize();
        self.reseed_counter = u64::MAX;
    }

    #[cfg(test)]
    pub(crate) fn set_reseed_counter(&mut self, counter: u64) {
        self.reseed_counter = counter;
    }
}

impl Drbg for HmacDrbg {
    fn reseed(&mut self, entropy: &[u8], additional: &[u8]) -> Result<()> {
        Self::check_entropy(entropy)?;
        self.update(&[entropy, additional]);
        self.reseed_counter = 1;
        Ok(())
    }

    fn generate(&mut self, out: &mut [u8], additional: &[u8]) -> Result<()> {
        if self.strict_fips && self.reseed_counter > RESEED_INTERVAL {
            return Err(RngError::ReseedRequired);
        }

        if !additional.is_empty() {
            self.update(&[additional]);
        }

        for chunk in out.chunks_mut(OUTLEN) {
            let v_prev = self.v;
            self.v = mac(&self.key, &[&self.v]);
            // Continuous test: a repeated block means the generator is stuck.
            if self.v == v_prev {
                out.zeroize();
                self.done();
                return Err(RngError::ContinuousTestFailed);
            }
            chunk.copy_from_slice(&self.v[..chunk.len()]);
        }

        self.update(&[additional]);
        self.reseed_counter += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENTROPY: [u8; 32] = [0x5a; 32];
    const NONCE: [u8; 16] = [0xa5; 16];

    #[test]
    fn test_identical_instantiations_agree() {
        let mut a = HmacDrbg::new(&ENTROPY, &NONCE, b"label", false).unwrap();
        let mut b = HmacDrbg::new(&ENTROPY, &NONCE, b"label", false).unwrap();
        let mut out_a = [0u8; 80];
        let mut out_b = [0u8; 80];
        a.generate(&mut out_a, &[]).unwrap();
        b.generate(&mut out_b, &[]).unwrap();
        assert_eq!(out_a, out_b);
    }

    #[test]
    fn test_short_entropy_rejected() {
        // 16 bytes is exactly half the hash output length and not enough.
        assert_eq!(
            HmacDrbg::new(&[0u8; 16], &NONCE, &[], false).err(),
            Some(RngError::Configuration("insufficient entropy length"))
        );
        assert!(HmacDrbg::new(&[0u8; 17], &NONCE, &[], false).is_ok());
    }

    #[test]
    fn test_short_entropy_rejected_on_reseed() {
        let mut drbg = HmacDrbg::new(&ENTROPY, &NONCE, &[], false).unwrap();
        assert!(drbg.reseed(&[0u8; 16], &[]).is_err());
        assert!(drbg.reseed(&[0u8; 32], &[]).is_ok());
    }

    #[test]
    fn test_additional_input_changes_output() {
        let mut a = HmacDrbg::new(&ENTROPY, &NONCE, &[], false).unwrap();
        let mut b = HmacDrbg::new(&ENTROPY, &NONCE, &[], false).unwrap();
        let mut out_a = [0u8; 32];
        let mut out_b = [0u8; 32];
        a.generate(&mut out_a, b"extra").unwrap();
        b.generate(&mut out_b, &[]).unwrap();
        assert_ne!(out_a, out_b);
    }

    #[test]
    fn test_partial_block_request() {
        let mut a = HmacDrbg::new(&ENTROPY, &NONCE, &[], false).unwrap();
        let mut b = HmacDrbg::new(&ENTROPY, &NONCE, &[], false).unwrap();
        let mut short = [0u8; 7];
        let mut long = [0u8; 50];
        a.generate(&mut short, &[]).unwrap();
        b.generate(&mut long, &[]).unwrap();
        assert_eq!(short, long[..7]);
    }

    #[test]
    fn test_reseed_interval_enforced_in_strict_fips() {
        let mut drbg = HmacDrbg::new(&ENTROPY, &NONCE, &[], true).unwrap();
        let mut out = [0u8; 16];

        drbg.set_reseed_counter(RESEED_INTERVAL);
        assert!(drbg.generate(&mut out, &[]).is_ok());

        drbg.set_reseed_counter(RESEED_INTERVAL + 1);
        assert_eq!(drbg.generate(&mut out, &[]), Err(RngError::ReseedRequired));

        drbg.reseed(&ENTROPY, &[]).unwrap();
        assert!(drbg.generate(&mut out, &[]).is_ok());
    }

    #[test]
    fn test_reseed_interval_not_enforced_outside_fips() {
        let mut drbg = HmacDrbg::new(&ENTROPY, &NONCE, &[], false).unwrap();
        let mut out = [0u8; 16];
        drbg.set_reseed_counter(RESEED_INTERVAL + 1);
        assert!(drbg.generate(&mut out, &[]).is_ok());
    }

    #[test]
    fn test_fips_mode_does_not_change_output() {
        let mut strict = HmacDrbg::new(&ENTROPY, &NONCE, &[], true).unwrap();
        let mut relaxed = HmacDrbg::new(&ENTROPY, &NONCE, &[], false).unwrap();
        let mut out_s = [0u8; 64];
        let mut out_r = [0u8; 64];
        strict.generate(&mut out_s, &[]).unwrap();
        relaxed.generate(&mut out_r, &[]).unwrap();
        assert_eq!(out_s, out_r);
    }
}
