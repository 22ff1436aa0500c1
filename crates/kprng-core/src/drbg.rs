//! Common deterministic random bit generator contract.

use crate::error::Result;

/// Requests a DRBG may serve between reseeds, per NIST SP 800-90A.
pub const RESEED_INTERVAL: u64 = 1 << 48;

/// A seeded deterministic generator that can be reseeded and queried with
/// optional additional input.
pub trait Drbg {
    /// Mix fresh entropy (and optional additional input) into the state and
    /// reset the reseed counter.
    fn reseed(&mut self, entropy: &[u8], additional: &[u8]) -> Result<()>;

    /// Fill `out` with generated bytes. Fails once the reseed interval is
    /// exhausted; no partial output is produced on failure.
    fn generate(&mut self, out: &mut [u8], additional: &[u8]) -> Result<()>;
}
