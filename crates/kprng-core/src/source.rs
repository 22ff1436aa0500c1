//! Injected capabilities: the external entropy source and the nonce source.
//!
//! The reference implementation wired these in by patching methods at
//! runtime; here they are explicit single-method traits supplied at
//! construction. Deterministic tests inject scripted implementations.

/// Result of one pull from an external entropy source.
///
/// The raw byte length need not match the requested length; the sample count
/// is the source's own estimate of how many entropy samples the bytes carry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntropyBatch {
    /// The source believes it has been compromised. All accumulated state
    /// derived from it must be discarded.
    Compromised,
    /// No new samples are available yet. Try again later; no state changes.
    Pending,
    /// Usable raw samples.
    Samples { nsamples: u64, bytes: Vec<u8> },
}

/// External entropy source contract.
pub trait EntropySource {
    /// Pull up to `nbytes` of raw entropy.
    fn get_entropy(&mut self, nbytes: usize) -> EntropyBatch;
}

/// Source of 64-bit random nonces.
///
/// Replaces the reference implementation's reliance on hidden process-global
/// randomness for nonce generation.
pub trait NonceSource {
    fn next_nonce(&mut self) -> u64;
}

/// Default nonce source backed by the OS CSPRNG via the `getrandom` crate.
///
/// # Panics
///
/// Panics if the OS CSPRNG fails — this indicates a fatal platform issue.
pub struct OsNonceSource;

impl NonceSource for OsNonceSource {
    fn next_nonce(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        getrandom::fill(&mut buf).expect("OS CSPRNG failed");
        u64::from_le_bytes(buf)
    }
}
