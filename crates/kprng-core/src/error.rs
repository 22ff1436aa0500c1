//! Error taxonomy for the PRNG subsystem.
//!
//! Every failure path returns one of these variants; no operation ever hands
//! partial or stale output back to the caller alongside an error.

use thiserror::Error;

/// Errors produced by the generators and their front-ends.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RngError {
    /// Malformed construction input. Fatal, never retried.
    #[error("invalid construction input: {0}")]
    Configuration(&'static str),

    /// A request exceeded the allowed bounds for the operation.
    #[error("requested {requested} bytes, limit is {limit}")]
    RequestTooLarge { requested: usize, limit: usize },

    /// The DRBG has produced output 2^48 times since its last reseed and
    /// refuses to continue until reseeded.
    #[error("reseed interval exceeded")]
    ReseedRequired,

    /// Output was requested before the accumulator completed a scheduled
    /// reseed carrying at least the minimum sample count.
    #[error("generator is not seeded")]
    NotSeeded,

    /// The entropy source produced nothing across every retry of an
    /// opportunistic reseed. Callers must treat this as fatal.
    #[error("entropy source exhausted after {0} attempts")]
    EntropyExhausted(usize),

    /// An output block repeated the previous one. The generator state has
    /// been wiped and the instance is unusable.
    #[error("continuous random number generator test failed")]
    ContinuousTestFailed,
}

pub type Result<T> = core::result::Result<T, RngError>;
