//! # kprng-core
//!
//! A layered kernel PRNG: a Fortuna-style entropy accumulator conditions raw
//! hardware samples into seeds for a NIST SP 800-90A CTR DRBG, fronted by an
//! output cache. An HMAC DRBG is provided for callers that need a hash-based
//! generator with the same contract.
//!
//! The layers are usable on their own — [`EntropyAccumulator`] for pooling
//! and conditioning, [`CtrDrbg`] / [`HmacDrbg`] for deterministic expansion,
//! [`CryptoRng`] for caching and reseed scheduling — or composed as
//! [`KernelPrng`], which wires them together with a one-shot SHA-512
//! bootstrap for the first seed.
//!
//! ## Example
//!
//! ```
//! use kprng_core::{EntropyBatch, EntropySource, KernelPrng, OsNonceSource};
//!
//! // A toy source; production callers wrap a hardware entropy interface.
//! struct Ones;
//!
//! impl EntropySource for Ones {
//!     fn get_entropy(&mut self, nbytes: usize) -> EntropyBatch {
//!         EntropyBatch::Samples { nsamples: 1024, bytes: vec![1; nbytes] }
//!     }
//! }
//!
//! let boot_seed = [0x17u8; 32];
//! let boot_nonce = [0x2au8; 16];
//! let mut prng = KernelPrng::new(
//!     &boot_seed,
//!     &boot_nonce,
//!     Box::new(Ones),
//!     Box::new(OsNonceSource),
//! );
//!
//! prng.refresh();
//! let mut buf = [0u8; 32];
//! prng.generate(&mut buf)?;
//! # Ok::<(), kprng_core::RngError>(())
//! ```
//!
//! All output paths are all-or-nothing: on any error the destination buffer
//! is zeroed, never left holding partial output.

mod block;

pub mod accumulator;
pub mod crypto_rng;
pub mod ctr_drbg;
pub mod drbg;
pub mod error;
pub mod hmac_drbg;
pub mod kernel;
pub mod source;

pub use accumulator::{Diagnostics, EntropyAccumulator, PoolDiagnostics};
pub use crypto_rng::{CryptoRng, SeedSource};
pub use ctr_drbg::CtrDrbg;
pub use drbg::{Drbg, RESEED_INTERVAL};
pub use error::{Result, RngError};
pub use hmac_drbg::HmacDrbg;
pub use kernel::KernelPrng;
pub use source::{EntropyBatch, EntropySource, NonceSource, OsNonceSource};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
