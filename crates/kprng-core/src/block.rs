//! AES-256 block helpers shared by the accumulator keystream and the CTR
//! DRBG. The cipher itself is a trusted primitive from the `aes` crate.

use aes::Aes256;
use cipher::generic_array::GenericArray;
use cipher::{BlockEncrypt, KeyInit};

/// AES block size in bytes.
pub(crate) const BLOCK_NBYTES: usize = 16;

/// AES-256 key size in bytes.
pub(crate) const KEY_NBYTES: usize = 32;

/// Encrypt a single block with AES-256 in ECB mode.
pub(crate) fn encrypt_block(key: &[u8; KEY_NBYTES], block: &[u8; BLOCK_NBYTES]) -> [u8; BLOCK_NBYTES] {
    let cipher = Aes256::new(GenericArray::from_slice(key));
    let mut buf = GenericArray::clone_from_slice(block);
    cipher.encrypt_block(&mut buf);
    let mut out = [0u8; BLOCK_NBYTES];
    out.copy_from_slice(&buf);
    out
}

/// Fill `out` with the AES-256-CTR keystream starting at `counter_block`.
///
/// The counter block is interpreted as one 128-bit big-endian integer and
/// incremented once per emitted block. The caller's copy is not advanced.
pub(crate) fn ctr_keystream(key: &[u8; KEY_NBYTES], counter_block: &[u8; BLOCK_NBYTES], out: &mut [u8]) {
    let cipher = Aes256::new(GenericArray::from_slice(key));
    let mut counter = u128::from_be_bytes(*counter_block);
    for chunk in out.chunks_mut(BLOCK_NBYTES) {
        let mut block = GenericArray::clone_from_slice(&counter.to_be_bytes());
        cipher.encrypt_block(&mut block);
        chunk.copy_from_slice(&block[..chunk.len()]);
        counter = counter.wrapping_add(1);
    }
}
