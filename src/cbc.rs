//! Twofish in CBC mode.
//!
//! The field stream of a vault is one long CBC chain, so an instance is
//! created once per read or write pass and fed blocks strictly in stream
//! order. Encryption and decryption evolve the chaining state in opposite
//! directions; a single instance must only ever be used for one of them.

use crate::error::Result;
use crate::twofish::{Twofish, BLOCK_SIZE};

/// Stateful Twofish-CBC over an externally supplied IV.
#[derive(Debug)]
pub struct TwofishCbc {
    cipher: Twofish,
    state: [u8; BLOCK_SIZE],
}

impl TwofishCbc {
    pub fn new(key: &[u8], iv: &[u8; BLOCK_SIZE]) -> Result<Self> {
        Ok(TwofishCbc {
            cipher: Twofish::new(key)?,
            state: *iv,
        })
    }

    /// Encrypts one block in place and advances the chain.
    pub fn encrypt_block(&mut self, block: &mut [u8; BLOCK_SIZE]) {
        for (b, s) in block.iter_mut().zip(&self.state) {
            *b ^= s;
        }
        self.cipher.encrypt_block(block);
        self.state = *block;
    }

    /// Decrypts one block in place and advances the chain.
    pub fn decrypt_block(&mut self, block: &mut [u8; BLOCK_SIZE]) {
        let ciphertext = *block;
        self.cipher.decrypt_block(block);
        for (b, s) in block.iter_mut().zip(&self.state) {
            *b ^= s;
        }
        self.state = ciphertext;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 32] = [0x5c; 32];
    const IV: [u8; BLOCK_SIZE] = [0xa7; BLOCK_SIZE];

    #[test]
    fn roundtrips_a_multi_block_stream() {
        let mut blocks = [[0x11u8; BLOCK_SIZE], [0x22; BLOCK_SIZE], [0x33; BLOCK_SIZE]];

        let mut enc = TwofishCbc::new(&KEY, &IV).unwrap();
        for block in blocks.iter_mut() {
            enc.encrypt_block(block);
        }

        let mut dec = TwofishCbc::new(&KEY, &IV).unwrap();
        for block in blocks.iter_mut() {
            dec.decrypt_block(block);
        }
        assert_eq!(blocks, [[0x11; BLOCK_SIZE], [0x22; BLOCK_SIZE], [0x33; BLOCK_SIZE]]);
    }

    #[test]
    fn chaining_matches_the_xor_and_ecb_construction() {
        let ecb = Twofish::new(&KEY).unwrap();

        let mut first = [0x11u8; BLOCK_SIZE];
        for (b, s) in first.iter_mut().zip(&IV) {
            *b ^= s;
        }
        ecb.encrypt_block(&mut first);

        let mut second = [0x22u8; BLOCK_SIZE];
        for (b, s) in second.iter_mut().zip(&first) {
            *b ^= s;
        }
        ecb.encrypt_block(&mut second);

        let mut cbc = TwofishCbc::new(&KEY, &IV).unwrap();
        let mut blocks = [[0x11u8; BLOCK_SIZE], [0x22; BLOCK_SIZE]];
        for block in blocks.iter_mut() {
            cbc.encrypt_block(block);
        }
        assert_eq!(blocks, [first, second]);
    }
}
