//! Passphrase handling and the SHA-256 keystretch.

use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

/// A vault passphrase, pre-digested so the raw bytes need not be retained.
///
/// Stretching is deliberately slow; the salted, iterated digest is what the
/// file format calls P'. The same key value both wraps the B1..B4 blocks and
/// feeds the stored passphrase-verification hash.
pub struct VaultKey {
    /// The digested passphrase, not yet salted and iterated.
    prepared: Sha256,
}

impl VaultKey {
    pub fn new(passphrase: &[u8]) -> Self {
        let mut prepared = Sha256::default();
        prepared.update(passphrase);
        VaultKey { prepared }
    }

    /// Derives the stretched key for the given salt and iteration count.
    pub fn stretch(&self, salt: &[u8; 32], iterations: u32) -> Zeroizing<[u8; 32]> {
        let mut key = Zeroizing::new([0u8; 32]);

        let mut hasher = self.prepared.clone();
        hasher.update(salt);
        hasher.finalize_into((&mut *key).into());

        for _ in 0..iterations {
            let mut hasher = Sha256::default();
            hasher.update(&*key);
            hasher.finalize_into((&mut *key).into());
        }

        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stretch_known_answer() {
        let mut salt = [0u8; 32];
        for (i, byte) in salt.iter_mut().enumerate() {
            *byte = i as u8;
        }

        let key = VaultKey::new(b"correct horse battery staple");
        let stretched = key.stretch(&salt, 10);

        let expected: [u8; 32] = [
            0x31, 0xbd, 0x1a, 0x95, 0xfa, 0xcb, 0x70, 0x96, 0x6b, 0x9b, 0xf4, 0x76, 0x4c, 0xef,
            0xcd, 0x29, 0x03, 0xaf, 0x55, 0x8d, 0x3c, 0x0b, 0x50, 0xad, 0xf3, 0x00, 0xba, 0xca,
            0x45, 0x3e, 0xb4, 0x29,
        ];
        assert_eq!(*stretched, expected);
    }

    #[test]
    fn zero_iterations_is_a_single_salted_digest() {
        let salt = [7u8; 32];
        let key = VaultKey::new(b"pw");
        let stretched = key.stretch(&salt, 0);

        let mut hasher = Sha256::default();
        hasher.update(b"pw");
        hasher.update(salt);
        assert_eq!(stretched.as_slice(), hasher.finalize().as_slice());
    }
}
