//! Streaming vault reader.
//!
//! The reader walks the byte stream strictly in order; the format has no
//! random access because the field stream is one CBC chain and integrity
//! can only be judged after every field value has passed through the HMAC.

use std::cmp::min;
use std::io::Read;

use byteorder::{LittleEndian, ReadBytesExt};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::cbc::TwofishCbc;
use crate::error::{Error, Result};
use crate::field::{Field, EOF_MARKER, FILE_MAGIC};
use crate::key::VaultKey;
use crate::twofish::{Twofish, BLOCK_SIZE};

type HmacSha256 = Hmac<Sha256>;

/// Reads one vault from an `io::Read` stream.
///
/// ```rust
/// use pwvault::{VaultKey, VaultReader};
/// use std::fs::File;
///
/// let file = File::open("tests/pwsafe.psafe3").unwrap();
/// let mut reader = VaultReader::new(file, &VaultKey::new(b"bogus12345")).unwrap();
/// while let Some(field) = reader.read_field().unwrap() {
///     println!("field type {:#x}, {} bytes", field.raw_type, field.raw_len());
/// }
/// reader.verify().unwrap();
/// ```
#[derive(Debug)]
pub struct VaultReader<R> {
    inner: R,
    cipher: TwofishCbc,
    hmac: HmacSha256,
    iterations: u32,
    salt: [u8; 32],
    wrapped_keys: [[u8; BLOCK_SIZE]; 4],
    iv: [u8; BLOCK_SIZE],
}

impl<R: Read> VaultReader<R> {
    /// Parses the envelope and authenticates the passphrase.
    ///
    /// Leaves the stream positioned at the first field block.
    pub fn new(mut inner: R, key: &VaultKey) -> Result<Self> {
        let mut tag = [0u8; 4];
        if inner.read_exact(&mut tag).is_err() || &tag != FILE_MAGIC {
            return Err(Error::NotPasswordSafeV3);
        }

        let mut salt = [0u8; 32];
        inner.read_exact(&mut salt)?;
        let iterations = inner.read_u32::<LittleEndian>()?;

        let stretched = key.stretch(&salt, iterations);

        let mut stored_hash = [0u8; 32];
        inner.read_exact(&mut stored_hash)?;
        let mut verifier = Sha256::default();
        verifier.update(&*stretched);
        if verifier.finalize().as_slice() != stored_hash {
            return Err(Error::BadPassphrase);
        }

        let mut wrapped_keys = [[0u8; BLOCK_SIZE]; 4];
        for block in wrapped_keys.iter_mut() {
            inner.read_exact(block)?;
        }

        // B1..B4 unwrap to K (field stream) and L (HMAC) under P'.
        let ecb = Twofish::new(&*stretched)?;
        let mut k = Zeroizing::new([0u8; 32]);
        let mut l = Zeroizing::new([0u8; 32]);
        for (half, block) in k.chunks_exact_mut(BLOCK_SIZE).zip(&wrapped_keys[..2]) {
            half.copy_from_slice(block);
            ecb.decrypt_block(half.try_into().unwrap());
        }
        for (half, block) in l.chunks_exact_mut(BLOCK_SIZE).zip(&wrapped_keys[2..]) {
            half.copy_from_slice(block);
            ecb.decrypt_block(half.try_into().unwrap());
        }

        let mut iv = [0u8; BLOCK_SIZE];
        inner.read_exact(&mut iv)?;

        let cipher = TwofishCbc::new(&*k, &iv)?;
        let hmac = HmacSha256::new_from_slice(&*l).expect("HMAC accepts any key length");

        Ok(VaultReader {
            inner,
            cipher,
            hmac,
            iterations,
            salt,
            wrapped_keys,
            iv,
        })
    }

    /// Reads one field, or `None` once the clear end-of-file marker arrives.
    ///
    /// Every returned value is folded into the integrity check consumed by
    /// [`verify`](Self::verify).
    pub fn read_field(&mut self) -> Result<Option<Field>> {
        let mut block = [0u8; BLOCK_SIZE];
        self.inner.read_exact(&mut block)?;

        // The marker is compared before decryption; it is the only way the
        // stream announces its end ahead of the HMAC.
        if block == EOF_MARKER {
            return Ok(None);
        }

        self.cipher.decrypt_block(&mut block);
        let raw_len = u32::from_le_bytes(block[0..4].try_into().unwrap()) as usize;
        let raw_type = block[4];

        let mut raw_value = Vec::new();
        raw_value.extend_from_slice(&block[5..5 + min(11, raw_len)]);
        if raw_len > 11 {
            for _ in 0..(raw_len + 4) / BLOCK_SIZE {
                self.inner.read_exact(&mut block)?;
                self.cipher.decrypt_block(&mut block);
                raw_value.extend_from_slice(&block);
            }
            // Whatever exceeds the declared length is padding.
            raw_value.truncate(raw_len);
        }

        self.hmac.update(&raw_value);
        Ok(Some(Field::new(raw_type, raw_value)))
    }

    /// Consumes the trailing HMAC and checks it, in constant time, against
    /// the values read so far. Call after the last field.
    pub fn verify(&mut self) -> Result<()> {
        let mut stored = [0u8; 32];
        self.inner.read_exact(&mut stored)?;
        self.hmac
            .clone()
            .verify_slice(&stored)
            .map_err(|_| Error::IntegrityFailure)
    }

    /// The keystretch iteration count declared by the file.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn salt(&self) -> &[u8; 32] {
        &self.salt
    }

    /// The wrapped key blocks B1..B4, verbatim as stored.
    pub fn wrapped_keys(&self) -> &[[u8; BLOCK_SIZE]; 4] {
        &self.wrapped_keys
    }

    pub fn iv(&self) -> &[u8; BLOCK_SIZE] {
        &self.iv
    }
}
