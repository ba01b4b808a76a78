//! Streaming vault writer.
//!
//! Fields are encrypted as they are written; the CBC chain and the HMAC run
//! incrementally, so the writer holds no more than one field in memory.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::cbc::TwofishCbc;
use crate::error::Result;
use crate::field::{Field, EOF_MARKER, FILE_MAGIC};
use crate::key::VaultKey;
use crate::twofish::{Twofish, BLOCK_SIZE};

type HmacSha256 = Hmac<Sha256>;

/// Draws fresh K and L material and wraps it under the stretched key,
/// returning the B1..B4 blocks as they appear on disk.
pub(crate) fn wrap_fresh_keys(stretched: &[u8; 32]) -> Result<[[u8; BLOCK_SIZE]; 4]> {
    let ecb = Twofish::new(stretched)?;
    let mut wrapped = [[0u8; BLOCK_SIZE]; 4];
    for block in wrapped.iter_mut() {
        OsRng.try_fill_bytes(block)?;
        ecb.encrypt_block(block);
    }
    Ok(wrapped)
}

/// Writes one vault to an `io::Write` stream.
///
/// ```no_run
/// use pwvault::{Field, VaultKey, VaultWriter};
/// use std::fs::File;
/// use std::io::BufWriter;
///
/// let key = VaultKey::new(b"password");
/// let file = BufWriter::new(File::create("fresh.psafe3").unwrap());
/// let mut writer = VaultWriter::new(file, 262_144, &key).unwrap();
/// writer.write_field(&Field::new(0x00, vec![0x0f, 0x03])).unwrap();
/// writer.write_field(&Field::end_of_entry()).unwrap();
/// writer.finish().unwrap();
/// ```
pub struct VaultWriter<W> {
    inner: W,
    cipher: TwofishCbc,
    hmac: HmacSha256,
}

impl<W: Write> VaultWriter<W> {
    /// Starts a vault with a freshly drawn envelope: random salt, random
    /// wrapped keys and random IV.
    pub fn new(inner: W, iterations: u32, key: &VaultKey) -> Result<Self> {
        let mut salt = [0u8; 32];
        OsRng.try_fill_bytes(&mut salt)?;
        let stretched = key.stretch(&salt, iterations);
        let wrapped_keys = wrap_fresh_keys(&stretched)?;
        let mut iv = [0u8; BLOCK_SIZE];
        OsRng.try_fill_bytes(&mut iv)?;

        Self::from_parts(inner, &stretched, &salt, iterations, &wrapped_keys, &iv)
    }

    /// Starts a vault that reuses previously stored key material. K and L
    /// are recovered by unwrapping B1..B4 under the stretch of `key`, so
    /// the passphrase given here decides what the file can be opened with.
    pub fn with_envelope(
        inner: W,
        key: &VaultKey,
        salt: &[u8; 32],
        iterations: u32,
        wrapped_keys: &[[u8; BLOCK_SIZE]; 4],
        iv: &[u8; BLOCK_SIZE],
    ) -> Result<Self> {
        let stretched = key.stretch(salt, iterations);
        Self::from_parts(inner, &stretched, salt, iterations, wrapped_keys, iv)
    }

    fn from_parts(
        mut inner: W,
        stretched: &[u8; 32],
        salt: &[u8; 32],
        iterations: u32,
        wrapped_keys: &[[u8; BLOCK_SIZE]; 4],
        iv: &[u8; BLOCK_SIZE],
    ) -> Result<Self> {
        inner.write_all(FILE_MAGIC)?;
        inner.write_all(salt)?;
        inner.write_u32::<LittleEndian>(iterations)?;

        let mut verifier = Sha256::default();
        verifier.update(stretched);
        inner.write_all(verifier.finalize().as_slice())?;

        let ecb = Twofish::new(stretched)?;
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

        for block in wrapped_keys {
            inner.write_all(block)?;
        }
        inner.write_all(iv)?;

        let cipher = TwofishCbc::new(&*k, iv)?;
        let hmac = HmacSha256::new_from_slice(&*l).expect("HMAC accepts any key length");

        Ok(VaultWriter {
            inner,
            cipher,
            hmac,
        })
    }

    /// Encrypts and emits one field, folding its value into the HMAC.
    pub fn write_field(&mut self, field: &Field) -> Result<()> {
        let mut data = Vec::with_capacity(5 + field.raw_len() + BLOCK_SIZE);
        data.write_u32::<LittleEndian>(field.raw_len() as u32)?;
        data.write_u8(field.raw_type)?;
        data.extend_from_slice(&field.raw_value);

        // Pad to the block size with random bytes, never zeroes.
        let overhang = data.len() % BLOCK_SIZE;
        if overhang != 0 {
            let mut padding = [0u8; BLOCK_SIZE];
            let padding = &mut padding[..BLOCK_SIZE - overhang];
            OsRng.try_fill_bytes(padding)?;
            data.extend_from_slice(padding);
        }

        self.hmac.update(&field.raw_value);
        for block in data.chunks_exact_mut(BLOCK_SIZE) {
            self.cipher.encrypt_block(block.try_into().unwrap());
        }
        self.inner.write_all(&data)?;
        Ok(())
    }

    /// Emits the clear end-of-file marker and the HMAC, returning the
    /// underlying writer.
    pub fn finish(self) -> Result<W> {
        let VaultWriter {
            mut inner, hmac, ..
        } = self;
        inner.write_all(&EOF_MARKER)?;
        inner.write_all(hmac.finalize().into_bytes().as_slice())?;
        Ok(inner)
    }
}
