//! The vault: envelope state, header and records, and persistence.

use std::io::{Read, Write};
use std::mem;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::debug;

use crate::error::{Error, Result};
use crate::field::{header_type, Field};
use crate::key::VaultKey;
use crate::reader::VaultReader;
use crate::record::{now_timestamp, Header, Record};
use crate::twofish::BLOCK_SIZE;
use crate::writer::{wrap_fresh_keys, VaultWriter};

/// Iteration floor applied on every save; files written with fewer
/// iterations are upgraded silently.
pub const MIN_WRITE_ITER: u32 = 262_144;

/// Format revision written into the header of a fresh vault, the one that
/// introduced the iteration floor above.
const FORMAT_VERSION: [u8; 2] = [0x0f, 0x03];

const PRODUCER: &str = concat!("pwvault v", env!("CARGO_PKG_VERSION"));

/// A collection of password records together with the key material of its
/// on-disk container.
///
/// Salt, wrapped key blocks and IV are preserved across saves, so the keys
/// protecting the field stream survive the lifetime of the file. Saving
/// under a different passphrase re-wraps implicitly (the stored blocks stay,
/// their unwrapped value changes with the stretch); callers wanting fresh
/// material call [`rotate_keys`](Self::rotate_keys) first.
#[derive(Debug)]
pub struct Vault {
    salt: [u8; 32],
    iterations: u32,
    wrapped_keys: [[u8; BLOCK_SIZE]; 4],
    iv: [u8; BLOCK_SIZE],
    pub header: Header,
    pub records: Vec<Record>,
}

impl Vault {
    /// An empty vault with freshly drawn key material.
    pub fn new(key: &VaultKey) -> Result<Self> {
        let mut salt = [0u8; 32];
        OsRng.try_fill_bytes(&mut salt)?;
        let iterations = MIN_WRITE_ITER;
        let stretched = key.stretch(&salt, iterations);
        let wrapped_keys = wrap_fresh_keys(&stretched)?;
        let mut iv = [0u8; BLOCK_SIZE];
        OsRng.try_fill_bytes(&mut iv)?;

        let mut header = Header::new();
        header.add_raw_field(Field::new(header_type::VERSION, FORMAT_VERSION.to_vec()));

        Ok(Vault {
            salt,
            iterations,
            wrapped_keys,
            iv,
            header,
            records: Vec::new(),
        })
    }

    /// Parses a vault from a byte stream and authenticates it.
    pub fn open(inner: impl Read, key: &VaultKey) -> Result<Self> {
        let mut reader = VaultReader::new(inner, key)?;

        let mut header = Header::new();
        while let Some(field) = reader.read_field()? {
            if field.is_end_of_entry() {
                break;
            }
            header.add_raw_field(field);
        }

        let mut records = Vec::new();
        let mut current = Record::default();
        while let Some(field) = reader.read_field()? {
            if field.is_end_of_entry() {
                records.push(mem::take(&mut current));
            } else {
                current.add_raw_field(field);
            }
        }
        // A record still accumulating when the end-of-file marker arrives
        // never got its terminator and is dropped.

        reader.verify()?;

        debug!(
            records = records.len(),
            iterations = reader.iterations(),
            "vault opened"
        );

        Ok(Vault {
            salt: *reader.salt(),
            iterations: reader.iterations(),
            wrapped_keys: *reader.wrapped_keys(),
            iv: *reader.iv(),
            header,
            records,
        })
    }

    /// Serialises the vault, refreshing the last-save timestamp and the
    /// producer string in the header.
    pub fn save(&mut self, key: &VaultKey) -> Result<Vec<u8>> {
        self.iterations = self.iterations.max(MIN_WRITE_ITER);

        let mut stamp = vec![0u8; 4];
        LittleEndian::write_u32(&mut stamp, now_timestamp());
        self.header
            .add_raw_field(Field::new(header_type::LAST_SAVE, stamp));
        self.header.add_raw_field(Field::new(
            header_type::WHAT_SAVED,
            PRODUCER.as_bytes().to_vec(),
        ));

        let mut writer = VaultWriter::with_envelope(
            Vec::new(),
            key,
            &self.salt,
            self.iterations,
            &self.wrapped_keys,
            &self.iv,
        )?;

        for field in self.header.raw_fields() {
            writer.write_field(field)?;
        }
        writer.write_field(&Field::end_of_entry())?;

        for record in &self.records {
            for field in record.raw_fields() {
                writer.write_field(field)?;
            }
            writer.write_field(&Field::end_of_entry())?;
        }

        let bytes = writer.finish()?;
        debug!(
            records = self.records.len(),
            bytes = bytes.len(),
            "vault serialised"
        );
        Ok(bytes)
    }

    /// Writes the vault to a `.part` temp file next to `path`, proves the
    /// result decodes with the same passphrase, then renames it over the
    /// destination. A failed check removes the temp file and leaves the
    /// destination untouched.
    pub fn save_atomic(&mut self, path: impl AsRef<Path>, key: &VaultKey) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.save(key)?;

        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tempfile = tempfile::Builder::new()
            .suffix(".part")
            .tempfile_in(directory)?;
        tempfile.write_all(&bytes)?;
        tempfile.flush()?;

        // The HMAC is the only end-to-end check the format offers, so the
        // bytes on disk must prove they decode before replacing the
        // original. The temp file is removed on drop when this fails.
        Vault::open(tempfile.reopen()?, key).map_err(|_| Error::IntegrityFailure)?;

        let stored = tempfile
            .persist(path)
            .map_err(|err| Error::from(err.error))?;
        stored.sync_all()?;

        debug!(path = %path.display(), "vault stored");
        Ok(())
    }

    /// Replaces salt, wrapped key blocks and IV with fresh random material
    /// under the given passphrase. Never invoked implicitly.
    pub fn rotate_keys(&mut self, key: &VaultKey) -> Result<()> {
        OsRng.try_fill_bytes(&mut self.salt)?;
        self.iterations = self.iterations.max(MIN_WRITE_ITER);
        let stretched = key.stretch(&self.salt, self.iterations);
        self.wrapped_keys = wrap_fresh_keys(&stretched)?;
        OsRng.try_fill_bytes(&mut self.iv)?;
        debug!("vault key material rotated");
        Ok(())
    }

    /// The keystretch iteration count the vault was loaded with, or will be
    /// saved with once the floor is applied.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}
