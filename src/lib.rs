//! Password Safe V3 vault reader, writer and in-memory representation.
//!
//! The on-disk container is a self-contained encrypted file: a key-stretched
//! passphrase wraps two 256-bit Twofish/HMAC keys, the field stream is one
//! Twofish-CBC chain of 16-byte blocks, and an HMAC-SHA-256 over the plain
//! field values closes the file. Neither reading nor writing requires
//! `std::io::Seek`: the format allows no random access, since checking
//! integrity means reading the whole stream and every save rewrites the file
//! from scratch.
//!
//! Two layers are exposed. [`VaultReader`] and [`VaultWriter`] stream raw
//! [`Field`]s for callers that want to transform a database without imposing
//! a representation. [`Vault`] sits on top and holds a [`Header`] plus an
//! ordered list of [`Record`]s, each with typed accessors over the
//! well-known field types and verbatim round-tripping for everything else.
//!
//! Only version 3 databases are supported.

mod cbc;
mod error;
mod field;
mod key;
mod reader;
mod record;
mod twofish;
mod vault;
mod writer;


pub use crate::cbc::TwofishCbc;
pub use crate::error::{Error, Result};
pub use crate::field::{
    header_type, record_type, Field, HeaderField, RecordField, END_OF_ENTRY, EOF_MARKER,
    FILE_MAGIC,
};
pub use crate::key::VaultKey;
pub use crate::reader::VaultReader;
pub use crate::record::{Header, Record};
pub use crate::twofish::{Twofish, BLOCK_SIZE};
pub use crate::vault::{Vault, MIN_WRITE_ITER};
pub use crate::writer::VaultWriter;
