use std::io;

use thiserror::Error;

/// A specialized `Result` type for vault operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while reading or writing a vault.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Incorrect file signature, not a Password Safe V3 container.
    #[error("not a Password Safe V3 file")]
    NotPasswordSafeV3,
    /// The stretched passphrase hash does not match the stored one.
    #[error("wrong passphrase")]
    BadPassphrase,
    /// The stream ended before all expected bytes were read.
    #[error("unexpected end of stream")]
    Truncated,
    /// The HMAC over the field values does not verify, or a freshly
    /// written file failed its read-back check.
    #[error("file integrity check failed")]
    IntegrityFailure,
    /// Twofish was handed a key of unsupported length.
    #[error("Twofish keys must be 16, 24 or 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    /// The operating system refused to hand out random bytes.
    #[error("system random number generator unavailable")]
    Rng(#[source] rand::Error),
    /// Any other I/O error from the underlying reader or writer.
    #[error(transparent)]
    Io(io::Error),
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        // A short read is a format-level condition, not an I/O failure.
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Error::Truncated
        } else {
            Error::Io(err)
        }
    }
}

impl From<rand::Error> for Error {
    fn from(err: rand::Error) -> Error {
        Error::Rng(err)
    }
}
