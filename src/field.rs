//! The raw TLV field unit and the typed views over well-known field types.

use byteorder::{ByteOrder, LittleEndian};
use uuid::Uuid;

/// Magic tag opening every V3 container.
pub const FILE_MAGIC: &[u8; 4] = b"PWS3";

/// Literal, unencrypted block terminating the field stream.
pub const EOF_MARKER: [u8; 16] = *b"PWS3-EOFPWS3-EOF";

/// Field type closing a header or record on the wire.
pub const END_OF_ENTRY: u8 = 0xff;

/// Header field types with a typed view; the rest are kept as raw bytes.
pub mod header_type {
    pub const VERSION: u8 = 0x00;
    pub const LAST_SAVE: u8 = 0x04;
    pub const WHAT_SAVED: u8 = 0x06;
}

/// Record field types with a typed view; the rest are kept as raw bytes.
pub mod record_type {
    pub const UUID: u8 = 0x01;
    pub const GROUP: u8 = 0x02;
    pub const TITLE: u8 = 0x03;
    pub const USER: u8 = 0x04;
    pub const NOTES: u8 = 0x05;
    pub const PASSWD: u8 = 0x06;
    pub const CREATED: u8 = 0x07;
    pub const LAST_MOD: u8 = 0x0c;
    pub const URL: u8 = 0x0d;
}

/// One field as stored on disk: a type byte and an opaque value.
///
/// The value carries no padding; padding exists only on the wire and is
/// stripped during decoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Field {
    pub raw_type: u8,
    pub raw_value: Vec<u8>,
}

impl Field {
    pub fn new(raw_type: u8, raw_value: Vec<u8>) -> Self {
        Field { raw_type, raw_value }
    }

    /// The sentinel closing a header or record.
    pub fn end_of_entry() -> Self {
        Field::new(END_OF_ENTRY, Vec::new())
    }

    pub fn raw_len(&self) -> usize {
        self.raw_value.len()
    }

    pub fn is_end_of_entry(&self) -> bool {
        self.raw_type == END_OF_ENTRY
    }
}

fn parse_u16(data: &[u8]) -> Option<u16> {
    (data.len() == 2).then(|| LittleEndian::read_u16(data))
}

fn parse_u32(data: &[u8]) -> Option<u32> {
    (data.len() == 4).then(|| LittleEndian::read_u32(data))
}

fn parse_string(data: &[u8]) -> String {
    String::from_utf8_lossy(data).into_owned()
}

/// Typed view of a header field.
///
/// A well-known type whose value has the wrong length for its encoding is
/// handed back as `Unknown` so it survives a save unaltered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeaderField {
    /// Format version (0x00), little-endian u16.
    Version(u16),
    /// Timestamp of last save (0x04), seconds since the epoch.
    LastSave(u32),
    /// What performed the last save (0x06).
    WhatSaved(String),
    /// End of header.
    EndOfEntry,
    /// Anything else, stored as-is.
    Unknown(u8, Vec<u8>),
}

impl HeaderField {
    pub fn new(field: &Field) -> Self {
        let data = field.raw_value.as_slice();
        match field.raw_type {
            header_type::VERSION => match parse_u16(data) {
                Some(version) => HeaderField::Version(version),
                None => HeaderField::Unknown(field.raw_type, data.to_vec()),
            },
            header_type::LAST_SAVE => match parse_u32(data) {
                Some(timestamp) => HeaderField::LastSave(timestamp),
                None => HeaderField::Unknown(field.raw_type, data.to_vec()),
            },
            header_type::WHAT_SAVED => HeaderField::WhatSaved(parse_string(data)),
            END_OF_ENTRY => HeaderField::EndOfEntry,
            other => HeaderField::Unknown(other, data.to_vec()),
        }
    }
}

/// Typed view of a record field. Same conventions as [`HeaderField`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordField {
    /// UUID (0x01), 16 bytes in little-endian GUID layout.
    Uuid(Uuid),
    /// Group (0x02).
    Group(String),
    /// Title (0x03).
    Title(String),
    /// Username (0x04).
    User(String),
    /// Notes (0x05).
    Notes(String),
    /// Password (0x06).
    Passwd(String),
    /// Creation time (0x07), seconds since the epoch.
    Created(u32),
    /// Last modification time (0x0c), seconds since the epoch.
    LastMod(u32),
    /// URL (0x0d).
    Url(String),
    /// End of record.
    EndOfEntry,
    /// Anything else, stored as-is.
    Unknown(u8, Vec<u8>),
}

impl RecordField {
    pub fn new(field: &Field) -> Self {
        let data = field.raw_value.as_slice();
        match field.raw_type {
            record_type::UUID => match <[u8; 16]>::try_from(data) {
                Ok(bytes) => RecordField::Uuid(Uuid::from_bytes_le(bytes)),
                Err(_) => RecordField::Unknown(field.raw_type, data.to_vec()),
            },
            record_type::GROUP => RecordField::Group(parse_string(data)),
            record_type::TITLE => RecordField::Title(parse_string(data)),
            record_type::USER => RecordField::User(parse_string(data)),
            record_type::NOTES => RecordField::Notes(parse_string(data)),
            record_type::PASSWD => RecordField::Passwd(parse_string(data)),
            record_type::CREATED => match parse_u32(data) {
                Some(timestamp) => RecordField::Created(timestamp),
                None => RecordField::Unknown(field.raw_type, data.to_vec()),
            },
            record_type::LAST_MOD => match parse_u32(data) {
                Some(timestamp) => RecordField::LastMod(timestamp),
                None => RecordField::Unknown(field.raw_type, data.to_vec()),
            },
            record_type::URL => RecordField::Url(parse_string(data)),
            END_OF_ENTRY => RecordField::EndOfEntry,
            other => RecordField::Unknown(other, data.to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_fields_parse_by_type() {
        let version = Field::new(header_type::VERSION, vec![0x0f, 0x03]);
        assert_eq!(HeaderField::new(&version), HeaderField::Version(0x030f));

        let saved = Field::new(header_type::WHAT_SAVED, b"pwvault v0.1.0".to_vec());
        assert_eq!(
            HeaderField::new(&saved),
            HeaderField::WhatSaved("pwvault v0.1.0".into())
        );

        assert_eq!(
            HeaderField::new(&Field::end_of_entry()),
            HeaderField::EndOfEntry
        );
    }

    #[test]
    fn record_fields_parse_by_type() {
        let uuid = Uuid::new_v4();
        let field = Field::new(record_type::UUID, uuid.to_bytes_le().to_vec());
        assert_eq!(RecordField::new(&field), RecordField::Uuid(uuid));

        let field = Field::new(record_type::CREATED, vec![0x00, 0xe1, 0xf5, 0x05]);
        assert_eq!(RecordField::new(&field), RecordField::Created(100_000_000));

        let field = Field::new(0x42, vec![1, 2, 3]);
        assert_eq!(RecordField::new(&field), RecordField::Unknown(0x42, vec![1, 2, 3]));
    }

    #[test]
    fn wrong_length_integers_fall_back_to_unknown() {
        let field = Field::new(record_type::LAST_MOD, vec![1, 2, 3]);
        assert_eq!(
            RecordField::new(&field),
            RecordField::Unknown(record_type::LAST_MOD, vec![1, 2, 3])
        );

        let field = Field::new(header_type::VERSION, vec![9]);
        assert_eq!(
            HeaderField::new(&field),
            HeaderField::Unknown(header_type::VERSION, vec![9])
        );
    }

    #[test]
    fn malformed_utf8_is_replaced_not_rejected() {
        let field = Field::new(record_type::TITLE, vec![0x41, 0xff, 0x42]);
        assert_eq!(
            RecordField::new(&field),
            RecordField::Title("A\u{fffd}B".into())
        );
    }
}
