//! In-memory header and record entities.
//!
//! Both keep the raw on-disk fields in insertion order, so a loaded vault
//! serialises its fields back in the order they were read and unknown field
//! types survive untouched. On top of the raw map, records cache decoded
//! values for the well-known types; typed setters write both sides.

use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{ByteOrder, LittleEndian};
use chrono::{Local, TimeZone};
use uuid::Uuid;

use crate::field::{header_type, record_type, Field, HeaderField, RecordField};

pub(crate) fn now_timestamp() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs() as u32)
        .unwrap_or(0)
}

fn encode_u32(value: u32) -> Vec<u8> {
    let mut buf = vec![0u8; 4];
    LittleEndian::write_u32(&mut buf, value);
    buf
}

/// Replaces the field of the same type in place, or appends.
fn upsert(fields: &mut Vec<Field>, field: Field) {
    match fields.iter_mut().find(|f| f.raw_type == field.raw_type) {
        Some(slot) => *slot = field,
        None => fields.push(field),
    }
}

/// The vault header: raw fields plus typed views over the known types.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Header {
    fields: Vec<Field>,
}

impl Header {
    pub fn new() -> Self {
        Header::default()
    }

    pub fn add_raw_field(&mut self, field: Field) {
        upsert(&mut self.fields, field);
    }

    pub fn raw_field(&self, raw_type: u8) -> Option<&Field> {
        self.fields.iter().find(|f| f.raw_type == raw_type)
    }

    /// All fields in insertion order.
    pub fn raw_fields(&self) -> &[Field] {
        &self.fields
    }

    /// Format version as a four-hex-digit string.
    pub fn version(&self) -> Option<String> {
        match HeaderField::new(self.raw_field(header_type::VERSION)?) {
            HeaderField::Version(version) => Some(format!("{version:04x}")),
            _ => None,
        }
    }

    /// Timestamp of the last save, rendered as local time.
    pub fn last_save(&self) -> Option<String> {
        match HeaderField::new(self.raw_field(header_type::LAST_SAVE)?) {
            HeaderField::LastSave(timestamp) => Local
                .timestamp_opt(i64::from(timestamp), 0)
                .single()
                .map(|when| when.format("%Y-%m-%d %H:%M:%S").to_string()),
            _ => None,
        }
    }

    /// The producer string recorded by the last save.
    pub fn what_saved(&self) -> Option<String> {
        match HeaderField::new(self.raw_field(header_type::WHAT_SAVED)?) {
            HeaderField::WhatSaved(producer) => Some(producer),
            _ => None,
        }
    }
}

/// One password entry.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<Field>,
    uuid: Option<Uuid>,
    group: String,
    title: String,
    user: String,
    notes: String,
    passwd: String,
    url: String,
    created: u32,
    last_mod: u32,
}

impl Record {
    /// A fresh record with a new UUID and both timestamps set to now.
    pub fn new() -> Self {
        let mut record = Record::default();
        record.set_uuid(Uuid::new_v4());
        let now = now_timestamp();
        record.set_last_mod(now);
        record.set_created(now);
        record
    }

    /// Stores a raw field and refreshes the typed cache for known types.
    pub fn add_raw_field(&mut self, field: Field) {
        match RecordField::new(&field) {
            RecordField::Uuid(uuid) => self.uuid = Some(uuid),
            RecordField::Group(value) => self.group = value,
            RecordField::Title(value) => self.title = value,
            RecordField::User(value) => self.user = value,
            RecordField::Notes(value) => self.notes = value,
            RecordField::Passwd(value) => self.passwd = value,
            RecordField::Created(timestamp) => self.created = timestamp,
            RecordField::LastMod(timestamp) => self.last_mod = timestamp,
            RecordField::Url(value) => self.url = value,
            RecordField::EndOfEntry | RecordField::Unknown(..) => {}
        }
        upsert(&mut self.fields, field);
    }

    pub fn raw_field(&self, raw_type: u8) -> Option<&Field> {
        self.fields.iter().find(|f| f.raw_type == raw_type)
    }

    /// All fields in insertion order.
    pub fn raw_fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn uuid(&self) -> Option<Uuid> {
        self.uuid
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn notes(&self) -> &str {
        &self.notes
    }

    pub fn passwd(&self) -> &str {
        &self.passwd
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn created(&self) -> u32 {
        self.created
    }

    pub fn last_mod(&self) -> u32 {
        self.last_mod
    }

    /// Stamps the record as modified right now.
    pub fn mark_modified(&mut self) {
        self.set_last_mod(now_timestamp());
    }

    pub fn set_uuid(&mut self, uuid: Uuid) {
        self.uuid = Some(uuid);
        upsert(
            &mut self.fields,
            Field::new(record_type::UUID, uuid.to_bytes_le().to_vec()),
        );
        self.mark_modified();
    }

    pub fn set_group(&mut self, value: &str) {
        self.group = value.to_owned();
        upsert(
            &mut self.fields,
            Field::new(record_type::GROUP, value.as_bytes().to_vec()),
        );
        self.mark_modified();
    }

    pub fn set_title(&mut self, value: &str) {
        self.title = value.to_owned();
        upsert(
            &mut self.fields,
            Field::new(record_type::TITLE, value.as_bytes().to_vec()),
        );
        self.mark_modified();
    }

    pub fn set_user(&mut self, value: &str) {
        self.user = value.to_owned();
        upsert(
            &mut self.fields,
            Field::new(record_type::USER, value.as_bytes().to_vec()),
        );
        self.mark_modified();
    }

    pub fn set_notes(&mut self, value: &str) {
        self.notes = value.to_owned();
        upsert(
            &mut self.fields,
            Field::new(record_type::NOTES, value.as_bytes().to_vec()),
        );
        self.mark_modified();
    }

    pub fn set_passwd(&mut self, value: &str) {
        self.passwd = value.to_owned();
        upsert(
            &mut self.fields,
            Field::new(record_type::PASSWD, value.as_bytes().to_vec()),
        );
        self.mark_modified();
    }

    pub fn set_url(&mut self, value: &str) {
        self.url = value.to_owned();
        upsert(
            &mut self.fields,
            Field::new(record_type::URL, value.as_bytes().to_vec()),
        );
        self.mark_modified();
    }

    /// Timestamp setters leave the modification time alone.
    pub fn set_created(&mut self, timestamp: u32) {
        self.created = timestamp;
        upsert(
            &mut self.fields,
            Field::new(record_type::CREATED, encode_u32(timestamp)),
        );
    }

    pub fn set_last_mod(&mut self, timestamp: u32) {
        self.last_mod = timestamp;
        upsert(
            &mut self.fields,
            Field::new(record_type::LAST_MOD, encode_u32(timestamp)),
        );
    }

    /// Replaces all fields of `self` with those of `other`, re-deriving the
    /// typed views through the standard parser.
    pub fn merge(&mut self, other: &Record) {
        *self = Record::default();
        for field in other.fields.iter() {
            self.add_raw_field(field.clone());
        }
    }

    /// Whether two records describe the same entry: UUID equality when both
    /// carry one, title equality otherwise.
    pub fn is_corresponding(&self, other: &Record) -> bool {
        match (self.uuid, other.uuid) {
            (Some(own), Some(theirs)) => own == theirs,
            _ => self.title == other.title,
        }
    }

    /// Strict comparison of modification times.
    pub fn is_newer_than(&self, other: &Record) -> bool {
        self.last_mod > other.last_mod
    }

    /// A copy under a new identity: fresh UUID, timestamps set to now and
    /// " (copy)" appended to the title.
    pub fn duplicate(&self) -> Record {
        let mut copy = Record::default();
        copy.merge(self);
        copy.set_uuid(Uuid::new_v4());
        let now = now_timestamp();
        copy.set_last_mod(now);
        copy.set_created(now);
        copy.set_title(&format!("{} (copy)", self.title));
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_setters_update_the_raw_map() {
        let mut record = Record::default();
        record.set_title("Gmail");
        record.set_passwd("hunter2");

        assert_eq!(record.title(), "Gmail");
        assert_eq!(
            record.raw_field(record_type::TITLE).unwrap().raw_value,
            b"Gmail"
        );
        assert_eq!(
            record.raw_field(record_type::PASSWD).unwrap().raw_value,
            b"hunter2"
        );
    }

    #[test]
    fn raw_fields_update_the_typed_cache() {
        let mut record = Record::default();
        record.add_raw_field(Field::new(record_type::USER, b"alice".to_vec()));
        record.add_raw_field(Field::new(record_type::CREATED, encode_u32(1234)));

        assert_eq!(record.user(), "alice");
        assert_eq!(record.created(), 1234);
    }

    #[test]
    fn setters_bump_the_modification_time() {
        let before = now_timestamp();
        let mut record = Record::default();
        assert_eq!(record.last_mod(), 0);

        record.set_user("alice");
        assert!(record.last_mod() >= before);
        assert!(record.raw_field(record_type::LAST_MOD).is_some());
    }

    #[test]
    fn timestamp_setters_do_not_bump() {
        let mut record = Record::default();
        record.set_last_mod(77);
        record.set_created(33);

        assert_eq!(record.last_mod(), 77);
        assert_eq!(record.created(), 33);
    }

    #[test]
    fn replacing_a_field_keeps_its_position() {
        let mut record = Record::default();
        record.add_raw_field(Field::new(record_type::TITLE, b"one".to_vec()));
        record.add_raw_field(Field::new(0x42, vec![0xaa]));
        record.set_title("two");

        let types: Vec<u8> = record.raw_fields().iter().map(|f| f.raw_type).collect();
        assert_eq!(types, vec![record_type::TITLE, 0x42]);
        assert_eq!(record.title(), "two");
    }

    #[test]
    fn merge_replaces_all_fields() {
        let mut target = Record::default();
        target.set_title("stale");
        target.set_notes("stale notes");

        let mut source = Record::default();
        source.set_title("fresh");
        source.add_raw_field(Field::new(0x42, vec![1, 2, 3]));

        target.merge(&source);
        assert_eq!(target.title(), "fresh");
        assert_eq!(target.notes(), "");
        assert!(target.raw_field(record_type::NOTES).is_none());
        assert_eq!(target.raw_field(0x42).unwrap().raw_value, vec![1, 2, 3]);
    }

    #[test]
    fn correspondence_prefers_uuids_over_titles() {
        let uuid = Uuid::new_v4();

        let mut a = Record::default();
        let mut b = Record::default();
        a.set_uuid(uuid);
        b.set_uuid(uuid);
        a.set_title("one");
        b.set_title("two");
        assert!(a.is_corresponding(&b));

        b.set_uuid(Uuid::new_v4());
        assert!(!a.is_corresponding(&b));

        let mut c = Record::default();
        let mut d = Record::default();
        c.set_title("same");
        d.set_title("same");
        assert!(c.is_corresponding(&d));
    }

    #[test]
    fn newer_than_is_strict() {
        let mut old = Record::default();
        let mut new = Record::default();
        old.set_last_mod(10);
        new.set_last_mod(11);

        assert!(new.is_newer_than(&old));
        assert!(!old.is_newer_than(&new));
        assert!(!old.is_newer_than(&old));
    }

    #[test]
    fn duplicate_takes_a_new_identity() {
        let before = now_timestamp();
        let mut original = Record::new();
        original.set_title("Gmail");
        original.set_passwd("secret");

        let copy = original.duplicate();
        assert_ne!(copy.uuid(), original.uuid());
        assert_eq!(copy.title(), "Gmail (copy)");
        assert_eq!(copy.passwd(), "secret");
        assert_eq!(copy.created(), copy.last_mod());
        assert!(copy.created() >= before);
    }

    #[test]
    fn header_typed_views() {
        let mut header = Header::new();
        assert_eq!(header.version(), None);

        header.add_raw_field(Field::new(header_type::VERSION, vec![0x0f, 0x03]));
        header.add_raw_field(Field::new(header_type::WHAT_SAVED, b"pwvault v0.1.0".to_vec()));
        header.add_raw_field(Field::new(header_type::LAST_SAVE, encode_u32(1_754_006_400)));

        assert_eq!(header.version().as_deref(), Some("030f"));
        assert_eq!(header.what_saved().as_deref(), Some("pwvault v0.1.0"));
        // Rendered in local time, so only the shape is asserted.
        assert_eq!(header.last_save().unwrap().len(), 19);
    }
}
