//! Byte layout of the firmware image header
//!
//! The header is a fixed 1024-byte block at the start of every image. Its named
//! fields are packed back to back from offset 0, in the order of [LAYOUT]; the
//! bytes after the last field are reserved and always zero.

use strum::{Display, EnumIter, EnumString, VariantNames};

/// Total size of the header in bytes
pub const HEADER_SIZE: usize = 1024;

/// Size of the SHA-256 integrity digest stored at the start of the header
pub const DIGEST_SIZE: usize = 32;

/// Names of all header fields, in layout order
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumIter,
    EnumString,
    VariantNames,
)]
#[strum(serialize_all = "snake_case")]
pub enum FieldName {
    ContentHash,
    Length,
    ModelName,
    CpoId,
    Version,
    ImageType,
    DevVersion,
    DebugLevel,
}

/// How the bytes of a field are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Raw SHA-256 digest bytes
    Digest,
    /// Unsigned little-endian integer
    LengthLe,
    /// UTF-8 text, NUL padded
    Text,
    /// Raw bytes shown as hex digits
    HexBytes,
}

/// A single named range of the header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: FieldName,
    pub size: usize,
    pub editable: bool,
    pub kind: FieldKind,
}

impl FieldSpec {
    const fn new(name: FieldName, size: usize, editable: bool, kind: FieldKind) -> Self {
        Self {
            name,
            size,
            editable,
            kind,
        }
    }

    /// Byte offset of this field from the start of the header
    pub fn offset(&self) -> usize {
        LAYOUT
            .iter()
            .take_while(|spec| spec.name != self.name)
            .map(|spec| spec.size)
            .sum()
    }

    /// The byte range this field occupies within the header
    pub fn range(&self) -> std::ops::Range<usize> {
        let offset = self.offset();
        offset..offset + self.size
    }
}

const FIELDS: [FieldSpec; 8] = [
    FieldSpec::new(FieldName::ContentHash, DIGEST_SIZE, false, FieldKind::Digest),
    FieldSpec::new(FieldName::Length, 4, false, FieldKind::LengthLe),
    FieldSpec::new(FieldName::ModelName, 64, true, FieldKind::Text),
    FieldSpec::new(FieldName::CpoId, 32, true, FieldKind::Text),
    FieldSpec::new(FieldName::Version, 3, true, FieldKind::HexBytes),
    FieldSpec::new(FieldName::ImageType, 1, true, FieldKind::HexBytes),
    FieldSpec::new(FieldName::DevVersion, 16, false, FieldKind::Text),
    FieldSpec::new(FieldName::DebugLevel, 1, true, FieldKind::HexBytes),
];

/// The header layout, in on-disk order
pub static LAYOUT: [FieldSpec; 8] = FIELDS;

/// Number of bytes covered by named fields; everything after is reserved
pub const FIELDS_SIZE: usize = {
    let mut total = 0;
    let mut i = 0;
    while i < FIELDS.len() {
        total += FIELDS[i].size;
        i += 1;
    }
    total
};

const _: () = assert!(FIELDS_SIZE <= HEADER_SIZE);
const _: () = assert!(FIELDS[0].size == DIGEST_SIZE);

/// Look up the layout entry for a field
pub fn spec(name: FieldName) -> &'static FieldSpec {
    // Every `FieldName` variant has exactly one entry in `LAYOUT`.
    LAYOUT
        .iter()
        .find(|spec| spec.name == name)
        .unwrap_or_else(|| unreachable!("field {name} missing from layout"))
}
