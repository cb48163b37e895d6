//! Firmware image header codec
//!
//! An image is a [HEADER_SIZE]-byte header followed by an opaque payload. The
//! first [DIGEST_SIZE] bytes of the header hold the SHA-256 digest of the whole
//! header, with those digest bytes zeroed, followed by the payload.
//!
//! Saving an edited header is always the same sequence: [read_header], overlay
//! the changed values, [build_header], [compute_integrity_hash] over the new
//! header and the unchanged payload, then [seal_header].

use std::{
    collections::{btree_map, BTreeMap},
    io::{self, Read},
};

use log::{debug, warn};
use sha2::{Digest as _, Sha256};

pub use self::{
    field::{FieldValue, TextOverflow, NOT_AVAILABLE},
    layout::{spec, FieldKind, FieldName, FieldSpec, DIGEST_SIZE, FIELDS_SIZE, HEADER_SIZE, LAYOUT},
};
use crate::{progress::ProgressCallbacks, Error};

mod field;
mod layout;

/// A SHA-256 integrity digest
pub type Digest = [u8; DIGEST_SIZE];

/// A raw header
pub type RawHeader = [u8; HEADER_SIZE];

const HASH_CHUNK_SIZE: usize = 0x4000;

/// Header field values keyed by field name, iterated in layout order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderFields(BTreeMap<FieldName, FieldValue>);

impl HeaderFields {
    /// An empty set of fields
    pub fn new() -> Self {
        Self::default()
    }

    /// The value of `name`, if present
    pub fn get(&self, name: FieldName) -> Option<&FieldValue> {
        self.0.get(&name)
    }

    /// Set `name`, returning the previous value
    pub fn insert(&mut self, name: FieldName, value: impl Into<FieldValue>) -> Option<FieldValue> {
        self.0.insert(name, value.into())
    }

    /// Remove `name`, returning its value
    pub fn remove(&mut self, name: FieldName) -> Option<FieldValue> {
        self.0.remove(&name)
    }

    pub fn contains(&self, name: FieldName) -> bool {
        self.0.contains_key(&name)
    }

    /// Number of fields present
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the fields in layout order
    pub fn iter(&self) -> btree_map::Iter<'_, FieldName, FieldValue> {
        self.0.iter()
    }

    /// The stored integrity digest, if present
    pub fn content_hash(&self) -> Option<&Digest> {
        self.get(FieldName::ContentHash).and_then(FieldValue::as_digest)
    }

    /// The stored payload length, if present
    pub fn length(&self) -> Option<u64> {
        self.get(FieldName::Length).and_then(FieldValue::as_unsigned)
    }

    /// Replace values with the ones in `edits`, keeping everything else.
    pub fn overlay(&mut self, edits: &HeaderFields) {
        for (name, value) in edits {
            self.0.insert(*name, value.clone());
        }
    }
}

impl<'a> IntoIterator for &'a HeaderFields {
    type Item = (&'a FieldName, &'a FieldValue);
    type IntoIter = btree_map::Iter<'a, FieldName, FieldValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl FromIterator<(FieldName, FieldValue)> for HeaderFields {
    fn from_iter<T: IntoIterator<Item = (FieldName, FieldValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Copy the header out of a full image, checking the minimum size.
pub fn split_header(file_bytes: &[u8]) -> Result<(RawHeader, &[u8]), Error> {
    if file_bytes.len() < HEADER_SIZE {
        return Err(Error::TooSmall {
            minimum: HEADER_SIZE,
            actual: file_bytes.len(),
        });
    }

    let (head, payload) = file_bytes.split_at(HEADER_SIZE);
    let mut header = [0u8; HEADER_SIZE];
    header.copy_from_slice(head);

    Ok((header, payload))
}

/// Decode every header field from the start of `file_bytes`.
pub fn read_header(file_bytes: &[u8]) -> Result<HeaderFields, Error> {
    let (header, _) = split_header(file_bytes)?;
    Ok(decode_header(&header))
}

/// Decode every field of a raw header.
pub fn decode_header(header: &RawHeader) -> HeaderFields {
    let mut offset = 0;

    LAYOUT
        .iter()
        .map(|spec| {
            let value = field::decode(spec, &header[offset..offset + spec.size]);
            offset += spec.size;
            (spec.name, value)
        })
        .collect()
}

/// Build a header from field values, truncating text that is too long.
///
/// The digest bytes are left zeroed; see [seal_header].
pub fn build_header(values: &HeaderFields) -> Result<RawHeader, Error> {
    build_header_with(values, TextOverflow::default())
}

/// Build a header from field values using the given text overflow policy.
///
/// `content_hash` is never taken from `values`. `dev_version` is reserved and
/// always written as zeroes. Every other field must be present.
pub fn build_header_with(values: &HeaderFields, overflow: TextOverflow) -> Result<RawHeader, Error> {
    let mut header = [0u8; HEADER_SIZE];

    for spec in LAYOUT.iter() {
        match spec.name {
            FieldName::ContentHash | FieldName::DevVersion => continue,
            _ => {}
        }

        let value = values
            .get(spec.name)
            .ok_or(Error::MissingField { field: spec.name })?;
        let bytes = field::encode(spec, value, overflow)?;

        header[spec.range()].copy_from_slice(&bytes);
    }

    Ok(header)
}

/// Incremental computation of the integrity digest
///
/// The header is hashed first with its digest bytes zeroed, then any number of
/// payload chunks.
#[derive(Debug, Clone)]
pub struct IntegrityHasher {
    hasher: Sha256,
}

impl IntegrityHasher {
    pub fn new(header: &RawHeader) -> Self {
        let mut hasher = Sha256::new();
        hasher.update([0u8; DIGEST_SIZE]);
        hasher.update(&header[DIGEST_SIZE..]);

        Self { hasher }
    }

    pub fn update(&mut self, payload: &[u8]) {
        self.hasher.update(payload);
    }

    pub fn finalize(self) -> Digest {
        self.hasher.finalize().into()
    }
}

/// Compute the integrity digest of a header and its payload.
///
/// Whatever is in the header's digest bytes is ignored.
pub fn compute_integrity_hash(header: &RawHeader, payload: &[u8]) -> Digest {
    let mut hasher = IntegrityHasher::new(header);
    hasher.update(payload);
    hasher.finalize()
}

/// Compute the integrity digest, streaming the payload from `payload`.
///
/// `payload_len` is only used for progress reporting.
pub fn compute_integrity_hash_reader<R: Read>(
    header: &RawHeader,
    mut payload: R,
    payload_len: usize,
    mut progress: Option<&mut dyn ProgressCallbacks>,
) -> io::Result<Digest> {
    let mut hasher = IntegrityHasher::new(header);
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];
    let mut done = 0;

    if let Some(cb) = progress.as_mut() {
        cb.init(payload_len);
    }

    loop {
        let n = match payload.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };

        hasher.update(&buf[..n]);
        done += n;

        if let Some(cb) = progress.as_mut() {
            cb.update(done);
        }
    }

    if let Some(cb) = progress.as_mut() {
        cb.finish();
    }

    Ok(hasher.finalize())
}

/// Store `digest` in the header's digest bytes.
pub fn seal_header(mut header: RawHeader, digest: &Digest) -> RawHeader {
    header[..DIGEST_SIZE].copy_from_slice(digest);
    header
}

/// Check the stored digest of a complete image against its contents.
pub fn verify_image(file_bytes: &[u8]) -> Result<Digest, Error> {
    let (header, payload) = split_header(file_bytes)?;
    let computed = compute_integrity_hash(&header, payload);

    check_digest(&header, &computed)?;
    check_length(&header, payload.len() as u64);

    Ok(computed)
}

pub(crate) fn check_digest(header: &RawHeader, computed: &Digest) -> Result<(), Error> {
    let stored = &header[..DIGEST_SIZE];
    debug!("Stored digest: {}", hex::encode(stored));
    debug!("Computed digest: {}", hex::encode(computed));

    if stored != computed {
        return Err(Error::DigestMismatch {
            expected: hex::encode(stored),
            computed: hex::encode(computed),
        });
    }

    Ok(())
}

pub(crate) fn check_length(header: &RawHeader, payload_len: u64) {
    let spec = spec(FieldName::Length);
    if let FieldValue::Unsigned(length) = field::decode(spec, &header[spec.range()]) {
        if length != payload_len {
            warn!("Header length is {length} bytes but the payload is {payload_len} bytes");
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use sha2::Digest as _;

    use super::*;

    fn scenario_fields() -> HeaderFields {
        let mut fields = HeaderFields::new();
        fields.insert(FieldName::ModelName, "ABC");
        fields.insert(FieldName::CpoId, "XYZ");
        fields.insert(FieldName::Version, FieldValue::Hex("010203".into()));
        fields.insert(FieldName::ImageType, FieldValue::Hex("0x01".into()));
        fields.insert(FieldName::DebugLevel, FieldValue::Hex("0x00".into()));
        fields.insert(FieldName::Length, 4u32);
        fields
    }

    #[test]
    fn build_places_fields_at_their_offsets() {
        let header = build_header(&scenario_fields()).unwrap();

        assert_eq!(header.len(), HEADER_SIZE);
        assert_eq!(&header[0..32], &[0u8; 32]);
        assert_eq!(&header[32..36], &[4, 0, 0, 0]);
        assert_eq!(&header[36..39], b"ABC");
        assert!(header[39..100].iter().all(|&b| b == 0));
        assert_eq!(&header[100..103], b"XYZ");
        assert!(header[103..132].iter().all(|&b| b == 0));
        assert_eq!(&header[132..135], &[1, 2, 3]);
        assert_eq!(header[135], 0x01);
        assert_eq!(&header[136..152], &[0u8; 16]);
        assert_eq!(header[152], 0x00);
        assert!(header[153..].iter().all(|&b| b == 0));
    }

    #[test]
    fn scenario_digest_matches_independent_sha256() {
        let payload = [1u8, 2, 3, 4];
        let header = build_header(&scenario_fields()).unwrap();
        let digest = compute_integrity_hash(&header, &payload);

        let mut expected = Sha256::new();
        expected.update(header);
        expected.update(payload);
        let expected: Digest = expected.finalize().into();

        assert_eq!(digest, expected);

        let sealed = seal_header(header, &digest);
        assert_eq!(&sealed[..32], &digest);
        assert_eq!(&sealed[32..], &header[32..]);
    }

    #[test]
    fn read_back_built_header() {
        let payload = [1u8, 2, 3, 4];
        let header = build_header(&scenario_fields()).unwrap();
        let digest = compute_integrity_hash(&header, &payload);
        let sealed = seal_header(header, &digest);

        let mut image = sealed.to_vec();
        image.extend_from_slice(&payload);

        let fields = read_header(&image).unwrap();
        assert_eq!(fields.len(), LAYOUT.len());
        assert_eq!(fields.length(), Some(4));
        assert_eq!(fields.get(FieldName::ModelName), Some(&"ABC".into()));
        assert_eq!(fields.get(FieldName::CpoId), Some(&"XYZ".into()));
        assert_eq!(
            fields.get(FieldName::Version),
            Some(&FieldValue::Hex("010203".into()))
        );
        assert_eq!(
            fields.get(FieldName::ImageType),
            Some(&FieldValue::Hex("0x01".into()))
        );
        assert_eq!(fields.get(FieldName::DevVersion), Some(&"".into()));
        assert_eq!(fields.content_hash(), Some(&digest));

        assert!(verify_image(&image).is_ok());
    }

    #[test]
    fn read_header_size_boundary() {
        let err = read_header(&[0u8; HEADER_SIZE - 1]).unwrap_err();
        assert!(matches!(
            err,
            Error::TooSmall {
                minimum: HEADER_SIZE,
                actual: 1023
            }
        ));

        let fields = read_header(&[0u8; HEADER_SIZE]).unwrap();
        assert_eq!(fields.length(), Some(0));
    }

    #[test]
    fn build_requires_editable_fields() {
        let mut fields = scenario_fields();
        fields.remove(FieldName::DebugLevel);

        let err = build_header(&fields).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingField {
                field: FieldName::DebugLevel
            }
        ));
    }

    #[test]
    fn build_ignores_supplied_digest_and_dev_version() {
        let mut fields = scenario_fields();
        fields.insert(FieldName::ContentHash, FieldValue::Digest([0xFF; 32]));
        fields.insert(FieldName::DevVersion, "dev-1");

        let header = build_header(&fields).unwrap();
        assert_eq!(header, build_header(&scenario_fields()).unwrap());
    }

    #[test]
    fn build_is_always_header_sized() {
        let mut fields = scenario_fields();
        fields.insert(FieldName::ModelName, "m".repeat(500).as_str());
        fields.insert(FieldName::CpoId, "");

        let header = build_header(&fields).unwrap();
        assert_eq!(header.len(), HEADER_SIZE);
        assert_eq!(&header[36..100], &[b'm'; 64]);
    }

    #[test]
    fn hash_ignores_existing_digest_bytes() {
        let payload = b"payload";
        let header = build_header(&scenario_fields()).unwrap();
        let dirty = seal_header(header, &[0x5A; 32]);

        assert_eq!(
            compute_integrity_hash(&header, payload),
            compute_integrity_hash(&dirty, payload)
        );
    }

    #[test]
    fn hash_depends_on_payload_and_fields() {
        let header = build_header(&scenario_fields()).unwrap();
        let base = compute_integrity_hash(&header, &[1, 2, 3, 4]);

        assert_eq!(base, compute_integrity_hash(&header, &[1, 2, 3, 4]));
        assert_ne!(base, compute_integrity_hash(&header, &[1, 2, 3, 5]));

        let mut fields = scenario_fields();
        fields.insert(FieldName::DebugLevel, FieldValue::Hex("0x01".into()));
        let edited = build_header(&fields).unwrap();
        assert_ne!(base, compute_integrity_hash(&edited, &[1, 2, 3, 4]));
    }

    #[test]
    fn streaming_hash_matches_buffered() {
        struct Recorder(Vec<usize>, bool);

        impl ProgressCallbacks for Recorder {
            fn init(&mut self, total: usize) {
                self.0.push(total);
            }

            fn update(&mut self, current: usize) {
                self.0.push(current);
            }

            fn finish(&mut self) {
                self.1 = true;
            }
        }

        let header = build_header(&scenario_fields()).unwrap();
        let payload: Vec<u8> = (0..HASH_CHUNK_SIZE * 2 + 17).map(|i| i as u8).collect();

        let mut progress = Recorder(Vec::new(), false);
        let streamed =
            compute_integrity_hash_reader(&header, payload.as_slice(), payload.len(), Some(&mut progress))
                .unwrap();

        assert_eq!(streamed, compute_integrity_hash(&header, &payload));
        assert_eq!(progress.0.first(), Some(&payload.len()));
        assert_eq!(progress.0.last(), Some(&payload.len()));
        assert!(progress.1);
    }

    #[test]
    fn verify_detects_tampering() {
        let header = build_header(&scenario_fields()).unwrap();
        let payload = [9u8; 4];
        let mut image = seal_header(header, &compute_integrity_hash(&header, &payload)).to_vec();
        image.extend_from_slice(&payload);

        image[HEADER_SIZE] ^= 1;
        assert!(matches!(
            verify_image(&image),
            Err(Error::DigestMismatch { .. })
        ));
    }

    #[test]
    fn overlay_replaces_only_given_fields() {
        let mut fields = scenario_fields();
        let mut edits = HeaderFields::new();
        edits.insert(FieldName::CpoId, "NEW");

        fields.overlay(&edits);
        assert_eq!(fields.get(FieldName::CpoId), Some(&"NEW".into()));
        assert_eq!(fields.get(FieldName::ModelName), Some(&"ABC".into()));
    }
}
