//! In-memory firmware images

use std::borrow::Cow;

use log::debug;

use crate::{
    header::{
        build_header_with, check_digest, check_length, compute_integrity_hash, decode_header,
        seal_header, spec, split_header, Digest, FieldKind, FieldName, FieldSpec, FieldValue,
        HeaderFields, RawHeader, TextOverflow, DIGEST_SIZE, LAYOUT,
    },
    Error,
};

/// A firmware image: a header followed by an opaque payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareImage<'a> {
    header: RawHeader,
    payload: Cow<'a, [u8]>,
}

impl<'a> FirmwareImage<'a> {
    /// Split the contents of an image file into header and payload.
    pub fn from_bytes(bytes: &'a [u8]) -> Result<Self, Error> {
        let (header, payload) = split_header(bytes)?;

        Ok(Self {
            header,
            payload: Cow::Borrowed(payload),
        })
    }

    /// Create a sealed image for `payload`.
    ///
    /// `length` is always set to the size of the payload; any value supplied in
    /// `fields` is replaced.
    pub fn new(
        fields: &HeaderFields,
        payload: impl Into<Cow<'a, [u8]>>,
        overflow: TextOverflow,
    ) -> Result<Self, Error> {
        let payload = payload.into();
        let length = u32::try_from(payload.len())
            .map_err(|_| Error::encode(FieldName::Length, "payload is larger than 4 GiB"))?;

        let mut fields = fields.clone();
        fields.insert(FieldName::Length, length);

        let header = build_header_with(&fields, overflow)?;
        let digest = compute_integrity_hash(&header, &payload);

        Ok(Self {
            header: seal_header(header, &digest),
            payload,
        })
    }

    pub fn header(&self) -> &RawHeader {
        &self.header
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Decoded header fields
    pub fn fields(&self) -> HeaderFields {
        decode_header(&self.header)
    }

    /// The digest currently stored in the header
    pub fn stored_digest(&self) -> Digest {
        let mut digest = [0u8; DIGEST_SIZE];
        digest.copy_from_slice(&self.header[..DIGEST_SIZE]);
        digest
    }

    /// Whether the stored digest matches the header and payload
    pub fn is_sealed(&self) -> bool {
        self.verify().is_ok()
    }

    /// Recompute the digest and compare it with the stored one.
    pub fn verify(&self) -> Result<Digest, Error> {
        let computed = compute_integrity_hash(&self.header, &self.payload);
        check_digest(&self.header, &computed)?;
        check_length(&self.header, self.payload.len() as u64);

        Ok(computed)
    }

    /// Apply `edits` to the header and re-seal it.
    ///
    /// Only editable fields may appear in `edits`. On error the image is left
    /// unchanged.
    pub fn update(&mut self, edits: &HeaderFields, overflow: TextOverflow) -> Result<(), Error> {
        let header = rebuild_header(&self.header, edits, overflow)?;
        let digest = compute_integrity_hash(&header, &self.payload);
        debug!("Re-sealed header with digest {}", hex::encode(digest));

        self.header = seal_header(header, &digest);
        Ok(())
    }

    /// The complete image, header first
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.header.len() + self.payload.len());
        bytes.extend_from_slice(&self.header);
        bytes.extend_from_slice(&self.payload);
        bytes
    }
}

/// Fail if `edits` touches a field that is not editable.
pub(crate) fn check_editable(edits: &HeaderFields) -> Result<(), Error> {
    match edits.iter().find(|(name, _)| !spec(**name).editable) {
        Some((name, _)) => Err(Error::FieldNotEditable { field: *name }),
        None => Ok(()),
    }
}

/// Decode `current`, overlay `edits` and build a new unsealed header.
///
/// Text fields that are not edited and do not decode as UTF-8 keep their raw
/// bytes.
pub(crate) fn rebuild_header(
    current: &RawHeader,
    edits: &HeaderFields,
    overflow: TextOverflow,
) -> Result<RawHeader, Error> {
    check_editable(edits)?;

    let mut fields = decode_header(current);
    let kept_raw = LAYOUT
        .iter()
        .filter(|spec| {
            spec.kind == FieldKind::Text
                && !edits.contains(spec.name)
                && fields.get(spec.name) == Some(&FieldValue::Unavailable)
        })
        .collect::<Vec<&FieldSpec>>();

    // Placeholder, overwritten with the stored bytes below
    for spec in &kept_raw {
        fields.insert(spec.name, "");
    }
    fields.overlay(edits);

    for (name, value) in edits {
        debug!("Setting {name} = {value}");
    }

    let mut header = build_header_with(&fields, overflow)?;
    for spec in kept_raw {
        debug!("Keeping raw bytes of {}", spec.name);
        header[spec.range()].copy_from_slice(&current[spec.range()]);
    }

    Ok(header)
}

/// Parse `name=value` pairs, as typed by a user, into header edits.
pub fn parse_edits<'s>(
    pairs: impl IntoIterator<Item = (&'s str, &'s str)>,
) -> Result<HeaderFields, Error> {
    pairs
        .into_iter()
        .map(|(name, value)| {
            let name: FieldName = name
                .trim()
                .parse()
                .map_err(|_| Error::UnknownField(name.to_owned()))?;
            let value = FieldValue::parse(spec(name), value)?;
            Ok((name, value))
        })
        .collect()
}
