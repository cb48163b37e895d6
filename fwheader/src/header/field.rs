//! Field values and the per-kind encode/decode rules

use std::fmt::{self, Display, Formatter};

use log::warn;
use serde::Deserialize;
use strum::{Display as StrumDisplay, EnumString};

use super::layout::{FieldKind, FieldSpec, DIGEST_SIZE};
use crate::Error;

/// Shown in place of text fields that do not hold valid UTF-8
pub const NOT_AVAILABLE: &str = "N/A";

/// A decoded header field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Raw digest bytes
    Digest([u8; DIGEST_SIZE]),
    /// An unsigned integer
    Unsigned(u64),
    /// UTF-8 text, without padding
    Text(String),
    /// Hex digits, optionally prefixed with `0x`
    Hex(String),
    /// A text field whose bytes are not valid UTF-8
    Unavailable,
}

impl FieldValue {
    /// Convert user-entered text into the value shape expected by `spec`.
    pub fn parse(spec: &FieldSpec, input: &str) -> Result<Self, Error> {
        let value = match spec.kind {
            FieldKind::Digest => {
                let bytes = hex::decode(strip_hex_prefix(input.trim()))
                    .map_err(|e| Error::encode(spec.name, e.to_string()))?;
                let digest = <[u8; DIGEST_SIZE]>::try_from(bytes.as_slice()).map_err(|_| {
                    Error::encode(
                        spec.name,
                        format!("expected {DIGEST_SIZE} bytes, got {}", bytes.len()),
                    )
                })?;
                FieldValue::Digest(digest)
            }
            FieldKind::LengthLe => FieldValue::Unsigned(parse_unsigned(spec, input)?),
            FieldKind::Text => FieldValue::Text(input.to_owned()),
            FieldKind::HexBytes => FieldValue::Hex(input.trim().to_owned()),
        };

        Ok(value)
    }

    /// The digest bytes, if this is a digest value
    pub fn as_digest(&self) -> Option<&[u8; DIGEST_SIZE]> {
        match self {
            FieldValue::Digest(digest) => Some(digest),
            _ => None,
        }
    }

    /// The integer, if this is an unsigned value
    pub fn as_unsigned(&self) -> Option<u64> {
        match self {
            FieldValue::Unsigned(n) => Some(*n),
            _ => None,
        }
    }

    /// The text, if this is a text or hex value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) | FieldValue::Hex(s) => Some(s),
            _ => None,
        }
    }
}

impl Display for FieldValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Digest(digest) => f.write_str(&hex::encode(digest)),
            FieldValue::Unsigned(n) => write!(f, "{n}"),
            FieldValue::Text(s) | FieldValue::Hex(s) => f.write_str(s),
            FieldValue::Unavailable => f.write_str(NOT_AVAILABLE),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_owned())
    }
}

impl From<u32> for FieldValue {
    fn from(n: u32) -> Self {
        FieldValue::Unsigned(n.into())
    }
}

/// What to do with text that does not fit in its field
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, StrumDisplay, EnumString, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TextOverflow {
    /// Cut the encoded text at the field size; may split a UTF-8 sequence
    #[default]
    Truncate,
    /// Fail with [Error::FieldEncode]
    Reject,
}

/// Decode the raw bytes of one field.
pub(crate) fn decode(spec: &FieldSpec, bytes: &[u8]) -> FieldValue {
    debug_assert_eq!(bytes.len(), spec.size);

    match spec.kind {
        FieldKind::Digest => {
            let mut digest = [0u8; DIGEST_SIZE];
            digest.copy_from_slice(bytes);
            FieldValue::Digest(digest)
        }
        FieldKind::LengthLe => {
            let mut buf = [0u8; 8];
            buf[..bytes.len()].copy_from_slice(bytes);
            FieldValue::Unsigned(u64::from_le_bytes(buf))
        }
        FieldKind::Text => {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            match std::str::from_utf8(&bytes[..end]) {
                Ok(text) => FieldValue::Text(text.to_owned()),
                Err(_) => FieldValue::Unavailable,
            }
        }
        FieldKind::HexBytes => match bytes {
            [byte] => FieldValue::Hex(format!("0x{byte:02X}")),
            _ => FieldValue::Hex(hex::encode_upper(bytes)),
        },
    }
}

/// Encode a value into exactly `spec.size` bytes.
pub(crate) fn encode(
    spec: &FieldSpec,
    value: &FieldValue,
    overflow: TextOverflow,
) -> Result<Vec<u8>, Error> {
    let bytes = match (spec.kind, value) {
        (FieldKind::Digest, FieldValue::Digest(digest)) => digest.to_vec(),
        (FieldKind::LengthLe, FieldValue::Unsigned(n)) => encode_unsigned(spec, *n)?,
        (FieldKind::LengthLe, FieldValue::Text(s)) => {
            encode_unsigned(spec, parse_unsigned(spec, s)?)?
        }
        (FieldKind::Text, FieldValue::Text(s)) => encode_text(spec, s, overflow)?,
        (FieldKind::Text, FieldValue::Unavailable) => {
            return Err(Error::encode(
                spec.name,
                "the current value is not valid UTF-8, a replacement must be supplied",
            ))
        }
        (FieldKind::HexBytes, FieldValue::Hex(s) | FieldValue::Text(s)) => {
            encode_hex_bytes(spec, s)?
        }
        (kind, value) => {
            return Err(Error::encode(
                spec.name,
                format!("a {kind:?} field cannot hold the value '{value}'"),
            ))
        }
    };

    debug_assert_eq!(bytes.len(), spec.size);
    Ok(bytes)
}

fn strip_hex_prefix(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

fn parse_unsigned(spec: &FieldSpec, input: &str) -> Result<u64, Error> {
    let input = input.trim();
    if input.starts_with('-') {
        return Err(Error::encode(spec.name, "value must not be negative"));
    }

    input
        .parse::<u64>()
        .map_err(|e| Error::encode(spec.name, format!("'{input}' is not a number: {e}")))
}

fn encode_unsigned(spec: &FieldSpec, n: u64) -> Result<Vec<u8>, Error> {
    let bits = spec.size * 8;
    if bits < u64::BITS as usize && n >> bits != 0 {
        return Err(Error::encode(
            spec.name,
            format!("{n} does not fit in {} bytes", spec.size),
        ));
    }

    Ok(n.to_le_bytes()[..spec.size].to_vec())
}

fn encode_text(spec: &FieldSpec, text: &str, overflow: TextOverflow) -> Result<Vec<u8>, Error> {
    let mut bytes = text.as_bytes().to_vec();

    if bytes.len() > spec.size {
        match overflow {
            TextOverflow::Truncate => {
                warn!(
                    "Truncating `{}` from {} to {} bytes",
                    spec.name,
                    bytes.len(),
                    spec.size
                );
                bytes.truncate(spec.size);
            }
            TextOverflow::Reject => {
                return Err(Error::encode(
                    spec.name,
                    format!(
                        "text is {} bytes long but the field holds {}",
                        bytes.len(),
                        spec.size
                    ),
                ))
            }
        }
    }

    bytes.resize(spec.size, 0);
    Ok(bytes)
}

fn encode_hex_bytes(spec: &FieldSpec, input: &str) -> Result<Vec<u8>, Error> {
    let digits = strip_hex_prefix(input.trim());
    let digits = if spec.size == 1 && digits.len() % 2 == 1 {
        format!("0{digits}")
    } else {
        digits.to_owned()
    };

    let bytes = hex::decode(&digits)
        .map_err(|e| Error::encode(spec.name, format!("'{input}' is not valid hex: {e}")))?;

    if bytes.len() != spec.size {
        return Err(Error::encode(
            spec.name,
            format!("expected {} bytes, got {}", spec.size, bytes.len()),
        ));
    }

    Ok(bytes)
}
