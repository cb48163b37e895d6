//! Library and application errors

use std::io;

use miette::Diagnostic;
use strum::VariantNames;
use thiserror::Error;

use crate::header::FieldName;

/// All possible errors returned by fwheader
#[derive(Debug, Diagnostic, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("File too small to contain a valid header: {actual} bytes, at least {minimum} required")]
    #[diagnostic(
        code(fwheader::too_small),
        help("Firmware images start with a 1024-byte header; make sure the correct file was selected")
    )]
    TooSmall { minimum: usize, actual: usize },

    #[error("Value for `{field}` cannot be encoded: {reason}")]
    #[diagnostic(code(fwheader::field_encode))]
    FieldEncode { field: FieldName, reason: String },

    #[error("No value supplied for `{field}`")]
    #[diagnostic(
        code(fwheader::missing_field),
        help("Every editable field, as well as `length`, must be given when building a header")
    )]
    MissingField { field: FieldName },

    #[error("The `{field}` field can not be edited")]
    #[diagnostic(
        code(fwheader::field_not_editable),
        help("Only model_name, cpo_id, version, image_type and debug_level may be changed")
    )]
    FieldNotEditable { field: FieldName },

    #[error("Unknown header field '{0}'")]
    #[diagnostic(
        code(fwheader::unknown_field),
        help("Known fields are: {}", FieldName::VARIANTS.join(", "))
    )]
    UnknownField(String),

    #[error("Integrity digest mismatch: header contains {expected}, computed {computed}")]
    #[diagnostic(
        code(fwheader::digest_mismatch),
        help("The image was modified after it was sealed; re-seal it with `fwheader edit`")
    )]
    DigestMismatch { expected: String, computed: String },

    #[error("Invalid configuration: {0}")]
    #[diagnostic(code(fwheader::invalid_config))]
    InvalidConfig(String),

    #[error("Failed to open file: {0}")]
    #[diagnostic(code(fwheader::file_open))]
    FileOpenError(String, #[source] io::Error),

    #[error(transparent)]
    #[diagnostic(code(fwheader::io))]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn encode(field: FieldName, reason: impl Into<String>) -> Self {
        Error::FieldEncode {
            field,
            reason: reason.into(),
        }
    }
}
