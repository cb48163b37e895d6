//! Read, edit and re-seal firmware image headers.
//!
//! Firmware images flashed to the ESP32, STM32 and nRF52 boards start with a
//! fixed 1024-byte header: a SHA-256 integrity digest, the payload length, and
//! a handful of identification fields. This crate decodes that header, builds
//! new ones from edited values, and recomputes the digest so that edited
//! images remain valid.
//!
//! ```
//! use fwheader::{
//!     header::{build_header, compute_integrity_hash, read_header, seal_header, FieldName, FieldValue, HeaderFields},
//! };
//!
//! let mut fields = HeaderFields::new();
//! fields.insert(FieldName::Length, 4u32);
//! fields.insert(FieldName::ModelName, "ABC");
//! fields.insert(FieldName::CpoId, "XYZ");
//! fields.insert(FieldName::Version, FieldValue::Hex("010203".into()));
//! fields.insert(FieldName::ImageType, FieldValue::Hex("0x01".into()));
//! fields.insert(FieldName::DebugLevel, FieldValue::Hex("0x00".into()));
//!
//! let payload = [1u8, 2, 3, 4];
//! let header = build_header(&fields)?;
//! let sealed = seal_header(header, &compute_integrity_hash(&header, &payload));
//!
//! let mut image = sealed.to_vec();
//! image.extend_from_slice(&payload);
//! assert_eq!(read_header(&image)?.get(FieldName::ModelName), Some(&"ABC".into()));
//! # Ok::<(), fwheader::Error>(())
//! ```

pub use self::{error::Error, image::FirmwareImage};

#[cfg(feature = "cli")]
pub mod cli;
pub mod file;
pub mod header;
pub mod image;
#[cfg(feature = "cli")]
pub mod logging;
pub mod progress;

mod error;
