//! Reading, verifying and re-sealing image files on disk
//!
//! Only the header is held in memory; payloads are streamed through the hasher
//! and never rewritten.

use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufReader, Read, Seek, SeekFrom, Write},
    path::Path,
};

use log::{info, warn};

use crate::{
    header::{
        check_digest, check_length, compute_integrity_hash_reader, decode_header, seal_header,
        Digest, HeaderFields, RawHeader, TextOverflow, HEADER_SIZE,
    },
    image::{rebuild_header, FirmwareImage},
    progress::ProgressCallbacks,
    Error,
};

const IMAGE_EXTENSIONS: &[&str] = &["bin", "hex"];

/// Decode the header of the image at `path`.
pub fn read_header_file(path: &Path) -> Result<HeaderFields, Error> {
    let (_, header, _) = open_image(path, false)?;
    Ok(decode_header(&header))
}

/// Check the stored digest of the image at `path`.
pub fn verify_file(
    path: &Path,
    progress: Option<&mut dyn ProgressCallbacks>,
) -> Result<Digest, Error> {
    let (file, header, payload_len) = open_image(path, false)?;

    let computed =
        compute_integrity_hash_reader(&header, BufReader::new(&file), payload_len, progress)?;
    check_digest(&header, &computed)?;
    check_length(&header, payload_len as u64);

    Ok(computed)
}

/// Apply `edits` to the header of the image at `path` and re-seal it.
///
/// Nothing is written unless the new header was fully built and hashed; the
/// payload is never rewritten. Returns the fields of the new header.
pub fn update_file(
    path: &Path,
    edits: &HeaderFields,
    overflow: TextOverflow,
    progress: Option<&mut dyn ProgressCallbacks>,
) -> Result<HeaderFields, Error> {
    let (mut file, current, payload_len) = open_image(path, true)?;

    let header = rebuild_header(&current, edits, overflow)?;
    let digest =
        compute_integrity_hash_reader(&header, BufReader::new(&file), payload_len, progress)?;
    let sealed = seal_header(header, &digest);

    file.seek(SeekFrom::Start(0))?;
    file.write_all(&sealed)?;
    file.sync_all()?;

    info!(
        "Updated header of {} (digest {})",
        path.display(),
        hex::encode(digest)
    );

    Ok(decode_header(&sealed))
}

/// Write a new sealed image to `path` with `payload` after the header.
pub fn create_file(
    path: &Path,
    fields: &HeaderFields,
    payload: &[u8],
    overflow: TextOverflow,
) -> Result<HeaderFields, Error> {
    check_image_path(path);

    let image = FirmwareImage::new(fields, payload, overflow)?;
    fs::write(path, image.to_bytes())
        .map_err(|e| Error::FileOpenError(path.display().to_string(), e))?;

    info!(
        "Wrote {} bytes to {}",
        HEADER_SIZE + payload.len(),
        path.display()
    );

    Ok(image.fields())
}

/// Warn about files that do not look like firmware images.
pub fn check_image_path(path: &Path) {
    let known = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));

    if !known {
        warn!(
            "{} does not have a .bin or .hex extension, it may not be a firmware image",
            path.display()
        );
    }
}

/// Open an image, read its header and return the payload length.
///
/// The returned file is positioned at the start of the payload.
fn open_image(path: &Path, write: bool) -> Result<(File, RawHeader, usize), Error> {
    check_image_path(path);

    let mut file = OpenOptions::new()
        .read(true)
        .write(write)
        .open(path)
        .map_err(|e| Error::FileOpenError(path.display().to_string(), e))?;
    let len = file.metadata()?.len();

    let mut header = [0u8; HEADER_SIZE];
    match file.read_exact(&mut header) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
            return Err(Error::TooSmall {
                minimum: HEADER_SIZE,
                actual: len as usize,
            })
        }
        Err(e) => return Err(e.into()),
    }

    let payload_len = usize::try_from(len)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "image too large"))?
        - HEADER_SIZE;

    Ok((file, header, payload_len))
}
