//! Cheap corruption checks run before anything leaves the machine
//!
//! Only the leading magic number is inspected; a file that passes may still
//! be damaged further in.

use crate::error::SessionError;

const IMAGE_MAGIC: &[&[u8]] = &[
    b"\x89PNG\r\n\x1a\n",
    b"\xff\xd8\xff",
    b"GIF87a",
    b"GIF89a",
    b"BM",
    b"\x00\x00\x01\x00",
    b"II*\x00",
    b"MM\x00*",
];

fn is_webp(bytes: &[u8]) -> bool {
    bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP"
}

fn is_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(1024)];
    String::from_utf8_lossy(head).contains("<svg")
}

fn looks_like_image(mime_type: &str, bytes: &[u8]) -> bool {
    if mime_type == "image/svg+xml" {
        return is_svg(bytes);
    }
    is_webp(bytes) || IMAGE_MAGIC.iter().any(|magic| bytes.starts_with(magic))
}

fn corrupted(kind: &str) -> SessionError {
    SessionError::Corrupted { kind: kind.into() }
}

/// Reject bytes that cannot be what `mime_type` claims.
///
/// Images must open with a known image signature, PDFs with `%PDF-`, and
/// ZIP archives with `PK`. Every other type is accepted as-is.
pub fn check_corruption(mime_type: &str, bytes: &[u8]) -> Result<(), SessionError> {
    let mime_type = mime_type.trim().to_ascii_lowercase();
    match mime_type.as_str() {
        m if m.starts_with("image/") => {
            if !looks_like_image(m, bytes) {
                return Err(corrupted("image"));
            }
        }
        "application/pdf" => {
            if !bytes.starts_with(b"%PDF-") {
                return Err(corrupted("PDF"));
            }
        }
        "application/zip" | "application/x-zip-compressed" => {
            if !bytes.starts_with(b"PK") {
                return Err(corrupted("ZIP"));
            }
        }
        _ => {}
    }
    Ok(())
}
