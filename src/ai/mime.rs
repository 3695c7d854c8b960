use crate::{Error, Result};
use std::path::Path;

const EXTENSION_TABLE: &[(&str, &str)] = &[
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("webp", "image/webp"),
    ("heic", "image/heic"),
    ("heif", "image/heif"),
];

const MIME_EXTENSIONS: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/webp", "webp"),
    ("image/heic", "heic"),
    ("image/heif", "heif"),
    ("image/gif", "gif"),
];

/// Infer the MIME type of an input image from its file name.
pub fn mime_for_name(name: &str) -> Result<&'static str> {
    let extension = Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .ok_or_else(|| Error::InvalidInput(format!("Could not determine MIME type for {}", name)))?;

    EXTENSION_TABLE
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
        .ok_or_else(|| Error::InvalidInput(format!("Could not determine MIME type for {}", name)))
}

/// File extension (without dot) for a MIME type reported by the model.
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    let normalized = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match MIME_EXTENSIONS.iter().find(|(mime, _)| *mime == normalized) {
        Some((_, ext)) => *ext,
        None => {
            tracing::warn!("Unrecognized output MIME type '{}', using .bin", mime_type);
            "bin"
        }
    }
}

/// Content type for a generated artifact, the inverse of [`extension_for_mime`].
pub fn mime_for_artifact(name: &str) -> &'static str {
    let extension = Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();

    MIME_EXTENSIONS
        .iter()
        .find(|(_, ext)| *ext == extension)
        .map(|(mime, _)| *mime)
        .unwrap_or("application/octet-stream")
}

/// MIME type from the byte signature, if recognizable.
pub fn sniff_image_mime(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type())
}
