//! Storage keys and content types for submitted images.

use chrono::{DateTime, Utc};
use image::ImageFormat;
use uuid::Uuid;

/// Which side of the verification an image belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Document,
    Selfie,
}

impl ImageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ImageKind::Document => "document",
            ImageKind::Selfie => "selfie",
        }
    }
}

/// Sniff the image format from its leading bytes.
pub fn sniff_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

pub fn extension(format: Option<ImageFormat>) -> &'static str {
    match format {
        Some(ImageFormat::Jpeg) => "jpg",
        Some(ImageFormat::Png) => "png",
        Some(ImageFormat::WebP) => "webp",
        Some(ImageFormat::Gif) => "gif",
        Some(ImageFormat::Bmp) => "bmp",
        _ => "bin",
    }
}

pub fn content_type(format: Option<ImageFormat>) -> &'static str {
    match format {
        Some(ImageFormat::Jpeg) => "image/jpeg",
        Some(ImageFormat::Png) => "image/png",
        Some(ImageFormat::WebP) => "image/webp",
        Some(ImageFormat::Gif) => "image/gif",
        Some(ImageFormat::Bmp) => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// `{kind}_{yyyyMMddTHHmmssZ}_{uuid}.{ext}`
pub fn storage_key(kind: ImageKind, format: Option<ImageFormat>, at: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}.{}",
        kind.as_str(),
        at.format("%Y%m%dT%H%M%SZ"),
        Uuid::new_v4().simple(),
        extension(format)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0, 0x10, b'J', b'F', b'I', b'F'];

    #[test]
    fn test_sniff_known_formats() {
        assert_eq!(sniff_format(PNG_MAGIC), Some(ImageFormat::Png));
        assert_eq!(sniff_format(JPEG_MAGIC), Some(ImageFormat::Jpeg));
        assert_eq!(sniff_format(b"hello world"), None);
    }

    #[test]
    fn test_storage_key_layout() {
        let at = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        let key = storage_key(ImageKind::Selfie, Some(ImageFormat::Jpeg), at);
        assert!(key.starts_with("selfie_20260304T050607Z_"), "{key}");
        assert!(key.ends_with(".jpg"));
        // kind + stamp + 32 hex chars + extension
        assert_eq!(key.len(), "selfie_".len() + 16 + 1 + 32 + ".jpg".len());
    }

    #[test]
    fn test_storage_keys_are_unique() {
        let at = Utc::now();
        let a = storage_key(ImageKind::Document, None, at);
        let b = storage_key(ImageKind::Document, None, at);
        assert_ne!(a, b);
        assert!(a.ends_with(".bin"));
    }

    #[test]
    fn test_content_type_fallback() {
        assert_eq!(content_type(Some(ImageFormat::Png)), "image/png");
        assert_eq!(content_type(None), "application/octet-stream");
    }
}
