//! Image ingestion and validation
//!
//! Turns a filesystem path into an inline image payload for the inference
//! backend. Validation order matters: the extension is checked before any
//! filesystem access, existence before size, size (from metadata) before the
//! content is read.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Maximum accepted image size. A file of exactly this size is accepted.
pub const MAX_IMAGE_BYTES: u64 = 20 * 1024 * 1024;

/// Extensions the ingestion accepts, lowercase.
const ACCEPTED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "tiff", "tif", "heic", "heif",
];

/// Errors raised while ingesting an image
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("Invalid image input: {0}")]
    InvalidInput(String),

    #[error("Image file not found: {0}")]
    NotFound(PathBuf),

    #[error("Image exceeds {MAX_IMAGE_BYTES} bytes: {size}")]
    TooLarge { size: u64 },

    #[error("Failed to read image: {0}")]
    Io(#[from] std::io::Error),
}

/// Inline image payload.
///
/// Immutable once constructed; carries no reference to the source path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDescriptor {
    /// Base64-encoded file content
    pub data: String,

    /// MIME type derived from the file extension (never content sniffing)
    pub mime_type: String,
}

/// Ingest an image file into an inline payload.
pub fn ingest(path: &Path) -> Result<ImageDescriptor, ImageError> {
    if path.as_os_str().is_empty() {
        return Err(ImageError::InvalidInput("empty image path".to_string()));
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
        .ok_or_else(|| {
            ImageError::InvalidInput(format!("missing image extension: {}", path.display()))
        })?;

    if !ACCEPTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(ImageError::InvalidInput(format!(
            "unsupported image format '.{}'",
            extension
        )));
    }

    let metadata = fs::metadata(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ImageError::NotFound(path.to_path_buf())
        } else {
            ImageError::Io(e)
        }
    })?;

    if metadata.len() > MAX_IMAGE_BYTES {
        return Err(ImageError::TooLarge {
            size: metadata.len(),
        });
    }

    let bytes = fs::read(path)?;

    let mime_type = match mime_for_extension(&extension) {
        Some(mime) => mime,
        None => {
            warn!(
                "no dedicated MIME type for '.{}', falling back to image/jpeg",
                extension
            );
            "image/jpeg"
        }
    };

    Ok(ImageDescriptor {
        data: BASE64.encode(bytes),
        mime_type: mime_type.to_string(),
    })
}

/// MIME type for an accepted extension. `None` for accepted extensions
/// without a dedicated entry (the caller falls back to image/jpeg).
fn mime_for_extension(extension: &str) -> Option<&'static str> {
    match extension {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        "tiff" | "tif" => Some("image/tiff"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(extension: &str, bytes: &[u8]) -> tempfile::TempPath {
        let mut file = tempfile::Builder::new()
            .suffix(&format!(".{}", extension))
            .tempfile()
            .unwrap();
        file.write_all(bytes).unwrap();
        file.into_temp_path()
    }

    #[test]
    fn test_ingest_encodes_content_and_mime() {
        let path = write_temp("png", b"hello");

        let descriptor = ingest(&path).unwrap();

        assert_eq!(descriptor.data, "aGVsbG8=");
        assert_eq!(descriptor.mime_type, "image/png");
    }

    #[test]
    fn test_empty_path_is_invalid() {
        let err = ingest(Path::new("")).unwrap_err();
        assert!(matches!(err, ImageError::InvalidInput(_)));
    }

    #[test]
    fn test_unsupported_extension_rejected_without_reading() {
        // The path does not exist; the extension check must fire first.
        let err = ingest(Path::new("/nonexistent/menu.pdf")).unwrap_err();
        assert!(matches!(err, ImageError::InvalidInput(_)));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = ingest(Path::new("/nonexistent/photo.jpg")).unwrap_err();
        assert!(matches!(err, ImageError::NotFound(_)));
    }

    #[test]
    fn test_size_boundary_exact_limit_accepted() {
        let path = write_temp("jpg", &vec![0u8; MAX_IMAGE_BYTES as usize]);
        assert!(ingest(&path).is_ok());
    }

    #[test]
    fn test_size_boundary_one_byte_over_rejected() {
        let path = write_temp("jpg", &vec![0u8; MAX_IMAGE_BYTES as usize + 1]);

        let err = ingest(&path).unwrap_err();
        assert!(matches!(
            err,
            ImageError::TooLarge {
                size
            } if size == MAX_IMAGE_BYTES + 1
        ));
    }

    #[test]
    fn test_accepted_extension_without_mime_falls_back_to_jpeg() {
        let path = write_temp("heic", b"fake");

        let descriptor = ingest(&path).unwrap();
        assert_eq!(descriptor.mime_type, "image/jpeg");
    }

    #[test]
    fn test_extension_case_insensitive() {
        let path = write_temp("JPG", b"fake");
        assert_eq!(ingest(&path).unwrap().mime_type, "image/jpeg");
    }
}
