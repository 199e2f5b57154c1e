//! Scoped temporary storage for uploaded image buffers
//!
//! When the image arrives as an uploaded buffer rather than a path, it is
//! written to a uniquely named temporary file before ingestion. Deletion is
//! tied to the value's lifetime, so every exit path (success, validation
//! failure, backend error) releases the file.

use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// A temporary file holding one uploaded image buffer.
///
/// The file is removed when the value is dropped.
pub struct TempUpload {
    file: NamedTempFile,
}

impl TempUpload {
    /// Write an uploaded buffer to a uniquely named temporary file,
    /// preserving the original file's extension so ingestion can derive the
    /// MIME type from it.
    pub fn write(file_name: &str, bytes: &[u8]) -> std::io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("upload_");

        let suffix = Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| format!(".{}", ext));
        if let Some(suffix) = &suffix {
            builder.suffix(suffix);
        }

        let mut file = builder.tempfile()?;
        file.write_all(bytes)?;
        file.flush()?;

        Ok(Self { file })
    }

    /// Path of the temporary file, valid for the lifetime of the value.
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}
