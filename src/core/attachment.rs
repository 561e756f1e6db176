//! Turns local files into [`Attachment`]s.
//!
//! Images are embedded as base64 `data:` URLs so the request is
//! self-contained; other files travel as metadata only.

use base64::Engine;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::message::{Attachment, MediaKind};

#[derive(Debug)]
pub enum AttachmentError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl fmt::Display for AttachmentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttachmentError::Read { path, source } => {
                write!(f, "Failed to read attachment {}: {}", path.display(), source)
            }
        }
    }
}

impl Error for AttachmentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AttachmentError::Read { source, .. } => Some(source),
        }
    }
}

/// Image MIME type for a file name, judged by its extension.
pub fn image_mime_type(name: &str) -> Option<&'static str> {
    let extension = Path::new(name)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    match extension.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

impl Attachment {
    /// Builds an attachment from bytes already in memory.
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> Self {
        let name = name.into();
        match image_mime_type(&name) {
            Some(mime) => {
                let encoded = base64::prelude::BASE64_STANDARD.encode(bytes);
                Self {
                    inline_data: Some(format!("data:{mime};base64,{encoded}")),
                    name,
                    media_kind: MediaKind::Image,
                }
            }
            None => Self::metadata_only(name, MediaKind::Document),
        }
    }

    /// Reads a file from disk. Only images are read; other files are
    /// described by name alone.
    pub fn from_path(path: &Path) -> Result<Self, AttachmentError> {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        if image_mime_type(&name).is_none() {
            return Ok(Self::metadata_only(name, MediaKind::Document));
        }

        let bytes = fs::read(path).map_err(|source| AttachmentError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_bytes(name, &bytes))
    }
}
