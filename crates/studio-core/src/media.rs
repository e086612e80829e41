/// Media normalization
///
/// Turns user-picked files into encoded assets the request contract can
/// carry. An asset always holds both the raw bytes and their base64 body.
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("failed to read {name}: {source}")]
    Read {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {name} as base64: no payload")]
    Empty { name: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => write!(f, "image"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// A file the user picked, not yet read.
#[derive(Debug, Clone)]
pub enum RawFile {
    Path(PathBuf),
    Memory { name: String, bytes: Arc<[u8]> },
}

impl RawFile {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self::Memory {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            Self::Memory { name, .. } => name.clone(),
        }
    }

    async fn read(&self) -> std::io::Result<Arc<[u8]>> {
        match self {
            Self::Path(path) => Ok(tokio::fs::read(path).await?.into()),
            Self::Memory { bytes, .. } => Ok(Arc::clone(bytes)),
        }
    }
}

/// Normalized media: raw bytes plus the base64 body (no data-URL prefix).
#[derive(Clone, PartialEq, Eq)]
pub struct MediaAsset {
    kind: MediaKind,
    file_name: String,
    mime_type: String,
    bytes: Arc<[u8]>,
    encoded: String,
}

impl MediaAsset {
    /// Encode already-loaded bytes. Fails without producing anything when
    /// there is no payload to encode.
    pub fn from_bytes(
        kind: MediaKind,
        file_name: impl Into<String>,
        bytes: Arc<[u8]>,
    ) -> Result<Self, EncodingError> {
        let file_name = file_name.into();
        if bytes.is_empty() {
            return Err(EncodingError::Empty { name: file_name });
        }
        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        let mime_type = guess_mime_type(&file_name, kind).to_string();
        Ok(Self {
            kind,
            file_name,
            mime_type,
            bytes,
            encoded,
        })
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &Arc<[u8]> {
        &self.bytes
    }

    pub fn encoded_payload(&self) -> &str {
        &self.encoded
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for MediaAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaAsset")
            .field("kind", &self.kind)
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Read `raw` and encode it as an asset of the given kind.
pub async fn normalize(raw: &RawFile, kind: MediaKind) -> Result<MediaAsset, EncodingError> {
    let name = raw.name();
    let bytes = raw
        .read()
        .await
        .map_err(|source| EncodingError::Read {
            name: name.clone(),
            source,
        })?;
    let asset = MediaAsset::from_bytes(kind, name, bytes)?;
    debug!(
        file = asset.file_name(),
        kind = %asset.kind(),
        bytes = asset.len(),
        "normalized media"
    );
    Ok(asset)
}

pub async fn normalize_image(raw: &RawFile) -> Result<MediaAsset, EncodingError> {
    normalize(raw, MediaKind::Image).await
}

pub async fn normalize_video(raw: &RawFile) -> Result<MediaAsset, EncodingError> {
    normalize(raw, MediaKind::Video).await
}

fn guess_mime_type(file_name: &str, kind: MediaKind) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match (kind, ext.as_str()) {
        (MediaKind::Image, "jpg" | "jpeg") => "image/jpeg",
        (MediaKind::Image, "webp") => "image/webp",
        (MediaKind::Image, "gif") => "image/gif",
        (MediaKind::Image, _) => "image/png",
        (MediaKind::Video, "webm") => "video/webm",
        (MediaKind::Video, "mov") => "video/quicktime",
        (MediaKind::Video, _) => "video/mp4",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_asset_from_bytes_encodes_payload() {
        let asset =
            MediaAsset::from_bytes(MediaKind::Image, "frame.jpg", Arc::from(&b"hello"[..])).unwrap();
        assert_eq!(asset.encoded_payload(), "aGVsbG8=");
        assert_eq!(asset.mime_type(), "image/jpeg");
        assert_eq!(asset.len(), 5);
    }

    #[test]
    fn test_empty_payload_is_rejected() {
        let err = MediaAsset::from_bytes(MediaKind::Video, "clip.mp4", Arc::from(Vec::new()))
            .unwrap_err();
        assert!(matches!(err, EncodingError::Empty { ref name } if name == "clip.mp4"));
    }

    #[test]
    fn test_normalize_in_memory() {
        let raw = RawFile::from_bytes("still.webp", vec![1u8, 2, 3]);
        let asset = tokio_test::block_on(normalize_image(&raw)).unwrap();
        assert_eq!(asset.kind(), MediaKind::Image);
        assert_eq!(asset.mime_type(), "image/webp");
        assert_eq!(asset.encoded_payload(), "AQID");
    }

    #[tokio::test]
    async fn test_normalize_from_disk() {
        let mut file = tempfile::Builder::new().suffix(".mov").tempfile().unwrap();
        file.write_all(b"not really a movie").unwrap();

        let asset = normalize_video(&RawFile::from_path(file.path())).await.unwrap();
        assert_eq!(asset.kind(), MediaKind::Video);
        assert_eq!(asset.mime_type(), "video/quicktime");
        assert_eq!(&asset.bytes()[..], b"not really a movie");
    }

    #[tokio::test]
    async fn test_normalize_missing_file_fails() {
        let raw = RawFile::from_path("/definitely/not/here.png");
        let err = normalize_image(&raw).await.unwrap_err();
        assert!(matches!(err, EncodingError::Read { .. }));
    }

    #[tokio::test]
    async fn test_normalize_empty_file_fails() {
        let file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        let err = normalize_image(&RawFile::from_path(file.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, EncodingError::Empty { .. }));
    }
}
