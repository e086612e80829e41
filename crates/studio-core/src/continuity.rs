/// Turns a finished clip back into the seed of an extend request.
use thiserror::Error;
use tracing::debug;

use crate::media::{EncodingError, MediaAsset, MediaKind};
use crate::modes::Resolution;
use crate::request::{GenerationRequest, RequestInputs};
use crate::service::GenerationResult;

/// Name given to the reconstructed input video.
pub const SEED_VIDEO_NAME: &str = "last_video.mp4";

#[derive(Debug, Error)]
pub enum ContinuityError {
    #[error("previous clip cannot be reused: {0}")]
    Video(#[from] EncodingError),
}

/// Build the extend seed for `result`, which was produced by `last_request`.
///
/// The prompt is left empty so the continuation gets described afresh.
/// Engine and aspect ratio carry over; resolution is pinned to 720p.
pub fn extend(
    last_request: &GenerationRequest,
    result: &GenerationResult,
) -> Result<GenerationRequest, ContinuityError> {
    let input_video =
        MediaAsset::from_bytes(MediaKind::Video, SEED_VIDEO_NAME, result.blob.clone())?;

    let mut settings = last_request.settings;
    settings.resolution = Resolution::P720;

    debug!(handle = %result.handle, "seeding extend request");
    Ok(GenerationRequest {
        prompt: String::new(),
        settings,
        inputs: RequestInputs::ExtendVideo {
            input_video: Some(input_video),
            input_video_handle: result.handle.clone(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::{AspectRatio, Engine, GenerationMode, Settings};
    use crate::service::VideoHandle;
    use std::sync::Arc;

    fn frames_request() -> GenerationRequest {
        let frame =
            MediaAsset::from_bytes(MediaKind::Image, "a.png", Arc::from(&b"png"[..])).unwrap();
        GenerationRequest {
            prompt: "open the door".to_string(),
            settings: Settings {
                engine: Engine::Standard,
                aspect_ratio: AspectRatio::Portrait,
                resolution: Resolution::P720,
            },
            inputs: RequestInputs::FramesToVideo {
                start_frame: frame,
                end_frame: None,
                looping: true,
            },
        }
    }

    fn result() -> GenerationResult {
        GenerationResult {
            displayable_url: "file:///tmp/clip.mp4".to_string(),
            blob: Arc::from(&b"mp4 bytes"[..]),
            handle: VideoHandle::new("files/clip-1"),
        }
    }

    #[test]
    fn test_seed_shape() {
        let seed = extend(&frames_request(), &result()).unwrap();
        assert_eq!(seed.mode(), GenerationMode::ExtendVideo);
        assert_eq!(seed.prompt, "");
        assert_eq!(seed.settings.resolution, Resolution::P720);
        assert_eq!(seed.settings.engine, Engine::Standard);
        assert_eq!(seed.settings.aspect_ratio, AspectRatio::Portrait);
        assert!(!seed.is_looping());
        assert!(seed.start_frame().is_none());
        assert!(seed.reference_images().is_empty());
        assert_eq!(
            seed.input_video_handle(),
            Some(&VideoHandle::new("files/clip-1"))
        );
        let video = seed.input_video().unwrap();
        assert_eq!(video.file_name(), SEED_VIDEO_NAME);
        assert_eq!(video.mime_type(), "video/mp4");
        assert_eq!(&video.bytes()[..], b"mp4 bytes");
    }

    #[test]
    fn test_empty_blob_cannot_seed() {
        let mut empty = result();
        empty.blob = Arc::from(Vec::new());
        assert!(matches!(
            extend(&frames_request(), &empty),
            Err(ContinuityError::Video(EncodingError::Empty { .. }))
        ));
    }
}
