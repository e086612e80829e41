/// Generation request contract and the builder that assembles it from
/// the form.
use thiserror::Error;

use crate::form::{FormState, MediaSlots};
use crate::media::MediaAsset;
use crate::modes::{GenerationMode, Settings, SlotKind};
use crate::service::VideoHandle;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Readiness failed; carries the hint shown next to the submit control.
    #[error("{hint}")]
    NotReady {
        mode: GenerationMode,
        hint: &'static str,
    },

    #[error("{mode} request is missing its {slot}")]
    MissingInput {
        mode: GenerationMode,
        slot: SlotKind,
    },
}

/// Inputs valid for exactly one mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestInputs {
    TextToVideo,
    FramesToVideo {
        start_frame: MediaAsset,
        end_frame: Option<MediaAsset>,
        looping: bool,
    },
    ReferencesToVideo {
        /// One to three images, in the order they were added.
        reference_images: Vec<MediaAsset>,
        style_image: Option<MediaAsset>,
    },
    ExtendVideo {
        input_video: Option<MediaAsset>,
        input_video_handle: VideoHandle,
    },
}

/// Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub settings: Settings,
    pub inputs: RequestInputs,
}

impl GenerationRequest {
    pub fn mode(&self) -> GenerationMode {
        match self.inputs {
            RequestInputs::TextToVideo => GenerationMode::TextToVideo,
            RequestInputs::FramesToVideo { .. } => GenerationMode::FramesToVideo,
            RequestInputs::ReferencesToVideo { .. } => GenerationMode::ReferencesToVideo,
            RequestInputs::ExtendVideo { .. } => GenerationMode::ExtendVideo,
        }
    }

    pub fn start_frame(&self) -> Option<&MediaAsset> {
        match &self.inputs {
            RequestInputs::FramesToVideo { start_frame, .. } => Some(start_frame),
            _ => None,
        }
    }

    pub fn end_frame(&self) -> Option<&MediaAsset> {
        match &self.inputs {
            RequestInputs::FramesToVideo { end_frame, .. } => end_frame.as_ref(),
            _ => None,
        }
    }

    pub fn is_looping(&self) -> bool {
        matches!(self.inputs, RequestInputs::FramesToVideo { looping: true, .. })
    }

    pub fn reference_images(&self) -> &[MediaAsset] {
        match &self.inputs {
            RequestInputs::ReferencesToVideo {
                reference_images, ..
            } => reference_images,
            _ => &[],
        }
    }

    pub fn style_image(&self) -> Option<&MediaAsset> {
        match &self.inputs {
            RequestInputs::ReferencesToVideo { style_image, .. } => style_image.as_ref(),
            _ => None,
        }
    }

    pub fn input_video(&self) -> Option<&MediaAsset> {
        match &self.inputs {
            RequestInputs::ExtendVideo { input_video, .. } => input_video.as_ref(),
            _ => None,
        }
    }

    pub fn input_video_handle(&self) -> Option<&VideoHandle> {
        match &self.inputs {
            RequestInputs::ExtendVideo {
                input_video_handle, ..
            } => Some(input_video_handle),
            _ => None,
        }
    }
}

/// Assemble a request from the form.
///
/// Pure: copies the prompt, the effective settings and the active mode's
/// slots. Readiness is the caller's gate; this only refuses inputs the
/// request shape cannot represent (a frames request with no start frame,
/// an extend request with no handle, ...).
pub fn build(form: &FormState) -> Result<GenerationRequest, ValidationError> {
    let mode = form.mode();
    let missing = |slot| ValidationError::MissingInput { mode, slot };

    let inputs = match form.slots() {
        MediaSlots::TextToVideo => RequestInputs::TextToVideo,
        MediaSlots::FramesToVideo {
            start_frame,
            end_frame,
            looping,
        } => RequestInputs::FramesToVideo {
            start_frame: start_frame
                .clone()
                .ok_or_else(|| missing(SlotKind::StartFrame))?,
            end_frame: end_frame.clone(),
            looping: *looping && end_frame.is_none(),
        },
        MediaSlots::ReferencesToVideo {
            reference_images,
            style_image,
        } => {
            if reference_images.is_empty() {
                return Err(missing(SlotKind::ReferenceImages));
            }
            RequestInputs::ReferencesToVideo {
                reference_images: reference_images.clone(),
                style_image: style_image.clone(),
            }
        }
        MediaSlots::ExtendVideo {
            input_video,
            input_video_handle,
        } => RequestInputs::ExtendVideo {
            input_video: input_video.clone(),
            input_video_handle: input_video_handle
                .clone()
                .ok_or_else(|| missing(SlotKind::InputVideoHandle))?,
        },
    };

    Ok(GenerationRequest {
        prompt: form.prompt().to_string(),
        settings: form.effective_settings(),
        inputs,
    })
}
