/// Prompt form state: the mode, prompt, user-chosen settings and the
/// media slots that belong to the active mode.
use thiserror::Error;
use tracing::debug;

use crate::media::{MediaAsset, MediaKind};
use crate::modes::{
    effective_settings, readiness, AspectRatio, Engine, GenerationMode, Readiness, Resolution,
    SettingLocks, Settings, SlotKind,
};
use crate::request::{GenerationRequest, RequestInputs};
use crate::service::VideoHandle;

pub const MAX_REFERENCE_IMAGES: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("{slot} is not available in {mode} mode")]
    SlotNotApplicable { slot: SlotKind, mode: GenerationMode },

    #[error("{slot} expects {expected} media, got {actual}")]
    WrongMediaKind {
        slot: SlotKind,
        expected: MediaKind,
        actual: MediaKind,
    },

    #[error("looping needs a start frame and no end frame")]
    LoopingUnavailable,

    #[error("an end frame cannot be set while looping")]
    EndFrameWhileLooping,

    #[error("no reference image at index {0}")]
    NoReferenceAt(usize),
}

/// Media slots, one variant per mode. Changing mode replaces the variant,
/// so nothing from the previous mode survives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaSlots {
    TextToVideo,
    FramesToVideo {
        start_frame: Option<MediaAsset>,
        end_frame: Option<MediaAsset>,
        looping: bool,
    },
    ReferencesToVideo {
        reference_images: Vec<MediaAsset>,
        style_image: Option<MediaAsset>,
    },
    ExtendVideo {
        input_video: Option<MediaAsset>,
        input_video_handle: Option<VideoHandle>,
    },
}

impl MediaSlots {
    pub fn empty(mode: GenerationMode) -> Self {
        match mode {
            GenerationMode::TextToVideo => Self::TextToVideo,
            GenerationMode::FramesToVideo => Self::FramesToVideo {
                start_frame: None,
                end_frame: None,
                looping: false,
            },
            GenerationMode::ReferencesToVideo => Self::ReferencesToVideo {
                reference_images: Vec::new(),
                style_image: None,
            },
            GenerationMode::ExtendVideo => Self::ExtendVideo {
                input_video: None,
                input_video_handle: None,
            },
        }
    }

    pub fn mode(&self) -> GenerationMode {
        match self {
            Self::TextToVideo => GenerationMode::TextToVideo,
            Self::FramesToVideo { .. } => GenerationMode::FramesToVideo,
            Self::ReferencesToVideo { .. } => GenerationMode::ReferencesToVideo,
            Self::ExtendVideo { .. } => GenerationMode::ExtendVideo,
        }
    }

    /// True when no media is set and looping is off.
    pub fn is_empty(&self) -> bool {
        *self == Self::empty(self.mode())
    }
}

impl Default for MediaSlots {
    fn default() -> Self {
        Self::empty(GenerationMode::default())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormState {
    prompt: String,
    settings: Settings,
    slots: MediaSlots,
}

impl FormState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-fill the form from a request, e.g. an extend seed.
    pub fn from_request(request: &GenerationRequest) -> Self {
        let slots = match &request.inputs {
            RequestInputs::TextToVideo => MediaSlots::TextToVideo,
            RequestInputs::FramesToVideo {
                start_frame,
                end_frame,
                looping,
            } => MediaSlots::FramesToVideo {
                start_frame: Some(start_frame.clone()),
                end_frame: end_frame.clone(),
                looping: *looping,
            },
            RequestInputs::ReferencesToVideo {
                reference_images,
                style_image,
            } => MediaSlots::ReferencesToVideo {
                reference_images: reference_images.clone(),
                style_image: style_image.clone(),
            },
            RequestInputs::ExtendVideo {
                input_video,
                input_video_handle,
            } => MediaSlots::ExtendVideo {
                input_video: input_video.clone(),
                input_video_handle: Some(input_video_handle.clone()),
            },
        };
        Self {
            prompt: request.prompt.clone(),
            settings: request.settings,
            slots,
        }
    }

    pub fn mode(&self) -> GenerationMode {
        self.slots.mode()
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn slots(&self) -> &MediaSlots {
        &self.slots
    }

    /// Settings as the user chose them.
    pub fn user_settings(&self) -> Settings {
        self.settings
    }

    /// Settings as they will be sent, with the mode's forced values applied.
    pub fn effective_settings(&self) -> Settings {
        effective_settings(self.mode(), self.settings)
    }

    pub fn setting_locks(&self) -> SettingLocks {
        self.mode().spec().locks
    }

    pub fn readiness(&self) -> Readiness {
        readiness(self)
    }

    /// Switch mode. Always clears every media slot and the looping flag,
    /// even when re-selecting the current mode.
    pub fn set_mode(&mut self, mode: GenerationMode) {
        debug!(from = %self.mode(), to = %mode, "switching generation mode");
        self.slots = MediaSlots::empty(mode);
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    // Setters store the user's choice even when locked; the effective
    // settings keep ignoring it until the mode releases the lock.

    pub fn set_engine(&mut self, engine: Engine) {
        self.settings.engine = engine;
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: AspectRatio) {
        self.settings.aspect_ratio = aspect_ratio;
    }

    pub fn set_resolution(&mut self, resolution: Resolution) {
        self.settings.resolution = resolution;
    }

    pub fn set_start_frame(&mut self, asset: MediaAsset) -> Result<(), FormError> {
        expect_kind(SlotKind::StartFrame, &asset, MediaKind::Image)?;
        match &mut self.slots {
            MediaSlots::FramesToVideo { start_frame, .. } => {
                *start_frame = Some(asset);
                Ok(())
            }
            other => Err(not_applicable(SlotKind::StartFrame, other)),
        }
    }

    /// Removing the start frame also turns looping off.
    pub fn clear_start_frame(&mut self) -> Result<(), FormError> {
        match &mut self.slots {
            MediaSlots::FramesToVideo {
                start_frame,
                looping,
                ..
            } => {
                *start_frame = None;
                *looping = false;
                Ok(())
            }
            other => Err(not_applicable(SlotKind::StartFrame, other)),
        }
    }

    pub fn set_end_frame(&mut self, asset: MediaAsset) -> Result<(), FormError> {
        expect_kind(SlotKind::EndFrame, &asset, MediaKind::Image)?;
        match &mut self.slots {
            MediaSlots::FramesToVideo { looping: true, .. } => Err(FormError::EndFrameWhileLooping),
            MediaSlots::FramesToVideo { end_frame, .. } => {
                *end_frame = Some(asset);
                Ok(())
            }
            other => Err(not_applicable(SlotKind::EndFrame, other)),
        }
    }

    pub fn clear_end_frame(&mut self) -> Result<(), FormError> {
        match &mut self.slots {
            MediaSlots::FramesToVideo { end_frame, .. } => {
                *end_frame = None;
                Ok(())
            }
            other => Err(not_applicable(SlotKind::EndFrame, other)),
        }
    }

    /// Whether the looping toggle should be offered.
    pub fn can_loop(&self) -> bool {
        matches!(
            &self.slots,
            MediaSlots::FramesToVideo {
                start_frame: Some(_),
                end_frame: None,
                ..
            }
        )
    }

    pub fn set_looping(&mut self, enabled: bool) -> Result<(), FormError> {
        if enabled && !self.can_loop() {
            return match &self.slots {
                MediaSlots::FramesToVideo { .. } => Err(FormError::LoopingUnavailable),
                other => Err(not_applicable(SlotKind::Looping, other)),
            };
        }
        match &mut self.slots {
            MediaSlots::FramesToVideo { looping, .. } => {
                *looping = enabled;
                Ok(())
            }
            other => Err(not_applicable(SlotKind::Looping, other)),
        }
    }

    pub fn can_add_reference(&self) -> bool {
        matches!(
            &self.slots,
            MediaSlots::ReferencesToVideo { reference_images, .. }
                if reference_images.len() < MAX_REFERENCE_IMAGES
        )
    }

    /// Append a reference image. Returns `Ok(false)` without changing
    /// anything once the limit is reached.
    pub fn add_reference_image(&mut self, asset: MediaAsset) -> Result<bool, FormError> {
        expect_kind(SlotKind::ReferenceImages, &asset, MediaKind::Image)?;
        match &mut self.slots {
            MediaSlots::ReferencesToVideo {
                reference_images, ..
            } => {
                if reference_images.len() >= MAX_REFERENCE_IMAGES {
                    debug!("reference image limit reached, ignoring add");
                    return Ok(false);
                }
                reference_images.push(asset);
                Ok(true)
            }
            other => Err(not_applicable(SlotKind::ReferenceImages, other)),
        }
    }

    pub fn remove_reference_image(&mut self, index: usize) -> Result<MediaAsset, FormError> {
        match &mut self.slots {
            MediaSlots::ReferencesToVideo {
                reference_images, ..
            } => {
                if index >= reference_images.len() {
                    return Err(FormError::NoReferenceAt(index));
                }
                Ok(reference_images.remove(index))
            }
            other => Err(not_applicable(SlotKind::ReferenceImages, other)),
        }
    }

    pub fn set_style_image(&mut self, asset: MediaAsset) -> Result<(), FormError> {
        expect_kind(SlotKind::StyleImage, &asset, MediaKind::Image)?;
        match &mut self.slots {
            MediaSlots::ReferencesToVideo { style_image, .. } => {
                *style_image = Some(asset);
                Ok(())
            }
            other => Err(not_applicable(SlotKind::StyleImage, other)),
        }
    }

    pub fn clear_style_image(&mut self) -> Result<(), FormError> {
        match &mut self.slots {
            MediaSlots::ReferencesToVideo { style_image, .. } => {
                *style_image = None;
                Ok(())
            }
            other => Err(not_applicable(SlotKind::StyleImage, other)),
        }
    }

    /// A locally picked video. It does not carry a remote handle, so on its
    /// own it never makes the extend mode ready.
    pub fn set_input_video(&mut self, asset: MediaAsset) -> Result<(), FormError> {
        expect_kind(SlotKind::InputVideo, &asset, MediaKind::Video)?;
        match &mut self.slots {
            MediaSlots::ExtendVideo { input_video, .. } => {
                *input_video = Some(asset);
                Ok(())
            }
            other => Err(not_applicable(SlotKind::InputVideo, other)),
        }
    }

    /// Removing the input video drops its remote handle too.
    pub fn clear_input_video(&mut self) -> Result<(), FormError> {
        match &mut self.slots {
            MediaSlots::ExtendVideo {
                input_video,
                input_video_handle,
            } => {
                *input_video = None;
                *input_video_handle = None;
                Ok(())
            }
            other => Err(not_applicable(SlotKind::InputVideo, other)),
        }
    }
}

fn expect_kind(slot: SlotKind, asset: &MediaAsset, expected: MediaKind) -> Result<(), FormError> {
    if asset.kind() == expected {
        Ok(())
    } else {
        Err(FormError::WrongMediaKind {
            slot,
            expected,
            actual: asset.kind(),
        })
    }
}

fn not_applicable(slot: SlotKind, slots: &MediaSlots) -> FormError {
    FormError::SlotNotApplicable {
        slot,
        mode: slots.mode(),
    }
}
