/// Generation modes, render settings and the static mode registry.
///
/// Each mode declares which media slots it accepts, which settings it
/// forces (and locks), and the readiness rule that gates submission.
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::form::{FormState, MediaSlots};

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown {what} '{value}'")]
pub struct ParseSettingError {
    what: &'static str,
    value: String,
}

impl ParseSettingError {
    fn new(what: &'static str, value: &str) -> Self {
        Self {
            what,
            value: value.to_string(),
        }
    }
}

/// The ways a clip can be seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    #[default]
    TextToVideo,
    FramesToVideo,
    ReferencesToVideo,
    ExtendVideo,
}

impl GenerationMode {
    pub const ALL: [GenerationMode; 4] = [
        GenerationMode::TextToVideo,
        GenerationMode::FramesToVideo,
        GenerationMode::ReferencesToVideo,
        GenerationMode::ExtendVideo,
    ];

    /// Modes offered in the mode menu. Extend is only reached from a result.
    pub const SELECTABLE: [GenerationMode; 3] = [
        GenerationMode::TextToVideo,
        GenerationMode::FramesToVideo,
        GenerationMode::ReferencesToVideo,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::TextToVideo => "text",
            Self::FramesToVideo => "frames",
            Self::ReferencesToVideo => "references",
            Self::ExtendVideo => "extend",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::TextToVideo => "Text to Video",
            Self::FramesToVideo => "Frames to Video",
            Self::ReferencesToVideo => "References to Video",
            Self::ExtendVideo => "Extend Video",
        }
    }

    pub fn prompt_placeholder(self) -> &'static str {
        match self {
            Self::TextToVideo => {
                "E.g. \"A futuristic AR property gallery showing a 3D floor plan in a warehouse...\""
            }
            Self::FramesToVideo => {
                "E.g. \"Transition between a physical room and its AR overlaid counterpart...\""
            }
            Self::ReferencesToVideo => "Describe the AR interface details...",
            Self::ExtendVideo => "Describe the user interacting with the virtual menu...",
        }
    }

    pub fn is_selectable(self) -> bool {
        Self::SELECTABLE.contains(&self)
    }

    pub fn spec(self) -> &'static ModeSpec {
        match self {
            Self::TextToVideo => &REGISTRY[0],
            Self::FramesToVideo => &REGISTRY[1],
            Self::ReferencesToVideo => &REGISTRY[2],
            Self::ExtendVideo => &REGISTRY[3],
        }
    }
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for GenerationMode {
    type Err = ParseSettingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "text-to-video" | "text_to_video" => Ok(Self::TextToVideo),
            "frames" | "frames-to-video" | "frames_to_video" => Ok(Self::FramesToVideo),
            "references" | "refs" | "references-to-video" | "references_to_video" => {
                Ok(Self::ReferencesToVideo)
            }
            "extend" | "extend-video" | "extend_video" => Ok(Self::ExtendVideo),
            _ => Err(ParseSettingError::new("generation mode", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    #[default]
    Fast,
    Standard,
}

impl Engine {
    pub const ALL: [Engine; 2] = [Engine::Fast, Engine::Standard];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fast => "fast",
            Self::Standard => "standard",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Fast => "Veo Fast",
            Self::Standard => "Veo",
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Engine {
    type Err = ParseSettingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "standard" | "quality" => Ok(Self::Standard),
            _ => Err(ParseSettingError::new("engine", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AspectRatio {
    #[default]
    Landscape,
    Portrait,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 2] = [AspectRatio::Landscape, AspectRatio::Portrait];

    /// Ratio string understood by the generation API.
    pub fn ratio(self) -> &'static str {
        match self {
            Self::Landscape => "16:9",
            Self::Portrait => "9:16",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::Landscape => "Landscape (16:9)",
            Self::Portrait => "Portrait (9:16)",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for AspectRatio {
    type Err = ParseSettingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "landscape" | "16:9" => Ok(Self::Landscape),
            "portrait" | "9:16" => Ok(Self::Portrait),
            _ => Err(ParseSettingError::new("aspect ratio", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Resolution {
    #[default]
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
}

impl Resolution {
    pub const ALL: [Resolution; 2] = [Resolution::P720, Resolution::P1080];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::P720 => "720p",
            Self::P1080 => "1080p",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::P720 => "720p (Extendable)",
            Self::P1080 => "1080p (High Res)",
        }
    }

    /// Only 720p clips can be fed back in for an extension.
    pub fn is_extendable(self) -> bool {
        self == Self::P720
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Resolution {
    type Err = ParseSettingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "720p" | "720" => Ok(Self::P720),
            "1080p" | "1080" => Ok(Self::P1080),
            _ => Err(ParseSettingError::new("resolution", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Settings {
    pub engine: Engine,
    pub aspect_ratio: AspectRatio,
    pub resolution: Resolution,
}

/// Media inputs (and the looping toggle) a mode can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SlotKind {
    StartFrame,
    EndFrame,
    Looping,
    ReferenceImages,
    StyleImage,
    InputVideo,
    InputVideoHandle,
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StartFrame => "start frame",
            Self::EndFrame => "end frame",
            Self::Looping => "looping",
            Self::ReferenceImages => "reference images",
            Self::StyleImage => "style image",
            Self::InputVideo => "input video",
            Self::InputVideoHandle => "input video handle",
        };
        f.write_str(name)
    }
}

/// Settings a mode overrides regardless of the user's choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ForcedSettings {
    pub engine: Option<Engine>,
    pub aspect_ratio: Option<AspectRatio>,
    pub resolution: Option<Resolution>,
}

/// Settings that are not editable while a mode is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SettingLocks {
    pub engine: bool,
    pub aspect_ratio: bool,
    pub resolution: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeSpec {
    pub mode: GenerationMode,
    pub slots: &'static [SlotKind],
    pub forced: ForcedSettings,
    pub locks: SettingLocks,
    /// Shown next to the disabled submit control.
    pub readiness_hint: &'static str,
}

impl ModeSpec {
    pub fn accepts(&self, slot: SlotKind) -> bool {
        self.slots.contains(&slot)
    }
}

static REGISTRY: [ModeSpec; 4] = [
    ModeSpec {
        mode: GenerationMode::TextToVideo,
        slots: &[],
        forced: ForcedSettings {
            engine: None,
            aspect_ratio: None,
            resolution: None,
        },
        locks: SettingLocks {
            engine: false,
            aspect_ratio: false,
            resolution: false,
        },
        readiness_hint: "Enter a visualization prompt.",
    },
    ModeSpec {
        mode: GenerationMode::FramesToVideo,
        slots: &[SlotKind::StartFrame, SlotKind::EndFrame, SlotKind::Looping],
        forced: ForcedSettings {
            engine: None,
            aspect_ratio: None,
            resolution: None,
        },
        locks: SettingLocks {
            engine: false,
            aspect_ratio: false,
            resolution: false,
        },
        readiness_hint: "Input frame required.",
    },
    ModeSpec {
        mode: GenerationMode::ReferencesToVideo,
        slots: &[SlotKind::ReferenceImages, SlotKind::StyleImage],
        forced: ForcedSettings {
            engine: Some(Engine::Standard),
            aspect_ratio: Some(AspectRatio::Landscape),
            resolution: Some(Resolution::P720),
        },
        locks: SettingLocks {
            engine: true,
            aspect_ratio: true,
            resolution: true,
        },
        readiness_hint: "Reference and prompt required.",
    },
    ModeSpec {
        mode: GenerationMode::ExtendVideo,
        slots: &[SlotKind::InputVideo, SlotKind::InputVideoHandle],
        forced: ForcedSettings {
            engine: None,
            aspect_ratio: None,
            resolution: Some(Resolution::P720),
        },
        locks: SettingLocks {
            engine: false,
            aspect_ratio: true,
            resolution: true,
        },
        readiness_hint: "Input video from Studio required.",
    },
];

pub fn registry() -> &'static [ModeSpec] {
    &REGISTRY
}

/// Settings actually sent for `mode`: the user's choice with the mode's
/// forced values laid over it.
pub fn effective_settings(mode: GenerationMode, user: Settings) -> Settings {
    let forced = mode.spec().forced;
    Settings {
        engine: forced.engine.unwrap_or(user.engine),
        aspect_ratio: forced.aspect_ratio.unwrap_or(user.aspect_ratio),
        resolution: forced.resolution.unwrap_or(user.resolution),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    Blocked { hint: &'static str },
}

impl Readiness {
    pub fn is_ready(self) -> bool {
        matches!(self, Readiness::Ready)
    }

    pub fn hint(self) -> Option<&'static str> {
        match self {
            Readiness::Ready => None,
            Readiness::Blocked { hint } => Some(hint),
        }
    }
}

/// Submit gate for the form's current mode.
pub fn readiness(form: &FormState) -> Readiness {
    let has_prompt = !form.prompt().trim().is_empty();
    let ready = match form.slots() {
        MediaSlots::TextToVideo => has_prompt,
        MediaSlots::FramesToVideo { start_frame, .. } => start_frame.is_some(),
        MediaSlots::ReferencesToVideo {
            reference_images, ..
        } => !reference_images.is_empty() && has_prompt,
        // A locally picked file is not enough; the handle proves the clip
        // came from a generation in this session.
        MediaSlots::ExtendVideo {
            input_video_handle, ..
        } => input_video_handle.is_some(),
    };
    if ready {
        Readiness::Ready
    } else {
        Readiness::Blocked {
            hint: form.mode().spec().readiness_hint,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_is_keyed_by_mode() {
        for mode in GenerationMode::ALL {
            assert_eq!(mode.spec().mode, mode);
        }
        assert_eq!(registry().len(), GenerationMode::ALL.len());
    }

    #[test]
    fn test_references_forces_settings() {
        let user = Settings {
            engine: Engine::Fast,
            aspect_ratio: AspectRatio::Portrait,
            resolution: Resolution::P1080,
        };
        let forced = effective_settings(GenerationMode::ReferencesToVideo, user);
        assert_eq!(
            forced,
            Settings {
                engine: Engine::Standard,
                aspect_ratio: AspectRatio::Landscape,
                resolution: Resolution::P720,
            }
        );
        // Forcing twice changes nothing.
        assert_eq!(
            effective_settings(GenerationMode::ReferencesToVideo, forced),
            forced
        );
    }

    #[test]
    fn test_extend_forces_resolution_only() {
        let user = Settings {
            engine: Engine::Standard,
            aspect_ratio: AspectRatio::Portrait,
            resolution: Resolution::P1080,
        };
        let settings = effective_settings(GenerationMode::ExtendVideo, user);
        assert_eq!(settings.resolution, Resolution::P720);
        assert_eq!(settings.aspect_ratio, AspectRatio::Portrait);
        assert_eq!(settings.engine, Engine::Standard);

        let locks = GenerationMode::ExtendVideo.spec().locks;
        assert!(!locks.engine);
        assert!(locks.aspect_ratio && locks.resolution);
    }

    #[test]
    fn test_text_and_frames_leave_settings_alone() {
        let user = Settings {
            engine: Engine::Standard,
            aspect_ratio: AspectRatio::Portrait,
            resolution: Resolution::P1080,
        };
        assert_eq!(effective_settings(GenerationMode::TextToVideo, user), user);
        assert_eq!(effective_settings(GenerationMode::FramesToVideo, user), user);
    }

    #[test]
    fn test_selectable_modes_exclude_extend() {
        assert!(!GenerationMode::ExtendVideo.is_selectable());
        assert!(GenerationMode::FramesToVideo.is_selectable());
    }

    #[test]
    fn test_parse_settings() {
        assert_eq!("refs".parse::<GenerationMode>(), Ok(GenerationMode::ReferencesToVideo));
        assert_eq!("9:16".parse::<AspectRatio>(), Ok(AspectRatio::Portrait));
        assert_eq!("1080p".parse::<Resolution>(), Ok(Resolution::P1080));
        assert_eq!("Standard".parse::<Engine>(), Ok(Engine::Standard));
        assert!("4k".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_settings_serialization() {
        let json = serde_json::to_value(Settings::default()).unwrap();
        assert_eq!(json["engine"], "fast");
        assert_eq!(json["aspect_ratio"], "landscape");
        assert_eq!(json["resolution"], "720p");
    }
}
