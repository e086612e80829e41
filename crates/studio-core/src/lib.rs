/// Video generation studio core
///
/// Mode-aware prompt form, request assembly, the generation lifecycle
/// (idle / loading / success / error with retry, new and extend), the
/// extend continuity bridge and the credential gate. Rendering and the
/// remote service sit behind traits.
use thiserror::Error;

pub mod continuity;
pub mod credentials;
pub mod form;
pub mod lifecycle;
pub mod media;
pub mod mock;
pub mod modes;
pub mod request;
pub mod service;
pub mod studio;

pub use continuity::ContinuityError;
pub use credentials::{CredentialAuthority, CredentialGate};
pub use form::{FormError, FormState, MediaSlots, MAX_REFERENCE_IMAGES};
pub use lifecycle::{GenerationLifecycle, LifecycleError, LifecycleState, Phase};
pub use media::{
    normalize, normalize_image, normalize_video, EncodingError, MediaAsset, MediaKind, RawFile,
};
pub use modes::{
    effective_settings, readiness, registry, AspectRatio, Engine, GenerationMode, ModeSpec,
    Readiness, Resolution, SettingLocks, Settings, SlotKind,
};
pub use request::{build, GenerationRequest, RequestInputs, ValidationError};
pub use service::{
    FailureKind, GenerationFailure, GenerationResult, GenerationService, VideoHandle,
};
pub use studio::{Studio, StudioEvent, SubmitOutcome};

#[derive(Debug, Error)]
pub enum StudioError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Form(#[from] FormError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("credential selection failed: {0:#}")]
    Credential(anyhow::Error),
}

pub type Result<T> = std::result::Result<T, StudioError>;
