/// Generation lifecycle state machine
///
/// Owns the single generation (in flight or not), the last submitted
/// request for retry, and the pending extend seed.
///
/// ```text
/// Idle ──submit──▶ Loading ──resolve──▶ Success ──extend──▶ Idle (seeded)
///                     │                   │
///                     └──reject──▶ Error  ├──retry──▶ Loading
///                                   │     └──new────▶ Idle
///                                   ├──retry──▶ Loading
///                                   └──new────▶ Idle
/// ```
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tracing::{info, warn};

use crate::continuity::{self, ContinuityError};
use crate::request::GenerationRequest;
use crate::service::{GenerationFailure, GenerationResult};

const FAILURE_PREFIX: &str = "Video generation failed";
const ABANDONED_MESSAGE: &str = "the request was cancelled before it finished";

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("a generation is already in flight")]
    ConcurrentRequest,

    #[error("no generation is in flight")]
    NotLoading,

    #[error("extend is only available after a successful 720p generation")]
    ExtendUnavailable,

    #[error(transparent)]
    Continuity(#[from] ContinuityError),
}

/// State tag without payload, for observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Loading,
    Success,
    Error,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Loading => write!(f, "loading"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LifecycleState {
    #[default]
    Idle,
    Loading,
    Success(GenerationResult),
    /// Display-ready failure message.
    Error(String),
}

impl LifecycleState {
    pub fn phase(&self) -> Phase {
        match self {
            Self::Idle => Phase::Idle,
            Self::Loading => Phase::Loading,
            Self::Success(_) => Phase::Success,
            Self::Error(_) => Phase::Error,
        }
    }

    pub fn result(&self) -> Option<&GenerationResult> {
        match self {
            Self::Success(result) => Some(result),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Error(message) => Some(message),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct RejectOutcome {
    /// The rejection looks like a credential problem.
    pub authorization_failure: bool,
    /// Result displaced by the retry that just failed, if any.
    pub superseded: Option<GenerationResult>,
}

#[derive(Debug)]
pub struct ExtendOutcome {
    pub seed: GenerationRequest,
    pub superseded: Option<GenerationResult>,
}

#[derive(Debug, Default)]
pub struct GenerationLifecycle {
    state: LifecycleState,
    last_request: Option<GenerationRequest>,
    pending_seed: Option<GenerationRequest>,
    // Success result displaced by a retry, released once the retry settles.
    displaced: Option<GenerationResult>,
}

impl GenerationLifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, LifecycleState::Loading)
    }

    pub fn last_request(&self) -> Option<&GenerationRequest> {
        self.last_request.as_ref()
    }

    pub fn pending_seed(&self) -> Option<&GenerationRequest> {
        self.pending_seed.as_ref()
    }

    /// Enter `Loading` with `request`, recording it for retry. Consumes any
    /// pending seed.
    pub fn begin(&mut self, request: GenerationRequest) -> Result<(), LifecycleError> {
        if self.is_loading() {
            warn!("submit ignored, a generation is already in flight");
            return Err(LifecycleError::ConcurrentRequest);
        }
        info!(mode = %request.mode(), "generation started");
        self.displaced = self.replace_state(LifecycleState::Loading);
        self.last_request = Some(request);
        self.pending_seed = None;
        Ok(())
    }

    /// `Loading -> Success`. Returns the result this one supersedes.
    pub fn resolve(
        &mut self,
        result: GenerationResult,
    ) -> Result<Option<GenerationResult>, LifecycleError> {
        if !self.is_loading() {
            return Err(LifecycleError::NotLoading);
        }
        info!(url = %result.displayable_url, "generation succeeded");
        self.state = LifecycleState::Success(result);
        Ok(self.displaced.take())
    }

    /// `Loading -> Error`. `last_request` is kept so retry stays available.
    pub fn reject(&mut self, failure: &GenerationFailure) -> Result<RejectOutcome, LifecycleError> {
        if !self.is_loading() {
            return Err(LifecycleError::NotLoading);
        }
        let authorization_failure = failure.is_authorization();
        warn!(
            kind = ?failure.kind,
            authorization_failure,
            "generation failed: {}",
            failure.message
        );
        self.state = LifecycleState::Error(format!("{FAILURE_PREFIX}: {}", failure.message));
        Ok(RejectOutcome {
            authorization_failure,
            superseded: self.displaced.take(),
        })
    }

    /// `Loading -> Error` for a generation that will never settle, e.g. when
    /// the caller stopped waiting. No-op outside `Loading`. `last_request`
    /// is kept so the attempt can be retried; returns the displaced result.
    pub fn abandon(&mut self) -> Option<GenerationResult> {
        if !self.is_loading() {
            return None;
        }
        warn!("generation abandoned before it settled");
        self.state = LifecycleState::Error(format!("{FAILURE_PREFIX}: {ABANDONED_MESSAGE}"));
        self.displaced.take()
    }

    /// The request a retry would resubmit. `None` outside `Success`/`Error`
    /// or when nothing was submitted.
    pub fn retry_request(&self) -> Option<GenerationRequest> {
        match self.state {
            LifecycleState::Success(_) | LifecycleState::Error(_) => self.last_request.clone(),
            _ => None,
        }
    }

    /// "New": back to `Idle`, forgetting the last request, the result and
    /// any seed. Returns the result to release.
    pub fn reset(&mut self) -> Result<Option<GenerationResult>, LifecycleError> {
        if self.is_loading() {
            return Err(LifecycleError::ConcurrentRequest);
        }
        info!("lifecycle reset");
        self.last_request = None;
        self.pending_seed = None;
        Ok(self.replace_state(LifecycleState::Idle))
    }

    pub fn can_extend(&self) -> bool {
        matches!(
            (&self.state, &self.last_request),
            (LifecycleState::Success(_), Some(last)) if last.settings.resolution.is_extendable()
        )
    }

    /// `Success -> Idle` with an extend seed pre-loaded. The seed is not
    /// submitted and does not replace `last_request`.
    pub fn extend(&mut self) -> Result<ExtendOutcome, LifecycleError> {
        if !self.can_extend() {
            return Err(LifecycleError::ExtendUnavailable);
        }
        let seed = match (&self.last_request, &self.state) {
            (Some(last), LifecycleState::Success(result)) => continuity::extend(last, result)?,
            _ => return Err(LifecycleError::ExtendUnavailable),
        };
        info!("extend seed loaded");
        self.pending_seed = Some(seed.clone());
        let superseded = self.replace_state(LifecycleState::Idle);
        Ok(ExtendOutcome { seed, superseded })
    }

    fn replace_state(&mut self, next: LifecycleState) -> Option<GenerationResult> {
        match std::mem::replace(&mut self.state, next) {
            LifecycleState::Success(result) => Some(result),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modes::{Resolution, Settings};
    use crate::request::RequestInputs;
    use crate::service::VideoHandle;
    use std::sync::Arc;

    fn request(resolution: Resolution) -> GenerationRequest {
        GenerationRequest {
            prompt: "a drone shot of a warehouse".to_string(),
            settings: Settings {
                resolution,
                ..Settings::default()
            },
            inputs: RequestInputs::TextToVideo,
        }
    }

    fn result(id: &str) -> GenerationResult {
        GenerationResult {
            displayable_url: format!("file:///tmp/{id}.mp4"),
            blob: Arc::from(id.as_bytes()),
            handle: VideoHandle::new(format!("files/{id}")),
        }
    }

    #[test]
    fn test_happy_path() {
        let mut lifecycle = GenerationLifecycle::new();
        assert_eq!(lifecycle.phase(), Phase::Idle);

        lifecycle.begin(request(Resolution::P720)).unwrap();
        assert_eq!(lifecycle.phase(), Phase::Loading);
        assert!(lifecycle.last_request().is_some());

        let superseded = lifecycle.resolve(result("one")).unwrap();
        assert!(superseded.is_none());
        assert_eq!(lifecycle.phase(), Phase::Success);
        assert_eq!(
            lifecycle.state().result().map(|r| r.displayable_url.as_str()),
            Some("file:///tmp/one.mp4")
        );
    }

    #[test]
    fn test_submit_while_loading_is_rejected() {
        let mut lifecycle = GenerationLifecycle::new();
        lifecycle.begin(request(Resolution::P720)).unwrap();
        assert!(matches!(
            lifecycle.begin(request(Resolution::P1080)),
            Err(LifecycleError::ConcurrentRequest)
        ));
        // The in-flight request is untouched.
        assert_eq!(
            lifecycle.last_request().map(|r| r.settings.resolution),
            Some(Resolution::P720)
        );
    }

    #[test]
    fn test_error_keeps_last_request() {
        let mut lifecycle = GenerationLifecycle::new();
        lifecycle.begin(request(Resolution::P720)).unwrap();
        let outcome = lifecycle
            .reject(&GenerationFailure::rejected("quota exceeded"))
            .unwrap();
        assert!(!outcome.authorization_failure);
        assert_eq!(
            lifecycle.state().error_message(),
            Some("Video generation failed: quota exceeded")
        );
        assert_eq!(lifecycle.retry_request(), Some(request(Resolution::P720)));
    }

    #[test]
    fn test_reject_flags_authorization() {
        let mut lifecycle = GenerationLifecycle::new();
        lifecycle.begin(request(Resolution::P720)).unwrap();
        let outcome = lifecycle
            .reject(&GenerationFailure::rejected("Requested entity was not found."))
            .unwrap();
        assert!(outcome.authorization_failure);
        assert_eq!(lifecycle.phase(), Phase::Error);
    }

    #[test]
    fn test_retry_supersedes_previous_result_on_success() {
        let mut lifecycle = GenerationLifecycle::new();
        lifecycle.begin(request(Resolution::P720)).unwrap();
        lifecycle.resolve(result("one")).unwrap();

        let again = lifecycle.retry_request().unwrap();
        lifecycle.begin(again).unwrap();
        let superseded = lifecycle.resolve(result("two")).unwrap();
        assert_eq!(superseded.map(|r| r.handle), Some(VideoHandle::new("files/one")));
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut lifecycle = GenerationLifecycle::new();
        lifecycle.begin(request(Resolution::P720)).unwrap();
        lifecycle.resolve(result("one")).unwrap();

        let released = lifecycle.reset().unwrap();
        assert!(released.is_some());
        assert_eq!(lifecycle.phase(), Phase::Idle);
        assert!(lifecycle.last_request().is_none());
        assert!(lifecycle.pending_seed().is_none());
        assert!(lifecycle.retry_request().is_none());
    }

    #[test]
    fn test_retry_unavailable_when_idle_or_loading() {
        let mut lifecycle = GenerationLifecycle::new();
        assert!(lifecycle.retry_request().is_none());
        lifecycle.begin(request(Resolution::P720)).unwrap();
        assert!(lifecycle.retry_request().is_none());
        assert!(matches!(
            lifecycle.reset(),
            Err(LifecycleError::ConcurrentRequest)
        ));
    }

    #[test]
    fn test_extend_requires_720p_success() {
        let mut lifecycle = GenerationLifecycle::new();
        lifecycle.begin(request(Resolution::P1080)).unwrap();
        lifecycle.resolve(result("hd")).unwrap();
        assert!(!lifecycle.can_extend());
        assert!(matches!(
            lifecycle.extend(),
            Err(LifecycleError::ExtendUnavailable)
        ));
        assert_eq!(lifecycle.phase(), Phase::Success);
    }

    #[test]
    fn test_extend_seeds_without_touching_last_request() {
        let mut lifecycle = GenerationLifecycle::new();
        lifecycle.begin(request(Resolution::P720)).unwrap();
        lifecycle.resolve(result("one")).unwrap();
        assert!(lifecycle.can_extend());

        let outcome = lifecycle.extend().unwrap();
        assert_eq!(lifecycle.phase(), Phase::Idle);
        assert_eq!(lifecycle.pending_seed(), Some(&outcome.seed));
        assert_eq!(lifecycle.last_request(), Some(&request(Resolution::P720)));
        assert_eq!(
            outcome.superseded.map(|r| r.displayable_url),
            Some("file:///tmp/one.mp4".to_string())
        );

        // Submitting consumes the seed.
        lifecycle.begin(outcome.seed).unwrap();
        assert!(lifecycle.pending_seed().is_none());
    }

    #[test]
    fn test_abandon_leaves_a_retryable_error() {
        let mut lifecycle = GenerationLifecycle::new();
        assert!(lifecycle.abandon().is_none());
        assert_eq!(lifecycle.phase(), Phase::Idle);

        lifecycle.begin(request(Resolution::P720)).unwrap();
        lifecycle.resolve(result("kept")).unwrap();
        lifecycle.begin(request(Resolution::P720)).unwrap();

        let displaced = lifecycle.abandon();
        assert_eq!(
            displaced.map(|r| r.displayable_url),
            Some("file:///tmp/kept.mp4".to_string())
        );
        assert_eq!(lifecycle.phase(), Phase::Error);
        assert!(lifecycle
            .state()
            .error_message()
            .unwrap()
            .starts_with("Video generation failed: "));
        assert_eq!(lifecycle.retry_request(), Some(request(Resolution::P720)));
        assert!(lifecycle.reset().is_ok());
    }

    #[test]
    fn test_resolve_outside_loading() {
        let mut lifecycle = GenerationLifecycle::new();
        assert!(matches!(
            lifecycle.resolve(result("stray")),
            Err(LifecycleError::NotLoading)
        ));
        assert!(matches!(
            lifecycle.reject(&GenerationFailure::rejected("stray")),
            Err(LifecycleError::NotLoading)
        ));
    }
}
