/// In-memory collaborators: a scripted generation service and a static
/// credential authority. Used by the tests and by dry runs.
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use crate::credentials::CredentialAuthority;
use crate::request::GenerationRequest;
use crate::service::{GenerationFailure, GenerationResult, GenerationService, VideoHandle};

#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Succeed,
    Fail(GenerationFailure),
}

/// Answers `generate` from a queue of scripted outcomes, succeeding once the
/// queue runs dry. Records every request and tracks which result URLs are
/// still live.
#[derive(Default)]
pub struct MockGenerationService {
    outcomes: Mutex<VecDeque<ScriptedOutcome>>,
    requests: Mutex<Vec<GenerationRequest>>,
    live_urls: Mutex<HashSet<String>>,
    released_urls: Mutex<Vec<String>>,
}

impl MockGenerationService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outcomes(outcomes: impl IntoIterator<Item = ScriptedOutcome>) -> Self {
        let service = Self::new();
        service.outcomes.lock().extend(outcomes);
        service
    }

    pub fn push_outcome(&self, outcome: ScriptedOutcome) {
        self.outcomes.lock().push_back(outcome);
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().clone()
    }

    pub fn live_urls(&self) -> HashSet<String> {
        self.live_urls.lock().clone()
    }

    pub fn released_urls(&self) -> Vec<String> {
        self.released_urls.lock().clone()
    }
}

#[async_trait]
impl GenerationService for MockGenerationService {
    fn name(&self) -> &str {
        "mock"
    }

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, GenerationFailure> {
        self.requests.lock().push(request.clone());
        let outcome = self
            .outcomes
            .lock()
            .pop_front()
            .unwrap_or(ScriptedOutcome::Succeed);

        match outcome {
            ScriptedOutcome::Fail(failure) => Err(failure),
            ScriptedOutcome::Succeed => {
                let id = Uuid::new_v4();
                let url = format!("mock://videos/{id}.mp4");
                self.live_urls.lock().insert(url.clone());
                let blob = format!("mock video for '{}'", request.prompt.trim());
                Ok(GenerationResult {
                    displayable_url: url,
                    blob: Arc::from(blob.into_bytes()),
                    handle: VideoHandle::new(format!("files/{id}")),
                })
            }
        }
    }

    fn release(&self, result: &GenerationResult) {
        self.live_urls.lock().remove(&result.displayable_url);
        self.released_urls
            .lock()
            .push(result.displayable_url.clone());
    }
}

/// Credential authority with a fixed answer. Opening the selection UI marks
/// a credential as selected.
pub struct StaticCredentialAuthority {
    selected: AtomicBool,
    failing: AtomicBool,
    selections: AtomicUsize,
}

impl StaticCredentialAuthority {
    pub fn new(selected: bool) -> Self {
        Self {
            selected: AtomicBool::new(selected),
            failing: AtomicBool::new(false),
            selections: AtomicUsize::new(0),
        }
    }

    /// An authority whose check always errors until a credential is picked.
    pub fn failing() -> Self {
        let authority = Self::new(false);
        authority.failing.store(true, Ordering::SeqCst);
        authority
    }

    pub fn set_selected(&self, selected: bool) {
        self.selected.store(selected, Ordering::SeqCst);
    }

    pub fn selection_count(&self) -> usize {
        self.selections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialAuthority for StaticCredentialAuthority {
    async fn has_selected_credential(&self) -> anyhow::Result<bool> {
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("credential host unavailable");
        }
        Ok(self.selected.load(Ordering::SeqCst))
    }

    async fn open_selection_ui(&self) -> anyhow::Result<()> {
        self.selections.fetch_add(1, Ordering::SeqCst);
        self.failing.store(false, Ordering::SeqCst);
        self.selected.store(true, Ordering::SeqCst);
        Ok(())
    }
}
