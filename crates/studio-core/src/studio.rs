/// The studio: one owned container for the form, the generation
/// lifecycle and the credential gate. Rendering layers read its state,
/// raise intents through its methods, and watch its event channel.
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::credentials::{CredentialAuthority, CredentialGate};
use crate::form::FormState;
use crate::lifecycle::{GenerationLifecycle, LifecycleError, LifecycleState, Phase};
use crate::modes::Readiness;
use crate::request::{self, GenerationRequest, ValidationError};
use crate::service::{GenerationResult, GenerationService};
use crate::{Result, StudioError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudioEvent {
    StateChanged(Phase),
    CredentialPromptRaised,
    CredentialPromptClosed,
    ResultReleased { url: String },
    SeedLoaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The gate refused; the credential prompt is up and nothing was sent.
    Unauthorized,
    Succeeded,
    Failed { authorization_failure: bool },
    /// Retry with nothing to resubmit.
    NothingToRetry,
}

pub struct Studio {
    service: Arc<dyn GenerationService>,
    gate: CredentialGate,
    form: FormState,
    lifecycle: GenerationLifecycle,
    tx_events: Sender<StudioEvent>,
    rx_events: Receiver<StudioEvent>,
}

impl Studio {
    pub fn new(
        service: Arc<dyn GenerationService>,
        authority: Option<Arc<dyn CredentialAuthority>>,
    ) -> Self {
        let (tx_events, rx_events) = unbounded();
        Self {
            service,
            gate: CredentialGate::new(authority),
            form: FormState::default(),
            lifecycle: GenerationLifecycle::new(),
            tx_events,
            rx_events,
        }
    }

    pub fn events(&self) -> Receiver<StudioEvent> {
        self.rx_events.clone()
    }

    pub fn state(&self) -> &LifecycleState {
        self.lifecycle.state()
    }

    pub fn phase(&self) -> Phase {
        self.lifecycle.phase()
    }

    pub fn last_request(&self) -> Option<&GenerationRequest> {
        self.lifecycle.last_request()
    }

    pub fn pending_seed(&self) -> Option<&GenerationRequest> {
        self.lifecycle.pending_seed()
    }

    pub fn form(&self) -> &FormState {
        &self.form
    }

    pub fn form_mut(&mut self) -> &mut FormState {
        &mut self.form
    }

    pub fn readiness(&self) -> Readiness {
        self.form.readiness()
    }

    pub fn can_retry(&self) -> bool {
        self.lifecycle.retry_request().is_some()
    }

    pub fn can_extend(&self) -> bool {
        self.lifecycle.can_extend()
    }

    pub fn credential_prompt_open(&self) -> bool {
        self.gate.prompt_open()
    }

    /// First-load credential check.
    pub async fn mount(&mut self) -> bool {
        let authorized = self.gate.ensure_authorized().await;
        if !authorized {
            self.emit(StudioEvent::CredentialPromptRaised);
        }
        authorized
    }

    /// Submit the current form.
    #[instrument(skip(self), fields(mode = %self.form.mode()))]
    pub async fn submit(&mut self) -> Result<SubmitOutcome> {
        if let Readiness::Blocked { hint } = self.form.readiness() {
            debug!(hint, "submit blocked");
            return Err(ValidationError::NotReady {
                mode: self.form.mode(),
                hint,
            }
            .into());
        }
        let request = request::build(&self.form)?;
        self.generate(request).await
    }

    /// Resubmit the last request verbatim.
    #[instrument(skip(self))]
    pub async fn retry(&mut self) -> Result<SubmitOutcome> {
        match self.lifecycle.retry_request() {
            Some(request) => self.generate(request).await,
            None => {
                debug!("retry requested with nothing to retry");
                Ok(SubmitOutcome::NothingToRetry)
            }
        }
    }

    /// "New video": drop the result, the last request and any seed, and
    /// reset the form.
    pub fn new_video(&mut self) -> Result<()> {
        let released = self.lifecycle.reset()?;
        self.release(released);
        self.form = FormState::default();
        self.emit(StudioEvent::StateChanged(Phase::Idle));
        Ok(())
    }

    /// Feed the current result back in as an extend seed.
    pub fn extend(&mut self) -> Result<()> {
        let outcome = self.lifecycle.extend()?;
        self.release(outcome.superseded);
        self.form = FormState::from_request(&outcome.seed);
        self.emit(StudioEvent::SeedLoaded);
        self.emit(StudioEvent::StateChanged(Phase::Idle));
        Ok(())
    }

    /// The user acknowledged the credential prompt: open the picker, then
    /// retry if the last attempt failed.
    pub async fn complete_credential_selection(&mut self) -> Result<Option<SubmitOutcome>> {
        let selection = self.gate.complete_selection().await;
        self.emit(StudioEvent::CredentialPromptClosed);
        selection.map_err(StudioError::Credential)?;

        if self.phase() == Phase::Error && self.lifecycle.last_request().is_some() {
            info!("credential selected, retrying failed generation");
            return self.retry().await.map(Some);
        }
        Ok(None)
    }

    async fn generate(&mut self, request: GenerationRequest) -> Result<SubmitOutcome> {
        if self.lifecycle.is_loading() {
            return Err(LifecycleError::ConcurrentRequest.into());
        }
        if !self.gate.ensure_authorized().await {
            self.emit(StudioEvent::CredentialPromptRaised);
            return Ok(SubmitOutcome::Unauthorized);
        }

        self.lifecycle.begin(request.clone())?;
        self.emit(StudioEvent::StateChanged(Phase::Loading));
        info!(service = self.service.name(), "submitting generation");

        let mut in_flight = InFlight {
            lifecycle: &mut self.lifecycle,
            service: self.service.as_ref(),
            tx_events: &self.tx_events,
        };
        let (outcome, superseded) = match in_flight.service.generate(&request).await {
            Ok(result) => (
                SubmitOutcome::Succeeded,
                in_flight.lifecycle.resolve(result)?,
            ),
            Err(failure) => {
                let rejected = in_flight.lifecycle.reject(&failure)?;
                (
                    SubmitOutcome::Failed {
                        authorization_failure: rejected.authorization_failure,
                    },
                    rejected.superseded,
                )
            }
        };
        drop(in_flight);

        self.release(superseded);
        if let SubmitOutcome::Failed {
            authorization_failure: true,
        } = outcome
        {
            warn!("generation rejected for credential reasons");
            self.gate.raise_prompt();
            self.emit(StudioEvent::CredentialPromptRaised);
        }
        self.emit(StudioEvent::StateChanged(self.phase()));
        Ok(outcome)
    }

    fn release(&self, result: Option<GenerationResult>) {
        if let Some(result) = result {
            debug!(url = %result.displayable_url, "releasing superseded result");
            self.service.release(&result);
            self.emit(StudioEvent::ResultReleased {
                url: result.displayable_url,
            });
        }
    }

    fn emit(&self, event: StudioEvent) {
        // The studio holds a receiver itself, so sending cannot fail.
        let _ = self.tx_events.send(event);
    }
}

/// A generation the service has not answered yet. Dropped without settling
/// (the caller stopped polling the future), it moves the lifecycle to
/// `Error` so retry and New stay available.
struct InFlight<'a> {
    lifecycle: &'a mut GenerationLifecycle,
    service: &'a dyn GenerationService,
    tx_events: &'a Sender<StudioEvent>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.lifecycle.is_loading() {
            return;
        }
        let displaced = self.lifecycle.abandon();
        if let Some(result) = displaced {
            self.service.release(&result);
            let _ = self.tx_events.send(StudioEvent::ResultReleased {
                url: result.displayable_url,
            });
        }
        let _ = self
            .tx_events
            .send(StudioEvent::StateChanged(self.lifecycle.phase()));
    }
}
