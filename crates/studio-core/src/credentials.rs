/// Credential gate in front of every generation attempt.
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Whoever owns credential selection (a key picker, a host app, ...).
#[async_trait]
pub trait CredentialAuthority: Send + Sync {
    /// Has a credential been selected?
    async fn has_selected_credential(&self) -> anyhow::Result<bool>;

    /// Let the user pick a credential.
    async fn open_selection_ui(&self) -> anyhow::Result<()>;
}

/// Fail-closed authorization pre-check plus the "please select a
/// credential" prompt state the rendering layer shows.
pub struct CredentialGate {
    authority: Option<Arc<dyn CredentialAuthority>>,
    prompt_open: bool,
}

impl CredentialGate {
    pub fn new(authority: Option<Arc<dyn CredentialAuthority>>) -> Self {
        Self {
            authority,
            prompt_open: false,
        }
    }

    /// A gate with no authority behind it always passes.
    pub fn unguarded() -> Self {
        Self::new(None)
    }

    pub fn prompt_open(&self) -> bool {
        self.prompt_open
    }

    /// Returns false, with the prompt raised, when no credential is
    /// selected or the check itself fails.
    pub async fn ensure_authorized(&mut self) -> bool {
        let Some(authority) = &self.authority else {
            return true;
        };
        let authorized = match authority.has_selected_credential().await {
            Ok(selected) => selected,
            Err(err) => {
                warn!("credential check failed: {err:#}");
                false
            }
        };
        if !authorized {
            self.raise_prompt();
        }
        authorized
    }

    pub fn raise_prompt(&mut self) {
        debug!("credential selection requested");
        self.prompt_open = true;
    }

    /// Close the prompt and hand over to the authority's picker.
    pub async fn complete_selection(&mut self) -> anyhow::Result<()> {
        self.prompt_open = false;
        if let Some(authority) = &self.authority {
            authority.open_selection_ui().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::StaticCredentialAuthority;

    #[tokio::test]
    async fn test_unguarded_gate_passes() {
        let mut gate = CredentialGate::unguarded();
        assert!(gate.ensure_authorized().await);
        assert!(!gate.prompt_open());
    }

    #[tokio::test]
    async fn test_missing_credential_raises_prompt() {
        let authority = Arc::new(StaticCredentialAuthority::new(false));
        let mut gate = CredentialGate::new(Some(authority.clone()));
        assert!(!gate.ensure_authorized().await);
        assert!(gate.prompt_open());

        gate.complete_selection().await.unwrap();
        assert!(!gate.prompt_open());
        assert_eq!(authority.selection_count(), 1);
        assert!(gate.ensure_authorized().await);
    }

    #[tokio::test]
    async fn test_failing_check_is_not_authorized() {
        let authority = Arc::new(StaticCredentialAuthority::failing());
        let mut gate = CredentialGate::new(Some(authority));
        assert!(!gate.ensure_authorized().await);
        assert!(gate.prompt_open());
    }

    #[tokio::test]
    async fn test_deselected_credential_is_checked_again() {
        let authority = Arc::new(StaticCredentialAuthority::new(true));
        let mut gate = CredentialGate::new(Some(authority.clone()));
        assert!(gate.ensure_authorized().await);

        authority.set_selected(false);
        assert!(!gate.ensure_authorized().await);
        assert!(gate.prompt_open());
        assert_eq!(authority.selection_count(), 0);
    }
}
