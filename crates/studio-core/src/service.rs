/// Remote generation service seam.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::request::GenerationRequest;

/// Message fragments the generation API uses when the credential is
/// missing or invalid. Matching on them is best-effort; services should
/// prefer reporting `FailureKind::Unauthorized` directly.
pub const AUTHORIZATION_FAILURE_MARKERS: [&str; 2] = ["entity was not found", "API_KEY_INVALID"];

pub fn looks_like_authorization_failure(message: &str) -> bool {
    AUTHORIZATION_FAILURE_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

/// Opaque reference to a video held by the remote service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoHandle(String);

impl VideoHandle {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn uri(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A finished clip: something to play, its bytes, and the remote handle
/// needed to extend it.
#[derive(Clone, PartialEq, Eq)]
pub struct GenerationResult {
    pub displayable_url: String,
    pub blob: Arc<[u8]>,
    pub handle: VideoHandle,
}

impl fmt::Debug for GenerationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GenerationResult")
            .field("displayable_url", &self.displayable_url)
            .field("blob_len", &self.blob.len())
            .field("handle", &self.handle)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The credential was rejected.
    Unauthorized,
    /// The service refused or failed the generation.
    Rejected,
    Transport,
    InvalidResponse,
    TimedOut,
}

/// Rejection from the generation service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct GenerationFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl GenerationFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unauthorized, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Rejected, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transport, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(FailureKind::InvalidResponse, message)
    }

    pub fn timed_out(message: impl Into<String>) -> Self {
        Self::new(FailureKind::TimedOut, message)
    }

    /// Structured kind first, message sniffing as the fallback.
    pub fn is_authorization(&self) -> bool {
        self.kind == FailureKind::Unauthorized || looks_like_authorization_failure(&self.message)
    }
}

/// Remote generation service. One call per request; job polling, if any,
/// happens behind `generate`.
#[async_trait]
pub trait GenerationService: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, GenerationFailure>;

    /// Free whatever backs `result.displayable_url`. Called once the result
    /// is superseded.
    fn release(&self, _result: &GenerationResult) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_markers() {
        assert!(looks_like_authorization_failure(
            "Requested entity was not found."
        ));
        assert!(looks_like_authorization_failure(
            "400 Bad Request: {\"reason\": \"API_KEY_INVALID\"}"
        ));
        assert!(!looks_like_authorization_failure("quota exceeded"));
        // Matching is case-sensitive, like the service's own messages.
        assert!(!looks_like_authorization_failure("api_key_invalid"));
    }

    #[test]
    fn test_structured_kind_wins() {
        assert!(GenerationFailure::unauthorized("denied").is_authorization());
        assert!(GenerationFailure::rejected("API_KEY_INVALID").is_authorization());
        assert!(!GenerationFailure::timed_out("took too long").is_authorization());
    }
}
