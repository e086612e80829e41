/// Gemini API video backend
///
/// Submits a `predictLongRunning` operation, polls it until done, downloads
/// the first generated sample and keeps it on disk until the studio
/// releases it.
use crate::config::BackendConfig;
use crate::credentials::ApiKeyStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use studio_core::{
    Engine, FailureKind, GenerationFailure, GenerationRequest, GenerationResult,
    GenerationService, MediaAsset, RequestInputs, VideoHandle,
};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const API_KEY_HEADER: &str = "x-goog-api-key";

#[derive(Debug, Error)]
enum VeoError {
    #[error("no API key selected")]
    MissingKey,

    #[error("HTTP {status}: {body}")]
    Http { status: StatusCode, body: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Operation(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl From<VeoError> for GenerationFailure {
    fn from(err: VeoError) -> Self {
        let kind = match &err {
            VeoError::MissingKey => FailureKind::Unauthorized,
            VeoError::Http { status, .. } => classify_status(*status),
            VeoError::Operation(_) => FailureKind::Rejected,
            VeoError::Transport(_) | VeoError::Io { .. } => FailureKind::Transport,
            VeoError::InvalidResponse(_) => FailureKind::InvalidResponse,
            VeoError::Timeout(_) => FailureKind::TimedOut,
        };
        GenerationFailure::new(kind, err.to_string())
    }
}

fn classify_status(status: StatusCode) -> FailureKind {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => FailureKind::Unauthorized,
        _ => FailureKind::Rejected,
    }
}

#[derive(Debug, Deserialize)]
struct Operation {
    name: String,
    #[serde(default)]
    done: bool,
    error: Option<OperationStatus>,
    response: Option<OperationResponse>,
}

#[derive(Debug, Deserialize)]
struct OperationStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationResponse {
    generate_video_response: Option<GenerateVideoResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateVideoResponse {
    #[serde(default)]
    generated_samples: Vec<GeneratedSample>,
    #[serde(default)]
    rai_media_filtered_reasons: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GeneratedSample {
    video: Option<GeneratedVideo>,
}

#[derive(Debug, Deserialize)]
struct GeneratedVideo {
    uri: Option<String>,
}

impl Operation {
    /// URI of the first generated sample of a finished operation.
    fn into_video_uri(self) -> Result<String, VeoError> {
        if let Some(status) = self.error {
            return Err(VeoError::Operation(format!(
                "{} (code {})",
                status.message, status.code
            )));
        }
        let response = self
            .response
            .and_then(|r| r.generate_video_response)
            .ok_or_else(|| {
                VeoError::InvalidResponse(format!("operation {} has no video response", self.name))
            })?;
        if let Some(uri) = response
            .generated_samples
            .into_iter()
            .find_map(|sample| sample.video.and_then(|v| v.uri))
        {
            return Ok(uri);
        }
        if response.rai_media_filtered_reasons.is_empty() {
            Err(VeoError::InvalidResponse(format!(
                "operation {} finished without a video",
                self.name
            )))
        } else {
            Err(VeoError::Operation(
                response.rai_media_filtered_reasons.join("; "),
            ))
        }
    }
}

fn inline_image(asset: &MediaAsset) -> Value {
    json!({
        "bytesBase64Encoded": asset.encoded_payload(),
        "mimeType": asset.mime_type(),
    })
}

/// Request body for `predictLongRunning`.
pub fn build_payload(request: &GenerationRequest) -> Value {
    let mut instance = json!({ "prompt": request.prompt });

    match &request.inputs {
        RequestInputs::TextToVideo => {}
        RequestInputs::FramesToVideo {
            start_frame,
            end_frame,
            looping,
        } => {
            instance["image"] = inline_image(start_frame);
            // A loop ends where it started.
            let last = if *looping {
                Some(start_frame)
            } else {
                end_frame.as_ref()
            };
            if let Some(last) = last {
                instance["lastFrame"] = inline_image(last);
            }
        }
        RequestInputs::ReferencesToVideo {
            reference_images,
            style_image,
        } => {
            let mut references: Vec<Value> = reference_images
                .iter()
                .map(|asset| json!({ "image": inline_image(asset), "referenceType": "asset" }))
                .collect();
            if let Some(style) = style_image {
                references.push(json!({ "image": inline_image(style), "referenceType": "style" }));
            }
            instance["referenceImages"] = Value::Array(references);
        }
        RequestInputs::ExtendVideo {
            input_video_handle,
            ..
        } => {
            instance["video"] = json!({ "uri": input_video_handle.uri() });
        }
    }

    json!({
        "instances": [instance],
        "parameters": {
            "aspectRatio": request.settings.aspect_ratio.ratio(),
            "resolution": request.settings.resolution.as_str(),
            "numberOfVideos": 1,
        }
    })
}

/// Veo over the Gemini API
pub struct GeminiVeoBackend {
    /// Normalized copy: trimmed URL without a trailing slash, trimmed models.
    config: BackendConfig,
    poll_interval: Duration,
    timeout: Duration,
    keys: ApiKeyStore,
    client: reqwest::Client,
}

impl GeminiVeoBackend {
    /// Create new Gemini backend
    pub fn new(config: &BackendConfig, keys: ApiKeyStore) -> Result<Self> {
        if config.api_url.trim().is_empty() {
            anyhow::bail!("Gemini backend requires api_url");
        }
        if config.fast_model.trim().is_empty() || config.standard_model.trim().is_empty() {
            anyhow::bail!("Gemini backend requires a model for every engine");
        }
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(20))
            .build()
            .context("building HTTP client")?;

        let mut config = config.clone();
        config.api_url = config.api_url.trim().trim_end_matches('/').to_string();
        config.fast_model = config.fast_model.trim().to_string();
        config.standard_model = config.standard_model.trim().to_string();

        Ok(Self {
            poll_interval: Duration::from_secs(config.poll_interval_secs.max(1)),
            timeout: Duration::from_secs(config.timeout_secs.max(1)),
            keys,
            client,
            config,
        })
    }

    fn submit_url(&self, engine: Engine) -> String {
        format!(
            "{}/v1beta/models/{}:predictLongRunning",
            self.config.api_url,
            self.config.model_for(engine)
        )
    }

    async fn run(&self, request: &GenerationRequest) -> Result<GenerationResult, VeoError> {
        let key = self.keys.get().ok_or(VeoError::MissingKey)?;

        let mut operation = self.submit(&key, request).await?;
        info!(operation = %operation.name, "generation operation started");
        while !operation.done {
            tokio::time::sleep(self.poll_interval).await;
            operation = self.poll(&key, &operation.name).await?;
            debug!(operation = %operation.name, done = operation.done, "polled operation");
        }

        let uri = operation.into_video_uri()?;
        let bytes = self.download(&key, &uri).await?;
        let path = self.write_clip(&bytes).await?;
        info!(path = %path.display(), size = bytes.len(), "clip downloaded");

        Ok(GenerationResult {
            displayable_url: format!("file://{}", path.display()),
            blob: Arc::from(bytes),
            handle: VideoHandle::new(uri),
        })
    }

    async fn submit(&self, key: &str, request: &GenerationRequest) -> Result<Operation, VeoError> {
        let response = self
            .client
            .post(self.submit_url(request.settings.engine))
            .header(API_KEY_HEADER, key)
            .json(&build_payload(request))
            .send()
            .await?;
        parse_operation(&read_body(response).await?)
    }

    async fn poll(&self, key: &str, name: &str) -> Result<Operation, VeoError> {
        let response = self
            .client
            .get(format!("{}/v1beta/{}", self.config.api_url, name))
            .header(API_KEY_HEADER, key)
            .send()
            .await?;
        parse_operation(&read_body(response).await?)
    }

    async fn download(&self, key: &str, uri: &str) -> Result<Vec<u8>, VeoError> {
        let response = self
            .client
            .get(uri)
            .header(API_KEY_HEADER, key)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VeoError::Http { status, body });
        }
        Ok(response.bytes().await?.to_vec())
    }

    async fn write_clip(&self, bytes: &[u8]) -> Result<PathBuf, VeoError> {
        let output_dir = &self.config.output_dir;
        tokio::fs::create_dir_all(output_dir)
            .await
            .map_err(|source| VeoError::Io {
                path: output_dir.clone(),
                source,
            })?;
        let path = output_dir.join(format!("{}.mp4", Uuid::new_v4()));
        if let Err(source) = tokio::fs::write(&path, bytes).await {
            return Err(VeoError::Io { path, source });
        }
        Ok(path)
    }
}

async fn read_body(response: reqwest::Response) -> Result<String, VeoError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(VeoError::Http { status, body });
    }
    Ok(body)
}

fn parse_operation(body: &str) -> Result<Operation, VeoError> {
    serde_json::from_str(body)
        .map_err(|err| VeoError::InvalidResponse(format!("{err}; raw: {body}")))
}

#[async_trait]
impl GenerationService for GeminiVeoBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    #[instrument(skip_all, fields(mode = %request.mode(), engine = %request.settings.engine))]
    async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationResult, GenerationFailure> {
        match tokio::time::timeout(self.timeout, self.run(request)).await {
            Ok(result) => result.map_err(GenerationFailure::from),
            Err(_) => Err(VeoError::Timeout(self.timeout).into()),
        }
    }

    fn release(&self, result: &GenerationResult) {
        let Some(path) = result.displayable_url.strip_prefix("file://") else {
            return;
        };
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path, "released clip"),
            Err(err) => warn!(path, "failed to remove released clip: {err}"),
        }
    }
}
