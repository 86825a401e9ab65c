//! Speech-transcription batch flow: submit a job, poll it to a terminal
//! lifecycle state under a wall-clock deadline, then locate and fetch the
//! result artifact from object storage.

#[cfg(test)]
mod tests;

use crate::auth::RequestAuthorizer;
use crate::genai::{provider_error, transport_error};
use crate::{BridgeError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};
use url::Url;

/// Speech service API version path segment (distinct from the GenAI
/// inference version).
pub const API_VERSION: &str = "20220101";

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Provider-side lifecycle state of a transcription job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobState {
    Accepted,
    InProgress,
    Succeeded,
    Failed,
    Canceled,
}

impl JobState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Succeeded | JobState::Failed | JobState::Canceled
        )
    }

    #[inline]
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Accepted => "ACCEPTED",
            JobState::InProgress => "IN_PROGRESS",
            JobState::Succeeded => "SUCCEEDED",
            JobState::Failed => "FAILED",
            JobState::Canceled => "CANCELED",
        }
    }
}

impl FromStr for JobState {
    type Err = BridgeError;

    #[inline]
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ACCEPTED" => Ok(JobState::Accepted),
            "IN_PROGRESS" => Ok(JobState::InProgress),
            "SUCCEEDED" => Ok(JobState::Succeeded),
            "FAILED" => Ok(JobState::Failed),
            "CANCELED" => Ok(JobState::Canceled),
            other => Err(BridgeError::Protocol(format!(
                "Unknown job lifecycle state: {other}"
            ))),
        }
    }
}

impl fmt::Display for JobState {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Job metadata as observed from the job service. Owned externally; this
/// system only reads it after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionJob {
    pub id: String,
    pub state: JobState,
    pub lifecycle_details: Option<String>,
    pub model_type: Option<String>,
    pub language_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Diarization {
    pub enabled: bool,
    pub speaker_count: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub compartment_id: String,
    pub display_name: Option<String>,
    pub namespace: String,
    pub bucket: String,
    pub object_name: String,
    pub model_type: String,
    pub language_code: Option<String>,
    pub diarization: Option<Diarization>,
    pub output_prefix: String,
    /// Additional transcript format, e.g. `SRT`.
    pub alternate_format: Option<String>,
    /// Skip polling entirely and return the job id right after submission.
    pub return_job_id_only: bool,
    /// Cross-check requested model/language against job and artifact reports.
    pub strict_options: bool,
}

impl TranscriptionRequest {
    #[inline]
    pub fn new(
        compartment_id: impl Into<String>,
        namespace: impl Into<String>,
        bucket: impl Into<String>,
        object_name: impl Into<String>,
        model_type: impl Into<String>,
        output_prefix: impl Into<String>,
    ) -> Self {
        Self {
            compartment_id: compartment_id.into(),
            display_name: None,
            namespace: namespace.into(),
            bucket: bucket.into(),
            object_name: object_name.into(),
            model_type: model_type.into(),
            language_code: None,
            diarization: None,
            output_prefix: output_prefix.into(),
            alternate_format: None,
            return_job_id_only: false,
            strict_options: true,
        }
    }
}

/// Decoded result artifact.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TranscriptArtifact {
    #[serde(rename = "modelDetails", default)]
    pub model_details: Option<ArtifactModelDetails>,
    #[serde(default)]
    pub transcriptions: Vec<TranscriptionSegment>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ArtifactModelDetails {
    #[serde(rename = "modelType", default)]
    pub model_type: Option<String>,
    #[serde(rename = "languageCode", default)]
    pub language_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TranscriptionSegment {
    pub transcription: String,
}

/// Job-service seam: create and observe transcription jobs.
#[async_trait]
pub trait JobService: Send + Sync {
    async fn create_job(&self, request: &TranscriptionRequest) -> Result<TranscriptionJob>;
    async fn get_job(&self, job_id: &str) -> Result<TranscriptionJob>;
}

/// Object-storage seam: list by prefix, fetch by name.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>>;
    async fn get_object(&self, name: &str) -> Result<Vec<u8>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptionOutcome {
    /// Submission-only mode: the job id, no polling performed.
    JobId(String),
    Transcript {
        job: TranscriptionJob,
        artifact: TranscriptArtifact,
    },
}

/// Drives submit → poll → locate → fetch → validate. Cancellation is
/// cooperative only; the deadline is the single forced exit.
pub struct TranscriptionOrchestrator<J, S> {
    jobs: J,
    objects: S,
    poll_interval: Duration,
    timeout: Duration,
}

impl<J: JobService, S: ObjectStore> TranscriptionOrchestrator<J, S> {
    #[inline]
    pub fn new(jobs: J, objects: S) -> Self {
        Self {
            jobs,
            objects,
            poll_interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    #[inline]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[inline]
    pub async fn create_and_await(
        &self,
        request: &TranscriptionRequest,
    ) -> Result<TranscriptionOutcome> {
        let job = self.jobs.create_job(request).await?;
        info!("Submitted transcription job {}", job.id);

        if request.return_job_id_only {
            return Ok(TranscriptionOutcome::JobId(job.id));
        }

        let job = self.await_terminal(&job.id).await?;
        if job.state != JobState::Succeeded {
            return Err(BridgeError::JobFailed {
                job_id: job.id.clone(),
                state: job.state.to_string(),
                message: job.lifecycle_details.clone().unwrap_or_default(),
            });
        }

        let artifact = self.fetch_artifact(request, &job).await?;

        if request.strict_options {
            validate_options(request, &job, &artifact)?;
        }

        Ok(TranscriptionOutcome::Transcript { job, artifact })
    }

    async fn await_terminal(&self, job_id: &str) -> Result<TranscriptionJob> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let job = self.jobs.get_job(job_id).await?;
            debug!("Job {} is {}", job_id, job.state);
            if job.state.is_terminal() {
                return Ok(job);
            }
            if Instant::now() >= deadline {
                return Err(BridgeError::Timeout {
                    job_id: job_id.to_string(),
                    limit_secs: self.timeout.as_secs(),
                });
            }
            sleep(self.poll_interval).await;
        }
    }

    /// The output object's exact name is not known in advance: list the
    /// candidate prefixes, prefer the first JSON object carrying the job's
    /// folder marker, fall back to any JSON object found.
    async fn fetch_artifact(
        &self,
        request: &TranscriptionRequest,
        job: &TranscriptionJob,
    ) -> Result<TranscriptArtifact> {
        let marker = job_folder_marker(&job.id);
        let prefixes = candidate_prefixes(&request.output_prefix, &marker);

        let mut names: Vec<String> = Vec::new();
        for prefix in &prefixes {
            for name in self.objects.list_objects(prefix).await? {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }

        let json_names: Vec<&String> = names
            .iter()
            .filter(|n| n.to_ascii_lowercase().ends_with(".json"))
            .collect();

        let chosen = json_names
            .iter()
            .find(|n| n.contains(&marker))
            .or_else(|| {
                if !json_names.is_empty() {
                    warn!(
                        "No result object carries marker {marker}; falling back to first JSON match"
                    );
                }
                json_names.first()
            })
            .ok_or_else(|| BridgeError::MissingArtifact(prefixes.clone()))?;

        debug!("Fetching transcription artifact {chosen}");
        let bytes = self.objects.get_object(chosen).await?;

        serde_json::from_slice(&bytes).map_err(|e| {
            BridgeError::Protocol(format!("Undecodable transcription artifact {chosen}: {e}"))
        })
    }
}

/// Folder marker derived from the job id's trailing segment.
fn job_folder_marker(job_id: &str) -> String {
    let tail = job_id.rsplit('.').next().unwrap_or(job_id);
    format!("job-{tail}")
}

fn candidate_prefixes(output_prefix: &str, marker: &str) -> Vec<String> {
    let trimmed = output_prefix.trim_matches('/');
    let mut prefixes = Vec::new();
    for candidate in [
        if trimmed.is_empty() {
            marker.to_string()
        } else {
            format!("{trimmed}/{marker}")
        },
        marker.to_string(),
    ] {
        if !prefixes.contains(&candidate) {
            prefixes.push(candidate);
        }
    }
    prefixes
}

/// Strict-mode check: the requested model/language must match both what the
/// job reports and what the artifact reports, where present.
fn validate_options(
    request: &TranscriptionRequest,
    job: &TranscriptionJob,
    artifact: &TranscriptArtifact,
) -> Result<()> {
    let artifact_details = artifact.model_details.as_ref();

    check_field(
        "modelType",
        Some(&request.model_type),
        job.model_type.as_deref(),
    )?;
    check_field(
        "modelType",
        Some(&request.model_type),
        artifact_details.and_then(|d| d.model_type.as_deref()),
    )?;
    check_field(
        "languageCode",
        request.language_code.as_deref(),
        job.language_code.as_deref(),
    )?;
    check_field(
        "languageCode",
        request.language_code.as_deref(),
        artifact_details.and_then(|d| d.language_code.as_deref()),
    )?;
    Ok(())
}

fn check_field(field: &str, requested: Option<&str>, reported: Option<&str>) -> Result<()> {
    if let (Some(requested), Some(reported)) = (requested, reported) {
        if requested != reported {
            return Err(BridgeError::OptionMismatch {
                field: field.to_string(),
                requested: requested.to_string(),
                reported: reported.to_string(),
            });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Reqwest-backed service clients
// ---------------------------------------------------------------------------

/// Speech service client implementing `JobService` over the REST API.
#[derive(Clone)]
pub struct SpeechApiClient {
    http: reqwest::Client,
    authorizer: Arc<dyn RequestAuthorizer>,
    endpoint: Url,
}

impl SpeechApiClient {
    #[inline]
    pub fn new(http: reqwest::Client, authorizer: Arc<dyn RequestAuthorizer>, endpoint: Url) -> Self {
        Self {
            http,
            authorizer,
            endpoint,
        }
    }
}

#[derive(Deserialize)]
struct WireJob {
    id: String,
    #[serde(rename = "lifecycleState")]
    lifecycle_state: String,
    #[serde(rename = "lifecycleDetails", default)]
    lifecycle_details: Option<String>,
    #[serde(rename = "modelDetails", default)]
    model_details: Option<WireModelDetails>,
}

#[derive(Deserialize)]
struct WireModelDetails {
    #[serde(rename = "modelType", default)]
    model_type: Option<String>,
    #[serde(rename = "languageCode", default)]
    language_code: Option<String>,
}

impl WireJob {
    fn into_job(self) -> Result<TranscriptionJob> {
        let state = self.lifecycle_state.parse()?;
        let (model_type, language_code) = self
            .model_details
            .map_or((None, None), |d| (d.model_type, d.language_code));
        Ok(TranscriptionJob {
            id: self.id,
            state,
            lifecycle_details: self.lifecycle_details,
            model_type,
            language_code,
        })
    }
}

fn job_request_body(request: &TranscriptionRequest) -> Value {
    let mut model_details = serde_json::json!({ "modelType": request.model_type });
    if let Some(language) = &request.language_code {
        model_details["languageCode"] = Value::String(language.clone());
    }
    if let Some(diarization) = &request.diarization {
        let mut settings = serde_json::json!({ "isDiarizationEnabled": diarization.enabled });
        if let Some(count) = diarization.speaker_count {
            settings["numberOfSpeakers"] = Value::from(count);
        }
        model_details["transcriptionSettings"] = serde_json::json!({ "diarization": settings });
    }

    let mut body = serde_json::json!({
        "compartmentId": request.compartment_id,
        "modelDetails": model_details,
        "inputLocation": {
            "locationType": "OBJECT_LIST_INLINE_INPUT_LOCATION",
            "objectLocations": [{
                "namespaceName": request.namespace,
                "bucketName": request.bucket,
                "objectNames": [request.object_name],
            }],
        },
        "outputLocation": {
            "namespaceName": request.namespace,
            "bucketName": request.bucket,
            "prefix": request.output_prefix,
        },
    });
    if let Some(name) = &request.display_name {
        body["displayName"] = Value::String(name.clone());
    }
    if let Some(format) = &request.alternate_format {
        body["additionalTranscriptionFormats"] = Value::Array(vec![Value::String(format.clone())]);
    }
    body
}

#[async_trait]
impl JobService for SpeechApiClient {
    #[inline]
    async fn create_job(&self, request: &TranscriptionRequest) -> Result<TranscriptionJob> {
        let url = self
            .endpoint
            .join(&format!("/{API_VERSION}/transcriptionJobs"))
            .map_err(|e| BridgeError::Config(format!("Invalid speech endpoint: {e}")))?;

        let response = self
            .authorizer
            .authorize(self.http.post(url))
            .json(&job_request_body(request))
            .send()
            .await
            .map_err(|e| transport_error("Transcription job submission failed", &e))?;

        if !response.status().is_success() {
            return Err(provider_error(response).await);
        }

        let wire: WireJob = response.json().await.map_err(|e| {
            BridgeError::Protocol(format!("Undecodable transcription job response: {e}"))
        })?;
        wire.into_job()
    }

    #[inline]
    async fn get_job(&self, job_id: &str) -> Result<TranscriptionJob> {
        let mut url = self
            .endpoint
            .join(&format!("/{API_VERSION}/transcriptionJobs/"))
            .map_err(|e| BridgeError::Config(format!("Invalid speech endpoint: {e}")))?;
        url.path_segments_mut()
            .map_err(|()| BridgeError::Config("Speech endpoint cannot be a base".to_string()))?
            .pop_if_empty()
            .push(job_id);

        let response = self
            .authorizer
            .authorize(self.http.get(url))
            .send()
            .await
            .map_err(|e| transport_error("Transcription job poll failed", &e))?;

        if !response.status().is_success() {
            return Err(provider_error(response).await);
        }

        let wire: WireJob = response.json().await.map_err(|e| {
            BridgeError::Protocol(format!("Undecodable transcription job response: {e}"))
        })?;
        wire.into_job()
    }
}

/// Object-storage client implementing `ObjectStore` over the REST API.
#[derive(Clone)]
pub struct ObjectStorageClient {
    http: reqwest::Client,
    authorizer: Arc<dyn RequestAuthorizer>,
    endpoint: Url,
    namespace: String,
    bucket: String,
}

impl ObjectStorageClient {
    #[inline]
    pub fn new(
        http: reqwest::Client,
        authorizer: Arc<dyn RequestAuthorizer>,
        endpoint: Url,
        namespace: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Self {
        Self {
            http,
            authorizer,
            endpoint,
            namespace: namespace.into(),
            bucket: bucket.into(),
        }
    }

    fn bucket_url(&self) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| {
                BridgeError::Config("Object storage endpoint cannot be a base".to_string())
            })?
            .pop_if_empty()
            .extend(["n", &self.namespace, "b", &self.bucket, "o"]);
        Ok(url)
    }
}

#[derive(Deserialize)]
struct ListObjectsResponse {
    objects: Vec<ObjectSummary>,
}

#[derive(Deserialize)]
struct ObjectSummary {
    name: String,
}

#[async_trait]
impl ObjectStore for ObjectStorageClient {
    #[inline]
    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        let mut url = self.bucket_url()?;
        url.query_pairs_mut()
            .append_pair("prefix", prefix)
            .append_pair("fields", "name");

        let response = self
            .authorizer
            .authorize(self.http.get(url))
            .send()
            .await
            .map_err(|e| transport_error("Object listing failed", &e))?;

        if !response.status().is_success() {
            return Err(provider_error(response).await);
        }

        let listing: ListObjectsResponse = response.json().await.map_err(|e| {
            BridgeError::Protocol(format!("Undecodable object listing: {e}"))
        })?;
        Ok(listing.objects.into_iter().map(|o| o.name).collect())
    }

    #[inline]
    async fn get_object(&self, name: &str) -> Result<Vec<u8>> {
        let mut url = self.bucket_url()?;
        url.path_segments_mut()
            .map_err(|()| {
                BridgeError::Config("Object storage endpoint cannot be a base".to_string())
            })?
            .push(name);

        let response = self
            .authorizer
            .authorize(self.http.get(url))
            .send()
            .await
            .map_err(|e| transport_error("Object fetch failed", &e))?;

        if !response.status().is_success() {
            return Err(provider_error(response).await);
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error("Object body read failed", &e))?;
        Ok(bytes.to_vec())
    }
}
