use super::*;
use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const JOB_ID: &str = "ocid1.transcriptionjob.oc1.phx.amaaexample123";
const MARKER: &str = "job-amaaexample123";

/// Job service stub that stays in progress for a configured number of polls,
/// then reports a terminal state.
#[derive(Clone)]
struct StubJobs {
    get_calls: Arc<AtomicUsize>,
    /// `None` never reaches a terminal state.
    terminal_after: Option<usize>,
    terminal_state: JobState,
    model_type: Option<String>,
    language_code: Option<String>,
}

impl StubJobs {
    fn succeeding_after(polls: usize) -> Self {
        Self {
            get_calls: Arc::new(AtomicUsize::new(0)),
            terminal_after: Some(polls),
            terminal_state: JobState::Succeeded,
            model_type: Some("WHISPER_MEDIUM".to_string()),
            language_code: Some("en".to_string()),
        }
    }

    fn job(&self, state: JobState) -> TranscriptionJob {
        TranscriptionJob {
            id: JOB_ID.to_string(),
            state,
            lifecycle_details: (state == JobState::Failed)
                .then(|| "audio could not be decoded".to_string()),
            model_type: self.model_type.clone(),
            language_code: self.language_code.clone(),
        }
    }
}

#[async_trait]
impl JobService for StubJobs {
    async fn create_job(&self, _request: &TranscriptionRequest) -> Result<TranscriptionJob> {
        Ok(self.job(JobState::Accepted))
    }

    async fn get_job(&self, _job_id: &str) -> Result<TranscriptionJob> {
        let call = self.get_calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.terminal_after {
            Some(after) if call >= after => Ok(self.job(self.terminal_state)),
            _ => Ok(self.job(JobState::InProgress)),
        }
    }
}

#[derive(Clone, Default)]
struct StubStore {
    objects: Vec<(String, Vec<u8>)>,
    /// Return every object from any listing, mimicking a service that matches
    /// prefixes more loosely than a plain `starts_with`.
    list_everything: bool,
}

impl StubStore {
    fn with_artifact(name: &str, artifact: serde_json::Value) -> Self {
        Self {
            objects: vec![(name.to_string(), artifact.to_string().into_bytes())],
            list_everything: false,
        }
    }
}

#[async_trait]
impl ObjectStore for StubStore {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .objects
            .iter()
            .filter(|(name, _)| self.list_everything || name.starts_with(prefix))
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn get_object(&self, name: &str) -> Result<Vec<u8>> {
        self.objects
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, body)| body.clone())
            .ok_or_else(|| BridgeError::MissingArtifact(vec![name.to_string()]))
    }
}

fn request() -> TranscriptionRequest {
    let mut request = TranscriptionRequest::new(
        "ocid1.compartment.oc1..test",
        "ns",
        "recordings",
        "audio/meeting.wav",
        "WHISPER_MEDIUM",
        "transcriptions",
    );
    request.language_code = Some("en".to_string());
    request
}

fn good_artifact() -> serde_json::Value {
    json!({
        "modelDetails": {"modelType": "WHISPER_MEDIUM", "languageCode": "en"},
        "transcriptions": [{"transcription": "hello world"}]
    })
}

fn artifact_name() -> String {
    format!("transcriptions/{MARKER}/ns_recordings_audio_meeting.wav.json")
}

#[tokio::test(start_paused = true)]
async fn returns_artifact_after_n_polls() {
    let jobs = StubJobs::succeeding_after(3);
    let store = StubStore::with_artifact(&artifact_name(), good_artifact());
    let orchestrator = TranscriptionOrchestrator::new(jobs.clone(), store)
        .with_poll_interval(Duration::from_secs(5));

    let outcome = orchestrator
        .create_and_await(&request())
        .await
        .expect("orchestration failed");

    assert_eq!(jobs.get_calls.load(Ordering::SeqCst), 3);
    let TranscriptionOutcome::Transcript { job, artifact } = outcome else {
        panic!("expected transcript outcome");
    };
    assert_eq!(job.state, JobState::Succeeded);
    assert_eq!(artifact.transcriptions[0].transcription, "hello world");
}

#[tokio::test(start_paused = true)]
async fn never_terminal_job_times_out() {
    let jobs = StubJobs {
        terminal_after: None,
        ..StubJobs::succeeding_after(0)
    };
    let orchestrator = TranscriptionOrchestrator::new(jobs, StubStore::default())
        .with_poll_interval(Duration::from_secs(5))
        .with_timeout(Duration::from_secs(60));

    let err = orchestrator
        .create_and_await(&request())
        .await
        .expect_err("should time out");

    assert!(matches!(
        err,
        BridgeError::Timeout { ref job_id, limit_secs: 60 } if job_id == JOB_ID
    ));
}

#[tokio::test(start_paused = true)]
async fn job_id_only_mode_skips_polling() {
    let jobs = StubJobs::succeeding_after(1);
    let orchestrator = TranscriptionOrchestrator::new(jobs.clone(), StubStore::default());

    let mut req = request();
    req.return_job_id_only = true;
    let outcome = orchestrator
        .create_and_await(&req)
        .await
        .expect("submission failed");

    assert_eq!(outcome, TranscriptionOutcome::JobId(JOB_ID.to_string()));
    assert_eq!(jobs.get_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn failed_job_surfaces_lifecycle_details() {
    let jobs = StubJobs {
        terminal_state: JobState::Failed,
        ..StubJobs::succeeding_after(1)
    };
    let orchestrator = TranscriptionOrchestrator::new(jobs, StubStore::default());

    let err = orchestrator
        .create_and_await(&request())
        .await
        .expect_err("should fail");

    let BridgeError::JobFailed { state, message, .. } = err else {
        panic!("expected job failure, got {err:?}");
    };
    assert_eq!(state, "FAILED");
    assert_eq!(message, "audio could not be decoded");
}

#[tokio::test(start_paused = true)]
async fn strict_mode_rejects_model_mismatch_despite_success() {
    let jobs = StubJobs {
        model_type: Some("ORACLE".to_string()),
        ..StubJobs::succeeding_after(1)
    };
    let store = StubStore::with_artifact(&artifact_name(), good_artifact());
    let orchestrator = TranscriptionOrchestrator::new(jobs, store);

    let err = orchestrator
        .create_and_await(&request())
        .await
        .expect_err("should fail");

    let BridgeError::OptionMismatch {
        field,
        requested,
        reported,
    } = err
    else {
        panic!("expected option mismatch, got {err:?}");
    };
    assert_eq!(field, "modelType");
    assert_eq!(requested, "WHISPER_MEDIUM");
    assert_eq!(reported, "ORACLE");
}

#[tokio::test(start_paused = true)]
async fn strict_mode_checks_artifact_language() {
    let jobs = StubJobs::succeeding_after(1);
    let artifact = json!({
        "modelDetails": {"modelType": "WHISPER_MEDIUM", "languageCode": "de"},
        "transcriptions": []
    });
    let orchestrator = TranscriptionOrchestrator::new(
        jobs,
        StubStore::with_artifact(&artifact_name(), artifact),
    );

    let err = orchestrator
        .create_and_await(&request())
        .await
        .expect_err("should fail");
    assert!(matches!(err, BridgeError::OptionMismatch { ref field, .. } if field == "languageCode"));
}

#[tokio::test(start_paused = true)]
async fn non_strict_mode_ignores_mismatches() {
    let jobs = StubJobs {
        model_type: Some("ORACLE".to_string()),
        ..StubJobs::succeeding_after(1)
    };
    let store = StubStore::with_artifact(&artifact_name(), good_artifact());
    let orchestrator = TranscriptionOrchestrator::new(jobs, store);

    let mut req = request();
    req.strict_options = false;
    orchestrator
        .create_and_await(&req)
        .await
        .expect("should succeed without strict checks");
}

#[tokio::test(start_paused = true)]
async fn falls_back_to_any_json_without_marker_match() {
    let jobs = StubJobs::succeeding_after(1);
    let mut store = StubStore::with_artifact("transcriptions/output.json", good_artifact());
    store
        .objects
        .push(("transcriptions/notes.txt".to_string(), Vec::new()));
    store.list_everything = true;
    let orchestrator = TranscriptionOrchestrator::new(jobs, store);

    let outcome = orchestrator
        .create_and_await(&request())
        .await
        .expect("fallback should pick the lone JSON object");
    assert!(matches!(outcome, TranscriptionOutcome::Transcript { .. }));
}

#[tokio::test(start_paused = true)]
async fn missing_artifact_is_explicit() {
    let jobs = StubJobs::succeeding_after(1);
    let orchestrator = TranscriptionOrchestrator::new(jobs, StubStore::default());

    let err = orchestrator
        .create_and_await(&request())
        .await
        .expect_err("should fail");
    let BridgeError::MissingArtifact(prefixes) = err else {
        panic!("expected missing artifact, got {err:?}");
    };
    assert!(prefixes.contains(&format!("transcriptions/{MARKER}")));
}

#[tokio::test(start_paused = true)]
async fn undecodable_artifact_is_fatal() {
    let jobs = StubJobs::succeeding_after(1);
    let store = StubStore {
        objects: vec![(artifact_name(), b"not json at all".to_vec())],
        list_everything: false,
    };
    let orchestrator = TranscriptionOrchestrator::new(jobs, store);

    let err = orchestrator
        .create_and_await(&request())
        .await
        .expect_err("should fail");
    assert!(matches!(err, BridgeError::Protocol(_)));
}

#[test]
fn job_states_parse_and_classify() {
    assert!(!"ACCEPTED".parse::<JobState>().expect("parse").is_terminal());
    assert!(!"IN_PROGRESS".parse::<JobState>().expect("parse").is_terminal());
    assert!("SUCCEEDED".parse::<JobState>().expect("parse").is_terminal());
    assert!("FAILED".parse::<JobState>().expect("parse").is_terminal());
    assert!("CANCELED".parse::<JobState>().expect("parse").is_terminal());
    assert!("PENDING".parse::<JobState>().is_err());
}

#[test]
fn folder_marker_uses_trailing_id_segment() {
    assert_eq!(job_folder_marker(JOB_ID), MARKER);
    assert_eq!(job_folder_marker("plain-id"), "job-plain-id");
}

#[test]
fn candidate_prefixes_are_deduplicated() {
    let prefixes = candidate_prefixes("transcriptions/", MARKER);
    assert_eq!(
        prefixes,
        vec![format!("transcriptions/{MARKER}"), MARKER.to_string()]
    );

    let bare = candidate_prefixes("", MARKER);
    assert_eq!(bare, vec![MARKER.to_string()]);
}
