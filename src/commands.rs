use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{BearerAuthorizer, RequestAuthorizer, normalize_private_key};
use crate::config::Config;
use crate::genai::ServingMode;
use crate::genai::chat::{ChatClient, GenerationParams};
use crate::genai::embeddings::EmbeddingsClient;
use crate::genai::message::ChatMessage;
use crate::speech::{
    Diarization, ObjectStorageClient, SpeechApiClient, TranscriptionOrchestrator,
    TranscriptionOutcome, TranscriptionRequest,
};
use crate::vector::{AddDocumentsOptions, DbHandle, Document, VectorStore};

const TOKEN_ENV: &str = "OCI_BRIDGE_TOKEN";

fn authorizer() -> Result<Arc<dyn RequestAuthorizer>> {
    let token = std::env::var(TOKEN_ENV)
        .with_context(|| format!("{TOKEN_ENV} must be set to an API session token"))?;
    Ok(Arc::new(BearerAuthorizer::new(token)))
}

/// Print the active configuration, falling back to defaults when no file exists
#[inline]
pub fn show_config() -> Result<()> {
    let config = Config::load()?;
    let path = Config::config_file_path()?;

    if path.exists() {
        println!("Configuration ({}):", path.display());
    } else {
        println!("No config file at {}; showing defaults:", path.display());
    }
    println!();
    print!(
        "{}",
        toml::to_string_pretty(&config).context("Failed to render configuration")?
    );
    Ok(())
}

/// Write a default configuration file for editing
#[inline]
pub fn init_config() -> Result<()> {
    let path = Config::config_file_path()?;
    if path.exists() {
        println!("Config file already exists: {}", path.display());
        return Ok(());
    }

    Config::default().save()?;
    println!("Wrote default config to {}", path.display());
    println!("Edit it to set compartment, models, database and bucket.");
    Ok(())
}

/// Normalize a PEM private key file and print the result to stdout
#[inline]
pub fn normalize_key(key_file: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(key_file)
        .with_context(|| format!("Failed to read key file: {}", key_file.display()))?;

    let normalized = normalize_private_key(&raw);
    if normalized.wrapped_fallback {
        warn!(
            "{} carried no PEM envelope; wrapped the material as a generic private key",
            key_file.display()
        );
    }
    print!("{}", normalized.pem);
    Ok(())
}

/// Send a single user message to the configured chat model
#[inline]
pub async fn chat(prompt: String, model: Option<String>) -> Result<()> {
    let config = Config::load()?;
    let endpoint = config.genai.inference_endpoint()?;
    let model = model.unwrap_or(config.genai.chat_model);
    info!("Sending chat request to {}", model);

    let client = ChatClient::new(
        reqwest::Client::new(),
        authorizer()?,
        endpoint,
        ServingMode::OnDemand { model_id: model },
        config.genai.compartment_id,
        GenerationParams::default(),
    );

    let response = client
        .generate(&[ChatMessage::Human { content: prompt }])
        .await?;

    match response.message {
        ChatMessage::Assistant {
            content,
            tool_calls,
        } => {
            println!("{content}");
            for call in tool_calls {
                println!("[tool call] {}({})", call.name, call.arguments);
            }
        }
        other => println!("{other:?}"),
    }
    Ok(())
}

/// Embed a single text and print the vector width plus a preview
#[inline]
pub async fn embed(text: String) -> Result<()> {
    use crate::genai::Embedder;

    let config = Config::load()?;
    let client = EmbeddingsClient::new(
        reqwest::Client::new(),
        authorizer()?,
        config.genai.inference_endpoint()?,
        ServingMode::OnDemand {
            model_id: config.genai.embed_model,
        },
        config.genai.compartment_id,
    );

    let vector = client.embed_query(&text).await?;
    let preview: Vec<String> = vector.iter().take(8).map(|v| format!("{v:.4}")).collect();
    println!("Width: {}", vector.len());
    println!("Vector: [{}, ...]", preview.join(", "));
    Ok(())
}

async fn open_store(config: &Config) -> Result<VectorStore> {
    let pool = sqlx::PgPool::connect(&config.vector.database_url)
        .await
        .context("Failed to connect to the vector database")?;

    let embedder = Arc::new(EmbeddingsClient::new(
        reqwest::Client::new(),
        authorizer()?,
        config.genai.inference_endpoint()?,
        ServingMode::OnDemand {
            model_id: config.genai.embed_model.clone(),
        },
        config.genai.compartment_id.clone(),
    ));

    let store = VectorStore::initialize(
        DbHandle::from_pool(pool),
        config.vector.table.clone(),
        config.vector.distance_strategy.parse()?,
        embedder,
        None,
    )
    .await?;
    Ok(store)
}

/// Embed and store documents in the configured vector table
#[inline]
pub async fn add(texts: Vec<String>, clear: bool) -> Result<()> {
    let config = Config::load()?;
    let store = open_store(&config).await?;

    let documents: Vec<Document> = texts
        .into_iter()
        .map(|text| Document::new(text, serde_json::Map::new()))
        .collect();

    let outcome = store
        .add_documents(&documents, AddDocumentsOptions { clear_table: clear })
        .await?;

    println!(
        "Stored {} of {} documents in {}",
        outcome.ids.len(),
        outcome.total_rows(),
        store.table()
    );
    for failure in &outcome.failures {
        println!("  Failed row {}: {}", failure.index, failure.message);
    }
    Ok(())
}

/// Run a nearest-neighbor search over the configured vector table
#[inline]
pub async fn search(query: String, k: usize) -> Result<()> {
    let config = Config::load()?;
    let store = open_store(&config).await?;

    let results = store.similarity_search(&query, k).await?;
    if results.is_empty() {
        println!("No matches in {}.", store.table());
        return Ok(());
    }

    for (rank, document) in results.iter().enumerate() {
        println!("{}. {}", rank + 1, document.page_content);
        if !document.metadata.is_empty() {
            println!(
                "   metadata: {}",
                serde_json::Value::Object(document.metadata.clone())
            );
        }
    }
    Ok(())
}

/// Submit a transcription job for an object and wait for the transcript
#[inline]
pub async fn transcribe(
    object_name: String,
    model_type: String,
    language: Option<String>,
    speakers: Option<u32>,
    job_id_only: bool,
) -> Result<()> {
    let config = Config::load()?;
    let speech = &config.speech;
    let http = reqwest::Client::new();
    let authorizer = authorizer()?;

    let jobs = SpeechApiClient::new(
        http.clone(),
        Arc::clone(&authorizer),
        speech.speech_endpoint()?,
    );
    let objects = ObjectStorageClient::new(
        http,
        authorizer,
        speech.object_storage_endpoint()?,
        speech.namespace.clone(),
        speech.bucket.clone(),
    );
    let orchestrator = TranscriptionOrchestrator::new(jobs, objects)
        .with_poll_interval(speech.poll_interval())
        .with_timeout(speech.timeout());

    let mut request = TranscriptionRequest::new(
        speech.compartment_id.clone(),
        speech.namespace.clone(),
        speech.bucket.clone(),
        object_name,
        model_type,
        speech.output_prefix.clone(),
    );
    request.language_code = language;
    request.return_job_id_only = job_id_only;
    if let Some(count) = speakers {
        request.diarization = Some(Diarization {
            enabled: true,
            speaker_count: Some(count),
        });
    }

    match orchestrator.create_and_await(&request).await? {
        TranscriptionOutcome::JobId(id) => {
            println!("Submitted job {id}");
        }
        TranscriptionOutcome::Transcript { job, artifact } => {
            println!("Job {} finished as {}", job.id, job.state);
            for segment in &artifact.transcriptions {
                println!("{}", segment.transcription);
            }
        }
    }
    Ok(())
}
