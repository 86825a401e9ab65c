use clap::{Parser, Subcommand};
use oci_bridge::Result;
use oci_bridge::commands::{add, chat, embed, init_config, normalize_key, search, show_config, transcribe};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "oci-bridge")]
#[command(about = "OCI integration adapters: chat, embeddings, vector search and transcription")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or initialize the configuration file
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Normalize a PEM private key file and print it
    NormalizeKey {
        /// Path to the key file
        key_file: PathBuf,
    },
    /// Send a single message to the configured chat model
    Chat {
        /// The user message
        prompt: String,
        /// Override the configured chat model
        #[arg(long)]
        model: Option<String>,
    },
    /// Embed a text and print the resulting vector's shape
    Embed {
        /// Text to embed
        text: String,
    },
    /// Embed and store documents in the vector table
    Add {
        /// Texts to store, one document each
        #[arg(required = true)]
        texts: Vec<String>,
        /// Clear the table before inserting
        #[arg(long)]
        clear: bool,
    },
    /// Nearest-neighbor search over the vector table
    Search {
        /// Query text
        query: String,
        /// Number of results to return
        #[arg(long, default_value_t = 4)]
        k: usize,
    },
    /// Transcribe an audio object from the configured bucket
    Transcribe {
        /// Object name within the bucket
        object: String,
        /// Transcription model type, e.g. WHISPER_MEDIUM
        #[arg(long, default_value = "WHISPER_MEDIUM")]
        model: String,
        /// Expected language code, e.g. "en"
        #[arg(long)]
        language: Option<String>,
        /// Enable diarization with this many speakers
        #[arg(long)]
        speakers: Option<u32>,
        /// Submit the job and print its id without waiting
        #[arg(long)]
        job_id_only: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                init_config()?;
            }
        }
        Commands::NormalizeKey { key_file } => {
            normalize_key(&key_file)?;
        }
        Commands::Chat { prompt, model } => {
            chat(prompt, model).await?;
        }
        Commands::Embed { text } => {
            embed(text).await?;
        }
        Commands::Add { texts, clear } => {
            add(texts, clear).await?;
        }
        Commands::Search { query, k } => {
            search(query, k).await?;
        }
        Commands::Transcribe {
            object,
            model,
            language,
            speakers,
            job_id_only,
        } => {
            transcribe(object, model, language, speakers, job_id_only).await?;
        }
    }

    Ok(())
}
