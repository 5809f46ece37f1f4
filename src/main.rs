use std::env;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use absensi::{api, config, directory::FileDirectory, storage, storage::FaceStore, Embedding};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

#[derive(Parser)]
#[command(name = "absensi")]
#[command(version, about = "Attendance by face - match embeddings against enrolled users")]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Match a recognition request ({"face_embedding": [...], "threshold"?: n})
    Recognize {
        /// Request file (reads stdin when omitted)
        #[arg(short, long)]
        request: Option<PathBuf>,
    },
    /// Store a face embedding for a user
    Enroll {
        /// User ID to enroll
        #[arg(short, long)]
        user: String,
        /// JSON file holding the embedding as an array of numbers
        #[arg(short, long)]
        embedding: PathBuf,
    },
    /// Remove all enrolled faces for a user
    Purge {
        /// User ID to purge
        #[arg(short, long)]
        user: String,
    },
    /// Open config file in editor
    Config,
}

fn main() -> Result<ExitCode> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let config_path = config::resolve_config_path(cli.config.as_deref());
    let cfg = config::load_config(Some(config_path.as_path()))?;
    let store = storage::PostcardStore::new(&cfg.store_prefix);

    match cli.command {
        Commands::Recognize { request } => recognize(&cfg, store, request.as_deref()),
        Commands::Enroll { user, embedding } => {
            enroll(&store, &user, &embedding)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Purge { user } => {
            purge(&store, &user)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Config => {
            open_config(&config_path)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn recognize(
    cfg: &config::Config,
    store: storage::PostcardStore,
    request: Option<&Path>,
) -> Result<ExitCode> {
    let body = match request {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("reading request {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("reading request from stdin")?;
            buf
        }
    };

    let directory = FileDirectory::new(&cfg.directory, store);
    let response = api::recognize(&body, &directory, cfg.threshold);
    println!("{}", serde_json::to_string_pretty(&response.body)?);

    Ok(match response.status {
        api::Status::Ok => ExitCode::SUCCESS,
        api::Status::ClientError => ExitCode::from(2),
        api::Status::ServerError => ExitCode::FAILURE,
    })
}

fn enroll(store: &dyn FaceStore, user_id: &str, embedding_path: &Path) -> Result<()> {
    info!("reading embedding for {} from {}", user_id, embedding_path.display());

    let raw = std::fs::read_to_string(embedding_path)
        .with_context(|| format!("reading embedding {}", embedding_path.display()))?;
    let embedding: Embedding = serde_json::from_str(&raw)
        .with_context(|| format!("parsing embedding {}", embedding_path.display()))?;

    let id = storage::enroll(store, user_id, &embedding)
        .with_context(|| format!("enrolling face for {user_id}"))?;
    println!("{id}");
    Ok(())
}

fn purge(store: &dyn FaceStore, user_id: &str) -> Result<()> {
    info!("removing stored faces for {}", user_id);

    store
        .purge(user_id)
        .with_context(|| format!("purging faces for {user_id}"))?;

    info!("{} has no stored faces left; directory rows are unchanged", user_id);
    Ok(())
}

fn open_config(config_path: &Path) -> Result<()> {
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("editing {}", config_path.display());

    let status = std::process::Command::new(&editor)
        .arg(config_path)
        .status()
        .with_context(|| format!("launching {editor}"))?;

    if !status.success() {
        anyhow::bail!("{editor} exited with {status}");
    }

    Ok(())
}
