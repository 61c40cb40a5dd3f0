mod repl;
mod server;
#[cfg(test)]
mod test_support;

use chrono::Utc;
use clap::{Parser, Subcommand};
use infra_assist_core::{load_dotenv, open_index, Assistant, OllamaEmbedder, Settings};
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Answers IT-infrastructure questions from a local PDF and web corpus.
/// Everything else is configured through the environment (or `.env`).
#[derive(Parser)]
#[command(name = "infra-assist", version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve `POST /ask` and the static UI.
    Serve {
        /// Address to listen on.
        #[arg(long, env = "BIND_ADDR")]
        bind: Option<String>,
    },
    /// Interactive question prompt (the default).
    Ask,
    /// Build the index if it does not exist yet and report its size.
    Build,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        started_at = %Utc::now().to_rfc3339(),
        index = %settings.index_path.display(),
        "infra-assist boot"
    );

    match cli.command.unwrap_or(Command::Ask) {
        Command::Serve { bind } => {
            let assistant = Arc::new(Assistant::from_settings(&settings).await?);
            let app = server::router(assistant, Some(&settings.static_dir));
            server::serve(app, bind.as_deref().unwrap_or(&settings.bind_addr)).await?;
        }
        Command::Ask => {
            let assistant = Assistant::from_settings(&settings).await?;
            repl::run(
                &assistant,
                BufReader::new(tokio::io::stdin()),
                tokio::io::stdout(),
            )
            .await?;
        }
        Command::Build => {
            let embedder = OllamaEmbedder::new(
                settings.ollama_url.as_str(),
                settings.embedding_model.as_str(),
            );
            let index = open_index(&settings, &embedder).await?;
            let manifest = index.manifest();
            println!(
                "{} chunks in collection {} at {} (embedding model {}, built {})",
                index.len(),
                manifest.collection,
                settings.index_path.display(),
                manifest.embedding_model,
                manifest.built_at.to_rfc3339()
            );
        }
    }

    Ok(())
}
