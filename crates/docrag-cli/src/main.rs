use anyhow::Context;
use clap::{Parser, Subcommand};
use docrag_core::RagError;
use docrag_orchestrator::{Answer, EngineConfig, QueryRequest, QueryResponse, RagEngine, API_KEY_ENV};
use std::io::Write;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "docrag", about = "docrag: answer questions from your own documents")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "docrag.toml")]
    config: PathBuf,

    /// Human-readable logs instead of JSON
    #[arg(long)]
    plain_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest one or more .txt / .md files
    Ingest {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Ask a question about the ingested documents
    Query {
        question: String,
        /// Only search fragments of this source
        #[arg(short, long)]
        source: Option<String>,
        /// Number of fragments to use as context (overrides config)
        #[arg(short = 'k', long)]
        max_results: Option<usize>,
        /// Print the answer as it is generated
        #[arg(long)]
        stream: bool,
    },
    /// Remove every fragment of a source
    Delete { source: String },
    /// List ingested sources
    List,
    /// Show index size, models and backend health
    Stats,
    /// Remove all documents
    Clear,
}

fn init_tracing(plain: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if plain {
        builder.init();
    } else {
        builder.json().init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.plain_logs);

    if let Err(err) = run(cli).await {
        if err
            .downcast_ref::<RagError>()
            .is_some_and(RagError::is_connection)
        {
            eprintln!("The generation backend is not reachable.");
            eprintln!("Start it (e.g. `ollama serve`) or check [generation] in your config.");
        }
        return Err(err);
    }
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    let config = EngineConfig::load(&cli.config)?
        .with_fallback_api_key(std::env::var(API_KEY_ENV).ok());
    let engine = RagEngine::from_config(&config)
        .await
        .with_context(|| format!("Failed to start engine from '{}'", cli.config.display()))?;

    match cli.command {
        Commands::Ingest { files } => {
            let mut failed = 0usize;
            for path in &files {
                match engine.ingest_file(path).await {
                    Ok(report) => println!(
                        "{}: {} chunks created, {} stored",
                        report.source, report.chunks_created, report.chunks_stored
                    ),
                    Err(e) => {
                        failed += 1;
                        eprintln!("{}: {e}", path.display());
                    }
                }
            }
            if failed > 0 {
                anyhow::bail!("{failed} of {} file(s) failed to ingest", files.len());
            }
        }
        Commands::Query {
            question,
            source,
            max_results,
            stream,
        } => {
            let mut request = QueryRequest::new(question);
            request.source_filter = source;
            request.max_results = max_results;
            request.stream = stream;

            let response = engine.query(request).await?;
            print_response(response).await?;
        }
        Commands::Delete { source } => {
            let removed = engine.delete_document(&source).await?;
            println!("Removed {removed} fragment(s) of {source}");
        }
        Commands::List => {
            let sources = engine.list_sources().await?;
            if sources.is_empty() {
                println!("No documents ingested.");
            } else {
                for source in &sources {
                    println!("{source}");
                }
                println!("\nTotal: {} source(s)", sources.len());
            }
        }
        Commands::Stats => {
            let stats = engine.stats().await?;
            println!("Fragments:         {}", stats.total_fragments);
            println!("Embedding model:   {} ({} dims)", stats.embedding_model, stats.embedding_dimension);
            println!("Generation model:  {}", stats.generation_model);
            println!(
                "Generation health: {}",
                if stats.generation_healthy { "ok" } else { "unreachable" }
            );
        }
        Commands::Clear => {
            engine.clear_all().await?;
            info!(index = %config.index_path().display(), "Index cleared");
            println!("All documents removed.");
        }
    }

    Ok(())
}

async fn print_response(response: QueryResponse) -> anyhow::Result<()> {
    match response.answer {
        Answer::Complete(text) => println!("{text}"),
        Answer::Streaming(mut stream) => {
            let mut stdout = std::io::stdout();
            while let Some(piece) = stream.next_text().await {
                write!(stdout, "{}", piece?)?;
                stdout.flush()?;
            }
            writeln!(stdout)?;
        }
    }

    if !response.sources.is_empty() {
        println!("\nSources:");
        for (i, hit) in response.sources.iter().enumerate() {
            println!(
                "  [{}] {} (chunk {}/{}, distance {:.4})",
                i + 1,
                hit.fragment.source,
                hit.fragment.chunk_index + 1,
                hit.fragment.chunk_count,
                hit.distance
            );
        }
    }
    Ok(())
}
