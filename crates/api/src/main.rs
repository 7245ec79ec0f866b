mod config;
mod pipeline;
mod server;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use config::{AppConfig, LoggingConfig};
use index::Neo4jGraphStore;
use server::AppState;

#[derive(Parser)]
#[command(name = "kgrag", about = "Knowledge-graph question answering over a text file")]
struct Cli {
    /// TOML configuration file; defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Build the graph and vector index from the input file
    Ingest,
    /// Serve the question form over the existing graph
    Serve,
    /// Ingest, then serve (default)
    Run,
    /// Answer one question and exit
    Ask { question: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref())?;
    config.apply_env_overrides(|key| std::env::var(key).ok());
    config.validate()?;

    init_tracing(&config.logging)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Ingest => {
            let graph = ingest(&config).await?;
            pipeline::build_vector_index(&config, &graph).await?;
        }
        Command::Serve => {
            let graph = index::connect(&config.neo4j).await?;
            let vector_index = pipeline::build_vector_index(&config, &graph).await?;
            serve(&config, graph, vector_index).await?;
        }
        Command::Run => {
            let graph = ingest(&config).await?;
            let vector_index = pipeline::build_vector_index(&config, &graph).await?;
            serve(&config, graph, vector_index).await?;
        }
        Command::Ask { question } => {
            let graph = index::connect(&config.neo4j).await?;
            let vector_index = pipeline::build_vector_index(&config, &graph).await?;
            let qa = pipeline::build_qa(&config, vector_index)?;
            println!("{}", qa.answer_query(Some(question.as_str())).await);
        }
    }

    Ok(())
}

/// Neo4j is only contacted once the input file has loaded.
async fn ingest(config: &AppConfig) -> Result<neo4rs::Graph> {
    let llm = pipeline::extraction_model(&config.llm)?;
    let (report, store) = pipeline::ingest_graph(config, llm, move || async move {
        anyhow::Ok(Neo4jGraphStore::new(index::connect(&config.neo4j).await?))
    })
    .await?;

    println!(
        "Ingested {} chunks: {} nodes, {} relationships",
        report.chunks, report.nodes, report.relationships
    );
    Ok(store.graph().clone())
}

async fn serve(config: &AppConfig, graph: neo4rs::Graph, vector_index: index::Neo4jVectorIndex) -> Result<()> {
    let qa = pipeline::build_qa(config, vector_index)?;
    let app = server::router(AppState {
        qa: Arc::new(qa),
        graph: Some(graph),
    });

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;

    tracing::info!("Server listening on http://{}", config.server.bind);

    axum::serve(listener, app).await.context("Server error")
}

fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .context("Invalid log filter")?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}
