//! DeskPilot - Main CLI Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use deskpilot::{
    cli::{Args, Commands, Input, InputHandler, Verbosity},
    config::{Config, GeneratorBackend},
    memory::{HistoryStore, InMemoryHistory, LocalEmbedder, LocalImageEmbedder, QdrantStore},
    models::build_generator,
    support::{ReplySource, ReturnCheck, SupportAgent},
    telemetry::TelemetryCollector,
};

fn init_tracing(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    args.apply_overrides(&mut config).map_err(anyhow::Error::msg)?;
    config.validate()?;
    Ok(config)
}

/// Embedding models download on first use; keep that off the runtime threads
async fn load_embedder(config: &Config) -> Result<LocalEmbedder> {
    let embedding = config.embedding.clone();
    let timeout = config.timeouts.embed();
    println!("{}", "  Loading embedding models...".dimmed());
    let embedder = tokio::task::spawn_blocking(move || LocalEmbedder::load(&embedding, timeout))
        .await
        .context("embedding loader panicked")??;
    Ok(embedder)
}

async fn run_chat(args: &Args, config: Config, tenant: Option<&str>, customer: &str) -> Result<()> {
    let embedder = Arc::new(load_embedder(&config).await?);
    let store = Arc::new(QdrantStore::new(&config.qdrant)?);
    let generator = build_generator(&config)?;
    let history: Arc<dyn HistoryStore> = Arc::new(InMemoryHistory::new(&config.history));
    let telemetry = TelemetryCollector::new();

    let agent = SupportAgent::new(
        &config,
        store,
        embedder,
        generator,
        Arc::clone(&history),
        telemetry.clone(),
    );

    let history_file = dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".deskpilot")
        .join("chat_history");
    let mut input = InputHandler::with_history("You: ", history_file)?;

    let session_id = agent.start_session().await;
    println!("{} {}", "Starting new chat session:".bold(), session_id);
    println!("Welcome to our customer support! How can I help you today? (type 'exit' to end)");

    loop {
        let query = match input.read()? {
            Input::Line(line) => line,
            Input::Empty => continue,
            Input::Interrupted => {
                println!("\nType 'exit' to quit");
                continue;
            }
            Input::Exit => {
                println!("Thank you for chatting with us. Goodbye!");
                break;
            }
        };

        let tenant_id = match tenant {
            Some(t) => t.to_string(),
            None => match agent.resolve_tenant(&query).await {
                Ok(t) => t,
                Err(err) => {
                    tracing::error!(error = %err, "tenant resolution failed");
                    println!("{} {}", "Agent:".red().bold(), deskpilot::support::GENERIC_FAILURE_MESSAGE);
                    continue;
                }
            },
        };

        let reply = agent.handle_turn(&session_id, &tenant_id, customer, &query).await;
        let label = match reply.source {
            ReplySource::Cache => "Agent (cached):".cyan().bold(),
            ReplySource::Pipeline => "Agent:".green().bold(),
            ReplySource::Failure => "Agent:".red().bold(),
        };
        println!("{} {}", label, reply.message);
    }

    input.save_history()?;
    history.evict(&session_id).await;

    if args.verbosity().show_summary() {
        telemetry.display_summary();
    }
    Ok(())
}

async fn run_check_return(
    config: Config,
    tenant: &str,
    customer: &str,
    query: &str,
    check: ReturnCheck,
) -> Result<()> {
    let embedder = Arc::new(load_embedder(&config).await?);
    let images = {
        let embedding = config.embedding.clone();
        let timeout = config.timeouts.embed();
        println!("{}", "  Loading image model...".dimmed());
        tokio::task::spawn_blocking(move || LocalImageEmbedder::load(&embedding, timeout))
            .await
            .context("image model loader panicked")??
    };
    let store = Arc::new(QdrantStore::new(&config.qdrant)?);
    let generator = build_generator(&config)?;
    let history: Arc<dyn HistoryStore> = Arc::new(InMemoryHistory::new(&config.history));

    let agent = SupportAgent::new(&config, store, embedder, generator, history, TelemetryCollector::new())
        .with_image_embedder(Arc::new(images));

    let verdict = agent.check_return(tenant, customer, query, check).await?;
    let yes_no = |flag: bool| if flag { "yes".green() } else { "no".red() };

    println!("{}", "Return check".bold());
    println!("  Order:         {}", verdict.order_id.as_deref().unwrap_or("-"));
    println!("  Same product:  {}", yes_no(verdict.is_same_product));
    if let Some(defect) = verdict.defect_detected {
        println!("  Defect:        {}", if defect { "yes".red() } else { "no".green() });
    }
    println!("  Returnable:    {}", yes_no(verdict.is_returnable));
    if !verdict.reason.is_empty() {
        println!("  Reason:        {}", verdict.reason);
    }
    Ok(())
}

async fn run_setup(config: &Config) -> Result<()> {
    let embedder = load_embedder(config).await?;
    let store = QdrantStore::new(&config.qdrant)?;

    let dim = deskpilot::memory::Embedder::dimension(&embedder);
    store
        .ensure_collections(&config.collections, dim, config.embedding.image_dim)
        .await?;

    println!("{} {}", "✓".green(), format!("Collections ready on {}", store.url()).bold());
    for name in [
        &config.collections.user_data,
        &config.collections.knowledge_base,
        &config.collections.orders,
        &config.collections.semantic_cache,
    ] {
        println!("  - {}", name);
    }
    Ok(())
}

fn show_config(config: &Config) -> Result<()> {
    println!("{}", "DeskPilot Configuration".bold());
    println!();
    println!("Qdrant:");
    println!("  URL:       {}", config.qdrant.url);
    println!();
    println!("Generation:");
    println!("  Backend:   {:?}", config.generation.backend);
    println!("  Model:     {}", config.generation.model);
    if config.generation.backend == GeneratorBackend::Ollama {
        println!("  Base URL:  {}", config.generation.base_url);
    } else {
        let key_state = if config.generation_api_key().is_some() { "set" } else { "missing" };
        println!("  API key:   ${} ({})", config.generation.api_key_env, key_state);
    }
    println!();
    println!("Embedding:");
    println!("  Dense:      {}", config.embedding.dense_model);
    println!("  Sparse:     {}", config.embedding.sparse_tokenizer);
    println!("  Image:      {} ({} dims)", config.embedding.image_model, config.embedding.image_dim);
    println!();
    println!("Retrieval:");
    println!("  k_prefetch: {}", config.retrieval.k_prefetch);
    println!("  top_k:      {}", config.retrieval.top_k);
    println!("  rrf_k:      {}", config.retrieval.rrf_k);
    println!();
    println!("Cache:");
    println!("  Enabled:    {}", if config.cache.enabled { "yes" } else { "no" });
    println!("  Threshold:  {}", config.cache.threshold);
    println!();
    println!("Full file:");
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbosity());

    let config = load_config(&args)?;

    match &args.command {
        Commands::Chat { tenant, customer } => {
            run_chat(&args, config.clone(), tenant.as_deref(), customer).await?;
        }
        Commands::CheckReturn { tenant, customer, quality, query } => {
            let check = if *quality { ReturnCheck::QualityCheck } else { ReturnCheck::Validation };
            run_check_return(config.clone(), tenant, customer, query, check).await?;
        }
        Commands::Setup => {
            run_setup(&config).await?;
        }
        Commands::Config => {
            show_config(&config)?;
        }
    }

    Ok(())
}
