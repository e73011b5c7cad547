//! docrag CLI
//!
//! Commands:
//!   build - index a directory of text files into a JSON vector index
//!   query - print the context block retrieved for a question

use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use docrag_core::config::{find_project_root, resolve_project_path, Config, PROJECT_MARKERS};
use docrag_core::types::{BuildParams, ModelConfig, RerankMode};
use docrag_embed::{default_embedder, RetryPolicy, DEFAULT_EMBED_MODEL, DEFAULT_OLLAMA_URL};
use docrag_index::{write_index, BuildRequest, IndexBuilder};
use docrag_search::{RagService, SearchPipeline};

#[derive(Parser, Debug)]
#[command(name = "docrag")]
#[command(about = "Build and query an embedding index over a tree of text documents")]
#[command(version)]
struct Cli {
    /// Debug logging (overrides RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Read, chunk and embed a directory, then write the index file
    Build(BuildArgs),
    /// Retrieve context for a question from an existing index
    Query(QueryArgs),
}

#[derive(clap::Args, Debug)]
struct BuildArgs {
    /// Directory to index
    #[arg(long)]
    input_dir: String,

    /// Output index file (JSON)
    #[arg(long)]
    out: String,

    #[arg(long, default_value_t = 400)]
    target_tokens: usize,

    #[arg(long, default_value_t = 80)]
    overlap_tokens: usize,

    #[arg(long, default_value_t = 3.0)]
    chars_per_token: f64,

    /// Embedding requests in flight at once
    #[arg(long, default_value_t = 4)]
    concurrency: usize,

    /// Chunks per embedding request
    #[arg(long, default_value_t = 16)]
    batch_size: usize,

    #[arg(long, default_value = DEFAULT_OLLAMA_URL)]
    ollama_url: String,

    #[arg(long, default_value = DEFAULT_EMBED_MODEL)]
    model: String,

    /// Retries per request after the first attempt
    #[arg(long, default_value_t = 3)]
    retries: u32,

    #[arg(long, default_value_t = 250)]
    initial_backoff_ms: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum RerankArg {
    None,
    TermOverlap,
}

impl From<RerankArg> for RerankMode {
    fn from(arg: RerankArg) -> Self {
        match arg {
            RerankArg::None => RerankMode::None,
            RerankArg::TermOverlap => RerankMode::TermOverlap,
        }
    }
}

#[derive(clap::Args, Debug)]
struct QueryArgs {
    /// Index file; defaults to `rag.index_path` from docrag.toml
    #[arg(long)]
    index: Option<String>,

    #[arg(long)]
    top_k: Option<usize>,

    /// Drop candidates scoring below this quantile (0 keeps all)
    #[arg(long)]
    quantile: Option<f64>,

    #[arg(long, value_enum)]
    rerank: Option<RerankArg>,

    #[arg(long)]
    max_context_chars: Option<usize>,

    #[arg(long, default_value = DEFAULT_OLLAMA_URL)]
    ollama_url: String,

    #[arg(long, default_value = DEFAULT_EMBED_MODEL)]
    model: String,

    /// Question text
    #[arg(required = true, num_args = 1..)]
    question: Vec<String>,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let cwd = env::current_dir().context("reading current directory")?;
    match cli.command {
        Commands::Build(args) => run_build(&cwd, args).await,
        Commands::Query(args) => run_query(&cwd, args).await,
    }
}

async fn run_build(cwd: &Path, args: BuildArgs) -> Result<()> {
    let input_dir = resolve_project_path(cwd, &args.input_dir);
    let out = resolve_project_path(cwd, &args.out);
    let params = BuildParams::new(args.target_tokens, args.overlap_tokens, args.chars_per_token, args.concurrency)
        .with_batch_size(args.batch_size);
    info!(
        input = %input_dir.display(),
        out = %out.display(),
        max_chars = params.max_chars,
        overlap_chars = params.overlap_chars,
        concurrency = params.concurrency,
        "starting build"
    );

    let retry = RetryPolicy::new(args.retries, Duration::from_millis(args.initial_backoff_ms));
    let embedder = default_embedder(ModelConfig::new(args.model, args.ollama_url), retry)?;
    let index = IndexBuilder::new(embedder)
        .with_progress(IndexBuilder::terminal_progress())
        .build(&BuildRequest::new(&input_dir, params))
        .await
        .with_context(|| format!("building index from {}", input_dir.display()))?;
    write_index(&index, &out)?;

    println!(
        "Indexed {} documents into {} chunks (avg {:.0} chars) in {} ms -> {}",
        index.stats.docs,
        index.stats.chunks,
        index.stats.avg_chunk_len,
        index.stats.elapsed_ms,
        out.display()
    );
    Ok(())
}

async fn run_query(cwd: &Path, args: QueryArgs) -> Result<()> {
    let root = find_project_root(cwd, PROJECT_MARKERS).unwrap_or_else(|| cwd.to_path_buf());
    let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
    let config = Config::load_from(&root, &env_name)?;
    let mut settings = config.rag_settings()?;

    if let Some(top_k) = args.top_k {
        if top_k == 0 {
            bail!("--top-k must be at least 1");
        }
        settings.top_k = top_k;
    }
    if let Some(q) = args.quantile {
        if !(0.0..=1.0).contains(&q) {
            bail!("--quantile must be within [0, 1], got {q}");
        }
        settings.rerank.quantile_q = q;
    }
    if let Some(mode) = args.rerank {
        settings.rerank.mode = mode.into();
    }
    if args.max_context_chars.is_some() {
        settings.max_context_chars = args.max_context_chars;
    }
    if let Some(index) = args.index {
        settings.index_path = index;
    }
    settings.enabled = true;

    let embedder = default_embedder(ModelConfig::new(args.model, args.ollama_url), RetryPolicy::default())?;
    let service = RagService::new(SearchPipeline::new(embedder)).with_base_dir(cwd);
    let index_path = service.index_path(&settings)?;
    let question = args.question.join(" ");
    let context = service
        .context_for(&question, &settings)
        .await
        .with_context(|| format!("querying {}", index_path.display()))?;

    if context.is_empty() {
        eprintln!("No relevant context found.");
    } else {
        println!("{context}");
    }
    Ok(())
}
