use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use copycheck_core::{AnalyzeOptions, PercentagePolicy, PlagiarismReport};
use copycheck_local::{
    embed, search, Analyzer, EngineConfig, FetchConfig, FsCache, LocalPageFetcher, MatchEngine,
    MemoryCache, ResultCache,
};
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "copycheck")]
#[command(about = "Check a document for text copied from the web", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Chunk a document, search each chunk, compare against fetched pages, print a report.
    Analyze(AnalyzeCmd),
    /// Print the chunks a document would be split into (json array).
    Chunk(ChunkCmd),
    /// Show which providers are configured (json; no secrets).
    Doctor(DoctorCmd),
    /// Print version info.
    Version(VersionCmd),
}

#[derive(clap::Args, Debug)]
struct InputArgs {
    /// Document text. If neither --text nor --file is given, stdin is read.
    #[arg(long, conflicts_with = "file")]
    text: Option<String>,
    /// Read the document from a file.
    #[arg(long)]
    file: Option<PathBuf>,
}

impl InputArgs {
    fn read(&self) -> Result<String> {
        if let Some(t) = &self.text {
            return Ok(t.clone());
        }
        if let Some(p) = &self.file {
            return std::fs::read_to_string(p).with_context(|| format!("read {}", p.display()));
        }
        let mut s = String::new();
        std::io::stdin()
            .read_to_string(&mut s)
            .context("read stdin")?;
        Ok(s)
    }
}

#[derive(clap::Args, Debug)]
struct AnalyzeCmd {
    #[command(flatten)]
    input: InputArgs,
    /// Search provider. Allowed: auto, google, brave, searxng
    #[arg(long, env = "COPYCHECK_SEARCH_PROVIDER", default_value = "auto")]
    provider: String,
    /// Embedding backend. Allowed: auto, openai_compat, ollama, none
    #[arg(long, env = "COPYCHECK_EMBEDDER", default_value = "auto")]
    embedder: String,
    /// Minimum similarity (0..=1) for a match to be reported.
    #[arg(long, env = "COPYCHECK_THRESHOLD", default_value_t = 0.8)]
    threshold: f64,
    /// Soft character cap per input chunk.
    #[arg(long, env = "COPYCHECK_CHUNK_MAX_LEN", default_value_t = AnalyzeOptions::DEFAULT_CHUNK_MAX_LEN)]
    chunk_max_len: usize,
    /// Search hits per chunk that are fetched and compared.
    #[arg(long, env = "COPYCHECK_TOP_RESULTS", default_value_t = AnalyzeOptions::DEFAULT_TOP_RESULTS)]
    top_results: usize,
    /// Chunk pipelines in flight at once.
    #[arg(long, env = "COPYCHECK_CHUNK_CONCURRENCY", default_value_t = 3)]
    chunk_concurrency: usize,
    /// Page fetch+score tasks in flight at once, across all chunks.
    #[arg(long, env = "COPYCHECK_FETCH_CONCURRENCY", default_value_t = 3)]
    fetch_concurrency: usize,
    #[arg(long, env = "COPYCHECK_SEARCH_TIMEOUT_MS", default_value_t = 8_000)]
    search_timeout_ms: u64,
    /// Per-attempt page fetch timeout; a timed-out attempt is retried once.
    #[arg(long, env = "COPYCHECK_FETCH_TIMEOUT_MS", default_value_t = 20_000)]
    fetch_timeout_ms: u64,
    #[arg(long, env = "COPYCHECK_EMBED_TIMEOUT_MS", default_value_t = 20_000)]
    embed_timeout_ms: u64,
    /// Maximum bytes read from a fetched page.
    #[arg(long, env = "COPYCHECK_FETCH_MAX_BYTES", default_value_t = 5 * 1024 * 1024)]
    fetch_max_bytes: usize,
    /// Search-result cache backend. Allowed: memory, fs
    #[arg(long, env = "COPYCHECK_CACHE", default_value = "memory")]
    cache: String,
    /// Directory for the fs cache backend.
    #[arg(long, env = "COPYCHECK_CACHE_DIR")]
    cache_dir: Option<PathBuf>,
    /// Search-result cache TTL (seconds).
    #[arg(long, env = "COPYCHECK_CACHE_TTL_S", default_value_t = 3_600)]
    cache_ttl_s: u64,
    /// How the percentage is computed. Allowed: distinct-chunks, match-count
    #[arg(long, env = "COPYCHECK_PERCENTAGE_POLICY", default_value = "distinct-chunks")]
    percentage_policy: String,
    /// Output format: json|text
    #[arg(long = "format", alias = "output", default_value = "json")]
    format: String,
}

#[derive(clap::Args, Debug)]
struct ChunkCmd {
    #[command(flatten)]
    input: InputArgs,
    #[arg(long, default_value_t = AnalyzeOptions::DEFAULT_CHUNK_MAX_LEN)]
    max_len: usize,
}

#[derive(clap::Args, Debug)]
struct DoctorCmd {
    /// Output format: json|text
    #[arg(long = "format", alias = "output", default_value = "json")]
    format: String,
}

#[derive(clap::Args, Debug)]
struct VersionCmd {
    /// Output format: json|text
    #[arg(long = "format", alias = "output", default_value = "json")]
    format: String,
}

/// Load `KEY=VALUE` lines from `COPYCHECK_ENV_FILE` without overriding the process env.
fn load_env_file() {
    let Ok(p) = std::env::var("COPYCHECK_ENV_FILE") else {
        return;
    };
    let p = p.trim();
    if p.is_empty() {
        return;
    }
    let Ok(txt) = std::fs::read_to_string(p) else {
        return;
    };
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let s = s.strip_prefix("export ").unwrap_or(s);
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        let v = v.trim().trim_matches('"');
        if k.is_empty() {
            continue;
        }
        if std::env::var_os(k).is_none() {
            std::env::set_var(k, v);
        }
    }
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = EnvFilter::try_from_env("COPYCHECK_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    // stdout carries the report; logs go to stderr.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .map(|d| d.join("copycheck"))
        .unwrap_or_else(FsCache::default_dir)
}

fn fetch_config(args: &AnalyzeCmd) -> FetchConfig {
    FetchConfig {
        timeout: Duration::from_millis(args.fetch_timeout_ms),
        max_bytes: args.fetch_max_bytes,
        ..FetchConfig::default()
    }
}

/// The engine's per-page bound spans every fetch attempt, so it comes from the fetch config.
fn engine_config(args: &AnalyzeCmd, fetch: &FetchConfig) -> EngineConfig {
    EngineConfig {
        chunk_concurrency: args.chunk_concurrency,
        fetch_concurrency: args.fetch_concurrency,
        cache_ttl: Duration::from_secs(args.cache_ttl_s),
        search_timeout: Duration::from_millis(args.search_timeout_ms),
        fetch_timeout: fetch.total_budget(),
        embed_timeout: Duration::from_millis(args.embed_timeout_ms),
        ..EngineConfig::default()
    }
}

fn build_analyzer(args: &AnalyzeCmd) -> copycheck_core::Result<Analyzer> {
    let policy: PercentagePolicy = args.percentage_policy.parse()?;
    let client = reqwest::Client::builder()
        .user_agent(concat!("copycheck/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| copycheck_core::Error::NotConfigured(format!("http client: {e}")))?;

    let search = search::provider_from_env(&args.provider, client.clone())?;
    let embedder = embed::embedder_from_env(&args.embedder, client)?;
    let fetch_cfg = fetch_config(args);
    let cfg = engine_config(args, &fetch_cfg);
    let fetcher = LocalPageFetcher::new(fetch_cfg)?;
    let cache: Arc<dyn ResultCache> = match args.cache.trim().to_ascii_lowercase().as_str() {
        "memory" => Arc::new(MemoryCache::new()),
        "fs" => Arc::new(FsCache::new(
            args.cache_dir.clone().unwrap_or_else(default_cache_dir),
        )),
        other => {
            return Err(copycheck_core::Error::InvalidOptions(format!(
                "unknown cache backend {other:?} (allowed: memory, fs)"
            )))
        }
    };

    tracing::debug!(
        provider = search.name(),
        embedder = embedder.name(),
        ?cfg,
        "analyzer configured"
    );
    let engine = MatchEngine::new(search, Arc::new(fetcher), embedder, cache, cfg);
    Ok(Analyzer::new(engine).with_policy(policy))
}

/// Human-readable report: summary, then each match with its similarity and source.
fn render_text(report: &PlagiarismReport) -> String {
    let mut out = String::new();
    out.push_str("Plagiarism Check Report\n");
    out.push_str(&format!(
        "Plagiarism Percentage: {}%\n",
        report.percentage_display()
    ));
    out.push('\n');
    if report.results.is_empty() {
        out.push_str("No plagiarism detected.\n");
        return out;
    }
    out.push_str("Matched Sections\n");
    for (i, r) in report.results.iter().enumerate() {
        out.push_str(&format!(
            "Text {} (Similarity: {:.2}%):\n\"{}\"\nSource: {}\n\n",
            i + 1,
            r.similarity * 100.0,
            r.chunk,
            r.source
        ));
    }
    out
}

fn print_error(format: &str, code: &str, message: &str) {
    match format {
        "text" => eprintln!("error ({code}): {message}"),
        _ => println!(
            "{}",
            serde_json::json!({
                "ok": false,
                "error": { "code": code, "message": message },
            })
        ),
    }
}

async fn analyze(args: AnalyzeCmd) -> Result<ExitCode> {
    let format = args.format.to_ascii_lowercase();
    let text = match args.input.read() {
        Ok(t) => t,
        Err(e) => {
            print_error(&format, "invalid_input", &format!("{e:#}"));
            return Ok(ExitCode::from(2));
        }
    };
    let opts = AnalyzeOptions {
        chunk_max_len: args.chunk_max_len,
        top_results: args.top_results,
        similarity_threshold: args.threshold,
    };

    // Configuration problems surface here, before any chunk is searched.
    let report = match build_analyzer(&args) {
        Ok(a) => a.analyze(&text, &opts).await,
        Err(e) => Err(e),
    };
    match report {
        Ok(report) => {
            match format.as_str() {
                "text" => print!("{}", render_text(&report)),
                _ => println!("{}", serde_json::to_string(&report)?),
            }
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            print_error(&format, e.code(), &e.to_string());
            Ok(ExitCode::from(2))
        }
    }
}

fn doctor(args: DoctorCmd) -> Result<()> {
    let search_providers = search::configured_providers();
    let embedders = embed::configured_embedders();
    let payload = serde_json::json!({
        "schema_version": 1,
        "kind": "doctor",
        "ok": !search_providers.is_empty(),
        "name": "copycheck",
        "version": env!("CARGO_PKG_VERSION"),
        "configured": {
            "search": {
                "google": search_providers.contains(&"google"),
                "brave": search_providers.contains(&"brave"),
                "searxng": search_providers.contains(&"searxng"),
                "auto": search_providers.first(),
            },
            "embeddings": {
                "openai_compat": embedders.contains(&"openai_compat"),
                "ollama": embedders.contains(&"ollama"),
                "auto": embedders.first().copied().unwrap_or("none"),
            },
            "cache_dir": default_cache_dir().to_string_lossy().to_string(),
        },
    });
    match args.format.to_ascii_lowercase().as_str() {
        "text" => {
            println!(
                "copycheck {} (ok={})",
                env!("CARGO_PKG_VERSION"),
                payload["ok"].as_bool().unwrap_or(false)
            );
            println!(
                "search: {}",
                if search_providers.is_empty() {
                    "none configured".to_string()
                } else {
                    search_providers.join(", ")
                }
            );
            println!(
                "embeddings: {}",
                payload["configured"]["embeddings"]["auto"]
                    .as_str()
                    .unwrap_or("none")
            );
        }
        _ => println!("{payload}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    load_env_file();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Commands::Analyze(args) => return analyze(args).await,
        Commands::Chunk(args) => {
            let text = args.input.read()?;
            let chunks = copycheck_local::chunk(&text, args.max_len);
            println!("{}", serde_json::to_string(&chunks)?);
        }
        Commands::Doctor(args) => doctor(args)?,
        Commands::Version(args) => {
            let v = serde_json::json!({
                "schema_version": 1,
                "kind": "version",
                "ok": true,
                "name": "copycheck",
                "version": env!("CARGO_PKG_VERSION"),
            });
            match args.format.to_ascii_lowercase().as_str() {
                "text" => println!("copycheck {}", env!("CARGO_PKG_VERSION")),
                _ => println!("{v}"),
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}
