use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use opsis_lib::client::{MailboxClient, ProducerClient, SearchClient};
use opsis_lib::config::{resolve_config, ConfigMerger, OpsisConfig, PartialConfig};
use opsis_lib::producer::{CallbackNotifier, CallbackPayload};
use opsis_lib::server::{self, ServerAppState};
use opsis_lib::shutdown::{register_signal_handlers, ShutdownState};
use opsis_lib::{AnalysisFlow, JobId, PollOutcome, ThreadCollection, UnreadPolicy, ViewState};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Opsis - topic analysis job hand-off: mailbox server and polling client
#[derive(Parser, Debug)]
#[command(name = "opsis")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to <config dir>/opsis/config.toml)
    #[arg(long, global = true, env = "OPSIS_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the mailbox HTTP/WebSocket server
    Serve(ServeArgs),
    /// Submit a topic, wait for its keywords, and optionally load threads
    Analyze(AnalyzeArgs),
    /// Deliver a keyword result to a callback URL, as a producer would
    Notify(NotifyArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Port to bind the server to
    #[arg(long, env = "OPSIS_PORT")]
    port: Option<u16>,

    /// Address to bind the server to
    #[arg(long)]
    bind: Option<String>,

    /// Allowed CORS origin (repeatable; any origin when omitted)
    #[arg(long = "cors-origin")]
    cors_origins: Vec<String>,

    /// Maximum number of job-keyed results kept
    #[arg(long)]
    capacity: Option<usize>,

    /// What to do when a result arrives while one is unread: overwrite | reject
    #[arg(long)]
    unread_policy: Option<UnreadPolicy>,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Topic to analyze
    topic: String,

    #[arg(long, env = "OPSIS_PRODUCER_URL")]
    producer_url: Option<String>,

    /// Callback URL handed to the producer
    #[arg(long, env = "OPSIS_CALLBACK_URL")]
    callback_url: Option<String>,

    #[arg(long, env = "OPSIS_MAILBOX_URL")]
    mailbox_url: Option<String>,

    #[arg(long, env = "OPSIS_SEARCH_URL")]
    search_url: Option<String>,

    /// Poll interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Give up after this many milliseconds
    #[arg(long)]
    max_wait_ms: Option<u64>,

    /// Load threads for this keyword (or the first generated one with --threads)
    #[arg(long)]
    keyword: Option<String>,

    /// Load and print threads after the keywords arrive
    #[arg(long)]
    threads: bool,

    /// Also print news articles for the keyword
    #[arg(long)]
    news: bool,
}

#[derive(Args, Debug)]
struct NotifyArgs {
    /// Callback endpoint to deliver to
    #[arg(long)]
    callback_url: String,

    #[arg(long)]
    topic: String,

    /// Keyword (repeatable)
    #[arg(long = "keyword")]
    keywords: Vec<String>,

    #[arg(long)]
    job_id: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::init();

    let file_config = resolve_config(cli.config.as_deref())?;

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;

    match cli.command {
        Command::Serve(args) => {
            let config = merge(file_config, serve_overrides(&args));
            rt.block_on(run_serve(config))
        }
        Command::Analyze(args) => {
            let config = merge(file_config, analyze_overrides(&args));
            rt.block_on(run_analyze(config, args))
        }
        Command::Notify(args) => rt.block_on(run_notify(args)),
    }
}

fn merge(file: OpsisConfig, cli: PartialConfig) -> OpsisConfig {
    ConfigMerger::new()
        .with_file(Some(file))
        .with_cli(Some(cli))
        .merge()
}

fn serve_overrides(args: &ServeArgs) -> PartialConfig {
    PartialConfig {
        port: args.port,
        bind: args.bind.clone(),
        cors_origins: (!args.cors_origins.is_empty()).then(|| args.cors_origins.clone()),
        mailbox_capacity: args.capacity,
        unread_policy: args.unread_policy,
        ..Default::default()
    }
}

fn analyze_overrides(args: &AnalyzeArgs) -> PartialConfig {
    PartialConfig {
        producer_url: args.producer_url.clone(),
        callback_url: args.callback_url.clone(),
        mailbox_url: args.mailbox_url.clone(),
        search_url: args.search_url.clone(),
        poll_interval_ms: args.interval_ms,
        max_wait_ms: args.max_wait_ms,
        ..Default::default()
    }
}

async fn run_serve(config: OpsisConfig) -> Result<()> {
    config.validate()?;

    let shutdown_state = ShutdownState::new();
    if let Err(e) = register_signal_handlers(shutdown_state.clone()) {
        log::warn!("Failed to register signal handlers: {}", e);
    }

    let state = ServerAppState::new(&config.mailbox, shutdown_state);

    server::run_server(
        config.server.port,
        &config.server.bind,
        state,
        &config.server.cors_origins,
    )
    .await
    .map_err(anyhow::Error::msg)
}

async fn run_analyze(config: OpsisConfig, args: AnalyzeArgs) -> Result<()> {
    config.validate()?;

    let producer = ProducerClient::new(
        &config.producer.base_url,
        &config.producer.callback_url,
        Duration::from_millis(config.producer.timeout_ms),
    );
    let mailbox = Arc::new(MailboxClient::new(
        config.mailbox_base_url(),
        Duration::from_millis(config.producer.timeout_ms),
    ));
    let search = SearchClient::new(
        &config.search.base_url,
        Duration::from_millis(config.search.timeout_ms),
    );

    let mut flow = AnalysisFlow::new(producer, mailbox, search, config.poll.to_poll_config());

    let handle = flow.start(&args.topic).await?;
    let canceller = handle.canceller();
    let waiting = tokio::spawn(handle.wait());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            canceller.cancel();
            println!("Cancelled");
        }
        outcome = waiting => {
            let outcome = outcome.context("Poll task failed")??;
            let entry = match outcome {
                PollOutcome::Resolved { entry, .. } => entry,
                PollOutcome::Cancelled { .. } => bail!("Polling was cancelled"),
            };

            let keywords = entry.keywords();
            println!("Keywords for '{}':", args.topic);
            for keyword in &keywords.keywords {
                println!("  - {}", keyword);
            }

            let chosen = args
                .keyword
                .clone()
                .or_else(|| keywords.keywords.first().cloned());

            if let Some(keyword) = chosen {
                if args.threads || args.keyword.is_some() {
                    let collection = flow.load_threads(&keyword).await?;
                    print_threads(&keyword, &collection);
                }
                if args.news {
                    let news = flow.load_news(&keyword).await?;
                    println!("\nNews for '{}':", keyword);
                    for article in &news.articles {
                        println!("  [{}] {}", article.source, article.title);
                    }
                }
            }
        }
    }

    Ok(())
}

fn print_threads(keyword: &str, collection: &ThreadCollection) {
    println!("\nThreads for '{}':", keyword);
    if collection.is_empty() {
        println!("  (none)");
    }

    let mut view = ViewState::new();
    for root in &collection.threads {
        view.expand_all(root);
    }

    for node in view.visible(&collection.threads) {
        let indent = "  ".repeat(node.depth + 1);
        println!("{}{}", indent, node.content);
        if let Some(url) = node.source_url {
            println!("{}  -> {}", indent, url);
        }
    }

    for report in &collection.malformed {
        println!("  ! thread #{} skipped: {}", report.index, report.reason);
    }
}

async fn run_notify(args: NotifyArgs) -> Result<()> {
    let payload = CallbackPayload {
        topic: args.topic,
        keywords: args.keywords,
        job_id: args.job_id.map(JobId::from),
    };

    CallbackNotifier::new()
        .notify(&args.callback_url, &payload)
        .await
        .map_err(anyhow::Error::msg)
}
