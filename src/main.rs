use anyhow::Result;
use clap::{Parser, Subcommand};
use fetch_throttler::backend::{Backend, HttpBackend};
use fetch_throttler::config::Config;
use fetch_throttler::contexts::{ChatContext, ProductContext};
use fetch_throttler::throttler::Throttler;
use futures::future::{join_all, BoxFuture, FutureExt};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "fetch-throttler", about = "Issue deduplicated, throttled backend fetches")]
struct Cli {
    /// Number of simultaneous calls to issue
    #[arg(short, long, default_value_t = 1)]
    concurrency: usize,

    /// Bypass the throttle window and in-flight deduplication
    #[arg(short, long)]
    force: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// List all products
    Products,
    /// Fetch a single product by id
    Product { id: String },
    /// List product reviews
    Reviews,
    /// List saved addresses
    Addresses,
    /// List chat users
    Users,
    /// Fetch the chat history for a user
    Chats { user: String },
}

type Call = BoxFuture<'static, fetch_throttler::Result<()>>;

#[derive(Serialize)]
struct Report<S: Serialize> {
    succeeded: usize,
    failed: usize,
    errors: Vec<String>,
    state: S,
    metrics: Metrics,
}

#[derive(Serialize)]
struct Metrics {
    global: fetch_throttler::RequestMetrics,
    keys: HashMap<fetch_throttler::RequestKey, fetch_throttler::RequestMetrics>,
}

async fn run<S: Serialize>(calls: Vec<Call>, state: impl FnOnce() -> S, throttler: &Throttler<Value>) -> Result<String> {
    let outcomes = join_all(calls).await;
    let errors: Vec<String> = outcomes
        .iter()
        .filter_map(|outcome| outcome.as_ref().err().map(ToString::to_string))
        .collect();

    let report = Report {
        succeeded: outcomes.len() - errors.len(),
        failed: errors.len(),
        errors,
        state: state(),
        metrics: Metrics {
            global: throttler.metrics().get_global_metrics(),
            keys: throttler.metrics().get_all_metrics(),
        },
    };
    Ok(serde_json::to_string_pretty(&report)?)
}

fn product_call(context: &ProductContext, command: &Command, force: bool) -> Call {
    match command {
        Command::Product { id } => context.get_product(Some(id), force).map(|r| r.map(drop)).boxed(),
        Command::Reviews => context.get_product_reviews(force).map(|r| r.map(drop)).boxed(),
        Command::Addresses => context.get_addresses(force).map(|r| r.map(drop)).boxed(),
        _ => context.get_products(force).map(|r| r.map(drop)).boxed(),
    }
}

fn chat_call(context: &ChatContext, command: &Command, force: bool) -> Call {
    match command {
        Command::Chats { user } => context.get_user_chats(Some(user), force).map(|r| r.map(drop)).boxed(),
        _ => context.get_users(force).map(|r| r.map(drop)).boxed(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    let config = Config::from_env()
        .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

    // Logs go to stderr so stdout stays pure JSON
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("fetch_throttler={}", config.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    tracing::info!(
        "Configuration: backend_url={}, throttle_window_ms={}, max_attempts={}",
        config.backend_url,
        config.throttle_window_ms,
        config.max_attempts
    );

    let backend: Arc<dyn Backend> = Arc::new(
        HttpBackend::new(&config.backend_url, config.request_timeout())
            .map_err(|e| anyhow::anyhow!("Failed to create backend: {}", e))?,
    );
    let concurrency = cli.concurrency.max(1);

    let output = match &cli.command {
        Command::Users | Command::Chats { .. } => {
            let context = ChatContext::new(backend, config.throttle_config())?;
            let calls = (0..concurrency)
                .map(|_| chat_call(&context, &cli.command, cli.force))
                .collect();
            run(calls, || context.state(), context.throttler()).await?
        }
        _ => {
            let context = ProductContext::new(backend, config.throttle_config())?;
            let calls = (0..concurrency)
                .map(|_| product_call(&context, &cli.command, cli.force))
                .collect();
            run(calls, || context.state(), context.throttler()).await?
        }
    };

    println!("{}", output);
    Ok(())
}
