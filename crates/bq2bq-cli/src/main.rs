use clap::{Parser, Subcommand};
use colored::Colorize;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bq2bq_core::Config;
use bq2bq_client::{BigQueryClientBuilder, ClientBuilder, ClientCache, MockClientBuilder, WarehouseClient};

/// Environment variable holding the service-account JSON
const SERVICE_ACCOUNT_VAR: &str = "BQ_SERVICE_ACCOUNT";

/// bq2bq - warehouse client factory harness
#[derive(Parser)]
#[command(name = "bq2bq")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: bq2bq.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Service-account key file (falls back to $BQ_SERVICE_ACCOUNT)
    #[arg(short, long, global = true)]
    service_account: Option<PathBuf>,

    /// Build in-memory clients instead of talking to BigQuery
    #[arg(long, global = true)]
    mock: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Acquire a client repeatedly and report reuse vs rebuild
    Acquire {
        /// Number of acquisitions
        #[arg(short = 'n', long, default_value_t = 1)]
        times: usize,

        /// Number of concurrent callers
        #[arg(short = 'j', long, default_value_t = 1)]
        concurrency: usize,
    },

    /// Acquire a client and run its connection test
    Check,

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    // Load config if specified
    let config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else if Path::new("bq2bq.toml").exists() {
        Config::from_file(Path::new("bq2bq.toml"))?
    } else {
        if cli.verbose {
            eprintln!("{}", "No config file found, using defaults".yellow());
        }
        Config::default()
    };

    tracing::debug!(config = ?config, "loaded configuration");

    if cli.verbose {
        eprintln!("{} max_reuse = {}", "Using".cyan(), config.client.max_reuse);
    }

    match cli.command {
        Commands::Config => config_command(&config),
        Commands::Acquire { times, concurrency } => {
            let key = read_service_account(cli.service_account.as_deref())?;
            if cli.mock {
                let builder = MockClientBuilder::new();
                acquire_command(ClientCache::with_config(builder, &config.client), key, times, concurrency).await
            } else {
                let builder = BigQueryClientBuilder::new();
                acquire_command(ClientCache::with_config(builder, &config.client), key, times, concurrency).await
            }
        }
        Commands::Check => {
            let key = read_service_account(cli.service_account.as_deref())?;
            if cli.mock {
                check_command(&ClientCache::with_config(MockClientBuilder::new(), &config.client), &key, cli.verbose).await
            } else {
                check_command(&ClientCache::with_config(BigQueryClientBuilder::new(), &config.client), &key, cli.verbose).await
            }
        }
    }
}

/// Read the service-account JSON from a file or the environment
fn read_service_account(path: Option<&Path>) -> Result<Vec<u8>> {
    match path {
        Some(path) => std::fs::read(path)
            .with_context(|| format!("Failed to read service account file {}", path.display())),
        None => std::env::var(SERVICE_ACCOUNT_VAR)
            .map(String::into_bytes)
            .map_err(|_| anyhow::anyhow!(
                "No service account given. Pass --service-account <file> or set {}.",
                SERVICE_ACCOUNT_VAR
            )),
    }
}

/// Config command - print the effective configuration
fn config_command(config: &Config) -> Result<()> {
    println!("{}", "[client]".bold());
    println!("max_reuse = {}", config.client.max_reuse);
    println!("scopes:");
    for scope in &config.client.scopes {
        println!("  - {}", scope);
    }
    Ok(())
}

/// Acquire command - hammer the cache and summarize what it did
async fn acquire_command<B>(
    cache: ClientCache<B>,
    key: Vec<u8>,
    times: usize,
    concurrency: usize,
) -> Result<()>
where
    B: ClientBuilder + 'static,
{
    let cache = Arc::new(cache);
    let key = Arc::new(key);
    let workers = concurrency.clamp(1, times.max(1));

    let mut handles = Vec::with_capacity(workers);
    for worker in 0..workers {
        let cache = Arc::clone(&cache);
        let key = Arc::clone(&key);
        // Spread `times` calls over the workers
        let calls = times / workers + usize::from(worker < times % workers);

        handles.push(tokio::spawn(async move {
            let mut clients = Vec::with_capacity(calls);
            for _ in 0..calls {
                clients.push(cache.acquire(&key).await?);
            }
            Ok::<_, bq2bq_client::FactoryError>(clients)
        }));
    }

    let mut clients: Vec<Arc<B::Client>> = Vec::with_capacity(times);
    for handle in handles {
        clients.extend(handle.await??);
    }

    let mut distinct: Vec<&Arc<B::Client>> = Vec::new();
    for client in &clients {
        if !distinct.iter().any(|seen| Arc::ptr_eq(seen, client)) {
            distinct.push(client);
        }
    }

    println!("{} {}", "Builder:".bold(), cache.builder().name());
    println!("{} {}", "Acquisitions:".bold(), clients.len());
    println!("{} {}", "Clients built:".bold(), distinct.len());
    println!(
        "{} {}",
        "Reused:".bold(),
        clients.len().saturating_sub(distinct.len())
    );

    if let Some(snapshot) = cache.snapshot().await {
        println!();
        println!("{} {}", "Cached project:".bold(), snapshot.project_id.green());
        println!("{} {}", "Credential digest:".bold(), snapshot.digest);
        println!(
            "{} {} / {}",
            "Times used:".bold(),
            snapshot.times_used,
            cache.max_reuse()
        );
    }

    Ok(())
}

/// Check command - acquire a client and test the connection
async fn check_command<B: ClientBuilder>(cache: &ClientCache<B>, key: &[u8], verbose: bool) -> Result<()> {
    if verbose {
        eprintln!("{} {}...", "Connecting to".cyan(), cache.builder().name());
    }

    let client = cache.acquire(key).await?;

    if verbose {
        eprintln!("{}", "Testing warehouse connection...".cyan());
    }

    client.test_connection().await
        .map_err(|e| anyhow::anyhow!("Failed to connect to warehouse: {}", e))?;

    println!(
        "{} {}",
        "✓ Connection successful for project".green(),
        client.project_id()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_acquire_flags() {
        let cli = Cli::parse_from(["bq2bq", "--mock", "acquire", "-n", "10", "-j", "3"]);
        assert!(cli.mock);
        match cli.command {
            Commands::Acquire { times, concurrency } => {
                assert_eq!(times, 10);
                assert_eq!(concurrency, 3);
            }
            _ => panic!("Expected acquire command"),
        }
    }

    #[test]
    fn reads_service_account_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key.json");
        std::fs::write(&path, b"{\"type\":\"service_account\"}").unwrap();

        let bytes = read_service_account(Some(path.as_path())).unwrap();
        assert_eq!(bytes, b"{\"type\":\"service_account\"}");
    }

    #[test]
    fn missing_service_account_file() {
        let err = read_service_account(Some(Path::new("/nonexistent/key.json"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/key.json"));
    }

    #[tokio::test]
    async fn acquire_with_mock_builder() {
        let key = br#"{"type":"service_account","project_id":"p","client_email":"a@p","private_key":"k"}"#.to_vec();
        let cache = ClientCache::new(MockClientBuilder::new()).with_max_reuse(1);

        acquire_command(cache, key, 4, 2).await.unwrap();
    }

    #[tokio::test]
    async fn check_with_failing_connection() {
        let key = br#"{"type":"service_account","project_id":"p","client_email":"a@p","private_key":"k"}"#;
        let cache = ClientCache::new(MockClientBuilder::new().with_connection_failure());

        let err = check_command(&cache, key, false).await.unwrap_err();
        assert!(err.to_string().starts_with("Failed to connect to warehouse"));
    }
}
