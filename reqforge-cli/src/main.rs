use clap::{Parser, Subcommand};
use loadtest_engine::{LoadTestConfig, LoadTestDriver};
use request_engine::{
    decode_jwt, parse_curl, AuthConfig, RequestOrchestrator, RequestSpec, RetryPolicy,
    TransportStack,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// reqforge - send, mock and load-test HTTP requests from the terminal
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send a single request and print the response snapshot
    Send {
        /// Target URL (supports {{variable}} placeholders)
        url: String,

        /// HTTP method
        #[arg(short = 'X', long, default_value = "GET")]
        method: String,

        /// Header in 'Key: Value' form, repeatable
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Request body
        #[arg(short = 'd', long)]
        body: Option<String>,

        /// Bearer token for the Authorization header
        #[arg(long)]
        bearer: Option<String>,

        /// Total attempts for retryable failures
        #[arg(long, default_value_t = 1)]
        attempts: u32,

        /// Base backoff in milliseconds between attempts
        #[arg(long, default_value_t = 0)]
        backoff_ms: u64,

        /// Status codes that trigger a retry, repeatable
        #[arg(long = "retry-status")]
        retry_statuses: Vec<u16>,
    },

    /// Parse a curl command line into request fields
    Curl {
        /// The full curl command
        command: String,
    },

    /// Decode a JWT and report its expiry
    Jwt {
        /// The raw token
        token: String,
    },

    /// Run a sequential load test
    Loadtest {
        /// Number of requests to issue
        #[arg(long, default_value_t = 50)]
        total: u32,

        /// Real GET target; omit to simulate latency and status
        #[arg(long)]
        target: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "request_engine=info,loadtest_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match args.command {
        Command::Send {
            url,
            method,
            headers,
            body,
            bearer,
            attempts,
            backoff_ms,
            retry_statuses,
        } => {
            let transport = Arc::new(TransportStack::over_network());
            let orchestrator = RequestOrchestrator::new(transport);
            orchestrator
                .set_policy(RetryPolicy::new(attempts, backoff_ms).with_retryable_codes(retry_statuses))
                .await;

            let mut spec = RequestSpec::new(method, url);
            for header in headers {
                match header.split_once(':') {
                    Some((key, value)) => {
                        spec = spec.with_header(key.trim(), value.trim());
                    }
                    None => anyhow::bail!("header '{}' is not in 'Key: Value' form", header),
                }
            }
            if let Some(body) = body {
                spec = spec.with_body(body);
            }
            if let Some(token) = bearer {
                spec = spec.with_auth(AuthConfig::Bearer { token });
            }

            let response = orchestrator.send(&spec).await?;
            println!(
                "{} {} ({}ms, {} bytes)",
                response.status, response.status_text, response.elapsed_ms, response.size_bytes
            );
            for (key, value) in &response.headers {
                println!("{}: {}", key, value);
            }
            println!();
            println!("{}", response.body);
        }

        Command::Curl { command } => {
            let parsed = parse_curl(&command);
            println!("{}", serde_json::to_string_pretty(&parsed)?);
        }

        Command::Jwt { token } => {
            let decoded = decode_jwt(&token)?;
            println!("{}", serde_json::to_string_pretty(&decoded)?);
        }

        Command::Loadtest { total, target } => {
            let transport = Arc::new(TransportStack::over_network());
            let driver = LoadTestDriver::new(transport);

            let config = match target {
                Some(target) => LoadTestConfig::against(total, target),
                None => LoadTestConfig::simulated(total),
            };

            println!("🚀 Load test starting: {} requests", total);
            let mut rx = driver.run(config);
            let mut last_stats = None;
            while let Some(update) = rx.recv().await {
                println!(
                    "#{:<4} status {:<3} {:>5}ms | avg {:.1}ms p95 {}ms errors {:.1}%",
                    update.result.sequence,
                    update.result.status,
                    update.result.latency_ms,
                    update.stats.average_ms,
                    update.stats.p95_ms,
                    update.stats.error_rate * 100.0
                );
                last_stats = Some(update.stats);
            }

            if let Some(stats) = last_stats {
                println!();
                println!(
                    "✓ {} completed | avg {:.1}ms | p95 {}ms | {:.1} req/s | error rate {:.1}%",
                    stats.completed,
                    stats.average_ms,
                    stats.p95_ms,
                    stats.requests_per_second,
                    stats.error_rate * 100.0
                );
            }
        }
    }

    Ok(())
}
