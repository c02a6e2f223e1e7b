use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde_json::Value;
use tokio::sync::mpsc;

use client::{Call, CallOptions, Client, ClientConfig, MethodSets, TracingSink, endpoint_from_base_url};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error(transparent)]
    Rpc(#[from] client::RpcError),
    #[error("the stream ended unexpectedly")]
    StreamEnded,
}

#[derive(Parser, Debug)]
#[command(name = "console-rpc", about = "Dev-console RPC client CLI")]
struct Cli {
    /// Console base URL; the socket endpoint is derived from it.
    #[arg(long, env = "CONSOLE_BASE_URL", default_value = "http://127.0.0.1:8080")]
    base_url: String,

    /// Full socket endpoint; overrides --base-url when set.
    #[arg(long, env = "CONSOLE_ENDPOINT")]
    endpoint: Option<String>,

    /// Comma-separated request-style method names.
    #[arg(
        long,
        env = "CONSOLE_REQUEST_METHODS",
        value_delimiter = ',',
        default_value = ""
    )]
    requests: Vec<String>,

    /// Comma-separated subscription-style method names.
    #[arg(
        long,
        env = "CONSOLE_SUBSCRIPTION_METHODS",
        value_delimiter = ',',
        default_value = ""
    )]
    subscriptions: Vec<String>,

    /// Print every frame through the tracing telemetry sink.
    #[arg(long, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Issue one request and print the response payload.
    Call {
        namespace: String,
        method: String,
        #[arg(long, default_value = "{}")]
        params: String,
        /// Give up after this many seconds.
        #[arg(long, default_value_t = 15)]
        timeout_secs: u64,
    },
    /// Open a subscription and print each item as a JSON line.
    Listen {
        namespace: String,
        method: String,
        #[arg(long, default_value = "{}")]
        params: String,
        /// Stop after this many items; run until Ctrl-C when absent.
        #[arg(long)]
        take: Option<usize>,
    },
}

enum StreamEvent {
    Item(Value),
    Error(Value),
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let endpoint = match &cli.endpoint {
        Some(endpoint) => endpoint.clone(),
        None => endpoint_from_base_url(&cli.base_url)?,
    };

    let methods = MethodSets::new(
        cli.requests.iter().filter(|name| !name.is_empty()).cloned(),
        cli.subscriptions
            .iter()
            .filter(|name| !name.is_empty())
            .cloned(),
    );
    let config = ClientConfig::new(endpoint);
    let client = if cli.verbose {
        Client::with_telemetry(config, methods, Arc::new(TracingSink))
    } else {
        Client::new(config, methods)
    };

    match cli.command {
        Command::Call {
            namespace,
            method,
            params,
            timeout_secs,
        } => run_call(&client, &namespace, &method, &params, timeout_secs).await,
        Command::Listen {
            namespace,
            method,
            params,
            take,
        } => run_listen(&client, &namespace, &method, &params, take).await,
    }
}

async fn run_call(
    client: &Client,
    namespace: &str,
    method: &str,
    params: &str,
    timeout_secs: u64,
) -> Result<(), CliError> {
    let params: Value = serde_json::from_str(params)?;
    let options = CallOptions {
        deadline: Some(Duration::from_secs(timeout_secs)),
        ..CallOptions::default()
    };

    match client.invoke_with(namespace, method, params, options)? {
        Call::Response(pending) => {
            let result = pending.wait().await?;
            print_json(&result)?;
            Ok(())
        }
        Call::Stream(stream) => {
            // A subscription method reached through `call`; follow one item
            // then tear the stream down.
            eprintln!("note: {namespace}.{method} is a subscription; printing one item");
            let (tx, mut rx) = mpsc::unbounded_channel();
            stream.on_next(move |value| {
                let _ = tx.send(value);
            });
            let item = rx.recv().await.ok_or(CliError::StreamEnded)?;
            stream.cancel();
            print_json(&item)?;
            Ok(())
        }
    }
}

async fn run_listen(
    client: &Client,
    namespace: &str,
    method: &str,
    params: &str,
    take: Option<usize>,
) -> Result<(), CliError> {
    let params: Value = serde_json::from_str(params)?;
    let service = client.service(namespace);
    let stream = service.subscribe(method, params)?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let item_tx = tx.clone();
    stream
        .on_next(move |value| {
            let _ = item_tx.send(StreamEvent::Item(value));
        })
        .on_error(move |value| {
            let _ = tx.send(StreamEvent::Error(value));
        });

    let mut received = 0_usize;
    loop {
        tokio::select! {
            event = rx.recv() => {
                match event.ok_or(CliError::StreamEnded)? {
                    StreamEvent::Item(value) => {
                        print_json(&value)?;
                        received += 1;
                        if take.is_some_and(|limit| received >= limit) {
                            stream.cancel();
                            return Ok(());
                        }
                    }
                    StreamEvent::Error(value) => {
                        eprintln!("stream error: {value}");
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                stream.cancel();
                return Ok(());
            }
        }
    }
}

fn print_json(value: &Value) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}
