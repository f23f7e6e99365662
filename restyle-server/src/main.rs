use std::process;
use std::sync::Arc;

use anyhow::Context;
use restyle::{Config, RestyleService};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const USAGE: &str = "Usage: restyle-server [--host <addr>] [--port <port>]";

#[derive(Debug, Default, PartialEq)]
struct Args {
    host: Option<String>,
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let args = match parse_args(&args) {
        Ok(v) => v,
        Err(msg) => {
            if !msg.is_empty() {
                eprintln!("error: {msg}");
                eprintln!();
            }
            eprintln!("{USAGE}");
            eprintln!();
            eprintln!("Options:");
            eprintln!("  --host <addr>    Bind address [env: HOST, default: 0.0.0.0]");
            eprintln!("  --port <port>    Bind port [env: PORT, default: 5000]");
            process::exit(2);
        }
    };

    // .env is optional
    let _ = dotenvy::dotenv();
    init_tracing();

    if let Err(e) = run(args).await {
        tracing::error!(error = %format!("{e:#}"), "restyle-server failed");
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = Config::from_env().context("invalid configuration")?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }

    tracing::info!(
        version = restyle::RESTYLE_VERSION,
        model = %config.predictor.model_version,
        poll_interval_ms = config.poll.interval.as_millis() as u64,
        max_attempts = config.poll.max_attempts(),
        "Configuration loaded"
    );

    let service = Arc::new(RestyleService::from_config(&config)?);
    restyle::transport::serve(config.server, service).await
}

fn parse_args(args: &[String]) -> Result<Args, String> {
    let mut parsed = Args::default();

    let mut i = 1; // skip argv[0]
    while i < args.len() {
        match args[i].as_str() {
            "--host" => {
                i += 1;
                parsed.host = Some(args.get(i).ok_or("--host requires a value")?.clone());
            }
            "--port" => {
                i += 1;
                let value = args.get(i).ok_or("--port requires a value")?;
                parsed.port = Some(
                    value
                        .parse()
                        .map_err(|_| format!("invalid port '{value}'"))?,
                );
            }
            "--help" | "-h" => return Err(String::new()),
            arg => return Err(format!("unexpected argument: {arg}")),
        }
        i += 1;
    }

    Ok(parsed)
}

/// Initialize tracing with RESTYLE_LOG and LOG_FORMAT support.
fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let base_level = match std::env::var("RESTYLE_LOG").as_deref() {
            Ok("debug") => "debug",
            Ok("warn") | Ok("warning") => "warn",
            Ok("error") => "error",
            _ => "info",
        };

        EnvFilter::new(format!(
            "restyle={level},restyle_server={level},tower_http={level}",
            level = base_level
        ))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}
