//! Example server: echoes each request back as JSON.

use std::path::PathBuf;

use clap::Parser;
use http::{header, HeaderValue, StatusCode};
use serde::Serialize;

use http_pipeline::config::{load_config, ServerConfig};
use http_pipeline::lifecycle::{signals, Shutdown};
use http_pipeline::observability::{logging, metrics};
use http_pipeline::{BoxError, ConnectionHandle, HttpServer, Listener, Request, Responder, Response};

#[derive(Parser)]
#[command(name = "http-pipeline")]
#[command(about = "HTTP/1.1 echo server built on the connection pipeline", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Serialize)]
struct Echo<'a> {
    connection: String,
    method: &'a str,
    uri: String,
    version: String,
    headers: Vec<(&'a str, String)>,
    body: String,
}

struct EchoResponder;

impl Responder for EchoResponder {
    async fn respond<'a>(
        &'a self,
        mut request: Request<'a>,
        conn: &'a ConnectionHandle,
    ) -> Result<Response, BoxError> {
        let body = request.body().to_bytes().await?;

        let echo = Echo {
            connection: conn.id().to_string(),
            method: request.method().as_str(),
            uri: request.uri().to_string(),
            version: format!("{:?}", request.version()),
            headers: request
                .headers()
                .iter()
                .map(|(name, value)| {
                    (name.as_str(), String::from_utf8_lossy(value.as_bytes()).into_owned())
                })
                .collect(),
            body: String::from_utf8_lossy(&body).into_owned(),
        };

        Ok(Response::full(StatusCode::OK, serde_json::to_vec(&echo)?).with_header(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        ))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };

    logging::init_tracing(&config.observability)?;

    tracing::info!("http-pipeline v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        max_connections = config.listener.max_connections,
        grace_secs = config.shutdown.grace_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        metrics::init_metrics(config.observability.metrics_address.parse()?)?;
    }

    let listener = Listener::bind(&config.listener).await?;
    let server = HttpServer::new(&config, EchoResponder);
    let shutdown = Shutdown::new();

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        match signals::wait_for_signal().await {
            Ok(signal) => tracing::info!(signal, "Shutdown signal received"),
            Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signals"),
        }
        trigger.trigger();
    });

    server.run(listener, &shutdown).await;

    tracing::info!("Shutdown complete");
    Ok(())
}
