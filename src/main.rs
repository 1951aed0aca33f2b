//! Reference service for the request-handling decorators.
//!
//! ```text
//!  client ──▶ HttpServer (timeout, graceful shutdown)
//!               └─ RequestBodyGzipHandler
//!                    └─ TransactionAwareRequestLoggingHandler ──▶ stdout (JSON)
//!                         └─ HttpMetricsHandler ──▶ Prometheus /metrics
//!                              └─ ServiceHandler(axum Router)
//! ```
//!
//! Routes:
//! - `GET /__health`: liveness
//! - `POST|PUT /echo`: returns the (decoded) request body
//! - `GET /content/{id}`: sample content lookup, logged with its UUID
//! - `GET /outbound-headers`: headers an outbound call would carry

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Request, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::{Layer, ServiceExt};

use http_handlers::config::{load_config, HandlersConfig};
use http_handlers::handlers::{
    HttpMetricsHandler, RequestBodyGzipHandler, TransactionAwareRequestLoggingHandler,
};
use http_handlers::http::{HttpServer, ServiceClientLayer, ServiceHandler, TransactionId};
use http_handlers::lifecycle::shutdown_signal;
use http_handlers::observability::{init_tracing, install_prometheus, GlobalRecorder, Logger};
use http_handlers::security::{DenyList, RedactionPolicy};

#[derive(Parser)]
#[command(name = "http-handlers")]
#[command(about = "Reference service running the request-handling decorators", long_about = None)]
struct Cli {
    /// TOML configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => HandlersConfig::default(),
    };

    init_tracing(&config.logging)?;

    tracing::info!(
        service_name = %config.service_name,
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.listener.request_timeout_secs,
        "Configuration loaded"
    );

    if config.metrics.enabled {
        install_prometheus(config.metrics.address.parse()?)?;
    }

    let access_level = tracing::Level::from_str(&config.logging.access_log_level)?;
    let logger = Logger::new(config.service_name.clone(), access_level);

    let deny_list = if config.redaction.cdn_headers {
        DenyList::with_cdn_headers()
    } else {
        DenyList::basic()
    };
    let policy = RedactionPolicy::new(deny_list).with_denied_headers(&config.redaction.deny_headers);

    let client = ServiceClientLayer::new(
        &config.client.service_code,
        &config.client.version,
        &config.client.runbook,
    )?;

    let app = ServiceHandler::new(router(client));
    let chain = RequestBodyGzipHandler::new(
        TransactionAwareRequestLoggingHandler::new(logger, HttpMetricsHandler::new(GlobalRecorder, app))
            .with_redaction_policy(policy),
    );

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    HttpServer::new(chain)
        .with_request_timeout(Duration::from_secs(config.listener.request_timeout_secs))
        .run(listener, shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn router(client: ServiceClientLayer) -> Router {
    Router::new()
        .route("/__health", get(|| async { "OK" }))
        .route("/echo", post(echo).put(echo))
        .route("/content/{id}", get(content))
        .route("/outbound-headers", get(outbound_headers))
        .with_state(client)
}

async fn echo(body: Bytes) -> Bytes {
    body
}

async fn content(Path(id): Path<String>, req: Request) -> Json<Value> {
    let tid = req
        .extensions()
        .get::<TransactionId>()
        .map(|tid| tid.to_string());
    Json(json!({ "id": id, "transaction_id": tid }))
}

async fn outbound_headers(
    State(client): State<ServiceClientLayer>,
    req: Request,
) -> Json<BTreeMap<String, String>> {
    let mut outbound = axum::http::Request::new(());
    if let Some(tid) = req.extensions().get::<TransactionId>() {
        outbound.extensions_mut().insert(tid.clone());
    }

    let inspect = client.layer(tower::service_fn(|req: axum::http::Request<()>| async move {
        let headers = req
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect::<BTreeMap<_, _>>();
        Ok::<_, Infallible>(headers)
    }));

    match inspect.oneshot(outbound).await {
        Ok(headers) => Json(headers),
        Err(never) => match never {},
    }
}
