//! anbd-server - HTTP/WebSocket front end for the detection pipeline.
//!
//! Usage:
//!   anbd-server --port 5000
//!   anbd-server --autostart --seed 42
//!   ANBD_PORT=8080 anbd-server

use anbd::api::{self, AppState};
use anbd::{
    ChannelPublisher, DecisionSource, LiveDecisions, MemoryStore, Pipeline, PipelineConfig,
    SeededDecisions,
};
use clap::Parser;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "anbd-server")]
#[command(about = "Anomaly network behavior detection demo pipeline")]
struct Cli {
    /// Host to bind to
    #[arg(long, env = "ANBD_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "ANBD_PORT", default_value = "5000")]
    port: u16,

    /// Probability a generated flow is marked anomalous
    #[arg(long, env = "ANBD_ANOMALY_PROBABILITY", default_value = "0.25")]
    anomaly_probability: f64,

    /// Seed the randomness source for a replayable demo run
    #[arg(long, env = "ANBD_SEED")]
    seed: Option<u64>,

    /// Start the generation loop immediately
    #[arg(long, env = "ANBD_AUTOSTART")]
    autostart: bool,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config = PipelineConfig {
        anomaly_probability: cli.anomaly_probability.clamp(0.0, 1.0),
        ..PipelineConfig::from_env()
    };

    let decisions: Arc<dyn DecisionSource> = match cli.seed {
        Some(seed) => {
            info!(seed, "using seeded decision source");
            Arc::new(SeededDecisions::new(seed))
        }
        None => Arc::new(LiveDecisions),
    };

    let publisher = Arc::new(ChannelPublisher::new(1024));
    let pipeline = Pipeline::new(
        Arc::new(MemoryStore::new()),
        publisher.clone(),
        decisions,
        config,
    );

    if cli.autostart {
        if let Err(err) = pipeline.start() {
            // Only possible if something already started it, which nothing has.
            info!(error = %err, "autostart skipped");
        }
    }

    let app = api::router(AppState {
        pipeline: pipeline.clone(),
        publisher,
    });

    let addr = format!("{}:{}", cli.host, cli.port);
    let listener = TcpListener::bind(&addr).await.expect("failed to bind port");
    info!(%addr, "anbd-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::signal::ctrl_c()
                .await
                .expect("failed to install CTRL+C handler");
            info!("shutting down");
        })
        .await
        .expect("server crash");

    // Let the generation loop finish its batch before the process exits.
    if pipeline.registry().is_running() {
        let _ = pipeline.stop().await;
    }
    info!("goodbye");
}
