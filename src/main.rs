//! Sand HTTP server.
//!
//! Runs a single [`HttpGrain`] with the default collaborators: static files
//! from `static_file_directory`, body parsing, optional sessions and views,
//! and a 404 for everything else. Stops accepting on SIGINT/SIGTERM, then
//! waits for in-flight requests to finish and exits; idle keep-alive
//! connections do not hold it open. A second signal force-closes everything.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use sand_http::config::{load_config, HttpConfig};
use sand_http::lifecycle::signals::shutdown_signal;
use sand_http::middleware::TracingProfiler;
use sand_http::observability::{init_logging, init_metrics};
use sand_http::HttpGrain;

#[derive(Parser)]
#[command(name = "sand-http")]
#[command(about = "Serve a Sand HTTP grain", long_about = None, version)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Port to listen on (overrides the configuration file)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match (&cli.config, cli.port) {
        (Some(path), _) => load_config(path)?,
        (None, Some(port)) => HttpConfig::new(port),
        (None, None) => return Err("a port is required: pass --port or --config".into()),
    };
    if let Some(port) = cli.port {
        config.port = port;
    }

    init_logging(&config.observability)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "sand-http starting");

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        init_metrics(addr)?;
    }

    let mut builder = HttpGrain::builder(config.clone());
    if config.profiler {
        builder = builder.profiler(Arc::new(TracingProfiler));
    }
    let mut grain = builder.build();

    grain.init()?;
    grain.start().await?;

    shutdown_signal().await?;
    grain.shutdown().await?;

    let in_flight = grain.in_flight_requests();
    if in_flight > 0 {
        tracing::info!(in_flight_requests = in_flight, "Waiting for in-flight requests to finish");
        tokio::select! {
            _ = grain.connections().wait_drained() => {}
            result = shutdown_signal() => {
                result?;
                grain.kill();
            }
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
