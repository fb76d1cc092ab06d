//! fakes3 server: a filesystem-backed S3 emulator.
//!
//! Serves object reads, writes and deletes plus multipart uploads over
//! path-style URLs, persisting everything under a single data directory.
//!
//! # Usage
//!
//! ```text
//! DATA_DIR=/tmp/fakes3 GATEWAY_LISTEN=127.0.0.1:8000 fakes3-server
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GATEWAY_LISTEN` | `0.0.0.0:8000` | Bind address |
//! | `DATA_DIR` | `/data/fakes3` | Root of the objects, parts and scratch trees |
//! | `ADVERTISED_ADDR` | *(unset)* | Base URL used in object locations |
//! | `LOG_LEVEL` | `debug` | Log level filter |
//! | `LOG_OUTPUT` | `stdout` | `stdout`, `stderr`, or a file path |
//! | `SHUTDOWN_TIMEOUT_SECS` | `30` | Connection drain limit on shutdown |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

mod handler;

use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Context, Result};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use fakes3_core::{FakeS3, FakeS3Config};
use fakes3_http::dispatch::S3Handler;
use fakes3_http::service::S3HttpService;

use crate::handler::FakeS3Handler;

/// Server version reported at startup.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(config: &FakeS3Config) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(&config.log_level)
            .with_context(|| format!("invalid log level filter: {}", config.log_level))?
    };

    let writer = log_writer(&config.log_output)?;
    let ansi = config.log_output == "stdout" || config.log_output == "stderr";

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true)
        .init();

    Ok(())
}

/// Resolve `LOG_OUTPUT` to a writer. Anything other than `stdout` or
/// `stderr` is a file path, opened for appending.
fn log_writer(output: &str) -> Result<BoxMakeWriter> {
    let writer = match output {
        "stdout" => BoxMakeWriter::new(std::io::stdout),
        "stderr" => BoxMakeWriter::new(std::io::stderr),
        path => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {path}"))?;
            BoxMakeWriter::new(Mutex::new(file))
        }
    };
    Ok(writer)
}

/// Resolve once SIGINT or SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("received shutdown signal, draining connections");
}

/// Run the accept loop until `shutdown` resolves, then drain in-flight
/// connections for at most `drain_timeout`.
async fn serve<H, F>(
    listener: TcpListener,
    service: S3HttpService<H>,
    shutdown: F,
    drain_timeout: Duration,
) -> Result<()>
where
    H: S3Handler,
    F: std::future::Future<Output = ()>,
{
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let svc = service.clone();
                let conn = http.serve_connection(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => {
                info!("shutting down gracefully");
                break;
            }
        }
    }

    drop(listener);
    tokio::select! {
        () = graceful.shutdown() => {
            info!("all connections drained, exiting");
        }
        () = tokio::time::sleep(drain_timeout) => {
            warn!(
                timeout_secs = drain_timeout.as_secs(),
                "timed out draining connections, exiting"
            );
        }
    }

    Ok(())
}

/// Perform a health check by connecting to the server and requesting the
/// health endpoint.
async fn run_health_check(addr: &str) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("cannot connect to {addr}"))?;

    let (mut reader, mut writer) = stream.into_split();

    let request = format!("GET /_health HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    writer.write_all(request.as_bytes()).await?;
    writer.shutdown().await?;

    let mut response = String::new();
    reader.read_to_string(&mut response).await?;

    if response.contains("200 OK") && response.contains("\"status\":\"running\"") {
        Ok(())
    } else {
        anyhow::bail!("unhealthy response from {addr}")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Handle --health-check flag for Docker HEALTHCHECK.
    if std::env::args().any(|a| a == "--health-check") {
        let config = FakeS3Config::from_env();
        let addr = config.gateway_listen.replace("0.0.0.0", "127.0.0.1");
        let healthy = run_health_check(&addr).await.is_ok();
        std::process::exit(i32::from(!healthy));
    }

    let config = FakeS3Config::from_env();

    init_tracing(&config)?;

    info!(
        gateway_listen = %config.gateway_listen,
        data_dir = %config.data_dir.display(),
        advertised_addr = %config.advertised_addr,
        version = VERSION,
        "starting fakes3 server",
    );

    let provider = FakeS3::new(config.clone());
    provider
        .init()
        .await
        .with_context(|| format!("cannot prepare data directory {}", config.data_dir.display()))?;
    let service = S3HttpService::new(FakeS3Handler(provider));

    let addr: SocketAddr = config
        .gateway_listen
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.gateway_listen))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(%addr, "listening for connections");

    serve(
        listener,
        service,
        shutdown_signal(),
        Duration::from_secs(config.shutdown_timeout_secs),
    )
    .await
}
