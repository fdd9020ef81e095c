use anyhow::Context;
use axum::{response::IntoResponse, routing::get, Router};
use clap::{Parser, Subcommand};
use prometheus::{Encoder, TextEncoder};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use fpgamon::fme::ioctl::{self, FmeInfo};
use fpgamon::{
    CollectorConfig, DeviceConfig, DeviceSource, FmeDevice, FmeMetricExporter, MetricCollector,
    ServeConfig,
};

#[derive(Parser, Debug)]
#[command(name = "fpgamon")]
#[command(about = "FPGA Management Engine attributes, counters and errors")]
struct Args {
    #[arg(
        long,
        global = true,
        conflicts_with = "simulate",
        help = "PCI BAR resource file of the FME (e.g. /sys/bus/pci/devices/0000:5e:00.0/resource0)"
    )]
    resource: Option<PathBuf>,

    #[arg(long, global = true, help = "Use the built-in simulated FME")]
    simulate: bool,

    #[arg(
        short,
        long,
        global = true,
        help = "Enable verbose logging (shows every register read/write)"
    )]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List attribute paths, optionally under a prefix
    List { prefix: Option<String> },
    /// Read one attribute
    Show { attr: String },
    /// Write one attribute
    Store { attr: String, value: String },
    /// Print device identity and interrupt capability
    Info,
    /// Export counters and errors on /metrics
    Serve {
        #[arg(long, default_value = "0.0.0.0:8080", help = "Address of the metrics endpoint")]
        listen: SocketAddr,

        #[arg(long, default_value_t = 1, help = "Collection interval in seconds")]
        interval: u64,
    },
}

struct AppState {
    fme_exporter: Option<Arc<FmeMetricExporter>>,
}

async fn metrics_handler(
    axum::extract::State(state): axum::extract::State<Arc<AppState>>,
) -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    fpgamon::gather_metrics!(buffer, encoder, state.fme_exporter, "FME");

    let content_type = encoder.format_type().to_string();
    (
        [("Content-Type", content_type)],
        String::from_utf8(buffer).unwrap_or_default(),
    )
}

fn device_config(args: &Args) -> anyhow::Result<DeviceConfig> {
    let source = match (&args.resource, args.simulate) {
        (Some(path), _) => DeviceSource::Resource(path.clone()),
        (None, true) => DeviceSource::Simulated,
        (None, false) => anyhow::bail!("either --resource <path> or --simulate is required"),
    };
    Ok(DeviceConfig::new(source))
}

fn print_info(device: &FmeDevice) -> anyhow::Result<()> {
    let api = device.ioctl(ioctl::FPGA_GET_API_VERSION, &mut [])?;

    let mut arg = [0u8; FmeInfo::MINSZ];
    ioctl::put_u32(&mut arg, FmeInfo::MINSZ as u32)?;
    device
        .ioctl(ioctl::FPGA_FME_GET_INFO, &mut arg)
        .context("FPGA_FME_GET_INFO failed")?;
    let capability = ioctl::get_u32(&arg[8..])?;

    let mut irqs = [0u8; 4];
    device.ioctl(ioctl::FPGA_FME_ERR_GET_IRQ_NUM, &mut irqs)?;

    println!("api version:      {api}");
    println!("capability:       {capability:#010x}");
    for attr in ["ports_num", "socket_id", "bitstream_id", "bitstream_metadata"] {
        println!("{:<18}{}", format!("{attr}:"), device.show(attr)?.trim_end());
    }
    println!("error interrupts: {}", ioctl::get_u32(&irqs)?);
    Ok(())
}

async fn shutdown_signal(cancel_token: CancellationToken) {
    tracing::info!("Installing signal handlers...");

    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => tracing::info!("Ctrl+C received!"),
            Err(e) => {
                tracing::error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                tracing::info!("SIGTERM received!");
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::warn!("Shutdown triggered by Ctrl+C");
        },
        _ = terminate => {
            tracing::warn!("Shutdown triggered by SIGTERM");
        },
    }

    cancel_token.cancel();
    tracing::warn!("Cancellation token activated");
}

async fn serve(device: FmeDevice, config: ServeConfig) -> anyhow::Result<()> {
    let device = Arc::new(device);
    let cancel_token = CancellationToken::new();

    let collector = MetricCollector::new(
        Arc::clone(&device),
        CollectorConfig {
            interval: config.interval,
        },
    );
    let app_state = Arc::new(AppState {
        fme_exporter: collector.fme_exporter(),
    });
    let collection_handle = collector.start(cancel_token.clone());

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(app_state);

    tracing::warn!("Starting HTTP server on {}", config.listen);
    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel_token))
        .await?;

    tracing::info!("Server shutdown complete, waiting for collection loop to finish...");
    if let Err(e) = collection_handle.await {
        tracing::error!("Collection loop failed: {}", e);
    }

    tracing::info!("All tasks completed, exiting");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Setup logging based on verbose flag
    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt().with_max_level(log_level).init();

    let device = device_config(&args)?
        .open()
        .context("failed to probe the FME")?;

    match args.command {
        Command::List { prefix } => {
            for path in device.list(prefix.as_deref().unwrap_or("")) {
                println!("{path}");
            }
        }
        Command::Show { attr } => {
            print!("{}", device.show(&attr).with_context(|| format!("show {attr}"))?);
        }
        Command::Store { attr, value } => {
            device
                .store(&attr, &value)
                .with_context(|| format!("store {value:?} to {attr}"))?;
        }
        Command::Info => print_info(&device)?,
        Command::Serve { listen, interval } => {
            let config = ServeConfig {
                listen,
                interval: Duration::from_secs(interval.max(1)),
            };
            serve(device, config).await?;
        }
    }

    Ok(())
}
