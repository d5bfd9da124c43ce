use std::fs::OpenOptions;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use runboard_api::mock::MockCloud;
use runboard_api::Clients;
use runboard_cloud::CloudRun;
use runboard_persist::{gcloud, Config};
use runboard_tui::Settings;

#[derive(Parser, Debug)]
#[command(name = "run", version, about = "Terminal dashboard for Cloud Run")]
struct Cli {
    /// Project to open (default: last used, then the gcloud configuration)
    #[arg(long, env = "RUN_PROJECT")]
    project: Option<String>,

    /// Region to list, or "all"
    #[arg(long, env = "RUN_REGION")]
    region: Option<String>,

    /// Browse a built-in sample project instead of calling Google Cloud
    #[arg(long)]
    demo: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the version and exit
    Version,
}

/// The terminal belongs to the UI, so logs go to `RUN_LOG_FILE` (default: a file in the temp dir).
fn init_tracing() -> Result<PathBuf> {
    let path = std::env::var_os("RUN_LOG_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("runboard.log"));
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening log file {}", path.display()))?;
    let env = std::env::var("RUN_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(path)
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("RUN_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            match metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid RUN_METRICS_ADDR; expected host:port");
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Some(Commands::Version) = cli.command {
        println!("run {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    let log_path = init_tracing()?;

    let rt = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let _rt = rt.enter();
    init_metrics();

    let gcloud = match gcloud::discover() {
        Ok(g) => Some(g),
        Err(e) => {
            warn!(error = %e, "gcloud configuration not found");
            None
        }
    };
    let cfg = Config::load().unwrap_or_else(|e| {
        warn!(error = %e, "config: load failed; using defaults");
        Config::default()
    });
    let info = runboard_persist::resolve_info(gcloud.as_ref(), &cfg, cli.project.as_deref(), cli.region.as_deref());

    let clients = if cli.demo {
        Clients::from_backend(Arc::new(MockCloud::demo()))
    } else {
        Clients::from_backend(Arc::new(CloudRun::from_env()?))
    };
    let mut settings = Settings::from_env();
    if cli.demo {
        settings.config_path = None;
    }
    info!(log = %log_path.display(), demo = cli.demo, "starting");

    runboard_tui::run(clients, info, settings)
}
