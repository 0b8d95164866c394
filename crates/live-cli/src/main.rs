mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use live_core::registry::parse_name_list;
use live_core::{
    add_channels, read_snapshot, AddOutcome, ChannelRegistry, DiagnosticArchive, HelixProbe,
    NotificationSink, Poller, StatusProbe, WebhookSink,
};

use crate::config::{AppConfig, Purpose};

/// Watch Twitch channels and post to a webhook when they go live or offline.
#[derive(Parser)]
#[command(name = "live-alert", version, about)]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true, env = "LIVE_ALERT_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll every channel until interrupted.
    Run {
        /// Also serve the HTTP API on this address (e.g. 0.0.0.0:8000). Overrides config file.
        #[arg(short, long)]
        listen: Option<SocketAddr>,

        /// Run a single sweep and exit.
        #[arg(long, default_value_t = false)]
        once: bool,
    },
    /// Add channels to the snapshot, seeding each with its current status.
    ///
    /// Run this while the poller is stopped: a running poller overwrites the
    /// snapshot after its next sweep.
    Add {
        /// Channel name (not URL). May be repeated.
        #[arg(short = 'n', long = "channel")]
        channels: Vec<String>,

        /// File with one channel name per line.
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
    /// Print the persisted channel snapshot.
    Status,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let purpose = match cli.command {
        Commands::Run { .. } => Purpose::Run,
        Commands::Add { .. } => Purpose::Add,
        Commands::Status => Purpose::Status,
    };
    let default_level = if purpose == Purpose::Run { "info" } else { "warn" };

    let app_config = match AppConfig::load(cli.config.as_deref()) {
        Ok(c) => {
            init_tracing(&c.server.log_format, default_level);
            if let Some(path) = &cli.config {
                tracing::info!(path = %path.display(), "Loaded config file");
            }
            c
        }
        Err(e) => {
            init_tracing("pretty", default_level);
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app_config.validate(purpose) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }

    match cli.command {
        Commands::Run { listen, once } => run_poll(app_config, listen, once).await,
        Commands::Add { channels, file } => run_add(app_config, channels, file).await,
        Commands::Status => run_status(app_config),
    }
}

fn build_probe(
    app_config: &AppConfig,
    client: reqwest::Client,
) -> Result<HelixProbe, config::ConfigError> {
    let retry = app_config.poll_config().retry_policy();
    let mut probe = HelixProbe::new(client, app_config.credentials()?, retry)
        .with_api_base(app_config.twitch.api_base.clone());
    if let Some(dir) = &app_config.twitch.archive_dir {
        probe = probe.with_archive(DiagnosticArchive::new(dir));
    }
    Ok(probe)
}

async fn run_poll(app_config: AppConfig, listen_override: Option<SocketAddr>, once: bool) {
    let poll_config = app_config.poll_config();

    let client = match HelixProbe::build_client(poll_config.request_timeout) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to build HTTP client");
            std::process::exit(1);
        }
    };
    let (probe, webhook) = match (
        build_probe(&app_config, client.clone()),
        app_config.webhook_config(),
    ) {
        (Ok(p), Ok(w)) => (p, w),
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!("{}", e);
            std::process::exit(1);
        }
    };

    let sink: Arc<dyn NotificationSink> = Arc::new(WebhookSink::new(webhook, client));
    let mut poller = Poller::open(poll_config.clone(), Arc::new(probe), Arc::clone(&sink));
    if poller.registry().is_empty() {
        tracing::warn!("No channels to watch, add some with `live-alert add`");
    }

    if once {
        let report = poller.sweep().await;
        if !report.persisted {
            std::process::exit(1);
        }
        return;
    }

    let shutdown = CancellationToken::new();
    {
        let token = shutdown.clone();
        tokio::spawn(async move {
            live_api::shutdown_signal().await;
            tracing::info!("Shutdown signal received, stopping poller...");
            token.cancel();
        });
    }

    let server_handle = listen_override.or(app_config.server.listen).map(|listen| {
        let state = live_api::state::AppState::new(poll_config.snapshot_path.clone())
            .with_sink(Arc::clone(&sink));
        let token = shutdown.clone();
        tracing::info!(%listen, "Starting live-alert API server");
        tokio::spawn(async move {
            let stopped = token.clone();
            let result =
                live_api::serve_with_state(listen, state, async move { stopped.cancelled().await })
                    .await;
            if let Err(e) = &result {
                tracing::error!(error = %e, "Server failed");
                token.cancel();
            }
            result.is_ok()
        })
    });

    let registry = poller.run(shutdown.clone()).await;
    tracing::info!(
        channels = registry.len(),
        live = registry.live_count(),
        "Final channel states saved"
    );

    let mut server_ok = true;
    if let Some(handle) = server_handle {
        shutdown.cancel();
        match tokio::time::timeout(Duration::from_secs(5), handle).await {
            Ok(Ok(ok)) => server_ok = ok,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "API server task panicked");
                server_ok = false;
            }
            Err(_) => tracing::warn!("API server did not shut down in time, aborting"),
        }
    }

    tracing::info!("Shutdown complete");
    if !server_ok {
        std::process::exit(1);
    }
}

async fn run_add(app_config: AppConfig, mut names: Vec<String>, file: Option<PathBuf>) {
    if let Some(path) = &file {
        match std::fs::read_to_string(path) {
            Ok(content) => names.extend(parse_name_list(&content)),
            Err(e) => {
                eprintln!(
                    "{} failed to read {}: {}",
                    style("error:").red().bold(),
                    path.display(),
                    e
                );
                std::process::exit(1);
            }
        }
    }
    if names.is_empty() {
        eprintln!(
            "{} pass at least one --channel or a --file",
            style("error:").red().bold()
        );
        std::process::exit(2);
    }

    let poll_config = app_config.poll_config();
    let snapshot = &poll_config.snapshot_path;

    // A snapshot that cannot be parsed is left alone rather than replaced
    // with only the new channels.
    let seed = poll_config.seed_path.as_deref();
    let mut registry = match ChannelRegistry::open_strict(snapshot, seed) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            std::process::exit(1);
        }
    };

    let probe = match HelixProbe::build_client(poll_config.request_timeout)
        .map_err(|e| e.to_string())
        .and_then(|client| build_probe(&app_config, client).map_err(|e| e.to_string()))
    {
        Ok(p) => p,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            std::process::exit(1);
        }
    };

    let spinner = ProgressBar::new_spinner();
    if let Ok(s) = ProgressStyle::with_template("{spinner} {msg}") {
        spinner.set_style(s);
    }
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(format!("Checking {} channel(s)...", names.len()));

    let outcomes = add_channels(&mut registry, &names, &probe as &dyn StatusProbe).await;
    spinner.finish_and_clear();

    for outcome in &outcomes {
        match outcome {
            AddOutcome::Added { name, live } => println!(
                "  {} {} {}",
                style("added").green().bold(),
                style(name).bold(),
                if *live {
                    style("(live)").green()
                } else {
                    style("(offline)").dim()
                }
            ),
            AddOutcome::AlreadyPresent { name } => println!(
                "  {} {} is already in the list",
                style("skip ").yellow(),
                name
            ),
            AddOutcome::Rejected { name } => println!(
                "  {} {:?} is not a channel name",
                style("skip ").yellow(),
                name
            ),
        }
    }

    let added = outcomes
        .iter()
        .filter(|o| matches!(o, AddOutcome::Added { .. }))
        .count();
    if added == 0 {
        println!("{}", style("Nothing to save.").dim());
        return;
    }

    if let Err(e) = registry.save_to(snapshot) {
        eprintln!("{} {}", style("error:").red().bold(), e);
        std::process::exit(1);
    }
    println!(
        "Saved {} channel(s) to {}",
        registry.len(),
        style(snapshot.display()).bold()
    );
}

fn run_status(app_config: AppConfig) {
    let snapshot = app_config.storage.snapshot_path;
    let channels = match read_snapshot(&snapshot) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} {}", style("error:").red().bold(), e);
            std::process::exit(1);
        }
    };

    println!(
        "{} {}",
        style("live-alert").bold(),
        style(env!("CARGO_PKG_VERSION")).dim()
    );
    println!("  {} {}", style("snapshot:").dim(), snapshot.display());
    println!();

    if channels.is_empty() {
        println!("  {}", style("No channels yet.").dim());
        return;
    }

    let width = channels.iter().map(|c| c.name().len()).max().unwrap_or(0);
    for c in &channels {
        let badge = if c.is_live() {
            style("LIVE").green().bold()
        } else {
            style("offline").dim()
        };
        println!("  {:<width$}  {}", c.name(), badge, width = width);
    }

    let live = channels.iter().filter(|c| c.is_live()).count();
    println!();
    println!("  {} of {} channels live", style(live).bold(), channels.len());
}

fn init_tracing(log_format: &str, default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match log_format {
        "json" => {
            fmt()
                .with_env_filter(filter)
                .json()
                .init();
        }
        _ => {
            fmt()
                .with_env_filter(filter)
                .init();
        }
    }
}
