// procrate-exporter - per-role process CPU rate monitor
// Samples role processes, computes CPU rates and serves them as JSON and Prometheus metrics

use axum::{routing::get, Router};
use clap::Parser;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::{
    net::TcpListener,
    signal,
    sync::{mpsc, watch},
};
use tracing::{debug, error, info, level_filters::LevelFilter, warn};

use procrate_exporter::config::{
    load_config, validate_effective_config, Config, DEFAULT_BIND_ADDR, DEFAULT_PORT,
};
use procrate_exporter::health_stats::HealthStats;
use procrate_exporter::monitor::Monitor;
use procrate_exporter::process::{ProcScanner, ProcessSource};
use procrate_exporter::rate::RateComputer;
use procrate_exporter::replay::{load_test_data_from_file, ReplaySource};
use procrate_exporter::scheduler::{FlushTarget, ReportScheduler};
use procrate_exporter::sink::{FileSink, ReportSink, StdoutSink};
use procrate_exporter::store::ReportStore;

mod cli;
mod commands;
mod handlers;
mod state;

use cli::{Args, Commands, ConfigFormat};
use commands::{
    command_check, command_config, command_generate_testdata, command_roles, command_test,
};
use handlers::{
    doc_handler, health_handler, metrics_handler, report_handler, role_report_handler,
};
use state::AppState;

/// Merges CLI overrides into the loaded configuration (CLI > file > defaults)
fn resolve_config(args: &Args) -> Result<Config, Box<dyn std::error::Error>> {
    let mut config = if args.no_config {
        Config::default()
    } else {
        load_config(args.config.as_deref())?
    };

    if let Some(bind_ip) = args.bind {
        config.bind = Some(bind_ip.to_string());
    }
    if let Some(cli_port) = args.port {
        config.port = Some(cli_port);
    }
    if let Some(level) = &args.log_level {
        config.log_level = Some(level.as_config_str().to_string());
    }

    // Sampling and reporting
    if args.sample_interval.is_some() {
        config.sample_interval_secs = args.sample_interval;
    }
    if args.report_interval.is_some() {
        config.report_interval_secs = args.report_interval;
    }
    if args.window_size.is_some() {
        config.window_size = args.window_size;
    }
    if args.parallelism.is_some() {
        config.parallelism = args.parallelism;
    }

    // Output
    if let Some(format) = &args.output_format {
        config.output_format = Some(format.as_config_str().to_string());
    }
    if args.output_file.is_some() {
        config.output_file = args.output_file.clone();
    }
    if args.metric_prefix.is_some() {
        config.metric_prefix = args.metric_prefix.clone();
    }

    // Feature flags
    if args.disable_http {
        config.enable_http = Some(false);
    }
    if args.disable_health {
        config.enable_health = Some(false);
    }
    if args.enable_tls {
        config.enable_tls = Some(true);
    }
    if args.tls_cert.is_some() {
        config.tls_cert_path = args.tls_cert.clone();
    }
    if args.tls_key.is_some() {
        config.tls_key_path = args.tls_key.clone();
    }

    Ok(config)
}

/// Shows configuration in requested format
fn show_config(config: &Config, format: ConfigFormat) -> Result<(), Box<dyn std::error::Error>> {
    let output = commands::config::render_config(config, format, false)?;
    println!("{output}");
    Ok(())
}

/// Initializes tracing logging subsystem with configured log level
fn setup_logging(config: &Config) {
    let level = match config.log_level.as_deref().unwrap_or("info") {
        "off" => LevelFilter::OFF,
        "error" => LevelFilter::ERROR,
        "warn" => LevelFilter::WARN,
        "debug" => LevelFilter::DEBUG,
        "trace" => LevelFilter::TRACE,
        _ => LevelFilter::INFO,
    };

    // Logs go to stderr; stdout carries the periodic report snapshots.
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return;
    }

    info!("Logging initialized with level: {}", level);
}

/// Builds the scheduler's flush target, `None` when output is disabled.
fn flush_target(config: &Config) -> Option<FlushTarget> {
    let format = config.output_format()?;
    let sink: Box<dyn ReportSink> = match &config.output_file {
        Some(path) => {
            info!("Writing {:?} snapshots to {}", format, path.display());
            Box::new(FileSink::new(path.clone()))
        }
        None => Box::new(StdoutSink),
    };
    Some(FlushTarget {
        format,
        metric_prefix: config.metric_prefix().to_string(),
        sink,
    })
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}

async fn cancelled(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Serves the HTTP endpoints until cancellation.
async fn serve_http(
    config: &Config,
    state: Arc<AppState>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error>> {
    let bind_ip_str = config.bind.as_deref().unwrap_or(DEFAULT_BIND_ADDR);
    let port = config.port.unwrap_or(DEFAULT_PORT);
    let addr: SocketAddr = format!("{}:{}", bind_ip_str, port).parse()?;

    let mut app = Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/report", get(report_handler))
        .route("/report/{role}", get(role_report_handler))
        .route("/doc", get(doc_handler));

    // Conditionally add health endpoint
    if config.enable_health.unwrap_or(true) {
        app = app.route("/health", get(health_handler));
    }

    let app = app.with_state(state);

    if config.enable_tls.unwrap_or(false) {
        let (cert, key) = match (&config.tls_cert_path, &config.tls_key_path) {
            (Some(c), Some(k)) => (c.clone(), k.clone()),
            _ => return Err("enable_tls requires tls_cert_path and tls_key_path".into()),
        };
        let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert, key).await?;

        let handle = axum_server::Handle::new();
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            cancelled(shutdown).await;
            shutdown_handle.graceful_shutdown(Some(Duration::from_secs(5)));
        });

        info!("procrate-exporter listening on https://{}:{}", bind_ip_str, port);
        axum_server::bind_rustls(addr, tls)
            .handle(handle)
            .serve(app.into_make_service())
            .await?;
    } else {
        let listener = TcpListener::bind(addr).await?;
        info!("procrate-exporter listening on http://{}:{}", bind_ip_str, port);
        axum::serve(listener, app)
            .with_graceful_shutdown(cancelled(shutdown))
            .await?;
    }

    Ok(())
}

/// -------------------------------------------------------------------
/// MAIN APPLICATION ENTRY POINT
/// -------------------------------------------------------------------
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Early config resolution for show/check modes
    if args.show_config || args.check_config {
        let config = resolve_config(&args)?;

        if args.check_config {
            if let Err(e) = validate_effective_config(&config) {
                eprintln!("❌ Configuration invalid: {}", e);
                std::process::exit(1);
            }
            println!("✅ Configuration is valid");
            return Ok(());
        }

        return show_config(&config, args.config_format.clone());
    }

    // Handle subcommands
    if let Some(command) = &args.command {
        let config = resolve_config(&args)?;
        if let Err(e) = validate_effective_config(&config) {
            eprintln!("❌ Configuration invalid: {}", e);
            std::process::exit(1);
        }
        setup_logging(&config);

        return match command {
            Commands::Check { proc, roles, all } => command_check(*proc, *roles, *all, &config),
            Commands::Config {
                output,
                format,
                commented,
            } => command_config(output.clone(), format.clone(), *commented),
            Commands::Test {
                iterations,
                interval,
                format,
            } => command_test(
                *iterations,
                *interval,
                format.clone(),
                &config,
                args.test_data_file.as_deref(),
            ),
            Commands::Roles { verbose } => command_roles(*verbose, &config),
            Commands::GenerateTestdata {
                output,
                frames,
                interval,
            } => command_generate_testdata(output.clone(), *frames, *interval, &config),
        };
    }

    // Load configuration for main exporter mode
    let config = resolve_config(&args)?;
    if let Err(e) = validate_effective_config(&config) {
        eprintln!("❌ Configuration invalid: {}", e);
        std::process::exit(1);
    }

    setup_logging(&config);
    info!(
        "Starting procrate-exporter {} ({})",
        env!("CARGO_PKG_VERSION"),
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown")
    );

    // Configure parallel /proc scanning thread pool if specified
    if let Some(threads) = config.parallelism {
        if threads > 0 {
            rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build_global()
                .unwrap_or_else(|e| error!("Failed to set rayon thread pool: {}", e));
            debug!("Rayon thread pool configured with {} threads", threads);
        }
    }

    // Process source: recorded frames or live /proc
    let source: Arc<dyn ProcessSource> = match &args.test_data_file {
        Some(path) => {
            let data = load_test_data_from_file(path)?;
            info!("Replaying {} frames from {}", data.frames.len(), path.display());
            Arc::new(ReplaySource::new(data))
        }
        None => Arc::new(ProcScanner::new(config.role_rules())),
    };

    let store = Arc::new(ReportStore::new());
    let health_stats = Arc::new(HealthStats::new());
    let config = Arc::new(config);

    let (report_tx, report_rx) = mpsc::channel(config.channel_capacity());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let monitor = Monitor::new(
        source,
        RateComputer::new(config.window_size(), config.buckets()),
        config.role_names(),
        config.sample_interval(),
        health_stats.clone(),
    );
    let scheduler = ReportScheduler::new(
        store.clone(),
        health_stats.clone(),
        config.report_interval(),
        flush_target(&config),
    );

    let monitor_task = tokio::spawn(monitor.run(report_tx, shutdown_rx.clone()));
    let scheduler_task = tokio::spawn(scheduler.run(report_rx, shutdown_rx.clone()));

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    if config.enable_http.unwrap_or(true) {
        let state = Arc::new(AppState::new(
            config.clone(),
            store.clone(),
            health_stats.clone(),
        )?);
        if let Err(e) = serve_http(&config, state, shutdown_rx.clone()).await {
            error!("Server error: {}", e);
            return Err(e);
        }
    } else {
        info!("HTTP server disabled");
        cancelled(shutdown_rx.clone()).await;
    }

    if let Err(e) = monitor_task.await {
        warn!("Monitor task ended abnormally: {}", e);
    }
    match scheduler_task.await {
        Ok(exit) => debug!("Reporting scheduler stopped: {:?}", exit),
        Err(e) => warn!("Reporting scheduler ended abnormally: {}", e),
    }

    info!("procrate-exporter stopped gracefully");
    Ok(())
}
