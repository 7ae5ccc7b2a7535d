use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cli::{AcquireArgs, PackArgs};
use mediafetch::config::Config;
use mediafetch::error::SetupError;
use mediafetch::output::{self, OutputDir};
use mediafetch::source::classify;
use mediafetch::target::AcquisitionTarget;
use mediafetch::worker::BatchOrchestrator;

fn load_config(path: Option<PathBuf>) -> Result<Config, SetupError> {
    let config = match path {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    Ok(config)
}

pub async fn run_acquire(args: AcquireArgs, config_path: Option<PathBuf>) -> Result<ExitCode, SetupError> {
    let mut config = load_config(config_path)?;
    if let Some(root) = args.output {
        config.output.root = root;
    }
    if let Some(concurrency) = args.concurrency {
        config.worker.concurrency = concurrency;
    }
    config.validate()?;

    let mut urls = args.urls;
    if let Some(path) = &args.from_file {
        urls.extend(read_target_file(path)?);
    }
    if urls.is_empty() {
        return Err(SetupError::NoTargets);
    }

    let targets: Vec<AcquisitionTarget> = urls
        .into_iter()
        .map(|url| {
            AcquisitionTarget::builder()
                .url(url)
                .source_type(args.source_type)
                .scrape_links(args.scrape_links)
                .build()
        })
        .collect();

    let output = Arc::new(OutputDir::prepare(&config.output.root, &config.output.staging_dir)?);
    let config = Arc::new(config);
    let orchestrator = BatchOrchestrator::from_config(Arc::clone(&config), Arc::clone(&output))?;

    let cancel = CancellationToken::new();
    let watcher = tokio::spawn(cancel_on_shutdown(cancel.clone()));

    let report = orchestrator.run(targets, &cancel).await;
    watcher.abort();

    if args.json {
        match report.to_json() {
            Ok(json) => println!("{json}"),
            Err(e) => error!(error = %e, "Failed to render report"),
        }
    } else {
        for result in &report.results {
            println!("{result}");
        }
        println!("{}", report.summary_line());
    }

    let mut code = if report.any_succeeded() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    };

    if let Some(archive) = args.pack {
        match output.pack(&archive).await {
            Ok(path) => info!(archive = %path.display(), "Output packed"),
            Err(e) => {
                error!(error = %e, "Packing failed");
                eprintln!("pack failed: {e}");
                code = ExitCode::FAILURE;
            }
        }
    }

    Ok(code)
}

pub async fn run_pack(args: PackArgs) -> ExitCode {
    match output::pack(&args.dir, &args.archive, &[]).await {
        Ok(path) => {
            println!("{}", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("pack failed: {e}");
            ExitCode::FAILURE
        }
    }
}

pub fn run_classify(urls: &[String]) -> ExitCode {
    for url in urls {
        println!("{url}\t{}", classify(url));
    }
    ExitCode::SUCCESS
}

pub fn run_config(config_path: Option<PathBuf>) -> Result<ExitCode, SetupError> {
    let config = load_config(config_path)?;
    print!("{}", config.to_toml()?);
    Ok(ExitCode::SUCCESS)
}

/// One URL per line; blank lines and `#` comments are skipped
fn read_target_file(path: &Path) -> Result<Vec<String>, SetupError> {
    let text = std::fs::read_to_string(path).map_err(|source| SetupError::TargetList {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(parse_target_list(&text))
}

fn parse_target_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Cancel `token` on Ctrl+C or SIGTERM
async fn cancel_on_shutdown(token: CancellationToken) {
    shutdown_signal().await;
    warn!("Shutdown signal received, cancelling remaining work");
    token.cancel();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
