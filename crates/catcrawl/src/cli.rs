//! Subcommand handlers.

use crate::{Cli, Commands};
use anyhow::{bail, Context, Result};
use catcrawl::config::default_config_path;
use catcrawl::register::{self, RegisterTarget};
use catcrawl::{relink_unlinked, CancellationToken, CrawlerConfig, ScanCycle, Scheduler};
use catcrawl_catalog::HttpCatalogClient;
use catcrawl_store::MetadataDb;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub async fn run_command(cli: Cli) -> Result<()> {
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = CrawlerConfig::load_or_default(&config_path)
        .with_context(|| format!("Failed to load config {}", config_path.display()))?;

    match cli.command.unwrap_or(Commands::Run { once: false }) {
        Commands::Run { once } => run_crawler(&config, once).await,
        Commands::Unlinked { json } => list_unlinked(&config, json).await,
        Commands::Relink => relink(&config).await,
        Commands::Register {
            dir,
            prefix,
            file,
            dataset,
        } => register(&config, dir, &prefix, file.zip(dataset)).await,
        Commands::Deregister {
            dir,
            prefix,
            dataset,
        } => deregister(&config, dir, &prefix, dataset).await,
    }
}

fn catalog_client(config: &CrawlerConfig) -> Result<HttpCatalogClient> {
    HttpCatalogClient::new(&config.catalog.url, config.catalog_timeout())
        .context("Failed to create catalog client")
}

async fn open_store(config: &CrawlerConfig) -> Result<MetadataDb> {
    MetadataDb::open(&config.database_path).await.with_context(|| {
        format!(
            "Failed to open metadata store {}",
            config.database_path.display()
        )
    })
}

async fn run_crawler(config: &CrawlerConfig, once: bool) -> Result<()> {
    let catalog = Arc::new(catalog_client(config)?);
    let db = open_store(config).await?;

    info!(
        catalog = %config.catalog.url,
        folder = %config.watch.folder,
        site = %config.watch.site,
        database = %config.database_path.display(),
        "Starting crawler"
    );

    let cycle = ScanCycle::from_config(config, catalog, Arc::new(db.clone()));
    let cancel = CancellationToken::new();
    let scheduler = Scheduler::new(cycle, config.rerun_interval(), config.on_query_error)
        .with_cancellation(cancel.clone());

    tokio::spawn(wait_for_shutdown(cancel));

    let result = if once {
        scheduler.run_once().await.map(|report| {
            println!(
                "found {} | linked {} | skipped {} | failed {} | inconsistent {}",
                report.found, report.linked, report.skipped, report.failed, report.inconsistent
            );
        })
    } else {
        scheduler.start().await
    };

    db.close().await;
    result.context("Crawler stopped")
}

async fn wait_for_shutdown(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Received shutdown signal, stopping after the current dataset");
    cancel.cancel();
}

async fn list_unlinked(config: &CrawlerConfig, json: bool) -> Result<()> {
    let db = open_store(config).await?;
    let entries = db.list_unlinked().await.context("Failed to read unlinked journal")?;
    db.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("No unlinked datasets");
        return Ok(());
    }

    for entry in &entries {
        let file_id = entry
            .file_id
            .map_or_else(|| "none".to_string(), |id| id.to_string());
        println!(
            "{}  v{}  file={}  fileId={}  attempts={}  last={}  {}",
            entry.dataset_path,
            entry.version_id,
            entry.file_path,
            file_id,
            entry.attempts,
            entry.recorded_at.format("%Y-%m-%d %H:%M:%S"),
            entry.error
        );
    }
    println!("{} unlinked dataset(s)", entries.len());
    Ok(())
}

async fn relink(config: &CrawlerConfig) -> Result<()> {
    let catalog = catalog_client(config)?;
    let db = open_store(config).await?;

    let result = relink_unlinked(&catalog, &db).await;
    db.close().await;
    let report = result.context("Relink failed")?;

    println!(
        "relinked {} of {} | still unlinked {}",
        report.relinked, report.attempted, report.still_unlinked
    );
    if report.still_unlinked > 0 {
        bail!("{} dataset(s) remain unlinked", report.still_unlinked);
    }
    Ok(())
}

fn register_target(config: &CrawlerConfig) -> RegisterTarget {
    RegisterTarget {
        folder: config.watch.folder.clone(),
        site: config.watch.site.clone(),
    }
}

fn absolute_dir(dir: &Path) -> Result<PathBuf> {
    let dir = std::fs::canonicalize(dir)
        .with_context(|| format!("Cannot access directory {}", dir.display()))?;
    if !dir.is_dir() {
        bail!("Not a directory: {}", dir.display());
    }
    Ok(dir)
}

async fn register(
    config: &CrawlerConfig,
    dir: Option<PathBuf>,
    prefix: &str,
    single: Option<(PathBuf, String)>,
) -> Result<()> {
    let catalog = catalog_client(config)?;
    let target = register_target(config);

    if let Some((file, name)) = single {
        let file = std::fs::canonicalize(&file)
            .with_context(|| format!("Cannot access file {}", file.display()))?;
        if !file.is_file() {
            bail!("Not a file: {}", file.display());
        }
        if !register::register_file(&catalog, &target, &file, &name).await {
            bail!("Failed to register {} as {}", file.display(), name);
        }
        println!("registered {} as {}", file.display(), name);
        return Ok(());
    }

    let Some(dir) = dir else {
        bail!("Either --dir or --file is required");
    };
    let dir = absolute_dir(&dir)?;
    let report = register::register_directory(&catalog, &target, &dir, prefix).await;
    println!(
        "registered {} of {} FITS file(s)",
        report.succeeded, report.found
    );
    if report.failed > 0 {
        bail!("{} file(s) failed to register", report.failed);
    }
    Ok(())
}

async fn deregister(
    config: &CrawlerConfig,
    dir: Option<PathBuf>,
    prefix: &str,
    dataset: Option<String>,
) -> Result<()> {
    let catalog = catalog_client(config)?;
    let target = register_target(config);

    if let Some(name) = dataset {
        if !register::deregister_dataset(&catalog, &target, &name).await {
            bail!("Failed to delete dataset {}", name);
        }
        return Ok(());
    }

    let Some(dir) = dir else {
        bail!("Either --dir or --dataset is required");
    };
    let dir = absolute_dir(&dir)?;
    let report = register::deregister_directory(&catalog, &target, &dir, prefix).await;
    println!("deleted {} of {} dataset(s)", report.succeeded, report.found);
    if report.failed > 0 {
        bail!("{} dataset(s) failed to delete", report.failed);
    }
    Ok(())
}
