use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use strum::IntoEnumIterator;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use rank_tracker::bulk::BulkProgress;
use rank_tracker::error_handling::{ErrorKind, LookupStats};
use rank_tracker::initialization::{init_client, init_logger_with};
use rank_tracker::models::Device;
use rank_tracker::storage::{init_db_pool_with_path, run_migrations, CredentialStore, RecordStore};
use rank_tracker::{
    LogFormat, LogLevel, RankTracker, ResetScheduler, SearchApiPool, TrackOutcome, TrackRequest,
    TrackerConfig,
};

/// Track a domain's search ranking for a list of keywords.
#[derive(Debug, Parser)]
#[command(name = "rank_tracker", version, about)]
struct Opt {
    /// File with one keyword per line, or "-" for stdin. Lines starting
    /// with '#' are skipped.
    #[arg(short, long)]
    file: PathBuf,

    /// Target domain to look for in the results.
    #[arg(short, long)]
    domain: String,

    /// ISO-3166 alpha-2 country code.
    #[arg(long, default_value = "US")]
    country: String,

    /// ISO-639 alpha-2 language code.
    #[arg(long, default_value = "en")]
    language: String,

    /// Device the results page is rendered for.
    #[arg(long, value_enum, default_value = "desktop")]
    device: Device,

    /// Cross-check provider positions against array indices.
    #[arg(long)]
    verify: bool,

    /// Database path (overrides RANK_TRACKER_DB_PATH).
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Log level.
    #[arg(long, value_enum, default_value = "info")]
    log_level: LogLevel,

    /// Log format.
    #[arg(long, value_enum, default_value = "plain")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::parse();
    init_logger_with(opt.log_level, opt.log_format).context("Failed to initialize logger")?;

    let mut config = TrackerConfig::from_env();
    if let Some(db_path) = &opt.db_path {
        config.db_path = db_path.clone();
    }

    let db = init_db_pool_with_path(&config.db_path)
        .await
        .context("Failed to initialize database pool")?;
    run_migrations(&db)
        .await
        .context("Failed to run database migrations")?;

    let client = init_client(config.request_timeout).context("Failed to initialize HTTP client")?;
    let records = RecordStore::new(Arc::clone(&db));
    let pool = SearchApiPool::init(
        &config,
        CredentialStore::new(Arc::clone(&db)),
        records.clone(),
        (*client).clone(),
    )
    .await
    .context("Failed to initialize search-API pool")?;

    let scheduler = ResetScheduler::start(Arc::clone(&pool), records, config.retention_days);
    let tracker = RankTracker::new(Arc::clone(&pool), config.bulk.clone());

    let keywords = read_keywords(&opt.file)
        .await
        .context("Failed to read keywords")?;
    info!("Tracking {} keyword(s) for {}", keywords.len(), opt.domain);

    let (progress_tx, mut progress_rx) = mpsc::channel::<BulkProgress>(32);
    let progress_task = tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            match event.retry_attempt {
                Some(attempt) => info!(
                    "Retry pass {attempt}: {}/{} done ({} ok, {} failed)",
                    event.processed, event.total, event.succeeded, event.failed
                ),
                None => info!(
                    "Progress: {}/{} done ({} ok, {} failed), pool usage {:.1}%",
                    event.processed,
                    event.total,
                    event.succeeded,
                    event.failed,
                    event.pool.usage_percent
                ),
            }
        }
    });

    let request = TrackRequest {
        keywords,
        domain: opt.domain.clone(),
        country: Some(opt.country.clone()),
        language: Some(opt.language.clone()),
        device: Some(opt.device),
        verify_position: opt.verify,
        ..Default::default()
    };

    let response = tracker
        .handle_with_progress(request, Some(progress_tx))
        .await;
    drop(progress_task);

    let stats = LookupStats::new();
    match response {
        Ok(response) => {
            info!("{}", response.insight);
            match &response.outcome {
                TrackOutcome::Single(record) => match record.position {
                    Some(position) => info!(
                        "'{}' -> position {position} (confidence {})",
                        record.keyword, record.validation.confidence
                    ),
                    None => info!("'{}' -> not found", record.keyword),
                },
                TrackOutcome::Bulk(result) => {
                    for record in &result.records {
                        match record.position {
                            Some(position) => info!(
                                "'{}' -> position {position} (confidence {})",
                                record.keyword, record.validation.confidence
                            ),
                            None => info!("'{}' -> not found", record.keyword),
                        }
                    }
                    for failure in &result.failures {
                        stats.increment(failure.kind);
                        warn!("'{}' failed: {}", failure.keyword, failure.error);
                    }
                    info!(
                        "Processed {} keyword(s) in {:.1}s (quality: {} high / {} medium / {} low)",
                        result.total_processed,
                        result.elapsed_ms as f64 / 1000.0,
                        result.quality.high,
                        result.quality.medium,
                        result.quality.low
                    );
                }
            }
            info!(
                "Pool: {}/{} credential(s) active, daily usage {:.1}%",
                response.pool.active, response.pool.total, response.pool.usage_percent
            );
        }
        Err(e) => {
            stats.increment(e.kind);
            log::error!("Lookup failed: {e}");
        }
    }

    if stats.total() > 0 {
        info!("Error counts:");
        for kind in ErrorKind::iter() {
            let count = stats.get_count(kind);
            if count > 0 {
                info!("   {}: {count}", kind.as_str());
            }
        }
    }

    scheduler.shutdown();
    pool.shutdown();
    Ok(())
}

/// Reads keywords from a file or stdin, skipping blanks and comments.
async fn read_keywords(path: &PathBuf) -> Result<Vec<String>> {
    let mut keywords = Vec::new();
    if path.as_os_str() == "-" {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            push_keyword(&mut keywords, &line);
        }
    } else {
        let file = tokio::fs::File::open(path)
            .await
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let mut lines = BufReader::new(file).lines();
        while let Some(line) = lines.next_line().await? {
            push_keyword(&mut keywords, &line);
        }
    }
    Ok(keywords)
}

fn push_keyword(keywords: &mut Vec<String>, line: &str) {
    let trimmed = line.trim();
    if !trimmed.is_empty() && !trimmed.starts_with('#') {
        keywords.push(trimmed.to_string());
    }
}
