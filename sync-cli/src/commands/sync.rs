//! Sync commands: refresh, queue, flush, retry, watch.

use super::{kind_label, open_engine, CommandContext};
use anyhow::{Context, Result};
use hearth_sync_client::RefreshOutcome;
use hearth_sync_types::RecordId;

/// Pull and merge the remote snapshot.
pub async fn refresh(ctx: &CommandContext) -> Result<()> {
    let engine = open_engine(ctx).await?;
    let outcome = engine.refresh().await;
    engine.shutdown();

    match outcome.context("Refresh failed")? {
        RefreshOutcome::Completed(summary) => {
            println!(
                "Refreshed: {} remote records in {} pages",
                summary.remote_records, summary.pages
            );
            println!(
                "  kept local: {}, superseded: {}, hidden: {}",
                summary.report.kept_local.len(),
                summary.report.superseded.len(),
                summary.report.suppressed.len()
            );
        }
        RefreshOutcome::AlreadyRunning => println!("A refresh is already running"),
    }
    Ok(())
}

/// Print pending outbound jobs.
pub async fn queue(ctx: &CommandContext) -> Result<()> {
    let engine = open_engine(ctx).await?;
    let jobs = engine.queue().pending_jobs().await;
    let mut lines = Vec::with_capacity(jobs.len());
    for job in &jobs {
        let phase = engine
            .queue()
            .phase(&job.id)
            .await
            .map(|p| format!("{:?}", p))
            .unwrap_or_default();
        lines.push(format!(
            "{}  {:?}  {}  retries={}  {}",
            job.id,
            job.operation,
            kind_label(job.payload.kind),
            job.retry_count,
            phase
        ));
    }
    engine.shutdown();

    if lines.is_empty() {
        println!("Queue is empty");
        return Ok(());
    }
    for line in lines {
        println!("{}", line);
    }
    Ok(())
}

/// Deliver every queued job now.
pub async fn flush(ctx: &CommandContext) -> Result<()> {
    let engine = open_engine(ctx).await?;
    let attempted = engine.flush().await;
    let remaining = engine.queue().len().await;
    engine.shutdown();

    println!("Flushed {} jobs ({} still queued)", attempted, remaining);
    Ok(())
}

/// Retry syncing one record.
pub async fn retry(ctx: &CommandContext, id: &str) -> Result<()> {
    let engine = open_engine(ctx).await?;
    let id = RecordId::from(id);
    let queued = engine.retry(&id).await;
    engine.shutdown();

    if !queued {
        anyhow::bail!("Nothing to retry for {}", id);
    }
    println!("Retried {}", id);
    Ok(())
}

/// Keep the engine running until Ctrl-C.
pub async fn watch(ctx: &CommandContext) -> Result<()> {
    let engine = open_engine(ctx).await?;
    println!("Watching for changes (Ctrl-C to stop)");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    engine.flush().await;
    engine.shutdown();
    Ok(())
}
