//! Producer command: chunk a text source into tasks on the input queue.

use std::path::Path;

use crate::config::Settings;

#[cfg(feature = "amqp-broker")]
pub async fn cmd_publish(settings: &Settings, source: &Path, chunk_size: usize) -> anyhow::Result<()> {
    use std::time::Instant;

    use console::style;
    use indicatif::{ProgressBar, ProgressStyle};

    use super::helpers::connect;
    use crate::cli::icons::success;
    use crate::services::producer::{prepare, publish_tasks};

    let source_path = source.to_path_buf();
    let tasks = tokio::task::spawn_blocking(move || prepare(&source_path, chunk_size)).await??;
    let task_id = tasks
        .first()
        .and_then(|t| t.chunk.as_ref())
        .map(|c| c.task_id.clone())
        .unwrap_or_default();

    let broker = connect(settings).await?;
    let topology = settings.topology();
    broker
        .declare_queue(&topology.input, topology.dead_letter.as_deref())
        .await?;
    let publisher = broker.publisher(&topology.input).await?;

    let pb = ProgressBar::new(tasks.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec}) {msg}")?
            .progress_chars("#>-"),
    );
    pb.set_message(format!("publishing to {}", topology.input));

    let started = Instant::now();
    let sent = publish_tasks(&publisher, &tasks, |_| pb.inc(1)).await;
    pb.finish_and_clear();
    if let Err(e) = broker.close().await {
        tracing::warn!("Error closing broker connection: {}", e);
    }
    let sent = sent?;

    eprintln!(
        "{} Published {} tasks in {}ms",
        success(),
        style(sent).green(),
        started.elapsed().as_millis()
    );
    eprintln!("  {} Task ID: {}", style("→").dim(), task_id);
    Ok(())
}

#[cfg(not(feature = "amqp-broker"))]
pub async fn cmd_publish(_settings: &Settings, _source: &Path, _chunk_size: usize) -> anyhow::Result<()> {
    super::helpers::no_broker()
}
