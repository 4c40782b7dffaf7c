//! The long-running annotation worker.

use crate::config::Settings;

#[cfg(feature = "amqp-broker")]
pub async fn cmd_worker(settings: &Settings) -> anyhow::Result<()> {
    use std::sync::Arc;

    use console::style;

    use super::helpers::{connect, load_models, pipeline_factory, shutdown_on_ctrl_c};
    use crate::cli::icons::{arrow, success};
    use crate::services::{Coordinator, Relay};

    // Models are loaded before anything is consumed.
    let models = load_models(settings)?;
    let factory = pipeline_factory(settings, models);

    let broker = connect(settings).await?;
    let topology = settings.topology();
    broker
        .declare_queue(&topology.input, topology.dead_letter.as_deref())
        .await?;
    broker.declare_queue(&topology.output, None).await?;

    let coordinator = Arc::new(Coordinator::new(&settings.coordinator_options(), factory));
    let publisher = broker.publisher(&topology.output).await?;
    let prefetch = u16::try_from(settings.prefetch_window())?;
    let consumer = broker.consumer(&topology.input, prefetch).await?;

    eprintln!(
        "{} Worker ready: {} {} {} ({} workers, {} queued)",
        success(),
        style(&topology.input).bold(),
        arrow(),
        style(&topology.output).bold(),
        settings.workers,
        settings.queue_capacity
    );
    if let Some(ref dlq) = topology.dead_letter {
        eprintln!("  {} dead letters: {}", style("→").dim(), dlq);
    }

    let relay = Arc::new(Relay::new(
        coordinator,
        Arc::new(publisher),
        settings.relay_options(),
    ));
    let stats = Arc::clone(&relay).run(consumer, shutdown_on_ctrl_c()).await;

    if let Err(e) = broker.close().await {
        tracing::warn!("Error closing broker connection: {}", e);
    }
    let stats = stats?;
    let pool = relay.coordinator().stats().pool;

    eprintln!(
        "{} Stopped after {} documents: {} completed, {} requeued, {} dead-lettered",
        success(),
        stats.received,
        style(stats.completed).green(),
        style(stats.requeued).yellow(),
        style(stats.dead_lettered).red()
    );
    eprintln!(
        "  {} peak concurrency {} of {}, {} annotators abandoned",
        style("→").dim(),
        pool.peak,
        pool.size,
        pool.abandoned
    );
    Ok(())
}

#[cfg(not(feature = "amqp-broker"))]
pub async fn cmd_worker(_settings: &Settings) -> anyhow::Result<()> {
    super::helpers::no_broker()
}
