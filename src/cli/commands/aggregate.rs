//! Aggregator command: fold chunk results into per-task reports.

use crate::config::Settings;

#[cfg(feature = "amqp-broker")]
pub async fn cmd_aggregate(
    settings: &Settings,
    top: usize,
    tasks: usize,
    stale_after: i64,
) -> anyhow::Result<()> {
    use chrono::Duration;
    use console::style;

    use super::helpers::connect;
    use crate::cli::icons::{success, warning};
    use crate::services::aggregate::{consume, Aggregator};

    const PREFETCH: u16 = 64;

    let broker = connect(settings).await?;
    broker.declare_queue(&settings.output_queue, None).await?;
    let consumer = broker.consumer(&settings.output_queue, PREFETCH).await?;
    eprintln!(
        "{} Collecting results from {}",
        success(),
        style(&settings.output_queue).bold()
    );

    let mut aggregator = Aggregator::with_stale_after(top, Duration::seconds(stale_after));
    let mut printed = 0usize;
    let outcome = tokio::select! {
        result = consume(consumer, &mut aggregator, |report| {
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{}", json),
                Err(e) => eprintln!("{} Failed to render report: {}", warning(), e),
            }
            printed += 1;
            tasks == 0 || printed < tasks
        }) => result.map(Some),
        _ = tokio::signal::ctrl_c() => Ok(None),
    };

    let pending = aggregator.pending_tasks();
    let abandoned = aggregator.abandoned_tasks();
    if let Err(e) = broker.close().await {
        tracing::warn!("Error closing broker connection: {}", e);
    }
    outcome?;

    if pending > 0 {
        eprintln!("{} {} tasks still incomplete", warning(), pending);
    }
    if abandoned > 0 {
        eprintln!("{} {} stale tasks abandoned", warning(), abandoned);
    }
    Ok(())
}

#[cfg(not(feature = "amqp-broker"))]
pub async fn cmd_aggregate(
    _settings: &Settings,
    _top: usize,
    _tasks: usize,
    _stale_after: i64,
) -> anyhow::Result<()> {
    super::helpers::no_broker()
}
