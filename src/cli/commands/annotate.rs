//! One-shot local annotation.
//!
//! Runs the same relay as the worker, against an in-process broker, so the
//! printed JSON is exactly what the worker would publish.

use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;

use super::helpers::{load_models, pipeline_factory};
use crate::cli::icons::warning;
use crate::config::Settings;
use crate::models::{InboundMessage, OutboundMessage, ResultStatus};
use crate::services::{Coordinator, Relay};
use crate::work_queue::MemoryBroker;

const INPUT: &str = "input";
const OUTPUT: &str = "output";
const DEAD_LETTER: &str = "dead";

pub async fn cmd_annotate(
    settings: &Settings,
    input: &Path,
    id: Option<String>,
    pretty: bool,
) -> anyhow::Result<()> {
    let text = read_input(input)?;
    let id = id.unwrap_or_else(|| default_id(input));

    let models = load_models(settings)?;
    let coordinator = Arc::new(Coordinator::new(
        &settings.coordinator_options(),
        pipeline_factory(settings, models),
    ));

    let broker = MemoryBroker::new();
    broker.declare_queue(DEAD_LETTER, None);
    broker.declare_queue(INPUT, Some(DEAD_LETTER));
    broker.declare_queue(OUTPUT, None);

    let message = InboundMessage {
        id,
        text,
        chunk: None,
    };
    broker.publish_to(INPUT, &message.encode()?)?;
    broker.close();

    let relay = Arc::new(Relay::new(
        coordinator,
        Arc::new(broker.publisher(OUTPUT)),
        settings.relay_options(),
    ));
    // The shutdown sender stays alive until the input queue is exhausted.
    let (_shutdown, rx) = watch::channel(false);
    let consumer = broker.consumer(INPUT, settings.prefetch_window());
    relay.run(consumer, rx).await?;

    let Some(payload) = broker.drain(OUTPUT).pop() else {
        anyhow::bail!("document was rejected without a result");
    };
    let result = OutboundMessage::decode(&payload)?;
    if result.status != ResultStatus::Ok {
        eprintln!(
            "{} status {}: {}",
            warning(),
            result.status.as_str(),
            result.error.as_deref().unwrap_or("unknown error")
        );
    }

    let json = if pretty {
        serde_json::to_string_pretty(&result)?
    } else {
        serde_json::to_string(&result)?
    };
    println!("{}", json);
    Ok(())
}

fn read_input(input: &Path) -> anyhow::Result<String> {
    if input == Path::new("-") {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        return Ok(text);
    }
    std::fs::read_to_string(input)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", input.display(), e))
}

fn default_id(input: &Path) -> String {
    input
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| *s != "-")
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_id_from_file_stem() {
        assert_eq!(default_id(Path::new("/tmp/report.txt")), "report");
        assert_eq!(default_id(Path::new("-")).len(), 36);
    }
}
