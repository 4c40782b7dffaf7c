//! Configuration management commands.

use console::style;

use crate::config::{Config, Settings};
use crate::work_queue::redact_url;

/// Print the effective settings and where they came from.
pub fn cmd_config_show(settings: &Settings, config: &Config, json: bool) -> anyhow::Result<()> {
    if json {
        let mut value = serde_json::to_value(settings)?;
        value["broker_url"] = redact_url(&settings.broker_url).into();
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    let source = config
        .source_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults (no config file found)".to_string());

    println!("\n{}", style("nlpipe configuration").bold());
    println!("{}", "-".repeat(40));
    row("Config file", &source);
    row("Broker", &redact_url(&settings.broker_url));
    row("Input queue", &settings.input_queue);
    row("Output queue", &settings.output_queue);
    row(
        "Dead-letter queue",
        settings.dead_letter_queue.as_deref().unwrap_or("(disabled)"),
    );
    row("Workers", &settings.workers.to_string());
    row("Queue capacity", &settings.queue_capacity.to_string());
    row(
        "Document timeout",
        &format!("{}s", settings.document_timeout.as_secs()),
    );
    row("Max retries", &settings.max_retries.to_string());
    row("Publish failures", &settings.publish_failures.to_string());
    row(
        "Gazetteer",
        &settings
            .gazetteer
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(built-in only)".to_string()),
    );
    row("Dependency parse", &settings.dependency_parse.to_string());
    row("Sentiment", &settings.sentiment.to_string());
    row(
        "Max document chars",
        &match settings.max_document_chars {
            0 => "unlimited".to_string(),
            n => n.to_string(),
        },
    );
    Ok(())
}

fn row(label: &str, value: &str) {
    println!("{:<20} {}", style(label).dim(), value);
}
