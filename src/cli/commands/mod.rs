//! Argument parsing for `nlpipe` and dispatch to the worker, annotate,
//! publish, aggregate and config subcommands.

mod aggregate;
mod annotate;
mod config_cmd;
mod helpers;
mod publish;
mod worker;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings_with_options, LoadOptions, Settings};
use crate::services::aggregate::DEFAULT_STALE_AFTER_SECS;
use crate::services::producer::DEFAULT_CHUNK_SIZE;

#[derive(Parser)]
#[command(name = "nlpipe")]
#[command(about = "Message-driven linguistic annotation service")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Resolve relative paths from current working directory instead of config file location
    #[arg(long, global = true)]
    cwd: bool,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Broker URL (overrides config and BROKER_URL)
    #[arg(long, global = true)]
    broker_url: Option<String>,

    /// Number of annotator instances
    #[arg(short, long, global = true)]
    workers: Option<usize>,

    /// Documents accepted beyond those being annotated
    #[arg(long, global = true)]
    queue_capacity: Option<usize>,

    /// Per-document timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Redeliveries allowed after a transient failure
    #[arg(long, global = true)]
    max_retries: Option<u32>,

    /// Extra gazetteer file (phrase<TAB>LABEL per line)
    #[arg(long, global = true)]
    gazetteer: Option<PathBuf>,

    /// Add dependency parses to results
    #[arg(long, global = true)]
    parse: bool,

    /// Skip sentence sentiment labels
    #[arg(long, global = true)]
    no_sentiment: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Consume documents from the broker, annotate them, and publish results
    Worker,

    /// Annotate a text file (or stdin with "-") and print the result JSON
    Annotate {
        /// Input file, or "-" for stdin
        input: PathBuf,
        /// Document ID (defaults to the file stem)
        #[arg(long)]
        id: Option<String>,
        /// Pretty-print the result
        #[arg(short, long)]
        pretty: bool,
    },

    /// Split a text file or directory into chunked tasks and publish them
    Publish {
        /// Text file, or directory searched for .txt files
        #[arg(short, long)]
        source: PathBuf,
        /// Sentences per task
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,
    },

    /// Collect chunk results into per-task reports
    Aggregate {
        /// Number of most frequent words to report
        #[arg(long, default_value = "5")]
        top: usize,
        /// Stop after this many reports (0 = run until interrupted)
        #[arg(short, long, default_value = "0")]
        tasks: usize,
        /// Drop incomplete tasks that have seen no chunk for this many seconds
        #[arg(long, default_value_t = DEFAULT_STALE_AFTER_SECS)]
        stale_after: i64,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show effective settings
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

impl Cli {
    /// Command-line flags take precedence over file and environment.
    fn apply_overrides(&self, settings: &mut Settings) {
        if let Some(ref url) = self.broker_url {
            settings.broker_url = url.clone();
        }
        if let Some(workers) = self.workers {
            settings.workers = workers;
            if self.queue_capacity.is_none() {
                settings.queue_capacity = workers;
            }
        }
        if let Some(capacity) = self.queue_capacity {
            settings.queue_capacity = capacity;
        }
        if let Some(secs) = self.timeout {
            settings.document_timeout = std::time::Duration::from_secs(secs);
        }
        if let Some(retries) = self.max_retries {
            settings.max_retries = retries;
        }
        if let Some(ref gazetteer) = self.gazetteer {
            settings.gazetteer = Some(gazetteer.clone());
        }
        if self.parse {
            settings.dependency_parse = true;
        }
        if self.no_sentiment {
            settings.sentiment = false;
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let options = LoadOptions {
        config_path: cli.config.clone(),
        use_cwd: cli.cwd,
    };
    let (mut settings, config) = load_settings_with_options(options).await?;
    cli.apply_overrides(&mut settings);
    settings.validate()?;

    match cli.command {
        Commands::Worker => worker::cmd_worker(&settings).await,
        Commands::Annotate { input, id, pretty } => {
            annotate::cmd_annotate(&settings, &input, id, pretty).await
        }
        Commands::Publish { source, chunk_size } => {
            publish::cmd_publish(&settings, &source, chunk_size).await
        }
        Commands::Aggregate {
            top,
            tasks,
            stale_after,
        } => aggregate::cmd_aggregate(&settings, top, tasks, stale_after).await,
        Commands::Config { command } => match command {
            ConfigCommands::Show { json } => config_cmd::cmd_config_show(&settings, &config, json),
        },
    }
}
