//! Shared helper functions for CLI commands.

use std::sync::Arc;

use tokio::sync::watch;

use crate::config::Settings;
use crate::services::annotation::{AnnotationPipeline, Annotator, LanguageModels};
use crate::services::coordinator::AnnotatorFactory;

/// Load language models once; every annotator instance shares them.
pub fn load_models(settings: &Settings) -> anyhow::Result<Arc<LanguageModels>> {
    let models = LanguageModels::load(settings.gazetteer.as_deref())?;
    Ok(Arc::new(models))
}

/// Factory building a standard pipeline per pool slot.
pub fn pipeline_factory(settings: &Settings, models: Arc<LanguageModels>) -> AnnotatorFactory {
    let options = settings.pipeline_options();
    Arc::new(move || {
        Box::new(AnnotationPipeline::standard(Arc::clone(&models), &options)) as Box<dyn Annotator>
    })
}

/// A shutdown flag flipped by ctrl-c.
pub fn shutdown_on_ctrl_c() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, draining in-flight documents");
            let _ = tx.send(true);
        }
    });
    rx
}

#[cfg(feature = "amqp-broker")]
pub async fn connect(settings: &Settings) -> anyhow::Result<crate::work_queue::amqp::AmqpBroker> {
    Ok(crate::work_queue::amqp::AmqpBroker::connect(&settings.broker_url).await?)
}

#[cfg(not(feature = "amqp-broker"))]
pub fn no_broker() -> anyhow::Result<()> {
    anyhow::bail!("this build has no broker support; rebuild with --features amqp-broker")
}
