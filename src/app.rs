use std::time::Duration;

use camino::Utf8PathBuf;
use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::convert::{ConvertOutcome, ConvertPipeline, LocalLayout};
use crate::domain::{Aggregation, JobKey, Reducer};
use crate::engine::EngineClient;
use crate::error::HarvestError;
use crate::job::{JobBuilder, plan_keys};
use crate::registry::{self, VariableSpec};
use crate::storage::StorageClient;
use crate::submit::{SubmissionDriver, SubmissionReport};
use crate::throttle::Throttle;

#[derive(Debug, Clone, Serialize)]
pub struct PlanResult {
    pub jobs: Vec<PlanEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanEntry {
    pub key: JobKey,
    pub description: String,
    pub object_name: String,
    pub collection_id: String,
    pub band: String,
    pub composite: Aggregation,
    pub reducer: Reducer,
    pub scale: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct VariablesResult {
    pub variables: Vec<VariableSpec>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Forwards progress notices to the tracing subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => {
                tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message)
            }
            None => tracing::info!("{}", event.message),
        }
    }
}

pub struct App<E: EngineClient, S: StorageClient> {
    config: ResolvedConfig,
    engine: E,
    storage: S,
}

impl<E: EngineClient, S: StorageClient> App<E, S> {
    pub fn new(config: ResolvedConfig, engine: E, storage: S) -> Self {
        Self {
            config,
            engine,
            storage,
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn variables(&self) -> VariablesResult {
        VariablesResult {
            variables: registry::all().to_vec(),
        }
    }

    pub fn plan(&self) -> Result<PlanResult, HarvestError> {
        let builder = JobBuilder::from_config(&self.config);
        let jobs = plan_keys(&self.config)?
            .into_iter()
            .map(|key| {
                let job =
                    builder.build_named(key.window.year(), key.window.month(), &key.variable)?;
                Ok::<_, HarvestError>(PlanEntry {
                    description: job.description(),
                    object_name: job.object_name(),
                    collection_id: job.raster.source.collection_id,
                    band: job.raster.source.band,
                    composite: job.raster.composite,
                    reducer: job.reducer,
                    scale: job.scale,
                    key,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PlanResult { jobs })
    }

    pub fn export(
        &self,
        throttle: &mut dyn Throttle,
        sink: &dyn ProgressSink,
    ) -> Result<SubmissionReport, HarvestError> {
        let driver = SubmissionDriver::new(&self.engine, JobBuilder::from_config(&self.config));
        driver.run(&self.config, throttle, sink)
    }

    pub fn convert(
        &self,
        output_root: Utf8PathBuf,
        sink: &dyn ProgressSink,
    ) -> Result<ConvertOutcome, HarvestError> {
        let layout = LocalLayout::from_config(output_root, &self.config);
        ConvertPipeline::new(&self.storage, layout).run(sink)
    }
}
