use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink};
use crate::config::ResolvedConfig;
use crate::domain::JobKey;
use crate::engine::EngineClient;
use crate::error::HarvestError;
use crate::job::JobBuilder;
use crate::throttle::Throttle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubmissionStatus {
    Started { task: String },
    Rejected { reason: String },
}

/// What the driver keeps of a job after handing it to the engine.
#[derive(Debug, Clone, Serialize)]
pub struct SubmissionHandle {
    pub sequence: u64,
    pub key: JobKey,
    pub description: String,
    pub object_name: String,
    #[serde(flatten)]
    pub status: SubmissionStatus,
}

impl SubmissionHandle {
    pub fn is_started(&self) -> bool {
        matches!(self.status, SubmissionStatus::Started { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReport {
    pub handles: Vec<SubmissionHandle>,
    /// Submission counts at which the driver paused.
    pub pauses: Vec<u64>,
}

impl SubmissionReport {
    pub fn attempted(&self) -> usize {
        self.handles.len()
    }

    pub fn started(&self) -> usize {
        self.handles.iter().filter(|handle| handle.is_started()).count()
    }

    pub fn rejected(&self) -> usize {
        self.attempted() - self.started()
    }
}

pub struct SubmissionDriver<'a, E: EngineClient + ?Sized> {
    engine: &'a E,
    builder: JobBuilder,
}

impl<'a, E: EngineClient + ?Sized> SubmissionDriver<'a, E> {
    pub fn new(engine: &'a E, builder: JobBuilder) -> Self {
        Self { engine, builder }
    }

    pub fn engine(&self) -> &E {
        self.engine
    }

    /// Builds and starts every job of the configured product in order:
    /// variables as registered, then years, then months.
    ///
    /// A build failure aborts the run. A rejected submission is recorded and
    /// the loop moves on; the throttle counts every attempt either way.
    pub fn run(
        &self,
        config: &ResolvedConfig,
        throttle: &mut dyn Throttle,
        sink: &dyn ProgressSink,
    ) -> Result<SubmissionReport, HarvestError> {
        sink.event(ProgressEvent {
            message: format!("phase=Submit; starting {} exports", config.job_count()),
            elapsed: None,
        });
        let started_at = std::time::Instant::now();
        let mut handles = Vec::with_capacity(config.job_count());
        let mut pauses = Vec::new();
        let mut sequence = 0u64;

        for spec in &config.variables {
            for year in config.years() {
                for month in config.months() {
                    let job = self.builder.build(year, month, spec)?;
                    sequence += 1;

                    let status = match self.engine.start_export(&job) {
                        Ok(task) => {
                            tracing::debug!(sequence, task = %task, "export started");
                            SubmissionStatus::Started { task }
                        }
                        Err(err) => {
                            tracing::warn!(
                                sequence,
                                description = %job.description(),
                                error = %err,
                                "export submission rejected"
                            );
                            SubmissionStatus::Rejected {
                                reason: err.to_string(),
                            }
                        }
                    };
                    handles.push(SubmissionHandle {
                        sequence,
                        description: job.description(),
                        object_name: job.object_name(),
                        key: job.key,
                        status,
                    });

                    if let Some(pause) = throttle.admit_next() {
                        sink.event(ProgressEvent {
                            message: format!(
                                "phase=Throttle; batch {} submitted, waiting for engine",
                                pause.after
                            ),
                            elapsed: Some(pause.duration),
                        });
                        pauses.push(pause.after);
                    }
                }
            }
        }

        let report = SubmissionReport { handles, pauses };
        sink.event(ProgressEvent {
            message: format!(
                "phase=Done; {} tasks submitted, {} rejected",
                report.started(),
                report.rejected()
            ),
            elapsed: Some(started_at.elapsed()),
        });
        Ok(report)
    }
}
