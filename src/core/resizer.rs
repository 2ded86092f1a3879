use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;

use crate::core::encoder::{JpegBackend, default_backend};
use crate::core::error::ProcessError;
use crate::core::job::{PipelineOptions, ResizeJob};
use crate::core::pipeline::{self, ProcessedImage};

pub struct HealthStatus {
    pub available_permits: usize,
    pub max_concurrent: usize,
    pub encoder: &'static str,
}

#[derive(Clone)]
pub struct ResizeEngine {
    options: PipelineOptions,
    encoder: Arc<dyn JpegBackend>,
    slots: Arc<Semaphore>,
    max_concurrent: usize,
    timeout: Duration,
}

impl ResizeEngine {
    pub fn new(options: PipelineOptions) -> Self {
        Self::with_config(options, 4, Duration::from_secs(30))
    }

    pub fn with_config(options: PipelineOptions, max_concurrent: usize, timeout: Duration) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            options,
            encoder: Arc::from(default_backend()),
            slots: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            timeout,
        }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Run the pipeline for `job` on the blocking pool, bounded by the
    /// processing slots and the configured timeout.
    pub async fn process(&self, job: ResizeJob) -> Result<ProcessedImage, ProcessError> {
        let permit = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ProcessError::Worker(e.to_string()))?;

        // the slot stays taken until the blocking work ends, even after a timeout
        let engine = self.clone();
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            pipeline::run(&job, &engine.options, engine.encoder.as_ref())
        });

        match tokio::time::timeout(self.timeout, task).await {
            Ok(joined) => joined?,
            Err(_) => {
                tracing::error!("Image processing exceeded {:?}", self.timeout);
                Err(ProcessError::Timeout(self.timeout))
            }
        }
    }

    pub fn health_check(&self) -> HealthStatus {
        HealthStatus {
            available_permits: self.slots.available_permits(),
            max_concurrent: self.max_concurrent,
            encoder: self.encoder.name(),
        }
    }
}
