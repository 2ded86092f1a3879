use std::sync::Arc;

use poem::web::Data;
use poem_openapi::{OpenApi, Tags, payload::Json};

use crate::{
    AppState,
    core::{
        batch::{self, BatchItem},
        error::ProcessError,
        job::{ResizeJob, TargetParams},
        payload::encode_data_uri,
        registry::PRESET_REGISTRY,
    },
    schemas::{
        batch::{BatchBody, BatchEntryBody, BatchRequest, BatchResponse, BatchTotalsBody},
        common::{ErrorResponse, InternalServerErrorResponse, MetricsBody},
        process::{
            HealthBody, ImageRequest, PresetBody, ProcessImageBody, ProcessImageResponse,
            SlotStatus,
        },
    },
};

#[derive(Tags)]
enum ApiProcessTags {
    Process,
    Service,
}

pub struct ApiProcess;

#[OpenApi()]
impl ApiProcess {
    /// Process Image
    ///
    /// Resize a base64 image into the requested box and re-encode it as JPEG.
    ///
    /// # Example Request
    /// ```json
    /// {
    ///   "image": "data:image/jpeg;base64,/9j/4AAQ...",
    ///   "width": 1080,
    ///   "height": 1080,
    ///   "quality": 0.8,
    ///   "actualOriginalSize": 4812331,
    ///   "background": { "r": 245, "g": 245, "b": 245 },
    ///   "fit": "contain"
    /// }
    /// ```
    #[oai(path = "/process-image", method = "post", tag = "ApiProcessTags::Process")]
    async fn process_image(
        &self,
        Json(json): Json<ImageRequest>,
        state: Data<&Arc<AppState>>,
    ) -> ProcessImageResponse {
        let job = match ResizeJob::from_request(json, state.engine.options()) {
            Ok(job) => job,
            Err(e) => {
                tracing::warn!("Rejected image request: {}", e);
                return ProcessImageResponse::BadRequest(Json(ErrorResponse::from(&e)));
            }
        };

        tracing::info!(
            "Processing: {} bytes, box={}x{}, fit={:?}, quality={}",
            job.payload.bytes.len(),
            job.params.width,
            job.params.height,
            job.params.fit,
            job.params.quality
        );

        let result = match state.engine.process(job).await {
            Ok(res) => res,
            Err(e) if e.is_validation() => {
                tracing::warn!("Rejected image request: {}", e);
                return ProcessImageResponse::BadRequest(Json(ErrorResponse::from(&e)));
            }
            Err(e) => {
                return ProcessImageResponse::InternalServerError(Json(
                    InternalServerErrorResponse::new("route.process", "process_image", &e),
                ));
            }
        };

        tracing::info!(
            "Process completed: {} -> {} bytes ({})",
            result.metrics.original_size,
            result.metrics.new_size,
            result.metrics.reduction_label
        );

        ProcessImageResponse::Ok(Json(ProcessImageBody {
            success: true,
            image: encode_data_uri("image/jpeg", &result.data),
            metrics: MetricsBody::from(&result.metrics),
            width: result.width,
            height: result.height,
        }))
    }

    /// Process Batch
    ///
    /// Process several images with shared settings. A failing image is
    /// reported in its own entry and does not stop the rest.
    #[oai(path = "/process-batch", method = "post", tag = "ApiProcessTags::Process")]
    async fn process_batch(
        &self,
        Json(json): Json<BatchRequest>,
        state: Data<&Arc<AppState>>,
    ) -> BatchResponse {
        if json.images.is_empty() {
            return BatchResponse::BadRequest(Json(ErrorResponse::from(&ProcessError::EmptyBatch)));
        }

        let params = match TargetParams::resolve(
            json.width,
            json.height,
            json.preset.as_deref(),
            json.quality,
            json.fit,
            json.background.as_ref(),
            state.engine.options(),
        ) {
            Ok(params) => params,
            Err(e) => {
                tracing::warn!("Rejected batch request: {}", e);
                return BatchResponse::BadRequest(Json(ErrorResponse::from(&e)));
            }
        };

        let items: Vec<BatchItem> = json
            .images
            .into_iter()
            .map(|img| BatchItem {
                name: img.name,
                image: img.image,
                actual_original_size: img.actual_original_size,
            })
            .collect();

        tracing::info!("Processing batch of {} images", items.len());

        let outcome = batch::run_batch(
            &state.engine,
            items,
            params,
            state.batch_concurrency,
            state.max_upload_dimension,
        )
        .await;

        let (archive, archive_name) = if json.archive.unwrap_or(false) {
            match outcome.archive() {
                Ok(Some(zip)) => (
                    Some(encode_data_uri("application/zip", &zip)),
                    Some(batch::archive_name()),
                ),
                Ok(None) => (None, None),
                Err(e) => {
                    tracing::error!("Failed to build batch archive: {}", e);
                    (None, None)
                }
            }
        } else {
            (None, None)
        };

        let completed = outcome.completed() as u32;
        let failed = outcome.failed() as u32;
        let totals = BatchTotalsBody {
            original_size: outcome.totals.original_size,
            compressed_size: outcome.totals.compressed_size,
            saved_bytes: outcome.totals.saved_bytes(),
            savings_percent: outcome.totals.savings_percent(),
        };

        let results = outcome
            .entries
            .into_iter()
            .map(|entry| match entry.outcome {
                Ok(out) => BatchEntryBody {
                    name: entry.name,
                    file_name: entry.file_name,
                    success: true,
                    image: Some(encode_data_uri("image/jpeg", &out.data)),
                    metrics: Some(MetricsBody::from(&out.metrics)),
                    error: None,
                },
                Err(e) => BatchEntryBody {
                    name: entry.name,
                    file_name: entry.file_name,
                    success: false,
                    image: None,
                    metrics: None,
                    error: Some(e.details()),
                },
            })
            .collect();

        BatchResponse::Ok(Json(BatchBody {
            success: failed == 0,
            results,
            totals,
            completed,
            failed,
            archive,
            archive_name,
        }))
    }

    /// List Presets
    ///
    /// Get the named target sizes accepted by `preset`
    #[oai(path = "/presets", method = "get", tag = "ApiProcessTags::Service")]
    async fn list_presets(&self) -> Json<Vec<PresetBody>> {
        let mut presets: Vec<PresetBody> = PRESET_REGISTRY
            .iter()
            .map(|(name, preset)| PresetBody {
                name: name.clone(),
                label: preset.label.clone(),
                width: preset.width,
                height: preset.height,
            })
            .collect();
        presets.sort_by(|a, b| a.name.cmp(&b.name));

        Json(presets)
    }

    #[oai(path = "/health", method = "get", tag = "ApiProcessTags::Service")]
    async fn health(&self, state: Data<&Arc<AppState>>) -> Json<HealthBody> {
        let status = state.engine.health_check();

        Json(HealthBody {
            status: "healthy".to_string(),
            encoder: status.encoder.to_string(),
            processing_slots: SlotStatus {
                available: status.available_permits as u32,
                capacity: status.max_concurrent as u32,
                utilization_pct: (status.max_concurrent - status.available_permits) as f64
                    / status.max_concurrent as f64
                    * 100.0,
            },
        })
    }
}
