//! Batch processing: runs many images through the engine, keeps each
//! image's failure to itself, and totals the savings.

use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use zip::{CompressionMethod, ZipWriter, write::FileOptions};

use crate::core::{
    error::ProcessError,
    job::{ResizeJob, TargetParams},
    metrics::round_one_decimal,
    payload::decode_image_payload,
    pipeline::ProcessedImage,
    resizer::ResizeEngine,
};
const OUTPUT_SUFFIX: &str = "_resized.jpg";

#[derive(Debug, Clone)]
pub struct BatchItem {
    pub name: String,
    pub image: String,
    pub actual_original_size: Option<u64>,
}

#[derive(Debug)]
pub struct BatchEntry {
    pub name: String,
    pub file_name: String,
    pub outcome: Result<ProcessedImage, ProcessError>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatchTotals {
    pub original_size: u64,
    pub compressed_size: u64,
}

impl BatchTotals {
    pub fn saved_bytes(&self) -> i64 {
        self.original_size as i64 - self.compressed_size as i64
    }

    pub fn savings_percent(&self) -> f64 {
        if self.original_size == 0 {
            return 0.0;
        }
        round_one_decimal(self.saved_bytes() as f64 / self.original_size as f64 * 100.0)
    }
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub entries: Vec<BatchEntry>,
    pub totals: BatchTotals,
}

impl BatchOutcome {
    pub fn completed(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.entries.len() - self.completed()
    }

    /// Bundle every successful output into a ZIP. `None` when nothing succeeded.
    pub fn archive(&self) -> Result<Option<Vec<u8>>, ProcessError> {
        let files: Vec<(&str, &[u8])> = self
            .entries
            .iter()
            .filter_map(|e| match &e.outcome {
                Ok(out) => Some((e.file_name.as_str(), out.data.as_slice())),
                Err(_) => None,
            })
            .collect();

        if files.is_empty() {
            return Ok(None);
        }
        build_zip(&files).map(Some)
    }
}

/// `photo.final.HEIC` -> `photo.final_resized.jpg`
pub fn output_file_name(name: &str) -> String {
    let base = Path::new(name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|s| !s.is_empty() && *s != "." && *s != "..")
        .unwrap_or("image");

    let stem = match base.rfind('.') {
        Some(idx) if idx > 0 => &base[..idx],
        _ => base,
    };
    format!("{}{}", stem, OUTPUT_SUFFIX)
}

pub fn archive_name() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("resized_images_{}.zip", millis)
}

pub fn progress_percent(completed: usize, total: usize) -> f64 {
    if total == 0 {
        return 100.0;
    }
    completed as f64 / total as f64 * 100.0
}

pub fn build_zip(files: &[(&str, &[u8])]) -> Result<Vec<u8>, ProcessError> {
    let zip_err = |e: &dyn std::fmt::Display| ProcessError::Processing(format!("zip: {}", e));

    let mut buffer = Vec::new();
    {
        let mut zip = ZipWriter::new(Cursor::new(&mut buffer));
        // JPEG data does not deflate
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .unix_permissions(0o644);

        for (name, data) in files {
            zip.start_file(*name, options).map_err(|e| zip_err(&e))?;
            zip.write_all(data).map_err(|e| zip_err(&e))?;
        }
        zip.finish().map_err(|e| zip_err(&e))?;
    }
    Ok(buffer)
}

/// Decode one item's payload and run it through the engine. Oversized
/// sources are pre-shrunk inside the engine, under its slots and timeout.
async fn process_item(
    engine: &ResizeEngine,
    item: BatchItem,
    params: TargetParams,
    max_dimension: u32,
) -> Result<ProcessedImage, ProcessError> {
    let job = ResizeJob {
        payload: decode_image_payload(&item.image)?,
        params,
        actual_original_size: item.actual_original_size,
        max_source_dimension: Some(max_dimension),
    };
    engine.process(job).await
}

/// Process `items` with at most `concurrency` in flight. The result keeps
/// input order; a failed item never cancels its siblings.
pub async fn run_batch(
    engine: &ResizeEngine,
    items: Vec<BatchItem>,
    params: TargetParams,
    concurrency: usize,
    max_dimension: u32,
) -> BatchOutcome {
    let total = items.len();
    let limiter = Arc::new(Semaphore::new(concurrency.max(1)));
    let names: Vec<String> = items.iter().map(|i| i.name.clone()).collect();
    let mut outcomes: Vec<Option<Result<ProcessedImage, ProcessError>>> =
        (0..total).map(|_| None).collect();

    let mut workers = JoinSet::new();
    for (index, item) in items.into_iter().enumerate() {
        let engine = engine.clone();
        let limiter = limiter.clone();
        workers.spawn(async move {
            let result = match limiter.acquire_owned().await {
                Ok(_permit) => process_item(&engine, item, params, max_dimension).await,
                Err(e) => Err(ProcessError::Worker(e.to_string())),
            };
            (index, result)
        });
    }

    let mut done = 0;
    while let Some(joined) = workers.join_next().await {
        done += 1;
        match joined {
            Ok((index, result)) => {
                if let Err(err) = &result {
                    tracing::warn!("Batch item '{}' failed: {}", names[index], err);
                }
                outcomes[index] = Some(result);
            }
            Err(e) => tracing::error!("Batch worker failed: {}", e),
        }
        tracing::info!("Batch progress: {:.1}%", progress_percent(done, total));
    }

    let mut totals = BatchTotals::default();
    let entries: Vec<BatchEntry> = names
        .into_iter()
        .zip(outcomes)
        .map(|(name, outcome)| {
            let outcome = outcome
                .unwrap_or_else(|| Err(ProcessError::Worker("worker task aborted".to_string())));
            if let Ok(out) = &outcome {
                totals.original_size += out.metrics.original_size;
                totals.compressed_size += out.metrics.new_size;
            }
            BatchEntry {
                file_name: output_file_name(&name),
                name,
                outcome,
            }
        })
        .collect();

    BatchOutcome { entries, totals }
}
