use std::fmt;

use bytes::Bytes;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{debug, error, info, instrument, warn};

use crate::analysis::NutritionEstimate;
use crate::error::StoreError;
use crate::notion::MealRecord;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Download,
    Analysis,
    WriteBack,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::Download => "download",
            Step::Analysis => "analysis",
            Step::WriteBack => "write_back",
        })
    }
}

/// Terminal state of one record within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Fields and flag persisted. `report_key` is set when a report was stored.
    WrittenBack { report_key: Option<String> },
    Skipped(String),
    Failed { step: Step, error: String },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub fetched: usize,
    /// Records that had a photo to work with.
    pub attempted: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &RecordOutcome) {
        match outcome {
            RecordOutcome::WrittenBack { .. } => {
                self.attempted += 1;
                self.succeeded += 1;
            }
            RecordOutcome::Failed { .. } => {
                self.attempted += 1;
                self.failed += 1;
            }
            RecordOutcome::Skipped(_) => self.skipped += 1,
        }
    }
}

/// Processes one batch of pending records, one at a time. Never fails: every
/// error ends up either as an empty batch or as a per-record outcome.
#[instrument(skip(state))]
pub async fn run(state: &AppState, limit: usize) -> RunSummary {
    let records = match state.store.fetch_pending(limit).await {
        Ok(records) => records,
        Err(e) => {
            warn!(error = %e, "could not fetch pending records; nothing to do this run");
            Vec::new()
        }
    };

    let mut summary = RunSummary {
        fetched: records.len(),
        ..RunSummary::default()
    };
    if records.is_empty() {
        info!("no pending records");
        return summary;
    }

    for record in &records {
        let outcome = process_record(state, record).await;
        summary.record(&outcome);
    }
    summary
}

#[instrument(skip_all, fields(record_id = %record.id))]
pub async fn process_record(state: &AppState, record: &MealRecord) -> RecordOutcome {
    let features = state.config.features;

    let image = match state.store.fetch_attachment(record).await {
        Ok(bytes) => bytes,
        Err(StoreError::AttachmentUnavailable(_)) => {
            info!("no photo attached; skipping");
            return RecordOutcome::Skipped("no photo attached".into());
        }
        Err(e) => return failed(Step::Download, e),
    };

    if features.enable_local_image_storage {
        store_photo(state, &record.id, image.clone()).await;
    }

    let estimate = match state.analyzer.analyze(&image, &state.config.profile).await {
        Ok(estimate) => estimate,
        Err(e) => return failed(Step::Analysis, e),
    };

    let report = if features.enable_pdf {
        render_report(state, image, &estimate).await
    } else {
        None
    };

    let analyzed_at = OffsetDateTime::now_utc();
    if let Err(e) = state
        .store
        .write_back(&record.id, &estimate, analyzed_at)
        .await
    {
        error!(
            step = %Step::WriteBack,
            error = %e,
            "analysis succeeded but write-back failed; record will be picked up again"
        );
        return RecordOutcome::Failed {
            step: Step::WriteBack,
            error: e.to_string(),
        };
    }

    let report_key = match report {
        Some(pdf) => store_report(state, &record.id, analyzed_at, pdf).await,
        None => None,
    };

    info!(food_name = %estimate.food_name, report = ?report_key, "record processed");
    RecordOutcome::WrittenBack { report_key }
}

fn failed(step: Step, e: impl fmt::Display) -> RecordOutcome {
    error!(%step, error = %e, "record failed");
    RecordOutcome::Failed {
        step,
        error: e.to_string(),
    }
}

async fn render_report(
    state: &AppState,
    image: Bytes,
    estimate: &NutritionEstimate,
) -> Option<Bytes> {
    let renderer = state.renderer.clone();
    let config = state.config.clone();
    let estimate = estimate.clone();

    let handle =
        tokio::task::spawn_blocking(move || renderer.render(&image, &estimate, &config.profile));
    match handle.await {
        Ok(Ok(pdf)) => Some(Bytes::from(pdf)),
        Ok(Err(e)) => {
            warn!(error = %e, "report rendering failed; writing back data only");
            None
        }
        Err(e) => {
            warn!(error = %e, "report rendering task aborted; writing back data only");
            None
        }
    }
}

async fn store_report(
    state: &AppState,
    record_id: &str,
    analyzed_at: OffsetDateTime,
    pdf: Bytes,
) -> Option<String> {
    let key = report_key(record_id, analyzed_at);
    match state
        .storage
        .put_object(&key, pdf, "application/pdf")
        .await
    {
        Ok(()) => {
            debug!(%key, "report stored");
            Some(key)
        }
        Err(e) => {
            warn!(%key, error = %e, "report could not be stored");
            None
        }
    }
}

async fn store_photo(state: &AppState, record_id: &str, image: Bytes) {
    let (ext, content_type) = match image::guess_format(&image) {
        Ok(image::ImageFormat::Png) => ("png", "image/png"),
        Ok(image::ImageFormat::WebP) => ("webp", "image/webp"),
        Ok(image::ImageFormat::Gif) => ("gif", "image/gif"),
        _ => ("jpg", "image/jpeg"),
    };
    let key = format!("images/{}.{ext}", key_safe(record_id));
    if let Err(e) = state.storage.put_object(&key, image, content_type).await {
        warn!(%key, error = %e, "photo could not be stored");
    }
}

fn report_key(record_id: &str, at: OffsetDateTime) -> String {
    let stamp = at
        .format(format_description!(
            "[year][month][day]_[hour][minute][second]"
        ))
        .unwrap_or_else(|_| at.unix_timestamp().to_string());
    format!("reports/foodinsight_{}_{stamp}.pdf", key_safe(record_id))
}

fn key_safe(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
