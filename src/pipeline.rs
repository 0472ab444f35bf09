//! Sequential driver over units of work.
//!
//! Each [`WorkUnit`] goes through upload (video flow only), submit, poll,
//! fetch and persist. A unit whose target file already exists is skipped
//! without touching the network. Unit failures are recorded and the run
//! moves on; only configuration errors and cancellation stop it.

use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::artifact::Artifact;
use crate::error::{Error, Result};
use crate::kie::{GenerationRequest, JobClient};
use crate::poller::{Clock, PollObserver, Silent, TokioClock, poll_job};
use crate::state_machine::{JobState, PollPolicy};
use crate::upload::Uploader;

/// Input field the video model reads image URLs from.
pub const IMAGE_URLS_FIELD: &str = "image_urls";

#[derive(Debug, Clone, PartialEq)]
pub enum ImageSource {
    /// Already publicly reachable.
    Url(String),
    /// Local file, uploaded before submission.
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnitSource {
    Ready(GenerationRequest),
    /// `request` gets the image URL under [`IMAGE_URLS_FIELD`] once known.
    ImageToVideo {
        image: ImageSource,
        request: GenerationRequest,
    },
}

/// One artifact to produce.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkUnit {
    /// Persona id, also the output file stem.
    pub id: String,
    /// Human-readable name for progress output.
    pub label: String,
    /// Where the artifact is written. Its existence skips the unit.
    pub target: PathBuf,
    pub source: UnitSource,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitOutcome {
    Completed { bytes: usize },
    Skipped,
    Failed { reason: String },
}

/// What happened to one unit.
#[derive(Debug, Clone, Serialize)]
pub struct UnitRecord {
    pub unit_id: String,
    pub label: String,
    pub target: PathBuf,
    /// Remote task id; `None` when the unit never got past submission.
    pub task_id: Option<String>,
    pub outcome: UnitOutcome,
    /// Distinct state tokens the service reported, in order.
    pub states: Vec<JobState>,
    pub started_at: DateTime<Utc>,
    /// Wall-clock time spent on the unit, upload and download included.
    pub duration_ms: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedUnit {
    pub unit_id: String,
    pub reason: String,
}

/// Tally of a whole run. Skipped units count as succeeded.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// Random id tying the log lines of one run together.
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    /// Units handed to the run, processed or not.
    pub total: usize,
    /// Completed plus skipped units.
    pub succeeded: usize,
    /// Units whose target already existed.
    pub skipped: usize,
    pub failed: Vec<FailedUnit>,
    /// Set when the run stopped before reaching every unit.
    pub aborted: Option<String>,
    pub records: Vec<UnitRecord>,
}

impl RunSummary {
    fn new(total: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            total,
            succeeded: 0,
            skipped: 0,
            failed: Vec::new(),
            aborted: None,
            records: Vec::new(),
        }
    }

    fn push(&mut self, record: UnitRecord) {
        match &record.outcome {
            UnitOutcome::Completed { .. } => self.succeeded += 1,
            UnitOutcome::Skipped => {
                self.succeeded += 1;
                self.skipped += 1;
            }
            UnitOutcome::Failed { reason } => self.failed.push(FailedUnit {
                unit_id: record.unit_id.clone(),
                reason: reason.clone(),
            }),
        }
        self.records.push(record);
    }

    pub fn all_succeeded(&self) -> bool {
        self.succeeded == self.total && self.aborted.is_none()
    }
}

/// Progress hooks for a run. Every method defaults to doing nothing.
pub trait RunObserver: PollObserver {
    fn unit_started(&self, _index: usize, _total: usize, _unit: &WorkUnit) {}
    fn unit_submitted(&self, _unit: &WorkUnit, _task_id: &str) {}
    fn unit_finished(&self, _record: &UnitRecord) {}
}

impl RunObserver for Silent {}

/// Runs [`WorkUnit`]s through upload, submit, poll, fetch and persist.
///
/// `C` is the clock the poll loop waits on; tests swap in virtual time.
pub struct Pipeline<C = TokioClock> {
    client: JobClient,
    uploader: Option<Uploader>,
    policy: PollPolicy,
    clock: C,
    cancel: CancellationToken,
}

impl Pipeline<TokioClock> {
    pub fn new(client: JobClient, policy: PollPolicy) -> Self {
        Self::with_clock(client, policy, TokioClock)
    }
}

impl<C: Clock> Pipeline<C> {
    pub fn with_clock(client: JobClient, policy: PollPolicy, clock: C) -> Self {
        Self {
            client,
            uploader: None,
            policy,
            clock,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_uploader(mut self, uploader: Uploader) -> Self {
        self.uploader = Some(uploader);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Process `units` one after the other.
    pub async fn run<O: RunObserver + ?Sized>(&self, units: &[WorkUnit], observer: &O) -> RunSummary {
        let mut summary = RunSummary::new(units.len());
        tracing::info!(run_id = %summary.run_id, units = units.len(), "Run started");

        for (index, unit) in units.iter().enumerate() {
            if self.cancel.is_cancelled() {
                summary.aborted = Some(Error::Cancelled.to_string());
                break;
            }
            observer.unit_started(index, units.len(), unit);

            let (record, error) = self.process_unit(unit, observer).await;
            observer.unit_finished(&record);
            summary.push(record);

            if let Some(e) = error
                && e.is_fatal()
            {
                tracing::error!(unit = %unit.id, error = %e, "Run aborted");
                summary.aborted = Some(e.to_string());
                break;
            }
        }

        tracing::info!(
            run_id = %summary.run_id,
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            failed = summary.failed.len(),
            total = summary.total,
            "Run finished",
        );
        summary
    }

    /// Run one unit to completion. Never fails: errors become a `Failed`
    /// outcome, and the error itself is handed back for the caller to judge.
    pub async fn process_unit<O: RunObserver + ?Sized>(
        &self,
        unit: &WorkUnit,
        observer: &O,
    ) -> (UnitRecord, Option<Error>) {
        let timer = Instant::now();
        let mut record = UnitRecord {
            unit_id: unit.id.clone(),
            label: unit.label.clone(),
            target: unit.target.clone(),
            task_id: None,
            outcome: UnitOutcome::Skipped,
            states: Vec::new(),
            started_at: Utc::now(),
            duration_ms: 0,
        };

        let error = if unit.target.exists() {
            tracing::info!(unit = %unit.id, target = %unit.target.display(), "Already present, skipping");
            None
        } else {
            match self.execute(unit, &mut record, observer).await {
                Ok(bytes) => {
                    tracing::info!(unit = %unit.id, target = %unit.target.display(), bytes, "Unit completed");
                    record.outcome = UnitOutcome::Completed { bytes };
                    None
                }
                Err(e) => {
                    tracing::warn!(unit = %unit.id, error = %e, "Unit failed");
                    record.outcome = UnitOutcome::Failed {
                        reason: e.to_string(),
                    };
                    Some(e)
                }
            }
        };

        record.duration_ms = timer.elapsed().as_millis() as i64;
        (record, error)
    }

    async fn execute<O: RunObserver + ?Sized>(
        &self,
        unit: &WorkUnit,
        record: &mut UnitRecord,
        observer: &O,
    ) -> Result<usize> {
        let request = self.prepare(unit).await?;

        let task_id = self.client.submit(&request).await?;
        record.task_id = Some(task_id.clone());
        observer.unit_submitted(unit, &task_id);

        let (job, outcome) = poll_job(
            &self.client,
            &self.clock,
            &task_id,
            &self.policy,
            &self.cancel,
            observer,
        )
        .await;
        record.states = job.state_history;

        let locator = outcome?.ok_or_else(|| Error::NoResult(task_id.clone()))?;
        let bytes = self.client.fetch(locator.primary()).await?;
        let size = bytes.len();
        Artifact::new(bytes, &unit.target).persist()?;
        Ok(size)
    }

    async fn prepare(&self, unit: &WorkUnit) -> Result<GenerationRequest> {
        match &unit.source {
            UnitSource::Ready(request) => Ok(request.clone()),
            UnitSource::ImageToVideo { image, request } => {
                let url = match image {
                    ImageSource::Url(url) => url.clone(),
                    ImageSource::File(path) => {
                        let uploader = self.uploader.as_ref().ok_or_else(|| {
                            Error::UploadFailed("no upload host configured".into())
                        })?;
                        uploader.upload_file(path).await?
                    }
                };
                Ok(request.clone().with_input(IMAGE_URLS_FIELD, vec![url]))
            }
        }
    }
}
