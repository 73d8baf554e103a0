//! One rsync worker and its running estimate of how much it has to move.

use crate::executor::manifest::ManifestEntry;
use crate::rsync::{DecodedLine, ProgressSample, RsyncCommand};
use crate::{Result, SyncError};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Below this byte percentage the file-count ratio is a better size predictor.
pub const LOW_PERCENT_THRESHOLD: f64 = 10.0;

/// A new size estimate within this relative band of the current one is ignored.
pub const TOTAL_TOLERANCE: f64 = 0.2;

/// Knobs for [`JobState::apply`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EstimateTuning {
    pub low_percent_threshold: f64,
    pub total_tolerance: f64,
}

impl Default for EstimateTuning {
    fn default() -> Self {
        Self {
            low_percent_threshold: LOW_PERCENT_THRESHOLD,
            total_tolerance: TOTAL_TOLERANCE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Idle,
    Running,
    Done,
}

/// Progress of one job as seen from its rsync output.
#[derive(Debug, Clone, PartialEq)]
pub struct JobState {
    pub id: usize,
    pub status: JobStatus,
    pub current_file: String,
    /// Bytes rsync reports as transferred so far.
    pub size: u64,
    /// Byte percentage from the latest usable sample.
    pub percent: u8,
    /// Estimated bytes this job will transfer in total; 0 until known.
    pub total: u64,
    /// Bytes per second; 0 once the job is done.
    pub rate: f64,
    /// Set by a filename line; the next sample only records a baseline.
    baseline_pending: bool,
}

impl JobState {
    pub fn new(id: usize) -> Self {
        Self {
            id,
            status: JobStatus::Idle,
            current_file: String::new(),
            size: 0,
            percent: 0,
            total: 0,
            rate: 0.0,
            baseline_pending: false,
        }
    }

    pub fn set_file(&mut self, name: &str) {
        self.current_file = name.to_string();
        self.baseline_pending = true;
    }

    /// Fold one sample into the state and return how many bytes it advanced.
    pub fn apply(&mut self, sample: &ProgressSample, tuning: &EstimateTuning) -> u64 {
        self.rate = sample.rate;

        let basis = completion_basis(sample, tuning);
        let mut advance = 0;

        if basis > 0.0 {
            let candidate = (sample.size as f64 * 100.0 / basis) as u64;
            self.percent = sample.percent;
            if self.should_replace_total(candidate, tuning) {
                self.total = candidate;
            }
            if !self.baseline_pending {
                advance = sample.size.saturating_sub(self.size);
            }
        }

        self.size = sample.size;
        self.baseline_pending = false;
        advance
    }

    fn should_replace_total(&self, candidate: u64, tuning: &EstimateTuning) -> bool {
        if candidate == 0 {
            return false;
        }
        if self.total == 0 || self.size > self.total {
            return true;
        }

        let ratio = candidate as f64 / self.total as f64;
        ratio <= 1.0 - tuning.total_tolerance || ratio >= 1.0 + tuning.total_tolerance
    }
}

/// Percentage used to extrapolate the job's total size from `sample.size`.
///
/// Near the start of a large file the byte percentage says little about the
/// whole batch, so below the threshold the share of files already transferred
/// is used when rsync reports it.
pub fn completion_basis(sample: &ProgressSample, tuning: &EstimateTuning) -> f64 {
    match sample.counts {
        Some(counts) if f64::from(sample.percent) < tuning.low_percent_threshold && counts.total > 0 => {
            100.0 * counts.transferred as f64 / counts.total as f64
        }
        _ => f64::from(sample.percent),
    }
}

/// Everything a job tells the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum JobEvent {
    Started { job: usize, command: String },
    File { job: usize, name: String },
    /// `advance` is informational: consumers recompute totals from `state`.
    Progress { state: JobState, advance: u64 },
    /// A line rsync wrote to stderr.
    Error { job: usize, message: String },
    Failed { job: usize, error: String },
    NothingToDo { job: usize },
}

/// One rsync process working through one batch of the manifest.
pub struct Job {
    state: JobState,
    batch: Vec<ManifestEntry>,
    command: Arc<RsyncCommand>,
    tuning: EstimateTuning,
    events: UnboundedSender<JobEvent>,
}

impl Job {
    pub fn new(
        id: usize,
        batch: Vec<ManifestEntry>,
        command: Arc<RsyncCommand>,
        tuning: EstimateTuning,
        events: UnboundedSender<JobEvent>,
    ) -> Self {
        Self {
            state: JobState::new(id),
            batch,
            command,
            tuning,
            events,
        }
    }

    pub fn id(&self) -> usize {
        self.state.id
    }

    /// Row label in the progress display.
    pub fn label(&self) -> String {
        format!("rsync #{}", self.state.id)
    }

    pub fn batch(&self) -> &[ManifestEntry] {
        &self.batch
    }

    pub fn state(&self) -> &JobState {
        &self.state
    }

    pub fn status(&self) -> JobStatus {
        self.state.status
    }

    pub fn is_active(&self) -> bool {
        self.state.status == JobStatus::Running
    }

    /// Mark the job running and announce the command it will run.
    pub fn start(&mut self) {
        if self.state.status != JobStatus::Idle {
            return;
        }

        self.state.status = JobStatus::Running;
        let command = self.command.transfer_command_line();
        info!("Starting job #{}: {}", self.state.id, command);
        self.emit(JobEvent::Started {
            job: self.state.id,
            command,
        });
    }

    /// Run rsync over the batch until it exits.
    pub async fn transfer(&mut self, cancel: &CancellationToken) -> Result<()> {
        match self.state.status {
            JobStatus::Done => return Err(SyncError::JobFinished { job: self.state.id }),
            JobStatus::Idle => self.start(),
            JobStatus::Running => {}
        }

        let result = if self.batch.is_empty() {
            self.emit(JobEvent::NothingToDo { job: self.state.id });
            Ok(())
        } else {
            self.run_batch(cancel).await
        };

        self.state.status = JobStatus::Done;
        self.state.rate = 0.0;
        self.emit(JobEvent::Progress {
            state: self.state.clone(),
            advance: 0,
        });

        match &result {
            Ok(()) => debug!("Job #{} finished", self.state.id),
            Err(SyncError::Interrupted) => info!("Job #{} interrupted", self.state.id),
            Err(e) => {
                warn!("Job #{} failed: {}", self.state.id, e);
                self.emit(JobEvent::Failed {
                    job: self.state.id,
                    error: e.to_string(),
                });
            }
        }

        result
    }

    async fn run_batch(&mut self, cancel: &CancellationToken) -> Result<()> {
        let Self {
            state,
            batch,
            command,
            tuning,
            events,
        } = self;
        let id = state.id;
        let tuning = *tuning;
        let events = &*events;

        command
            .run_transfer(
                batch,
                |line| match line {
                    DecodedLine::Filename(name) => {
                        let name = String::from_utf8_lossy(&name).into_owned();
                        state.set_file(&name);
                        let _ = events.send(JobEvent::File { job: id, name });
                    }
                    DecodedLine::Progress(sample) => {
                        let advance = state.apply(&sample, &tuning);
                        let _ = events.send(JobEvent::Progress {
                            state: state.clone(),
                            advance,
                        });
                    }
                    DecodedLine::Ignored => {}
                },
                |message| {
                    let _ = events.send(JobEvent::Error { job: id, message });
                },
                cancel,
            )
            .await
    }

    fn emit(&self, event: JobEvent) {
        // The receiver is gone only when the orchestrator stopped listening.
        let _ = self.events.send(event);
    }
}
