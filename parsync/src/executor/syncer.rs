//! Orchestrates the listing pass and the parallel transfer jobs.

use super::job::{EstimateTuning, Job, JobEvent, JobState, JobStatus};
use super::manifest::partition;
use crate::display::{DisplaySession, ProgressSink, ProgressUnit, ProgressUpdate};
use crate::rsync::{ProgressSample, RsyncCommand};
use crate::transfer::rate;
use crate::{Result, SyncError};
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Label of the aggregate row.
pub const MASTER_LABEL: &str = "total";

/// Sum of the latest state of every job.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Aggregate {
    pub rate: f64,
    pub size: u64,
    pub total: u64,
}

impl Aggregate {
    pub fn from_states<'a>(states: impl IntoIterator<Item = &'a JobState>) -> Self {
        states.into_iter().fold(Self::default(), |acc, state| Self {
            rate: acc.rate + state.rate,
            size: acc.size + state.size,
            total: acc.total + state.total,
        })
    }

    pub fn eta(&self) -> String {
        rate::eta(self.total, self.size, self.rate)
    }

    pub fn to_update(&self) -> ProgressUpdate {
        ProgressUpdate {
            label: MASTER_LABEL.to_string(),
            completed: self.size,
            total: self.total,
            rate: self.rate,
            eta: self.eta(),
            current_file: String::new(),
            unit: ProgressUnit::Bytes,
        }
    }
}

/// File-count progress of the listing pass.
#[derive(Debug, Default)]
struct ListingProgress {
    completed: u64,
    total: u64,
}

impl ListingProgress {
    /// A changed total resets the row, otherwise it advances to the new count.
    fn apply(&mut self, sample: &ProgressSample) -> Option<ProgressUpdate> {
        let counts = sample.counts?;

        if counts.total != self.total {
            self.total = counts.total;
            self.completed = counts.transferred;
        } else {
            let advance = counts.transferred.saturating_sub(self.completed);
            self.completed += advance;
        }

        Some(ProgressUpdate {
            label: MASTER_LABEL.to_string(),
            completed: self.completed,
            total: self.total,
            rate: sample.rate,
            eta: rate::UNKNOWN_ETA.to_string(),
            current_file: String::new(),
            unit: ProgressUnit::Files,
        })
    }
}

/// Result of a run where every job succeeded.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferSummary {
    pub jobs: usize,
    pub files: usize,
    pub bytes: u64,
}

/// Read-only view of the job statuses of a [`Syncer`], usable while it runs.
#[derive(Debug, Clone)]
pub struct SyncMonitor {
    statuses: watch::Receiver<Vec<JobStatus>>,
}

impl SyncMonitor {
    /// Status of every job, indexed by job id - 1.
    pub fn statuses(&self) -> Vec<JobStatus> {
        self.statuses.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        self.statuses.borrow().contains(&JobStatus::Running)
    }

    /// Wait until `condition` holds for the statuses. Returns false if the
    /// syncer was dropped first.
    pub async fn wait_for<F>(&mut self, mut condition: F) -> bool
    where
        F: FnMut(&[JobStatus]) -> bool,
    {
        self.statuses.wait_for(|s| condition(s)).await.is_ok()
    }
}

/// Splits one rsync run into `njobs` parallel rsync processes.
pub struct Syncer {
    command: Arc<RsyncCommand>,
    njobs: usize,
    tuning: EstimateTuning,
    sink: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
    jobs: Vec<Job>,
    states: Vec<JobState>,
    manifest_len: usize,
    events_tx: UnboundedSender<JobEvent>,
    events_rx: UnboundedReceiver<JobEvent>,
    statuses: watch::Sender<Vec<JobStatus>>,
}

impl Syncer {
    pub fn new(command: RsyncCommand, njobs: usize, sink: Arc<dyn ProgressSink>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            command: Arc::new(command),
            njobs: njobs.max(1),
            tuning: EstimateTuning::default(),
            sink,
            cancel: CancellationToken::new(),
            jobs: Vec::new(),
            states: Vec::new(),
            manifest_len: 0,
            events_tx,
            events_rx,
            statuses: watch::Sender::new(Vec::new()),
        }
    }

    pub fn with_tuning(mut self, tuning: EstimateTuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Use `cancel` to stop the listing and all jobs early.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    /// Whether any job is running.
    pub fn is_active(&self) -> bool {
        self.statuses.borrow().contains(&JobStatus::Running)
    }

    /// Observe job statuses from another task while [`Syncer::run`] holds the syncer.
    pub fn monitor(&self) -> SyncMonitor {
        SyncMonitor {
            statuses: self.statuses.subscribe(),
        }
    }

    fn publish_status(&self, job: usize, status: JobStatus) {
        self.statuses.send_modify(|statuses| {
            if let Some(slot) = statuses.get_mut(job.wrapping_sub(1)) {
                *slot = status;
            }
        });
    }

    /// Current totals across all jobs.
    pub fn aggregate(&self) -> Aggregate {
        Aggregate::from_states(&self.states)
    }

    /// List, partition and transfer with the display running throughout.
    pub async fn run(&mut self) -> Result<TransferSummary> {
        let sink = Arc::clone(&self.sink);
        let _session = DisplaySession::open(sink.as_ref());

        self.itemize().await?;
        self.transfer().await
    }

    /// Run the dry-run listing and build one job per batch.
    pub async fn itemize(&mut self) -> Result<()> {
        let sink = Arc::clone(&self.sink);
        sink.message("Calculating list of files for synchronization");
        sink.message(&format!("Executing: {}", self.command.listing_command_line()));
        sink.register(MASTER_LABEL);

        let mut listing = ListingProgress::default();
        let files = self
            .command
            .run_listing(
                |sample| {
                    if let Some(update) = listing.apply(&sample) {
                        sink.update(&update);
                    }
                },
                |message| sink.error(&message),
                &self.cancel,
            )
            .await?;

        if files.is_empty() {
            return Err(SyncError::EmptyManifest);
        }

        info!("{} entries to synchronize over {} jobs", files.len(), self.njobs);
        self.manifest_len = files.len();
        sink.update(&ProgressUpdate {
            label: MASTER_LABEL.to_string(),
            completed: 0,
            total: files.len() as u64,
            eta: rate::UNKNOWN_ETA.to_string(),
            unit: ProgressUnit::Files,
            ..Default::default()
        });

        self.jobs.clear();
        self.states.clear();
        for (index, batch) in partition(files, self.njobs).into_iter().enumerate() {
            let job = Job::new(
                index + 1,
                batch,
                Arc::clone(&self.command),
                self.tuning,
                self.events_tx.clone(),
            );
            sink.register(&job.label());
            self.states.push(job.state().clone());
            self.jobs.push(job);
        }
        self.statuses
            .send_replace(self.jobs.iter().map(Job::status).collect());

        Ok(())
    }

    /// Run every job to completion, aggregating their progress as it arrives.
    pub async fn transfer(&mut self) -> Result<TransferSummary> {
        let jobs = std::mem::take(&mut self.jobs);
        let total = jobs.len();

        let handles: Vec<_> = jobs
            .into_iter()
            .map(|mut job| {
                job.start();
                self.publish_status(job.id(), job.status());
                let cancel = self.cancel.clone();
                tokio::spawn(async move {
                    let result = job.transfer(&cancel).await;
                    (job, result)
                })
            })
            .collect();

        let mut all_done = std::pin::pin!(join_all(handles));
        let results = loop {
            tokio::select! {
                Some(event) = self.events_rx.recv() => self.handle_event(event),
                results = &mut all_done => break results,
            }
        };
        while let Ok(event) = self.events_rx.try_recv() {
            self.handle_event(event);
        }

        let mut failed = 0;
        for joined in results {
            match joined {
                Ok((job, result)) => {
                    if result.is_err() {
                        failed += 1;
                    }
                    self.jobs.push(job);
                }
                Err(e) => {
                    failed += 1;
                    error!("Job task panicked: {}", e);
                    self.sink.error(&format!("Job task panicked: {e}"));
                }
            }
        }
        self.jobs.sort_by_key(Job::id);
        self.statuses.send_modify(|statuses| {
            for status in statuses.iter_mut().filter(|s| **s == JobStatus::Running) {
                *status = JobStatus::Done;
            }
        });

        if self.cancel.is_cancelled() {
            return Err(SyncError::Interrupted);
        }

        if failed > 0 {
            return Err(SyncError::PartialFailure { failed, total });
        }

        let aggregate = self.aggregate();
        info!(
            "Synchronized {} entries ({} bytes) with {} jobs",
            self.manifest_len, aggregate.size, total
        );

        Ok(TransferSummary {
            jobs: total,
            files: self.manifest_len,
            bytes: aggregate.size,
        })
    }

    fn handle_event(&mut self, event: JobEvent) {
        match event {
            JobEvent::Started { job, command } => {
                self.sink.message(&format!("Starting job #{job}: {command}"));
            }
            JobEvent::File { job, name } => {
                self.sink.message(&format!("[#{job}] {name}"));
            }
            JobEvent::Progress { state, .. } => {
                let (job, status) = (state.id, state.status);
                self.sink.update(&job_update(&state));
                if let Some(slot) = self.states.get_mut(state.id.wrapping_sub(1)) {
                    *slot = state;
                }
                self.sink.update(&self.aggregate().to_update());
                self.publish_status(job, status);
            }
            JobEvent::Error { job, message } => {
                self.sink.error(&format!("#{job} {message}"));
            }
            JobEvent::Failed { job, error } => {
                self.sink.error(&format!("Job #{job} failed: {error}"));
            }
            JobEvent::NothingToDo { job } => {
                self.sink.message(&format!("Job {job}: Nothing to do - no files"));
            }
        }
    }
}

fn job_update(state: &JobState) -> ProgressUpdate {
    ProgressUpdate {
        label: format!("rsync #{}", state.id),
        completed: state.size,
        total: state.total,
        rate: state.rate,
        eta: rate::eta(state.total, state.size, state.rate),
        current_file: state.current_file.clone(),
        unit: ProgressUnit::Bytes,
    }
}
