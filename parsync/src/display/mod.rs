//! Progress display.
//!
//! The executor only talks to a [`ProgressSink`]; [`IndicatifSink`] renders
//! it as one bar per rsync job plus a total bar. A sink is started and
//! finished through a [`DisplaySession`] so the terminal is restored on every
//! exit path.

mod indicatif_sink;

pub use indicatif_sink::IndicatifSink;

/// What the `completed`/`total` numbers of an update count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProgressUnit {
    #[default]
    Bytes,
    Files,
}

/// One row of the display at one instant.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProgressUpdate {
    pub label: String,
    pub completed: u64,
    pub total: u64,
    /// Bytes per second.
    pub rate: f64,
    pub eta: String,
    pub current_file: String,
    pub unit: ProgressUnit,
}

/// Receiver of progress rows and console messages.
pub trait ProgressSink: Send + Sync {
    /// Called once before anything is drawn.
    fn start(&self) {}

    /// Reserve a row for `label` so rows keep a stable order.
    fn register(&self, label: &str);

    fn update(&self, update: &ProgressUpdate);

    /// Print an informational line above the bars.
    fn message(&self, text: &str);

    /// Print an error line above the bars.
    fn error(&self, text: &str);

    /// Called once when the run is over, successful or not.
    fn finish(&self) {}
}

/// Keeps a sink started for as long as it lives.
pub struct DisplaySession<'a> {
    sink: &'a dyn ProgressSink,
}

impl<'a> DisplaySession<'a> {
    pub fn open(sink: &'a dyn ProgressSink) -> Self {
        sink.start();
        Self { sink }
    }
}

impl Drop for DisplaySession<'_> {
    fn drop(&mut self) {
        self.sink.finish();
    }
}
