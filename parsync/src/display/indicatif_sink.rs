use super::{ProgressSink, ProgressUnit, ProgressUpdate};
use crate::transfer::rate::format_rate;
use indicatif::{HumanBytes, MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::Mutex;

/// Terminal renderer built on indicatif's `MultiProgress`.
///
/// Nothing is drawn until [`ProgressSink::start`] is called.
pub struct IndicatifSink {
    multi: MultiProgress,
    bars: Mutex<Vec<(String, ProgressBar)>>,
}

impl IndicatifSink {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::with_draw_target(ProgressDrawTarget::hidden()),
            bars: Mutex::new(Vec::new()),
        }
    }

    fn style() -> ProgressStyle {
        ProgressStyle::default_bar()
            .template("{prefix:>10.yellow.bold} {spinner:.green} [{bar:30.cyan/blue}] {percent:>3}% {msg}")
            .expect("valid progress template")
            .progress_chars("=> ")
    }

    fn bar(&self, label: &str) -> ProgressBar {
        let mut bars = self.bars.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((_, bar)) = bars.iter().find(|(l, _)| l == label) {
            return bar.clone();
        }

        let bar = self.multi.add(ProgressBar::new(0));
        bar.set_style(Self::style());
        bar.set_prefix(label.to_string());
        bars.push((label.to_string(), bar.clone()));
        bar
    }

    fn print(&self, text: &str) {
        if self.multi.println(text).is_err() {
            eprintln!("{text}");
        }
    }
}

impl Default for IndicatifSink {
    fn default() -> Self {
        Self::new()
    }
}

fn describe(update: &ProgressUpdate) -> String {
    match update.unit {
        ProgressUnit::Bytes => format!(
            "{:>10} / {:<10} {:>8} {:>12}  {}",
            HumanBytes(update.completed).to_string(),
            HumanBytes(update.total).to_string(),
            update.eta,
            format_rate(update.rate),
            update.current_file
        ),
        ProgressUnit::Files => format!(
            "{} / {} files  {}",
            update.completed, update.total, update.current_file
        ),
    }
}

impl ProgressSink for IndicatifSink {
    fn start(&self) {
        self.multi.set_draw_target(ProgressDrawTarget::stderr());
    }

    fn register(&self, label: &str) {
        self.bar(label);
    }

    fn update(&self, update: &ProgressUpdate) {
        let bar = self.bar(&update.label);
        bar.set_length(update.total.max(update.completed));
        bar.set_position(update.completed);
        bar.set_message(describe(update));
        bar.tick();
    }

    fn message(&self, text: &str) {
        self.print(text);
    }

    fn error(&self, text: &str) {
        self.print(&format!("Error: {text}"));
    }

    fn finish(&self) {
        let bars = self.bars.lock().unwrap_or_else(|e| e.into_inner());
        for (_, bar) in bars.iter() {
            bar.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_bytes() {
        let text = describe(&ProgressUpdate {
            label: "total".to_string(),
            completed: 1024,
            total: 2048,
            rate: 100_000.0,
            eta: "0:00:01".to_string(),
            current_file: "a.txt".to_string(),
            unit: ProgressUnit::Bytes,
        });
        assert!(text.contains("1.00 KiB"));
        assert!(text.contains("2.00 KiB"));
        assert!(text.contains("100.00kB/s"));
        assert!(text.ends_with("a.txt"));
    }

    #[test]
    fn test_describe_files() {
        let text = describe(&ProgressUpdate {
            label: "total".to_string(),
            completed: 3,
            total: 10,
            unit: ProgressUnit::Files,
            ..Default::default()
        });
        assert_eq!(text, "3 / 10 files  ");
    }

    #[test]
    fn test_rows_are_reused() {
        let sink = IndicatifSink::new();
        sink.register("rsync #1");
        sink.update(&ProgressUpdate {
            label: "rsync #1".to_string(),
            completed: 5,
            total: 10,
            ..Default::default()
        });
        sink.update(&ProgressUpdate {
            label: "total".to_string(),
            completed: 5,
            total: 3,
            ..Default::default()
        });

        let bars = sink.bars.lock().unwrap();
        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].1.position(), 5);
        assert_eq!(bars[0].1.length(), Some(10));
        assert_eq!(bars[1].1.length(), Some(5));
    }
}
