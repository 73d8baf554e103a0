//! Classification of rsync output lines.
//!
//! With `--info=progress2 --verbose` rsync interleaves three kinds of output:
//!
//! ```text
//! folder1/folder2/IMG_7440.xmp
//!  123455332   0%  263.33MB/s    0:00:00 (xfr#2, to-chk=22854/22861)
//!     123345   0%    4.73MB/s    1:05:31
//! sent 1,234 bytes  received 35 bytes  2,538.00 bytes/sec
//! ```
//!
//! Names start in the first column, progress lines are indented, and a handful
//! of banners and summaries are noise. The format is not a stable interface,
//! so anything that does not parse cleanly is dropped rather than reported.

use crate::transfer::rate::parse_rate;
use regex::Regex;
use std::sync::OnceLock;
use tracing::trace;

/// Exact banner lines rsync prints at the start of a run.
const BANNERS: [&str; 3] = [
    "sending incremental file list",
    "receiving incremental file list",
    "building file list ... done",
];

/// Which file-count field followed `xfr#N` in a progress suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckKind {
    /// `to-chk`: the file list is complete.
    ToCheck,
    /// `ir-chk`: incremental recursion is still discovering files.
    IncrementalCheck,
}

/// File counts from the `(xfr#N, to-chk=R/T)` suffix of a progress line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferCounts {
    pub transferred: u64,
    pub remaining: u64,
    pub total: u64,
    pub kind: CheckKind,
}

/// One numeric progress measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSample {
    /// Bytes transferred so far by this rsync process.
    pub size: u64,
    /// Byte percentage as printed by rsync (0..=100).
    pub percent: u8,
    /// Bytes per second.
    pub rate: f64,
    /// rsync's own time remaining, verbatim.
    pub eta: String,
    pub counts: Option<TransferCounts>,
}

impl ProgressSample {
    /// Total bytes implied by `size` and the raw byte percentage.
    pub fn estimated_total(&self) -> Option<u64> {
        (self.percent > 0).then(|| (self.size as f64 * 100.0 / self.percent as f64) as u64)
    }

    pub fn transferred_count(&self) -> Option<u64> {
        self.counts.map(|c| c.transferred)
    }

    pub fn total_count(&self) -> Option<u64> {
        self.counts.map(|c| c.total)
    }
}

/// Result of decoding one line.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedLine {
    /// A file or directory name announced by rsync, as raw bytes.
    Filename(Vec<u8>),
    Progress(ProgressSample),
    /// Banner, summary, malformed or unknown line.
    Ignored,
}

/// Whether progress lines must carry the `(xfr#N, ..-chk=R/T)` suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SuffixPolicy {
    #[default]
    Optional,
    Required,
}

fn suffix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\(xfr#(\d+), (to|ir)-chk=(\d+)/(\d+)\)").expect("valid suffix pattern")
    })
}

fn summary_patterns() -> &'static [Regex; 3] {
    static PATTERNS: OnceLock<[Regex; 3]> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            Regex::new(r"^sent \S+ bytes  received \S+ bytes  \S+ bytes/sec$")
                .expect("valid summary pattern"),
            Regex::new(r"^total size is \S+  speedup is \S+").expect("valid summary pattern"),
            Regex::new(r"^created directory ").expect("valid summary pattern"),
        ]
    })
}

/// Stateless rsync line classifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct LineDecoder {
    suffix: SuffixPolicy,
}

impl LineDecoder {
    pub fn new(suffix: SuffixPolicy) -> Self {
        Self { suffix }
    }

    /// Decoder for a transfer run; suffix-less progress lines are kept.
    pub fn transfer() -> Self {
        Self::new(SuffixPolicy::Optional)
    }

    /// Decoder for the dry-run listing, which only cares about file counts.
    pub fn listing() -> Self {
        Self::new(SuffixPolicy::Required)
    }

    /// Classify one line. Only names may be non-UTF-8; any other line that
    /// is not valid text is ignored.
    pub fn decode(&self, line: impl AsRef<[u8]>) -> DecodedLine {
        let line = line.as_ref();
        let Some(&first) = line.first() else {
            return DecodedLine::Ignored;
        };
        let text = std::str::from_utf8(line).ok();

        if first != b' ' {
            if text.is_some_and(is_boilerplate) {
                return DecodedLine::Ignored;
            }
            return DecodedLine::Filename(line.to_vec());
        }

        let Some(text) = text.filter(|t| t.contains("% ")) else {
            trace!("Ignoring unrecognized line: {:?}", String::from_utf8_lossy(line));
            return DecodedLine::Ignored;
        };

        match self.parse_progress(text) {
            Some(sample) => DecodedLine::Progress(sample),
            None => {
                trace!("Skipping malformed progress line: {:?}", text);
                DecodedLine::Ignored
            }
        }
    }

    fn parse_progress(&self, line: &str) -> Option<ProgressSample> {
        let counts = suffix_pattern().captures(line).and_then(|caps| {
            Some(TransferCounts {
                transferred: caps[1].parse().ok()?,
                kind: if &caps[2] == "to" {
                    CheckKind::ToCheck
                } else {
                    CheckKind::IncrementalCheck
                },
                remaining: caps[3].parse().ok()?,
                total: caps[4].parse().ok()?,
            })
        });

        if counts.is_none() && self.suffix == SuffixPolicy::Required {
            return None;
        }

        let mut fields = line.split_whitespace();
        let size = fields.next()?.replace(',', "").parse().ok()?;
        let percent: u8 = fields.next()?.strip_suffix('%')?.parse().ok()?;
        let rate = parse_rate(fields.next()?).ok()?;
        let eta = fields.next()?.to_string();

        Some(ProgressSample {
            size,
            percent: percent.min(100),
            rate,
            eta,
            counts,
        })
    }
}

fn is_boilerplate(line: &str) -> bool {
    BANNERS.contains(&line) || summary_patterns().iter().any(|re| re.is_match(line))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAPTURED: [&str; 9] = [
        "sending incremental file list",
        "folder1/folder2/IMG_7440.xmp",
        " 123455332   0%  263.33MB/s    0:00:00 (xfr#2, to-chk=22854/22861)",
        "    123345   0%    4.73MB/s    1:05:31",
        "   4538368 100%  136.61kB/s    0:00:32 (xfr#554, to-chk=0/557)",
        "    12,345  12%  bogus    0:00:01",
        "",
        "sent 1,234 bytes  received 35 bytes  2,538.00 bytes/sec",
        "total size is 4,538,368  speedup is 1.00",
    ];

    fn progress(line: &str) -> ProgressSample {
        match LineDecoder::transfer().decode(line) {
            DecodedLine::Progress(sample) => sample,
            other => panic!("expected progress for {line:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_filename_line() {
        assert_eq!(
            LineDecoder::transfer().decode("folder1/IMG 7440.xmp"),
            DecodedLine::Filename(b"folder1/IMG 7440.xmp".to_vec())
        );
    }

    #[test]
    fn test_non_utf8_filename_is_kept() {
        let decoder = LineDecoder::listing();
        assert_eq!(
            decoder.decode(&b"photos/caf\xe9.jpg"[..]),
            DecodedLine::Filename(b"photos/caf\xe9.jpg".to_vec())
        );
        assert_eq!(decoder.decode(&b"   10\xff  5% 1.00kB/s 0:00:01"[..]), DecodedLine::Ignored);
    }

    #[test]
    fn test_progress_with_suffix() {
        let sample = progress("      1000  50%  100.00kB/s    0:00:01 (xfr#1, to-chk=1/2)");
        assert_eq!(sample.size, 1000);
        assert_eq!(sample.percent, 50);
        assert_eq!(sample.rate, 100_000.0);
        assert_eq!(sample.eta, "0:00:01");
        assert_eq!(sample.estimated_total(), Some(2000));
        assert_eq!(
            sample.counts,
            Some(TransferCounts {
                transferred: 1,
                remaining: 1,
                total: 2,
                kind: CheckKind::ToCheck,
            })
        );
    }

    #[test]
    fn test_progress_without_suffix() {
        let sample = progress("    123345   0%    4.73MB/s    1:05:31");
        assert_eq!(sample.size, 123345);
        assert_eq!(sample.percent, 0);
        assert_eq!(sample.counts, None);
        assert_eq!(sample.estimated_total(), None);
        assert_eq!(sample.transferred_count(), None);
        assert_eq!(sample.total_count(), None);
    }

    #[test]
    fn test_progress_with_thousands_separators() {
        let sample = progress("  1,234,567  99%   12.34MB/s    0:00:00 (xfr#3, ir-chk=10/40)");
        assert_eq!(sample.size, 1_234_567);
        assert_eq!(sample.counts.map(|c| c.kind), Some(CheckKind::IncrementalCheck));
        assert_eq!(sample.transferred_count(), Some(3));
        assert_eq!(sample.total_count(), Some(40));
    }

    #[test]
    fn test_listing_requires_suffix() {
        let decoder = LineDecoder::listing();
        assert_eq!(decoder.decode("    123345   0%    4.73MB/s    1:05:31"), DecodedLine::Ignored);
        assert!(matches!(
            decoder.decode("         0   0%    0.00kB/s    0:00:00 (xfr#0, ir-chk=1000/1005)"),
            DecodedLine::Progress(_)
        ));
    }

    #[test]
    fn test_malformed_progress_is_ignored() {
        let decoder = LineDecoder::transfer();
        for line in [
            "    12,345  12%  bogus    0:00:01",
            "    abc  12%  1.00kB/s    0:00:01",
            "    100  x%  1.00kB/s    0:00:01",
            "    100  12% ",
            "  some indented noise",
        ] {
            assert_eq!(decoder.decode(line), DecodedLine::Ignored, "{line:?}");
        }
    }

    #[test]
    fn test_boilerplate_is_ignored() {
        let decoder = LineDecoder::transfer();
        for line in [
            "sending incremental file list",
            "building file list ... done",
            "sent 1,234 bytes  received 35 bytes  2,538.00 bytes/sec",
            "total size is 4,538,368  speedup is 1.00",
            "total size is 4,538,368  speedup is 1.00 (DRY RUN)",
            "created directory /backup/dest",
        ] {
            assert_eq!(decoder.decode(line), DecodedLine::Ignored, "{line:?}");
        }
    }

    #[test]
    fn test_decoding_is_deterministic() {
        let first: Vec<_> = CAPTURED.iter().map(|l| LineDecoder::transfer().decode(l)).collect();
        let decoder = LineDecoder::transfer();
        let second: Vec<_> = CAPTURED.iter().map(|l| decoder.decode(l)).collect();
        assert_eq!(first, second);

        let progress_count = first
            .iter()
            .filter(|d| matches!(d, DecodedLine::Progress(_)))
            .count();
        assert_eq!(progress_count, 3);
    }
}
