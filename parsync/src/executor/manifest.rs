//! Manifest types for the dry-run listing.
//!
//! The listing pass prints one itemized line per item that needs syncing:
//!
//! ```text
//! >f+++++++++ photos/2023/IMG_0001.jpg
//! cd+++++++++ photos/2023/
//! ```
//!
//! The first 12 columns hold the change code and its separator, the rest is
//! the path relative to the transfer root.

use std::borrow::Cow;

/// Width of the itemize prefix: 11 change flags plus one space.
pub const ATTRIBUTE_WIDTH: usize = 12;

/// One item from the listing pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Path bytes exactly as rsync printed them.
    pub path: Vec<u8>,
    pub attributes: String,
}

impl ManifestEntry {
    pub fn new(path: impl Into<Vec<u8>>, attributes: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            attributes: attributes.into(),
        }
    }

    /// Parse an itemized listing line.
    ///
    /// A trailing `/` is removed from directory paths; `--files-from` input
    /// names directories without it.
    pub fn from_listing_line(line: &[u8]) -> Option<Self> {
        if line.len() <= ATTRIBUTE_WIDTH {
            return None;
        }

        let (attributes, path) = line.split_at(ATTRIBUTE_WIDTH);
        let path = path.strip_suffix(b"/").unwrap_or(path);
        if path.is_empty() {
            return None;
        }

        let attributes = String::from_utf8_lossy(attributes);
        Some(Self::new(path, attributes.trim_end()))
    }

    /// Path for display; invalid UTF-8 is replaced.
    pub fn display_path(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.path)
    }
}

/// Split `entries` into `njobs` contiguous batches.
///
/// Every batch gets `len / njobs` entries and the last one also takes the
/// remainder. With fewer entries than jobs the leading batches are empty.
pub fn partition(mut entries: Vec<ManifestEntry>, njobs: usize) -> Vec<Vec<ManifestEntry>> {
    let njobs = njobs.max(1);
    let size = entries.len() / njobs;
    let mut batches = Vec::with_capacity(njobs);

    for _ in 0..njobs - 1 {
        let rest = entries.split_off(size);
        batches.push(entries);
        entries = rest;
    }
    batches.push(entries);

    batches
}
