//! Driving rsync: command construction, output framing and line decoding.

pub mod command;
pub mod decoder;
pub mod lines;

pub use command::RsyncCommand;
pub use decoder::{CheckKind, DecodedLine, LineDecoder, ProgressSample, SuffixPolicy, TransferCounts};
