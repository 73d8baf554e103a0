//! Line framing for rsync's progress output.
//!
//! `--info=progress2` rewrites its status line in place with a carriage
//! return, so a reader that only splits on `\n` would see one huge line per
//! file. [`ProgressLineCodec`] splits on either delimiter and drops the empty
//! fragments a `\r\n` pair leaves behind.
//!
//! Lines stay raw bytes: file names are not necessarily UTF-8 and must reach
//! `--files-from` unchanged.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::Decoder;

/// Longest line kept before it is cut into pieces.
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Splits a byte stream on `\r` or `\n` and yields the non-empty lines.
#[derive(Debug, Clone, Default)]
pub struct ProgressLineCodec {
    /// Bytes of `buf` already scanned without finding a delimiter.
    scanned: usize,
}

impl ProgressLineCodec {
    pub fn new() -> Self {
        Self::default()
    }

    fn take_line(buf: &mut BytesMut, len: usize, skip: usize) -> Bytes {
        let line = buf.split_to(len).freeze();
        let _ = buf.split_to(skip);
        line
    }
}

impl Decoder for ProgressLineCodec {
    type Item = Bytes;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, Self::Error> {
        loop {
            let found = buf[self.scanned..]
                .iter()
                .position(|b| *b == b'\r' || *b == b'\n')
                .map(|offset| self.scanned + offset);

            match found {
                Some(index) => {
                    self.scanned = 0;
                    let line = Self::take_line(buf, index, 1);
                    if line.is_empty() {
                        continue;
                    }
                    return Ok(Some(line));
                }
                None if buf.len() >= MAX_LINE_LENGTH => {
                    self.scanned = 0;
                    return Ok(Some(Self::take_line(buf, MAX_LINE_LENGTH, 0)));
                }
                None => {
                    self.scanned = buf.len();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Bytes>, Self::Error> {
        if let Some(line) = self.decode(buf)? {
            return Ok(Some(line));
        }

        self.scanned = 0;
        if buf.is_empty() {
            return Ok(None);
        }

        let len = buf.len();
        Ok(Some(Self::take_line(buf, len, 0)))
    }
}
