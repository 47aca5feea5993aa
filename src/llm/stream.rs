//! Incremental display of streamed completion output.

use crate::config::StreamStyle;
use crate::Result;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::time::Instant;

const FLUSH_INTERVAL_MS: u128 = 50;
const FLUSH_THRESHOLD_BYTES: usize = 400;

/// Renders stream deltas to stdout as they arrive.
///
/// Compact mode coalesces whitespace and flushes in small time/size-bounded
/// chunks; raw mode writes every delta through unmodified. The transcript
/// sink receives every chunk verbatim regardless of display mode, as a
/// durable record distinct from the display buffering.
pub struct StreamPrinter {
    style: StreamStyle,
    buf: String,
    last_flush: Instant,
    transcript: Option<File>,
    transcript_error: Option<io::Error>,
}

impl StreamPrinter {
    pub fn new(style: StreamStyle, transcript: Option<&Path>) -> io::Result<Self> {
        let transcript = match transcript {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                Some(File::create(path)?)
            }
            None => None,
        };

        Ok(Self {
            style,
            buf: String::new(),
            last_flush: Instant::now(),
            transcript,
            transcript_error: None,
        })
    }

    /// Feed one delta into the display and the transcript sink.
    pub fn add(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }

        self.write_transcript(text);

        match self.style {
            StreamStyle::Raw => {
                let mut stdout = io::stdout();
                let _ = stdout.write_all(text.as_bytes());
                let _ = stdout.flush();
            }
            StreamStyle::Compact => {
                self.buf.push_str(text);
                if self.last_flush.elapsed().as_millis() > FLUSH_INTERVAL_MS
                    || self.buf.len() > FLUSH_THRESHOLD_BYTES
                {
                    self.flush_compact();
                }
            }
        }
    }

    /// Flush any buffered display output and surface a deferred transcript
    /// write failure. The display itself is best-effort; the transcript is
    /// not.
    pub fn finish(mut self) -> Result<()> {
        if !self.buf.is_empty() {
            self.flush_compact();
        }
        if let Some(error) = self.transcript_error.take() {
            return Err(error.into());
        }
        Ok(())
    }

    fn flush_compact(&mut self) {
        let chunk = collapse_whitespace(&self.buf);
        let mut stdout = io::stdout();
        let _ = stdout.write_all(chunk.as_bytes());
        let _ = stdout.flush();
        self.buf.clear();
        self.last_flush = Instant::now();
    }

    fn write_transcript(&mut self, text: &str) {
        if self.transcript_error.is_some() {
            return;
        }
        if let Some(file) = self.transcript.as_mut() {
            if let Err(error) = file.write_all(text.as_bytes()) {
                self.transcript_error = Some(error);
            }
        }
    }
}

fn collapse_whitespace(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut in_whitespace = false;
    for c in s.chars() {
        if matches!(c, ' ' | '\t' | '\r' | '\n') {
            if !in_whitespace {
                out.push(' ');
            }
            in_whitespace = true;
        } else {
            out.push(c);
            in_whitespace = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("a  b\t\nc"), "a b c");
        assert_eq!(collapse_whitespace("{\n  \"a\": 1\n}"), "{ \"a\": 1 }");
        assert_eq!(collapse_whitespace("clean"), "clean");
    }

    #[test]
    fn test_transcript_receives_chunks_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("stream.log");

        let mut printer = StreamPrinter::new(StreamStyle::Compact, Some(&log)).unwrap();
        printer.add("{\n  \"caption\":");
        printer.add(" \"x\"\n}");
        printer.finish().unwrap();

        // Display coalesces whitespace, but the transcript is byte-exact.
        let recorded = std::fs::read_to_string(&log).unwrap();
        assert_eq!(recorded, "{\n  \"caption\": \"x\"\n}");
    }

    #[test]
    fn test_transcript_truncated_per_session() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("stream.log");
        std::fs::write(&log, "stale content").unwrap();

        let mut printer = StreamPrinter::new(StreamStyle::Raw, Some(&log)).unwrap();
        printer.add("fresh");
        printer.finish().unwrap();

        assert_eq!(std::fs::read_to_string(&log).unwrap(), "fresh");
    }

    #[test]
    fn test_transcript_parent_dir_created() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("nested/logs/stream.log");

        let mut printer = StreamPrinter::new(StreamStyle::Raw, Some(&log)).unwrap();
        printer.add("x");
        printer.finish().unwrap();

        assert!(log.exists());
    }
}
