//! Bounded-memory sanitization of serialized text.

use std::io::{self, Read, Write};
use std::time::Instant;

use super::{apply_rules, Rule, SanitizeStats, Sanitizer};

pub const DEFAULT_STREAM_BUFFER_SIZE: usize = 64 * 1024;
pub const MIN_STREAM_BUFFER_SIZE: usize = 64;

/// `Write` adapter that redacts text in chunks of at most `buffer_size`
/// bytes before passing it on.
///
/// Chunks end at the last newline inside the buffer when there is one, and
/// never inside a UTF-8 sequence. A match spanning two chunks is not
/// redacted. Call [`SanitizingWriter::finish`] to flush the tail and record
/// statistics on the sanitizer.
pub struct SanitizingWriter<'a, W: Write> {
    sanitizer: &'a Sanitizer,
    rules: Vec<Rule>,
    inner: Option<W>,
    buf: Vec<u8>,
    capacity: usize,
    run: SanitizeStats,
    started: Instant,
}

impl<'a, W: Write> SanitizingWriter<'a, W> {
    pub fn new(sanitizer: &'a Sanitizer, inner: W, buffer_size: usize) -> Self {
        let capacity = buffer_size.max(MIN_STREAM_BUFFER_SIZE);
        Self {
            sanitizer,
            rules: sanitizer.rules(),
            inner: Some(inner),
            buf: Vec::with_capacity(capacity),
            capacity,
            run: SanitizeStats::default(),
            started: Instant::now(),
        }
    }

    /// Process buffered text and return the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        self.drain(true)?;
        self.publish_stats();
        let mut inner = self
            .inner
            .take()
            .ok_or_else(|| io::Error::other("sanitizing writer already finished"))?;
        inner.flush()?;
        Ok(inner)
    }

    fn publish_stats(&mut self) {
        let mut run = std::mem::take(&mut self.run);
        run.duration = self.started.elapsed();
        self.sanitizer.record_stats(run);
    }

    fn drain(&mut self, final_chunk: bool) -> io::Result<()> {
        while self.buf.len() >= self.capacity || (final_chunk && !self.buf.is_empty()) {
            let limit = self.buf.len().min(self.capacity);
            let mut cut = if final_chunk && self.buf.len() <= self.capacity {
                limit
            } else {
                self.buf[..limit]
                    .iter()
                    .rposition(|b| *b == b'\n')
                    .map(|i| i + 1)
                    .unwrap_or(limit)
            };
            if let Err(err) = std::str::from_utf8(&self.buf[..cut]) {
                // Incomplete trailing sequence: stop before it.
                if err.error_len().is_none() && err.valid_up_to() > 0 {
                    cut = err.valid_up_to();
                }
            }

            let inner = self
                .inner
                .as_mut()
                .ok_or_else(|| io::Error::other("sanitizing writer already finished"))?;
            match std::str::from_utf8(&self.buf[..cut]) {
                Ok(text) => match apply_rules(&self.rules, text, &mut self.run) {
                    Some(rewritten) => inner.write_all(rewritten.as_bytes())?,
                    None => inner.write_all(text.as_bytes())?,
                },
                Err(_) => {
                    tracing::warn!(bytes = cut, "passing through non-UTF-8 chunk unsanitized");
                    self.run.bytes_processed += cut as u64;
                    inner.write_all(&self.buf[..cut])?;
                }
            }
            self.buf.drain(..cut);
        }
        Ok(())
    }
}

impl<W: Write> Write for SanitizingWriter<'_, W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let room = self.capacity - self.buf.len();
        let take = room.min(data.len());
        self.buf.extend_from_slice(&data[..take]);
        if self.buf.len() >= self.capacity {
            self.drain(false)?;
        }
        Ok(take)
    }

    /// Flushes the inner writer only; buffered text waits for more input or
    /// `finish` so chunk boundaries do not move.
    fn flush(&mut self) -> io::Result<()> {
        match self.inner.as_mut() {
            Some(inner) => inner.flush(),
            None => Ok(()),
        }
    }
}

impl<W: Write> Drop for SanitizingWriter<'_, W> {
    fn drop(&mut self) {
        if self.inner.is_some() {
            if let Err(err) = self.drain(true) {
                tracing::warn!(error = %err, "failed to flush sanitizing writer on drop");
            }
            self.publish_stats();
        }
    }
}

impl Sanitizer {
    pub fn stream_writer<W: Write>(&self, inner: W, buffer_size: usize) -> SanitizingWriter<'_, W> {
        SanitizingWriter::new(self, inner, buffer_size)
    }

    /// Copy `reader` to `writer`, redacting through a buffer of
    /// `buffer_size` bytes. Returns the number of input bytes consumed.
    pub fn sanitize_stream<R: Read, W: Write>(
        &self,
        mut reader: R,
        writer: W,
        buffer_size: usize,
    ) -> io::Result<u64> {
        let mut sanitizing = self.stream_writer(writer, buffer_size);
        let copied = io::copy(&mut reader, &mut sanitizing)?;
        sanitizing.finish()?;
        tracing::debug!(bytes = copied, "stream sanitized");
        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn stream_redacts_line_delimited_input() {
        let sanitizer = Sanitizer::with_default_rules();
        let input = "user=ada\npassword=hunter2\ntoken: abc123\n".repeat(20);

        let mut out = Vec::new();
        let copied = sanitizer
            .sanitize_stream(Cursor::new(input.as_bytes()), &mut out, 64)
            .unwrap();

        let text = String::from_utf8(out).unwrap();
        assert_eq!(copied, input.len() as u64);
        assert!(!text.contains("hunter2"));
        assert!(!text.contains("abc123"));
        assert_eq!(text.matches("password=[REDACTED]").count(), 20);
        assert_eq!(sanitizer.stats().redacted_count, 40);
        assert_eq!(sanitizer.stats().bytes_processed, input.len() as u64);
    }

    #[test]
    fn buffered_bytes_never_exceed_capacity() {
        let sanitizer = Sanitizer::new();
        let mut writer = sanitizer.stream_writer(Vec::new(), 64);
        let accepted = writer.write(&[b'a'; 500]).unwrap();
        assert!(accepted <= 64);
        assert!(writer.buf.len() < 64);
    }

    #[test]
    fn multibyte_characters_are_not_split() {
        let sanitizer = Sanitizer::new();
        sanitizer.must_add_pattern("é", "e", 1, "accent");
        let input = "é".repeat(200);

        let mut out = Vec::new();
        sanitizer
            .sanitize_stream(Cursor::new(input.as_bytes()), &mut out, 65)
            .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "e".repeat(200));
    }

    #[test]
    fn small_input_is_flushed_on_finish() {
        let sanitizer = Sanitizer::with_default_rules();
        let mut writer = sanitizer.stream_writer(Vec::new(), 1024);
        writer.write_all(b"pwd=abc").unwrap();
        let out = writer.finish().unwrap();
        assert_eq!(out, b"pwd=[REDACTED]");
    }
}
