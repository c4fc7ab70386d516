use std::io::{ErrorKind, Read};
use std::time::{Duration, Instant};

use crate::error::{HwError, Result};

/// Longest line accepted from the board; anything longer is garbage on the wire.
pub const MAX_LINE_BYTES: usize = 512;

/// Assembles newline-terminated lines from a byte stream that may deliver
/// partial chunks. Bytes after the first newline are kept for the next call.
/// Lines longer than `MAX_LINE_BYTES` are rejected whole, including any tail
/// that arrives after the overflow was reported.
pub struct LineReader<R> {
    inner: R,
    buf: Vec<u8>,
    max_len: usize,
    discarding: bool,
    poll_interval: Duration,
}

impl<R: Read> LineReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::with_capacity(128),
            max_len: MAX_LINE_BYTES,
            discarding: false,
            poll_interval: Duration::from_millis(10),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    /// Return the next complete line (without `\r\n`), or `Ok(None)` once
    /// `timeout` expires. An empty read is treated as "no data yet" and
    /// retried after `poll_interval` so the loop never spins.
    pub fn read_line_with_timeout(&mut self, timeout: Duration) -> Result<Option<String>> {
        let deadline = Instant::now() + timeout;
        let mut chunk = [0u8; 128];
        loop {
            if self.discarding {
                self.skip_overflow_tail();
            }
            if !self.discarding {
                if let Some(line) = self.take_line()? {
                    return Ok(Some(line));
                }
                if self.buf.len() > self.max_len {
                    let len = self.buf.len();
                    self.buf.clear();
                    self.discarding = true;
                    return Err(HwError::Overflow(len));
                }
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            match self.inner.read(&mut chunk) {
                Ok(0) => std::thread::sleep(self.poll_interval),
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                    std::thread::sleep(self.poll_interval);
                }
                Err(e) => return Err(HwError::Io(e)),
            }
        }
    }

    /// Drop the rest of an overlong line, up to and including its newline.
    fn skip_overflow_tail(&mut self) {
        match self.buf.iter().position(|b| *b == b'\n') {
            Some(pos) => {
                self.buf.drain(..=pos);
                self.discarding = false;
            }
            None => self.buf.clear(),
        }
    }

    fn take_line(&mut self) -> Result<Option<String>> {
        let Some(pos) = self.buf.iter().position(|b| *b == b'\n') else {
            return Ok(None);
        };
        let mut raw: Vec<u8> = self.buf.drain(..=pos).collect();
        raw.pop();
        if raw.last() == Some(&b'\r') {
            raw.pop();
        }
        if raw.len() > self.max_len {
            return Err(HwError::Overflow(raw.len()));
        }
        String::from_utf8(raw)
            .map(Some)
            .map_err(|_| HwError::Encoding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn splits_lines_and_keeps_remainder() {
        let mut r = LineReader::new(Cursor::new(b"R:1;G:2;IR:3\r\nR:4".to_vec()))
            .with_poll_interval(Duration::from_millis(1));
        let first = r.read_line_with_timeout(Duration::from_millis(20)).unwrap();
        assert_eq!(first.as_deref(), Some("R:1;G:2;IR:3"));
        // Partial tail never completes; times out instead of blocking.
        let second = r.read_line_with_timeout(Duration::from_millis(5)).unwrap();
        assert_eq!(second, None);
    }

    #[test]
    fn rejects_invalid_utf8_but_recovers() {
        let mut r = LineReader::new(Cursor::new(b"\xff\xfe\nCH:1\n".to_vec()));
        assert!(matches!(
            r.read_line_with_timeout(Duration::from_millis(20)),
            Err(HwError::Encoding)
        ));
        let next = r.read_line_with_timeout(Duration::from_millis(20)).unwrap();
        assert_eq!(next.as_deref(), Some("CH:1"));
    }
}
