//! Newline-delimited reader with a per-line length cap.
//!
//! `next_line` keeps all partial state in the struct, so it can sit in a `select!` arm and
//! be cancelled between polls without losing bytes.

use std::io;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

#[derive(Debug, PartialEq, Eq)]
pub enum LineEvent {
    Line(String),
    /// A line grew past the cap. Its bytes up to the next newline are discarded.
    TooLong,
}

pub struct BoundedLines<R> {
    reader: BufReader<R>,
    buf: Vec<u8>,
    max: usize,
    discarding: bool,
}

impl<R: AsyncRead + Unpin> BoundedLines<R> {
    pub fn new(reader: R, max: usize) -> Self {
        Self {
            reader: BufReader::new(reader),
            buf: Vec::new(),
            max: max.max(1),
            discarding: false,
        }
    }

    /// Next line without its terminator, or `None` at end of stream.
    ///
    /// An over-long line is reported once as [`LineEvent::TooLong`]; reading then resumes
    /// after its newline.
    pub async fn next_line(&mut self) -> io::Result<Option<LineEvent>> {
        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                if self.discarding || self.buf.is_empty() {
                    self.discarding = false;
                    self.buf.clear();
                    return Ok(None);
                }
                return Ok(Some(LineEvent::Line(self.take_line())));
            }

            let newline = available.iter().position(|&b| b == b'\n');
            let chunk = newline.map_or(available.len(), |i| i);
            let consumed = newline.map_or(available.len(), |i| i + 1);

            if self.discarding {
                self.reader.consume(consumed);
                if newline.is_some() {
                    self.discarding = false;
                }
                continue;
            }

            if self.buf.len() + chunk > self.max {
                self.reader.consume(consumed);
                self.buf.clear();
                self.discarding = newline.is_none();
                return Ok(Some(LineEvent::TooLong));
            }

            self.buf.extend_from_slice(&available[..chunk]);
            self.reader.consume(consumed);
            if newline.is_some() {
                return Ok(Some(LineEvent::Line(self.take_line())));
            }
        }
    }

    fn take_line(&mut self) -> String {
        if self.buf.last() == Some(&b'\r') {
            self.buf.pop();
        }
        let line = String::from_utf8_lossy(&self.buf).into_owned();
        self.buf.clear();
        line
    }
}
