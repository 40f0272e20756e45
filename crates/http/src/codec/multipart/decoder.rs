//! Byte-level `multipart/form-data` decoder.
//!
//! The body is scanned once, one byte at a time. A line buffer collects every byte that is
//! neither CR nor LF; a CR immediately followed by LF marks a newline, and the line buffer is
//! reset only after the newline byte has been handled by the current state:
//!
//! ```text
//!   Init ──"--boundary"──▶ ReadingHeaders ──empty line──▶ ReadingData
//!                               ▲                              │
//!                               │                       "--boundary"
//!                               │                              ▼
//!                               └────────newline─────────── Separator
//! ```
//!
//! While reading data the line buffer is bounded to `boundary length + 4` bytes. A longer
//! line is noise: it is dropped and ignored until the next newline, so it can never be
//! mistaken for a boundary.

use bytes::Bytes;
use tracing::trace;

use super::Part;

const CR: u8 = b'\r';
const LF: u8 = b'\n';

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Init,
    ReadingHeaders,
    ReadingData,
    Separator,
}

/// Decodes a complete `multipart/form-data` body into its parts.
#[derive(Debug, Clone)]
pub struct MultipartDecoder {
    /// `--{boundary}`
    delimiter: Vec<u8>,
}

impl MultipartDecoder {
    pub fn new(boundary: impl AsRef<str>) -> Self {
        let boundary = boundary.as_ref().as_bytes();
        let mut delimiter = Vec::with_capacity(boundary.len() + 2);
        delimiter.extend_from_slice(b"--");
        delimiter.extend_from_slice(boundary);
        Self { delimiter }
    }

    pub fn decode(&self, body: &[u8]) -> Vec<Part> {
        Scan::new(&self.delimiter).run(body)
    }
}

/// Mutable state of one decoding pass.
struct Scan<'d> {
    delimiter: &'d [u8],
    max_line: usize,
    state: State,
    line: Vec<u8>,
    overflowed: bool,
    data: Vec<u8>,
    headers: Vec<(String, String)>,
    parts: Vec<Part>,
}

impl<'d> Scan<'d> {
    fn new(delimiter: &'d [u8]) -> Self {
        // delimiter is "--" + boundary, so this is boundary length + 4
        let max_line = delimiter.len() + 2;
        Self {
            delimiter,
            max_line,
            state: State::Init,
            line: Vec::with_capacity(max_line + 1),
            overflowed: false,
            data: Vec::new(),
            headers: Vec::new(),
            parts: Vec::new(),
        }
    }

    fn run(mut self, body: &[u8]) -> Vec<Part> {
        let mut prev = None;

        for &byte in body {
            if byte != CR && byte != LF {
                self.line.push(byte);
            }
            let newline = byte == LF && prev == Some(CR);
            prev = Some(byte);

            match self.state {
                State::Init if newline => {
                    if self.line == self.delimiter {
                        self.state = State::ReadingHeaders;
                    }
                    self.line.clear();
                }
                State::ReadingHeaders if newline => {
                    if self.line.is_empty() {
                        self.state = State::ReadingData;
                        self.data.clear();
                    } else if let Some(header) = parse_header_line(&self.line) {
                        self.headers.push(header);
                    }
                    self.line.clear();
                }
                State::ReadingData => self.read_data(byte, newline),
                State::Separator if newline => {
                    self.state = State::ReadingHeaders;
                    self.line.clear();
                }
                _ => {}
            }
        }

        trace!(parts = self.parts.len(), "multipart body decoded");
        self.parts
    }

    fn read_data(&mut self, byte: u8, newline: bool) {
        if self.overflowed {
            self.line.clear();
        } else if self.line.len() > self.max_line {
            self.line.clear();
            self.overflowed = true;
        }

        if self.line == self.delimiter {
            self.close_part();
        } else {
            self.data.push(byte);
        }

        if newline {
            self.line.clear();
            self.overflowed = false;
        }
    }

    /// Emits the current part once the line buffer matched the delimiter.
    ///
    /// The current byte (the last delimiter byte) was never pushed, so the accumulator ends
    /// with the CRLF preceding the boundary line followed by the rest of the delimiter.
    fn close_part(&mut self) {
        let end = self.data.len().saturating_sub(self.line.len() + 1);
        self.data.truncate(end);

        let payload = Bytes::from(std::mem::take(&mut self.data));
        let headers = std::mem::take(&mut self.headers);
        self.parts.push(Part::from_headers(&headers, payload));

        self.line.clear();
        self.state = State::Separator;
    }
}

/// Splits a header line on its first colon; the name is lower-cased, the value trimmed.
fn parse_header_line(line: &[u8]) -> Option<(String, String)> {
    let colon = line.iter().position(|&b| b == b':').filter(|&index| index > 0)?;
    let name = String::from_utf8_lossy(&line[..colon]).to_lowercase();
    let value = String::from_utf8_lossy(&line[colon + 1..]).trim().to_string();
    Some((name, value))
}
