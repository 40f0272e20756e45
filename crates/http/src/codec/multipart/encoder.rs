use bytes::{BufMut, Bytes, BytesMut};

use super::Part;

/// Writes parts in the standard `multipart/form-data` wire form.
///
/// Every part starts with `--{boundary}` and a header block terminated by an empty line;
/// its payload is followed by CRLF. The body ends with `--{boundary}--` and CRLF.
#[derive(Debug)]
pub struct MultipartEncoder {
    boundary: String,
    buf: BytesMut,
}

impl MultipartEncoder {
    pub fn new(boundary: impl Into<String>) -> Self {
        Self { boundary: boundary.into(), buf: BytesMut::new() }
    }

    /// The `content-type` header value announcing this encoder's boundary.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    #[must_use]
    pub fn part(mut self, part: Part) -> Self {
        self.buf.reserve(self.boundary.len() + part.payload().len() + 128);

        self.buf.put_slice(b"--");
        self.buf.put_slice(self.boundary.as_bytes());
        self.buf.put_slice(b"\r\n");

        if part.name().is_some() || part.filename().is_some() {
            self.buf.put_slice(b"Content-Disposition: form-data");
            if let Some(name) = part.name() {
                self.buf.put_slice(format!("; name=\"{name}\"").as_bytes());
            }
            if let Some(filename) = part.filename() {
                self.buf.put_slice(format!("; filename=\"{filename}\"").as_bytes());
            }
            self.buf.put_slice(b"\r\n");
        }

        if let Some(content_type) = part.content_type() {
            self.buf.put_slice(b"Content-Type: ");
            self.buf.put_slice(content_type.as_bytes());
            self.buf.put_slice(b"\r\n");
        }

        self.buf.put_slice(b"\r\n");
        self.buf.put_slice(part.payload());
        self.buf.put_slice(b"\r\n");
        self
    }

    pub fn finish(mut self) -> Bytes {
        self.buf.put_slice(b"--");
        self.buf.put_slice(self.boundary.as_bytes());
        self.buf.put_slice(b"--\r\n");
        self.buf.freeze()
    }
}
