//! `multipart/form-data` codec.
//!
//! The decoder is a single left-to-right scan over the collected body, driven by an
//! explicit state machine (see [`MultipartDecoder`]). It never fails: malformed input
//! degrades to whatever complete parts were found before the damage.
//!
//! The encoder produces the standard wire form and is mostly useful for clients and tests.

mod decoder;
mod encoder;

pub use decoder::MultipartDecoder;
pub use encoder::MultipartEncoder;

use bytes::Bytes;

/// One decoded segment of a multipart body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Part {
    name: Option<String>,
    filename: Option<String>,
    content_type: Option<String>,
    payload: Bytes,
}

impl Part {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    /// The `name` token of the `content-disposition` header.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// The `filename` token of the `content-disposition` header.
    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    /// The raw `content-type` header value of this part.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// Builds a part from its header list (names lower-cased) and payload.
    ///
    /// Only the first `content-disposition` and `content-type` headers are considered.
    /// Disposition tokens that are not exactly `key=value` are ignored, quotes are stripped
    /// from the values.
    pub(crate) fn from_headers(headers: &[(String, String)], payload: Bytes) -> Self {
        let mut part = Part { payload, ..Part::default() };

        let disposition = find_header(headers, "content-disposition").unwrap_or_default();
        for token in disposition.split(';') {
            let pieces = token.split('=').collect::<Vec<_>>();
            let [key, value] = pieces.as_slice() else {
                continue;
            };

            let value = value.trim().replace('"', "");
            match key.trim() {
                "name" => part.name = Some(value),
                "filename" => part.filename = Some(value),
                _ => {}
            }
        }

        part.content_type = find_header(headers, "content-type").filter(|value| !value.is_empty()).map(str::to_string);
        part
    }
}

fn find_header<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers.iter().find(|(header_name, _)| header_name == name).map(|(_, value)| value.as_str())
}

/// Extracts the `boundary` parameter from a `content-type` header value.
///
/// The parameter name is matched case-insensitively; the value runs up to the next `;`.
/// Surrounding quotes are removed. Returns `None` when the parameter is missing or empty.
pub fn parse_boundary(content_type: &str) -> Option<&str> {
    const KEY: &str = "boundary=";

    let start = content_type.to_ascii_lowercase().find(KEY)? + KEY.len();
    let rest = &content_type[start..];
    let value = rest.split(';').next().unwrap_or_default();
    let value = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')).unwrap_or(value);

    if value.is_empty() { None } else { Some(value) }
}

#[cfg(test)]
mod tests {
    use super::{parse_boundary, Part};
    use bytes::Bytes;

    fn headers(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect()
    }

    #[test]
    fn test_parse_boundary() {
        assert_eq!(parse_boundary("multipart/form-data; boundary=abc"), Some("abc"));
        assert_eq!(parse_boundary("multipart/form-data; BOUNDARY=AbC; charset=utf-8"), Some("AbC"));
        assert_eq!(parse_boundary("multipart/form-data; boundary=\"quoted\""), Some("quoted"));
        assert_eq!(parse_boundary("multipart/form-data; boundary="), None);
        assert_eq!(parse_boundary("multipart/form-data"), None);
    }

    #[test]
    fn test_part_from_disposition() {
        let part = Part::from_headers(
            &headers(&[
                ("content-disposition", "form-data; name=\"avatar\"; filename=\"me.png\""),
                ("content-type", "image/png"),
            ]),
            Bytes::from_static(b"png"),
        );

        assert_eq!(part.name(), Some("avatar"));
        assert_eq!(part.filename(), Some("me.png"));
        assert_eq!(part.content_type(), Some("image/png"));
        assert_eq!(part.payload().as_ref(), b"png");
    }

    #[test]
    fn test_part_ignores_malformed_tokens() {
        let part = Part::from_headers(
            &headers(&[("content-disposition", "form-data; name=a=b; filename; size=3")]),
            Bytes::new(),
        );

        assert_eq!(part.name(), None);
        assert_eq!(part.filename(), None);
        assert_eq!(part.content_type(), None);
    }

    #[test]
    fn test_part_first_header_wins() {
        let part = Part::from_headers(
            &headers(&[
                ("content-disposition", "form-data; name=first"),
                ("content-disposition", "form-data; name=second"),
                ("content-type", ""),
            ]),
            Bytes::new(),
        );

        assert_eq!(part.name(), Some("first"));
        assert_eq!(part.content_type(), None);
    }
}
