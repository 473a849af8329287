//! Frame: one output record per emitted line.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::Serialize;

/// Key holding the line text in a JSON-lines record.
pub const LINE_KEY: &str = "l";

/// One-to-one transform from a line to an output record.
pub trait Framer {
    fn frame(&self, line: &[u8]) -> Bytes;
}

#[derive(Serialize)]
struct FramedRecord<'a> {
    #[serde(flatten)]
    metadata: &'a BTreeMap<String, String>,
    l: &'a str,
}

/// Wraps each line in a single-line JSON object, newline-terminated.
///
/// Static metadata fields come first, followed by `"l"` holding the line.
/// Line bytes that are not valid UTF-8 are replaced with U+FFFD; quotes and
/// control characters are escaped by `serde_json`.
#[derive(Debug, Clone, Default)]
pub struct JsonLinesFramer {
    metadata: BTreeMap<String, String>,
}

impl JsonLinesFramer {
    pub fn new(metadata: BTreeMap<String, String>) -> Self {
        Self { metadata }
    }

    /// Framer that tags every record with `{"svc": <service>}`.
    pub fn with_service(service: impl Into<String>) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("svc".to_string(), service.into());
        Self { metadata }
    }

    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }
}

impl Framer for JsonLinesFramer {
    fn frame(&self, line: &[u8]) -> Bytes {
        let text = String::from_utf8_lossy(line);
        let record = FramedRecord {
            metadata: &self.metadata,
            l: &text,
        };

        let mut out = Vec::with_capacity(line.len() + 16);
        // Serializing string maps and a &str into a Vec cannot fail.
        if serde_json::to_writer(&mut out, &record).is_err() {
            out.clear();
            out.extend_from_slice(b"{}");
        }
        out.push(b'\n');
        Bytes::from(out)
    }
}

/// Passes line bytes through verbatim with a trailing newline.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawLineFramer;

impl Framer for RawLineFramer {
    fn frame(&self, line: &[u8]) -> Bytes {
        let mut out = Vec::with_capacity(line.len() + 1);
        out.extend_from_slice(line);
        out.push(b'\n');
        Bytes::from(out)
    }
}
