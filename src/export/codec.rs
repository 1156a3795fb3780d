//! Wire-format codecs and compression handling.

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::sync::Arc;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;

use crate::error::{DevtoolsError, Result};

pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
pub const DEFAULT_FORMAT: &str = "json";

/// Marshals export envelopes to and from bytes.
///
/// Envelopes pass through codecs as `serde_json::Value`, the same shape the
/// migration layer works on.
pub trait Codec: Send + Sync {
    fn name(&self) -> &str;
    fn encode(&self, value: &Value, out: &mut dyn Write) -> Result<()>;
    fn decode(&self, input: &[u8]) -> Result<Value>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec {
    pretty: bool,
}

impl JsonCodec {
    pub fn compact() -> Self {
        Self { pretty: false }
    }

    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl Codec for JsonCodec {
    fn name(&self) -> &str {
        if self.pretty {
            "json-pretty"
        } else {
            "json"
        }
    }

    fn encode(&self, value: &Value, out: &mut dyn Write) -> Result<()> {
        let written = if self.pretty {
            serde_json::to_writer_pretty(&mut *out, value)
        } else {
            serde_json::to_writer(&mut *out, value)
        };
        written.map_err(|e| DevtoolsError::serialization("writing JSON", e))?;
        out.write_all(b"\n")
            .map_err(|e| DevtoolsError::io("writing JSON", e))
    }

    fn decode(&self, input: &[u8]) -> Result<Value> {
        serde_json::from_slice(input).map_err(|e| DevtoolsError::serialization("parsing JSON", e))
    }
}

/// Name -> codec lookup.
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: HashMap<String, Arc<dyn Codec>>,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl CodecRegistry {
    pub fn empty() -> Self {
        Self {
            codecs: HashMap::new(),
        }
    }

    /// `json` and `json-pretty`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(JsonCodec::compact()));
        registry.register(Arc::new(JsonCodec::pretty()));
        registry
    }

    /// Replaces any codec already registered under the same name.
    pub fn register(&mut self, codec: Arc<dyn Codec>) {
        self.codecs.insert(codec.name().to_string(), codec);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn Codec>> {
        self.codecs
            .get(name)
            .cloned()
            .ok_or_else(|| DevtoolsError::UnknownFormat(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.codecs.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("codecs", &self.names())
            .finish()
    }
}

/// Encode `value`, optionally gzip-compressed.
pub fn encode_to(
    codec: &dyn Codec,
    value: &Value,
    out: &mut dyn Write,
    compress: bool,
) -> Result<()> {
    if compress {
        let mut gz = GzEncoder::new(out, Compression::default());
        codec.encode(value, &mut gz)?;
        gz.finish()
            .map_err(|e| DevtoolsError::io("finishing gzip stream", e))?;
        Ok(())
    } else {
        codec.encode(value, out)
    }
}

/// Read an entire payload, transparently inflating gzip input.
///
/// Detection peeks at the buffered head of the stream, so the magic bytes
/// are still part of what the decoder reads.
pub fn read_payload<R: Read>(source: R) -> Result<Vec<u8>> {
    let mut reader = BufReader::new(source);
    let compressed = {
        let head = reader
            .fill_buf()
            .map_err(|e| DevtoolsError::io("reading import header", e))?;
        is_gzip(head)
    };

    let mut bytes = Vec::new();
    if compressed {
        GzDecoder::new(reader)
            .read_to_end(&mut bytes)
            .map_err(|e| DevtoolsError::io("decompressing gzip import", e))?;
    } else {
        reader
            .read_to_end(&mut bytes)
            .map_err(|e| DevtoolsError::io("reading import", e))?;
    }
    Ok(bytes)
}

pub fn is_gzip(head: &[u8]) -> bool {
    head.len() >= 2 && head[..2] == GZIP_MAGIC
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn gzip_payload_is_detected_and_inflated() {
        let codec = JsonCodec::compact();
        let value = json!({"version": "1.0", "events": [1, 2, 3]});

        let mut compressed = Vec::new();
        encode_to(&codec, &value, &mut compressed, true).unwrap();
        assert!(is_gzip(&compressed));

        let bytes = read_payload(Cursor::new(compressed)).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), value);
    }

    #[test]
    fn plain_payload_is_read_whole() {
        let bytes = read_payload(Cursor::new(b"{\"a\":1}".to_vec())).unwrap();
        assert_eq!(bytes, b"{\"a\":1}");
    }

    #[test]
    fn corrupt_gzip_is_an_io_error() {
        let mut bogus = GZIP_MAGIC.to_vec();
        bogus.extend_from_slice(b"definitely not deflate");
        let err = read_payload(Cursor::new(bogus)).unwrap_err();
        assert!(matches!(err, DevtoolsError::Io { .. }));
    }

    #[test]
    fn unknown_format_is_reported() {
        let registry = CodecRegistry::with_defaults();
        assert_eq!(registry.names(), vec!["json", "json-pretty"]);
        assert!(matches!(
            registry.get("yaml"),
            Err(DevtoolsError::UnknownFormat(name)) if name == "yaml"
        ));
    }
}
