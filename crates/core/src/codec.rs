// crates/core/src/codec.rs
//! Optional argument compression.
//!
//! A job class that compresses its arguments registers an [`ArgDecompressor`];
//! classes without one have their recorded arguments passed through untouched.

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;

use crate::error::CodecError;

pub trait ArgDecompressor: Send + Sync {
    /// Whether `args` are in this codec's compressed form.
    fn is_compressed(&self, args: &[Value]) -> bool;

    fn decompress(&self, args: &[Value]) -> Result<Vec<Value>, CodecError>;
}

/// Compressed args are a single object `{"payload": "<base64 gzip of the JSON array>"}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GzipArgs;

const PAYLOAD: &str = "payload";

impl GzipArgs {
    pub fn compress(&self, args: &[Value]) -> Result<Vec<Value>, CodecError> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&serde_json::to_vec(args)?)?;
        let bytes = encoder.finish()?;
        let mut envelope = serde_json::Map::new();
        envelope.insert(PAYLOAD.to_string(), Value::String(STANDARD.encode(bytes)));
        Ok(vec![Value::Object(envelope)])
    }
}

impl ArgDecompressor for GzipArgs {
    fn is_compressed(&self, args: &[Value]) -> bool {
        match args {
            [Value::Object(map)] => map.len() == 1 && map.get(PAYLOAD).is_some_and(Value::is_string),
            _ => false,
        }
    }

    fn decompress(&self, args: &[Value]) -> Result<Vec<Value>, CodecError> {
        let encoded = match args {
            [Value::Object(map)] => map.get(PAYLOAD).and_then(Value::as_str),
            _ => None,
        }
        .ok_or_else(|| CodecError::Envelope("expected a single {\"payload\": ...} object".into()))?;

        let bytes = STANDARD.decode(encoded)?;
        let mut json = Vec::new();
        GzDecoder::new(bytes.as_slice()).read_to_end(&mut json)?;
        Ok(serde_json::from_slice(&json)?)
    }
}
