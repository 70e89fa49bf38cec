use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::StorageError;
use crate::record::Value;

/// Serialized payloads at or above this size are gzip-compressed.
pub const COMPRESSION_THRESHOLD: usize = 2048;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Serialize a value for storage, compressing large payloads.
pub fn encode<V: Value>(key: &str, val: &V) -> Result<Vec<u8>, StorageError> {
    let raw = serde_json::to_vec(val).map_err(|e| StorageError::Encode {
        key: key.to_string(),
        message: e.to_string(),
    })?;
    if raw.len() < COMPRESSION_THRESHOLD {
        return Ok(raw);
    }

    let mut encoder = GzEncoder::new(Vec::with_capacity(raw.len() / 2), Compression::default());
    encoder
        .write_all(&raw)
        .and_then(|_| encoder.finish())
        .map_err(|e| StorageError::Encode {
            key: key.to_string(),
            message: format!("compress: {e}"),
        })
}

/// Deserialize a stored payload, transparently decompressing it and stamping
/// the store's per-key version onto the result.
pub fn decode<V: Value>(key: &str, data: &[u8], version: i64) -> Result<V, StorageError> {
    let decode_err = |message: String| StorageError::Decode {
        key: key.to_string(),
        message,
    };

    let mut val: V = if data.starts_with(&GZIP_MAGIC) {
        let mut raw = Vec::new();
        GzDecoder::new(data)
            .read_to_end(&mut raw)
            .map_err(|e| decode_err(format!("decompress: {e}")))?;
        serde_json::from_slice(&raw).map_err(|e| decode_err(e.to_string()))?
    } else {
        serde_json::from_slice(data).map_err(|e| decode_err(e.to_string()))?
    };
    val.set_version(version);
    Ok(val)
}
