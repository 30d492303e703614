//! Compact text encoding for values that travel through ports: bincode,
//! gzipped, then base64 so it fits a string slot.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

pub fn encode_to_string<T>(data: &T) -> Result<String, String>
where
    T: Serialize,
{
    let mut compressor = GzEncoder::new(Vec::with_capacity(256), Compression::default());

    bincode::serialize_into(&mut compressor, data).map_err(|e| format!("Failed to serialize: {}", e))?;

    let compressed_data = compressor.finish().map_err(|e| format!("Failed to compress: {}", e))?;

    Ok(STANDARD.encode(compressed_data))
}

pub fn decode_from_string<T>(data: &str) -> Result<T, String>
where
    for<'de> T: Deserialize<'de>,
{
    let compressed_data = STANDARD.decode(data.trim()).map_err(|e| format!("Failed to decode base64: {}", e))?;

    bincode::deserialize_from(GzDecoder::new(compressed_data.as_slice())).map_err(|e| format!("Failed to deserialize: {}", e))
}
