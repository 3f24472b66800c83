//! Deflate + base64 payload encoding for large renderings.

use crate::error::RenderError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

pub fn compress_payload(html: &str) -> Result<String, RenderError> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(html.as_bytes())
        .map_err(|e| RenderError::Serialization(format!("Failed to compress payload: {}", e)))?;
    let bytes = encoder
        .finish()
        .map_err(|e| RenderError::Serialization(format!("Failed to compress payload: {}", e)))?;
    Ok(STANDARD.encode(bytes))
}

pub fn decompress_payload(encoded: &str) -> Result<String, RenderError> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| RenderError::Serialization(format!("Invalid payload encoding: {}", e)))?;
    let mut decoder = ZlibDecoder::new(bytes.as_slice());
    let mut html = String::new();
    decoder
        .read_to_string(&mut html)
        .map_err(|e| RenderError::Serialization(format!("Failed to decompress payload: {}", e)))?;
    Ok(html)
}
