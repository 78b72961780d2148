//! Transparent payload compression.
//!
//! Zlib codec used by the engine for payloads at or above the configured
//! threshold. The codec itself is threshold-agnostic: whether a payload gets
//! compressed is engine policy, the codec only guarantees an exact
//! round-trip (`decompress(compress(x)) == x` for every byte string,
//! including empty input).

use crate::{Error, ErrorContext, Result};
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Zlib compression codec with a construction-time-validated level.
///
/// Invalid levels fail fast when the codec is built, never per-call.
#[derive(Debug, Clone)]
pub struct CompressionCodec {
    level: Compression,
}

impl CompressionCodec {
    /// Levels 0-9 (0 = stored, 9 = best compression).
    pub fn new(level: u32) -> Result<Self> {
        if level > 9 {
            return Err(Error::configuration_with_context(
                "compression level out of range",
                ErrorContext::new()
                    .with_field_path("config.compression_level")
                    .with_details(format!("expected 0..=9, got {}", level))
                    .with_source("compression_codec"),
            ));
        }
        Ok(Self {
            level: Compression::new(level),
        })
    }

    pub fn level(&self) -> u32 {
        self.level.level()
    }

    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::with_capacity(data.len() / 2), self.level);
        encoder.write_all(data)?;
        Ok(encoder.finish()?)
    }

    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = ZlibDecoder::new(data);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| Error::decompression(format!("corrupt zlib stream: {}", e)))?;
        Ok(out)
    }
}

impl Default for CompressionCodec {
    fn default() -> Self {
        Self {
            level: Compression::new(6),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_various_inputs() {
        let codec = CompressionCodec::new(6).unwrap();
        for input in [
            &b""[..],
            &b"a"[..],
            &b"hello world hello world hello world"[..],
            &[0u8; 4096][..],
        ] {
            let compressed = codec.compress(input).unwrap();
            assert_eq!(codec.decompress(&compressed).unwrap(), input);
        }
    }

    #[test]
    fn round_trip_incompressible_bytes() {
        let codec = CompressionCodec::default();
        let input: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let compressed = codec.compress(&input).unwrap();
        assert_eq!(codec.decompress(&compressed).unwrap(), input);
    }

    #[test]
    fn repetitive_payload_shrinks() {
        let codec = CompressionCodec::new(9).unwrap();
        let input = vec![b'z'; 8192];
        let compressed = codec.compress(&input).unwrap();
        assert!(compressed.len() < input.len());
    }

    #[test]
    fn invalid_level_fails_at_construction() {
        let err = CompressionCodec::new(10).unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn corrupt_stream_is_an_error() {
        let codec = CompressionCodec::default();
        let err = codec.decompress(b"definitely not zlib").unwrap_err();
        assert!(matches!(err, Error::Decompression { .. }));
    }
}
