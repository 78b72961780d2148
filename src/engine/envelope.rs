//! Stored-payload framing.
//!
//! The persistent tier stores raw bytes without schema, so the transform
//! flags needed to reverse compression and encryption travel in a 4-byte
//! header in front of the body: magic `AC`, a format version, and a flag
//! byte. Transform order on write is serialize, compress, encrypt; reads
//! reverse it.

use crate::{Error, ErrorContext, Result};

const MAGIC: [u8; 2] = *b"AC";
const VERSION: u8 = 1;
const HEADER_LEN: usize = 4;

const FLAG_COMPRESSED: u8 = 0b0000_0001;
const FLAG_ENCRYPTED: u8 = 0b0000_0010;

/// Decoded frame: transform flags plus the (still transformed) body.
#[derive(Debug, PartialEq, Eq)]
pub struct Envelope {
    pub compressed: bool,
    pub encrypted: bool,
    pub body: Vec<u8>,
}

/// Prepend the header to an already-transformed body.
pub fn encode(body: &[u8], compressed: bool, encrypted: bool) -> Vec<u8> {
    let mut flags = 0u8;
    if compressed {
        flags |= FLAG_COMPRESSED;
    }
    if encrypted {
        flags |= FLAG_ENCRYPTED;
    }
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(&MAGIC);
    out.push(VERSION);
    out.push(flags);
    out.extend_from_slice(body);
    out
}

/// Split a stored frame back into flags and body.
///
/// Foreign or truncated bytes fail validation; the engine treats that as a
/// hard miss on the read path.
pub fn decode(raw: &[u8]) -> Result<Envelope> {
    if raw.len() < HEADER_LEN || raw[..2] != MAGIC {
        return Err(Error::validation_with_context(
            "stored payload is not a cache envelope",
            ErrorContext::new()
                .with_details(format!("{} bytes, bad or missing header", raw.len()))
                .with_source("envelope"),
        ));
    }
    if raw[2] != VERSION {
        return Err(Error::validation_with_context(
            "unsupported cache envelope version",
            ErrorContext::new()
                .with_details(format!("expected {}, got {}", VERSION, raw[2]))
                .with_source("envelope"),
        ));
    }
    let flags = raw[3];
    Ok(Envelope {
        compressed: flags & FLAG_COMPRESSED != 0,
        encrypted: flags & FLAG_ENCRYPTED != 0,
        body: raw[HEADER_LEN..].to_vec(),
    })
}
