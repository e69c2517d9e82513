//! Incremental base64 decoding across arbitrary chunk boundaries.
//!
//! Text arrives in segments that need not align with 4-character groups.
//! Complete groups are decoded as soon as they are available; a partial
//! group is carried over and combined with the next segment.

use std::io::Write;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

use crate::error::CodecError;

/// Significant characters decoded per window (a whole number of groups).
pub const DECODE_WINDOW: usize = 16 * 1024;

/// Malformed base64 input.
#[derive(Error, Debug)]
pub enum Base64Error {
    /// Invalid alphabet character or misplaced padding.
    #[error("Invalid base64 input after character {position}: {source}")]
    InvalidInput {
        position: u64,
        source: base64::DecodeError,
    },

    /// The input ended inside a 4-character group.
    #[error("Truncated base64 input: {remaining} character(s) after the last complete group")]
    Truncated { remaining: usize },

    /// Characters followed a padded group.
    #[error("Unexpected base64 data after padding at character {position}")]
    TrailingData { position: u64 },
}

/// Streaming standard-alphabet base64 decoder.
///
/// ASCII whitespace between characters is ignored. Positions in errors count
/// significant (non-whitespace) characters from the start of the input.
#[derive(Debug, Default)]
pub struct Base64ChunkDecoder {
    pending: Vec<u8>,
    scratch: Vec<u8>,
    position: u64,
    decoded: u64,
    padded: bool,
}

impl Base64ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one segment, writing every completed group to `out`.
    ///
    /// Significant characters are decoded in windows of at most
    /// [`DECODE_WINDOW`] characters; only a trailing partial group (0 to 3
    /// characters) is carried over to the next segment.
    ///
    /// Returns the number of bytes written for this segment.
    pub fn push<W: Write + ?Sized>(&mut self, chunk: &[u8], out: &mut W) -> Result<usize, CodecError> {
        let mut written = 0;
        for &byte in chunk {
            if byte.is_ascii_whitespace() {
                continue;
            }
            if self.padded {
                return Err(Base64Error::TrailingData {
                    position: self.position,
                }
                .into());
            }
            self.pending.push(byte);
            self.position += 1;

            let len = self.pending.len();
            if len % 4 == 0 && self.pending[len - 4..].contains(&b'=') {
                self.padded = true;
            }
            if len == DECODE_WINDOW {
                written += self.decode_groups(out)?;
            }
        }
        written += self.decode_groups(out)?;
        Ok(written)
    }

    /// Decode every complete group in `pending`, keeping the partial tail.
    fn decode_groups<W: Write + ?Sized>(&mut self, out: &mut W) -> Result<usize, CodecError> {
        let whole = self.pending.len() / 4 * 4;
        if whole == 0 {
            return Ok(0);
        }

        let start = self.position - self.pending.len() as u64;
        self.scratch.clear();
        STANDARD
            .decode_vec(&self.pending[..whole], &mut self.scratch)
            .map_err(|source| Base64Error::InvalidInput {
                position: start,
                source,
            })?;
        out.write_all(&self.scratch)?;
        self.pending.drain(..whole);

        let written = self.scratch.len();
        self.decoded += written as u64;
        Ok(written)
    }

    /// Total bytes decoded so far.
    pub fn decoded(&self) -> u64 {
        self.decoded
    }

    /// End of input: any partial group left over is an error.
    pub fn finish(self) -> Result<u64, Base64Error> {
        if !self.pending.is_empty() {
            return Err(Base64Error::Truncated {
                remaining: self.pending.len(),
            });
        }
        Ok(self.decoded)
    }
}
