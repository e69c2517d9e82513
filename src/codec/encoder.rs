//! Bounded-chunk base64 encoding of a byte stream.

use std::io::{self, Read};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::CodecError;

/// Default raw bytes per encoded chunk (48 KB, 64 KB of base64 text).
pub const DEFAULT_ENCODE_CHUNK: usize = 48 * 1024;

/// Encode `input` as standard base64, handing each encoded chunk to `emit`.
///
/// Chunks are encoded from a whole multiple of 3 raw bytes, so only the last
/// one can carry padding and the concatenated chunks equal the encoding of
/// the whole stream. `emit` receives the chunk text and the number of raw
/// bytes consumed so far; an error from it stops the encoder.
///
/// Returns the number of raw bytes encoded.
pub fn encode_stream<R, F>(input: &mut R, chunk_size: usize, mut emit: F) -> Result<u64, CodecError>
where
    R: Read + ?Sized,
    F: FnMut(&str, u64) -> Result<(), CodecError>,
{
    let chunk_size = (chunk_size / 3).max(1) * 3;
    let mut raw = vec![0u8; chunk_size];
    let mut text = String::with_capacity(chunk_size / 3 * 4);
    let mut total: u64 = 0;

    loop {
        let filled = fill(input, &mut raw)?;
        if filled == 0 {
            break;
        }
        total += filled as u64;

        text.clear();
        STANDARD.encode_string(&raw[..filled], &mut text);
        emit(&text, total)?;

        if filled < raw.len() {
            break;
        }
    }

    Ok(total)
}

/// Read until `buf` is full or the stream ends.
fn fill<R: Read + ?Sized>(input: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
