//! Element-level binary values: base64 text in the document, spooled bytes in memory or on disk.

use tracing::debug;

use super::decoder::Base64ChunkDecoder;
use super::encoder::encode_stream;
use crate::error::CodecError;
use crate::store::{ByteSource, SpooledBuffer};
use crate::xml::{ElementReader, ElementWriter};

/// Decode the current element's base64 text into a new [`SpooledBuffer`].
///
/// Ownership of the buffer passes to the caller. On failure the partially
/// written buffer is deleted before the error is returned.
pub fn read_base64_element_value<R: ElementReader>(
    reader: &mut R,
) -> Result<SpooledBuffer, CodecError> {
    read_base64_element_value_with_progress(reader, &|_| true)
}

/// Like [`read_base64_element_value`], reporting decoded bytes after every
/// text segment. The callback returns `false` to cancel.
pub fn read_base64_element_value_with_progress<R: ElementReader>(
    reader: &mut R,
    progress: &dyn Fn(u64) -> bool,
) -> Result<SpooledBuffer, CodecError> {
    let mut buffer = SpooledBuffer::with_options(reader.spool_options());
    match decode_into(reader, &mut buffer, progress) {
        Ok(decoded) => {
            debug!(
                element = reader.local_name(),
                decoded,
                spilled = buffer.is_spilled(),
                "Decoded base64 element"
            );
            Ok(buffer)
        }
        Err(e) => {
            debug!(element = reader.local_name(), error = %e, "Discarding partial base64 element");
            buffer.delete();
            Err(e)
        }
    }
}

fn decode_into<R: ElementReader>(
    reader: &mut R,
    buffer: &mut SpooledBuffer,
    progress: &dyn Fn(u64) -> bool,
) -> Result<u64, CodecError> {
    let mut sink = buffer.open_write_cycle();
    let mut decoder = Base64ChunkDecoder::new();
    while let Some(chunk) = reader.next_base64_chunk()? {
        decoder.push(chunk.as_bytes(), &mut sink)?;
        if !progress(decoder.decoded()) {
            return Err(CodecError::Cancelled);
        }
    }
    let decoded = decoder.finish()?;
    sink.finish()?;
    Ok(decoded)
}

/// Stream `source` as base64 text into the writer's current element.
///
/// Returns the number of raw bytes written.
pub fn write_base64_element_value<W: ElementWriter>(
    writer: &mut W,
    source: &dyn ByteSource,
) -> Result<u64, CodecError> {
    write_base64_element_value_with_progress(writer, source, &|_| true)
}

/// Like [`write_base64_element_value`], reporting raw bytes sent after every
/// segment. The callback returns `false` to cancel.
pub fn write_base64_element_value_with_progress<W: ElementWriter>(
    writer: &mut W,
    source: &dyn ByteSource,
    progress: &dyn Fn(u64) -> bool,
) -> Result<u64, CodecError> {
    let chunk_size = writer.encode_chunk_size();
    let mut input = source.open_stream()?;
    let sent = encode_stream(&mut input, chunk_size, |text, sent| {
        writer.write_base64_chunk(text)?;
        if progress(sent) {
            Ok(())
        } else {
            Err(CodecError::Cancelled)
        }
    })?;
    debug!(sent, "Encoded base64 element");
    Ok(sent)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::VecDeque;

    use super::*;
    use crate::codec::decoder::Base64Error;
    use crate::store::SpoolOptions;
    use crate::version::ExchangeVersion;
    use crate::xml::XmlNamespace;

    /// Reader over a fixed list of text segments.
    struct Segments {
        chunks: VecDeque<String>,
        options: SpoolOptions,
    }

    impl Segments {
        fn new(chunks: &[&str], options: SpoolOptions) -> Self {
            Self {
                chunks: chunks.iter().map(|c| c.to_string()).collect(),
                options,
            }
        }
    }

    impl ElementReader for Segments {
        fn local_name(&self) -> &str {
            "Content"
        }
        fn attribute(&self, _name: &str) -> Option<&str> {
            None
        }
        fn next_child(&mut self) -> Result<bool, CodecError> {
            Ok(false)
        }
        fn next_base64_chunk(&mut self) -> Result<Option<String>, CodecError> {
            Ok(self.chunks.pop_front())
        }
        fn skip_element(&mut self) -> Result<(), CodecError> {
            self.chunks.clear();
            Ok(())
        }
        fn spool_options(&self) -> SpoolOptions {
            self.options.clone()
        }
    }

    /// Writer collecting emitted text segments.
    #[derive(Default)]
    struct Collect {
        chunks: Vec<String>,
    }

    impl ElementWriter for Collect {
        fn version(&self) -> ExchangeVersion {
            ExchangeVersion::default()
        }
        fn write_start_element(&mut self, _: XmlNamespace, _: &str) -> Result<(), CodecError> {
            Ok(())
        }
        fn write_attribute_value(&mut self, _: &str, _: &str) -> Result<(), CodecError> {
            Ok(())
        }
        fn write_text(&mut self, text: &str) -> Result<(), CodecError> {
            self.chunks.push(text.to_string());
            Ok(())
        }
        fn write_end_element(&mut self) -> Result<(), CodecError> {
            Ok(())
        }
        fn encode_chunk_size(&self) -> usize {
            6
        }
    }

    fn spool_files(dir: &std::path::Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    #[test]
    fn test_read_small_value() {
        let mut reader = Segments::new(&["SGVsbG8s", "IFdv", "cmxkIQ=="], SpoolOptions::default());
        let buffer = read_base64_element_value(&mut reader).unwrap();
        assert_eq!(buffer.read_to_vec().unwrap(), b"Hello, World!");
        assert!(!buffer.is_spilled());
    }

    #[test]
    fn test_read_spills_past_threshold() {
        let tmp = tempfile::tempdir().unwrap();
        let options = SpoolOptions {
            threshold: 4,
            temp_dir: Some(tmp.path().to_path_buf()),
        };
        let mut reader = Segments::new(&["SGVsbG8sIFdvcmxkIQ=="], options);
        let buffer = read_base64_element_value(&mut reader).unwrap();
        assert!(buffer.is_spilled());
        assert_eq!(buffer.read_to_vec().unwrap(), b"Hello, World!");
        drop(buffer);
        assert_eq!(spool_files(tmp.path()), 0);
    }

    #[test]
    fn test_decode_failure_removes_spool_file() {
        let tmp = tempfile::tempdir().unwrap();
        let options = SpoolOptions {
            threshold: 2,
            temp_dir: Some(tmp.path().to_path_buf()),
        };
        let mut reader = Segments::new(&["SGVsbG8sIFdv", "cmxkIQ"], options);
        let err = read_base64_element_value(&mut reader).unwrap_err();
        assert!(matches!(
            err,
            CodecError::Base64(Base64Error::Truncated { remaining: 2 })
        ));
        assert_eq!(spool_files(tmp.path()), 0);
    }

    #[test]
    fn test_cancel_while_decoding() {
        let tmp = tempfile::tempdir().unwrap();
        let options = SpoolOptions {
            threshold: 2,
            temp_dir: Some(tmp.path().to_path_buf()),
        };
        let mut reader = Segments::new(&["SGVsbG8s", "IFdv", "cmxkIQ=="], options);
        let calls = Cell::new(0);
        let err = read_base64_element_value_with_progress(&mut reader, &|_| {
            calls.set(calls.get() + 1);
            calls.get() < 2
        })
        .unwrap_err();
        assert!(matches!(err, CodecError::Cancelled));
        assert_eq!(calls.get(), 2);
        assert_eq!(spool_files(tmp.path()), 0);
    }

    #[test]
    fn test_write_in_bounded_segments() {
        let mut writer = Collect::default();
        let source = b"Hello, World!".to_vec();
        let sent = write_base64_element_value(&mut writer, &source).unwrap();
        assert_eq!(sent, 13);
        assert_eq!(writer.chunks, vec!["SGVsbG8s", "IFdvcmxk", "IQ=="]);
        assert_eq!(writer.chunks.concat(), "SGVsbG8sIFdvcmxkIQ==");
    }

    #[test]
    fn test_cancel_while_encoding() {
        let mut writer = Collect::default();
        let source = b"Hello, World!".to_vec();
        let err = write_base64_element_value_with_progress(&mut writer, &source, &|sent| sent < 12)
            .unwrap_err();
        assert!(matches!(err, CodecError::Cancelled));
        assert_eq!(writer.chunks.len(), 2);
    }
}
