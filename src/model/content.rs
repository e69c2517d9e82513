//! Binary payload holder shared by attachment and MIME content fields.

use tracing::debug;

use crate::codec::{
    read_base64_element_value_with_progress, write_base64_element_value_with_progress,
};
use crate::error::{Result, SpoolError};
use crate::store::{ByteSource, SharedSource, SpooledBuffer};
use crate::xml::{ElementReader, ElementWriter};

/// Lifecycle of a binary field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentState {
    /// No payload.
    Empty,
    /// A base64 element is being decoded into a fresh spool.
    Decoding,
    /// A payload is available.
    Populated,
}

enum Payload {
    /// Decoded from a document; deleted with the field.
    Owned(SpooledBuffer),
    /// Supplied by the caller; never deleted here.
    Shared(SharedSource),
}

/// The payload of a streaming binary field.
///
/// A spool created while reading a document is owned and deleted on
/// [`close`](Self::close), on drop, or before a new value replaces it.
/// Sources handed in by the caller are only shared.
pub struct BinaryContent {
    field: &'static str,
    payload: Option<Payload>,
    state: ContentState,
}

impl BinaryContent {
    /// Empty value for the element named `field`.
    pub fn new(field: &'static str) -> Self {
        Self {
            field,
            payload: None,
            state: ContentState::Empty,
        }
    }

    pub fn state(&self) -> ContentState {
        self.state
    }

    /// `true` when the payload is a spool decoded by this field.
    pub fn is_owned(&self) -> bool {
        matches!(self.payload, Some(Payload::Owned(_)))
    }

    /// Current payload, if any.
    pub fn source(&self) -> Option<&dyn ByteSource> {
        match &self.payload {
            Some(Payload::Owned(buffer)) => Some(buffer as &dyn ByteSource),
            Some(Payload::Shared(source)) => Some(&**source as &dyn ByteSource),
            None => None,
        }
    }

    /// The owned spool, if this value was decoded from a document.
    pub fn spool(&self) -> Option<&SpooledBuffer> {
        match &self.payload {
            Some(Payload::Owned(buffer)) => Some(buffer),
            _ => None,
        }
    }

    /// Replace the payload with a caller-supplied source.
    pub fn set_shared(&mut self, source: SharedSource) {
        self.clear();
        self.payload = Some(Payload::Shared(source));
        self.state = ContentState::Populated;
    }

    /// Decode the reader's current element into a new owned spool.
    ///
    /// Any previously owned spool is deleted first. On failure the value is
    /// left empty.
    pub fn read_from<R: ElementReader>(&mut self, reader: &mut R) -> Result<()> {
        self.read_from_with_progress(reader, &|_| true)
    }

    /// Like [`read_from`](Self::read_from), reporting decoded bytes after
    /// every text segment. The callback returns `false` to cancel.
    pub fn read_from_with_progress<R: ElementReader>(
        &mut self,
        reader: &mut R,
        progress: &dyn Fn(u64) -> bool,
    ) -> Result<()> {
        self.clear();
        self.state = ContentState::Decoding;
        match read_base64_element_value_with_progress(reader, progress) {
            Ok(buffer) => {
                self.payload = Some(Payload::Owned(buffer));
                self.state = ContentState::Populated;
                Ok(())
            }
            Err(source) => {
                self.state = ContentState::Empty;
                Err(SpoolError::Deserialization {
                    field: self.field,
                    source,
                })
            }
        }
    }

    /// Stream the payload as base64 text into the writer's current element.
    pub fn write_to<W: ElementWriter>(&self, writer: &mut W) -> Result<u64> {
        self.write_to_with_progress(writer, &|_| true)
    }

    /// Like [`write_to`](Self::write_to), reporting raw bytes sent after
    /// every segment. The callback returns `false` to cancel.
    pub fn write_to_with_progress<W: ElementWriter>(
        &self,
        writer: &mut W,
        progress: &dyn Fn(u64) -> bool,
    ) -> Result<u64> {
        let source = self
            .source()
            .ok_or_else(|| SpoolError::Validation(format!("The {} value is not set.", self.field)))?;
        write_base64_element_value_with_progress(writer, source, progress).map_err(|source| {
            SpoolError::Serialization {
                field: self.field,
                source,
            }
        })
    }

    /// Delete an owned spool and clear the value. Shared sources are kept.
    pub fn close(&mut self) {
        if self.is_owned() {
            self.clear();
        }
    }

    /// Drop the payload, deleting it if owned.
    fn clear(&mut self) {
        if let Some(Payload::Owned(mut buffer)) = self.payload.take() {
            debug!(field = self.field, len = buffer.len(), "Disposing owned content");
            buffer.delete();
        }
        self.state = ContentState::Empty;
    }
}

impl std::fmt::Debug for BinaryContent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinaryContent")
            .field("field", &self.field)
            .field("state", &self.state)
            .field("owned", &self.is_owned())
            .finish()
    }
}
