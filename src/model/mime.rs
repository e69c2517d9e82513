//! MIME content of an item: the raw RFC 822 message as base64, tagged with its character set.

use mail_parser::MessageParser;
use serde::Serialize;

use crate::error::{Result, SpoolError};
use crate::model::content::{BinaryContent, ContentState};
use crate::store::{ByteSource, SharedSource, SpooledBuffer};
use crate::xml::attribute_names::CHARACTER_SET;
use crate::xml::element_names::MIME_CONTENT;
use crate::xml::{ElementReader, ElementWriter, XmlNamespace};

/// Headline facts parsed from a MIME payload.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MimeSummary {
    pub subject: Option<String>,
    pub from: Option<String>,
    pub attachment_count: usize,
}

/// The `MimeContent` element of an item.
#[derive(Debug)]
pub struct MimeContent {
    character_set: Option<String>,
    content: BinaryContent,
}

impl MimeContent {
    pub fn new() -> Self {
        Self {
            character_set: None,
            content: BinaryContent::new(MIME_CONTENT),
        }
    }

    /// MIME content supplied by the caller for upload.
    pub fn with_content(character_set: impl Into<String>, source: SharedSource) -> Self {
        let mut mime = Self::new();
        mime.character_set = Some(character_set.into());
        mime.content.set_shared(source);
        mime
    }

    /// Read a `MimeContent` element the reader is positioned on.
    pub fn read_from_xml<R: ElementReader>(reader: &mut R) -> Result<Self> {
        let mut mime = Self::new();
        mime.load_from_xml(reader)?;
        Ok(mime)
    }

    /// Replace this value from the element the reader is positioned on.
    ///
    /// The attribute is read before the text body.
    pub fn load_from_xml<R: ElementReader>(&mut self, reader: &mut R) -> Result<()> {
        self.load_from_xml_with_progress(reader, &|_| true)
    }

    /// Like [`load_from_xml`](Self::load_from_xml), reporting decoded bytes.
    /// The callback returns `false` to cancel.
    pub fn load_from_xml_with_progress<R: ElementReader>(
        &mut self,
        reader: &mut R,
        progress: &dyn Fn(u64) -> bool,
    ) -> Result<()> {
        self.character_set = reader.attribute(CHARACTER_SET).map(str::to_string);
        self.content.read_from_with_progress(reader, progress)
    }

    /// Write the `MimeContent` element, character set attribute first.
    pub fn write_to_xml<W: ElementWriter>(&self, writer: &mut W) -> Result<()> {
        self.write_to_xml_with_progress(writer, &|_| true)
    }

    pub fn write_to_xml_with_progress<W: ElementWriter>(
        &self,
        writer: &mut W,
        progress: &dyn Fn(u64) -> bool,
    ) -> Result<()> {
        if self.content.source().is_none() {
            return Err(SpoolError::Validation(
                "The MIME content must be set before it can be saved.".into(),
            ));
        }
        writer.write_start_element(XmlNamespace::Types, MIME_CONTENT)?;
        if let Some(charset) = &self.character_set {
            writer.write_attribute_value(CHARACTER_SET, charset)?;
        }
        self.content.write_to_with_progress(writer, progress)?;
        writer.write_end_element()?;
        Ok(())
    }

    pub fn character_set(&self) -> Option<&str> {
        self.character_set.as_deref()
    }

    pub fn set_character_set(&mut self, character_set: impl Into<String>) {
        self.character_set = Some(character_set.into());
    }

    pub fn content(&self) -> Option<&dyn ByteSource> {
        self.content.source()
    }

    pub fn spooled_content(&self) -> Option<&SpooledBuffer> {
        self.content.spool()
    }

    pub fn content_state(&self) -> ContentState {
        self.content.state()
    }

    pub fn set_content(&mut self, source: SharedSource) {
        self.content.set_shared(source);
    }

    /// Decode the payload as text using its character set.
    ///
    /// Unknown or missing character sets fall back to UTF-8.
    pub fn decode_text(&self) -> Result<String> {
        let bytes = self.read_payload()?;
        let encoding = self
            .character_set
            .as_deref()
            .and_then(|label| encoding_rs::Encoding::for_label(label.trim().as_bytes()))
            .unwrap_or(encoding_rs::UTF_8);
        let (decoded, _, _) = encoding.decode(&bytes);
        Ok(decoded.into_owned())
    }

    /// Parse the payload as a message and report its subject, sender and attachment count.
    pub fn summary(&self) -> Result<MimeSummary> {
        let bytes = self.read_payload()?;
        let Some(message) = MessageParser::default().parse(&bytes[..]) else {
            return Ok(MimeSummary::default());
        };
        Ok(MimeSummary {
            subject: message.subject().map(str::to_string),
            from: message
                .from()
                .and_then(|from| from.first())
                .and_then(|addr| addr.address())
                .map(str::to_string),
            attachment_count: message.attachments().count(),
        })
    }

    /// Delete spooled content. Content shared by the caller is left alone.
    pub fn close(&mut self) {
        self.content.close();
    }

    fn read_payload(&self) -> Result<Vec<u8>> {
        let source = self
            .content
            .source()
            .ok_or_else(|| SpoolError::Validation("The MIME content is not set.".into()))?;
        source
            .read_to_vec()
            .map_err(|e| SpoolError::Codec(e.into()))
    }
}

impl Default for MimeContent {
    fn default() -> Self {
        Self::new()
    }
}
