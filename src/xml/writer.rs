//! `quick-xml` backed [`ElementWriter`].

use std::io::Write;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use super::{ElementWriter, XmlNamespace};
use crate::codec::encoder::DEFAULT_ENCODE_CHUNK;
use crate::error::CodecError;
use crate::version::ExchangeVersion;

/// Streaming XML writer.
///
/// A start tag is held back until the element's first content, child or end
/// so that attributes can still be added to it. The root element declares
/// every [`XmlNamespace`] prefix.
pub struct XmlStreamWriter<W: Write> {
    writer: Writer<W>,
    pending: Option<BytesStart<'static>>,
    open: Vec<String>,
    version: ExchangeVersion,
    chunk_size: usize,
}

impl<W: Write> XmlStreamWriter<W> {
    pub fn new(inner: W, version: ExchangeVersion) -> Self {
        Self {
            writer: Writer::new(inner),
            pending: None,
            open: Vec::new(),
            version,
            chunk_size: DEFAULT_ENCODE_CHUNK,
        }
    }

    /// Raw bytes per base64 segment when streaming binary content.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Write the `<?xml ...?>` declaration. Must come first.
    pub fn write_declaration(&mut self) -> Result<(), CodecError> {
        self.writer
            .write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))
            .map_err(CodecError::xml)
    }

    /// Finish the document and hand back the underlying sink.
    pub fn into_inner(mut self) -> Result<W, CodecError> {
        self.flush_pending()?;
        if let Some(name) = self.open.last() {
            return Err(CodecError::Xml(format!("element <{name}> was never closed")));
        }
        Ok(self.writer.into_inner())
    }

    fn flush_pending(&mut self) -> Result<(), CodecError> {
        if let Some(start) = self.pending.take() {
            self.writer
                .write_event(Event::Start(start))
                .map_err(CodecError::xml)?;
        }
        Ok(())
    }
}

impl<W: Write> ElementWriter for XmlStreamWriter<W> {
    fn version(&self) -> ExchangeVersion {
        self.version
    }

    fn write_start_element(&mut self, namespace: XmlNamespace, name: &str) -> Result<(), CodecError> {
        self.flush_pending()?;
        let qualified = format!("{}:{}", namespace.prefix(), name);
        let mut start = BytesStart::new(qualified.clone());
        if self.open.is_empty() {
            for ns in [XmlNamespace::Types, XmlNamespace::Messages] {
                let key = format!("xmlns:{}", ns.prefix());
                start.push_attribute((key.as_str(), ns.uri()));
            }
        }
        self.pending = Some(start);
        self.open.push(qualified);
        Ok(())
    }

    fn write_attribute_value(&mut self, name: &str, value: &str) -> Result<(), CodecError> {
        match self.pending.as_mut() {
            Some(start) => {
                start.push_attribute((name, value));
                Ok(())
            }
            None => Err(CodecError::Xml(format!(
                "attribute '{name}' must be written before element content"
            ))),
        }
    }

    fn write_text(&mut self, text: &str) -> Result<(), CodecError> {
        if self.open.is_empty() {
            return Err(CodecError::Xml("text outside of any element".into()));
        }
        self.flush_pending()?;
        self.writer
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(CodecError::xml)
    }

    fn write_end_element(&mut self) -> Result<(), CodecError> {
        let name = self
            .open
            .pop()
            .ok_or_else(|| CodecError::Xml("end element without a matching start".into()))?;
        self.flush_pending()?;
        self.writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(CodecError::xml)
    }

    fn encode_chunk_size(&self) -> usize {
        self.chunk_size
    }
}
