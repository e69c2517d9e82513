//! `quick-xml` backed [`ElementReader`].
//!
//! Base64 text is handed out in slices of at most
//! [`DEFAULT_TEXT_CHUNK`] bytes. Plain character data is read straight
//! from the buffered input up to the next `<` or `&`, so a text node of
//! any length is never held whole. Text that needs `quick-xml` (CDATA
//! sections and text from an entity reference onward) is parsed as one
//! node and then sliced.

use std::io::BufRead;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use super::ElementReader;
use crate::error::CodecError;
use crate::store::SpoolOptions;

/// Largest text segment returned by [`ElementReader::next_base64_chunk`] (64 KB).
pub const DEFAULT_TEXT_CHUNK: usize = 64 * 1024;

#[derive(Debug)]
struct StartElement {
    local_name: String,
    attributes: Vec<(String, String)>,
    empty: bool,
}

impl StartElement {
    fn parse(e: &BytesStart<'_>, empty: bool) -> Result<Self, CodecError> {
        let local_name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in e.attributes() {
            let attr = attr.map_err(CodecError::xml)?;
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr.unescape_value().map_err(CodecError::xml)?.into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            local_name,
            attributes,
            empty,
        })
    }
}

/// Owned view of one parser event.
enum Step {
    Start(StartElement),
    End,
    Text(String),
    Eof,
}

/// Streaming XML reader positioned on one element at a time.
pub struct XmlStreamReader<R: BufRead> {
    reader: Reader<R>,
    buf: Vec<u8>,
    current: Option<StartElement>,
    /// The current element's end boundary has been consumed.
    closed: bool,
    /// The input is positioned on character data (after a start tag or CDATA section).
    at_text: bool,
    /// Unreturned rest of a text node parsed by `quick-xml`.
    pending_text: String,
    pending_pos: usize,
    text_chunk: usize,
    spool: SpoolOptions,
}

impl<R: BufRead> XmlStreamReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            reader: Reader::from_reader(input),
            buf: Vec::new(),
            current: None,
            closed: true,
            at_text: false,
            pending_text: String::new(),
            pending_pos: 0,
            text_chunk: DEFAULT_TEXT_CHUNK,
            spool: SpoolOptions::default(),
        }
    }

    /// Use `options` for binary values decoded from this document.
    pub fn with_spool_options(mut self, options: SpoolOptions) -> Self {
        self.spool = options;
        self
    }

    /// Cap text segments at `len` bytes.
    pub fn with_text_chunk(mut self, len: usize) -> Self {
        self.text_chunk = len.max(4);
        self
    }

    /// Advance to the next start element, which must be named `expected`.
    pub fn read_start_element(&mut self, expected: &str) -> Result<(), CodecError> {
        loop {
            match self.next_step()? {
                Step::Start(element) => {
                    if element.local_name != expected {
                        return Err(CodecError::Xml(format!(
                            "expected element <{expected}>, found <{}>",
                            element.local_name
                        )));
                    }
                    self.enter(element);
                    return Ok(());
                }
                Step::Text(_) => continue,
                Step::End => {
                    return Err(CodecError::Xml(format!(
                        "expected element <{expected}>, found an end tag"
                    )))
                }
                Step::Eof => {
                    return Err(CodecError::Xml(format!(
                        "expected element <{expected}>, found end of document"
                    )))
                }
            }
        }
    }

    /// Local name of the next start element without requiring a specific name.
    pub fn read_any_start_element(&mut self) -> Result<String, CodecError> {
        loop {
            match self.next_step()? {
                Step::Start(element) => {
                    let name = element.local_name.clone();
                    self.enter(element);
                    return Ok(name);
                }
                Step::Text(_) => continue,
                Step::End | Step::Eof => {
                    return Err(CodecError::Xml("document has no root element".into()))
                }
            }
        }
    }

    fn enter(&mut self, element: StartElement) {
        self.current = Some(element);
        self.closed = false;
    }

    fn current_is_empty(&self) -> bool {
        self.current.as_ref().is_some_and(|c| c.empty)
    }

    fn next_step(&mut self) -> Result<Step, CodecError> {
        self.pending_text.clear();
        self.pending_pos = 0;
        loop {
            self.buf.clear();
            let (step, at_text) = match self
                .reader
                .read_event_into(&mut self.buf)
                .map_err(CodecError::xml)?
            {
                Event::Start(e) => (Step::Start(StartElement::parse(&e, false)?), true),
                Event::Empty(e) => (Step::Start(StartElement::parse(&e, true)?), false),
                Event::End(_) => (Step::End, false),
                Event::Text(t) => (
                    Step::Text(t.unescape().map_err(CodecError::xml)?.into_owned()),
                    false,
                ),
                Event::CData(c) => (
                    Step::Text(String::from_utf8_lossy(&c.into_inner()).into_owned()),
                    true,
                ),
                Event::Eof => (Step::Eof, false),
                _ => continue,
            };
            self.at_text = at_text;
            return Ok(step);
        }
    }

    /// Read character data straight from the input, stopping before the next
    /// `<` or `&` or once the segment is full. Nothing is consumed past the stop.
    fn read_raw_text(&mut self) -> Result<String, CodecError> {
        let limit = self.text_chunk;
        let mut out = Vec::new();
        let input = self.reader.get_mut();
        while out.len() < limit {
            let (taken, stop) = {
                let available = input.fill_buf()?;
                if available.is_empty() {
                    break;
                }
                let mut end = available.len().min(limit - out.len());
                // Keep multi-byte characters whole at the segment limit.
                while end > 0 && end < available.len() && available[end] & 0xC0 == 0x80 {
                    end -= 1;
                }
                if end == 0 {
                    break;
                }
                let window = &available[..end];
                match window.iter().position(|&b| b == b'<' || b == b'&') {
                    Some(i) => {
                        out.extend_from_slice(&window[..i]);
                        (i, Some(window[i]))
                    }
                    None => {
                        out.extend_from_slice(window);
                        (window.len(), None)
                    }
                }
            };
            input.consume(taken);
            match stop {
                Some(b'&') => {
                    self.at_text = false;
                    break;
                }
                Some(_) => break,
                None => {}
            }
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }

    /// Next slice of a text node `quick-xml` has already parsed.
    fn take_pending_text(&mut self) -> Option<String> {
        if self.pending_pos >= self.pending_text.len() {
            return None;
        }
        let rest = &self.pending_text[self.pending_pos..];
        let mut end = rest.len().min(self.text_chunk);
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        let slice = rest[..end].to_string();
        self.pending_pos += end;
        Some(slice)
    }
}

impl<R: BufRead> ElementReader for XmlStreamReader<R> {
    fn local_name(&self) -> &str {
        self.current
            .as_ref()
            .map(|c| c.local_name.as_str())
            .unwrap_or("")
    }

    fn attribute(&self, name: &str) -> Option<&str> {
        self.current.as_ref().and_then(|c| {
            c.attributes
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.as_str())
        })
    }

    fn next_child(&mut self) -> Result<bool, CodecError> {
        if !self.closed && self.current_is_empty() {
            self.closed = true;
            return Ok(false);
        }
        loop {
            match self.next_step()? {
                Step::Start(element) => {
                    self.enter(element);
                    return Ok(true);
                }
                Step::End => {
                    self.closed = true;
                    return Ok(false);
                }
                Step::Text(text) if text.trim().is_empty() => continue,
                Step::Text(_) => {
                    return Err(CodecError::Xml(format!(
                        "unexpected text among the children of <{}>",
                        self.local_name()
                    )))
                }
                Step::Eof => return Err(CodecError::Xml("unexpected end of document".into())),
            }
        }
    }

    fn next_base64_chunk(&mut self) -> Result<Option<String>, CodecError> {
        if self.closed {
            return Ok(None);
        }
        if self.current_is_empty() {
            self.closed = true;
            return Ok(None);
        }
        loop {
            if let Some(slice) = self.take_pending_text() {
                return Ok(Some(slice));
            }
            if self.at_text {
                let text = self.read_raw_text()?;
                if !text.trim().is_empty() {
                    return Ok(Some(text));
                }
                if !text.is_empty() {
                    continue;
                }
            }
            match self.next_step()? {
                Step::Text(text) if text.trim().is_empty() => continue,
                Step::Text(text) => {
                    self.pending_text = text;
                    self.pending_pos = 0;
                }
                Step::End => {
                    self.closed = true;
                    return Ok(None);
                }
                Step::Start(element) => {
                    return Err(CodecError::Xml(format!(
                        "unexpected element <{}> inside <{}>",
                        element.local_name,
                        self.local_name()
                    )))
                }
                Step::Eof => return Err(CodecError::Xml("unexpected end of document".into())),
            }
        }
    }

    fn skip_element(&mut self) -> Result<(), CodecError> {
        if self.closed {
            return Ok(());
        }
        if self.current_is_empty() {
            self.closed = true;
            return Ok(());
        }
        let mut depth = 0usize;
        loop {
            match self.next_step()? {
                Step::Start(element) if !element.empty => depth += 1,
                Step::End if depth == 0 => break,
                Step::End => depth -= 1,
                Step::Eof => return Err(CodecError::Xml("unexpected end of document".into())),
                _ => {}
            }
        }
        self.closed = true;
        Ok(())
    }

    fn spool_options(&self) -> SpoolOptions {
        self.spool.clone()
    }
}
