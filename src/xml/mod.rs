//! Streaming document reader/writer contracts and their XML implementations.
//!
//! Field types only talk to [`ElementReader`] and [`ElementWriter`]; the
//! `quick-xml` backed [`XmlStreamReader`] and [`XmlStreamWriter`] are the
//! concrete document layer.

pub mod reader;
pub mod writer;

use std::str::FromStr;

use crate::codec::encoder::DEFAULT_ENCODE_CHUNK;
use crate::error::CodecError;
use crate::store::SpoolOptions;
use crate::version::ExchangeVersion;

pub use reader::{XmlStreamReader, DEFAULT_TEXT_CHUNK};
pub use writer::XmlStreamWriter;

/// Namespaces used by the document elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XmlNamespace {
    Types,
    Messages,
}

impl XmlNamespace {
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Types => "t",
            Self::Messages => "m",
        }
    }

    pub fn uri(self) -> &'static str {
        match self {
            Self::Types => "http://schemas.microsoft.com/exchange/services/2006/types",
            Self::Messages => "http://schemas.microsoft.com/exchange/services/2006/messages",
        }
    }
}

/// Element local names.
pub mod element_names {
    pub const ATTACHMENTS: &str = "Attachments";
    pub const FILE_ATTACHMENT: &str = "FileAttachment";
    pub const NAME: &str = "Name";
    pub const CONTENT_TYPE: &str = "ContentType";
    pub const CONTENT_ID: &str = "ContentId";
    pub const IS_INLINE: &str = "IsInline";
    pub const IS_CONTACT_PHOTO: &str = "IsContactPhoto";
    pub const CONTENT: &str = "Content";
    pub const MIME_CONTENT: &str = "MimeContent";
}

/// Attribute names.
pub mod attribute_names {
    pub const CHARACTER_SET: &str = "CharacterSet";
}

/// Pull-side document contract.
///
/// The reader is always positioned on a "current" element. Callers iterating
/// children with [`next_child`](Self::next_child) must consume every child
/// they are handed, by reading its value, iterating its own children, or
/// calling [`skip_element`](Self::skip_element).
pub trait ElementReader {
    /// Local name (no prefix) of the current element.
    fn local_name(&self) -> &str;

    /// Raw value of an attribute on the current element.
    fn attribute(&self, name: &str) -> Option<&str>;

    /// Move to the next child of the element being iterated.
    ///
    /// Returns `false` once that element's end has been consumed.
    fn next_child(&mut self) -> Result<bool, CodecError>;

    /// Next base64 text segment of the current element.
    ///
    /// Yields `None` once the element's closing boundary is consumed.
    fn next_base64_chunk(&mut self) -> Result<Option<String>, CodecError>;

    /// Skip the rest of the current element, children included.
    fn skip_element(&mut self) -> Result<(), CodecError>;

    /// Spool policy for binary values decoded from this document.
    fn spool_options(&self) -> SpoolOptions {
        SpoolOptions::default()
    }

    /// Parsed attribute value, `None` when absent.
    fn read_attribute_value<T>(&self, name: &str) -> Result<Option<T>, CodecError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.attribute(name)
            .map(|raw| {
                raw.trim().parse::<T>().map_err(|e| {
                    CodecError::Xml(format!("invalid value for attribute '{name}': {e}"))
                })
            })
            .transpose()
    }

    /// Entire text content of the current element, trimmed.
    fn read_element_value(&mut self) -> Result<String, CodecError> {
        let mut value = String::new();
        while let Some(chunk) = self.next_base64_chunk()? {
            value.push_str(&chunk);
        }
        Ok(value.trim().to_string())
    }

    /// Text content parsed as an `xs:boolean`.
    fn read_bool_element_value(&mut self) -> Result<bool, CodecError> {
        let value = self.read_element_value()?;
        match value.as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            other => Err(CodecError::Xml(format!("invalid boolean value '{other}'"))),
        }
    }
}

/// Push-side document contract.
///
/// Attributes belong to the most recently started element and must be
/// written before any of its content.
pub trait ElementWriter {
    /// Negotiated server version, used to gate optional fields.
    fn version(&self) -> ExchangeVersion;

    fn write_start_element(&mut self, namespace: XmlNamespace, name: &str) -> Result<(), CodecError>;

    fn write_attribute_value(&mut self, name: &str, value: &str) -> Result<(), CodecError>;

    /// Escaped character data for the current element.
    fn write_text(&mut self, text: &str) -> Result<(), CodecError>;

    fn write_end_element(&mut self) -> Result<(), CodecError>;

    /// One segment of base64 text for the current element.
    fn write_base64_chunk(&mut self, encoded: &str) -> Result<(), CodecError> {
        self.write_text(encoded)
    }

    /// Raw bytes per base64 segment when streaming binary content.
    fn encode_chunk_size(&self) -> usize {
        DEFAULT_ENCODE_CHUNK
    }

    /// `<ns:name>value</ns:name>`
    fn write_element_value(
        &mut self,
        namespace: XmlNamespace,
        name: &str,
        value: &str,
    ) -> Result<(), CodecError> {
        self.write_start_element(namespace, name)?;
        self.write_text(value)?;
        self.write_end_element()
    }

    fn write_bool_element_value(
        &mut self,
        namespace: XmlNamespace,
        name: &str,
        value: bool,
    ) -> Result<(), CodecError> {
        self.write_element_value(namespace, name, if value { "true" } else { "false" })
    }
}
