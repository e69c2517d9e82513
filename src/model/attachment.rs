//! File attachments.
//!
//! Metadata elements come first, then the version-gated contact-photo flag,
//! then the base64 `Content` element. Content decoded from a document is
//! spooled and owned by the attachment; content set by the caller is shared.

use tracing::debug;

use crate::error::{Result, SpoolError};
use crate::model::content::{BinaryContent, ContentState};
use crate::store::{ByteSource, SharedSource, SpooledBuffer};
use crate::version::{validate_property_version, ExchangeVersion};
use crate::xml::element_names::{
    ATTACHMENTS, CONTENT, CONTENT_ID, CONTENT_TYPE, FILE_ATTACHMENT, IS_CONTACT_PHOTO, IS_INLINE,
    NAME,
};
use crate::xml::{ElementReader, ElementWriter, XmlNamespace};

/// First version that knows `IsContactPhoto`.
pub const CONTACT_PHOTO_VERSION: ExchangeVersion = ExchangeVersion::Exchange2010;

/// Versions newer than this one accept the 2010 attachment elements.
const LEGACY_VERSION: ExchangeVersion = ExchangeVersion::Exchange2007Sp1;

/// A file attached to an item.
#[derive(Debug)]
pub struct FileAttachment {
    version: ExchangeVersion,
    is_new: bool,
    name: Option<String>,
    content_type: Option<String>,
    content_id: Option<String>,
    is_inline: bool,
    is_contact_photo: bool,
    content: BinaryContent,
}

impl FileAttachment {
    /// New, unsaved attachment for a service speaking `version`.
    pub fn new(version: ExchangeVersion) -> Self {
        Self {
            version,
            is_new: true,
            name: None,
            content_type: None,
            content_id: None,
            is_inline: false,
            is_contact_photo: false,
            content: BinaryContent::new(CONTENT),
        }
    }

    /// New attachment uploading `source` under `name`.
    pub fn with_content(version: ExchangeVersion, name: impl Into<String>, source: SharedSource) -> Self {
        let mut attachment = Self::new(version);
        attachment.name = Some(name.into());
        attachment.content.set_shared(source);
        attachment
    }

    /// Read a `FileAttachment` element the reader is positioned on.
    pub fn read_from_xml<R: ElementReader>(reader: &mut R, version: ExchangeVersion) -> Result<Self> {
        Self::read_from_xml_with_progress(reader, version, &|_| true)
    }

    /// Like [`read_from_xml`](Self::read_from_xml), reporting decoded content
    /// bytes as they arrive. The callback returns `false` to cancel.
    pub fn read_from_xml_with_progress<R: ElementReader>(
        reader: &mut R,
        version: ExchangeVersion,
        progress: &dyn Fn(u64) -> bool,
    ) -> Result<Self> {
        let mut attachment = Self::new(version);
        attachment.is_new = false;
        attachment.load_from_xml_with_progress(reader, progress)?;
        Ok(attachment)
    }

    /// Re-read this attachment's element, replacing its current values.
    pub fn load_from_xml<R: ElementReader>(&mut self, reader: &mut R) -> Result<()> {
        self.load_from_xml_with_progress(reader, &|_| true)
    }

    pub fn load_from_xml_with_progress<R: ElementReader>(
        &mut self,
        reader: &mut R,
        progress: &dyn Fn(u64) -> bool,
    ) -> Result<()> {
        while reader.next_child()? {
            if !self.read_element(reader, progress)? {
                debug!(element = reader.local_name(), "Skipping unknown attachment element");
                reader.skip_element()?;
            }
        }
        Ok(())
    }

    /// Consume the current child element if it belongs to a file attachment.
    pub fn try_read_element_from_xml<R: ElementReader>(&mut self, reader: &mut R) -> Result<bool> {
        self.read_element(reader, &|_| true)
    }

    fn read_element<R: ElementReader>(
        &mut self,
        reader: &mut R,
        progress: &dyn Fn(u64) -> bool,
    ) -> Result<bool> {
        let element = reader.local_name().to_string();
        match element.as_str() {
            NAME => self.name = Some(reader.read_element_value()?),
            CONTENT_TYPE => self.content_type = Some(reader.read_element_value()?),
            CONTENT_ID => self.content_id = Some(reader.read_element_value()?),
            IS_INLINE => self.is_inline = reader.read_bool_element_value()?,
            IS_CONTACT_PHOTO => self.is_contact_photo = reader.read_bool_element_value()?,
            CONTENT => self.content.read_from_with_progress(reader, progress)?,
            _ => return Ok(false),
        }
        Ok(true)
    }

    /// Check the attachment can be saved as entry `index` of its collection.
    pub fn validate(&self, index: usize) -> Result<()> {
        if self.content.source().is_none() {
            return Err(SpoolError::Validation(format!(
                "The content of the file attachment at index {index} must be set."
            )));
        }
        Ok(())
    }

    /// Write the whole `FileAttachment` element.
    pub fn write_to_xml<W: ElementWriter>(&self, writer: &mut W) -> Result<()> {
        self.write_to_xml_with_progress(writer, &|_| true)
    }

    /// Like [`write_to_xml`](Self::write_to_xml), reporting raw content bytes
    /// sent. The callback returns `false` to cancel.
    pub fn write_to_xml_with_progress<W: ElementWriter>(
        &self,
        writer: &mut W,
        progress: &dyn Fn(u64) -> bool,
    ) -> Result<()> {
        if self.content.source().is_none() {
            return Err(SpoolError::Validation(
                "The attachment's content is not set.".into(),
            ));
        }
        writer.write_start_element(XmlNamespace::Types, FILE_ATTACHMENT)?;
        self.write_elements_to_xml(writer, progress)?;
        writer.write_end_element()?;
        Ok(())
    }

    fn write_elements_to_xml<W: ElementWriter>(
        &self,
        writer: &mut W,
        progress: &dyn Fn(u64) -> bool,
    ) -> Result<()> {
        let newer_than_legacy = writer.version() > LEGACY_VERSION;

        if let Some(name) = &self.name {
            writer.write_element_value(XmlNamespace::Types, NAME, name)?;
        }
        if let Some(content_type) = &self.content_type {
            writer.write_element_value(XmlNamespace::Types, CONTENT_TYPE, content_type)?;
        }
        if let Some(content_id) = &self.content_id {
            writer.write_element_value(XmlNamespace::Types, CONTENT_ID, content_id)?;
        }
        if newer_than_legacy {
            writer.write_bool_element_value(XmlNamespace::Types, IS_INLINE, self.is_inline)?;
            writer.write_bool_element_value(
                XmlNamespace::Types,
                IS_CONTACT_PHOTO,
                self.is_contact_photo,
            )?;
        }

        writer.write_start_element(XmlNamespace::Types, CONTENT)?;
        let sent = self.content.write_to_with_progress(writer, progress)?;
        writer.write_end_element()?;
        debug!(name = ?self.name, sent, "Wrote file attachment");
        Ok(())
    }

    pub fn version(&self) -> ExchangeVersion {
        self.version
    }

    /// `true` until the attachment has been read back from a document.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = Some(content_type.into());
    }

    pub fn content_id(&self) -> Option<&str> {
        self.content_id.as_deref()
    }

    pub fn set_content_id(&mut self, content_id: impl Into<String>) {
        self.content_id = Some(content_id.into());
    }

    pub fn is_inline(&self) -> bool {
        self.is_inline
    }

    pub fn set_is_inline(&mut self, is_inline: bool) {
        self.is_inline = is_inline;
    }

    /// The attachment's content. Only set after a load or [`set_content`](Self::set_content).
    pub fn content(&self) -> Option<&dyn ByteSource> {
        self.content.source()
    }

    /// Spool holding content read from a document.
    pub fn spooled_content(&self) -> Option<&SpooledBuffer> {
        self.content.spool()
    }

    pub fn content_state(&self) -> ContentState {
        self.content.state()
    }

    /// Share `source` as the content to upload. Only new attachments can be changed.
    pub fn set_content(&mut self, source: SharedSource) -> Result<()> {
        self.throw_if_not_new()?;
        self.content.set_shared(source);
        Ok(())
    }

    /// Whether the attachment is a contact photo. Requires Exchange 2010.
    pub fn is_contact_photo(&self) -> Result<bool> {
        validate_property_version(self.version, CONTACT_PHOTO_VERSION, IS_CONTACT_PHOTO)?;
        Ok(self.is_contact_photo)
    }

    pub fn set_is_contact_photo(&mut self, is_contact_photo: bool) -> Result<()> {
        validate_property_version(self.version, CONTACT_PHOTO_VERSION, IS_CONTACT_PHOTO)?;
        self.throw_if_not_new()?;
        self.is_contact_photo = is_contact_photo;
        Ok(())
    }

    /// Delete spooled content. Content shared by the caller is left alone.
    pub fn close(&mut self) {
        self.content.close();
    }

    fn throw_if_not_new(&self) -> Result<()> {
        if !self.is_new {
            return Err(SpoolError::Validation(
                "This operation can't be performed because this attachment has already been created."
                    .into(),
            ));
        }
        Ok(())
    }
}

/// Validate every attachment, then write them as one `Attachments` element.
///
/// Nothing is written when any attachment fails validation.
pub fn write_attachments<W: ElementWriter>(writer: &mut W, attachments: &[FileAttachment]) -> Result<()> {
    for (index, attachment) in attachments.iter().enumerate() {
        attachment.validate(index)?;
    }
    writer.write_start_element(XmlNamespace::Types, ATTACHMENTS)?;
    for attachment in attachments {
        attachment.write_to_xml(writer)?;
    }
    writer.write_end_element()?;
    Ok(())
}

/// Read the children of an `Attachments` element the reader is positioned on.
///
/// Attachment kinds other than file attachments are skipped.
pub fn read_attachments<R: ElementReader>(
    reader: &mut R,
    version: ExchangeVersion,
) -> Result<Vec<FileAttachment>> {
    let mut attachments = Vec::new();
    while reader.next_child()? {
        if reader.local_name() == FILE_ATTACHMENT {
            attachments.push(FileAttachment::read_from_xml(reader, version)?);
        } else {
            reader.skip_element()?;
        }
    }
    Ok(attachments)
}
