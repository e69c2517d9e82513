//! Field types carrying streamed binary payloads.

pub mod attachment;
pub mod content;
pub mod mime;

pub use attachment::{read_attachments, write_attachments, FileAttachment};
pub use content::{BinaryContent, ContentState};
pub use mime::{MimeContent, MimeSummary};
