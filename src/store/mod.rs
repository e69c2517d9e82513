//! Payload storage: spooled buffers and re-openable byte sources.

pub mod source;
pub mod spool;

pub use source::{ByteSource, FileSource, SharedSource};
pub use spool::{SpoolOptions, SpoolSink, SpooledBuffer, DEFAULT_THRESHOLD};
