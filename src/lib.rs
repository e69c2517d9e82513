//! `attachspool`: streaming base64 attachment and MIME payloads for XML documents.
//!
//! Binary payloads embedded as base64 text are decoded chunk by chunk into a
//! [`SpooledBuffer`](store::SpooledBuffer) that keeps small payloads in memory
//! and moves large ones to a temporary file, then exposed as a re-readable
//! [`ByteSource`](store::ByteSource). The reverse path streams any byte source
//! back out as base64 text without loading it whole.

pub mod codec;
pub mod config;
pub mod error;
pub mod model;
pub mod store;
pub mod version;
pub mod xml;
