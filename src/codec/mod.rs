//! Streaming base64 codec and its element-level integration.

pub mod decoder;
pub mod element;
pub mod encoder;

pub use decoder::{Base64ChunkDecoder, Base64Error, DECODE_WINDOW};
pub use element::{
    read_base64_element_value, read_base64_element_value_with_progress,
    write_base64_element_value, write_base64_element_value_with_progress,
};
pub use encoder::{encode_stream, DEFAULT_ENCODE_CHUNK};
