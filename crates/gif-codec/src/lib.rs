//! GIF87a/GIF89a container codec.
//!
//! [`decode`] turns a byte stream into a [`gif_types::Document`]; [`encode`]
//! writes one back as GIF89a. The variable-width LZW layer lives in [`lzw`].

pub mod lzw;
mod decoder;
mod encoder;

pub use decoder::{decode, GifDecoder};
pub use encoder::{encode, EncoderConfig, GifEncoder};

pub const GIF87A_SIGNATURE: &[u8; 6] = b"GIF87a";
pub const GIF89A_SIGNATURE: &[u8; 6] = b"GIF89a";

pub const EXTENSION_INTRODUCER: u8 = 0x21;
pub const IMAGE_SEPARATOR: u8 = 0x2C;
pub const TRAILER: u8 = 0x3B;

pub const GRAPHIC_CONTROL_LABEL: u8 = 0xF9;
pub const APPLICATION_LABEL: u8 = 0xFF;
pub const COMMENT_LABEL: u8 = 0xFE;
pub const PLAIN_TEXT_LABEL: u8 = 0x01;

/// Longest payload of a single data sub-block.
pub const MAX_SUB_BLOCK_LEN: usize = 255;
