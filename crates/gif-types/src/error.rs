use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure to turn a byte stream into a [`crate::Document`].
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeError {
    #[error("E_DECODE_HEADER: malformed header: {message}")]
    MalformedHeader { message: String },

    #[error("E_DECODE_BLOCK: unsupported block introducer 0x{introducer:02X} at offset {offset}")]
    UnsupportedBlock { introducer: u8, offset: usize },

    #[error("E_DECODE_TRUNCATED: {context} needs {needed} bytes at offset {offset}, {available} available")]
    TruncatedBlock {
        context: String,
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("E_DECODE_COLOR_TABLE: {message}")]
    InvalidColorTable { message: String },

    #[error("E_DECODE_LZW: corrupt LZW data in frame {frame}: {message}")]
    CorruptLzw { frame: usize, message: String },

    #[error("E_DECODE_UNSUPPORTED: frame {frame} uses {feature}")]
    Unsupported { frame: usize, feature: String },

    #[error("E_DECODE_BOUNDS: frame {frame} does not fit the logical screen")]
    FrameOutOfBounds { frame: usize },

    #[error("E_DECODE_INDEX: frame {frame} uses index {index} but its palette has {palette_len} entries")]
    IndexOutOfRange {
        frame: usize,
        index: u8,
        palette_len: usize,
    },

    #[error("E_DECODE_PALETTE: frame {frame} has neither a local nor a global color table")]
    MissingColorTable { frame: usize },

    #[error("E_DECODE_EMPTY: stream contains no frames")]
    NoFrames,
}

impl DecodeError {
    /// Stable code for logs and for the collaborator's error mapping.
    pub fn code(&self) -> &'static str {
        match self {
            DecodeError::MalformedHeader { .. } => "E_DECODE_HEADER",
            DecodeError::UnsupportedBlock { .. } => "E_DECODE_BLOCK",
            DecodeError::TruncatedBlock { .. } => "E_DECODE_TRUNCATED",
            DecodeError::InvalidColorTable { .. } => "E_DECODE_COLOR_TABLE",
            DecodeError::CorruptLzw { .. } => "E_DECODE_LZW",
            DecodeError::Unsupported { .. } => "E_DECODE_UNSUPPORTED",
            DecodeError::FrameOutOfBounds { .. } => "E_DECODE_BOUNDS",
            DecodeError::IndexOutOfRange { .. } => "E_DECODE_INDEX",
            DecodeError::MissingColorTable { .. } => "E_DECODE_PALETTE",
            DecodeError::NoFrames => "E_DECODE_EMPTY",
        }
    }
}

/// Failure to serialize a [`crate::Document`].
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncodeError {
    #[error("E_ENCODE_EMPTY: document has no frames")]
    EmptyDocument,

    #[error("E_ENCODE_DIMENSIONS: logical screen {width}x{height} is empty")]
    InvalidDimensions { width: u16, height: u16 },

    #[error("E_ENCODE_PALETTE_OVERFLOW: palette has {len} entries (max 256)")]
    PaletteOverflow { len: usize },

    #[error("E_ENCODE_PALETTE: frame {frame} has neither a local nor a global palette")]
    MissingPalette { frame: usize },

    #[error("E_ENCODE_FRAME_SIZE: frame {frame} has {actual} indices, expected {expected}")]
    FrameSizeMismatch {
        frame: usize,
        expected: usize,
        actual: usize,
    },

    #[error("E_ENCODE_BOUNDS: frame {frame} does not fit the logical screen")]
    FrameOutOfBounds { frame: usize },

    #[error("E_ENCODE_INDEX: frame {frame} uses index {index} but its palette has {palette_len} entries")]
    IndexOutOfRange {
        frame: usize,
        index: u8,
        palette_len: usize,
    },
}

impl EncodeError {
    pub fn code(&self) -> &'static str {
        match self {
            EncodeError::EmptyDocument => "E_ENCODE_EMPTY",
            EncodeError::InvalidDimensions { .. } => "E_ENCODE_DIMENSIONS",
            EncodeError::PaletteOverflow { .. } => "E_ENCODE_PALETTE_OVERFLOW",
            EncodeError::MissingPalette { .. } => "E_ENCODE_PALETTE",
            EncodeError::FrameSizeMismatch { .. } => "E_ENCODE_FRAME_SIZE",
            EncodeError::FrameOutOfBounds { .. } => "E_ENCODE_BOUNDS",
            EncodeError::IndexOutOfRange { .. } => "E_ENCODE_INDEX",
        }
    }
}

/// Failure to present a frame on a caller-supplied surface.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderError {
    #[error("E_RENDER_NOT_LOADED: no document is loaded")]
    NotLoaded,

    #[error(
        "E_RENDER_SURFACE: surface is {actual_width}x{actual_height}, document is {expected_width}x{expected_height}"
    )]
    SurfaceMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("E_RENDER_CAPTION: invalid caption: {message}")]
    InvalidCaption { message: String },
}

impl RenderError {
    pub fn code(&self) -> &'static str {
        match self {
            RenderError::NotLoaded => "E_RENDER_NOT_LOADED",
            RenderError::SurfaceMismatch { .. } => "E_RENDER_SURFACE",
            RenderError::InvalidCaption { .. } => "E_RENDER_CAPTION",
        }
    }
}

/// Failure of the batch export operation, returned across the worker boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcessingError {
    #[error("{0}")]
    Decode(#[from] DecodeError),

    #[error("{0}")]
    Encode(#[from] EncodeError),

    #[error("E_EXPORT_CAPTION: invalid caption: {message}")]
    InvalidCaption { message: String },

    #[error("E_EXPORT_QUANTIZE: quantization failed: {message}")]
    QuantizationFailed { message: String },

    #[error("E_EXPORT_WORKER: export worker stopped: {message}")]
    WorkerDisconnected { message: String },
}

impl ProcessingError {
    pub fn code(&self) -> &'static str {
        match self {
            ProcessingError::Decode(e) => e.code(),
            ProcessingError::Encode(e) => e.code(),
            ProcessingError::InvalidCaption { .. } => "E_EXPORT_CAPTION",
            ProcessingError::QuantizationFailed { .. } => "E_EXPORT_QUANTIZE",
            ProcessingError::WorkerDisconnected { .. } => "E_EXPORT_WORKER",
        }
    }
}
