//! GIF89a writer.

use gif_types::{Document, EncodeError, Frame, FrameFault, Rgb, MAX_PALETTE_LEN};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, span, warn, Level};

use crate::lzw;
use crate::{
    APPLICATION_LABEL, EXTENSION_INTRODUCER, GIF89A_SIGNATURE, GRAPHIC_CONTROL_LABEL,
    IMAGE_SEPARATOR, MAX_SUB_BLOCK_LEN, TRAILER,
};

/// Knobs applied while writing; the document itself is never modified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// When set, every frame is written with this delay instead of its own.
    pub delay_override: Option<u16>,
}

/// Serializes a [`Document`] as GIF89a.
#[derive(Debug, Clone, Default)]
pub struct GifEncoder {
    config: EncoderConfig,
}

impl GifEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: EncoderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_delay_override(mut self, delay_cs: u16) -> Self {
        self.config.delay_override = Some(delay_cs);
        self
    }

    /// Validate the whole document, then write it. Nothing is written on error.
    #[tracing::instrument(level = "info", skip_all, fields(frames = doc.frames.len()))]
    pub fn encode(&self, doc: &Document) -> Result<Vec<u8>, EncodeError> {
        let span = span!(Level::INFO, "gif_encode", width = doc.width, height = doc.height);
        let _guard = span.enter();

        let start_time = std::time::Instant::now();
        self.validate_document(doc)?;

        let mut output = Vec::new();
        self.write_header(&mut output, doc);
        if let Some(count) = doc.loop_count {
            self.write_loop_extension(&mut output, count);
        }

        for (frame_idx, frame) in doc.frames.iter().enumerate() {
            self.write_frame(&mut output, doc, frame, frame_idx)?;
        }
        output.push(TRAILER);

        info!(
            stage = "encode",
            frames = doc.frames.len(),
            gif_size_bytes = output.len(),
            loop_count = ?doc.loop_count,
            duration_ms = start_time.elapsed().as_millis() as u64,
            "GIF encoding completed"
        );
        Ok(output)
    }

    fn validate_document(&self, doc: &Document) -> Result<(), EncodeError> {
        if doc.frames.is_empty() {
            return Err(EncodeError::EmptyDocument);
        }
        if doc.width == 0 || doc.height == 0 {
            return Err(EncodeError::InvalidDimensions {
                width: doc.width,
                height: doc.height,
            });
        }
        if let Some(palette) = &doc.global_palette {
            if palette.len() > MAX_PALETTE_LEN {
                return Err(EncodeError::PaletteOverflow { len: palette.len() });
            }
        }

        for (frame_idx, frame) in doc.frames.iter().enumerate() {
            doc.check_frame(frame).map_err(|fault| match fault {
                FrameFault::OutOfBounds => EncodeError::FrameOutOfBounds { frame: frame_idx },
                FrameFault::SizeMismatch { expected, actual } => EncodeError::FrameSizeMismatch {
                    frame: frame_idx,
                    expected,
                    actual,
                },
                FrameFault::MissingPalette => EncodeError::MissingPalette { frame: frame_idx },
                FrameFault::PaletteOverflow { len } => EncodeError::PaletteOverflow { len },
                FrameFault::IndexOutOfRange { index, palette_len } => EncodeError::IndexOutOfRange {
                    frame: frame_idx,
                    index,
                    palette_len,
                },
            })?;
        }
        Ok(())
    }

    /// Signature, logical screen descriptor and the global color table.
    fn write_header(&self, output: &mut Vec<u8>, doc: &Document) {
        output.extend_from_slice(GIF89A_SIGNATURE);
        output.extend_from_slice(&doc.width.to_le_bytes());
        output.extend_from_slice(&doc.height.to_le_bytes());

        match &doc.global_palette {
            Some(palette) => {
                // Any frame may lean on the global table for its transparent index.
                let highest_transparent = doc
                    .frames
                    .iter()
                    .filter(|f| f.local_palette.is_none())
                    .filter_map(|f| f.transparent_index)
                    .max();
                let size_bits = table_size_bits(palette.len(), highest_transparent);
                // Global table flag, 8-bit color resolution, table size.
                output.push(0x80 | 0x70 | size_bits);
                output.push(doc.background_index);
                output.push(0); // Pixel aspect ratio
                write_color_table(output, palette, size_bits);
            }
            None => {
                output.push(0x70);
                output.push(0);
                output.push(0);
            }
        }
    }

    fn write_loop_extension(&self, output: &mut Vec<u8>, count: u16) {
        output.extend_from_slice(&[EXTENSION_INTRODUCER, APPLICATION_LABEL, 11]);
        output.extend_from_slice(b"NETSCAPE2.0");
        output.extend_from_slice(&[3, 1]);
        output.extend_from_slice(&count.to_le_bytes());
        output.push(0);
    }

    fn write_frame(
        &self,
        output: &mut Vec<u8>,
        doc: &Document,
        frame: &Frame,
        frame_idx: usize,
    ) -> Result<(), EncodeError> {
        let delay = self.config.delay_override.unwrap_or(frame.delay_cs);

        // Graphic control extension, always present.
        let mut packed = frame.disposal.to_packed();
        if frame.transparent_index.is_some() {
            packed |= 0x01;
        }
        output.extend_from_slice(&[EXTENSION_INTRODUCER, GRAPHIC_CONTROL_LABEL, 4, packed]);
        output.extend_from_slice(&delay.to_le_bytes());
        output.push(frame.transparent_index.unwrap_or(0));
        output.push(0);

        // Image descriptor
        output.push(IMAGE_SEPARATOR);
        output.extend_from_slice(&frame.left.to_le_bytes());
        output.extend_from_slice(&frame.top.to_le_bytes());
        output.extend_from_slice(&frame.width.to_le_bytes());
        output.extend_from_slice(&frame.height.to_le_bytes());

        let size_bits = match &frame.local_palette {
            Some(palette) => {
                let size_bits = table_size_bits(palette.len(), frame.transparent_index);
                output.push(0x80 | size_bits);
                write_color_table(output, palette, size_bits);
                size_bits
            }
            None => {
                output.push(0);
                let palette = doc
                    .global_palette
                    .as_deref()
                    .ok_or(EncodeError::MissingPalette { frame: frame_idx })?;
                table_size_bits(palette.len(), frame.transparent_index)
            }
        };

        let min_code_size = (size_bits + 1).max(2);
        self.write_lzw_data(output, &frame.indices, min_code_size, frame_idx)?;

        debug!(
            stage = "encode",
            frame = frame_idx,
            delay_cs = delay,
            disposal = ?frame.disposal,
            local_palette = frame.local_palette.is_some(),
            min_code_size,
            "Frame written"
        );
        Ok(())
    }

    fn write_lzw_data(
        &self,
        output: &mut Vec<u8>,
        indices: &[u8],
        min_code_size: u8,
        frame_idx: usize,
    ) -> Result<(), EncodeError> {
        output.push(min_code_size);
        let compressed = lzw::encode(indices, min_code_size).map_err(|e| {
            // Indices were validated against the table, so this is a table sizing bug.
            warn!(stage = "encode", frame = frame_idx, error = %e, "LZW rejected frame indices");
            let index = indices
                .iter()
                .copied()
                .find(|&i| (i as usize) >= (1usize << min_code_size))
                .unwrap_or(0);
            EncodeError::IndexOutOfRange {
                frame: frame_idx,
                index,
                palette_len: 1usize << min_code_size,
            }
        })?;

        for block in compressed.chunks(MAX_SUB_BLOCK_LEN) {
            output.push(block.len() as u8);
            output.extend_from_slice(block);
        }
        output.push(0); // Block terminator
        Ok(())
    }
}

/// Encode with the default configuration.
pub fn encode(doc: &Document) -> Result<Vec<u8>, EncodeError> {
    GifEncoder::new().encode(doc)
}

/// Color table size field `n` such that `2^(n+1)` entries hold the palette
/// (and the transparent index, if it lies past the palette).
fn table_size_bits(palette_len: usize, transparent_index: Option<u8>) -> u8 {
    let needed = transparent_index
        .map_or(palette_len, |t| palette_len.max(t as usize + 1))
        .max(2);
    let mut bits = 0u8;
    while (2usize << bits) < needed {
        bits += 1;
    }
    bits
}

fn write_color_table(output: &mut Vec<u8>, palette: &[Rgb], size_bits: u8) {
    let table_len = 2usize << size_bits;
    for rgb in palette {
        output.extend_from_slice(rgb);
    }
    for _ in palette.len()..table_len {
        output.extend_from_slice(&[0, 0, 0]);
    }
}
