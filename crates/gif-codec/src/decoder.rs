//! GIF87a/GIF89a stream parser.

use gif_types::{DecodeError, DisposalMethod, Document, Frame, FrameFault, Rgb};
use tracing::{debug, info, span, warn, Level};

use crate::lzw;
use crate::{
    APPLICATION_LABEL, COMMENT_LABEL, EXTENSION_INTRODUCER, GIF87A_SIGNATURE, GIF89A_SIGNATURE,
    GRAPHIC_CONTROL_LABEL, IMAGE_SEPARATOR, PLAIN_TEXT_LABEL, TRAILER,
};

/// Default ceiling on decoded pixels across all frames (index bytes).
const DEFAULT_PIXEL_LIMIT: usize = 512 * 1024 * 1024;

/// Parses a complete GIF byte stream into a [`Document`].
#[derive(Debug, Clone)]
pub struct GifDecoder {
    pixel_limit: usize,
}

impl Default for GifDecoder {
    fn default() -> Self {
        Self {
            pixel_limit: DEFAULT_PIXEL_LIMIT,
        }
    }
}

impl GifDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject streams whose frames decode to more than `limit` pixels in total.
    pub fn with_pixel_limit(mut self, limit: usize) -> Self {
        self.pixel_limit = limit;
        self
    }

    /// Decode `bytes`; on failure nothing partial is returned.
    pub fn decode(&self, bytes: &[u8]) -> Result<Document, DecodeError> {
        let span = span!(Level::INFO, "gif_decode", bytes = bytes.len());
        let _guard = span.enter();

        let mut reader = ByteReader::new(bytes);
        let mut doc = read_header(&mut reader)?;

        info!(
            stage = "decode",
            width = doc.width,
            height = doc.height,
            global_colors = doc.global_palette.as_ref().map_or(0, |p| p.len()),
            "Parsed logical screen descriptor"
        );

        let mut pending: Option<GraphicControl> = None;
        let mut decoded_pixels = 0usize;
        let mut saw_trailer = false;

        while let Some(introducer) = reader.peek() {
            let offset = reader.position();
            reader.skip(1);
            match introducer {
                EXTENSION_INTRODUCER => {
                    let label = reader.read_u8("extension label")?;
                    match label {
                        GRAPHIC_CONTROL_LABEL => {
                            pending = Some(read_graphic_control(&mut reader)?);
                        }
                        APPLICATION_LABEL => {
                            if let Some(count) = read_application_extension(&mut reader)? {
                                debug!(stage = "decode", loop_count = count, "Found looping extension");
                                doc.loop_count = Some(count);
                            }
                        }
                        COMMENT_LABEL => {
                            debug!(stage = "decode", offset, "Skipping comment");
                            reader.skip_sub_blocks("comment extension")?;
                        }
                        PLAIN_TEXT_LABEL => {
                            // A graphic control block applies to the plain text it precedes.
                            debug!(stage = "decode", offset, "Skipping plain text");
                            pending = None;
                            reader.skip_sub_blocks("plain text extension")?;
                        }
                        other => {
                            debug!(stage = "decode", label = other, offset, "Skipping extension");
                            reader.skip_sub_blocks("extension data")?;
                        }
                    }
                }
                IMAGE_SEPARATOR => {
                    let index = doc.frames.len();
                    let frame = read_frame(&mut reader, &doc, index, pending.take(), self.pixel_limit - decoded_pixels)?;
                    decoded_pixels += frame.pixel_count();
                    debug!(
                        stage = "decode",
                        frame = index,
                        left = frame.left,
                        top = frame.top,
                        width = frame.width,
                        height = frame.height,
                        delay_cs = frame.delay_cs,
                        disposal = ?frame.disposal,
                        "Decoded frame"
                    );
                    doc.frames.push(frame);
                }
                TRAILER => {
                    saw_trailer = true;
                    break;
                }
                other => {
                    return Err(DecodeError::UnsupportedBlock {
                        introducer: other,
                        offset,
                    });
                }
            }
        }

        if doc.frames.is_empty() {
            return Err(DecodeError::NoFrames);
        }
        if !saw_trailer {
            warn!(stage = "decode", frames = doc.frames.len(), "Stream ended without a trailer");
        }

        info!(
            stage = "decode",
            frames = doc.frames.len(),
            loop_count = ?doc.loop_count,
            "GIF decode completed"
        );
        Ok(doc)
    }
}

/// Decode with default limits.
pub fn decode(bytes: &[u8]) -> Result<Document, DecodeError> {
    GifDecoder::new().decode(bytes)
}

#[derive(Debug, Clone, Copy)]
struct GraphicControl {
    disposal: DisposalMethod,
    delay_cs: u16,
    transparent_index: Option<u8>,
}

fn read_header(reader: &mut ByteReader<'_>) -> Result<Document, DecodeError> {
    let signature = reader.data.get(..6).ok_or_else(|| DecodeError::MalformedHeader {
        message: format!("stream is {} bytes, shorter than the signature", reader.data.len()),
    })?;
    if signature != GIF87A_SIGNATURE && signature != GIF89A_SIGNATURE {
        return Err(DecodeError::MalformedHeader {
            message: format!("unknown signature {:?}", String::from_utf8_lossy(signature)),
        });
    }
    reader.skip(6);

    let descriptor = reader.take(7, "logical screen descriptor")?;
    let width = u16::from_le_bytes([descriptor[0], descriptor[1]]);
    let height = u16::from_le_bytes([descriptor[2], descriptor[3]]);
    let packed = descriptor[4];
    let background_index = descriptor[5];

    let mut doc = Document::new(width, height);
    doc.background_index = background_index;
    if packed & 0x80 != 0 {
        doc.global_palette = Some(read_color_table(reader, packed & 0x07, "global")?);
    }
    Ok(doc)
}

fn read_color_table(reader: &mut ByteReader<'_>, size_bits: u8, scope: &str) -> Result<Vec<Rgb>, DecodeError> {
    let entries = 1usize << (size_bits + 1);
    let bytes = reader
        .take(entries * 3, "color table")
        .map_err(|_| DecodeError::InvalidColorTable {
            message: format!(
                "{scope} color table declares {entries} entries ({} bytes) at offset {}, {} bytes remain",
                entries * 3,
                reader.position(),
                reader.remaining()
            ),
        })?;
    Ok(bytes.chunks_exact(3).map(|c| [c[0], c[1], c[2]]).collect())
}

fn read_graphic_control(reader: &mut ByteReader<'_>) -> Result<GraphicControl, DecodeError> {
    let offset = reader.position();
    let block = reader.read_sub_block("graphic control extension")?;
    if block.len() < 4 {
        return Err(DecodeError::TruncatedBlock {
            context: "graphic control extension".to_string(),
            offset,
            needed: 4,
            available: block.len(),
        });
    }
    let packed = block[0];
    let control = GraphicControl {
        disposal: DisposalMethod::from_packed(packed),
        delay_cs: u16::from_le_bytes([block[1], block[2]]),
        transparent_index: (packed & 0x01 != 0).then_some(block[3]),
    };
    reader.skip_sub_blocks("graphic control extension")?;
    Ok(control)
}

/// Returns the loop count when the block is a NETSCAPE2.0/ANIMEXTS1.0 looping extension.
fn read_application_extension(reader: &mut ByteReader<'_>) -> Result<Option<u16>, DecodeError> {
    let identifier = reader.read_sub_block("application extension")?;
    let is_looping = identifier == b"NETSCAPE2.0" || identifier == b"ANIMEXTS1.0";

    let mut loop_count = None;
    loop {
        let block = reader.read_sub_block("application data")?;
        if block.is_empty() {
            break;
        }
        if is_looping && block.len() >= 3 && block[0] == 0x01 {
            loop_count = Some(u16::from_le_bytes([block[1], block[2]]));
        }
    }
    Ok(loop_count)
}

fn read_frame(
    reader: &mut ByteReader<'_>,
    doc: &Document,
    index: usize,
    control: Option<GraphicControl>,
    pixel_budget: usize,
) -> Result<Frame, DecodeError> {
    let descriptor = reader.take(9, "image descriptor")?;
    let left = u16::from_le_bytes([descriptor[0], descriptor[1]]);
    let top = u16::from_le_bytes([descriptor[2], descriptor[3]]);
    let width = u16::from_le_bytes([descriptor[4], descriptor[5]]);
    let height = u16::from_le_bytes([descriptor[6], descriptor[7]]);
    let packed = descriptor[8];

    if packed & 0x40 != 0 {
        return Err(DecodeError::Unsupported {
            frame: index,
            feature: "interlaced image data".to_string(),
        });
    }

    // Reject bad geometry before any pixel data is decoded.
    if u32::from(left) + u32::from(width) > u32::from(doc.width)
        || u32::from(top) + u32::from(height) > u32::from(doc.height)
    {
        return Err(DecodeError::FrameOutOfBounds { frame: index });
    }

    let local_palette = if packed & 0x80 != 0 {
        Some(read_color_table(reader, packed & 0x07, "local")?)
    } else {
        None
    };
    if local_palette.is_none() && doc.global_palette.is_none() {
        return Err(DecodeError::MissingColorTable { frame: index });
    }

    let pixel_count = width as usize * height as usize;
    if pixel_count > pixel_budget {
        return Err(DecodeError::Unsupported {
            frame: index,
            feature: format!("{pixel_count} pixels, beyond the decoder's pixel limit"),
        });
    }

    let min_code_size = reader.read_u8("LZW minimum code size")?;
    let data = reader.collect_sub_blocks("image data")?;
    let indices = lzw::decode(&data, min_code_size, pixel_count).map_err(|e| DecodeError::CorruptLzw {
        frame: index,
        message: e.to_string(),
    })?;

    let control = control.unwrap_or(GraphicControl {
        disposal: DisposalMethod::None,
        delay_cs: 0,
        transparent_index: None,
    });

    let frame = Frame {
        left,
        top,
        width,
        height,
        local_palette,
        delay_cs: control.delay_cs,
        disposal: control.disposal,
        transparent_index: control.transparent_index,
        indices,
    };

    doc.check_frame(&frame).map_err(|fault| match fault {
        FrameFault::OutOfBounds | FrameFault::SizeMismatch { .. } => DecodeError::FrameOutOfBounds { frame: index },
        FrameFault::MissingPalette => DecodeError::MissingColorTable { frame: index },
        FrameFault::PaletteOverflow { len } => DecodeError::InvalidColorTable {
            message: format!("frame {index} palette has {len} entries"),
        },
        FrameFault::IndexOutOfRange { index: value, palette_len } => DecodeError::IndexOutOfRange {
            frame: index,
            index: value,
            palette_len,
        },
    })?;

    Ok(frame)
}

/// Bounds-checked cursor over the input bytes.
struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn peek(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    fn skip(&mut self, n: usize) {
        self.pos = (self.pos + n).min(self.data.len());
    }

    fn take(&mut self, n: usize, context: &str) -> Result<&'a [u8], DecodeError> {
        if n > self.remaining() {
            return Err(DecodeError::TruncatedBlock {
                context: context.to_string(),
                offset: self.pos,
                needed: n,
                available: self.remaining(),
            });
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn read_u8(&mut self, context: &str) -> Result<u8, DecodeError> {
        Ok(self.take(1, context)?[0])
    }

    /// One length-prefixed sub-block; empty slice for the terminator.
    fn read_sub_block(&mut self, context: &str) -> Result<&'a [u8], DecodeError> {
        let len = self.read_u8(context)? as usize;
        self.take(len, context)
    }

    fn skip_sub_blocks(&mut self, context: &str) -> Result<(), DecodeError> {
        while !self.read_sub_block(context)?.is_empty() {}
        Ok(())
    }

    fn collect_sub_blocks(&mut self, context: &str) -> Result<Vec<u8>, DecodeError> {
        let mut collected = Vec::new();
        loop {
            let block = self.read_sub_block(context)?;
            if block.is_empty() {
                return Ok(collected);
            }
            collected.extend_from_slice(block);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 2x2 GIF89a, 2-color global table, one frame of indices [0, 1, 1, 0].
    fn tiny_gif() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(b"GIF89a");
        out.extend_from_slice(&[2, 0, 2, 0, 0x80, 0, 0]);
        out.extend_from_slice(&[0, 0, 0, 255, 255, 255]);
        out.extend_from_slice(&[0x21, 0xF9, 4, 0x04 | 0x01, 7, 0, 1, 0]);
        out.extend_from_slice(&[0x2C, 0, 0, 0, 0, 2, 0, 2, 0, 0]);
        let data = lzw::encode(&[0, 1, 1, 0], 2).unwrap();
        out.push(2);
        out.push(data.len() as u8);
        out.extend_from_slice(&data);
        out.push(0);
        out.push(0x3B);
        out
    }

    #[test]
    fn test_decode_tiny() {
        let doc = decode(&tiny_gif()).unwrap();
        assert_eq!((doc.width, doc.height), (2, 2));
        assert_eq!(doc.global_palette.as_ref().unwrap().len(), 2);
        let frame = &doc.frames[0];
        assert_eq!(frame.indices, vec![0, 1, 1, 0]);
        assert_eq!(frame.delay_cs, 7);
        assert_eq!(frame.disposal, DisposalMethod::DoNotDispose);
        assert_eq!(frame.transparent_index, Some(1));
        assert_eq!(doc.loop_count, None);
    }

    #[test]
    fn test_invalid_signature() {
        let result = decode(b"NOTGIF0000000");
        assert!(matches!(result, Err(DecodeError::MalformedHeader { .. })));
    }

    #[test]
    fn test_short_buffer_is_malformed_header() {
        assert!(matches!(decode(b"GIF8"), Err(DecodeError::MalformedHeader { .. })));
        assert!(matches!(decode(b""), Err(DecodeError::MalformedHeader { .. })));
    }

    #[test]
    fn test_truncated_screen_descriptor() {
        assert!(matches!(decode(b"GIF89a\x02\x00"), Err(DecodeError::TruncatedBlock { .. })));
    }

    #[test]
    fn test_color_table_past_end() {
        let mut bytes = tiny_gif();
        bytes.truncate(13 + 4);
        assert!(matches!(decode(&bytes), Err(DecodeError::InvalidColorTable { .. })));
    }

    #[test]
    fn test_unknown_block() {
        let mut bytes = tiny_gif();
        let trailer = bytes.len() - 1;
        bytes[trailer] = 0x99;
        assert!(matches!(
            decode(&bytes),
            Err(DecodeError::UnsupportedBlock { introducer: 0x99, .. })
        ));
    }

    #[test]
    fn test_comment_extension_is_skipped() {
        let mut bytes = tiny_gif();
        let comment = [0x21, 0xFE, 3, b'h', b'e', b'y', 0];
        bytes.splice(19..19, comment);
        let doc = decode(&bytes).unwrap();
        assert_eq!(doc.frames.len(), 1);
    }

    #[test]
    fn test_netscape_loop_count() {
        let mut bytes = tiny_gif();
        let mut ext = vec![0x21, 0xFF, 11];
        ext.extend_from_slice(b"NETSCAPE2.0");
        ext.extend_from_slice(&[3, 1, 5, 0, 0]);
        bytes.splice(19..19, ext);
        assert_eq!(decode(&bytes).unwrap().loop_count, Some(5));
    }

    #[test]
    fn test_missing_trailer_is_accepted() {
        let mut bytes = tiny_gif();
        bytes.pop();
        assert_eq!(decode(&bytes).unwrap().frames.len(), 1);
    }

    #[test]
    fn test_truncated_image_data() {
        let bytes = tiny_gif();
        let cut = &bytes[..bytes.len() - 4];
        assert!(matches!(decode(cut), Err(DecodeError::TruncatedBlock { .. })));
    }

    #[test]
    fn test_no_frames() {
        let bytes = tiny_gif();
        let mut header_only = bytes[..19].to_vec();
        header_only.push(0x3B);
        assert_eq!(decode(&header_only), Err(DecodeError::NoFrames));
    }

    #[test]
    fn test_interlaced_is_rejected() {
        let mut bytes = tiny_gif();
        // Image descriptor packed byte sits 9 bytes after the separator.
        let separator = bytes.iter().position(|&b| b == 0x2C).unwrap();
        bytes[separator + 9] |= 0x40;
        assert!(matches!(decode(&bytes), Err(DecodeError::Unsupported { frame: 0, .. })));
    }

    #[test]
    fn test_frame_out_of_bounds() {
        let mut bytes = tiny_gif();
        let separator = bytes.iter().position(|&b| b == 0x2C).unwrap();
        bytes[separator + 1] = 1; // left = 1 pushes the 2-wide frame off a 2-wide screen
        assert_eq!(decode(&bytes), Err(DecodeError::FrameOutOfBounds { frame: 0 }));
    }

    #[test]
    fn test_out_of_bounds_frame_rejected_before_lzw() {
        let mut bytes = tiny_gif();
        let separator = bytes.iter().position(|&b| b == 0x2C).unwrap();
        bytes[separator + 5] = 0xFF; // width = 255 on a 2-wide screen
        // Garbage image data would be CorruptLzw if it were ever decoded.
        bytes[separator + 12] = 0xFF;
        assert_eq!(decode(&bytes), Err(DecodeError::FrameOutOfBounds { frame: 0 }));
    }

    #[test]
    fn test_missing_color_table_rejected_before_lzw() {
        let mut bytes = tiny_gif();
        bytes[10] &= !0x80; // drop the global table flag
        bytes.drain(13..19);
        let separator = bytes.iter().position(|&b| b == 0x2C).unwrap();
        bytes[separator + 12] = 0xFF;
        assert_eq!(decode(&bytes), Err(DecodeError::MissingColorTable { frame: 0 }));
    }

    #[test]
    fn test_plain_text_consumes_graphic_control() {
        let mut bytes = tiny_gif();
        let separator = bytes.iter().position(|&b| b == 0x2C).unwrap();
        let plain_text = [0x21, 0x01, 12, 0, 0, 0, 0, 2, 0, 2, 0, 1, 1, 0, 1, 2, b'h', b'i', 0];
        bytes.splice(separator..separator, plain_text);
        let frame = &decode(&bytes).unwrap().frames[0];
        assert_eq!(frame.delay_cs, 0);
        assert_eq!(frame.transparent_index, None);
    }

    #[test]
    fn test_pixel_limit() {
        let result = GifDecoder::new().with_pixel_limit(3).decode(&tiny_gif());
        assert!(matches!(result, Err(DecodeError::Unsupported { .. })));
    }
}
