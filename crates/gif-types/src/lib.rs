//! Shared data model for the GIF captioning engine.
//!
//! Every crate in the workspace speaks in these types: the decoder produces a
//! [`Document`], the compositor reads it, the quantizer and encoder produce an
//! edited copy of it. [`CaptionSpec`] and the error enums are plain serde data so
//! they can cross a worker boundary untouched.

use serde::{Deserialize, Serialize};

mod error;
pub mod oklab;

pub use error::{DecodeError, EncodeError, ProcessingError, RenderError};

/// Maximum number of entries in a GIF color table.
pub const MAX_PALETTE_LEN: usize = 256;
/// Delay reported for an idle cursor, in centiseconds.
pub const DEFAULT_DELAY_CS: u16 = 100;
/// Bytes per canvas pixel.
pub const RGBA_CHANNELS: usize = 4;

pub type Rgb = [u8; 3];
pub type Rgba = [u8; 4];

/// Per-frame rule applied to the canvas before the next frame is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DisposalMethod {
    /// No disposal specified; treated like `DoNotDispose`.
    #[default]
    None,
    DoNotDispose,
    RestoreToBackground,
    RestoreToPrevious,
}

impl DisposalMethod {
    /// Read the disposal bits out of a graphic control extension packed byte.
    /// Reserved values 4..=7 are treated as `None`.
    pub fn from_packed(packed: u8) -> Self {
        match (packed >> 2) & 0x07 {
            1 => DisposalMethod::DoNotDispose,
            2 => DisposalMethod::RestoreToBackground,
            3 => DisposalMethod::RestoreToPrevious,
            _ => DisposalMethod::None,
        }
    }

    /// Disposal bits positioned for a graphic control extension packed byte.
    pub fn to_packed(self) -> u8 {
        let value = match self {
            DisposalMethod::None => 0,
            DisposalMethod::DoNotDispose => 1,
            DisposalMethod::RestoreToBackground => 2,
            DisposalMethod::RestoreToPrevious => 3,
        };
        value << 2
    }
}

/// One image of an animation: an indexed sub-rectangle of the logical screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    pub left: u16,
    pub top: u16,
    pub width: u16,
    pub height: u16,
    pub local_palette: Option<Vec<Rgb>>,
    /// Display time in centiseconds.
    pub delay_cs: u16,
    pub disposal: DisposalMethod,
    pub transparent_index: Option<u8>,
    /// Row-major palette indices, `width * height` entries.
    pub indices: Vec<u8>,
}

impl Frame {
    /// A frame covering the whole `width` x `height` screen at the origin.
    pub fn full(width: u16, height: u16, indices: Vec<u8>) -> Self {
        Self {
            left: 0,
            top: 0,
            width,
            height,
            local_palette: None,
            delay_cs: 0,
            disposal: DisposalMethod::None,
            transparent_index: None,
            indices,
        }
    }

    pub fn with_delay(mut self, delay_cs: u16) -> Self {
        self.delay_cs = delay_cs;
        self
    }

    pub fn with_disposal(mut self, disposal: DisposalMethod) -> Self {
        self.disposal = disposal;
        self
    }

    pub fn with_transparent_index(mut self, index: Option<u8>) -> Self {
        self.transparent_index = index;
        self
    }

    pub fn with_local_palette(mut self, palette: Vec<Rgb>) -> Self {
        self.local_palette = Some(palette);
        self
    }

    pub fn with_offset(mut self, left: u16, top: u16) -> Self {
        self.left = left;
        self.top = top;
        self
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Exclusive right edge on the logical screen.
    pub fn right(&self) -> u32 {
        self.left as u32 + self.width as u32
    }

    /// Exclusive bottom edge on the logical screen.
    pub fn bottom(&self) -> u32 {
        self.top as u32 + self.height as u32
    }
}

/// Reason a frame violates the document invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFault {
    OutOfBounds,
    SizeMismatch { expected: usize, actual: usize },
    MissingPalette,
    PaletteOverflow { len: usize },
    IndexOutOfRange { index: u8, palette_len: usize },
}

/// A decoded (or edited) GIF: logical screen, palettes and frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub width: u16,
    pub height: u16,
    pub global_palette: Option<Vec<Rgb>>,
    pub background_index: u8,
    pub frames: Vec<Frame>,
    /// `None`: no looping extension. `Some(0)`: loop forever. `Some(n)`: n extra plays.
    pub loop_count: Option<u16>,
}

impl Document {
    pub fn new(width: u16, height: u16) -> Self {
        Self {
            width,
            height,
            global_palette: None,
            background_index: 0,
            frames: Vec::new(),
            loop_count: None,
        }
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions::new(self.width as u32, self.height as u32)
    }

    /// Length of an RGBA canvas for the logical screen.
    pub fn canvas_len(&self) -> usize {
        self.width as usize * self.height as usize * RGBA_CHANNELS
    }

    pub fn is_animated(&self) -> bool {
        self.frames.len() > 1
    }

    pub fn loops_forever(&self) -> bool {
        self.loop_count == Some(0)
    }

    pub fn delays(&self) -> Vec<u16> {
        self.frames.iter().map(|f| f.delay_cs).collect()
    }

    /// Local palette if the frame has one, otherwise the global palette.
    pub fn effective_palette<'a>(&'a self, frame: &'a Frame) -> Option<&'a [Rgb]> {
        frame
            .local_palette
            .as_deref()
            .or(self.global_palette.as_deref())
    }

    /// Check one frame against the document invariants.
    pub fn check_frame(&self, frame: &Frame) -> Result<(), FrameFault> {
        if frame.right() > self.width as u32 || frame.bottom() > self.height as u32 {
            return Err(FrameFault::OutOfBounds);
        }
        if frame.indices.len() != frame.pixel_count() {
            return Err(FrameFault::SizeMismatch {
                expected: frame.pixel_count(),
                actual: frame.indices.len(),
            });
        }
        let palette = self
            .effective_palette(frame)
            .ok_or(FrameFault::MissingPalette)?;
        if palette.len() > MAX_PALETTE_LEN {
            return Err(FrameFault::PaletteOverflow { len: palette.len() });
        }
        // Transparent pixels are never resolved through the palette.
        if let Some(&index) = frame
            .indices
            .iter()
            .find(|&&i| i as usize >= palette.len() && Some(i) != frame.transparent_index)
        {
            return Err(FrameFault::IndexOutOfRange {
                index,
                palette_len: palette.len(),
            });
        }
        Ok(())
    }
}

/// Width and height of the logical screen in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn rgba_len(&self) -> usize {
        self.pixel_count() * RGBA_CHANNELS
    }
}

/// Caption request: text, center anchor, font and colors.
///
/// Plain data; serializes to JSON so a worker can receive it as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionSpec {
    pub text: String,
    /// Horizontal center of the caption, in canvas pixels.
    pub x: f32,
    /// Vertical center of the caption, in canvas pixels.
    pub y: f32,
    pub font_family: String,
    /// Font size in pixels.
    pub font_size: f32,
    pub color: Rgba,
    pub outline_color: Rgba,
    /// Stroke width in pixels; `0.0` disables the outline.
    pub outline_width: f32,
}

impl Default for CaptionSpec {
    fn default() -> Self {
        Self {
            text: String::new(),
            x: 0.0,
            y: 0.0,
            font_family: "sans-serif".to_string(),
            font_size: 32.0,
            color: [255, 255, 255, 255],
            outline_color: [0, 0, 0, 255],
            outline_width: 3.0,
        }
    }
}

impl CaptionSpec {
    pub fn new(text: impl Into<String>, x: f32, y: f32, font_size: f32, font_family: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            x,
            y,
            font_family: font_family.into(),
            font_size,
            ..Default::default()
        }
    }

    pub fn with_color(mut self, color: Rgba) -> Self {
        self.color = color;
        self
    }

    pub fn with_outline(mut self, color: Rgba, width: f32) -> Self {
        self.outline_color = color;
        self.outline_width = width;
        self
    }

    /// True when there is nothing to draw.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Geometry check shared by preview and export.
    pub fn validate(&self) -> Result<(), CaptionFault> {
        if !self.x.is_finite() || !self.y.is_finite() {
            return Err(CaptionFault::NonFiniteAnchor { x: self.x, y: self.y });
        }
        if !self.font_size.is_finite() || self.font_size <= 0.0 {
            return Err(CaptionFault::InvalidFontSize(self.font_size));
        }
        if !self.outline_width.is_finite() || self.outline_width < 0.0 {
            return Err(CaptionFault::InvalidOutlineWidth(self.outline_width));
        }
        Ok(())
    }
}

/// Reason a caption cannot be drawn.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum CaptionFault {
    #[error("anchor ({x}, {y}) is not finite")]
    NonFiniteAnchor { x: f32, y: f32 },
    #[error("font size {0} must be positive")]
    InvalidFontSize(f32),
    #[error("outline width {0} must be zero or positive")]
    InvalidOutlineWidth(f32),
}
