use gif_types::{Dimensions, RenderError};

/// Anything a frame can be presented on: a window, a canvas element, a buffer.
pub trait RenderSurface {
    fn size(&self) -> Dimensions;

    /// Replace the surface contents with a `size()`-shaped RGBA block.
    fn write_rgba(&mut self, rgba: &[u8]);
}

/// Fail unless `surface` matches the document exactly.
pub(crate) fn check_surface<S: RenderSurface + ?Sized>(surface: &S, expected: Dimensions) -> Result<(), RenderError> {
    let actual = surface.size();
    if actual != expected {
        return Err(RenderError::SurfaceMismatch {
            expected_width: expected.width,
            expected_height: expected.height,
            actual_width: actual.width,
            actual_height: actual.height,
        });
    }
    Ok(())
}

/// In-memory RGBA surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbaBuffer {
    dimensions: Dimensions,
    data: Vec<u8>,
}

impl RgbaBuffer {
    pub fn new(width: u32, height: u32) -> Self {
        let dimensions = Dimensions::new(width, height);
        Self {
            dimensions,
            data: vec![0; dimensions.rgba_len()],
        }
    }

    pub fn width(&self) -> u32 {
        self.dimensions.width
    }

    pub fn height(&self) -> u32 {
        self.dimensions.height
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.dimensions.width || y >= self.dimensions.height {
            return None;
        }
        let i = (y as usize * self.dimensions.width as usize + x as usize) * 4;
        Some([self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]])
    }
}

impl RenderSurface for RgbaBuffer {
    fn size(&self) -> Dimensions {
        self.dimensions
    }

    fn write_rgba(&mut self, rgba: &[u8]) {
        let len = self.data.len().min(rgba.len());
        self.data[..len].copy_from_slice(&rgba[..len]);
    }
}
