//! Caption rasterization and "over" compositing onto RGBA canvases.

use gif_types::{CaptionSpec, Dimensions, Rgba, RGBA_CHANNELS};
use tracing::{debug, span, Level};

use crate::font::{BitmapFont, FontRegistry};

/// Subsamples per pixel along each axis.
const SUPERSAMPLE: usize = 4;

/// Rectangle of canvas pixels touched by the caption.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PixelBounds {
    x0: usize,
    y0: usize,
    x1: usize,
    y1: usize,
}

impl PixelBounds {
    fn width(&self) -> usize {
        self.x1 - self.x0
    }

    fn height(&self) -> usize {
        self.y1 - self.y0
    }
}

/// Fill and outline coverage for one caption on one canvas size.
///
/// Built once, then applied to any number of canvases of that size.
#[derive(Debug, Clone)]
pub struct CaptionMask {
    canvas: Dimensions,
    bounds: PixelBounds,
    /// Per-pixel coverage in 0..=1, row-major over `bounds`.
    fill: Vec<f32>,
    outline: Vec<f32>,
    color: Rgba,
    outline_color: Rgba,
}

impl CaptionMask {
    /// `None` when the caption is blank, invalid, or lies entirely off the canvas.
    pub fn build(spec: &CaptionSpec, canvas: Dimensions, fonts: &FontRegistry) -> Option<Self> {
        if spec.is_blank() {
            return None;
        }
        if let Err(fault) = spec.validate() {
            debug!(stage = "overlay", %fault, "Caption not drawn");
            return None;
        }
        let span = span!(Level::DEBUG, "caption_mask", text_len = spec.text.len(), font_size = spec.font_size);
        let _guard = span.enter();

        let font = fonts.resolve(&spec.font_family);
        let layout = Layout::new(spec, font);
        let radius = spec.outline_width / 2.0;

        let bounds = layout.pixel_bounds(radius, canvas)?;
        let sub_w = bounds.width() * SUPERSAMPLE;
        let sub_h = bounds.height() * SUPERSAMPLE;

        let mut inked = vec![false; sub_w * sub_h];
        for sy in 0..sub_h {
            let y = bounds.y0 as f32 + (sy as f32 + 0.5) / SUPERSAMPLE as f32;
            for sx in 0..sub_w {
                let x = bounds.x0 as f32 + (sx as f32 + 0.5) / SUPERSAMPLE as f32;
                inked[sy * sub_w + sx] = layout.covers(x, y);
            }
        }

        let stroked = if radius > 0.0 {
            dilate(&inked, sub_w, sub_h, radius * SUPERSAMPLE as f32)
        } else {
            inked.clone()
        };

        let fill = downsample(&inked, bounds);
        let outline = if radius > 0.0 { downsample(&stroked, bounds) } else { vec![0.0; fill.len()] };

        debug!(
            stage = "overlay",
            font = font.name,
            x0 = bounds.x0,
            y0 = bounds.y0,
            width = bounds.width(),
            height = bounds.height(),
            "Caption mask built"
        );

        Some(Self {
            canvas,
            bounds,
            fill,
            outline,
            color: spec.color,
            outline_color: spec.outline_color,
        })
    }

    pub fn canvas(&self) -> Dimensions {
        self.canvas
    }

    /// Fill coverage at canvas pixel (`x`, `y`), 0 outside the caption.
    pub fn fill_coverage(&self, x: usize, y: usize) -> f32 {
        self.coverage(&self.fill, x, y)
    }

    pub fn outline_coverage(&self, x: usize, y: usize) -> f32 {
        self.coverage(&self.outline, x, y)
    }

    fn coverage(&self, mask: &[f32], x: usize, y: usize) -> f32 {
        let b = &self.bounds;
        if x < b.x0 || x >= b.x1 || y < b.y0 || y >= b.y1 {
            return 0.0;
        }
        mask[(y - b.y0) * b.width() + (x - b.x0)]
    }

    /// Composite outline then fill onto `canvas` in place.
    pub fn apply(&self, canvas: &mut [u8]) {
        let width = self.canvas.width as usize;
        if canvas.len() != self.canvas.rgba_len() {
            return;
        }
        let b = self.bounds;
        for y in b.y0..b.y1 {
            for x in b.x0..b.x1 {
                let m = (y - b.y0) * b.width() + (x - b.x0);
                let offset = (y * width + x) * RGBA_CHANNELS;
                let pixel = &mut canvas[offset..offset + RGBA_CHANNELS];
                if self.outline[m] > 0.0 {
                    blend_over(pixel, self.outline_color, self.outline[m]);
                }
                if self.fill[m] > 0.0 {
                    blend_over(pixel, self.color, self.fill[m]);
                }
            }
        }
    }
}

/// Draws captions; holds the font registry.
#[derive(Debug, Clone, Default)]
pub struct TextOverlay {
    fonts: FontRegistry,
}

impl TextOverlay {
    pub fn new(fonts: FontRegistry) -> Self {
        Self { fonts }
    }

    pub fn fonts(&self) -> &FontRegistry {
        &self.fonts
    }

    pub fn mask(&self, spec: &CaptionSpec, canvas: Dimensions) -> Option<CaptionMask> {
        CaptionMask::build(spec, canvas, &self.fonts)
    }

    /// Captioned copy of `base`; `base` is left untouched.
    pub fn render_preview(&self, base: &[u8], canvas: Dimensions, spec: &CaptionSpec) -> Vec<u8> {
        let mut preview = base.to_vec();
        self.apply_caption(&mut preview, canvas, spec);
        preview
    }

    /// Draw the caption into `target`.
    pub fn apply_caption(&self, target: &mut [u8], canvas: Dimensions, spec: &CaptionSpec) {
        if let Some(mask) = self.mask(spec, canvas) {
            mask.apply(target);
        }
    }
}

/// Text placement in canvas pixel space, centered on the anchor.
struct Layout {
    font: BitmapFont,
    lines: Vec<Vec<char>>,
    scale: f32,
    /// Left edge of each line.
    line_x: Vec<f32>,
    top: f32,
    width: f32,
    height: f32,
}

impl Layout {
    fn new(spec: &CaptionSpec, font: BitmapFont) -> Self {
        let lines: Vec<Vec<char>> = spec.text.lines().map(|l| l.chars().collect()).collect();
        let scale = font.scale(spec.font_size);
        let pitch = font.line_pitch() as f32;

        let line_widths: Vec<f32> = lines.iter().map(|l| font.line_width(l.len()) as f32 * scale).collect();
        let width = line_widths.iter().cloned().fold(0.0, f32::max);
        let units_high = lines.len().max(1) as f32 * pitch - (pitch - crate::font::GLYPH_HEIGHT as f32);
        let height = units_high * scale;

        Self {
            font,
            line_x: line_widths.iter().map(|w| spec.x - w / 2.0).collect(),
            lines,
            scale,
            top: spec.y - height / 2.0,
            width,
            height,
        }
    }

    /// Canvas pixels that may receive coverage, clipped; `None` if nothing is visible.
    fn pixel_bounds(&self, radius: f32, canvas: Dimensions) -> Option<PixelBounds> {
        let left = self.line_x.iter().cloned().fold(f32::INFINITY, f32::min);
        if !left.is_finite() || self.width <= 0.0 {
            return None;
        }
        let x0 = (left - radius).floor().max(0.0);
        let y0 = (self.top - radius).floor().max(0.0);
        let x1 = (left + self.width + radius).ceil().min(canvas.width as f32);
        let y1 = (self.top + self.height + radius).ceil().min(canvas.height as f32);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some(PixelBounds {
            x0: x0 as usize,
            y0: y0 as usize,
            x1: x1 as usize,
            y1: y1 as usize,
        })
    }

    fn covers(&self, x: f32, y: f32) -> bool {
        let v = (y - self.top) / self.scale;
        if v < 0.0 {
            return false;
        }
        let pitch = self.font.line_pitch();
        let unit_row = v as u32;
        let line = (unit_row / pitch) as usize;
        let row = unit_row % pitch;
        let Some(chars) = self.lines.get(line) else {
            return false;
        };

        let u = (x - self.line_x[line]) / self.scale;
        if u < 0.0 {
            return false;
        }
        let unit_col = u as u32;
        let advance = self.font.advance();
        let Some(&ch) = chars.get((unit_col / advance) as usize) else {
            return false;
        };
        self.font.is_set(ch, unit_col % advance, row)
    }
}

/// Grow `mask` by a disc of `radius` subsamples.
///
/// Exact Euclidean distance transform: row scans, then a lower envelope of
/// parabolas down each column. Linear in the mask size for any radius.
fn dilate(mask: &[bool], width: usize, height: usize, radius: f32) -> Vec<bool> {
    let r_sq = f64::from(radius) * f64::from(radius);

    // Squared distance to the nearest inked subsample in the same row.
    let mut row_dist = vec![FAR; width * height];
    for y in 0..height {
        let row = &mask[y * width..(y + 1) * width];
        let dist = &mut row_dist[y * width..(y + 1) * width];
        let mut last = None;
        for x in 0..width {
            if row[x] {
                last = Some(x);
            }
            if let Some(l) = last {
                dist[x] = ((x - l) as f64).powi(2);
            }
        }
        last = None;
        for x in (0..width).rev() {
            if row[x] {
                last = Some(x);
            }
            if let Some(l) = last {
                dist[x] = dist[x].min(((l - x) as f64).powi(2));
            }
        }
    }

    let mut out = vec![false; width * height];
    let mut column = vec![FAR; height];
    for x in 0..width {
        for (y, cell) in column.iter_mut().enumerate() {
            *cell = row_dist[y * width + x];
        }
        for (y, d) in column_distance(&column).into_iter().enumerate() {
            out[y * width + x] = d <= r_sq;
        }
    }
    out
}

/// Stands in for "no ink on this row"; far beyond any squared distance on a canvas.
const FAR: f64 = 1e30;

/// 1-D squared distance transform of the sampled function `f`.
fn column_distance(f: &[f64]) -> Vec<f64> {
    let n = f.len();
    let mut d = vec![FAR; n];
    if n == 0 {
        return d;
    }
    // Parabola vertices on the envelope and the boundaries between them.
    let mut v = vec![0usize; n];
    let mut z = vec![0.0f64; n + 1];
    let mut k = 0;
    z[0] = f64::NEG_INFINITY;
    z[1] = f64::INFINITY;

    for q in 1..n {
        let qf = q as f64;
        let mut s;
        loop {
            let p = v[k] as f64;
            s = ((f[q] + qf * qf) - (f[v[k]] + p * p)) / (2.0 * (qf - p));
            if s <= z[k] && k > 0 {
                k -= 1;
            } else {
                break;
            }
        }
        k += 1;
        v[k] = q;
        z[k] = s;
        z[k + 1] = f64::INFINITY;
    }

    k = 0;
    for (q, out) in d.iter_mut().enumerate() {
        let qf = q as f64;
        while z[k + 1] < qf {
            k += 1;
        }
        let dq = qf - v[k] as f64;
        *out = dq * dq + f[v[k]];
    }
    d
}

/// Average SUPERSAMPLE x SUPERSAMPLE blocks into per-pixel coverage.
fn downsample(mask: &[bool], bounds: PixelBounds) -> Vec<f32> {
    let sub_w = bounds.width() * SUPERSAMPLE;
    let per_pixel = (SUPERSAMPLE * SUPERSAMPLE) as f32;
    let mut coverage = vec![0.0; bounds.width() * bounds.height()];
    for (i, cell) in coverage.iter_mut().enumerate() {
        let px = i % bounds.width();
        let py = i / bounds.width();
        let mut hits = 0u32;
        for sy in 0..SUPERSAMPLE {
            let row = (py * SUPERSAMPLE + sy) * sub_w;
            for sx in 0..SUPERSAMPLE {
                if mask[row + px * SUPERSAMPLE + sx] {
                    hits += 1;
                }
            }
        }
        *cell = hits as f32 / per_pixel;
    }
    coverage
}

/// Porter-Duff "over" with straight alpha; `coverage` scales the source alpha.
fn blend_over(dst: &mut [u8], src: Rgba, coverage: f32) {
    let sa = coverage.clamp(0.0, 1.0) * src[3] as f32 / 255.0;
    if sa <= 0.0 {
        return;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    for c in 0..3 {
        let blended = (src[c] as f32 * sa + dst[c] as f32 * da * (1.0 - sa)) / out_a;
        dst[c] = blended.round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}
