//! Palette building for captioned frames.
//!
//! Frames arrive as RGBA canvases and leave as palette indices. When every
//! opaque color in the animation fits, one exact global palette is emitted and
//! nothing is lost. Otherwise each frame gets its own local palette, exact when
//! that frame alone fits, else reduced with seeded k-means in Oklab space or
//! with NeuQuant.

use gif_types::{Rgb, MAX_PALETTE_LEN, RGBA_CHANNELS};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, span, Level};

mod kmeans;
mod palette;

pub use kmeans::{kmeans_palette, KMeansParams};
pub use palette::{distinct_colors, percentile_95, PaletteMapper};

/// NeuQuant needs this many sampled pixels per learning cycle to be meaningful.
const NEUQUANT_MIN_SAMPLES: usize = 100;
/// Below this many colors NeuQuant's network is too small; k-means is used instead.
const NEUQUANT_MIN_COLORS: usize = 16;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantizeError {
    #[error("E_QUANT_EMPTY: no frames to quantize")]
    NoFrames,

    #[error("E_QUANT_FRAME_SIZE: frame {frame} has {actual} bytes, expected {expected}")]
    InvalidFrameData {
        frame: usize,
        expected: usize,
        actual: usize,
    },

    #[error("E_QUANT_CONFIG: {message}")]
    InvalidConfig { message: String },
}

impl QuantizeError {
    pub fn code(&self) -> &'static str {
        match self {
            QuantizeError::NoFrames => "E_QUANT_EMPTY",
            QuantizeError::InvalidFrameData { .. } => "E_QUANT_FRAME_SIZE",
            QuantizeError::InvalidConfig { .. } => "E_QUANT_CONFIG",
        }
    }
}

/// Palette reduction used when a frame has more colors than the budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum QuantizeMethod {
    #[default]
    KMeansOklab,
    /// `sample_fac` 1 (slowest, best) to 30.
    NeuQuant { sample_fac: i32 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizerConfig {
    /// Palette size budget, including the transparent slot. 2..=256.
    pub max_colors: usize,
    pub method: QuantizeMethod,
    pub max_iterations: usize,
    /// K-means stops once no centroid moves further than this (Oklab ΔE).
    pub convergence_threshold: f32,
    /// Pixels with alpha below this are transparent.
    pub alpha_threshold: u8,
    pub seed: u64,
    /// Upper bound on pixels fed to k-means per frame.
    pub samples_per_frame: usize,
}

impl Default for QuantizerConfig {
    fn default() -> Self {
        Self {
            max_colors: MAX_PALETTE_LEN,
            method: QuantizeMethod::KMeansOklab,
            max_iterations: 24,
            convergence_threshold: 1e-3,
            alpha_threshold: 128,
            seed: 0x6A09_E667,
            samples_per_frame: 16_384,
        }
    }
}

impl QuantizerConfig {
    pub fn with_max_colors(mut self, max_colors: usize) -> Self {
        self.max_colors = max_colors;
        self
    }

    pub fn with_method(mut self, method: QuantizeMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_alpha_threshold(mut self, alpha_threshold: u8) -> Self {
        self.alpha_threshold = alpha_threshold;
        self
    }

    fn validate(&self) -> Result<(), QuantizeError> {
        if !(2..=MAX_PALETTE_LEN).contains(&self.max_colors) {
            return Err(QuantizeError::InvalidConfig {
                message: format!("max_colors must be in 2..=256, got {}", self.max_colors),
            });
        }
        if let QuantizeMethod::NeuQuant { sample_fac } = self.method {
            if !(1..=30).contains(&sample_fac) {
                return Err(QuantizeError::InvalidConfig {
                    message: format!("NeuQuant sample_fac must be in 1..=30, got {sample_fac}"),
                });
            }
        }
        Ok(())
    }
}

/// One frame mapped onto a palette.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedFrame {
    pub indices: Vec<u8>,
    /// Set when the frame does not use the global palette.
    pub palette: Option<Vec<Rgb>>,
    pub transparent_index: Option<u8>,
    pub mean_delta_e: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuantizedSet {
    pub global_palette: Option<Vec<Rgb>>,
    pub frames: Vec<QuantizedFrame>,
    /// Mean Oklab ΔE over all opaque pixels.
    pub mean_delta_e: f32,
    pub p95_delta_e: f32,
}

impl QuantizedSet {
    pub fn is_lossless(&self) -> bool {
        self.p95_delta_e == 0.0 && self.mean_delta_e == 0.0
    }
}

/// Opaque colors of one frame plus a transparency mask.
struct FramePixels {
    colors: Vec<Rgb>,
    transparent: Vec<bool>,
    has_transparency: bool,
}

impl FramePixels {
    fn opaque(&self) -> impl Iterator<Item = &Rgb> {
        self.colors
            .iter()
            .zip(self.transparent.iter())
            .filter(|(_, t)| !**t)
            .map(|(c, _)| c)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Quantizer {
    config: QuantizerConfig,
}

impl Quantizer {
    pub fn new(config: QuantizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QuantizerConfig {
        &self.config
    }

    /// Quantize equally sized RGBA frames of `width` x `height`.
    #[tracing::instrument(level = "info", skip(self, frames_rgba))]
    pub fn quantize_frames(
        &self,
        frames_rgba: &[Vec<u8>],
        width: u32,
        height: u32,
    ) -> Result<QuantizedSet, QuantizeError> {
        let span = span!(Level::INFO, "quantize", frames = frames_rgba.len());
        let _guard = span.enter();

        let start_time = std::time::Instant::now();
        self.config.validate()?;
        if frames_rgba.is_empty() {
            return Err(QuantizeError::NoFrames);
        }

        let expected = width as usize * height as usize * RGBA_CHANNELS;
        let mut frames = Vec::with_capacity(frames_rgba.len());
        for (frame, rgba) in frames_rgba.iter().enumerate() {
            if rgba.len() != expected {
                return Err(QuantizeError::InvalidFrameData {
                    frame,
                    expected,
                    actual: rgba.len(),
                });
            }
            frames.push(self.split_pixels(rgba));
        }

        info!(
            stage = "quantize",
            max_colors = self.config.max_colors,
            frames = frames.len(),
            method = ?self.config.method,
            "Starting quantization"
        );

        let mut errors = Vec::new();
        let any_transparent = frames.iter().any(|f| f.has_transparency);
        let budget = self.config.max_colors - any_transparent as usize;

        let set = match distinct_colors(frames.iter().flat_map(|f| f.opaque()), budget) {
            Some(mut global) => {
                debug!(stage = "quantize", colors = global.len(), "Global palette is exact");
                let transparent_slot = any_transparent.then_some(global.len() as u8);
                if transparent_slot.is_some() {
                    global.push([0, 0, 0]);
                }
                let mut mapper = PaletteMapper::new(&global);
                let quantized = frames
                    .iter()
                    .map(|f| map_frame(f, &mut mapper, transparent_slot, None, &mut errors))
                    .collect();
                QuantizedSet {
                    global_palette: Some(global.clone()),
                    frames: quantized,
                    mean_delta_e: 0.0,
                    p95_delta_e: 0.0,
                }
            }
            None => {
                let quantized = frames
                    .iter()
                    .enumerate()
                    .map(|(idx, f)| self.quantize_local(idx, f, &mut errors))
                    .collect();
                QuantizedSet {
                    global_palette: None,
                    frames: quantized,
                    mean_delta_e: 0.0,
                    p95_delta_e: 0.0,
                }
            }
        };

        let mean_delta_e = if errors.is_empty() {
            0.0
        } else {
            errors.iter().sum::<f32>() / errors.len() as f32
        };
        let p95_delta_e = percentile_95(&mut errors);

        info!(
            stage = "quantize",
            duration_ms = start_time.elapsed().as_millis() as u64,
            global = set.global_palette.is_some(),
            mean_delta_e,
            p95_delta_e,
            "Quantization completed"
        );

        Ok(QuantizedSet {
            mean_delta_e,
            p95_delta_e,
            ..set
        })
    }

    fn split_pixels(&self, rgba: &[u8]) -> FramePixels {
        let pixel_count = rgba.len() / RGBA_CHANNELS;
        let mut colors = Vec::with_capacity(pixel_count);
        let mut transparent = Vec::with_capacity(pixel_count);
        for px in rgba.chunks_exact(RGBA_CHANNELS) {
            colors.push([px[0], px[1], px[2]]);
            transparent.push(px[3] < self.config.alpha_threshold);
        }
        let has_transparency = transparent.iter().any(|&t| t);
        FramePixels {
            colors,
            transparent,
            has_transparency,
        }
    }

    fn quantize_local(&self, frame_idx: usize, frame: &FramePixels, errors: &mut Vec<f32>) -> QuantizedFrame {
        let budget = self.config.max_colors - frame.has_transparency as usize;
        let mut palette = match distinct_colors(frame.opaque(), budget) {
            Some(exact) => exact,
            None => self.reduce(frame_idx, frame, budget),
        };
        // A fully transparent frame still needs a color table.
        if palette.is_empty() {
            palette.push([0, 0, 0]);
        }

        let transparent_slot = frame.has_transparency.then_some(palette.len() as u8);
        if transparent_slot.is_some() {
            palette.push([0, 0, 0]);
        }

        let mut mapper = PaletteMapper::new(&palette);
        let quantized = map_frame(frame, &mut mapper, transparent_slot, Some(frame_idx), errors);
        QuantizedFrame {
            palette: Some(palette.clone()),
            ..quantized
        }
    }

    fn reduce(&self, frame_idx: usize, frame: &FramePixels, colors: usize) -> Vec<Rgb> {
        let opaque: Vec<Rgb> = frame.opaque().copied().collect();
        let span = span!(Level::DEBUG, "reduce_palette", frame = frame_idx, colors);
        let _guard = span.enter();

        if let QuantizeMethod::NeuQuant { sample_fac } = self.config.method {
            if colors >= NEUQUANT_MIN_COLORS && opaque.len() / sample_fac as usize >= NEUQUANT_MIN_SAMPLES {
                return neuquant_palette(&opaque, colors, sample_fac);
            }
            debug!(
                stage = "quantize",
                frame = frame_idx,
                pixels = opaque.len(),
                colors,
                "Frame too small for NeuQuant, using k-means"
            );
        }

        let params = KMeansParams {
            k: colors,
            max_iterations: self.config.max_iterations,
            convergence_threshold: self.config.convergence_threshold,
            samples: self.config.samples_per_frame,
        };
        // Per-frame seed keeps frames independent of processing order.
        let mut rng = StdRng::seed_from_u64(self.config.seed ^ (frame_idx as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15));
        kmeans_palette(&opaque, &params, &mut rng)
    }
}

fn neuquant_palette(opaque: &[Rgb], colors: usize, sample_fac: i32) -> Vec<Rgb> {
    let rgba: Vec<u8> = opaque.iter().flat_map(|c| [c[0], c[1], c[2], 255]).collect();
    let nq = color_quant::NeuQuant::new(sample_fac, colors, &rgba);
    nq.color_map_rgb()
        .chunks_exact(3)
        .map(|c| [c[0], c[1], c[2]])
        .collect()
}

fn map_frame(
    frame: &FramePixels,
    mapper: &mut PaletteMapper<'_>,
    transparent_slot: Option<u8>,
    frame_idx: Option<usize>,
    errors: &mut Vec<f32>,
) -> QuantizedFrame {
    let start = errors.len();
    let mut indices = Vec::with_capacity(frame.colors.len());
    for (&rgb, &transparent) in frame.colors.iter().zip(frame.transparent.iter()) {
        match (transparent, transparent_slot) {
            (true, Some(slot)) => indices.push(slot),
            _ => {
                let (index, error) = mapper.nearest(rgb);
                indices.push(index);
                errors.push(error);
            }
        }
    }

    let frame_errors = &errors[start..];
    let mean_delta_e = if frame_errors.is_empty() {
        0.0
    } else {
        frame_errors.iter().sum::<f32>() / frame_errors.len() as f32
    };
    if let Some(frame_idx) = frame_idx {
        debug!(
            stage = "quantize",
            frame = frame_idx,
            palette_size = mapper.palette().len(),
            avg_delta_e = mean_delta_e,
            "Frame quantized"
        );
    }

    QuantizedFrame {
        indices,
        palette: None,
        transparent_index: if frame.has_transparency { transparent_slot } else { None },
        mean_delta_e,
    }
}
