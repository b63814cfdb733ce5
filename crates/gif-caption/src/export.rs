//! Batch export: decode, caption every frame, quantize, encode.

use std::sync::Arc;

use gif_codec::{EncoderConfig, GifDecoder, GifEncoder};
use gif_quant::{QuantizedSet, Quantizer, QuantizerConfig};
use gif_types::{CaptionSpec, DisposalMethod, Document, Frame, ProcessingError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, span, Level};

use crate::compositor::Compositor;
use crate::overlay::TextOverlay;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportOptions {
    pub quantizer: QuantizerConfig,
    pub encoder: EncoderConfig,
    /// Loop count written to the output. When unset, animated output loops
    /// forever and a still image keeps whatever the source declared.
    pub loop_count: Option<u16>,
}

impl ExportOptions {
    pub fn with_quantizer(mut self, quantizer: QuantizerConfig) -> Self {
        self.quantizer = quantizer;
        self
    }

    pub fn with_encoder(mut self, encoder: EncoderConfig) -> Self {
        self.encoder = encoder;
        self
    }

    pub fn with_loop_count(mut self, loop_count: u16) -> Self {
        self.loop_count = Some(loop_count);
        self
    }
}

/// Owns everything an export needs; shares no state with any preview engine.
#[derive(Debug, Clone, Default)]
pub struct ExportPipeline {
    options: ExportOptions,
    decoder: GifDecoder,
    overlay: TextOverlay,
}

impl ExportPipeline {
    pub fn new(options: ExportOptions) -> Self {
        Self {
            options,
            decoder: GifDecoder::default(),
            overlay: TextOverlay::default(),
        }
    }

    pub fn with_decoder(mut self, decoder: GifDecoder) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_overlay(mut self, overlay: TextOverlay) -> Self {
        self.overlay = overlay;
        self
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Decode `gif`, draw `caption` on every composited frame and re-encode.
    #[tracing::instrument(level = "info", skip_all, fields(bytes = gif.len()))]
    pub fn run(&self, gif: &[u8], caption: &CaptionSpec) -> Result<Vec<u8>, ProcessingError> {
        let span = span!(Level::INFO, "export", text = %caption.text);
        let _guard = span.enter();
        let start_time = std::time::Instant::now();

        caption
            .validate()
            .map_err(|fault| ProcessingError::InvalidCaption { message: fault.to_string() })?;

        let source = Arc::new(self.decoder.decode(gif)?);
        let dims = source.dimensions();
        info!(
            stage = "export",
            width = dims.width,
            height = dims.height,
            frames = source.frames.len(),
            "Source decoded"
        );

        let mut canvases = Compositor::new(Arc::clone(&source)).composite_all();
        match self.overlay.mask(caption, dims) {
            Some(mask) => {
                for canvas in &mut canvases {
                    mask.apply(canvas);
                }
                debug!(stage = "export", frames = canvases.len(), "Caption applied");
            }
            None => debug!(stage = "export", "Caption is blank or off-canvas, frames left as decoded"),
        }

        let quantized = Quantizer::new(self.options.quantizer.clone())
            .quantize_frames(&canvases, dims.width, dims.height)
            .map_err(|e| ProcessingError::QuantizationFailed { message: e.to_string() })?;

        let output = self.assemble(&source, quantized);
        let bytes = GifEncoder::new()
            .with_config(self.options.encoder.clone())
            .encode(&output)?;

        info!(
            stage = "export",
            duration_ms = start_time.elapsed().as_millis() as u64,
            gif_size_bytes = bytes.len(),
            "Export completed"
        );
        Ok(bytes)
    }

    /// Full-canvas output frames carrying the source timing.
    fn assemble(&self, source: &Document, quantized: QuantizedSet) -> Document {
        let mut doc = Document::new(source.width, source.height);
        doc.global_palette = quantized.global_palette;
        doc.loop_count = self.options.loop_count.or(if source.is_animated() {
            Some(0)
        } else {
            source.loop_count
        });

        // Transparent pixels must not reveal the previous output frame.
        let disposal = if quantized.frames.iter().any(|f| f.transparent_index.is_some()) {
            DisposalMethod::RestoreToBackground
        } else {
            DisposalMethod::DoNotDispose
        };

        for (frame, source_frame) in quantized.frames.into_iter().zip(source.frames.iter()) {
            let mut out = Frame::full(source.width, source.height, frame.indices)
                .with_delay(source_frame.delay_cs)
                .with_disposal(disposal)
                .with_transparent_index(frame.transparent_index);
            out.local_palette = frame.palette;
            doc.frames.push(out);
        }
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gif_types::DecodeError;

    fn two_frame_gif() -> Vec<u8> {
        let mut doc = Document::new(16, 8);
        doc.global_palette = Some(vec![[10, 20, 30], [200, 40, 40]]);
        doc.frames.push(Frame::full(16, 8, vec![0; 128]).with_delay(7));
        doc.frames.push(Frame::full(16, 8, vec![1; 128]).with_delay(9));
        gif_codec::encode(&doc).unwrap()
    }

    #[test]
    fn test_export_preserves_timing_and_loops() {
        let caption = CaptionSpec::new("", 8.0, 4.0, 8.0, "arial");
        let bytes = ExportPipeline::default().run(&two_frame_gif(), &caption).unwrap();
        let doc = gif_codec::decode(&bytes).unwrap();
        assert_eq!(doc.delays(), vec![7, 9]);
        assert_eq!(doc.loop_count, Some(0));
        assert_eq!(doc.frames[0].disposal, DisposalMethod::DoNotDispose);
    }

    #[test]
    fn test_loop_count_override() {
        let caption = CaptionSpec::new("A", 8.0, 4.0, 8.0, "arial");
        let pipeline = ExportPipeline::new(ExportOptions::default().with_loop_count(3));
        let doc = gif_codec::decode(&pipeline.run(&two_frame_gif(), &caption).unwrap()).unwrap();
        assert_eq!(doc.loop_count, Some(3));
    }

    #[test]
    fn test_invalid_caption() {
        let caption = CaptionSpec::new("A", f32::NAN, 4.0, 8.0, "arial");
        let err = ExportPipeline::default().run(&two_frame_gif(), &caption).unwrap_err();
        assert_eq!(err.code(), "E_EXPORT_CAPTION");

        let caption = CaptionSpec::new("A", 1.0, 4.0, 0.0, "arial");
        assert!(ExportPipeline::default().run(&two_frame_gif(), &caption).is_err());
    }

    #[test]
    fn test_decode_failure_is_typed() {
        let caption = CaptionSpec::new("A", 1.0, 1.0, 8.0, "arial");
        let err = ExportPipeline::default().run(b"nope", &caption).unwrap_err();
        assert!(matches!(err, ProcessingError::Decode(DecodeError::MalformedHeader { .. })));
    }

    #[test]
    fn test_transparent_source_uses_background_disposal() {
        let mut doc = Document::new(4, 4);
        doc.global_palette = Some(vec![[0, 0, 0], [255, 255, 255]]);
        doc.frames.push(Frame::full(2, 2, vec![1; 4]));
        doc.frames.push(Frame::full(2, 2, vec![0; 4]).with_offset(2, 2));
        let bytes = gif_codec::encode(&doc).unwrap();

        let caption = CaptionSpec::new("", 0.0, 0.0, 8.0, "arial");
        let out = gif_codec::decode(&ExportPipeline::default().run(&bytes, &caption).unwrap()).unwrap();
        assert!(out.frames.iter().all(|f| f.disposal == DisposalMethod::RestoreToBackground));
        assert!(out.frames.iter().all(|f| f.transparent_index.is_some()));
    }
}
