//! The caption engine: one loaded GIF, a playback cursor and caption drawing.

use std::sync::Arc;
use std::time::Duration;

use gif_codec::GifDecoder;
use gif_types::{CaptionSpec, DecodeError, Dimensions, ProcessingError, RenderError};
use tracing::{debug, info, span, warn, Level};

use crate::cursor::AnimationCursor;
use crate::export::{ExportOptions, ExportPipeline};
use crate::overlay::TextOverlay;
use crate::surface::{check_surface, RenderSurface};

/// Interactive preview over a decoded GIF plus batch export.
///
/// Not internally synchronized. Use one instance for preview and let export
/// run through [`CaptionEngine::export_with_caption`] or an
/// [`ExportWorker`](crate::ExportWorker), which decode their own copy.
#[derive(Debug, Clone, Default)]
pub struct CaptionEngine {
    decoder: GifDecoder,
    cursor: AnimationCursor,
    overlay: TextOverlay,
    export: ExportPipeline,
}

impl CaptionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Used both for `load` and for export.
    pub fn with_decoder(mut self, decoder: GifDecoder) -> Self {
        self.export = self.export.with_decoder(decoder.clone());
        self.decoder = decoder;
        self
    }

    pub fn with_overlay(mut self, overlay: TextOverlay) -> Self {
        self.export = self.export.with_overlay(overlay.clone());
        self.overlay = overlay;
        self
    }

    pub fn with_export_options(mut self, options: ExportOptions) -> Self {
        self.export = ExportPipeline::new(options)
            .with_decoder(self.decoder.clone())
            .with_overlay(self.overlay.clone());
        self
    }

    /// Decode `bytes` and start playback at frame 0.
    ///
    /// On failure the engine is left idle; the previous document is dropped.
    #[tracing::instrument(level = "info", skip_all, fields(bytes = bytes.len()))]
    pub fn load(&mut self, bytes: &[u8]) -> Result<Dimensions, DecodeError> {
        self.cursor.reset();
        let doc = match self.decoder.decode(bytes) {
            Ok(doc) => doc,
            Err(e) => {
                warn!(stage = "decode", code = e.code(), error = %e, "Load failed, engine idle");
                return Err(e);
            }
        };
        let dims = doc.dimensions();
        info!(
            stage = "decode",
            width = dims.width,
            height = dims.height,
            frames = doc.frames.len(),
            loop_count = ?doc.loop_count,
            "GIF loaded"
        );
        self.cursor.load(Arc::new(doc));
        Ok(dims)
    }

    pub fn is_loaded(&self) -> bool {
        self.cursor.is_ready()
    }

    /// Canvas size of the loaded GIF, 0x0 when nothing is loaded.
    pub fn get_dimensions(&self) -> Dimensions {
        self.cursor.dimensions()
    }

    /// Delay of the current frame in centiseconds.
    pub fn get_frame_delay(&self) -> u16 {
        self.cursor.frame_delay()
    }

    pub fn current_index(&self) -> usize {
        self.cursor.index()
    }

    pub fn frame_count(&self) -> usize {
        self.cursor.frame_count()
    }

    /// Write the composited current frame onto `surface`.
    pub fn render_current_frame<S: RenderSurface + ?Sized>(&mut self, surface: &mut S) -> Result<(), RenderError> {
        let dims = self.require_loaded()?;
        check_surface(surface, dims)?;
        let canvas = self.cursor.current_canvas()?;
        surface.write_rgba(canvas);
        Ok(())
    }

    pub fn next_frame(&mut self) -> usize {
        self.cursor.next_frame()
    }

    /// Advance playback by wall-clock time. Returns the frames stepped.
    pub fn advance(&mut self, elapsed: Duration) -> usize {
        self.cursor.advance(elapsed)
    }

    /// Current frame with `caption` drawn on top, written to `surface`.
    ///
    /// Nothing in the engine changes; the same caption always yields the same
    /// pixels for the same frame.
    pub fn composite_preview<S: RenderSurface + ?Sized>(
        &mut self,
        surface: &mut S,
        caption: &CaptionSpec,
    ) -> Result<(), RenderError> {
        let span = span!(Level::DEBUG, "composite_preview", frame = self.cursor.index());
        let _guard = span.enter();

        let dims = self.require_loaded()?;
        check_surface(surface, dims)?;
        caption
            .validate()
            .map_err(|fault| RenderError::InvalidCaption { message: fault.to_string() })?;
        let canvas = self.cursor.current_canvas()?;
        let preview = self.overlay.render_preview(canvas, dims, caption);
        debug!(stage = "overlay", blank = caption.is_blank(), "Preview composed");
        surface.write_rgba(&preview);
        Ok(())
    }

    /// Caption with the engine's default styling.
    pub fn prepare_caption(&self, text: &str, x: f32, y: f32, font_size: f32, font_family: &str) -> CaptionSpec {
        CaptionSpec::new(text, x, y, font_size, font_family)
    }

    /// Re-encode `bytes` with `caption` on every frame. Independent of
    /// whatever this engine has loaded.
    pub fn export_with_caption(&self, bytes: &[u8], caption: &CaptionSpec) -> Result<Vec<u8>, ProcessingError> {
        self.export.run(bytes, caption)
    }

    fn require_loaded(&self) -> Result<Dimensions, RenderError> {
        if self.cursor.is_ready() {
            Ok(self.cursor.dimensions())
        } else {
            Err(RenderError::NotLoaded)
        }
    }
}
