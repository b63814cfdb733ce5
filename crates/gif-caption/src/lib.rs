//! Caption engine for animated GIFs.
//!
//! [`CaptionEngine`] loads a GIF, steps through its frames and previews a
//! caption on a [`RenderSurface`]. Export decodes its own copy of the input,
//! draws the caption on every composited frame, quantizes and re-encodes.
//! [`ExportWorker`] runs that export on a separate thread.

pub mod compositor;
pub mod cursor;
mod engine;
pub mod export;
pub mod font;
pub mod overlay;
mod surface;
pub mod task;

pub use compositor::Compositor;
pub use cursor::AnimationCursor;
pub use engine::CaptionEngine;
pub use export::{ExportOptions, ExportPipeline};
pub use font::{BitmapFont, FontRegistry, FontWeight};
pub use overlay::{CaptionMask, TextOverlay};
pub use surface::{RenderSurface, RgbaBuffer};
pub use task::{run_export_task, ExportRequest, ExportResponse, ExportWorker};

pub use gif_types::{CaptionSpec, DecodeError, Dimensions, ProcessingError, RenderError};
