//! Frame compositing: replays frames and their disposal onto one RGBA canvas.

use std::sync::Arc;

use gif_types::{DisposalMethod, Document, Frame, RGBA_CHANNELS};
use tracing::debug;

/// Reconstructs the visible canvas at any frame of a [`Document`].
///
/// Moving forward draws only the new frames; moving backwards replays from
/// frame 0. The canvas starts fully transparent.
#[derive(Debug, Clone)]
pub struct Compositor {
    doc: Arc<Document>,
    canvas: Vec<u8>,
    /// Last frame drawn onto `canvas`.
    current: Option<usize>,
    /// Canvas as it was before the current frame, kept while that frame
    /// disposes with `RestoreToPrevious`.
    snapshot: Option<Vec<u8>>,
}

impl Compositor {
    pub fn new(doc: Arc<Document>) -> Self {
        let canvas = vec![0; doc.canvas_len()];
        Self {
            doc,
            canvas,
            current: None,
            snapshot: None,
        }
    }

    pub fn document(&self) -> &Arc<Document> {
        &self.doc
    }

    pub fn frame_count(&self) -> usize {
        self.doc.frames.len()
    }

    /// Canvas after frame `index` has been drawn, or `None` past the last frame.
    pub fn render(&mut self, index: usize) -> Option<&[u8]> {
        if index >= self.doc.frames.len() {
            return None;
        }
        if self.current.map_or(false, |current| index < current) {
            debug!(stage = "composite", from = ?self.current, to = index, "Replaying from first frame");
            self.reset();
        }
        while self.current != Some(index) {
            self.step();
        }
        Some(&self.canvas)
    }

    /// Composite every frame in order, one owned canvas per frame.
    pub fn composite_all(&mut self) -> Vec<Vec<u8>> {
        self.reset();
        let mut frames = Vec::with_capacity(self.doc.frames.len());
        for index in 0..self.doc.frames.len() {
            if let Some(canvas) = self.render(index) {
                frames.push(canvas.to_vec());
            }
        }
        frames
    }

    fn reset(&mut self) {
        self.canvas.fill(0);
        self.current = None;
        self.snapshot = None;
    }

    fn step(&mut self) {
        let doc = Arc::clone(&self.doc);
        let next = match self.current {
            Some(previous) => {
                self.dispose(&doc.frames[previous]);
                previous + 1
            }
            None => 0,
        };

        let frame = &doc.frames[next];
        self.snapshot = (frame.disposal == DisposalMethod::RestoreToPrevious).then(|| self.canvas.clone());
        self.draw(&doc, frame);
        self.current = Some(next);
    }

    fn dispose(&mut self, frame: &Frame) {
        match frame.disposal {
            DisposalMethod::None | DisposalMethod::DoNotDispose => {}
            DisposalMethod::RestoreToBackground => {
                self.clear_rect(frame);
            }
            DisposalMethod::RestoreToPrevious => {
                if let Some(snapshot) = self.snapshot.take() {
                    self.canvas = snapshot;
                }
            }
        }
    }

    fn clear_rect(&mut self, frame: &Frame) {
        let width = self.doc.width as usize;
        let right = (frame.right() as usize).min(width);
        let bottom = (frame.bottom() as usize).min(self.doc.height as usize);
        for y in frame.top as usize..bottom {
            let start = (y * width + frame.left as usize) * RGBA_CHANNELS;
            let end = (y * width + right) * RGBA_CHANNELS;
            if start < end {
                self.canvas[start..end].fill(0);
            }
        }
    }

    fn draw(&mut self, doc: &Document, frame: &Frame) {
        let Some(palette) = doc.effective_palette(frame) else {
            return;
        };
        let canvas_width = doc.width as usize;
        let canvas_height = doc.height as usize;
        let frame_width = frame.width as usize;

        for (row, line) in frame.indices.chunks(frame_width.max(1)).enumerate() {
            let y = frame.top as usize + row;
            if y >= canvas_height {
                break;
            }
            for (col, &index) in line.iter().enumerate() {
                let x = frame.left as usize + col;
                if x >= canvas_width || Some(index) == frame.transparent_index {
                    continue;
                }
                if let Some(rgb) = palette.get(index as usize) {
                    let offset = (y * canvas_width + x) * RGBA_CHANNELS;
                    self.canvas[offset..offset + 3].copy_from_slice(rgb);
                    self.canvas[offset + 3] = 255;
                }
            }
        }
    }
}
