//! Playback position over a loaded document.

use std::sync::Arc;
use std::time::Duration;

use gif_types::{Dimensions, Document, RenderError, DEFAULT_DELAY_CS};
use tracing::debug;

use crate::compositor::Compositor;

/// Zero delays are paced like this, as browsers do.
const MIN_PACING_DELAY_CS: u16 = 10;

#[derive(Debug, Clone)]
enum CursorState {
    Idle,
    Ready {
        compositor: Compositor,
        index: usize,
        /// Time banked toward the next frame.
        elapsed: Duration,
    },
}

/// `Idle` until a document is loaded, then `Ready(index)`.
#[derive(Debug, Clone)]
pub struct AnimationCursor {
    state: CursorState,
}

impl Default for AnimationCursor {
    fn default() -> Self {
        Self::new()
    }
}

impl AnimationCursor {
    pub fn new() -> Self {
        Self { state: CursorState::Idle }
    }

    /// Start over at frame 0 of `doc`.
    pub fn load(&mut self, doc: Arc<Document>) {
        debug!(stage = "composite", frames = doc.frames.len(), "Cursor loaded");
        self.state = CursorState::Ready {
            compositor: Compositor::new(doc),
            index: 0,
            elapsed: Duration::ZERO,
        };
    }

    pub fn reset(&mut self) {
        self.state = CursorState::Idle;
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, CursorState::Ready { .. })
    }

    pub fn document(&self) -> Option<&Arc<Document>> {
        match &self.state {
            CursorState::Ready { compositor, .. } => Some(compositor.document()),
            CursorState::Idle => None,
        }
    }

    pub fn index(&self) -> usize {
        match self.state {
            CursorState::Ready { index, .. } => index,
            CursorState::Idle => 0,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.document().map_or(0, |doc| doc.frames.len())
    }

    /// 0x0 while idle.
    pub fn dimensions(&self) -> Dimensions {
        self.document().map(|doc| doc.dimensions()).unwrap_or_default()
    }

    /// Delay of the current frame in centiseconds; 100 while idle.
    pub fn frame_delay(&self) -> u16 {
        self.document()
            .and_then(|doc| doc.frames.get(self.index()))
            .map_or(DEFAULT_DELAY_CS, |frame| frame.delay_cs)
    }

    /// Step to the next frame, wrapping after the last. Returns the new index.
    pub fn next_frame(&mut self) -> usize {
        if let CursorState::Ready { compositor, index, .. } = &mut self.state {
            let count = compositor.frame_count();
            if count > 0 {
                *index = (*index + 1) % count;
            }
            *index
        } else {
            0
        }
    }

    /// Bank `elapsed` and step over every frame whose delay has run out.
    /// Returns how many frames were stepped.
    pub fn advance(&mut self, elapsed: Duration) -> usize {
        let mut steps = 0;
        loop {
            let delay = pacing_delay(self.frame_delay());
            let CursorState::Ready { elapsed: banked, .. } = &mut self.state else {
                return 0;
            };
            if steps == 0 {
                *banked += elapsed;
            }
            if *banked < delay {
                return steps;
            }
            *banked -= delay;
            self.next_frame();
            steps += 1;
        }
    }

    /// Composited canvas of the current frame.
    pub fn current_canvas(&mut self) -> Result<&[u8], RenderError> {
        match &mut self.state {
            CursorState::Ready { compositor, index, .. } => compositor.render(*index).ok_or(RenderError::NotLoaded),
            CursorState::Idle => Err(RenderError::NotLoaded),
        }
    }
}

fn pacing_delay(delay_cs: u16) -> Duration {
    let cs = if delay_cs == 0 { MIN_PACING_DELAY_CS } else { delay_cs };
    Duration::from_millis(cs as u64 * 10)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gif_types::Frame;

    fn doc_with_delays(delays: &[u16]) -> Arc<Document> {
        let mut doc = Document::new(2, 2);
        doc.global_palette = Some(vec![[0, 0, 0], [255, 255, 255]]);
        for (i, &delay) in delays.iter().enumerate() {
            doc.frames.push(Frame::full(2, 2, vec![(i % 2) as u8; 4]).with_delay(delay));
        }
        Arc::new(doc)
    }

    #[test]
    fn test_idle_defaults() {
        let mut cursor = AnimationCursor::new();
        assert!(!cursor.is_ready());
        assert_eq!(cursor.dimensions(), Dimensions::default());
        assert_eq!(cursor.frame_delay(), 100);
        assert_eq!(cursor.next_frame(), 0);
        assert_eq!(cursor.advance(Duration::from_secs(5)), 0);
        assert_eq!(cursor.current_canvas(), Err(RenderError::NotLoaded));
    }

    #[test]
    fn test_wraps_after_n_steps() {
        let mut cursor = AnimationCursor::new();
        cursor.load(doc_with_delays(&[10, 20, 30]));
        assert_eq!(cursor.index(), 0);
        assert_eq!(cursor.next_frame(), 1);
        assert_eq!(cursor.frame_delay(), 20);
        assert_eq!(cursor.next_frame(), 2);
        assert_eq!(cursor.next_frame(), 0);
    }

    #[test]
    fn test_load_resets_position() {
        let mut cursor = AnimationCursor::new();
        cursor.load(doc_with_delays(&[10, 10]));
        cursor.next_frame();
        cursor.load(doc_with_delays(&[5, 5, 5]));
        assert_eq!(cursor.index(), 0);
        assert_eq!(cursor.frame_count(), 3);
    }

    #[test]
    fn test_advance_uses_delays() {
        let mut cursor = AnimationCursor::new();
        cursor.load(doc_with_delays(&[10, 20, 0]));

        assert_eq!(cursor.advance(Duration::from_millis(50)), 0);
        assert_eq!(cursor.advance(Duration::from_millis(50)), 1);
        assert_eq!(cursor.index(), 1);
        // 200ms for frame 1, then frame 2's zero delay is paced as 100ms.
        assert_eq!(cursor.advance(Duration::from_millis(300)), 2);
        assert_eq!(cursor.index(), 0);
    }

    #[test]
    fn test_current_canvas_follows_index() {
        let mut cursor = AnimationCursor::new();
        cursor.load(doc_with_delays(&[10, 10]));
        assert_eq!(cursor.current_canvas().unwrap()[..4], [0, 0, 0, 255]);
        cursor.next_frame();
        assert_eq!(cursor.current_canvas().unwrap()[..4], [255, 255, 255, 255]);
    }
}
