//! Load, preview and export through the public engine surface.

use std::sync::Arc;

use gif_caption::{
    CaptionEngine, CaptionSpec, Compositor, DecodeError, Dimensions, ExportOptions, ExportRequest, ExportWorker,
    RgbaBuffer,
};
use gif_types::{DisposalMethod, Document, Frame};
use sha2::{Digest, Sha256};

/// Eight dark colors so a white caption cannot be confused with the source.
const PALETTE: [[u8; 3]; 8] = [
    [20, 20, 60],
    [60, 20, 20],
    [20, 60, 20],
    [80, 80, 20],
    [20, 80, 80],
    [80, 20, 80],
    [40, 40, 40],
    [100, 60, 30],
];

fn looping_source() -> Vec<u8> {
    let mut doc = Document::new(100, 100);
    doc.global_palette = Some(PALETTE.to_vec());
    doc.loop_count = Some(0);
    for shift in 0..3u32 {
        let indices = (0..100u32 * 100)
            .map(|i| (((i % 100) / 13 + (i / 100) / 13 + shift) % 8) as u8)
            .collect();
        doc.frames.push(Frame::full(100, 100, indices).with_delay(10));
    }
    gif_codec::encode(&doc).unwrap()
}

fn hello() -> CaptionSpec {
    CaptionEngine::new().prepare_caption("HELLO", 50.0, 50.0, 24.0, "Arial")
}

fn is_near_white(px: &[u8]) -> bool {
    px[0] > 200 && px[1] > 200 && px[2] > 200 && px[3] == 255
}

fn white_pixels_in(canvas: &[u8], width: usize, x0: usize, y0: usize, x1: usize, y1: usize) -> usize {
    let mut count = 0;
    for y in y0..y1 {
        for x in x0..x1 {
            let i = (y * width + x) * 4;
            if is_near_white(&canvas[i..i + 4]) {
                count += 1;
            }
        }
    }
    count
}

#[test]
fn test_export_hello_caption() {
    let engine = CaptionEngine::new();
    let bytes = engine.export_with_caption(&looping_source(), &hello()).unwrap();
    assert_eq!(&bytes[..6], b"GIF89a");

    let doc = Arc::new(gif_codec::decode(&bytes).unwrap());
    assert_eq!(doc.dimensions(), Dimensions::new(100, 100));
    assert_eq!(doc.delays(), vec![10, 10, 10]);
    assert!(doc.loops_forever());

    for (index, canvas) in Compositor::new(doc).composite_all().iter().enumerate() {
        let near_anchor = white_pixels_in(canvas, 100, 30, 40, 70, 60);
        assert!(near_anchor > 40, "frame {index}: only {near_anchor} caption pixels near the anchor");
        assert_eq!(white_pixels_in(canvas, 100, 0, 0, 100, 20), 0, "frame {index}: caption leaked to the top");
        assert_eq!(white_pixels_in(canvas, 100, 0, 80, 100, 100), 0, "frame {index}: caption leaked to the bottom");
    }
}

#[test]
fn test_export_readable_by_gif_crate() {
    let bytes = CaptionEngine::new().export_with_caption(&looping_source(), &hello()).unwrap();

    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::RGBA);
    let mut decoder = options.read_info(&bytes[..]).unwrap();
    assert_eq!((decoder.width(), decoder.height()), (100, 100));

    let mut delays = Vec::new();
    while let Some(frame) = decoder.read_next_frame().unwrap() {
        assert_eq!((frame.width, frame.height), (100, 100));
        assert!(white_pixels_in(&frame.buffer, 100, 30, 40, 70, 60) > 40);
        delays.push(frame.delay);
    }
    assert_eq!(delays, vec![10, 10, 10]);
    assert_eq!(decoder.repeat(), gif::Repeat::Infinite);
}

#[test]
fn test_export_is_deterministic() {
    let source = looping_source();
    let engine = CaptionEngine::new();
    let first = Sha256::digest(engine.export_with_caption(&source, &hello()).unwrap());
    let second = Sha256::digest(engine.export_with_caption(&source, &hello()).unwrap());
    assert_eq!(first, second);
}

#[test]
fn test_preview_is_idempotent_and_stateless() {
    let mut engine = CaptionEngine::new();
    engine.load(&looping_source()).unwrap();
    engine.next_frame();

    let mut first = RgbaBuffer::new(100, 100);
    let mut second = RgbaBuffer::new(100, 100);
    engine.composite_preview(&mut first, &hello()).unwrap();
    engine.composite_preview(&mut second, &hello()).unwrap();
    assert_eq!(first, second);
    assert_eq!(engine.current_index(), 1);

    // The caption is not baked into the frame.
    let mut plain = RgbaBuffer::new(100, 100);
    engine.render_current_frame(&mut plain).unwrap();
    assert_ne!(plain, first);
    assert_eq!(white_pixels_in(plain.as_bytes(), 100, 0, 0, 100, 100), 0);
    assert!(white_pixels_in(first.as_bytes(), 100, 30, 40, 70, 60) > 40);
}

#[test]
fn test_export_does_not_touch_preview() {
    let source = looping_source();
    let mut engine = CaptionEngine::new();
    engine.load(&source).unwrap();
    engine.next_frame();
    engine.next_frame();

    engine.export_with_caption(&source, &hello()).unwrap();
    assert_eq!(engine.current_index(), 2);
    assert_eq!(engine.next_frame(), 0);
}

#[test]
fn test_cursor_wraps_after_frame_count_steps() {
    let mut engine = CaptionEngine::new();
    engine.load(&looping_source()).unwrap();
    let steps: Vec<usize> = (0..3).map(|_| engine.next_frame()).collect();
    assert_eq!(steps, vec![1, 2, 0]);
}

#[test]
fn test_malformed_input_keeps_engine_idle() {
    let mut engine = CaptionEngine::new();
    let err = engine.load(&[0x47, 0x49, 0x46, 0x38]).unwrap_err();
    assert!(matches!(err, DecodeError::MalformedHeader { .. }));
    assert_eq!(engine.get_dimensions(), Dimensions::new(0, 0));
    assert_eq!(engine.get_frame_delay(), 100);

    let mut surface = RgbaBuffer::new(1, 1);
    assert!(engine.render_current_frame(&mut surface).is_err());
}

#[test]
fn test_worker_round_trip_through_json() {
    let request = ExportRequest::new(looping_source(), hello())
        .with_options(ExportOptions::default().with_loop_count(0));
    let json = serde_json::to_vec(&request).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("request.json");
    std::fs::write(&path, &json).unwrap();
    let restored: ExportRequest = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(restored, request);

    let from_worker = ExportWorker::spawn(restored).wait().unwrap();
    let inline = CaptionEngine::new().export_with_caption(&request.gif, &request.caption).unwrap();
    assert_eq!(from_worker, inline);
}

/// Base frame, a patch with see-through pixels, a frame that restores the
/// previous canvas and one with its own palette.
fn layered_source() -> Document {
    let mut doc = Document::new(12, 8);
    doc.global_palette = Some(PALETTE.to_vec());
    doc.loop_count = Some(2);
    doc.frames.push(Frame::full(12, 8, (0..96).map(|i| (i % 3) as u8).collect()).with_delay(5));
    doc.frames.push(
        Frame::full(4, 4, vec![7, 3, 7, 3, 3, 7, 3, 7, 7, 7, 4, 4, 5, 5, 7, 7])
            .with_offset(2, 1)
            .with_transparent_index(Some(7))
            .with_disposal(DisposalMethod::DoNotDispose)
            .with_delay(6),
    );
    doc.frames.push(
        Frame::full(6, 5, vec![6; 30])
            .with_offset(5, 2)
            .with_disposal(DisposalMethod::RestoreToPrevious)
            .with_delay(7),
    );
    doc.frames.push(
        Frame::full(3, 2, vec![0, 1, 0, 1, 0, 1])
            .with_offset(9, 6)
            .with_local_palette(vec![[250, 0, 0], [0, 250, 0]])
            .with_delay(8),
    );
    doc
}

#[test]
fn test_codec_round_trip_preserves_composited_canvases() {
    let source = layered_source();
    let expected = Compositor::new(Arc::new(source.clone())).composite_all();

    let bytes = gif_codec::encode(&source).unwrap();
    let decoded = gif_codec::decode(&bytes).unwrap();
    assert_eq!(decoded.delays(), source.delays());
    assert_eq!(decoded.loop_count, Some(2));
    assert_eq!(Compositor::new(Arc::new(decoded.clone())).composite_all(), expected);

    // A second pass through the codec is stable.
    let again = gif_codec::decode(&gif_codec::encode(&decoded).unwrap()).unwrap();
    assert_eq!(Compositor::new(Arc::new(again)).composite_all(), expected);

    // The restored frame leaves no trace on the frame after it.
    let after_restore = &expected[3];
    let i = (3 * 12 + 8) * 4;
    assert_eq!(&after_restore[i..i + 4], &expected[1][i..i + 4]);
}
