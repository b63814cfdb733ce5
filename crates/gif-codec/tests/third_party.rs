//! Cross-checks against the `gif` crate.

use std::borrow::Cow;

use gif_codec::{decode, encode};
use gif_types::{DecodeError, DisposalMethod, Document, Frame};

fn sample_document() -> Document {
    let mut doc = Document::new(20, 10);
    doc.global_palette = Some(vec![[0, 0, 0], [255, 0, 0], [0, 255, 0], [0, 0, 255], [255, 255, 255]]);
    doc.loop_count = Some(0);

    let base = (0..200).map(|i| (i % 5) as u8).collect();
    doc.frames.push(Frame::full(20, 10, base).with_delay(10).with_disposal(DisposalMethod::DoNotDispose));

    let patch = (0..16).map(|i| if i % 3 == 0 { 7 } else { 3 }).collect();
    doc.frames.push(
        Frame::full(4, 4, patch)
            .with_offset(8, 3)
            .with_delay(20)
            .with_transparent_index(Some(7))
            .with_disposal(DisposalMethod::RestoreToPrevious),
    );

    let local = vec![[9, 9, 9], [200, 100, 50]];
    doc.frames.push(
        Frame::full(20, 10, vec![1; 200])
            .with_local_palette(local)
            .with_delay(30)
            .with_disposal(DisposalMethod::RestoreToBackground),
    );
    doc
}

fn gif_disposal(method: DisposalMethod) -> gif::DisposalMethod {
    match method {
        DisposalMethod::None => gif::DisposalMethod::Any,
        DisposalMethod::DoNotDispose => gif::DisposalMethod::Keep,
        DisposalMethod::RestoreToBackground => gif::DisposalMethod::Background,
        DisposalMethod::RestoreToPrevious => gif::DisposalMethod::Previous,
    }
}

#[test]
fn test_gif_crate_reads_our_output() {
    let doc = sample_document();
    let bytes = encode(&doc).unwrap();

    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::Indexed);
    let mut decoder = options.read_info(&bytes[..]).unwrap();
    assert_eq!((decoder.width(), decoder.height()), (20, 10));

    let mut count = 0;
    while let Some(frame) = decoder.read_next_frame().unwrap() {
        let ours = &doc.frames[count];
        assert_eq!((frame.left, frame.top), (ours.left, ours.top));
        assert_eq!((frame.width, frame.height), (ours.width, ours.height));
        assert_eq!(frame.delay, ours.delay_cs);
        assert_eq!(frame.dispose, gif_disposal(ours.disposal));
        assert_eq!(frame.transparent, ours.transparent_index);
        assert_eq!(&frame.buffer[..], &ours.indices[..], "frame {count} indices");
        assert_eq!(frame.palette.is_some(), ours.local_palette.is_some());
        count += 1;
    }
    assert_eq!(count, doc.frames.len());
}

#[test]
fn test_we_read_gif_crate_output() {
    let palette: Vec<u8> = vec![0, 0, 0, 255, 255, 255, 255, 0, 0, 0, 0, 255];
    let first: Vec<u8> = (0..64).map(|i| ((i / 8 + i % 8) % 4) as u8).collect();
    let second: Vec<u8> = vec![2; 9];

    let mut bytes = Vec::new();
    {
        let mut encoder = gif::Encoder::new(&mut bytes, 8, 8, &palette).unwrap();
        encoder.set_repeat(gif::Repeat::Finite(3)).unwrap();

        let frame = gif::Frame {
            width: 8,
            height: 8,
            delay: 15,
            dispose: gif::DisposalMethod::Keep,
            buffer: Cow::Borrowed(&first[..]),
            ..Default::default()
        };
        encoder.write_frame(&frame).unwrap();

        let frame = gif::Frame {
            left: 2,
            top: 4,
            width: 3,
            height: 3,
            delay: 5,
            transparent: Some(0),
            dispose: gif::DisposalMethod::Background,
            buffer: Cow::Borrowed(&second[..]),
            ..Default::default()
        };
        encoder.write_frame(&frame).unwrap();
    }

    let doc = decode(&bytes).unwrap();
    assert_eq!((doc.width, doc.height), (8, 8));
    assert_eq!(doc.loop_count, Some(3));
    assert_eq!(&doc.global_palette.as_ref().unwrap()[..4], &[[0, 0, 0], [255, 255, 255], [255, 0, 0], [0, 0, 255]]);
    assert_eq!(doc.frames.len(), 2);

    assert_eq!(doc.frames[0].indices, first);
    assert_eq!(doc.frames[0].delay_cs, 15);
    assert_eq!(doc.frames[0].disposal, DisposalMethod::DoNotDispose);

    let patch = &doc.frames[1];
    assert_eq!((patch.left, patch.top, patch.width, patch.height), (2, 4, 3, 3));
    assert_eq!(patch.indices, second);
    assert_eq!(patch.transparent_index, Some(0));
    assert_eq!(patch.disposal, DisposalMethod::RestoreToBackground);
}

#[test]
fn test_document_survives_round_trip() {
    let doc = sample_document();
    let back = decode(&encode(&doc).unwrap()).unwrap();

    assert_eq!(back.frames.len(), doc.frames.len());
    assert_eq!(back.loop_count, doc.loop_count);
    for (a, b) in back.frames.iter().zip(doc.frames.iter()) {
        assert_eq!(a.indices, b.indices);
        assert_eq!(a.delay_cs, b.delay_cs);
        assert_eq!(a.disposal, b.disposal);
        assert_eq!(a.transparent_index, b.transparent_index);
    }
}

#[test]
fn test_malformed_input_is_an_error() {
    assert!(matches!(decode(&[0x47, 0x49, 0x46, 0x38]), Err(DecodeError::MalformedHeader { .. })));
    assert!(decode(b"GIF89a\x01\x00\x01\x00\x80\x00\x00\x00").is_err());
}
