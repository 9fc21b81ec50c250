use anyhow::Result;

use litter_picker::detect::InputType;
use litter_picker::{DetectionEngine, Frame, InputSpec, LabelMap, PixelFormat, StubBackend};

fn gray_frame(width: u32, height: u32) -> Result<Frame> {
    Ok(Frame::new(
        vec![128u8; (width * height) as usize],
        width,
        height,
        PixelFormat::Gray8,
    )?)
}

fn close(a: f32, b: f32) -> bool {
    (a - b).abs() < 1e-2
}

#[test]
fn boxes_land_in_original_frame_coordinates() -> Result<()> {
    let tlbr = [0.1, 0.2, 0.6, 0.9];
    for (frame_dims, model_dims) in [
        ((640, 480), (300, 300)),
        ((1280, 720), (320, 320)),
        ((320, 240), (640, 480)),
        ((300, 300), (300, 300)),
        ((17, 9), (5, 13)),
    ] {
        let backend = StubBackend::new(InputSpec::new(model_dims.0, model_dims.1, InputType::U8))
            .repeat_outputs(StubBackend::ssd_outputs(&[(tlbr, 1.0, 0.8)]));
        let mut engine = DetectionEngine::new(backend);

        let detections = engine.detect(&gray_frame(frame_dims.0, frame_dims.1)?)?;
        assert_eq!(detections.len(), 1);

        let (w, h) = (frame_dims.0 as f32, frame_dims.1 as f32);
        let b = detections[0].bbox;
        assert!(close(b.x_min, 0.2 * w), "{:?} -> {:?}", frame_dims, b);
        assert!(close(b.y_min, 0.1 * h), "{:?} -> {:?}", frame_dims, b);
        assert!(close(b.x_max, 0.9 * w), "{:?} -> {:?}", frame_dims, b);
        assert!(close(b.y_max, 0.6 * h), "{:?} -> {:?}", frame_dims, b);
    }
    Ok(())
}

#[test]
fn classes_scores_and_boxes_stay_aligned() -> Result<()> {
    let labels = LabelMap::parse("0 bottle\n1 can\n2 wrapper\n")?;
    let outputs = StubBackend::ssd_outputs(&[
        ([0.0, 0.0, 0.1, 0.1], 0.0, 0.9),
        ([0.2, 0.2, 0.3, 0.3], 1.0, 0.3),
        ([0.4, 0.4, 0.5, 0.5], 2.0, 0.7),
    ]);
    let backend =
        StubBackend::new(InputSpec::new(10, 10, InputType::U8)).repeat_outputs(outputs);
    let mut engine = DetectionEngine::new(backend).with_labels(labels);

    let detections = engine.detect(&gray_frame(100, 100)?)?;

    let names: Vec<String> = detections.iter().map(|d| d.display_name()).collect();
    assert_eq!(names, vec!["bottle", "wrapper"]);
    assert_eq!(detections[0].score, 0.9);
    assert_eq!(detections[1].score, 0.7);
    assert!(close(detections[1].bbox.x_min, 40.0));
    assert!(close(detections[1].bbox.y_max, 50.0));
    Ok(())
}

#[test]
fn unlabelled_classes_keep_their_id() -> Result<()> {
    let backend = StubBackend::new(InputSpec::new(8, 8, InputType::U8))
        .repeat_outputs(StubBackend::ssd_outputs(&[([0.0, 0.0, 1.0, 1.0], 44.0, 0.95)]));
    let mut engine = DetectionEngine::new(backend).with_labels(LabelMap::parse("0 bottle")?);

    let detections = engine.detect(&gray_frame(8, 8)?)?;
    assert_eq!(detections[0].class_id, 44);
    assert_eq!(detections[0].label, None);
    assert_eq!(detections[0].display_name(), "class 44");
    Ok(())
}

#[test]
fn nv12_frames_run_through_detection() -> Result<()> {
    assert!(Frame::new(vec![128u8; 3], 2, 1, PixelFormat::Nv12).is_err());

    let backend = StubBackend::new(InputSpec::new(4, 4, InputType::U8))
        .repeat_outputs(StubBackend::ssd_outputs(&[([0.0, 0.0, 0.5, 0.5], 0.0, 0.9)]));
    let mut engine = DetectionEngine::new(backend);
    let frame = Frame::new(vec![128u8; 6 * 4 * 3 / 2], 6, 4, PixelFormat::Nv12)?;

    let detections = engine.detect(&frame)?;
    assert_eq!(detections.len(), 1);
    assert!(close(detections[0].bbox.x_max, 3.0));
    assert!(close(detections[0].bbox.y_max, 2.0));
    Ok(())
}
