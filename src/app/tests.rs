use super::*;
use crate::config::{SchedulerMode, SourceConfig, WatchConfig};
use crate::error::{ExitCategory, InferenceError};
use crate::frame::Tensor;
use crate::inference::{BoundingBox, Detection, Detector, ThreadedGateway};
use crate::labels::LabelSet;
use crate::source::FrameSource;
use crate::tracking::EventLogWriter;
use image::{Rgb, RgbImage};
use std::path::Path;

const SHAPE: [usize; 4] = [1, 3, 4, 4];

/// Sees one person whenever the frame is bright
struct BrightnessDetector;

impl Detector for BrightnessDetector {
    fn name(&self) -> &str {
        "brightness"
    }

    fn input_shape(&self) -> [usize; 4] {
        SHAPE
    }

    fn infer(&mut self, tensor: &Tensor) -> Result<Vec<Detection>, InferenceError> {
        if tensor.data[0] < 128.0 {
            return Ok(Vec::new());
        }
        Ok(vec![Detection {
            class_id: 1,
            confidence: 0.95,
            bbox: BoundingBox {
                x_min: 0.0,
                y_min: 0.0,
                x_max: 1.0,
                y_max: 1.0,
            },
        }])
    }
}

fn write_frames(dir: &Path, values: &[u8]) {
    std::fs::create_dir_all(dir).unwrap();
    for (i, value) in values.iter().enumerate() {
        RgbImage::from_pixel(4, 4, Rgb([*value, *value, *value]))
            .save(dir.join(format!("frame_{:03}.png", i)))
            .unwrap();
    }
}

fn test_config(root: &Path, frame_dirs: &[&Path]) -> WatchConfig {
    let mut config = WatchConfig::default();
    config.sources = frame_dirs
        .iter()
        .map(|dir| SourceConfig {
            input: dir.display().to_string(),
            name: None,
            fps: Some(10.0),
            loop_video: None,
        })
        .collect();
    config.labels = vec!["person".to_string()];
    config.model.path = root.join("model.onnx").display().to_string();
    config.model.labels_path = root.join("labels.txt").display().to_string();
    config.model.input_shape = SHAPE;
    config.scheduler.candidate_confidence = 2;
    config.output.event_file = root.join("events.json").display().to_string();
    config.output.data_file = root.join("data.json").display().to_string();
    config.output.snapshot_dir = root.join("output").display().to_string();
    config
}

fn assemble(config: WatchConfig) -> WatchApp {
    let labels =
        LabelSet::from_model_labels(vec!["person".to_string()], &config.labels).unwrap();
    let sources = config
        .sources
        .iter()
        .enumerate()
        .map(|(i, source)| {
            FrameSource::open(i, config.source_name(i), source, &config.scheduler).unwrap()
        })
        .collect();
    let gateway = ThreadedGateway::spawn(BrightnessDetector).unwrap();
    WatchApp::assemble(config, labels, sources, Box::new(gateway)).unwrap()
}

#[test]
fn test_build_rejects_empty_sources() {
    let err = WatchApp::build(WatchConfig::default()).err().unwrap();
    assert_eq!(err.category(), ExitCategory::Configuration);
}

#[test]
fn test_build_reports_missing_label_file() {
    let dir = tempfile::tempdir().unwrap();
    let frames = dir.path().join("frames");
    write_frames(&frames, &[0, 0]);

    let config = test_config(dir.path(), &[&frames]);
    let err = WatchApp::build(config).err().unwrap();
    assert_eq!(err.category(), ExitCategory::MissingResource);
}

#[test]
fn test_build_reports_missing_source() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("labels.txt"), "person\ncar\n").unwrap();

    let missing = dir.path().join("nowhere");
    let config = test_config(dir.path(), &[&missing]);
    let err = WatchApp::build(config).err().unwrap();
    assert_eq!(err.category(), ExitCategory::Configuration);
}

#[test]
fn test_assemble_rejects_shape_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let frames = dir.path().join("frames");
    write_frames(&frames, &[0]);

    let mut config = test_config(dir.path(), &[&frames]);
    config.model.input_shape = [1, 3, 8, 8];
    let labels = LabelSet::from_model_labels(vec!["person".to_string()], &config.labels).unwrap();
    let source = FrameSource::open(0, "Cam 0".to_string(), &config.sources[0], &config.scheduler)
        .unwrap();
    let gateway = ThreadedGateway::spawn(BrightnessDetector).unwrap();

    let err = WatchApp::assemble(config, labels, vec![source], Box::new(gateway))
        .err()
        .unwrap();
    assert_eq!(err.category(), ExitCategory::Configuration);
}

#[tokio::test]
async fn test_run_to_end_of_streams() {
    let dir = tempfile::tempdir().unwrap();
    let frames = dir.path().join("frames");
    write_frames(&frames, &[0, 0, 255, 255, 255, 0, 0, 255, 255]);

    let config = test_config(dir.path(), &[&frames]);
    let app = assemble(config);
    assert_eq!(app.config().sources.len(), 1);

    let outcome = app.run().await.unwrap();
    assert_eq!(outcome.reason, ShutdownReason::EndOfStreams);
    assert_eq!(outcome.summary.events, 2);

    let events = EventLogWriter::load(dir.path().join("events.json")).unwrap();
    let cam = &events["Cam 0"];
    assert_eq!(cam.len(), 2);
    assert_eq!(cam[0].frame_index(), 4);
    assert_eq!(cam[1].frame_index(), 9);
    assert_eq!(cam[1].cumulative_total(), 2);

    let summary = EventLogWriter::load_summary(dir.path().join("data.json")).unwrap();
    assert_eq!(summary.totals["Cam 0"], 2);

    assert!(dir.path().join("output/intruder_1.png").exists());
    assert!(dir.path().join("output/intruder_2.png").exists());
}

#[tokio::test]
async fn test_sync_mode_with_two_sources() {
    let dir = tempfile::tempdir().unwrap();
    let front = dir.path().join("front");
    let back = dir.path().join("back");
    write_frames(&front, &[0, 255, 255, 255]);
    write_frames(&back, &[0, 0, 0, 0]);

    let mut config = test_config(dir.path(), &[&front, &back]);
    config.scheduler.mode = SchedulerMode::Sync;
    config.motion.enabled = false;
    config.sources[1].name = Some("Back".to_string());

    let outcome = assemble(config).run().await.unwrap();
    assert_eq!(outcome.summary.events, 1);

    let events = EventLogWriter::load(dir.path().join("events.json")).unwrap();
    assert_eq!(events["Cam 0"].len(), 1);
    assert!(events["Back"].is_empty());

    // Several sources snapshot into per-source folders
    assert!(dir.path().join("output/Cam_0/intruder_1.png").exists());
}

#[tokio::test]
async fn test_shutdown_request_stops_run() {
    let dir = tempfile::tempdir().unwrap();
    let frames = dir.path().join("frames");
    write_frames(&frames, &[255; 5]);

    let mut config = test_config(dir.path(), &[&frames]);
    config.sources[0].loop_video = Some(true);

    let app = assemble(config);
    let trigger = app.shutdown_trigger();
    let mut receiver = app.event_bus().subscribe();

    let run = tokio::spawn(app.run());
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    trigger.trigger(ShutdownReason::UserRequest);
    trigger.trigger(ShutdownReason::Signal("SIGINT".to_string()));

    let outcome = tokio::time::timeout(std::time::Duration::from_secs(10), run)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(outcome.reason, ShutdownReason::UserRequest);
    assert!(outcome.summary.cancelled);
    assert!(trigger.is_triggered());
    assert!(dir.path().join("events.json").exists());

    let mut shutdown_events = 0;
    while let Ok(event) = receiver.try_recv() {
        if event.event_type() == "shutdown_requested" {
            shutdown_events += 1;
        }
    }
    assert_eq!(shutdown_events, 1);
}
