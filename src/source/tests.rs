use super::*;
use crate::error::SourceError;
use crossbeam::channel::{unbounded, Sender};
use image::{Rgb, RgbImage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn tagged_image(tag: u8) -> RgbImage {
    RgbImage::from_pixel(8, 6, Rgb([tag, 0, 0]))
}

/// Pull-style reader over a fixed list of frames
struct ScriptedReader {
    frames: Vec<RgbImage>,
    position: usize,
    fps: Option<f64>,
    released: Arc<AtomicBool>,
}

impl ScriptedReader {
    fn new(count: u8, fps: Option<f64>) -> (Self, Arc<AtomicBool>) {
        let released = Arc::new(AtomicBool::new(false));
        let reader = Self {
            frames: (1..=count).map(tagged_image).collect(),
            position: 0,
            fps,
            released: Arc::clone(&released),
        };
        (reader, released)
    }
}

impl FrameReader for ScriptedReader {
    fn read(&mut self) -> Result<Option<RgbImage>, SourceError> {
        let frame = self.frames.get(self.position).cloned();
        self.position += 1;
        Ok(frame)
    }

    fn fps(&self) -> Option<f64> {
        self.fps
    }

    fn dimensions(&self) -> (u32, u32) {
        (8, 6)
    }

    fn frame_count(&self) -> Option<u64> {
        Some(self.frames.len() as u64)
    }

    fn rewind(&mut self) -> Result<(), SourceError> {
        self.position = 0;
        Ok(())
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Push-style reader that yields a frame each time the test sends one
struct GatedReader {
    frames: crossbeam::channel::Receiver<RgbImage>,
    released: Arc<AtomicBool>,
}

impl FrameReader for GatedReader {
    fn read(&mut self) -> Result<Option<RgbImage>, SourceError> {
        Ok(self.frames.recv().ok())
    }

    fn fps(&self) -> Option<f64> {
        Some(25.0)
    }

    fn dimensions(&self) -> (u32, u32) {
        (8, 6)
    }

    fn frame_count(&self) -> Option<u64> {
        None
    }

    fn rewind(&mut self) -> Result<(), SourceError> {
        Ok(())
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

fn gated_source() -> (FrameSource, Sender<RgbImage>, Arc<AtomicBool>) {
    let (tx, rx) = unbounded();
    let released = Arc::new(AtomicBool::new(false));
    let reader = GatedReader {
        frames: rx,
        released: Arc::clone(&released),
    };
    let source = FrameSource::from_reader(
        0,
        "Cam 0".to_string(),
        SourceDescriptor::Network("rtsp://camera.local/stream".to_string()),
        Box::new(reader),
        None,
        30.0,
        false,
    )
    .unwrap();
    (source, tx, released)
}

fn pull_source(count: u8, descriptor: SourceDescriptor, loop_video: bool) -> FrameSource {
    let (reader, _) = ScriptedReader::new(count, Some(30.0));
    FrameSource::from_reader(
        0,
        "Cam 0".to_string(),
        descriptor,
        Box::new(reader),
        None,
        30.0,
        loop_video,
    )
    .unwrap()
}

fn file_descriptor() -> SourceDescriptor {
    SourceDescriptor::File("clip.mp4".into())
}

fn expect_frame(outcome: ReadOutcome) -> (u64, u8, bool) {
    match outcome {
        ReadOutcome::Frame { frame, stale } => (frame.sequence, frame.image.get_pixel(0, 0)[0], stale),
        other => panic!("expected a frame, got {:?}", other),
    }
}

#[test]
fn test_pull_source_reads_in_order_then_ends() {
    let mut source = pull_source(3, file_descriptor(), false);
    assert!(!source.is_push());

    for expected in 1..=3u64 {
        let (sequence, tag, stale) = expect_frame(source.read(ReadPolicy::Fresh).unwrap());
        assert_eq!(sequence, expected);
        assert_eq!(tag as u64, expected);
        assert!(!stale);
    }
    assert!(matches!(
        source.read(ReadPolicy::Fresh).unwrap(),
        ReadOutcome::EndOfStream
    ));
}

#[test]
fn test_looping_file_rewinds_and_keeps_counting() {
    let mut source = pull_source(2, file_descriptor(), true);

    let tags: Vec<(u64, u8)> = (0..5)
        .map(|_| {
            let (sequence, tag, _) = expect_frame(source.read(ReadPolicy::Fresh).unwrap());
            (sequence, tag)
        })
        .collect();

    assert_eq!(tags, vec![(1, 1), (2, 2), (3, 1), (4, 2), (5, 1)]);
}

#[test]
fn test_live_device_never_loops() {
    let mut source = pull_source(1, SourceDescriptor::Device(0), true);
    expect_frame(source.read(ReadPolicy::Fresh).unwrap());
    assert!(matches!(
        source.read(ReadPolicy::Fresh).unwrap(),
        ReadOutcome::EndOfStream
    ));
}

#[test]
fn test_advance_drops_intermediate_frames() {
    let mut source = pull_source(5, file_descriptor(), false);

    assert_eq!(expect_frame(source.advance(2, None).unwrap()).0, 2);
    assert_eq!(expect_frame(source.advance(2, None).unwrap()).0, 4);
    // Only one frame left: return it rather than dropping it
    assert_eq!(expect_frame(source.advance(2, None).unwrap()).0, 5);
    assert!(matches!(
        source.advance(2, None).unwrap(),
        ReadOutcome::EndOfStream
    ));
}

#[test]
fn test_fps_resolution_order() {
    let (reader, _) = ScriptedReader::new(1, None);
    let source = FrameSource::from_reader(
        0,
        "a".to_string(),
        file_descriptor(),
        Box::new(reader),
        None,
        12.0,
        false,
    )
    .unwrap();
    assert_eq!(source.fps(), 12.0);

    let (reader, _) = ScriptedReader::new(1, Some(30.0));
    let source = FrameSource::from_reader(
        0,
        "b".to_string(),
        file_descriptor(),
        Box::new(reader),
        Some(15.0),
        12.0,
        false,
    )
    .unwrap();
    assert_eq!(source.fps(), 15.0);
}

#[test]
fn test_push_policies() {
    let (mut source, tx, _) = gated_source();
    assert!(source.is_push());

    // Nothing published yet
    assert!(matches!(
        source.read(ReadPolicy::Latest).unwrap(),
        ReadOutcome::Pending
    ));

    tx.send(tagged_image(7)).unwrap();
    let (sequence, tag, stale) = expect_frame(source.read(ReadPolicy::Fresh).unwrap());
    assert_eq!((sequence, tag, stale), (1, 7, false));

    // Sequence 3 never arrives: the timeout hands back the best frame, flagged stale
    let (sequence, _, stale) = expect_frame(
        source
            .read(ReadPolicy::Until {
                sequence: 3,
                timeout: Some(Duration::from_millis(50)),
            })
            .unwrap(),
    );
    assert_eq!(sequence, 1);
    assert!(stale);

    tx.send(tagged_image(8)).unwrap();
    tx.send(tagged_image(9)).unwrap();
    let (sequence, tag, stale) = expect_frame(
        source
            .read(ReadPolicy::Until {
                sequence: 3,
                timeout: Some(Duration::from_secs(5)),
            })
            .unwrap(),
    );
    assert_eq!((sequence, tag, stale), (3, 9, false));

    drop(tx);
    assert!(matches!(
        source.read(ReadPolicy::Fresh).unwrap(),
        ReadOutcome::EndOfStream
    ));
}

#[test]
fn test_fresh_reads_never_go_backwards() {
    let (mut source, tx, _) = gated_source();

    let producer = std::thread::spawn(move || {
        for tag in 0..50u8 {
            tx.send(tagged_image(tag)).unwrap();
            if tag % 7 == 0 {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    });

    let mut last = 0;
    loop {
        match source.read(ReadPolicy::Fresh).unwrap() {
            ReadOutcome::Frame { frame, stale } => {
                assert!(!stale);
                assert!(frame.sequence > last);
                last = frame.sequence;
            }
            ReadOutcome::EndOfStream => break,
            ReadOutcome::Pending => panic!("fresh reads never poll"),
        }
    }

    producer.join().unwrap();
    assert!(last <= 50);
}

#[test]
fn test_interrupt_wakes_blocked_consumer() {
    let (mut source, tx, _) = gated_source();
    let interrupt = source.interrupt_handle().unwrap();

    let waker = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(50));
        interrupt.interrupt();
    });

    assert!(matches!(
        source.read(ReadPolicy::Fresh).unwrap(),
        ReadOutcome::EndOfStream
    ));
    waker.join().unwrap();

    // Unblock the decoder so the producer can be joined
    drop(tx);
    source.stop().unwrap();
}

#[test]
fn test_stop_joins_before_release() {
    let (mut source, tx, released) = gated_source();
    tx.send(tagged_image(1)).unwrap();
    expect_frame(source.read(ReadPolicy::Fresh).unwrap());

    drop(tx);
    source.stop().unwrap();
    assert!(source.is_stopped());
    assert!(!released.load(Ordering::SeqCst));

    source.release();
    assert!(released.load(Ordering::SeqCst));
    assert!(matches!(
        source.read(ReadPolicy::Fresh).unwrap(),
        ReadOutcome::EndOfStream
    ));
}

#[test]
fn test_pull_release() {
    let (reader, released) = ScriptedReader::new(2, None);
    let mut source = FrameSource::from_reader(
        0,
        "Cam 0".to_string(),
        file_descriptor(),
        Box::new(reader),
        None,
        30.0,
        false,
    )
    .unwrap();

    source.stop().unwrap();
    assert!(!released.load(Ordering::SeqCst));
    source.release();
    assert!(released.load(Ordering::SeqCst));
}

#[test]
fn test_image_sequence_reader() {
    let dir = tempfile::tempdir().unwrap();
    for (name, tag) in [("b.png", 2u8), ("a.png", 1), ("c.png", 3)] {
        tagged_image(tag).save(dir.path().join(name)).unwrap();
    }
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let mut reader = ImageSequenceReader::open_dir(dir.path(), Some(10.0)).unwrap();
    assert_eq!(reader.frame_count(), Some(3));
    assert_eq!(reader.dimensions(), (8, 6));
    assert_eq!(reader.fps(), Some(10.0));

    let tags: Vec<u8> = std::iter::from_fn(|| reader.read().unwrap())
        .map(|image| image.get_pixel(0, 0)[0])
        .collect();
    assert_eq!(tags, vec![1, 2, 3]);

    reader.rewind().unwrap();
    assert!(reader.read().unwrap().is_some());
}

#[test]
fn test_empty_directory_fails_to_open() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        ImageSequenceReader::open_dir(dir.path(), None),
        Err(SourceError::Open { .. })
    ));
}

#[cfg(not(all(target_os = "linux", feature = "gstreamer")))]
#[test]
fn test_video_files_need_a_decoder() {
    let file = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
    let descriptor = SourceDescriptor::parse(file.path().to_str().unwrap()).unwrap();
    assert!(matches!(
        open_reader(&descriptor, None),
        Err(SourceError::Unsupported { .. })
    ));
}

#[cfg(all(target_os = "linux", feature = "gstreamer"))]
#[test]
fn test_video_files_are_handed_to_gstreamer() {
    // Not a real video: the decoder is tried and fails to open it
    let mut file = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
    std::io::Write::write_all(&mut file, b"not a video").unwrap();
    let descriptor = SourceDescriptor::parse(file.path().to_str().unwrap()).unwrap();
    assert!(matches!(
        open_reader(&descriptor, None),
        Err(SourceError::Open { .. })
    ));
}
