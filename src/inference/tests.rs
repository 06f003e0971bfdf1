use super::*;
use crate::config::WatchConfig;
use crossbeam::channel::{unbounded, Receiver, Sender};
use std::time::Instant;

const SHAPE: [usize; 4] = [1, 3, 4, 4];

fn detection(class_id: usize, confidence: f32) -> Detection {
    Detection {
        class_id,
        confidence,
        bbox: BoundingBox {
            x_min: 0.1,
            y_min: 0.1,
            x_max: 0.5,
            y_max: 0.5,
        },
    }
}

/// Echoes the first tensor value back as the class id
struct EchoDetector;

impl Detector for EchoDetector {
    fn name(&self) -> &str {
        "echo"
    }

    fn input_shape(&self) -> [usize; 4] {
        SHAPE
    }

    fn infer(&mut self, tensor: &Tensor) -> Result<Vec<Detection>, InferenceError> {
        let class_id = tensor.data[0];
        if class_id < 0.0 {
            return Err(InferenceError::Engine {
                details: "negative class".to_string(),
            });
        }
        Ok(vec![detection(class_id as usize, 0.9)])
    }
}

/// Finishes each request only when the test releases it
struct GatedDetector {
    gate: Receiver<()>,
}

impl Detector for GatedDetector {
    fn name(&self) -> &str {
        "gated"
    }

    fn input_shape(&self) -> [usize; 4] {
        SHAPE
    }

    fn infer(&mut self, tensor: &Tensor) -> Result<Vec<Detection>, InferenceError> {
        let _ = self.gate.recv();
        Ok(vec![detection(tensor.data[0] as usize, 0.8)])
    }
}

fn tensor_with(value: f32) -> Tensor {
    let mut tensor = Tensor::zeros(SHAPE);
    tensor.data[0] = value;
    tensor
}

fn gated_gateway() -> (ThreadedGateway, Sender<()>) {
    let (release, gate) = unbounded();
    let gateway = ThreadedGateway::spawn(GatedDetector { gate }).unwrap();
    (gateway, release)
}

#[test]
fn test_slot_rotation() {
    assert_eq!(RequestSlot::A.other(), RequestSlot::B);
    assert_eq!(RequestSlot::B.other(), RequestSlot::A);
    assert_ne!(RequestSlot::A.index(), RequestSlot::B.index());
}

#[test]
fn test_submit_and_wait() {
    let mut gateway = ThreadedGateway::spawn(EchoDetector).unwrap();
    assert_eq!(gateway.input_shape(), SHAPE);

    gateway.submit(RequestSlot::A, tensor_with(15.0)).unwrap();
    assert!(gateway.is_busy(RequestSlot::A));
    let detections = gateway
        .wait(RequestSlot::A, Duration::from_secs(5))
        .unwrap();

    assert_eq!(detections, vec![detection(15, 0.9)]);
    assert!(!gateway.is_busy(RequestSlot::A));
}

#[test]
fn test_slots_are_independent() {
    let mut gateway = ThreadedGateway::spawn(EchoDetector).unwrap();
    gateway.submit(RequestSlot::A, tensor_with(1.0)).unwrap();
    gateway.submit(RequestSlot::B, tensor_with(2.0)).unwrap();

    let b = gateway.wait(RequestSlot::B, Duration::from_secs(5)).unwrap();
    let a = gateway.wait(RequestSlot::A, Duration::from_secs(5)).unwrap();
    assert_eq!(a[0].class_id, 1);
    assert_eq!(b[0].class_id, 2);
}

#[test]
fn test_busy_slot_rejects_second_request() {
    let (mut gateway, release) = gated_gateway();
    gateway.submit(RequestSlot::A, tensor_with(1.0)).unwrap();

    assert!(matches!(
        gateway.submit(RequestSlot::A, tensor_with(2.0)),
        Err(InferenceError::SlotBusy { slot: "A" })
    ));

    release.send(()).unwrap();
    gateway.wait(RequestSlot::A, Duration::from_secs(5)).unwrap();
}

#[test]
fn test_poll_reports_progress() {
    let (mut gateway, release) = gated_gateway();
    assert!(matches!(gateway.poll(RequestSlot::B), SlotStatus::Idle));

    gateway.submit(RequestSlot::B, tensor_with(3.0)).unwrap();
    assert!(matches!(gateway.poll(RequestSlot::B), SlotStatus::Pending));

    release.send(()).unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    let detections = loop {
        match gateway.poll(RequestSlot::B) {
            SlotStatus::Ready(detections) => break detections,
            SlotStatus::Pending if Instant::now() < deadline => {
                std::thread::sleep(Duration::from_millis(1))
            }
            other => panic!("unexpected slot status {:?}", other),
        }
    };

    assert_eq!(detections[0].class_id, 3);
    assert!(matches!(gateway.poll(RequestSlot::B), SlotStatus::Idle));
}

#[test]
fn test_timeout_abandons_slot() {
    let (mut gateway, release) = gated_gateway();
    gateway.submit(RequestSlot::A, tensor_with(1.0)).unwrap();

    assert!(matches!(
        gateway.wait(RequestSlot::A, Duration::from_millis(20)),
        Err(InferenceError::Timeout { timeout_ms: 20 })
    ));
    assert!(!gateway.is_busy(RequestSlot::A));

    // The abandoned request still occupies the worker until released
    release.send(()).unwrap();
    gateway.submit(RequestSlot::A, tensor_with(4.0)).unwrap();
    release.send(()).unwrap();
    let detections = gateway.wait(RequestSlot::A, Duration::from_secs(5)).unwrap();
    assert_eq!(detections[0].class_id, 4);
}

#[test]
fn test_engine_failure_is_reported() {
    let mut gateway = ThreadedGateway::spawn(EchoDetector).unwrap();
    gateway.submit(RequestSlot::A, tensor_with(-1.0)).unwrap();
    assert!(matches!(
        gateway.wait(RequestSlot::A, Duration::from_secs(5)),
        Err(InferenceError::Engine { .. })
    ));
}

#[test]
fn test_shape_mismatch_and_idle_wait() {
    let mut gateway = ThreadedGateway::spawn(EchoDetector).unwrap();
    assert!(matches!(
        gateway.submit(RequestSlot::A, Tensor::zeros([1, 3, 8, 8])),
        Err(InferenceError::ShapeMismatch { .. })
    ));
    assert!(matches!(
        gateway.wait(RequestSlot::A, Duration::from_millis(10)),
        Err(InferenceError::SlotIdle { slot: "A" })
    ));
}

#[test]
fn test_boxed_detector_runs_in_gateway() {
    let detector: Box<dyn Detector> = Box::new(EchoDetector);
    let mut gateway = ThreadedGateway::spawn(detector).unwrap();
    gateway.submit(RequestSlot::B, tensor_with(9.0)).unwrap();
    let detections = gateway.wait(RequestSlot::B, Duration::from_secs(5)).unwrap();
    assert_eq!(detections[0].class_id, 9);
}

#[test]
fn test_unknown_backend_fails_initialization() {
    let mut config = WatchConfig::default();
    config.model.backend = "openvino".to_string();
    assert!(matches!(
        create_detector(&config.model),
        Err(InferenceError::Initialization { .. })
    ));
}

#[cfg(feature = "backend-tract")]
#[test]
fn test_missing_model_fails_initialization() {
    let mut config = WatchConfig::default();
    config.model.path = "/nonexistent/model.onnx".to_string();
    assert!(matches!(
        create_detector(&config.model),
        Err(InferenceError::Initialization { .. })
    ));
}

#[test]
fn test_bbox_to_pixels() {
    let bbox = BoundingBox {
        x_min: 0.25,
        y_min: -0.5,
        x_max: 0.75,
        y_max: 0.5,
    };
    assert_eq!(bbox.to_pixels(200, 100), (50, 0, 100, 50));
}
