use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WatchConfig {
    /// Video sources to scan, in scheduling order
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// Label names to track (must exist in the model label file)
    #[serde(default)]
    pub labels: Vec<String>,

    pub model: ModelConfig,
    pub scheduler: SchedulerConfig,
    pub motion: MotionConfig,
    pub output: OutputConfig,
    pub alert: AlertConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SourceConfig {
    /// File path, image directory, device index or stream URL
    pub input: String,

    /// Display name used in logs and the event file (defaults to "Cam <n>")
    #[serde(default)]
    pub name: Option<String>,

    /// Native frame rate override for sources that report none
    #[serde(default)]
    pub fps: Option<f64>,

    /// Per-source loop override
    #[serde(default)]
    pub loop_video: Option<bool>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ModelConfig {
    /// Path to the detection model
    #[serde(default)]
    pub path: String,

    /// Path to the model label file, one label per line
    #[serde(default)]
    pub labels_path: String,

    /// Model input shape as [n, c, h, w]
    #[serde(default = "default_input_shape")]
    pub input_shape: [usize; 4],

    /// Channel order expected by the model
    #[serde(default = "default_channel_order")]
    pub channel_order: ChannelOrder,

    /// Multiplier applied to 0..255 pixel values
    #[serde(default = "default_input_scale")]
    pub input_scale: f32,

    /// Inference backend name
    #[serde(default = "default_backend")]
    pub backend: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SchedulerConfig {
    /// Submission mode (async pipelines two request slots, sync waits per frame)
    #[serde(default = "default_mode")]
    pub mode: SchedulerMode,

    /// Consecutive consistent ticks required to confirm a count change
    #[serde(default = "default_candidate_confidence")]
    pub candidate_confidence: u32,

    /// Minimum detection confidence for a detection to be counted
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,

    /// Maximum time to wait for one inference result
    #[serde(default = "default_inference_timeout_ms")]
    pub inference_timeout_ms: u64,

    /// Bounded wait for push sources; unset means block for a fresh frame
    #[serde(default)]
    pub read_timeout_ms: Option<u64>,

    /// Rewind file sources at end of stream
    #[serde(default = "default_loop_video")]
    pub loop_video: bool,

    /// Frame rate assumed for sources that report none
    #[serde(default = "default_fps")]
    pub default_fps: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MotionConfig {
    /// Skip inference on frames without motion (sync mode only)
    #[serde(default = "default_motion_enabled")]
    pub enabled: bool,

    /// Pixel difference threshold for the motion mask
    #[serde(default = "default_delta_threshold")]
    pub delta_threshold: u8,

    /// Gaussian blur sigma applied before differencing
    #[serde(default = "default_blur_sigma")]
    pub blur_sigma: f32,

    /// Dilation passes applied to the motion mask
    #[serde(default = "default_dilate_iterations")]
    pub dilate_iterations: u32,

    /// Minimum region area (pixels) that counts as motion
    #[serde(default = "default_contour_area")]
    pub contour_minimum_area: u32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct OutputConfig {
    /// Per-source event records written at shutdown
    #[serde(default = "default_event_file")]
    pub event_file: String,

    /// Per-source timeline and totals written at shutdown
    #[serde(default = "default_data_file")]
    pub data_file: String,

    /// Line-oriented intruder log
    #[serde(default = "default_intruder_log")]
    pub intruder_log: String,

    /// Directory for intrusion snapshots
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AlertConfig {
    /// Dispatch alerts for confirmed intrusions
    #[serde(default = "default_alert_enabled")]
    pub enabled: bool,

    /// Endpoint receiving the annotated JPEG; alerts are only logged when unset
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// TrueType font for the alert caption; no caption when unset
    #[serde(default)]
    pub font_path: Option<String>,

    /// Caption font size
    #[serde(default = "default_font_size")]
    pub font_size: f32,

    /// Timezone used for caption timestamps
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Caption prefix
    #[serde(default = "default_caption")]
    pub caption: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerMode {
    Async,
    Sync,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

impl SchedulerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchedulerMode::Async => "async",
            SchedulerMode::Sync => "sync",
        }
    }
}

impl std::str::FromStr for SchedulerMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "async" => Ok(SchedulerMode::Async),
            "sync" => Ok(SchedulerMode::Sync),
            other => Err(format!("unknown scheduler mode '{}'", other)),
        }
    }
}

impl WatchConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("intruder-watch.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let input_shape: Vec<i64> = default_input_shape().iter().map(|v| *v as i64).collect();

        let settings = Config::builder()
            // Start with default values
            .set_default("model.path", "")?
            .set_default("model.labels_path", "")?
            .set_default("model.input_shape", input_shape)?
            .set_default("model.channel_order", "bgr")?
            .set_default("model.input_scale", default_input_scale() as f64)?
            .set_default("model.backend", default_backend())?
            .set_default("scheduler.mode", "async")?
            .set_default(
                "scheduler.candidate_confidence",
                default_candidate_confidence(),
            )?
            .set_default(
                "scheduler.confidence_threshold",
                default_confidence_threshold() as f64,
            )?
            .set_default(
                "scheduler.inference_timeout_ms",
                default_inference_timeout_ms(),
            )?
            .set_default("scheduler.loop_video", default_loop_video())?
            .set_default("scheduler.default_fps", default_fps())?
            .set_default("motion.enabled", default_motion_enabled())?
            .set_default("motion.delta_threshold", default_delta_threshold() as i64)?
            .set_default("motion.blur_sigma", default_blur_sigma() as f64)?
            .set_default("motion.dilate_iterations", default_dilate_iterations())?
            .set_default("motion.contour_minimum_area", default_contour_area())?
            .set_default("output.event_file", default_event_file())?
            .set_default("output.data_file", default_data_file())?
            .set_default("output.intruder_log", default_intruder_log())?
            .set_default("output.snapshot_dir", default_snapshot_dir())?
            .set_default("alert.enabled", default_alert_enabled())?
            .set_default("alert.font_size", default_font_size() as f64)?
            .set_default("alert.timezone", default_timezone())?
            .set_default("alert.caption", default_caption())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Add environment variables with INTRUDER_ prefix
            .add_source(
                Environment::with_prefix("INTRUDER")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: WatchConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sources.is_empty() {
            return Err(ConfigError::Message(
                "No input source found in configuration".to_string(),
            ));
        }

        for source in &self.sources {
            if source.input.trim().is_empty() {
                return Err(ConfigError::Message(
                    "Source input must not be empty".to_string(),
                ));
            }
            if let Some(fps) = source.fps {
                if fps <= 0.0 {
                    return Err(ConfigError::Message(format!(
                        "Source '{}' fps must be greater than 0",
                        source.input
                    )));
                }
            }
        }

        let mut names = std::collections::HashSet::new();
        for index in 0..self.sources.len() {
            let name = self.source_name(index);
            if !names.insert(name.clone()) {
                return Err(ConfigError::Message(format!(
                    "Duplicate source name '{}'",
                    name
                )));
            }
        }

        if self.labels.iter().all(|label| label.trim().is_empty()) {
            return Err(ConfigError::Message(
                "No labels to track. Add at least one label".to_string(),
            ));
        }

        if self.model.path.is_empty() {
            return Err(ConfigError::Message(
                "Model path must be specified".to_string(),
            ));
        }

        if self.model.labels_path.is_empty() {
            return Err(ConfigError::Message(
                "Model labels path must be specified".to_string(),
            ));
        }

        if self.model.input_shape.iter().any(|dim| *dim == 0) {
            return Err(ConfigError::Message(
                "Model input shape dimensions must be greater than 0".to_string(),
            ));
        }

        if self.model.input_shape[1] != 3 {
            return Err(ConfigError::Message(
                "Model input must have 3 channels".to_string(),
            ));
        }

        if self.scheduler.candidate_confidence == 0 {
            return Err(ConfigError::Message(
                "Candidate confidence must be greater than 0".to_string(),
            ));
        }

        if !(self.scheduler.confidence_threshold > 0.0 && self.scheduler.confidence_threshold < 1.0)
        {
            return Err(ConfigError::Message(
                "Confidence threshold must be between 0 and 1".to_string(),
            ));
        }

        if self.scheduler.inference_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Inference timeout must be greater than 0".to_string(),
            ));
        }

        if self.scheduler.default_fps <= 0.0 {
            return Err(ConfigError::Message(
                "Default fps must be greater than 0".to_string(),
            ));
        }

        if self.motion.contour_minimum_area == 0 {
            return Err(ConfigError::Message(
                "Motion contour minimum area must be greater than 0".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Display name for the source at `index`
    pub fn source_name(&self, index: usize) -> String {
        self.sources
            .get(index)
            .and_then(|source| source.name.clone())
            .unwrap_or_else(|| format!("Cam {}", index))
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            labels: Vec::new(),
            model: ModelConfig {
                path: String::new(),
                labels_path: String::new(),
                input_shape: default_input_shape(),
                channel_order: default_channel_order(),
                input_scale: default_input_scale(),
                backend: default_backend(),
            },
            scheduler: SchedulerConfig {
                mode: default_mode(),
                candidate_confidence: default_candidate_confidence(),
                confidence_threshold: default_confidence_threshold(),
                inference_timeout_ms: default_inference_timeout_ms(),
                read_timeout_ms: None,
                loop_video: default_loop_video(),
                default_fps: default_fps(),
            },
            motion: MotionConfig {
                enabled: default_motion_enabled(),
                delta_threshold: default_delta_threshold(),
                blur_sigma: default_blur_sigma(),
                dilate_iterations: default_dilate_iterations(),
                contour_minimum_area: default_contour_area(),
            },
            output: OutputConfig {
                event_file: default_event_file(),
                data_file: default_data_file(),
                intruder_log: default_intruder_log(),
                snapshot_dir: default_snapshot_dir(),
            },
            alert: AlertConfig {
                enabled: default_alert_enabled(),
                webhook_url: None,
                font_path: None,
                font_size: default_font_size(),
                timezone: default_timezone(),
                caption: default_caption(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
            },
        }
    }
}

// Default value functions
fn default_input_shape() -> [usize; 4] {
    [1, 3, 300, 300]
}
fn default_channel_order() -> ChannelOrder {
    ChannelOrder::Bgr
}
fn default_input_scale() -> f32 {
    1.0
}
fn default_backend() -> String {
    "tract".to_string()
}

fn default_mode() -> SchedulerMode {
    SchedulerMode::Async
}
fn default_candidate_confidence() -> u32 {
    5
}
fn default_confidence_threshold() -> f32 {
    0.55
}
fn default_inference_timeout_ms() -> u64 {
    2000
}
fn default_loop_video() -> bool {
    false
}
fn default_fps() -> f64 {
    30.0
}

fn default_motion_enabled() -> bool {
    true
}
fn default_delta_threshold() -> u8 {
    20
}
fn default_blur_sigma() -> f32 {
    1.0
}
fn default_dilate_iterations() -> u32 {
    3
}
fn default_contour_area() -> u32 {
    1000
}

fn default_event_file() -> String {
    "events.json".to_string()
}
fn default_data_file() -> String {
    "data.json".to_string()
}
fn default_intruder_log() -> String {
    "intruders.log".to_string()
}
fn default_snapshot_dir() -> String {
    "output".to_string()
}

fn default_alert_enabled() -> bool {
    true
}
fn default_font_size() -> f32 {
    32.0
}
fn default_timezone() -> String {
    "UTC".to_string()
}
fn default_caption() -> String {
    "Intruder detected at".to_string()
}

fn default_event_bus_capacity() -> usize {
    100
}
