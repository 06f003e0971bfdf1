use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// A confirmed intrusion, one per newly appeared object
///
/// Events are created only by the event detector and never change afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "time")]
    timestamp: DateTime<Local>,
    #[serde(rename = "content")]
    label: String,
    #[serde(rename = "total")]
    cumulative_total: u32,
    frame_index: u64,
    /// Playback position in seconds (frame index / source fps)
    video_time: f64,
}

impl Event {
    pub(crate) fn new(
        timestamp: DateTime<Local>,
        label: &str,
        cumulative_total: u32,
        frame_index: u64,
        fps: f64,
    ) -> Self {
        let video_time = if fps > 0.0 {
            frame_index as f64 / fps
        } else {
            0.0
        };

        Self {
            timestamp,
            label: label.to_string(),
            cumulative_total,
            frame_index,
            video_time,
        }
    }

    pub fn timestamp(&self) -> DateTime<Local> {
        self.timestamp
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Sum of confirmed increases across all labels of the source when this event fired
    pub fn cumulative_total(&self) -> u32 {
        self.cumulative_total
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    pub fn video_time(&self) -> f64 {
        self.video_time
    }

    /// Intruder log line, e.g. `12:03:44 - Intruder person detected on Cam 0`
    pub fn log_line(&self, source_name: &str) -> String {
        format!(
            "{} - Intruder {} detected on {}",
            self.timestamp.format("%H:%M:%S"),
            self.label,
            source_name
        )
    }
}
