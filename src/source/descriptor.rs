use crate::error::SourceError;
use std::fmt;
use std::path::PathBuf;

/// Where a source's frames come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceDescriptor {
    /// Local capture device by index (e.g. /dev/video0)
    Device(u32),
    /// Network stream URL (rtsp://, http://, ...)
    Network(String),
    /// Video file, still image or directory of images
    File(PathBuf),
}

impl SourceDescriptor {
    /// Classify a configured input string
    pub fn parse(input: &str) -> Result<Self, SourceError> {
        let input = input.trim();

        if !input.is_empty() && input.chars().all(|c| c.is_ascii_digit()) {
            let index = input.parse::<u32>().map_err(|e| SourceError::Unsupported {
                input: input.to_string(),
                details: e.to_string(),
            })?;
            return Ok(SourceDescriptor::Device(index));
        }

        if input.contains("://") {
            return Ok(SourceDescriptor::Network(input.to_string()));
        }

        let path = PathBuf::from(input);
        if !path.exists() {
            return Err(SourceError::NotFound {
                input: input.to_string(),
            });
        }

        Ok(SourceDescriptor::File(path))
    }

    /// Live sources produce frames in real time and are never rewound
    pub fn is_live(&self) -> bool {
        !matches!(self, SourceDescriptor::File(_))
    }

    /// Push sources are read by a background producer thread
    pub fn is_push(&self) -> bool {
        matches!(self, SourceDescriptor::Network(_))
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceDescriptor::Device(index) => write!(f, "device {}", index),
            SourceDescriptor::Network(url) => write!(f, "{}", url),
            SourceDescriptor::File(path) => write!(f, "{}", path.display()),
        }
    }
}
