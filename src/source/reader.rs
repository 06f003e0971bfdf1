use crate::error::SourceError;
use crate::source::SourceDescriptor;
use image::RgbImage;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Decoder collaborator behind a frame source
pub trait FrameReader: Send {
    /// Decode the next frame; `None` means the stream has no more data
    fn read(&mut self) -> Result<Option<RgbImage>, SourceError>;

    /// Native frame rate, if the container reports one
    fn fps(&self) -> Option<f64>;

    fn dimensions(&self) -> (u32, u32);

    /// Total number of frames, if known
    fn frame_count(&self) -> Option<u64>;

    /// Seek back to the first frame
    fn rewind(&mut self) -> Result<(), SourceError>;

    /// Release the decoder handle; reads after this yield no data
    fn release(&mut self);
}

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "ppm", "pgm", "tif", "tiff"];

pub(crate) fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Plays a directory of still images (or a single image) as a video
pub struct ImageSequenceReader {
    paths: Vec<PathBuf>,
    position: usize,
    fps: Option<f64>,
    dimensions: (u32, u32),
    released: bool,
}

impl ImageSequenceReader {
    /// Open a directory of images, ordered by file name
    pub fn open_dir<P: AsRef<Path>>(dir: P, fps: Option<f64>) -> Result<Self, SourceError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|e| SourceError::Open {
            input: dir.display().to_string(),
            details: e.to_string(),
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_image_path(path))
            .collect();
        paths.sort();

        Self::from_paths(dir, paths, fps)
    }

    /// Open a single still image as a one-frame stream
    pub fn open_image<P: AsRef<Path>>(path: P, fps: Option<f64>) -> Result<Self, SourceError> {
        let path = path.as_ref();
        Self::from_paths(path, vec![path.to_path_buf()], fps)
    }

    fn from_paths(input: &Path, paths: Vec<PathBuf>, fps: Option<f64>) -> Result<Self, SourceError> {
        let first = paths.first().ok_or_else(|| SourceError::Open {
            input: input.display().to_string(),
            details: "no images found".to_string(),
        })?;

        let dimensions = image::image_dimensions(first).map_err(|e| SourceError::Open {
            input: first.display().to_string(),
            details: e.to_string(),
        })?;

        info!(
            "Opened image sequence {} ({} frames, {}x{})",
            input.display(),
            paths.len(),
            dimensions.0,
            dimensions.1
        );

        Ok(Self {
            paths,
            position: 0,
            fps,
            dimensions,
            released: false,
        })
    }
}

impl FrameReader for ImageSequenceReader {
    fn read(&mut self) -> Result<Option<RgbImage>, SourceError> {
        if self.released {
            return Ok(None);
        }

        let Some(path) = self.paths.get(self.position) else {
            return Ok(None);
        };

        let image = image::open(path).map_err(|e| SourceError::Read {
            details: format!("{}: {}", path.display(), e),
        })?;
        self.position += 1;

        Ok(Some(image.to_rgb8()))
    }

    fn fps(&self) -> Option<f64> {
        self.fps
    }

    fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    fn frame_count(&self) -> Option<u64> {
        Some(self.paths.len() as u64)
    }

    fn rewind(&mut self) -> Result<(), SourceError> {
        debug!("Rewinding image sequence");
        self.position = 0;
        Ok(())
    }

    fn release(&mut self) {
        self.released = true;
    }
}

/// Open the decoder for a descriptor
pub fn open_reader(
    descriptor: &SourceDescriptor,
    fps: Option<f64>,
) -> Result<Box<dyn FrameReader>, SourceError> {
    match descriptor {
        SourceDescriptor::File(path) if path.is_dir() => {
            Ok(Box::new(ImageSequenceReader::open_dir(path, fps)?))
        }
        SourceDescriptor::File(path) if is_image_path(path) => {
            Ok(Box::new(ImageSequenceReader::open_image(path, fps)?))
        }
        #[cfg(all(target_os = "linux", feature = "gstreamer"))]
        _ => Ok(Box::new(super::gstreamer::GstFrameReader::open(descriptor)?)),
        #[cfg(not(all(target_os = "linux", feature = "gstreamer")))]
        other => Err(SourceError::Unsupported {
            input: other.to_string(),
            details: "video decoding requires the gstreamer feature".to_string(),
        }),
    }
}
