use crate::error::SourceError;
use crate::source::{FrameReader, SourceDescriptor};
use gstreamer::prelude::*;
use gstreamer::Pipeline;
use gstreamer_app::AppSink;
use gstreamer_video::VideoInfo;
use image::RgbImage;
use tracing::{debug, info, warn};

const PULL_TIMEOUT_MS: u64 = 5000;

/// GStreamer decoder for video files, V4L2 devices and network streams
pub struct GstFrameReader {
    input: String,
    pipeline: Pipeline,
    appsink: AppSink,
    pending: Option<RgbImage>,
    fps: Option<f64>,
    dimensions: (u32, u32),
    frame_count: Option<u64>,
    released: bool,
}

impl GstFrameReader {
    pub fn open(descriptor: &SourceDescriptor) -> Result<Self, SourceError> {
        let input = descriptor.to_string();

        gstreamer::init().map_err(|e| SourceError::Open {
            input: input.clone(),
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;

        let pipeline_desc = Self::build_pipeline_string(descriptor)?;
        info!("Creating GStreamer pipeline: {}", pipeline_desc);

        let pipeline = gstreamer::parse::launch(&pipeline_desc)
            .map_err(|e| SourceError::Open {
                input: input.clone(),
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| SourceError::Open {
                input: input.clone(),
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| SourceError::Open {
                input: input.clone(),
                details: "Failed to get appsink element".to_string(),
            })?
            .downcast::<AppSink>()
            .map_err(|_| SourceError::Open {
                input: input.clone(),
                details: "Failed to downcast to AppSink".to_string(),
            })?;

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| SourceError::Open {
                input: input.clone(),
                details: format!("Failed to start pipeline: {}", e),
            })?;

        let mut reader = Self {
            input,
            pipeline,
            appsink,
            pending: None,
            fps: None,
            dimensions: (0, 0),
            frame_count: None,
            released: false,
        };

        // The first sample carries the negotiated caps
        let (first, info) = reader.pull().map_err(|e| SourceError::Open {
            input: reader.input.clone(),
            details: e.to_string(),
        })?;

        let fps = info.fps();
        if fps.numer() > 0 && fps.denom() > 0 {
            reader.fps = Some(fps.numer() as f64 / fps.denom() as f64);
        }
        reader.dimensions = (info.width(), info.height());
        reader.frame_count = match (
            reader.pipeline.query_duration::<gstreamer::ClockTime>(),
            reader.fps,
        ) {
            (Some(duration), Some(fps)) => {
                Some((duration.nseconds() as f64 / 1e9 * fps).round() as u64)
            }
            _ => None,
        };
        reader.pending = Some(first);

        info!(
            "Opened {} ({}x{} @ {:?}fps)",
            reader.input, reader.dimensions.0, reader.dimensions.1, reader.fps
        );
        Ok(reader)
    }

    fn build_pipeline_string(descriptor: &SourceDescriptor) -> Result<String, SourceError> {
        let convert = "videoconvert ! video/x-raw,format=RGB";
        let pipeline = match descriptor {
            SourceDescriptor::Device(index) => format!(
                "v4l2src device=/dev/video{} ! {} ! \
                 appsink name=sink sync=false max-buffers=2 drop=true",
                index, convert
            ),
            SourceDescriptor::Network(url) => format!(
                "uridecodebin uri={} ! {} ! \
                 appsink name=sink sync=false max-buffers=2 drop=true",
                url, convert
            ),
            SourceDescriptor::File(path) => {
                let absolute = path.canonicalize().map_err(|e| SourceError::Open {
                    input: path.display().to_string(),
                    details: e.to_string(),
                })?;
                format!(
                    "uridecodebin uri=file://{} ! {} ! \
                     appsink name=sink sync=false max-buffers=4 drop=false",
                    absolute.display(),
                    convert
                )
            }
        };
        Ok(pipeline)
    }

    fn pull(&mut self) -> Result<(RgbImage, VideoInfo), SourceError> {
        let timeout = gstreamer::ClockTime::from_mseconds(PULL_TIMEOUT_MS);
        let sample = match self.appsink.try_pull_sample(timeout) {
            Some(sample) => sample,
            None if self.appsink.is_eos() => {
                return Err(SourceError::Read {
                    details: "end of stream".to_string(),
                })
            }
            None => {
                return Err(SourceError::Read {
                    details: format!("no frame within {}ms", PULL_TIMEOUT_MS),
                })
            }
        };

        let caps = sample.caps().ok_or_else(|| SourceError::Read {
            details: "sample without caps".to_string(),
        })?;
        let info = VideoInfo::from_caps(caps).map_err(|e| SourceError::Read {
            details: format!("invalid caps: {}", e),
        })?;
        let buffer = sample.buffer().ok_or_else(|| SourceError::Read {
            details: "sample without buffer".to_string(),
        })?;
        let map = buffer.map_readable().map_err(|e| SourceError::Read {
            details: format!("failed to map buffer: {}", e),
        })?;

        let (width, height) = (info.width(), info.height());
        let stride = info.stride()[0] as usize;
        let row_len = width as usize * 3;
        let data = map.as_slice();

        let mut pixels = Vec::with_capacity(row_len * height as usize);
        for row in 0..height as usize {
            let start = row * stride;
            let end = start + row_len;
            let slice = data.get(start..end).ok_or_else(|| SourceError::Read {
                details: "buffer shorter than frame".to_string(),
            })?;
            pixels.extend_from_slice(slice);
        }

        let image = RgbImage::from_raw(width, height, pixels).ok_or_else(|| SourceError::Read {
            details: "failed to build RGB image".to_string(),
        })?;

        Ok((image, info))
    }
}

impl FrameReader for GstFrameReader {
    fn read(&mut self) -> Result<Option<RgbImage>, SourceError> {
        if self.released {
            return Ok(None);
        }
        if let Some(frame) = self.pending.take() {
            return Ok(Some(frame));
        }

        match self.pull() {
            Ok((frame, _)) => Ok(Some(frame)),
            Err(_) if self.appsink.is_eos() => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn fps(&self) -> Option<f64> {
        self.fps
    }

    fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    fn frame_count(&self) -> Option<u64> {
        self.frame_count
    }

    fn rewind(&mut self) -> Result<(), SourceError> {
        debug!("Rewinding {}", self.input);
        self.pending = None;
        self.pipeline
            .seek_simple(
                gstreamer::SeekFlags::FLUSH | gstreamer::SeekFlags::KEY_UNIT,
                gstreamer::ClockTime::ZERO,
            )
            .map_err(|e| SourceError::Rewind {
                details: e.to_string(),
            })
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            warn!("Failed to stop GStreamer pipeline cleanly: {}", e);
        }
        self.released = true;
        debug!("Released decoder for {}", self.input);
    }
}

impl Drop for GstFrameReader {
    fn drop(&mut self) {
        self.release();
    }
}
