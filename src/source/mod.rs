mod descriptor;
mod frame_source;
mod fresh;
#[cfg(all(target_os = "linux", feature = "gstreamer"))]
mod gstreamer;
mod reader;
#[cfg(test)]
mod tests;

pub use descriptor::SourceDescriptor;
pub use frame_source::FrameSource;
pub use fresh::{FreshFrameProducer, ReadOutcome, ReadPolicy, SourceInterrupt};
#[cfg(all(target_os = "linux", feature = "gstreamer"))]
pub use gstreamer::GstFrameReader;
pub use reader::{open_reader, FrameReader, ImageSequenceReader};
