mod overlay;
mod snapshot;

pub use overlay::{encode_jpeg, resolve_timezone, CaptionRenderer};
pub use snapshot::{annotate, SnapshotStore};
