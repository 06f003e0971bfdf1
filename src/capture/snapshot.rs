use crate::error::PersistenceError;
use crate::inference::Detection;
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::path::PathBuf;
use tracing::debug;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

/// Copy of `image` with a green box around each detection
pub fn annotate(image: &RgbImage, detections: &[Detection]) -> RgbImage {
    let mut annotated = image.clone();
    let (width, height) = annotated.dimensions();

    for detection in detections {
        let (x, y, w, h) = detection.bbox.to_pixels(width, height);
        draw_hollow_rect_mut(&mut annotated, Rect::at(x, y).of_size(w, h), BOX_COLOR);
        // Second, inset rectangle for a 2px outline
        if w > 2 && h > 2 {
            draw_hollow_rect_mut(
                &mut annotated,
                Rect::at(x + 1, y + 1).of_size(w - 2, h - 2),
                BOX_COLOR,
            );
        }
    }

    annotated
}

/// Writes `intruder_<total>.png` snapshots of triggering frames
///
/// With several sources each one gets its own subdirectory, since totals are
/// counted per source.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
    per_source: bool,
}

impl SnapshotStore {
    pub fn new<P: Into<PathBuf>>(dir: P, per_source: bool) -> Result<Self, PersistenceError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| PersistenceError::Snapshot {
            path: dir.display().to_string(),
            details: e.to_string(),
        })?;
        Ok(Self { dir, per_source })
    }

    pub fn path_for(&self, source_name: &str, total: u32) -> PathBuf {
        let file = format!("intruder_{}.png", total);
        if self.per_source {
            self.dir.join(sanitize(source_name)).join(file)
        } else {
            self.dir.join(file)
        }
    }

    /// Annotate and save one snapshot, returning its path
    pub fn save(
        &self,
        source_name: &str,
        total: u32,
        image: &RgbImage,
        detections: &[Detection],
    ) -> Result<PathBuf, PersistenceError> {
        let path = self.path_for(source_name, total);
        let snapshot_error = |details: String| PersistenceError::Snapshot {
            path: path.display().to_string(),
            details,
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| snapshot_error(e.to_string()))?;
        }

        annotate(image, detections)
            .save_with_format(&path, ImageFormat::Png)
            .map_err(|e| snapshot_error(e.to_string()))?;

        debug!("Saved snapshot {}", path.display());
        Ok(path)
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::BoundingBox;

    fn detection() -> Detection {
        Detection {
            class_id: 1,
            confidence: 0.9,
            bbox: BoundingBox {
                x_min: 0.25,
                y_min: 0.25,
                x_max: 0.75,
                y_max: 0.75,
            },
        }
    }

    #[test]
    fn test_annotate_draws_box_outline() {
        let image = RgbImage::new(40, 40);
        let annotated = annotate(&image, &[detection()]);

        assert_eq!(*annotated.get_pixel(10, 10), BOX_COLOR);
        assert_eq!(*annotated.get_pixel(11, 20), BOX_COLOR);
        assert_eq!(*annotated.get_pixel(20, 20), Rgb([0, 0, 0]));
        // The source frame is left untouched
        assert_eq!(*image.get_pixel(10, 10), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_snapshot_naming() {
        let dir = tempfile::tempdir().unwrap();
        let single = SnapshotStore::new(dir.path(), false).unwrap();
        assert_eq!(single.path_for("Cam 0", 3), dir.path().join("intruder_3.png"));

        let multi = SnapshotStore::new(dir.path(), true).unwrap();
        assert_eq!(
            multi.path_for("Cam 0", 3),
            dir.path().join("Cam_0").join("intruder_3.png")
        );
    }

    #[test]
    fn test_save_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::new(dir.path().join("output"), true).unwrap();

        let path = store
            .save("Front", 2, &RgbImage::new(32, 24), &[detection()])
            .unwrap();

        assert!(path.exists());
        let saved = image::open(&path).unwrap().to_rgb8();
        assert_eq!(saved.dimensions(), (32, 24));
        assert_eq!(*saved.get_pixel(8, 6), BOX_COLOR);
    }
}
