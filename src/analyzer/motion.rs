use crate::config::MotionConfig;

use image::{imageops::FilterType, GrayImage, ImageBuffer, Luma, RgbImage};
use imageproc::{
    contrast::threshold,
    distance_transform::Norm,
    filter::gaussian_blur_f32,
    morphology::dilate,
    region_labelling::{connected_components, Connectivity},
};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Frame-differencing pre-filter used to skip inference on still frames
pub struct MotionFilter {
    config: MotionConfig,
    resolution: (u32, u32),
    previous: Option<GrayImage>,
    pub(crate) frame_count: u64,
}

impl MotionFilter {
    /// `resolution` is the (width, height) frames are compared at
    pub fn new(config: MotionConfig, resolution: (u32, u32)) -> Self {
        Self {
            config,
            resolution,
            previous: None,
            frame_count: 0,
        }
    }

    /// Count motion regions against the previous frame and keep this one as reference
    ///
    /// The first frame has nothing to compare against and reports no motion.
    pub fn count_regions(&mut self, frame: &RgbImage) -> usize {
        let gray = self.to_gray(frame);
        self.frame_count += 1;

        let Some(previous) = self.previous.replace(gray) else {
            debug!("Motion filter initialized with first frame");
            return 0;
        };
        let Some(current) = self.previous.as_ref() else {
            return 0;
        };

        let diff = Self::frame_difference(&previous, current);

        let blurred = if self.config.blur_sigma > 0.0 {
            gaussian_blur_f32(&diff, self.config.blur_sigma)
        } else {
            diff
        };

        let mut mask = threshold(&blurred, self.config.delta_threshold);
        for _ in 0..self.config.dilate_iterations {
            mask = dilate(&mask, Norm::LInf, 1);
        }

        let components = connected_components(&mask, Connectivity::Eight, Luma([0u8]));
        let regions = self.count_large_components(&components);

        trace!(
            "Frame {}: {} motion regions of at least {} pixels",
            self.frame_count,
            regions,
            self.config.contour_minimum_area
        );
        regions
    }

    fn to_gray(&self, frame: &RgbImage) -> GrayImage {
        let (width, height) = self.resolution;
        let gray = image::imageops::grayscale(frame);
        if gray.dimensions() == (width, height) {
            gray
        } else {
            image::imageops::resize(&gray, width, height, FilterType::Triangle)
        }
    }

    fn frame_difference(previous: &GrayImage, current: &GrayImage) -> GrayImage {
        let (width, height) = current.dimensions();
        let mut diff_image = GrayImage::new(width, height);

        for (x, y, curr_pixel) in current.enumerate_pixels() {
            if let Some(prev_pixel) = previous.get_pixel_checked(x, y) {
                let diff = (prev_pixel[0] as i16 - curr_pixel[0] as i16).unsigned_abs() as u8;
                diff_image.put_pixel(x, y, Luma([diff]));
            }
        }

        diff_image
    }

    fn count_large_components(&self, components: &ImageBuffer<Luma<u32>, Vec<u32>>) -> usize {
        let mut areas: HashMap<u32, u32> = HashMap::new();

        for pixel in components.pixels() {
            let component_id = pixel[0];
            if component_id > 0 {
                *areas.entry(component_id).or_insert(0) += 1;
            }
        }

        areas
            .values()
            .filter(|area| **area >= self.config.contour_minimum_area)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn test_config() -> MotionConfig {
        MotionConfig {
            enabled: true,
            delta_threshold: 20,
            blur_sigma: 1.0,
            dilate_iterations: 3,
            contour_minimum_area: 100,
        }
    }

    fn background() -> RgbImage {
        RgbImage::from_pixel(120, 80, Rgb([40, 40, 40]))
    }

    fn with_square(mut image: RgbImage, x0: u32, y0: u32, size: u32) -> RgbImage {
        for y in y0..y0 + size {
            for x in x0..x0 + size {
                image.put_pixel(x, y, Rgb([230, 230, 230]));
            }
        }
        image
    }

    #[test]
    fn test_first_frame_has_no_motion() {
        let mut filter = MotionFilter::new(test_config(), (120, 80));
        assert_eq!(filter.count_regions(&background()), 0);
        assert_eq!(filter.frame_count, 1);
    }

    #[test]
    fn test_still_frames_have_no_motion() {
        let mut filter = MotionFilter::new(test_config(), (120, 80));
        filter.count_regions(&background());
        assert_eq!(filter.count_regions(&background()), 0);
    }

    #[test]
    fn test_separate_objects_are_counted() {
        let mut filter = MotionFilter::new(test_config(), (120, 80));
        filter.count_regions(&background());

        let frame = with_square(with_square(background(), 5, 5, 20), 80, 40, 20);
        assert_eq!(filter.count_regions(&frame), 2);
    }

    #[test]
    fn test_small_changes_are_ignored() {
        let mut filter = MotionFilter::new(test_config(), (120, 80));
        filter.count_regions(&background());

        // A single changed pixel dilates to 7x7
        let frame = with_square(background(), 50, 30, 1);
        assert_eq!(filter.count_regions(&frame), 0);
    }

    #[test]
    fn test_frames_are_compared_at_filter_resolution() {
        let mut filter = MotionFilter::new(test_config(), (60, 40));
        filter.count_regions(&background());

        let frame = with_square(background(), 20, 20, 40);
        assert_eq!(filter.count_regions(&frame), 1);
        assert_eq!(filter.count_regions(&frame), 0);
    }
}
