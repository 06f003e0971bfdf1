use crate::config::AlertConfig;
use crate::error::{AlertError, Result, WatchError};
use chrono::{DateTime, Local};
use chrono_tz::Tz;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_text_mut, text_size};
use rusttype::{Font, Scale};
use std::io::Cursor;
use tracing::{debug, warn};

/// Resolve configured timezone, falling back to UTC on parse errors
pub fn resolve_timezone(tz_name: &str) -> Tz {
    match tz_name.parse::<Tz>() {
        Ok(tz) => tz,
        Err(_) => {
            warn!("Invalid caption timezone '{}', falling back to UTC", tz_name);
            chrono_tz::UTC
        }
    }
}

/// Draws the timestamped caption on alert images
pub struct CaptionRenderer {
    font: Option<Font<'static>>,
    font_size: f32,
    timezone: Tz,
    caption: String,
}

impl CaptionRenderer {
    /// Load the caption font; a configured but unreadable font is a missing resource
    pub fn from_config(config: &AlertConfig) -> Result<Self> {
        let font = match &config.font_path {
            Some(path) => {
                let data = std::fs::read(path).map_err(|e| {
                    WatchError::missing_resource(format!("font '{}'", path), e.to_string())
                })?;
                let font = Font::try_from_vec(data).ok_or_else(|| {
                    WatchError::invalid_config(format!("Failed to parse font file '{}'", path))
                })?;
                Some(font)
            }
            None => None,
        };

        Ok(Self {
            font,
            font_size: config.font_size,
            timezone: resolve_timezone(&config.timezone),
            caption: config.caption.clone(),
        })
    }

    /// Renderer that only produces caption text
    pub fn plain(caption: &str, timezone: Tz) -> Self {
        Self {
            font: None,
            font_size: 0.0,
            timezone,
            caption: caption.to_string(),
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    pub fn caption_text(&self, timestamp: DateTime<Local>) -> String {
        let local = timestamp.with_timezone(&self.timezone);
        format!("{} {}", self.caption, local.format("%Y-%m-%d %H:%M:%S %Z"))
    }

    /// Copy of `image` with the caption in the bottom-left corner
    pub fn render(&self, image: &RgbImage, timestamp: DateTime<Local>) -> RgbImage {
        let mut img = image.clone();
        let Some(font) = &self.font else {
            return img;
        };

        let text = self.caption_text(timestamp);
        let scale = Scale::uniform(self.font_size);

        let x: u32 = 10;
        let y: u32 = img.height().saturating_sub((self.font_size * 1.5) as u32);

        let (text_width, text_height) = text_size(scale, font, &text);

        // Darken the area behind the text
        for dy in 0..(text_height.max(0) as u32 + 10) {
            for dx in 0..(text_width.max(0) as u32 + 10) {
                let px = x.saturating_sub(5) + dx;
                let py = y.saturating_sub(5) + dy;
                if px < img.width() && py < img.height() {
                    let pixel = img.get_pixel(px, py);
                    img.put_pixel(px, py, Rgb([pixel[0] / 3, pixel[1] / 3, pixel[2] / 3]));
                }
            }
        }

        draw_text_mut(
            &mut img,
            Rgb([255, 255, 255]),
            x as i32,
            y as i32,
            scale,
            font,
            &text,
        );

        debug!("Added caption: {} (size: {})", text, self.font_size);
        img
    }
}

pub fn encode_jpeg(image: &RgbImage) -> std::result::Result<Vec<u8>, AlertError> {
    let mut output = Vec::new();
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut Cursor::new(&mut output), ImageFormat::Jpeg)
        .map_err(|e| AlertError::Render {
            details: format!("Failed to encode JPEG: {}", e),
        })?;
    Ok(output)
}
