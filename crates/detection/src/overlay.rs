//! Frame annotation

use ab_glyph::{FontArc, PxScale};
use camera_capture::VideoFrame;
use image::{Rgb, RgbImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut,
};
use imageproc::rect::Rect;
use std::path::Path;
use tracing::{info, warn};

use crate::config::OverlayConfig;
use crate::glyphs::{draw_bitmap_text, GLYPH_HEIGHT};
use crate::landmarks::{EyePair, Rect as Region};
use crate::DetectionError;

pub const RED: Rgb<u8> = Rgb([255, 0, 0]);
pub const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
pub const BLUE: Rgb<u8> = Rgb([0, 0, 255]);
pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const BAR_BACKGROUND: Rgb<u8> = Rgb([50, 50, 50]);
const THRESHOLD_MARK: Rgb<u8> = Rgb([0, 255, 255]);

const BAR_WIDTH: u32 = 200;
const BAR_HEIGHT: u32 = 10;
/// EAR that fills the bar completely
const BAR_FULL_SCALE: f64 = 0.5;

/// Values shown on every output frame
#[derive(Debug, Clone, Copy)]
pub struct OverlayInfo {
    pub ear: f64,
    pub alert_count: u32,
    /// Last sample was below threshold
    pub eyes_closed: bool,
    /// An alert is in effect for the current run
    pub alerting: bool,
}

/// Outline fonts tried in order when none is configured
pub const SYSTEM_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/noto/NotoSans-Regular.ttf",
    "/Library/Fonts/Arial.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

/// How overlay text gets drawn
enum TextFace {
    Outline(FontArc),
    /// Built-in dot font, used when no outline font can be loaded
    Bitmap,
}

/// Draws EAR readouts, status and the threshold bar
pub struct OverlayRenderer {
    text: Option<TextFace>,
    scale: f32,
    threshold: f64,
}

fn load_font(path: &str) -> Result<FontArc, DetectionError> {
    let bytes = std::fs::read(path).map_err(|e| DetectionError::Font(format!("{}: {}", path, e)))?;
    FontArc::try_from_vec(bytes).map_err(|e| DetectionError::Font(format!("{}: {}", path, e)))
}

fn discover_system_font() -> Option<(&'static str, FontArc)> {
    SYSTEM_FONT_PATHS
        .iter()
        .filter(|path| Path::new(path).is_file())
        .find_map(|path| load_font(path).ok().map(|font| (*path, font)))
}

impl OverlayRenderer {
    /// A configured font must load. Otherwise system fonts are tried, then
    /// the built-in bitmap font.
    pub fn new(config: &OverlayConfig, threshold: f64) -> Result<Self, DetectionError> {
        let face = match &config.font_path {
            Some(path) => {
                let font = load_font(path)?;
                info!("Loaded overlay font from {}", path);
                TextFace::Outline(font)
            }
            None => match config.system_fonts.then(discover_system_font).flatten() {
                Some((path, font)) => {
                    info!("Using system font {} for overlay text", path);
                    TextFace::Outline(font)
                }
                None => {
                    warn!("No outline font found, overlay text uses the built-in bitmap font");
                    TextFace::Bitmap
                }
            },
        };
        Ok(Self {
            text: Some(face),
            scale: config.text_scale,
            threshold,
        })
    }

    /// Renderer without text
    pub fn bars_only(threshold: f64) -> Self {
        Self {
            text: None,
            scale: 20.0,
            threshold,
        }
    }

    pub fn render(&self, frame: &mut VideoFrame, info: &OverlayInfo) {
        frame.with_image_mut(|img| {
            if self.text.is_some() {
                let status_color = if info.eyes_closed { RED } else { GREEN };
                self.label(img, GREEN, 10, 10, 1.0, &format!("EAR: {:.2}", info.ear));
                self.label(img, GREEN, 10, 40, 1.0, &format!("Alerts: {}", info.alert_count));
                let status = if info.eyes_closed { "Status: DROWSY" } else { "Status: ALERT" };
                self.label(img, status_color, 10, 70, 1.0, status);

                if info.alerting {
                    let h = img.height() as i32;
                    self.label(img, RED, 10, h - 90, 1.5, "DROWSINESS ALERT!");
                    self.label(img, RED, 10, h - 50, 1.5, "Wake Up!");
                }
            }
            self.draw_ear_bar(img, info.ear);
        });
    }

    fn label(&self, img: &mut RgbImage, color: Rgb<u8>, x: i32, y: i32, size: f32, text: &str) {
        let px = self.scale * size;
        match &self.text {
            Some(TextFace::Outline(font)) => draw_text_mut(img, color, x, y, PxScale::from(px), font, text),
            Some(TextFace::Bitmap) => {
                let cell = (px / (GLYPH_HEIGHT + 1) as f32).round().max(1.0) as u32;
                draw_bitmap_text(img, color, x, y, cell, text);
            }
            None => {}
        }
    }

    /// 200x10 bar in the top right, full at EAR 0.5, with a threshold tick
    fn draw_ear_bar(&self, img: &mut RgbImage, ear: f64) {
        if img.width() < BAR_WIDTH + 20 || img.height() < BAR_HEIGHT + 20 {
            return;
        }
        let x = (img.width() - BAR_WIDTH - 20) as i32;
        let y = 20;

        draw_filled_rect_mut(img, Rect::at(x, y).of_size(BAR_WIDTH, BAR_HEIGHT), BAR_BACKGROUND);

        let fill = ((ear / BAR_FULL_SCALE).clamp(0.0, 1.0) * BAR_WIDTH as f64) as u32;
        if fill > 0 {
            let color = if ear >= self.threshold { GREEN } else { RED };
            draw_filled_rect_mut(img, Rect::at(x, y).of_size(fill, BAR_HEIGHT), color);
        }

        let mark = x as f32 + ((self.threshold / BAR_FULL_SCALE).clamp(0.0, 1.0) * BAR_WIDTH as f64) as f32;
        draw_line_segment_mut(
            img,
            (mark, (y - 5) as f32),
            (mark, (y + BAR_HEIGHT as i32 + 5) as f32),
            THRESHOLD_MARK,
        );
    }
}

/// Dots on every eye landmark
pub fn draw_eyes(frame: &mut VideoFrame, eyes: &EyePair, color: Rgb<u8>) {
    frame.with_image_mut(|img| {
        for p in eyes.left.points().iter().chain(eyes.right.points().iter()) {
            draw_filled_circle_mut(img, (p.x.round() as i32, p.y.round() as i32), 1, color);
        }
    });
}

/// Two-pixel outline around a detected region
pub fn draw_region(img: &mut RgbImage, region: &Region, color: Rgb<u8>) {
    if region.width < 3 || region.height < 3 {
        return;
    }
    let (x, y) = (region.x as i32, region.y as i32);
    draw_hollow_rect_mut(img, Rect::at(x, y).of_size(region.width, region.height), color);
    draw_hollow_rect_mut(img, Rect::at(x + 1, y + 1).of_size(region.width - 2, region.height - 2), color);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::{EyePoints, Point};

    fn info(ear: f64) -> OverlayInfo {
        OverlayInfo {
            ear,
            alert_count: 0,
            eyes_closed: ear < 0.25,
            alerting: false,
        }
    }

    #[test]
    fn test_bar_fill_color_follows_threshold() {
        let renderer = OverlayRenderer::bars_only(0.25);
        let x0 = 640 - BAR_WIDTH - 20;

        let mut open = VideoFrame::blank(640, 480);
        renderer.render(&mut open, &info(0.40));
        assert_eq!(open.get_pixel(x0 + 5, 24), Some(GREEN.0));
        // Unfilled tail stays background
        assert_eq!(open.get_pixel(x0 + 190, 24), Some(BAR_BACKGROUND.0));

        let mut closed = VideoFrame::blank(640, 480);
        renderer.render(&mut closed, &info(0.10));
        assert_eq!(closed.get_pixel(x0 + 5, 24), Some(RED.0));
    }

    #[test]
    fn test_threshold_mark_position() {
        let renderer = OverlayRenderer::bars_only(0.25);
        let mut frame = VideoFrame::blank(640, 480);
        renderer.render(&mut frame, &info(0.0));
        let mark = 640 - BAR_WIDTH - 20 + 100;
        assert_eq!(frame.get_pixel(mark, 17), Some(THRESHOLD_MARK.0));
    }

    #[test]
    fn test_tiny_frame_is_left_alone() {
        let renderer = OverlayRenderer::bars_only(0.25);
        let mut frame = VideoFrame::blank(64, 48);
        renderer.render(&mut frame, &info(0.4));
        assert!(frame.data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_missing_font_is_an_error() {
        let config = OverlayConfig {
            font_path: Some("/nonexistent/font.ttf".into()),
            ..Default::default()
        };
        assert!(matches!(OverlayRenderer::new(&config, 0.25), Err(DetectionError::Font(_))));
    }

    fn text_region_touched(frame: &VideoFrame) -> bool {
        (10..150).any(|x| (10..30).any(|y| frame.get_pixel(x, y) != Some([0, 0, 0])))
    }

    #[test]
    fn test_bitmap_text_without_any_font() {
        let config = OverlayConfig {
            system_fonts: false,
            ..Default::default()
        };
        let renderer = OverlayRenderer::new(&config, 0.25).unwrap();
        let mut frame = VideoFrame::blank(640, 480);
        renderer.render(&mut frame, &info(0.31));
        assert!(text_region_touched(&frame));
        // Status line is green while awake
        let status_green = (10..250).any(|x| (70..95).any(|y| frame.get_pixel(x, y) == Some(GREEN.0)));
        assert!(status_green);
    }

    #[test]
    fn test_default_renderer_draws_text() {
        let renderer = OverlayRenderer::new(&OverlayConfig::default(), 0.25).unwrap();
        let mut frame = VideoFrame::blank(640, 480);
        renderer.render(&mut frame, &info(0.31));
        assert!(text_region_touched(&frame));
    }

    #[test]
    fn test_alert_banner_is_red() {
        let config = OverlayConfig {
            system_fonts: false,
            ..Default::default()
        };
        let renderer = OverlayRenderer::new(&config, 0.25).unwrap();
        let mut frame = VideoFrame::blank(640, 480);
        renderer.render(
            &mut frame,
            &OverlayInfo {
                ear: 0.1,
                alert_count: 1,
                eyes_closed: true,
                alerting: true,
            },
        );
        let banner_red = (10..400).any(|x| (390..470).any(|y| frame.get_pixel(x, y) == Some(RED.0)));
        assert!(banner_red);
    }

    #[test]
    fn test_bars_only_draws_no_text() {
        let renderer = OverlayRenderer::bars_only(0.25);
        let mut frame = VideoFrame::blank(640, 480);
        renderer.render(&mut frame, &info(0.31));
        assert!(!text_region_touched(&frame));
    }

    #[test]
    fn test_draw_eyes_marks_points() {
        let mut frame = VideoFrame::blank(50, 50);
        let eye = EyePoints([Point::new(10.0, 10.0); 6]);
        draw_eyes(&mut frame, &EyePair { left: eye, right: eye }, GREEN);
        assert_eq!(frame.get_pixel(10, 10), Some(GREEN.0));
        assert_eq!(frame.get_pixel(30, 30), Some([0, 0, 0]));
    }
}
