//! Video frame types and processing

use image::codecs::jpeg::JpegEncoder;
use image::{imageops, GrayImage, RgbImage};

use crate::CameraError;

/// Decoded RGB video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (nanoseconds)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    /// Create a black frame
    pub fn blank(width: u32, height: u32) -> Self {
        Self::new(vec![0; (width * height * 3) as usize], width, height, 0, 0)
    }

    /// Create a frame from packed BGR data (OpenCV's native layout)
    pub fn from_bgr(mut data: Vec<u8>, width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        for pixel in data.chunks_exact_mut(3) {
            pixel.swap(0, 2);
        }
        Self::new(data, width, height, timestamp_ns, sequence)
    }

    /// Wrap an `image` RGB buffer
    pub fn from_rgb_image(image: RgbImage, timestamp_ns: u64, sequence: u32) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, timestamp_ns, sequence)
    }

    /// Borrow the pixels as an `image` RGB buffer (copies)
    pub fn to_rgb_image(&self) -> RgbImage {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
            .unwrap_or_else(|| RgbImage::new(self.width, self.height))
    }

    /// Edit the pixels in place through an `image` RGB buffer
    pub fn with_image_mut<R>(&mut self, f: impl FnOnce(&mut RgbImage) -> R) -> R {
        let data = std::mem::take(&mut self.data);
        let mut image = RgbImage::from_raw(self.width, self.height, data)
            .unwrap_or_else(|| RgbImage::new(self.width, self.height));
        let out = f(&mut image);
        self.data = image.into_raw();
        out
    }

    /// Packed BGR copy of the pixel data
    pub fn to_bgr(&self) -> Vec<u8> {
        let mut bgr = self.data.clone();
        for pixel in bgr.chunks_exact_mut(3) {
            pixel.swap(0, 2);
        }
        bgr
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        self.data.get(idx..idx + 3).map(|p| [p[0], p[1], p[2]])
    }

    /// Convert to grayscale
    pub fn to_grayscale(&self) -> GrayImage {
        let mut gray = Vec::with_capacity((self.width * self.height) as usize);
        for pixel in self.data.chunks_exact(3) {
            // Luminance formula: 0.299*R + 0.587*G + 0.114*B
            let y = (pixel[0] as f32 * 0.299
                   + pixel[1] as f32 * 0.587
                   + pixel[2] as f32 * 0.114) as u8;
            gray.push(y);
        }
        GrayImage::from_raw(self.width, self.height, gray)
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }

    /// Crop a region of the frame
    pub fn crop(&self, x: u32, y: u32, w: u32, h: u32) -> Option<VideoFrame> {
        if x + w > self.width || y + h > self.height {
            return None;
        }

        let mut cropped = Vec::with_capacity((w * h * 3) as usize);
        for row in y..(y + h) {
            let start = ((row * self.width + x) * 3) as usize;
            let end = start + (w * 3) as usize;
            cropped.extend_from_slice(&self.data[start..end]);
        }

        Some(VideoFrame {
            data: cropped,
            width: w,
            height: h,
            timestamp_ns: self.timestamp_ns,
            sequence: self.sequence,
        })
    }

    /// Resize frame using bilinear (triangle) filtering
    pub fn resize(&self, new_width: u32, new_height: u32) -> VideoFrame {
        if new_width == self.width && new_height == self.height {
            return self.clone();
        }

        let resized = imageops::resize(
            &self.to_rgb_image(),
            new_width,
            new_height,
            imageops::FilterType::Triangle,
        );

        VideoFrame {
            data: resized.into_raw(),
            width: new_width,
            height: new_height,
            timestamp_ns: self.timestamp_ns,
            sequence: self.sequence,
        }
    }

    /// Mirror the frame around its vertical axis in place
    pub fn flip_horizontal(&mut self) {
        let row_len = (self.width * 3) as usize;
        for row in self.data.chunks_exact_mut(row_len) {
            let pixels = row.len() / 3;
            for i in 0..pixels / 2 {
                let j = pixels - 1 - i;
                for c in 0..3 {
                    row.swap(i * 3 + c, j * 3 + c);
                }
            }
        }
    }

    /// Encode the frame as JPEG
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, CameraError> {
        let mut out = Vec::with_capacity(self.data.len() / 8);
        let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
        encoder
            .encode(&self.data, self.width, self.height, image::ExtendedColorType::Rgb8)
            .map_err(|e| CameraError::Encode(e.to_string()))?;
        Ok(out)
    }
}

/// Decode a JPEG (or any `image`-supported) buffer to an RGB frame
pub fn decode_image(bytes: &[u8], sequence: u32) -> Result<VideoFrame, CameraError> {
    let img = image::load_from_memory(bytes).map_err(|e| CameraError::Format(e.to_string()))?;
    Ok(VideoFrame::from_rgb_image(img.to_rgb8(), 0, sequence))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> VideoFrame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8, y as u8, 7]);
            }
        }
        VideoFrame::new(data, width, height, 0, 0)
    }

    #[test]
    fn test_flip_horizontal_mirrors_rows() {
        let mut frame = gradient(4, 2);
        frame.flip_horizontal();
        assert_eq!(frame.get_pixel(0, 0), Some([3, 0, 7]));
        assert_eq!(frame.get_pixel(3, 1), Some([0, 1, 7]));
    }

    #[test]
    fn test_resize_dimensions() {
        let frame = gradient(640, 480);
        let small = frame.resize(320, 240);
        assert_eq!((small.width, small.height), (320, 240));
        assert_eq!(small.data.len(), 320 * 240 * 3);
    }

    #[test]
    fn test_crop_out_of_bounds() {
        let frame = gradient(10, 10);
        assert!(frame.crop(5, 5, 6, 2).is_none());
        let c = frame.crop(2, 3, 4, 4).unwrap();
        assert_eq!(c.get_pixel(0, 0), Some([2, 3, 7]));
    }

    #[test]
    fn test_bgr_round_trip_swaps_channels() {
        let frame = VideoFrame::from_bgr(vec![1, 2, 3], 1, 1, 0, 0);
        assert_eq!(frame.get_pixel(0, 0), Some([3, 2, 1]));
        assert_eq!(frame.to_bgr(), vec![1, 2, 3]);
    }

    #[test]
    fn test_encode_jpeg_produces_soi_marker() {
        let jpeg = gradient(32, 32).encode_jpeg(80).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = decode_image(&jpeg, 1).unwrap();
        assert_eq!((decoded.width, decoded.height), (32, 32));
    }

    proptest::proptest! {
        #[test]
        fn prop_flip_twice_is_identity(w in 1u32..16, h in 1u32..16, seed in 0u8..255) {
            let data: Vec<u8> = (0..w * h * 3).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect();
            let original = VideoFrame::new(data, w, h, 0, 0);
            let mut frame = original.clone();
            frame.flip_horizontal();
            frame.flip_horizontal();
            proptest::prop_assert_eq!(frame.data, original.data);
        }
    }

    #[test]
    fn test_with_image_mut_edits_pixels() {
        let mut frame = VideoFrame::blank(4, 4);
        frame.with_image_mut(|img| img.put_pixel(1, 2, image::Rgb([9, 8, 7])));
        assert_eq!(frame.get_pixel(1, 2), Some([9, 8, 7]));
        assert_eq!(frame.data.len(), 4 * 4 * 3);
    }

    #[test]
    fn test_grayscale_size() {
        let gray = gradient(8, 4).to_grayscale();
        assert_eq!(gray.dimensions(), (8, 4));
    }
}
