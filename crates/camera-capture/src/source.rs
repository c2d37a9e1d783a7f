//! Frame sources

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, info};

use crate::frame::{decode_image, VideoFrame};
use crate::CameraError;

/// Anything that yields frames one at a time.
///
/// `Ok(None)` means the source is exhausted (camera unplugged, replay done).
/// Dropping the source releases the underlying device.
pub trait FrameSource: Send {
    /// Read next frame (blocking)
    fn read_frame(&mut self) -> Result<Option<VideoFrame>, CameraError>;

    /// Human readable description used in logs
    fn describe(&self) -> String;
}

impl FrameSource for Box<dyn FrameSource> {
    fn read_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        (**self).read_frame()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Replays frames held in memory
pub struct ReplaySource {
    frames: VecDeque<VideoFrame>,
    looping: bool,
    next_sequence: u32,
}

impl ReplaySource {
    pub fn new(frames: Vec<VideoFrame>) -> Self {
        Self {
            frames: frames.into(),
            looping: false,
            next_sequence: 0,
        }
    }

    /// Replay the same frames forever
    pub fn looping(frames: Vec<VideoFrame>) -> Self {
        Self {
            looping: true,
            ..Self::new(frames)
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for ReplaySource {
    fn read_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        let Some(mut frame) = self.frames.pop_front() else {
            return Ok(None);
        };
        if self.looping {
            self.frames.push_back(frame.clone());
        }
        frame.sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        Ok(Some(frame))
    }

    fn describe(&self) -> String {
        format!("replay ({} frames)", self.frames.len())
    }
}

/// Reads a directory of still images in file-name order
pub struct ImageSequenceSource {
    dir: PathBuf,
    files: VecDeque<PathBuf>,
    started: Instant,
    sequence: u32,
}

impl ImageSequenceSource {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, CameraError> {
        let dir = dir.as_ref().to_path_buf();
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| CameraError::Open(format!("{}: {}", dir.display(), e)))?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                matches!(
                    p.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()).as_deref(),
                    Some("jpg" | "jpeg" | "png" | "bmp")
                )
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(CameraError::Open(format!("no images in {}", dir.display())));
        }

        info!(dir = %dir.display(), frames = files.len(), "Opened image sequence");
        Ok(Self {
            dir,
            files: files.into(),
            started: Instant::now(),
            sequence: 0,
        })
    }
}

impl FrameSource for ImageSequenceSource {
    fn read_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        let Some(path) = self.files.pop_front() else {
            return Ok(None);
        };
        debug!(path = %path.display(), "Reading frame");
        let bytes = std::fs::read(&path).map_err(|e| CameraError::Stream(e.to_string()))?;
        let mut frame = decode_image(&bytes, self.sequence)?;
        frame.timestamp_ns = self.started.elapsed().as_nanos() as u64;
        self.sequence = self.sequence.wrapping_add(1);
        Ok(Some(frame))
    }

    fn describe(&self) -> String {
        format!("image sequence {}", self.dir.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_exhausts() {
        let mut src = ReplaySource::new(vec![VideoFrame::blank(2, 2), VideoFrame::blank(2, 2)]);
        assert_eq!(src.read_frame().unwrap().unwrap().sequence, 0);
        assert_eq!(src.read_frame().unwrap().unwrap().sequence, 1);
        assert!(src.read_frame().unwrap().is_none());
    }

    #[test]
    fn test_replay_looping_never_ends() {
        let mut src = ReplaySource::looping(vec![VideoFrame::blank(2, 2)]);
        for i in 0..5 {
            assert_eq!(src.read_frame().unwrap().unwrap().sequence, i);
        }
        assert_eq!(src.remaining(), 1);
    }

    #[test]
    fn test_image_sequence_missing_dir() {
        let err = ImageSequenceSource::open("/definitely/not/here").err().unwrap();
        assert!(matches!(err, CameraError::Open(_)));
    }
}
