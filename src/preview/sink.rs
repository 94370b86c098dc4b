// ============================================================================
// DISPLAY SINKS: where finished previews go
// ============================================================================

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::coalescer::{DisplaySink, RenderedImage};
use crate::io::{SaveFormat, encode_and_write};
use crate::{log_err, log_info};

/// Shared slot holding the most recent frame.  Clones observe the same slot,
/// so another thread can poll what the display lane last presented.
#[derive(Clone, Default)]
pub struct LatestFrame {
    inner: Arc<Mutex<LatestFrameInner>>,
}

#[derive(Default)]
struct LatestFrameInner {
    frame: Option<RenderedImage>,
    presented: u64,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frame(&self) -> Option<RenderedImage> {
        self.inner.lock().ok().and_then(|g| g.frame.clone())
    }

    /// Number of frames presented so far.
    pub fn presented(&self) -> u64 {
        self.inner.lock().map(|g| g.presented).unwrap_or(0)
    }
}

impl DisplaySink for LatestFrame {
    fn present(&mut self, frame: RenderedImage) {
        if let Ok(mut guard) = self.inner.lock() {
            guard.frame = Some(frame);
            guard.presented += 1;
        }
    }
}

/// Writes every presented frame to one file, so the file always shows the
/// latest preview.
pub struct FrameFileSink {
    path: PathBuf,
    format: SaveFormat,
    quality: u8,
    written: u64,
    last_error: Option<String>,
}

impl FrameFileSink {
    pub fn new(path: &Path, format: SaveFormat, quality: u8) -> Self {
        Self {
            path: path.to_path_buf(),
            format,
            quality,
            written: 0,
            last_error: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Error of the most recent write, cleared by the next successful one.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}

impl DisplaySink for FrameFileSink {
    fn present(&mut self, frame: RenderedImage) {
        match encode_and_write(&frame.pixels, &self.path, self.format, self.quality) {
            Ok(()) => {
                self.written += 1;
                self.last_error = None;
                log_info!(
                    "frame #{} ({}) → {}",
                    frame.sequence,
                    frame.filter,
                    self.path.display()
                );
            }
            Err(e) => {
                log_err!("writing {} failed: {}", self.path.display(), e);
                self.last_error = Some(e.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;
    use std::time::Duration;

    fn frame(sequence: u64) -> RenderedImage {
        RenderedImage {
            sequence,
            filter: "ColorInvert".into(),
            pixels: RgbaImage::new(3, 3),
            render_time: Duration::ZERO,
        }
    }

    #[test]
    fn latest_frame_is_shared_between_clones() {
        let observer = LatestFrame::new();
        let mut sink = observer.clone();
        sink.present(frame(1));
        sink.present(frame(2));
        assert_eq!(observer.presented(), 2);
        assert_eq!(observer.frame().map(|f| f.sequence), Some(2));
    }

    #[test]
    fn file_sink_overwrites_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.png");
        let mut sink = FrameFileSink::new(&path, SaveFormat::Png, 90);

        sink.present(frame(1));
        sink.present(frame(2));

        assert_eq!(sink.written(), 2);
        assert!(sink.last_error().is_none());
        assert_eq!(image::open(&path).unwrap().to_rgba8().dimensions(), (3, 3));
    }

    #[test]
    fn file_sink_records_write_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("preview.png");
        let mut sink = FrameFileSink::new(&path, SaveFormat::Png, 90);
        sink.present(frame(1));
        assert_eq!(sink.written(), 0);
        assert!(sink.last_error().is_some());
    }
}
