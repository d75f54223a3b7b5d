//! Frame sources: a V4L2 camera (feature `live`) and a directory replay.
//!
//! A source is acquired by its constructor and released when dropped. The
//! stream is sequential and cannot be restarted; open a new source instead.

use image::RgbImage;
use log::debug;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

#[derive(thiserror::Error, Debug)]
pub enum FrameError {
    #[error("{device}: {reason}")]
    DeviceUnavailable { device: String, reason: String },

    #[error("stream ended")]
    StreamEnded,

    #[error("failed to decode {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: image::ImageError,
    },

    #[error("unsupported pixel format {0}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Sequential stream of RGB frames.
pub trait FrameSource {
    /// Next frame, or [`FrameError::StreamEnded`] once the stream is exhausted.
    fn read(&mut self) -> Result<RgbImage, FrameError>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn read(&mut self) -> Result<RgbImage, FrameError> {
        (**self).read()
    }
}

/// Replays the image files of a directory in file-name order.
#[derive(Clone, Debug)]
pub struct ImageDirSource {
    files: Vec<PathBuf>,
    next: usize,
}

impl ImageDirSource {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, FrameError> {
        let dir = dir.as_ref();
        let unavailable = |reason: String| FrameError::DeviceUnavailable {
            device: dir.display().to_string(),
            reason,
        };
        let entries = std::fs::read_dir(dir).map_err(|e| unavailable(e.to_string()))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            if is_image && path.is_file() {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(unavailable("no image files".to_string()));
        }
        files.sort();
        debug!("replaying {} frames from {}", files.len(), dir.display());
        Ok(Self { files, next: 0 })
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ImageDirSource {
    fn read(&mut self) -> Result<RgbImage, FrameError> {
        let path = self.files.get(self.next).ok_or(FrameError::StreamEnded)?;
        self.next += 1;
        let img = image::open(path).map_err(|source| FrameError::Decode {
            what: path.display().to_string(),
            source,
        })?;
        Ok(img.to_rgb8())
    }
}

/// Convert packed YUYV 4:2:2 (BT.601, studio swing ignored) to RGB.
///
/// Returns `None` when `data` is shorter than `width * height * 2` or the
/// width is odd.
pub fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Option<RgbImage> {
    let (w, h) = (width as usize, height as usize);
    if w % 2 != 0 || data.len() < w * h * 2 {
        return None;
    }
    let mut rgb = Vec::with_capacity(w * h * 3);
    for px in data[..w * h * 2].chunks_exact(4) {
        let (y0, u, y1, v) = (px[0] as f32, px[1] as f32 - 128.0, px[2] as f32, px[3] as f32 - 128.0);
        for y in [y0, y1] {
            rgb.push((y + 1.402 * v).round().clamp(0.0, 255.0) as u8);
            rgb.push((y - 0.344_136 * u - 0.714_136 * v).round().clamp(0.0, 255.0) as u8);
            rgb.push((y + 1.772 * u).round().clamp(0.0, 255.0) as u8);
        }
    }
    RgbImage::from_raw(width, height, rgb)
}

#[cfg(feature = "live")]
pub use camera::V4lCamera;

#[cfg(feature = "live")]
mod camera {
    use super::{yuyv_to_rgb, FrameError, FrameSource};
    use image::RgbImage;
    use log::info;
    use v4l::buffer::Type;
    use v4l::format::{Format, FourCC};
    use v4l::io::mmap::Stream as MmapStream;
    use v4l::io::traits::CaptureStream;
    use v4l::video::Capture;
    use v4l::Device;

    /// Webcam opened through Video4Linux2, streaming through mmap buffers.
    pub struct V4lCamera {
        stream: MmapStream<'static>,
        format: Format,
        _device: Device,
    }

    impl std::fmt::Debug for V4lCamera {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.debug_struct("V4lCamera")
                .field("width", &self.format.width)
                .field("height", &self.format.height)
                .field("fourcc", &self.format.fourcc.to_string())
                .finish()
        }
    }

    impl V4lCamera {
        /// Open `/dev/video<index>` and request YUYV at `width × height`.
        ///
        /// The driver may pick another size or MJPEG; both are handled.
        pub fn open(index: usize, width: u32, height: u32) -> Result<Self, FrameError> {
            let name = format!("/dev/video{index}");
            let unavailable = |e: std::io::Error| FrameError::DeviceUnavailable {
                device: name.clone(),
                reason: e.to_string(),
            };

            let device = Device::new(index).map_err(unavailable)?;
            let mut fmt = device.format().map_err(unavailable)?;
            fmt.width = width;
            fmt.height = height;
            fmt.fourcc = FourCC::new(b"YUYV");
            let format = device.set_format(&fmt).map_err(unavailable)?;
            let stream =
                MmapStream::with_buffers(&device, Type::VideoCapture, 4).map_err(unavailable)?;

            info!(
                "opened {name}: {}x{} {}",
                format.width, format.height, format.fourcc
            );
            Ok(Self {
                stream,
                format,
                _device: device,
            })
        }
    }

    impl FrameSource for V4lCamera {
        fn read(&mut self) -> Result<RgbImage, FrameError> {
            let (data, _meta) = CaptureStream::next(&mut self.stream)?;
            let fourcc = &self.format.fourcc;
            if *fourcc == FourCC::new(b"YUYV") {
                yuyv_to_rgb(data, self.format.width, self.format.height)
                    .ok_or_else(|| FrameError::UnsupportedFormat("truncated YUYV frame".into()))
            } else if *fourcc == FourCC::new(b"MJPG") {
                image::load_from_memory_with_format(data, image::ImageFormat::Jpeg)
                    .map(|img| img.to_rgb8())
                    .map_err(|source| FrameError::Decode {
                        what: "MJPEG frame".to_string(),
                        source,
                    })
            } else {
                Err(FrameError::UnsupportedFormat(fourcc.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn missing_or_empty_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ImageDirSource::open(dir.path()),
            Err(FrameError::DeviceUnavailable { .. })
        ));
        assert!(matches!(
            ImageDirSource::open(dir.path().join("nope")),
            Err(FrameError::DeviceUnavailable { .. })
        ));
    }

    #[test]
    fn replays_sorted_images_then_ends() {
        let dir = tempfile::tempdir().unwrap();
        for (name, v) in [("b.png", 20u8), ("a.png", 10), ("c.png", 30)] {
            RgbImage::from_pixel(4, 3, Rgb([v, v, v]))
                .save(dir.path().join(name))
                .unwrap();
        }
        std::fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let mut src = ImageDirSource::open(dir.path()).unwrap();
        assert_eq!(src.len(), 3);
        let values: Vec<u8> = (0..3).map(|_| src.read().unwrap().get_pixel(0, 0)[0]).collect();
        assert_eq!(values, vec![10, 20, 30]);
        assert!(matches!(src.read(), Err(FrameError::StreamEnded)));

        let mut again = ImageDirSource::open(dir.path()).unwrap();
        assert_eq!(again.read().unwrap().get_pixel(0, 0)[0], 10);
    }

    #[test]
    fn yuyv_gray_and_red() {
        // Neutral chroma gives gray; Y0 = 76, V high gives red.
        let data = [128, 128, 200, 128, 76, 85, 76, 255];
        let rgb = yuyv_to_rgb(&data, 2, 2).unwrap();
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([128, 128, 128]));
        assert_eq!(rgb.get_pixel(1, 0), &Rgb([200, 200, 200]));
        let red = rgb.get_pixel(0, 1);
        assert!(red[0] > 240 && red[1] < 10 && red[2] < 10, "{red:?}");
        assert!(yuyv_to_rgb(&data[..6], 2, 2).is_none());
    }
}
