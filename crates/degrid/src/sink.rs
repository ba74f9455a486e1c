use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use image::RgbImage;
use image::imageops::{self, FilterType};

use crate::error::FrameError;

pub const CONCAT_LIST: &str = "frames.txt";

/// Append-only, strictly ordered destination for finished frames.
pub trait FrameSink: Send {
    fn append(&mut self, frame: &RgbImage) -> Result<PathBuf, FrameError>;

    /// Flush any buffered state; returns the number of frames written.
    fn finish(&mut self) -> Result<u64, FrameError>;
}

/// Numbered PNG files plus an ffmpeg concat list naming them in order.
///
/// Frames are scaled to the first frame's size. The list is flushed after every frame so an
/// interrupted run leaves a usable sequence.
pub struct PngSequenceSink {
    dir: PathBuf,
    list_path: PathBuf,
    list: BufWriter<File>,
    written: u64,
    size: Option<(u32, u32)>,
}

impl PngSequenceSink {
    pub fn create(dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        let list_path = dir.join(CONCAT_LIST);
        let mut list = BufWriter::new(File::create(&list_path)?);
        writeln!(list, "ffconcat version 1.0")?;
        list.flush()?;
        Ok(Self {
            dir: dir.to_path_buf(),
            list_path,
            list,
            written: 0,
            size: None,
        })
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    fn list_error(&self, source: io::Error) -> FrameError {
        FrameError::Io {
            path: self.list_path.clone(),
            source,
        }
    }
}

impl FrameSink for PngSequenceSink {
    fn append(&mut self, frame: &RgbImage) -> Result<PathBuf, FrameError> {
        let size = *self.size.get_or_insert(frame.dimensions());
        let name = format!("frame_{:06}.png", self.written + 1);
        let path = self.dir.join(&name);
        let saved = if frame.dimensions() == size {
            frame.save(&path)
        } else {
            imageops::resize(frame, size.0, size.1, FilterType::Triangle).save(&path)
        };
        saved.map_err(|source| FrameError::Encode {
            path: path.clone(),
            source,
        })?;

        writeln!(self.list, "file '{name}'").map_err(|err| self.list_error(err))?;
        self.list.flush().map_err(|err| self.list_error(err))?;
        self.written += 1;
        Ok(path)
    }

    fn finish(&mut self) -> Result<u64, FrameError> {
        self.list.flush().map_err(|err| self.list_error(err))?;
        Ok(self.written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn writes_numbered_frames_and_list() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = PngSequenceSink::create(dir.path()).unwrap();
        sink.append(&RgbImage::from_pixel(8, 6, Rgb([1, 2, 3]))).unwrap();
        let second = sink
            .append(&RgbImage::from_pixel(16, 12, Rgb([9, 9, 9])))
            .unwrap();
        assert_eq!(sink.finish().unwrap(), 2);

        assert!(dir.path().join("frame_000001.png").is_file());
        assert_eq!(image::open(&second).unwrap().to_rgb8().dimensions(), (8, 6));
        let list = fs::read_to_string(dir.path().join(CONCAT_LIST)).unwrap();
        assert_eq!(
            list,
            "ffconcat version 1.0\nfile 'frame_000001.png'\nfile 'frame_000002.png'\n"
        );
    }
}
