/**
 * Provides camera frames.
 */
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use image::RgbImage;

use crate::error::Result;

pub trait FrameSource {
    /**
     * Returns the next frame, waiting for it if need be. Ok(None) means
     * there are no more frames.
     */
    fn next_frame(&mut self) -> Result<Option<RgbImage>>;
}


/**
 * Plays back a directory of still images in file name order.
 */
pub struct ImageSequence {
    paths: Vec<PathBuf>,
    next: usize,
    frame_interval: Duration,
    last_frame: Option<Instant>,
}


fn is_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(extension) => {
            let extension = extension.to_ascii_lowercase();
            extension == "png" || extension == "jpg" || extension == "jpeg"
        }
        None => false,
    }
}


impl ImageSequence {
    pub fn open<P: AsRef<Path>>(directory: P, frame_interval: Duration) -> Result<ImageSequence> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(directory.as_ref())? {
            let path = entry?.path();
            if path.is_file() && is_image(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        info!("Found {} frames in {}", paths.len(), directory.as_ref().display());
        Ok(ImageSequence::from_paths(paths, frame_interval))
    }

    pub fn from_paths(paths: Vec<PathBuf>, frame_interval: Duration) -> ImageSequence {
        ImageSequence {
            paths: paths,
            next: 0,
            frame_interval: frame_interval,
            last_frame: None,
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    fn pace(&mut self) {
        if let Some(last_frame) = self.last_frame {
            let elapsed = last_frame.elapsed();
            if elapsed < self.frame_interval {
                thread::sleep(self.frame_interval - elapsed);
            }
        }
        self.last_frame = Some(Instant::now());
    }
}


impl FrameSource for ImageSequence {
    fn next_frame(&mut self) -> Result<Option<RgbImage>> {
        let path = match self.paths.get(self.next) {
            Some(path) => path.clone(),
            None => return Ok(None),
        };
        self.next += 1;
        self.pace();
        debug!("Frame {}", path.display());
        let frame = image::open(&path)?.to_rgb8();
        Ok(Some(frame))
    }
}
