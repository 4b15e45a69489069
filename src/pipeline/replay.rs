use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};

use super::{FrameSource, rgba_converter::mirror_rgba};
use crate::types::Frame;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Replays still images in file-name order, standing in for a webcam.
#[derive(Debug)]
pub struct ReplaySource {
    paths: Vec<PathBuf>,
    cursor: usize,
    looping: bool,
    mirror: bool,
}

impl ReplaySource {
    pub fn from_dir(dir: &Path, looping: bool, mirror: bool) -> Result<Self> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("failed to read replay directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| is_image(path))
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(anyhow!("no png or jpeg images in {}", dir.display()));
        }
        Ok(Self::from_paths(paths, looping, mirror))
    }

    pub fn from_paths(paths: Vec<PathBuf>, looping: bool, mirror: bool) -> Self {
        Self {
            paths,
            cursor: 0,
            looping,
            mirror,
        }
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.cursor >= self.paths.len() {
            if !self.looping || self.paths.is_empty() {
                return Ok(None);
            }
            self.cursor = 0;
        }

        let path = &self.paths[self.cursor];
        self.cursor += 1;

        let image = image::open(path)
            .with_context(|| format!("failed to open image {}", path.display()))?
            .to_rgba8();
        let (width, height) = image.dimensions();
        let mut rgba = image.into_raw();
        if self.mirror {
            mirror_rgba(&mut rgba, width);
        }
        Ok(Some(Frame::new(rgba, width, height)))
    }
}
