use std::fs;
use std::path::{Path, PathBuf};

use crate::compositor::domain::output_surface::OutputSurface;
use crate::shared::frame::Frame;

/// Output surface backed by an image file, for viewing the spotlight from
/// another program.
///
/// The latest composite is written every `write_every` presents while the
/// surface is visible. Hiding or clearing the surface removes the file, so
/// the file exists exactly while a face is being shown. Writes go through a
/// temporary file and a rename so readers never see a half-written image.
pub struct ImageFileSurface {
    path: PathBuf,
    width: u32,
    height: u32,
    write_every: usize,
    latest: Option<Frame>,
    visible: bool,
    since_write: usize,
}

impl ImageFileSurface {
    pub fn new(path: PathBuf, width: u32, height: u32) -> Self {
        Self {
            path,
            width,
            height,
            write_every: 1,
            latest: None,
            visible: false,
            since_write: 0,
        }
    }

    pub fn with_write_every(mut self, frames: usize) -> Self {
        self.write_every = frames.max(1);
        self
    }

    fn write_latest(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        let Some(frame) = &self.latest else {
            return Ok(());
        };
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let img = image::RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
            .ok_or("Failed to create image from frame data")?;

        let temp_path = temp_path_for(&self.path);
        let format = image::ImageFormat::from_path(&self.path).unwrap_or(image::ImageFormat::Png);
        img.save_with_format(&temp_path, format)?;
        fs::rename(&temp_path, &self.path)?;
        self.since_write = 0;
        Ok(())
    }

    fn remove_file(&self) {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Cannot remove {}: {e}", self.path.display()),
        }
    }
}

/// `preview.png` → `preview.part.png`, keeping the extension for format detection.
fn temp_path_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match path.extension() {
        Some(ext) => path.with_file_name(format!("{stem}.part.{}", ext.to_string_lossy())),
        None => path.with_file_name(format!("{stem}.part")),
    }
}

impl OutputSurface for ImageFileSurface {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn present(&mut self, frame: Frame) -> Result<(), Box<dyn std::error::Error>> {
        self.latest = Some(frame);
        self.since_write += 1;
        if self.visible && self.since_write >= self.write_every {
            self.write_latest()?;
        }
        Ok(())
    }

    fn clear(&mut self) {
        self.latest = None;
        self.since_write = 0;
        self.remove_file();
    }

    fn set_visible(&mut self, visible: bool) {
        if visible == self.visible {
            return;
        }
        self.visible = visible;
        if visible {
            if let Err(e) = self.write_latest() {
                log::warn!("Cannot write preview to {}: {e}", self.path.display());
            }
        } else {
            self.remove_file();
        }
    }

    fn is_visible(&self) -> bool {
        self.visible
    }
}
