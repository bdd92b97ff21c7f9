use crate::compositor::domain::output_surface::OutputSurface;
use crate::shared::frame::Frame;

/// Output surface that keeps the composed preview in memory.
///
/// Starts hidden and blank. Useful for headless runs and for inspecting
/// what the loop drew.
pub struct MemorySurface {
    width: u32,
    height: u32,
    content: Option<Frame>,
    visible: bool,
    presents: usize,
}

impl MemorySurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            content: None,
            visible: false,
            presents: 0,
        }
    }

    /// The last presented frame, or `None` after a clear.
    pub fn content(&self) -> Option<&Frame> {
        self.content.as_ref()
    }

    /// Number of frames presented since construction.
    pub fn presents(&self) -> usize {
        self.presents
    }
}

impl OutputSurface for MemorySurface {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn present(&mut self, frame: Frame) -> Result<(), Box<dyn std::error::Error>> {
        if (frame.width(), frame.height()) != (self.width, self.height) {
            return Err(format!(
                "surface is {}x{}, got {}x{} frame",
                self.width,
                self.height,
                frame.width(),
                frame.height()
            )
            .into());
        }
        self.content = Some(frame);
        self.presents += 1;
        Ok(())
    }

    fn clear(&mut self) {
        self.content = None;
    }

    fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    fn is_visible(&self) -> bool {
        self.visible
    }
}
