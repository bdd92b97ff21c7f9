use crate::shared::frame::Frame;

/// The fixed-size preview the spotlight is drawn into.
///
/// Hidden while no face is present. `present` receives frames already
/// scaled to [`OutputSurface::size`].
pub trait OutputSurface: Send {
    fn size(&self) -> (u32, u32);

    fn present(&mut self, frame: Frame) -> Result<(), Box<dyn std::error::Error>>;

    /// Erases drawn content.
    fn clear(&mut self);

    fn set_visible(&mut self, visible: bool);

    fn is_visible(&self) -> bool;
}
