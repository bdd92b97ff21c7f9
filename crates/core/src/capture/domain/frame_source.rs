use crate::shared::frame::Frame;

/// A live source of frames, polled once per loop tick.
///
/// Behaves like a playing video element: `current_frame` returns whatever
/// frame is showing right now. Polling faster than the source produces
/// frames yields repeats carrying the same timestamp.
pub trait FrameSource: Send {
    /// The latest frame, or `None` when nothing has been captured yet.
    fn current_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>>;

    /// Native `(width, height)` of the source.
    fn dimensions(&self) -> (u32, u32);

    /// Stops capture and releases the device.
    fn close(&mut self);
}
