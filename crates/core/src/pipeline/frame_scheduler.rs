/// Identifies one outstanding frame request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FrameHandle(u64);

impl FrameHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Host-side scheduler that invokes the frame callback once per refresh.
///
/// The loop re-arms itself by requesting the next frame at the end of each
/// callback. Cancellation is synchronous: once `cancel_frame` returns, the
/// callback for that handle must never fire.
pub trait FrameScheduler {
    fn request_frame(&mut self) -> FrameHandle;

    fn cancel_frame(&mut self, handle: FrameHandle);
}
