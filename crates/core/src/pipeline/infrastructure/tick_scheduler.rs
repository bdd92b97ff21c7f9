use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvError};

use crate::pipeline::frame_scheduler::{FrameHandle, FrameScheduler};
use crate::pipeline::loop_controller::{LoopController, LoopEvent};

/// Fixed-rate scheduler standing in for a display refresh callback.
///
/// At most one request is outstanding at a time, mirroring how the loop
/// re-arms itself once per frame. A request made right after a tick fires
/// one interval later.
pub struct TickScheduler {
    interval: Duration,
    next_id: u64,
    pending: Option<(FrameHandle, Instant)>,
}

impl TickScheduler {
    pub fn new(rate_hz: f64) -> Self {
        let rate = if rate_hz.is_finite() && rate_hz > 0.0 {
            rate_hz
        } else {
            crate::shared::constants::DEFAULT_TICK_RATE
        };
        Self {
            interval: Duration::from_secs_f64(1.0 / rate),
            next_id: 0,
            pending: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// When the outstanding request fires, if there is one.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.map(|(_, due)| due)
    }

    /// Removes and returns the outstanding request if it is due at `now`.
    pub fn take_due(&mut self, now: Instant) -> Option<FrameHandle> {
        match self.pending {
            Some((handle, due)) if due <= now => {
                self.pending = None;
                Some(handle)
            }
            _ => None,
        }
    }
}

impl FrameScheduler for TickScheduler {
    fn request_frame(&mut self) -> FrameHandle {
        self.next_id += 1;
        let handle = FrameHandle::new(self.next_id);
        self.pending = Some((handle, Instant::now() + self.interval));
        handle
    }

    fn cancel_frame(&mut self, handle: FrameHandle) {
        if matches!(self.pending, Some((h, _)) if h == handle) {
            self.pending = None;
        }
    }
}

enum Wake {
    External(Result<LoopEvent, RecvError>),
    Setup(LoopEvent),
    Tick,
}

/// Runs the controller until a `Quit` arrives or every sender of `events`
/// is gone.
///
/// Host events, setup completions and ticks are handled one at a time, so
/// nothing the controller does ever overlaps with a frame being processed.
pub fn run_event_loop(
    controller: &mut LoopController,
    scheduler: &mut TickScheduler,
    events: &Receiver<LoopEvent>,
) {
    let setup = controller.setup_events().clone();
    loop {
        let tick = match scheduler.deadline() {
            Some(deadline) => crossbeam_channel::at(deadline),
            None => crossbeam_channel::never(),
        };

        let wake = crossbeam_channel::select! {
            recv(events) -> event => Wake::External(event),
            recv(setup) -> event => match event {
                Ok(event) => Wake::Setup(event),
                // The controller owns the sending side.
                Err(RecvError) => Wake::Tick,
            },
            recv(tick) -> _ => Wake::Tick,
        };

        match wake {
            Wake::External(Ok(event)) => {
                if !controller.handle_event(event, scheduler) {
                    return;
                }
            }
            Wake::External(Err(RecvError)) => {
                log::info!("Event channel closed, shutting down");
                controller.handle_event(LoopEvent::Quit, scheduler);
                return;
            }
            Wake::Setup(event) => {
                controller.handle_event(event, scheduler);
            }
            Wake::Tick => {
                if let Some(handle) = scheduler.take_due(Instant::now()) {
                    controller.on_frame(handle, scheduler);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use crossbeam_channel::unbounded;

    use crate::capture::domain::frame_source::FrameSource;
    use crate::compositor::infrastructure::memory_surface::MemorySurface;
    use crate::detection::domain::face_detector::{
        DetectorConfig, DetectorProvider, FaceDetector, ModelAsset,
    };
    use crate::shared::bounding_box::BoundingBox;
    use crate::shared::frame::Frame;

    #[test]
    fn test_new_uses_rate() {
        let scheduler = TickScheduler::new(50.0);
        assert_eq!(scheduler.interval(), Duration::from_millis(20));
        assert!(scheduler.deadline().is_none());
    }

    #[test]
    fn test_invalid_rate_falls_back_to_default() {
        let scheduler = TickScheduler::new(0.0);
        assert_eq!(scheduler.interval(), TickScheduler::new(60.0).interval());
    }

    #[test]
    fn test_request_is_due_after_interval() {
        let mut scheduler = TickScheduler::new(100.0);
        let before = Instant::now();
        let handle = scheduler.request_frame();

        assert!(scheduler.take_due(before).is_none());
        let later = before + Duration::from_secs(1);
        assert_eq!(scheduler.take_due(later), Some(handle));
        assert!(scheduler.take_due(later).is_none());
    }

    #[test]
    fn test_handles_are_unique() {
        let mut scheduler = TickScheduler::new(60.0);
        let a = scheduler.request_frame();
        let b = scheduler.request_frame();
        assert_ne!(a, b);
    }

    #[test]
    fn test_cancel_removes_pending() {
        let mut scheduler = TickScheduler::new(60.0);
        let handle = scheduler.request_frame();
        scheduler.cancel_frame(handle);
        assert!(scheduler.deadline().is_none());
        assert!(scheduler.take_due(Instant::now() + Duration::from_secs(1)).is_none());
    }

    #[test]
    fn test_cancel_of_old_handle_keeps_newer() {
        let mut scheduler = TickScheduler::new(60.0);
        let old = scheduler.request_frame();
        let _new = scheduler.request_frame();
        scheduler.cancel_frame(old);
        assert!(scheduler.deadline().is_some());
    }

    struct CountingSource {
        next_ts: f64,
    }

    impl FrameSource for CountingSource {
        fn current_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
            self.next_ts += 1.0;
            Ok(Some(Frame::new(vec![0u8; 8 * 8 * 3], 8, 8, 3, self.next_ts)))
        }

        fn dimensions(&self) -> (u32, u32) {
            (8, 8)
        }

        fn close(&mut self) {}
    }

    struct CountingDetector {
        calls: Arc<Mutex<usize>>,
    }

    impl FaceDetector for CountingDetector {
        fn detect(
            &mut self,
            _frame: &Frame,
            _timestamp_ms: f64,
        ) -> Result<Vec<BoundingBox>, Box<dyn std::error::Error>> {
            *self.calls.lock().unwrap() += 1;
            Ok(vec![BoundingBox::new(2.0, 2.0, 4.0, 4.0)])
        }
    }

    struct CountingProvider {
        calls: Arc<Mutex<usize>>,
    }

    impl DetectorProvider for CountingProvider {
        fn create(
            &self,
            _config: &DetectorConfig,
        ) -> Result<Box<dyn FaceDetector>, Box<dyn std::error::Error + Send + Sync>> {
            Ok(Box::new(CountingDetector {
                calls: Arc::clone(&self.calls),
            }))
        }
    }

    fn counting_controller(calls: &Arc<Mutex<usize>>) -> LoopController {
        LoopController::new(
            Box::new(CountingSource { next_ts: 0.0 }),
            Box::new(MemorySurface::new(4, 4)),
            Arc::new(CountingProvider {
                calls: Arc::clone(calls),
            }),
            DetectorConfig::new(ModelAsset::Named("test.onnx".into())),
        )
    }

    #[test]
    fn test_event_loop_processes_frames_until_quit() {
        let (tx, rx) = unbounded();
        let calls = Arc::new(Mutex::new(0));
        let mut controller = counting_controller(&calls);
        let mut scheduler = TickScheduler::new(200.0);

        tx.send(LoopEvent::Start).unwrap();
        let quitter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            tx.send(LoopEvent::Quit).unwrap();
        });

        run_event_loop(&mut controller, &mut scheduler, &rx);
        quitter.join().unwrap();

        assert!(!controller.is_running());
        assert!(*calls.lock().unwrap() > 0);
        assert!(scheduler.deadline().is_none());
    }

    #[test]
    fn test_event_loop_returns_when_senders_dropped() {
        let (done_tx, done_rx) = unbounded();
        std::thread::spawn(move || {
            let (tx, rx) = unbounded();
            let calls = Arc::new(Mutex::new(0));
            let mut controller = counting_controller(&calls);
            let mut scheduler = TickScheduler::new(200.0);
            tx.send(LoopEvent::Start).unwrap();
            drop(tx);

            run_event_loop(&mut controller, &mut scheduler, &rx);
            done_tx.send(controller.is_running()).unwrap();
        });

        let still_running = done_rx
            .recv_timeout(Duration::from_secs(2))
            .expect("event loop kept waiting after its senders were dropped");
        assert!(!still_running);
    }
}
