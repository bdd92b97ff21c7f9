use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::{Receiver, SendError, Sender};
use thiserror::Error;

use crate::capture::domain::frame_source::FrameSource;
use crate::compositor::domain::compositor::Compositor;
use crate::compositor::domain::output_surface::OutputSurface;
use crate::detection::domain::box_smoother::{BoxSmoother, BoxSmootherInterface, SmootherState};
use crate::detection::domain::face_detector::{DetectorConfig, DetectorProvider, FaceDetector};
use crate::pipeline::frame_scheduler::{FrameHandle, FrameScheduler};
use crate::pipeline::pipeline_logger::{NullPipelineLogger, PipelineLogger};
use crate::shared::bounding_box::BoundingBox;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum SetupError {
    #[error("detector setup failed: {0}")]
    Provider(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("cannot spawn detector setup thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Messages processed by the event loop between frame callbacks.
///
/// `SetupFinished` is only produced by the controller's own setup threads and
/// arrives on [`LoopController::setup_events`]; the rest come from the host.
pub enum LoopEvent {
    Toggle,
    Start,
    Stop,
    Quit,
    SetupFinished {
        generation: u64,
        result: Result<Box<dyn FaceDetector>, SetupError>,
    },
}

enum Phase {
    Idle,
    Starting { generation: u64 },
    Running { detector: Box<dyn FaceDetector> },
}

/// Drives the per-frame detect → smooth → composite cycle.
///
/// All entry points run on the event loop thread. Detector setup is the one
/// piece of work pushed elsewhere; its result comes back as
/// [`LoopEvent::SetupFinished`] tagged with the generation of the `start`
/// that requested it, so a setup outliving its `stop` is torn down instead of
/// resurrecting the loop.
pub struct LoopController {
    source: Box<dyn FrameSource>,
    surface: Box<dyn OutputSurface>,
    provider: Arc<dyn DetectorProvider>,
    config: DetectorConfig,
    setup_tx: Sender<LoopEvent>,
    setup_rx: Receiver<LoopEvent>,
    smoother: Box<dyn BoxSmootherInterface>,
    compositor: Compositor,
    logger: Box<dyn PipelineLogger>,
    phase: Phase,
    generation: u64,
    pending: Option<FrameHandle>,
    last_frame_time: Option<f64>,
    face_present: bool,
    processed: usize,
    clock: Instant,
}

impl LoopController {
    pub fn new(
        source: Box<dyn FrameSource>,
        surface: Box<dyn OutputSurface>,
        provider: Arc<dyn DetectorProvider>,
        config: DetectorConfig,
    ) -> Self {
        let (setup_tx, setup_rx) = crossbeam_channel::unbounded();
        Self {
            source,
            surface,
            provider,
            config,
            setup_tx,
            setup_rx,
            smoother: Box::new(BoxSmoother::default()),
            compositor: Compositor::default(),
            logger: Box::new(NullPipelineLogger),
            phase: Phase::Idle,
            generation: 0,
            pending: None,
            last_frame_time: None,
            face_present: false,
            processed: 0,
            clock: Instant::now(),
        }
    }

    pub fn with_smoother(mut self, smoother: Box<dyn BoxSmootherInterface>) -> Self {
        self.smoother = smoother;
        self
    }

    pub fn with_compositor(mut self, compositor: Compositor) -> Self {
        self.compositor = compositor;
        self
    }

    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// True from `start` until `stop` or a failed setup.
    pub fn is_running(&self) -> bool {
        !matches!(self.phase, Phase::Idle)
    }

    pub fn face_present(&self) -> bool {
        self.face_present
    }

    pub fn smoother_state(&self) -> SmootherState {
        self.smoother.state()
    }

    pub fn surface(&self) -> &dyn OutputSurface {
        self.surface.as_ref()
    }

    /// Completions of detector setups started by [`LoopController::start`].
    /// The event loop must feed these back through `handle_event`.
    pub fn setup_events(&self) -> &Receiver<LoopEvent> {
        &self.setup_rx
    }

    /// Marks the loop running and builds the detector on a setup thread.
    ///
    /// No-op unless idle.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        self.generation += 1;
        let generation = self.generation;
        let provider = Arc::clone(&self.provider);
        let config = self.config.clone();
        let events = self.setup_tx.clone();

        let spawned = thread::Builder::new()
            .name("detector-setup".into())
            .spawn(move || {
                let result = provider.create(&config).map_err(SetupError::Provider);
                // Controller already dropped: nobody else will release the session.
                if let Err(SendError(LoopEvent::SetupFinished {
                    result: Ok(mut detector),
                    ..
                })) = events.send(LoopEvent::SetupFinished { generation, result })
                {
                    detector.close();
                }
            });

        match spawned {
            Ok(_) => {
                self.phase = Phase::Starting { generation };
                self.processed = 0;
                self.logger.reset();
                self.logger.info("Starting face detection");
            }
            Err(e) => log::error!("{}", SetupError::from(e)),
        }
    }

    /// Handles a finished detector setup.
    ///
    /// A result from an earlier generation, or one arriving after `stop`,
    /// has its detector closed and changes nothing else.
    pub fn on_setup_finished(
        &mut self,
        generation: u64,
        result: Result<Box<dyn FaceDetector>, SetupError>,
        scheduler: &mut dyn FrameScheduler,
    ) {
        let current = matches!(self.phase, Phase::Starting { generation: g } if g == generation);
        if !current {
            log::debug!("Discarding detector from stale setup (generation {generation})");
            if let Ok(mut detector) = result {
                detector.close();
            }
            return;
        }

        match result {
            Ok(detector) => {
                self.phase = Phase::Running { detector };
                self.smoother.reset();
                self.last_frame_time = None;
                self.pending = Some(scheduler.request_frame());
                self.logger.info("Face detection running");
            }
            Err(e) => {
                log::error!("{e}");
                self.phase = Phase::Idle;
            }
        }
    }

    /// Stops the loop and releases everything a run acquired.
    ///
    /// Once this returns no frame callback from the run will fire and the
    /// next detection is treated as a first frame.
    pub fn stop(&mut self, scheduler: &mut dyn FrameScheduler) {
        if !self.is_running() {
            return;
        }
        if let Some(handle) = self.pending.take() {
            scheduler.cancel_frame(handle);
        }
        if let Phase::Running { mut detector } = std::mem::replace(&mut self.phase, Phase::Idle) {
            detector.close();
        }

        self.smoother.reset();
        self.last_frame_time = None;
        self.surface.clear();
        self.surface.set_visible(false);
        self.set_face_present(false);
        self.logger.summary();
        self.logger.info("Face detection stopped");
    }

    pub fn toggle(&mut self, scheduler: &mut dyn FrameScheduler) {
        if self.is_running() {
            self.stop(scheduler);
        } else {
            self.start();
        }
    }

    /// Dispatches one event. Returns `false` once the loop should exit.
    pub fn handle_event(&mut self, event: LoopEvent, scheduler: &mut dyn FrameScheduler) -> bool {
        match event {
            LoopEvent::Toggle => self.toggle(scheduler),
            LoopEvent::Start => self.start(),
            LoopEvent::Stop => self.stop(scheduler),
            LoopEvent::SetupFinished { generation, result } => {
                self.on_setup_finished(generation, result, scheduler)
            }
            LoopEvent::Quit => {
                self.stop(scheduler);
                self.source.close();
                return false;
            }
        }
        true
    }

    /// Frame callback for `handle`. Processes the current frame, then
    /// requests the next one.
    pub fn on_frame(&mut self, handle: FrameHandle, scheduler: &mut dyn FrameScheduler) {
        if self.pending != Some(handle) {
            log::debug!("Ignoring stale frame callback {}", handle.id());
            return;
        }
        self.pending = None;
        if !matches!(self.phase, Phase::Running { .. }) {
            return;
        }
        self.process_frame();
        self.pending = Some(scheduler.request_frame());
    }

    fn process_frame(&mut self) {
        let frame = match self.source.current_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                log::debug!("No frame available yet");
                return;
            }
            Err(e) => {
                log::warn!("Cannot read frame: {e}");
                return;
            }
        };
        if self.last_frame_time == Some(frame.timestamp()) {
            return;
        }

        let Phase::Running { detector } = &mut self.phase else {
            return;
        };
        let timestamp_ms = self.clock.elapsed().as_secs_f64() * 1000.0;
        let t0 = Instant::now();
        let detections = match detector.detect(&frame, timestamp_ms) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("Detection failed: {e}");
                return;
            }
        };
        self.logger.timing("detect", elapsed_ms(t0));
        self.logger.metric("detections", detections.len() as f64);
        self.last_frame_time = Some(frame.timestamp());

        let t0 = Instant::now();
        let mut drawn = false;
        for raw in &detections {
            drawn |= self.spotlight(&frame, raw);
        }
        if !detections.is_empty() {
            self.logger.timing("composite", elapsed_ms(t0));
        }
        // Nothing drawn means nothing worth showing, even if a face was found.
        self.surface.set_visible(drawn);
        self.set_face_present(drawn);

        self.processed += 1;
        self.logger.frame(self.processed);
    }

    /// Smooths `raw` and draws it. Returns whether the surface was updated.
    fn spotlight(&mut self, frame: &Frame, raw: &BoundingBox) -> bool {
        let display = self
            .smoother
            .smooth(raw, frame.width() as f64, frame.height() as f64);
        match self
            .compositor
            .draw(frame, &display, self.surface.as_mut())
        {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Cannot draw spotlight: {e}");
                false
            }
        }
    }

    fn set_face_present(&mut self, present: bool) {
        if self.face_present != present {
            self.face_present = present;
            log::debug!("Face {}", if present { "present" } else { "absent" });
        }
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}
