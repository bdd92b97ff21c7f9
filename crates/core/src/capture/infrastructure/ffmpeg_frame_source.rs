use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::capture::domain::frame_source::FrameSource;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to initialise ffmpeg: {0}")]
    Init(#[source] ffmpeg_next::Error),
    #[error("unknown capture format '{0}'")]
    UnknownFormat(String),
    #[error("cannot open {location}: {source}")]
    Open {
        location: String,
        #[source]
        source: ffmpeg_next::Error,
    },
    #[error("no video stream in {0}")]
    NoVideoStream(String),
    #[error("cannot create decoder: {0}")]
    Decoder(#[source] ffmpeg_next::Error),
    #[error("capture thread exited before reporting")]
    ThreadExited,
}

/// Device/demuxer options passed to ffmpeg when opening the source.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CaptureOptions {
    /// Input format, e.g. `v4l2`, `avfoundation`, `dshow`. `None` lets ffmpeg probe.
    pub format: Option<String>,
    /// Requested capture size, e.g. `640x480`.
    pub video_size: Option<String>,
    /// Requested capture rate, e.g. `30`.
    pub framerate: Option<String>,
}

#[derive(Default)]
struct Shared {
    latest: Option<Frame>,
    failure: Option<String>,
}

/// Captures from a camera device, file or stream URL via ffmpeg-next.
///
/// Decoding runs on a dedicated thread which keeps only the most recent
/// RGB24 frame. Timestamps come from the stream's presentation time, and
/// file inputs are paced to real time so they play like a live feed.
pub struct FfmpegFrameSource {
    shared: Arc<Mutex<Shared>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    width: u32,
    height: u32,
}

impl FfmpegFrameSource {
    /// Opens `location` and starts capturing. Fails without starting a
    /// capture loop if the device is unavailable or access is denied.
    pub fn open(location: &str, options: &CaptureOptions) -> Result<Self, SourceError> {
        let shared = Arc::new(Mutex::new(Shared::default()));
        let stop = Arc::new(AtomicBool::new(false));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(u32, u32), SourceError>>(1);

        let location_owned = location.to_string();
        let options = options.clone();
        let thread_shared = shared.clone();
        let thread_stop = stop.clone();
        let handle = std::thread::spawn(move || {
            let mut capture = match Capture::open(&location_owned, &options) {
                Ok(capture) => capture,
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                    return;
                }
            };
            let _ = ready_tx.send(Ok((capture.width, capture.height)));
            capture.run(&thread_shared, &thread_stop);
        });

        let (width, height) = ready_rx.recv().map_err(|_| SourceError::ThreadExited)??;
        log::info!("Capturing {location} at {width}x{height}");

        Ok(Self {
            shared,
            stop,
            handle: Some(handle),
            width,
            height,
        })
    }
}

impl FrameSource for FfmpegFrameSource {
    fn current_frame(&mut self) -> Result<Option<Frame>, Box<dyn std::error::Error>> {
        let shared = self
            .shared
            .lock()
            .map_err(|_| "capture state lock poisoned")?;
        if let Some(failure) = &shared.failure {
            return Err(failure.clone().into());
        }
        Ok(shared.latest.clone())
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn close(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::warn!("Capture thread panicked");
            }
        }
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        self.close();
    }
}

/// Decoder state owned by the capture thread.
struct Capture {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    stream_index: usize,
    time_base: f64,
    width: u32,
    height: u32,
}

impl Capture {
    fn open(location: &str, options: &CaptureOptions) -> Result<Self, SourceError> {
        ffmpeg_next::init().map_err(SourceError::Init)?;
        ffmpeg_next::device::register_all();

        let mut dict = ffmpeg_next::Dictionary::new();
        if let Some(size) = &options.video_size {
            dict.set("video_size", size);
        }
        if let Some(rate) = &options.framerate {
            dict.set("framerate", rate);
        }

        let open_err = |source| SourceError::Open {
            location: location.to_string(),
            source,
        };
        let ictx = match &options.format {
            Some(name) => {
                let format = find_input_format(name)?;
                ffmpeg_next::format::open_with(location, &format, dict)
                    .map_err(open_err)?
                    .input()
            }
            None => ffmpeg_next::format::input_with_dictionary(&location, dict).map_err(open_err)?,
        };

        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| SourceError::NoVideoStream(location.to_string()))?;
        let stream_index = stream.index();
        let time_base = f64::from(stream.time_base());

        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(SourceError::Decoder)?;
        let decoder = codec_ctx.decoder().video().map_err(SourceError::Decoder)?;
        let width = decoder.width();
        let height = decoder.height();

        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )
        .map_err(SourceError::Decoder)?;

        Ok(Self {
            ictx,
            decoder,
            scaler,
            stream_index,
            time_base,
            width,
            height,
        })
    }

    fn run(&mut self, shared: &Mutex<Shared>, stop: &AtomicBool) {
        let started = Instant::now();
        let mut clock = PresentationClock::default();

        let stream_index = self.stream_index;
        let time_base = self.time_base;
        let mut packets = self.ictx.packets();
        loop {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            let Some((stream, packet)) = packets.next() else {
                log::info!("Capture source reached end of stream");
                break;
            };
            if stream.index() != stream_index {
                continue;
            }
            if let Err(e) = self.decoder.send_packet(&packet) {
                log::debug!("Dropping undecodable packet: {e}");
                continue;
            }

            let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
            while self.decoder.receive_frame(&mut decoded).is_ok() {
                let mut rgb = ffmpeg_next::util::frame::video::Video::empty();
                if let Err(e) = self.scaler.run(&decoded, &mut rgb) {
                    publish_failure(shared, format!("pixel conversion failed: {e}"));
                    return;
                }
                let pts = decoded.timestamp().or(decoded.pts());
                let timestamp = clock.next(pts.map(|p| p as f64 * time_base), started.elapsed());

                pace(started, timestamp);

                let pixels = extract_rgb_pixels(&rgb, self.width, self.height);
                let frame = Frame::new(pixels, self.width, self.height, 3, timestamp);
                match shared.lock() {
                    Ok(mut guard) => guard.latest = Some(frame),
                    Err(_) => return,
                }
            }
        }
    }
}

fn find_input_format(name: &str) -> Result<ffmpeg_next::format::Format, SourceError> {
    ffmpeg_next::device::input::video()
        .find(|format| format.name() == name)
        .ok_or_else(|| SourceError::UnknownFormat(name.to_string()))
}

fn publish_failure(shared: &Mutex<Shared>, message: String) {
    log::error!("Capture stopped: {message}");
    if let Ok(mut guard) = shared.lock() {
        guard.failure = Some(message);
    }
}

/// Sleeps until `timestamp` seconds after `started`, so files play in real time.
fn pace(started: Instant, timestamp: f64) {
    let due = Duration::from_secs_f64(timestamp.max(0.0));
    let elapsed = started.elapsed();
    if due > elapsed {
        std::thread::sleep(due - elapsed);
    }
}

/// Produces non-decreasing timestamps relative to the first frame.
///
/// Streams without usable PTS fall back to wall-clock time since capture
/// started.
#[derive(Default)]
struct PresentationClock {
    origin: Option<f64>,
    last: f64,
}

impl PresentationClock {
    fn next(&mut self, pts_secs: Option<f64>, wall: Duration) -> f64 {
        let raw = match pts_secs {
            Some(pts) => {
                let origin = *self.origin.get_or_insert(pts);
                pts - origin
            }
            None => wall.as_secs_f64(),
        };
        self.last = raw.max(self.last);
        self.last
    }
}

fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;
    let h = height as usize;

    let mut pixels = Vec::with_capacity(w * h * 3);
    for row in 0..h {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}
