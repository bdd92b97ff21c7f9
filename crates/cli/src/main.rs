mod settings;

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;
use crossbeam_channel::Sender;

use spotlight_core::capture::domain::frame_source::FrameSource;
use spotlight_core::capture::infrastructure::ffmpeg_frame_source::{
    CaptureOptions, FfmpegFrameSource,
};
use spotlight_core::compositor::domain::compositor::Compositor;
use spotlight_core::compositor::domain::output_surface::OutputSurface;
use spotlight_core::compositor::infrastructure::image_file_surface::ImageFileSurface;
use spotlight_core::compositor::infrastructure::memory_surface::MemorySurface;
use spotlight_core::detection::domain::box_smoother::{BoxSmoother, SmoothingParams};
use spotlight_core::detection::domain::face_detector::{Delegate, DetectorConfig, ModelAsset};
use spotlight_core::detection::infrastructure::blazeface_provider::BlazefaceProvider;
use spotlight_core::detection::infrastructure::model_resolver;
use spotlight_core::pipeline::infrastructure::tick_scheduler::{run_event_loop, TickScheduler};
use spotlight_core::pipeline::loop_controller::{LoopController, LoopEvent};
use spotlight_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use spotlight_core::shared::constants::BLAZEFACE_MODEL_NAME;

use settings::Settings;

/// Follows the face in a live camera feed and shows it in a round preview.
///
/// Press Enter to start or stop detection, `q` then Enter to quit.
#[derive(Parser)]
#[command(name = "spotlight")]
struct Cli {
    /// Camera device, video file or stream URL (e.g. /dev/video0).
    source: String,

    /// Input format for capture devices: v4l2, avfoundation, dshow, ...
    #[arg(long)]
    format: Option<String>,

    /// Requested capture size, e.g. 640x480.
    #[arg(long)]
    video_size: Option<String>,

    /// Requested capture frame rate.
    #[arg(long)]
    framerate: Option<String>,

    /// Face detection model: local .onnx path or http(s) URL.
    #[arg(long)]
    model: Option<String>,

    /// Extra directory searched for the default model after the cache.
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Inference delegate: gpu or cpu.
    #[arg(long)]
    delegate: Option<String>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,

    /// Frame loop rate in ticks per second.
    #[arg(long)]
    fps: Option<f64>,

    /// Edge length of the square preview in pixels.
    #[arg(long)]
    size: Option<u32>,

    /// Show the square crop instead of a round bubble.
    #[arg(long)]
    no_circle: bool,

    /// Write the preview to this image file while a face is visible.
    #[arg(long)]
    preview_out: Option<PathBuf>,

    /// Write the preview file every Nth composed frame.
    #[arg(long, default_value = "1")]
    write_every: usize,

    /// Pixels added around each detected face.
    #[arg(long)]
    margin: Option<f64>,

    /// Smallest box change (pixels) that moves the spotlight.
    #[arg(long)]
    threshold: Option<f64>,

    /// Fraction the spotlight moves towards a new detection (0.0-1.0].
    #[arg(long)]
    alpha: Option<f64>,

    /// Wait for Enter before starting detection.
    #[arg(long)]
    paused: bool,

    /// Quit after this many seconds.
    #[arg(long)]
    duration: Option<f64>,

    /// Store the effective options as defaults for later runs.
    #[arg(long)]
    save_settings: bool,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = merge(&cli, Settings::load());
    validate(&cli, &settings)?;

    if cli.save_settings {
        let path = settings.save()?;
        log::info!("Settings saved to {}", path.display());
    }

    let options = CaptureOptions {
        format: cli.format.clone(),
        video_size: cli.video_size.clone(),
        framerate: cli.framerate.clone(),
    };
    let source = FfmpegFrameSource::open(&cli.source, &options).map_err(|e| {
        log::error!("Cannot open camera {}: {e}", cli.source);
        e
    })?;
    let (width, height) = source.dimensions();
    log::info!("Capturing {width}x{height} from {}", cli.source);

    let size = settings.preview_size;
    let surface: Box<dyn OutputSurface> = match &cli.preview_out {
        Some(path) => {
            Box::new(ImageFileSurface::new(path.clone(), size, size).with_write_every(cli.write_every))
        }
        None => Box::new(MemorySurface::new(size, size)),
    };

    ensure_default_model(&settings, cli.models_dir.as_deref())?;
    let mut provider = BlazefaceProvider::new().with_download_progress(download_progress);
    if let Some(dir) = &cli.models_dir {
        provider = provider.with_bundled_dir(dir.clone());
    }
    let config = detector_config(&settings)?;
    let params = SmoothingParams {
        margin: settings.margin,
        threshold: settings.threshold,
        alpha: settings.alpha,
    };

    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    let mut controller = LoopController::new(
        Box::new(source),
        surface,
        Arc::new(provider),
        config,
    )
    .with_smoother(Box::new(BoxSmoother::new(params)))
    .with_compositor(Compositor::new().with_circle_mask(settings.circle_mask))
    .with_logger(Box::new(StdoutPipelineLogger::default()));
    let mut scheduler = TickScheduler::new(settings.fps);

    spawn_stdin_reader(events_tx.clone(), cli.duration.is_none())?;
    if let Some(seconds) = cli.duration {
        spawn_timer(events_tx.clone(), Duration::from_secs_f64(seconds))?;
    }
    if cli.paused {
        eprintln!("Paused. Press Enter to start, q to quit.");
    } else {
        events_tx.send(LoopEvent::Start)?;
    }
    drop(events_tx);

    run_event_loop(&mut controller, &mut scheduler, &events_rx);
    Ok(())
}

/// CLI flags win over stored settings.
fn merge(cli: &Cli, stored: Settings) -> Settings {
    Settings {
        model: cli.model.clone().or(stored.model),
        delegate: cli.delegate.clone().unwrap_or(stored.delegate),
        confidence: cli.confidence.unwrap_or(stored.confidence),
        margin: cli.margin.unwrap_or(stored.margin),
        threshold: cli.threshold.unwrap_or(stored.threshold),
        alpha: cli.alpha.unwrap_or(stored.alpha),
        preview_size: cli.size.unwrap_or(stored.preview_size),
        circle_mask: stored.circle_mask && !cli.no_circle,
        fps: cli.fps.unwrap_or(stored.fps),
    }
}

fn detector_config(settings: &Settings) -> Result<DetectorConfig, Box<dyn std::error::Error>> {
    let model = match &settings.model {
        Some(location) => ModelAsset::parse(location),
        None => ModelAsset::Named(BLAZEFACE_MODEL_NAME.to_string()),
    };
    Ok(DetectorConfig {
        model,
        delegate: settings.delegate.parse::<Delegate>()?,
        confidence: settings.confidence,
    })
}

/// Fails early when no model was given and the default one is not on disk.
fn ensure_default_model(
    settings: &Settings,
    models_dir: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    if settings.model.is_some() {
        return Ok(());
    }
    if model_resolver::locate(BLAZEFACE_MODEL_NAME, models_dir)?.is_some() {
        return Ok(());
    }
    let cache_dir = model_resolver::model_cache_dir()?;
    Err(format!(
        "Face detection model {BLAZEFACE_MODEL_NAME} not found in {}. \
         Pass --model with a local .onnx path or an http(s) URL, \
         or --models-dir with a directory containing {BLAZEFACE_MODEL_NAME}.",
        cache_dir.display()
    )
    .into())
}

fn validate(cli: &Cli, settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    if !(0.0..=1.0).contains(&settings.confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            settings.confidence
        )
        .into());
    }
    if !(settings.alpha > 0.0 && settings.alpha <= 1.0) {
        return Err(format!("Alpha must be in (0.0, 1.0], got {}", settings.alpha).into());
    }
    if !(settings.margin >= 0.0) {
        return Err(format!("Margin must be non-negative, got {}", settings.margin).into());
    }
    if !(settings.threshold >= 0.0) {
        return Err(format!(
            "Threshold must be non-negative, got {}",
            settings.threshold
        )
        .into());
    }
    if !(settings.fps > 0.0 && settings.fps.is_finite()) {
        return Err(format!("FPS must be positive, got {}", settings.fps).into());
    }
    if settings.preview_size == 0 {
        return Err("Preview size must be at least 1 pixel".into());
    }
    if cli.write_every == 0 {
        return Err("--write-every must be at least 1".into());
    }
    if let Some(seconds) = cli.duration {
        if !(seconds > 0.0 && seconds.is_finite()) {
            return Err(format!("Duration must be positive, got {seconds}").into());
        }
    }
    if let Some(size) = &cli.video_size {
        if !is_video_size(size) {
            return Err(format!("Video size must look like 640x480, got '{size}'").into());
        }
    }
    settings.delegate.parse::<Delegate>()?;
    Ok(())
}

fn is_video_size(value: &str) -> bool {
    value
        .split_once('x')
        .map(|(w, h)| w.parse::<u32>().is_ok_and(|w| w > 0) && h.parse::<u32>().is_ok_and(|h| h > 0))
        .unwrap_or(false)
}

fn spawn_stdin_reader(events: Sender<LoopEvent>, quit_on_eof: bool) -> std::io::Result<()> {
    thread::Builder::new()
        .name("stdin".into())
        .spawn(move || read_commands(std::io::stdin().lock(), &events, quit_on_eof))?;
    Ok(())
}

/// Empty line toggles detection, `q` quits. End of input quits too unless
/// something else will end the run.
fn read_commands(input: impl BufRead, events: &Sender<LoopEvent>, quit_on_eof: bool) {
    for line in input.lines() {
        let Ok(line) = line else { break };
        let event = match line.trim() {
            "" => LoopEvent::Toggle,
            "start" => LoopEvent::Start,
            "stop" => LoopEvent::Stop,
            "q" | "quit" => LoopEvent::Quit,
            other => {
                eprintln!("Unknown command '{other}'. Enter toggles, q quits.");
                continue;
            }
        };
        let quit = matches!(event, LoopEvent::Quit);
        if events.send(event).is_err() || quit {
            return;
        }
    }
    if quit_on_eof {
        log::info!("Input closed, quitting");
        let _ = events.send(LoopEvent::Quit);
    }
}

fn spawn_timer(events: Sender<LoopEvent>, after: Duration) -> std::io::Result<()> {
    thread::Builder::new()
        .name("duration".into())
        .spawn(move || {
            thread::sleep(after);
            let _ = events.send(LoopEvent::Quit);
        })?;
    Ok(())
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face detection model... {pct}%");
    } else {
        eprint!("\rDownloading face detection model... {downloaded} bytes");
    }
}
