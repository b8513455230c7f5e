use anyhow::{Context, Result};
use clap::Parser;
use hsv_roi::app::{App, Control, StatusChange, UiEvent};
use hsv_roi::capture::{CameraProvider, DeviceSelector, NokhwaProvider};
use hsv_roi::config::SessionConfig;
use hsv_roi::export::DirectorySink;
use hsv_roi::geometry::RectSpec;
use hsv_roi::output::{OutputSink, PngPreview, V4L2Output};
use hsv_roi::session::{CaptureSession, Mode};
use std::collections::VecDeque;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Camera to open: an index, `front` or `back`
    #[arg(short, long, default_value = "0")]
    device: DeviceSelector,

    /// Start from a still image instead of the camera
    #[arg(short, long)]
    image: Option<PathBuf>,

    /// HSV config JSON to load on startup
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Rectangle size as WIDTHxHEIGHT
    #[arg(long, default_value = "400x200")]
    rect: RectSpec,

    /// Hide the rectangle and skip the area measurement
    #[arg(long)]
    no_rect: bool,

    /// Directory saved images, CSV and config files go to
    #[arg(short, long, default_value = ".")]
    out_dir: PathBuf,

    /// Target frames per second for the live view
    #[arg(long, default_value_t = 30)]
    fps: u32,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Mirror the visible frame to a v4l2loopback device
    #[arg(long)]
    preview_device: Option<String>,

    /// v4l2loopback output width
    #[arg(long, default_value_t = 1280)]
    preview_width: u32,

    /// v4l2loopback output height
    #[arg(long, default_value_t = 720)]
    preview_height: u32,

    /// Keep a PNG of the visible frame at this path
    #[arg(long)]
    preview_png: Option<PathBuf>,

    /// Run the events in this file before reading stdin
    #[arg(long)]
    script: Option<PathBuf>,

    /// List cameras and exit
    #[arg(long)]
    list_devices: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let provider = NokhwaProvider;

    if args.list_devices {
        let devices = provider.enumerate().context("Failed to list cameras")?;
        for device in devices {
            println!("{}\t{}", device.index, device.label);
        }
        return Ok(());
    }

    tracing::info!("hsv-roi starting");
    tracing::info!("Rectangle: {} ({})", args.rect, if args.no_rect { "hidden" } else { "shown" });
    tracing::info!("Saving to {}", args.out_dir.display());
    tracing::info!("Target FPS: {}", args.fps);

    let mut session = CaptureSession::new(
        provider,
        SessionConfig {
            rect: args.rect,
            show_rect: !args.no_rect,
            ..SessionConfig::default()
        },
    );

    if let Some(path) = &args.config {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        session
            .load_config(&json)
            .with_context(|| format!("Failed to load config {}", path.display()))?;
    }

    let mut app = App::new(session, Box::new(DirectorySink::new(&args.out_dir)));

    // The first source is opened like any later one, so a missing camera is
    // reported and the session stays usable through `open`
    let first = match &args.image {
        Some(path) => UiEvent::OpenImage(path.clone()),
        None => UiEvent::Camera(args.device),
    };
    app.handle(first, Instant::now());
    if app.session().mode() == Mode::Idle {
        tracing::warn!("No source is open; try `camera <index>` or `open <path>`");
    } else {
        let (width, height) = app.session().canvas_size();
        tracing::info!("Canvas: {}x{}", width, height);
    }

    let mut outputs: Vec<Box<dyn OutputSink>> = Vec::new();
    if let Some(device) = &args.preview_device {
        let output = V4L2Output::new(device, args.preview_width, args.preview_height)
            .context("Failed to initialize v4l2loopback output")?;
        outputs.push(Box::new(output));
    }
    if let Some(path) = &args.preview_png {
        outputs.push(Box::new(PngPreview::new(path)));
    }

    let mut queue = VecDeque::new();
    if let Some(path) = &args.script {
        let script = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?;
        queue.extend(parse_script(&script));
    }

    run_loop(&mut app, &mut outputs, queue, spawn_stdin_reader(), args.fps)?;

    tracing::info!("hsv-roi stopped");
    Ok(())
}

/// One event per line; blank lines and `#` comments are skipped
fn parse_script(script: &str) -> Vec<UiEvent> {
    script
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty() && !line.trim_start().starts_with('#'))
        .filter_map(|(number, line)| match line.parse() {
            Ok(event) => Some(event),
            Err(e) => {
                tracing::warn!("script line {}: {}", number + 1, e);
                None
            }
        })
        .collect()
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// Running totals for the per-iteration timing log
#[derive(Debug, Default)]
struct FrameStats {
    frames: u64,
    tick: Duration,
    filter: Duration,
    output: Duration,
}

impl FrameStats {
    fn record(&mut self, tick: Duration, filter: Duration, output: Duration) {
        self.frames += 1;
        self.tick += tick;
        self.filter += filter;
        self.output += output;
    }

    /// Mean capture, filter and output time per iteration, in ms
    fn averages_ms(&self) -> (f64, f64, f64) {
        let per_frame = |total: Duration| total.as_secs_f64() * 1000.0 / self.frames.max(1) as f64;
        (per_frame(self.tick), per_frame(self.filter), per_frame(self.output))
    }
}

fn show_status(change: StatusChange, is_error: bool) {
    match change {
        StatusChange::Shown(text) if is_error => println!("[error] {text}"),
        StatusChange::Shown(text) => println!("[status] {text}"),
        StatusChange::Cleared => println!("[status]"),
    }
}

fn run_loop<P: CameraProvider>(
    app: &mut App<P>,
    outputs: &mut [Box<dyn OutputSink>],
    mut queue: VecDeque<UiEvent>,
    input: Receiver<String>,
    target_fps: u32,
) -> Result<()> {
    let frame_duration = Duration::from_secs_f32(1.0 / target_fps.max(1) as f32);
    let mut resume_at: Option<Instant> = None;
    let mut input_open = true;
    let mut stats = FrameStats::default();

    tracing::info!("Type `quit` or press Ctrl+C to stop");

    loop {
        let loop_start = Instant::now();

        // Events
        while input_open {
            match input.try_recv() {
                Ok(line) if line.trim().is_empty() => {}
                Ok(line) => match line.parse() {
                    Ok(event) => queue.push_back(event),
                    Err(e) => tracing::warn!("{}", e),
                },
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => input_open = false,
            }
        }
        while resume_at.map_or(true, |t| loop_start >= t) {
            resume_at = None;
            let Some(event) = queue.pop_front() else { break };
            // a wait always lets at least one frame through
            if let UiEvent::Wait(delay) = event {
                resume_at = Some(loop_start + delay);
                break;
            }
            if app.handle(event, loop_start) == Control::Quit {
                return Ok(());
            }
        }

        // Live camera frame
        let tick_start = Instant::now();
        if app.session().render_loop_active() {
            if let Err(e) = app.session_mut().tick() {
                app.status_mut().error(&e);
                app.session_mut().teardown();
            }
        }
        let tick_time = tick_start.elapsed();

        // Deferred filter run
        let filter_start = Instant::now();
        app.run_pending();
        let filter_time = filter_start.elapsed();

        // Display surfaces
        let output_start = Instant::now();
        if !outputs.is_empty() {
            if let Some(frame) = app.session().display_frame() {
                for output in outputs.iter_mut() {
                    output
                        .write_frame(&frame)
                        .context("Failed to write frame")?;
                }
            }
        }
        stats.record(tick_time, filter_time, output_start.elapsed());

        if let Some(change) = app.status_mut().poll(Instant::now()) {
            show_status(change, app.status().is_error());
        }

        if !input_open && queue.is_empty() && resume_at.is_none() {
            tracing::info!("Input closed");
            return Ok(());
        }

        // Log stats every 30 frames
        if stats.frames % 30 == 0 {
            let (avg_tick_ms, avg_filter_ms, avg_output_ms) = stats.averages_ms();
            tracing::debug!(
                "Frame {}: capture={:.1}ms, filter={:.1}ms, output={:.1}ms",
                stats.frames,
                avg_tick_ms,
                avg_filter_ms,
                avg_output_ms
            );
        }

        // Frame rate limiting
        let elapsed = loop_start.elapsed();
        if elapsed < frame_duration {
            std::thread::sleep(frame_duration - elapsed);
        }
    }
}
