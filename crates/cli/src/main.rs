use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use clap::Parser;

use facemood_core::capture::infrastructure::nokhwa_frame_source::NokhwaFrameSource;
use facemood_core::detection::domain::expression_detector::{ExpressionDetector, ModelLoadError};
use facemood_core::detection::infrastructure::model_resolver;
use facemood_core::detection::infrastructure::onnx_expression_detector::OnnxExpressionDetector;
use facemood_core::overlay::infrastructure::pixel_canvas::PixelCanvas;
use facemood_core::overlay::infrastructure::snapshot_writer::SnapshotWriter;
use facemood_core::pipeline::detection_loop::{CycleFn, LoopConfig};
use facemood_core::pipeline::loop_logger::StdoutLoopLogger;
use facemood_core::pipeline::session::{DetectorLoader, OverlaySession};
use facemood_core::shared::constants::{DEFAULT_CONFIDENCE, DEFAULT_TICK_PERIOD_MS};

/// Live facial-expression overlay from a webcam.
#[derive(Parser)]
#[command(name = "facemood")]
struct Cli {
    /// Camera device index.
    #[arg(long, default_value = "0")]
    camera_index: u32,

    /// Poll cadence in milliseconds.
    #[arg(long, default_value_t = DEFAULT_TICK_PERIOD_MS)]
    tick_period_ms: u64,

    /// Directory containing the model files (skips cache and download).
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// Display size as WIDTHxHEIGHT when the video is shown scaled.
    #[arg(long)]
    display_size: Option<String>,

    /// Face-detection confidence threshold (0.0-1.0).
    #[arg(long, default_value_t = DEFAULT_CONFIDENCE)]
    confidence: f32,

    /// Save annotated PNG snapshots of each cycle to this directory.
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Stop after this many seconds instead of waiting for Enter.
    #[arg(long)]
    duration: Option<u64>,

    /// List attached cameras and exit.
    #[arg(long)]
    list_cameras: bool,
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
    validate(&cli)?;

    if cli.list_cameras {
        for (index, name) in NokhwaFrameSource::list_devices()?.iter().enumerate() {
            println!("{index}: {name}");
        }
        return Ok(());
    }

    let display_size = cli
        .display_size
        .as_deref()
        .map(parse_display_size)
        .transpose()?;

    let config = LoopConfig {
        tick_period: Duration::from_millis(cli.tick_period_ms),
        display_size,
        on_cycle: build_cycle_callback(cli.snapshot_dir.as_deref())?,
    };

    let mut session = OverlaySession::new(
        Box::new(NokhwaFrameSource::new(cli.camera_index)),
        build_loader(cli.model_dir, cli.confidence),
        Box::new(PixelCanvas::new(1, 1)),
        Box::new(StdoutLoopLogger::new()),
        config,
    );

    session.start()?;
    log::info!("Loop is polling (state: {})", session.state());

    match cli.duration {
        Some(secs) => std::thread::sleep(Duration::from_secs(secs)),
        None => {
            eprintln!("Press Enter to stop.");
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
        }
    }

    session.stop();
    eprintln!();
    Ok(())
}

/// Resolve model assets and build the two-stage detector. Runs inside the
/// session's `ModelLoading` state.
fn build_loader(model_dir: Option<PathBuf>, confidence: f32) -> DetectorLoader {
    Box::new(move || {
        let paths = model_resolver::resolve_all(
            model_dir.as_deref(),
            Some(Box::new(download_progress)),
        )
        .map_err(|e| ModelLoadError::Resolve(e.to_string()))?;
        eprintln!();

        let detector = OnnxExpressionDetector::load(&paths.face, &paths.emotion, confidence)?;
        Ok(Box::new(detector) as Box<dyn ExpressionDetector>)
    })
}

/// Per-cycle status line, plus snapshot output when requested.
fn build_cycle_callback(
    snapshot_dir: Option<&Path>,
) -> Result<Option<CycleFn>, Box<dyn std::error::Error>> {
    let mut writer = snapshot_dir.map(SnapshotWriter::new).transpose()?;

    Ok(Some(Box::new(move |frame, faces| {
        match faces.first() {
            Some(face) => eprint!("\rExpression: {}          ", face.label()),
            None => eprint!("\rExpression: none          "),
        }
        if let Some(writer) = writer.as_mut() {
            if let Err(e) = writer.save(frame, faces) {
                log::warn!("snapshot failed: {e}");
            }
        }
    })))
}

fn download_progress(name: &str, downloaded: u64, total: u64) {
    if total > 0 {
        let pct = downloaded as f64 / total as f64 * 100.0;
        eprint!("\rDownloading {name}: {pct:.0}%");
    } else {
        eprint!("\rDownloading {name}: {downloaded} bytes");
    }
}

fn parse_display_size(spec: &str) -> Result<(u32, u32), Box<dyn std::error::Error>> {
    let (w, h) = spec
        .split_once('x')
        .ok_or_else(|| format!("display size must be WIDTHxHEIGHT, got {spec}"))?;
    let width: u32 = w.parse()?;
    let height: u32 = h.parse()?;
    if width == 0 || height == 0 {
        return Err(format!("display size must be positive, got {spec}").into());
    }
    Ok((width, height))
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if cli.tick_period_ms == 0 {
        return Err("Tick period must be at least 1ms".into());
    }
    if !(0.0..=1.0).contains(&cli.confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            cli.confidence
        )
        .into());
    }
    Ok(())
}
