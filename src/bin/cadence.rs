use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use cadence::{CaptureConfig, CaptureSession, FrameImage, FrameSource};

#[derive(Parser, Debug)]
#[command(name = "cadence", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Record a synthetic animated gradient as a numbered PNG sequence.
    Capture(CaptureArgs),
}

#[derive(Parser, Debug)]
struct CaptureArgs {
    /// JSON capture config; inline flags below are ignored when set.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output directory for numbered frames.
    #[arg(long, default_value = "frames")]
    out: PathBuf,

    /// Frame queue capacity.
    #[arg(long, default_value_t = 120)]
    capacity: usize,

    /// Writer threads while recording.
    #[arg(long, default_value_t = 2)]
    write_threads: usize,

    /// Writer threads during a drain.
    #[arg(long, default_value_t = 4)]
    clearing_threads: usize,

    /// Render/recording rate in Hz.
    #[arg(long, default_value_t = 60)]
    fps: u32,

    /// Capture duration in seconds.
    #[arg(long, default_value_t = 3)]
    seconds: u64,

    /// Canvas width in pixels.
    #[arg(long, default_value_t = 320)]
    width: u32,

    /// Canvas height in pixels.
    #[arg(long, default_value_t = 180)]
    height: u32,
}

/// Scrolling two-axis gradient; cheap enough to render at high rates.
struct GradientSource {
    width: u32,
    height: u32,
    tick: u64,
    frame: FrameImage,
}

impl GradientSource {
    fn new(width: u32, height: u32) -> anyhow::Result<Self> {
        let frame = FrameImage::filled(width, height, [0, 0, 0, 255])?;
        Ok(Self {
            width,
            height,
            tick: 0,
            frame,
        })
    }
}

impl FrameSource for GradientSource {
    fn render(&mut self) {
        let phase = (self.tick % 256) as u8;
        for y in 0..self.height {
            for x in 0..self.width {
                let i = ((y * self.width + x) * 4) as usize;
                self.frame.data[i] = (x as u8).wrapping_add(phase);
                self.frame.data[i + 1] = (y as u8).wrapping_add(phase);
                self.frame.data[i + 2] = phase;
                self.frame.data[i + 3] = 255;
            }
        }
        self.tick += 1;
    }

    fn snapshot(&mut self) -> FrameImage {
        self.frame.clone()
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Capture(args) => cmd_capture(args),
    }
}

fn cmd_capture(args: CaptureArgs) -> anyhow::Result<()> {
    let cfg = match &args.config {
        Some(path) => CaptureConfig::from_path(path)?,
        None => CaptureConfig {
            buffer_capacity: args.capacity,
            write_threads: args.write_threads,
            clearing_threads: args.clearing_threads,
            out_dir: args.out.clone(),
            render_hz: args.fps,
        },
    };

    let source = GradientSource::new(args.width, args.height)?;
    let out_dir = cfg.out_dir.clone();
    let mut session = CaptureSession::new(cfg, source)?;

    session.start_recording()?;
    std::thread::sleep(Duration::from_secs(args.seconds));
    session.stop_recording()?;

    eprintln!(
        "wrote {} frames to {}",
        session.frame_counter(),
        out_dir.display()
    );
    Ok(())
}
