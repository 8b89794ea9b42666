//! mas-perception CLI: batch cropping and box drawing on image files.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use mas_perception::core::{DrawStyle, ImageEncoding, PipelineParams};
use mas_perception::io::{run_crop_job, run_draw, CropJobConfig};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "mas-perception")]
#[command(about = "Crop detected objects out of images and draw labeled boxes")]
#[command(version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON (only with the `tracing` feature).
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crop 3D boxes out of an image through the camera calibration.
    Crop(CropArgs),

    /// Draw labeled 2D boxes onto an image.
    Draw(DrawArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum EncodingArg {
    Rgb8,
    Bgr8,
}

impl From<EncodingArg> for ImageEncoding {
    fn from(value: EncodingArg) -> Self {
        match value {
            EncodingArg::Rgb8 => ImageEncoding::Rgb8,
            EncodingArg::Bgr8 => ImageEncoding::Bgr8,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct CropArgs {
    /// JSON job config; the flags below override its fields.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Input image file.
    #[arg(long, required_unless_present = "config")]
    image: Option<PathBuf>,

    /// CameraInfo message (JSON).
    #[arg(long, required_unless_present = "config")]
    camera_info: Option<PathBuf>,

    /// BoundingBoxList message (JSON).
    #[arg(long, required_unless_present = "config")]
    boxes: Option<PathBuf>,

    /// Directory for the crops and report.json.
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Margin in pixels around every box.
    #[arg(long)]
    offset: Option<i32>,

    /// Encoding of the crop messages.
    #[arg(long, value_enum)]
    encoding: Option<EncodingArg>,

    /// Write the effective job config to this path.
    #[arg(long)]
    save_config: Option<PathBuf>,
}

impl CropArgs {
    fn to_config(&self) -> CliResult<CropJobConfig> {
        let mut cfg = match &self.config {
            Some(path) => CropJobConfig::load_json(path)?,
            None => CropJobConfig {
                image_path: String::new(),
                camera_info_path: String::new(),
                boxes_path: String::new(),
                output_dir: "crops".to_string(),
                frame_id: String::new(),
                params: PipelineParams::default(),
            },
        };
        if let Some(p) = &self.image {
            cfg.image_path = p.display().to_string();
        }
        if let Some(p) = &self.camera_info {
            cfg.camera_info_path = p.display().to_string();
        }
        if let Some(p) = &self.boxes {
            cfg.boxes_path = p.display().to_string();
        }
        if let Some(p) = &self.out_dir {
            cfg.output_dir = p.display().to_string();
        }
        if let Some(offset) = self.offset {
            cfg.params.crop_offset = offset;
        }
        if let Some(encoding) = self.encoding {
            cfg.params.output_encoding = encoding.into();
        }
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Args)]
struct DrawArgs {
    /// Input image file.
    #[arg(long)]
    image: PathBuf,

    /// JSON array of 2D boxes.
    #[arg(long)]
    boxes: PathBuf,

    /// Output image file.
    #[arg(long)]
    out: PathBuf,

    /// Border width in pixels.
    #[arg(long, default_value_t = 2)]
    thickness: i32,

    /// Label size relative to the default.
    #[arg(long, default_value_t = 1.0)]
    font_scale: f32,

    /// TrueType/OpenType font for labels instead of the built-in one.
    #[arg(long)]
    font: Option<PathBuf>,
}

fn init_logging(verbose: u8, json: bool) {
    let level = match verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    #[cfg(feature = "tracing")]
    {
        let _ = tracing_log::LogTracer::init_with_filter(level);
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.as_str().to_lowercase()));
        if json {
            let _ = tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .try_init();
        } else {
            let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
        }
    }

    #[cfg(not(feature = "tracing"))]
    {
        if json {
            eprintln!("--log-json needs the `tracing` feature; using plain logs");
        }
        let _ = mas_perception::core::init_with_level(level);
    }
}

fn main() -> CliResult<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Crop(args) => run_crop(&args),
        Commands::Draw(args) => run_draw_cmd(&args),
    }
}

fn run_crop(args: &CropArgs) -> CliResult<()> {
    let cfg = args.to_config()?;
    if let Some(path) = &args.save_config {
        cfg.write_json(path)?;
        log::info!("config written to {}", path.display());
    }

    let report = run_crop_job(&cfg)?;
    for (path, vertices) in report.crops.iter().zip(&report.vertices) {
        println!("{}\t{:?}", path.display(), vertices);
    }
    Ok(())
}

fn run_draw_cmd(args: &DrawArgs) -> CliResult<()> {
    let mut style = DrawStyle::new(args.thickness, args.font_scale);
    if let Some(font) = &args.font {
        style = style.with_font_bytes(std::fs::read(font)?)?;
    }
    run_draw(&args.image, &args.boxes, &args.out, &style)?;
    log::info!("annotated image written to {}", args.out.display());
    Ok(())
}
