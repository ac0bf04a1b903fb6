use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use kurbo::Point;

use aquamark::{
    SurfaceGeometry, WatermarkSpec,
    export_image::export_image,
    export_video::export_video,
    geometry::PresetPosition,
    media::{decode_image_bytes, load_image, probe_video},
    model::MediaAsset,
    record::{FfmpegCodecProbe, FfmpegRecorderFactory},
    text::WatermarkFont,
};

#[derive(Parser)]
#[command(name = "aquamark", version, about = "Bake a watermark into an image or video")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watermark a still image and write a PNG.
    Image {
        /// Input image file.
        input: PathBuf,
        #[command(flatten)]
        mark: MarkArgs,
        /// Output path; defaults to the generated `watermarked-*.png` name.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Watermark a video, re-encoding it frame by frame.
    Video {
        /// Input video file.
        input: PathBuf,
        #[command(flatten)]
        mark: MarkArgs,
        /// Output path; defaults to the generated name with the negotiated
        /// container's extension.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct MarkArgs {
    /// Watermark text. Mutually exclusive with --logo.
    #[arg(long, conflicts_with = "logo")]
    text: Option<String>,
    /// Watermark image file. Mutually exclusive with --text.
    #[arg(long)]
    logo: Option<PathBuf>,
    /// Font file (TTF/OTF) for text watermarks.
    #[arg(long)]
    font: Option<PathBuf>,
    /// Opacity percent, 0-100.
    #[arg(long, default_value_t = 70.0)]
    opacity: f64,
    /// Scale percent (>= 10).
    #[arg(long, default_value_t = 50.0)]
    scale: f64,
    /// Rotation in degrees, 0-360.
    #[arg(long, default_value_t = 0.0)]
    rotation: f64,
    /// Named position preset ("Top Left" .. "Bottom Right").
    #[arg(long, conflicts_with_all = ["x", "y"])]
    position: Option<String>,
    /// Anchor x in surface pixels (the media's native width here).
    #[arg(long)]
    x: Option<f64>,
    /// Anchor y in surface pixels.
    #[arg(long)]
    y: Option<f64>,
}

impl MarkArgs {
    fn build_spec(&self, surface: SurfaceGeometry) -> Result<WatermarkSpec> {
        let mut spec = match (&self.text, &self.logo) {
            (Some(text), None) => WatermarkSpec::text(text.clone()),
            (None, Some(path)) => {
                let bytes = std::fs::read(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                WatermarkSpec::image(Arc::new(decode_image_bytes(&bytes)?))
            }
            _ => anyhow::bail!("exactly one of --text or --logo is required"),
        };
        spec.opacity_percent = self.opacity;
        spec.scale_percent = self.scale;
        spec.rotation_degrees = self.rotation;
        spec.anchor = match (&self.position, self.x, self.y) {
            (Some(label), _, _) => {
                let preset = PresetPosition::from_label(label)
                    .with_context(|| format!("unknown position `{label}`"))?;
                aquamark::preset_anchor(preset, surface)
            }
            (None, Some(x), Some(y)) => Point::new(x, y),
            (None, None, None) => Point::new(surface.width / 2.0, surface.height / 2.0),
            _ => anyhow::bail!("--x and --y must be given together"),
        };
        spec.validate()?;
        Ok(spec)
    }

    fn load_font(&self) -> Result<Option<WatermarkFont>> {
        let Some(path) = &self.font else {
            if self.text.is_some() {
                anyhow::bail!("--font is required for text watermarks");
            }
            return Ok(None);
        };
        let bytes =
            std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        Ok(Some(WatermarkFont::from_bytes(bytes)?))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Image {
            input,
            mark,
            output,
        } => {
            let pixmap = load_image(&input)?;
            let asset = MediaAsset::from_image(pixmap);
            // The CLI has no interactive viewport; the surface is the native
            // size, so anchor coordinates are native pixels.
            let surface = SurfaceGeometry::new(
                f64::from(asset.native.width),
                f64::from(asset.native.height),
            );
            let spec = mark.build_spec(surface)?;
            let font = mark.load_font()?;
            let result = export_image(&asset, &spec, surface, font.as_ref())?;
            let path = output.unwrap_or_else(|| PathBuf::from(&result.filename));
            std::fs::write(&path, &result.data)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("{}", path.display());
        }
        Command::Video {
            input,
            mark,
            output,
        } => {
            let info = probe_video(&input)?;
            let surface = SurfaceGeometry::new(f64::from(info.width), f64::from(info.height));
            let spec = mark.build_spec(surface)?;
            let font = mark.load_font()?;
            let probe = FfmpegCodecProbe::detect()?;
            let result = export_video(
                &info,
                &spec,
                surface,
                font.as_ref(),
                &FfmpegRecorderFactory,
                &probe,
                None,
                |progress| {
                    if progress.ratio > 0.0 {
                        eprint!("\r{:5.1}%", progress.ratio * 100.0);
                    }
                },
            )?;
            eprintln!();
            let path = output.unwrap_or_else(|| PathBuf::from(&result.filename));
            std::fs::write(&path, &result.data)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("{}", path.display());
        }
    }
    Ok(())
}
