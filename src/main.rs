use clap::{Args, Parser, Subcommand};
use imgchain::config::{self, EngineConfig};
use imgchain::imaging::{
    Alignment, ComposeParams, CropParams, Engine, HorizontalAlign, ImageFormat, Operation,
    OutputParams, OverlaySize, Quality, ScaleParams, SizeAndMargin, TextParams, ThumbnailParams,
    VerticalAlign,
};
use imgchain::{logging, pipeline};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "imgchain")]
#[command(about = "Chainable image transformations for still and animated images")]
#[command(long_about = "\
Chainable image transformations for still and animated images

Operations run in a fixed order: thumbnail, scale, crop, overlay, text.
Animated GIFs are processed frame by frame and written back as animations.

Examples:

  imgchain process photo.jpg -o small.webp --thumbnail 800x0
  imgchain process banner.gif -o out.gif --thumbnail 320x180:crop --text \"Sale\" --text-width 0.5 --shadow \"#000000\"
  imgchain batch photos/ -o thumbs/ --thumbnail 400x400:crop --format jpg --json

Run 'imgchain gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Config file (defaults to stock settings)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Raise log verbosity (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Transform one image
    Process(ProcessArgs),
    /// Transform every image in a directory tree in parallel
    Batch(BatchArgs),
    /// Print a stock config.toml with all options documented
    GenConfig,
}

/// Flags shared by commands that write images.
#[derive(Args, Clone)]
struct OutputArgs {
    /// Output format (jpg, png, gif, tiff, webp, bmp). Defaults to the output
    /// extension, then to the input format
    #[arg(long, value_parser = parse_format)]
    format: Option<ImageFormat>,

    /// Lossy quality 0-100 (overrides [output] quality)
    #[arg(long)]
    quality: Option<u8>,

    /// Ask the encoder to keep metadata
    #[arg(long)]
    keep_metadata: bool,
}

/// The operation chain, applied in field order.
#[derive(Args, Clone, Default)]
struct ChainArgs {
    /// Thumbnail box WIDTHxHEIGHT[:crop][:force]; 0 leaves an axis unbounded
    #[arg(long, value_parser = parse_thumbnail)]
    thumbnail: Option<ThumbnailParams>,

    /// Scale factor H or HxV
    #[arg(long, value_parser = parse_scale)]
    scale: Option<ScaleParams>,

    /// Crop region LEFT,TOP,WIDTH,HEIGHT
    #[arg(long, value_parser = parse_crop)]
    crop: Option<CropParams>,

    /// Overlay image file
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// Overlay width as a fraction of the image width
    #[arg(long, default_value_t = 0.25)]
    overlay_width: f32,

    /// Text to draw
    #[arg(long)]
    text: Option<String>,

    /// Text width as a fraction of the image width
    #[arg(long, default_value_t = 0.5)]
    text_width: f32,

    /// Text colour
    #[arg(long)]
    text_color: Option<String>,

    /// Shadow colour behind the text
    #[arg(long)]
    shadow: Option<String>,

    /// Overlay and text alignment HORIZONTAL,VERTICAL (e.g. center,bottom)
    #[arg(long, value_parser = parse_alignment, default_value = "left,top")]
    align: Alignment,
}

#[derive(Args)]
struct ProcessArgs {
    /// Input image
    input: PathBuf,

    /// Output file
    #[arg(short, long)]
    output: PathBuf,

    #[command(flatten)]
    chain: ChainArgs,

    #[command(flatten)]
    out: OutputArgs,
}

#[derive(Args)]
struct BatchArgs {
    /// Input directory
    input: PathBuf,

    /// Output directory
    #[arg(short, long)]
    output: PathBuf,

    #[command(flatten)]
    chain: ChainArgs,

    #[command(flatten)]
    out: OutputArgs,

    /// Print a JSON summary instead of per-file lines
    #[arg(long)]
    json: bool,
}

/// Outcome of one file in a batch run.
#[derive(Debug, Serialize)]
struct BatchEntry {
    input: PathBuf,
    output: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct BatchSummary {
    processed: usize,
    failed: usize,
    threads: usize,
    files: Vec<BatchEntry>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let config = config::load_config(cli.config.as_deref())?;
    logging::init(&config.logging, cli.verbose);

    match cli.command {
        Command::Process(args) => run_process(&config, &args)?,
        Command::Batch(args) => run_batch(&config, &args)?,
        Command::GenConfig => {}
    }

    Ok(())
}

fn run_process(config: &EngineConfig, args: &ProcessArgs) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Engine::new(config.clone());
    let ops = build_chain(&args.chain)?;
    let output = output_params(config, &args.out, &args.output)?;
    let bytes = transform_file(&engine, &args.input, &args.output, &ops, &output)?;
    println!(
        "{} → {} ({bytes} bytes)",
        args.input.display(),
        args.output.display()
    );
    Ok(())
}

fn run_batch(config: &EngineConfig, args: &BatchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let engine = Engine::new(config.clone());
    let threads = engine.init_thread_pool();
    let ops = build_chain(&args.chain)?;
    let inputs = collect_inputs(&args.input);

    let files: Vec<BatchEntry> = inputs
        .par_iter()
        .map(|input| {
            let relative = input.strip_prefix(&args.input).unwrap_or(input);
            let mut target = args.output.join(relative);
            if let Some(format) = args.out.format {
                target.set_extension(format.name());
            }
            let result = output_params(config, &args.out, &target)
                .map_err(|e| e.to_string())
                .and_then(|output| {
                    transform_file(&engine, input, &target, &ops, &output).map_err(|e| e.to_string())
                });
            match result {
                Ok(bytes) => BatchEntry {
                    input: input.clone(),
                    output: target,
                    bytes: Some(bytes),
                    error: None,
                },
                Err(error) => BatchEntry {
                    input: input.clone(),
                    output: target,
                    bytes: None,
                    error: Some(error),
                },
            }
        })
        .collect();

    let failed = files.iter().filter(|f| f.error.is_some()).count();
    let summary = BatchSummary {
        processed: files.len() - failed,
        failed,
        threads,
        files,
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for entry in &summary.files {
            match (&entry.bytes, &entry.error) {
                (Some(bytes), _) => println!(
                    "{} → {} ({bytes} bytes)",
                    entry.input.display(),
                    entry.output.display()
                ),
                (None, Some(error)) => println!("{} ✗ {error}", entry.input.display()),
                (None, None) => {}
            }
        }
        println!(
            "{} processed, {} failed ({} threads)",
            summary.processed, summary.failed, summary.threads
        );
    }

    if failed > 0 {
        return Err(format!("{failed} of {} files failed", summary.processed + failed).into());
    }
    Ok(())
}

/// Decode `input`, run `ops` and write the encoded result to `target`.
fn transform_file(
    engine: &Engine,
    input: &Path,
    target: &Path,
    ops: &[Operation],
    output: &OutputParams,
) -> Result<u64, Box<dyn std::error::Error>> {
    let data = std::fs::read(input)?;
    let declared = ImageFormat::from_path(input);
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    pipeline::run_to_file(engine, declared, &data, ops, target, output)?;
    Ok(std::fs::metadata(target)?.len())
}

/// Image files under `dir`, sorted for stable output.
fn collect_inputs(dir: &Path) -> Vec<PathBuf> {
    let mut inputs: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| ImageFormat::from_path(p).is_some_and(|f| f != ImageFormat::Pdf))
        .collect();
    inputs.sort();
    inputs
}

fn build_chain(args: &ChainArgs) -> Result<Vec<Operation>, imgchain::imaging::PipelineError> {
    let mut ops = Vec::new();
    if let Some(params) = args.thumbnail {
        ops.push(Operation::Thumbnail(params));
    }
    if let Some(params) = args.scale {
        ops.push(Operation::Scale(params));
    }
    if let Some(region) = args.crop {
        ops.push(Operation::Crop(region));
    }
    if let Some(path) = &args.overlay {
        let size = SizeAndMargin::new(OverlaySize::percent(args.overlay_width, None)?);
        ops.push(Operation::Compose(ComposeParams::from_file(path.clone(), size, args.align)));
    }
    if let Some(text) = &args.text {
        let size = SizeAndMargin::new(OverlaySize::percent(args.text_width, None)?);
        let mut params = TextParams::new(text.as_str(), size, args.align);
        if let Some(color) = &args.text_color {
            params = params.with_color(color.as_str());
        }
        if let Some(shadow) = &args.shadow {
            params = params.with_shadow(shadow.as_str());
        }
        ops.push(Operation::Text(params));
    }
    Ok(ops)
}

/// Format from the flag, else from the target extension, else the input's.
fn output_params(
    config: &EngineConfig,
    args: &OutputArgs,
    target: &Path,
) -> Result<OutputParams, imgchain::imaging::PipelineError> {
    let format = args.format.or_else(|| ImageFormat::from_path(target));
    let quality = Quality::new(args.quality.unwrap_or(config.output.quality))?;
    Ok(OutputParams::new(format)
        .with_quality(quality)
        .with_strip_metadata(config.output.strip_metadata && !args.keep_metadata))
}

fn parse_format(s: &str) -> Result<ImageFormat, String> {
    ImageFormat::from_name(s).map_err(|e| e.to_string())
}

fn parse_thumbnail(s: &str) -> Result<ThumbnailParams, String> {
    let mut parts = s.split(':');
    let size = parts.next().unwrap_or_default();
    let (w, h) = size
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {size:?}"))?;
    let width: u32 = w.trim().parse().map_err(|_| format!("bad width {w:?}"))?;
    let height: u32 = h.trim().parse().map_err(|_| format!("bad height {h:?}"))?;
    if width == 0 && height == 0 {
        return Err("thumbnail needs a width or a height".into());
    }
    let mut params = ThumbnailParams::new(width, height);
    for flag in parts {
        params = match flag {
            "crop" => params.cropped(),
            "force" => params.forced(),
            other => return Err(format!("unknown thumbnail flag {other:?}")),
        };
    }
    Ok(params)
}

fn parse_scale(s: &str) -> Result<ScaleParams, String> {
    let (h, v) = s.split_once(['x', 'X']).unwrap_or((s, s));
    let h: f64 = h.trim().parse().map_err(|_| format!("bad scale {h:?}"))?;
    let v: f64 = v.trim().parse().map_err(|_| format!("bad scale {v:?}"))?;
    ScaleParams::new(h, v).map_err(|e| e.to_string())
}

fn parse_crop(s: &str) -> Result<CropParams, String> {
    let values: Vec<u32> = s
        .split(',')
        .map(|v| v.trim().parse().map_err(|_| format!("bad crop value {v:?}")))
        .collect::<Result<_, _>>()?;
    match values[..] {
        [left, top, width, height] => Ok(CropParams::new(left, top, width, height)),
        _ => Err("expected LEFT,TOP,WIDTH,HEIGHT".into()),
    }
}

fn parse_alignment(s: &str) -> Result<Alignment, String> {
    let (h, v) = s.split_once(',').unwrap_or((s, "top"));
    let horizontal = match h.trim().to_ascii_lowercase().as_str() {
        "left" => HorizontalAlign::Left,
        "center" | "centre" => HorizontalAlign::Center,
        "right" => HorizontalAlign::Right,
        other => return Err(format!("unknown horizontal alignment {other:?}")),
    };
    let vertical = match v.trim().to_ascii_lowercase().as_str() {
        "top" => VerticalAlign::Top,
        "center" | "centre" => VerticalAlign::Center,
        "bottom" => VerticalAlign::Bottom,
        other => return Err(format!("unknown vertical alignment {other:?}")),
    };
    Ok(Alignment::new(horizontal, vertical))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thumbnail_flags() {
        let p = parse_thumbnail("320x180:crop").unwrap();
        assert_eq!((p.width, p.height, p.crop, p.force), (320, 180, true, false));
        let p = parse_thumbnail("100x0").unwrap();
        assert_eq!((p.width, p.height, p.crop), (100, 0, false));
        assert!(parse_thumbnail("0x0").is_err());
        assert!(parse_thumbnail("100x50:zoom").is_err());
    }

    #[test]
    fn scale_uniform_or_pair() {
        let s = parse_scale("0.5").unwrap();
        assert_eq!((s.h_scale, s.v_scale), (0.5, 0.5));
        let s = parse_scale("2x1").unwrap();
        assert_eq!((s.h_scale, s.v_scale), (2.0, 1.0));
    }

    #[test]
    fn crop_needs_four_values() {
        assert_eq!(parse_crop("1,2,3,4").unwrap(), CropParams::new(1, 2, 3, 4));
        assert!(parse_crop("1,2,3").is_err());
    }

    #[test]
    fn alignment_pairs() {
        assert_eq!(
            parse_alignment("center,bottom").unwrap(),
            Alignment::new(HorizontalAlign::Center, VerticalAlign::Bottom)
        );
        assert!(parse_alignment("middle,top").is_err());
    }

    #[test]
    fn chain_follows_fixed_order() {
        let args = ChainArgs {
            thumbnail: Some(ThumbnailParams::new(10, 0)),
            crop: Some(CropParams::new(0, 0, 5, 5)),
            text: Some("hi".into()),
            text_width: 0.5,
            overlay_width: 0.25,
            ..ChainArgs::default()
        };
        let names: Vec<_> = build_chain(&args).unwrap().iter().map(Operation::name).collect();
        assert_eq!(names, vec!["thumbnail", "crop", "text"]);
    }

    #[test]
    fn output_format_from_extension() {
        let config = EngineConfig::default();
        let args = OutputArgs {
            format: None,
            quality: None,
            keep_metadata: true,
        };
        let params = output_params(&config, &args, Path::new("out.png")).unwrap();
        assert_eq!(params.format, Some(ImageFormat::Png));
        assert!(!params.strip_metadata);
        assert_eq!(params.quality.value(), 75);
    }
}
