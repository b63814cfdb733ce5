use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use gif_caption::{CaptionEngine, ExportOptions, ExportRequest, ExportWorker, RgbaBuffer};
use gif_codec::EncoderConfig;
use gif_quant::{QuantizeMethod, QuantizerConfig};
use gif_types::{CaptionSpec, Dimensions, Rgba};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gifcap")]
#[command(about = "Caption animated GIFs: decode → composite → overlay text → quantize → GIF89a")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Draw a caption on every frame and write a new GIF
    Caption(CaptionCmd),
    /// Print dimensions, frame count, delays and loop count
    Info {
        #[arg(long, value_name = "FILE")]
        input: PathBuf,
    },
    /// Write one composited, captioned frame as PNG
    Preview(PreviewCmd),
    /// Run a serialized export request (JSON) through the export worker
    Task {
        #[arg(long, value_name = "FILE")]
        request: PathBuf,

        #[arg(long, value_name = "FILE")]
        output: PathBuf,
    },
}

#[derive(Args, Debug)]
struct CaptionCmd {
    #[arg(long, value_name = "FILE")]
    input: PathBuf,

    #[arg(long, value_name = "FILE")]
    output: PathBuf,

    #[command(flatten)]
    caption: CaptionFlags,

    /// Force every frame to this delay (centiseconds)
    #[arg(long)]
    delay_cs: Option<u16>,

    /// Loop count for the output (0 = forever); defaults to looping animations forever
    #[arg(long)]
    loop_count: Option<u16>,

    /// Palette reduction used when a frame has more than --max-colors colors
    #[arg(long, value_enum, default_value = "kmeans")]
    quant: QuantKind,

    /// NeuQuant sample factor (1=best, 30=fastest)
    #[arg(long, default_value = "10")]
    samplefac: i32,

    #[arg(long, default_value = "256")]
    max_colors: usize,
}

#[derive(Args, Debug)]
struct PreviewCmd {
    #[arg(long, value_name = "FILE")]
    input: PathBuf,

    /// Frame to snapshot; wraps past the last frame
    #[arg(long, default_value = "0")]
    frame: usize,

    #[arg(long, value_name = "FILE")]
    output: PathBuf,

    #[command(flatten)]
    caption: CaptionFlags,
}

#[derive(Args, Debug, Clone, Default)]
struct CaptionFlags {
    /// Caption text; lines split on '\n'
    #[arg(long)]
    text: Option<String>,

    /// Horizontal center in pixels (default: canvas center)
    #[arg(long)]
    x: Option<f32>,

    /// Vertical center in pixels (default: canvas center)
    #[arg(long)]
    y: Option<f32>,

    /// Font size in pixels (default: 1/8 of canvas height)
    #[arg(long)]
    size: Option<f32>,

    #[arg(long, default_value = "sans-serif")]
    font: String,

    /// Fill color, #RRGGBB or #RRGGBBAA
    #[arg(long, value_parser = parse_color)]
    color: Option<Rgba>,

    #[arg(long, value_parser = parse_color)]
    outline_color: Option<Rgba>,

    #[arg(long)]
    outline_width: Option<f32>,

    /// Read the whole caption from a JSON file instead of flags
    #[arg(long, value_name = "FILE", conflicts_with = "text")]
    caption_json: Option<PathBuf>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum QuantKind {
    Kmeans,
    Neuquant,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Caption(cmd) => run_caption(cmd),
        Command::Info { input } => run_info(&input),
        Command::Preview(cmd) => run_preview(cmd),
        Command::Task { request, output } => run_task(&request, &output),
    }
}

fn run_caption(cmd: CaptionCmd) -> Result<()> {
    let bytes = read_input(&cmd.input)?;

    // Load once for the canvas size the caption defaults depend on.
    let mut engine = CaptionEngine::new();
    let dims = engine
        .load(&bytes)
        .with_context(|| format!("Failed to decode {:?}", cmd.input))?;
    let caption = build_caption(&cmd.caption, dims)?;
    info!("Caption {:?} at ({}, {}) size {}", caption.text, caption.x, caption.y, caption.font_size);

    let options = export_options(&cmd);
    let engine = engine.with_export_options(options);
    let gif = engine
        .export_with_caption(&bytes, &caption)
        .with_context(|| format!("Failed to caption {:?}", cmd.input))?;

    fs::write(&cmd.output, &gif).with_context(|| format!("Failed to write {:?}", cmd.output))?;
    info!("GIF89a written: {:?} ({} bytes)", cmd.output, gif.len());
    Ok(())
}

fn run_info(input: &Path) -> Result<()> {
    let bytes = read_input(input)?;
    let doc = gif_codec::decode(&bytes).with_context(|| format!("Failed to decode {:?}", input))?;

    println!("dimensions: {}x{}", doc.width, doc.height);
    println!("frames:     {}", doc.frames.len());
    println!("delays_cs:  {:?}", doc.delays());
    match doc.loop_count {
        Some(0) => println!("loop:       forever"),
        Some(n) => println!("loop:       {n}"),
        None => println!("loop:       none"),
    }
    Ok(())
}

fn run_preview(cmd: PreviewCmd) -> Result<()> {
    let bytes = read_input(&cmd.input)?;
    let mut engine = CaptionEngine::new();
    let dims = engine
        .load(&bytes)
        .with_context(|| format!("Failed to decode {:?}", cmd.input))?;

    let target = cmd.frame % engine.frame_count().max(1);
    while engine.current_index() != target {
        engine.next_frame();
    }

    let mut surface = RgbaBuffer::new(dims.width, dims.height);
    if cmd.caption.text.is_some() || cmd.caption.caption_json.is_some() {
        let caption = build_caption(&cmd.caption, dims)?;
        engine.composite_preview(&mut surface, &caption)?;
    } else {
        engine.render_current_frame(&mut surface)?;
    }

    write_png(&cmd.output, surface)?;
    info!("Frame {} written: {:?}", target, cmd.output);
    Ok(())
}

fn run_task(request_path: &Path, output: &Path) -> Result<()> {
    let json = read_input(request_path)?;
    let request: ExportRequest =
        serde_json::from_slice(&json).with_context(|| format!("Failed to parse request {:?}", request_path))?;

    info!("Export task: {} input bytes, caption {:?}", request.gif.len(), request.caption.text);
    let gif = ExportWorker::spawn(request).wait().context("Export task failed")?;

    fs::write(output, &gif).with_context(|| format!("Failed to write {:?}", output))?;
    info!("GIF89a written: {:?} ({} bytes)", output, gif.len());
    Ok(())
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read {:?}", path))
}

/// Caption from `--caption-json`, or from flags with canvas-relative defaults.
fn build_caption(flags: &CaptionFlags, dims: Dimensions) -> Result<CaptionSpec> {
    if let Some(path) = &flags.caption_json {
        let json = read_input(path)?;
        return serde_json::from_slice(&json).with_context(|| format!("Failed to parse caption {:?}", path));
    }

    let Some(text) = &flags.text else {
        bail!("--text or --caption-json is required");
    };
    let x = flags.x.unwrap_or(dims.width as f32 / 2.0);
    let y = flags.y.unwrap_or(dims.height as f32 / 2.0);
    let size = flags.size.unwrap_or((dims.height as f32 / 8.0).max(1.0));

    let mut caption = CaptionSpec::new(text.replace("\\n", "\n"), x, y, size, flags.font.as_str());
    if let Some(color) = flags.color {
        caption = caption.with_color(color);
    }
    if flags.outline_color.is_some() || flags.outline_width.is_some() {
        let outline_color = flags.outline_color.unwrap_or(caption.outline_color);
        let outline_width = flags.outline_width.unwrap_or(caption.outline_width);
        caption = caption.with_outline(outline_color, outline_width);
    }
    Ok(caption)
}

fn export_options(cmd: &CaptionCmd) -> ExportOptions {
    let method = match cmd.quant {
        QuantKind::Kmeans => QuantizeMethod::KMeansOklab,
        QuantKind::Neuquant => QuantizeMethod::NeuQuant {
            sample_fac: cmd.samplefac,
        },
    };
    let mut options = ExportOptions::default()
        .with_quantizer(QuantizerConfig::default().with_max_colors(cmd.max_colors).with_method(method))
        .with_encoder(EncoderConfig {
            delay_override: cmd.delay_cs,
        });
    options.loop_count = cmd.loop_count;
    options
}

fn write_png(path: &Path, surface: RgbaBuffer) -> Result<()> {
    let (width, height) = (surface.width(), surface.height());
    let image = image::RgbaImage::from_raw(width, height, surface.into_bytes())
        .context("Frame buffer does not match its dimensions")?;
    image.save(path).with_context(|| format!("Failed to write {:?}", path))?;
    Ok(())
}

fn parse_color(s: &str) -> std::result::Result<Rgba, String> {
    let hex = s.trim_start_matches('#');
    if !matches!(hex.len(), 6 | 8) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("expected #RRGGBB or #RRGGBBAA, got {s:?}"));
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|e| e.to_string());
    let alpha = if hex.len() == 8 { channel(6)? } else { 255 };
    Ok([channel(0)?, channel(2)?, channel(4)?, alpha])
}
