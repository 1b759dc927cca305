use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use autocut::assets::{self, ImageCache};
use autocut::encode_ffmpeg;
use autocut::error::{AutocutError, AutocutResult, RenderStage};
use autocut::model::{
    AspectRatio, ContainerFormat, ExportOptions, Project, Quality, RenderSettings, Resolution,
};
use autocut::projector::{ElementContent, HeuristicMeasurer, SceneFrame, project_frame_ready};
use autocut::render::{
    BundleHandle, Bundler, CancelToken, CompositionSpec, EncoderProbe, FrameRenderer,
    RenderOrchestrator, RenderedFrames,
};
use autocut::store::ProjectStore;
use autocut::{export, projector};

#[derive(Parser, Debug)]
#[command(name = "autocut", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a project from media files via the auto-layout engine.
    Layout(LayoutArgs),
    /// Project a single timeline instant to scene JSON.
    Frame(FrameArgs),
    /// Render a project to a video file (requires `ffmpeg` on PATH).
    Render(RenderArgs),
    /// Export a project to an interchange format.
    Export(ExportArgs),
}

#[derive(Parser, Debug)]
struct LayoutArgs {
    /// Subtitle file (SRT).
    #[arg(long)]
    srt: Option<PathBuf>,

    /// Image files, in slot order. Repeatable.
    #[arg(long = "image")]
    images: Vec<PathBuf>,

    /// Audio file; its probed duration drives the project duration.
    #[arg(long)]
    audio: Option<PathBuf>,

    /// Project name.
    #[arg(long, default_value = "Untitled Project")]
    name: String,

    #[arg(long, value_enum, default_value_t = AspectChoice::Wide)]
    aspect: AspectChoice,

    /// Output project JSON.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct FrameArgs {
    /// Input project JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Timeline instant in milliseconds.
    #[arg(long)]
    time: u64,

    /// Surface width (defaults to the project resolution).
    #[arg(long)]
    width: Option<u32>,

    /// Surface height (defaults to the project resolution).
    #[arg(long)]
    height: Option<u32>,

    /// Output scene JSON.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Parser, Debug)]
struct RenderArgs {
    /// Input project JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Directory the finished video is written to.
    #[arg(long, default_value = "export")]
    out_dir: PathBuf,

    /// Scratch directory for bundles and frame sequences.
    #[arg(long)]
    work_dir: Option<PathBuf>,

    #[arg(long, default_value_t = 30)]
    fps: u32,

    #[arg(long, value_enum, default_value_t = QualityChoice::High)]
    quality: QualityChoice,

    #[arg(long, value_enum, default_value_t = FormatChoice::Mp4)]
    format: FormatChoice,

    /// Drop the audio track even when the project has one.
    #[arg(long)]
    no_audio: bool,
}

#[derive(Parser, Debug)]
struct ExportArgs {
    /// Input project JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    #[arg(long, value_enum)]
    format: ExportChoice,

    /// Output file.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AspectChoice {
    Wide,
    Tall,
}

impl From<AspectChoice> for AspectRatio {
    fn from(c: AspectChoice) -> Self {
        match c {
            AspectChoice::Wide => AspectRatio::Wide,
            AspectChoice::Tall => AspectRatio::Tall,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum QualityChoice {
    Low,
    Medium,
    High,
}

impl From<QualityChoice> for Quality {
    fn from(c: QualityChoice) -> Self {
        match c {
            QualityChoice::Low => Quality::Low,
            QualityChoice::Medium => Quality::Medium,
            QualityChoice::High => Quality::High,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatChoice {
    Mp4,
    Mov,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ExportChoice {
    /// Project JSON without transient track back-references.
    Json,
    /// Final Cut Pro XML.
    Fcpxml,
    /// After Effects-style layer JSON.
    Ae,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Layout(args) => cmd_layout(args),
        Command::Frame(args) => cmd_frame(args),
        Command::Render(args) => cmd_render(args),
        Command::Export(args) => cmd_export(args),
    }
}

fn read_project(path: &PathBuf) -> anyhow::Result<Project> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read '{}'", path.display()))?;
    let project: Project = serde_json::from_str(&raw)
        .with_context(|| format!("'{}' is not a valid project", path.display()))?;
    Ok(project)
}

fn write_output(path: &PathBuf, contents: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create '{}'", parent.display()))?;
    }
    std::fs::write(path, contents)
        .with_context(|| format!("failed to write '{}'", path.display()))?;
    Ok(())
}

fn cmd_layout(args: LayoutArgs) -> anyhow::Result<()> {
    let mut store = ProjectStore::new();
    store.create_project(&args.name, args.aspect.into());

    if let Some(srt) = &args.srt {
        let content = std::fs::read_to_string(srt)
            .with_context(|| format!("failed to read '{}'", srt.display()))?;
        store.import_srt(&file_name(srt), &content);
    }
    for image in &args.images {
        store.import_image(&file_name(image), &image.display().to_string());
    }
    if let Some(audio) = &args.audio {
        let duration = assets::probe_media_duration_ms(audio);
        store.import_audio(&file_name(audio), &audio.display().to_string(), duration);
    }

    store.relayout();
    let project = store
        .project
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("store has no project after create"))?;
    info!(
        tracks = project.tracks.len(),
        duration_ms = project.duration,
        "timeline laid out"
    );
    write_output(&args.out, &serde_json::to_string_pretty(project)?)
}

fn file_name(path: &PathBuf) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn cmd_frame(args: FrameArgs) -> anyhow::Result<()> {
    let project = read_project(&args.in_path)?;
    project.validate()?;
    let surface = Resolution {
        width: args.width.unwrap_or(project.resolution.width),
        height: args.height.unwrap_or(project.resolution.height),
    };
    // Preview semantics: images that are not decodable right now are omitted
    // from the scene rather than failing the projection.
    let cache = ImageCache::new();
    let scene = projector::project_frame(&project, args.time, surface, &cache, &HeuristicMeasurer);
    write_output(&args.out, &serde_json::to_string_pretty(&scene)?)
}

fn cmd_render(args: RenderArgs) -> anyhow::Result<()> {
    let project = read_project(&args.in_path)?;

    let quality: Quality = args.quality.into();
    let options = ExportOptions {
        format: match args.format {
            FormatChoice::Mp4 => ContainerFormat::Mp4,
            FormatChoice::Mov => ContainerFormat::Mov,
        },
        settings: RenderSettings {
            fps: args.fps,
            resolution: project.resolution,
            quality,
            crf: quality.crf(),
            ..RenderSettings::default()
        },
        include_audio: !args.no_audio,
        include_subtitles: true,
    };

    if !encode_ffmpeg::is_ffmpeg_on_path() {
        anyhow::bail!("ffmpeg not found on PATH; it is required for video export");
    }

    let work_dir = args
        .work_dir
        .unwrap_or_else(|| std::env::temp_dir().join("autocut"));
    let orchestrator = RenderOrchestrator::new(
        Box::new(DiskBundler {
            root: work_dir.clone(),
        }),
        Box::new(RasterRenderer),
        work_dir,
        args.out_dir,
        EncoderProbe::new(),
    );

    let artifact = orchestrator.render(&project, &options, &CancelToken::new())?;
    info!(path = %artifact.path.display(), encoder = ?artifact.encoder_used, "render complete");
    println!("{}", artifact.path.display());
    Ok(())
}

fn cmd_export(args: ExportArgs) -> anyhow::Result<()> {
    let project = read_project(&args.in_path)?;
    project.validate()?;
    let contents = match args.format {
        ExportChoice::Json => export::to_project_json(&project)?,
        ExportChoice::Fcpxml => export::to_fcpxml(&project),
        ExportChoice::Ae => export::to_ae_json(&project)?,
    };
    write_output(&args.out, &contents)
}

/// Bundling for the built-in renderer is a serialization of the project next
/// to the frame output.
struct DiskBundler {
    root: PathBuf,
}

impl Bundler for DiskBundler {
    fn bundle(&self, project: &Project, cancel: &CancelToken) -> AutocutResult<BundleHandle> {
        cancel.checkpoint(RenderStage::Bundling)?;
        std::fs::create_dir_all(&self.root).map_err(|e| {
            AutocutError::stage(
                RenderStage::Bundling,
                format!("failed to create bundle dir: {e}"),
            )
        })?;
        let serve_path = self.root.join("composition.json");
        let json = serde_json::to_string(project)
            .map_err(|e| AutocutError::stage(RenderStage::Bundling, e.to_string()))?;
        std::fs::write(&serve_path, json)
            .map_err(|e| AutocutError::stage(RenderStage::Bundling, e.to_string()))?;
        Ok(BundleHandle { serve_path })
    }
}

/// Built-in CPU compositor: black background, image clips placed through the
/// projector, text rendered as its background plate. Glyph rasterization and
/// rotation are left to an external renderer; this backend is for quick local
/// exports and pipeline checks.
struct RasterRenderer;

impl FrameRenderer for RasterRenderer {
    fn render(
        &self,
        composition: &CompositionSpec,
        _bundle: &BundleHandle,
        frames_dir: &std::path::Path,
        cancel: &CancelToken,
    ) -> AutocutResult<RenderedFrames> {
        let mut cache = ImageCache::new();
        let surface = composition.resolution;

        for i in 0..composition.frame_count {
            cancel.checkpoint(RenderStage::FrameRendering)?;
            let time_ms =
                (i as f64 * 1000.0 / f64::from(composition.fps)).round() as u64;
            let scene = project_frame_ready(
                &composition.project,
                time_ms,
                surface,
                &mut cache,
                &HeuristicMeasurer,
            )?;
            let frame = rasterize(&scene, surface, &cache);
            let path = frames_dir.join(format!("frame-{i}.png"));
            frame.save(&path).map_err(|e| {
                AutocutError::stage(
                    RenderStage::FrameRendering,
                    format!("failed to write frame {i}: {e}"),
                )
            })?;
        }

        Ok(RenderedFrames::Sequence {
            pattern: frames_dir.join("frame-%d.png"),
            count: composition.frame_count,
        })
    }
}

fn rasterize(scene: &SceneFrame, surface: Resolution, cache: &ImageCache) -> image::RgbaImage {
    let mut canvas = image::RgbaImage::from_pixel(
        surface.width,
        surface.height,
        image::Rgba([0, 0, 0, 255]),
    );

    for element in &scene.elements {
        match &element.content {
            ElementContent::Image(img) => {
                let Some(prepared) = cache.get_if_ready(&img.src) else {
                    continue;
                };
                let Some(source) = image::RgbaImage::from_raw(
                    prepared.width,
                    prepared.height,
                    prepared.rgba8.as_ref().clone(),
                ) else {
                    continue;
                };
                let w = (img.width * element.scale).round().max(1.0) as u32;
                let h = (img.height * element.scale).round().max(1.0) as u32;
                let resized = image::imageops::resize(
                    &source,
                    w,
                    h,
                    image::imageops::FilterType::Triangle,
                );
                let x0 = (element.x - f64::from(w) / 2.0).round() as i64;
                let y0 = (element.y - f64::from(h) / 2.0).round() as i64;
                image::imageops::overlay(&mut canvas, &resized, x0, y0);
            }
            ElementContent::Text(text) => {
                if let Some(bg) = &text.background {
                    let w = bg.width * element.scale;
                    let h = bg.height * element.scale;
                    blend_rect(
                        &mut canvas,
                        element.x - w / 2.0,
                        element.y - h / 2.0,
                        w,
                        h,
                        parse_draw_color(&bg.color),
                    );
                }
            }
        }
    }

    canvas
}

/// Alpha-blend an axis-aligned rectangle onto the canvas, clipped to bounds.
fn blend_rect(canvas: &mut image::RgbaImage, x: f64, y: f64, w: f64, h: f64, color: [u8; 4]) {
    let x0 = x.round().max(0.0) as u32;
    let y0 = y.round().max(0.0) as u32;
    let x1 = ((x + w).round() as i64).clamp(0, i64::from(canvas.width())) as u32;
    let y1 = ((y + h).round() as i64).clamp(0, i64::from(canvas.height())) as u32;
    let alpha = f64::from(color[3]) / 255.0;

    for py in y0..y1 {
        for px in x0..x1 {
            let dst = canvas.get_pixel_mut(px, py);
            for c in 0..3 {
                let blended =
                    f64::from(color[c]) * alpha + f64::from(dst.0[c]) * (1.0 - alpha);
                dst.0[c] = blended.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
}

/// Accepts the projector's draw-ready color strings: `#rrggbb` or
/// `rgba(r, g, b, a)`. Unparseable input falls back to opaque white.
fn parse_draw_color(s: &str) -> [u8; 4] {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix('#')
        && hex.len() == 6
        && let Ok(v) = u32::from_str_radix(hex, 16)
    {
        return [(v >> 16) as u8, (v >> 8) as u8, v as u8, 255];
    }
    if let Some(inner) = s.strip_prefix("rgba(").and_then(|r| r.strip_suffix(')')) {
        let parts: Vec<&str> = inner.split(',').map(str::trim).collect();
        if parts.len() == 4
            && let (Ok(r), Ok(g), Ok(b), Ok(a)) = (
                parts[0].parse::<u8>(),
                parts[1].parse::<u8>(),
                parts[2].parse::<u8>(),
                parts[3].parse::<f64>(),
            )
        {
            return [r, g, b, (a.clamp(0.0, 1.0) * 255.0).round() as u8];
        }
    }
    [255, 255, 255, 255]
}
