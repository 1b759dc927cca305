//! The render orchestrator: bundling, composition selection, frame rendering
//! and encoding sequenced into a single artifact, with stage-attributed
//! failures, real cancellation, and best-effort cleanup.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use crate::assets;
use crate::encode_ffmpeg::{self, TranscodeJob};
use crate::error::{AutocutError, AutocutResult, RenderStage};
use crate::model::{ExportOptions, Project, Resolution};

/// Cooperative cancellation shared between the caller and every external
/// collaborator. A cancel terminates work in flight, not just the progress UI.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Error out of the pipeline if a cancel was requested, attributing the
    /// cancellation to the stage that noticed it.
    pub fn checkpoint(&self, stage: RenderStage) -> AutocutResult<()> {
        if self.is_cancelled() {
            Err(AutocutError::Cancelled(stage))
        } else {
            Ok(())
        }
    }
}

/// Output of the bundling collaborator.
#[derive(Clone, Debug)]
pub struct BundleHandle {
    /// Location the renderer serves the bundled composition from.
    pub serve_path: PathBuf,
}

/// The resolved composition the renderer is asked to sample, derived from the
/// project with the same normalization rules the projector uses.
#[derive(Clone, Debug)]
pub struct CompositionSpec {
    pub id: String,
    pub fps: u32,
    pub resolution: Resolution,
    pub frame_count: u64,
    /// Bound as input props for the renderer.
    pub project: Project,
}

impl CompositionSpec {
    pub fn select(project: &Project, options: &ExportOptions) -> AutocutResult<Self> {
        let fps = options.settings.fps;
        if fps == 0 {
            return Err(AutocutError::stage(
                RenderStage::CompositionSelection,
                "composition fps must be > 0",
            ));
        }
        let frame_count =
            ((project.duration as f64 / 1000.0 * f64::from(fps)).ceil() as u64).max(1);
        Ok(Self {
            id: "Main".to_string(),
            fps,
            resolution: options.settings.resolution,
            frame_count,
            project: project.clone(),
        })
    }
}

/// Hands the project off to the external composition bundler.
pub trait Bundler {
    fn bundle(&self, project: &Project, cancel: &CancelToken) -> AutocutResult<BundleHandle>;
}

/// What the external renderer produced.
#[derive(Clone, Debug)]
pub enum RenderedFrames {
    /// Numbered still frames to be piped through the transcoder (legacy path).
    Sequence { pattern: PathBuf, count: u64 },
    /// A fully encoded media file (renderer did its own muxing).
    Media { path: PathBuf },
}

/// Samples the composition into frames (or directly into media).
pub trait FrameRenderer {
    fn render(
        &self,
        composition: &CompositionSpec,
        bundle: &BundleHandle,
        frames_dir: &Path,
        cancel: &CancelToken,
    ) -> AutocutResult<RenderedFrames>;
}

/// Lazily-initialized encoder capability cache, scoped to the orchestrator
/// that owns it rather than living in a process-wide variable.
#[derive(Debug, Default)]
pub struct EncoderProbe {
    detected: OnceLock<Option<String>>,
    fixed: Option<Option<String>>,
}

impl EncoderProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// A probe with a predetermined answer; lets tests and constrained
    /// deployments skip the subprocess call.
    pub fn fixed(hw_h264: Option<String>) -> Self {
        Self {
            detected: OnceLock::new(),
            fixed: Some(hw_h264),
        }
    }

    pub fn hw_h264(&self) -> Option<&str> {
        if let Some(fixed) = &self.fixed {
            return fixed.as_deref();
        }
        self.detected
            .get_or_init(encode_ffmpeg::detect_hw_h264_encoder)
            .as_deref()
    }
}

/// A finished render.
#[derive(Clone, Debug)]
pub struct RenderArtifact {
    pub path: PathBuf,
    pub file_name: String,
    pub encoder_used: Option<String>,
}

pub struct RenderOrchestrator {
    bundler: Box<dyn Bundler + Send + Sync>,
    renderer: Box<dyn FrameRenderer + Send + Sync>,
    /// Parent of the per-invocation temp frame directories.
    work_dir: PathBuf,
    /// Shared, append-only output directory.
    output_dir: PathBuf,
    encoder_probe: EncoderProbe,
    in_flight: AtomicBool,
}

impl RenderOrchestrator {
    pub fn new(
        bundler: Box<dyn Bundler + Send + Sync>,
        renderer: Box<dyn FrameRenderer + Send + Sync>,
        work_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        encoder_probe: EncoderProbe,
    ) -> Self {
        Self {
            bundler,
            renderer,
            work_dir: work_dir.into(),
            output_dir: output_dir.into(),
            encoder_probe,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Run the full pipeline. At most one render per orchestrator is allowed
    /// in flight; a concurrent call is rejected before any pipeline work, so
    /// the HTTP boundary cannot sneak past the UI's disabled button.
    #[tracing::instrument(skip_all, fields(project = %project.name))]
    pub fn render(
        &self,
        project: &Project,
        options: &ExportOptions,
        cancel: &CancelToken,
    ) -> AutocutResult<RenderArtifact> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(AutocutError::invalid_request(
                "a render is already in flight for this session",
            ));
        }
        let _guard = InFlightGuard(&self.in_flight);

        project.validate()?;

        let temp_dir = self.work_dir.join(format!("render-{}", now_millis()));
        let result = self.run_pipeline(project, options, cancel, &temp_dir);

        // Cleanup runs on both paths and never overrides the pipeline result.
        if temp_dir.exists() {
            if let Err(err) = std::fs::remove_dir_all(&temp_dir) {
                warn!(dir = %temp_dir.display(), error = %err, "failed to clean up temp frames");
            }
        }

        result
    }

    fn run_pipeline(
        &self,
        project: &Project,
        options: &ExportOptions,
        cancel: &CancelToken,
        temp_dir: &Path,
    ) -> AutocutResult<RenderArtifact> {
        // Stage 1: bundling.
        cancel.checkpoint(RenderStage::Bundling)?;
        info!("step 1/4: bundling composition");
        let bundle = self
            .bundler
            .bundle(project, cancel)
            .map_err(|e| attribute(e, RenderStage::Bundling))?;

        // Stage 2: composition selection.
        cancel.checkpoint(RenderStage::CompositionSelection)?;
        info!("step 2/4: selecting composition");
        let composition = CompositionSpec::select(project, options)?;

        // Stage 3: frame (or direct media) rendering.
        cancel.checkpoint(RenderStage::FrameRendering)?;
        info!(frames = composition.frame_count, "step 3/4: rendering frames");
        std::fs::create_dir_all(temp_dir).map_err(|e| {
            AutocutError::stage(
                RenderStage::FrameRendering,
                format!("failed to create temp frame dir: {e}"),
            )
        })?;
        let rendered = self
            .renderer
            .render(&composition, &bundle, temp_dir, cancel)
            .map_err(|e| attribute(e, RenderStage::FrameRendering))?;

        let file_name = output_file_name(&project.name, options.format.extension());
        let out_path = self.output_dir.join(&file_name);
        encode_ffmpeg::ensure_parent_dir(&out_path)?;

        match rendered {
            RenderedFrames::Media { path } => {
                // Renderer muxed the output itself; encoding is a move.
                cancel.checkpoint(RenderStage::Encoding)?;
                std::fs::rename(&path, &out_path)
                    .or_else(|_| std::fs::copy(&path, &out_path).map(|_| ()))
                    .map_err(|e| {
                        AutocutError::stage(
                            RenderStage::Encoding,
                            format!("failed to place rendered media: {e}"),
                        )
                    })?;
                Ok(RenderArtifact {
                    path: out_path,
                    file_name,
                    encoder_used: None,
                })
            }
            RenderedFrames::Sequence { pattern, .. } => {
                // Stage 4: encoding.
                cancel.checkpoint(RenderStage::Encoding)?;
                info!("step 4/4: encoding with ffmpeg");
                let codec_arg = encode_ffmpeg::select_codec_arg(
                    options.settings.codec,
                    self.encoder_probe.hw_h264(),
                );
                let job = TranscodeJob {
                    frame_pattern: pattern,
                    fps: options.settings.fps,
                    audio_path: self.usable_audio(project, options),
                    codec_arg: codec_arg.clone(),
                    pixel_format: options.settings.pixel_format.clone(),
                    profile: options.settings.profile.clone(),
                    crf: options.settings.crf,
                    out_path: out_path.clone(),
                };
                encode_ffmpeg::run_transcode(&job, cancel)?;
                Ok(RenderArtifact {
                    path: out_path,
                    file_name,
                    encoder_used: Some(codec_arg),
                })
            }
        }
    }

    /// Audio is included only when requested and the source is a real file
    /// the server can read; otherwise it is dropped with a warning, never a
    /// fatal error.
    fn usable_audio(&self, project: &Project, options: &ExportOptions) -> Option<PathBuf> {
        if !options.include_audio {
            return None;
        }
        let src = project.audio_file.as_deref()?;
        if src.starts_with("blob:") {
            warn!(src, "audio source is a client-local blob URL; skipping audio");
            return None;
        }
        if !assets::is_server_resolvable(src) {
            warn!(src, "audio source not found on server; skipping audio");
            return None;
        }
        Some(PathBuf::from(src))
    }
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Attribute a collaborator error to a stage unless it already carries one
/// (a cancellation noticed inside the collaborator keeps its own stage).
fn attribute(err: AutocutError, stage: RenderStage) -> AutocutError {
    if err.render_stage().is_some() {
        err
    } else {
        AutocutError::stage(stage, err.to_string())
    }
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// `My Project!` -> `my-project-1712345678901.mp4`: lowercased, non-alphanumeric
/// runs collapsed to one hyphen, edges trimmed, empty falls back to a default.
/// The timestamp keeps sequential exports of the same project from colliding.
pub fn output_file_name(project_name: &str, extension: &str) -> String {
    format!(
        "{}-{}.{extension}",
        sanitize_name(project_name),
        now_millis()
    )
}

pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_hyphen = true; // swallow leading separators
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_was_hyphen = false;
        } else if !last_was_hyphen {
            out.push('-');
            last_was_hyphen = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        "untitled".to_string()
    } else {
        out
    }
}
