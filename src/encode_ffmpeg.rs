//! External transcoder invocation.
//!
//! We intentionally use the system `ffmpeg` binary rather than `ffmpeg-next`
//! to avoid native FFmpeg dev header/lib requirements. Input is the numbered
//! frame sequence produced by the frame renderer; output is the final
//! container.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use anyhow::Context as _;
use tracing::{info, warn};

use crate::error::{AutocutError, AutocutResult, RenderStage};
use crate::model::Codec;
use crate::render::CancelToken;

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Hardware H.264 encoders we accept, in preference order.
const HW_H264_ENCODERS: [&str; 3] = ["h264_nvenc", "h264_videotoolbox", "h264_qsv"];

/// Ask ffmpeg which encoders it ships and pick a usable hardware H.264 one.
///
/// Callers memoize the answer (see `render::EncoderProbe`); the probe itself
/// is a plain subprocess call.
pub fn detect_hw_h264_encoder() -> Option<String> {
    let out = Command::new("ffmpeg")
        .args(["-hide_banner", "-encoders"])
        .output()
        .ok()?;
    if !out.status.success() {
        return None;
    }
    let listing = String::from_utf8_lossy(&out.stdout);
    HW_H264_ENCODERS
        .iter()
        .find(|name| listing.contains(**name))
        .map(|name| (*name).to_string())
}

/// Codec argument policy: `h265` is honored verbatim; anything else is H.264,
/// preferring a hardware encoder when one was detected.
pub fn select_codec_arg(codec: Codec, hw_h264: Option<&str>) -> String {
    match codec {
        Codec::H265 => "libx265".to_string(),
        Codec::H264 => hw_h264.unwrap_or("libx264").to_string(),
    }
}

#[derive(Clone, Debug)]
pub struct TranscodeJob {
    /// Numbered input pattern, e.g. `frames/frame-%d.png`.
    pub frame_pattern: PathBuf,
    pub fps: u32,
    /// Filesystem-resolvable audio input, already vetted by the orchestrator.
    pub audio_path: Option<PathBuf>,
    pub codec_arg: String,
    pub pixel_format: String,
    pub profile: String,
    pub crf: u32,
    pub out_path: PathBuf,
}

impl TranscodeJob {
    pub fn validate(&self) -> AutocutResult<()> {
        if self.fps == 0 {
            return Err(AutocutError::validation("transcode fps must be non-zero"));
        }
        if self.codec_arg.trim().is_empty() {
            return Err(AutocutError::validation("transcode codec must be set"));
        }
        Ok(())
    }

    fn args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-framerate".to_string(),
            self.fps.to_string(),
            "-i".to_string(),
            self.frame_pattern.display().to_string(),
        ];

        if let Some(audio) = &self.audio_path {
            args.push("-i".to_string());
            args.push(audio.display().to_string());
        }

        args.extend(
            [
                "-c:v",
                &self.codec_arg,
                "-pix_fmt",
                &self.pixel_format,
                "-profile:v",
                &self.profile,
                "-crf",
                &self.crf.to_string(),
                "-preset",
                "medium",
                "-movflags",
                "+faststart",
            ]
            .map(str::to_string),
        );

        if self.audio_path.is_some() {
            args.extend(["-c:a", "aac", "-b:a", "128k", "-shortest"].map(str::to_string));
        }

        args.push(self.out_path.display().to_string());
        args
    }
}

pub fn ensure_parent_dir(path: &Path) -> AutocutResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

/// Run the transcode to completion, polling the cancellation token.
///
/// Non-zero exit is an encoding-stage failure carrying captured stderr; a
/// spawn failure (missing binary) is a distinct encoding-stage failure; a
/// cancel kills the child process and reports the cancellation.
pub fn run_transcode(job: &TranscodeJob, cancel: &CancelToken) -> AutocutResult<()> {
    job.validate()?;
    ensure_parent_dir(&job.out_path)?;

    let args = job.args();
    info!(out = %job.out_path.display(), codec = %job.codec_arg, "starting ffmpeg transcode");

    let mut child = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            AutocutError::stage(
                RenderStage::Encoding,
                format!("failed to spawn ffmpeg (is it installed and on PATH?): {e}"),
            )
        })?;

    loop {
        if cancel.is_cancelled() {
            if let Err(err) = child.kill() {
                warn!(error = %err, "failed to kill cancelled ffmpeg process");
            }
            let _ = child.wait();
            return Err(AutocutError::Cancelled(RenderStage::Encoding));
        }

        match child.try_wait() {
            Ok(Some(_)) => break,
            Ok(None) => std::thread::sleep(Duration::from_millis(50)),
            Err(e) => {
                return Err(AutocutError::stage(
                    RenderStage::Encoding,
                    format!("failed to wait for ffmpeg: {e}"),
                ));
            }
        }
    }

    let output = child.wait_with_output().map_err(|e| {
        AutocutError::stage(RenderStage::Encoding, format!("failed to collect ffmpeg output: {e}"))
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AutocutError::stage(
            RenderStage::Encoding,
            format!(
                "ffmpeg exited with status {}: {}",
                output.status,
                stderr.trim()
            ),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> TranscodeJob {
        TranscodeJob {
            frame_pattern: PathBuf::from("frames/frame-%d.png"),
            fps: 30,
            audio_path: None,
            codec_arg: "libx264".to_string(),
            pixel_format: "yuv420p".to_string(),
            profile: "high".to_string(),
            crf: 18,
            out_path: PathBuf::from("export/out.mp4"),
        }
    }

    #[test]
    fn codec_policy() {
        assert_eq!(select_codec_arg(Codec::H265, Some("h264_nvenc")), "libx265");
        assert_eq!(select_codec_arg(Codec::H264, Some("h264_nvenc")), "h264_nvenc");
        assert_eq!(select_codec_arg(Codec::H264, None), "libx264");
    }

    #[test]
    fn args_without_audio() {
        let args = job().args();
        assert_eq!(args[0], "-y");
        assert!(args.windows(2).any(|w| w[0] == "-framerate" && w[1] == "30"));
        assert!(args.windows(2).any(|w| w[0] == "-c:v" && w[1] == "libx264"));
        assert!(args.windows(2).any(|w| w[0] == "-crf" && w[1] == "18"));
        assert!(!args.iter().any(|a| a == "-c:a"));
        assert_eq!(args.last().unwrap(), "export/out.mp4");
    }

    #[test]
    fn args_with_audio_append_aac_and_shortest() {
        let mut j = job();
        j.audio_path = Some(PathBuf::from("uploads/voice.mp3"));
        let args = j.args();
        assert!(args.windows(2).any(|w| w[0] == "-i" && w[1] == "uploads/voice.mp3"));
        assert!(args.windows(2).any(|w| w[0] == "-c:a" && w[1] == "aac"));
        assert!(args.iter().any(|a| a == "-shortest"));
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut j = job();
        j.fps = 0;
        assert!(j.validate().is_err());

        let mut j = job();
        j.codec_arg = " ".to_string();
        assert!(j.validate().is_err());
    }
}
