//! The project entity graph: Project -> Track -> Clip, plus the staging and
//! export-configuration records that cross the render boundary.
//!
//! All time values are absolute project-timeline milliseconds. Clip ranges are
//! `[start, end)` for duration purposes; the projector's visibility check is
//! inclusive on both ends (see `projector`).

use crate::error::{AutocutError, AutocutResult};
use crate::subtitle::Cue;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "16:9")]
    Wide,
    #[serde(rename = "9:16")]
    Tall,
}

impl AspectRatio {
    pub fn default_resolution(self) -> Resolution {
        match self {
            AspectRatio::Wide => Resolution {
                width: 1920,
                height: 1080,
            },
            AspectRatio::Tall => Resolution {
                width: 1080,
                height: 1920,
            },
        }
    }

    /// Whether a resolution's orientation agrees with this aspect ratio.
    pub fn matches(self, res: Resolution) -> bool {
        match self {
            AspectRatio::Wide => res.width >= res.height,
            AspectRatio::Tall => res.height >= res.width,
        }
    }
}

/// Position as percentages of the project's native resolution, not pixels.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Transform2D {
    pub scale: f64,
    /// Degrees, about the element's own anchor.
    pub rotation: f64,
}

impl Default for Transform2D {
    fn default() -> Self {
        Self {
            scale: 1.0,
            rotation: 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum WritingMode {
    #[serde(rename = "horizontal-tb")]
    HorizontalTb,
    #[serde(rename = "vertical-rl")]
    VerticalRl,
    #[serde(rename = "vertical-lr")]
    VerticalLr,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TextStyle {
    pub font_size: f64,
    pub font_family: String,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background_color: Option<String>,
    pub writing_mode: WritingMode,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Clip {
    Text(TextClip),
    Image(ImageClip),
    Audio(AudioClip),
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TextClip {
    pub id: String,
    pub start: u64,
    pub end: u64,
    pub text: String,
    pub position: Position,
    pub transform: Transform2D,
    pub style: TextStyle,
    pub track_id: String,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ImageClip {
    pub id: String,
    pub start: u64,
    pub end: u64,
    pub src: String,
    pub position: Position,
    pub transform: Transform2D,
    pub track_id: String,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AudioClip {
    pub id: String,
    pub start: u64,
    pub end: u64,
    pub src: String,
    /// 0..1 playback gain; absent in serialized form means full volume.
    #[serde(default = "default_volume")]
    pub volume: f64,
    pub track_id: String,
}

fn default_volume() -> f64 {
    1.0
}

impl Clip {
    pub fn id(&self) -> &str {
        match self {
            Clip::Text(c) => &c.id,
            Clip::Image(c) => &c.id,
            Clip::Audio(c) => &c.id,
        }
    }

    pub fn start(&self) -> u64 {
        match self {
            Clip::Text(c) => c.start,
            Clip::Image(c) => c.start,
            Clip::Audio(c) => c.start,
        }
    }

    pub fn end(&self) -> u64 {
        match self {
            Clip::Text(c) => c.end,
            Clip::Image(c) => c.end,
            Clip::Audio(c) => c.end,
        }
    }

    pub fn track_id(&self) -> &str {
        match self {
            Clip::Text(c) => &c.track_id,
            Clip::Image(c) => &c.track_id,
            Clip::Audio(c) => &c.track_id,
        }
    }

    pub fn track_type(&self) -> TrackType {
        match self {
            Clip::Text(_) => TrackType::Text,
            Clip::Image(_) => TrackType::Image,
            Clip::Audio(_) => TrackType::Audio,
        }
    }

    pub(crate) fn set_start(&mut self, start: u64) {
        match self {
            Clip::Text(c) => c.start = start,
            Clip::Image(c) => c.start = start,
            Clip::Audio(c) => c.start = start,
        }
    }

    pub(crate) fn set_track_id(&mut self, track_id: String) {
        match self {
            Clip::Text(c) => c.track_id = track_id,
            Clip::Image(c) => c.track_id = track_id,
            Clip::Audio(c) => c.track_id = track_id,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackType {
    Text,
    Image,
    Audio,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Track {
    pub id: String,
    #[serde(rename = "type")]
    pub track_type: TrackType,
    pub name: String,
    pub clips: Vec<Clip>,
    pub muted: bool,
    /// Reserved for edit protection; not enforced by the model.
    pub locked: bool,
}

impl Track {
    pub fn new(id: impl Into<String>, track_type: TrackType, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            track_type,
            name: name.into(),
            clips: Vec::new(),
            muted: false,
            locked: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Project {
    pub id: String,
    pub name: String,
    /// Total duration in milliseconds; must cover every clip end.
    pub duration: u64,
    pub fps: u32,
    pub resolution: Resolution,
    pub aspect_ratio: AspectRatio,
    pub tracks: Vec<Track>,
    /// Primary audio asset, when one has been imported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_file: Option<String>,
}

impl Project {
    pub fn new(id: impl Into<String>, name: impl Into<String>, aspect_ratio: AspectRatio) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            duration: 0,
            fps: 30,
            resolution: aspect_ratio.default_resolution(),
            aspect_ratio,
            tracks: Vec::new(),
            audio_file: None,
        }
    }

    /// Total frames at the project's fps, minimum 1.
    pub fn frame_count(&self) -> u64 {
        let frames = (self.duration as f64 / 1000.0 * f64::from(self.fps)).ceil() as u64;
        frames.max(1)
    }

    pub fn track(&self, track_id: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == track_id)
    }

    pub fn track_mut(&mut self, track_id: &str) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id == track_id)
    }

    /// The largest clip end across all tracks, 0 when empty.
    pub fn max_clip_end(&self) -> u64 {
        self.tracks
            .iter()
            .flat_map(|t| t.clips.iter())
            .map(Clip::end)
            .max()
            .unwrap_or(0)
    }

    pub fn validate(&self) -> AutocutResult<()> {
        if self.fps == 0 {
            return Err(AutocutError::validation("fps must be > 0"));
        }
        if self.resolution.width == 0 || self.resolution.height == 0 {
            return Err(AutocutError::validation(
                "resolution width/height must be > 0",
            ));
        }
        if !self.aspect_ratio.matches(self.resolution) {
            return Err(AutocutError::validation(
                "aspect ratio does not agree with resolution orientation",
            ));
        }
        if self.duration < self.max_clip_end() {
            return Err(AutocutError::validation(
                "project duration must cover every clip end",
            ));
        }

        for track in &self.tracks {
            for clip in &track.clips {
                if clip.track_type() != track.track_type {
                    return Err(AutocutError::validation(format!(
                        "clip '{}' type does not match track '{}' type",
                        clip.id(),
                        track.id
                    )));
                }
                if clip.start() >= clip.end() {
                    return Err(AutocutError::validation(format!(
                        "clip '{}' has invalid range (start >= end)",
                        clip.id()
                    )));
                }
            }
        }

        Ok(())
    }
}

/// A user-imported source file, staged for auto-layout. Not part of the
/// persisted project.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ImportedFile {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub payload: ImportedPayload,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ImportedPayload {
    Srt {
        cues: Vec<Cue>,
    },
    Image {
        url: String,
    },
    Audio {
        url: String,
        /// Real decoded duration when the source could be probed.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Low,
    Medium,
    High,
}

impl Quality {
    /// Quality preset mapped to an ffmpeg CRF constant.
    pub fn crf(self) -> u32 {
        match self {
            Quality::Low => 28,
            Quality::Medium => 23,
            Quality::High => 18,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    H264,
    H265,
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RenderSettings {
    pub fps: u32,
    pub resolution: Resolution,
    pub quality: Quality,
    pub codec: Codec,
    pub crf: u32,
    pub pixel_format: String,
    pub profile: String,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            fps: 30,
            resolution: Resolution {
                width: 1920,
                height: 1080,
            },
            quality: Quality::High,
            codec: Codec::H264,
            crf: Quality::High.crf(),
            pixel_format: "yuv420p".to_string(),
            profile: "high".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    Mp4,
    Mov,
}

impl ContainerFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ContainerFormat::Mp4 => "mp4",
            ContainerFormat::Mov => "mov",
        }
    }
}

/// Export-time configuration snapshot, passed opaquely into the render
/// orchestrator.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ExportOptions {
    pub format: ContainerFormat,
    pub settings: RenderSettings,
    pub include_audio: bool,
    pub include_subtitles: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: ContainerFormat::Mp4,
            settings: RenderSettings::default(),
            include_audio: true,
            include_subtitles: true,
        }
    }
}
