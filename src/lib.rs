#![forbid(unsafe_code)]
//! Timeline engine for a subtitle-driven video editor: auto-layout of
//! imported media onto tracks, deterministic per-frame scene projection, and
//! a staged render pipeline that hands frames to `ffmpeg` (required on PATH
//! for final encodes).

pub mod api;
pub mod assets;
pub mod color;
pub mod encode_ffmpeg;
pub mod error;
pub mod export;
pub mod layout;
pub mod model;
pub mod projector;
pub mod render;
pub mod store;
pub mod subtitle;

pub use error::{AutocutError, AutocutResult, RenderStage};
pub use model::{AspectRatio, Clip, ExportOptions, Project, Track, TrackType};
pub use projector::{SceneFrame, project_frame, project_frame_ready};
pub use render::{CancelToken, RenderArtifact, RenderOrchestrator};
pub use store::{ClipPatch, ProjectStore};
