//! Deterministic timeline auto-layout.
//!
//! Given the staged imported files, rebuild the project's duration and its
//! entire track/clip set from scratch. This is a destructive rebuild: prior
//! manual timeline edits are discarded, and running it again with the same
//! inputs reproduces the same content.

use tracing::info;

use crate::model::{
    AudioClip, Clip, ImageClip, ImportedFile, ImportedPayload, Position, Project, TextClip,
    TextStyle, Track, TrackType, Transform2D, WritingMode,
};

/// Placeholder project window when an audio file is present but its real
/// duration could not be probed.
pub const DEFAULT_AUDIO_WINDOW_MS: u64 = 180_000;
/// Margin added after the last subtitle cue.
pub const TRAILING_MARGIN_MS: u64 = 2_000;
/// Floor for subtitle-derived durations.
pub const MIN_DURATION_MS: u64 = 5_000;
/// Screen time given to each image when images alone drive the duration.
pub const PER_IMAGE_DURATION_MS: u64 = 5_000;
/// Window used when nothing has been imported.
pub const FALLBACK_DURATION_MS: u64 = 60_000;

/// Default anchor for subtitle text: bottom-center.
pub const DEFAULT_TEXT_POSITION: Position = Position { x: 50.0, y: 80.0 };

fn default_text_style() -> TextStyle {
    TextStyle {
        font_size: 36.0,
        font_family: "Arial".to_string(),
        color: "#ffffff".to_string(),
        background_color: Some("#00000080".to_string()),
        writing_mode: WritingMode::HorizontalTb,
    }
}

/// Derive the project duration from the imported set, in priority order:
/// audio, subtitles, images, fixed fallback.
pub fn derive_duration_ms(files: &[ImportedFile]) -> u64 {
    let audio = files
        .iter()
        .find_map(|f| match &f.payload {
            ImportedPayload::Audio { duration_ms, .. } => Some(*duration_ms),
            _ => None,
        });

    let last_cue_end = files
        .iter()
        .filter_map(|f| match &f.payload {
            ImportedPayload::Srt { cues } => cues.iter().map(|c| c.end_ms).max(),
            _ => None,
        })
        .max();

    if let Some(duration_ms) = audio {
        // Prefer the probed duration; fall back to the fixed window when the
        // source could not be decoded. Either way the window must still cover
        // every subtitle cue, or layout would emit clips past the project end.
        let base = duration_ms.unwrap_or(DEFAULT_AUDIO_WINDOW_MS);
        return match last_cue_end {
            Some(last_end) => base.max(last_end + TRAILING_MARGIN_MS),
            None => base,
        };
    }

    if let Some(last_end) = last_cue_end {
        return (last_end + TRAILING_MARGIN_MS).max(MIN_DURATION_MS);
    }

    let image_count = files
        .iter()
        .filter(|f| matches!(f.payload, ImportedPayload::Image { .. }))
        .count() as u64;
    if image_count > 0 {
        return image_count * PER_IMAGE_DURATION_MS;
    }

    FALLBACK_DURATION_MS
}

/// Rebuild `project`'s duration and full track list from the imported files.
///
/// One text track is created per subtitle file (each cue becomes a text clip
/// at the default bottom-center anchor), one image track holds all images
/// back-to-back in import order, and one audio track carries a single
/// full-span clip at full volume.
pub fn auto_layout(project: &mut Project, files: &[ImportedFile]) {
    let duration = derive_duration_ms(files);
    project.duration = duration;
    project.tracks.clear();

    let audio_file = files.iter().find_map(|f| match &f.payload {
        ImportedPayload::Audio { url, .. } => Some(url.clone()),
        _ => None,
    });
    if let Some(url) = &audio_file {
        project.audio_file = Some(url.clone());
    }

    for file in files {
        let ImportedPayload::Srt { cues } = &file.payload else {
            continue;
        };

        let track_id = format!("track-{}", file.id);
        let mut track = Track::new(track_id.clone(), TrackType::Text, &file.name);
        for (index, cue) in cues.iter().enumerate() {
            track.clips.push(Clip::Text(TextClip {
                id: format!("clip-{}-{index}", file.id),
                start: cue.start_ms,
                end: cue.end_ms,
                text: cue.text.clone(),
                position: DEFAULT_TEXT_POSITION,
                transform: Transform2D::default(),
                style: default_text_style(),
                track_id: track_id.clone(),
            }));
        }
        project.tracks.push(track);
    }

    let image_files: Vec<&ImportedFile> = files
        .iter()
        .filter(|f| matches!(f.payload, ImportedPayload::Image { .. }))
        .collect();
    if !image_files.is_empty() {
        let track_id = "auto-image-track".to_string();
        let mut track = Track::new(track_id.clone(), TrackType::Image, "Images");
        let slot = duration as f64 / image_files.len() as f64;
        for (index, file) in image_files.iter().enumerate() {
            let ImportedPayload::Image { url } = &file.payload else {
                continue;
            };
            track.clips.push(Clip::Image(ImageClip {
                id: format!("auto-image-{}", file.id),
                start: (index as f64 * slot).round() as u64,
                end: ((index + 1) as f64 * slot).round() as u64,
                src: url.clone(),
                position: Position { x: 0.0, y: 0.0 },
                transform: Transform2D::default(),
                track_id: track_id.clone(),
            }));
        }
        project.tracks.push(track);
    }

    if let Some(url) = audio_file {
        let track_id = "auto-audio-track".to_string();
        let mut track = Track::new(track_id.clone(), TrackType::Audio, "Audio");
        track.clips.push(Clip::Audio(AudioClip {
            id: "auto-audio-main".to_string(),
            start: 0,
            end: duration,
            src: url,
            volume: 1.0,
            track_id: track_id.clone(),
        }));
        project.tracks.push(track);
    }

    info!(
        duration_ms = duration,
        tracks = project.tracks.len(),
        "auto-layout rebuilt timeline"
    );
}
