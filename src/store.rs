//! The editing session state and its mutation API.
//!
//! `ProjectStore` is the single source of truth for an editing session: the
//! current project, the staged imported files, and the shared playback cursor.
//! There is no ambient global; callers hold the store and mutate it through
//! the documented operation set.
//!
//! Mutations are missing-target tolerant: operating on an unknown track or
//! clip id is a silent no-op, never an error. The model is edited
//! interactively with immediate visual feedback, so absence simply means the
//! target was already gone.

use crate::model::{
    Clip, ImportedFile, ImportedPayload, Position, Project, TextStyle, Track, TrackType,
    Transform2D,
};
use crate::subtitle;

/// Shallow patch applied by [`ProjectStore::update_clip`].
///
/// Nested records (`position`, `transform`, `style`) are replaced wholesale,
/// not deep-merged: a caller changing one style field must read the existing
/// style, modify it, and supply the full value. Bulk-apply operations depend
/// on this wholesale-replacement contract.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct ClipPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform2D>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<TextStyle>,
}

impl ClipPatch {
    fn apply(&self, clip: &mut Clip) {
        match clip {
            Clip::Text(c) => {
                if let Some(start) = self.start {
                    c.start = start;
                }
                if let Some(end) = self.end {
                    c.end = end;
                }
                if let Some(text) = &self.text {
                    c.text = text.clone();
                }
                if let Some(position) = self.position {
                    c.position = position;
                }
                if let Some(transform) = self.transform {
                    c.transform = transform;
                }
                if let Some(style) = &self.style {
                    c.style = style.clone();
                }
            }
            Clip::Image(c) => {
                if let Some(start) = self.start {
                    c.start = start;
                }
                if let Some(end) = self.end {
                    c.end = end;
                }
                if let Some(src) = &self.src {
                    c.src = src.clone();
                }
                if let Some(position) = self.position {
                    c.position = position;
                }
                if let Some(transform) = self.transform {
                    c.transform = transform;
                }
            }
            Clip::Audio(c) => {
                if let Some(start) = self.start {
                    c.start = start;
                }
                if let Some(end) = self.end {
                    c.end = end;
                }
                if let Some(src) = &self.src {
                    c.src = src.clone();
                }
                if let Some(volume) = self.volume {
                    c.volume = volume;
                }
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ProjectStore {
    pub project: Option<Project>,
    pub imported_files: Vec<ImportedFile>,
    /// Shared playback cursor in milliseconds. Both seeking and playback
    /// ticking write it; last write wins.
    pub current_time: u64,
    next_id: u64,
}

impl ProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    /// Replace the current project wholesale with a new empty one.
    pub fn create_project(&mut self, name: &str, aspect_ratio: crate::model::AspectRatio) {
        let id = self.fresh_id("project");
        self.project = Some(Project::new(id, name, aspect_ratio));
        self.current_time = 0;
    }

    pub fn load_project(&mut self, project: Project) {
        self.project = Some(project);
        self.current_time = 0;
    }

    // File management.

    pub fn import_srt(&mut self, name: &str, content: &str) -> String {
        let cues = subtitle::parse_srt(content);
        let id = self.fresh_id("file");
        self.imported_files.push(ImportedFile {
            id: id.clone(),
            name: name.to_string(),
            payload: ImportedPayload::Srt { cues },
        });
        id
    }

    pub fn import_image(&mut self, name: &str, url: &str) -> String {
        let id = self.fresh_id("file");
        self.imported_files.push(ImportedFile {
            id: id.clone(),
            name: name.to_string(),
            payload: ImportedPayload::Image {
                url: url.to_string(),
            },
        });
        id
    }

    /// Stage an audio file; the first one imported becomes the project's
    /// primary audio reference.
    pub fn import_audio(&mut self, name: &str, url: &str, duration_ms: Option<u64>) -> String {
        let id = self.fresh_id("file");
        self.imported_files.push(ImportedFile {
            id: id.clone(),
            name: name.to_string(),
            payload: ImportedPayload::Audio {
                url: url.to_string(),
                duration_ms,
            },
        });
        if let Some(project) = &mut self.project
            && project.audio_file.is_none()
        {
            project.audio_file = Some(url.to_string());
        }
        id
    }

    pub fn remove_file(&mut self, file_id: &str) {
        self.imported_files.retain(|f| f.id != file_id);
    }

    /// Rebuild the timeline from the staged files. Destructive: prior manual
    /// edits to tracks and clips are discarded.
    pub fn relayout(&mut self) {
        if let Some(project) = &mut self.project {
            crate::layout::auto_layout(project, &self.imported_files);
        }
    }

    // Timeline operations.

    pub fn add_track(&mut self, track_type: TrackType, name: &str) -> Option<String> {
        let id = self.fresh_id("track");
        let project = self.project.as_mut()?;
        project
            .tracks
            .push(Track::new(id.clone(), track_type, name));
        Some(id)
    }

    pub fn remove_track(&mut self, track_id: &str) {
        if let Some(project) = &mut self.project {
            project.tracks.retain(|t| t.id != track_id);
        }
    }

    /// Append a clip to the named track; the clip's id and back-reference are
    /// assigned here. No-op when the track does not exist.
    pub fn add_clip(&mut self, track_id: &str, mut clip: Clip) -> Option<String> {
        let id = self.fresh_id("clip");
        let project = self.project.as_mut()?;
        let track = project.track_mut(track_id)?;

        match &mut clip {
            Clip::Text(c) => {
                c.id = id.clone();
                c.track_id = track_id.to_string();
            }
            Clip::Image(c) => {
                c.id = id.clone();
                c.track_id = track_id.to_string();
            }
            Clip::Audio(c) => {
                c.id = id.clone();
                c.track_id = track_id.to_string();
            }
        }

        track.clips.push(clip);
        Some(id)
    }

    pub fn remove_clip(&mut self, track_id: &str, clip_id: &str) {
        let Some(project) = &mut self.project else {
            return;
        };
        let Some(track) = project.track_mut(track_id) else {
            return;
        };
        track.clips.retain(|c| c.id() != clip_id);
    }

    /// Shallow-merge the patch into the existing clip. See [`ClipPatch`] for
    /// the wholesale-replacement contract on nested records.
    pub fn update_clip(&mut self, track_id: &str, clip_id: &str, patch: &ClipPatch) {
        let Some(project) = &mut self.project else {
            return;
        };
        let Some(track) = project.track_mut(track_id) else {
            return;
        };
        let Some(clip) = track.clips.iter_mut().find(|c| c.id() == clip_id) else {
            return;
        };
        patch.apply(clip);
    }

    /// Move a clip to another track at a new start time.
    ///
    /// `end` is deliberately not recalculated; callers that want to preserve
    /// the clip's duration must update `end` themselves after the move.
    pub fn move_clip(&mut self, from_track_id: &str, to_track_id: &str, clip_id: &str, new_start: u64) {
        let Some(project) = &mut self.project else {
            return;
        };
        if project.track(to_track_id).is_none() {
            return;
        }
        let Some(from_track) = project.track_mut(from_track_id) else {
            return;
        };
        let Some(pos) = from_track.clips.iter().position(|c| c.id() == clip_id) else {
            return;
        };

        let mut clip = from_track.clips.remove(pos);
        clip.set_start(new_start);
        clip.set_track_id(to_track_id.to_string());

        // Destination existence was checked above.
        if let Some(to_track) = project.track_mut(to_track_id) {
            to_track.clips.push(clip);
        }
    }

    /// Broadcast position/transform (and, for text, style) from a reference
    /// clip to every clip of the matching type in the track.
    pub fn apply_style_to_track(&mut self, track_id: &str, reference: &Clip) {
        let Some(project) = &mut self.project else {
            return;
        };
        let Some(track) = project.track_mut(track_id) else {
            return;
        };

        for clip in &mut track.clips {
            match (clip, reference) {
                (Clip::Text(c), Clip::Text(r)) => {
                    c.position = r.position;
                    c.transform = r.transform;
                    c.style = r.style.clone();
                }
                (Clip::Image(c), Clip::Image(r)) => {
                    c.position = r.position;
                    c.transform = r.transform;
                }
                _ => {}
            }
        }
    }

    // Playback cursor. Seeking and playback ticking both land here;
    // last-write-wins is acceptable since both represent the same user's
    // intent.

    pub fn seek(&mut self, time_ms: u64) {
        self.current_time = time_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AspectRatio, AudioClip, ImageClip, TextClip, WritingMode};

    fn store_with_project() -> ProjectStore {
        let mut store = ProjectStore::new();
        store.create_project("Demo", AspectRatio::Wide);
        store
    }

    fn sample_text_clip(start: u64, end: u64) -> Clip {
        Clip::Text(TextClip {
            id: String::new(),
            start,
            end,
            text: "hi".to_string(),
            position: Position { x: 50.0, y: 80.0 },
            transform: Transform2D::default(),
            style: TextStyle {
                font_size: 36.0,
                font_family: "Arial".to_string(),
                color: "#ffffff".to_string(),
                background_color: None,
                writing_mode: WritingMode::HorizontalTb,
            },
            track_id: String::new(),
        })
    }

    #[test]
    fn add_track_and_clip() {
        let mut store = store_with_project();
        let track_id = store.add_track(TrackType::Text, "Subtitles").unwrap();
        let clip_id = store.add_clip(&track_id, sample_text_clip(0, 1000)).unwrap();

        let project = store.project.as_ref().unwrap();
        let track = project.track(&track_id).unwrap();
        assert_eq!(track.clips.len(), 1);
        assert_eq!(track.clips[0].id(), clip_id);
        assert_eq!(track.clips[0].track_id(), track_id);
    }

    #[test]
    fn add_clip_to_missing_track_is_a_noop() {
        let mut store = store_with_project();
        assert!(store.add_clip("nope", sample_text_clip(0, 1000)).is_none());
        assert!(store.project.as_ref().unwrap().tracks.is_empty());
    }

    #[test]
    fn track_ids_are_unique() {
        let mut store = store_with_project();
        let a = store.add_track(TrackType::Text, "A").unwrap();
        let b = store.add_track(TrackType::Text, "B").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn update_clip_shallow_merges_and_replaces_style_wholesale() {
        let mut store = store_with_project();
        let track_id = store.add_track(TrackType::Text, "Subtitles").unwrap();
        let clip_id = store.add_clip(&track_id, sample_text_clip(0, 1000)).unwrap();

        let new_style = TextStyle {
            font_size: 48.0,
            font_family: "Helvetica".to_string(),
            color: "#ff0000".to_string(),
            background_color: None,
            writing_mode: WritingMode::VerticalRl,
        };
        store.update_clip(
            &track_id,
            &clip_id,
            &ClipPatch {
                text: Some("updated".to_string()),
                style: Some(new_style.clone()),
                ..ClipPatch::default()
            },
        );

        let project = store.project.as_ref().unwrap();
        let Clip::Text(c) = &project.track(&track_id).unwrap().clips[0] else {
            panic!("expected text clip");
        };
        assert_eq!(c.text, "updated");
        // The style block is the supplied value, not a merge with the old one.
        assert_eq!(c.style, new_style);
        // Untouched fields survive.
        assert_eq!(c.end, 1000);
    }

    #[test]
    fn update_missing_clip_is_a_noop() {
        let mut store = store_with_project();
        let track_id = store.add_track(TrackType::Text, "Subtitles").unwrap();
        store.update_clip(
            &track_id,
            "ghost",
            &ClipPatch {
                text: Some("x".to_string()),
                ..ClipPatch::default()
            },
        );
        assert!(store.project.as_ref().unwrap().track(&track_id).unwrap().clips.is_empty());
    }

    #[test]
    fn remove_clip_and_track() {
        let mut store = store_with_project();
        let track_id = store.add_track(TrackType::Text, "Subtitles").unwrap();
        let clip_id = store.add_clip(&track_id, sample_text_clip(0, 1000)).unwrap();

        store.remove_clip(&track_id, &clip_id);
        assert!(store.project.as_ref().unwrap().track(&track_id).unwrap().clips.is_empty());

        store.remove_track(&track_id);
        assert!(store.project.as_ref().unwrap().tracks.is_empty());

        // Removing again is harmless.
        store.remove_track(&track_id);
    }

    #[test]
    fn move_clip_reassigns_track_and_start_but_not_end() {
        let mut store = store_with_project();
        let a = store.add_track(TrackType::Text, "A").unwrap();
        let b = store.add_track(TrackType::Text, "B").unwrap();
        let clip_id = store.add_clip(&a, sample_text_clip(1000, 3000)).unwrap();

        store.move_clip(&a, &b, &clip_id, 5000);

        let project = store.project.as_ref().unwrap();
        assert!(project.track(&a).unwrap().clips.is_empty());
        let moved = &project.track(&b).unwrap().clips[0];
        assert_eq!(moved.start(), 5000);
        // End is left alone by contract.
        assert_eq!(moved.end(), 3000);
        assert_eq!(moved.track_id(), b);
    }

    #[test]
    fn move_to_missing_track_leaves_source_untouched() {
        let mut store = store_with_project();
        let a = store.add_track(TrackType::Text, "A").unwrap();
        let clip_id = store.add_clip(&a, sample_text_clip(0, 1000)).unwrap();

        store.move_clip(&a, "nope", &clip_id, 5000);
        assert_eq!(store.project.as_ref().unwrap().track(&a).unwrap().clips.len(), 1);
    }

    #[test]
    fn apply_style_broadcasts_to_matching_type_only() {
        let mut store = store_with_project();
        let track_id = store.add_track(TrackType::Text, "Subtitles").unwrap();
        store.add_clip(&track_id, sample_text_clip(0, 1000));
        store.add_clip(&track_id, sample_text_clip(1000, 2000));

        let mut reference = sample_text_clip(0, 1000);
        if let Clip::Text(r) = &mut reference {
            r.position = Position { x: 10.0, y: 20.0 };
            r.style.font_size = 72.0;
        }
        store.apply_style_to_track(&track_id, &reference);

        let project = store.project.as_ref().unwrap();
        for clip in &project.track(&track_id).unwrap().clips {
            let Clip::Text(c) = clip else { unreachable!() };
            assert_eq!(c.position.x, 10.0);
            assert_eq!(c.style.font_size, 72.0);
        }
    }

    #[test]
    fn first_imported_audio_becomes_project_audio() {
        let mut store = store_with_project();
        store.import_audio("a.mp3", "/uploads/a.mp3", Some(30_000));
        store.import_audio("b.mp3", "/uploads/b.mp3", None);
        assert_eq!(
            store.project.as_ref().unwrap().audio_file.as_deref(),
            Some("/uploads/a.mp3")
        );
    }

    #[test]
    fn relayout_rebuilds_timeline_from_staged_files() {
        let mut store = store_with_project();
        store.add_track(TrackType::Text, "Manual");
        store.import_srt("subs.srt", "1\n00:00:00,000 --> 00:00:02,000\nHi\n");
        store.relayout();

        let project = store.project.as_ref().unwrap();
        // The manual track is gone; layout owns the whole timeline.
        assert_eq!(project.tracks.len(), 1);
        assert_eq!(project.tracks[0].track_type, TrackType::Text);
        assert_eq!(project.tracks[0].clips.len(), 1);
    }

    #[test]
    fn remove_file_drops_staged_entry() {
        let mut store = store_with_project();
        let id = store.import_image("x.png", "/uploads/x.png");
        store.remove_file(&id);
        assert!(store.imported_files.is_empty());
    }

    #[test]
    fn sample_clip_fixtures_cover_all_variants() {
        // Image and audio patches share the same shallow-merge path.
        let mut store = store_with_project();
        let images = store.add_track(TrackType::Image, "Images").unwrap();
        let audio = store.add_track(TrackType::Audio, "Audio").unwrap();

        let image_id = store
            .add_clip(
                &images,
                Clip::Image(ImageClip {
                    id: String::new(),
                    start: 0,
                    end: 5000,
                    src: "/uploads/x.png".to_string(),
                    position: Position { x: 0.0, y: 0.0 },
                    transform: Transform2D::default(),
                    track_id: String::new(),
                }),
            )
            .unwrap();
        let audio_id = store
            .add_clip(
                &audio,
                Clip::Audio(AudioClip {
                    id: String::new(),
                    start: 0,
                    end: 5000,
                    src: "/uploads/a.mp3".to_string(),
                    volume: 1.0,
                    track_id: String::new(),
                }),
            )
            .unwrap();

        store.update_clip(
            &images,
            &image_id,
            &ClipPatch {
                transform: Some(Transform2D {
                    scale: 2.0,
                    rotation: 45.0,
                }),
                ..ClipPatch::default()
            },
        );
        store.update_clip(
            &audio,
            &audio_id,
            &ClipPatch {
                volume: Some(0.5),
                ..ClipPatch::default()
            },
        );

        let project = store.project.as_ref().unwrap();
        let Clip::Image(img) = &project.track(&images).unwrap().clips[0] else {
            unreachable!()
        };
        assert_eq!(img.transform.scale, 2.0);
        let Clip::Audio(aud) = &project.track(&audio).unwrap().clips[0] else {
            unreachable!()
        };
        assert_eq!(aud.volume, 0.5);
    }
}
