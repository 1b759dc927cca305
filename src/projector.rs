//! Compositing projection: (project, time, surface size) -> drawable elements
//! plus the scheduled audio segments.
//!
//! The same projection feeds the live canvas preview and the server-side frame
//! renderer; only their image-readiness policy differs (see [`project_frame`]
//! vs [`project_frame_ready`]).

use kurbo::Affine;

use crate::assets::ImageCache;
use crate::color;
use crate::error::AutocutResult;
use crate::model::{Clip, Project, Resolution, TextClip, TrackType, WritingMode};

/// Fixed padding around a text clip's background rectangle, in surface pixels.
pub const TEXT_BACKGROUND_PADDING: f64 = 5.0;

const Z_TYPE_RANK_STRIDE: i32 = 1000;
const Z_TRACK_STRIDE: i32 = 10;

/// One frame's worth of projection output, in draw order (lowest z first).
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct SceneFrame {
    pub time_ms: u64,
    pub elements: Vec<VisualElement>,
    pub audio: Vec<AudioSegment>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct VisualElement {
    pub clip_id: String,
    pub z: i32,
    /// Anchor position in surface pixels.
    pub x: f64,
    pub y: f64,
    /// Uniform content scale from the clip transform.
    pub scale: f64,
    /// Rotation in degrees about the element's own anchor.
    pub rotation: f64,
    pub content: ElementContent,
}

impl VisualElement {
    /// Placement transform: translate to position, then scale, then rotate.
    /// Rotation composes after translation, so it never affects the anchor.
    pub fn placement(&self) -> Affine {
        Affine::translate((self.x, self.y))
            * Affine::scale(self.scale)
            * Affine::rotate(self.rotation.to_radians())
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ElementContent {
    Text(TextElement),
    Image(ImageElement),
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct TextElement {
    pub text: String,
    /// Font size in surface pixels (project font size scaled by surface y).
    pub font_size: f64,
    pub font_family: String,
    /// Draw-ready color string (plain hex when opaque, rgba otherwise).
    pub color: String,
    pub background: Option<TextBackground>,
    pub writing_mode: WritingMode,
}

/// Padded rectangle drawn behind the text, centered on the element anchor.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct TextBackground {
    pub width: f64,
    pub height: f64,
    pub color: String,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ImageElement {
    pub src: String,
    /// Natural dimensions scaled by the surface/project ratio (the clip's own
    /// scale is applied through the placement transform).
    pub width: f64,
    pub height: f64,
}

/// An audio clip scheduled on the timeline. Audio is emitted with its own
/// range rather than filtered by the current time; the mixer decides what is
/// audible.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AudioSegment {
    pub clip_id: String,
    pub src: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub volume: f64,
    pub muted: bool,
}

/// Measures a text block's bounding box in surface pixels.
///
/// The preview and the frame renderer bring their own measurement (canvas
/// metrics vs a layout engine); [`HeuristicMeasurer`] approximates when
/// neither is available.
pub trait TextMeasurer {
    fn measure(&self, text: &str, font_size: f64, font_family: &str) -> (f64, f64);
}

/// Glyph-count approximation: average advance 0.6em, line height 1.2em.
#[derive(Clone, Copy, Debug, Default)]
pub struct HeuristicMeasurer;

impl TextMeasurer for HeuristicMeasurer {
    fn measure(&self, text: &str, font_size: f64, _font_family: &str) -> (f64, f64) {
        let max_line = text
            .lines()
            .map(|l| l.chars().count())
            .max()
            .unwrap_or(0) as f64;
        let line_count = text.lines().count().max(1) as f64;
        (max_line * font_size * 0.6, line_count * font_size * 1.2)
    }
}

/// A clip is visible at `t` iff `start <= t <= end`.
///
/// Both ends are inclusive (matching the preview's long-standing behavior)
/// even though the duration model is half-open; adjacent clips overlap for
/// exactly one instant at their shared boundary.
pub fn is_active(clip: &Clip, time_ms: u64) -> bool {
    clip.start() <= time_ms && time_ms <= clip.end()
}

/// Project a frame for the live preview: images whose sources are not yet
/// decoded are skipped this frame and appear once loaded.
pub fn project_frame(
    project: &Project,
    time_ms: u64,
    surface: Resolution,
    cache: &ImageCache,
    measurer: &dyn TextMeasurer,
) -> SceneFrame {
    project_with(project, time_ms, surface, measurer, &mut |src| {
        cache
            .get_if_ready(src)
            .map(|img| (img.width, img.height))
    })
}

/// Project a frame for the server-side renderer: every active image source is
/// decoded (and memoized) before the frame is sampled, so output frames never
/// race asset loading.
pub fn project_frame_ready(
    project: &Project,
    time_ms: u64,
    surface: Resolution,
    cache: &mut ImageCache,
    measurer: &dyn TextMeasurer,
) -> AutocutResult<SceneFrame> {
    // Warm the cache first so the shared projection below never misses.
    for track in &project.tracks {
        if track.track_type != TrackType::Image {
            continue;
        }
        for clip in &track.clips {
            if let Clip::Image(c) = clip
                && is_active(clip, time_ms)
            {
                cache.ensure_ready(&c.src)?;
            }
        }
    }

    Ok(project_with(project, time_ms, surface, measurer, &mut |src| {
        cache
            .get_if_ready(src)
            .map(|img| (img.width, img.height))
    }))
}

fn project_with(
    project: &Project,
    time_ms: u64,
    surface: Resolution,
    measurer: &dyn TextMeasurer,
    image_dims: &mut dyn FnMut(&str) -> Option<(u32, u32)>,
) -> SceneFrame {
    let scale_x = f64::from(surface.width) / f64::from(project.resolution.width);
    let scale_y = f64::from(surface.height) / f64::from(project.resolution.height);

    let mut elements = Vec::new();

    // Fixed layering: all image tracks below all text tracks, each set in the
    // project's own track order.
    for (rank, wanted) in [TrackType::Image, TrackType::Text].into_iter().enumerate() {
        for (track_index, track) in project.tracks.iter().enumerate() {
            if track.track_type != wanted {
                continue;
            }

            let mut active_index = 0i32;
            for clip in &track.clips {
                if !is_active(clip, time_ms) {
                    continue;
                }
                let z = rank as i32 * Z_TYPE_RANK_STRIDE
                    + track_index as i32 * Z_TRACK_STRIDE
                    + active_index;
                active_index += 1;

                match clip {
                    Clip::Text(c) => {
                        elements.push(text_element(c, z, project.resolution, scale_x, scale_y, measurer));
                    }
                    Clip::Image(c) => {
                        // Not decoded yet: skip this frame, not the pipeline.
                        let Some((w, h)) = image_dims(&c.src) else {
                            active_index -= 1;
                            continue;
                        };
                        elements.push(VisualElement {
                            clip_id: c.id.clone(),
                            z,
                            x: c.position.x / 100.0 * f64::from(project.resolution.width) * scale_x,
                            y: c.position.y / 100.0 * f64::from(project.resolution.height) * scale_y,
                            scale: c.transform.scale,
                            rotation: c.transform.rotation,
                            content: ElementContent::Image(ImageElement {
                                src: c.src.clone(),
                                width: f64::from(w) * scale_x,
                                height: f64::from(h) * scale_y,
                            }),
                        });
                    }
                    Clip::Audio(_) => {}
                }
            }
        }
    }

    elements.sort_by_key(|e| e.z);

    let mut audio = Vec::new();
    for track in &project.tracks {
        if track.track_type != TrackType::Audio {
            continue;
        }
        for clip in &track.clips {
            let Clip::Audio(c) = clip else { continue };
            audio.push(AudioSegment {
                clip_id: c.id.clone(),
                src: c.src.clone(),
                start_ms: c.start,
                end_ms: c.end,
                volume: c.volume,
                muted: track.muted,
            });
        }
    }

    SceneFrame {
        time_ms,
        elements,
        audio,
    }
}

fn text_element(
    clip: &TextClip,
    z: i32,
    project_res: Resolution,
    scale_x: f64,
    scale_y: f64,
    measurer: &dyn TextMeasurer,
) -> VisualElement {
    let font_size = clip.style.font_size * scale_y;
    let color = color::normalize_for_draw(&clip.style.color, "#ffffff");

    let background = clip.style.background_color.as_deref().map(|bg| {
        let (w, h) = measurer.measure(&clip.text, font_size, &clip.style.font_family);
        TextBackground {
            width: w + 2.0 * TEXT_BACKGROUND_PADDING,
            height: h + 2.0 * TEXT_BACKGROUND_PADDING,
            color: color::normalize_for_draw(bg, "#000000"),
        }
    });

    // Position percentages are relative to the project resolution; the
    // surface ratio is applied independently per axis.
    VisualElement {
        clip_id: clip.id.clone(),
        z,
        x: clip.position.x / 100.0 * f64::from(project_res.width) * scale_x,
        y: clip.position.y / 100.0 * f64::from(project_res.height) * scale_y,
        scale: clip.transform.scale,
        rotation: clip.transform.rotation,
        content: ElementContent::Text(TextElement {
            text: clip.text.clone(),
            font_size,
            font_family: clip.style.font_family.clone(),
            color,
            background,
            writing_mode: clip.style.writing_mode,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets;
    use crate::model::{
        AspectRatio, AudioClip, ImageClip, Position, Project, TextStyle, Track, Transform2D,
    };

    fn text_clip(id: &str, start: u64, end: u64, track_id: &str) -> Clip {
        Clip::Text(TextClip {
            id: id.to_string(),
            start,
            end,
            text: "hello".to_string(),
            position: Position { x: 50.0, y: 80.0 },
            transform: Transform2D::default(),
            style: TextStyle {
                font_size: 36.0,
                font_family: "Arial".to_string(),
                color: "#ffffff".to_string(),
                background_color: Some("#00000080".to_string()),
                writing_mode: WritingMode::HorizontalTb,
            },
            track_id: track_id.to_string(),
        })
    }

    fn image_clip(id: &str, start: u64, end: u64, src: &str, track_id: &str) -> Clip {
        Clip::Image(ImageClip {
            id: id.to_string(),
            start,
            end,
            src: src.to_string(),
            position: Position { x: 0.0, y: 0.0 },
            transform: Transform2D::default(),
            track_id: track_id.to_string(),
        })
    }

    fn layered_project() -> Project {
        let mut project = Project::new("p1", "Demo", AspectRatio::Wide);
        project.duration = 10_000;

        // Text track intentionally created first; layering must still put the
        // image below.
        let mut text = Track::new("t-text", TrackType::Text, "Subtitles");
        text.clips.push(text_clip("c-text", 0, 5000, "t-text"));
        project.tracks.push(text);

        let mut images = Track::new("t-img", TrackType::Image, "Images");
        images
            .clips
            .push(image_clip("c-img", 0, 5000, "bg.png", "t-img"));
        project.tracks.push(images);

        project
    }

    fn half_surface() -> Resolution {
        Resolution {
            width: 960,
            height: 540,
        }
    }

    #[test]
    fn visibility_is_inclusive_on_both_ends() {
        let clip = text_clip("c", 1000, 2000, "t");
        assert!(!is_active(&clip, 999));
        assert!(is_active(&clip, 1000));
        assert!(is_active(&clip, 1500));
        assert!(is_active(&clip, 2000));
        assert!(!is_active(&clip, 2001));
    }

    #[test]
    fn text_renders_above_images_regardless_of_track_order() {
        let project = layered_project();
        let mut cache = ImageCache::new();
        cache.insert("bg.png", assets::prepared_for_test(800, 600));

        let frame = project_frame(&project, 1000, half_surface(), &cache, &HeuristicMeasurer);
        assert_eq!(frame.elements.len(), 2);
        assert!(matches!(frame.elements[0].content, ElementContent::Image(_)));
        assert!(matches!(frame.elements[1].content, ElementContent::Text(_)));
        assert!(frame.elements[0].z < frame.elements[1].z);
    }

    #[test]
    fn positions_map_percent_to_surface_pixels() {
        let project = layered_project();
        let cache = ImageCache::new();
        let frame = project_frame(&project, 1000, half_surface(), &cache, &HeuristicMeasurer);

        // Image not ready: only the text element survives.
        let text = &frame.elements[0];
        assert!((text.x - 0.5 * 960.0).abs() < 1e-9);
        assert!((text.y - 0.8 * 540.0).abs() < 1e-9);

        let ElementContent::Text(t) = &text.content else {
            panic!("expected text");
        };
        // 36px at half vertical scale.
        assert!((t.font_size - 18.0).abs() < 1e-9);
        let bg = t.background.as_ref().unwrap();
        assert_eq!(bg.color, "rgba(0, 0, 0, 0.502)");
        assert!(bg.width > 2.0 * TEXT_BACKGROUND_PADDING);
    }

    #[test]
    fn image_size_uses_natural_dims_and_surface_ratio() {
        let project = layered_project();
        let mut cache = ImageCache::new();
        cache.insert("bg.png", assets::prepared_for_test(800, 600));

        let frame = project_frame(&project, 1000, half_surface(), &cache, &HeuristicMeasurer);
        let ElementContent::Image(img) = &frame.elements[0].content else {
            panic!("expected image");
        };
        assert!((img.width - 400.0).abs() < 1e-9);
        assert!((img.height - 300.0).abs() < 1e-9);
    }

    #[test]
    fn unready_image_is_skipped_not_fatal() {
        let project = layered_project();
        let cache = ImageCache::new();
        let frame = project_frame(&project, 1000, half_surface(), &cache, &HeuristicMeasurer);
        assert_eq!(frame.elements.len(), 1);
        assert!(matches!(frame.elements[0].content, ElementContent::Text(_)));
    }

    #[test]
    fn placement_rotation_does_not_move_the_anchor() {
        let mut project = layered_project();
        if let Clip::Text(c) = &mut project.tracks[0].clips[0] {
            c.transform = Transform2D {
                scale: 2.0,
                rotation: 90.0,
            };
        }
        let cache = ImageCache::new();
        let frame = project_frame(&project, 1000, half_surface(), &cache, &HeuristicMeasurer);
        let affine = frame.elements[0].placement();
        let origin = affine * kurbo::Point::ZERO;
        assert!((origin.x - frame.elements[0].x).abs() < 1e-9);
        assert!((origin.y - frame.elements[0].y).abs() < 1e-9);
    }

    #[test]
    fn audio_segments_cover_full_timeline_with_mute_flag() {
        let mut project = layered_project();
        let mut audio = Track::new("t-audio", TrackType::Audio, "Audio");
        audio.muted = true;
        audio.clips.push(Clip::Audio(AudioClip {
            id: "c-audio".to_string(),
            start: 4000,
            end: 9000,
            src: "voice.mp3".to_string(),
            volume: 0.4,
            track_id: "t-audio".to_string(),
        }));
        project.tracks.push(audio);

        let cache = ImageCache::new();
        // Time 0 is outside the audio clip's range; it is still emitted.
        let frame = project_frame(&project, 0, half_surface(), &cache, &HeuristicMeasurer);
        assert_eq!(
            frame.audio,
            vec![AudioSegment {
                clip_id: "c-audio".to_string(),
                src: "voice.mp3".to_string(),
                start_ms: 4000,
                end_ms: 9000,
                volume: 0.4,
                muted: true,
            }]
        );
    }

    #[test]
    fn z_accounts_for_track_index_and_active_set_order() {
        let mut project = Project::new("p1", "Demo", AspectRatio::Wide);
        project.duration = 10_000;
        let mut a = Track::new("a", TrackType::Text, "A");
        // First clip inactive at t=1000 so the active-set index restarts.
        a.clips.push(text_clip("a0", 5000, 6000, "a"));
        a.clips.push(text_clip("a1", 0, 2000, "a"));
        a.clips.push(text_clip("a2", 0, 2000, "a"));
        project.tracks.push(a);

        let cache = ImageCache::new();
        let frame = project_frame(&project, 1000, half_surface(), &cache, &HeuristicMeasurer);
        let ids: Vec<&str> = frame.elements.iter().map(|e| e.clip_id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "a2"]);
        assert_eq!(frame.elements[1].z - frame.elements[0].z, 1);
    }
}
