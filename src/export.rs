//! One-way interchange exports: project JSON, FCPXML, and an After
//! Effects-style layer JSON. Round-tripping is not a goal; these feed other
//! tools.

use serde_json::{Value, json};

use crate::error::{AutocutError, AutocutResult};
use crate::model::{Clip, Project};

/// Serialize the project for interchange, dropping the transient `track_id`
/// back-reference from every clip.
pub fn to_project_json(project: &Project) -> AutocutResult<String> {
    let mut tracks = Vec::new();
    for track in &project.tracks {
        let mut value =
            serde_json::to_value(track).map_err(|e| AutocutError::serde(e.to_string()))?;
        if let Some(clips) = value.get_mut("clips").and_then(Value::as_array_mut) {
            for clip in clips {
                if let Some(obj) = clip.as_object_mut() {
                    obj.remove("track_id");
                }
            }
        }
        tracks.push(value);
    }

    let doc = json!({
        "version": "1.0",
        "name": project.name,
        "duration": project.duration,
        "fps": project.fps,
        "resolution": project.resolution,
        "aspect_ratio": project.aspect_ratio,
        "tracks": tracks,
        "audio_file": project.audio_file,
    });

    serde_json::to_string_pretty(&doc).map_err(|e| AutocutError::serde(e.to_string()))
}

/// `frames = round(ms/1000*fps)` decomposed into `HH:MM:SS:FF`.
pub fn timecode(ms: u64, fps: u32) -> String {
    let fps = u64::from(fps.max(1));
    let total_frames = (ms as f64 / 1000.0 * fps as f64).round() as u64;
    let hours = total_frames / (3600 * fps);
    let minutes = (total_frames % (3600 * fps)) / (60 * fps);
    let seconds = (total_frames % (60 * fps)) / fps;
    let frames = total_frames % fps;
    format!("{hours:02}:{minutes:02}:{seconds:02}:{frames:02}")
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Final Cut Pro XML: one spine with asset-clips for image/audio plus layered
/// titles for text.
pub fn to_fcpxml(project: &Project) -> String {
    let fps = project.fps.max(1);
    let tc = |ms: u64| timecode(ms, fps);

    let mut spine = String::new();

    for track in &project.tracks {
        for clip in &track.clips {
            match clip {
                Clip::Image(c) => {
                    let dur = tc(c.end - c.start);
                    spine.push_str(&format!(
                        "            <asset-clip name=\"{name}\" start=\"{start}\" duration=\"{dur}\" tcFormat=\"NDF\">\n              <video ref=\"r1\" offset=\"0s\" name=\"{name}\" start=\"0s\" duration=\"{dur}\"/>\n            </asset-clip>\n",
                        name = xml_escape(&c.src),
                        start = tc(c.start),
                    ));
                }
                Clip::Audio(c) => {
                    let dur = tc(c.end - c.start);
                    spine.push_str(&format!(
                        "            <asset-clip name=\"Audio\" start=\"{start}\" duration=\"{dur}\" tcFormat=\"NDF\">\n              <audio ref=\"r2\" offset=\"0s\" name=\"Audio\" start=\"0s\" duration=\"{dur}\"/>\n            </asset-clip>\n",
                        start = tc(c.start),
                    ));
                }
                Clip::Text(_) => {}
            }
        }
    }

    // Text clips come last, as lane-1 titles layered over the spine.
    for track in &project.tracks {
        for clip in &track.clips {
            let Clip::Text(c) = clip else { continue };
            spine.push_str(&format!(
                "            <title name=\"Title\" lane=\"1\" offset=\"{start}\" ref=\"r2\" start=\"{start}\" duration=\"{dur}\">\n              <text>\n                <text-style ref=\"ts1\">{text}</text-style>\n              </text>\n              <text-style-def id=\"ts1\">\n                <text-style font=\"{font}\" fontSize=\"{size}\" fontFace=\"Regular\" fontColor=\"1 1 1 1\"/>\n              </text-style-def>\n            </title>\n",
                start = tc(c.start),
                dur = tc(c.end - c.start),
                text = xml_escape(&c.text),
                font = xml_escape(&c.style.font_family),
                size = c.style.font_size,
            ));
        }
    }

    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!DOCTYPE fcpxml>\n<fcpxml version=\"1.9\">\n  <resources>\n    <format id=\"r1\" name=\"FFVideoFormat{h}p{fps}\" frameDuration=\"1/{fps}s\" width=\"{w}\" height=\"{h}\" colorSpace=\"1-1-1 (Rec. 709)\"/>\n    <effect id=\"r2\" name=\"Basic Title\" uid=\".../Titles.localized/Bumper:Opener.localized/Basic Title.localized/Basic Title.moti\"/>\n  </resources>\n  <library>\n    <event name=\"Autocut Event\">\n      <project name=\"{name}\">\n        <sequence format=\"r1\" tcStart=\"0s\" tcFormat=\"NDF\" audioLayout=\"stereo\" audioRate=\"48k\">\n          <spine>\n{spine}          </spine>\n        </sequence>\n      </project>\n    </event>\n  </library>\n</fcpxml>",
        w = project.resolution.width,
        h = project.resolution.height,
        fps = fps,
        name = xml_escape(&project.name),
        spine = spine,
    )
}

fn frames_ceil(ms: u64, fps: u32) -> u64 {
    (ms as f64 / 1000.0 * f64::from(fps)).ceil() as u64
}

/// After Effects-style layer JSON: a constant-transform layer per clip over a
/// black background solid.
pub fn to_ae_json(project: &Project) -> AutocutResult<String> {
    let w = project.resolution.width;
    let h = project.resolution.height;
    let op = frames_ceil(project.duration, project.fps);

    let mut layers = Vec::new();
    let mut layer_index = 1u32;

    layers.push(json!({
        "ddd": 0,
        "ind": layer_index,
        "ty": 1,
        "nm": "Background",
        "sr": 1,
        "ks": {
            "o": { "a": 0, "k": 100 },
            "r": { "a": 0, "k": 0 },
            "p": { "a": 0, "k": [w as f64 / 2.0, h as f64 / 2.0, 0.0] },
            "a": { "a": 0, "k": [0, 0, 0] },
            "s": { "a": 0, "k": [100, 100, 100] }
        },
        "ao": 0,
        "sw": w,
        "sh": h,
        "sc": "#000000",
        "ip": 0,
        "op": op,
        "st": 0,
        "bm": 0
    }));
    layer_index += 1;

    for track in &project.tracks {
        for clip in &track.clips {
            let Clip::Image(c) = clip else { continue };
            layers.push(json!({
                "ddd": 0,
                "ind": layer_index,
                "ty": 2,
                "nm": c.src,
                "sr": 1,
                "ks": {
                    "o": { "a": 0, "k": 100 },
                    "r": { "a": 0, "k": c.transform.rotation },
                    "p": { "a": 0, "k": [
                        c.position.x * f64::from(w) / 100.0,
                        c.position.y * f64::from(h) / 100.0,
                        0.0
                    ] },
                    "a": { "a": 0, "k": [0, 0, 0] },
                    "s": { "a": 0, "k": [
                        c.transform.scale * 100.0,
                        c.transform.scale * 100.0,
                        100.0
                    ] }
                },
                "ao": 0,
                "w": w,
                "h": h,
                "ip": frames_ceil(c.start, project.fps),
                "op": frames_ceil(c.end, project.fps),
                "st": 0,
                "bm": 0
            }));
            layer_index += 1;
        }
    }

    for track in &project.tracks {
        for clip in &track.clips {
            let Clip::Text(c) = clip else { continue };
            layers.push(json!({
                "ddd": 0,
                "ind": layer_index,
                "ty": 5,
                "nm": "Text",
                "sr": 1,
                "ks": {
                    "o": { "a": 0, "k": 100 },
                    "r": { "a": 0, "k": c.transform.rotation },
                    "p": { "a": 0, "k": [
                        c.position.x * f64::from(w) / 100.0,
                        c.position.y * f64::from(h) / 100.0,
                        0.0
                    ] },
                    "a": { "a": 0, "k": [0, 0, 0] },
                    "s": { "a": 0, "k": [
                        c.transform.scale * 100.0,
                        c.transform.scale * 100.0,
                        100.0
                    ] }
                },
                "ao": 0,
                "t": {
                    "d": {
                        "k": [{
                            "s": {
                                "f": c.style.font_family,
                                "s": c.style.font_size,
                                "t": c.text,
                                "j": 2,
                                "tr": 0,
                                "lh": c.style.font_size * 1.2,
                                "ls": 0,
                                "fc": [1, 1, 1]
                            },
                            "t": 0
                        }]
                    }
                },
                "ip": frames_ceil(c.start, project.fps),
                "op": frames_ceil(c.end, project.fps),
                "st": 0,
                "bm": 0
            }));
            layer_index += 1;
        }
    }

    let doc = json!({
        "v": "5.5.2",
        "fr": project.fps,
        "ip": 0,
        "op": op,
        "w": w,
        "h": h,
        "nm": project.name,
        "ddd": 0,
        "assets": [],
        "layers": layers,
        "markers": []
    });

    serde_json::to_string_pretty(&doc).map_err(|e| AutocutError::serde(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout;
    use crate::model::{AspectRatio, ImportedFile, ImportedPayload, Project};
    use crate::subtitle::Cue;

    fn sample_project() -> Project {
        let files = vec![
            ImportedFile {
                id: "s".to_string(),
                name: "subs.srt".to_string(),
                payload: ImportedPayload::Srt {
                    cues: vec![
                        Cue {
                            index: 1,
                            start_ms: 0,
                            end_ms: 2000,
                            text: "A & B".to_string(),
                        },
                        Cue {
                            index: 2,
                            start_ms: 2000,
                            end_ms: 4000,
                            text: "<second>".to_string(),
                        },
                    ],
                },
            },
            ImportedFile {
                id: "i".to_string(),
                name: "bg.png".to_string(),
                payload: ImportedPayload::Image {
                    url: "/uploads/bg.png".to_string(),
                },
            },
        ];
        let mut project = Project::new("p1", "Demo Video", AspectRatio::Wide);
        layout::auto_layout(&mut project, &files);
        project
    }

    #[test]
    fn timecode_decomposition() {
        assert_eq!(timecode(0, 30), "00:00:00:00");
        assert_eq!(timecode(1500, 30), "00:00:01:15");
        assert_eq!(timecode(3_600_000, 30), "01:00:00:00");
        // 33ms at 30fps rounds to frame 1.
        assert_eq!(timecode(33, 30), "00:00:00:01");
    }

    #[test]
    fn project_json_strips_track_back_references() {
        let s = to_project_json(&sample_project()).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&s).unwrap();
        assert_eq!(doc["version"], "1.0");
        assert_eq!(doc["fps"], 30);
        let clip = &doc["tracks"][0]["clips"][0];
        assert!(clip.get("track_id").is_none());
        assert_eq!(clip["type"], "text");
    }

    #[test]
    fn fcpxml_escapes_and_layers_titles() {
        let xml = to_fcpxml(&sample_project());
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("A &amp; B"));
        assert!(xml.contains("&lt;second&gt;"));
        assert!(xml.contains("<asset-clip name=\"/uploads/bg.png\""));
        // Titles are layered, not inline in the spine order.
        assert!(xml.rfind("<title").unwrap() > xml.rfind("<asset-clip").unwrap());
        assert!(xml.contains("width=\"1920\" height=\"1080\""));
    }

    #[test]
    fn ae_json_counts_layers_and_frames() {
        let project = sample_project();
        let s = to_ae_json(&project).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&s).unwrap();
        // Background + 1 image + 2 text clips.
        assert_eq!(doc["layers"].as_array().unwrap().len(), 4);
        assert_eq!(doc["op"], frames_ceil(project.duration, project.fps));
        assert_eq!(doc["w"], 1920);
        // Text layer position is percent of project resolution.
        let text_layer = &doc["layers"][2];
        assert_eq!(text_layer["ty"], 5);
        assert_eq!(text_layer["ks"]["p"]["k"][0], 960.0);
        assert_eq!(text_layer["ks"]["p"]["k"][1], 864.0);
    }
}
