//! External interface contracts: the render request/response payloads, the
//! blob-source rewrite that must precede rendering, and download-path
//! validation.
//!
//! The HTTP layer itself lives elsewhere; these are the synchronous checks it
//! runs before any pipeline work begins.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{AutocutError, AutocutResult};
use crate::model::{Clip, ExportOptions, Project};

/// Body of a render request. Both fields are required; deserialization keeps
/// them optional so a missing field is rejected with a 4xx-style error
/// instead of a serde failure.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct RenderRequest {
    #[serde(default)]
    pub project: Option<Project>,
    #[serde(default)]
    pub options: Option<ExportOptions>,
}

impl RenderRequest {
    pub fn validate(self) -> AutocutResult<(Project, ExportOptions)> {
        let Some(project) = self.project else {
            return Err(AutocutError::invalid_request("project missing"));
        };
        let Some(options) = self.options else {
            return Err(AutocutError::invalid_request("options missing"));
        };
        project.validate()?;
        Ok((project, options))
    }
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct RenderSuccess {
    pub download_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoder_used: Option<String>,
}

#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct RenderFailure {
    pub error: String,
    pub details: String,
}

impl RenderFailure {
    /// Failure payload naming the broken stage when there is one.
    pub fn from_error(err: &AutocutError) -> Self {
        let error = match err.render_stage() {
            Some(stage) => format!("render failed during {stage}"),
            None => "render failed".to_string(),
        };
        Self {
            error,
            details: err.to_string(),
        }
    }
}

/// Rewrite client-local `blob:` sources to server-resolvable paths using the
/// multipart attachments that accompanied the request.
///
/// Every blob reference must have an attachment; a dangling one is rejected
/// up front rather than surfacing later as a renderer failure.
pub fn rewrite_blob_sources(
    project: &mut Project,
    attachments: &BTreeMap<String, PathBuf>,
) -> AutocutResult<()> {
    let resolve = |src: &str| -> AutocutResult<Option<String>> {
        if !src.starts_with("blob:") {
            return Ok(None);
        }
        match attachments.get(src) {
            Some(path) => Ok(Some(path.display().to_string())),
            None => Err(AutocutError::invalid_request(format!(
                "blob source '{src}' has no accompanying attachment"
            ))),
        }
    };

    for track in &mut project.tracks {
        for clip in &mut track.clips {
            match clip {
                Clip::Image(c) => {
                    if let Some(path) = resolve(&c.src)? {
                        c.src = path;
                    }
                }
                Clip::Audio(c) => {
                    if let Some(path) = resolve(&c.src)? {
                        c.src = path;
                    }
                }
                Clip::Text(_) => {}
            }
        }
    }

    if let Some(audio) = &project.audio_file
        && let Some(path) = resolve(audio)?
    {
        project.audio_file = Some(path);
    }

    Ok(())
}

/// A download request must be a bare filename: no path separators, no
/// parent-directory references. Rejected before any filesystem access.
pub fn validate_download_filename(filename: &str) -> AutocutResult<()> {
    if filename.is_empty() {
        return Err(AutocutError::invalid_request("filename is empty"));
    }
    if filename.contains('/') || filename.contains('\\') {
        return Err(AutocutError::invalid_request(
            "filename must not contain path separators",
        ));
    }
    if filename.contains("..") {
        return Err(AutocutError::invalid_request(
            "filename must not reference parent directories",
        ));
    }
    Ok(())
}

/// Content type derived from the file extension; unknown extensions fall back
/// to a generic byte stream.
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("json") => "application/json",
        Some("fcpxml") => "application/xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}
