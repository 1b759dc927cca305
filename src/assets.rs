//! Asset loading and readiness.
//!
//! Image sources are cached by URL/path. The live preview path asks for
//! whatever is already loaded and skips the rest (a new image may miss its
//! first frame); the server-side frame renderer calls [`ImageCache::ensure_ready`]
//! so a frame is never sampled before its images are decoded.

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context as _;
use tracing::warn;

use crate::error::{AutocutError, AutocutResult};

/// A decoded image ready for compositing.
#[derive(Clone, Debug)]
pub struct PreparedImage {
    pub width: u32,
    pub height: u32,
    /// RGBA8, row-major, tightly packed.
    pub rgba8: std::sync::Arc<Vec<u8>>,
}

#[derive(Debug, Default)]
pub struct ImageCache {
    entries: HashMap<String, PreparedImage>,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Non-blocking lookup for the preview path. A miss means the image is
    /// simply not drawn this frame.
    pub fn get_if_ready(&self, src: &str) -> Option<&PreparedImage> {
        self.entries.get(src)
    }

    /// Blocking lookup for the deterministic render path: decode on miss,
    /// memoize, and only then return.
    pub fn ensure_ready(&mut self, src: &str) -> AutocutResult<&PreparedImage> {
        if !self.entries.contains_key(src) {
            let prepared = load_image(Path::new(src))?;
            self.entries.insert(src.to_string(), prepared);
        }
        Ok(&self.entries[src])
    }

    /// Seed an entry directly; used by tests and by callers that decode
    /// through another channel.
    pub fn insert(&mut self, src: impl Into<String>, image: PreparedImage) {
        self.entries.insert(src.into(), image);
    }
}

fn load_image(path: &Path) -> AutocutResult<PreparedImage> {
    let img = image::open(path)
        .with_context(|| format!("failed to decode image '{}'", path.display()))?
        .to_rgba8();
    let (width, height) = img.dimensions();
    Ok(PreparedImage {
        width,
        height,
        rgba8: std::sync::Arc::new(img.into_raw()),
    })
}

/// Probe a media file's duration in milliseconds with `ffprobe`.
///
/// Returns `None` (with a logged warning) when ffprobe is missing, fails, or
/// reports no duration; auto-layout then falls back to its fixed window.
pub fn probe_media_duration_ms(path: &Path) -> Option<u64> {
    #[derive(serde::Deserialize)]
    struct ProbeFormat {
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        format: Option<ProbeFormat>,
    }

    let out = std::process::Command::new("ffprobe")
        .args(["-v", "error", "-print_format", "json", "-show_format"])
        .arg(path)
        .output();

    let out = match out {
        Ok(out) if out.status.success() => out,
        Ok(out) => {
            warn!(
                path = %path.display(),
                status = %out.status,
                "ffprobe failed; duration unavailable"
            );
            return None;
        }
        Err(err) => {
            warn!(path = %path.display(), error = %err, "could not run ffprobe");
            return None;
        }
    };

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout).ok()?;
    let secs: f64 = parsed.format?.duration?.parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Some((secs * 1000.0).round() as u64)
}

/// Whether a source reference can be resolved on the server's filesystem.
///
/// Client-local `blob:` URLs never can; they must be rewritten to uploaded
/// paths before rendering (see `api::rewrite_blob_sources`).
pub fn is_server_resolvable(src: &str) -> bool {
    !src.starts_with("blob:") && Path::new(src).exists()
}

#[allow(unused)]
pub(crate) fn prepared_for_test(width: u32, height: u32) -> PreparedImage {
    PreparedImage {
        width,
        height,
        rgba8: std::sync::Arc::new(vec![0u8; (width * height * 4) as usize]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_miss_is_none_until_inserted() {
        let mut cache = ImageCache::new();
        assert!(cache.get_if_ready("x.png").is_none());
        cache.insert("x.png", prepared_for_test(4, 2));
        let img = cache.get_if_ready("x.png").unwrap();
        assert_eq!((img.width, img.height), (4, 2));
    }

    #[test]
    fn ensure_ready_errors_on_missing_file() {
        let mut cache = ImageCache::new();
        let err = cache.ensure_ready("/definitely/not/here.png").unwrap_err();
        assert!(matches!(err, AutocutError::Other(_)));
    }

    #[test]
    fn blob_urls_are_never_server_resolvable() {
        assert!(!is_server_resolvable("blob:http://localhost/abc"));
        assert!(!is_server_resolvable("/no/such/file.mp3"));
    }
}
