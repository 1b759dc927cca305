pub type AutocutResult<T> = Result<T, AutocutError>;

/// Pipeline stage a render failure is attributed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RenderStage {
    Bundling,
    CompositionSelection,
    FrameRendering,
    Encoding,
}

impl std::fmt::Display for RenderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RenderStage::Bundling => "bundling",
            RenderStage::CompositionSelection => "composition selection",
            RenderStage::FrameRendering => "frame rendering",
            RenderStage::Encoding => "encoding",
        };
        f.write_str(name)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum AutocutError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("render failed during {stage}: {message}")]
    Stage { stage: RenderStage, message: String },

    #[error("render cancelled during {0}")]
    Cancelled(RenderStage),

    #[error("serialization error: {0}")]
    Serde(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AutocutError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    pub fn stage(stage: RenderStage, msg: impl Into<String>) -> Self {
        Self::Stage {
            stage,
            message: msg.into(),
        }
    }

    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// The stage this error is attributed to, when it carries one.
    /// Cancellations count; they name the stage that noticed the cancel.
    pub fn render_stage(&self) -> Option<RenderStage> {
        match self {
            AutocutError::Stage { stage, .. } | AutocutError::Cancelled(stage) => Some(*stage),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            AutocutError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(
            AutocutError::invalid_request("x")
                .to_string()
                .contains("invalid request:")
        );
        assert!(
            AutocutError::serde("x")
                .to_string()
                .contains("serialization error:")
        );
    }

    #[test]
    fn stage_errors_name_the_stage() {
        let err = AutocutError::stage(RenderStage::FrameRendering, "boom");
        assert_eq!(
            err.to_string(),
            "render failed during frame rendering: boom"
        );
        assert_eq!(err.render_stage(), Some(RenderStage::FrameRendering));

        let err = AutocutError::Cancelled(RenderStage::Encoding);
        assert_eq!(err.to_string(), "render cancelled during encoding");
        assert_eq!(err.render_stage(), Some(RenderStage::Encoding));
    }

    #[test]
    fn non_stage_errors_have_no_stage() {
        assert_eq!(AutocutError::validation("x").render_stage(), None);
        assert_eq!(AutocutError::parse("x").render_stage(), None);
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = AutocutError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
