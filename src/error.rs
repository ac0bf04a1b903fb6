pub type AquamarkResult<T> = Result<T, AquamarkError>;

#[derive(thiserror::Error, Debug)]
pub enum AquamarkError {
    #[error("validation error: {0}")]
    Validation(String),

    /// Zero-area rendering surface; geometry math would divide by zero.
    #[error("degenerate surface: {0}")]
    DegenerateSurface(String),

    /// The platform refused to start playback without a user gesture.
    #[error("playback blocked: interact with the player first")]
    PlaybackBlocked,

    /// Generic decode/playback failure (retried once by reloading the source).
    #[error("playback error: {0}")]
    Playback(String),

    /// Required recording capability is absent; fatal for video export.
    #[error("unsupported environment: {0}")]
    UnsupportedEnvironment(String),

    /// The recorder produced no output or an implausibly small one.
    #[error("encoding failed: {0}")]
    EncodingFailed(String),

    /// Image rasterization failed; no partial output is ever surfaced.
    #[error("export failed: {0}")]
    ExportFailed(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AquamarkError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn degenerate_surface(msg: impl Into<String>) -> Self {
        Self::DegenerateSurface(msg.into())
    }

    pub fn playback(msg: impl Into<String>) -> Self {
        Self::Playback(msg.into())
    }

    pub fn unsupported_environment(msg: impl Into<String>) -> Self {
        Self::UnsupportedEnvironment(msg.into())
    }

    pub fn encoding_failed(msg: impl Into<String>) -> Self {
        Self::EncodingFailed(msg.into())
    }

    pub fn export_failed(msg: impl Into<String>) -> Self {
        Self::ExportFailed(msg.into())
    }
}
