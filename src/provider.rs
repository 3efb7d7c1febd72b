use async_trait::async_trait;

use crate::Segment;

/// Failures reported by a caption source
#[derive(Debug, thiserror::Error)]
pub enum CaptionError {
    #[error("video {video_id} is unavailable: {reason}")]
    VideoUnavailable { video_id: String, reason: String },

    #[error("subtitles are disabled for video {video_id}")]
    TranscriptsDisabled { video_id: String },

    #[error(
        "no transcript found for video {video_id} in any of the requested languages {requested:?} (available: {available:?})"
    )]
    NoTranscriptFound {
        video_id: String,
        requested: Vec<String>,
        available: Vec<String>,
    },

    #[error("request to YouTube failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected response from YouTube: {0}")]
    Parse(String),
}

impl CaptionError {
    /// True when the video simply has no usable caption track, as opposed to a
    /// transport or decoding failure.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            CaptionError::VideoUnavailable { .. }
                | CaptionError::TranscriptsDisabled { .. }
                | CaptionError::NoTranscriptFound { .. }
        )
    }
}

/// Source of caption tracks.
///
/// The provider receives the preference list in priority order and returns the
/// segments of the first language it can satisfy.
#[async_trait]
pub trait CaptionProvider: Send + Sync {
    async fn fetch_captions(
        &self,
        video_id: &str,
        preferred_languages: &[String],
    ) -> Result<Vec<Segment>, CaptionError>;
}
