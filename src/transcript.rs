use log::debug;
use serde::Serialize;

use crate::error::TranscriptError;
use crate::provider::CaptionProvider;
use crate::{Segment, extract_video_id};

/// Transcript returned to API clients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptResult {
    pub video_id: String,
    pub url: String,
    pub language: String,
    pub transcript: String,
    pub segments: Vec<Segment>,
    pub total_segments: usize,
    pub duration: f64,
    pub word_count: usize,
}

impl TranscriptResult {
    pub fn assemble(video_id: String, url: String, language: String, segments: Vec<Segment>) -> Self {
        let transcript = segments.iter().map(|s| s.text.as_str()).collect::<Vec<_>>().join(" ");
        let duration = segments
            .iter()
            .map(|s| s.start + s.duration)
            .reduce(f64::max)
            .map(round2)
            .unwrap_or(0.0);
        let word_count = transcript.split_whitespace().count();

        TranscriptResult {
            video_id,
            url,
            language,
            transcript,
            total_segments: segments.len(),
            segments,
            duration,
            word_count,
        }
    }
}

/// Round to 2 decimals from the exact binary value, ties to even
fn round2(value: f64) -> f64 {
    format!("{value:.2}").parse().unwrap_or(value)
}

/// Languages to ask the caption provider for, most preferred first.
///
/// `"auto"` is passed through as an ordinary language code.
pub fn preferred_languages(requested: &str) -> Vec<String> {
    let mut languages = vec![requested.to_string()];
    if requested != "en" {
        languages.push("en".to_string());
    }
    if requested != "auto" {
        languages.push("auto".to_string());
    }
    languages
}

/// Resolve `url` to a video, fetch its captions and build the response
pub async fn fetch_transcript(
    provider: &dyn CaptionProvider,
    url: &str,
    language: &str,
) -> Result<TranscriptResult, TranscriptError> {
    let video_id = extract_video_id(url).ok_or(TranscriptError::InvalidUrl)?;
    let languages = preferred_languages(language);
    debug!("Fetching captions for {video_id} with languages {languages:?}");

    let segments = provider.fetch_captions(&video_id, &languages).await?;
    debug!("Received {} segments for {video_id}", segments.len());

    Ok(TranscriptResult::assemble(
        video_id,
        url.to_string(),
        language.to_string(),
        segments,
    ))
}
