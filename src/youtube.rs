use std::sync::LazyLock;

use async_trait::async_trait;
use log::debug;
use regex::Regex;
use serde::Deserialize;

use crate::Segment;
use crate::provider::{CaptionError, CaptionProvider};

pub const DEFAULT_BASE_URL: &str = "https://www.youtube.com";

pub const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

static API_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""INNERTUBE_API_KEY"\s*:\s*"([^"]+)""#).expect("api key pattern"));

// Newer watch pages
static API_KEY_FALLBACK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"innertubeApiKey\s*[=:]\s*"([^"]+)""#).expect("api key pattern"));

static FORMATTING_TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag pattern"));

#[derive(Debug, Deserialize)]
struct InnerTubePlayerResponse {
    #[serde(rename = "playabilityStatus")]
    playability_status: Option<PlayabilityStatus>,
    captions: Option<CaptionsData>,
}

#[derive(Debug, Deserialize)]
struct PlayabilityStatus {
    status: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CaptionsData {
    #[serde(rename = "playerCaptionsTracklistRenderer")]
    player_captions_tracklist_renderer: Option<CaptionTracklistRenderer>,
}

#[derive(Debug, Deserialize)]
struct CaptionTracklistRenderer {
    #[serde(rename = "captionTracks")]
    caption_tracks: Option<Vec<CaptionTrack>>,
}

#[derive(Debug, Clone, Deserialize)]
struct CaptionTrack {
    #[serde(rename = "baseUrl")]
    base_url: String,
    #[serde(rename = "languageCode")]
    language_code: String,
    kind: Option<String>,
}

impl CaptionTrack {
    fn is_generated(&self) -> bool {
        self.kind.as_deref() == Some("asr")
    }
}

/// Caption provider backed by YouTube's watch page and InnerTube player API
#[derive(Debug, Clone)]
pub struct YouTubeCaptions {
    client: reqwest::Client,
    base_url: String,
    user_agent: String,
}

impl Default for YouTubeCaptions {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl YouTubeCaptions {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: USER_AGENT.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    async fn get_text(&self, url: &str) -> Result<String, CaptionError> {
        Ok(self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?)
    }

    async fn player(&self, video_id: &str, api_key: &str) -> Result<InnerTubePlayerResponse, CaptionError> {
        let player_url = format!("{}/youtubei/v1/player?key={api_key}&prettyPrint=false", self.base_url);

        let body = serde_json::json!({
            "context": {
                "client": {
                    "hl": "en",
                    "gl": "US",
                    "clientName": "WEB",
                    "clientVersion": "2.20241126.01.00"
                }
            },
            "videoId": video_id
        });

        Ok(self
            .client
            .post(&player_url)
            .header("User-Agent", &self.user_agent)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?)
    }
}

#[async_trait]
impl CaptionProvider for YouTubeCaptions {
    async fn fetch_captions(
        &self,
        video_id: &str,
        preferred_languages: &[String],
    ) -> Result<Vec<Segment>, CaptionError> {
        // Step 1: Fetch the watch page to get the InnerTube API key
        let watch_url = format!("{}/watch?v={video_id}", self.base_url);
        debug!("Fetching watch page: {watch_url}");
        let page_html = self.get_text(&watch_url).await?;
        let api_key = extract_api_key(&page_html)?;
        debug!("Extracted InnerTube API key: {api_key}");

        // Step 2: Call InnerTube player endpoint
        let resp = self.player(video_id, &api_key).await?;
        let tracks = caption_tracks(video_id, resp)?;

        // Step 3: Pick a track and fetch its XML
        let track = select_track(&tracks, preferred_languages).ok_or_else(|| CaptionError::NoTranscriptFound {
            video_id: video_id.to_string(),
            requested: preferred_languages.to_vec(),
            available: tracks.iter().map(|t| t.language_code.clone()).collect(),
        })?;
        debug!(
            "Using caption track: lang={} generated={}",
            track.language_code,
            track.is_generated()
        );

        let caption_xml = self.get_text(&track.base_url.replace("&fmt=srv3", "")).await?;
        parse_caption_xml(&caption_xml)
    }
}

fn caption_tracks(video_id: &str, resp: InnerTubePlayerResponse) -> Result<Vec<CaptionTrack>, CaptionError> {
    let tracks = resp
        .captions
        .and_then(|c| c.player_captions_tracklist_renderer)
        .and_then(|r| r.caption_tracks)
        .unwrap_or_default();

    if tracks.is_empty() {
        if let Some(status) = resp.playability_status
            && status.status.as_deref() != Some("OK")
        {
            return Err(CaptionError::VideoUnavailable {
                video_id: video_id.to_string(),
                reason: status
                    .reason
                    .or(status.status)
                    .unwrap_or_else(|| "unknown reason".to_string()),
            });
        }
        return Err(CaptionError::TranscriptsDisabled {
            video_id: video_id.to_string(),
        });
    }

    Ok(tracks)
}

/// Walk the preference list in order; within a language, a manually created
/// track beats an auto-generated one.
fn select_track<'a>(tracks: &'a [CaptionTrack], preferred_languages: &[String]) -> Option<&'a CaptionTrack> {
    preferred_languages.iter().find_map(|lang| {
        let mut matching = tracks.iter().filter(|t| &t.language_code == lang);
        let first = matching.next()?;
        if !first.is_generated() {
            return Some(first);
        }
        matching.find(|t| !t.is_generated()).or(Some(first))
    })
}

fn extract_api_key(html: &str) -> Result<String, CaptionError> {
    [&*API_KEY, &*API_KEY_FALLBACK]
        .iter()
        .find_map(|re| re.captures(html))
        .map(|caps| caps[1].to_string())
        .ok_or_else(|| CaptionError::Parse("could not extract InnerTube API key from watch page".to_string()))
}

fn parse_caption_xml(xml: &str) -> Result<Vec<Segment>, CaptionError> {
    use quick_xml::Reader;
    use quick_xml::events::Event;

    let mut reader = Reader::from_str(xml);
    let mut segments = Vec::new();
    let mut current_start: Option<f64> = None;
    let mut current_dur: Option<f64> = None;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) if e.name().as_ref() == b"text" => {
                let mut start = None;
                let mut dur = None;
                for attr in e.attributes().flatten() {
                    match attr.key.as_ref() {
                        b"start" => {
                            start = String::from_utf8_lossy(&attr.value).parse::<f64>().ok();
                        }
                        b"dur" => {
                            dur = String::from_utf8_lossy(&attr.value).parse::<f64>().ok();
                        }
                        _ => {}
                    }
                }
                current_start = start;
                // Some cues omit dur
                current_dur = dur.or(Some(0.0));
            }
            Ok(Event::Text(ref e)) => {
                if let (Some(start), Some(dur)) = (current_start.take(), current_dur.take()) {
                    let raw_text = e.unescape().unwrap_or_default().to_string();
                    let decoded = html_escape::decode_html_entities(&raw_text);
                    let text = FORMATTING_TAGS.replace_all(&decoded, "").to_string();
                    if !text.is_empty() {
                        segments.push(Segment {
                            text,
                            start,
                            duration: dur,
                        });
                    }
                }
            }
            Ok(Event::End(ref e)) if e.name().as_ref() == b"text" => {
                current_start = None;
                current_dur = None;
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(CaptionError::Parse(format!("error parsing caption XML: {e}"))),
            _ => {}
        }
    }

    Ok(segments)
}
