use std::future::Future;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router, middleware};
use log::debug;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use crate::error::{ApiError, TranscriptError, UNKNOWN_URL, Usage};
use crate::provider::CaptionProvider;
use crate::transcript::{self, TranscriptResult};

pub const TRANSCRIPT_PATH: &str = "/api/transcript";

/// Caption language used when a request does not name one
pub const DEFAULT_LANG: &str = "pl";

/// Shared, read-only state handed to every request
#[derive(Clone)]
pub struct AppState {
    provider: Arc<dyn CaptionProvider>,
    default_lang: String,
}

impl AppState {
    pub fn new(provider: Arc<dyn CaptionProvider>, default_lang: impl Into<String>) -> Self {
        Self {
            provider,
            default_lang: default_lang.into(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            TRANSCRIPT_PATH,
            get(get_transcript).post(post_transcript).options(preflight),
        )
        .fallback(fallback)
        .layer(middleware::map_response(allow_any_origin))
        .with_state(state)
}

/// Serve the API on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

fn health() -> Value {
    json!({
        "status": "OK",
        "message": "YouTube Transcript API is running",
        "endpoints": {
            "POST /api/transcript": "Send JSON with 'url' field",
            "GET /api/transcript?url=YOUTUBE_URL": "Direct URL parameter"
        }
    })
}

/// First non-blank value of `key` in a form-encoded query string
fn query_param(query: &str, key: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, v)| k == key && !v.is_empty())
        .map(|(_, v)| v.into_owned())
}

async fn get_transcript(State(state): State<AppState>, RawQuery(query): RawQuery) -> Result<Response, ApiError> {
    let Some(query) = query else {
        debug!("GET {TRANSCRIPT_PATH}: health check");
        return Ok(Json(health()).into_response());
    };

    let url = query_param(&query, "url").ok_or(ApiError::MissingInput(Usage::Query))?;
    let lang = query_param(&query, "lang").unwrap_or_else(|| state.default_lang.clone());
    debug!("GET {TRANSCRIPT_PATH}: url={url} lang={lang}");

    let result = transcript::fetch_transcript(state.provider.as_ref(), &url, &lang)
        .await
        .map_err(|e| ApiError::failed(url.clone(), e))?;
    Ok(Json(result).into_response())
}

async fn post_transcript(State(state): State<AppState>, body: Bytes) -> Result<Json<TranscriptResult>, ApiError> {
    let text = std::str::from_utf8(&body)
        .map_err(|e| ApiError::failed(UNKNOWN_URL, TranscriptError::UnexpectedFailure(e.to_string())))?;
    let data: Value = serde_json::from_str(text).map_err(ApiError::MalformedRequestBody)?;
    let (url, language) = body_fields(&data, &state.default_lang)?;
    debug!("POST {TRANSCRIPT_PATH}: url={url} language={language}");

    let result = transcript::fetch_transcript(state.provider.as_ref(), &url, &language)
        .await
        .map_err(|e| ApiError::failed(url.clone(), e))?;
    Ok(Json(result))
}

/// Pull `url` and `language` out of a POST body
fn body_fields(data: &Value, default_lang: &str) -> Result<(String, String), ApiError> {
    let url = match data.get("url") {
        None => return Err(ApiError::MissingInput(Usage::Body)),
        Some(Value::String(url)) => url.clone(),
        Some(other) => {
            return Err(ApiError::failed(
                other.to_string(),
                TranscriptError::UnexpectedFailure("'url' must be a string".to_string()),
            ));
        }
    };

    let language = match data.get("language") {
        None | Some(Value::Null) => default_lang.to_string(),
        Some(Value::String(lang)) => lang.clone(),
        Some(_) => {
            return Err(ApiError::failed(
                url,
                TranscriptError::UnexpectedFailure("'language' must be a string".to_string()),
            ));
        }
    };

    Ok((url, language))
}

async fn preflight() -> impl IntoResponse {
    (
        StatusCode::OK,
        [
            (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
        ],
    )
}

async fn fallback(method: Method, uri: Uri) -> Response {
    if method == Method::OPTIONS {
        return preflight().await.into_response();
    }
    ApiError::NotFound(uri.path().to_string()).into_response()
}

async fn allow_any_origin(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::fake::{FakeProvider, segment};

    async fn spawn_with_lang(provider: FakeProvider, default_lang: &str) -> (String, Arc<FakeProvider>) {
        let provider = Arc::new(provider);
        let state = AppState::new(provider.clone(), default_lang);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, router(state)).await.unwrap() });
        (format!("http://{addr}"), provider)
    }

    async fn spawn(provider: FakeProvider) -> (String, Arc<FakeProvider>) {
        spawn_with_lang(provider, DEFAULT_LANG).await
    }

    fn assert_cors(resp: &reqwest::Response) {
        assert_eq!(resp.headers()["access-control-allow-origin"], "*");
    }

    #[test]
    fn test_query_param() {
        let query = "url=https%3A%2F%2Fyoutu.be%2Fabc&lang=&lang=de+x";
        assert_eq!(query_param(query, "url").as_deref(), Some("https://youtu.be/abc"));
        assert_eq!(query_param(query, "lang").as_deref(), Some("de x"));
        assert_eq!(query_param(query, "missing"), None);
    }

    #[test]
    fn test_body_fields_defaults_language() {
        let data = json!({"url": "https://youtu.be/abc"});
        assert_eq!(
            body_fields(&data, "pl").unwrap(),
            ("https://youtu.be/abc".to_string(), "pl".to_string())
        );
    }

    #[test]
    fn test_body_fields_null_language_uses_default() {
        let data = json!({"url": "https://youtu.be/abc", "language": null});
        assert_eq!(body_fields(&data, "pl").unwrap().1, "pl");
    }

    #[test]
    fn test_body_fields_non_string_language() {
        let data = json!({"url": "https://youtu.be/abc", "language": 7});
        match body_fields(&data, "pl") {
            Err(ApiError::Transcript { url, .. }) => assert_eq!(url, "https://youtu.be/abc"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_body_fields_non_object() {
        assert!(matches!(
            body_fields(&json!(["url"]), "pl"),
            Err(ApiError::MissingInput(Usage::Body))
        ));
    }

    #[tokio::test]
    async fn test_health_check() {
        let (base, _) = spawn(FakeProvider::default()).await;
        let resp = reqwest::get(format!("{base}{TRANSCRIPT_PATH}")).await.unwrap();

        assert_eq!(resp.status(), 200);
        assert_cors(&resp);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "OK");
        assert!(body["endpoints"].get("POST /api/transcript").is_some());
    }

    #[tokio::test]
    async fn test_get_success() {
        let provider = FakeProvider::default().with_track("pl", vec![segment("hello", 0.0, 1.5)]);
        let (base, provider) = spawn(provider).await;
        let url = "https://youtube.com/watch?v=abc123&t=5s";

        let resp = reqwest::Client::new()
            .get(format!("{base}{TRANSCRIPT_PATH}"))
            .query(&[("url", url), ("lang", "pl")])
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 200);
        assert_cors(&resp);
        assert_eq!(resp.headers()["content-type"], "application/json");
        let body: Value = resp.json().await.unwrap();
        assert_eq!(
            body,
            json!({
                "video_id": "abc123",
                "url": url,
                "language": "pl",
                "transcript": "hello",
                "segments": [{"text": "hello", "start": 0.0, "duration": 1.5}],
                "total_segments": 1,
                "duration": 1.5,
                "word_count": 1
            })
        );
        let calls = provider.calls.lock().unwrap();
        assert_eq!(calls[0].1, vec!["pl", "en", "auto"]);
    }

    #[tokio::test]
    async fn test_get_missing_url() {
        let (base, _) = spawn(FakeProvider::default()).await;
        for query in ["?lang=pl", "?url=&lang=pl"] {
            let resp = reqwest::get(format!("{base}{TRANSCRIPT_PATH}{query}")).await.unwrap();
            assert_eq!(resp.status(), 400);
            assert_cors(&resp);
            let body: Value = resp.json().await.unwrap();
            assert_eq!(body["error"], "missing 'url' parameter");
            assert!(body["example"].is_string());
        }
    }

    #[tokio::test]
    async fn test_get_invalid_url_is_500() {
        let (base, provider) = spawn(FakeProvider::default()).await;
        let resp = reqwest::Client::new()
            .get(format!("{base}{TRANSCRIPT_PATH}"))
            .query(&[("url", "https://vimeo.com/42")])
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 500);
        assert_cors(&resp);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "Error: invalid YouTube URL");
        assert_eq!(body["url"], "https://vimeo.com/42");
        assert!(provider.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_get_transcript_unavailable() {
        let (base, _) = spawn(FakeProvider::default()).await;
        let resp = reqwest::Client::new()
            .get(format!("{base}{TRANSCRIPT_PATH}"))
            .query(&[("url", "https://youtu.be/abc")])
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 500);
        let body: Value = resp.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().starts_with("Error: no transcript found"));
        assert_eq!(body["url"], "https://youtu.be/abc");
    }

    #[tokio::test]
    async fn test_get_uses_configured_default_lang() {
        let provider = FakeProvider::default().with_track("en", vec![segment("hi", 0.0, 1.0)]);
        let (base, provider) = spawn_with_lang(provider, "de").await;
        let resp = reqwest::Client::new()
            .get(format!("{base}{TRANSCRIPT_PATH}"))
            .query(&[("url", "https://youtu.be/abc")])
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["language"], "de");
        assert_eq!(provider.calls.lock().unwrap()[0].1, vec!["de", "en", "auto"]);
    }

    #[tokio::test]
    async fn test_post_success_keeps_non_ascii() {
        let provider = FakeProvider::default().with_track("pl", vec![segment("zażółć gęślą jaźń", 0.0, 2.0)]);
        let (base, provider) = spawn(provider).await;

        let resp = reqwest::Client::new()
            .post(format!("{base}{TRANSCRIPT_PATH}"))
            .json(&json!({"url": "https://youtu.be/xyz"}))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 200);
        assert_cors(&resp);
        let raw = resp.text().await.unwrap();
        assert!(raw.contains("zażółć gęślą jaźń"));
        let body: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(body["video_id"], "xyz");
        assert_eq!(body["language"], "pl");
        assert_eq!(body["word_count"], 3);
        assert_eq!(provider.calls.lock().unwrap()[0].1, vec!["pl", "en", "auto"]);
    }

    #[tokio::test]
    async fn test_post_language_field() {
        let provider = FakeProvider::default().with_track("auto", vec![segment("x", 0.0, 1.0)]);
        let (base, provider) = spawn(provider).await;

        let resp = reqwest::Client::new()
            .post(format!("{base}{TRANSCRIPT_PATH}"))
            .body(r#"{"url": "https://www.youtube.com/embed/e1", "language": "auto"}"#)
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 200);
        assert_eq!(provider.calls.lock().unwrap()[0].1, vec!["auto", "en"]);
    }

    #[tokio::test]
    async fn test_post_missing_url() {
        let (base, _) = spawn(FakeProvider::default()).await;
        let resp = reqwest::Client::new()
            .post(format!("{base}{TRANSCRIPT_PATH}"))
            .body("{}")
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 400);
        assert_cors(&resp);
        let body: Value = resp.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("'url'"));
        assert_eq!(body["example"]["url"], "https://youtube.com/watch?v=VIDEO_ID");
    }

    #[tokio::test]
    async fn test_post_malformed_json() {
        let (base, _) = spawn(FakeProvider::default()).await;
        let resp = reqwest::Client::new()
            .post(format!("{base}{TRANSCRIPT_PATH}"))
            .body("not json")
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().starts_with("invalid JSON body"));
        assert!(body.get("url").is_none());
    }

    #[tokio::test]
    async fn test_post_non_string_url() {
        let (base, _) = spawn(FakeProvider::default()).await;
        let resp = reqwest::Client::new()
            .post(format!("{base}{TRANSCRIPT_PATH}"))
            .body(r#"{"url": 123}"#)
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 500);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["url"], "123");
    }

    #[tokio::test]
    async fn test_post_invalid_utf8() {
        let (base, _) = spawn(FakeProvider::default()).await;
        let resp = reqwest::Client::new()
            .post(format!("{base}{TRANSCRIPT_PATH}"))
            .body(vec![0xff, 0xfe, 0x7b])
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 500);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["url"], UNKNOWN_URL);
    }

    #[tokio::test]
    async fn test_options_preflight() {
        let (base, _) = spawn(FakeProvider::default()).await;
        for path in [TRANSCRIPT_PATH, "/anything"] {
            let resp = reqwest::Client::new()
                .request(reqwest::Method::OPTIONS, format!("{base}{path}"))
                .send()
                .await
                .unwrap();

            assert_eq!(resp.status(), 200);
            assert_cors(&resp);
            assert_eq!(resp.headers()["access-control-allow-methods"], "GET, POST, OPTIONS");
            assert_eq!(resp.headers()["access-control-allow-headers"], "Content-Type");
            assert!(resp.text().await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_post_null_language() {
        let provider = FakeProvider::default().with_track("pl", vec![segment("hej", 0.0, 1.0)]);
        let (base, provider) = spawn(provider).await;
        let resp = reqwest::Client::new()
            .post(format!("{base}{TRANSCRIPT_PATH}"))
            .body(r#"{"url": "https://youtu.be/abc", "language": null}"#)
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["language"], "pl");
        assert_eq!(provider.calls.lock().unwrap()[0].1, vec!["pl", "en", "auto"]);
    }

    #[tokio::test]
    async fn test_unsupported_method() {
        let (base, _) = spawn(FakeProvider::default()).await;
        let resp = reqwest::Client::new()
            .put(format!("{base}{TRANSCRIPT_PATH}"))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 405);
        assert_cors(&resp);
    }

    #[tokio::test]
    async fn test_unknown_path() {
        let (base, _) = spawn(FakeProvider::default()).await;
        let resp = reqwest::get(format!("{base}/nope")).await.unwrap();
        assert_eq!(resp.status(), 404);
        assert_cors(&resp);
    }
}
