use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{error, info};

pub const IMAGE_MODEL: &str = "gemini-2.5-flash-image";
pub const CHAT_MODEL: &str = "gemini-2.5-flash";
pub const VIDEO_MODEL: &str = "veo-3.1-fast-generate-preview";

pub const CHAT_SYSTEM_INSTRUCTION: &str = "You are a helpful AI assistant for small business \
    owners in Africa. Your name is Jenga, which means \"build\" in Swahili. You provide concise, \
    actionable advice on marketing, sales, and branding.";

pub const VIDEO_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const VIDEO_WAIT_CEILING: Duration = Duration::from_secs(5 * 60);
pub const VIDEO_TIMEOUT_MESSAGE: &str =
    "Video generation timed out after 5 minutes. Please try a simpler prompt or try again later.";

/// Error signature the video service returns for a revoked or unknown key.
pub const KEY_NOT_FOUND_SIGNATURE: &str = "Requested entity was not found.";

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("Video generation timed out after 5 minutes. Please try a simpler prompt or try again later.")]
    Timeout,
    #[error("Other: {0}")]
    Other(String),
}

impl GeminiError {
    pub fn is_key_not_found(&self) -> bool {
        match self {
            GeminiError::Http(msg) | GeminiError::Other(msg) => msg.contains(KEY_NOT_FOUND_SIGNATURE),
            GeminiError::Timeout => false,
        }
    }
}

/// One inline image part of a generation request.
#[derive(Debug, Clone)]
pub struct InlineImage {
    pub data: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VideoPoll {
    Running,
    Complete { uri: Option<String> },
}

pub type ChatStream = Pin<Box<dyn Stream<Item = Result<String, GeminiError>> + Send>>;

/// The generation service boundary: image edit/composition, long-running
/// video synthesis, and streamed chat.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Edits or composites one or two inline images per the instruction text,
    /// returning the resulting image as raw base64.
    async fn edit_image(&self, images: &[InlineImage], prompt: &str) -> Result<String, GeminiError>;

    /// Starts a video generation, returning the operation name to poll.
    async fn start_video(&self, prompt: &str, seed: Option<&InlineImage>) -> Result<String, GeminiError>;

    async fn poll_video(&self, operation: &str) -> Result<VideoPoll, GeminiError>;

    async fn fetch_video(&self, uri: &str) -> Result<Bytes, GeminiError>;

    /// Opens a streamed chat turn carrying the message text; increments
    /// arrive as the stream's items.
    async fn stream_chat(&self, message: &str) -> Result<ChatStream, GeminiError>;
}

/// Issues a video request and long-polls on a fixed delay until a terminal
/// state or the wall-clock ceiling, then downloads the result.
pub async fn generate_video(
    backend: &dyn MediaBackend,
    prompt: &str,
    seed: Option<&InlineImage>,
) -> Result<Bytes, GeminiError> {
    let operation = backend.start_video(prompt, seed).await?;
    info!("🎬 Video operation started: {}", operation);
    let started = tokio::time::Instant::now();
    loop {
        match backend.poll_video(&operation).await? {
            VideoPoll::Complete { uri: Some(uri) } => {
                info!("✅ Video operation complete");
                return backend.fetch_video(&uri).await;
            }
            VideoPoll::Complete { uri: None } => {
                return Err(GeminiError::Other("Video generation failed or no video URI returned.".into()));
            }
            VideoPoll::Running => {}
        }
        if started.elapsed() >= VIDEO_WAIT_CEILING {
            return Err(GeminiError::Timeout);
        }
        tokio::time::sleep(VIDEO_POLL_INTERVAL).await;
    }
}

// Truncated preview of a base64 payload for logging.
fn preview(data: &str) -> String {
    if data.len() > 50 {
        format!("{}...[{} chars total]", &data[..50], data.len())
    } else {
        data.to_string()
    }
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    video_api_key: Option<String>,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String, video_api_key: Option<String>) -> Self {
        let base_url = std::env::var("GEMINI_API_BASE")
            .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".to_string());
        Self {
            client: Client::new(),
            api_key,
            video_api_key,
            base_url,
        }
    }

    fn demo_mode(&self) -> bool {
        self.api_key == "DEMO_KEY"
    }

    /// The video path bills against its own key when one was provided.
    fn video_key(&self) -> &str {
        self.video_api_key.as_deref().unwrap_or(&self.api_key)
    }

    pub fn has_video_key(&self) -> bool {
        self.video_api_key.is_some() || !self.demo_mode()
    }

    fn generate_placeholder_image(&self, prompt: &str) -> String {
        let colors = ["#F59E0B", "#3B82F6", "#10B981", "#8B5CF6"];
        let color = colors[prompt.len() % colors.len()];
        let title = if prompt.contains("advertising campaign") {
            "📣 Ad Campaign"
        } else if prompt.contains("e-commerce photographer") {
            "👗 Photo Shoot"
        } else {
            "📦 Generated Image"
        };

        let svg = format!(r#"<svg width="400" height="400" xmlns="http://www.w3.org/2000/svg">
            <defs>
                <linearGradient id="grad" x1="0%" y1="0%" x2="100%" y2="100%">
                    <stop offset="0%" style="stop-color:{};stop-opacity:1" />
                    <stop offset="100%" style="stop-color:{};stop-opacity:0.6" />
                </linearGradient>
            </defs>
            <rect width="400" height="400" fill="url(#grad)" />
            <text x="200" y="195" font-family="Arial, sans-serif" font-size="24" font-weight="bold"
                  text-anchor="middle" fill="white">
                {}
            </text>
            <text x="200" y="235" font-family="Arial, sans-serif" font-size="12"
                  text-anchor="middle" fill="white" opacity="0.8">
                Jenga Biashara Demo Mode
            </text>
        </svg>"#, color, color, title);

        base64::engine::general_purpose::STANDARD.encode(svg.as_bytes())
    }
}

#[async_trait]
impl MediaBackend for GeminiClient {
    async fn edit_image(&self, images: &[InlineImage], prompt: &str) -> Result<String, GeminiError> {
        if self.demo_mode() {
            info!("Using demo mode - no real images generated");
            return Ok(self.generate_placeholder_image(prompt));
        }

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, IMAGE_MODEL, self.api_key
        );
        info!("🔗 Making request to: {}", url.replace(&self.api_key, "***"));

        let mut parts: Vec<serde_json::Value> = images
            .iter()
            .map(|img| json!({ "inlineData": { "data": img.data, "mimeType": img.mime_type } }))
            .collect();
        parts.push(json!({ "text": prompt }));

        let request_body = json!({
            "contents": [{ "parts": parts }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
                "candidateCount": 1
            }
        });

        let response = self
            .client
            .post(&url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| GeminiError::Http(e.to_string()))?;

        let status = response.status();
        info!("📥 Response status: {}", status);

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!("❌ API Error response: {}", error_body);
            return Err(GeminiError::Http(format!("status={} body={}", status, error_body)));
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| GeminiError::Other(e.to_string()))?;
        let parsed: GeminiResponse = serde_json::from_str(&response_text)
            .map_err(|e| GeminiError::Other(format!("parse error: {}", e)))?;

        match extract_first_image_b64(&parsed) {
            Some(image_data) => {
                info!("🖼️ Extracted image from API response: {}", preview(&image_data));
                Ok(image_data)
            }
            None => Err(GeminiError::Other("No image data received from API.".into())),
        }
    }

    async fn start_video(&self, prompt: &str, seed: Option<&InlineImage>) -> Result<String, GeminiError> {
        if self.demo_mode() {
            return Err(GeminiError::Other("Video generation requires a real API key.".into()));
        }

        let url = format!(
            "{}/models/{}:predictLongRunning?key={}",
            self.base_url, VIDEO_MODEL, self.video_key()
        );

        let mut instance = json!({ "prompt": prompt });
        if let Some(seed) = seed {
            instance["image"] = json!({ "bytesBase64Encoded": seed.data, "mimeType": seed.mime_type });
        }
        let request_body = json!({
            "instances": [instance],
            "parameters": {
                "sampleCount": 1,
                "resolution": "720p",
                "aspectRatio": "16:9"
            }
        });

        let response = self
            .client
            .post(&url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| GeminiError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!("❌ Video start failed: {}", error_body);
            return Err(GeminiError::Http(format!("status={} body={}", status, error_body)));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GeminiError::Other(e.to_string()))?;
        value
            .get("name")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| GeminiError::Other("no operation name in response".into()))
    }

    async fn poll_video(&self, operation: &str) -> Result<VideoPoll, GeminiError> {
        let url = format!("{}/{}?key={}", self.base_url, operation, self.video_key());
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| GeminiError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(GeminiError::Http(format!("status={} body={}", status, error_body)));
        }

        let value: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GeminiError::Other(e.to_string()))?;

        if value.get("done").and_then(serde_json::Value::as_bool).unwrap_or(false) {
            let uri = value
                .pointer("/response/generateVideoResponse/generatedSamples/0/video/uri")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string);
            Ok(VideoPoll::Complete { uri })
        } else {
            Ok(VideoPoll::Running)
        }
    }

    async fn fetch_video(&self, uri: &str) -> Result<Bytes, GeminiError> {
        let url = format!("{}&key={}", uri, self.video_key());
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| GeminiError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GeminiError::Http(format!("status={}", status)));
        }
        response.bytes().await.map_err(|e| GeminiError::Http(e.to_string()))
    }

    async fn stream_chat(&self, message: &str) -> Result<ChatStream, GeminiError> {
        if self.demo_mode() {
            info!("Using demo mode - streaming canned advice");
            let increments = [
                "Demo advice: focus on one product, ",
                "photograph it in natural light, ",
                "and tell its story in your captions.",
            ];
            let items: Vec<Result<String, GeminiError>> =
                increments.iter().map(|s| Ok(s.to_string())).collect();
            return Ok(Box::pin(futures_util::stream::iter(items)));
        }

        let url = format!(
            "{}/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url, CHAT_MODEL, self.api_key
        );
        let request_body = json!({
            "systemInstruction": { "parts": [{ "text": CHAT_SYSTEM_INSTRUCTION }] },
            "contents": [{ "role": "user", "parts": [{ "text": message }] }]
        });

        let response = self
            .client
            .post(&url)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| GeminiError::Http(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!("❌ Chat request failed: {}", error_body);
            return Err(GeminiError::Http(format!("status={} body={}", status, error_body)));
        }

        // The SSE body arrives in arbitrary chunk boundaries; buffer until a
        // full `data:` line is available and concatenate its text parts.
        let mut buf = String::new();
        let stream = response
            .bytes_stream()
            .map(move |chunk| match chunk {
                Ok(bytes) => {
                    buf.push_str(&String::from_utf8_lossy(&bytes));
                    let mut increment = String::new();
                    while let Some(pos) = buf.find('\n') {
                        let line = buf[..pos].trim().to_string();
                        buf.drain(..=pos);
                        let Some(data) = line.strip_prefix("data:") else { continue };
                        let data = data.trim();
                        if data.is_empty() || data == "[DONE]" {
                            continue;
                        }
                        if let Ok(parsed) = serde_json::from_str::<GeminiResponse>(data) {
                            increment.push_str(&extract_text(&parsed));
                        }
                    }
                    Ok(increment)
                }
                Err(e) => Err(GeminiError::Http(e.to_string())),
            })
            .filter(|item| {
                let keep = !matches!(item, Ok(text) if text.is_empty());
                futures_util::future::ready(keep)
            });

        Ok(Box::pin(stream))
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Debug, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text {
        text: String,
    },
    Other(serde_json::Value),
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
}

fn extract_first_image_b64(resp: &GeminiResponse) -> Option<String> {
    for candidate in &resp.candidates {
        for part in &candidate.content.parts {
            if let Part::Inline { inline_data } = part {
                info!("🎯 Found image data with mime type: {}", inline_data.mime_type);
                return Some(inline_data.data.clone());
            }
        }
    }
    None
}

fn extract_text(resp: &GeminiResponse) -> String {
    let mut out = String::new();
    for candidate in &resp.candidates {
        for part in &candidate.content.parts {
            if let Part::Text { text } = part {
                out.push_str(text);
            }
        }
    }
    out
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[tokio::test(start_paused = true)]
    async fn video_poll_gives_up_at_the_wall_clock_ceiling() {
        let backend = testing::MockBackend::default();
        let err = generate_video(&backend, "the model spins", None).await.unwrap_err();

        assert!(matches!(err, GeminiError::Timeout));
        assert_eq!(err.to_string(), VIDEO_TIMEOUT_MESSAGE);
        // Five minutes at a ten second interval: roughly thirty polls.
        let polls = backend.poll_calls.load(Ordering::SeqCst);
        assert!((30..=32).contains(&polls), "polled {polls} times");
    }

    #[tokio::test(start_paused = true)]
    async fn video_poll_downloads_once_the_operation_completes() {
        let backend = testing::MockBackend {
            video_completes_at_poll: Some(3),
            ..Default::default()
        };
        let bytes = generate_video(&backend, "the model spins", None).await.unwrap();
        assert_eq!(&bytes[..], b"mock-mp4");
    }

    #[test]
    fn key_not_found_signature_is_detected() {
        let err = GeminiError::Http(format!("status=404 body={}", KEY_NOT_FOUND_SIGNATURE));
        assert!(err.is_key_not_found());
        assert!(!GeminiError::Timeout.is_key_not_found());
        assert!(!GeminiError::Http("status=500 body=oops".into()).is_key_not_found());
    }
}
