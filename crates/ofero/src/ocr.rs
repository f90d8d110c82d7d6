//! Vision-model transcription of rendered pages.

use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bon::Builder;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::pdf::PageImage;

/// Instruction sent with every page image. Verbatim transcription only;
/// anything chattier poisons the cache for the lifetime of the entry.
const TRANSCRIPTION_PROMPT: &str = "Extract ALL text from this document image.\n\
Preserve the exact formatting, structure, headers, and layout as much as possible.\n\
Return ONLY the extracted text, with no additional commentary or explanation.\n\
Preserve line breaks and spacing.";

/// Page scans compress far better as JPEG than as the PNG they arrive in.
const JPEG_QUALITY: u8 = 85;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("no vision OCR provider configured: {hint}")]
    Unavailable { hint: String },

    #[error("OCR transcription failed for page {page_index}: {reason}")]
    TranscriptionFailed { page_index: usize, reason: String },
}

impl OcrError {
    pub fn unavailable() -> Self {
        OcrError::Unavailable {
            hint: "set ocr.api_key in the configuration or the OFERO_OCR__API_KEY \
                   environment variable"
                .to_string(),
        }
    }
}

/// A provider that can turn a page image into text.
///
/// One call is one billed provider request. Implementations make
/// exactly one attempt; the caller decides whether a failed page is
/// worth re-requesting later.
#[async_trait::async_trait]
pub trait VisionOcr: Send + Sync {
    async fn transcribe(&self, image: &PageImage) -> Result<String, OcrError>;

    /// Identifier recorded alongside cached transcriptions.
    fn model_id(&self) -> &str;
}

#[derive(Debug, Clone, Builder)]
pub struct ChatVisionOcrConfig {
    #[builder(into)]
    pub base_url: String,
    #[builder(into)]
    pub api_key: String,
    #[builder(into)]
    pub model: String,
    #[builder(default = 4096)]
    pub max_completion_tokens: u32,
    #[builder(default = 120)]
    pub timeout_secs: u64,
}

/// [`VisionOcr`] over an OpenAI-compatible `/chat/completions` endpoint,
/// with the page inlined as a base64 JPEG data URL.
pub struct ChatVisionOcr {
    http: reqwest::Client,
    config: ChatVisionOcrConfig,
}

impl ChatVisionOcr {
    pub fn new(config: ChatVisionOcrConfig) -> Result<Self, OcrError> {
        if config.api_key.trim().is_empty() {
            return Err(OcrError::unavailable());
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| OcrError::Unavailable {
                hint: format!("failed to construct HTTP client: {err}"),
            })?;
        Ok(Self { http, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_completion_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[async_trait::async_trait]
impl VisionOcr for ChatVisionOcr {
    async fn transcribe(&self, image: &PageImage) -> Result<String, OcrError> {
        let page_index = image.page_index;
        let failed = |reason: String| OcrError::TranscriptionFailed { page_index, reason };

        let jpeg = prepare_jpeg(image)
            .map_err(|err| failed(format!("image preparation failed: {err}")))?;
        debug!(
            page = page_index,
            jpeg_bytes = jpeg.len(),
            model = %self.config.model,
            "sending page to vision model"
        );
        let data_url = format!("data:image/jpeg;base64,{}", BASE64.encode(&jpeg));

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: TRANSCRIPTION_PROMPT,
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl { url: data_url },
                    },
                ],
            }],
            temperature: 0.0,
            max_completion_tokens: self.config.max_completion_tokens,
        };

        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|err| failed(format!("request failed: {err}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(failed(format!(
                "provider returned {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|err| failed(format!("malformed provider response: {err}")))?;

        parsed
            .choices
            .first()
            .and_then(|choice| choice.message.content.as_deref())
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
            .ok_or_else(|| failed("provider returned empty output".to_string()))
    }

    fn model_id(&self) -> &str {
        &self.config.model
    }
}

/// Re-encode the rendered PNG as JPEG, flattening any alpha channel
/// onto a white background first. Pdfium renders transparent where a
/// page has no content, which JPEG would otherwise turn black.
fn prepare_jpeg(image: &PageImage) -> Result<Vec<u8>, image::ImageError> {
    let decoded = image::load_from_memory(&image.png_data)?;
    let rgb = flatten_to_rgb(decoded);
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY).encode_image(&rgb)?;
    Ok(jpeg)
}

fn flatten_to_rgb(image: DynamicImage) -> RgbImage {
    match image {
        DynamicImage::ImageRgb8(rgb) => rgb,
        other => {
            let rgba = other.to_rgba8();
            let (width, height) = rgba.dimensions();
            let mut rgb = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
            for (x, y, pixel) in rgba.enumerate_pixels() {
                let [r, g, b, a] = pixel.0;
                let a = a as u16;
                let blend = |c: u8| (((c as u16) * a + 255 * (255 - a)) / 255) as u8;
                rgb.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
            }
            rgb
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn empty_api_key_is_unavailable() {
        let config = ChatVisionOcrConfig::builder()
            .base_url("https://api.openai.com/v1")
            .api_key("  ")
            .model("gpt-4o")
            .build();
        assert!(matches!(
            ChatVisionOcr::new(config),
            Err(OcrError::Unavailable { .. })
        ));
    }

    #[test]
    fn request_serializes_to_openai_shape() {
        let request = ChatRequest {
            model: "gpt-4o",
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text { text: "prompt" },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: "data:image/jpeg;base64,AAAA".to_string(),
                        },
                    },
                ],
            }],
            temperature: 0.0,
            max_completion_tokens: 4096,
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["model"], "gpt-4o");
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"][0]["type"], "text");
        assert_eq!(value["messages"][0]["content"][1]["type"], "image_url");
        assert_eq!(
            value["messages"][0]["content"][1]["image_url"]["url"],
            "data:image/jpeg;base64,AAAA"
        );
    }

    #[test]
    fn response_parses_choice_content() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":"Page text."}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("Page text.")
        );
    }

    #[test]
    fn transparent_pixels_flatten_to_white() {
        let mut rgba = image::RgbaImage::new(2, 1);
        rgba.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        rgba.put_pixel(1, 0, Rgba([0, 0, 0, 0]));
        let rgb = flatten_to_rgb(DynamicImage::ImageRgba8(rgba));
        assert_eq!(rgb.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(rgb.get_pixel(1, 0).0, [255, 255, 255]);
    }
}
